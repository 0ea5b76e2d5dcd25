#![allow(dead_code)]

//! テスト用の一時Gitリポジトリ

use git2::{IndexAddOption, ObjectType, Oid, Repository, Signature, Time};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

pub struct TestRepo {
    pub dir: TempDir,
    pub repo: Repository,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        Self { dir, repo }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, file: &str, content: &str) {
        let path = self.dir.path().join(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    pub fn write_lines(&self, file: &str, count: usize) {
        let content: String = (0..count).map(|i| format!("line {}\n", i)).collect();
        self.write(file, &content);
    }

    pub fn remove(&self, file: &str) {
        fs::remove_file(self.dir.path().join(file)).unwrap();
    }

    pub fn rename(&self, from: &str, to: &str) {
        let target = self.dir.path().join(to);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::rename(self.dir.path().join(from), target).unwrap();
    }

    /// 作業ツリーの全変更をステージしてコミットします
    pub fn commit(&self, author: &str, seconds: i64) -> Oid {
        self.commit_with(author, seconds, Some("HEAD"), None)
    }

    /// HEADを動かさずにコミットを作成します（ブランチの代わり）
    pub fn commit_detached(&self, author: &str, seconds: i64) -> Oid {
        self.commit_with(author, seconds, None, None)
    }

    /// HEADと`other`を親に持つマージコミットを作成します
    pub fn commit_merge(&self, author: &str, seconds: i64, other: Oid) -> Oid {
        self.commit_with(author, seconds, Some("HEAD"), Some(other))
    }

    /// 作者名をバイト列のまま書き込んだコミットをHEADの先に作成します
    pub fn commit_raw_author(&self, author: &[u8], seconds: i64) -> Oid {
        let mut index = self.repo.index().unwrap();
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree = index.write_tree().unwrap();

        let head = self.repo.head().unwrap();
        let parent = head.target().unwrap();

        let mut person = author.to_vec();
        person.extend_from_slice(format!(" <raw@example.com> {} +0000", seconds).as_bytes());

        let mut content = format!("tree {}\nparent {}\n", tree, parent).into_bytes();
        for field in [&b"author "[..], &b"committer "[..]] {
            content.extend_from_slice(field);
            content.extend_from_slice(&person);
            content.push(b'\n');
        }
        content.extend_from_slice(b"\nraw author commit\n");

        let oid = self
            .repo
            .odb()
            .unwrap()
            .write(ObjectType::Commit, &content)
            .unwrap();
        self.repo
            .reference(head.name().unwrap(), oid, true, "raw author commit")
            .unwrap();
        oid
    }

    /// ルーズオブジェクトを`.git/objects`から削除します
    pub fn delete_object(&self, oid: Oid) {
        let hex = oid.to_string();
        let path = self
            .repo
            .path()
            .join("objects")
            .join(&hex[..2])
            .join(&hex[2..]);
        fs::remove_file(path).unwrap();
    }

    /// コミット時点のファイルのblob
    pub fn blob_at(&self, commit: Oid, file: &str) -> Oid {
        let tree = self.repo.find_commit(commit).unwrap().tree().unwrap();
        tree.get_path(Path::new(file)).unwrap().id()
    }

    fn commit_with(
        &self,
        author: &str,
        seconds: i64,
        update_ref: Option<&str>,
        merge_parent: Option<Oid>,
    ) -> Oid {
        let mut index = self.repo.index().unwrap();
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .unwrap();
        index.update_all(["*"].iter(), None).unwrap();
        index.write().unwrap();

        let tree = self.repo.find_tree(index.write_tree().unwrap()).unwrap();
        let signature = Signature::new(
            author,
            &format!("{}@example.com", author),
            &Time::new(seconds, 0),
        )
        .unwrap();

        let mut parents = Vec::new();
        if let Some(head) = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok()) {
            parents.push(head);
        }
        if let Some(oid) = merge_parent {
            parents.push(self.repo.find_commit(oid).unwrap());
        }
        let parent_refs: Vec<_> = parents.iter().collect();

        self.repo
            .commit(
                update_ref,
                &signature,
                &signature,
                &format!("commit by {}", author),
                &tree,
                &parent_refs,
            )
            .unwrap()
    }
}
