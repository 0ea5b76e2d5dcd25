//! Gitリポジトリとの対話を担当するモジュール
//!
//! このモジュールは、libgit2を使用してGitリポジトリからコミット履歴を取得し、
//! ファイルの変更履歴を追跡するための機能を提供します。
//! 履歴は1コミットずつ遅延的に読み出され、全履歴をメモリに展開することはありません。

use super::error::AnalyzerError;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use git2::{Commit, Delta, DiffFindOptions, ErrorCode, Oid, Patch, Repository, Revwalk, Sort};
use indexmap::IndexMap;
use log::debug;
use std::cell::Cell;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// リネーム検出の類似度しきい値（%）の既定値。gitの既定値と同じです
pub const DEFAULT_RENAME_THRESHOLD: u16 = 50;

/// サブモジュールを表すインデックスエントリのモード
const GITLINK_MODE: u32 = 0o160000;

/// Gitリポジトリへのアクセスを管理する構造体
///
/// # フィールド
///
/// - `repo`: libgit2のリポジトリハンドル
/// - `workdir`: 正規化された作業ツリーのパス
/// - `traversals`: 履歴を走査した回数
pub struct GitRepository {
    repo: Repository,
    workdir: PathBuf,
    traversals: Cell<usize>,
}

/// 1つのコミットの情報を保持する構造体
///
/// # フィールド
///
/// - `hash`: コミットハッシュ
/// - `author`: コミット作成者の名前（別名の統合は行いません）
/// - `timestamp`: コミット日時
/// - `touches`: 変更されたファイル。パスごとに1件で、差分の順序を保ちます
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub hash: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub touches: IndexMap<String, FileTouch>,
}

/// コミット内の1ファイルへの変更
///
/// `previous_path`はリネームとして検出された場合のみ設定されます。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTouch {
    pub path: String,
    pub previous_path: Option<String>,
    pub lines_added: u64,
    pub lines_deleted: u64,
}

/// 履歴走査のオプション
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryOptions {
    pub since: Option<DateTime<Utc>>,
    pub include_merges: bool,
    pub rename_threshold: u16,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            since: None,
            include_merges: false,
            rename_threshold: DEFAULT_RENAME_THRESHOLD,
        }
    }
}

impl GitRepository {
    /// 指定されたパスのGitリポジトリをオープンします
    ///
    /// # エラー
    ///
    /// 以下の場合に`AnalyzerError::RepositoryNotFound`を返します：
    /// - パスがGitリポジトリでない
    /// - ベアリポジトリで作業ツリーがない
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AnalyzerError> {
        let path = path.as_ref();
        let not_found = |reason: String| AnalyzerError::RepositoryNotFound {
            path: path.to_path_buf(),
            reason,
        };

        let repo = Repository::open(path).map_err(|e| not_found(e.message().to_string()))?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| not_found("bare repository has no working tree".to_string()))?
            .canonicalize()?;

        Ok(Self {
            repo,
            workdir,
            traversals: Cell::new(0),
        })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// キャッシュキーに使うリポジトリの識別子（正規化された作業ツリーのパス）
    pub fn identity(&self) -> String {
        self.workdir.to_string_lossy().into_owned()
    }

    /// 履歴を走査した回数
    pub fn traversal_count(&self) -> usize {
        self.traversals.get()
    }

    /// HEADが指すコミットを返します
    ///
    /// # エラー
    ///
    /// コミットが1つもない場合は`AnalyzerError::EmptyRepository`を返します
    pub fn head_oid(&self) -> Result<Oid, AnalyzerError> {
        match self.repo.head() {
            Ok(head) => Ok(head.peel_to_commit()?.id()),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                Err(AnalyzerError::EmptyRepository)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// `head`から到達可能で、期間内のコミット数を数えます（マージコミットを含む）
    pub fn commit_count(
        &self,
        head: Oid,
        since: Option<DateTime<Utc>>,
    ) -> Result<u64, AnalyzerError> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.push(head)?;

        let mut count = 0;
        for oid in revwalk {
            let commit = self.repo.find_commit(oid?)?;
            if within_window(&commit, since) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// インデックスに登録されている現在の追跡ファイルを返します
    ///
    /// サブモジュールとUTF-8でないパスは含みません。
    pub fn tracked_files(&self) -> Result<BTreeSet<String>, AnalyzerError> {
        let mut index = self.repo.index()?;
        index.read(false)?;

        let mut files = BTreeSet::new();
        for entry in index.iter() {
            if entry.mode == GITLINK_MODE {
                continue;
            }
            match String::from_utf8(entry.path) {
                Ok(path) => {
                    files.insert(path);
                }
                Err(e) => debug!("Skipping non UTF-8 path {:?}", e.as_bytes()),
            }
        }
        Ok(files)
    }

    /// `head`から古い順にコミットを走査するイテレータを返します
    ///
    /// # 引数
    ///
    /// - `head`: 走査の起点となるコミット
    /// - `options`: 期間、マージコミット、リネーム検出の設定
    pub fn history(
        &self,
        head: Oid,
        options: HistoryOptions,
    ) -> Result<CommitHistory<'_>, AnalyzerError> {
        self.traversals.set(self.traversals.get() + 1);

        let mut revwalk = self.repo.revwalk()?;
        revwalk.push(head)?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME | Sort::REVERSE)?;

        Ok(CommitHistory {
            repo: &self.repo,
            revwalk,
            options,
        })
    }
}

/// コミット履歴を1件ずつ読み出すイテレータ
///
/// 走査中のエラー（破損したオブジェクトなど）は`Err`として返されます。
/// 部分的な履歴は誤った結果につながるため、呼び出し側は走査を中断する必要があります。
pub struct CommitHistory<'repo> {
    repo: &'repo Repository,
    revwalk: Revwalk<'repo>,
    options: HistoryOptions,
}

impl CommitHistory<'_> {
    fn read_commit(&self, oid: Oid) -> Result<Option<CommitRecord>, AnalyzerError> {
        let commit = self.repo.find_commit(oid)?;

        // 指定された日時より前のコミットはスキップ
        if !within_window(&commit, self.options.since) {
            return Ok(None);
        }

        // マージコミットを除外
        if !self.options.include_merges && commit.parent_count() > 1 {
            debug!("Skipping merge commit {}", oid);
            return Ok(None);
        }

        let timestamp = DateTime::from_timestamp(commit.time().seconds(), 0)
            .ok_or_else(|| AnalyzerError::AnalysisError("Invalid commit timestamp".to_string()))?;

        let signature = commit.author();
        let author = String::from_utf8_lossy(signature.name_bytes()).into_owned();

        let touches = self.touches(&commit)?;
        debug!("Commit {} by {}: {} files", oid, author, touches.len());

        Ok(Some(CommitRecord {
            hash: oid.to_string(),
            author,
            timestamp,
            touches,
        }))
    }

    fn touches(&self, commit: &Commit) -> Result<IndexMap<String, FileTouch>, AnalyzerError> {
        let tree = commit.tree()?;
        let parent_tree = if commit.parent_count() > 0 {
            Some(commit.parent(0)?.tree()?)
        } else {
            None
        };

        let mut diff = self
            .repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;

        let mut find_options = DiffFindOptions::new();
        find_options
            .renames(true)
            .rename_threshold(self.options.rename_threshold);
        diff.find_similar(Some(&mut find_options))?;

        let mut touches: IndexMap<String, FileTouch> = IndexMap::new();
        for (idx, delta) in diff.deltas().enumerate() {
            // 削除されたファイルもnew_fileに元のパスが入る
            let path = match delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path())
                .and_then(Path::to_str)
            {
                Some(path) => path.to_string(),
                None => {
                    debug!("Skipping non UTF-8 path in {}", commit.id());
                    continue;
                }
            };

            let previous_path = if delta.status() == Delta::Renamed {
                delta
                    .old_file()
                    .path()
                    .and_then(Path::to_str)
                    .map(str::to_string)
            } else {
                None
            };

            // バイナリファイルは0行として扱う
            let (lines_added, lines_deleted) = match Patch::from_diff(&diff, idx)? {
                Some(patch) => {
                    let (_, additions, deletions) = patch.line_stats()?;
                    (additions as u64, deletions as u64)
                }
                None => (0, 0),
            };

            let touch = touches.entry(path.clone()).or_insert_with(|| FileTouch {
                path,
                previous_path: None,
                lines_added: 0,
                lines_deleted: 0,
            });
            touch.lines_added += lines_added;
            touch.lines_deleted += lines_deleted;
            if previous_path.is_some() {
                touch.previous_path = previous_path;
            }
        }

        Ok(touches)
    }
}

impl Iterator for CommitHistory<'_> {
    type Item = Result<CommitRecord, AnalyzerError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let oid = match self.revwalk.next()? {
                Ok(oid) => oid,
                Err(e) => return Some(Err(e.into())),
            };

            match self.read_commit(oid) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

fn within_window(commit: &Commit, since: Option<DateTime<Utc>>) -> bool {
    since.map_or(true, |since| commit.time().seconds() >= since.timestamp())
}

/// 分析期間の開始日時を解析します
///
/// `YYYY-MM-DD`（UTCの0時）またはRFC 3339形式を受け付けます。
///
/// # エラー
///
/// どちらの形式でもない場合は`AnalyzerError::InvalidFilter`を返します
pub fn parse_since(value: &str) -> Result<DateTime<Utc>, AnalyzerError> {
    let value = value.trim();
    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Ok(datetime.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| {
            AnalyzerError::InvalidFilter(format!(
                "invalid date '{}', expected YYYY-MM-DD or RFC 3339",
                value
            ))
        })
}
