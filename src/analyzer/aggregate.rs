//! コミット履歴をファイルごとの変更統計に集約するモジュール

use super::filter::ExclusionFilter;
use super::git::CommitRecord;
use super::metrics::FileMetrics;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// ファイルごとの統計情報を収集する内部構造体
///
/// # フィールド
///
/// - `revisions`: ファイルを変更したコミット数
/// - `authors`: ファイルを変更した開発者のセット
/// - `lines_added`: 追加行数の合計
/// - `lines_deleted`: 削除行数の合計
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct FileStats {
    revisions: u32,
    authors: HashSet<String>,
    lines_added: u64,
    lines_deleted: u64,
}

impl FileStats {
    fn merge(&mut self, other: FileStats) {
        self.revisions += other.revisions;
        self.authors.extend(other.authors);
        self.lines_added += other.lines_added;
        self.lines_deleted += other.lines_deleted;
    }

    fn into_metrics(self, path: String) -> FileMetrics {
        FileMetrics {
            path,
            revisions: self.revisions,
            author_count: self.authors.len() as u32,
            lines_added: self.lines_added,
            lines_deleted: self.lines_deleted,
        }
    }
}

/// パスごとの統計を保持する集約器
///
/// `fold`で1コミットずつ取り込み、履歴を読み終えたら`finalize`で確定します。
/// メモリ使用量はコミット数ではなく、出現したパスの数に比例します。
#[derive(Debug, Default, Clone)]
pub struct MetricsAccumulator {
    files: HashMap<String, FileStats>,
}

impl MetricsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 1つのコミットを取り込んだ集約器を返します
    ///
    /// リネームされたファイルは、旧パスの統計を新パスに引き継いでから
    /// このコミットの変更を加算します。履歴は古い順に渡す必要があります。
    pub fn fold(mut self, commit: &CommitRecord) -> Self {
        for touch in commit.touches.values() {
            if let Some(previous) = &touch.previous_path {
                if let Some(carried) = self.files.remove(previous) {
                    self.files
                        .entry(touch.path.clone())
                        .or_default()
                        .merge(carried);
                }
            }

            // touchesはパスごとに1件なので、1コミットにつき1リビジョン
            let stats = self.files.entry(touch.path.clone()).or_default();
            stats.revisions += 1;
            if !stats.authors.contains(&commit.author) {
                stats.authors.insert(commit.author.clone());
            }
            stats.lines_added += touch.lines_added;
            stats.lines_deleted += touch.lines_deleted;
        }
        self
    }

    /// これまでに出現したパスの数
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// 集約結果を確定します
    ///
    /// 除外対象のパスと、現在追跡されていない（削除された）パスは破棄されます。
    pub fn finalize(
        self,
        filter: &ExclusionFilter,
        tracked: &BTreeSet<String>,
    ) -> BTreeMap<String, FileMetrics> {
        self.files
            .into_iter()
            .filter(|(path, _)| tracked.contains(path) && !filter.is_excluded(path))
            .map(|(path, stats)| (path.clone(), stats.into_metrics(path)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::git::FileTouch;
    use chrono::{TimeZone, Utc};
    use indexmap::IndexMap;

    fn commit(hash: &str, author: &str, touches: &[(&str, Option<&str>, u64, u64)]) -> CommitRecord {
        let mut map = IndexMap::new();
        for (path, previous, added, deleted) in touches {
            map.insert(
                path.to_string(),
                FileTouch {
                    path: path.to_string(),
                    previous_path: previous.map(str::to_string),
                    lines_added: *added,
                    lines_deleted: *deleted,
                },
            );
        }
        CommitRecord {
            hash: hash.to_string(),
            author: author.to_string(),
            timestamp: Utc.timestamp_opt(1_600_000_000, 0).unwrap(),
            touches: map,
        }
    }

    fn tracked(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    fn no_filter() -> ExclusionFilter {
        ExclusionFilter::new(false, Vec::new()).unwrap()
    }

    #[test]
    fn test_two_authors_example() {
        let commits = [
            commit("c1", "alice", &[("a.py", None, 50, 0)]),
            commit("c2", "bob", &[("a.py", None, 5, 2)]),
        ];

        let metrics = commits
            .iter()
            .fold(MetricsAccumulator::new(), MetricsAccumulator::fold)
            .finalize(&no_filter(), &tracked(&["a.py"]));

        let a = &metrics["a.py"];
        assert_eq!(a.revisions, 2);
        assert_eq!(a.author_count, 2);
        assert_eq!(a.lines_added, 55);
        assert_eq!(a.lines_deleted, 2);
    }

    #[test]
    fn test_same_author_counted_once() {
        let commits = [
            commit("c1", "alice", &[("a.rs", None, 1, 0), ("b.rs", None, 1, 0)]),
            commit("c2", "alice", &[("a.rs", None, 1, 1)]),
            commit("c3", "alice", &[("a.rs", None, 2, 1)]),
        ];

        let metrics = commits
            .iter()
            .fold(MetricsAccumulator::new(), MetricsAccumulator::fold)
            .finalize(&no_filter(), &tracked(&["a.rs", "b.rs"]));

        assert_eq!(metrics["a.rs"].revisions, 3);
        assert_eq!(metrics["a.rs"].author_count, 1);
        assert_eq!(metrics["b.rs"].revisions, 1);
    }

    #[test]
    fn test_rename_carries_history() {
        let commits = [
            commit("c1", "alice", &[("old.rs", None, 10, 0)]),
            commit("c2", "bob", &[("old.rs", None, 3, 1)]),
            commit("c3", "carol", &[("new.rs", Some("old.rs"), 0, 0)]),
            commit("c4", "alice", &[("new.rs", None, 2, 2)]),
        ];

        let accumulator = commits
            .iter()
            .fold(MetricsAccumulator::new(), MetricsAccumulator::fold);
        assert_eq!(accumulator.len(), 1);

        let metrics = accumulator.finalize(&no_filter(), &tracked(&["new.rs"]));
        let renamed = &metrics["new.rs"];
        assert_eq!(renamed.revisions, 4);
        assert_eq!(renamed.author_count, 3);
        assert_eq!(renamed.lines_added, 15);
        assert_eq!(renamed.lines_deleted, 3);
        assert!(!metrics.contains_key("old.rs"));
    }

    #[test]
    fn test_finalize_drops_deleted_and_excluded() {
        let commits = [commit(
            "c1",
            "alice",
            &[
                ("src/app.js", None, 10, 0),
                ("src/removed.js", None, 10, 0),
                ("yarn.lock", None, 500, 0),
            ],
        )];

        let filter = ExclusionFilter::new(true, Vec::new()).unwrap();
        let metrics = commits
            .iter()
            .fold(MetricsAccumulator::new(), MetricsAccumulator::fold)
            .finalize(&filter, &tracked(&["src/app.js", "yarn.lock"]));

        assert_eq!(metrics.len(), 1);
        assert!(metrics.contains_key("src/app.js"));
    }

    #[test]
    fn test_empty_history() {
        let accumulator = MetricsAccumulator::new();
        assert!(accumulator.is_empty());
        assert!(accumulator
            .finalize(&no_filter(), &tracked(&["a.rs"]))
            .is_empty());
    }
}
