//! メトリクス計算と結果の表現を担当するモジュール
//!
//! このモジュールは、変更履歴の統計と現在のファイルサイズを結合して
//! ホットスポットスコアを算出し、分析結果を表現するデータ構造を提供します。

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// 履歴から集計したファイルごとの変更統計
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetrics {
    pub path: String,
    pub revisions: u32,
    pub author_count: u32,
    pub lines_added: u64,
    pub lines_deleted: u64,
}

/// ファイルごとの分析結果を保持する構造体
///
/// フィールド名はシリアライズ後もそのまま使われ、出力の利用側が依存します。
///
/// # フィールド
///
/// - `path`: 分析対象ファイルのパス
/// - `lines_of_code`: 現在の行数
/// - `revisions`: 分析期間内の変更回数
/// - `author_count`: ファイルに貢献した開発者の数
/// - `churn`: 追加行数と削除行数の合計
/// - `lines_added`: 追加行数
/// - `lines_deleted`: 削除行数
/// - `hotspot_score`: 計算されたホットスポットスコア
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotspotRecord {
    pub path: String,
    pub lines_of_code: u64,
    pub revisions: u32,
    pub author_count: u32,
    pub churn: u64,
    pub lines_added: u64,
    pub lines_deleted: u64,
    pub hotspot_score: f64,
}

/// ホットスポットスコアを計算します
///
/// 変更回数に行数の対数を掛けた値で、どちらの入力に対しても単調非減少です。
/// 変更のないファイルは0になります。
pub fn hotspot_score(lines_of_code: u64, revisions: u32) -> f64 {
    let complexity = (lines_of_code as f64).ln_1p();
    round_to_4(revisions as f64 * complexity)
}

fn round_to_4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// 変更統計と現在の行数をパスで結合し、スコアの降順に並べます
///
/// # 引数
///
/// - `history`: 集約済みの変更統計
/// - `sizes`: 現在の追跡ファイルごとの行数
/// - `min_lines`: これより行数の少ないファイルは結果に含めない
///
/// 行数側にだけあるファイル（期間内に変更がない）は変更回数0として残り、
/// 履歴側にだけあるファイルは含まれません。同点の場合はパスの昇順です。
pub fn compose(
    mut history: BTreeMap<String, FileMetrics>,
    sizes: BTreeMap<String, u64>,
    min_lines: u64,
) -> Vec<HotspotRecord> {
    let mut records: Vec<HotspotRecord> = sizes
        .into_iter()
        .filter(|(_, lines)| *lines >= min_lines)
        .map(|(path, lines_of_code)| {
            let (revisions, author_count, lines_added, lines_deleted) = match history.remove(&path)
            {
                Some(m) => (m.revisions, m.author_count, m.lines_added, m.lines_deleted),
                None => (0, 0, 0, 0),
            };
            HotspotRecord {
                hotspot_score: hotspot_score(lines_of_code, revisions),
                path,
                lines_of_code,
                revisions,
                author_count,
                churn: lines_added + lines_deleted,
                lines_added,
                lines_deleted,
            }
        })
        .collect();

    records.sort_by(by_score_then_path);
    records
}

fn by_score_then_path(a: &HotspotRecord, b: &HotspotRecord) -> Ordering {
    b.hotspot_score
        .total_cmp(&a.hotspot_score)
        .then_with(|| a.path.cmp(&b.path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(path: &str, revisions: u32, authors: u32, added: u64, deleted: u64) -> FileMetrics {
        FileMetrics {
            path: path.to_string(),
            revisions,
            author_count: authors,
            lines_added: added,
            lines_deleted: deleted,
        }
    }

    #[test]
    fn test_score_is_monotonic() {
        for lines in [0, 1, 9, 10, 250, 10_000] {
            for revisions in 0..30 {
                let base = hotspot_score(lines, revisions);
                assert!(hotspot_score(lines, revisions + 1) >= base);
                assert!(hotspot_score(lines + 1, revisions) >= base);
                assert!(hotspot_score(lines * 2 + 1, revisions + 3) >= base);
            }
        }
    }

    #[test]
    fn test_score_reflects_both_inputs() {
        assert_eq!(hotspot_score(500, 0), 0.0);
        assert_eq!(hotspot_score(0, 12), 0.0);
        assert!(hotspot_score(100, 10) > hotspot_score(100, 2));
        assert!(hotspot_score(1_000, 5) > hotspot_score(10, 5));
    }

    #[test]
    fn test_compose_joins_on_path() {
        let history: BTreeMap<_, _> = [
            ("a.py".to_string(), metrics("a.py", 2, 2, 55, 2)),
            ("deleted.py".to_string(), metrics("deleted.py", 9, 3, 900, 0)),
        ]
        .into_iter()
        .collect();
        let sizes: BTreeMap<_, _> = [("a.py".to_string(), 53), ("untouched.py".to_string(), 40)]
            .into_iter()
            .collect();

        let records = compose(history, sizes, 0);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].path, "a.py");
        assert_eq!(records[0].revisions, 2);
        assert_eq!(records[0].author_count, 2);
        assert_eq!(records[0].churn, 57);
        assert_eq!(records[0].lines_of_code, 53);
        assert_eq!(records[0].hotspot_score, hotspot_score(53, 2));

        assert_eq!(records[1].path, "untouched.py");
        assert_eq!(records[1].revisions, 0);
        assert_eq!(records[1].hotspot_score, 0.0);
        assert!(records.iter().all(|r| r.path != "deleted.py"));
    }

    #[test]
    fn test_compose_orders_by_score_then_path() {
        let history: BTreeMap<_, _> = [
            ("b.rs".to_string(), metrics("b.rs", 3, 1, 3, 0)),
            ("a.rs".to_string(), metrics("a.rs", 3, 1, 3, 0)),
            ("hot.rs".to_string(), metrics("hot.rs", 20, 4, 100, 50)),
        ]
        .into_iter()
        .collect();
        let sizes: BTreeMap<_, _> = [
            ("a.rs".to_string(), 100),
            ("b.rs".to_string(), 100),
            ("hot.rs".to_string(), 100),
        ]
        .into_iter()
        .collect();

        let paths: Vec<_> = compose(history, sizes, 0)
            .into_iter()
            .map(|r| r.path)
            .collect();
        assert_eq!(paths, ["hot.rs", "a.rs", "b.rs"]);
    }

    #[test]
    fn test_compose_min_lines() {
        let sizes: BTreeMap<_, _> = [("tiny.rs".to_string(), 3), ("big.rs".to_string(), 10)]
            .into_iter()
            .collect();

        let records = compose(BTreeMap::new(), sizes, 10);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, "big.rs");
    }

    #[test]
    fn test_hotspot_record_field_names() {
        let record = HotspotRecord {
            path: "src/main.rs".to_string(),
            lines_of_code: 120,
            revisions: 7,
            author_count: 2,
            churn: 40,
            lines_added: 30,
            lines_deleted: 10,
            hotspot_score: hotspot_score(120, 7),
        };

        let json = serde_json::to_value(&record).unwrap();
        for field in [
            "path",
            "lines_of_code",
            "revisions",
            "author_count",
            "churn",
            "lines_added",
            "lines_deleted",
            "hotspot_score",
        ] {
            assert!(json.get(field).is_some(), "missing field {}", field);
        }

        let deserialized: HotspotRecord = serde_json::from_value(json).unwrap();
        assert_eq!(deserialized, record);
    }
}
