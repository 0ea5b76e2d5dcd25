//! Gitリポジトリのホットスポット分析ツール
//!
//! このクレートは、Gitリポジトリのコミット履歴を1回だけ走査し、
//! 頻繁に変更され、かつ大きいファイル（ホットスポット）を
//! 特定するための機能を提供します。
//!
//! # 主な機能
//!
//! - コミット履歴の分析（リネームの追跡を含む）
//! - ファイルごとの変更回数・開発者数・チャーンの集計
//! - 現在の行数とのスコア算出
//! - 分析結果のキャッシュ
//!
//! # 使用例
//!
//! ```no_run
//! use hotspot_analyzer::{AnalysisOptions, CacheStore, HotspotAnalyzer};
//!
//! let options = AnalysisOptions {
//!     since: Some("2024-01-01".to_string()),
//!     exclude_patterns: vec!["migrations/*".to_string()],
//!     ..AnalysisOptions::default()
//! };
//! let analyzer = HotspotAnalyzer::new("path/to/repo", options).unwrap();
//!
//! let cache = CacheStore::open_default().unwrap();
//! let (dataset, _status) = analyzer.analyze_cached(&cache).unwrap();
//! ```

pub mod analyzer;
pub use analyzer::{
    AnalysisOptions, AnalyzerError, CacheStatus, CacheStore, ExclusionFilter, HotspotAnalyzer,
    HotspotDataset, HotspotRecord,
};
