//! ホットスポット分析の中核となるモジュール
//!
//! このモジュールは、Gitリポジトリの分析に必要な主要なコンポーネントを提供します。
//! 分析プロセスは以下の流れで行われます：
//!
//! 1. 除外パターンと分析期間の検証
//! 2. コミット履歴を古い順に1回だけ走査
//! 3. ファイルごとの変更回数・開発者数・チャーンの集約
//! 4. 現在のファイルの行数の計測
//! 5. 両者を結合したホットスポットスコアの算出
//!
//! これら全体はキャッシュで包まれており、キーが一致すれば履歴の走査を省略します。
//!
//! # 主要なコンポーネント
//!
//! - `HotspotAnalyzer`: 分析プロセス全体を制御する主要なクラス
//! - `ExclusionFilter`: 分析から除外するファイルの判定
//! - `MetricsAccumulator`: コミットをファイルごとの統計に畳み込む集約器
//! - `CacheStore`: 分析結果のディスクキャッシュ

mod aggregate;
mod cache;
mod complexity;
mod error;
mod filter;
mod git;
mod metrics;
#[cfg(test)]
#[path = "../../tests/common/mod.rs"]
mod test_support;

pub use aggregate::MetricsAccumulator;
pub use cache::{CacheKey, CacheStatus, CacheStore, CacheSummary, CACHE_DIR_ENV};
pub use complexity::count_lines;
pub use error::AnalyzerError;
pub use filter::ExclusionFilter;
pub use git::{
    parse_since, CommitHistory, CommitRecord, FileTouch, GitRepository, HistoryOptions,
    DEFAULT_RENAME_THRESHOLD,
};
pub use metrics::{compose, hotspot_score, FileMetrics, HotspotRecord};

use chrono::{DateTime, Utc};
use git2::Oid;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// 分析の設定
///
/// # フィールド
///
/// - `since`: この日時以降のコミットだけを分析（`YYYY-MM-DD`またはRFC 3339）
/// - `exclude_patterns`: 組み込みパターンに追加する除外パターン
/// - `use_default_excludes`: 組み込みの除外パターンを使うかどうか
/// - `include_merges`: マージコミットを含めるかどうか
/// - `rename_threshold`: リネーム検出の類似度しきい値（0〜100%）
/// - `min_lines`: これより行数の少ないファイルは結果に含めない
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    pub since: Option<String>,
    pub exclude_patterns: Vec<String>,
    pub use_default_excludes: bool,
    pub include_merges: bool,
    pub rename_threshold: u16,
    pub min_lines: u64,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            since: None,
            exclude_patterns: Vec::new(),
            use_default_excludes: true,
            include_merges: false,
            rename_threshold: DEFAULT_RENAME_THRESHOLD,
            min_lines: 0,
        }
    }
}

/// 1回の分析結果
///
/// 分析条件を含むため、キャッシュから読み出した場合でも内容を説明できます。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotspotDataset {
    pub repository: String,
    pub head: String,
    pub since: Option<String>,
    pub commit_count: u64,
    pub analyzed_at: DateTime<Utc>,
    pub hotspots: Vec<HotspotRecord>,
}

/// ホットスポット分析を実行するメインの構造体
///
/// この構造体は、Gitリポジトリの分析を制御し、
/// 指定された期間内のコミット履歴からホットスポットを特定します。
///
/// # フィールド
///
/// - `repo`: Gitリポジトリへのアクセスを管理するインスタンス
/// - `filter`: 除外パターン
/// - `since`: 解析済みの分析期間の開始日時
/// - `options`: 分析の設定
pub struct HotspotAnalyzer {
    repo: GitRepository,
    filter: ExclusionFilter,
    since: Option<DateTime<Utc>>,
    options: AnalysisOptions,
}

impl HotspotAnalyzer {
    /// 新しいHotspotAnalyzerインスタンスを作成します
    ///
    /// 設定の検証はリポジトリを開く前、履歴を読む前にすべて行われます。
    ///
    /// # 引数
    ///
    /// - `path`: 分析対象のGitリポジトリパス
    /// - `options`: 分析の設定
    ///
    /// # エラー
    ///
    /// 以下の場合にエラーを返します：
    /// - 日付やパターン、しきい値が無効（`InvalidFilter`）
    /// - 指定されたパスが有効なGitリポジトリでない（`RepositoryNotFound`）
    pub fn new(
        path: impl AsRef<std::path::Path>,
        options: AnalysisOptions,
    ) -> Result<Self, AnalyzerError> {
        let since = options.since.as_deref().map(parse_since).transpose()?;
        if options.rename_threshold > 100 {
            return Err(AnalyzerError::InvalidFilter(format!(
                "rename threshold must be between 0 and 100, got {}",
                options.rename_threshold
            )));
        }
        let filter =
            ExclusionFilter::new(options.use_default_excludes, options.exclude_patterns.clone())?;

        Ok(Self {
            repo: GitRepository::open(path)?,
            filter,
            since,
            options,
        })
    }

    /// このインスタンスが履歴を走査した回数
    pub fn traversal_count(&self) -> usize {
        self.repo.traversal_count()
    }

    /// 現在のリポジトリの状態に対するキャッシュキーを計算します
    pub fn cache_key(&self) -> Result<CacheKey, AnalyzerError> {
        let head = self.repo.head_oid()?;
        self.cache_key_at(head)
    }

    fn cache_key_at(&self, head: Oid) -> Result<CacheKey, AnalyzerError> {
        let commit_count = self.repo.commit_count(head, self.since)?;
        Ok(CacheKey::compute(
            &self.repo.identity(),
            &head.to_string(),
            commit_count,
            self.since,
            &self.filter,
            &self.options,
        ))
    }

    /// キャッシュを使わずにリポジトリを分析します
    ///
    /// # エラー
    ///
    /// 以下の場合にエラーを返します：
    /// - リポジトリにコミットがない
    /// - コミット履歴の走査に失敗（部分的な結果は返しません）
    pub fn analyze(&self) -> Result<HotspotDataset, AnalyzerError> {
        let head = self.repo.head_oid()?;
        let commit_count = self.repo.commit_count(head, self.since)?;
        self.run(head, commit_count)
    }

    /// キャッシュに有効な結果があればそれを返し、なければ分析して保存します
    ///
    /// キャッシュの読み書きに失敗しても分析は続行されます。
    pub fn analyze_cached(
        &self,
        cache: &CacheStore,
    ) -> Result<(HotspotDataset, CacheStatus), AnalyzerError> {
        let head = self.repo.head_oid()?;
        let key = self.cache_key_at(head)?;

        match cache.get(&key) {
            Ok(Some(dataset)) => {
                info!("Using cached analysis for {} at {}", key.repository, key.head);
                return Ok((dataset, CacheStatus::Hit));
            }
            Ok(None) => info!("No cached analysis found, running fresh analysis"),
            Err(e) => warn!("{}; running fresh analysis", e),
        }

        let dataset = self.run(head, key.commit_count)?;
        match cache.put(&key, &dataset) {
            Ok(path) => info!("Results cached to {}", path.display()),
            Err(e) => warn!("Could not save cache: {}", e),
        }
        Ok((dataset, CacheStatus::Miss))
    }

    fn run(&self, head: Oid, commit_count: u64) -> Result<HotspotDataset, AnalyzerError> {
        let history_options = HistoryOptions {
            since: self.since,
            include_merges: self.options.include_merges,
            rename_threshold: self.options.rename_threshold,
        };

        info!("Analyzing history of {} from {}", self.repo.identity(), head);
        let accumulator = self
            .repo
            .history(head, history_options)?
            .try_fold(MetricsAccumulator::new(), |acc, commit| {
                commit.map(|commit| acc.fold(&commit))
            })?;
        info!("Found {} files with revision history", accumulator.len());

        let tracked: BTreeSet<String> = self
            .repo
            .tracked_files()?
            .into_iter()
            .filter(|path| !self.filter.is_excluded(path))
            .collect();
        let history = accumulator.finalize(&self.filter, &tracked);

        let sizes = complexity::sample(self.repo.workdir(), &tracked);
        info!("Measured {} of {} tracked files", sizes.len(), tracked.len());

        let hotspots = compose(history, sizes, self.options.min_lines);
        info!("Identified {} files for analysis", hotspots.len());

        Ok(HotspotDataset {
            repository: self.repo.identity(),
            head: head.to_string(),
            since: self.options.since.clone(),
            commit_count,
            analyzed_at: Utc::now(),
            hotspots,
        })
    }
}
