//! 分析結果のキャッシュを管理するモジュール
//!
//! キャッシュキーはリポジトリ、HEAD、期間内のコミット数、除外設定などから作られ、
//! どれか1つでも変わると別のキーになります。エントリは1キーにつき1ファイルで、
//! 一時ファイルに書き出してからリネームするため、途中まで書かれたエントリは残りません。

use super::error::AnalyzerError;
use super::filter::ExclusionFilter;
use super::{AnalysisOptions, HotspotDataset};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// キャッシュファイルの形式バージョン。形式を変えたら上げる
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// キャッシュディレクトリを上書きする環境変数
pub const CACHE_DIR_ENV: &str = "HOTSPOT_ANALYZER_CACHE_DIR";

const DIGEST_HEX_LEN: usize = 64;

/// 分析結果を再利用できるかを決める複合キー
///
/// # フィールド
///
/// - `repository`: リポジトリの識別子（正規化された作業ツリーのパス）
/// - `head`: 分析したHEADのコミットハッシュ
/// - `commit_count`: 期間内のコミット数
/// - `since`: 期間の開始日時（RFC 3339に正規化）
/// - `exclusions`: 有効な除外パターン（ソート・重複除去済み）
/// - `include_merges`, `rename_threshold`, `min_lines`: 結果に影響するその他の設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheKey {
    pub repository: String,
    pub head: String,
    pub commit_count: u64,
    pub since: Option<String>,
    pub exclusions: Vec<String>,
    pub include_merges: bool,
    pub rename_threshold: u16,
    pub min_lines: u64,
}

impl CacheKey {
    /// 分析条件からキャッシュキーを作成します
    pub fn compute(
        repository: &str,
        head: &str,
        commit_count: u64,
        since: Option<DateTime<Utc>>,
        filter: &ExclusionFilter,
        options: &AnalysisOptions,
    ) -> Self {
        Self {
            repository: repository.to_string(),
            head: head.to_string(),
            commit_count,
            since: since.map(|since| since.to_rfc3339()),
            exclusions: filter.fingerprint(),
            include_merges: options.include_merges,
            rename_threshold: options.rename_threshold,
            min_lines: options.min_lines,
        }
    }

    /// キーのBLAKE3ダイジェスト（16進数64文字）
    ///
    /// 各フィールドは長さ付きで入力されるため、区切り文字を含む値でも衝突しません。
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        update_field(&mut hasher, self.repository.as_bytes());
        update_field(&mut hasher, self.head.as_bytes());
        update_field(&mut hasher, &self.commit_count.to_le_bytes());
        update_field(&mut hasher, &[u8::from(self.since.is_some())]);
        update_field(&mut hasher, self.since.as_deref().unwrap_or_default().as_bytes());
        update_field(&mut hasher, &(self.exclusions.len() as u64).to_le_bytes());
        for pattern in &self.exclusions {
            update_field(&mut hasher, pattern.as_bytes());
        }
        update_field(&mut hasher, &[u8::from(self.include_merges)]);
        update_field(&mut hasher, &self.rename_threshold.to_le_bytes());
        update_field(&mut hasher, &self.min_lines.to_le_bytes());

        hasher.finalize().to_hex().to_string()
    }
}

fn update_field(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// キャッシュの参照結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

/// ディスクに保存されるキャッシュエントリ
///
/// キーのフィールドを複製して持つので、エントリ単体で内容を説明できます。
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    format_version: u32,
    digest: String,
    key: CacheKey,
    created_at: DateTime<Utc>,
    dataset: HotspotDataset,
}

#[derive(Deserialize)]
struct VersionProbe {
    format_version: u32,
}

/// `list`で返すキャッシュエントリの概要
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheSummary {
    pub digest: String,
    pub path: PathBuf,
    pub repository: String,
    pub head: String,
    pub since: Option<String>,
    pub commit_count: u64,
    pub files: usize,
    pub created_at: DateTime<Utc>,
}

/// ディレクトリ1つを名前空間とするキャッシュストア
///
/// `<ダイジェスト>.json`という名前のファイルだけを扱い、
/// ディレクトリ内のそれ以外のファイルには触れません。
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// 既定の場所のキャッシュストアを返します
    ///
    /// `HOTSPOT_ANALYZER_CACHE_DIR`が設定されていればそのディレクトリ、
    /// なければユーザーのキャッシュディレクトリ配下の`hotspot-analyzer`を使います。
    pub fn open_default() -> Result<Self, AnalyzerError> {
        std::env::var_os(CACHE_DIR_ENV)
            .map(PathBuf::from)
            .or_else(|| dirs::cache_dir().map(|dir| dir.join("hotspot-analyzer")))
            .map(Self::new)
            .ok_or_else(|| {
                AnalyzerError::AnalysisError("Could not determine cache directory".to_string())
            })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, digest: &str) -> PathBuf {
        self.dir.join(format!("{}.json", digest))
    }

    /// キーに一致する分析結果を返します
    ///
    /// エントリがない場合、形式バージョンやキーが一致しない場合は`None`です。
    ///
    /// # エラー
    ///
    /// エントリが読み込めない、または壊れている場合は`AnalyzerError::CacheCorrupt`を返します
    pub fn get(&self, key: &CacheKey) -> Result<Option<HotspotDataset>, AnalyzerError> {
        let path = self.entry_path(&key.digest());
        let corrupt = |reason: String| AnalyzerError::CacheCorrupt {
            path: path.clone(),
            reason,
        };

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(corrupt(e.to_string())),
        };

        let probe: VersionProbe =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
        if probe.format_version != CACHE_FORMAT_VERSION {
            debug!(
                "Ignoring cache entry {} with format version {}",
                path.display(),
                probe.format_version
            );
            return Ok(None);
        }

        let entry: CacheEntry =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
        if entry.key != *key {
            debug!("Ignoring cache entry {} for a different key", path.display());
            return Ok(None);
        }

        Ok(Some(entry.dataset))
    }

    /// 分析結果を保存し、書き込んだファイルのパスを返します
    ///
    /// 一時ファイルに全体を書いてからリネームするため、書き込みは不可分です。
    pub fn put(&self, key: &CacheKey, dataset: &HotspotDataset) -> Result<PathBuf, AnalyzerError> {
        fs::create_dir_all(&self.dir)?;

        let digest = key.digest();
        let path = self.entry_path(&digest);
        let entry = CacheEntry {
            format_version: CACHE_FORMAT_VERSION,
            digest,
            key: key.clone(),
            created_at: Utc::now(),
            dataset: dataset.clone(),
        };

        let bytes = serde_json::to_vec_pretty(&entry)?;
        let mut file = NamedTempFile::new_in(&self.dir)?;
        file.write_all(&bytes)?;
        file.as_file().sync_all()?;
        file.persist(&path).map_err(|e| e.error)?;

        debug!("Wrote cache entry {}", path.display());
        Ok(path)
    }

    /// キーに対応するエントリを削除します。削除した場合は`true`
    pub fn invalidate(&self, key: &CacheKey) -> Result<bool, AnalyzerError> {
        remove_if_exists(&self.entry_path(&key.digest()))
    }

    /// すべてのエントリを削除し、削除した数を返します
    pub fn invalidate_all(&self) -> Result<usize, AnalyzerError> {
        let mut removed = 0;
        for path in self.entry_files()? {
            if remove_if_exists(&path)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// 保存されているエントリの概要を新しい順に返します
    ///
    /// 読み込めないエントリは警告を出して読み飛ばします。
    pub fn list(&self) -> Result<Vec<CacheSummary>, AnalyzerError> {
        let mut summaries = Vec::new();
        for path in self.entry_files()? {
            let entry = fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|bytes| {
                    serde_json::from_slice::<CacheEntry>(&bytes).map_err(|e| e.to_string())
                });

            match entry {
                Ok(entry) => summaries.push(CacheSummary {
                    digest: entry.digest,
                    path,
                    repository: entry.key.repository,
                    head: entry.key.head,
                    since: entry.dataset.since,
                    commit_count: entry.key.commit_count,
                    files: entry.dataset.hotspots.len(),
                    created_at: entry.created_at,
                }),
                Err(reason) => warn!("Skipping unreadable cache entry {}: {}", path.display(), reason),
            }
        }

        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>, AnalyzerError> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for dir_entry in read_dir {
            let path = dir_entry?.path();
            if path.is_file() && is_entry_file(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

fn is_entry_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.strip_suffix(".json"))
        .map_or(false, |stem| {
            stem.len() == DIGEST_HEX_LEN
                && stem.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        })
}

fn remove_if_exists(path: &Path) -> Result<bool, AnalyzerError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
