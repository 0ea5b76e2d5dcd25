//! 分析対象から除外するファイルを判定するモジュール
//!
//! グロブパターンを正規表現に変換し、リポジトリ相対パスに対して照合します。
//! 判定はパスとパターンリストだけで決まり、I/Oは行いません。
//!
//! # マッチングの規則
//!
//! - 大文字と小文字は区別しません
//! - `*` は1つのパスセグメント内のみ、`?` は `/` 以外の1文字にマッチします
//! - `**` はセグメントをまたいでマッチし、`**/` は0個のディレクトリにもマッチします
//! - `[abc]` / `[!abc]` は文字クラスです
//! - 末尾が `/`、`/*`、`/**` のパターンはディレクトリパターンで、配下の全ファイルにマッチします
//! - パターンはパス全体と、セグメント境界から始まる各サフィックスに対して試されます。
//!   先頭に `/` を付けるとリポジトリのルートに固定されます

use super::error::AnalyzerError;
use regex::{RegexSet, RegexSetBuilder};

/// 組み込みの除外パターン
///
/// ロックファイル、依存関係やビルド出力のディレクトリ、画像やバイナリなど、
/// ソースコードとして分析する意味のないファイルを対象とします。
const DEFAULT_EXCLUSIONS: &[&str] = &[
    // ロックファイル
    "yarn.lock",
    "package-lock.json",
    "pnpm-lock.yaml",
    "poetry.lock",
    "Pipfile.lock",
    "uv.lock",
    "go.sum",
    "Gemfile.lock",
    "composer.lock",
    "Cargo.lock",
    // 依存関係
    "node_modules/*",
    "vendor/*",
    "venv/*",
    ".venv/*",
    "env/*",
    ".env/*",
    "__pycache__/*",
    ".pytest_cache/*",
    ".mypy_cache/*",
    ".tox/*",
    "site-packages/*",
    "dist-packages/*",
    // ビルド出力
    "dist/*",
    "build/*",
    "target/*",
    "out/*",
    ".next/*",
    ".nuxt/*",
    "coverage/*",
    ".coverage",
    "htmlcov/*",
    "*.egg-info/*",
    // IDE・エディタ
    ".idea/*",
    ".vscode/*",
    "*.swp",
    "*.swo",
    ".DS_Store",
    "Thumbs.db",
    // 画像・バイナリ
    "*.png",
    "*.jpg",
    "*.jpeg",
    "*.gif",
    "*.ico",
    "*.svg",
    "*.webp",
    "*.bmp",
    "*.tiff",
    "*.pdf",
    "*.zip",
    "*.tar",
    "*.gz",
    "*.rar",
    "*.7z",
    "*.woff",
    "*.woff2",
    "*.ttf",
    "*.eot",
    "*.mp3",
    "*.mp4",
    "*.wav",
    "*.avi",
    "*.mov",
    // コンパイル済み・生成ファイル
    "*.pyc",
    "*.pyo",
    "*.class",
    "*.o",
    "*.so",
    "*.dll",
    "*.exe",
    "*.jar",
    "*.war",
    "*.min.js",
    "*.min.css",
    "*.map",
    "*.bundle.js",
    "*.chunk.js",
    // Terraform
    "*.tfstate",
    "*.tfstate.backup",
    ".terraform/*",
    ".terraform.lock.hcl",
    // テストデータ
    "*.log",
    "test/fixtures/*",
    "tests/fixtures/*",
    "__snapshots__/*",
    // 生成されたドキュメント
    "docs/_build/*",
    "site/*",
    ".docusaurus/*",
    // その他の生成物
    "*.generated.*",
    "*.auto.*",
];

/// ファイルパスが分析から除外されるかを判定する構造体
///
/// # フィールド
///
/// - `patterns`: 有効なパターン（組み込み + ユーザー指定）を指定順に保持
/// - `floating`: どのセグメント境界からでもマッチするパターン
/// - `anchored`: ルートに固定されたパターン
#[derive(Debug, Clone)]
pub struct ExclusionFilter {
    patterns: Vec<String>,
    floating: RegexSet,
    anchored: RegexSet,
}

impl ExclusionFilter {
    /// 新しい`ExclusionFilter`を作成します
    ///
    /// # 引数
    ///
    /// - `use_defaults`: 組み込みの除外パターンを使うかどうか
    /// - `extra_patterns`: 組み込みパターンの後に追加するユーザー指定のパターン
    ///
    /// # エラー
    ///
    /// パターンが空、または文字クラスが閉じていない場合に
    /// `AnalyzerError::InvalidFilter`を返します
    pub fn new(use_defaults: bool, extra_patterns: Vec<String>) -> Result<Self, AnalyzerError> {
        let mut patterns: Vec<String> = Vec::new();
        if use_defaults {
            patterns.extend(DEFAULT_EXCLUSIONS.iter().map(|s| s.to_string()));
        }
        patterns.extend(extra_patterns);

        let mut floating = Vec::new();
        let mut anchored = Vec::new();
        for pattern in &patterns {
            match pattern.strip_prefix('/') {
                Some(rest) => anchored.push(glob_to_regex(pattern, rest)?),
                None => floating.push(glob_to_regex(pattern, pattern)?),
            }
        }

        Ok(Self {
            patterns,
            floating: build_set(floating)?,
            anchored: build_set(anchored)?,
        })
    }

    /// 組み込みの除外パターンの一覧
    pub fn default_patterns() -> &'static [&'static str] {
        DEFAULT_EXCLUSIONS
    }

    /// 有効なパターンを指定順に返します
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// キャッシュキー用の正規化されたパターン一覧（ソート・重複除去済み）
    ///
    /// 判定はパターンの順序に依存しないため、順序だけが違う設定は同じ値になります。
    pub fn fingerprint(&self) -> Vec<String> {
        let mut patterns = self.patterns.clone();
        patterns.sort();
        patterns.dedup();
        patterns
    }

    /// 指定されたパスが除外対象かどうかを判定します
    ///
    /// # 引数
    ///
    /// - `file_path`: リポジトリ相対のファイルパス（区切り文字は`/`）
    pub fn is_excluded(&self, file_path: &str) -> bool {
        if self.anchored.is_match(file_path) {
            return true;
        }
        segment_suffixes(file_path).any(|suffix| self.floating.is_match(suffix))
    }
}

/// パス全体と、各セグメント境界から始まるサフィックスを列挙します
fn segment_suffixes(path: &str) -> impl Iterator<Item = &str> {
    std::iter::once(path).chain(path.match_indices('/').map(move |(i, _)| &path[i + 1..]))
}

fn build_set(regexes: Vec<String>) -> Result<RegexSet, AnalyzerError> {
    RegexSetBuilder::new(regexes)
        .case_insensitive(true)
        .build()
        .map_err(|e| AnalyzerError::InvalidFilter(e.to_string()))
}

/// グロブパターンを正規表現に変換します
///
/// `original`はエラーメッセージ用、`body`は先頭の`/`を除いた変換対象です。
fn glob_to_regex(original: &str, body: &str) -> Result<String, AnalyzerError> {
    let (body, directory) = if let Some(dir) = body.strip_suffix("/**") {
        (dir, true)
    } else if let Some(dir) = body.strip_suffix("/*") {
        (dir, true)
    } else if let Some(dir) = body.strip_suffix('/') {
        (dir, true)
    } else {
        (body, false)
    };
    // `dir/**/*`や`dir/**/`の`**`は0階層にも一致する
    let body = if directory {
        let mut body = body;
        while let Some(dir) = body.strip_suffix("/**") {
            body = dir;
        }
        body
    } else {
        body
    };
    if directory && body == "**" {
        return Ok("^.+$".to_string());
    }

    if body.is_empty() {
        return Err(AnalyzerError::InvalidFilter(format!(
            "empty pattern '{}'",
            original
        )));
    }

    let mut regex = String::new();
    regex.push('^');

    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        regex.push_str("(?:.*/)?");
                    } else {
                        regex.push_str(".*");
                    }
                } else {
                    regex.push_str("[^/]*");
                }
            }
            '?' => regex.push_str("[^/]"),
            '[' => {
                let negated = matches!(chars.peek(), Some('!') | Some('^'));
                if negated {
                    chars.next();
                }

                let mut class = String::new();
                let mut closed = false;
                for cc in chars.by_ref() {
                    match cc {
                        ']' => {
                            closed = true;
                            break;
                        }
                        '\\' | '[' | '&' | '~' | '^' => {
                            class.push('\\');
                            class.push(cc);
                        }
                        _ => class.push(cc),
                    }
                }

                if !closed || class.is_empty() {
                    return Err(AnalyzerError::InvalidFilter(format!(
                        "unterminated character class in pattern '{}'",
                        original
                    )));
                }

                regex.push('[');
                if negated {
                    // 否定クラスがセグメントをまたがないように
                    regex.push('^');
                    regex.push('/');
                }
                regex.push_str(&class);
                regex.push(']');
            }
            '.' => regex.push_str("\\."),
            '/' => regex.push('/'),
            c if c.is_alphanumeric() => regex.push(c),
            _ => regex.push_str(&regex::escape(&c.to_string())),
        }
    }

    if directory {
        regex.push_str("/.*");
    }
    regex.push('$');
    Ok(regex)
}
