//! 現在のファイルの行数を計測するモジュール
//!
//! 行数は複雑さの近似値として使われます。バイナリや読み込めないファイルは
//! 結果から外され、分析の残りは続行されます。

use log::{debug, warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// バイナリ判定のために先頭から調べるバイト数（gitと同じ）
const BINARY_PROBE_LEN: usize = 8000;

/// 内容の行数を数えます
///
/// 先頭8000バイトにNULが含まれる場合はバイナリとみなし`None`を返します。
/// 末尾に改行のない最終行も1行として数えます。
pub fn count_lines(content: &[u8]) -> Option<u64> {
    let probe = &content[..content.len().min(BINARY_PROBE_LEN)];
    if probe.contains(&0) {
        return None;
    }

    let newlines = content.iter().filter(|&&b| b == b'\n').count() as u64;
    let unterminated = matches!(content.last(), Some(b) if *b != b'\n');
    Some(newlines + u64::from(unterminated))
}

/// 指定されたファイルの現在の行数を計測します
///
/// # 引数
///
/// - `workdir`: リポジトリの作業ツリー
/// - `paths`: 計測対象のリポジトリ相対パス
pub fn sample<'a>(
    workdir: &Path,
    paths: impl IntoIterator<Item = &'a String>,
) -> BTreeMap<String, u64> {
    let mut sizes = BTreeMap::new();
    for path in paths {
        let content = match fs::read(workdir.join(path)) {
            Ok(content) => content,
            Err(e) => {
                warn!("Skipping unreadable file {}: {}", path, e);
                continue;
            }
        };

        match count_lines(&content) {
            Some(lines) => {
                sizes.insert(path.clone(), lines);
            }
            None => debug!("Skipping binary file {}", path),
        }
    }
    sizes
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_count_lines() {
        assert_eq!(count_lines(b""), Some(0));
        assert_eq!(count_lines(b"one"), Some(1));
        assert_eq!(count_lines(b"one\n"), Some(1));
        assert_eq!(count_lines(b"one\ntwo"), Some(2));
        assert_eq!(count_lines(b"one\ntwo\n\n"), Some(3));
        assert_eq!(count_lines(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR"), None);
    }

    #[test]
    fn test_invalid_utf8_is_still_text() {
        assert_eq!(count_lines(b"caf\xe9\nna\xefve\n"), Some(2));
    }

    #[test]
    fn test_sample_skips_binary_and_missing() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/lib.rs"), "fn a() {}\nfn b() {}\n").unwrap();
        fs::write(dir.path().join("blob.bin"), [0u8, 1, 2, 3]).unwrap();

        let paths: Vec<String> = ["src/lib.rs", "blob.bin", "missing.rs"]
            .iter()
            .map(|p| p.to_string())
            .collect();
        let sizes = sample(dir.path(), &paths);

        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes["src/lib.rs"], 2);
    }
}
