use lazy_static::lazy_static;
use regex::Regex;
use crate::errors::Result;
use log::info;

const MAX_FILENAME_CHARS: usize = 100;

lazy_static! {
    static ref INVALID_FILENAME_CHARS: Regex = Regex::new(r#"[\\/*?:"<>|]"#).unwrap();
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
}

/// Sanitizes a filename: drops characters that are invalid on common
/// filesystems, collapses whitespace runs and caps the length at 100
/// characters.
pub fn sanitize_filename(filename: &str) -> String {
    let stripped = INVALID_FILENAME_CHARS.replace_all(filename, "");
    let collapsed = WHITESPACE_RUN.replace_all(&stripped, " ");
    collapsed.trim().chars().take(MAX_FILENAME_CHARS).collect()
}

/// Creates a directory if it doesn't exist
pub async fn ensure_dir_exists(path: &std::path::Path) -> Result<()> {
    if !path.exists() {
        tokio::fs::create_dir_all(path).await?;
        info!("📁 Created directory: {:?}", path);
    }
    Ok(())
}

/// Last non-empty path segment of a URL, used as a name when the tool
/// cannot report a title.
pub fn url_tail_name(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last().map(str::to_string))
        })
        .unwrap_or_else(|| "download".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_reserved_characters() {
        assert_eq!(sanitize_filename(r#"AC/DC - Back\In*Black?: "Live" <1980> | x"#), "ACDC - BackInBlack Live 1980 x");
    }

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(sanitize_filename("  Daft   Punk \t-\n One  More  Time "), "Daft Punk - One More Time");
    }

    #[test]
    fn truncates_to_one_hundred_characters() {
        let long = "é".repeat(150);
        let sanitized = sanitize_filename(&long);
        assert_eq!(sanitized.chars().count(), 100);

        let short = "Imagine Dragons - Believer";
        assert_eq!(sanitize_filename(short), short);
    }

    #[test]
    fn url_tail_falls_back_to_download() {
        assert_eq!(url_tail_name("https://example.com/video"), "video");
        assert_eq!(url_tail_name("https://example.com/clips/intro/"), "intro");
        assert_eq!(url_tail_name("https://example.com/"), "download");
        assert_eq!(url_tail_name("not a url"), "download");
    }

    #[tokio::test]
    async fn creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_dir_exists(&nested).await.unwrap();
        assert!(nested.is_dir());
        ensure_dir_exists(&nested).await.unwrap();
    }
}
