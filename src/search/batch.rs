use std::path::Path;
use crate::errors::{AppError, Result};

/// One line of a batch file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEntry {
    Url(String),
    Query(String),
}

impl BatchEntry {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let looks_like_url = line.starts_with("http://") || line.starts_with("https://");
        if looks_like_url && url::Url::parse(line).is_ok() {
            Some(BatchEntry::Url(line.to_string()))
        } else {
            Some(BatchEntry::Query(line.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            BatchEntry::Url(s) | BatchEntry::Query(s) => s,
        }
    }
}

/// Reads a batch file: one query or URL per line, blank lines ignored,
/// input order preserved.
pub async fn read_batch_file(path: &Path) -> Result<Vec<BatchEntry>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AppError::InvalidInput(format!("cannot read batch file {:?}: {}", path, e)))?;

    Ok(content.lines().filter_map(BatchEntry::parse).collect())
}
