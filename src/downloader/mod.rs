pub mod fallback;
pub mod fetcher;
pub mod manager;
pub mod progress;
pub mod ytdlp;

use std::fmt;
use std::path::PathBuf;
use async_trait::async_trait;
use crate::errors::{AppError, Result};
use progress::ProgressFeed;

/// One external tool run: the target (URL or `ytsearch1:` term) followed by
/// its flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub target: String,
    pub args: Vec<String>,
}

impl ToolInvocation {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn flag(self, name: &str, value: impl Into<String>) -> Self {
        self.arg(name).arg(value)
    }

    pub fn command_line(&self) -> Vec<String> {
        std::iter::once(self.target.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
impl ToolInvocation {
    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// Value following `name`, if the flag is present.
    pub fn value_of(&self, name: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == name)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

/// Seam over the media download tool so flows can run against a scripted
/// stand-in.
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Runs to completion. Output lines are forwarded to `progress` as they
    /// arrive; a non-zero exit is an error.
    async fn run(&self, invocation: &ToolInvocation, progress: Option<&ProgressFeed>) -> Result<()>;

    /// Title of the media behind `target`, `None` if it cannot be resolved.
    async fn print_title(&self, target: &str) -> Option<String>;
}

/// Which invocation produced the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    Primary,
    Fallback(String),
    Direct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub success: bool,
    pub attempt: Option<Attempt>,
    /// Output path without extension; for playlists, the parent folder.
    pub output: PathBuf,
}

impl DownloadOutcome {
    pub fn succeeded(attempt: Attempt, output: PathBuf) -> Self {
        Self {
            success: true,
            attempt: Some(attempt),
            output,
        }
    }

    pub fn failed(output: PathBuf) -> Self {
        Self {
            success: false,
            attempt: None,
            output,
        }
    }
}

/// Per-item lifecycle, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Pending,
    Resolving,
    Downloading,
    FallbackAttempting,
    Succeeded,
    Failed,
}

impl ItemState {
    pub fn log(self, item: &str) {
        log::debug!("🔁 [ITEM] {} -> {:?}", item, self);
    }
}

/// Tally of a multi-item run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchResult {
    pub succeeded: usize,
    pub total: usize,
}

impl BatchResult {
    pub fn new(total: usize) -> Self {
        Self { succeeded: 0, total }
    }

    pub fn record(&mut self, success: bool) {
        if success {
            self.succeeded += 1;
        }
    }

    pub fn is_complete(&self) -> bool {
        self.succeeded == self.total
    }

    pub fn into_result(self) -> Result<BatchResult> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(AppError::PartialBatch {
                succeeded: self.succeeded,
                total: self.total,
            })
        }
    }
}

impl fmt::Display for BatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.succeeded, self.total)
    }
}
