use std::time::Duration;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use lazy_static::lazy_static;
use regex::Regex;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const RENDER_INTERVAL: Duration = Duration::from_millis(150);
const SPINNER_FRAMES: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ";
const LABEL_CHARS: usize = 40;
const PROGRESS_MARKER: &str = "[download]";

lazy_static! {
    static ref PERCENT: Regex = Regex::new(r"(\d+(?:\.\d+)?)%").unwrap();
}

/// Percentage reported on a yt-dlp `[download]` line, if any.
pub fn parse_percent(line: &str) -> Option<f32> {
    if !line.contains(PROGRESS_MARKER) {
        return None;
    }
    PERCENT.captures(line).and_then(|caps| caps[1].parse().ok())
}

/// Write side of the single-slot progress channel; only the latest value
/// is kept.
pub struct ProgressFeed {
    tx: watch::Sender<f32>,
}

impl ProgressFeed {
    pub fn observe(&self, line: &str) {
        if let Some(percent) = parse_percent(line) {
            self.tx.send_replace(percent.clamp(0.0, 100.0));
        }
    }

    pub fn latest(&self) -> f32 {
        *self.tx.borrow()
    }
}

/// Live spinner for one tool run.
///
/// The read loop pushes output lines into [`ProgressFeed`] whenever they
/// arrive; a separate task redraws the spinner on a fixed cadence until it
/// is stopped or 100% is seen, then clears the line.
pub struct ProgressReporter {
    feed: ProgressFeed,
    stop_tx: oneshot::Sender<()>,
    render: JoinHandle<()>,
}

impl ProgressReporter {
    pub fn start(label: &str) -> Self {
        Self::with_target(label, ProgressDrawTarget::stderr())
    }

    pub fn with_target(label: &str, target: ProgressDrawTarget) -> Self {
        let (tx, rx) = watch::channel(0.0_f32);
        let (stop_tx, stop_rx) = oneshot::channel();
        let label: String = label.chars().take(LABEL_CHARS).collect();

        let bar = ProgressBar::with_draw_target(None, target);
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars(SPINNER_FRAMES),
        );

        let render = tokio::spawn(render_loop(bar, label, rx, stop_rx));

        Self {
            feed: ProgressFeed { tx },
            stop_tx,
            render,
        }
    }

    pub fn feed(&self) -> &ProgressFeed {
        &self.feed
    }

    /// Signals the render task and waits for it to clear the line.
    pub async fn stop(self) {
        log::debug!("progress stopped at {:.0}%", self.feed.latest());
        let ProgressReporter { stop_tx, render, .. } = self;
        let _ = stop_tx.send(());
        if let Err(e) = render.await {
            log::debug!("progress render task ended abnormally: {}", e);
        }
    }
}

async fn render_loop(
    bar: ProgressBar,
    label: String,
    rx: watch::Receiver<f32>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(RENDER_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            _ = ticker.tick() => {
                let percent = *rx.borrow();
                bar.set_message(format!("{:3.0}%  {}", percent, label));
                bar.tick();
                if percent >= 100.0 {
                    break;
                }
            }
        }
    }

    bar.finish_and_clear();
}
