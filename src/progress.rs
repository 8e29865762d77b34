//! Byte progress display for the initiator
//!
//! One bar per transfer, drawn on stderr so stdout keeps the plain result
//! lines.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::protocol::timeouts::PROGRESS_TICK_MS;

#[derive(Clone)]
pub struct TransferProgress {
    bar: ProgressBar,
    start_time: Instant,
}

impl TransferProgress {
    /// A visible bar for `total` bytes labelled with `label`.
    pub fn new(label: &str, total: u64) -> Self {
        let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr());
        bar.set_style(
            ProgressStyle::default_bar()
                .template("  {msg} [{bar:30.green}] {bytes}/{total_bytes} ({bytes_per_sec})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_message(label.to_string());
        bar.enable_steady_tick(Duration::from_millis(PROGRESS_TICK_MS));
        Self {
            bar,
            start_time: Instant::now(),
        }
    }

    /// A bar that counts but never draws.
    pub fn hidden(total: u64) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_length(total);
        Self {
            bar,
            start_time: Instant::now(),
        }
    }

    /// Visible bar when `enabled`, hidden otherwise.
    pub fn for_transfer(enabled: bool, label: &str, total: u64) -> Self {
        if enabled {
            Self::new(label, total)
        } else {
            Self::hidden(total)
        }
    }

    pub fn inc(&self, bytes: u64) {
        self.bar.inc(bytes);
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Finish with success message
    pub fn finish_success(&self, bytes: u64) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let throughput = if elapsed > 0.0 {
            bytes as f64 / elapsed / 1_048_576.0
        } else {
            0.0
        };
        self.bar.finish_with_message(format!(
            "done {} bytes in {:.1}s ({:.1} MB/s)",
            bytes, elapsed, throughput
        ));
    }

    /// Finish with error
    pub fn finish_error(&self, msg: &str) {
        self.bar.abandon_with_message(format!("failed: {}", msg));
    }
}
