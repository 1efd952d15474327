//! Tiling progress: what the tiler reports and how the converter draws it.

use std::io::Write;
use std::sync::atomic::{AtomicI16, Ordering};
use std::time::{Duration, Instant};

const BAR_WIDTH: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileProgress {
    pub percent: u8,
    pub elapsed: Duration,
    /// `None` until at least one unit of work is done.
    pub remaining: Option<Duration>,
}

/// Counts finished units of work against a known total.
#[derive(Debug)]
pub struct ProgressTracker {
    total: u64,
    done: u64,
    started: Instant,
}

impl ProgressTracker {
    pub fn new(total: u64) -> Self {
        Self {
            total: total.max(1),
            done: 0,
            started: Instant::now(),
        }
    }

    pub fn advance(&mut self) -> TileProgress {
        self.done = (self.done + 1).min(self.total);
        self.snapshot_at(self.started.elapsed())
    }

    fn snapshot_at(&self, elapsed: Duration) -> TileProgress {
        let percent = (self.done * 100 / self.total) as u8;
        let remaining = (self.done > 0).then(|| {
            let per_unit = elapsed.as_secs_f64() / self.done as f64;
            Duration::from_secs_f64(per_unit * (self.total - self.done) as f64)
        });
        TileProgress {
            percent,
            elapsed,
            remaining,
        }
    }
}

/// `[████░░░░]  42% | 1.3s elapsed | 2s remaining`
pub fn render_bar(progress: &TileProgress) -> String {
    let filled = BAR_WIDTH * progress.percent.min(100) as usize / 100;
    let bar = format!("{}{}", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled));
    let remaining = match progress.remaining {
        Some(eta) if progress.percent < 100 => format!("{:.0}s", eta.as_secs_f64()),
        Some(_) => "0s".to_string(),
        None => "calculating...".to_string(),
    };
    format!(
        "[{bar}] {:3}% | {:.1}s elapsed | {remaining} remaining",
        progress.percent,
        progress.elapsed.as_secs_f64()
    )
}

/// Redraws the bar in place on stderr, only when the percentage moves.
pub struct TerminalProgress {
    last_percent: AtomicI16,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self {
            last_percent: AtomicI16::new(-1),
        }
    }

    pub fn draw(&self, progress: TileProgress) {
        let percent = i16::from(progress.percent);
        if self.last_percent.swap(percent, Ordering::Relaxed) == percent {
            return;
        }
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r{}", render_bar(&progress));
        let _ = stderr.flush();
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}
