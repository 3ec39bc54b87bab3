//! Progress reporting for TTY and non-TTY environments.
//!
//! TTY mode: one indicatif bar for the record stream.
//! Non-TTY mode: a throttled log line with counts, rate and ETA.

use std::io::IsTerminal;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Minimum spacing between non-TTY progress lines
pub const LOG_INTERVAL: Duration = Duration::from_secs(5);

fn record_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:<10.cyan.bold} {bar:30.green/dim} {pos:>7}/{len:7} {per_sec:>9} {eta:>4} {wide_msg:.dim}")
        .expect("invalid template")
        .progress_chars("--")
}

/// Central progress context owning the `MultiProgress`.
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Create new context, detecting TTY automatically.
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty: std::io::stderr().is_terminal(),
        }
    }

    /// Context that never draws bars (tests, library callers)
    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty: false,
        }
    }

    /// Create the tracker for a run over `total` records.
    pub fn records(&self, label: &str, total: usize) -> RecordProgress {
        let bar = if self.is_tty {
            let pb = self.multi.add(ProgressBar::new(total as u64));
            pb.set_style(record_style());
            pb.set_prefix(label.to_string());
            Some(pb)
        } else {
            None
        };
        RecordProgress {
            bar,
            total,
            started: Instant::now(),
            last_log: Mutex::new(Instant::now()),
        }
    }

    /// Print a line above managed progress bars.
    pub fn println(&self, msg: impl AsRef<str>) {
        if self.is_tty {
            let _ = self.multi.println(msg);
        } else {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// Get reference to `MultiProgress` for log bridge.
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for `ProgressContext`.
pub type SharedProgress = Arc<ProgressContext>;

/// Running counts shown by [`RecordProgress`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub done: usize,
    pub ok: usize,
    pub failed: usize,
}

/// Progress over the record stream of one run.
pub struct RecordProgress {
    bar: Option<ProgressBar>,
    total: usize,
    started: Instant,
    last_log: Mutex<Instant>,
}

impl RecordProgress {
    /// Record one finished record.
    pub fn update(&self, tally: Tally) {
        if let Some(pb) = &self.bar {
            pb.set_position(tally.done as u64);
            pb.set_message(format!("ok:{} fail:{}", tally.ok, tally.failed));
            return;
        }
        let now = Instant::now();
        {
            let mut last = self.last_log.lock().unwrap_or_else(PoisonError::into_inner);
            if now.duration_since(*last) < LOG_INTERVAL && tally.done < self.total {
                return;
            }
            *last = now;
        }
        self.log_line(tally, now.duration_since(self.started));
    }

    fn log_line(&self, tally: Tally, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 { tally.done as f64 / secs } else { 0.0 };
        let remaining = self.total.saturating_sub(tally.done);
        let eta = if rate > 0.0 {
            fmt_duration(Duration::from_secs_f64(remaining as f64 / rate))
        } else {
            "calculating...".to_string()
        };
        let pct = if self.total > 0 {
            tally.done as f64 / self.total as f64 * 100.0
        } else {
            100.0
        };
        log::info!(
            "Progress: {}/{} ({pct:.1}%) | ok:{} fail:{} | Rate: {rate:.1}/s | ETA: {eta}",
            fmt_num(tally.done),
            fmt_num(self.total),
            tally.ok,
            tally.failed,
        );
    }

    pub fn finish(&self) {
        if let Some(pb) = &self.bar {
            pb.finish_and_clear();
        }
    }
}

/// Format number with thousand separators.
pub fn fmt_num(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Format a duration as `1h 2m 3s`, `2m 3s` or `3s` (rounded up).
pub fn fmt_duration(d: Duration) -> String {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    let (h, rem) = (secs / 3600, secs % 3600);
    let (m, s) = (rem / 60, rem % 60);
    if h > 0 {
        format!("{h}h {m}m {s}s")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}
