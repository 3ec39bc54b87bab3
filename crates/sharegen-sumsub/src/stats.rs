//! Run-level statistics and reporting.
//!
//! The orchestrator fills one [`RunSummary`] per invocation. On a TTY it is
//! printed as a table, otherwise logged as a single line.

use std::time::Duration;

use comfy_table::{Attribute, Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use sharegen_core::progress::{fmt_duration, fmt_num};

/// Outcome counts of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Records the run set out to process (after checkpoint filtering)
    pub total: usize,
    pub succeeded: usize,
    /// Records that ended with a populated `error` column
    pub failed: usize,
    /// Records already terminal in the checkpoint (resume only)
    pub skipped: usize,
    /// Records left without an outcome by an abort or an interrupt
    pub not_attempted: usize,
    /// Authentication was rejected and the run stopped early
    pub aborted: bool,
    /// Reason given for the abort
    pub abort_reason: Option<String>,
    /// A shutdown signal stopped admission
    pub interrupted: bool,
    pub dry_run: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Records that reached a terminal outcome this run
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Format summary table as a string.
    pub fn format_table(&self) -> String {
        let mut table = Table::new();
        let title = if self.dry_run {
            "Share tokens (dry run)"
        } else {
            "Share tokens"
        };
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new(title).fg(Color::Cyan).add_attribute(Attribute::Bold),
                Cell::new("Records").fg(Color::Cyan),
                Cell::new("%").fg(Color::Cyan),
            ]);

        table.add_row(vec![
            Cell::new("Total"),
            Cell::new(fmt_num(self.total)),
            Cell::new(""),
        ]);
        let succeeded = if self.dry_run { "Planned" } else { "Succeeded" };
        table.add_row(vec![
            Cell::new(succeeded).fg(Color::Green),
            Cell::new(fmt_num(self.succeeded)).fg(Color::Green),
            Cell::new(format!("{:.1}", pct(self.succeeded, self.total))).fg(Color::Green),
        ]);
        let failed_color = if self.failed > 0 { Color::Red } else { Color::Reset };
        table.add_row(vec![
            Cell::new("Failed").fg(failed_color),
            Cell::new(fmt_num(self.failed)).fg(failed_color),
            Cell::new(format!("{:.1}", pct(self.failed, self.total))).fg(failed_color),
        ]);
        if self.skipped > 0 {
            table.add_row(vec![
                Cell::new("Skipped (checkpoint)"),
                Cell::new(fmt_num(self.skipped)),
                Cell::new(""),
            ]);
        }
        if self.not_attempted > 0 {
            table.add_row(vec![
                Cell::new("Not attempted").fg(Color::Yellow),
                Cell::new(fmt_num(self.not_attempted)).fg(Color::Yellow),
                Cell::new(format!("{:.1}", pct(self.not_attempted, self.total)))
                    .fg(Color::Yellow),
            ]);
        }
        if self.aborted {
            let reason = self.abort_reason.as_deref().unwrap_or("authentication rejected");
            table.add_row(vec![
                Cell::new("Aborted").fg(Color::Red).add_attribute(Attribute::Bold),
                Cell::new(reason).fg(Color::Red),
                Cell::new(""),
            ]);
        }
        if self.interrupted {
            table.add_row(vec![
                Cell::new("Interrupted").fg(Color::Yellow),
                Cell::new("yes").fg(Color::Yellow),
                Cell::new(""),
            ]);
        }
        table.add_row(vec![
            Cell::new("Time"),
            Cell::new(fmt_duration(self.elapsed)),
            Cell::new(""),
        ]);

        format!("\n{table}")
    }

    /// Print summary table to stderr (TTY mode).
    pub fn print(&self) {
        eprintln!("{}", self.format_table());
    }

    /// Log minimal summary (non-TTY mode).
    pub fn log(&self) {
        log::info!(
            "{}: {} total, {} succeeded, {} failed, {} skipped, {} not attempted [{}]",
            if self.dry_run { "Dry run complete" } else { "Run complete" },
            fmt_num(self.total),
            fmt_num(self.succeeded),
            fmt_num(self.failed),
            fmt_num(self.skipped),
            fmt_num(self.not_attempted),
            fmt_duration(self.elapsed),
        );
        if self.aborted {
            log::error!(
                "Run aborted: {}",
                self.abort_reason.as_deref().unwrap_or("authentication rejected")
            );
        }
        if self.interrupted {
            log::warn!("Run interrupted before all records were processed");
        }
    }
}

fn pct(part: usize, total: usize) -> f64 {
    if total > 0 {
        part as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processed_counts_terminal_outcomes() {
        let s = RunSummary {
            total: 5,
            succeeded: 2,
            failed: 1,
            not_attempted: 2,
            aborted: true,
            ..Default::default()
        };
        assert_eq!(s.processed(), 3);
    }

    #[test]
    fn pct_handles_zero_total() {
        assert_eq!(pct(0, 0), 0.0);
        assert_eq!(pct(1, 4), 25.0);
    }

    #[test]
    fn table_mentions_abort_reason() {
        let s = RunSummary {
            total: 2,
            succeeded: 1,
            not_attempted: 1,
            aborted: true,
            abort_reason: Some("HTTP 401".to_string()),
            ..Default::default()
        };
        let table = s.format_table();
        assert!(table.contains("Aborted"));
        assert!(table.contains("HTTP 401"));
        assert!(table.contains("Not attempted"));
    }

    #[test]
    fn table_labels_dry_run() {
        let s = RunSummary {
            total: 3,
            succeeded: 3,
            dry_run: true,
            ..Default::default()
        };
        let table = s.format_table();
        assert!(table.contains("dry run"));
        assert!(table.contains("Planned"));
        assert!(!table.contains("Skipped"));
    }
}
