//! Text output formatting with colors.

use chrono::{DateTime, Local, Utc};
use dashguard_core::SourceRecord;
use dashguard_store::{CookieStatus, Severity};

use super::json::{OutcomeOutput, StatusReport};

// ============================================================================
// ANSI Colors
// ============================================================================

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";

/// Widest name shown in the records table.
const NAME_WIDTH: usize = 32;

/// Text formatter with optional colors.
pub struct TextFormatter {
    use_colors: bool,
}

impl TextFormatter {
    /// Creates a new text formatter.
    pub fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }

    /// Formats normalized records as a table, highest revenue first.
    pub fn format_records(&self, records: &[SourceRecord]) -> String {
        if records.is_empty() {
            return self.dim("No records");
        }

        let mut sorted: Vec<&SourceRecord> = records.iter().collect();
        sorted.sort_by(|a, b| b.revenue.total_cmp(&a.revenue));

        let mut lines = Vec::with_capacity(sorted.len() + 3);
        lines.push(self.bold(&format!(
            "{:<width$} {:>12} {:>10} {:>10}",
            "Ad set",
            "Revenue",
            "EPL",
            "EPC",
            width = NAME_WIDTH
        )));
        lines.push("─".repeat(NAME_WIDTH + 35));

        for record in &sorted {
            lines.push(format!(
                "{:<width$} {:>12.2} {:>10.2} {:>10.2}",
                truncate(&record.adset_name, NAME_WIDTH),
                record.revenue,
                record.epl,
                record.epc,
                width = NAME_WIDTH
            ));
        }

        let total: f64 = records.iter().map(|r| r.revenue).sum();
        lines.push(format!(
            "{} {:>12.2}",
            self.bold(&format!("{:<width$}", format!("Total ({})", records.len()), width = NAME_WIDTH)),
            total
        ));

        lines.join("\n")
    }

    /// Formats the tier report of one acquisition.
    pub fn format_outcome(&self, outcome: &OutcomeOutput) -> String {
        let mut lines = Vec::new();

        let headline = match &outcome.tier {
            Some(tier) => self.green(&format!("✓ Acquired via {tier}")),
            None => self.red("✗ All tiers failed"),
        };
        let mut header = format!("{headline} {}", self.dim(&format!("({} ms)", outcome.duration_ms)));
        if outcome.defensive {
            header.push_str(&format!(" {}", self.yellow("[defensive]")));
        }
        lines.push(header);

        for attempt in &outcome.attempts {
            let mark = if attempt.success { self.green("✓") } else { self.dim("·") };
            let detail = match (&attempt.kind, &attempt.error) {
                (Some(kind), Some(error)) => self.red(&format!("{kind}: {error}")),
                (None, Some(reason)) => self.dim(reason),
                _ => String::new(),
            };
            lines.push(format!("  {mark} {:<14} {detail}", attempt.tier));
        }

        lines.join("\n")
    }

    /// Formats the status report.
    pub fn format_status(&self, report: &StatusReport) -> String {
        let mut lines = Vec::new();
        let d = &report.detection;

        lines.push(self.bold("Detection"));
        let mode = if d.defensive {
            self.red("DEFENSIVE")
        } else {
            self.green("NORMAL")
        };
        lines.push(format!("  Mode:                 {mode}"));
        if let Some(until) = d.defensive_until.filter(|_| d.defensive) {
            lines.push(format!("  Defensive until:      {}", format_time(until)));
        }
        lines.push(format!("  Requests:             {}", d.total_requests));
        lines.push(format!("  Success rate:         {:.2}%", d.success_rate));
        lines.push(format!("  Consecutive failures: {}", d.consecutive_failures));
        lines.push(format!("  Last success:         {}", format_opt_time(d.last_success)));
        lines.push(format!("  Last failure:         {}", format_opt_time(d.last_failure)));

        let p = &report.pattern;
        lines.push(String::new());
        lines.push(self.bold("Failure pattern (last hour)"));
        lines.push(format!(
            "  Pattern:  {} ({})",
            p.pattern,
            self.color_for_severity(p.severity, &p.severity.to_string())
        ));
        lines.push(format!("  Failures: {}", p.total));
        if let Some(kind) = p.dominant {
            lines.push(format!("  Dominant: {kind} ({:.0}%)", p.dominant_share * 100.0));
        }
        lines.push(format!("  Action:   {}", self.cyan(p.recommendation)));

        let c = &report.cache;
        lines.push(String::new());
        lines.push(self.bold("Cache"));
        lines.push(format!(
            "  Entries:  {} valid, {} expired ({} bytes)",
            c.valid_entries, c.expired_entries, c.total_size_bytes
        ));

        lines.push(String::new());
        lines.push(self.bold("Cookies"));
        let status = match report.cookies.status {
            CookieStatus::Valid => self.green("valid"),
            CookieStatus::Missing => self.dim("missing"),
            CookieStatus::Expired => self.yellow("expired"),
            CookieStatus::Empty => self.yellow("empty"),
            CookieStatus::Corrupt => self.red("corrupt"),
        };
        lines.push(format!("  Status:   {status}"));
        if let Some(info) = &report.cookies.info {
            lines.push(format!("  Count:    {}", info.count));
            lines.push(format!("  Saved:    {} ({:.1} h ago)", format_time(info.saved_at), info.age_hours));
            if info.is_valid {
                lines.push(format!("  Expires:  in {:.1} h", info.expires_in_hours));
            }
        }

        lines.join("\n")
    }

    // ========================================================================
    // Color helpers
    // ========================================================================

    fn color_for_severity(&self, severity: Severity, text: &str) -> String {
        match severity {
            Severity::Low => self.green(text),
            Severity::Medium => self.yellow(text),
            Severity::High | Severity::Critical => self.red(text),
        }
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.use_colors {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn bold(&self, text: &str) -> String {
        self.paint(BOLD, text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint(DIM, text)
    }

    fn green(&self, text: &str) -> String {
        self.paint(GREEN, text)
    }

    fn yellow(&self, text: &str) -> String {
        self.paint(YELLOW, text)
    }

    fn red(&self, text: &str) -> String {
        self.paint(RED, text)
    }

    fn cyan(&self, text: &str) -> String {
        self.paint(CYAN, text)
    }
}

/// Shortens `text` to `width` characters, marking the cut.
pub(crate) fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
        cut.push('…');
        cut
    }
}

fn format_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn format_opt_time(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(|| "never".to_string(), format_time)
}

