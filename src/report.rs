//! Rendering of probe results.
//!
//! Verbose and script lines are written as soon as a result arrives; the
//! JSON and table formats need every result first and are written by
//! [`Reporter::finish`], sorted by server name.

use std::io::{self, Write};

use chrono::{DateTime, Duration, Utc};
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use serde::Serialize;
use strum_macros::{Display, EnumString};

use crate::{Outcome, ProbeResult};

/// Date printed in script mode when there is no expiry to report.
pub const SENTINEL_DATE: &str = "1970-01-01";
const DATE_FORMAT: &str = "%Y-%m-%d";
const LINE_WIDTH: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OutputFormat {
    /// Pipe-separated human readable lines with a header
    #[default]
    Verbose,
    /// `valid`/`error` tokens and ISO dates, one line per server
    Script,
    /// A JSON array of results
    Json,
    /// A table of results
    Table,
}

/// Outcome counts of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub valid: usize,
    pub verification_failed: usize,
    pub connection_failed: usize,
}

impl Summary {
    pub fn add(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Valid { .. } => self.valid += 1,
            Outcome::VerificationFailed { .. } => self.verification_failed += 1,
            Outcome::ConnectionFailed { .. } => self.connection_failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.valid + self.verification_failed + self.connection_failed
    }

    pub fn all_valid(&self) -> bool {
        self.valid == self.total()
    }
}

/// Single consumer of probe results.
pub struct Reporter<W: Write> {
    out: W,
    format: OutputFormat,
    width: usize,
    now: DateTime<Utc>,
    pending: Vec<ProbeResult>,
    summary: Summary,
}

impl<W: Write> Reporter<W> {
    /// `width` is the server column width, usually
    /// [`names::column_width`](crate::names::column_width) of the input.
    pub fn new(out: W, format: OutputFormat, width: usize) -> Self {
        Reporter {
            out,
            format,
            width,
            now: Utc::now(),
            pending: Vec::new(),
            summary: Summary::default(),
        }
    }

    /// Reference instant for relative dates.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Writes the column header. Only the verbose format has one.
    pub fn begin(&mut self) -> io::Result<()> {
        if self.format != OutputFormat::Verbose {
            return Ok(());
        }
        let width = self.width;
        writeln!(self.out, "{:>width$} | Certificate status", "Server")?;
        writeln!(
            self.out,
            "{}-+-{}",
            "-".repeat(width),
            "-".repeat(LINE_WIDTH.saturating_sub(width + 2))
        )
    }

    pub fn record(&mut self, result: ProbeResult) -> io::Result<()> {
        self.summary.add(&result.outcome);
        match format_line(&result, self.format, self.width, self.now) {
            Some(line) => {
                writeln!(self.out, "{}", line)?;
                self.out.flush()
            }
            None => {
                self.pending.push(result);
                Ok(())
            }
        }
    }

    pub fn summary(&self) -> Summary {
        self.summary
    }

    /// Writes buffered formats and hands back the writer with the run summary.
    pub fn finish(mut self) -> io::Result<(W, Summary)> {
        self.pending.sort_by(|a, b| a.server.cmp(&b.server));
        match self.format {
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut self.out, &self.pending)?;
                writeln!(self.out)?;
            }
            OutputFormat::Table => {
                let table = render_table(&self.pending, self.now);
                writeln!(self.out, "{}", table)?;
            }
            OutputFormat::Verbose | OutputFormat::Script => {}
        }
        self.out.flush()?;
        Ok((self.out, self.summary))
    }
}

/// Renders one streamed line, or `None` for formats that are written at the
/// end of the run.
pub fn format_line(
    result: &ProbeResult,
    format: OutputFormat,
    width: usize,
    now: DateTime<Utc>,
) -> Option<String> {
    let server = &result.server;
    let line = match (format, &result.outcome) {
        (OutputFormat::Verbose, Outcome::Valid { not_after }) => format!(
            "{:>width$} | valid, expires on {} ({})",
            server,
            not_after.format(DATE_FORMAT),
            relative(*not_after, now)
        ),
        (OutputFormat::Verbose, Outcome::VerificationFailed { reason })
        | (OutputFormat::Verbose, Outcome::ConnectionFailed { reason }) => {
            format!("{:>width$} | {}", server, reason)
        }
        (OutputFormat::Script, Outcome::Valid { not_after }) => {
            format!("{:>width$} valid {}", server, not_after.format(DATE_FORMAT))
        }
        (OutputFormat::Script, Outcome::VerificationFailed { reason })
        | (OutputFormat::Script, Outcome::ConnectionFailed { reason }) => {
            format!("{:>width$} error {} ({})", server, SENTINEL_DATE, reason)
        }
        (OutputFormat::Json, _) | (OutputFormat::Table, _) => return None,
    };
    Some(line)
}

fn render_table(results: &[ProbeResult], now: DateTime<Utc>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Server", "Status", "Expires", "Details"]);
    for result in results {
        let row = match &result.outcome {
            Outcome::Valid { not_after } => vec![
                result.server.clone(),
                "valid".to_string(),
                not_after.format(DATE_FORMAT).to_string(),
                relative(*not_after, now),
            ],
            Outcome::VerificationFailed { reason } => vec![
                result.server.clone(),
                "invalid".to_string(),
                String::new(),
                reason.clone(),
            ],
            Outcome::ConnectionFailed { reason } => vec![
                result.server.clone(),
                "error".to_string(),
                String::new(),
                reason.clone(),
            ],
        };
        table.add_row(row);
    }
    table
}

/// Human readable distance between `then` and `now`, e.g. `3 days ago` or
/// `2 years from now`.
pub fn relative(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = then - now;
    let (span, suffix) = if delta < Duration::zero() {
        (-delta, "ago")
    } else {
        (delta, "from now")
    };

    let seconds = span.num_seconds();
    let days = span.num_days();
    let amount = match seconds {
        0 => return "now".to_string(),
        1 => "1 second".to_string(),
        s if s < 60 => format!("{} seconds", s),
        s if s < 120 => "1 minute".to_string(),
        s if s < 3_600 => format!("{} minutes", s / 60),
        s if s < 7_200 => "1 hour".to_string(),
        s if s < 86_400 => format!("{} hours", s / 3_600),
        _ => match days {
            1 => "1 day".to_string(),
            d if d < 7 => format!("{} days", d),
            d if d < 14 => "1 week".to_string(),
            d if d < 30 => format!("{} weeks", d / 7),
            d if d < 60 => "1 month".to_string(),
            d if d < 365 => format!("{} months", d / 30),
            d if d < 548 => "1 year".to_string(),
            d if d < 730 => "2 years".to_string(),
            d => format!("{} years", d / 365),
        },
    };
    format!("{} {}", amount, suffix)
}
