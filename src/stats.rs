//! Run counters and the end-of-run summary.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::record::LookupOutcome;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub total_processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub empty_responses: usize,
    /// Throttled responses seen, counted per response rather than per key
    pub rate_limited: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// (key, message) for every failed lookup, in completion order
    pub errors: Vec<(String, String)>,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one terminal outcome.
    pub fn record(&mut self, outcome: &LookupOutcome) {
        self.total_processed += 1;
        match outcome {
            LookupOutcome::Success(_) => self.successful += 1,
            LookupOutcome::Empty(_) => self.empty_responses += 1,
            LookupOutcome::Failed { record, message } => {
                self.failed += 1;
                self.errors.push((record.email.clone(), message.clone()));
            }
        }
    }

    pub fn record_rate_limited(&mut self) {
        self.rate_limited += 1;
    }

    pub fn mark_started(&mut self) {
        self.started_at = Some(Utc::now());
        self.finished_at = None;
    }

    pub fn mark_finished(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Elapsed run time, defined only once both ends are stamped.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// `successful + failed + empty_responses == total_processed`
    pub fn is_consistent(&self) -> bool {
        self.successful + self.failed + self.empty_responses == self.total_processed
    }

    /// Human-readable summary table, followed by an error table when any
    /// lookups failed.
    pub fn render(&self) -> String {
        let mut rows = vec![
            ("Total Processed".to_string(), self.total_processed.to_string()),
            ("Successful".to_string(), self.successful.to_string()),
            ("Failed".to_string(), self.failed.to_string()),
            ("Empty Responses".to_string(), self.empty_responses.to_string()),
            ("Rate Limited".to_string(), self.rate_limited.to_string()),
        ];
        if let Some(duration) = self.duration() {
            rows.push(("Duration".to_string(), format_duration(duration)));
        }

        let mut out = render_table("Extraction Summary", ("Metric", "Value"), &rows);

        if !self.errors.is_empty() {
            out.push('\n');
            out.push_str(&render_table("Errors", ("Email", "Error"), &self.errors));
        }
        out
    }
}

/// `H:MM:SS`, sub-second part dropped.
fn format_duration(duration: chrono::Duration) -> String {
    let secs = duration.num_seconds().max(0);
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn render_table(title: &str, headers: (&str, &str), rows: &[(String, String)]) -> String {
    let left = rows
        .iter()
        .map(|(l, _)| l.chars().count())
        .chain(std::iter::once(headers.0.len()))
        .max()
        .unwrap_or(0);
    let right = rows
        .iter()
        .map(|(_, r)| r.chars().count())
        .chain(std::iter::once(headers.1.len()))
        .max()
        .unwrap_or(0);

    let rule = format!("+-{}-+-{}-+\n", "-".repeat(left), "-".repeat(right));
    let mut out = String::new();
    out.push_str(title);
    out.push('\n');
    out.push_str(&rule);
    out.push_str(&format!(
        "| {:<left$} | {:<right$} |\n",
        headers.0, headers.1
    ));
    out.push_str(&rule);
    for (l, r) in rows {
        out.push_str(&format!("| {:<left$} | {:<right$} |\n", l, r));
    }
    out.push_str(&rule);
    out
}
