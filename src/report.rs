//! Outcome records and run totals.

use std::fmt;

use serde::Serialize;

use crate::builder::RequestBody;
use crate::scheduler::{ExecutionOutcome, Verdict};

/// Pass/fail counts over a run.
///
/// Contract violations (`failed`) are kept apart from requests that could
/// not be sent (`network_errors`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub attempts: usize,
    pub passed: usize,
    pub failed: usize,
    pub network_errors: usize,
    pub postponed: usize,
    pub dry_run: usize,
}

impl Summary {
    pub fn record(&mut self, outcome: &ExecutionOutcome) {
        self.attempts += 1;
        match &outcome.verdict {
            Verdict::Passed => self.passed += 1,
            Verdict::Failed { reason } if !reason.request_sent() => self.network_errors += 1,
            Verdict::Failed { .. } | Verdict::RetryExhausted => self.failed += 1,
            Verdict::Postponed => self.postponed += 1,
            Verdict::DryRun => self.dry_run += 1,
        }
    }

    /// No contract violations and no unsent requests.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.network_errors == 0
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} passed, {} failed, {} not sent, {} postponed",
            self.passed, self.failed, self.network_errors, self.postponed
        )?;
        if self.dry_run > 0 {
            write!(f, ", {} dry run", self.dry_run)?;
        }
        write!(f, " ({} attempts)", self.attempts)
    }
}

/// One human-readable line per outcome.
pub fn format_outcome(outcome: &ExecutionOutcome) -> String {
    let status = outcome
        .status
        .map_or_else(|| "---".to_string(), |s| s.to_string());
    let target = format!("{} {}", outcome.method, outcome.url);

    match &outcome.verdict {
        Verdict::Passed => format!("PASSED    {status} {target}"),
        Verdict::Failed { reason } if !reason.request_sent() => {
            format!("ERROR     {status} {target}: {reason}")
        }
        Verdict::Failed { reason } => format!("FAILED    {status} {target}: {reason}"),
        Verdict::Postponed => format!("POSTPONED {status} {target}"),
        Verdict::RetryExhausted => format!("EXHAUSTED {status} {target}: still not found after retry"),
        Verdict::DryRun => {
            let mut line = format!("DRY-RUN   {target}");
            if let Some(request) = &outcome.request {
                let headers: Vec<String> = request
                    .headers
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect();
                line.push_str(&format!(" headers=[{}]", headers.join(", ")));
                match &request.body {
                    RequestBody::Empty => {}
                    RequestBody::Json(text) => line.push_str(&format!(" body={text}")),
                    RequestBody::Form(fields) => {
                        let fields: Vec<String> =
                            fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
                        line.push_str(&format!(" form=[{}]", fields.join(", ")));
                    }
                }
                for part in &request.files {
                    line.push_str(&format!(" file={}:{}", part.field, part.file.filename));
                }
            }
            line
        }
    }
}

/// Outcome as a single-line JSON record.
pub fn to_json_line(outcome: &ExecutionOutcome) -> Result<String, serde_json::Error> {
    serde_json::to_string(outcome)
}
