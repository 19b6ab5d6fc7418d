use crate::model::{is_valid_job_name, FlatState, PullConfig, Step};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Diagnostic
// ---------------------------------------------------------------------------

/// One advisory finding, addressed by a path into the state
/// (e.g. `jobs[0].steps[1].config.http_url`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Validation never blocks a write; it only annotates a state snapshot.
pub trait Validator: Send + Sync {
    fn validate(&self, state: &FlatState) -> Result<(), Vec<Diagnostic>>;
}

// ---------------------------------------------------------------------------
// RuleValidator
// ---------------------------------------------------------------------------

/// Built-in rules for Flat workflows. Diagnostics come out in document order.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleValidator;

impl Validator for RuleValidator {
    fn validate(&self, state: &FlatState) -> Result<(), Vec<Diagnostic>> {
        let mut out = Vec::new();
        check_triggers(state, &mut out);
        check_jobs(state, &mut out);
        if out.is_empty() {
            Ok(())
        } else {
            Err(out)
        }
    }
}

fn check_triggers(state: &FlatState, out: &mut Vec<Diagnostic>) {
    let on = &state.on;
    if !on.workflow_dispatch && on.push.is_none() && on.schedule.is_none() {
        out.push(Diagnostic::new(
            "on",
            "no trigger is enabled; the workflow can never run",
        ));
    }
    if let Some(push) = &on.push {
        if push.branches.iter().any(|b| b.trim().is_empty()) {
            out.push(Diagnostic::new("on.push.branches", "branch names must not be empty"));
        }
    }
    if let Some(schedule) = &on.schedule {
        if let Err(msg) = validate_cron(&schedule.cron) {
            out.push(Diagnostic::new("on.schedule.cron", msg));
        }
    }
}

fn check_jobs(state: &FlatState, out: &mut Vec<Diagnostic>) {
    let mut seen = HashSet::new();
    for (i, job) in state.jobs.iter().enumerate() {
        let path = format!("jobs[{i}]");
        if !is_valid_job_name(&job.name) {
            out.push(Diagnostic::new(
                format!("{path}.name"),
                format!(
                    "'{}' is not a valid job name: use letters, digits, '-' or '_', starting with a letter or '_'",
                    job.name
                ),
            ));
        }
        if !seen.insert(job.name.as_str()) {
            out.push(Diagnostic::new(
                format!("{path}.name"),
                format!("duplicate job name '{}'", job.name),
            ));
        }
        for (j, step) in job.steps.iter().enumerate() {
            if let Step::Pull { config } = step {
                check_pull(&format!("{path}.steps[{j}].config"), config, out);
            }
        }
    }
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^https?://[^\s/$.?#][^\s]*$").unwrap())
}

fn check_pull(path: &str, config: &PullConfig, out: &mut Vec<Diagnostic>) {
    let (outfile, postprocessing) = match config {
        PullConfig::Http {
            http_url,
            outfile_basename,
            postprocessing,
        } => {
            if !url_re().is_match(http_url.trim()) {
                out.push(Diagnostic::new(
                    format!("{path}.http_url"),
                    "must be an http(s) URL",
                ));
            }
            (outfile_basename, postprocessing)
        }
        PullConfig::Sql {
            sql_connstring,
            sql_queryfile,
            outfile_basename,
            postprocessing,
            ..
        } => {
            if sql_connstring.trim().is_empty() {
                out.push(Diagnostic::new(
                    format!("{path}.sql_connstring"),
                    "connection string is required",
                ));
            }
            if sql_queryfile.trim().is_empty() {
                out.push(Diagnostic::new(
                    format!("{path}.sql_queryfile"),
                    "query file is required",
                ));
            }
            (outfile_basename, postprocessing)
        }
    };
    if let Some(name) = outfile {
        if name.trim().is_empty() || name.contains('/') || name.contains('\\') {
            out.push(Diagnostic::new(
                format!("{path}.outfile_basename"),
                "must be a non-empty file name without directories",
            ));
        }
    }
    if let Some(script) = postprocessing {
        if script.trim().is_empty() {
            out.push(Diagnostic::new(
                format!("{path}.postprocessing"),
                "postprocessing path must not be empty",
            ));
        }
    }
}

// ---------------------------------------------------------------------------
// Cron
// ---------------------------------------------------------------------------

const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const WEEKDAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

struct CronField {
    label: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
}

const CRON_FIELDS: [CronField; 5] = [
    CronField { label: "minute", min: 0, max: 59, names: &[] },
    CronField { label: "hour", min: 0, max: 23, names: &[] },
    CronField { label: "day of month", min: 1, max: 31, names: &[] },
    CronField { label: "month", min: 1, max: 12, names: &MONTHS },
    CronField { label: "day of week", min: 0, max: 6, names: &WEEKDAYS },
];

/// Check a five-field POSIX cron expression as accepted by GitHub schedules.
pub fn validate_cron(expr: &str) -> Result<(), String> {
    let parts: Vec<&str> = expr.split_whitespace().collect();
    if parts.len() != CRON_FIELDS.len() {
        return Err(format!(
            "cron expression needs 5 fields (minute hour day-of-month month day-of-week), got {}",
            parts.len()
        ));
    }
    for (part, field) in parts.iter().zip(CRON_FIELDS.iter()) {
        for item in part.split(',') {
            check_cron_item(item, field)
                .map_err(|e| format!("invalid {} '{}': {e}", field.label, part))?;
        }
    }
    Ok(())
}

fn check_cron_item(item: &str, field: &CronField) -> Result<(), String> {
    let (range, step) = match item.split_once('/') {
        Some((r, s)) => (r, Some(s)),
        None => (item, None),
    };
    if let Some(step) = step {
        match step.parse::<u32>() {
            Ok(n) if n > 0 => {}
            _ => return Err(format!("step '{step}' must be a positive number")),
        }
    }
    if range == "*" {
        return Ok(());
    }
    let (lo, hi) = match range.split_once('-') {
        Some((a, b)) => (cron_value(a, field)?, cron_value(b, field)?),
        None => {
            let v = cron_value(range, field)?;
            (v, v)
        }
    };
    if lo > hi {
        return Err(format!("range start {lo} is after end {hi}"));
    }
    Ok(())
}

fn cron_value(s: &str, field: &CronField) -> Result<u32, String> {
    if let Some(pos) = field
        .names
        .iter()
        .position(|n| n.eq_ignore_ascii_case(s))
    {
        return Ok(field.min + pos as u32);
    }
    let v: u32 = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    if v < field.min || v > field.max {
        return Err(format!("{v} is outside {}-{}", field.min, field.max));
    }
    Ok(v)
}

// ---------------------------------------------------------------------------
// Asynchronous runs
// ---------------------------------------------------------------------------

/// Result of validating the state at one store revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub revision: u64,
    pub diagnostics: Vec<Diagnostic>,
}

/// Launches validations in the background and reports back on a queue.
/// Reports arrive in completion order; the store drops any whose revision is
/// no longer current.
#[derive(Clone)]
pub struct ValidationRunner {
    validator: Arc<dyn Validator>,
    tx: mpsc::UnboundedSender<ValidationReport>,
}

impl ValidationRunner {
    pub fn new(
        validator: Arc<dyn Validator>,
    ) -> (Self, mpsc::UnboundedReceiver<ValidationReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { validator, tx }, rx)
    }

    pub fn launch(&self, state: FlatState, revision: u64) {
        let validator = Arc::clone(&self.validator);
        let tx = self.tx.clone();
        let run = move || {
            let diagnostics = validator.validate(&state).err().unwrap_or_default();
            let _ = tx.send(ValidationReport {
                revision,
                diagnostics,
            });
        };
        // Outside a runtime (plain unit tests) validate inline.
        if tokio::runtime::Handle::try_current().is_ok() {
            tokio::spawn(async move { run() });
        } else {
            run();
        }
    }
}
