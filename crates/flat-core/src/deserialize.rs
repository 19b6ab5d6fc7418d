//! Workflow YAML to structured state.
//!
//! Never panics on malformed input. Structural problems come back as a
//! [`ParseFailure`]; steps this editor does not understand are kept as
//! [`Step::Opaque`] so writing the document back does not lose them.

use crate::config::default_runs_on;
use crate::model::{
    FlatState, Job, PullConfig, PushConfig, PushTrigger, Schedule, SqlFormat, Step, Triggers,
    DOCUMENT_NAME,
};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ParseFailure
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseFailure {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
}

impl ParseFailure {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            column: None,
        }
    }
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(col)) => write!(f, "{} (line {line}, column {col})", self.message),
            _ => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ParseFailure {}

impl From<serde_yaml::Error> for ParseFailure {
    fn from(e: serde_yaml::Error) -> Self {
        let location = e.location();
        Self {
            message: e.to_string(),
            line: location.as_ref().map(|l| l.line()),
            column: location.as_ref().map(|l| l.column()),
        }
    }
}

type Parsed<T> = std::result::Result<T, ParseFailure>;

// ---------------------------------------------------------------------------
// Action identifiers
// ---------------------------------------------------------------------------

/// Action id without the `@ref` suffix.
fn action_id(uses: &str) -> &str {
    uses.split('@').next().unwrap_or(uses).trim()
}

pub fn is_checkout_action(uses: &str) -> bool {
    action_id(uses) == "actions/checkout"
}

fn is_pull_action(uses: &str) -> bool {
    matches!(action_id(uses), "githubocto/flat" | "githubocto/flat-pull")
}

fn is_push_action(uses: &str) -> bool {
    action_id(uses) == "githubocto/flat-push"
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Parse document text. Empty text yields the stub state.
pub fn deserialize(text: &str) -> Parsed<FlatState> {
    if text.trim().is_empty() {
        return Ok(FlatState::stub());
    }
    let doc: Value = serde_yaml::from_str(text)?;
    from_document(&doc)
}

pub fn from_document(doc: &Value) -> Parsed<FlatState> {
    let root = match doc {
        Value::Null => return Ok(FlatState::stub()),
        Value::Mapping(m) => m,
        _ => return Err(ParseFailure::new("expected a mapping at the top level")),
    };

    let name = match root.get("name") {
        None | Some(Value::Null) => DOCUMENT_NAME.to_string(),
        Some(v) => scalar_string(v).ok_or_else(|| ParseFailure::new("name must be a string"))?,
    };

    let on = match root.get("on") {
        None | Some(Value::Null) => Triggers::default(),
        Some(v) => parse_triggers(v)?,
    };

    let jobs = match root.get("jobs") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Mapping(m)) => parse_jobs(m)?,
        Some(_) => return Err(ParseFailure::new("jobs must be a mapping of job name to job")),
    };

    Ok(FlatState { name, on, jobs })
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

fn parse_triggers(v: &Value) -> Parsed<Triggers> {
    let mut on = Triggers::default();
    match v {
        Value::String(event) => apply_event(&mut on, event, &Value::Null)?,
        Value::Sequence(events) => {
            for e in events {
                let event = e
                    .as_str()
                    .ok_or_else(|| ParseFailure::new("on: event list entries must be strings"))?;
                apply_event(&mut on, event, &Value::Null)?;
            }
        }
        Value::Mapping(m) => {
            for (k, body) in m {
                let event = k
                    .as_str()
                    .ok_or_else(|| ParseFailure::new("on: event names must be strings"))?;
                apply_event(&mut on, event, body)?;
            }
        }
        _ => return Err(ParseFailure::new("on must be an event name, list or mapping")),
    }
    Ok(on)
}

fn apply_event(on: &mut Triggers, event: &str, body: &Value) -> Parsed<()> {
    match event {
        "workflow_dispatch" => on.workflow_dispatch = true,
        "push" => on.push = Some(parse_push(body)?),
        "schedule" => on.schedule = parse_schedule(body)?,
        other => tracing::debug!(event = other, "ignoring unsupported trigger"),
    }
    Ok(())
}

fn parse_push(body: &Value) -> Parsed<PushTrigger> {
    let mut push = PushTrigger::default();
    let branches = match body {
        Value::Null => return Ok(push),
        Value::Mapping(m) => m.get("branches"),
        _ => return Err(ParseFailure::new("on.push must be null or a mapping")),
    };
    match branches {
        None | Some(Value::Null) => {}
        Some(Value::Sequence(items)) => {
            for item in items {
                let b = scalar_string(item)
                    .ok_or_else(|| ParseFailure::new("on.push.branches entries must be strings"))?;
                push.branches.insert(b);
            }
        }
        Some(v) => {
            let b = scalar_string(v)
                .ok_or_else(|| ParseFailure::new("on.push.branches must be a list of strings"))?;
            push.branches.insert(b);
        }
    }
    Ok(push)
}

fn parse_schedule(body: &Value) -> Parsed<Option<Schedule>> {
    let entry = match body {
        Value::Null => return Ok(None),
        Value::Sequence(items) => items.first(),
        Value::Mapping(_) => Some(body),
        _ => return Err(ParseFailure::new("on.schedule must be a list of {cron} entries")),
    };
    let Some(entry) = entry else {
        return Ok(None);
    };
    match entry.get("cron").and_then(scalar_string) {
        Some(cron) => Ok(Some(Schedule { cron })),
        None => Err(ParseFailure::new("on.schedule entry is missing a cron string")),
    }
}

// ---------------------------------------------------------------------------
// Jobs and steps
// ---------------------------------------------------------------------------

fn parse_jobs(m: &Mapping) -> Parsed<Vec<Job>> {
    let mut jobs = Vec::with_capacity(m.len());
    for (k, body) in m {
        let name = scalar_string(k).ok_or_else(|| ParseFailure::new("job names must be strings"))?;
        jobs.push(parse_job(name, body)?);
    }
    Ok(jobs)
}

fn parse_job(name: String, body: &Value) -> Parsed<Job> {
    let m = match body {
        Value::Null => return Ok(Job::new(name, default_runs_on())),
        Value::Mapping(m) => m,
        _ => return Err(ParseFailure::new(format!("jobs.{name} must be a mapping"))),
    };

    let runs_on = match m.get("runs-on") {
        None | Some(Value::Null) => default_runs_on(),
        Some(v) => scalar_string(v)
            .ok_or_else(|| ParseFailure::new(format!("jobs.{name}.runs-on must be a string")))?,
    };

    let raw_steps = match m.get("steps") {
        None | Some(Value::Null) => &[][..],
        Some(Value::Sequence(s)) => s.as_slice(),
        Some(_) => return Err(ParseFailure::new(format!("jobs.{name}.steps must be a list"))),
    };

    let mut steps: Vec<Step> = raw_steps.iter().map(classify_step).collect();
    // The leading checkout is implicit; the serializer puts it back.
    if matches!(steps.first(), Some(Step::Checkout)) {
        steps.remove(0);
    }

    Ok(Job {
        name,
        runs_on,
        steps,
    })
}

/// Classify one step literal by its `uses` identifier.
pub fn classify_step(raw: &Value) -> Step {
    let opaque = || Step::Opaque { step: raw.clone() };

    let Some(m) = raw.as_mapping() else {
        return opaque();
    };
    let Some(uses) = m.get("uses").and_then(Value::as_str) else {
        return opaque();
    };

    let known_keys: &[&str] = if is_checkout_action(uses) {
        &["name", "uses"]
    } else {
        &["name", "uses", "with"]
    };
    let has_extra_keys = m
        .keys()
        .any(|k| !k.as_str().is_some_and(|k| known_keys.contains(&k)));
    if has_extra_keys {
        return opaque();
    }

    if is_checkout_action(uses) {
        return Step::Checkout;
    }

    let with = match m.get("with") {
        None | Some(Value::Null) => Some(BTreeMap::new()),
        Some(Value::Mapping(w)) => string_fields(w),
        Some(_) => None,
    };
    let Some(with) = with else {
        return opaque();
    };

    if is_pull_action(uses) {
        return match pull_config(&with) {
            Some(config) => Step::Pull { config },
            None => opaque(),
        };
    }
    if is_push_action(uses) {
        return Step::Push {
            config: PushConfig { fields: with },
        };
    }
    opaque()
}

/// Infer the pull variant from which field set is present. Mixed or
/// incomplete sets, or unknown keys, do not map to a variant.
fn pull_config(with: &BTreeMap<String, String>) -> Option<PullConfig> {
    const HTTP_KEYS: &[&str] = &["http_url", "outfile_basename", "postprocessing"];
    const SQL_KEYS: &[&str] = &[
        "sql_connstring",
        "sql_queryfile",
        "sql_format",
        "outfile_basename",
        "postprocessing",
    ];

    let has_http = with.contains_key("http_url");
    let has_sql = ["sql_connstring", "sql_queryfile", "sql_format"]
        .iter()
        .any(|k| with.contains_key(*k));
    let outfile_basename = with.get("outfile_basename").cloned();
    let postprocessing = with.get("postprocessing").cloned();

    match (has_http, has_sql) {
        (true, false) => {
            if with.keys().any(|k| !HTTP_KEYS.contains(&k.as_str())) {
                return None;
            }
            Some(PullConfig::Http {
                http_url: with.get("http_url")?.clone(),
                outfile_basename,
                postprocessing,
            })
        }
        (false, true) => {
            if with.keys().any(|k| !SQL_KEYS.contains(&k.as_str())) {
                return None;
            }
            Some(PullConfig::Sql {
                sql_connstring: with.get("sql_connstring")?.clone(),
                sql_queryfile: with.get("sql_queryfile")?.clone(),
                sql_format: with.get("sql_format")?.parse::<SqlFormat>().ok()?,
                outfile_basename,
                postprocessing,
            })
        }
        _ => None,
    }
}

fn string_fields(m: &Mapping) -> Option<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for (k, v) in m {
        out.insert(scalar_string(k)?, scalar_string(v)?);
    }
    Some(out)
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
