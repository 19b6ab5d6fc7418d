//! Structured state to canonical workflow YAML.
//!
//! The output is a pure function of the input: mappings are built in a fixed
//! key order so the same state always yields byte-identical text. Fields the
//! state does not store (document name, the implicit checkout step, pinned
//! action references and step names) are injected here.

use crate::config::default_runs_on;
use crate::deserialize::is_checkout_action;
use crate::error::Result;
use crate::model::{FlatState, Job, PullConfig, PushConfig, Step, Triggers, DOCUMENT_NAME};
use serde_yaml::{Mapping, Value};

pub const CHECKOUT_STEP_NAME: &str = "Checkout repo";
pub const CHECKOUT_ACTION: &str = "actions/checkout@v2";
pub const PULL_STEP_NAME: &str = "Fetch data";
pub const PULL_ACTION: &str = "githubocto/flat@main";
pub const PUSH_STEP_NAME: &str = "Push data";
pub const PUSH_ACTION: &str = "githubocto/flat-push@v1";

/// Render `state` as the canonical document text.
pub fn serialize(state: &FlatState) -> Result<String> {
    Ok(serde_yaml::to_string(&to_document(state))?)
}

/// Build the document tree without rendering it.
pub fn to_document(state: &FlatState) -> Value {
    let mut doc = Mapping::new();
    doc.insert("name".into(), DOCUMENT_NAME.into());
    doc.insert("on".into(), triggers_value(&state.on));

    let mut jobs = Mapping::new();
    for job in &state.jobs {
        jobs.insert(Value::String(job.name.clone()), job_value(job));
    }
    doc.insert("jobs".into(), Value::Mapping(jobs));
    Value::Mapping(doc)
}

fn triggers_value(on: &Triggers) -> Value {
    let mut m = Mapping::new();
    if on.workflow_dispatch {
        m.insert("workflow_dispatch".into(), Value::Null);
    }
    if let Some(push) = &on.push {
        let v = if push.branches.is_empty() {
            Value::Null
        } else {
            let branches = push.branches.iter().cloned().map(Value::String).collect();
            let mut p = Mapping::new();
            p.insert("branches".into(), Value::Sequence(branches));
            Value::Mapping(p)
        };
        m.insert("push".into(), v);
    }
    if let Some(schedule) = &on.schedule {
        let mut entry = Mapping::new();
        entry.insert("cron".into(), Value::String(schedule.cron.clone()));
        m.insert(
            "schedule".into(),
            Value::Sequence(vec![Value::Mapping(entry)]),
        );
    }
    Value::Mapping(m)
}

fn job_value(job: &Job) -> Value {
    let runs_on = if job.runs_on.trim().is_empty() {
        default_runs_on()
    } else {
        job.runs_on.clone()
    };

    // Leading checkouts collapse into the implicit one. A customised checkout
    // kept as an opaque step takes the implicit one's place.
    let rest: Vec<&Step> = job
        .steps
        .iter()
        .skip_while(|s| matches!(s, Step::Checkout))
        .collect();
    let mut steps = Vec::with_capacity(rest.len() + 1);
    if !rest.first().is_some_and(|s| is_opaque_checkout(s)) {
        steps.push(checkout_value());
    }
    steps.extend(rest.into_iter().map(step_value));

    let mut m = Mapping::new();
    m.insert("runs-on".into(), Value::String(runs_on));
    m.insert("steps".into(), Value::Sequence(steps));
    Value::Mapping(m)
}

fn is_opaque_checkout(step: &Step) -> bool {
    match step {
        Step::Opaque { step } => step
            .get("uses")
            .and_then(Value::as_str)
            .is_some_and(is_checkout_action),
        _ => false,
    }
}

fn checkout_value() -> Value {
    let mut m = Mapping::new();
    m.insert("name".into(), CHECKOUT_STEP_NAME.into());
    m.insert("uses".into(), CHECKOUT_ACTION.into());
    Value::Mapping(m)
}

fn step_value(step: &Step) -> Value {
    match step {
        Step::Checkout => checkout_value(),
        Step::Pull { config } => action_step(PULL_STEP_NAME, PULL_ACTION, pull_with(config)),
        Step::Push { config } => action_step(PUSH_STEP_NAME, PUSH_ACTION, push_with(config)),
        Step::Opaque { step } => step.clone(),
    }
}

fn action_step(name: &str, uses: &str, with: Mapping) -> Value {
    let mut m = Mapping::new();
    m.insert("name".into(), name.into());
    m.insert("uses".into(), uses.into());
    if !with.is_empty() {
        m.insert("with".into(), Value::Mapping(with));
    }
    Value::Mapping(m)
}

fn put(m: &mut Mapping, key: &str, value: &str) {
    m.insert(key.into(), Value::String(value.to_string()));
}

fn put_opt(m: &mut Mapping, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        put(m, key, v);
    }
}

fn pull_with(config: &PullConfig) -> Mapping {
    let mut m = Mapping::new();
    match config {
        PullConfig::Http {
            http_url,
            outfile_basename,
            postprocessing,
        } => {
            put(&mut m, "http_url", http_url);
            put_opt(&mut m, "outfile_basename", outfile_basename);
            put_opt(&mut m, "postprocessing", postprocessing);
        }
        PullConfig::Sql {
            sql_connstring,
            sql_queryfile,
            sql_format,
            outfile_basename,
            postprocessing,
        } => {
            put(&mut m, "sql_connstring", sql_connstring);
            put(&mut m, "sql_queryfile", sql_queryfile);
            put(&mut m, "sql_format", sql_format.as_str());
            put_opt(&mut m, "outfile_basename", outfile_basename);
            put_opt(&mut m, "postprocessing", postprocessing);
        }
    }
    m
}

fn push_with(config: &PushConfig) -> Mapping {
    let mut m = Mapping::new();
    for (k, v) in &config.fields {
        put(&mut m, k, v);
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PushTrigger, Schedule, SqlFormat};

    fn parse(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn dispatch_only_state_renders_empty_jobs() {
        let state = FlatState {
            name: "Flat".to_string(),
            on: Triggers {
                workflow_dispatch: true,
                ..Triggers::default()
            },
            jobs: vec![],
        };
        let text = serialize(&state).unwrap();
        let doc = parse(&text);
        assert_eq!(doc["name"], Value::from("Flat"));
        assert_eq!(doc["on"]["workflow_dispatch"], Value::Null);
        assert!(doc["on"].as_mapping().unwrap().contains_key("workflow_dispatch"));
        assert_eq!(doc["jobs"], Value::Mapping(Mapping::new()));
        assert!(text.contains("workflow_dispatch: null"));
        assert!(text.contains("jobs: {}"));
    }

    #[test]
    fn http_pull_job_starts_with_checkout() {
        let mut state = FlatState::stub();
        state
            .add_job(Job::new("sync", "ubuntu-latest").with_step(Step::pull(PullConfig::http(
                "https://example.com/data.csv",
                "data",
            ))))
            .unwrap();

        let doc = parse(&serialize(&state).unwrap());
        let steps = doc["jobs"]["sync"]["steps"].as_sequence().unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0]["uses"], Value::from(CHECKOUT_ACTION));
        assert_eq!(steps[0]["name"], Value::from(CHECKOUT_STEP_NAME));
        assert_eq!(steps[1]["uses"], Value::from(PULL_ACTION));
        assert_eq!(
            steps[1]["with"]["http_url"],
            Value::from("https://example.com/data.csv")
        );
        assert_eq!(steps[1]["with"]["outfile_basename"], Value::from("data"));
        assert_eq!(steps[1]["with"].as_mapping().unwrap().len(), 2);
        assert_eq!(doc["jobs"]["sync"]["runs-on"], Value::from("ubuntu-latest"));
    }

    #[test]
    fn output_is_deterministic() {
        let mut state = FlatState::stub();
        state.on.push = Some(PushTrigger {
            branches: ["main".to_string(), "dev".to_string()].into_iter().collect(),
        });
        state.on.schedule = Some(Schedule {
            cron: "0 * * * *".to_string(),
        });
        for name in ["zeta", "alpha", "mid"] {
            state.add_job(Job::new(name, "ubuntu-latest")).unwrap();
        }
        let a = serialize(&state).unwrap();
        let b = serialize(&state).unwrap();
        assert_eq!(a, b);

        // Job order follows the state, not key order.
        let zeta = a.find("zeta:").unwrap();
        let alpha = a.find("alpha:").unwrap();
        assert!(zeta < alpha);
    }

    #[test]
    fn stored_leading_checkout_is_not_duplicated() {
        let mut state = FlatState::stub();
        let job = Job::new("sync", "ubuntu-latest")
            .with_step(Step::Checkout)
            .with_step(Step::pull(PullConfig::http("https://x.test/a.json", "a")));
        state.add_job(job).unwrap();

        let doc = parse(&serialize(&state).unwrap());
        let steps = doc["jobs"]["sync"]["steps"].as_sequence().unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0]["uses"], Value::from(CHECKOUT_ACTION));
    }

    #[test]
    fn empty_job_still_has_checkout_and_default_runner() {
        let mut state = FlatState::stub();
        state.add_job(Job::new("empty", "")).unwrap();
        let doc = parse(&serialize(&state).unwrap());
        let steps = doc["jobs"]["empty"]["steps"].as_sequence().unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(doc["jobs"]["empty"]["runs-on"], Value::from("ubuntu-latest"));
    }

    #[test]
    fn triggers_encoding() {
        let mut state = FlatState::stub();
        state.on.workflow_dispatch = false;
        state.on.push = Some(PushTrigger::default());
        state.on.schedule = Some(Schedule {
            cron: "*/5 * * * *".to_string(),
        });
        let doc = parse(&serialize(&state).unwrap());
        let on = doc["on"].as_mapping().unwrap();
        assert!(!on.contains_key("workflow_dispatch"));
        assert_eq!(doc["on"]["push"], Value::Null);
        assert_eq!(doc["on"]["schedule"][0]["cron"], Value::from("*/5 * * * *"));
    }

    #[test]
    fn sql_pull_fields() {
        let mut state = FlatState::stub();
        state
            .add_job(Job::new("db", "ubuntu-latest").with_step(Step::pull(PullConfig::sql(
                "${{ secrets.DB }}",
                "query.sql",
                SqlFormat::Csv,
                "rows",
            ))))
            .unwrap();
        let doc = parse(&serialize(&state).unwrap());
        let with = &doc["jobs"]["db"]["steps"][1]["with"];
        assert_eq!(with["sql_connstring"], Value::from("${{ secrets.DB }}"));
        assert_eq!(with["sql_queryfile"], Value::from("query.sql"));
        assert_eq!(with["sql_format"], Value::from("csv"));
        assert!(with.get("http_url").is_none());
    }

    #[test]
    fn customised_checkout_replaces_implicit_one() {
        let raw = parse("uses: actions/checkout@v4\nwith:\n  fetch-depth: 0\n");
        let mut state = FlatState::stub();
        state
            .add_job(Job::new("sync", "ubuntu-latest").with_step(Step::Opaque { step: raw.clone() }))
            .unwrap();
        let doc = parse(&serialize(&state).unwrap());
        let steps = doc["jobs"]["sync"]["steps"].as_sequence().unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0], raw);
    }

    #[test]
    fn opaque_step_is_written_verbatim() {
        let raw = parse("name: Say hi\nrun: echo hi\n");
        let mut state = FlatState::stub();
        state
            .add_job(Job::new("misc", "ubuntu-latest").with_step(Step::Opaque { step: raw.clone() }))
            .unwrap();
        let doc = parse(&serialize(&state).unwrap());
        assert_eq!(doc["jobs"]["misc"]["steps"][1], raw);
    }
}
