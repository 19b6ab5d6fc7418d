use crate::output::{print_json, print_table};
use clap::Subcommand;
use flat_core::model::Job;
use std::path::Path;

#[derive(Subcommand)]
pub enum JobSubcommand {
    /// Add an empty job
    Add {
        name: String,
        /// Runner label (default: `default_runs_on` from .flat/config.yaml)
        #[arg(long)]
        runs_on: Option<String>,
    },
    /// Remove a job and all its steps
    Remove { name: String },
    /// Rename a job, keeping its position
    Rename { from: String, to: String },
    /// Move a job to position N (0-based); past the end means last
    Move {
        name: String,
        #[arg(value_name = "N")]
        position: usize,
    },
    /// Set the runner a job runs on
    RunsOn { name: String, runner: String },
    /// List jobs in document order
    List,
}

pub fn run(root: &Path, subcmd: JobSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        JobSubcommand::Add { name, runs_on } => add(root, name, runs_on, json),
        JobSubcommand::Remove { name } => {
            let done = format!("Removed job '{name}'.");
            let applied = super::mutate(root, move |s| s.remove_job(&name).map(|_| ()))?;
            super::report(&applied, &done, json)
        }
        JobSubcommand::Rename { from, to } => {
            let done = format!("Renamed job '{from}' to '{to}'.");
            let applied = super::mutate(root, move |s| s.rename_job(&from, &to))?;
            super::report(&applied, &done, json)
        }
        JobSubcommand::Move { name, position } => {
            let done = format!("Moved job '{name}'.");
            let applied = super::mutate(root, move |s| s.move_job(&name, position))?;
            super::report(&applied, &done, json)
        }
        JobSubcommand::RunsOn { name, runner } => {
            let done = format!("Job '{name}' now runs on {runner}.");
            let applied = super::mutate(root, move |s| {
                s.job_mut(&name)?.runs_on = runner;
                Ok(())
            })?;
            super::report(&applied, &done, json)
        }
        JobSubcommand::List => list(root, json),
    }
}

fn add(root: &Path, name: String, runs_on: Option<String>, json: bool) -> anyhow::Result<()> {
    let runs_on = match runs_on {
        Some(r) => r,
        None => super::load(root)?.config.default_runs_on,
    };
    let done = format!("Added job '{name}' on {runs_on}.");
    let applied = super::mutate(root, move |s| s.add_job(Job::new(name, runs_on)))?;
    super::report(&applied, &done, json)
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let state = super::load(root)?.state;

    if json {
        let items: Vec<serde_json::Value> = state
            .jobs
            .iter()
            .map(|j| {
                serde_json::json!({
                    "name": j.name,
                    "runs_on": j.runs_on,
                    "step_count": j.steps.len(),
                })
            })
            .collect();
        return print_json(&items);
    }

    if state.jobs.is_empty() {
        println!("No jobs.");
        return Ok(());
    }
    let rows = state
        .jobs
        .iter()
        .map(|j| vec![j.name.clone(), j.runs_on.clone(), j.steps.len().to_string()])
        .collect();
    print_table(&["NAME", "RUNS-ON", "STEPS"], rows);
    Ok(())
}
