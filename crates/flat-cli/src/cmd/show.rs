use crate::output::{print_json, print_table};
use flat_core::model::{FlatState, Triggers};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let loaded = super::load(root)?;

    if json {
        return print_json(&loaded.state);
    }

    println!("Workflow: {}", loaded.path.display());
    println!("Triggers: {}", describe_triggers(&loaded.state.on));
    println!();
    print_jobs(&loaded.state);
    Ok(())
}

pub fn describe_triggers(on: &Triggers) -> String {
    let mut parts = Vec::new();
    if on.workflow_dispatch {
        parts.push("manual".to_string());
    }
    if let Some(push) = &on.push {
        if push.branches.is_empty() {
            parts.push("push".to_string());
        } else {
            let branches: Vec<&str> = push.branches.iter().map(String::as_str).collect();
            parts.push(format!("push ({})", branches.join(", ")));
        }
    }
    if let Some(schedule) = &on.schedule {
        parts.push(format!("schedule '{}'", schedule.cron));
    }
    if parts.is_empty() {
        "none".to_string()
    } else {
        parts.join(", ")
    }
}

fn print_jobs(state: &FlatState) {
    if state.jobs.is_empty() {
        println!("No jobs.");
        return;
    }
    let rows = state
        .jobs
        .iter()
        .map(|job| {
            let kinds: Vec<&str> = job.steps.iter().map(|s| s.kind()).collect();
            vec![job.name.clone(), job.runs_on.clone(), kinds.join(", ")]
        })
        .collect();
    print_table(&["JOB", "RUNS-ON", "STEPS"], rows);
}

#[cfg(test)]
mod tests {
    use super::*;
    use flat_core::model::{PushTrigger, Schedule};

    #[test]
    fn triggers_are_described_in_order() {
        let on = Triggers {
            workflow_dispatch: true,
            push: Some(PushTrigger {
                branches: ["main".to_string()].into(),
            }),
            schedule: Some(Schedule {
                cron: "0 * * * *".to_string(),
            }),
        };
        assert_eq!(
            describe_triggers(&on),
            "manual, push (main), schedule '0 * * * *'"
        );
    }

    #[test]
    fn no_triggers_reads_none() {
        assert_eq!(describe_triggers(&Triggers::default()), "none");
    }
}
