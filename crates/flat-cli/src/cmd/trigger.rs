use anyhow::{anyhow, bail};
use clap::Subcommand;
use flat_core::model::{PushTrigger, Schedule};
use flat_core::validation::validate_cron;
use std::path::Path;

#[derive(Subcommand)]
pub enum TriggerSubcommand {
    /// Allow manual runs from the Actions tab
    Dispatch {
        /// Disable instead
        #[arg(long)]
        off: bool,
    },
    /// Run on push, optionally only to the given branches
    Push {
        branches: Vec<String>,
        /// Disable instead
        #[arg(long, conflicts_with = "branches")]
        off: bool,
    },
    /// Run on a cron schedule
    Schedule {
        /// Five-field cron expression, e.g. "0 * * * *"
        #[arg(required_unless_present = "off")]
        cron: Option<String>,
        /// Disable instead
        #[arg(long, conflicts_with = "cron")]
        off: bool,
    },
}

pub fn run(root: &Path, subcmd: TriggerSubcommand, json: bool) -> anyhow::Result<()> {
    let (done, applied) = match subcmd {
        TriggerSubcommand::Dispatch { off } => {
            let applied = super::mutate(root, move |s| {
                s.on.workflow_dispatch = !off;
                Ok(())
            })?;
            (on_off("Manual dispatch", off), applied)
        }
        TriggerSubcommand::Push { branches, off } => {
            let push = (!off).then(|| PushTrigger {
                branches: branches.into_iter().collect(),
            });
            let applied = super::mutate(root, move |s| {
                s.on.push = push;
                Ok(())
            })?;
            (on_off("Push trigger", off), applied)
        }
        TriggerSubcommand::Schedule { cron, off } => {
            let schedule = if off {
                None
            } else {
                let cron = cron.ok_or_else(|| anyhow!("a cron expression is required"))?;
                if let Err(e) = validate_cron(&cron) {
                    bail!("invalid cron expression '{cron}': {e}");
                }
                Some(Schedule { cron })
            };
            let applied = super::mutate(root, move |s| {
                s.on.schedule = schedule;
                Ok(())
            })?;
            (on_off("Schedule", off), applied)
        }
    };
    super::report(&applied, &done, json)
}

fn on_off(what: &str, off: bool) -> String {
    format!("{what} {}.", if off { "disabled" } else { "enabled" })
}
