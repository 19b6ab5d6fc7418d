mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{job::JobSubcommand, step::StepSubcommand, trigger::TriggerSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "flat",
    about = "Edit Flat data workflows: triggers, jobs and their pull steps",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .flat/, flat.yml or .git/)
    #[arg(long, global = true, env = "FLAT_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .flat/config.yaml and a starter workflow
    Init,

    /// Show the workflow's triggers and jobs
    Show,

    /// Check the workflow for problems
    Validate,

    /// Rewrite the workflow in canonical form
    Fmt {
        /// Fail instead of rewriting when the file is not canonical
        #[arg(long)]
        check: bool,
    },

    /// Manage jobs
    Job {
        #[command(subcommand)]
        subcommand: JobSubcommand,
    },

    /// Manage steps within a job
    Step {
        #[command(subcommand)]
        subcommand: StepSubcommand,
    },

    /// Configure when the workflow runs
    Trigger {
        #[command(subcommand)]
        subcommand: TriggerSubcommand,
    },

    /// Follow the workflow file and report changes as they happen
    Watch,

    /// Open the workflow file in the system editor
    Edit {
        /// Open as a preview
        #[arg(long)]
        preview: bool,

        /// Open beside the current editor
        #[arg(long)]
        side: bool,
    },

    /// Serve the editing API over HTTP and open the state view (/api/state)
    /// in the browser
    Ui {
        /// Port to listen on (0 = OS-assigned)
        #[arg(long, default_value = "0")]
        port: u16,

        /// Don't open the state view in the browser
        #[arg(long)]
        no_open: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Ui { .. } | Commands::Watch => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root, cli.json),
        Commands::Show => cmd::show::run(&root, cli.json),
        Commands::Validate => cmd::validate::run(&root, cli.json),
        Commands::Fmt { check } => cmd::fmt::run(&root, check, cli.json),
        Commands::Job { subcommand } => cmd::job::run(&root, subcommand, cli.json),
        Commands::Step { subcommand } => cmd::step::run(&root, subcommand, cli.json),
        Commands::Trigger { subcommand } => cmd::trigger::run(&root, subcommand, cli.json),
        Commands::Watch => cmd::watch::run(&root, cli.json),
        Commands::Edit { preview, side } => cmd::edit::run(&root, preview, side),
        Commands::Ui { port, no_open } => cmd::ui::run(&root, port, no_open),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
