use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use swimlane::{
    cli::{self, CliContext, RootCommand},
    logging::init_logging,
    settings::Settings,
};

#[derive(Parser, Debug)]
#[command(
    name = "swimlane",
    about = "Kanban board engine with drag-and-drop moves and optimistic sync",
    long_about = "Inspect and move tasks on a kanban board backed by a task service, or replay recorded pointer sessions through the drag engine.",
    version = env!("SWIMLANE_BUILD_VERSION"),
    author
)]
struct Cli {
    #[arg(short, long, global = true, value_name = "PROJECT")]
    project: Option<String>,

    /// Base URL of the task service; overrides `server_url` in settings.
    #[arg(long, global = true, value_name = "URL", conflicts_with = "fixture")]
    server: Option<String>,

    /// Work offline against a JSON board fixture instead of the task service.
    #[arg(long, global = true, value_name = "PATH")]
    fixture: Option<PathBuf>,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: RootCommand,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(err) = init_logging()
        && !cli.quiet
    {
        eprintln!("warning: failed to initialize logging: {err:#}");
    }

    let settings = Settings::load();
    let project = cli
        .project
        .unwrap_or_else(|| settings.default_project.clone());
    if project.trim().is_empty() {
        eprintln!("error[PROJECT_REQUIRED]: --project cannot be empty");
        std::process::exit(2);
    }

    let context = CliContext {
        project,
        server: cli.server,
        fixture: cli.fixture,
        settings,
    };
    let code = cli::run(context, cli.command, cli.json, cli.quiet).await;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
