mod api;
mod block_parser;
mod cache;
mod cmd_parser;
mod config;
mod diffs;
mod editor_sync;
mod layout;
mod stream;
mod terminal;
mod tui;
mod workspace;
mod ws;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::api::BackendClient;

const VERSION: &str = env!("CARGO_PKG_VERSION");

struct CliArgs {
    config_path: Option<PathBuf>,
    project_id: Option<String>,
    backend_url: Option<String>,
}

fn print_usage() {
    println!("vibe-workspace {}", VERSION);
    println!();
    println!("Usage: vibe-workspace [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --config <path>    Config file (default ~/.vibe-workspace/config.toml)");
    println!("  --project <id>     Project to open");
    println!("  --backend <url>    Backend base URL override");
    println!("  --version          Print version");
    println!("  --help             Show this help");
}

fn parse_args() -> Result<Option<CliArgs>> {
    let mut args = std::env::args().skip(1);
    let mut parsed = CliArgs {
        config_path: None,
        project_id: None,
        backend_url: None,
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                return Ok(None);
            }
            "--version" | "-V" => {
                println!("vibe-workspace {}", VERSION);
                return Ok(None);
            }
            "--config" => {
                let value = args.next().context("--config requires a path")?;
                parsed.config_path = Some(PathBuf::from(value));
            }
            "--project" => {
                let value = args.next().context("--project requires an id")?;
                parsed.project_id = Some(value);
            }
            "--backend" => {
                let value = args.next().context("--backend requires a URL")?;
                parsed.backend_url = Some(value);
            }
            other => {
                anyhow::bail!("Unknown argument: {} (try --help)", other);
            }
        }
    }

    Ok(Some(parsed))
}

/// Log to a file; the TUI owns stdout.
fn init_logging() -> Result<()> {
    let dir = dirs::home_dir()
        .context("Could not find home directory")?
        .join(".vibe-workspace");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let log_file = std::fs::File::create(dir.join("workspace.log"))
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let Some(args) = parse_args()? else {
        return Ok(());
    };

    init_logging()?;

    let mut config = config::load_or_create_config(args.config_path.as_deref())?;
    if let Some(url) = args.backend_url {
        config.backend.base_url = url;
    }
    if let Some(project) = args.project_id {
        config.backend.project_id = Some(project);
    }

    let client = BackendClient::new(
        &config.backend.base_url,
        Duration::from_secs(config.backend.timeout_seconds),
    )?;

    let project_id = match config.backend.project_id.clone() {
        Some(id) => id,
        None => pick_first_project(&client).await?,
    };

    tracing::info!(
        "Starting vibe-workspace {} against {} (project {})",
        VERSION,
        config.backend.base_url,
        project_id
    );

    tui::run_tui(client, config, project_id).await
}

/// No project configured: fall back to the first one the backend lists.
async fn pick_first_project(client: &BackendClient) -> Result<String> {
    let projects = client.list_projects().await?;

    projects
        .first()
        .map(|p| p.id.clone())
        .context("Backend has no projects; create one first or pass --project")
}
