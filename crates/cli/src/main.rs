use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use bookshelf_app::Service;
use bookshelf_kernel::settings::Settings;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "bookshelf-cli", version, about = "Operate the bookshelf book catalog service")]
struct Cli {
    /// Directory holding base.toml and <env>.toml
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Environment overlay to load (local, staging, production)
    #[arg(long, global = true, value_name = "ENV")]
    env: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP service until interrupted
    Serve,
    /// Create the catalog tables if they do not exist
    InitDb,
    /// Probe the store and print the health report
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let settings = Settings::load_from(cli.config_dir, cli.env)
        .context("failed to load bookshelf settings")?;
    bookshelf_telemetry::init(&settings.telemetry)?;

    match cli.command {
        Command::Serve => {
            bookshelf_app::run(settings).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::InitDb => init_db(settings).await,
        Command::Check => check(settings).await,
    }
}

async fn init_db(mut settings: Settings) -> anyhow::Result<ExitCode> {
    settings.database.create_schema = false;
    let service = Service::bootstrap(settings).await?;

    let applied = service.apply_schema().await;
    service.shutdown().await?;
    applied?;

    tracing::info!("database schema is in place");
    Ok(ExitCode::SUCCESS)
}

async fn check(mut settings: Settings) -> anyhow::Result<ExitCode> {
    settings.database.create_schema = false;
    let service = Service::bootstrap(settings).await?;

    let report = service.health().await;
    service.shutdown().await?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.is_healthy() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
