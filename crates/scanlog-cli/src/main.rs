mod cli;
mod config;
mod scans;
mod storage;

use clap::Parser;
use color_eyre::Result;
use scanlog_core::store::ScanStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Command, ConfigCommand};

/// Entry point: pick one backend for the process, then dispatch the command.
#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    let backend = cli.backend.unwrap_or(config.backend);

    match cli.command {
        Command::Version => print_version(),
        Command::Config(ConfigCommand::Init) => init_config(&config)?,
        Command::Health => {
            let store = storage::open_store(backend, &config).await?;
            let count = run_store_health(store.as_ref()).await?;
            println!("Storage ({}): ok, {count} scans", store.name());
        }
        Command::Scan(cmd) => {
            let store = storage::open_store(backend, &config).await?;
            let mut stdout = std::io::stdout().lock();
            scans::handle(cmd, store.as_ref(), &mut stdout).await?;
        }
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info. Logs go to stderr to keep stdout parseable.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("scanlog {}", env!("CARGO_PKG_VERSION"));
}

/// Read the full history from an initialized store, returning how many scans it holds.
async fn run_store_health(store: &dyn ScanStore) -> Result<usize> {
    let scans = store.list_all().await?;
    Ok(scans.len())
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}
