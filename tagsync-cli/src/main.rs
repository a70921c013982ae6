//! tagsync command line entry point.

use clap::Parser;
use std::sync::Arc;
use tagsync_cli::run::Runner;
use tagsync_cli::{Cli, CliError};
use tagsync_client::{ClientConfig, HttpTagStore};
use tagsync_core::TracingNotifier;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Set to any value to emit JSON log lines instead of the pretty format.
const LOG_JSON_ENV_VAR: &str = "TAGSYNC_LOG_JSON";

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    init_tracing();

    let config = ClientConfig::load(cli.config.as_deref())?;
    let store = HttpTagStore::new(&config)?;
    tracing::info!(base_url = %store.base_url(), "Connected store");

    let runner = Runner::new(Arc::new(store), config.sync.clone(), Arc::new(TracingNotifier));
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    runner.run(cli.command, &mut out).await
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if std::env::var_os(LOG_JSON_ENV_VAR).is_some() {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    if let Err(err) = result {
        eprintln!("tracing already initialised: {}", err);
    }
}
