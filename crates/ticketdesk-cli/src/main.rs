//! ticketdesk - a command line client for the ticketing service.
//!
//! Browse events, book and manage tickets, and (for admin accounts) run
//! event administration and analytics from the terminal.

mod commands;
mod format;

use std::io;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ticketdesk_core::auth::{KeyValueStore, MemoryStore};
use ticketdesk_core::cache::CacheManager;
use ticketdesk_core::{ApiClient, Config, RetryPolicy, SessionManager, SessionStore};

use commands::{Command, Context};

// ============================================================================
// Constants
// ============================================================================

/// Subdirectory of the cache dir holding daily log files
const LOG_DIR: &str = "logs";

/// Log file name prefix; the date is appended per rotation
const LOG_FILE_PREFIX: &str = "ticketdesk.log";

/// Subdirectory of the cache dir holding cached responses
const RESPONSE_CACHE_DIR: &str = "responses";

#[derive(Parser, Debug)]
#[command(name = "ticketdesk", version, about, long_about = None)]
struct Cli {
    /// API base URL (overrides TICKETDESK_API_URL and the config file)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Keep the session in memory only; nothing is persisted
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Command,
}

/// Initialize the tracing subscriber for logging.
///
/// Warnings go to stderr; a daily-rotated file in the cache directory keeps
/// info and above. Use RUST_LOG to control both (e.g. RUST_LOG=debug).
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let stderr_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_filter(stderr_filter);

    let (file_layer, guard) = match config.cache_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir.join(LOG_DIR), LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_filter =
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(file_filter);
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: failed to load config, using defaults: {:#}", e);
        Config::default()
    });

    let log_guard = init_tracing(&config);
    info!("ticketdesk starting");

    let backend: Arc<dyn KeyValueStore> = if cli.ephemeral {
        Arc::new(MemoryStore::new())
    } else {
        config.session_backend()?
    };
    let session = SessionManager::new(SessionStore::new(backend), config.session_config());
    let state = session.restore();
    info!(state = %state, "Session restored");

    let api_url = cli.api_url.clone().unwrap_or_else(|| config.api_url());
    let client = ApiClient::new(api_url, session.clone())?;
    let cache = CacheManager::new(config.cache_dir()?.join(RESPONSE_CACHE_DIR))?;

    let mut events = session.subscribe();
    let mut ctx = Context {
        config,
        client,
        cache,
        retry: RetryPolicy::default(),
    };

    let result = commands::run(&mut ctx, cli.command).await;

    let unauthorized = result.as_ref().err().is_some_and(commands::is_unauthorized);
    ctx.settle_session_events(&mut events, unauthorized).await;

    if let Err(e) = result {
        warn!(error = %e, "Command failed");
        eprintln!("Error: {:#}", e);
        // exit() skips destructors; flush the log writer first
        drop(log_guard);
        std::process::exit(1);
    }

    info!("ticketdesk done");
    Ok(())
}
