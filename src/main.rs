//! cdp-cloak binary entry point.
//!
//! Parses the command line, initializes logging, prints the startup banner,
//! and runs the proxy until the listener fails or the process is
//! interrupted.

// ============================================================================
// Imports
// ============================================================================

use std::fs::OpenOptions;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cdp_cloak::{ATTRIBUTION, Error, ProxyConfig, ProxyServer, Result};

// ============================================================================
// Constants
// ============================================================================

/// Log file written when `--log` is enabled; truncated on every start.
const LOG_FILE: &str = "server.log";

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config = ProxyConfig::parse();

    init_logging(config.log)?;
    print_banner(&config);

    let server = Arc::new(ProxyServer::bind(config).await?);

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
            Ok(())
        }
    }
}

// ============================================================================
// Startup Helpers
// ============================================================================

/// Initializes tracing output.
///
/// With `--log`, everything down to DEBUG goes to [`LOG_FILE`]; without it,
/// events are discarded.
///
/// # Errors
///
/// Returns [`Error::Config`] when the log file cannot be opened; fatal.
fn init_logging(enabled: bool) -> Result<()> {
    if enabled {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(LOG_FILE)
            .map_err(|e| Error::config(format!("cannot open {LOG_FILE}: {e}")))?;

        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("cdp_cloak=debug"))
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("off"))
            .with_writer(std::io::sink)
            .init();
    }

    Ok(())
}

/// Prints the startup banner to stdout.
fn print_banner(config: &ProxyConfig) {
    println!(
        "\nAuthor: {}\nVersion: {}\nLicense: {}\n\
         ======================================\n\
         CDP proxy is running on port: {}\n\
         Browser remote debug port is: {}\n\
         My debugger is: {}\n\
         ======================================\n",
        ATTRIBUTION,
        env!("CARGO_PKG_VERSION"),
        env!("CARGO_PKG_LICENSE"),
        config.cdp_port,
        config.browser_port,
        config.debugger_name,
    );
}
