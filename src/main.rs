//! scriptforge CLI entry point.
//!
//! Initializes logging and delegates to the CLI module for command handling.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    // Parse CLI arguments first to get log_level
    let cli = scriptforge::cli::parse_cli();

    // Initialize tracing with environment filter
    // Priority: RUST_LOG env var > --log-level CLI arg > default "info"
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone());

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)))
        .init();

    // Run the CLI with parsed arguments
    if let Err(e) = scriptforge::cli::run_with_cli(cli).await {
        let report = serde_json::json!({
            "error": e.to_string(),
            "chain": e.chain().skip(1).map(|c| c.to_string()).collect::<Vec<_>>(),
        });
        eprintln!("{report}");
        std::process::exit(1);
    }
}
