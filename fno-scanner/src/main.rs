//! FNO Scanner - one gap-up scan of NSE F&O equities.
//!
//! Runs a single cycle and prints the outcome as JSON on stdout.

use anyhow::{Context, Result};
use fno_common::config::Config;
use fno_common::logging::init_logging;
use fno_scanner::Scanner;

#[tokio::main]
async fn main() -> Result<()> {
    let startup_start = std::time::Instant::now();

    // Load configuration
    let config = Config::load_and_validate()?;

    // Initialize logging
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("FNO Scanner v{}", env!("CARGO_PKG_VERSION"));

    let scanner = Scanner::from_config(&config);
    tracing::info!(
        duration_ms = startup_start.elapsed().as_millis() as u64,
        sources = scanner.orchestrator().sources_info().len(),
        threshold = scanner.engine().config().min_percentage_increase,
        "Scanner initialized"
    );

    let outcome = scanner.run_cycle().await.context("scan cycle failed")?;

    let json = serde_json::to_string_pretty(&outcome).context("serializing scan outcome")?;
    println!("{}", json);

    Ok(())
}
