//! `run` command implementation.

use anyhow::{Context, Result};
use config_loader::ConfigLoader;
use contracts::{CaptureConfig, SourceConfig};
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{CaptureSession, SessionConfig};

/// Execute the `run` command
pub async fn run_capture(args: &RunArgs) -> Result<()> {
    let capture = build_capture_config(args)?;

    info!(
        sources = capture.sources.len(),
        frame_rate = capture.frame_rate,
        output_capacity = capture.output_capacity,
        overflow_policy = ?capture.overflow_policy,
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&capture);
        return Ok(());
    }

    let session = CaptureSession::new(SessionConfig {
        capture,
        max_batches: (args.max_batches != 0).then_some(args.max_batches),
        timeout: (args.timeout != 0).then(|| Duration::from_secs(args.timeout)),
    });
    let shutdown = session.shutdown_handle();

    // The session blocks on channel receives; keep it off the async workers.
    let mut task = tokio::task::spawn_blocking(move || session.run());

    info!("Starting capture...");

    let joined = tokio::select! {
        joined = &mut task => joined,
        _ = shutdown_signal() => {
            warn!("Received shutdown signal, stopping capture...");
            shutdown.request_stop();
            task.await
        }
    };

    let stats = joined
        .map_err(|e| CliError::Shutdown {
            message: e.to_string(),
        })?
        .context("Capture failed")?;

    info!(
        batches = stats.batches_received,
        duration_secs = stats.duration.as_secs_f64(),
        rate = format!("{:.2}", stats.batch_rate()),
        "Capture completed"
    );
    stats.print_summary();

    info!("multicapture finished");
    Ok(())
}

/// Configuration file (if any), then addresses and flags on top.
fn build_capture_config(args: &RunArgs) -> Result<CaptureConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!(config = %path.display(), "Loading configuration");
            if !path.exists() {
                return Err(CliError::config_not_found(path).into());
            }
            ConfigLoader::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None if args.addresses.is_empty() => return Err(CliError::NoSources.into()),
        None => CaptureConfig::new(args.addresses.iter().cloned(), 1),
    };

    // Apply CLI overrides
    if args.config.is_some() && !args.addresses.is_empty() {
        info!(count = args.addresses.len(), "Replacing configured sources from CLI");
        config.sources = args.addresses.iter().map(SourceConfig::new).collect();
    }
    if let Some(fps) = args.fps {
        info!(fps, "Overriding frame rate from CLI");
        config.frame_rate = fps;
    }
    if let Some(capacity) = args.output_capacity {
        config.output_capacity = capacity;
    }
    if let Some(overflow) = args.overflow {
        config.overflow_policy = overflow.into();
    }

    ConfigLoader::validate(&config).context("Invalid capture configuration")?;
    Ok(config)
}

/// Ctrl+C and SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &CaptureConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("Cadence:");
    println!("  Frame rate: {} fps", config.frame_rate);
    println!("  Period: {:?}", config.period());
    println!("  Collection timeout: {:?} per source", config.collect_timeout());
    println!(
        "  Reconnect: after {} failures, at most every {:?}",
        config.failure_threshold(),
        config.reconnect_cooldown()
    );
    println!(
        "  Output: {} batches, {:?}",
        config.output_capacity, config.overflow_policy
    );

    println!("\nSources ({}):", config.sources.len());
    for source in &config.sources {
        println!("  - {} ({})", source.source_id(), source.address);
    }
    println!();
}
