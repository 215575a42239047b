//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::CaptureConfig;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    cadence: CadenceInfo,
    reconnect: ReconnectInfo,
    output: OutputInfo,
    source_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sources: Vec<SourceInfo>,
}

#[derive(Serialize)]
struct CadenceInfo {
    frame_rate: u32,
    period_ms: f64,
    collect_timeout_ms: f64,
    pacing_fraction: f64,
}

#[derive(Serialize)]
struct ReconnectInfo {
    failure_threshold: u32,
    cooldown_ms: u64,
    failure_backoff_ms: f64,
}

#[derive(Serialize)]
struct OutputInfo {
    capacity: usize,
    overflow_policy: String,
}

#[derive(Serialize)]
struct SourceInfo {
    position: usize,
    id: String,
    address: String,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&config, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config, args);
    }

    Ok(())
}

fn millis(d: std::time::Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn build_config_info(config: &CaptureConfig, args: &InfoArgs) -> ConfigInfo {
    let sources = if args.sources {
        config
            .sources
            .iter()
            .enumerate()
            .map(|(position, s)| SourceInfo {
                position,
                id: s.source_id().to_string(),
                address: s.address.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        cadence: CadenceInfo {
            frame_rate: config.frame_rate,
            period_ms: millis(config.period()),
            collect_timeout_ms: millis(config.collect_timeout()),
            pacing_fraction: config.pacing_fraction,
        },
        reconnect: ReconnectInfo {
            failure_threshold: config.failure_threshold(),
            cooldown_ms: config.reconnect_cooldown_ms,
            failure_backoff_ms: millis(config.failure_backoff()),
        },
        output: OutputInfo {
            capacity: config.output_capacity,
            overflow_policy: format!("{:?}", config.overflow_policy),
        },
        source_count: config.sources.len(),
        sources,
    }
}

fn print_config_info(config: &CaptureConfig, args: &InfoArgs) {
    println!("=== multicapture Configuration ===\n");

    println!("Cadence");
    println!("   ├─ Frame rate: {} fps", config.frame_rate);
    println!("   ├─ Period: {:.1} ms", millis(config.period()));
    println!(
        "   └─ Collection timeout: {:.1} ms per source",
        millis(config.collect_timeout())
    );

    println!("\nReconnect");
    println!(
        "   ├─ Failure threshold: {} consecutive failures",
        config.failure_threshold()
    );
    println!("   ├─ Cooldown: {} ms", config.reconnect_cooldown_ms);
    println!(
        "   └─ Backoff after a failed read: {:.1} ms",
        millis(config.failure_backoff())
    );

    println!("\nOutput");
    println!("   ├─ Capacity: {} batches", config.output_capacity);
    println!("   └─ When full: {:?}", config.overflow_policy);

    println!("\nSources ({})", config.sources.len());
    for (i, source) in config.sources.iter().enumerate() {
        let is_last = i == config.sources.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        if args.sources {
            println!("   {} [{}] {} ({})", prefix, i, source.source_id(), source.address);
        } else {
            println!("   {} {}", prefix, source.source_id());
        }
    }

    println!();
}
