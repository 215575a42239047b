//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::CaptureConfig;
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    source_count: usize,
    frame_rate: u32,
    period_ms: f64,
    failure_threshold: u32,
    output_capacity: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    source_count: config.sources.len(),
                    frame_rate: config.frame_rate,
                    period_ms: config.period().as_secs_f64() * 1000.0,
                    failure_threshold: config.failure_threshold(),
                    output_capacity: config.output_capacity,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &CaptureConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    // Sources are collected one after another; stalls add up.
    let worst_case = config.collect_timeout() * config.sources.len() as u32;
    if config.sources.len() > 1 && worst_case > config.period() {
        warnings.push(format!(
            "{} stalled sources can hold a cycle for {:?}, period is {:?}",
            config.sources.len(),
            worst_case,
            config.period()
        ));
    }

    for source in &config.sources {
        if !source.address.starts_with("synthetic://") {
            warnings.push(format!(
                "Source '{}' is not a synthetic:// address and will stay disconnected in this build",
                source.source_id()
            ));
        }
    }

    if config.reconnect_cooldown_ms == 0 {
        warnings.push("reconnect_cooldown_ms is 0 - a dead source is reopened every cycle".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Sources: {}", summary.source_count);
            println!("  Frame rate: {} fps", summary.frame_rate);
            println!("  Period: {:.1} ms", summary.period_ms);
            println!("  Failure threshold: {}", summary.failure_threshold);
            println!("  Output capacity: {}", summary.output_capacity);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
