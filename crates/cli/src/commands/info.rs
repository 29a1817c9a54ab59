//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{mask_secret, RunConfig};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;
use crate::error::CliError;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    breaker_threshold: u32,
    retry: RetryInfo,
    scheduler: SchedulerInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_service: Option<String>,
    services: Vec<ServiceInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    destinations: Vec<DestinationInfo>,
    publish: String,
}

#[derive(Serialize)]
struct RetryInfo {
    max_retries: u32,
    backoff_cap: u64,
    time_unit_ms: u64,
    cooldown_units: u32,
}

#[derive(Serialize)]
struct SchedulerInfo {
    concurrency: usize,
    batch_size: usize,
    batch_pacing_ms: u64,
}

#[derive(Serialize)]
struct ServiceInfo {
    name: String,
    format: String,
    auth: String,
    model: String,
    credential_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    credentials: Vec<String>,
}

#[derive(Serialize)]
struct DestinationInfo {
    id: String,
    target: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    primary_language: Option<String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
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

fn build_config_info(config: &RunConfig, args: &InfoArgs) -> ConfigInfo {
    let services = config
        .services
        .iter()
        .map(|s| ServiceInfo {
            name: s.name.clone(),
            format: format!("{:?}", s.format),
            auth: format!("{:?}", s.auth),
            model: s.model.clone(),
            credential_count: s.keys.len(),
            credentials: if args.credentials {
                s.keys.iter().map(|k| mask_secret(k)).collect()
            } else {
                Vec::new()
            },
        })
        .collect();

    let destinations = if args.destinations {
        config
            .allocation
            .destinations
            .iter()
            .map(|d| DestinationInfo {
                id: d.id.to_string(),
                target: config.target_for(d),
                primary_language: d.primary_language.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        breaker_threshold: config.breaker.threshold,
        retry: RetryInfo {
            max_retries: config.retry.max_retries,
            backoff_cap: config.retry.backoff_cap,
            time_unit_ms: config.retry.time_unit_ms,
            cooldown_units: config.pool.cooldown_units,
        },
        scheduler: SchedulerInfo {
            concurrency: config.scheduler.concurrency,
            batch_size: config.scheduler.batch_size,
            batch_pacing_ms: config.scheduler.batch_pacing_ms,
        },
        generation_service: config.generation_service().map(str::to_string),
        services,
        destinations,
        publish: format!("{:?}", config.publish.kind),
    }
}

fn print_config_info(config: &RunConfig, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                 quota-relay Configuration                    ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("⚙️  Dispatch");
    println!("   ├─ Breaker threshold: {}", config.breaker.threshold);
    println!("   ├─ Max retries: {}", config.retry.max_retries);
    println!(
        "   ├─ Backoff: min({}, 2^n) x {}ms",
        config.retry.backoff_cap, config.retry.time_unit_ms
    );
    println!("   └─ Pool cool-down: {} units", config.pool.cooldown_units);

    println!("\n📦 Scheduler");
    println!("   ├─ Batch size: {}", config.scheduler.batch_size);
    println!("   ├─ Concurrency: {}", config.scheduler.concurrency);
    println!("   └─ Pacing: {}ms", config.scheduler.batch_pacing_ms);

    println!("\n🔌 Services ({})", config.services.len());
    for (i, service) in config.services.iter().enumerate() {
        let is_last = i == config.services.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };
        let generation = config.generation_service() == Some(service.name.as_str());

        println!(
            "   {} {} ({:?}, {:?}){}",
            prefix,
            service.name,
            service.format,
            service.auth,
            if generation { " [generation]" } else { "" }
        );

        if args.credentials && !service.keys.is_empty() {
            for (j, key) in service.keys.iter().enumerate() {
                let key_prefix = if j == service.keys.len() - 1 { "└─" } else { "├─" };
                println!("   {}  {} {}", child_prefix, key_prefix, mask_secret(key));
            }
        } else {
            println!("   {}  └─ {} credentials", child_prefix, service.keys.len());
        }
    }

    let destinations = &config.allocation.destinations;
    println!("\n🎯 Destinations ({})", destinations.len());
    if args.destinations {
        for (i, dest) in destinations.iter().enumerate() {
            let prefix = if i == destinations.len() - 1 { "└─" } else { "├─" };
            println!(
                "   {} {} (target {}, {})",
                prefix,
                dest.id,
                config.target_for(dest),
                dest.primary_language
                    .as_deref()
                    .unwrap_or(&config.generation.primary_language)
            );
        }
    }

    println!("\n📤 Publish: {:?}", config.publish.kind);
    if let Some(root) = &config.publish.root {
        println!("   └─ Root: {}", root.display());
    }

    println!();
}
