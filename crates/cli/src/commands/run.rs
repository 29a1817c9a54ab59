//! `run` command implementation.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::session::{EngineChoice, Session, SessionConfig};

/// Execute the `run` command
pub async fn run_session(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }
    if !args.backlog.exists() {
        return Err(CliError::backlog_not_found(args.backlog.display().to_string()).into());
    }

    let mut config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Apply CLI overrides
    if let Some(seed) = args.seed {
        info!(seed, "Overriding allocation seed from CLI");
        config.allocation.seed = Some(seed);
    }

    let backlog = config_loader::load_backlog(&args.backlog)
        .with_context(|| format!("Failed to load backlog from {}", args.backlog.display()))?;

    for warning in config_loader::warnings(&config) {
        warn!("{}", warning);
    }

    info!(
        services = config.services.len(),
        destinations = config.allocation.destinations.len(),
        backlog = backlog.len(),
        threshold = config.breaker.threshold,
        max_retries = config.retry.max_retries,
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config, backlog.len());
        return Ok(());
    }

    let session = Session::new(SessionConfig {
        config,
        backlog,
        engine: if args.mock {
            EngineChoice::Mock {
                failure_ratio: args.mock_failure_ratio,
            }
        } else {
            EngineChoice::Http
        },
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
    });

    let shutdown_signal = setup_shutdown_signal();

    info!("Starting run...");

    let report = tokio::select! {
        result = session.run() => result.context("Run failed")?,
        _ = shutdown_signal => {
            warn!("Received shutdown signal, stopping run...");
            return Err(CliError::Interrupted.into());
        }
    };

    if args.json {
        let json =
            serde_json::to_string_pretty(&report).context("Failed to serialize run report")?;
        println!("{}", json);
    } else {
        report.print_summary();
    }

    if report.is_aborted() {
        return Err(CliError::run_aborted(report.history().len()).into());
    }

    info!(
        delivered = report.summary().total_delivered(),
        shortfall = report.summary().total_shortfall(),
        "quota-relay finished"
    );
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM; never resolves if no handler can be installed
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
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
fn print_config_summary(config: &contracts::RunConfig, backlog: usize) {
    println!("\n=== Configuration Summary ===\n");
    println!("Backlog: {} unused items", backlog);
    println!(
        "Breaker: threshold {}, retries {} (backoff cap {} x {}ms)",
        config.breaker.threshold,
        config.retry.max_retries,
        config.retry.backoff_cap,
        config.retry.time_unit_ms
    );
    println!(
        "Scheduler: batch {}, concurrency {}, pacing {}ms",
        config.scheduler.batch_size, config.scheduler.concurrency, config.scheduler.batch_pacing_ms
    );

    println!("\nServices ({}):", config.services.len());
    for service in &config.services {
        println!(
            "  - {} ({:?}, {} keys)",
            service.name,
            service.format,
            service.keys.len()
        );
    }

    println!("\nDestinations ({}):", config.allocation.destinations.len());
    for dest in &config.allocation.destinations {
        println!("  - {} (target {})", dest.id, config.target_for(dest));
    }

    println!();
}
