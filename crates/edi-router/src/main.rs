//! EDI Router - Main entry point

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use edi_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use tokio::signal;
use tracing::{error, info, warn};

use edi_router::cli::{list_options, Cli, Commands};
use edi_router::config::MonitorConfig;
use edi_router::ingest::{DirectoryWatcher, EventBus, IngestionPipeline};
use edi_router::transfer::TransferClient;
use edi_router::x12::EnvelopeParser;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let base = LogConfig {
        level: if cli.verbose { LogLevel::Debug } else { LogLevel::Info },
        output: LogOutput::Console,
        log_file_prefix: "edi-router".to_string(),
        ..LogConfig::default()
    };

    // Environment variables take precedence
    let log_config = LogConfig::from_env_with(base.clone()).unwrap_or(base);
    let _guard = init_logging(&log_config);

    // Returning lets `_guard` flush buffered log output before exit
    match execute_command(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        },
    }
}

/// Run the selected command; `Ok(false)` means it ran but reported failure
async fn execute_command(cli: &Cli) -> Result<bool> {
    match &cli.command {
        Commands::Watch { base_dir } => watch(base_dir.as_deref()).await.map(|()| true),
        Commands::Parse { file, json } => parse(file, *json).map(|()| true),
        Commands::Upload { file, target } => {
            let target = target.to_target()?;
            let result = TransferClient::new().upload(file, &target).await;
            println!("{}", result);
            if !result.success {
                warn!(file = %file.display(), error = %result.message, "Upload failed");
            }
            Ok(result.success)
        },
        Commands::List {
            target,
            dir,
            recursive,
            glob,
            include_dirs,
            json,
        } => {
            let target = target.to_target()?;
            let options = list_options(dir.clone(), *recursive, glob.clone(), *include_dirs);
            let entries = TransferClient::new().list(&target, &options).await?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in &entries {
                    let size = entry.size.map(|s| s.to_string()).unwrap_or_else(|| "-".into());
                    let kind = if entry.is_directory { "d" } else { "-" };
                    println!("{} {:>12} {}", kind, size, entry.path);
                }
            }
            Ok(true)
        },
    }
}

async fn watch(base_dir: Option<&Path>) -> Result<()> {
    let mut config = MonitorConfig::load().context("Failed to load monitor configuration")?;
    if let Some(dir) = base_dir {
        config = config.with_base_dir(dir);
    }

    info!("Starting EDI router in {}", config.base_dir.display());

    let pipeline = Arc::new(IngestionPipeline::new(
        config.layout(),
        config.retry_policy(),
        EventBus::new(config.max_subscribers),
    ));
    let watcher = Arc::new(DirectoryWatcher::new(pipeline.clone(), config.watcher_options()));

    let mut events = pipeline.subscribe()?;
    let reporter = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if event.success {
                info!(
                    "{} -> {} (total {})",
                    event.file_name, event.final_state, event.total_processed
                );
            } else {
                warn!(
                    "{} -> {} (total {})",
                    event.file_name, event.final_state, event.total_processed
                );
            }
        }
    });

    let mut runner = {
        let watcher = watcher.clone();
        tokio::spawn(async move { watcher.run().await })
    };

    let outcome = tokio::select! {
        joined = &mut runner => joined,
        _ = shutdown_signal() => {
            info!("Shutdown requested, stopping watcher");
            watcher.stop();
            pipeline.abort();
            runner.await
        }
    };
    reporter.abort();
    outcome.context("Watcher task panicked")??;

    info!("Processed {} files", pipeline.total_processed());
    Ok(())
}

fn parse(file: &Path, json: bool) -> Result<()> {
    let data = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let interchange = EnvelopeParser::new().parse_bytes(&data)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&interchange)?);
        return Ok(());
    }

    println!("{}", interchange.summary());
    for group in &interchange.groups {
        let code = group.header.functional_identifier.as_deref().unwrap_or("-");
        let control = group.header.control_number.as_deref().unwrap_or("-");
        if group.synthetic {
            println!("  (no GS)");
        } else {
            println!("  GS {} #{}", code, control);
        }
        for set in &group.transaction_sets {
            println!(
                "    ST {} #{}",
                set.identifier_code.as_deref().unwrap_or("-"),
                set.control_number.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
