// Ingest Exporter - submission export to the data repository staging area
// Copyright (c) 2025 Ingest Exporter Contributors
// Licensed under the MIT License

use clap::Parser;
use ingest_exporter::cli::{Cli, Commands, EXIT_CONFIG, EXIT_FATAL};
use ingest_exporter::config::{load_config, ApplicationConfig, LoggingConfig};
use ingest_exporter::logging::{init_logging, LoggingGuard};
use std::process;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    // .env is optional
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let exit_code = match &cli.command {
        Commands::Run(args) => {
            let mut config = match load_config(&cli.config) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("{e}");
                    process::exit(EXIT_CONFIG);
                }
            };
            if let Some(level) = &cli.log_level {
                config.application.log_level = level.clone();
            }
            let _guard = logging(&config.application, &config.logging);
            tracing::info!(version = env!("CARGO_PKG_VERSION"), "Ingest Exporter");

            let shutdown = shutdown_signal();
            report(args.execute(config, shutdown).await)
        }
        Commands::ValidateConfig(args) => {
            let _guard = console_logging(&cli);
            report(args.execute(&cli.config).await)
        }
        Commands::Status(args) => {
            let _guard = console_logging(&cli);
            report(args.execute(&cli.config).await)
        }
    };

    process::exit(exit_code);
}

fn logging(application: &ApplicationConfig, config: &LoggingConfig) -> LoggingGuard {
    match init_logging(application, config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(EXIT_FATAL);
        }
    }
}

/// One-shot commands log to the console only
fn console_logging(cli: &Cli) -> LoggingGuard {
    let application = ApplicationConfig {
        log_level: cli.log_level.clone().unwrap_or_else(|| "warn".to_string()),
        ..ApplicationConfig::default()
    };
    logging(&application, &LoggingConfig::default())
}

fn report(result: anyhow::Result<i32>) -> i32 {
    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command execution failed");
            eprintln!("Error: {e}");
            EXIT_FATAL
        }
    }
}

/// Flips to `true` on SIGINT or SIGTERM; consumers finish the message in
/// hand before stopping
fn shutdown_signal() -> watch::Receiver<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {
                            tracing::info!("Received SIGINT, shutting down");
                        }
                        _ = sigterm.recv() => {
                            tracing::info!("Received SIGTERM, shutting down");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Cannot listen for SIGTERM, only Ctrl+C stops the exporter");
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::info!("Received SIGINT, shutting down");
                    }
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                return;
            }
            tracing::info!("Received SIGINT, shutting down");
        }

        let _ = shutdown_tx.send(true);
    });

    shutdown_rx
}
