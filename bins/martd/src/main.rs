//! Loyalty ledger server binary
//!
//! Entry point for `martd`: serves the user API, runs the accrual
//! reconciliation worker, and provides config `validate` / `init` helpers.

use anyhow::{Context, Result};
use cli::{Cli, Commands, ServeArgs};
use config::{generate_default_config, load_config, save_config, validate_config, MartConfig};
use ledger::api::{create_router, ApiState};
use ledger::{
    CredentialService, HttpAccrualClient, InMemoryLedgerStore, LedgerStore, OrderManager,
    PostgresLedgerStore, ReconciliationWorker, TokenSigner, WorkerSettings,
};
use observability::{init_logging, init_metrics, LogFormat};
use server::{drain_with_timeout, run_until_shutdown, HttpServer, ServerConfig, ServerExt, ShutdownController};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const SERVICE_NAME: &str = "martd";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    match cli.into_command() {
        Commands::Serve(args) => serve(args).await,
        Commands::Validate { config } => {
            init_logging(SERVICE_NAME, LogFormat::Compact, "warn")?;
            validate_command(config)
        }
        Commands::Init { output } => {
            init_logging(SERVICE_NAME, LogFormat::Compact, "warn")?;
            init_command(output)
        }
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let mut config = load_config(&args.config)?;
    config.apply_overrides(&args.overrides());

    let format = LogFormat::parse(&config.logging.format).unwrap_or_default();
    init_logging(SERVICE_NAME, format, &config.logging.level)?;

    if let Some(port) = config.monitoring.metrics_port {
        init_metrics(port).context("Failed to start metrics exporter")?;
    }

    let report = validate_config(&config);
    for warning in &report.warnings {
        warn!(field = %warning.field, message = %warning.message, "Configuration warning");
    }
    if !report.is_valid() {
        error!(error_count = report.errors.len(), "Configuration validation failed");
        for err in &report.errors {
            error!("{}", err);
        }
        anyhow::bail!("Cannot start due to configuration errors");
    }

    let store = open_store(&config).await?;
    let manager = OrderManager::new(store.clone(), CredentialService::new());
    let tokens = TokenSigner::from_config(&config.auth);

    let server_config = ServerConfig::from_address(&config.server.address)
        .with_context(|| format!("Invalid server address: {}", config.server.address))?
        .with_request_timeout(Duration::from_secs(config.server.request_timeout_seconds));
    let http = HttpServer::new(server_config, create_router(ApiState::new(manager, tokens)));

    let shutdown = ShutdownController::with_signals();

    let worker_handle = if config.worker.enabled {
        let accrual = HttpAccrualClient::from_config(&config.accrual)
            .context("Failed to build accrual client")?;
        let worker = Arc::new(ReconciliationWorker::new(
            store,
            Arc::new(accrual),
            WorkerSettings::from_config(&config.worker),
        ));
        info!(accrual = %config.accrual.address, "Reconciliation worker enabled");
        Some(tokio::spawn(worker.run(shutdown.child_token())))
    } else {
        info!("Reconciliation worker disabled");
        None
    };

    let mut server_handle = http.spawn(shutdown.child_token());

    // The server only returns on its own if it failed to start
    let early_exit = run_until_shutdown(shutdown.token(), &mut server_handle).await;
    shutdown.shutdown();

    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    let (server_result, worker_result) = tokio::join!(
        async {
            match early_exit {
                Some(result) => Some(result),
                None => drain_with_timeout(grace, server_handle).await,
            }
        },
        async {
            match worker_handle {
                Some(handle) => drain_with_timeout(grace, handle).await.map(Some),
                None => Some(None),
            }
        },
    );

    match worker_result {
        Some(Some(Err(e))) => error!(%e, "Reconciliation worker task failed"),
        None => warn!("Reconciliation worker did not stop in time"),
        _ => {}
    }

    match server_result {
        Some(Ok(result)) => result.context("HTTP server failed")?,
        Some(Err(e)) => return Err(e).context("HTTP server task failed"),
        None => warn!("HTTP server did not drain in time"),
    }

    info!("martd stopped");
    Ok(())
}

/// Pick the ledger store once; everything downstream sees `dyn LedgerStore`
async fn open_store(config: &MartConfig) -> Result<Arc<dyn LedgerStore>> {
    match config.database.uri.as_deref() {
        Some(uri) => {
            let store = PostgresLedgerStore::connect(
                uri,
                config.database.max_connections,
                Duration::from_secs(config.database.connection_timeout_seconds),
            )
            .await
            .context("Failed to connect to PostgreSQL")?;
            store
                .run_migrations()
                .await
                .context("Failed to apply ledger schema")?;

            info!("Using PostgreSQL ledger store");
            Ok(Arc::new(store))
        }
        None => {
            warn!("No database configured, ledger state will not survive a restart");
            Ok(Arc::new(InMemoryLedgerStore::new()))
        }
    }
}

fn validate_command<P: AsRef<Path>>(config_path: P) -> Result<()> {
    info!(path = ?config_path.as_ref(), "Validating configuration");

    let config = match load_config(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!(%e, "Failed to load configuration");
            anyhow::bail!(e);
        }
    };

    let report = validate_config(&config);

    println!("\n=== Configuration Validation Report ===\n");

    if !report.warnings.is_empty() {
        println!("Warnings ({}):", report.warnings.len());
        for warning in &report.warnings {
            println!("  [warn] [{}] {}", warning.field, warning.message);
        }
        println!();
    }

    if !report.errors.is_empty() {
        println!("Errors ({}):", report.errors.len());
        for err in &report.errors {
            println!("  [error] {}", err);
        }
        println!();
        anyhow::bail!("Configuration validation failed");
    }

    println!("[ok] Configuration is valid!");
    println!();
    println!("Listen address: {}", config.server.address);
    println!("Accrual service: {}", config.accrual.address);
    println!(
        "Store: {}",
        if config.uses_database() { "postgres" } else { "in-memory" }
    );
    println!(
        "Worker: {}",
        if config.worker.enabled {
            format!("every {}s", config.worker.poll_interval_seconds)
        } else {
            "disabled".to_string()
        }
    );

    Ok(())
}

fn init_command<P: AsRef<Path>>(output_path: P) -> Result<()> {
    let output_path = output_path.as_ref();
    info!(?output_path, "Initializing new configuration file");

    let config = generate_default_config();

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    save_config(&config, output_path)?;

    println!("[ok] Configuration file created successfully!");
    println!();
    println!("Location: {:?}", output_path);
    println!();
    println!("Next steps:");
    println!("  1. Set auth.jwt_secret (or JWT_SECRET) to a real secret");
    println!("  2. Set database.uri (or DATABASE_URI) for persistent storage");
    println!("  3. Run 'martd validate --config {:?}' to check configuration", output_path);
    println!("  4. Run 'martd serve --config {:?}' to start the service", output_path);

    Ok(())
}
