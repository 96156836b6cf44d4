//! collsrv entry point

use std::sync::Arc;

use clap::Parser;
use collsrv::config::CollsrvConfig;
use collsrv::runtime::{start_collector_service, Scheduler};
use collsrv::storage::{SqliteStore, Stores};
use common::service_bootstrap::{init_logging, print_startup_banner, LoggingOptions, ServiceInfo};
use common::shutdown::cancel_on_signal;
use common::{ServiceArgs, SqliteClient, SystemClock};
use errors::{PlantError, PlantResult};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> PlantResult<()> {
    let args = ServiceArgs::parse();
    let mut config = CollsrvConfig::load(&args.config)?;
    config.service.database_path = args.get_db_path(&config.service.database_path);

    if args.validate {
        common::logging::init(&args.log_level)
            .map_err(|e| PlantError::StartupFailed(e.to_string()))?;
        return match config.validate() {
            Ok(()) => {
                info!(
                    "Configuration {} is valid ({} devices)",
                    args.config.display(),
                    config.devices.len()
                );
                Ok(())
            },
            Err(e) => {
                error!("Configuration {} is invalid: {}", args.config.display(), e);
                Err(e)
            },
        };
    }

    let service = ServiceInfo::new(
        config.service.name.clone(),
        env!("CARGO_PKG_VERSION"),
        "Plant telemetry collector",
    );
    init_logging(
        &service,
        &LoggingOptions {
            dir: config.service.log_dir.clone(),
            json: config.service.log_json,
        },
        args.parse_log_level(),
        !args.no_color,
    )?;
    print_startup_banner(&service);

    config.validate()?;
    info!("Configuration loaded from {}", args.config.display());

    let client = SqliteClient::new(&config.service.database_path)
        .await
        .map_err(|e| PlantError::Database(e.to_string()))?;
    let store = Arc::new(SqliteStore::new(client.clone()).await?);

    let token = CancellationToken::new();
    let scheduler = Scheduler::with_token(token.clone(), Arc::new(SystemClock));
    let service = start_collector_service(&config, Stores::shared(store), &scheduler).await?;

    cancel_on_signal(token).await;
    info!("Shutting down");

    scheduler.shutdown().await;
    service.shutdown().await;
    client.close().await;

    info!("collsrv stopped");
    Ok(())
}
