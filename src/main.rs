use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;

use airtime::catalog::InMemoryCatalog;
use airtime::config::SchedulerConfig;
use airtime::tenant::TenantManager;
use airtime::wire::{self, AirtimeFactory};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("AIRTIME_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    airtime::observability::init(metrics_port)?;

    let port = std::env::var("AIRTIME_PORT").unwrap_or_else(|_| "5433".into());
    let bind = std::env::var("AIRTIME_BIND").unwrap_or_else(|_| "0.0.0.0".into());
    let password = std::env::var("AIRTIME_PASSWORD").unwrap_or_else(|_| "airtime".into());
    let max_connections: usize = std::env::var("AIRTIME_MAX_CONNECTIONS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(256);

    let config = SchedulerConfig::from_env()?;
    let catalog = match std::env::var("AIRTIME_CATALOG") {
        Ok(path) => InMemoryCatalog::load_json_file(Path::new(&path))?,
        Err(_) => InMemoryCatalog::new(),
    };
    let catalog_len = catalog.len();

    let tenant_manager = Arc::new(TenantManager::new(config.clone(), Arc::new(catalog))?);
    let factory = Arc::new(AirtimeFactory::new(tenant_manager, password));
    let semaphore = Arc::new(Semaphore::new(max_connections));

    let addr = format!("{bind}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("airtime listening on {addr}");
    info!(
        "  grid: {} days x {} hours, {}s per slot, house ad {}s",
        config.days_per_week,
        config.hours_per_day,
        config.slot_capacity_seconds,
        config.house_ad_duration_seconds
    );
    info!("  catalog: {catalog_len} items");
    info!("  max_connections: {max_connections}");
    info!("  metrics: {}", metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight connections
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    tracing::warn!("SIGTERM handler unavailable: {e}");
                    ctrl_c.await.ok();
                }
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (socket, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!("accept error: {e}");
                        continue;
                    }
                };

                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!("connection limit reached, rejecting {peer}");
                        metrics::counter!(airtime::observability::CONNECTIONS_REJECTED_TOTAL).increment(1);
                        drop(socket);
                        continue;
                    }
                };

                info!("connection from {peer}");
                metrics::counter!(airtime::observability::CONNECTIONS_TOTAL).increment(1);
                metrics::gauge!(airtime::observability::CONNECTIONS_ACTIVE).increment(1.0);
                let factory = factory.clone();

                tokio::spawn(async move {
                    let _permit = permit; // held until connection closes
                    if let Err(e) = wire::process_connection(socket, factory).await {
                        tracing::error!("connection error from {peer}: {e}");
                    }
                    metrics::gauge!(airtime::observability::CONNECTIONS_ACTIVE).decrement(1.0);
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    // Wait for in-flight connections to finish (up to 10s)
    info!("draining connections...");
    let drain_deadline = tokio::time::sleep(std::time::Duration::from_secs(10));
    tokio::pin!(drain_deadline);

    loop {
        if semaphore.available_permits() == max_connections {
            info!("all connections drained");
            break;
        }
        tokio::select! {
            _ = &mut drain_deadline => {
                let remaining = max_connections - semaphore.available_permits();
                tracing::warn!("drain timeout, {remaining} connections still open");
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
        }
    }

    info!("airtime stopped");
    Ok(())
}
