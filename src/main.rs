use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;

use postslot::alert::{self, AlertHub};
use postslot::allocator::SlotAllocator;
use postslot::compactor;
use postslot::config::Config;
use postslot::store::{KvTakenDates, WalKv};
use postslot::wire;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    postslot::observability::init(config.metrics_port)?;

    let catalog = Arc::new(config.load_catalog()?);
    std::fs::create_dir_all(&config.data_dir)?;
    let kv = Arc::new(WalKv::open(config.wal_path())?);
    let store = KvTakenDates::with_location(kv.clone(), &config.namespace, &config.key);

    let alerts = Arc::new(AlertHub::new());
    tokio::spawn(alert::log_alerts(alerts.subscribe()));
    tokio::spawn(compactor::run_compactor(kv, config.compact_threshold));

    let allocator = Arc::new(SlotAllocator::new(catalog, Arc::new(store)).with_alerts(alerts));
    let semaphore = Arc::new(Semaphore::new(config.max_connections));

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("postslot listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!(
        "  template: {}",
        config
            .template_path
            .as_ref()
            .map_or("built-in".to_string(), |p| p.display().to_string())
    );
    info!("  store location: {}/{}", config.namespace, config.key);
    info!("  max_connections: {}", config.max_connections);

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

                let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                    tracing::warn!("connection limit reached, rejecting {peer}");
                    metrics::counter!(postslot::observability::CONNECTIONS_REJECTED_TOTAL).increment(1);
                    drop(socket);
                    continue;
                };

                info!("connection from {peer}");
                metrics::counter!(postslot::observability::CONNECTIONS_TOTAL).increment(1);
                metrics::gauge!(postslot::observability::CONNECTIONS_ACTIVE).increment(1.0);
                let allocator = allocator.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = wire::process_connection(socket, allocator).await {
                        tracing::error!("connection error from {peer}: {e}");
                    }
                    metrics::gauge!(postslot::observability::CONNECTIONS_ACTIVE).decrement(1.0);
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    info!("draining connections...");
    let drain_deadline = tokio::time::sleep(std::time::Duration::from_secs(10));
    tokio::pin!(drain_deadline);

    loop {
        if semaphore.available_permits() == config.max_connections {
            info!("all connections drained");
            break;
        }
        tokio::select! {
            _ = &mut drain_deadline => {
                let remaining = config.max_connections - semaphore.available_permits();
                tracing::warn!("drain timeout, {remaining} connections still open");
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
        }
    }

    info!("postslot stopped");
    Ok(())
}
