use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tracing::{info, warn};

use roster_core::{
    config::Config,
    platform::{port::PlatformConnector, throttled::ThrottledConnector},
    service::RosterService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::load()?;
    roster_core::logging::init("roster", cfg.log_json)?;

    let path = cfg
        .fixture_path
        .as_deref()
        .context("ROSTER_FIXTURE must point at a fixture world file")?;
    if cfg.api_id.is_some() || cfg.api_hash.is_some() {
        warn!("API_ID/API_HASH are set but only the fixture backend is built in; ignoring");
    }

    let mut connector: Arc<dyn PlatformConnector> = roster_fixture::connector_from_path(path)?;
    if !cfg.enumeration_min_interval.is_zero() {
        connector = Arc::new(ThrottledConnector::new(
            connector,
            cfg.enumeration_min_interval,
        ));
    }
    info!(fixture = %path.display(), "platform backend ready");

    let service = Arc::new(RosterService::new(connector, &cfg));
    let addr = SocketAddr::new(cfg.bind_addr, cfg.port);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        info!("shutdown requested");
    };
    roster_http::serve(addr, service.clone(), shutdown).await?;

    service.shutdown().await;
    info!("sessions closed");
    Ok(())
}
