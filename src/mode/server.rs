use crate::{
    anchor::{anchor_loop, AnchorWorker, AnchorWriter},
    chain,
    config::{AppConfig, AppState},
    handlers::router,
    storage::LedgerStore,
};

use std::{net::SocketAddr, time::Duration};
use anyhow::Context;
use axum_server::{tls_rustls::RustlsConfig, Handle};
use tracing::{error, info};

pub async fn run(cfg: AppConfig) -> anyhow::Result<()> {
    let store = LedgerStore::open(&cfg.sled_path)?;
    let chain = chain::from_config(&cfg.chain).await?;

    let (anchor, rx) = AnchorWriter::new(store.clone(), cfg.anchor.queue_capacity);
    let worker = AnchorWorker::new(store.clone(), chain.clone(), cfg.anchor.clone());
    tokio::spawn(async move {
        if let Err(e) = anchor_loop(worker, rx).await {
            error!(error = %e, "anchor writer stopped");
        }
    });

    let addr: SocketAddr = cfg.listen
        .parse()
        .context("invalid listen address")?;
    let tls = match (&cfg.https_cert, &cfg.https_key) {
        (Some(cert), Some(key)) => Some(
            RustlsConfig::from_pem_file(cert, key)
                .await
                .context("loading TLS certificate/key")?,
        ),
        _ => None,
    };

    let state = AppState::new(cfg, store.clone(), chain, anchor);
    let sweeper = state.retry.clone();
    tokio::spawn(async move {
        if let Err(e) = sweeper.sweep_loop().await {
            error!(error = %e, "anchor sweep stopped");
        }
    });

    let app = router(state);

    let handle = Handle::new();
    let shutdown = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            shutdown.graceful_shutdown(Some(Duration::from_secs(10)));
        }
    });

    info!(%addr, tls = tls.is_some(), "treasury api listening");
    match tls {
        Some(tls) => {
            axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(app.into_make_service())
                .await?
        }
        None => {
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await?
        }
    }

    store.flush().await?;
    Ok(())
}
