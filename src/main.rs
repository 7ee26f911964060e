//! PolyTrader entrypoint
//!
//! Establishes the trading session for the configured wallet and, with the
//! `gateway` feature, serves the read-only proxy endpoints.

use anyhow::Result;
use tracing::info;

use polytrader::app::{init_logging, App};
use polytrader::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config = AppConfig::load()?;
    info!(%config, "starting polytrader");

    let app = App::bootstrap(config)?;
    let session = app.orchestrator.initialize().await?;
    info!(
        safe = %format!("{:#x}", session.safe_address),
        complete = session.is_complete(),
        "trading session established"
    );

    #[cfg(feature = "gateway")]
    serve_gateway(&app, session).await?;

    Ok(())
}

#[cfg(feature = "gateway")]
async fn serve_gateway(app: &App, session: polytrader::TradingSession) -> Result<()> {
    use anyhow::Context;
    use polytrader::gateway::{create_router, GatewayState};
    use std::sync::Arc;

    let state = Arc::new(GatewayState {
        client: reqwest::Client::new(),
        gamma_url: app.config.venue.gamma_url.clone(),
        data_api_url: app.config.venue.data_api_url.clone(),
        credentials: session.api_credentials,
    });

    let listener = tokio::net::TcpListener::bind(&app.config.gateway.listen_addr)
        .await
        .with_context(|| format!("failed binding {}", app.config.gateway.listen_addr))?;
    info!(addr = %app.config.gateway.listen_addr, "gateway listening");

    axum::serve(listener, create_router(state))
        .await
        .context("gateway server failed")
}
