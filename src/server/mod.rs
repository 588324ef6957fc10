use axum::{routing::get, Router};
use std::net::{IpAddr, SocketAddr};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info};

pub mod events;
pub mod handlers;
pub mod state;

use crate::constants::PORT_ATTEMPTS;
use crate::error::{Error, Result};

pub use self::events::BridgeMessage;
pub use self::state::AppState;
use handlers::{
    bridge_events_stream, get_drawn, get_state, index_html, map_js, post_drawn, style_css,
};

// Create the main application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_html))
        .route("/style.css", get(style_css))
        .route("/map.js", get(map_js))
        .route("/api/state", get(get_state))
        .route("/api/events", get(bridge_events_stream))
        .route("/api/drawn", get(get_drawn).post(post_drawn))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(state)
}

/// Binds the first free port in `port..port + PORT_ATTEMPTS` and serves in
/// the background until `shutdown` fires. Returns the bound address.
pub async fn spawn(
    state: AppState,
    host: IpAddr,
    port: u16,
    shutdown: oneshot::Receiver<()>,
) -> Result<SocketAddr> {
    let listener = bind_with_fallback(host, port).await?;
    let addr = listener.local_addr()?;
    let app = create_app(state);

    info!("   ✅ HTTP server started successfully at http://{}", addr);

    tokio::spawn(async move {
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown.await;
            })
            .await;
        match served {
            Ok(()) => debug!("HTTP server on {} stopped", addr),
            Err(e) => error!("HTTP server on {} failed: {}", addr, e),
        }
    });

    Ok(addr)
}

async fn bind_with_fallback(host: IpAddr, port: u16) -> Result<TcpListener> {
    let mut last_error = None;
    // Port 0 lets the OS choose, no point in retrying it
    let attempts = if port == 0 { 1 } else { PORT_ATTEMPTS };

    for offset in 0..attempts {
        let candidate = port.saturating_add(offset);
        match TcpListener::bind(SocketAddr::new(host, candidate)).await {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                debug!("Port {} unavailable: {}", candidate, e);
                last_error = Some(e);
            }
        }
    }

    Err(Error::Io(last_error.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::AddrInUse, "no port available")
    })))
}
