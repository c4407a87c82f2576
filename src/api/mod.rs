//! HTTP API server: voice-assistant webhook and device WebSocket endpoint

pub mod health;
pub mod socket;
pub mod webhook;

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use crate::auth::CredentialStore;
use crate::config::ServerConfig;
use crate::devices::{Correlator, DeviceRegistry, DeviceSlot, SharedDeviceRegistry};
use crate::geo::{GeoLocator, HttpGeoLocator, NullGeoLocator};
use crate::wake::{UdpWolSender, WolSender};
use crate::Result;

/// Shared state for API handlers
pub struct ApiState {
    pub registry: SharedDeviceRegistry,
    pub correlator: Arc<Correlator>,
    pub credentials: Arc<CredentialStore>,
    pub wol: Arc<dyn WolSender>,
    pub geo: Arc<dyn GeoLocator>,
    /// Last device each owner addressed, so "open a terminal" without naming
    /// a computer goes to the one mentioned last
    pub last_device: Mutex<HashMap<String, DeviceSlot>>,
    /// Deadline for webhook-initiated requests
    pub reply_timeout: Duration,
    /// A device connecting from this address is "at home"
    pub home_ip: Option<IpAddr>,
}

impl ApiState {
    /// Build the shared state from configuration
    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Arc<Self> {
        let geo: Arc<dyn GeoLocator> = match &config.geo_url {
            Some(url) => Arc::new(HttpGeoLocator::new(url)),
            None => Arc::new(NullGeoLocator),
        };

        Arc::new(Self {
            registry: Arc::new(Mutex::new(DeviceRegistry::new())),
            correlator: Arc::new(Correlator::new()),
            credentials: Arc::new(CredentialStore::from_config(&config.users)),
            wol: Arc::new(UdpWolSender::default()),
            geo,
            last_device: Mutex::new(HashMap::new()),
            reply_timeout: config.reply_timeout(),
            home_ip: config.home_ip,
        })
    }
}

/// Assemble the full gateway router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .merge(health::router())
        .merge(webhook::router(Arc::clone(&state)))
        .merge(socket::router(state))
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until the process is stopped
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
pub async fn serve(state: Arc<ApiState>, port: u16) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "gateway listening");

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
