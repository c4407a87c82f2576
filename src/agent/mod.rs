//! Device-side agent: keeps one outbound gateway link alive
//!
//! The agent dials the gateway, services inbound commands and queries until
//! the link dies, and relies on a fixed-period health check as the backstop
//! for reconnection. There is no exponential backoff — a failed handshake
//! simply waits for the next tick, which bounds the retry rate.

pub mod actions;
pub mod ws;

pub use actions::{DeviceActions, LoggingActions};
pub use ws::WsConnector;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::config::AgentConfig;
use crate::Result;

/// Connection state of the agent link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// Why a served link ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEnd {
    /// End of stream or transport failure
    Closed,
    /// The gateway sent an `error` message
    ErrorNotice,
    /// Nothing heard within the keepalive timeout
    PingTimeout,
}

/// One established connection, ready to be serviced
#[async_trait]
pub trait Link: Send {
    /// Run the read loop until the link dies
    ///
    /// The loop's only suspension point is the next inbound message (plus
    /// the keepalive timer); each message is dispatched and the loop goes
    /// straight back to waiting.
    async fn serve(self: Box<Self>) -> LinkEnd;
}

/// Establishes connections to the gateway
#[async_trait]
pub trait Connector: Send + Sync {
    /// Attempt one handshake
    ///
    /// # Errors
    ///
    /// Returns an error when the transport cannot be established; the
    /// supervisor logs it and waits for the next health-check tick.
    async fn connect(&self) -> Result<Box<dyn Link>>;
}

/// Drives the Disconnected → Connecting → Connected cycle
pub struct Supervisor<C> {
    connector: C,
    health_check_period: Duration,
    state_tx: watch::Sender<LinkState>,
}

impl<C: Connector> Supervisor<C> {
    /// Create a supervisor starting in `Disconnected`
    #[must_use]
    pub fn new(connector: C, health_check_period: Duration) -> Self {
        let (state_tx, _) = watch::channel(LinkState::Disconnected);
        Self {
            connector,
            health_check_period,
            state_tx,
        }
    }

    /// Observe state transitions
    #[must_use]
    pub fn state(&self) -> watch::Receiver<LinkState> {
        self.state_tx.subscribe()
    }

    /// Run forever: one connection attempt per health-check tick while
    /// disconnected, the first at process start
    ///
    /// While a session is being served the interval keeps ticking in the
    /// background; `Skip` discards those ticks, so when a long session ends
    /// the next attempt waits for the next period boundary instead of
    /// firing immediately.
    pub async fn run(&self) {
        let mut health = tokio::time::interval(self.health_check_period);
        health.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            health.tick().await;

            self.state_tx.send_replace(LinkState::Connecting);
            match self.connector.connect().await {
                Ok(link) => {
                    tracing::info!("connection opened");
                    self.state_tx.send_replace(LinkState::Connected);
                    let end = link.serve().await;
                    tracing::info!(?end, "connection ended");
                    self.state_tx.send_replace(LinkState::Disconnected);
                }
                Err(e) => {
                    tracing::error!(error = %e, "could not connect to gateway");
                    self.state_tx.send_replace(LinkState::Disconnected);
                }
            }
        }
    }
}

/// Run the agent with the real WebSocket transport until the process stops
///
/// # Errors
///
/// Returns an error only for unusable configuration; connection failures
/// are retried forever.
pub async fn run(config: AgentConfig, actions: Arc<dyn DeviceActions>) -> Result<()> {
    // Validate the URL up front so a typo fails fast instead of on a timer
    let _ = config.connect_url()?;

    let health_check_period = config.health_check_period;
    let supervisor = Supervisor::new(WsConnector::new(config, actions), health_check_period);
    supervisor.run().await;
    Ok(())
}
