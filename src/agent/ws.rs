//! WebSocket transport for the agent link

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{Connector, DeviceActions, Link, LinkEnd};
use crate::config::AgentConfig;
use crate::protocol::{ReplyBody, WireMessage};
use crate::Result;

/// Connector dialing the gateway over tokio-tungstenite
pub struct WsConnector {
    config: AgentConfig,
    actions: Arc<dyn DeviceActions>,
}

impl WsConnector {
    #[must_use]
    pub fn new(config: AgentConfig, actions: Arc<dyn DeviceActions>) -> Self {
        Self { config, actions }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn Link>> {
        let url = self.config.connect_url()?;
        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        tracing::debug!(server = %self.config.server_url, "handshake complete");

        Ok(Box::new(WsLink {
            stream,
            actions: Arc::clone(&self.actions),
            ping_interval: self.config.ping_interval,
            ping_timeout: self.config.ping_timeout,
        }))
    }
}

/// One live gateway connection
struct WsLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    actions: Arc<dyn DeviceActions>,
    ping_interval: Duration,
    ping_timeout: Duration,
}

#[async_trait]
impl Link for WsLink {
    async fn serve(mut self: Box<Self>) -> LinkEnd {
        let mut ping = tokio::time::interval(self.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; the connection just opened
        ping.tick().await;

        let mut last_heard = Instant::now();

        loop {
            tokio::select! {
                inbound = self.stream.next() => match inbound {
                    None => {
                        tracing::info!("connection closed");
                        return LinkEnd::Closed;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "transport error");
                        return LinkEnd::Closed;
                    }
                    Some(Ok(message)) => {
                        last_heard = Instant::now();
                        match message {
                            Message::Text(text) => {
                                if let Some(end) = self.handle_text(&text).await {
                                    return end;
                                }
                            }
                            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                            Message::Close(_) => {
                                tracing::info!("connection closed");
                                return LinkEnd::Closed;
                            }
                            Message::Binary(_) => {
                                tracing::warn!("ignoring binary frame");
                            }
                        }
                    }
                },
                _ = ping.tick() => {
                    // The silence timeout is shorter than the health-check
                    // backstop, so a hung link is torn down here first
                    if last_heard.elapsed() >= self.ping_timeout {
                        tracing::warn!(
                            silent_for = ?last_heard.elapsed(),
                            "nothing heard within the keepalive timeout"
                        );
                        return LinkEnd::PingTimeout;
                    }
                    if self.stream.send(Message::Ping(Vec::new().into())).await.is_err() {
                        return LinkEnd::Closed;
                    }
                }
            }
        }
    }
}

impl WsLink {
    /// Dispatch one inbound text frame; `Some(end)` stops the read loop
    async fn handle_text(&mut self, text: &str) -> Option<LinkEnd> {
        let message: WireMessage = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "unknown message shape, ignoring");
                return None;
            }
        };

        match message {
            WireMessage::Command(body) => {
                let (speech, display) = self.actions.run_command(&body.command, &body.x, &body.url);
                self.reply(ReplyBody {
                    token: body.token,
                    text: speech,
                    display,
                })
                .await
            }
            WireMessage::Query(body) => {
                let (speech, display) = self.actions.answer_query(&body.value, &body.x);
                self.reply(ReplyBody {
                    token: body.token,
                    text: speech,
                    display,
                })
                .await
            }
            WireMessage::Error(reason) => {
                tracing::error!(%reason, "gateway reported an error");
                Some(LinkEnd::ErrorNotice)
            }
            WireMessage::Reply(_) => {
                tracing::warn!("gateway sent a reply in the wrong direction, ignoring");
                None
            }
        }
    }

    async fn reply(&mut self, body: ReplyBody) -> Option<LinkEnd> {
        let message = WireMessage::Reply(body);
        let json = match serde_json::to_string(&message) {
            Ok(j) => j,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize reply");
                return None;
            }
        };

        if self.stream.send(Message::Text(json.into())).await.is_err() {
            return Some(LinkEnd::Closed);
        }
        None
    }
}
