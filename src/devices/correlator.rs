//! Request/response correlation across a device connection
//!
//! Bridges one synchronous-looking webhook caller with one asynchronous
//! device link: the caller suspends until the device's reply arrives, the
//! deadline elapses, or the connection dies. The protocol is
//! request-then-reply, not pipelined — at most one request is outstanding
//! per connection, and a second caller is rejected with [`Outcome::Busy`]
//! rather than risking delivery of the wrong reply.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

use super::types::DeviceHandle;
use crate::protocol::{CommandBody, QueryBody, ReplyBody, WireMessage};

/// A command or query not yet assigned a correlation token
#[derive(Debug, Clone)]
pub enum Request {
    Command {
        command: String,
        x: serde_json::Value,
        url: serde_json::Value,
    },
    Query {
        value: String,
        x: serde_json::Value,
    },
}

impl Request {
    fn into_wire(self, token: Uuid) -> WireMessage {
        match self {
            Self::Command { command, x, url } => WireMessage::Command(CommandBody {
                token,
                command,
                x,
                url,
            }),
            Self::Query { value, x } => WireMessage::Query(QueryBody { token, value, x }),
        }
    }
}

/// Result of [`Correlator::send_and_wait`]
#[derive(Debug)]
pub enum Outcome {
    /// The device answered before the deadline
    Reply(ReplyBody),
    /// The deadline elapsed; a late reply will be dropped
    TimedOut,
    /// The connection was already closed, or closed mid-wait
    ConnectionLost,
    /// Another request is still outstanding on this connection
    Busy,
}

enum Completion {
    Reply(ReplyBody),
    ConnectionLost,
}

struct Waiter {
    token: Uuid,
    tx: oneshot::Sender<Completion>,
}

/// Matches each device reply to the request that asked for it
///
/// Pending waiters are keyed by connection id, so requests to different
/// devices never interact; per connection the Idle → Awaiting → Idle cycle
/// is enforced here.
#[derive(Default)]
pub struct Correlator {
    pending: Mutex<HashMap<Uuid, Waiter>>,
}

impl Correlator {
    /// Create a correlator with no outstanding requests
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Send `request` over `handle` and suspend until the correlated reply
    /// arrives, `timeout` elapses, or the connection dies
    ///
    /// Only the caller targeting this handle is suspended; concurrent calls
    /// for other handles proceed independently.
    pub async fn send_and_wait(
        &self,
        handle: &DeviceHandle,
        request: Request,
        timeout: Duration,
    ) -> Outcome {
        let token = Uuid::new_v4();

        let rx = {
            let mut pending = self.pending.lock().await;
            if pending.contains_key(&handle.conn_id) {
                return Outcome::Busy;
            }
            let (tx, rx) = oneshot::channel();
            pending.insert(handle.conn_id, Waiter { token, tx });
            rx
        };

        if handle.send(request.into_wire(token)).await.is_err() {
            // The transport rejected the send; leave no pending request behind
            self.clear(handle.conn_id, token).await;
            return Outcome::ConnectionLost;
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Completion::Reply(reply))) => Outcome::Reply(reply),
            Ok(Ok(Completion::ConnectionLost)) | Ok(Err(_)) => Outcome::ConnectionLost,
            Err(_) => {
                // Clearing the slot frees the handle for the next request and
                // turns any late reply into a logged drop
                self.clear(handle.conn_id, token).await;
                Outcome::TimedOut
            }
        }
    }

    /// Deliver a reply received on `conn_id` to its waiter
    ///
    /// Returns false when no request is outstanding or the token does not
    /// match the outstanding one — the caller logs and drops the message.
    pub async fn complete(&self, conn_id: Uuid, reply: ReplyBody) -> bool {
        let mut pending = self.pending.lock().await;
        match pending.remove(&conn_id) {
            Some(waiter) if waiter.token == reply.token => {
                waiter.tx.send(Completion::Reply(reply)).is_ok()
            }
            Some(waiter) => {
                tracing::warn!(
                    %conn_id,
                    got = %reply.token,
                    expected = %waiter.token,
                    "reply token does not match outstanding request, dropping"
                );
                pending.insert(conn_id, waiter);
                false
            }
            None => false,
        }
    }

    /// Fail the outstanding request on `conn_id`, if any, because its
    /// connection closed
    pub async fn abort(&self, conn_id: Uuid) {
        let waiter = self.pending.lock().await.remove(&conn_id);
        if let Some(waiter) = waiter {
            let _ = waiter.tx.send(Completion::ConnectionLost);
        }
    }

    /// Remove the pending entry for `conn_id` if it still belongs to `token`
    async fn clear(&self, conn_id: Uuid, token: Uuid) {
        let mut pending = self.pending.lock().await;
        if pending.get(&conn_id).is_some_and(|w| w.token == token) {
            pending.remove(&conn_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use super::*;
    use crate::devices::types::{DeviceKey, DeviceSlot};

    fn test_handle() -> (DeviceHandle, mpsc::Receiver<WireMessage>) {
        DeviceHandle::new(DeviceKey::new("alice", DeviceSlot::Laptop), None)
    }

    fn token_of(msg: &WireMessage) -> Uuid {
        match msg {
            WireMessage::Command(c) => c.token,
            WireMessage::Query(q) => q.token,
            other => panic!("unexpected outbound message: {other:?}"),
        }
    }

    fn query(value: &str) -> Request {
        Request::Query {
            value: value.to_string(),
            x: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn reply_reaches_the_waiter() {
        let correlator = Arc::new(Correlator::new());
        let (handle, mut rx) = test_handle();
        let conn_id = handle.conn_id;

        let corr = Arc::clone(&correlator);
        let waiter = tokio::spawn(async move {
            corr.send_and_wait(&handle, query("battery"), Duration::from_secs(5))
                .await
        });

        let sent = rx.recv().await.unwrap();
        let token = token_of(&sent);
        assert!(
            correlator
                .complete(
                    conn_id,
                    ReplyBody {
                        token,
                        text: Some("97 percent".to_string()),
                        display: None,
                    }
                )
                .await
        );

        match waiter.await.unwrap() {
            Outcome::Reply(reply) => assert_eq!(reply.text.as_deref(), Some("97 percent")),
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_concurrent_request_is_busy() {
        let correlator = Arc::new(Correlator::new());
        let (handle, mut rx) = test_handle();
        let conn_id = handle.conn_id;

        let corr = Arc::clone(&correlator);
        let first_handle = handle.clone();
        let first = tokio::spawn(async move {
            corr.send_and_wait(&first_handle, query("battery"), Duration::from_secs(5))
                .await
        });

        // Wait until the first request is actually on the wire
        let sent = rx.recv().await.unwrap();
        let token = token_of(&sent);

        let second = correlator
            .send_and_wait(&handle, query("memory usage"), Duration::from_secs(5))
            .await;
        assert!(matches!(second, Outcome::Busy));

        // The first caller still gets its own reply
        correlator
            .complete(
                conn_id,
                ReplyBody {
                    token,
                    text: Some("ok".to_string()),
                    display: None,
                },
            )
            .await;
        assert!(matches!(first.await.unwrap(), Outcome::Reply(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_frees_handle_and_drops_late_reply() {
        let correlator = Correlator::new();
        let (handle, mut rx) = test_handle();
        let conn_id = handle.conn_id;

        let outcome = correlator
            .send_and_wait(&handle, query("battery"), Duration::from_secs(1))
            .await;
        assert!(matches!(outcome, Outcome::TimedOut));

        // The late reply finds no waiter and is dropped
        let first_sent = rx.recv().await.unwrap();
        assert!(
            !correlator
                .complete(conn_id, ReplyBody::ack(token_of(&first_sent)))
                .await
        );

        // The handle is immediately free for a new request
        let corr_handle = handle.clone();
        let second = tokio::spawn(async move {
            correlator
                .send_and_wait(&corr_handle, query("uptime"), Duration::from_secs(5))
                .await
        });
        let second_sent = rx.recv().await.unwrap();
        assert!(matches!(second_sent, WireMessage::Query(_)));
        drop(second.await);
    }

    #[tokio::test]
    async fn closed_transport_is_connection_lost_without_pending() {
        let correlator = Correlator::new();
        let (handle, rx) = test_handle();
        drop(rx);

        let outcome = correlator
            .send_and_wait(&handle, query("battery"), Duration::from_secs(5))
            .await;
        assert!(matches!(outcome, Outcome::ConnectionLost));
        assert!(correlator.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn abort_fails_the_waiter_with_connection_lost() {
        let correlator = Arc::new(Correlator::new());
        let (handle, mut rx) = test_handle();
        let conn_id = handle.conn_id;

        let corr = Arc::clone(&correlator);
        let waiter = tokio::spawn(async move {
            corr.send_and_wait(&handle, query("battery"), Duration::from_secs(5))
                .await
        });
        let _ = rx.recv().await.unwrap();

        correlator.abort(conn_id).await;
        assert!(matches!(waiter.await.unwrap(), Outcome::ConnectionLost));
    }

    #[tokio::test]
    async fn mismatched_token_leaves_waiter_intact() {
        let correlator = Arc::new(Correlator::new());
        let (handle, mut rx) = test_handle();
        let conn_id = handle.conn_id;

        let corr = Arc::clone(&correlator);
        let waiter = tokio::spawn(async move {
            corr.send_and_wait(&handle, query("battery"), Duration::from_secs(5))
                .await
        });
        let sent = rx.recv().await.unwrap();

        // An unsolicited reply with a bogus token must not complete the wait
        assert!(
            !correlator
                .complete(conn_id, ReplyBody::ack(Uuid::new_v4()))
                .await
        );
        assert!(
            correlator
                .complete(conn_id, ReplyBody::ack(token_of(&sent)))
                .await
        );
        assert!(matches!(waiter.await.unwrap(), Outcome::Reply(_)));
    }
}
