//! Voice-assistant webhook endpoint
//!
//! Accepts the platform's fulfillment request, resolves the caller to an
//! owner, routes the spoken command or query to the addressed device, and
//! turns the outcome into a human-readable response string. HTTP-level
//! authentication of the webhook itself is the platform integration's job;
//! identity comes from the access token in the request body.

use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::json;

use super::ApiState;
use crate::devices::{DeviceKey, DeviceSlot, Outcome, Request};

const FALLBACK: &str = "Sorry, I'm not sure how to answer that.";
const SPECIFY: &str = "Please specify which computer you are asking about";

/// Fulfillment request from the voice platform
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRequest {
    #[serde(default)]
    query_result: QueryResult,
    #[serde(default)]
    original_detect_intent_request: Option<DetectIntentRequest>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResult {
    /// Present when an upstream handler (e.g. small talk) already answered
    #[serde(default)]
    fulfillment_text: Option<String>,
    #[serde(default)]
    intent: Intent,
    #[serde(default)]
    parameters: Parameters,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Intent {
    #[serde(default)]
    display_name: String,
}

/// Intent parameters; the platform capitalizes its entity names
#[derive(Debug, Default, Deserialize)]
struct Parameters {
    #[serde(default, rename = "Command")]
    command: String,
    #[serde(default, rename = "Value")]
    value: String,
    #[serde(default, rename = "Computer")]
    computer: String,
    #[serde(default, rename = "X")]
    x: serde_json::Value,
    #[serde(default, rename = "url")]
    url: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectIntentRequest {
    #[serde(default)]
    payload: Payload,
}

#[derive(Debug, Default, Deserialize)]
struct Payload {
    #[serde(default)]
    user: UserPayload,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserPayload {
    #[serde(default)]
    access_token: Option<String>,
}

/// Build the webhook router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/webhook", post(handle_webhook).get(webhook_info))
        .with_state(state)
}

async fn webhook_info() -> &'static str {
    "This is meant to be a webhook for the voice assistant"
}

/// Plain spoken response
fn fulfillment(text: &str) -> Json<serde_json::Value> {
    Json(json!({ "fulfillmentText": text }))
}

/// Speak one thing, display another (e.g. read the gist of a file name but
/// show the full path)
fn rich_fulfillment(speech: &str, display: &str) -> Json<serde_json::Value> {
    Json(json!({
        "fulfillmentMessages": [{
            "platform": "ACTIONS_ON_GOOGLE",
            "simpleResponses": {
                "simpleResponses": [{
                    "textToSpeech": speech,
                    "displayText": display,
                }]
            }
        }]
    }))
}

async fn handle_webhook(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<WebhookRequest>,
) -> Json<serde_json::Value> {
    // Already fulfilled upstream, nothing for us to add
    if request.query_result.fulfillment_text.is_some() {
        return Json(json!({}));
    }

    let token = request
        .original_detect_intent_request
        .as_ref()
        .and_then(|r| r.payload.user.access_token.as_deref());
    let Some(token) = token else {
        return fulfillment("You must be logged in.");
    };

    let Some(owner) = state.credentials.owner_for_access_token(token) else {
        tracing::error!("webhook presented an invalid access token");
        return fulfillment("Invalid access token.");
    };

    let params = &request.query_result.parameters;
    let slot = resolve_slot(&state, &owner, &params.computer).await;

    match request.query_result.intent.display_name.as_str() {
        "Computer Command" => handle_command(&state, &owner, slot, params).await,
        "Computer Query" => handle_query(&state, &owner, slot, params).await,
        other => {
            tracing::debug!(intent = %other, "unhandled intent");
            fulfillment(FALLBACK)
        }
    }
}

/// Resolve which device is addressed, remembering and falling back to the
/// owner's last-used one
async fn resolve_slot(state: &ApiState, owner: &str, computer: &str) -> Option<DeviceSlot> {
    if let Some(slot) = DeviceSlot::parse(computer) {
        state
            .last_device
            .lock()
            .await
            .insert(owner.to_string(), slot);
        Some(slot)
    } else {
        state.last_device.lock().await.get(owner).copied()
    }
}

async fn handle_command(
    state: &Arc<ApiState>,
    owner: &str,
    slot: Option<DeviceSlot>,
    params: &Parameters,
) -> Json<serde_json::Value> {
    // Power-on is the one command that never travels over a device
    // connection: the target is off, so it goes out as a wake packet instead
    if params.command.trim().eq_ignore_ascii_case("power on") {
        let Some(slot) = slot else {
            return fulfillment(SPECIFY);
        };
        return match state.credentials.wol_mac(owner, slot) {
            Some(mac) => match state.wol.wake(&mac).await {
                Ok(()) => fulfillment(&format!("Woke your {slot}")),
                Err(e) => {
                    tracing::error!(error = %e, owner, %slot, "wake-on-lan send failed");
                    fulfillment(&format!("Could not wake your {slot}"))
                }
            },
            None => fulfillment(&format!("Your {slot} is not set up for wake-on-LAN")),
        };
    }

    let request = Request::Command {
        command: params.command.clone(),
        x: params.x.clone(),
        url: params.url.clone(),
    };
    let quiet_ack = slot.map(|s| format!("Command sent to {s}"));
    dispatch(state, owner, slot, request, quiet_ack).await
}

async fn handle_query(
    state: &Arc<ApiState>,
    owner: &str,
    slot: Option<DeviceSlot>,
    params: &Parameters,
) -> Json<serde_json::Value> {
    // Location is answered from the connection itself; the device is not
    // asked anything
    if params.value.trim().eq_ignore_ascii_case("where") {
        let Some(slot) = slot else {
            return fulfillment(SPECIFY);
        };
        return locate_device(state, owner, slot).await;
    }

    let request = Request::Query {
        value: params.value.clone(),
        x: params.x.clone(),
    };
    dispatch(state, owner, slot, request, None).await
}

/// Answer "where is my X" from the handle's remote address
async fn locate_device(state: &Arc<ApiState>, owner: &str, slot: DeviceSlot) -> Json<serde_json::Value> {
    let key = DeviceKey::new(owner, slot);
    let handle = state.registry.lock().await.lookup(&key);
    let Some(handle) = handle else {
        return fulfillment(&format!("Could not find location of your {slot}"));
    };

    let Some(ip) = handle.remote_ip else {
        return fulfillment(&format!("Unknown location for your {slot}"));
    };

    if state.home_ip == Some(ip) {
        return fulfillment(&format!("Your {slot} is at home"));
    }

    match state.geo.locate(ip).await {
        Some(location) => fulfillment(&format!("Your {slot} is in {location} ({ip})")),
        None => fulfillment(&format!("Unknown location for your {slot}")),
    }
}

/// Forward a request over the device's live connection and phrase the outcome
async fn dispatch(
    state: &Arc<ApiState>,
    owner: &str,
    slot: Option<DeviceSlot>,
    request: Request,
    quiet_ack: Option<String>,
) -> Json<serde_json::Value> {
    let Some(slot) = slot else {
        return fulfillment(SPECIFY);
    };

    let key = DeviceKey::new(owner, slot);
    let handle = state.registry.lock().await.lookup(&key);
    let Some(handle) = handle else {
        return fulfillment(&format!("Your {slot} is not currently online"));
    };

    match state
        .correlator
        .send_and_wait(&handle, request, state.reply_timeout)
        .await
    {
        Outcome::Reply(reply) => match (reply.text, reply.display) {
            (Some(text), Some(display)) => rich_fulfillment(&text, &display),
            (Some(text), None) => fulfillment(&text),
            (None, _) => match quiet_ack {
                Some(ack) => fulfillment(&ack),
                None => fulfillment(&format!("Your {slot} did not respond")),
            },
        },
        Outcome::TimedOut => fulfillment(&format!("Your {slot} did not respond")),
        Outcome::ConnectionLost => fulfillment(&format!("Your {slot} is not currently online")),
        Outcome::Busy => fulfillment(&format!("Your {slot} is still working on your last request")),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request as HttpRequest, StatusCode};
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    use super::*;
    use crate::auth::CredentialStore;
    use crate::config::UserConfig;
    use crate::devices::{Correlator, DeviceRegistry};
    use crate::geo::NullGeoLocator;
    use crate::wake::WolSender;
    use crate::Result;

    /// Records wake requests instead of touching the network
    #[derive(Default)]
    struct RecordingWol {
        macs: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WolSender for RecordingWol {
        async fn wake(&self, mac: &str) -> Result<()> {
            self.macs.lock().unwrap().push(mac.to_string());
            Ok(())
        }
    }

    fn test_state(wol: Arc<RecordingWol>) -> Arc<ApiState> {
        let users = [UserConfig {
            id: "alice".to_string(),
            access_token: "assistant-token".to_string(),
            laptop_token: Some("laptop-secret".to_string()),
            desktop_token: Some("desktop-secret".to_string()),
            laptop_mac: Some("aa:bb:cc:dd:ee:ff".to_string()),
            desktop_mac: None,
        }];
        Arc::new(ApiState {
            registry: Arc::new(Mutex::new(DeviceRegistry::new())),
            correlator: Arc::new(Correlator::new()),
            credentials: Arc::new(CredentialStore::from_config(&users)),
            wol,
            geo: Arc::new(NullGeoLocator),
            last_device: Mutex::new(HashMap::new()),
            reply_timeout: Duration::from_millis(50),
            home_ip: None,
        })
    }

    fn webhook_body(intent: &str, params: serde_json::Value, token: Option<&str>) -> String {
        let mut body = json!({
            "queryResult": {
                "intent": { "displayName": intent },
                "parameters": params,
            }
        });
        if let Some(token) = token {
            body["originalDetectIntentRequest"] =
                json!({ "payload": { "user": { "accessToken": token } } });
        }
        body.to_string()
    }

    async fn post_webhook(state: Arc<ApiState>, body: String) -> serde_json::Value {
        let app = router(state);
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/webhook")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn small_talk_already_fulfilled_passes_through() {
        let state = test_state(Arc::default());
        let body = json!({ "queryResult": { "fulfillmentText": "Hi!" } }).to_string();
        let response = post_webhook(state, body).await;
        assert_eq!(response, json!({}));
    }

    #[tokio::test]
    async fn missing_token_requires_login() {
        let state = test_state(Arc::default());
        let body = webhook_body("Computer Command", json!({"Command": "open"}), None);
        let response = post_webhook(state, body).await;
        assert_eq!(response["fulfillmentText"], "You must be logged in.");
    }

    #[tokio::test]
    async fn invalid_token_is_rejected() {
        let state = test_state(Arc::default());
        let body = webhook_body("Computer Command", json!({"Command": "open"}), Some("bogus"));
        let response = post_webhook(state, body).await;
        assert_eq!(response["fulfillmentText"], "Invalid access token.");
    }

    #[tokio::test]
    async fn offline_device_is_reported() {
        let state = test_state(Arc::default());
        let body = webhook_body(
            "Computer Command",
            json!({"Command": "open", "Computer": "laptop"}),
            Some("assistant-token"),
        );
        let response = post_webhook(state, body).await;
        assert_eq!(
            response["fulfillmentText"],
            "Your laptop is not currently online"
        );
    }

    #[tokio::test]
    async fn no_device_named_and_no_history_asks_which() {
        let state = test_state(Arc::default());
        let body = webhook_body(
            "Computer Command",
            json!({"Command": "open"}),
            Some("assistant-token"),
        );
        let response = post_webhook(state, body).await;
        assert_eq!(response["fulfillmentText"], SPECIFY);
    }

    #[tokio::test]
    async fn power_on_delegates_to_wake_sender() {
        let wol = Arc::new(RecordingWol::default());
        let state = test_state(Arc::clone(&wol));
        let body = webhook_body(
            "Computer Command",
            json!({"Command": "power on", "Computer": "laptop"}),
            Some("assistant-token"),
        );
        let response = post_webhook(state, body).await;
        assert_eq!(response["fulfillmentText"], "Woke your laptop");
        assert_eq!(*wol.macs.lock().unwrap(), vec!["aa:bb:cc:dd:ee:ff"]);
    }

    #[tokio::test]
    async fn power_on_without_mac_is_explained() {
        let state = test_state(Arc::default());
        let body = webhook_body(
            "Computer Command",
            json!({"Command": "power on", "Computer": "desktop"}),
            Some("assistant-token"),
        );
        let response = post_webhook(state, body).await;
        assert_eq!(
            response["fulfillmentText"],
            "Your desktop is not set up for wake-on-LAN"
        );
    }

    #[tokio::test]
    async fn unknown_intent_falls_back() {
        let state = test_state(Arc::default());
        let body = webhook_body("Chitchat", json!({}), Some("assistant-token"));
        let response = post_webhook(state, body).await;
        assert_eq!(response["fulfillmentText"], FALLBACK);
    }

    #[tokio::test]
    async fn where_query_with_unlocatable_ip_is_unknown() {
        use crate::devices::DeviceHandle;

        let state = test_state(Arc::default());
        let (handle, rx) = DeviceHandle::new(
            DeviceKey::new("alice", DeviceSlot::Laptop),
            Some("203.0.113.7".parse().unwrap()),
        );
        std::mem::forget(rx);
        state.registry.lock().await.register(handle);

        let body = webhook_body(
            "Computer Query",
            json!({"Value": "where", "Computer": "laptop"}),
            Some("assistant-token"),
        );
        let response = post_webhook(state, body).await;
        assert_eq!(
            response["fulfillmentText"],
            "Unknown location for your laptop"
        );
    }

    #[tokio::test]
    async fn where_query_from_home_ip() {
        use crate::devices::DeviceHandle;

        let wol = Arc::default();
        let state = test_state(wol);
        // Rebuild with a home IP configured
        let state = Arc::new(ApiState {
            registry: Arc::clone(&state.registry),
            correlator: Arc::clone(&state.correlator),
            credentials: Arc::clone(&state.credentials),
            wol: Arc::clone(&state.wol),
            geo: Arc::clone(&state.geo),
            last_device: Mutex::new(HashMap::new()),
            reply_timeout: state.reply_timeout,
            home_ip: Some("203.0.113.7".parse().unwrap()),
        });

        let (handle, rx) = DeviceHandle::new(
            DeviceKey::new("alice", DeviceSlot::Desktop),
            Some("203.0.113.7".parse().unwrap()),
        );
        std::mem::forget(rx);
        state.registry.lock().await.register(handle);

        let body = webhook_body(
            "Computer Query",
            json!({"Value": "where", "Computer": "desktop"}),
            Some("assistant-token"),
        );
        let response = post_webhook(state, body).await;
        assert_eq!(response["fulfillmentText"], "Your desktop is at home");
    }

    #[tokio::test]
    async fn remembered_device_answers_followups() {
        let state = test_state(Arc::default());
        state
            .last_device
            .lock()
            .await
            .insert("alice".to_string(), DeviceSlot::Desktop);

        // No Computer parameter: falls back to the remembered desktop
        let body = webhook_body(
            "Computer Command",
            json!({"Command": "open"}),
            Some("assistant-token"),
        );
        let response = post_webhook(state, body).await;
        assert_eq!(
            response["fulfillmentText"],
            "Your desktop is not currently online"
        );
    }
}
