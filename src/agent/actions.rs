//! What the agent actually does with commands and queries
//!
//! The link machinery is generic over this seam; deployments plug in their
//! own implementation for the machine they run on.

/// Executes commands and answers queries on the local machine
///
/// Each method returns `(speech, display)`: the spoken response and an
/// optional longer display-only text. Returning `(None, None)` from a
/// command acknowledges it silently ("Command sent to ...").
pub trait DeviceActions: Send + Sync {
    fn run_command(
        &self,
        command: &str,
        x: &serde_json::Value,
        url: &serde_json::Value,
    ) -> (Option<String>, Option<String>);

    fn answer_query(&self, value: &str, x: &serde_json::Value) -> (Option<String>, Option<String>);
}

/// Default implementation that only logs what it was asked
///
/// Commands are acknowledged silently; queries admit they are unsupported.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingActions;

impl DeviceActions for LoggingActions {
    fn run_command(
        &self,
        command: &str,
        x: &serde_json::Value,
        url: &serde_json::Value,
    ) -> (Option<String>, Option<String>) {
        tracing::info!(command, %x, %url, "received command");
        (None, None)
    }

    fn answer_query(&self, value: &str, x: &serde_json::Value) -> (Option<String>, Option<String>) {
        tracing::info!(value, %x, "received query");
        (
            Some("I don't know how to check that yet".to_string()),
            None,
        )
    }
}
