//! Notification transports.
//!
//! A [`Notifier`] delivers text to a [`Destination`]. Callers never see the
//! outcome directly: messages go through the
//! [`NotificationQueue`](super::NotificationQueue), whose workers log failures.

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use smarthealth_core::Destination;

/// Failure to deliver one message.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The HTTP request could not be completed
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote API answered with an error
    #[error("rejected by remote API ({status}): {body}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// The transport is not usable as configured
    #[error("notifier misconfigured: {0}")]
    Misconfigured(String),
}

/// Delivers text to a destination.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Transport name, used in logs
    fn name(&self) -> &str;

    /// Deliver a single message.
    async fn deliver(&self, destination: &Destination, text: &str) -> Result<(), NotifyError>;
}

// =============================================================================
// Telegram
// =============================================================================

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

/// Settings for the Telegram Bot API transport.
#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token issued by BotFather
    #[serde(default)]
    pub bot_token: String,

    /// API root, overridable for testing against a local mock
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: default_api_base(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl TelegramConfig {
    /// Whether a token has been set.
    pub fn is_configured(&self) -> bool {
        !self.bot_token.trim().is_empty()
    }

    fn send_message_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.bot_token.trim()
        )
    }
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = if self.is_configured() { "<set>" } else { "<unset>" };
        f.debug_struct("TelegramConfig")
            .field("bot_token", &redacted)
            .field("api_base", &self.api_base)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// Sends messages through the Telegram Bot API.
pub struct TelegramNotifier {
    client: Client,
    config: TelegramConfig,
}

impl TelegramNotifier {
    /// Build a notifier from explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Misconfigured`] if no token is set, or a transport
    /// error if the HTTP client cannot be built.
    pub fn new(config: TelegramConfig) -> Result<Self, NotifyError> {
        if !config.is_configured() {
            return Err(NotifyError::Misconfigured("bot token is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(concat!("smarthealth/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, config })
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn deliver(&self, destination: &Destination, text: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.config.send_message_url())
            .json(&SendMessage {
                chat_id: destination.as_str(),
                text,
                parse_mode: "Markdown",
            })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body: String = response
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(512)
            .collect();
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

// =============================================================================
// Local transports
// =============================================================================

/// Writes messages to the log instead of sending them. Used when no transport
/// is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, destination: &Destination, text: &str) -> Result<(), NotifyError> {
        tracing::info!(destination = %destination, text, "Notification (not sent: no transport)");
        Ok(())
    }
}

/// A delivered message, as captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Target
    pub destination: Destination,
    /// Body
    pub text: String,
}

/// Keeps every message in memory. Optionally fails every delivery after
/// recording it.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    deliveries: Mutex<Vec<Delivery>>,
    fail: bool,
}

impl RecordingNotifier {
    /// A notifier that records and succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier that records and then reports failure.
    pub fn failing() -> Self {
        Self {
            deliveries: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Everything delivered so far.
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    /// Number of deliveries so far.
    pub fn count(&self) -> usize {
        self.deliveries.lock().len()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(&self, destination: &Destination, text: &str) -> Result<(), NotifyError> {
        self.deliveries.lock().push(Delivery {
            destination: destination.clone(),
            text: text.to_string(),
        });
        if self.fail {
            return Err(NotifyError::Rejected {
                status: 400,
                body: "chat not found".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_message_url() {
        let config = TelegramConfig {
            bot_token: "123:abc".to_string(),
            api_base: "http://localhost:8081/".to_string(),
            timeout_secs: 5,
        };
        assert_eq!(
            config.send_message_url(),
            "http://localhost:8081/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn test_empty_token_rejected() {
        let result = TelegramNotifier::new(TelegramConfig::default());
        assert!(matches!(result, Err(NotifyError::Misconfigured(_))));
    }

    #[test]
    fn test_debug_hides_token() {
        let config = TelegramConfig {
            bot_token: "secret-token".to_string(),
            ..TelegramConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<set>"));
    }

    #[test]
    fn test_config_defaults_from_toml_shape() {
        let config: TelegramConfig = serde_json::from_str(r#"{"bot_token":"t"}"#).unwrap();
        assert_eq!(config.api_base, "https://api.telegram.org");
        assert_eq!(config.timeout_secs, 10);
    }

    #[tokio::test]
    async fn test_recording_notifier() {
        let notifier = RecordingNotifier::failing();
        let dest = Destination::parse("42").unwrap();
        assert!(notifier.deliver(&dest, "hi").await.is_err());
        assert_eq!(notifier.count(), 1);
        assert_eq!(notifier.deliveries()[0].text, "hi");
    }
}
