/// Outbound notifications
///
/// Workflows hand fully rendered plain-text messages to a [`Notifier`] and
/// only care whether delivery was accepted. Delivery is synchronous on the
/// request path; nothing here retries.
///
/// # Implementations
///
/// - [`SendGridNotifier`]: SendGrid v3 mail API over HTTPS
/// - [`LogNotifier`]: writes the message to the log and reports success,
///   for local development

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

const SENDGRID_API_URL: &str = "https://api.sendgrid.com";

/// Upper bound on one provider round trip
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Link path segments followed by a bearer token
const TOKEN_LINK_MARKERS: [&str; 2] = ["/invite/", "/reset-password/"];

/// Error type for notification delivery
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// HTTP client could not be constructed
    #[error("Notification client setup failed: {0}")]
    Setup(String),

    /// The request never got a response
    #[error("Notification request failed: {0}")]
    Transport(String),

    /// The provider answered with a non-success status
    #[error("Notification rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Delivers a message to one recipient
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends a plain-text message and returns the provider's status code
    ///
    /// Any `Ok` status means the provider accepted the message.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<u16, NotifyError>;
}

/// SendGrid v3 `mail/send` client
#[derive(Clone)]
pub struct SendGridNotifier {
    client: reqwest::Client,
    timeout: Duration,
    base_url: String,
    api_key: String,
    from: String,
}

impl SendGridNotifier {
    /// Creates a notifier sending from `from` with the given API key
    ///
    /// # Errors
    ///
    /// `NotifyError::Setup` if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>, from: impl Into<String>) -> Result<Self, NotifyError> {
        Self::with_base_url(SENDGRID_API_URL, api_key, from)
    }

    /// Creates a notifier against a non-default API host
    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        from: impl Into<String>,
    ) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| NotifyError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            timeout: SEND_TIMEOUT,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            from: from.into(),
        })
    }

    /// Request timeout applied to every send
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn payload(&self, to: &str, subject: &str, body: &str) -> serde_json::Value {
        json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": self.from },
            "subject": subject,
            "content": [{ "type": "text/plain", "value": body }],
            "tracking_settings": {
                "click_tracking": { "enable": false, "enable_text": false }
            }
        })
    }
}

impl std::fmt::Debug for SendGridNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendGridNotifier")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("api_key", &"<redacted>")
            .field("from", &self.from)
            .finish()
    }
}

#[async_trait]
impl Notifier for SendGridNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<u16, NotifyError> {
        let url = format!("{}/v3/mail/send", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.payload(to, subject, body))
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(to = %to, status = status.as_u16(), "Mail provider rejected message");
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(to = %to, status = status.as_u16(), "Mail accepted");
        Ok(status.as_u16())
    }
}

/// Replaces the token in every invitation or reset link with `<redacted>`
fn redact_links(body: &str) -> String {
    body.split_inclusive(char::is_whitespace)
        .map(|word| {
            let marker = TOKEN_LINK_MARKERS
                .iter()
                .find_map(|m| word.find(m).map(|at| at + m.len()));

            match marker {
                Some(end) => {
                    let trailing = &word[word.trim_end().len()..];
                    format!("{}<redacted>{}", &word[..end], trailing)
                }
                None => word.to_string(),
            }
        })
        .collect()
}

/// Notifier that only logs
///
/// Link tokens are redacted before logging.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<u16, NotifyError> {
        info!(to = %to, subject = %subject, body = %redact_links(body), "Notification (log only)");
        Ok(202)
    }
}
