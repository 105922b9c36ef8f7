//! Discord webhook delivery.
//!
//! Sends one rendered notification through a Discord webhook: resolve a
//! handle from the configured URL, then a single execute call carrying the
//! header text, username/avatar overrides, the embed list, and the optional
//! file attachment (as a multipart form).
//!
//! Delivery is strictly best-effort: at most one attempt, no retry, and no
//! error ever propagates past [`deliver`]. A resolution failure produces
//! exactly one diagnostic line on the session's output sink
//! (`pytest-discord error: <message>`); a failed send after successful
//! resolution is logged and dropped.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::multipart;
use serde::Serialize;

use crate::render::{Attachment, Embed};
use crate::session::LineSink;

/// Bound on each webhook HTTP call, so an unresponsive endpoint cannot
/// hang session teardown.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Hosts Discord serves webhooks from.
const WEBHOOK_HOSTS: [&str; 4] = [
    "discord.com",
    "discordapp.com",
    "ptb.discord.com",
    "canary.discord.com",
];

/// Result type for webhook operations.
pub type WebhookResult<T> = Result<T, WebhookError>;

/// Errors raised while resolving or executing a webhook.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The configured URL is not a Discord webhook URL.
    #[error("invalid webhook url: {0}")]
    InvalidUrl(String),

    /// The webhook does not exist (deleted, or the id is wrong).
    #[error("webhook not found")]
    NotFound,

    /// The webhook exists but the token does not grant access.
    #[error("webhook access forbidden")]
    Forbidden,

    /// Any other non-success HTTP response.
    #[error("webhook request failed with status {0}")]
    Http(u16),

    /// The request never produced a response (connect failure, timeout).
    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The message payload could not be encoded.
    #[error("failed to encode webhook payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// A validated webhook handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Webhook {
    id: u64,
    token: String,
    url: String,
}

impl Webhook {
    /// Parses and validates a Discord webhook URL.
    ///
    /// Accepts `https://discord.com/api/webhooks/<id>/<token>` and the
    /// `discordapp.com` / ptb / canary spellings, with or without an API
    /// version segment. Query parameters are dropped.
    ///
    /// # Errors
    ///
    /// [`WebhookError::InvalidUrl`] when the URL does not have that shape.
    pub fn from_url(url: &str) -> WebhookResult<Self> {
        parse_webhook_url(url).ok_or_else(|| WebhookError::InvalidUrl(url.to_string()))
    }

    /// The webhook's numeric id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The webhook's access token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The canonical URL used for API calls.
    pub fn url(&self) -> &str {
        &self.url
    }
}

fn parse_webhook_url(url: &str) -> Option<Webhook> {
    let without_query = url.split(['?', '#']).next()?;
    let rest = without_query
        .strip_prefix("https://")
        .or_else(|| without_query.strip_prefix("http://"))?;

    let (host, path) = rest.split_once('/')?;
    if !WEBHOOK_HOSTS.contains(&host) {
        return None;
    }

    let mut segments = path.split('/').filter(|s| !s.is_empty());
    if segments.next()? != "api" {
        return None;
    }

    let mut segment = segments.next()?;
    if let Some(version) = segment.strip_prefix('v')
        && !version.is_empty()
        && version.bytes().all(|b| b.is_ascii_digit())
    {
        segment = segments.next()?;
    }
    if segment != "webhooks" {
        return None;
    }

    let id: u64 = segments.next()?.parse().ok()?;
    let token = segments.next()?;
    if token.is_empty() || segments.next().is_some() {
        return None;
    }

    Some(Webhook {
        id,
        token: token.to_string(),
        url: format!("https://{host}/api/webhooks/{id}/{token}"),
    })
}

/// A message ready to post through a webhook.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookMessage {
    /// Message body text (the header line).
    pub content: String,

    /// Username override for this message.
    pub username: String,

    /// Avatar override; absent means the platform default.
    pub avatar_url: Option<String>,

    /// Ordered embed blocks.
    pub embeds: Vec<Embed>,

    /// Optional file attachment.
    pub attachment: Option<Attachment>,
}

/// Discord's execute-webhook JSON body.
#[derive(Serialize)]
struct ExecutePayload<'a> {
    content: &'a str,
    username: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar_url: Option<&'a str>,
    embeds: &'a [Embed],
}

impl WebhookMessage {
    /// Encodes the JSON payload Discord expects.
    pub fn payload_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&ExecutePayload {
            content: &self.content,
            username: &self.username,
            avatar_url: self.avatar_url.as_deref(),
            embeds: &self.embeds,
        })
    }
}

/// Confirms the webhook exists and is usable.
///
/// Performs a GET on the webhook endpoint and maps the failure statuses to
/// the [`WebhookError`] taxonomy.
pub async fn resolve(client: &reqwest::Client, url: &str) -> WebhookResult<Webhook> {
    let webhook = Webhook::from_url(url)?;

    let response = client.get(webhook.url()).send().await?;
    match response.status() {
        status if status.is_success() => Ok(webhook),
        StatusCode::NOT_FOUND => Err(WebhookError::NotFound),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(WebhookError::Forbidden),
        status => Err(WebhookError::Http(status.as_u16())),
    }
}

/// Executes the webhook once with the given message.
pub async fn send(
    client: &reqwest::Client,
    webhook: &Webhook,
    message: &WebhookMessage,
) -> WebhookResult<()> {
    let request = client.post(webhook.url());

    let request = if let Some(attachment) = &message.attachment {
        let part = multipart::Part::bytes(attachment.content.clone())
            .file_name(attachment.file_name.clone())
            .mime_str("text/markdown")?;
        let form = multipart::Form::new()
            .text("payload_json", message.payload_json()?)
            .part("files[0]", part);
        request.multipart(form)
    } else {
        request
            .header("Content-Type", "application/json")
            .body(message.payload_json()?)
    };

    let response = request.send().await?;
    match response.status() {
        status if status.is_success() => Ok(()),
        StatusCode::NOT_FOUND => Err(WebhookError::NotFound),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(WebhookError::Forbidden),
        status => Err(WebhookError::Http(status.as_u16())),
    }
}

/// Delivers a message to the configured destination, best-effort.
///
/// The HTTP client lives only for this call. On resolution failure, writes
/// one `pytest-discord error: <message>` line to the sink and returns; a
/// send failure after resolution is logged and swallowed. Never returns an
/// error.
pub async fn deliver(url: &str, message: &WebhookMessage, sink: &mut dyn LineSink) {
    let client = match reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            sink.write_line(&format!("pytest-discord error: {e}"));
            return;
        }
    };

    let webhook = match resolve(&client, url).await {
        Ok(webhook) => webhook,
        Err(e) => {
            sink.write_line(&format!("pytest-discord error: {e}"));
            return;
        }
    };

    tracing::debug!(
        webhook_id = webhook.id(),
        embeds = message.embeds.len(),
        attachment = message.attachment.is_some(),
        "posting test results"
    );

    if let Err(e) = send(&client, &webhook, message).await {
        tracing::warn!("failed to post test results: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::COLOUR_GREEN;
    use crate::session::BufferSink;

    #[test]
    fn test_from_url_accepts_standard_spellings() {
        for url in [
            "https://discord.com/api/webhooks/123456/token-abc",
            "https://discordapp.com/api/webhooks/123456/token-abc",
            "https://discord.com/api/v10/webhooks/123456/token-abc",
            "https://discord.com/api/webhooks/123456/token-abc?wait=true",
        ] {
            let webhook = Webhook::from_url(url).unwrap();
            assert_eq!(webhook.id(), 123456, "for {url}");
            assert_eq!(webhook.token(), "token-abc", "for {url}");
        }
    }

    #[test]
    fn test_from_url_rejects_malformed() {
        for url in [
            "not a url",
            "ftp://discord.com/api/webhooks/1/t",
            "https://example.com/api/webhooks/1/t",
            "https://discord.com/webhooks/1/t",
            "https://discord.com/api/webhooks/abc/t",
            "https://discord.com/api/webhooks/1",
            "https://discord.com/api/webhooks/1/t/extra",
        ] {
            assert!(
                matches!(Webhook::from_url(url), Err(WebhookError::InvalidUrl(_))),
                "expected {url} to be rejected"
            );
        }
    }

    #[test]
    fn test_canonical_url_drops_query() {
        let webhook =
            Webhook::from_url("https://discord.com/api/webhooks/9/tok?wait=true").unwrap();
        assert_eq!(webhook.url(), "https://discord.com/api/webhooks/9/tok");
    }

    #[test]
    fn test_payload_shape() {
        let message = WebhookMessage {
            content: "3 tests".to_string(),
            username: "pytest-discord".to_string(),
            avatar_url: None,
            embeds: vec![Embed::new("1 passed in 0.1 seconds", COLOUR_GREEN)],
            attachment: None,
        };

        let payload: serde_json::Value =
            serde_json::from_str(&message.payload_json().unwrap()).unwrap();
        assert_eq!(payload["content"], "3 tests");
        assert_eq!(payload["username"], "pytest-discord");
        assert!(payload.get("avatar_url").is_none());
        assert_eq!(payload["embeds"][0]["description"], "1 passed in 0.1 seconds");
        assert_eq!(payload["embeds"][0]["color"], COLOUR_GREEN);
        assert!(payload["embeds"][0].get("footer").is_none());
    }

    #[test]
    fn test_payload_includes_avatar_when_set() {
        let message = WebhookMessage {
            content: String::new(),
            username: "bot".to_string(),
            avatar_url: Some("https://example.com/icon.png".to_string()),
            embeds: Vec::new(),
            attachment: None,
        };

        let payload: serde_json::Value =
            serde_json::from_str(&message.payload_json().unwrap()).unwrap();
        assert_eq!(payload["avatar_url"], "https://example.com/icon.png");
    }

    #[tokio::test]
    async fn test_deliver_malformed_url_writes_one_diagnostic() {
        let message = WebhookMessage {
            content: "1 tests".to_string(),
            username: "pytest-discord".to_string(),
            avatar_url: None,
            embeds: Vec::new(),
            attachment: None,
        };

        let mut sink = BufferSink::default();
        deliver("https://example.com/not-a-webhook", &message, &mut sink).await;

        assert_eq!(sink.lines.len(), 1);
        assert!(sink.lines[0].starts_with("pytest-discord error: "));
    }
}
