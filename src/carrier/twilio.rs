//! Twilio implementation using the `2010-04-01/Accounts/{sid}/Messages.json` API.
//!
//! Authenticates with an API key + secret over HTTP basic auth and posts a
//! form-encoded body, exactly once per message.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::{CarrierConfig, ConfigError, API_BASE_FIELD};

use super::{sanitize_error_body, CarrierApi, CarrierError, MessageResource, OutboundMessage};

/// HTTP connect timeout for the reqwest client.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// HTTP request timeout for a single message create.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Twilio REST API version segment.
const API_VERSION: &str = "2010-04-01";

/// Error document returned by Twilio on non-2xx responses.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct TwilioErrorBody {
    /// Twilio error code (e.g. 21211).
    #[serde(default)]
    pub code: Option<i64>,
    /// Human-readable message.
    #[serde(default)]
    pub message: Option<String>,
    /// Documentation link for the error code.
    #[serde(default)]
    pub more_info: Option<String>,
    /// HTTP status echoed in the body.
    #[serde(default)]
    pub status: Option<u16>,
}

/// Client for the Twilio Messages API.
#[derive(Clone)]
pub struct TwilioClient {
    client: reqwest::Client,
    endpoint: Url,
    api_key: String,
    api_secret: String,
    status_callback: Option<Url>,
}

impl std::fmt::Debug for TwilioClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl TwilioClient {
    /// Build a client from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] if the messages endpoint cannot
    /// be derived from the configured base URL.
    pub fn new(config: &CarrierConfig) -> Result<Self, ConfigError> {
        let endpoint = messages_endpoint(config.api_base(), config.account_sid())?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("twilio-messaging-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build HTTP client with timeouts, using default");
                reqwest::Client::default()
            });

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key().to_owned(),
            api_secret: config.api_secret().to_owned(),
            status_callback: config.status_callback().cloned(),
        })
    }

    /// Fully-qualified `Messages.json` URL for the configured account.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

/// Derive `{base}/2010-04-01/Accounts/{sid}/Messages.json`.
fn messages_endpoint(base: &Url, account_sid: &str) -> Result<Url, ConfigError> {
    let mut endpoint = base.clone();
    endpoint
        .path_segments_mut()
        .map_err(|()| ConfigError::InvalidUrl {
            field: API_BASE_FIELD,
            reason: format!("{base} cannot be used as a base URL"),
        })?
        .pop_if_empty()
        .extend([API_VERSION, "Accounts", account_sid, "Messages.json"]);
    Ok(endpoint)
}

#[async_trait]
impl CarrierApi for TwilioClient {
    async fn create_message(
        &self,
        message: OutboundMessage<'_>,
    ) -> Result<MessageResource, CarrierError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("To", message.to),
            ("From", message.from),
            ("Body", message.body),
        ];
        if let Some(ref callback) = self.status_callback {
            form.push(("StatusCallback", callback.as_str()));
        }

        debug!(endpoint = %self.endpoint, "POST Messages.json");

        let response = self
            .client
            .post(self.endpoint.clone())
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(rejection(status.as_u16(), &body));
        }

        serde_json::from_str::<MessageResource>(&body)
            .map_err(|e| CarrierError::MalformedResponse(e.to_string()))
    }
}

/// Map a non-2xx response body to [`CarrierError::Rejected`].
fn rejection(status: u16, body: &str) -> CarrierError {
    match serde_json::from_str::<TwilioErrorBody>(body) {
        Ok(parsed) if parsed.message.is_some() || parsed.code.is_some() => {
            let mut message = parsed
                .message
                .map(|m| sanitize_error_body(&m))
                .unwrap_or_else(|| "no error message".to_owned());
            if let Some(info) = parsed.more_info {
                message = format!("{message} ({info})");
            }
            CarrierError::Rejected {
                status: parsed.status.unwrap_or(status),
                code: parsed.code,
                message,
            }
        }
        _ => CarrierError::Rejected {
            status,
            code: None,
            message: sanitize_error_body(body),
        },
    }
}
