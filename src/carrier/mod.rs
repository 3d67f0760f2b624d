//! SMS carrier abstraction.
//!
//! Defines the [`CarrierApi`] trait (the one operation the server needs from
//! a carrier), the [`MessagingService`] adapter that normalises every carrier
//! result into a [`SendOutcome`], and the shared wire/error types.
//!
//! One implementation is provided:
//! - [`twilio::TwilioClient`]: Twilio `Messages.json` REST API

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub mod twilio;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// A single SMS to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    /// Destination phone number in E.164 format.
    pub to: String,
    /// Message text.
    pub body: String,
}

impl SendRequest {
    /// Build a request from borrowed parts.
    pub fn new(to: &str, body: &str) -> Self {
        Self {
            to: to.to_owned(),
            body: body.to_owned(),
        }
    }
}

/// Outbound message as handed to a [`CarrierApi`], with the sender attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundMessage<'a> {
    /// Destination phone number.
    pub to: &'a str,
    /// Sender phone number.
    pub from: &'a str,
    /// Message text.
    pub body: &'a str,
}

/// Subset of the carrier's message resource that this crate reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResource {
    /// Carrier-assigned message identifier (`SM...`).
    #[serde(default)]
    pub sid: Option<String>,
    /// Delivery status at acknowledgment time (`queued`, `accepted`, ...).
    #[serde(default)]
    pub status: Option<String>,
    /// Destination as recorded by the carrier.
    #[serde(default)]
    pub to: Option<String>,
    /// Sender as recorded by the carrier.
    #[serde(default)]
    pub from: Option<String>,
    /// Carrier error code, if the message was created in a failed state.
    #[serde(default)]
    pub error_code: Option<i64>,
    /// Carrier error message, if any.
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Why a send did not produce a message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transport failure or explicit carrier rejection.
    Error,
    /// The carrier acknowledged the request without a message identifier.
    MissingSid,
}

/// A failed send, with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Human-readable reason; never empty.
    pub reason: String,
}

/// Result of exactly one send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The carrier accepted the message.
    Sent {
        /// Carrier-assigned message identifier; never empty.
        message_sid: String,
    },
    /// The send failed.
    Failed(SendFailure),
}

impl SendOutcome {
    /// Message identifier, present only for [`SendOutcome::Sent`].
    pub fn message_sid(&self) -> Option<&str> {
        match self {
            Self::Sent { message_sid } => Some(message_sid),
            Self::Failed(_) => None,
        }
    }

    fn failed(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self::Failed(SendFailure {
            kind,
            reason: reason.into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by carrier implementations.
#[derive(Debug, thiserror::Error)]
pub enum CarrierError {
    /// HTTP transport failure.
    #[error("carrier request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The carrier rejected the request.
    #[error("carrier rejected request ({status}){}: {message}", code_suffix(.code))]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Carrier-specific error code, when the body carried one.
        code: Option<i64>,
        /// Sanitised error message.
        message: String,
    },

    /// A success response whose body could not be parsed.
    #[error("carrier response parse error: {0}")]
    MalformedResponse(String),
}

fn code_suffix(code: &Option<i64>) -> String {
    code.map(|c| format!(" code {c}")).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// The single carrier operation the server depends on.
///
/// Implementations must be `Send + Sync` so they can be shared with
/// capability handlers behind an `Arc`.
#[async_trait]
pub trait CarrierApi: Send + Sync {
    /// Create (send) one message. Performs at most one network request.
    async fn create_message(
        &self,
        message: OutboundMessage<'_>,
    ) -> Result<MessageResource, CarrierError>;
}

// ---------------------------------------------------------------------------
// MessagingService
// ---------------------------------------------------------------------------

/// Adapter that sends through a [`CarrierApi`] and never fails past its
/// own boundary: every result becomes a [`SendOutcome`].
pub struct MessagingService {
    api: Arc<dyn CarrierApi>,
    from_number: String,
}

impl std::fmt::Debug for MessagingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagingService")
            .field("from_number", &self.from_number)
            .finish_non_exhaustive()
    }
}

impl MessagingService {
    /// Create a service sending from `from_number` through `api`.
    pub fn new(api: Arc<dyn CarrierApi>, from_number: impl Into<String>) -> Self {
        Self {
            api,
            from_number: from_number.into(),
        }
    }

    /// Sender number attached to every message.
    pub fn from_number(&self) -> &str {
        &self.from_number
    }

    /// Send one SMS. Makes at most one carrier call and no retries.
    pub async fn send(&self, request: &SendRequest) -> SendOutcome {
        if request.to.trim().is_empty() {
            return SendOutcome::failed(FailureKind::Error, "destination must not be empty");
        }
        if request.body.is_empty() {
            return SendOutcome::failed(FailureKind::Error, "message body must not be empty");
        }

        info!(to = %request.to, chars = request.body.chars().count(), "sending SMS");

        let message = OutboundMessage {
            to: &request.to,
            from: &self.from_number,
            body: &request.body,
        };

        match self.api.create_message(message).await {
            Ok(resource) => match resource.sid.filter(|sid| !sid.is_empty()) {
                Some(message_sid) => {
                    info!(
                        sid = %message_sid,
                        status = resource.status.as_deref().unwrap_or("unknown"),
                        "SMS accepted by carrier"
                    );
                    SendOutcome::Sent { message_sid }
                }
                None => {
                    let reason = resource
                        .error_message
                        .filter(|m| !m.trim().is_empty())
                        .unwrap_or_else(|| "carrier response did not include a message SID".to_owned());
                    warn!(to = %request.to, %reason, "carrier acknowledged SMS without a SID");
                    SendOutcome::failed(FailureKind::MissingSid, reason)
                }
            },
            Err(e) => {
                warn!(to = %request.to, error = %e, "SMS send failed");
                SendOutcome::failed(FailureKind::Error, e.to_string())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Longest error body, in characters, kept in a [`CarrierError`].
const MAX_ERROR_BODY_CHARS: usize = 256;

/// Collapse whitespace, redact credential-like tokens and truncate an error
/// body before it is surfaced to the MCP client.
pub fn sanitize_error_body(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut sanitized = collapsed;
    for pattern in [
        r"SK[0-9a-fA-F]{32}",
        r"Basic [A-Za-z0-9+/=]{16,}",
        r"sk-[A-Za-z0-9]{32,}",
    ] {
        if let Ok(regex) = Regex::new(pattern) {
            sanitized = regex.replace_all(&sanitized, "[REDACTED]").into_owned();
        }
    }

    if sanitized.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = sanitized
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }
    sanitized
}
