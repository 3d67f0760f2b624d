//! `send-message` tool: one SMS through the [`MessagingService`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::carrier::{FailureKind, MessagingService, SendOutcome, SendRequest};
use crate::mcp::protocol::CallToolResult;
use crate::mcp::registry::{ToolDefinition, ToolHandler};

use super::SEND_MESSAGE_TOOL;

/// Text returned when the carrier acknowledged without a message SID.
pub const MISSING_SID_TEXT: &str = "Failed to send message. Check logs for details.";

/// Sends an SMS to `to` with body `message`.
#[derive(Debug)]
pub struct SendMessageTool {
    messaging: Arc<MessagingService>,
}

impl SendMessageTool {
    /// Create the tool around a shared messaging service.
    pub fn new(messaging: Arc<MessagingService>) -> Self {
        Self { messaging }
    }
}

/// Render a [`SendOutcome`] as a tool result.
pub fn outcome_to_result(outcome: &SendOutcome) -> CallToolResult {
    match outcome {
        SendOutcome::Sent { message_sid } => {
            CallToolResult::success(format!("Message sent successfully. SID: {message_sid}"))
        }
        SendOutcome::Failed(failure) => match failure.kind {
            FailureKind::MissingSid => CallToolResult::error(MISSING_SID_TEXT),
            FailureKind::Error => {
                CallToolResult::error(format!("Error sending message: {}", failure.reason))
            }
        },
    }
}

#[async_trait]
impl ToolHandler for SendMessageTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: SEND_MESSAGE_TOOL.to_owned(),
            description: "Send an SMS message via Twilio".to_owned(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "to": {
                        "type": "string",
                        "minLength": 1,
                        "description": "Destination phone number in +E.164 format (+XXXXXXXXXX)"
                    },
                    "message": {
                        "type": "string",
                        "minLength": 1,
                        "description": "Message content to send"
                    }
                },
                "required": ["to", "message"]
            }),
        }
    }

    async fn call(&self, arguments: &Map<String, Value>) -> CallToolResult {
        let to = arguments.get("to").and_then(Value::as_str).unwrap_or_default();
        let message = arguments
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let outcome = self.messaging.send(&SendRequest::new(to, message)).await;
        outcome_to_result(&outcome)
    }
}
