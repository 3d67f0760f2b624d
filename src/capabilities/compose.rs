//! `compose-send-message` prompt.

use serde_json::{json, Map, Value};

use crate::mcp::protocol::{Content, GetPromptResult, PromptMessage, Role};
use crate::mcp::registry::{PromptArgument, PromptDefinition, PromptHandler};

use super::{COMPOSE_SEND_MESSAGE_PROMPT, SEND_MESSAGE_TOOL};

/// Renders instructions for calling `send-message`. Reads no state.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComposeSendMessagePrompt;

impl PromptHandler for ComposeSendMessagePrompt {
    fn definition(&self) -> PromptDefinition {
        PromptDefinition {
            name: COMPOSE_SEND_MESSAGE_PROMPT.to_owned(),
            description: "Prepare an SMS to be sent with the send-message tool".to_owned(),
            arguments: vec![
                PromptArgument {
                    name: "to".to_owned(),
                    description: "Destination phone number in +E.164 format".to_owned(),
                    required: true,
                },
                PromptArgument {
                    name: "message".to_owned(),
                    description: "Message content to send".to_owned(),
                    required: true,
                },
            ],
        }
    }

    fn render(&self, arguments: &Map<String, Value>) -> GetPromptResult {
        let to = arguments.get("to").and_then(Value::as_str).unwrap_or_default();
        let message = arguments
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let call_args = json!({ "to": to, "message": message });
        let text = format!(
            "Send an SMS to {to} using the `{SEND_MESSAGE_TOOL}` tool with \
             arguments {call_args}. \
             Use the number exactly as given in E.164 format and send the message text unchanged. \
             Report the returned message SID, or the error text if the send fails."
        );

        GetPromptResult {
            description: Some(format!("Send an SMS to {to}")),
            messages: vec![PromptMessage {
                role: Role::User,
                content: Content::text(text),
            }],
        }
    }
}
