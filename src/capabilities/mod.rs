//! The capabilities this server exposes and the wiring that registers them.
//!
//! - [`send_message::SendMessageTool`]: tool `send-message`
//! - [`status_callback::CallbackByIdResource`]: resource `callback-by-id`
//! - [`status_callback::CallbackRawResource`]: resource `callback-raw`
//! - [`compose::ComposeSendMessagePrompt`]: prompt `compose-send-message`

use std::sync::Arc;

use crate::callbacks::CallbackStore;
use crate::carrier::MessagingService;
use crate::mcp::{CapabilityRegistry, RegistryError};

pub mod compose;
pub mod send_message;
pub mod status_callback;

/// Tool name for sending an SMS.
pub const SEND_MESSAGE_TOOL: &str = "send-message";

/// Prompt name for the send-message instructions.
pub const COMPOSE_SEND_MESSAGE_PROMPT: &str = "compose-send-message";

/// Resource name for the templated callback lookup.
pub const CALLBACK_BY_ID_RESOURCE: &str = "callback-by-id";

/// Resource name for the raw latest callback.
pub const CALLBACK_RAW_RESOURCE: &str = "callback-raw";

/// Build the registry with every capability bound to its collaborators.
///
/// # Errors
///
/// Returns [`RegistryError`] if a capability fails to register, which
/// indicates a programming error and should abort startup.
pub fn build_registry(
    messaging: Arc<MessagingService>,
    callbacks: CallbackStore,
) -> Result<CapabilityRegistry, RegistryError> {
    let mut registry = CapabilityRegistry::new();

    registry.register_tool(Arc::new(send_message::SendMessageTool::new(messaging)))?;
    registry.register_resource(Arc::new(status_callback::CallbackByIdResource::new(
        callbacks.clone(),
    )))?;
    registry.register_resource(Arc::new(status_callback::CallbackRawResource::new(
        callbacks,
    )))?;
    registry.register_prompt(Arc::new(compose::ComposeSendMessagePrompt))?;

    Ok(registry)
}
