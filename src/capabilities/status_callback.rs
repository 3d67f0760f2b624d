//! Resources exposing the latest Twilio status callback.
//!
//! Both read the [`CallbackStore`] synchronously; no lock outlives `read`.

use std::collections::HashMap;

use crate::callbacks::{CallbackEvent, CallbackStore};
use crate::mcp::protocol::ReadResourceResult;
use crate::mcp::registry::{Locator, ResourceDefinition, ResourceHandler};

use super::{CALLBACK_BY_ID_RESOURCE, CALLBACK_RAW_RESOURCE};

/// Template for the per-identifier callback resource.
pub const CALLBACK_BY_ID_TEMPLATE: &str = "twilio://Accounts/{accountId}/Messages/{callId}";

/// Fixed URI of the raw callback resource.
pub const CALLBACK_RAW_URI: &str = "twilio://statuscallback";

fn pretty(event: &CallbackEvent) -> String {
    serde_json::to_string_pretty(event).unwrap_or_else(|_| event.to_value().to_string())
}

/// `twilio://Accounts/{accountId}/Messages/{callId}`: the held callback,
/// if it belongs to `callId`.
#[derive(Debug, Clone)]
pub struct CallbackByIdResource {
    store: CallbackStore,
}

impl CallbackByIdResource {
    /// Create the resource over a store handle.
    pub fn new(store: CallbackStore) -> Self {
        Self { store }
    }
}

impl ResourceHandler for CallbackByIdResource {
    fn definition(&self) -> ResourceDefinition {
        ResourceDefinition {
            name: CALLBACK_BY_ID_RESOURCE.to_owned(),
            description: "Latest Twilio status callback for a call or message SID".to_owned(),
            locator: Locator::Template(CALLBACK_BY_ID_TEMPLATE.to_owned()),
            mime_type: "text/plain".to_owned(),
        }
    }

    fn read(&self, uri: &str, variables: &HashMap<String, String>) -> ReadResourceResult {
        let call_id = variables.get("callId").map_or("", String::as_str);
        let text = match self.store.latest_for(call_id) {
            Some(event) => pretty(&event),
            None => format!("No status callback received for {call_id}"),
        };
        ReadResourceResult::text(uri, "text/plain", text)
    }
}

/// `twilio://statuscallback`: the held callback as JSON, or `null`.
#[derive(Debug, Clone)]
pub struct CallbackRawResource {
    store: CallbackStore,
}

impl CallbackRawResource {
    /// Create the resource over a store handle.
    pub fn new(store: CallbackStore) -> Self {
        Self { store }
    }
}

impl ResourceHandler for CallbackRawResource {
    fn definition(&self) -> ResourceDefinition {
        ResourceDefinition {
            name: CALLBACK_RAW_RESOURCE.to_owned(),
            description: "Raw JSON of the most recent Twilio status callback".to_owned(),
            locator: Locator::Fixed(CALLBACK_RAW_URI.to_owned()),
            mime_type: "application/json".to_owned(),
        }
    }

    fn read(&self, uri: &str, _variables: &HashMap<String, String>) -> ReadResourceResult {
        let text = match self.store.latest() {
            Some(event) => pretty(&event),
            None => "null".to_owned(),
        };
        ReadResourceResult::text(uri, "application/json", text)
    }
}
