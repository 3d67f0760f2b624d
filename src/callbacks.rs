//! Single-slot store for the most recent Twilio status callback.
//!
//! The store is owned by the composition root and handed out as a cheap
//! [`Clone`] handle: the webhook listener writes through it, resource
//! handlers read through it. Lock guards are never held across an `.await`.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Keys that identify the call or message a callback belongs to, in lookup order.
pub const IDENTIFIER_KEYS: [&str; 3] = ["CallSid", "MessageSid", "SmsSid"];

/// An opaque delivery-status callback payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackEvent(Map<String, Value>);

impl CallbackEvent {
    /// Wrap a JSON object.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Build an event from string key/value pairs (as posted by Twilio).
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), Value::String(v.into())))
                .collect(),
        )
    }

    /// Call/message identifier, taken from the first present key in
    /// [`IDENTIFIER_KEYS`].
    pub fn identifier(&self) -> Option<&str> {
        IDENTIFIER_KEYS
            .iter()
            .find_map(|key| {
                self.0
                    .get(*key)
                    .and_then(Value::as_str)
                    .filter(|id| !id.is_empty())
            })
    }

    /// Look up a single field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Borrow the underlying map.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Convert into a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

/// Shared handle to the single callback slot.
#[derive(Debug, Clone, Default)]
pub struct CallbackStore {
    slot: Arc<RwLock<Option<CallbackEvent>>>,
}

impl CallbackStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held event with `event`.
    pub fn record(&self, event: CallbackEvent) {
        debug!(id = event.identifier().unwrap_or("unknown"), "recording status callback");
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(event);
    }

    /// The most recently recorded event, if any.
    pub fn latest(&self) -> Option<CallbackEvent> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The held event, but only if its identifier equals `id`.
    pub fn latest_for(&self, id: &str) -> Option<CallbackEvent> {
        self.latest()
            .filter(|event| event.identifier().is_some_and(|held| held == id))
    }
}
