//! HTTP endpoint receiving Twilio delivery-status callbacks.
//!
//! Twilio posts form-encoded fields (`MessageSid`, `MessageStatus`, ...) to
//! the `StatusCallback` URL given at send time. Each accepted post replaces
//! the event held by the [`CallbackStore`] handle injected at construction.
//!
//! Posts are not authenticated: `X-Twilio-Signature` is keyed by the account
//! auth token, which this server never holds. Bind the listener to a trusted
//! interface (loopback behind a tunnel or reverse proxy). [`spawn`] warns
//! when it binds anything else.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Form, Router};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::callbacks::{CallbackEvent, CallbackStore};

/// Path the callback endpoint listens on.
pub const STATUS_CALLBACK_PATH: &str = "/statuscallback";

/// Errors starting the callback listener.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The listen address could not be bound.
    #[error("failed to bind status callback listener on {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
}

/// Whether `addr` accepts connections from beyond the local host.
pub fn binds_publicly(addr: &SocketAddr) -> bool {
    !addr.ip().is_loopback()
}

/// Build the callback router over a store handle.
pub fn router(store: CallbackStore) -> Router {
    Router::new()
        .route(STATUS_CALLBACK_PATH, post(receive_status_callback))
        .with_state(store)
}

async fn receive_status_callback(
    State(store): State<CallbackStore>,
    Form(fields): Form<BTreeMap<String, String>>,
) -> StatusCode {
    let event = CallbackEvent::from_pairs(fields);
    let Some(id) = event.identifier().map(str::to_owned) else {
        warn!("status callback without CallSid/MessageSid rejected");
        return StatusCode::BAD_REQUEST;
    };

    let status = event
        .get("MessageStatus")
        .or_else(|| event.get("CallStatus"))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_owned();
    store.record(event);
    info!(%id, %status, "status callback recorded");
    StatusCode::NO_CONTENT
}

/// Bind `addr` and serve the callback endpoint on a background task.
///
/// Returns the bound address (useful when `addr` uses port 0).
///
/// # Errors
///
/// Returns [`WebhookError::Bind`] if the address cannot be bound.
pub async fn spawn(addr: SocketAddr, store: CallbackStore) -> Result<SocketAddr, WebhookError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| WebhookError::Bind { addr, source })?;
    let local = listener
        .local_addr()
        .map_err(|source| WebhookError::Bind { addr, source })?;

    let app = router(store);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!(error = %e, "status callback listener stopped");
        }
    });

    if binds_publicly(&local) {
        warn!(
            addr = %local,
            "status callback listener is reachable beyond loopback; posts are unauthenticated"
        );
    }
    info!(addr = %local, path = STATUS_CALLBACK_PATH, "status callback listener started");
    Ok(local)
}
