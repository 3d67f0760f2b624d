//! Tests for `MessagingService`: outcome normalisation over a mock carrier.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use twilio_messaging_mcp::carrier::{
    CarrierApi, CarrierError, FailureKind, MessageResource, MessagingService, OutboundMessage,
    SendOutcome, SendRequest,
};

// ---------------------------------------------------------------------------
// Mock carrier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Reply {
    Sid(&'static str),
    EmptySid,
    NoSidWithMessage(&'static str),
    Rejected,
    Transport,
}

/// A mock carrier that returns a canned reply and records every call.
struct MockCarrier {
    reply: Reply,
    calls: Mutex<Vec<(String, String, String)>>,
}

impl MockCarrier {
    fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<(String, String, String)> {
        self.calls.lock().expect("calls lock").clone()
    }
}

async fn transport_error() -> CarrierError {
    match reqwest::Client::new().get("not a url").send().await {
        Err(e) => CarrierError::Transport(e),
        Ok(_) => panic!("request to an invalid URL should fail"),
    }
}

#[async_trait]
impl CarrierApi for MockCarrier {
    async fn create_message(
        &self,
        message: OutboundMessage<'_>,
    ) -> Result<MessageResource, CarrierError> {
        self.calls.lock().expect("calls lock").push((
            message.to.to_owned(),
            message.from.to_owned(),
            message.body.to_owned(),
        ));

        match self.reply {
            Reply::Sid(sid) => Ok(MessageResource {
                sid: Some(sid.to_owned()),
                status: Some("queued".to_owned()),
                ..MessageResource::default()
            }),
            Reply::EmptySid => Ok(MessageResource {
                sid: Some(String::new()),
                ..MessageResource::default()
            }),
            Reply::NoSidWithMessage(msg) => Ok(MessageResource {
                error_message: Some(msg.to_owned()),
                ..MessageResource::default()
            }),
            Reply::Rejected => Err(CarrierError::Rejected {
                status: 400,
                code: Some(21211),
                message: "The 'To' number is not a valid phone number.".to_owned(),
            }),
            Reply::Transport => Err(transport_error().await),
        }
    }
}

fn service(carrier: &Arc<MockCarrier>) -> MessagingService {
    MessagingService::new(Arc::clone(carrier) as Arc<dyn CarrierApi>, "+15551230000")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sent_outcome_carries_sid() {
    let carrier = MockCarrier::new(Reply::Sid("SM123"));
    let outcome = service(&carrier)
        .send(&SendRequest::new("+15559876543", "hello"))
        .await;

    assert_eq!(
        outcome,
        SendOutcome::Sent {
            message_sid: "SM123".to_owned()
        }
    );
    assert_eq!(outcome.message_sid(), Some("SM123"));
}

#[tokio::test]
async fn sender_identity_is_attached_once() {
    let carrier = MockCarrier::new(Reply::Sid("SM1"));
    let svc = service(&carrier);
    assert_eq!(svc.from_number(), "+15551230000");
    let _ = svc.send(&SendRequest::new("+15559876543", "hello")).await;

    assert_eq!(
        carrier.calls(),
        vec![(
            "+15559876543".to_owned(),
            "+15551230000".to_owned(),
            "hello".to_owned()
        )]
    );
}

#[tokio::test]
async fn rejection_becomes_error_failure() {
    let carrier = MockCarrier::new(Reply::Rejected);
    let outcome = service(&carrier)
        .send(&SendRequest::new("+1", "hello"))
        .await;

    match outcome {
        SendOutcome::Failed(failure) => {
            assert_eq!(failure.kind, FailureKind::Error);
            assert!(failure.reason.contains("21211"));
        }
        other => panic!("expected failure, got: {other:?}"),
    }
}

#[tokio::test]
async fn transport_error_becomes_error_failure_without_retry() {
    let carrier = MockCarrier::new(Reply::Transport);
    let outcome = service(&carrier)
        .send(&SendRequest::new("+15559876543", "hello"))
        .await;

    match outcome {
        SendOutcome::Failed(failure) => {
            assert_eq!(failure.kind, FailureKind::Error);
            assert!(failure.reason.starts_with("carrier request failed"));
        }
        other => panic!("expected failure, got: {other:?}"),
    }
    assert_eq!(carrier.calls().len(), 1, "exactly one attempt");
}

#[tokio::test]
async fn repeated_failures_keep_the_same_shape() {
    let carrier = MockCarrier::new(Reply::Transport);
    let svc = service(&carrier);
    let request = SendRequest::new("+15559876543", "hello");

    let first = svc.send(&request).await;
    let second = svc.send(&request).await;

    for outcome in [&first, &second] {
        match outcome {
            SendOutcome::Failed(failure) => {
                assert_eq!(failure.kind, FailureKind::Error);
                assert!(!failure.reason.is_empty());
            }
            other => panic!("expected failure, got: {other:?}"),
        }
    }
    assert_eq!(carrier.calls().len(), 2);
}

#[tokio::test]
async fn empty_sid_is_missing_sid_failure() {
    let carrier = MockCarrier::new(Reply::EmptySid);
    let outcome = service(&carrier)
        .send(&SendRequest::new("+15559876543", "hello"))
        .await;

    match outcome {
        SendOutcome::Failed(failure) => {
            assert_eq!(failure.kind, FailureKind::MissingSid);
            assert_eq!(
                failure.reason,
                "carrier response did not include a message SID"
            );
        }
        other => panic!("expected failure, got: {other:?}"),
    }
}

#[tokio::test]
async fn missing_sid_uses_carrier_error_message_when_present() {
    let carrier = MockCarrier::new(Reply::NoSidWithMessage("Queue overflow"));
    let outcome = service(&carrier)
        .send(&SendRequest::new("+15559876543", "hello"))
        .await;

    match outcome {
        SendOutcome::Failed(failure) => {
            assert_eq!(failure.kind, FailureKind::MissingSid);
            assert_eq!(failure.reason, "Queue overflow");
        }
        other => panic!("expected failure, got: {other:?}"),
    }
}

#[tokio::test]
async fn empty_inputs_never_reach_the_carrier() {
    let carrier = MockCarrier::new(Reply::Sid("SM1"));
    let svc = service(&carrier);

    let no_destination = svc.send(&SendRequest::new("  ", "hello")).await;
    let no_body = svc.send(&SendRequest::new("+15559876543", "")).await;

    assert!(no_destination.message_sid().is_none());
    assert!(no_body.message_sid().is_none());
    assert!(carrier.calls().is_empty());
}
