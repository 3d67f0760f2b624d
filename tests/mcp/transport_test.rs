//! `McpServer::serve` over in-memory streams: ordering, EOF, shutdown and
//! transport failures.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{oneshot, Notify};

use twilio_messaging_mcp::callbacks::CallbackStore;
use twilio_messaging_mcp::capabilities::build_registry;
use twilio_messaging_mcp::carrier::{
    CarrierApi, CarrierError, MessageResource, MessagingService, OutboundMessage,
};
use twilio_messaging_mcp::mcp::{McpServer, ServerInfo, ServerState, TransportError};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Carrier that signals when a send starts and waits to be released.
struct GatedCarrier {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl CarrierApi for GatedCarrier {
    async fn create_message(
        &self,
        _message: OutboundMessage<'_>,
    ) -> Result<MessageResource, CarrierError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(MessageResource {
            sid: Some("SM777".to_owned()),
            ..MessageResource::default()
        })
    }
}

/// Carrier that answers immediately.
struct InstantCarrier;

#[async_trait]
impl CarrierApi for InstantCarrier {
    async fn create_message(
        &self,
        _message: OutboundMessage<'_>,
    ) -> Result<MessageResource, CarrierError> {
        Ok(MessageResource {
            sid: Some("SM1".to_owned()),
            ..MessageResource::default()
        })
    }
}

fn server_over(carrier: Arc<dyn CarrierApi>) -> McpServer {
    let messaging = Arc::new(MessagingService::new(carrier, "+15551230000"));
    let registry = build_registry(messaging, CallbackStore::new()).expect("registry builds");
    McpServer::new(Arc::new(registry), ServerInfo::default())
}

/// Writer whose every write fails.
struct BrokenPipe;

impl AsyncWrite for BrokenPipe {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed")))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn parse_lines(output: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(output)
        .lines()
        .map(|line| serde_json::from_str(line).expect("each output line is JSON"))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn responses_follow_request_order_and_eof_closes() {
    let mut server = server_over(Arc::new(InstantCarrier));
    assert_eq!(server.state(), ServerState::Idle);

    let input = concat!(
        r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05"}}"#,
        "\n",
        r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"send-message","arguments":{"to":"+15559876543","message":"hello"}}}"#,
        "\n",
    );
    let mut output = Vec::new();

    server
        .serve(
            BufReader::new(input.as_bytes()),
            &mut output,
            std::future::pending::<()>(),
        )
        .await
        .expect("EOF is a clean shutdown");

    assert_eq!(server.state(), ServerState::Closed);
    assert!(server.client_initialized());

    let responses = parse_lines(&output);
    let ids: Vec<&Value> = responses.iter().map(|r| &r["id"]).collect();
    assert_eq!(ids, [&Value::from(1), &Value::from(2), &Value::from(3)]);
    assert_eq!(
        responses[2]["result"]["content"][0]["text"],
        "Message sent successfully. SID: SM1"
    );
}

#[tokio::test]
async fn parse_error_does_not_stop_the_loop() {
    let mut server = server_over(Arc::new(InstantCarrier));
    let input = "{oops\n{\"jsonrpc\":\"2.0\",\"id\":9,\"method\":\"ping\"}\n";
    let mut output = Vec::new();

    server
        .serve(
            BufReader::new(input.as_bytes()),
            &mut output,
            std::future::pending::<()>(),
        )
        .await
        .expect("serve completes");

    let responses = parse_lines(&output);
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["error"]["code"], -32700);
    assert_eq!(responses[0]["id"], Value::Null);
    assert_eq!(responses[1]["id"], 9);
    assert!(responses[1]["result"].is_object());
}

#[tokio::test]
async fn invalid_utf8_is_parse_error() {
    let mut server = server_over(Arc::new(InstantCarrier));
    let input: &[u8] = b"\xff\xfe\n";
    let mut output = Vec::new();

    server
        .serve(BufReader::new(input), &mut output, std::future::pending::<()>())
        .await
        .expect("serve completes");

    let responses = parse_lines(&output);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["error"]["code"], -32700);
}

#[tokio::test]
async fn oversized_line_is_rejected_and_skipped() {
    let mut server = server_over(Arc::new(InstantCarrier)).with_max_line_bytes(64);
    let input = format!(
        "{}\n{{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}}\n",
        "x".repeat(500)
    );
    let mut output = Vec::new();

    server
        .serve(
            BufReader::new(input.as_bytes()),
            &mut output,
            std::future::pending::<()>(),
        )
        .await
        .expect("serve completes");

    let responses = parse_lines(&output);
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["error"]["code"], -32600);
    assert_eq!(responses[0]["id"], Value::Null);
    assert_eq!(responses[1]["id"], 2);
    assert!(responses[1]["result"].is_object());
}

#[tokio::test]
async fn line_at_the_limit_is_accepted() {
    let line = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;
    let mut server = server_over(Arc::new(InstantCarrier)).with_max_line_bytes(line.len());
    let input = format!("{line}\n");
    let mut output = Vec::new();

    server
        .serve(
            BufReader::new(input.as_bytes()),
            &mut output,
            std::future::pending::<()>(),
        )
        .await
        .expect("serve completes");

    let responses = parse_lines(&output);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["id"], 1);
}

#[tokio::test]
async fn unterminated_oversized_input_is_rejected_before_eof() {
    let mut server = server_over(Arc::new(InstantCarrier)).with_max_line_bytes(16);
    let input = "y".repeat(100);
    let mut output = Vec::new();

    server
        .serve(
            BufReader::new(input.as_bytes()),
            &mut output,
            std::future::pending::<()>(),
        )
        .await
        .expect("EOF after an oversized line is still clean");

    let responses = parse_lines(&output);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["error"]["code"], -32600);
    assert_eq!(server.state(), ServerState::Closed);
}

#[tokio::test]
async fn shutdown_waits_for_in_flight_send() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let mut server = server_over(Arc::new(GatedCarrier {
        entered: Arc::clone(&entered),
        release: Arc::clone(&release),
    }));

    let (client_io, server_io) = tokio::io::duplex(8192);
    let (server_read, server_write) = tokio::io::split(server_io);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let result = server
            .serve(BufReader::new(server_read), server_write, async move {
                let _ = shutdown_rx.await;
            })
            .await;
        (result, server.state())
    });

    let (client_read, mut client_write) = tokio::io::split(client_io);
    let mut lines = BufReader::new(client_read).lines();
    client_write
        .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/call\",\"params\":{\"name\":\"send-message\",\"arguments\":{\"to\":\"+15559876543\",\"message\":\"hello\"}}}\n")
        .await
        .expect("write request");

    entered.notified().await;
    shutdown_tx.send(()).expect("server still listening");
    release.notify_one();

    let line = lines
        .next_line()
        .await
        .expect("read response")
        .expect("response before close");
    let response: Value = serde_json::from_str(&line).expect("response JSON");
    assert_eq!(response["id"], 1);
    assert_eq!(
        response["result"]["content"][0]["text"],
        "Message sent successfully. SID: SM777"
    );

    let (result, state) = task.await.expect("server task");
    assert!(result.is_ok());
    assert_eq!(state, ServerState::Closed);
}

#[tokio::test]
async fn shutdown_while_idle_closes_without_output() {
    let mut server = server_over(Arc::new(InstantCarrier));
    let (_client_io, server_io) = tokio::io::duplex(1024);
    let (server_read, mut server_write) = tokio::io::split(server_io);

    server
        .serve(BufReader::new(server_read), &mut server_write, async {})
        .await
        .expect("clean shutdown");
    assert_eq!(server.state(), ServerState::Closed);
}

#[tokio::test]
async fn write_failure_is_transport_error() {
    let mut server = server_over(Arc::new(InstantCarrier));
    let input = "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n";

    let result = server
        .serve(
            BufReader::new(input.as_bytes()),
            BrokenPipe,
            std::future::pending::<()>(),
        )
        .await;

    match result {
        Err(TransportError::Write(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
        other => panic!("expected write error, got: {other:?}"),
    }
    assert_eq!(server.state(), ServerState::Closed);
}
