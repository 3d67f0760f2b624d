//! `TwilioClient` against a one-shot local HTTP server.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use twilio_messaging_mcp::carrier::twilio::TwilioClient;
use twilio_messaging_mcp::carrier::{CarrierApi, CarrierError, OutboundMessage};
use twilio_messaging_mcp::config::CarrierConfig;

const ACCOUNT_SID: &str = "ACtest0000000000000000000000000000";

/// Accept one connection, capture the full request text and answer with
/// the given status line and JSON body.
async fn serve_once(status_line: &str, body: &str) -> (String, oneshot::Receiver<String>) {
    let listener = match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(err) => panic!("listener should bind: {err}"),
    };
    let addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(err) => panic!("listener should expose local addr: {err}"),
    };

    let (tx, rx) = oneshot::channel();
    let status_line_owned = status_line.to_owned();
    let body_owned = body.to_owned();
    tokio::spawn(async move {
        let accepted = listener.accept().await;
        if let Ok((mut socket, _)) = accepted {
            let request = read_request(&mut socket).await;
            let _ = tx.send(request);

            let response = format!(
                "HTTP/1.1 {status_line_owned}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body_owned}",
                body_owned.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
        }
    });

    (format!("http://{addr}"), rx)
}

/// Read headers plus `Content-Length` bytes of body.
async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 1024];
    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn client_for(base: &str, status_callback: Option<&str>) -> TwilioClient {
    let mut config = CarrierConfig::new(ACCOUNT_SID, "SKkey", "secret", "+15551230000")
        .expect("valid config")
        .with_api_base(base)
        .expect("valid base");
    if let Some(url) = status_callback {
        config = config
            .with_status_callback(url)
            .expect("valid callback url");
    }
    TwilioClient::new(&config).expect("client should build")
}

fn message() -> OutboundMessage<'static> {
    OutboundMessage {
        to: "+15559876543",
        from: "+15551230000",
        body: "hello world",
    }
}

#[tokio::test]
async fn create_message_posts_form_with_basic_auth() {
    let (base, request_rx) = serve_once(
        "201 Created",
        r#"{"sid":"SM123","status":"queued","to":"+15559876543","from":"+15551230000"}"#,
    )
    .await;
    let client = client_for(&base, None);

    let resource = client
        .create_message(message())
        .await
        .expect("send should succeed");
    assert_eq!(resource.sid.as_deref(), Some("SM123"));
    assert_eq!(resource.status.as_deref(), Some("queued"));

    let request = request_rx.await.expect("request captured");
    assert!(request.starts_with(&format!(
        "POST /2010-04-01/Accounts/{ACCOUNT_SID}/Messages.json HTTP/1.1"
    )));
    // base64("SKkey:secret")
    assert!(request.contains("U0trZXk6c2VjcmV0"));
    assert!(request.contains("To=%2B15559876543"));
    assert!(request.contains("From=%2B15551230000"));
    assert!(request.contains("Body=hello+world"));
    assert!(!request.contains("StatusCallback"));
}

#[tokio::test]
async fn create_message_includes_status_callback_when_configured() {
    let (base, request_rx) = serve_once("201 Created", r#"{"sid":"SM9"}"#).await;
    let client = client_for(&base, Some("https://example.test/statuscallback"));

    client
        .create_message(message())
        .await
        .expect("send should succeed");

    let request = request_rx.await.expect("request captured");
    assert!(request.contains("StatusCallback=https%3A%2F%2Fexample.test%2Fstatuscallback"));
}

#[tokio::test]
async fn twilio_error_document_becomes_rejected() {
    let (base, _request_rx) = serve_once(
        "400 Bad Request",
        r#"{"code":21211,"message":"The 'To' number +1 is not a valid phone number.","more_info":"https://www.twilio.com/docs/errors/21211","status":400}"#,
    )
    .await;
    let client = client_for(&base, None);

    match client.create_message(message()).await {
        Err(CarrierError::Rejected {
            status,
            code,
            message,
        }) => {
            assert_eq!(status, 400);
            assert_eq!(code, Some(21211));
            assert!(message.contains("not a valid phone number"));
        }
        other => panic!("expected Rejected, got: {other:?}"),
    }
}

#[tokio::test]
async fn success_without_json_is_malformed_response() {
    let (base, _request_rx) = serve_once("201 Created", "not json").await;
    let client = client_for(&base, None);

    match client.create_message(message()).await {
        Err(CarrierError::MalformedResponse(_)) => {}
        other => panic!("expected MalformedResponse, got: {other:?}"),
    }
}

#[tokio::test]
async fn success_without_sid_parses_to_empty_resource() {
    let (base, _request_rx) = serve_once("201 Created", "{}").await;
    let client = client_for(&base, None);

    let resource = client
        .create_message(message())
        .await
        .expect("empty document is still a resource");
    assert!(resource.sid.is_none());
}

#[tokio::test]
async fn unreachable_carrier_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let client = client_for(&format!("http://{addr}"), None);
    match client.create_message(message()).await {
        Err(err @ CarrierError::Transport(_)) => {
            assert!(err.to_string().starts_with("carrier request failed"));
        }
        other => panic!("expected Transport, got: {other:?}"),
    }
}

#[test]
fn endpoint_targets_account_messages_resource() {
    let client = client_for("https://api.twilio.com", None);
    assert_eq!(
        client.endpoint().as_str(),
        format!("https://api.twilio.com/2010-04-01/Accounts/{ACCOUNT_SID}/Messages.json")
    );
}

#[test]
fn client_debug_redacts_credentials() {
    let client = client_for("https://api.twilio.com", None);
    let rendered = format!("{client:?}");
    assert!(!rendered.contains("secret"));
    assert!(rendered.contains("[REDACTED]"));
}
