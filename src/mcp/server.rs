//! MCP JSON-RPC 2.0 server over a duplex byte stream.
//!
//! Reads one JSON object per line, dispatches it to the
//! [`CapabilityRegistry`], and writes exactly one response line per request
//! before reading the next. Notifications get no response. Per-request
//! failures (bad JSON, unknown method, schema violations) become JSON-RPC
//! error responses and never stop the loop.

use std::future::Future;
use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::protocol::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, ServerInfo, INTERNAL_ERROR, INVALID_REQUEST,
    MCP_PROTOCOL_VERSION, PARSE_ERROR, SUPPORTED_PROTOCOL_VERSIONS,
};
use super::registry::{CapabilityRegistry, Locator, RegistryError, ResourceDefinition};

/// Default cap on one incoming message, newline excluded (1 MiB).
pub const DEFAULT_MAX_LINE_BYTES: usize = 1_048_576;

// ── Error types ──

/// Failures of the underlying byte stream.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Reading the next message failed.
    #[error("MCP transport read failed: {0}")]
    Read(#[source] std::io::Error),

    /// Writing a response failed.
    #[error("MCP transport write failed: {0}")]
    Write(#[source] std::io::Error),
}

// ── Lifecycle ──

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Created, no transport attached.
    Idle,
    /// Transport attached.
    Connected,
    /// Handling requests.
    Serving,
    /// Shutdown requested or input ended; no new requests are read.
    Closing,
    /// Terminal.
    Closed,
}

/// MCP server bound to a [`CapabilityRegistry`].
pub struct McpServer {
    registry: Arc<CapabilityRegistry>,
    info: ServerInfo,
    instructions: Option<String>,
    max_line_bytes: usize,
    state: ServerState,
    client_initialized: bool,
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("info", &self.info)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl McpServer {
    /// Create a server in the [`ServerState::Idle`] state.
    pub fn new(registry: Arc<CapabilityRegistry>, info: ServerInfo) -> Self {
        Self {
            registry,
            info,
            instructions: None,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            state: ServerState::Idle,
            client_initialized: false,
        }
    }

    /// Usage instructions returned in the `initialize` result.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Cap the size of one incoming message. Longer lines are discarded
    /// and answered with `-32600`.
    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Whether the client has sent `notifications/initialized`.
    pub fn client_initialized(&self) -> bool {
        self.client_initialized
    }

    fn transition(&mut self, next: ServerState) {
        debug!(from = ?self.state, to = ?next, "MCP server state change");
        self.state = next;
    }

    /// Serve requests from `reader` until `shutdown` resolves or input ends.
    ///
    /// `shutdown` is only polled while waiting for the next line: a request
    /// that has started is always answered before the loop exits.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if reading or writing the stream fails; the
    /// server is [`ServerState::Closed`] afterwards either way.
    pub async fn serve<R, W, S>(
        &mut self,
        mut reader: R,
        mut writer: W,
        shutdown: S,
    ) -> Result<(), TransportError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        S: Future<Output = ()>,
    {
        self.transition(ServerState::Connected);
        tokio::pin!(shutdown);
        self.transition(ServerState::Serving);
        info!(server = %self.info.name, "MCP server ready");

        let max_line_bytes = self.max_line_bytes;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!("shutdown requested, closing MCP transport");
                    None
                }
                read = read_bounded_line(&mut reader, &mut buf, max_line_bytes) => Some(read),
            };

            let line = match read {
                None => break,
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    self.transition(ServerState::Closed);
                    return Err(TransportError::Read(e));
                }
            };

            let response = match line {
                LineRead::Eof => {
                    info!("MCP client closed input");
                    break;
                }
                LineRead::TooLong => {
                    warn!(limit = max_line_bytes, "MCP message exceeds line limit, discarded");
                    Some(JsonRpcResponse::failure(
                        Value::Null,
                        JsonRpcError::new(
                            INVALID_REQUEST,
                            format!("Invalid request: message exceeds {max_line_bytes} bytes"),
                        ),
                    ))
                }
                LineRead::Line => {
                    debug!(bytes = buf.len(), "MCP message received");
                    match std::str::from_utf8(&buf) {
                        Ok(text) => self.handle_line(text).await,
                        Err(e) => Some(JsonRpcResponse::failure(
                            Value::Null,
                            JsonRpcError::new(
                                PARSE_ERROR,
                                format!("Parse error: invalid UTF-8: {e}"),
                            ),
                        )),
                    }
                }
            };

            if let Some(response) = response {
                if let Err(e) = write_response(&mut writer, &response).await {
                    self.transition(ServerState::Closed);
                    return Err(TransportError::Write(e));
                }
            }
        }

        self.transition(ServerState::Closing);
        if let Err(e) = writer.flush().await {
            warn!(error = %e, "failed to flush MCP transport on close");
        }
        self.transition(ServerState::Closed);
        Ok(())
    }

    /// Handle one line of input, returning the response to write, if any.
    pub async fn handle_line(&mut self, line: &str) -> Option<JsonRpcResponse> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let value: Value = match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "unparseable MCP message");
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    JsonRpcError::new(PARSE_ERROR, format!("Parse error: {e}")),
                ));
            }
        };

        if value.is_array() {
            return Some(JsonRpcResponse::failure(
                Value::Null,
                JsonRpcError::new(INVALID_REQUEST, "Batch requests are not supported"),
            ));
        }

        // Client responses to server-initiated requests carry no method; this
        // server never issues any, so they are dropped.
        if value.get("method").is_none()
            && (value.get("result").is_some() || value.get("error").is_some())
        {
            debug!("ignoring JSON-RPC response from client");
            return None;
        }

        // `"id": null` is a request, not a notification; MCP forbids it.
        if value.get("id").is_some_and(Value::is_null) {
            return Some(JsonRpcResponse::failure(
                Value::Null,
                JsonRpcError::new(INVALID_REQUEST, "Invalid request: id must not be null"),
            ));
        }

        let id = value.get("id").cloned().unwrap_or(Value::Null);
        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                return Some(JsonRpcResponse::failure(
                    id,
                    JsonRpcError::new(INVALID_REQUEST, format!("Invalid request: {e}")),
                ));
            }
        };

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::failure(
                id,
                JsonRpcError::new(INVALID_REQUEST, "Invalid request: jsonrpc must be \"2.0\""),
            ));
        }

        if request.is_notification() {
            self.handle_notification(&request);
            return None;
        }

        let outcome = self.dispatch(&request.method, request.params).await;
        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => {
                debug!(method = %request.method, code = error.code, message = %error.message, "MCP request failed");
                JsonRpcResponse::failure(id, error)
            }
        })
    }

    fn handle_notification(&mut self, request: &JsonRpcRequest) {
        match request.method.as_str() {
            "notifications/initialized" => {
                self.client_initialized = true;
                info!("MCP client initialized");
            }
            "notifications/cancelled" => {
                debug!("cancellation notice ignored; requests run to completion");
            }
            other => debug!(method = other, "ignoring MCP notification"),
        }
    }

    async fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value, JsonRpcError> {
        match method {
            "initialize" => Ok(self.initialize_result(params.as_ref())),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.registry.list_tools() })),
            "tools/call" => {
                let params = params.unwrap_or(Value::Null);
                let name = required_str(&params, "name")?;
                let result = self
                    .registry
                    .call_tool(name, params.get("arguments").cloned())
                    .await
                    .map_err(registry_error)?;
                to_result(&result)
            }
            "resources/list" => {
                let resources: Vec<Value> = self
                    .registry
                    .list_resources()
                    .iter()
                    .map(resource_json)
                    .collect();
                Ok(json!({ "resources": resources }))
            }
            "resources/templates/list" => {
                let templates: Vec<Value> = self
                    .registry
                    .list_resource_templates()
                    .iter()
                    .map(resource_json)
                    .collect();
                Ok(json!({ "resourceTemplates": templates }))
            }
            "resources/read" => {
                let params = params.unwrap_or(Value::Null);
                let uri = required_str(&params, "uri")?;
                let result = self.registry.read_resource(uri).map_err(registry_error)?;
                to_result(&result)
            }
            "prompts/list" => Ok(json!({ "prompts": self.registry.list_prompts() })),
            "prompts/get" => {
                let params = params.unwrap_or(Value::Null);
                let name = required_str(&params, "name")?;
                let result = self
                    .registry
                    .get_prompt(name, params.get("arguments").cloned())
                    .map_err(registry_error)?;
                to_result(&result)
            }
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }

    fn initialize_result(&self, params: Option<&Value>) -> Value {
        let requested = params
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str);
        let version = requested
            .filter(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(v))
            .unwrap_or(MCP_PROTOCOL_VERSION);

        let client = params
            .and_then(|p| p.get("clientInfo"))
            .and_then(|c| c.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!(client, protocol_version = version, "MCP initialize");

        let mut result = json!({
            "protocolVersion": version,
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "subscribe": false, "listChanged": false },
                "prompts": { "listChanged": false }
            },
            "serverInfo": self.info,
        });
        if let Some(ref instructions) = self.instructions {
            result["instructions"] = Value::String(instructions.clone());
        }
        result
    }
}

fn required_str<'a>(params: &'a Value, field: &str) -> Result<&'a str, JsonRpcError> {
    params
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| JsonRpcError::invalid_params(format!("missing required param: {field}")))
}

fn registry_error(err: RegistryError) -> JsonRpcError {
    JsonRpcError::invalid_params(err.to_string())
}

fn to_result<T: serde::Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value)
        .map_err(|e| JsonRpcError::new(INTERNAL_ERROR, format!("failed to encode result: {e}")))
}

fn resource_json(definition: &ResourceDefinition) -> Value {
    let mut entry = json!({
        "name": definition.name,
        "description": definition.description,
        "mimeType": definition.mime_type,
    });
    match &definition.locator {
        Locator::Fixed(uri) => entry["uri"] = Value::String(uri.clone()),
        Locator::Template(template) => entry["uriTemplate"] = Value::String(template.clone()),
    }
    entry
}

/// Outcome of reading one line.
enum LineRead {
    /// Input ended before any byte was read.
    Eof,
    /// A complete line (or final unterminated line) is in the buffer.
    Line,
    /// The line exceeded the limit; its bytes were consumed and dropped.
    TooLong,
}

/// Read one `\n`-terminated line into `buf`, never buffering more than
/// `max + 1` bytes.
async fn read_bounded_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max: usize,
) -> std::io::Result<LineRead> {
    let limit = u64::try_from(max).unwrap_or(u64::MAX).saturating_add(1);

    let read = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if read == 0 {
        return Ok(LineRead::Eof);
    }
    if buf.ends_with(b"\n") || buf.len() <= max {
        return Ok(LineRead::Line);
    }

    // Drain the rest of the oversized line in bounded chunks.
    loop {
        buf.clear();
        let read = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
        if read == 0 || buf.ends_with(b"\n") {
            break;
        }
    }
    buf.clear();
    Ok(LineRead::TooLong)
}

/// Write a response as a single line + newline.
async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &JsonRpcResponse,
) -> std::io::Result<()> {
    let mut bytes = match serde_json::to_vec(response) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "failed to encode MCP response");
            serde_json::to_vec(&JsonRpcResponse::failure(
                response.id.clone(),
                JsonRpcError::new(INTERNAL_ERROR, "failed to encode response"),
            ))
            .unwrap_or_else(|_| {
                br#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"internal error"}}"#
                    .to_vec()
            })
        }
    };
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.flush().await
}
