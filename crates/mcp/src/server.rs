// MCP server: line-delimited JSON-RPC 2.0 over stdio

use crate::protocol::{
    negotiate_protocol_version, CallToolParams, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, ListToolsResult, ServerCapabilities,
    ServerInfo, ToolsCapability, JSONRPC_VERSION,
};
use crate::tools::{ToolError, ToolRegistry};
use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::codec::{AnyDelimiterCodec, FramedRead, FramedWrite, LinesCodec};

type MethodResult = std::result::Result<serde_json::Value, JsonRpcError>;

pub struct McpServer {
    state: Arc<ServerState>,
}

struct ServerState {
    registry: ToolRegistry,
    info: ServerInfo,
}

impl McpServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self::with_info(
            registry,
            ServerInfo {
                name: "pail".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        )
    }

    pub fn with_info(registry: ToolRegistry, info: ServerInfo) -> Self {
        Self {
            state: Arc::new(ServerState { registry, info }),
        }
    }

    /// Serve on the process's stdin/stdout until stdin closes
    pub async fn start(&self) -> Result<()> {
        tracing::info!(tools = self.state.registry.len(), "MCP server listening on stdio");
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve one connection.
    ///
    /// Every request runs in its own task, so a slow storage call never
    /// blocks the next message; a single writer task owns the output so
    /// response lines never interleave. Returns once the input closes and
    /// in-flight requests have answered.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        // Split on raw bytes so one undecodable line cannot end the session
        let mut lines = FramedRead::new(reader, AnyDelimiterCodec::new(b"\n".to_vec(), b"\n".to_vec()));
        let (tx, mut rx) = mpsc::unbounded_channel::<JsonRpcResponse>();

        let writer_task = tokio::spawn(async move {
            let mut sink = FramedWrite::new(writer, LinesCodec::new());
            while let Some(response) = rx.recv().await {
                let line = serde_json::to_string(&response).context("Failed to encode response")?;
                sink.send(line).await.context("Failed to write response")?;
            }
            Ok::<_, anyhow::Error>(())
        });

        let mut in_flight = JoinSet::new();

        while let Some(chunk) = lines.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read from input, shutting down");
                    break;
                }
            };

            let line = match std::str::from_utf8(&chunk) {
                Ok(line) => line.trim_end_matches('\r').to_string(),
                Err(e) => {
                    tracing::warn!(error = %e, "Input line is not valid UTF-8");
                    let _ = tx.send(JsonRpcResponse::error(
                        serde_json::Value::Null,
                        JsonRpcError::parse_error(),
                    ));
                    continue;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            let state = self.state.clone();
            let tx = tx.clone();
            in_flight.spawn(async move {
                if let Some(response) = state.handle_message(&line).await {
                    // Receiver only closes if the writer failed
                    let _ = tx.send(response);
                }
            });

            while let Some(joined) = in_flight.try_join_next() {
                log_join(joined);
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            log_join(joined);
        }

        drop(tx);
        writer_task.await.context("Response writer task failed")??;

        tracing::info!("Input closed, MCP server stopped");
        Ok(())
    }
}

fn log_join(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "Request handler aborted");
    }
}

impl ServerState {
    /// Handle one raw line; `None` for notifications
    async fn handle_message(&self, line: &str) -> Option<JsonRpcResponse> {
        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable message");
                return Some(JsonRpcResponse::error(
                    serde_json::Value::Null,
                    JsonRpcError::parse_error(),
                ));
            }
        };

        let id = value.get("id").cloned().unwrap_or(serde_json::Value::Null);
        let request: JsonRpcRequest = match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) if request.jsonrpc == JSONRPC_VERSION => request,
            _ => return Some(JsonRpcResponse::error(id, JsonRpcError::invalid_request())),
        };

        let Some(id) = request.id.clone() else {
            self.handle_notification(&request.method);
            return None;
        };

        let outcome = self.handle_request(&request.method, request.params).await;
        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error),
        })
    }

    fn handle_notification(&self, method: &str) {
        match method {
            "notifications/initialized" => tracing::info!("Client initialized"),
            "notifications/cancelled" => tracing::debug!("Client cancelled a request"),
            other => tracing::debug!(method = other, "Ignoring notification"),
        }
    }

    async fn handle_request(&self, method: &str, params: Option<serde_json::Value>) -> MethodResult {
        tracing::debug!(method, "Handling request");
        match method {
            "initialize" => self.initialize(params),
            "ping" => Ok(serde_json::json!({})),
            "tools/list" => to_result(&ListToolsResult {
                tools: self.registry.list_schemas(),
            }),
            "tools/call" => self.call_tool(params).await,
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }

    fn initialize(&self, params: Option<serde_json::Value>) -> MethodResult {
        let params: Option<InitializeParams> = params.and_then(|p| serde_json::from_value(p).ok());

        if let Some(client) = params.as_ref().and_then(|p| p.client_info.as_ref()) {
            tracing::info!(client = %client.name, version = %client.version, "Client connected");
        }

        let requested = params.as_ref().map(|p| p.protocol_version.as_str());
        to_result(&InitializeResult {
            protocol_version: negotiate_protocol_version(requested).to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: false }),
            },
            server_info: self.info.clone(),
        })
    }

    async fn call_tool(&self, params: Option<serde_json::Value>) -> MethodResult {
        let params: CallToolParams = params
            .ok_or_else(|| JsonRpcError::invalid_params("Missing tools/call params"))
            .and_then(|p| {
                serde_json::from_value(p)
                    .map_err(|e| JsonRpcError::invalid_params(format!("Invalid tools/call params: {}", e)))
            })?;

        let tool = self
            .registry
            .get(&params.name)
            .ok_or_else(|| JsonRpcError::invalid_params(format!("Unknown tool: {}", params.name)))?;

        match tool.execute(params.arguments).await {
            Ok(result) => to_result(&result),
            Err(ToolError::InvalidArguments(message)) => Err(JsonRpcError::invalid_params(message)),
            Err(e) => Err(JsonRpcError::internal_error(e.to_string())),
        }
    }
}

fn to_result(value: &impl serde::Serialize) -> MethodResult {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}
