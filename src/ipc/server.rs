//! Local IPC server: the chat transport used by `z5bot-ctl`.
//!
//! Listens on a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! using the `interprocess` crate. Each connection is served by its own
//! task; requests on one connection are answered in order.
//!
//! ## Protocol
//!
//! Request (one JSON object per line):
//! ```json
//! {"command": "message", "chat_id": "42", "from": "alice", "text": "look"}
//! {"command": "list"}
//! {"command": "clear", "chat_id": "42"}
//! {"command": "ping"}
//! ```
//!
//! Response (one JSON object per line):
//! ```json
//! {"ok": true, "data": { ... } }
//! {"ok": false, "error": "missing required 'chat_id' field"}
//! ```

use std::sync::Arc;

use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::chat::{Bot, ChatMessage};
use crate::models::key::SessionKey;
use crate::{AppError, Result};

/// Inbound IPC request.
#[derive(Debug, Deserialize)]
struct IpcRequest {
    /// Command verb.
    command: String,
    /// Target chat (for `message`, `clear`).
    chat_id: Option<SessionKey>,
    /// Sender display name (for `message`).
    from: Option<String>,
    /// Message text (for `message`).
    text: Option<String>,
}

/// Outbound IPC response.
#[derive(Debug, Serialize)]
struct IpcResponse {
    /// Whether the command succeeded.
    ok: bool,
    /// Payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl IpcResponse {
    fn success(data: serde_json::Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Spawn the IPC server task on the local socket `name`.
///
/// # Errors
///
/// Returns `AppError::Ipc` if the listener cannot be created.
pub fn spawn_ipc_server(
    bot: Arc<Bot>,
    name: &str,
    ct: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let name = name.to_owned();

    let listener_name = name
        .clone()
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{name}': {err}")))?;

    let listener = ListenerOptions::new()
        .name(listener_name)
        .create_tokio()
        .map_err(|err| AppError::Ipc(format!("failed to create ipc listener: {err}")))?;

    info!(ipc_name = %name, "IPC server listening");

    let handle = tokio::spawn(async move {
        let span = info_span!("ipc_server", name = %name);
        async move {
            loop {
                tokio::select! {
                    () = ct.cancelled() => {
                        info!("IPC server shutting down");
                        break;
                    }
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok(stream) => {
                                tokio::spawn(handle_connection(stream, Arc::clone(&bot), ct.clone()));
                            }
                            Err(err) => {
                                warn!(%err, "IPC accept failed");
                            }
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await;
    });

    Ok(handle)
}

/// Serve one client connection until EOF, an I/O error, or shutdown.
async fn handle_connection(
    stream: interprocess::local_socket::tokio::Stream,
    bot: Arc<Bot>,
    ct: CancellationToken,
) {
    let span = info_span!("ipc_conn");
    async move {
        let (reader, mut writer) = stream.split();
        let mut buf_reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            let read = tokio::select! {
                () = ct.cancelled() => break,
                read = buf_reader.read_line(&mut line) => read,
            };

            match read {
                Ok(0) => break,
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    let response = match serde_json::from_str::<IpcRequest>(trimmed) {
                        Ok(request) => dispatch_command(request, &bot).await,
                        Err(err) => IpcResponse::error(format!("invalid json: {err}")),
                    };

                    let mut response_line = serde_json::to_string(&response).unwrap_or_else(|_| {
                        r#"{"ok":false,"error":"serialization failed"}"#.to_owned()
                    });
                    response_line.push('\n');

                    if let Err(err) = writer.write_all(response_line.as_bytes()).await {
                        warn!(%err, "failed to write ipc response");
                        break;
                    }
                }
                Err(err) => {
                    warn!(%err, "ipc read error");
                    break;
                }
            }
        }

        debug!("IPC connection closed");
    }
    .instrument(span)
    .await;
}

/// Route an IPC command to its handler.
async fn dispatch_command(request: IpcRequest, bot: &Bot) -> IpcResponse {
    let span = info_span!(
        "ipc_command",
        command = %request.command,
        request_id = %Uuid::new_v4()
    );

    async move {
        match request.command.as_str() {
            "message" => handle_message(request, bot).await,
            "list" => handle_list(bot).await,
            "clear" => handle_clear(request, bot).await,
            "ping" => IpcResponse::success(serde_json::json!({ "pong": true })),
            other => IpcResponse::error(format!("unknown command: {other}")),
        }
    }
    .instrument(span)
    .await
}

/// Deliver a chat message to the bot and return its replies.
async fn handle_message(request: IpcRequest, bot: &Bot) -> IpcResponse {
    let Some(chat_id) = request.chat_id else {
        return IpcResponse::error("missing required 'chat_id' field");
    };
    let Some(text) = request.text else {
        return IpcResponse::error("missing required 'text' field");
    };

    let replies = bot
        .handle(ChatMessage::new(chat_id.clone(), request.from, text))
        .await;
    IpcResponse::success(serde_json::json!({ "chat_id": chat_id, "replies": replies }))
}

/// List live sessions.
async fn handle_list(bot: &Bot) -> IpcResponse {
    let state = bot.state();
    let sessions = state.registry.snapshot().await;
    let available_slots = state.registry.settings().launch.available_slots();

    IpcResponse::success(serde_json::json!({
        "sessions": sessions,
        "available_slots": available_slots,
    }))
}

/// Remove a session and kill its interpreter.
async fn handle_clear(request: IpcRequest, bot: &Bot) -> IpcResponse {
    let Some(chat_id) = request.chat_id else {
        return IpcResponse::error("missing required 'chat_id' field");
    };

    let cleared = bot.state().registry.remove(&chat_id).await;
    info!(chat_id = %chat_id, cleared, "session cleared via IPC");
    IpcResponse::success(serde_json::json!({ "chat_id": chat_id, "cleared": cleared }))
}
