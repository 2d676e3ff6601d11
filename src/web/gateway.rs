//! `ClientGateway`: the WebSocket accept loop. Each connection gets a
//! client id, a writer task draining its outbound message channel, and a
//! reader loop dispatching text frames to `CommandHub`/`SessionManager`
//! and binary frames to the owner session's `ControlRouter`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::protocol::client_message::DisplayModeJson;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::{ClientSink, DisplayMode, StartOptions};
use crate::state::AppState;

/// Upgrade entry point for the WebSocket gateway listener.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

enum Outbound {
    Json(ServerMessage),
    Bytes(Bytes),
}

/// [`ClientSink`] backed by an unbounded channel into this connection's
/// writer task, so `session`/`commands` code can call it synchronously
/// without awaiting a socket write.
struct WsClientSink {
    tx: mpsc::UnboundedSender<Outbound>,
    buffered_bytes: Arc<AtomicUsize>,
}

impl ClientSink for WsClientSink {
    fn send_json(&self, message: ServerMessage) {
        let _ = self.tx.send(Outbound::Json(message));
    }

    fn send_bytes(&self, bytes: Bytes) {
        self.buffered_bytes.fetch_add(bytes.len(), Ordering::Relaxed);
        let _ = self.tx.send(Outbound::Bytes(bytes));
    }

    fn buffered_bytes(&self) -> usize {
        self.buffered_bytes.load(Ordering::Relaxed)
    }
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let client_id = Uuid::new_v4().to_string();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let buffered_bytes = Arc::new(AtomicUsize::new(0));

    let sink: Arc<dyn ClientSink> = Arc::new(WsClientSink {
        tx,
        buffered_bytes: buffered_bytes.clone(),
    });

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let outcome = match message {
                Outbound::Json(message) => match serde_json::to_string(&message) {
                    Ok(text) => ws_sender.send(Message::Text(text)).await,
                    Err(e) => {
                        warn!("failed to serialize outbound message: {e}");
                        continue;
                    }
                },
                Outbound::Bytes(bytes) => {
                    buffered_bytes.fetch_sub(bytes.len(), Ordering::Relaxed);
                    ws_sender.send(Message::Binary(bytes.to_vec())).await
                }
            };
            if outcome.is_err() {
                break;
            }
        }
    });

    info!(client_id = %client_id, "client connected");

    while let Some(message) = ws_receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                handle_text_message(&state, &client_id, &text, &sink).await;
            }
            Ok(Message::Binary(data)) => {
                if data.is_empty() {
                    warn!(client_id = %client_id, "dropping malformed (empty) control frame");
                    continue;
                }
                if let Some(scid) = state.sessions.scid_for_client(&client_id) {
                    state.sessions.forward_control_frame(&scid, Bytes::from(data));
                }
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) | Err(_) => break,
        }
    }

    info!(client_id = %client_id, "client disconnected");
    cleanup_client(&state, &client_id).await;
    writer.abort();
}

/// Connection close per §4.7: cleanup the owner session, and cancel any
/// interactive shell, diagnostics, or HAR process this client started.
async fn cleanup_client(state: &Arc<AppState>, client_id: &str) {
    if let Some(scid) = state.sessions.scid_for_client(client_id) {
        let _ = state.sessions.cleanup_session(&scid).await;
    }
    if let Some(device_id) = state.sessions.device_for_client(client_id) {
        state.commands.diagnostics_stop(&device_id);
    }
    state.commands.har_stop(client_id).await;
    state.commands.shell_stop(client_id).await;
}

async fn handle_text_message(state: &Arc<AppState>, client_id: &str, text: &str, sink: &Arc<dyn ClientSink>) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            debug!(client_id = %client_id, "malformed client message: {e}");
            sink.send_json(ServerMessage::error(None, "Unknown action"));
            return;
        }
    };

    match message {
        ClientMessage::Start {
            command_id,
            device_id,
            video,
            audio,
            control,
            max_fps,
            bitrate,
            display_mode,
            resolution,
            dpi,
            turn_screen_off,
        } => {
            handle_start(
                state,
                client_id,
                device_id,
                video,
                audio,
                control,
                max_fps,
                bitrate,
                display_mode,
                resolution,
                dpi,
                turn_screen_off,
                command_id,
                sink,
            )
            .await;
        }
        ClientMessage::Disconnect { command_id } => {
            handle_disconnect(state, client_id, command_id, sink).await;
        }
        ClientMessage::Unknown => {
            sink.send_json(ServerMessage::unknown_action(None));
        }
        other => {
            state.commands.dispatch(client_id, other, sink).await;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_start(
    state: &Arc<AppState>,
    client_id: &str,
    device_id: String,
    video: bool,
    audio: bool,
    control: bool,
    max_fps: u32,
    bitrate: u32,
    display_mode: DisplayModeJson,
    resolution: Option<String>,
    dpi: Option<String>,
    turn_screen_off: bool,
    command_id: Option<String>,
    sink: &Arc<dyn ClientSink>,
) {
    let options = StartOptions {
        video,
        audio,
        control,
        max_fps,
        video_bit_rate: bitrate,
        display_mode: display_mode_from_json(display_mode),
        resolution,
        dpi,
        turn_screen_off,
    };

    if let Err(err) = state
        .sessions
        .create_session(client_id, &device_id, options, sink.clone())
        .await
    {
        sink.send_json(ServerMessage::error(command_id, err.to_string()));
    }
}

async fn handle_disconnect(state: &Arc<AppState>, client_id: &str, command_id: Option<String>, sink: &Arc<dyn ClientSink>) {
    let Some(scid) = state.sessions.scid_for_client(client_id) else {
        sink.send_json(ServerMessage::status(command_id, "No active stream to stop"));
        return;
    };
    if let Err(err) = state.sessions.cleanup_session(&scid).await {
        sink.send_json(ServerMessage::error(command_id, err.to_string()));
    }
}

fn display_mode_from_json(mode: DisplayModeJson) -> DisplayMode {
    match mode {
        DisplayModeJson::Default => DisplayMode::Default,
        DisplayModeJson::Overlay => DisplayMode::Overlay,
        DisplayModeJson::Virtual => DisplayMode::Virtual,
        DisplayModeJson::Dex => DisplayMode::Dex,
        DisplayModeJson::NativeTaskbar => DisplayMode::NativeTaskbar,
    }
}
