//! The chat endpoint and its status websocket.

use axum::{
    Extension, Json,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    http::{HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::requests::ChatRequest;
use crate::services::status::{FRAME_BUFFER, PING_INTERVAL, StatusFrame};
use crate::state::AppState;

pub const SESSION_HEADER: &str = "x-session-id";
const ACTIVE_CONVERSATION_COOKIE: &str = "active_conversation_id";

/// POST /api/v1/chat — drive one turn. If the client does not hand us a
/// session id, one is created and echoed back in the response headers so
/// the websocket channel can pick it up.
pub async fn chat(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Response> {
    if request.system_message_id.is_none() {
        return Err(Error::Validation("system_message_id is required".to_string()));
    }

    let session_id = match headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        Some(session_id) => session_id.to_string(),
        None => state.status.create_session(user.id).await,
    };

    let chat_response = state
        .orchestrator
        .run_chat(request, &user, &session_id)
        .await?;

    let conversation_id = chat_response.conversation_id;
    let mut response = Json(chat_response).into_response();
    if let Ok(value) = HeaderValue::from_str(&session_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(SESSION_HEADER), value);
    }
    // Remember the active conversation for GET /conversations/active
    if let Ok(value) = HeaderValue::from_str(&format!(
        "{}={}; Path=/",
        ACTIVE_CONVERSATION_COOKIE, conversation_id
    )) {
        response
            .headers_mut()
            .insert(axum::http::header::SET_COOKIE, value);
    }
    Ok(response)
}

/// GET /ws/chat/status — status updates for the next chat turn.
pub async fn ws_chat_status(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_status_socket(socket, state, user.id))
}

async fn handle_status_socket(socket: WebSocket, state: AppState, user_id: i32) {
    let session_id = state.status.create_session(user_id).await;
    tracing::info!("WebSocket connection initiated for session {}", session_id);

    let (frame_tx, mut frame_rx) = mpsc::channel::<StatusFrame>(FRAME_BUFFER);
    if !state.status.register_connection(&session_id, frame_tx).await {
        tracing::error!("Failed to register WebSocket connection for session {}", session_id);
        return;
    }

    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ping_interval.tick().await; // the first tick completes immediately

    loop {
        tokio::select! {
            // Queued status frames from the manager
            frame = frame_rx.recv() => {
                match frame {
                    Some(StatusFrame::Json(json)) => {
                        if ws_tx.send(WsMessage::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(StatusFrame::Close) | None => {
                        let _ = ws_tx.send(WsMessage::Close(None)).await;
                        break;
                    }
                }
            }

            // Client messages: answer pings, exit on close
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        let is_ping = serde_json::from_str::<serde_json::Value>(&text)
                            .ok()
                            .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(String::from))
                            .is_some_and(|t| t == "ping");
                        if is_ping {
                            let pong = serde_json::json!({
                                "type": "pong",
                                "timestamp": chrono::Utc::now().to_rfc3339(),
                                "session_id": session_id,
                            });
                            if ws_tx.send(WsMessage::Text(pong.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!("WebSocket receive error for {}: {}", session_id, e);
                        break;
                    }
                    _ => {}
                }
            }

            // Server keepalive
            _ = ping_interval.tick() => {
                if !state.status.send_ping(&session_id).await {
                    break;
                }
            }
        }
    }

    tracing::info!("Cleaning up WebSocket connection for session {}", session_id);
    state.status.remove_connection(&session_id, true).await;
}
