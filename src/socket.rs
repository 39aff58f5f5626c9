// ABOUTME: WebSocket endpoint carrying the vault room protocol (join, leave, source events)
// ABOUTME: Connections are authenticated from the session cookie before the upgrade completes

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::auth_helpers::AuthUser;
use crate::error::Result;
use crate::permissions::Role;
use crate::realtime::{ConnectionId, ServerEvent, VaultJoined};
use crate::AppState;

#[derive(Debug, Deserialize)]
struct ClientFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

/// The identity extractor runs before the upgrade extractor, so a request without a
/// valid session is refused with 401 and never reaches the handshake.
pub async fn ws_handler(
    State(state): State<AppState>,
    user: AuthUser,
    ws: WebSocketUpgrade,
) -> Response {
    tracing::info!("Socket upgrade for user {}", user.user_id);
    ws.on_upgrade(move |socket| handle_socket(socket, state, user))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, user: AuthUser) {
    let (connection_id, mut events) = state.hub.register(user.clone());
    tracing::debug!("{} socket(s) open", state.hub.connection_count());

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    handle_client_message(&state, connection_id, &user, &text).await;
                }
                Some(Ok(Message::Binary(_))) => {
                    state
                        .hub
                        .send_to(connection_id, ServerEvent::error("Binary frames are not supported"));
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::debug!("Socket {} receive error: {}", connection_id, err);
                    break;
                }
            },
            outgoing = events.recv() => {
                let Some(event) = outgoing else { break };
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(err) => {
                        tracing::error!("Failed to encode {} event: {}", event.name(), err);
                        continue;
                    }
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        }
    }

    state.hub.unregister(connection_id);
}

/// Applies one client frame. Replies go through the hub to the originating connection.
pub async fn handle_client_message(
    state: &AppState,
    connection_id: ConnectionId,
    user: &AuthUser,
    text: &str,
) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(err) => {
            tracing::debug!("Malformed frame on socket {}: {}", connection_id, err);
            state
                .hub
                .send_to(connection_id, ServerEvent::error("Malformed message"));
            return;
        }
    };

    tracing::debug!("Socket {} sent {}", connection_id, frame.event);

    match frame.event.as_str() {
        "vault:join" => join_vault(state, connection_id, user, &frame.data).await,
        "vault:leave" => {
            if let Some(vault_id) = frame.data.as_str() {
                state.hub.leave(connection_id, &canonical_vault_id(vault_id));
            }
        }
        other => {
            state
                .hub
                .send_to(connection_id, ServerEvent::error(format!("Unknown event: {}", other)));
        }
    }
}

async fn join_vault(state: &AppState, connection_id: ConnectionId, user: &AuthUser, data: &Value) {
    let vault_id = match data.as_str() {
        Some(id) if !id.trim().is_empty() => id,
        _ => {
            state
                .hub
                .send_to(connection_id, ServerEvent::error("Invalid vault ID"));
            return;
        }
    };

    let reply = match membership_role(state, user, vault_id).await {
        Ok(Some((vault_id, role))) => {
            let room_id = vault_id.to_string();
            if state.hub.join(connection_id, &room_id) {
                tracing::info!(
                    "User {} joined vault room {} as {} ({} member(s))",
                    user.user_id,
                    room_id,
                    role,
                    state.hub.room_size(&room_id)
                );
                ServerEvent::VaultJoined(VaultJoined {
                    vault_id: room_id,
                    role,
                })
            } else {
                tracing::warn!("Socket {} is not registered, cannot join {}", connection_id, room_id);
                ServerEvent::error("Failed to join vault")
            }
        }
        Ok(None) => {
            tracing::warn!("User {} denied access to vault room {}", user.user_id, vault_id);
            ServerEvent::error("Access denied to vault")
        }
        Err(err) => {
            tracing::error!("Failed to join vault room {}: {}", vault_id, err);
            ServerEvent::error("Failed to join vault")
        }
    };

    state.hub.send_to(connection_id, reply);
}

async fn membership_role(
    state: &AppState,
    user: &AuthUser,
    vault_id: &str,
) -> Result<Option<(Uuid, Role)>> {
    let Ok(vault_id) = Uuid::parse_str(vault_id) else {
        return Ok(None);
    };

    Ok(state
        .storage
        .find_membership(user.user_id, vault_id)
        .await?
        .map(|membership| (vault_id, membership.role)))
}

fn canonical_vault_id(raw: &str) -> String {
    Uuid::parse_str(raw)
        .map(|id| id.to_string())
        .unwrap_or_else(|_| raw.to_string())
}
