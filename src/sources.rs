// ABOUTME: Source handlers for a vault's reference list
// ABOUTME: Successful creates and deletes are announced to the vault's socket room after the write commits

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;

use crate::auth_helpers::{parse_id, require_permission, AuthUser, VaultAccess};
use crate::entities::source;
use crate::error::{AppError, Result};
use crate::permissions::Permission;
use crate::realtime::{EventActor, ServerEvent, SourceCreated, SourceDeleted};
use crate::types::{created, ok, ApiResponse, AppJson, CreateSourceRequest, MessageResponse};
use crate::validation::validate_source;
use crate::AppState;

fn event_actor(user: &AuthUser, access: &VaultAccess) -> EventActor {
    EventActor {
        user_id: user.user_id,
        user_name: user.name.clone(),
        role: access.role,
    }
}

pub async fn create_source(
    State(state): State<AppState>,
    user: AuthUser,
    Path(vault_id): Path<String>,
    AppJson(req): AppJson<CreateSourceRequest>,
) -> Result<impl IntoResponse> {
    let access = require_permission(&state, &user, &vault_id, Permission::SourceCreate).await?;
    validate_source(&req)?;

    let source = state
        .storage
        .create_source(access.vault.id, &req, user.actor())
        .await?;

    state.hub.broadcast(
        &access.vault.id.to_string(),
        ServerEvent::SourceCreated(SourceCreated {
            source: source.clone(),
            actor: event_actor(&user, &access),
            timestamp: Utc::now(),
        }),
    );

    Ok(created(source))
}

pub async fn list_sources(
    State(state): State<AppState>,
    user: AuthUser,
    Path(vault_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<source::Model>>>> {
    let access = require_permission(&state, &user, &vault_id, Permission::SourceRead).await?;
    let sources = state.storage.list_sources(access.vault.id).await?;
    Ok(ok(sources))
}

pub async fn delete_source(
    State(state): State<AppState>,
    user: AuthUser,
    Path((vault_id, source_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<MessageResponse>>> {
    let access = require_permission(&state, &user, &vault_id, Permission::SourceDelete).await?;
    let source_id = parse_id(&source_id, "Source")?;

    let source = state
        .storage
        .find_source(source_id)
        .await?
        .filter(|source| source.vault_id == access.vault.id)
        .ok_or_else(|| AppError::NotFound("Source not found in this vault".to_string()))?;

    let file_orphaned = state.storage.delete_source(&source, user.actor()).await?;
    if let (true, Some(file_key)) = (file_orphaned, &source.file_key) {
        state.files.remove(source.vault_id, file_key).await;
    }

    state.hub.broadcast(
        &access.vault.id.to_string(),
        ServerEvent::SourceDeleted(SourceDeleted {
            source_id: source.id,
            vault_id: source.vault_id,
            actor: event_actor(&user, &access),
            timestamp: Utc::now(),
        }),
    );

    Ok(ok(MessageResponse::new("Source deleted successfully")))
}
