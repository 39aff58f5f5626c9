// ABOUTME: Invite link handlers: owners mint single-use tokens, invitees validate and redeem them
// ABOUTME: Redemption grants contributor membership and is recorded in the vault's audit log

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{Duration, Utc};

use crate::auth_helpers::{resolve_vault_access, AuthUser};
use crate::error::{AppError, Result};
use crate::types::{ok, ApiResponse, InviteAccepted, InviteCreatedResponse, InviteInfo};
use crate::AppState;

pub async fn create_invite(
    State(state): State<AppState>,
    user: AuthUser,
    Path(vault_id): Path<String>,
) -> Result<Json<ApiResponse<InviteCreatedResponse>>> {
    let access = resolve_vault_access(&state, &user, &vault_id).await?;
    access.require_owner("Only vault owners can generate invite links")?;

    let ttl = Duration::days(state.config.invite_ttl_days);
    let invite = state
        .storage
        .create_invite(access.vault.id, ttl, user.actor())
        .await?;
    tracing::info!("User {} created an invite for vault {}", user.user_id, access.vault.id);

    Ok(ok(InviteCreatedResponse {
        invite_token: invite.token,
        expires_at: invite.expires_at,
    }))
}

/// Checks a token without consuming it. Open to anonymous callers so the
/// invite page can show what is being joined before sign-in.
pub async fn validate_invite(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<ApiResponse<InviteInfo>>> {
    let lookup = state
        .storage
        .find_invite(&token)
        .await?
        .ok_or_else(|| AppError::NotFound("Invite not found".to_string()))?;

    if lookup.invite.is_expired(Utc::now()) {
        return Err(AppError::Expired("This invite link has expired".to_string()));
    }
    if lookup.invite.is_used() {
        return Err(AppError::Used("This invite link has already been used".to_string()));
    }

    Ok(ok(InviteInfo {
        vault_id: lookup.vault.id,
        vault_name: lookup.vault.name,
        inviter_name: lookup.inviter_name,
        expires_at: lookup.invite.expires_at,
        valid: true,
    }))
}

pub async fn accept_invite(
    State(state): State<AppState>,
    user: AuthUser,
    Path(token): Path<String>,
) -> Result<Json<ApiResponse<InviteAccepted>>> {
    let invite = state.storage.accept_invite(&token, user.actor()).await?;
    tracing::info!("User {} joined vault {} via invite", user.user_id, invite.vault_id);

    Ok(ok(InviteAccepted {
        message: "Successfully joined the vault".to_string(),
        vault_id: invite.vault_id,
    }))
}
