// ABOUTME: Vault handlers: create, list, detail, rename, delete, member roles and the audit log
// ABOUTME: Every vault-scoped call resolves the caller's membership role before touching data

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};

use crate::auth_helpers::{parse_id, require_permission, resolve_vault_access, AuthUser};
use crate::entities::vault;
use crate::error::{AppError, Result};
use crate::permissions::{Permission, Role};
use crate::types::{
    created, ok, ApiResponse, AppJson, AuditLogResponse, MemberInfo, MessageResponse,
    UpdateRoleRequest, VaultDetail, VaultNameRequest, VaultSummary,
};
use crate::validation::validate_vault_name;
use crate::AppState;

pub async fn create_vault(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(req): AppJson<VaultNameRequest>,
) -> Result<impl IntoResponse> {
    validate_vault_name(&req.name)?;

    let vault = state.storage.create_vault(&req.name, user.actor()).await?;
    tracing::info!("User {} created vault {}", user.user_id, vault.id);

    Ok(created(vault))
}

pub async fn list_vaults(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Vec<VaultSummary>>>> {
    let vaults = state.storage.list_vaults_for_user(user.user_id).await?;
    Ok(ok(vaults))
}

pub async fn get_vault(
    State(state): State<AppState>,
    user: AuthUser,
    Path(vault_id): Path<String>,
) -> Result<Json<ApiResponse<VaultDetail>>> {
    let access = require_permission(&state, &user, &vault_id, Permission::VaultRead).await?;
    let detail = state.storage.vault_detail(access.vault, access.role).await?;
    Ok(ok(detail))
}

pub async fn rename_vault(
    State(state): State<AppState>,
    user: AuthUser,
    Path(vault_id): Path<String>,
    AppJson(req): AppJson<VaultNameRequest>,
) -> Result<Json<ApiResponse<vault::Model>>> {
    let access = require_permission(&state, &user, &vault_id, Permission::VaultUpdate).await?;
    validate_vault_name(&req.name)?;

    let vault = state
        .storage
        .rename_vault(access.vault.id, &req.name, user.actor())
        .await?;
    Ok(ok(vault))
}

pub async fn delete_vault(
    State(state): State<AppState>,
    user: AuthUser,
    Path(vault_id): Path<String>,
) -> Result<Json<ApiResponse<MessageResponse>>> {
    let access = require_permission(&state, &user, &vault_id, Permission::VaultDelete).await?;
    let vault_id = access.vault.id;

    let removed_sources = state.storage.delete_vault(vault_id).await?;
    state.files.remove_vault(vault_id).await;
    tracing::info!(
        "User {} deleted vault {} with {} source(s)",
        user.user_id,
        vault_id,
        removed_sources
    );

    Ok(ok(MessageResponse::new("Vault deleted successfully")))
}

pub async fn update_member_role(
    State(state): State<AppState>,
    user: AuthUser,
    Path((vault_id, member_id)): Path<(String, String)>,
    AppJson(req): AppJson<UpdateRoleRequest>,
) -> Result<Json<ApiResponse<MemberInfo>>> {
    let access = resolve_vault_access(&state, &user, &vault_id).await?;
    access.require_owner("Only vault owners can change member roles")?;

    let role: Role = req
        .role
        .parse()
        .map_err(|msg: String| AppError::InvalidInput(format!("Validation failed: {}", msg)))?;
    let member_id = parse_id(&member_id, "Member")?;

    if member_id == user.user_id {
        return Err(AppError::InvalidInput("Cannot change your own role".to_string()));
    }

    let member = state
        .storage
        .update_member_role(access.vault.id, member_id, role, user.actor())
        .await?;
    tracing::info!(
        "User {} set role of {} to {} in vault {}",
        user.user_id,
        member_id,
        role,
        access.vault.id
    );

    Ok(ok(member))
}

pub async fn list_audit_log(
    State(state): State<AppState>,
    user: AuthUser,
    Path(vault_id): Path<String>,
) -> Result<Json<ApiResponse<AuditLogResponse>>> {
    let access = resolve_vault_access(&state, &user, &vault_id).await?;
    access.require_owner("Only vault owners can view audit logs")?;

    let audit_logs = state
        .storage
        .list_audit(access.vault.id, state.config.audit_page_size)
        .await?;
    Ok(ok(AuditLogResponse { audit_logs }))
}
