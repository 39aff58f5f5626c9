// ABOUTME: Authentication helpers resolving the session cookie into a request identity
// ABOUTME: Vault access checks resolve the caller's per-vault role and consult the permission table

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;

use crate::entities::vault;
use crate::error::{AppError, Result};
use crate::permissions::{check_permission, Permission, Role};
use crate::storage::Actor;
use crate::{session, AppState};

/// Identity of the signed-in caller. Carries no role; roles live on vault memberships.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
}

impl AuthUser {
    pub fn actor(&self) -> Actor<'_> {
        Actor {
            user_id: self.user_id,
            name: &self.name,
        }
    }
}

impl From<session::SessionData> for AuthUser {
    fn from(session: session::SessionData) -> Self {
        Self {
            user_id: session.user_id,
            email: session.email,
            name: session.name,
        }
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let jar = CookieJar::from_headers(&parts.headers);
        let session_data = session::extract_session_from_jar(&jar, &state.sessions)?;
        Ok(session_data.into())
    }
}

/// A vault together with the caller's resolved role in it.
#[derive(Debug)]
pub struct VaultAccess {
    pub vault: vault::Model,
    pub role: Role,
}

impl VaultAccess {
    pub fn require_owner(&self, message: &str) -> Result<()> {
        if self.role == Role::Owner {
            Ok(())
        } else {
            Err(AppError::Forbidden(message.to_string()))
        }
    }
}

pub fn parse_id(raw: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound(format!("{} not found", what)))
}

/// Resolves the caller's membership in the vault. Non-members are refused before
/// any permission is considered.
pub async fn resolve_vault_access(
    state: &AppState,
    user: &AuthUser,
    vault_id: &str,
) -> Result<VaultAccess> {
    let vault_id = parse_id(vault_id, "Vault")?;

    let vault = state
        .storage
        .find_vault(vault_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Vault not found".to_string()))?;

    let membership = state
        .storage
        .find_membership(user.user_id, vault_id)
        .await?
        .ok_or_else(|| {
            tracing::warn!("User {} has no membership in vault {}", user.user_id, vault_id);
            AppError::Forbidden("You do not have access to this vault".to_string())
        })?;

    Ok(VaultAccess {
        vault,
        role: membership.role,
    })
}

pub async fn require_permission(
    state: &AppState,
    user: &AuthUser,
    vault_id: &str,
    permission: Permission,
) -> Result<VaultAccess> {
    let access = resolve_vault_access(state, user, vault_id).await?;

    if !check_permission(access.role, permission) {
        tracing::warn!(
            "User {} with role {} denied {} on vault {}",
            user.user_id,
            access.role,
            permission,
            access.vault.id
        );
        return Err(AppError::Forbidden(format!(
            "Insufficient permissions: {} role cannot perform {}",
            access.role, permission
        )));
    }

    Ok(access)
}
