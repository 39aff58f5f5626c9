// ABOUTME: SeaORM storage layer for users, vaults, memberships, sources, invites and the audit log
// ABOUTME: Every write that produces an audit entry commits in the same transaction as the entry

use anyhow::Context;
use chrono::{Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, Database,
    DatabaseConnection, DbErr, EntityTrait, FromQueryResult, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use std::collections::HashMap;
use uuid::Uuid;

use crate::entities::audit_log::{self, AuditAction};
use crate::entities::{source, user, vault, vault_invite, vault_member};
use crate::error::{AppError, Result};
use crate::migration::Migrator;
use crate::permissions::Role;
use crate::types::{
    CreateSourceRequest, MemberInfo, SourceWithCreator, UserSummary, VaultDetail, VaultSummary,
};

const INVITE_TOKEN_BYTES: usize = 32;

#[derive(Debug, FromQueryResult)]
struct SourceCount {
    vault_id: Uuid,
    count: i64,
}

pub struct Storage {
    pub db: DatabaseConnection,
}

/// Who is performing a mutation, as recorded in the audit log.
#[derive(Debug, Clone, Copy)]
pub struct Actor<'a> {
    pub user_id: Uuid,
    pub name: &'a str,
}

pub struct InviteLookup {
    pub invite: vault_invite::Model,
    pub vault: vault::Model,
    pub inviter_name: String,
}

impl From<user::Model> for UserSummary {
    fn from(user: user::Model) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
        }
    }
}

impl Storage {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let db = Database::connect(database_url)
            .await
            .with_context(|| format!("failed to open database {}", database_url))?;

        Migrator::up(&db, None).await.context("failed to run migrations")?;
        tracing::info!("Database ready at {}", database_url);

        Ok(Self { db })
    }

    // Users

    pub async fn create_user(
        &self,
        email: &str,
        name: &str,
        password_hash: &str,
    ) -> Result<user::Model> {
        let user = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(normalize_email(email)),
            name: Set(name.trim().to_string()),
            password_hash: Set(password_hash.to_string()),
            created_at: Set(Utc::now()),
        };

        user.insert(&self.db)
            .await
            .map_err(|err| AppError::from_unique_violation(err, "User with this email already exists"))
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<user::Model>> {
        Ok(user::Entity::find()
            .filter(user::Column::Email.eq(normalize_email(email)))
            .one(&self.db)
            .await?)
    }

    pub async fn find_user(&self, user_id: Uuid) -> Result<Option<user::Model>> {
        Ok(user::Entity::find_by_id(user_id).one(&self.db).await?)
    }

    // Vaults

    pub async fn create_vault(&self, name: &str, owner: Actor<'_>) -> Result<vault::Model> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let vault = vault::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.trim().to_string()),
            owner_id: Set(owner.user_id),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        insert_membership(&txn, owner.user_id, vault.id, Role::Owner).await?;

        record_audit(
            &txn,
            vault.id,
            owner.user_id,
            AuditAction::VaultCreated,
            format!("{} created the vault \"{}\"", owner.name, vault.name),
        )
        .await?;

        txn.commit().await?;
        Ok(vault)
    }

    pub async fn find_vault(&self, vault_id: Uuid) -> Result<Option<vault::Model>> {
        Ok(vault::Entity::find_by_id(vault_id).one(&self.db).await?)
    }

    /// Every vault the user holds a membership in, newest first, with the resolved role.
    pub async fn list_vaults_for_user(&self, user_id: Uuid) -> Result<Vec<VaultSummary>> {
        let rows = vault_member::Entity::find()
            .filter(vault_member::Column::UserId.eq(user_id))
            .find_also_related(vault::Entity)
            .order_by_desc(vault::Column::CreatedAt)
            .all(&self.db)
            .await?;

        let vault_ids: Vec<Uuid> = rows.iter().map(|(membership, _)| membership.vault_id).collect();
        let counts: HashMap<Uuid, u64> = source::Entity::find()
            .select_only()
            .column(source::Column::VaultId)
            .column_as(Expr::col(source::Column::Id).count(), "count")
            .filter(source::Column::VaultId.is_in(vault_ids))
            .group_by(source::Column::VaultId)
            .into_model::<SourceCount>()
            .all(&self.db)
            .await?
            .into_iter()
            .map(|row| (row.vault_id, row.count.max(0) as u64))
            .collect();

        Ok(rows
            .into_iter()
            .filter_map(|(membership, vault)| {
                let vault = vault?;
                Some(VaultSummary {
                    source_count: counts.get(&vault.id).copied().unwrap_or(0),
                    vault,
                    user_role: membership.role,
                })
            })
            .collect())
    }

    pub async fn vault_detail(&self, vault: vault::Model, user_role: Role) -> Result<VaultDetail> {
        let sources = source::Entity::find()
            .filter(source::Column::VaultId.eq(vault.id))
            .find_also_related(user::Entity)
            .order_by_desc(source::Column::CreatedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(|(source, creator)| SourceWithCreator {
                source,
                creator: creator.map(UserSummary::from),
            })
            .collect();

        let members = vault_member::Entity::find()
            .filter(vault_member::Column::VaultId.eq(vault.id))
            .find_also_related(user::Entity)
            .order_by_asc(vault_member::Column::CreatedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(|(membership, user)| MemberInfo {
                membership,
                user: user.map(UserSummary::from),
            })
            .collect();

        Ok(VaultDetail {
            vault,
            user_role,
            sources,
            members,
        })
    }

    pub async fn rename_vault(
        &self,
        vault_id: Uuid,
        name: &str,
        actor: Actor<'_>,
    ) -> Result<vault::Model> {
        let txn = self.db.begin().await?;

        let existing = vault::Entity::find_by_id(vault_id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound("Vault not found".to_string()))?;
        let old_name = existing.name.clone();

        let mut active: vault::ActiveModel = existing.into();
        active.name = Set(name.trim().to_string());
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        record_audit(
            &txn,
            vault_id,
            actor.user_id,
            AuditAction::VaultRenamed,
            format!(
                "{} renamed the vault from \"{}\" to \"{}\"",
                actor.name, old_name, updated.name
            ),
        )
        .await?;

        txn.commit().await?;
        Ok(updated)
    }

    /// Removes the vault with its sources, invites and memberships. Audit entries are kept.
    pub async fn delete_vault(&self, vault_id: Uuid) -> Result<u64> {
        let txn = self.db.begin().await?;

        if vault::Entity::find_by_id(vault_id).one(&txn).await?.is_none() {
            return Err(AppError::NotFound("Vault not found".to_string()));
        }

        let removed_sources = source::Entity::delete_many()
            .filter(source::Column::VaultId.eq(vault_id))
            .exec(&txn)
            .await?
            .rows_affected;
        vault_invite::Entity::delete_many()
            .filter(vault_invite::Column::VaultId.eq(vault_id))
            .exec(&txn)
            .await?;
        vault_member::Entity::delete_many()
            .filter(vault_member::Column::VaultId.eq(vault_id))
            .exec(&txn)
            .await?;
        vault::Entity::delete_by_id(vault_id).exec(&txn).await?;

        txn.commit().await?;
        Ok(removed_sources)
    }

    // Memberships

    pub async fn find_membership(
        &self,
        user_id: Uuid,
        vault_id: Uuid,
    ) -> Result<Option<vault_member::Model>> {
        Ok(vault_member::Entity::find()
            .filter(vault_member::Column::UserId.eq(user_id))
            .filter(vault_member::Column::VaultId.eq(vault_id))
            .one(&self.db)
            .await?)
    }

    pub async fn add_membership(
        &self,
        user_id: Uuid,
        vault_id: Uuid,
        role: Role,
    ) -> Result<vault_member::Model> {
        insert_membership(&self.db, user_id, vault_id, role)
            .await
            .map_err(|err| {
                AppError::from_unique_violation(err, "User is already a member of this vault")
            })
    }

    pub async fn update_member_role(
        &self,
        vault_id: Uuid,
        member_id: Uuid,
        role: Role,
        actor: Actor<'_>,
    ) -> Result<MemberInfo> {
        let txn = self.db.begin().await?;

        let (membership, member) = vault_member::Entity::find()
            .filter(vault_member::Column::UserId.eq(member_id))
            .filter(vault_member::Column::VaultId.eq(vault_id))
            .find_also_related(user::Entity)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound("Member not found in this vault".to_string()))?;

        let mut active: vault_member::ActiveModel = membership.into();
        active.role = Set(role);
        let updated = active.update(&txn).await?;

        let member_name = member
            .as_ref()
            .map(|user| user.name.clone())
            .unwrap_or_else(|| "Unknown User".to_string());
        record_audit(
            &txn,
            vault_id,
            actor.user_id,
            AuditAction::RoleChanged,
            format!("{} changed {}'s role to {}", actor.name, member_name, role),
        )
        .await?;

        txn.commit().await?;
        Ok(MemberInfo {
            membership: updated,
            user: member.map(UserSummary::from),
        })
    }

    // Sources

    pub async fn create_source(
        &self,
        vault_id: Uuid,
        request: &CreateSourceRequest,
        actor: Actor<'_>,
    ) -> Result<source::Model> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        if let Some(file_key) = &request.file_key {
            if file_key_in_use(&txn, vault_id, file_key).await? {
                return Err(AppError::Conflict(
                    "File is already attached to another source".to_string(),
                ));
            }
        }

        let source = source::ActiveModel {
            id: Set(Uuid::new_v4()),
            vault_id: Set(vault_id),
            title: Set(request.title.trim().to_string()),
            url: Set(request.url.clone()),
            annotation: Set(request.annotation.clone()),
            file_url: Set(request.file_url.clone()),
            file_key: Set(request.file_key.clone()),
            file_size: Set(request.file_size),
            created_by: Set(Some(actor.user_id)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        record_audit(
            &txn,
            vault_id,
            actor.user_id,
            AuditAction::SourceAdded,
            format!("{} added source \"{}\"", actor.name, source.title),
        )
        .await?;

        txn.commit().await?;
        Ok(source)
    }

    pub async fn list_sources(&self, vault_id: Uuid) -> Result<Vec<source::Model>> {
        Ok(source::Entity::find()
            .filter(source::Column::VaultId.eq(vault_id))
            .order_by_desc(source::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    pub async fn find_source(&self, source_id: Uuid) -> Result<Option<source::Model>> {
        Ok(source::Entity::find_by_id(source_id).one(&self.db).await?)
    }

    /// Deletes the source and reports whether its stored file, if any, is no longer
    /// referenced by another source in the vault.
    pub async fn delete_source(&self, source: &source::Model, actor: Actor<'_>) -> Result<bool> {
        let txn = self.db.begin().await?;

        let deleted = source::Entity::delete_by_id(source.id).exec(&txn).await?;
        if deleted.rows_affected == 0 {
            return Err(AppError::NotFound("Source not found".to_string()));
        }

        record_audit(
            &txn,
            source.vault_id,
            actor.user_id,
            AuditAction::SourceDeleted,
            format!("{} deleted source \"{}\"", actor.name, source.title),
        )
        .await?;

        let file_orphaned = match &source.file_key {
            Some(file_key) => !file_key_in_use(&txn, source.vault_id, file_key).await?,
            None => false,
        };

        txn.commit().await?;
        Ok(file_orphaned)
    }

    // Invites

    pub async fn create_invite(
        &self,
        vault_id: Uuid,
        ttl: Duration,
        actor: Actor<'_>,
    ) -> Result<vault_invite::Model> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let invite = vault_invite::ActiveModel {
            id: Set(Uuid::new_v4()),
            token: Set(generate_invite_token()),
            vault_id: Set(vault_id),
            invited_by: Set(actor.user_id),
            expires_at: Set(now + ttl),
            used_at: Set(None),
            used_by: Set(None),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        record_audit(
            &txn,
            vault_id,
            actor.user_id,
            AuditAction::InviteCreated,
            format!("{} generated an invite link", actor.name),
        )
        .await?;

        txn.commit().await?;
        Ok(invite)
    }

    pub async fn find_invite(&self, token: &str) -> Result<Option<InviteLookup>> {
        let Some((invite, vault)) = vault_invite::Entity::find()
            .filter(vault_invite::Column::Token.eq(token))
            .find_also_related(vault::Entity)
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        let Some(vault) = vault else {
            return Ok(None);
        };

        let inviter_name = self
            .find_user(invite.invited_by)
            .await?
            .map(|user| user.name)
            .unwrap_or_else(|| "Unknown User".to_string());

        Ok(Some(InviteLookup {
            invite,
            vault,
            inviter_name,
        }))
    }

    /// Redeems an invite exactly once, granting contributor membership.
    pub async fn accept_invite(&self, token: &str, actor: Actor<'_>) -> Result<vault_invite::Model> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let invite = vault_invite::Entity::find()
            .filter(vault_invite::Column::Token.eq(token))
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound("Invite not found".to_string()))?;

        if invite.is_expired(now) {
            return Err(AppError::Expired("This invite link has expired".to_string()));
        }
        if invite.is_used() {
            return Err(AppError::Used("This invite link has already been used".to_string()));
        }

        let existing = vault_member::Entity::find()
            .filter(vault_member::Column::UserId.eq(actor.user_id))
            .filter(vault_member::Column::VaultId.eq(invite.vault_id))
            .one(&txn)
            .await?;
        if existing.is_some() {
            return Err(AppError::AlreadyMember(
                "You are already a member of this vault".to_string(),
            ));
        }

        // Conditional on used_at IS NULL so a racing redemption cannot also succeed
        let marked = vault_invite::Entity::update_many()
            .col_expr(vault_invite::Column::UsedAt, Expr::value(now))
            .col_expr(vault_invite::Column::UsedBy, Expr::value(actor.user_id))
            .filter(vault_invite::Column::Id.eq(invite.id))
            .filter(vault_invite::Column::UsedAt.is_null())
            .exec(&txn)
            .await?;
        if marked.rows_affected == 0 {
            return Err(AppError::Used("This invite link has already been used".to_string()));
        }

        insert_membership(&txn, actor.user_id, invite.vault_id, Role::Contributor)
            .await
            .map_err(|err| match AppError::from_unique_violation(err, "") {
                AppError::Conflict(_) => {
                    AppError::AlreadyMember("You are already a member of this vault".to_string())
                }
                other => other,
            })?;

        record_audit(
            &txn,
            invite.vault_id,
            actor.user_id,
            AuditAction::VaultJoined,
            format!("{} joined the vault via invite link", actor.name),
        )
        .await?;

        txn.commit().await?;

        Ok(vault_invite::Model {
            used_at: Some(now),
            used_by: Some(actor.user_id),
            ..invite
        })
    }

    // Audit log

    pub async fn list_audit(&self, vault_id: Uuid, limit: u64) -> Result<Vec<audit_log::Model>> {
        Ok(audit_log::Entity::find()
            .filter(audit_log::Column::VaultId.eq(vault_id))
            .order_by_desc(audit_log::Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await?)
    }
}

async fn insert_membership<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    vault_id: Uuid,
    role: Role,
) -> std::result::Result<vault_member::Model, DbErr> {
    vault_member::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        vault_id: Set(vault_id),
        role: Set(role),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await
}

async fn record_audit<C: ConnectionTrait>(
    conn: &C,
    vault_id: Uuid,
    user_id: Uuid,
    action: AuditAction,
    details: String,
) -> std::result::Result<audit_log::Model, DbErr> {
    audit_log::ActiveModel {
        id: Set(Uuid::new_v4()),
        vault_id: Set(vault_id),
        user_id: Set(user_id),
        action: Set(action),
        details: Set(details),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await
}

async fn file_key_in_use<C: ConnectionTrait>(
    conn: &C,
    vault_id: Uuid,
    file_key: &str,
) -> std::result::Result<bool, DbErr> {
    let references = source::Entity::find()
        .filter(source::Column::VaultId.eq(vault_id))
        .filter(source::Column::FileKey.eq(file_key))
        .count(conn)
        .await?;
    Ok(references > 0)
}

fn generate_invite_token() -> String {
    let mut bytes = [0u8; INVITE_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
