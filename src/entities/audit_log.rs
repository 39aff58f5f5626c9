// ABOUTME: Append-only audit record of actions taken inside a vault
// ABOUTME: No foreign keys, so entries outlive both the acting user and the vault

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    #[sea_orm(string_value = "VAULT_CREATED")]
    VaultCreated,
    #[sea_orm(string_value = "VAULT_RENAMED")]
    VaultRenamed,
    #[sea_orm(string_value = "SOURCE_ADDED")]
    SourceAdded,
    #[sea_orm(string_value = "SOURCE_DELETED")]
    SourceDeleted,
    #[sea_orm(string_value = "INVITE_CREATED")]
    InviteCreated,
    #[sea_orm(string_value = "VAULT_JOINED")]
    VaultJoined,
    #[sea_orm(string_value = "ROLE_CHANGED")]
    RoleChanged,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "audit_logs")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub vault_id: Uuid,
    pub user_id: Uuid,
    pub action: AuditAction,
    pub details: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
