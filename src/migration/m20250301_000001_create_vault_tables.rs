// ABOUTME: Initial migration creating users, vaults, memberships, sources, invites and audit log tables
// ABOUTME: Encodes the uniqueness and cascade rules the authorization model depends on

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Users::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Users::Email).string().not_null().unique_key())
                    .col(ColumnDef::new(Users::Name).string().not_null())
                    .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                    .col(ColumnDef::new(Users::CreatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Vaults::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Vaults::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Vaults::Name).string().not_null())
                    .col(ColumnDef::new(Vaults::OwnerId).uuid().not_null())
                    .col(ColumnDef::new(Vaults::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Vaults::UpdatedAt).timestamp_with_time_zone().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vaults_owner_id")
                            .from(Vaults::Table, Vaults::OwnerId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(VaultMembers::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(VaultMembers::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(VaultMembers::UserId).uuid().not_null())
                    .col(ColumnDef::new(VaultMembers::VaultId).uuid().not_null())
                    .col(ColumnDef::new(VaultMembers::Role).string_len(16).not_null())
                    .col(ColumnDef::new(VaultMembers::CreatedAt).timestamp_with_time_zone().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vault_members_user_id")
                            .from(VaultMembers::Table, VaultMembers::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vault_members_vault_id")
                            .from(VaultMembers::Table, VaultMembers::VaultId)
                            .to(Vaults::Table, Vaults::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .index(
                        Index::create()
                            .name("idx_vault_members_user_vault")
                            .table(VaultMembers::Table)
                            .col(VaultMembers::UserId)
                            .col(VaultMembers::VaultId)
                            .unique(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Sources::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Sources::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Sources::VaultId).uuid().not_null())
                    .col(ColumnDef::new(Sources::Title).string().not_null())
                    .col(ColumnDef::new(Sources::Url).string())
                    .col(ColumnDef::new(Sources::Annotation).text())
                    .col(ColumnDef::new(Sources::FileUrl).string())
                    .col(ColumnDef::new(Sources::FileKey).string())
                    .col(ColumnDef::new(Sources::FileSize).big_integer())
                    .col(ColumnDef::new(Sources::CreatedBy).uuid())
                    .col(ColumnDef::new(Sources::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Sources::UpdatedAt).timestamp_with_time_zone().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sources_vault_id")
                            .from(Sources::Table, Sources::VaultId)
                            .to(Vaults::Table, Vaults::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sources_created_by")
                            .from(Sources::Table, Sources::CreatedBy)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(VaultInvites::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(VaultInvites::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(VaultInvites::Token).string().not_null().unique_key())
                    .col(ColumnDef::new(VaultInvites::VaultId).uuid().not_null())
                    .col(ColumnDef::new(VaultInvites::InvitedBy).uuid().not_null())
                    .col(ColumnDef::new(VaultInvites::ExpiresAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(VaultInvites::UsedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(VaultInvites::UsedBy).uuid())
                    .col(ColumnDef::new(VaultInvites::CreatedAt).timestamp_with_time_zone().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vault_invites_vault_id")
                            .from(VaultInvites::Table, VaultInvites::VaultId)
                            .to(Vaults::Table, Vaults::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vault_invites_invited_by")
                            .from(VaultInvites::Table, VaultInvites::InvitedBy)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // No foreign keys: entries are kept after the vault or the actor is gone
        manager
            .create_table(
                Table::create()
                    .table(AuditLogs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(AuditLogs::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(AuditLogs::VaultId).uuid().not_null())
                    .col(ColumnDef::new(AuditLogs::UserId).uuid().not_null())
                    .col(ColumnDef::new(AuditLogs::Action).string_len(32).not_null())
                    .col(ColumnDef::new(AuditLogs::Details).text().not_null())
                    .col(ColumnDef::new(AuditLogs::CreatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_audit_logs_vault_created")
                    .table(AuditLogs::Table)
                    .col(AuditLogs::VaultId)
                    .col(AuditLogs::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_sources_vault_id")
                    .table(Sources::Table)
                    .col(Sources::VaultId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AuditLogs::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(VaultInvites::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Sources::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(VaultMembers::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Vaults::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Email,
    Name,
    PasswordHash,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Vaults {
    Table,
    Id,
    Name,
    OwnerId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum VaultMembers {
    Table,
    Id,
    UserId,
    VaultId,
    Role,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Sources {
    Table,
    Id,
    VaultId,
    Title,
    Url,
    Annotation,
    FileUrl,
    FileKey,
    FileSize,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum VaultInvites {
    Table,
    Id,
    Token,
    VaultId,
    InvitedBy,
    ExpiresAt,
    UsedAt,
    UsedBy,
    CreatedAt,
}

#[derive(DeriveIden)]
enum AuditLogs {
    Table,
    Id,
    VaultId,
    UserId,
    Action,
    Details,
    CreatedAt,
}
