// ABOUTME: SeaORM entities module for database models and relationships
// ABOUTME: Exports users, vaults, memberships, sources, invites and the audit log

pub mod audit_log;
pub mod source;
pub mod user;
pub mod vault;
pub mod vault_invite;
pub mod vault_member;

pub use audit_log::Entity as AuditLog;
pub use source::Entity as Source;
pub use user::Entity as User;
pub use vault::Entity as Vault;
pub use vault_invite::Entity as VaultInvite;
pub use vault_member::Entity as VaultMember;
