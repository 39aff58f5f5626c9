// ABOUTME: Demo data for local development: three users and two vaults owned by the demo owner
// ABOUTME: Safe to run repeatedly; existing demo users and vaults are reused

use crate::auth::hash_password;
use crate::error::AppError;
use crate::permissions::Role;
use crate::storage::{Actor, Storage};

const DEMO_USERS: [(&str, &str, &str); 3] = [
    ("owner@demo.com", "Demo Owner", "owner123"),
    ("contributor@demo.com", "Demo Contributor", "contributor123"),
    ("viewer@demo.com", "Demo Viewer", "viewer123"),
];

const DEMO_VAULTS: [&str; 2] = ["Research Papers", "Project Documentation"];

pub async fn seed_demo(storage: &Storage) -> anyhow::Result<()> {
    let mut users = Vec::with_capacity(DEMO_USERS.len());
    for (email, name, password) in DEMO_USERS {
        let user = match storage.find_user_by_email(email).await? {
            Some(user) => user,
            None => {
                let user = storage
                    .create_user(email, name, &hash_password(password)?)
                    .await?;
                tracing::info!("Created demo user {}", user.email);
                user
            }
        };
        users.push(user);
    }

    let [owner, contributor, viewer] = &users[..] else {
        anyhow::bail!("demo user list is incomplete");
    };

    let existing = storage.list_vaults_for_user(owner.id).await?;
    let mut first_vault = None;
    for name in DEMO_VAULTS {
        let vault = match existing
            .iter()
            .find(|summary| summary.vault.name == name && summary.vault.owner_id == owner.id)
        {
            Some(summary) => summary.vault.clone(),
            None => {
                let actor = Actor {
                    user_id: owner.id,
                    name: &owner.name,
                };
                let vault = storage.create_vault(name, actor).await?;
                tracing::info!("Created demo vault {}", vault.name);
                vault
            }
        };
        first_vault.get_or_insert(vault);
    }

    if let Some(vault) = first_vault {
        for (user, role) in [(contributor, Role::Contributor), (viewer, Role::Viewer)] {
            match storage.add_membership(user.id, vault.id, role).await {
                Ok(_) | Err(AppError::Conflict(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
    }

    tracing::info!("Demo data ready: owner@demo.com / owner123, contributor@demo.com / contributor123, viewer@demo.com / viewer123");
    Ok(())
}
