use crate::config::Config;
use crate::db::{NewUser, Store};
use crate::domain::Permission;

fn seed_username(i: u32) -> String {
    format!("user{i}")
}

/// Creates `user1..=userN` Read accounts, skipping names that already exist.
pub async fn cmd_seed_users(config: &Config, count: u32) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;

    let mut created = 0;
    for i in 1..=count {
        let username = seed_username(i);
        if store.get_user_by_username(&username).await?.is_some() {
            continue;
        }

        store
            .create_user(
                NewUser {
                    email: Some(format!("{username}@abc.com")),
                    password: format!("{username}123"),
                    permission: Permission::Read,
                    username,
                },
                &config.security,
            )
            .await?;
        created += 1;
    }

    println!("✓ Seeded {created} user(s) ({} already present)", count - created);
    Ok(())
}

pub async fn cmd_unseed_users(config: &Config, count: u32) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;

    let mut removed = 0;
    for i in 1..=count {
        if store.delete_user(&seed_username(i)).await? {
            removed += 1;
        }
    }

    println!("✓ Removed {removed} seeded user(s)");
    Ok(())
}
