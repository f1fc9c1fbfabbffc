use std::io::Write;

use crate::config::Config;
use crate::db::Store;
use crate::domain::Permission;
use crate::services::{
    AccountUpdate, InventoryError, InventoryService, NewAccount, SeaOrmInventoryService,
};

async fn inventory(config: &Config) -> anyhow::Result<SeaOrmInventoryService> {
    let store = Store::new(&config.general.database_path).await?;
    Ok(SeaOrmInventoryService::new(store, config.security.clone()))
}

fn prompt(label: &str) -> anyhow::Result<String> {
    print!("{label}: ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}

pub async fn cmd_user_create(
    config: &Config,
    username: &str,
    password: Option<String>,
    email: Option<String>,
    permission: &str,
) -> anyhow::Result<()> {
    let permission: Permission = permission.parse().map_err(anyhow::Error::msg)?;

    let password = match password {
        Some(p) => p,
        None => prompt("Password")?,
    };
    if password.is_empty() {
        println!("Password cannot be empty.");
        return Ok(());
    }

    let service = inventory(config).await?;
    match service
        .create_user(NewAccount {
            username: username.to_string(),
            email,
            password,
            permission: Some(permission),
        })
        .await
    {
        Ok(user) => println!("✓ Created user '{}' ({})", user.username, user.permission),
        Err(InventoryError::Conflict(msg)) => println!("Cannot create user: {msg}"),
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

pub async fn cmd_user_list(config: &Config) -> anyhow::Result<()> {
    let users = inventory(config).await?.list_users().await?;

    if users.is_empty() {
        println!("No users.");
        return Ok(());
    }

    println!("{:<24} {:<10} {:<32} CREATED", "USERNAME", "PERMISSION", "EMAIL");
    for user in users {
        println!(
            "{:<24} {:<10} {:<32} {}",
            user.username,
            user.permission,
            user.email.as_deref().unwrap_or("-"),
            user.created_at
        );
    }

    Ok(())
}

pub async fn cmd_user_delete(config: &Config, username: &str, yes: bool) -> anyhow::Result<()> {
    let service = inventory(config).await?;

    if !yes {
        let answer = prompt(&format!("Delete user '{username}'? Enter 'y' to confirm"))?;
        if !answer.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    match service.delete_user(username).await {
        Ok(()) => println!("✓ Deleted user '{username}'"),
        Err(InventoryError::NotFound(what)) => println!("{what} not found."),
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

pub async fn cmd_user_set_permission(
    config: &Config,
    username: &str,
    permission: &str,
) -> anyhow::Result<()> {
    let permission: Permission = permission.parse().map_err(anyhow::Error::msg)?;

    let service = inventory(config).await?;
    match service
        .update_user(
            username,
            AccountUpdate {
                permission: Some(permission),
                ..AccountUpdate::default()
            },
        )
        .await
    {
        Ok(user) => println!("✓ '{}' now has {} permission", user.username, user.permission),
        Err(InventoryError::NotFound(what)) => println!("{what} not found."),
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
