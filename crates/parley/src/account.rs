// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley login`, `parley logout` and `parley history`.

use colored::Colorize;
use parley_client::ChatClient;
use parley_config::ParleyConfig;
use parley_core::ParleyError;
use secrecy::SecretString;

use crate::shell::format_message;

/// Prompt for a password, exchange it for a credential, and store it.
pub async fn run_login(config: ParleyConfig, user_name: &str) -> Result<(), ParleyError> {
    let password = rpassword::prompt_password(format!("password for {user_name}: "))
        .map(SecretString::from)
        .map_err(|e| ParleyError::Internal(format!("failed to read password: {e}")))?;

    let client = ChatClient::new(&config)?;
    let result = client.authenticate(user_name, &password).await;
    client.shutdown().await;
    result?;

    println!("{} as {}", "logged in".green(), user_name.bold());
    Ok(())
}

pub async fn run_logout(config: ParleyConfig) -> Result<(), ParleyError> {
    let client = ChatClient::new(&config)?;
    if !client.state().has_credential() {
        println!("{}", "not logged in".dimmed());
        client.shutdown().await;
        return Ok(());
    }
    let result = client.logout().await;
    client.shutdown().await;
    result?;

    println!("{}", "logged out".green());
    Ok(())
}

/// Fetch the conversation over the API and print it.
pub async fn run_history(config: ParleyConfig) -> Result<(), ParleyError> {
    let client = ChatClient::new(&config)?;
    let result = client.fetch_history().await;
    let messages = client.messages();
    client.shutdown().await;

    let count = result?;
    if count == 0 {
        println!("{}", "no messages yet".dimmed());
    }
    for message in &messages {
        println!("{}", format_message(message));
    }
    Ok(())
}
