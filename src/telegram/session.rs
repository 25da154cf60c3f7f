//! Interactive login that produces a `TG_SESSION_STRING`.
//!
//! Meant for a local terminal only. The session lives in memory and is
//! printed once; nothing is written to disk.

use anyhow::{anyhow, Result};
use console::{style, Term};
use grammers_client::{Client, Config as GrammersConfig, InitParams, SignInError};
use grammers_session::Session;

use super::client::encode_session;
use crate::config::TelegramCredentials;

/// Log in interactively and return the encoded session string
pub async fn generate_session(app: &TelegramCredentials) -> Result<String> {
    let term = Term::stderr();

    term.write_line(&format!("\n{}", style("--- ATTENTION ---").yellow().bold()))?;
    term.write_line("Run this in a LOCAL, INTERACTIVE terminal. You will be asked for your")?;
    term.write_line("phone number, the login code Telegram sends you and, if enabled, your 2FA password.")?;
    term.write_line("-----------------\n")?;

    let client = Client::connect(GrammersConfig {
        session: Session::new(),
        api_id: app.api_id,
        api_hash: app.api_hash.clone(),
        params: InitParams::default(),
    })
    .await
    .map_err(|e| anyhow!("Failed to connect to Telegram: {}", e))?;

    let authorized = client
        .is_authorized()
        .await
        .map_err(|e| anyhow!("Failed to query authorization state: {}", e))?;

    if !authorized {
        let phone = prompt(&term, "Phone number (international format, e.g. +15551234567): ")?;
        let token = client
            .request_login_code(&phone)
            .await
            .map_err(|e| anyhow!("Could not request a login code: {}", e))?;

        let code = prompt(&term, "Login code: ")?;
        match client.sign_in(&token, &code).await {
            Ok(_) => {}
            Err(SignInError::PasswordRequired(password_token)) => {
                term.write_str("Two-factor authentication password: ")?;
                let password = term.read_secure_line()?;
                client
                    .check_password(password_token, password.trim())
                    .await
                    .map_err(|e| anyhow!("Login failed, wrong 2FA password? {}", e))?;
            }
            Err(e) => {
                return Err(anyhow!(
                    "Login failed! Check the phone number and login code: {}",
                    e
                ))
            }
        }
    }

    let encoded = encode_session(client.session());
    if encoded.is_empty() {
        anyhow::bail!("Session string is empty after a successful login");
    }

    Ok(encoded)
}

fn prompt(term: &Term, label: &str) -> Result<String> {
    term.write_str(label)?;
    let line = term.read_line()?;
    let value = line.trim().to_string();
    if value.is_empty() {
        anyhow::bail!("No input given for '{}'", label.trim_end_matches([':', ' ']));
    }
    Ok(value)
}
