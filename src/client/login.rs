//! Credential exchange with the authentication endpoint.
//!
//! The server opens the session with a login challenge; we POST the
//! credentials plus the challenge to the auth endpoint and relay the
//! signed assertion back over the socket. Transient HTTP failures are
//! retried with their own backoff; an explicit rejection is final.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::bot::Bot;

/// Attempts against the auth endpoint before giving up.
const LOGIN_ATTEMPTS: u32 = 3;

/// Base delay between attempts; doubles each retry.
const LOGIN_RETRY_BASE: Duration = Duration::from_secs(1);

/// Login failures.
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("auth endpoint error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed assertion response: {0}")]
    Malformed(String),
    #[error("login rejected: {0}")]
    Rejected(String),
}

/// Answer the server's login challenge: fetch a signed assertion and send
/// the identity claim back over the socket.
pub async fn answer_challenge(bot: &Arc<Bot>, challenge: &str) -> Result<(), LoginError> {
    let assertion = fetch_assertion_with_retry(bot, challenge).await?;
    bot.outbound
        .send_global(&format!("/trn {},0,{}", bot.config.login.username, assertion))
        .await;
    Ok(())
}

async fn fetch_assertion_with_retry(bot: &Arc<Bot>, challenge: &str) -> Result<String, LoginError> {
    let mut delay = LOGIN_RETRY_BASE;
    for attempt in 1..=LOGIN_ATTEMPTS {
        match fetch_assertion(bot, challenge).await {
            Ok(assertion) => return Ok(assertion),
            // A rejection or garbage body will not improve on retry.
            Err(e @ (LoginError::Rejected(_) | LoginError::Malformed(_))) => return Err(e),
            Err(e) if attempt == LOGIN_ATTEMPTS => return Err(e),
            Err(e) => {
                warn!(attempt, error = %e, "auth endpoint unreachable; retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
    }
    unreachable!("loop returns on the last attempt")
}

async fn fetch_assertion(bot: &Arc<Bot>, challenge: &str) -> Result<String, LoginError> {
    let response = bot
        .http
        .post(&bot.config.server.auth_url)
        .form(&[
            ("act", "login"),
            ("name", bot.config.login.username.as_str()),
            ("pass", bot.config.login.password.as_str()),
            ("challstr", challenge),
        ])
        .send()
        .await?
        .error_for_status()?;

    let body = response.text().await?;
    // The endpoint prefixes its JSON body with a `]`.
    let json = body
        .strip_prefix(']')
        .ok_or_else(|| LoginError::Malformed("missing ] prefix".to_string()))?;
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| LoginError::Malformed(e.to_string()))?;

    if !value["actionsuccess"].as_bool().unwrap_or(false) {
        return Err(LoginError::Rejected("action unsuccessful".to_string()));
    }
    let assertion = value["assertion"]
        .as_str()
        .ok_or_else(|| LoginError::Malformed("assertion missing".to_string()))?;
    if assertion.starts_with(";;") {
        // The endpoint reports errors in-band through the assertion field.
        return Err(LoginError::Rejected(assertion.to_string()));
    }

    debug!("assertion obtained");
    Ok(assertion.to_string())
}
