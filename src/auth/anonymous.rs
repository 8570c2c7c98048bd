//! Anonymous sign-in and id token refresh

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use super::{Identity, TokenStore};
use crate::config::Config;

const SIGN_UP_URL: &str = "https://identitytoolkit.googleapis.com/v1/accounts:signUp";
const REFRESH_URL: &str = "https://securetoken.googleapis.com/v1/token";

/// Response from `accounts:signUp`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    id_token: String,
    refresh_token: String,
    expires_in: Option<String>,
    local_id: String,
}

/// Response from the secure token endpoint (snake_case, unlike signUp)
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: Option<String>,
    user_id: String,
}

/// Both endpoints report lifetimes as strings of seconds.
fn parse_expires_in(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|s| s.trim().parse().ok())
}

/// Create a new anonymous account.
async fn sign_up(http: &reqwest::Client, api_key: &str) -> Result<SignUpResponse> {
    tracing::debug!("Requesting anonymous account");

    let resp = http
        .post(SIGN_UP_URL)
        .query(&[("key", api_key)])
        .json(&serde_json::json!({ "returnSecureToken": true }))
        .send()
        .await
        .context("Failed to call anonymous sign-up")?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!(
            "Anonymous sign-up failed (HTTP {}): {}",
            status.as_u16(),
            body
        );
    }

    resp.json()
        .await
        .context("Failed to parse sign-up response")
}

/// Refresh the id token using a stored refresh_token.
/// Returns Ok(true) if refresh succeeded, Ok(false) if there was nothing to refresh.
pub async fn refresh() -> Result<bool> {
    let mut config = Config::load()?;
    let refresh_token_str = match config.get_refresh_token() {
        Some(rt) => rt,
        None => return Ok(false),
    };
    let api_key = config.api_key()?.to_string();

    tracing::info!("Refreshing id token...");

    let resp = reqwest::Client::new()
        .post(REFRESH_URL)
        .query(&[("key", api_key.as_str())])
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token_str.as_str()),
        ])
        .send()
        .await
        .context("Failed to call token refresh")?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("Token refresh failed (HTTP {}): {}", status.as_u16(), body);
    }

    let refreshed: RefreshResponse = resp
        .json()
        .await
        .context("Failed to parse token refresh response")?;

    config.user_id = Some(refreshed.user_id);
    config.set_id_token(
        refreshed.id_token,
        parse_expires_in(refreshed.expires_in.as_deref()),
    );
    config.set_refresh_token(refreshed.refresh_token);
    config.save()?;

    tracing::info!("Token refresh complete");
    Ok(true)
}

/// What `login` has to do with the cached credentials.
#[derive(Debug, PartialEq, Eq)]
enum LoginStep {
    AlreadySignedIn,
    Refresh,
    SignUp,
}

fn login_step(config: &Config, force: bool) -> LoginStep {
    if force {
        return LoginStep::SignUp;
    }
    let token_valid = config.get_id_token().map_or(false, |t| !t.is_expired());
    if config.user_id.is_some() && token_valid {
        return LoginStep::AlreadySignedIn;
    }
    // A refresh keeps the existing anonymous account, and with it the
    // authorship of earlier messages.
    if config.get_refresh_token().is_some() {
        return LoginStep::Refresh;
    }
    LoginStep::SignUp
}

/// Sign in anonymously, reusing the cached account unless `force` is set.
pub async fn login(force: bool) -> Result<()> {
    let mut config = Config::load()?;

    match login_step(&config, force) {
        LoginStep::AlreadySignedIn => {
            println!("Already signed in. Use --force to create a new anonymous account.");
            return Ok(());
        }
        LoginStep::Refresh => {
            tracing::info!("Id token missing or expired, attempting refresh...");
            match refresh().await {
                Ok(true) => {
                    println!("Token refreshed successfully.");
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Refresh failed, signing in again: {:#}", e);
                }
            }
        }
        LoginStep::SignUp => {}
    }

    let api_key = config.api_key()?.to_string();
    let account = sign_up(&reqwest::Client::new(), &api_key).await?;

    config.user_id = Some(account.local_id.clone());
    config.set_id_token(
        account.id_token,
        parse_expires_in(account.expires_in.as_deref()),
    );
    config.set_refresh_token(account.refresh_token);
    config.save()?;

    println!("Signed in anonymously.");
    println!(
        "User:  {} ({})",
        account.local_id,
        config.display_name_for(&account.local_id)
    );
    Ok(())
}

/// Clear cached credentials.
pub async fn logout() -> Result<()> {
    let mut config = Config::load()?;
    config.clear_tokens();
    config.save()?;
    println!("Logged out.");
    Ok(())
}

/// Print the cached identity and token state.
pub async fn status() -> Result<()> {
    let config = Config::load()?;

    match config.database_url.as_deref() {
        Some(url) => println!("Database:    {}", url),
        None => println!("Database:    not configured"),
    }

    match config.user_id.as_deref() {
        Some(uid) => println!("User:        {} ({})", uid, config.display_name_for(uid)),
        None => println!("User:        not signed in"),
    }

    match config.get_id_token() {
        Some(token) if !token.is_expired() => {
            println!("Id token:    valid");
            if let Some(exp) = token.expires_at {
                println!("  expires_at: {}", exp);
            }
        }
        Some(_) => println!("Id token:    expired"),
        None => println!("Id token:    none"),
    }

    match config.get_refresh_token() {
        Some(_) => println!("Refresh tok: present"),
        None => println!("Refresh tok: none"),
    }

    println!(
        "Notify:      {}",
        if config.notifications { "on" } else { "off" }
    );

    Ok(())
}

/// Return the signed-in identity, refreshing the id token when it expired.
pub async fn current_identity() -> Result<Identity> {
    let mut config = Config::load()?;

    let needs_refresh = config.get_id_token().map_or(true, |t| t.is_expired());
    if needs_refresh {
        if config.get_refresh_token().is_none() {
            bail!("Not signed in. Run 'roomchat login'.");
        }
        tracing::info!("Id token missing or expired, refreshing...");
        match refresh().await {
            Ok(true) => config = Config::load()?,
            Ok(false) => bail!("No refresh token available. Run 'roomchat login'."),
            Err(e) => bail!("Token refresh failed: {:#}. Run 'roomchat login'.", e),
        }
    }

    let user_id = config
        .user_id
        .clone()
        .context("No user id cached. Run 'roomchat login'.")?;
    let id_token = config
        .get_id_token()
        .context("No id token. Run 'roomchat login'.")?
        .token;

    Ok(Identity { user_id, id_token })
}
