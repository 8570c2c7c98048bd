//! Configuration and credential storage

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use url::Url;

use crate::auth::{StoredToken, TokenStore};

const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Application configuration
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Realtime Database root, e.g. https://my-app-default-rtdb.firebaseio.com
    pub database_url: Option<String>,
    /// Web API key used for anonymous sign-in
    pub api_key: Option<String>,
    /// Name shown next to sent messages (defaults to User-XXXX)
    pub display_name: Option<String>,
    /// Raise terminal notifications for incoming messages
    pub notifications: bool,
    /// Number of most recent messages loaded when joining a room
    pub history_limit: usize,
    /// Anonymous user id from the last sign-in
    pub user_id: Option<String>,
    /// Stored refresh token
    pub refresh_token: Option<String>,
    /// Stored id token (sent as `auth` on database requests)
    pub id_token: Option<StoredToken>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            api_key: None,
            display_name: None,
            notifications: true,
            history_limit: DEFAULT_HISTORY_LIMIT,
            user_id: None,
            refresh_token: None,
            id_token: None,
        }
    }
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "roomchat", "roomchat")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).context("Failed to create config directory")?;

        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        // Set restrictive permissions on config file (contains tokens)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    pub fn database_url(&self) -> Result<Url> {
        let raw = self
            .database_url
            .as_deref()
            .context("No database URL configured. Run `roomchat config --database-url <URL>`.")?;
        Url::parse(raw).with_context(|| format!("Invalid database URL '{}'", raw))
    }

    pub fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .context("No API key configured. Run `roomchat config --api-key <KEY>`.")
    }

    /// Display name for `user_id`: the configured one, else `User-` plus the
    /// last four characters of the id.
    pub fn display_name_for(&self, user_id: &str) -> String {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => default_display_name(user_id),
        }
    }
}

fn default_display_name(user_id: &str) -> String {
    let count = user_id.chars().count();
    let tail: String = user_id.chars().skip(count.saturating_sub(4)).collect();
    format!("User-{}", tail)
}

impl TokenStore for Config {
    fn get_id_token(&self) -> Option<StoredToken> {
        self.id_token.clone()
    }

    fn set_id_token(&mut self, token: String, expires_in: Option<u64>) {
        self.id_token = Some(StoredToken::new(token, expires_in));
    }

    fn get_refresh_token(&self) -> Option<String> {
        self.refresh_token.clone()
    }

    fn set_refresh_token(&mut self, token: String) {
        self.refresh_token = Some(token);
    }

    fn clear_tokens(&mut self) {
        self.user_id = None;
        self.id_token = None;
        self.refresh_token = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.notifications);
        assert_eq!(config.history_limit, DEFAULT_HISTORY_LIMIT);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config: Config = toml::from_str(
            "database_url = \"https://demo.firebaseio.com\"\nnotifications = false\n",
        )
        .unwrap();
        assert!(!config.notifications);
        assert_eq!(config.history_limit, DEFAULT_HISTORY_LIMIT);
        assert_eq!(
            config.database_url().unwrap().as_str(),
            "https://demo.firebaseio.com/"
        );
    }

    #[test]
    fn test_serialize_with_token_table() {
        let mut config = Config::default();
        config.user_id = Some("abc".to_string());
        config.set_id_token("tok".to_string(), Some(3600));
        config.set_refresh_token("refresh".to_string());

        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.get_id_token().unwrap().token, "tok");
        assert_eq!(back.get_refresh_token().as_deref(), Some("refresh"));
    }

    #[test]
    fn test_missing_settings_have_hints() {
        let config = Config::default();
        let err = config.database_url().unwrap_err();
        assert!(err.to_string().contains("roomchat config"));
        assert!(config.api_key().is_err());
    }

    #[test]
    fn test_display_name_defaults_to_id_tail() {
        let config = Config::default();
        assert_eq!(config.display_name_for("Xk9Qz7PaLm3d"), "User-Lm3d");
        assert_eq!(config.display_name_for("ab"), "User-ab");
    }

    #[test]
    fn test_display_name_override() {
        let config = Config {
            display_name: Some("  Rita ".to_string()),
            ..Config::default()
        };
        assert_eq!(config.display_name_for("whatever"), "Rita");
    }

    #[test]
    fn test_clear_tokens() {
        let mut config = Config::default();
        config.user_id = Some("abc".to_string());
        config.set_id_token("tok".to_string(), None);
        config.set_refresh_token("r".to_string());

        config.clear_tokens();
        assert!(config.user_id.is_none());
        assert!(config.get_id_token().is_none());
        assert!(config.get_refresh_token().is_none());
    }
}
