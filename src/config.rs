use std::path::PathBuf;

use anyhow::{anyhow, Result};

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const DEFAULT_CREDENTIALS_FILE: &str = "credentials.json";

pub const HOME_ENV: &str = "MAILTALLY_HOME";
pub const CREDENTIALS_ENV: &str = "MAILTALLY_CREDENTIALS";
pub const API_BASE_ENV: &str = "MAILTALLY_GMAIL_API_BASE";
pub const TOKEN_URL_ENV: &str = "MAILTALLY_GMAIL_TOKEN_URL";
pub const CLIENT_ID_ENV: &str = "MAILTALLY_GMAIL_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "MAILTALLY_GMAIL_CLIENT_SECRET";
pub const TOKEN_CACHE_KEY_ENV: &str = "MAILTALLY_TOKEN_CACHE_KEY";

/// Gmail permission level. Each scope keeps its own token cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GmailScope {
    ReadOnly,
    Modify,
}

impl GmailScope {
    pub fn url(self) -> &'static str {
        match self {
            Self::ReadOnly => "https://www.googleapis.com/auth/gmail.readonly",
            Self::Modify => "https://www.googleapis.com/auth/gmail.modify",
        }
    }

    fn token_file(self) -> &'static str {
        match self {
            Self::ReadOnly => "token.json",
            Self::Modify => "token_modify.json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub credentials_path: PathBuf,
    pub api_base: String,
    pub token_url: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let data_dir = match env_value(HOME_ENV) {
            Some(home) => PathBuf::from(home),
            None => dirs::home_dir()
                .ok_or_else(|| anyhow!("failed to determine home directory; set {HOME_ENV}"))?
                .join(".mailtally"),
        };

        Ok(Self {
            data_dir,
            credentials_path: env_value(CREDENTIALS_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CREDENTIALS_FILE)),
            api_base: env_value(API_BASE_ENV)
                .map(|base| base.trim_end_matches('/').to_string())
                .unwrap_or_else(|| GMAIL_API_BASE.to_string()),
            token_url: env_value(TOKEN_URL_ENV).unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string()),
        })
    }

    pub fn token_cache_path(&self, scope: GmailScope) -> PathBuf {
        self.data_dir.join(scope.token_file())
    }
}

pub(crate) fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{GmailScope, Settings, GMAIL_API_BASE};

    fn settings() -> Settings {
        Settings {
            data_dir: PathBuf::from("/tmp/mailtally-home"),
            credentials_path: PathBuf::from("credentials.json"),
            api_base: GMAIL_API_BASE.to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
        }
    }

    #[test]
    fn scopes_use_separate_token_caches() {
        let settings = settings();
        assert_ne!(
            settings.token_cache_path(GmailScope::ReadOnly),
            settings.token_cache_path(GmailScope::Modify)
        );
        assert!(settings
            .token_cache_path(GmailScope::Modify)
            .ends_with("token_modify.json"));
    }

    #[test]
    fn scope_urls_match_gmail_permissions() {
        assert!(GmailScope::ReadOnly.url().ends_with("gmail.readonly"));
        assert!(GmailScope::Modify.url().ends_with("gmail.modify"));
    }
}
