use std::path::PathBuf;

use anyhow::{anyhow, bail};

const DEFAULT_DATABASE_NAME: &str = "theatre-axum";
const DEFAULT_MEDIA_ROOT: &str = "media";

#[derive(Debug, Clone, PartialEq)]
pub struct AdminCredentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: String,
    pub database_name: String,
    pub app_url: String,
    pub media_root: PathBuf,
    pub admin: Option<AdminCredentials>,
}

impl Config {
    /// Builds the config from a key lookup, normally the Shuttle secret store.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| anyhow!("secret {key} was not found"))
        };

        let admin = match (lookup("ADMIN_EMAIL"), lookup("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminCredentials { email, password }),
            (None, None) => None,
            _ => bail!("ADMIN_EMAIL and ADMIN_PASSWORD must be set together"),
        };

        Ok(Config {
            database_url: required("MONGODB_URI")?,
            app_url: required("APP_URL")?,
            database_name: lookup("DATABASE_NAME")
                .unwrap_or_else(|| DEFAULT_DATABASE_NAME.to_string()),
            media_root: lookup("MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MEDIA_ROOT)),
            admin,
        })
    }
}
