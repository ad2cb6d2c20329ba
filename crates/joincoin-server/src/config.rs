use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Admin tokens that ship in sample env files and must never reach production.
const PLACEHOLDER_TOKENS: &[&str] = &["", "change-me", "changeme", "dev-secret-change-me", "admin"];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub bot_token: String,
    pub telegram_api: String,
    pub admin_token: String,
    pub membership_timeout: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("JOINCOIN_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = lookup("JOINCOIN_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("JOINCOIN_PORT must be a port number")?;
        let db_path = PathBuf::from(lookup("JOINCOIN_DB_PATH").unwrap_or_else(|| "joincoin.db".into()));
        let telegram_api =
            lookup("JOINCOIN_TELEGRAM_API").unwrap_or_else(|| "https://api.telegram.org".into());
        let timeout_secs: u64 = lookup("JOINCOIN_MEMBERSHIP_TIMEOUT_SECS")
            .unwrap_or_else(|| "5".into())
            .parse()
            .context("JOINCOIN_MEMBERSHIP_TIMEOUT_SECS must be a whole number of seconds")?;

        let bot_token = lookup("JOINCOIN_BOT_TOKEN").unwrap_or_default();
        if bot_token.trim().is_empty() {
            bail!("JOINCOIN_BOT_TOKEN is required");
        }

        let admin_token = lookup("JOINCOIN_ADMIN_TOKEN").unwrap_or_default();
        if PLACEHOLDER_TOKENS.contains(&admin_token.trim()) {
            bail!("JOINCOIN_ADMIN_TOKEN is missing or left at a placeholder value");
        }

        Ok(Self {
            host,
            port,
            db_path,
            bot_token,
            telegram_api,
            admin_token,
            membership_timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig> {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        ServerConfig::from_lookup(|key| map.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_apply_around_required_tokens() {
        let cfg = config(&[("JOINCOIN_BOT_TOKEN", "123:abc"), ("JOINCOIN_ADMIN_TOKEN", "s3cret-value")]).unwrap();
        assert_eq!(cfg.bind_addr(), "0.0.0.0:3000");
        assert_eq!(cfg.db_path, PathBuf::from("joincoin.db"));
        assert_eq!(cfg.membership_timeout, Duration::from_secs(5));
    }

    #[test]
    fn missing_or_placeholder_tokens_are_refused() {
        assert!(config(&[("JOINCOIN_ADMIN_TOKEN", "s3cret-value")]).is_err());
        assert!(config(&[("JOINCOIN_BOT_TOKEN", "123:abc")]).is_err());
        assert!(config(&[("JOINCOIN_BOT_TOKEN", "123:abc"), ("JOINCOIN_ADMIN_TOKEN", "change-me")]).is_err());
    }

    #[test]
    fn bad_port_is_reported() {
        let err = config(&[
            ("JOINCOIN_BOT_TOKEN", "1"),
            ("JOINCOIN_ADMIN_TOKEN", "s3cret-value"),
            ("JOINCOIN_PORT", "http"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("JOINCOIN_PORT"));
    }
}
