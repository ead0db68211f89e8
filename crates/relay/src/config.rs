//! Configuration for the relay service.

use std::env;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use notify::DEFAULT_API_URL as DEFAULT_DISCORD_API_URL;

/// Default port for the webhook HTTP server.
pub const DEFAULT_PORT: u16 = 5000;

/// Default GitHub REST API base URL.
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Port variable read when `WEBHOOK_PORT` is unset.
pub const LEGACY_PORT_VAR: &str = "FLASK_PORT";

/// Default Discord gateway URL.
pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

const REQUIRED: [&str; 6] = [
    "DISCORD_BOT_TOKEN",
    "DISCORD_GUILD_ID",
    "DISCORD_CHANNEL_ID",
    "GITHUB_TOKEN",
    "GITHUB_REPO",
    "GITHUB_WEBHOOK_SECRET",
];

/// Startup configuration errors. Any of these stops the process.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// One or more required variables are unset or empty
    #[error("Missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    /// A variable is present but cannot be used
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Repository identifier in `owner/name` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoName {
    pub owner: String,
    pub name: String,
}

impl RepoName {
    /// Parse `owner/name`.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::Invalid {
            name: "GITHUB_REPO",
            reason: "must be in format 'owner/repository'".to_string(),
        };

        let (owner, name) = value.trim().split_once('/').ok_or_else(invalid)?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(invalid());
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Relay configuration, loaded once at startup.
#[derive(Clone)]
pub struct Config {
    /// Discord bot token.
    pub discord_token: String,
    /// Guild the slash commands are registered in.
    pub discord_guild_id: u64,
    /// Channel notifications are posted to.
    pub discord_channel_id: u64,
    /// GitHub token for REST queries.
    pub github_token: String,
    /// Repository being relayed.
    pub github_repo: RepoName,
    /// Shared secret for webhook signatures.
    pub webhook_secret: String,
    /// HTTP server port.
    pub port: u16,
    /// GitHub REST API base URL.
    pub github_api_url: String,
    /// Discord REST API base URL.
    pub discord_api_url: String,
    /// Discord gateway URL.
    pub gateway_url: String,
    /// Directory for the log file, when file logging is wanted.
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// Tokens and the webhook secret are kept byte for byte; every other
    /// value is trimmed.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let value = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let missing: Vec<&'static str> = REQUIRED
            .iter()
            .copied()
            .filter(|key| value(*key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let required = |key: &'static str| value(key).ok_or(ConfigError::Missing(vec![key]));
        let secret = |key: &'static str| {
            get(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(vec![key]))
        };

        let port = match (value("WEBHOOK_PORT"), value(LEGACY_PORT_VAR)) {
            (Some(raw), _) => parse_number("WEBHOOK_PORT", &raw)?,
            (None, Some(raw)) => parse_number(LEGACY_PORT_VAR, &raw)?,
            (None, None) => DEFAULT_PORT,
        };

        Ok(Self {
            discord_token: secret("DISCORD_BOT_TOKEN")?,
            discord_guild_id: parse_number("DISCORD_GUILD_ID", &required("DISCORD_GUILD_ID")?)?,
            discord_channel_id: parse_number(
                "DISCORD_CHANNEL_ID",
                &required("DISCORD_CHANNEL_ID")?,
            )?,
            github_token: secret("GITHUB_TOKEN")?,
            github_repo: RepoName::parse(&required("GITHUB_REPO")?)?,
            webhook_secret: secret("GITHUB_WEBHOOK_SECRET")?,
            port,
            github_api_url: value("GITHUB_API_URL")
                .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string()),
            discord_api_url: value("DISCORD_API_URL")
                .unwrap_or_else(|| DEFAULT_DISCORD_API_URL.to_string()),
            gateway_url: value("DISCORD_GATEWAY_URL")
                .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string()),
            log_dir: value("LOG_DIR").map(PathBuf::from),
        })
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Invalid {
        name,
        reason: format!("'{raw}' is not a valid number"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn complete() -> HashMap<String, String> {
        vars(&[
            ("DISCORD_BOT_TOKEN", "bot-token"),
            ("DISCORD_GUILD_ID", "111"),
            ("DISCORD_CHANNEL_ID", "222"),
            ("GITHUB_TOKEN", "ghp_x"),
            ("GITHUB_REPO", "octo/widgets"),
            ("GITHUB_WEBHOOK_SECRET", "s3cret"),
        ])
    }

    fn load(map: &HashMap<String, String>) -> Result<Config, ConfigError> {
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_defaults_applied() {
        let config = load(&complete()).unwrap();

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.discord_channel_id, 222);
        assert_eq!(config.github_repo.owner, "octo");
        assert_eq!(config.github_repo.name, "widgets");
        assert_eq!(config.github_repo.to_string(), "octo/widgets");
        assert_eq!(config.github_api_url, DEFAULT_GITHUB_API_URL);
        assert_eq!(config.gateway_url, DEFAULT_GATEWAY_URL);
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn test_all_missing_reported_together() {
        let mut map = complete();
        map.remove("GITHUB_TOKEN");
        map.insert("DISCORD_BOT_TOKEN".to_string(), "   ".to_string());

        let err = load(&map).err().unwrap();
        assert_eq!(
            err,
            ConfigError::Missing(vec!["DISCORD_BOT_TOKEN", "GITHUB_TOKEN"])
        );
        assert_eq!(
            err.to_string(),
            "Missing required environment variables: DISCORD_BOT_TOKEN, GITHUB_TOKEN"
        );
    }

    #[test]
    fn test_invalid_repo_format() {
        for bad in ["widgets", "/widgets", "octo/", "a/b/c"] {
            let mut map = complete();
            map.insert("GITHUB_REPO".to_string(), bad.to_string());
            assert!(
                matches!(load(&map), Err(ConfigError::Invalid { name: "GITHUB_REPO", .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_invalid_numbers() {
        let mut map = complete();
        map.insert("DISCORD_CHANNEL_ID".to_string(), "general".to_string());
        assert!(matches!(
            load(&map),
            Err(ConfigError::Invalid { name: "DISCORD_CHANNEL_ID", .. })
        ));

        let mut map = complete();
        map.insert("WEBHOOK_PORT".to_string(), "70000".to_string());
        assert!(matches!(
            load(&map),
            Err(ConfigError::Invalid { name: "WEBHOOK_PORT", .. })
        ));
    }

    #[test]
    fn test_webhook_secret_kept_verbatim() {
        let mut map = complete();
        map.insert("GITHUB_WEBHOOK_SECRET".to_string(), " s3cret\n".to_string());
        map.insert("GITHUB_REPO".to_string(), " octo/widgets ".to_string());

        let config = load(&map).unwrap();
        assert_eq!(config.webhook_secret, " s3cret\n");
        assert_eq!(config.github_token, "ghp_x");
        assert_eq!(config.github_repo.to_string(), "octo/widgets");
    }

    #[test]
    fn test_legacy_port_variable() {
        let mut map = complete();
        map.insert("FLASK_PORT".to_string(), "5055".to_string());
        assert_eq!(load(&map).unwrap().port, 5055);

        map.insert("WEBHOOK_PORT".to_string(), "8088".to_string());
        assert_eq!(load(&map).unwrap().port, 8088);

        let mut map = complete();
        map.insert("FLASK_PORT".to_string(), "web".to_string());
        assert!(matches!(
            load(&map),
            Err(ConfigError::Invalid { name: "FLASK_PORT", .. })
        ));
    }

    #[test]
    fn test_overrides() {
        let mut map = complete();
        map.insert("WEBHOOK_PORT".to_string(), "8088".to_string());
        map.insert("GITHUB_API_URL".to_string(), "http://localhost:9000".to_string());
        map.insert("LOG_DIR".to_string(), "/var/log/relay".to_string());

        let config = load(&map).unwrap();
        assert_eq!(config.port, 8088);
        assert_eq!(config.github_api_url, "http://localhost:9000");
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/relay")));
    }
}
