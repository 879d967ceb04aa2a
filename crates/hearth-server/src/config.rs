use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;
use thiserror::Error;

use hearth_chat::ChatConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be {expected}, got {value:?}")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub index_path: PathBuf,
    pub max_messages: usize,
    pub presence_ttl_secs: u32,
    pub trust_forwarded: bool,
    pub self_ping: bool,
    pub self_ping_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key/value source. Unset keys take defaults;
    /// set but unparsable keys are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port_key = if lookup("HEARTH_PORT").is_some() {
            "HEARTH_PORT"
        } else {
            "PORT"
        };
        // Hosting platforms (Render) sleep idle services; ping ourselves there by default.
        let on_render = lookup("RENDER").is_some();

        let max_messages = parse(&lookup, "HEARTH_MAX_MESSAGES", 1000, "a positive integer")?;
        if max_messages == 0 {
            return Err(ConfigError::Invalid {
                key: "HEARTH_MAX_MESSAGES",
                value: "0".into(),
                expected: "a positive integer",
            });
        }

        Ok(Self {
            host: lookup("HEARTH_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse(&lookup, port_key, 5000, "a port number")?,
            data_dir: lookup("HEARTH_DATA_DIR").unwrap_or_else(|| ".".into()).into(),
            index_path: lookup("HEARTH_INDEX_PATH")
                .unwrap_or_else(|| "index.html".into())
                .into(),
            max_messages,
            presence_ttl_secs: parse(&lookup, "HEARTH_PRESENCE_TTL_SECS", 15, "a number of seconds")?,
            trust_forwarded: flag(&lookup, "HEARTH_TRUST_FORWARDED", false)?,
            self_ping: flag(&lookup, "HEARTH_SELF_PING", on_render)?,
            self_ping_interval: Duration::from_secs(parse(
                &lookup,
                "HEARTH_SELF_PING_INTERVAL_SECS",
                600,
                "a number of seconds",
            )?),
        })
    }

    pub fn chat_config(&self) -> ChatConfig {
        ChatConfig {
            max_messages: self.max_messages,
            presence_ttl: TimeDelta::seconds(i64::from(self.presence_ttl_secs)),
        }
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            value,
            expected,
        }),
    }
}

fn flag(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(value) = lookup(key) else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value,
            expected: "a boolean",
        }),
    }
}
