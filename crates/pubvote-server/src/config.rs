use std::path::PathBuf;

use anyhow::{Context, Result};

use pubvote_api::RoundConfig;
use pubvote_types::models::RoundExpiry;

#[derive(Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub round: RoundConfig,
    pub cleanup_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port: u16 = var("PUBVOTE_PORT", "3000")
            .parse()
            .context("PUBVOTE_PORT must be a port number")?;

        let require_owner_for_end = parse_bool(&var("PUBVOTE_REQUIRE_OWNER", "true"))
            .context("PUBVOTE_REQUIRE_OWNER must be true or false")?;

        let expiry: RoundExpiry = var("PUBVOTE_ROUND_EXPIRY", "end-of-day")
            .parse()
            .context("PUBVOTE_ROUND_EXPIRY")?;

        let cleanup_interval_secs: u64 = var("PUBVOTE_CLEANUP_INTERVAL_SECS", "3600")
            .parse()
            .context("PUBVOTE_CLEANUP_INTERVAL_SECS must be a number of seconds")?;
        if cleanup_interval_secs == 0 {
            anyhow::bail!("PUBVOTE_CLEANUP_INTERVAL_SECS must be greater than zero");
        }

        Ok(Self {
            host: var("PUBVOTE_HOST", "0.0.0.0"),
            port,
            db_path: var("PUBVOTE_DB_PATH", "pubvote.db").into(),
            round: RoundConfig {
                require_owner_for_end,
                expiry,
            },
            cleanup_interval_secs,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
