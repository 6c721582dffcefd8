use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

use crate::orchestrator::PollPolicy;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Runtime configuration, read from the environment (and `.env`)
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub analytics_database_url: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub default_model: String,
    pub poll_policy: PollPolicy,
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let analytics_database_url = match env::var("ANALYTICS_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => analytics_conninfo(
                &env::var("DB_HOST").context("ANALYTICS_DATABASE_URL or DB_HOST must be set")?,
                &env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string()),
                &env::var("DB_USER").context("DB_USER must be set")?,
                &env::var("DB_PASSWORD").unwrap_or_default(),
                &env::var("DB_NAME").context("DB_NAME must be set")?,
            ),
        };

        let openai_api_key = env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?;
        let openai_base_url =
            env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_OPENAI_BASE_URL.to_string());
        let default_model = env::var("DEFAULT_MODEL")
            .unwrap_or_else(|_| shared::protocol::DEFAULT_MODEL.to_string());

        let defaults = PollPolicy::default();
        let poll_policy = PollPolicy {
            interval: Duration::from_millis(parse_var(
                "POLL_INTERVAL_MS",
                defaults.interval.as_millis() as u64,
            )?),
            max_interval: Duration::from_millis(parse_var(
                "POLL_MAX_INTERVAL_MS",
                defaults.max_interval.as_millis() as u64,
            )?),
            backoff: parse_var("POLL_BACKOFF", defaults.backoff)?,
            max_wait: Duration::from_secs(parse_var(
                "RUN_TIMEOUT_SECS",
                defaults.max_wait.as_secs(),
            )?),
        };

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parse_var("PORT", 5000u16)?;

        Ok(Self {
            database_url,
            analytics_database_url,
            openai_api_key,
            openai_base_url,
            default_model,
            poll_policy,
            host,
            port,
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} is invalid ({:?}): {}", name, raw, e)),
        Err(_) => Ok(default),
    }
}

/// Build a libpq key/value connection string, so credentials need no URL escaping
pub fn analytics_conninfo(host: &str, port: &str, user: &str, password: &str, dbname: &str) -> String {
    format!(
        "host={} port={} user={} password={} dbname={}",
        quote_conninfo(host),
        quote_conninfo(port),
        quote_conninfo(user),
        quote_conninfo(password),
        quote_conninfo(dbname),
    )
}

fn quote_conninfo(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}
