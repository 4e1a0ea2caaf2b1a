use std::{fmt::Display, str::FromStr};

use anyhow::{anyhow, Context};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" => Ok(Environment::Development),
            other => Err(anyhow!("unknown environment {other:?}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub network_name: String,
    /// `None` until a contract is deployed and configured.
    pub contract_address: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub environment: Environment,
    pub session_ttl_hours: i64,
    pub admin_emails: Vec<String>,
    pub chain: ChainConfig,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let admin_emails = var("ADMIN_EMAILS")
            .map(|list| {
                list.split(',')
                    .map(|email| email.trim().to_lowercase())
                    .filter(|email| !email.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url: try_load("DATABASE_URL", "sqlite://votechain.db?mode=rwc")?,
            bind_addr: try_load("BIND_ADDR", "0.0.0.0:8080")?,
            environment: try_load("ENVIRONMENT", "production")?,
            session_ttl_hours: try_load("SESSION_TTL_HOURS", "168")?,
            admin_emails,
            chain: ChainConfig {
                rpc_url: try_load("CHAIN_RPC_URL", "http://127.0.0.1:7545")?,
                chain_id: try_load("CHAIN_ID", "1337")?,
                network_name: try_load("CHAIN_NETWORK_NAME", "Ganache Local")?,
                contract_address: var("CONTRACT_ADDRESS").filter(|addr| !addr.trim().is_empty()),
            },
        })
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails.iter().any(|admin| admin.eq_ignore_ascii_case(email))
    }

    /// Config for tests and local tooling; never reads the environment.
    pub fn development() -> Self {
        Self {
            database_url: "sqlite::memory:".to_owned(),
            bind_addr: "127.0.0.1:0".to_owned(),
            environment: Environment::Development,
            session_ttl_hours: 1,
            admin_emails: Vec::new(),
            chain: ChainConfig {
                rpc_url: "http://127.0.0.1:7545".to_owned(),
                chain_id: 1337,
                network_name: "Ganache Local".to_owned(),
                contract_address: None,
            },
        }
    }
}

fn var(key: &str) -> Option<String> {
    dotenv::var(key).ok()
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_owned()
    });

    raw.parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
            anyhow!("{e}")
        })
        .with_context(|| format!("environment variable {key} is misconfigured"))
}
