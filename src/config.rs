use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

use crate::services::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }

    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub server_addr: String,

    // Database (in-memory store when unset)
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // CORS
    pub cors_allow_origins: Vec<String>,

    // Bearer tokens
    pub jwt_secret: String,
    pub jwt_issuer: Option<String>,
    pub jwt_audience: String,

    // Store reads
    pub store_retry_max_attempts: u32,
    pub store_retry_delay_ms: u64,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let env = Environment::parse(&env::var("ENV").unwrap_or_else(|_| "dev".to_string()));
        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        // Database
        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());
        let database_max_connections = parse_var("DATABASE_MAX_CONNECTIONS").unwrap_or(10);

        // CORS
        let cors_allow_origins = env::var("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        // Bearer tokens
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let jwt_issuer = env::var("JWT_ISSUER").ok().filter(|s| !s.is_empty());
        let jwt_audience =
            env::var("JWT_AUDIENCE").unwrap_or_else(|_| "authenticated".to_string());

        // Store reads
        let store_retry_max_attempts = parse_var("STORE_RETRY_MAX_ATTEMPTS").unwrap_or(3);
        let store_retry_delay_ms = parse_var("STORE_RETRY_DELAY_MS").unwrap_or(1000);

        Ok(Settings {
            env,
            server_addr,
            database_url,
            database_max_connections,
            cors_allow_origins,
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            store_retry_max_attempts,
            store_retry_delay_ms,
        })
    }

    /// Dev settings with an in-memory store.
    pub fn local(jwt_secret: impl Into<String>) -> Self {
        Settings {
            env: Environment::Dev,
            server_addr: "127.0.0.1:8080".to_string(),
            database_url: None,
            database_max_connections: 10,
            cors_allow_origins: vec!["http://localhost:3000".to_string()],
            jwt_secret: jwt_secret.into(),
            jwt_issuer: None,
            jwt_audience: "authenticated".to_string(),
            store_retry_max_attempts: 3,
            store_retry_delay_ms: 1000,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.store_retry_max_attempts,
            Duration::from_millis(self.store_retry_delay_ms),
        )
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.parse().ok())
}
