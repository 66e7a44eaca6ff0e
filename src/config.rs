use anyhow::{Context, Result};
use std::env;
use url::Url;

use crate::services::DanglingRefPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
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

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // CORS
    pub cors_allow_origins: Vec<String>,

    // Bio generator service
    pub bio_service_url: String,
    pub bio_service_token: String,
    pub bio_service_timeout_seconds: u64,

    // Roster lookup service
    pub roster_service_url: String,
    pub roster_service_token: String,
    pub roster_service_timeout_seconds: u64,

    // Batch import behavior
    pub dangling_guardian_refs: DanglingRefPolicy,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let env = Environment::from_str(&env::var("ENV").unwrap_or_else(|_| "dev".to_string()));
        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        // Database
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        // CORS
        let cors_allow_origins = env::var("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        // Bio generator service
        let bio_service_url =
            env::var("BIO_SERVICE_URL").unwrap_or_else(|_| "http://bio-service:8000".to_string());
        Url::parse(&bio_service_url).context("BIO_SERVICE_URL must be a valid URL")?;
        let bio_service_token =
            env::var("BIO_SERVICE_TOKEN").context("BIO_SERVICE_TOKEN must be set")?;
        let bio_service_timeout_seconds = env::var("BIO_SERVICE_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(20);

        // Roster lookup service
        let roster_service_url = env::var("ROSTER_SERVICE_URL")
            .unwrap_or_else(|_| "http://roster-service:8100".to_string());
        Url::parse(&roster_service_url).context("ROSTER_SERVICE_URL must be a valid URL")?;
        let roster_service_token =
            env::var("ROSTER_SERVICE_TOKEN").context("ROSTER_SERVICE_TOKEN must be set")?;
        let roster_service_timeout_seconds = env::var("ROSTER_SERVICE_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(20);

        // Batch import behavior
        let dangling_guardian_refs = DanglingRefPolicy::from_str(
            &env::var("DANGLING_GUARDIAN_REFS").unwrap_or_else(|_| "drop".to_string()),
        );

        Ok(Settings {
            env,
            server_addr,
            database_url,
            database_max_connections,
            cors_allow_origins,
            bio_service_url,
            bio_service_token,
            bio_service_timeout_seconds,
            roster_service_url,
            roster_service_token,
            roster_service_timeout_seconds,
            dangling_guardian_refs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parses_known_names() {
        assert_eq!(Environment::from_str("prod"), Environment::Prod);
        assert_eq!(Environment::from_str("PRODUCTION"), Environment::Prod);
        assert_eq!(Environment::from_str("staging"), Environment::Staging);
        assert_eq!(Environment::from_str("dev"), Environment::Dev);
    }

    #[test]
    fn environment_defaults_to_dev() {
        assert_eq!(Environment::from_str("anything-else"), Environment::Dev);
        assert!(Environment::from_str("").is_dev());
        assert!(!Environment::from_str("").is_prod());
    }
}
