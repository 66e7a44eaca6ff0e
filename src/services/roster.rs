//! Roster lookup client.
//!
//! Wraps the external roster/spreadsheet service that maps a person's name to
//! their institutional identifier. A clean miss and a degraded service are
//! distinct outcomes so callers can log them differently, but both resolve to
//! the same fallback: a synthesized token.

use anyhow::{Context, Result};
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Prefix of synthesized roster tokens.
pub const SYNTHESIZED_ID_PREFIX: &str = "TMP-";

/// Builds a stand-in roster id: fixed prefix plus five random digits.
/// Used for every non-student and for students the roster does not know.
pub fn synthesize_roster_id() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..100_000);
    format!("{SYNTHESIZED_ID_PREFIX}{n:05}")
}

/// Outcome of a single roster lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterOutcome {
    /// The roster knows this person.
    Found(String),
    /// The roster answered and does not know this person.
    NotFound,
    /// The roster could not be reached or answered unusably.
    Degraded,
}

/// Source of roster identifiers. Implemented by [`RosterClient`] in
/// production and by in-memory fakes in tests.
pub trait RosterLookup: Send + Sync {
    fn lookup(
        &self,
        first_name: &str,
        last_name: &str,
    ) -> impl std::future::Future<Output = RosterOutcome> + Send;
}

/// Client for the roster lookup service.
#[derive(Clone)]
pub struct RosterClient {
    client: Client,
    base_url: String,
    token: String,
}

impl RosterClient {
    /// Create a new roster service client.
    pub fn new(base_url: &str, token: &str, timeout_seconds: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        tracing::info!(base_url = base_url, "roster client initialized");

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Check roster service health.
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);

        self.client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .context("roster service health check failed")?
            .error_for_status()
            .context("roster service unhealthy")?;

        Ok(())
    }
}

impl RosterLookup for RosterClient {
    async fn lookup(&self, first_name: &str, last_name: &str) -> RosterOutcome {
        #[derive(Deserialize)]
        struct Response {
            external_id: String,
        }

        let url = format!("{}/v1/roster", self.base_url);

        let result = self
            .client
            .get(&url)
            .header("X-Internal-Token", &self.token)
            .query(&[("first_name", first_name), ("last_name", last_name)])
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "roster lookup failed");
                return RosterOutcome::Degraded;
            }
        };

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!(first_name, last_name, "roster has no entry");
                RosterOutcome::NotFound
            }
            status if status.is_success() => match response.json::<Response>().await {
                Ok(body) if !body.external_id.trim().is_empty() => {
                    RosterOutcome::Found(body.external_id)
                }
                Ok(_) => {
                    debug!(first_name, last_name, "roster returned an empty id");
                    RosterOutcome::NotFound
                }
                Err(e) => {
                    warn!(error = %e, "failed to parse roster response");
                    RosterOutcome::Degraded
                }
            },
            status => {
                warn!(status = %status, "roster service returned an error");
                RosterOutcome::Degraded
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_id_has_prefix_and_five_digits() {
        for _ in 0..50 {
            let id = synthesize_roster_id();
            let digits = id.strip_prefix(SYNTHESIZED_ID_PREFIX).unwrap();
            assert_eq!(digits.len(), 5, "unexpected token {id}");
            assert!(digits.chars().all(|c| c.is_ascii_digit()), "token {id}");
        }
    }
}
