//! Bio generator client.
//!
//! Wraps the external text-generation service that produces the one-sentence
//! bio stored on every person record. The service is best-effort: any
//! transport error, non-success status, parse failure, or empty result is
//! absorbed and replaced with a fixed fallback sentence. Callers never see an
//! error from this module.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::PersonCategory;

/// Text used whenever bio generation fails or returns nothing.
pub const FALLBACK_BIO: &str = "A valued member of our community.";

/// Outcome of a single generation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BioOutcome {
    /// The service produced a usable sentence.
    Generated(String),
    /// The service failed or returned empty text; use [`FALLBACK_BIO`].
    Fallback,
}

impl BioOutcome {
    pub fn into_text(self) -> String {
        match self {
            Self::Generated(text) => text,
            Self::Fallback => FALLBACK_BIO.to_string(),
        }
    }
}

/// Source of generated bios. Implemented by [`BioClient`] in production and
/// by in-memory fakes in tests.
pub trait BioGenerator: Send + Sync {
    /// Generate a bio for a person. `label` carries the staff role or the
    /// student's class, when present.
    fn generate(
        &self,
        first_name: &str,
        last_name: &str,
        category: PersonCategory,
        label: Option<&str>,
    ) -> impl std::future::Future<Output = BioOutcome> + Send;
}

/// Client for the bio generation service.
#[derive(Clone)]
pub struct BioClient {
    client: Client,
    base_url: String,
    token: String,
}

impl BioClient {
    /// Create a new bio service client.
    pub fn new(base_url: &str, token: &str, timeout_seconds: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        tracing::info!(base_url = base_url, "bio client initialized");

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Check bio service health.
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);

        self.client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .context("bio service health check failed")?
            .error_for_status()
            .context("bio service unhealthy")?;

        Ok(())
    }
}

impl BioGenerator for BioClient {
    async fn generate(
        &self,
        first_name: &str,
        last_name: &str,
        category: PersonCategory,
        label: Option<&str>,
    ) -> BioOutcome {
        #[derive(Serialize)]
        struct Request<'a> {
            first_name: &'a str,
            last_name: &'a str,
            category: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            label: Option<&'a str>,
        }

        #[derive(Deserialize)]
        struct Response {
            bio: String,
        }

        let url = format!("{}/v1/bio", self.base_url);

        let result = self
            .client
            .post(&url)
            .header("X-Internal-Token", &self.token)
            .json(&Request {
                first_name,
                last_name,
                category: category.as_str(),
                label,
            })
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "bio service request failed, using fallback");
                return BioOutcome::Fallback;
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), "bio service returned an error, using fallback");
            return BioOutcome::Fallback;
        }

        match response.json::<Response>().await {
            Ok(body) if !body.bio.trim().is_empty() => BioOutcome::Generated(body.bio),
            Ok(_) => {
                debug!("bio service returned empty text, using fallback");
                BioOutcome::Fallback
            }
            Err(e) => {
                warn!(error = %e, "failed to parse bio service response, using fallback");
                BioOutcome::Fallback
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_resolves_to_fixed_text() {
        assert_eq!(BioOutcome::Fallback.into_text(), FALLBACK_BIO);
        assert_eq!(
            BioOutcome::Generated("A teacher of rare patience.".to_string()).into_text(),
            "A teacher of rare patience."
        );
    }
}
