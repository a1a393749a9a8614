//! PostHog feature-flag bucketing.
//!
//! Experiments are multivariate feature flags. The flag value assigned to a
//! user is the name of the template they should get. Only the `/decide`
//! endpoint is used; no events are captured.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use parley_core::experiment::VariantBucketing;
use parley_types::error::BucketingError;

const DECIDE_TIMEOUT: Duration = Duration::from_secs(5);

/// [`VariantBucketing`] backed by a PostHog project.
pub struct PosthogBucketing {
    client: reqwest::Client,
    host: String,
    api_key: SecretString,
}

#[derive(Debug, Deserialize)]
struct DecideResponse {
    #[serde(default, rename = "featureFlags")]
    feature_flags: serde_json::Map<String, serde_json::Value>,
}

impl PosthogBucketing {
    pub fn new(host: &str, api_key: SecretString) -> Result<Self, BucketingError> {
        let client = reqwest::Client::builder()
            .timeout(DECIDE_TIMEOUT)
            .build()
            .map_err(|e| BucketingError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

impl VariantBucketing for PosthogBucketing {
    async fn variant(
        &self,
        user_id: &str,
        experiment: &str,
    ) -> Result<Option<String>, BucketingError> {
        let url = format!("{}/decide/?v=3", self.host);
        let body = serde_json::json!({
            "api_key": self.api_key.expose_secret(),
            "distinct_id": user_id,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| BucketingError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BucketingError::Unavailable(format!("HTTP {status}")));
        }

        let decide: DecideResponse = response
            .json()
            .await
            .map_err(|e| BucketingError::InvalidResponse(e.to_string()))?;

        // Boolean flags carry no variant name.
        Ok(decide
            .feature_flags
            .get(experiment)
            .and_then(|value| value.as_str())
            .map(str::to_string))
    }
}
