//! A/B variant resolution.
//!
//! An experiment maps a user to a variant name, which is the name of the
//! prompt template that user should get. Bucketing is best effort: any
//! failure or missing assignment yields the caller's default template.

use std::sync::Arc;

use parley_types::error::BucketingError;

/// External experiment bucketing service.
///
/// Implementations live in parley-infra (e.g., `PosthogBucketing`).
pub trait VariantBucketing: Send + Sync {
    /// Variant assigned to `user_id` in `experiment`, if any.
    fn variant(
        &self,
        user_id: &str,
        experiment: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>, BucketingError>> + Send;
}

/// Bucketing that never assigns a variant.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBucketing;

impl VariantBucketing for NoBucketing {
    async fn variant(
        &self,
        _user_id: &str,
        _experiment: &str,
    ) -> Result<Option<String>, BucketingError> {
        Ok(None)
    }
}

/// Soft-failing wrapper over a [`VariantBucketing`] service.
#[derive(Debug)]
pub struct VariantResolver<B> {
    bucketing: Arc<B>,
}

impl<B> Clone for VariantResolver<B> {
    fn clone(&self) -> Self {
        Self {
            bucketing: Arc::clone(&self.bucketing),
        }
    }
}

impl<B: VariantBucketing> VariantResolver<B> {
    pub fn new(bucketing: Arc<B>) -> Self {
        Self { bucketing }
    }

    /// Template name for `user_id`, or `default` when there is no usable assignment.
    pub async fn resolve(&self, user_id: &str, experiment: Option<&str>, default: &str) -> String {
        let Some(experiment) = experiment.filter(|e| !e.is_empty()) else {
            return default.to_string();
        };

        match self.bucketing.variant(user_id, experiment).await {
            Ok(Some(variant)) if !variant.is_empty() => {
                tracing::debug!(user_id, experiment, variant = %variant, "resolved experiment variant");
                variant
            }
            Ok(_) => {
                tracing::debug!(user_id, experiment, "no variant assigned, using default template");
                default.to_string()
            }
            Err(e) => {
                tracing::warn!(user_id, experiment, error = %e, "variant lookup failed, using default template");
                default.to_string()
            }
        }
    }
}
