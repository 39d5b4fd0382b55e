use anyhow::Result;
use async_trait::async_trait;

use crate::{
    core::uri::{
        Uri,
        WildcardUri,
    },
    router::app::SessionContext,
};

/// Router-level policies for incoming pub/sub requests.
#[async_trait]
pub trait PubSubPolicies: Send + Sync {
    /// Validates that a subscription is allowed.
    async fn validate_subscription(
        &self,
        context: SessionContext<'_>,
        topic: &WildcardUri,
    ) -> Result<()>;

    /// Validates that a publication is allowed.
    async fn validate_publication(&self, context: SessionContext<'_>, topic: &Uri) -> Result<()>;
}

/// Default implementation of [`PubSubPolicies`] with empty policies.
#[derive(Debug, Default)]
pub struct EmptyPubSubPolicies;

#[async_trait]
impl PubSubPolicies for EmptyPubSubPolicies {
    async fn validate_subscription(&self, _: SessionContext<'_>, _: &WildcardUri) -> Result<()> {
        Ok(())
    }

    async fn validate_publication(&self, _: SessionContext<'_>, _: &Uri) -> Result<()> {
        Ok(())
    }
}
