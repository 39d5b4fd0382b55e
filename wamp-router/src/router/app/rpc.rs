use anyhow::Result;
use async_trait::async_trait;

use crate::{
    core::uri::Uri,
    router::app::SessionContext,
};

/// Router-level policies for incoming RPC requests.
#[async_trait]
pub trait RpcPolicies: Send + Sync {
    /// Validates that a registration is allowed.
    async fn validate_registration(&self, context: SessionContext<'_>, procedure: &Uri)
    -> Result<()>;

    /// Validates that a call is allowed.
    async fn validate_call(&self, context: SessionContext<'_>, procedure: &Uri) -> Result<()>;
}

/// Default implementation of [`RpcPolicies`] with empty policies.
#[derive(Debug, Default)]
pub struct EmptyRpcPolicies;

#[async_trait]
impl RpcPolicies for EmptyRpcPolicies {
    async fn validate_registration(&self, _: SessionContext<'_>, _: &Uri) -> Result<()> {
        Ok(())
    }

    async fn validate_call(&self, _: SessionContext<'_>, _: &Uri) -> Result<()> {
        Ok(())
    }
}
