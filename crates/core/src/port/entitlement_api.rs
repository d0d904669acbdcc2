// Entitlement Internal API Port (Interface)

use crate::domain::{BundleId, Entitlement, EntitlementId, InternalCallContext, PluginProperty};
use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Entitlement lookup and bundle-level operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EntitlementInternalApi: Send + Sync {
    /// Load an entitlement with its bundle's add-ons
    async fn get_entitlement_for_id(
        &self,
        entitlement_id: EntitlementId,
        context: &InternalCallContext,
    ) -> Result<Entitlement>;

    /// Pause the bundle as of the given local date
    async fn pause(
        &self,
        bundle_id: BundleId,
        local_effective_date: NaiveDate,
        properties: &[PluginProperty],
        context: &InternalCallContext,
    ) -> Result<()>;

    /// Resume the bundle as of the given local date
    async fn resume(
        &self,
        bundle_id: BundleId,
        local_effective_date: NaiveDate,
        properties: &[PluginProperty],
        context: &InternalCallContext,
    ) -> Result<()>;
}
