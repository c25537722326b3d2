//! The provider trait the orchestrator drives.

use crate::error::ProviderResult;
use crate::types::{
    Instance, IngressRule, LaunchRequest, SecurityGroup, SpotBid, SpotRequest,
};

/// Operations the orchestrator needs from a cloud provider.
///
/// Every call is a point-in-time, best-effort view: the provider's reads
/// can lag its writes, and a state-transition request is only a request.
/// Callers converge by re-reading, never by assuming a write took effect
/// synchronously.
#[allow(async_fn_in_trait)]
pub trait CloudProvider {
    /// Enumerate every instance in the account, tags included.
    async fn list_instances(&self) -> ProviderResult<Vec<Instance>>;

    /// Fetch the named instances.
    async fn describe_instances(&self, ids: &[String]) -> ProviderResult<Vec<Instance>>;

    async fn list_security_groups(&self) -> ProviderResult<Vec<SecurityGroup>>;

    async fn create_security_group(
        &self,
        name: &str,
        description: &str,
    ) -> ProviderResult<SecurityGroup>;

    async fn authorize_ingress(&self, group: &str, rule: &IngressRule) -> ProviderResult<()>;

    async fn revoke_ingress(&self, group: &str, rule: &IngressRule) -> ProviderResult<()>;

    /// Delete a security group. Fails while instances or other groups
    /// still reference it, which can persist for a while after the
    /// referencing objects are gone (eventual consistency).
    async fn delete_security_group(&self, name: &str) -> ProviderResult<()>;

    /// Launch on-demand capacity. Returns the full batch or fails whole.
    async fn run_instances(&self, request: &LaunchRequest) -> ProviderResult<Vec<Instance>>;

    /// Submit a spot bid. Returns one request per unit of capacity.
    async fn request_spot_instances(&self, bid: &SpotBid) -> ProviderResult<Vec<SpotRequest>>;

    /// Enumerate all spot requests in the account.
    async fn list_spot_requests(&self) -> ProviderResult<Vec<SpotRequest>>;

    async fn cancel_spot_requests(&self, ids: &[String]) -> ProviderResult<()>;

    /// Request termination. Fire-and-forget: completion is observed via
    /// later reads, if at all.
    async fn terminate_instances(&self, ids: &[String]) -> ProviderResult<()>;

    async fn stop_instances(&self, ids: &[String]) -> ProviderResult<()>;

    async fn start_instances(&self, ids: &[String]) -> ProviderResult<()>;

    /// Stamp tags onto instances. Freshly launched instances may reject
    /// tag writes for a short window.
    async fn create_tags(&self, ids: &[String], tags: &[(String, String)]) -> ProviderResult<()>;

    /// Names of the availability zones in the connected region.
    async fn list_zones(&self) -> ProviderResult<Vec<String>>;

    /// Verify a machine image exists, returning its id.
    async fn find_image(&self, image_id: &str) -> ProviderResult<String>;
}
