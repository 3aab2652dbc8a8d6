//! The typed façade over the container cluster.
//!
//! Every pod the rest of the system creates or inspects goes through
//! [`ClusterClient`]; no other component touches `kube` directly.

pub mod podspec;

pub mod backends {
    pub mod k8s;

    #[cfg(feature = "test-support")]
    pub mod fake;
}

use async_trait::async_trait;
use jit_core::{error::Result, models::PodInfo, models::PodRequest};

pub use backends::k8s::K8sCluster;
#[cfg(feature = "test-support")]
pub use backends::fake::FakeCluster;

/// The complete vocabulary the rest of the system needs from the cluster.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Lists every pod carrying the managed label, across all tenants.
    async fn list_managed_pods(&self) -> Result<Vec<PodInfo>>;

    /// Creates the pod described by `req`. A 409 (already exists) is
    /// treated as success: pod-name collisions are the de facto job-id
    /// dedup mechanism.
    async fn create_pod(&self, req: PodRequest) -> Result<()>;

    /// Deletes a pod by name. A 404 (already gone) is treated as success.
    async fn delete_pod(&self, name: &str) -> Result<()>;
}
