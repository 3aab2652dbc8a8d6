//! A dry-run cluster client that logs what it would do instead of
//! touching the real cluster.

use jit_cluster::ClusterClient;
use jit_core::error::Result;
use jit_core::models::{PodInfo, PodRequest};
use tracing::{event, Level};

#[derive(Debug, Default)]
pub struct DryRunCluster;

#[async_trait::async_trait]
impl ClusterClient for DryRunCluster {
    async fn list_managed_pods(&self) -> Result<Vec<PodInfo>> {
        Ok(Vec::new())
    }

    async fn create_pod(&self, req: PodRequest) -> Result<()> {
        event!(Level::INFO, runner_name = %req.runner_name, tenant = %req.tenant, "dry-run: would create pod");
        Ok(())
    }

    async fn delete_pod(&self, name: &str) -> Result<()> {
        event!(Level::INFO, pod = name, "dry-run: would delete pod");
        Ok(())
    }
}
