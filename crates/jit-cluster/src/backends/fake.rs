//! An in-memory [`ClusterClient`] used by the orchestrator crate's own
//! unit and scenario tests.

use std::collections::HashMap;
use std::sync::Mutex;

use jit_core::error::Result;
use jit_core::models::{PodInfo, PodPhase, PodRequest};

use crate::ClusterClient;

#[derive(Debug, Default)]
pub struct FakeCluster {
    pods: Mutex<HashMap<String, PodInfo>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        FakeCluster::default()
    }

    /// Test helper: forces a pod's observed phase, simulating the
    /// cluster progressing a pod toward completion.
    pub fn set_phase(&self, name: &str, phase: PodPhase) {
        if let Some(pod) = self.pods.lock().unwrap().get_mut(name) {
            pod.phase = phase;
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pods.lock().unwrap().contains_key(name)
    }
}

#[async_trait::async_trait]
impl ClusterClient for FakeCluster {
    async fn list_managed_pods(&self) -> Result<Vec<PodInfo>> {
        Ok(self.pods.lock().unwrap().values().cloned().collect())
    }

    async fn create_pod(&self, req: PodRequest) -> Result<()> {
        let mut pods = self.pods.lock().unwrap();
        pods.entry(req.runner_name.clone()).or_insert(PodInfo {
            name: req.runner_name,
            tenant: req.tenant,
            phase: PodPhase::Pending,
        });
        Ok(())
    }

    async fn delete_pod(&self, name: &str) -> Result<()> {
        self.pods.lock().unwrap().remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_is_idempotent_on_collision() {
        let cluster = FakeCluster::new();
        let req = PodRequest {
            runner_name: "jit-runner-1".into(),
            tenant: "acme".into(),
            job_id: 1,
            encoded_jit_config: "x".into(),
            labels: vec![],
        };
        cluster.create_pod(req.clone()).await.unwrap();
        cluster.create_pod(req).await.unwrap();
        assert_eq!(cluster.list_managed_pods().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_missing_pod_is_ok() {
        let cluster = FakeCluster::new();
        cluster.delete_pod("does-not-exist").await.unwrap();
    }
}
