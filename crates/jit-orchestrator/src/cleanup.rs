//! Periodically reaps pods in a terminal phase. Counters are untouched
//! here; the reconciler owns those.

use jit_cluster::ClusterClient;
use jit_core::error::Result;
use tracing::{event, instrument, Level};

#[instrument(name = "cleanup::tick", skip_all)]
pub async fn tick(cluster: &dyn ClusterClient) -> Result<usize> {
    let pods = cluster.list_managed_pods().await?;
    let terminal: Vec<&str> = pods
        .iter()
        .filter(|pod| pod.phase.is_terminal())
        .map(|pod| pod.name.as_str())
        .collect();
    for name in &terminal {
        cluster.delete_pod(name).await?;
    }
    event!(Level::DEBUG, deleted = terminal.len(), "cleanup tick");
    Ok(terminal.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jit_cluster::FakeCluster;
    use jit_core::models::{PodPhase, PodRequest};

    #[tokio::test]
    async fn deletes_only_terminal_pods() {
        let cluster = FakeCluster::new();
        cluster
            .create_pod(PodRequest {
                runner_name: "jit-runner-1".into(),
                tenant: "acme".into(),
                job_id: 1,
                encoded_jit_config: "x".into(),
                labels: vec![],
            })
            .await
            .unwrap();
        cluster
            .create_pod(PodRequest {
                runner_name: "jit-runner-2".into(),
                tenant: "acme".into(),
                job_id: 2,
                encoded_jit_config: "x".into(),
                labels: vec![],
            })
            .await
            .unwrap();
        cluster.set_phase("jit-runner-1", PodPhase::Succeeded);
        cluster.set_phase("jit-runner-2", PodPhase::Running);

        let deleted = tick(&cluster).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(!cluster.contains("jit-runner-1"));
        assert!(cluster.contains("jit-runner-2"));
    }
}
