//! Periodic reconciliation: the observed pod set is the source of
//! truth; counters are rewritten from it every tick.

use std::collections::{HashMap, HashSet};

use jit_cluster::ClusterClient;
use jit_core::error::Result;
use jit_core::models::Tenant;
use jit_store::StateStore;
use tracing::{event, instrument, Level};

/// Runs one reconciliation tick against `store` and `cluster`.
#[instrument(name = "reconciler::tick", skip_all)]
pub async fn tick(store: &dyn StateStore, cluster: &dyn ClusterClient) -> Result<()> {
    let pods = cluster.list_managed_pods().await?;

    let mut per_tenant: HashMap<Tenant, i64> = HashMap::new();
    let mut active_set: HashSet<String> = HashSet::new();
    for pod in &pods {
        if pod.phase.is_active() {
            active_set.insert(pod.name.clone());
            *per_tenant.entry(pod.tenant.clone()).or_insert(0) += 1;
        }
    }
    let total_active = active_set.len() as i64;

    let current_global = store.get_global().await?;
    if current_global != total_active {
        store.set_global(total_active).await?;
    }

    let runners = store.get_all_runners().await?;
    let mut tenants: HashSet<Tenant> = per_tenant.keys().cloned().collect();
    tenants.extend(runners.values().map(|r| r.tenant.clone()));
    for tenant in &tenants {
        let count = per_tenant.get(tenant).copied().unwrap_or(0);
        store.set_running(tenant, count).await?;
    }

    let mut orphans_removed = 0;
    for (runner_name, _) in runners {
        if !active_set.contains(&runner_name) {
            store.delete_runner(&runner_name).await?;
            orphans_removed += 1;
        }
    }

    event!(
        Level::DEBUG,
        total_active,
        tenants = tenants.len(),
        orphans_removed,
        "reconciled"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jit_cluster::FakeCluster;
    use jit_core::models::{PodPhase, PodRequest, RunnerRecord};
    use jit_store::FakeStore;
    use std::time::Duration;

    #[tokio::test]
    async fn rewrites_counters_and_drops_orphans() {
        let store = FakeStore::new();
        let cluster = FakeCluster::new();

        cluster
            .create_pod(PodRequest {
                runner_name: "jit-runner-7".into(),
                tenant: "acme".into(),
                job_id: 7,
                encoded_jit_config: "x".into(),
                labels: vec![],
            })
            .await
            .unwrap();
        cluster
            .create_pod(PodRequest {
                runner_name: "jit-runner-8".into(),
                tenant: "contoso".into(),
                job_id: 8,
                encoded_jit_config: "x".into(),
                labels: vec![],
            })
            .await
            .unwrap();
        cluster.set_phase("jit-runner-7", PodPhase::Running);
        cluster.set_phase("jit-runner-8", PodPhase::Running);

        store.set_running_sync("acme", 5);
        store.set_global(5).await.unwrap();
        store
            .save_runner(
                RunnerRecord {
                    runner_name: "jit-runner-99".into(),
                    tenant: "acme".into(),
                    job_id: 99,
                    run_id: 99,
                    repo_full_name: "acme/widgets".into(),
                },
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        tick(&store, &cluster).await.unwrap();

        assert_eq!(store.get_running("acme").await.unwrap(), 1);
        assert_eq!(store.get_running("contoso").await.unwrap(), 1);
        assert_eq!(store.get_global().await.unwrap(), 2);
        assert!(!store.get_all_runners().await.unwrap().contains_key("jit-runner-99"));
    }

    #[tokio::test]
    async fn tick_is_idempotent() {
        let store = FakeStore::new();
        let cluster = FakeCluster::new();
        tick(&store, &cluster).await.unwrap();
        tick(&store, &cluster).await.unwrap();
        assert_eq!(store.get_global().await.unwrap(), 0);
    }
}
