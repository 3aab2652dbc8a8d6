//! The batch dispatcher: runs reconciliation inline first, then selects
//! a globally-FIFO-ordered batch of pending jobs under per-tenant and
//! global caps.

use std::collections::HashMap;

use jit_cluster::ClusterClient;
use jit_core::conf::Dispatch as DispatchConf;
use jit_core::error::Result;
use jit_core::models::{PendingJob, Tenant};
use jit_store::StateStore;
use tracing::{event, instrument, Level};

use crate::reconciler;

/// What a dispatcher tick decided.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    SkippedTotalLimit,
    NoAvailableSlots,
    Selected(Vec<PendingJob>),
}

/// Runs one dispatcher tick: reconcile, then peek-select-remove.
///
/// Returns the jobs chosen for dispatch; the caller (the daemon binary,
/// or a test) is responsible for handing each to the Dispatch Worker.
#[instrument(name = "dispatcher::tick", skip_all)]
pub async fn tick(
    store: &dyn StateStore,
    cluster: &dyn ClusterClient,
    conf: &DispatchConf,
) -> Result<TickOutcome> {
    reconciler::tick(store, cluster).await?;

    let global_running = store.get_global().await?;
    if global_running >= conf.max_total {
        event!(Level::DEBUG, global_running, max_total = conf.max_total, "skipped:total_limit");
        return Ok(TickOutcome::SkippedTotalLimit);
    }
    let available_slots =
        std::cmp::min(conf.max_total - global_running, conf.max_batch_size as i64) as usize;

    let pending = store.peek_all_pending().await?;

    let mut selected: Vec<PendingJob> = Vec::new();
    let mut running_snapshot: HashMap<Tenant, i64> = HashMap::new();
    let mut cap_snapshot: HashMap<Tenant, i64> = HashMap::new();
    let mut reserved: HashMap<Tenant, i64> = HashMap::new();

    for (tenant, _, job) in pending {
        if selected.len() == available_slots {
            break;
        }
        if !running_snapshot.contains_key(&tenant) {
            let running = store.get_running(&tenant).await?;
            let cap = store.effective_cap(&tenant, conf.max_per_tenant).await?;
            running_snapshot.insert(tenant.clone(), running);
            cap_snapshot.insert(tenant.clone(), cap);
        }
        let running = running_snapshot[&tenant];
        let cap = cap_snapshot[&tenant];
        let already_reserved = *reserved.get(&tenant).unwrap_or(&0);
        if running + already_reserved >= cap {
            continue;
        }
        *reserved.entry(tenant).or_insert(0) += 1;
        selected.push(job);
    }

    if selected.is_empty() {
        event!(Level::DEBUG, "no_available_slots");
        return Ok(TickOutcome::NoAvailableSlots);
    }

    let removed = store.remove_pending(&selected).await?;
    event!(Level::INFO, selected = selected.len(), removed, "dispatcher tick selected batch");
    Ok(TickOutcome::Selected(selected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jit_cluster::FakeCluster;
    use jit_store::FakeStore;

    fn conf() -> DispatchConf {
        DispatchConf {
            max_total: 200,
            max_per_tenant: 10,
            max_batch_size: 10,
            dispatcher_period_secs: 5,
            reconciler_period_secs: 60,
            cleanup_period_secs: 60,
            worker_max_attempts: 3,
            worker_backoff_secs: 30,
        }
    }

    fn job(id: i64, tenant: &str) -> PendingJob {
        PendingJob::new(id, id, "build", "acme/widgets", tenant, vec!["self-hosted".into()])
    }

    // Fresh store, 3 jobs for tenant A dispatch in order.
    #[tokio::test]
    async fn selects_all_three_in_order() {
        let store = FakeStore::new();
        let cluster = FakeCluster::new();
        store.enqueue_at(job(1, "A"), 100.0);
        store.enqueue_at(job(2, "A"), 101.0);
        store.enqueue_at(job(3, "A"), 102.0);

        let outcome = tick(&store, &cluster, &conf()).await.unwrap();
        let TickOutcome::Selected(jobs) = outcome else { panic!("expected a selection") };
        assert_eq!(jobs.iter().map(|j| j.job_id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(store.peek_all_pending().await.unwrap().is_empty());
    }

    // max_batch_size=2, 5 jobs for tenant A, two ticks drain in pairs.
    #[tokio::test]
    async fn batches_by_max_batch_size() {
        let store = FakeStore::new();
        let cluster = FakeCluster::new();
        for id in 1..=5 {
            store.enqueue_at(job(id, "A"), 100.0 + id as f64);
        }
        let mut c = conf();
        c.max_batch_size = 2;

        let outcome = tick(&store, &cluster, &c).await.unwrap();
        let TickOutcome::Selected(first) = outcome else { panic!("expected a selection") };
        assert_eq!(first.iter().map(|j| j.job_id).collect::<Vec<_>>(), vec![1, 2]);

        let remaining: Vec<i64> =
            store.peek_all_pending().await.unwrap().into_iter().map(|(_, _, j)| j.job_id).collect();
        assert_eq!(remaining, vec![3, 4, 5]);

        let outcome = tick(&store, &cluster, &c).await.unwrap();
        let TickOutcome::Selected(second) = outcome else { panic!("expected a selection") };
        assert_eq!(second.iter().map(|j| j.job_id).collect::<Vec<_>>(), vec![3, 4]);
    }

    // Per-tenant cap override skips but doesn't stop the walk.
    #[tokio::test]
    async fn cap_override_skips_without_stopping() {
        let store = FakeStore::new();
        let cluster = FakeCluster::new();
        store.set_cap("A", 2).await.unwrap();
        for id in 1..=5 {
            store.enqueue_at(job(id, "A"), id as f64);
        }
        store.enqueue_at(job(100, "B"), 100.0);

        let outcome = tick(&store, &cluster, &conf()).await.unwrap();
        let TickOutcome::Selected(jobs) = outcome else { panic!("expected a selection") };
        assert_eq!(jobs.iter().map(|j| j.job_id).collect::<Vec<_>>(), vec![1, 2, 100]);
    }

    async fn fill_other_tenant_pods(cluster: &FakeCluster, count: i64) {
        for id in 0..count {
            cluster
                .create_pod(jit_core::models::PodRequest {
                    runner_name: format!("jit-runner-filler-{id}"),
                    tenant: "filler".into(),
                    job_id: id,
                    encoded_jit_config: "x".into(),
                    labels: vec![],
                })
                .await
                .unwrap();
            cluster.set_phase(&format!("jit-runner-filler-{id}"), jit_core::models::PodPhase::Running);
        }
    }

    // global_running = max_total - 1 leaves exactly one slot. Reconciliation
    // runs inline first, so the 199 running pods (not the jobs selected for
    // tenant A) are what drive GlobalRunning.
    #[tokio::test]
    async fn global_limit_leaves_one_slot() {
        let store = FakeStore::new();
        let cluster = FakeCluster::new();
        fill_other_tenant_pods(&cluster, 199).await;
        for id in 1..=5 {
            store.enqueue_at(job(id, "A"), id as f64);
        }
        let outcome = tick(&store, &cluster, &conf()).await.unwrap();
        let TickOutcome::Selected(jobs) = outcome else { panic!("expected a selection") };
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_id, 1);
    }

    #[tokio::test]
    async fn skips_tick_when_at_total_limit() {
        let store = FakeStore::new();
        let cluster = FakeCluster::new();
        fill_other_tenant_pods(&cluster, 200).await;
        store.enqueue_at(job(1, "A"), 1.0);
        let outcome = tick(&store, &cluster, &conf()).await.unwrap();
        assert_eq!(outcome, TickOutcome::SkippedTotalLimit);
    }

    #[tokio::test]
    async fn no_available_slots_when_queue_is_all_over_cap() {
        let store = FakeStore::new();
        let cluster = FakeCluster::new();
        store.set_cap("A", 0).await.unwrap();
        store.enqueue_at(job(1, "A"), 1.0);
        let outcome = tick(&store, &cluster, &conf()).await.unwrap();
        assert_eq!(outcome, TickOutcome::NoAvailableSlots);
    }
}
