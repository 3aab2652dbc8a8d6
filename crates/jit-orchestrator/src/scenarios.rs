//! Cross-component scenario tests. Dispatcher-only selection scenarios
//! live alongside the dispatcher's own unit tests; the scenarios here
//! need the reconciler and worker as well.

use std::time::Duration;

use jit_cluster::{ClusterClient, FakeCluster};
use jit_core::conf::Dispatch as DispatchConf;
use jit_core::models::{PendingJob, PodPhase, PodRequest, RunnerRecord};
use jit_sourcecontrol::FakeSourceControl;
use jit_store::{FakeStore, StateStore};

use crate::{dispatcher, reconciler, worker};

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

// Reconciler rewrites per-tenant and global counters from observed
// pods, dropping an orphan RunnerRecord that no longer has a live pod.
#[tokio::test]
async fn reconciler_rewrites_counters_and_drops_orphan() {
    let store = FakeStore::new();
    let cluster = FakeCluster::new();

    cluster
        .create_pod(PodRequest {
            runner_name: "jit-runner-7".into(),
            tenant: "A".into(),
            job_id: 7,
            encoded_jit_config: "x".into(),
            labels: vec![],
        })
        .await
        .unwrap();
    cluster
        .create_pod(PodRequest {
            runner_name: "jit-runner-8".into(),
            tenant: "B".into(),
            job_id: 8,
            encoded_jit_config: "x".into(),
            labels: vec![],
        })
        .await
        .unwrap();
    cluster.set_phase("jit-runner-7", PodPhase::Running);
    cluster.set_phase("jit-runner-8", PodPhase::Running);

    store.set_running_sync("A", 5);
    store.set_running_sync("B", 0);
    store.set_global(5).await.unwrap();
    store
        .save_runner(
            RunnerRecord {
                runner_name: "jit-runner-99".into(),
                tenant: "A".into(),
                job_id: 99,
                run_id: 99,
                repo_full_name: "acme/widgets".into(),
            },
            Duration::from_secs(60),
        )
        .await
        .unwrap();

    reconciler::tick(&store, &cluster).await.unwrap();

    assert_eq!(store.get_running("A").await.unwrap(), 1);
    assert_eq!(store.get_running("B").await.unwrap(), 1);
    assert_eq!(store.get_global().await.unwrap(), 2);
    assert!(!store.get_all_runners().await.unwrap().contains_key("jit-runner-99"));
}

// Two dispatcher ticks racing over the same selection. Only the
// first `remove_pending` actually removes anything; the second worker's
// pod-creation then hits the pod-name collision and is treated as a
// success, so the tenant ends with exactly one running pod per job.
#[tokio::test]
async fn concurrent_dispatch_is_idempotent_by_job_id() {
    let store = FakeStore::new();
    let cluster = FakeCluster::new();
    let source_control = FakeSourceControl::new();

    store.enqueue_at(PendingJob::new(1, 1, "build", "acme/widgets", "A", vec![]), 1.0);
    store.enqueue_at(PendingJob::new(2, 2, "test", "acme/widgets", "A", vec![]), 2.0);

    let first_tick = dispatcher::tick(&store, &cluster, &conf()).await.unwrap();
    let dispatcher::TickOutcome::Selected(first_selection) = first_tick else {
        panic!("expected a selection")
    };
    assert_eq!(first_selection.len(), 2);

    // A second dispatcher's peek already observed the same jobs before
    // the first dispatcher's remove committed; its own remove now finds
    // nothing left to dequeue.
    let removed_by_second = store.remove_pending(&first_selection).await.unwrap();
    assert_eq!(removed_by_second, 0);

    for job in first_selection.clone() {
        let outcome = worker::dispatch(
            &store,
            &cluster,
            &source_control,
            Duration::from_secs(60),
            3,
            Duration::from_millis(1),
            job,
        )
        .await;
        assert_eq!(outcome, worker::Outcome::Done);
    }
    // The "second" worker retries dispatch for the same two jobs and
    // collides on pod name, which the cluster treats as success.
    for job in first_selection {
        let outcome = worker::dispatch(
            &store,
            &cluster,
            &source_control,
            Duration::from_secs(60),
            3,
            Duration::from_millis(1),
            job,
        )
        .await;
        assert_eq!(outcome, worker::Outcome::Done);
    }

    assert_eq!(cluster.list_managed_pods().await.unwrap().len(), 2);
}
