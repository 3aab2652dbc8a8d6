//! The dispatch worker: per-job state machine that turns a selected
//! [`PendingJob`] into a running pod, with bounded retries on transient
//! failures.

use std::time::Duration;

use jit_cluster::ClusterClient;
use jit_core::error::Error;
use jit_core::models::{PendingJob, PodRequest, RunnerRecord};
use jit_core::Result;
use jit_sourcecontrol::SourceControl;
use jit_store::StateStore;
use tracing::{event, instrument, Level};

/// Final result of one dispatch attempt sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Giveup(String),
}

/// Drives one job through `issue_credential -> create_pod ->
/// update_counters -> save_record`, retrying transient failures up to
/// `max_attempts` times with a fixed backoff.
#[instrument(name = "worker::dispatch", skip_all, fields(job_id = job.job_id, tenant = %job.tenant))]
pub async fn dispatch(
    store: &dyn StateStore,
    cluster: &dyn ClusterClient,
    source_control: &dyn SourceControl,
    runner_ttl: Duration,
    max_attempts: u32,
    backoff: Duration,
    job: PendingJob,
) -> Outcome {
    let runner_name = RunnerRecord::name_for(job.job_id);

    let jit_config = match retry(max_attempts, backoff, || {
        source_control.generate_jit_config(&job.tenant, &runner_name, &job.labels)
    })
    .await
    {
        Ok(config) => config,
        Err(err) => {
            event!(Level::WARN, job_id = job.job_id, error = %err, "giving up: credential issuance failed");
            return Outcome::Giveup(err.to_string());
        }
    };

    let pod_request = PodRequest {
        runner_name: runner_name.clone(),
        tenant: job.tenant.clone(),
        job_id: job.job_id,
        encoded_jit_config: jit_config.encoded_jit_config,
        labels: job.labels.clone(),
    };
    if let Err(err) = retry(max_attempts, backoff, || cluster.create_pod(pod_request.clone())).await {
        event!(Level::WARN, job_id = job.job_id, error = %err, "giving up: pod creation failed");
        return Outcome::Giveup(err.to_string());
    }

    // Optimistic; Reconciler rewrites on its own tick if these drift.
    if let Err(err) = store.incr_running(&job.tenant).await {
        event!(Level::WARN, job_id = job.job_id, error = %err, "counter increment failed, reconciler will correct");
    }
    if let Err(err) = store.incr_global().await {
        event!(Level::WARN, job_id = job.job_id, error = %err, "counter increment failed, reconciler will correct");
    }

    let record = RunnerRecord {
        runner_name,
        tenant: job.tenant.clone(),
        job_id: job.job_id,
        run_id: job.run_id,
        repo_full_name: job.repo_full_name.clone(),
    };
    if let Err(err) = store.save_runner(record, runner_ttl).await {
        event!(Level::WARN, job_id = job.job_id, error = %err, "failed to save runner record");
    }

    Outcome::Done
}

/// Retries `f` up to `max_attempts` times while the returned error is
/// retryable, sleeping `backoff` between attempts. Gives up immediately
/// on a non-retryable error.
async fn retry<F, Fut, T>(max_attempts: u32, backoff: Duration, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                tokio::time::sleep(backoff).await;
                continue;
            }
            Err(err) => return Err(err),
        }
    }
}

impl From<Error> for Outcome {
    fn from(err: Error) -> Self {
        Outcome::Giveup(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jit_cluster::FakeCluster;
    use jit_sourcecontrol::FakeSourceControl;
    use jit_store::FakeStore;

    fn job() -> PendingJob {
        PendingJob::new(42, 42, "build", "acme/widgets", "acme", vec!["self-hosted".into()])
    }

    #[tokio::test]
    async fn succeeds_and_updates_state() {
        let store = FakeStore::new();
        let cluster = FakeCluster::new();
        let sc = FakeSourceControl::new();

        let outcome =
            dispatch(&store, &cluster, &sc, Duration::from_secs(60), 3, Duration::from_millis(1), job())
                .await;

        assert_eq!(outcome, Outcome::Done);
        assert_eq!(store.get_running("acme").await.unwrap(), 1);
        assert_eq!(store.get_global().await.unwrap(), 1);
        assert!(cluster.contains("jit-runner-42"));
        assert!(store.get_all_runners().await.unwrap().contains_key("jit-runner-42"));
    }

    #[tokio::test]
    async fn retries_then_succeeds_on_transient_failure() {
        let store = FakeStore::new();
        let cluster = FakeCluster::new();
        let sc = FakeSourceControl::failing(2, true);

        let outcome =
            dispatch(&store, &cluster, &sc, Duration::from_secs(60), 3, Duration::from_millis(1), job())
                .await;

        assert_eq!(outcome, Outcome::Done);
    }

    #[tokio::test]
    async fn gives_up_on_permanent_failure() {
        let store = FakeStore::new();
        let cluster = FakeCluster::new();
        let sc = FakeSourceControl::failing(1, false);

        let outcome =
            dispatch(&store, &cluster, &sc, Duration::from_secs(60), 3, Duration::from_millis(1), job())
                .await;

        assert!(matches!(outcome, Outcome::Giveup(_)));
        assert!(!cluster.contains("jit-runner-42"));
    }

    // A second worker hitting a pod-name collision treats 409 as success.
    #[tokio::test]
    async fn duplicate_dispatch_is_idempotent_via_pod_name_collision() {
        let store = FakeStore::new();
        let cluster = FakeCluster::new();
        let sc = FakeSourceControl::new();

        let first =
            dispatch(&store, &cluster, &sc, Duration::from_secs(60), 3, Duration::from_millis(1), job())
                .await;
        let second =
            dispatch(&store, &cluster, &sc, Duration::from_secs(60), 3, Duration::from_millis(1), job())
                .await;

        assert_eq!(first, Outcome::Done);
        assert_eq!(second, Outcome::Done);
        assert_eq!(cluster.list_managed_pods().await.unwrap().len(), 1);
    }
}
