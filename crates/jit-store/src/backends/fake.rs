//! An in-memory [`StateStore`] used by the orchestrator crate's own unit
//! and scenario tests. The mutex here is purely an implementation detail
//! of the test double; it is not a design requirement of [`StateStore`]
//! itself, whose methods never hold a guard across an `.await`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jit_core::{
    error::Result,
    models::{PendingJob, RunnerRecord, Tenant},
};

use crate::StateStore;

#[derive(Debug, Default)]
struct Inner {
    running: HashMap<Tenant, i64>,
    global: i64,
    caps: HashMap<Tenant, i64>,
    pending: HashMap<Tenant, Vec<PendingJob>>,
    runners: HashMap<String, RunnerRecord>,
}

/// An in-memory mirror of the store's key scheme.
#[derive(Debug, Default)]
pub struct FakeStore {
    inner: Mutex<Inner>,
}

impl FakeStore {
    pub fn new() -> Self {
        FakeStore::default()
    }

    /// Test helper: stamps and inserts a pending job without going
    /// through `enqueue`'s wall-clock timestamp, for tests that need
    /// exact control over ordering.
    pub fn enqueue_at(&self, mut job: PendingJob, enqueued_at: f64) {
        job.enqueued_at = enqueued_at;
        let mut inner = self.inner.lock().unwrap();
        inner.pending.entry(job.tenant.clone()).or_default().push(job);
    }

    /// Test helper mirroring the Reconciler's direct counter writes,
    /// without requiring a fake cluster round-trip.
    pub fn set_running_sync(&self, tenant: &str, n: i64) {
        self.inner.lock().unwrap().running.insert(tenant.to_string(), n);
    }
}

#[async_trait]
impl StateStore for FakeStore {
    async fn get_running(&self, tenant: &str) -> Result<i64> {
        Ok(*self.inner.lock().unwrap().running.get(tenant).unwrap_or(&0))
    }

    async fn get_global(&self) -> Result<i64> {
        Ok(self.inner.lock().unwrap().global)
    }

    async fn incr_running(&self, tenant: &str) -> Result<i64> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.running.entry(tenant.to_string()).or_insert(0);
        *entry += 1;
        Ok(*entry)
    }

    async fn decr_running(&self, tenant: &str) -> Result<i64> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.running.entry(tenant.to_string()).or_insert(0);
        *entry -= 1;
        if *entry < 0 {
            *entry = 0;
        }
        Ok(*entry)
    }

    async fn incr_global(&self) -> Result<i64> {
        let mut inner = self.inner.lock().unwrap();
        inner.global += 1;
        Ok(inner.global)
    }

    async fn decr_global(&self) -> Result<i64> {
        let mut inner = self.inner.lock().unwrap();
        inner.global -= 1;
        if inner.global < 0 {
            inner.global = 0;
        }
        Ok(inner.global)
    }

    async fn set_running(&self, tenant: &str, n: i64) -> Result<()> {
        self.inner.lock().unwrap().running.insert(tenant.to_string(), n);
        Ok(())
    }

    async fn set_global(&self, n: i64) -> Result<()> {
        self.inner.lock().unwrap().global = n;
        Ok(())
    }

    async fn get_cap(&self, tenant: &str) -> Result<Option<i64>> {
        Ok(self.inner.lock().unwrap().caps.get(tenant).copied())
    }

    async fn set_cap(&self, tenant: &str, n: i64) -> Result<()> {
        self.inner.lock().unwrap().caps.insert(tenant.to_string(), n);
        Ok(())
    }

    async fn delete_cap(&self, tenant: &str) -> Result<bool> {
        Ok(self.inner.lock().unwrap().caps.remove(tenant).is_some())
    }

    async fn get_all_caps(&self) -> Result<HashMap<Tenant, i64>> {
        Ok(self.inner.lock().unwrap().caps.clone())
    }

    async fn set_caps_bulk(&self, caps: &HashMap<Tenant, i64>) -> Result<()> {
        self.inner.lock().unwrap().caps.extend(caps.clone());
        Ok(())
    }

    async fn enqueue(&self, mut job: PendingJob) -> Result<()> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs_f64();
        job.enqueued_at = now;
        let mut inner = self.inner.lock().unwrap();
        inner.pending.entry(job.tenant.clone()).or_default().push(job);
        Ok(())
    }

    async fn peek_all_pending(&self) -> Result<Vec<(Tenant, usize, PendingJob)>> {
        let inner = self.inner.lock().unwrap();
        let mut all: Vec<(Tenant, usize, PendingJob)> = inner
            .pending
            .iter()
            .flat_map(|(tenant, jobs)| {
                jobs.iter()
                    .enumerate()
                    .map(|(idx, job)| (tenant.clone(), idx, job.clone()))
            })
            .collect();
        all.sort_by(|a, b| a.2.enqueued_at.total_cmp(&b.2.enqueued_at));
        Ok(all)
    }

    async fn remove_pending(&self, jobs: &[PendingJob]) -> Result<usize> {
        let mut by_tenant: HashMap<&str, Vec<i64>> = HashMap::new();
        for job in jobs {
            by_tenant.entry(job.tenant.as_str()).or_default().push(job.job_id);
        }
        let mut removed = 0;
        let mut inner = self.inner.lock().unwrap();
        for (tenant, job_ids) in by_tenant {
            if let Some(queue) = inner.pending.get_mut(tenant) {
                let before = queue.len();
                queue.retain(|job| !job_ids.contains(&job.job_id));
                removed += before - queue.len();
            }
        }
        Ok(removed)
    }

    async fn save_runner(&self, record: RunnerRecord, _ttl: Duration) -> Result<()> {
        self.inner.lock().unwrap().runners.insert(record.runner_name.clone(), record);
        Ok(())
    }

    async fn delete_runner(&self, runner_name: &str) -> Result<()> {
        self.inner.lock().unwrap().runners.remove(runner_name);
        Ok(())
    }

    async fn get_all_runners(&self) -> Result<HashMap<String, RunnerRecord>> {
        Ok(self.inner.lock().unwrap().runners.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn decrement_floors_at_zero() {
        let store = FakeStore::new();
        assert_eq!(store.decr_running("acme").await.unwrap(), 0);
        assert_eq!(store.decr_global().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn enqueue_then_peek_then_remove_then_peek_is_empty() {
        let store = FakeStore::new();
        let job = PendingJob::new(1, 1, "build", "acme/widgets", "acme", vec!["linux".into()]);
        store.enqueue(job.clone()).await.unwrap();
        let peeked = store.peek_all_pending().await.unwrap();
        assert_eq!(peeked.len(), 1);
        let stored = peeked[0].2.clone();
        let removed = store.remove_pending(&[stored]).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.peek_all_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn peek_orders_by_enqueued_at_across_tenants() {
        let store = FakeStore::new();
        store.enqueue_at(PendingJob::new(2, 1, "b", "acme/b", "b", vec![]), 102.0);
        store.enqueue_at(PendingJob::new(1, 1, "a", "acme/a", "a", vec![]), 101.0);
        let peeked = store.peek_all_pending().await.unwrap();
        assert_eq!(peeked[0].2.job_id, 1);
        assert_eq!(peeked[1].2.job_id, 2);
    }

    #[tokio::test]
    async fn effective_cap_falls_back_to_default() {
        let store = FakeStore::new();
        assert_eq!(store.effective_cap("acme", 10).await.unwrap(), 10);
        store.set_cap("acme", 3).await.unwrap();
        assert_eq!(store.effective_cap("acme", 10).await.unwrap(), 3);
        store.delete_cap("acme").await.unwrap();
        assert_eq!(store.effective_cap("acme", 10).await.unwrap(), 10);
    }
}
