//! The typed façade over the shared key-value store.
//!
//! No other component is allowed to touch the backing store directly;
//! every read/write the Reconciler, Admission, Dispatcher, Dispatch
//! Worker, Cleanup, and Tenant-Cap Manager perform goes through
//! [`StateStore`].

pub mod keys;

pub mod backends {
    pub mod redis;

    #[cfg(feature = "test-support")]
    pub mod fake;
}

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use jit_core::{
    error::Result,
    models::{PendingJob, RunnerRecord, Tenant},
};

pub use backends::redis::RedisStore;
#[cfg(feature = "test-support")]
pub use backends::fake::FakeStore;

/// The complete vocabulary the rest of the system needs from the store.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Returns `0` on a missing key; never fails except on transport error.
    async fn get_running(&self, tenant: &str) -> Result<i64>;

    /// Returns `0` on a missing key; never fails except on transport error.
    async fn get_global(&self) -> Result<i64>;

    /// Atomically increments; never goes negative since it only ever
    /// increases.
    async fn incr_running(&self, tenant: &str) -> Result<i64>;

    /// Atomically decrements, clamping the stored value to zero if it
    /// would go negative.
    async fn decr_running(&self, tenant: &str) -> Result<i64>;

    async fn incr_global(&self) -> Result<i64>;

    async fn decr_global(&self) -> Result<i64>;

    /// Unconditional write. Used only by the Reconciler.
    async fn set_running(&self, tenant: &str, n: i64) -> Result<()>;

    /// Unconditional write. Used only by the Reconciler.
    async fn set_global(&self, n: i64) -> Result<()>;

    async fn get_cap(&self, tenant: &str) -> Result<Option<i64>>;

    async fn set_cap(&self, tenant: &str, n: i64) -> Result<()>;

    async fn delete_cap(&self, tenant: &str) -> Result<bool>;

    async fn get_all_caps(&self) -> Result<HashMap<Tenant, i64>>;

    async fn set_caps_bulk(&self, caps: &HashMap<Tenant, i64>) -> Result<()>;

    /// `get_cap(tenant)` if present, else `default_cap`. Implemented once
    /// here so every call site shares the same fallback logic.
    async fn effective_cap(&self, tenant: &str, default_cap: i64) -> Result<i64> {
        Ok(self.get_cap(tenant).await?.unwrap_or(default_cap))
    }

    /// Appends a JSON-serialized `PendingJob` to the tenant's FIFO list,
    /// stamping `enqueued_at` with the current wall-clock time.
    async fn enqueue(&self, job: PendingJob) -> Result<()>;

    /// Scans every tenant queue and returns a single sequence, sorted
    /// ascending by `enqueued_at` (legacy entries missing a timestamp
    /// sort to the front as `0.0`).
    async fn peek_all_pending(&self) -> Result<Vec<(Tenant, usize, PendingJob)>>;

    /// Atomically (per tenant) deletes and rebuilds each affected FIFO
    /// list, dropping every job whose `job_id` is in `jobs`. Returns the
    /// number of entries actually removed.
    async fn remove_pending(&self, jobs: &[PendingJob]) -> Result<usize>;

    async fn save_runner(&self, record: RunnerRecord, ttl: Duration) -> Result<()>;

    async fn delete_runner(&self, runner_name: &str) -> Result<()>;

    async fn get_all_runners(&self) -> Result<HashMap<String, RunnerRecord>>;
}
