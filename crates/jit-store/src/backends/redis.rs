//! The shipped [`StateStore`] implementation, backed by a Redis-compatible
//! server.
//!
//! Builds a `redis::Pipeline`, pushes commands, executes once, for every
//! multi-key write. Decrements floor at zero; missing keys read as zero.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bb8_redis::{bb8, RedisConnectionManager};
use jit_core::{
    error::{Error, Result},
    models::{PendingJob, RunnerRecord, Tenant},
};
use redis::AsyncCommands;
use tracing::instrument;

use crate::keys::Keys;
use crate::StateStore;

/// A pooled, namespaced Redis-backed state store.
pub struct RedisStore {
    pool: bb8::Pool<RedisConnectionManager>,
    keys: Keys,
}

impl RedisStore {
    /// Builds a connection pool against `url` and namespaces all keys
    /// under `namespace`.
    pub async fn connect(url: &str, namespace: impl Into<String>) -> Result<Self> {
        let manager = RedisConnectionManager::new(url)
            .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        let pool = bb8::Pool::builder()
            .build(manager)
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        Ok(RedisStore { pool, keys: Keys::new(namespace) })
    }

    async fn conn(
        &self,
    ) -> Result<bb8::PooledConnection<'_, RedisConnectionManager>> {
        self.pool.get().await.map_err(|e| Error::StoreUnavailable(e.to_string()))
    }
}

#[async_trait]
impl StateStore for RedisStore {
    #[instrument(skip(self), err(Debug))]
    async fn get_running(&self, tenant: &str) -> Result<i64> {
        let mut conn = self.conn().await?;
        let value: Option<i64> = conn
            .get(self.keys.org_running(tenant))
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        Ok(value.unwrap_or(0))
    }

    #[instrument(skip(self), err(Debug))]
    async fn get_global(&self) -> Result<i64> {
        let mut conn = self.conn().await?;
        let value: Option<i64> = conn
            .get(self.keys.global_total())
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        Ok(value.unwrap_or(0))
    }

    #[instrument(skip(self), err(Debug))]
    async fn incr_running(&self, tenant: &str) -> Result<i64> {
        let mut conn = self.conn().await?;
        conn.incr(self.keys.org_running(tenant), 1)
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))
    }

    #[instrument(skip(self), err(Debug))]
    async fn decr_running(&self, tenant: &str) -> Result<i64> {
        decr_floor_at_zero(&mut self.conn().await?, &self.keys.org_running(tenant)).await
    }

    #[instrument(skip(self), err(Debug))]
    async fn incr_global(&self) -> Result<i64> {
        let mut conn = self.conn().await?;
        conn.incr(self.keys.global_total(), 1)
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))
    }

    #[instrument(skip(self), err(Debug))]
    async fn decr_global(&self) -> Result<i64> {
        decr_floor_at_zero(&mut self.conn().await?, &self.keys.global_total()).await
    }

    async fn set_running(&self, tenant: &str, n: i64) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.set(self.keys.org_running(tenant), n)
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))
    }

    async fn set_global(&self, n: i64) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.set(self.keys.global_total(), n)
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))
    }

    async fn get_cap(&self, tenant: &str) -> Result<Option<i64>> {
        let mut conn = self.conn().await?;
        let value: Option<i64> = conn
            .hget(self.keys.org_limits(), tenant)
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        Ok(value)
    }

    async fn set_cap(&self, tenant: &str, n: i64) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.hset(self.keys.org_limits(), tenant, n)
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))
    }

    async fn delete_cap(&self, tenant: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn
            .hdel(self.keys.org_limits(), tenant)
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        Ok(removed > 0)
    }

    async fn get_all_caps(&self) -> Result<HashMap<Tenant, i64>> {
        let mut conn = self.conn().await?;
        conn.hgetall(self.keys.org_limits())
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))
    }

    async fn set_caps_bulk(&self, caps: &HashMap<Tenant, i64>) -> Result<()> {
        if caps.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        let pairs: Vec<(&str, i64)> = caps.iter().map(|(t, n)| (t.as_str(), *n)).collect();
        conn.hset_multiple(self.keys.org_limits(), &pairs)
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))
    }

    #[instrument(skip(self, job), fields(job_id = job.job_id, tenant = %job.tenant), err(Debug))]
    async fn enqueue(&self, mut job: PendingJob) -> Result<()> {
        job.enqueued_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        let payload = serde_json::to_string(&job)?;
        let mut conn = self.conn().await?;
        conn.rpush(self.keys.org_pending(&job.tenant), payload)
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))
    }

    #[instrument(skip(self), err(Debug))]
    async fn peek_all_pending(&self) -> Result<Vec<(Tenant, usize, PendingJob)>> {
        let mut conn = self.conn().await?;
        let mut cursor = 0u64;
        let mut tenant_keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(self.keys.org_pending_scan_pattern())
                .query_async(&mut *conn)
                .await
                .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
            tenant_keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        let mut all = Vec::new();
        for key in tenant_keys {
            let Some(tenant) = self.keys.tenant_from_pending_key(&key) else { continue };
            let items: Vec<String> = conn
                .lrange(&key, 0, -1)
                .await
                .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
            for (idx, raw) in items.into_iter().enumerate() {
                let job: PendingJob = serde_json::from_str(&raw)?;
                all.push((tenant.clone(), idx, job));
            }
        }
        all.sort_by(|a, b| a.2.enqueued_at.total_cmp(&b.2.enqueued_at));
        Ok(all)
    }

    #[instrument(skip(self, jobs), fields(count = jobs.len()), err(Debug))]
    async fn remove_pending(&self, jobs: &[PendingJob]) -> Result<usize> {
        let mut by_tenant: HashMap<&str, Vec<i64>> = HashMap::new();
        for job in jobs {
            by_tenant.entry(job.tenant.as_str()).or_default().push(job.job_id);
        }
        let mut conn = self.conn().await?;
        let mut removed = 0;
        for (tenant, job_ids) in by_tenant {
            let key = self.keys.org_pending(tenant);
            let items: Vec<String> = conn
                .lrange(&key, 0, -1)
                .await
                .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
            let mut keep = Vec::with_capacity(items.len());
            for raw in items {
                let job: PendingJob = serde_json::from_str(&raw)?;
                if job_ids.contains(&job.job_id) {
                    removed += 1;
                } else {
                    keep.push(raw);
                }
            }
            // Atomically replace the list: delete then rebuild in one
            // pipeline, scoped to this tenant's key only.
            let mut pipe = redis::pipe();
            pipe.atomic();
            pipe.del(&key);
            if !keep.is_empty() {
                pipe.rpush(&key, &keep);
            }
            pipe.query_async::<()>(&mut *conn)
                .await
                .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        }
        Ok(removed)
    }

    async fn save_runner(&self, record: RunnerRecord, ttl: Duration) -> Result<()> {
        let key = self.keys.runner_info(&record.runner_name);
        let pairs = [
            ("runner_name", record.runner_name.clone()),
            ("tenant", record.tenant.clone()),
            ("job_id", record.job_id.to_string()),
            ("run_id", record.run_id.to_string()),
            ("repo_full_name", record.repo_full_name.clone()),
        ];
        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.hset_multiple(&key, &pairs);
        pipe.expire(&key, ttl.as_secs() as i64);
        pipe.query_async::<()>(&mut *conn)
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))
    }

    async fn delete_runner(&self, runner_name: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.del(self.keys.runner_info(runner_name))
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))
    }

    #[instrument(skip(self), err(Debug))]
    async fn get_all_runners(&self) -> Result<HashMap<String, RunnerRecord>> {
        let mut conn = self.conn().await?;
        let mut cursor = 0u64;
        let mut info_keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(self.keys.runner_info_scan_pattern())
                .query_async(&mut *conn)
                .await
                .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
            info_keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        let mut out = HashMap::with_capacity(info_keys.len());
        for key in info_keys {
            let Some(runner_name) = self.keys.runner_name_from_info_key(&key) else { continue };
            let fields: HashMap<String, String> = conn
                .hgetall(&key)
                .await
                .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
            if fields.is_empty() {
                continue;
            }
            let record = RunnerRecord {
                runner_name: runner_name.clone(),
                tenant: fields.get("tenant").cloned().unwrap_or_default(),
                job_id: fields.get("job_id").and_then(|v| v.parse().ok()).unwrap_or_default(),
                run_id: fields.get("run_id").and_then(|v| v.parse().ok()).unwrap_or_default(),
                repo_full_name: fields.get("repo_full_name").cloned().unwrap_or_default(),
            };
            out.insert(runner_name, record);
        }
        Ok(out)
    }
}

/// Decrements `key`, clamping to zero on underflow. Precision is not
/// required here since the reconciler rewrites counters authoritatively
/// on its own tick.
async fn decr_floor_at_zero(
    conn: &mut bb8::PooledConnection<'_, RedisConnectionManager>,
    key: &str,
) -> Result<i64> {
    let value: i64 = conn.decr(key, 1).await.map_err(|e| Error::StoreUnavailable(e.to_string()))?;
    if value < 0 {
        conn.set::<_, _, ()>(key, 0)
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        Ok(0)
    } else {
        Ok(value)
    }
}
