//! Plain snapshot functions backing the observability surface: health,
//! metrics, and per-tenant status.

use std::collections::HashMap;

use jit_core::conf::Dispatch as DispatchConf;
use jit_core::error::Result;
use jit_core::models::{
    ConfigSummary, HealthSnapshot, HealthStatus, MetricsSnapshot, Tenant, TenantStats,
};
use jit_store::StateStore;

pub async fn health_snapshot(store: &dyn StateStore, conf: &DispatchConf) -> HealthSnapshot {
    let config_summary = ConfigSummary {
        max_total: conf.max_total,
        max_per_tenant: conf.max_per_tenant,
        max_batch_size: conf.max_batch_size,
    };
    match store.get_global().await {
        Ok(_) => HealthSnapshot { status: HealthStatus::Ok, store_connected: true, config_summary },
        Err(_) => {
            HealthSnapshot { status: HealthStatus::Degraded, store_connected: false, config_summary }
        }
    }
}

pub async fn metrics_snapshot(store: &dyn StateStore, conf: &DispatchConf) -> Result<MetricsSnapshot> {
    let total_running = store.get_global().await?;
    let caps = store.get_all_caps().await?;
    let runners = store.get_all_runners().await?;

    let mut tenant_names: std::collections::HashSet<Tenant> = caps.keys().cloned().collect();
    tenant_names.extend(runners.values().map(|r| r.tenant.clone()));
    for (tenant, _, _) in store.peek_all_pending().await? {
        tenant_names.insert(tenant);
    }

    let mut tenants = HashMap::with_capacity(tenant_names.len());
    for tenant in tenant_names {
        tenants.insert(tenant.clone(), org_status(store, &tenant).await?);
    }

    Ok(MetricsSnapshot {
        total_running,
        max_total: conf.max_total,
        max_per_tenant: conf.max_per_tenant,
        tenants,
    })
}

pub async fn org_status(store: &dyn StateStore, tenant: &str) -> Result<TenantStats> {
    let running = store.get_running(tenant).await?;
    let pending = store
        .peek_all_pending()
        .await?
        .into_iter()
        .filter(|(t, _, _)| t == tenant)
        .count() as i64;
    Ok(TenantStats { running, pending })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jit_core::models::PendingJob;
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

    #[tokio::test]
    async fn health_reports_store_status_and_config_summary() {
        let store = FakeStore::new();
        let snapshot = health_snapshot(&store, &conf()).await;
        assert_eq!(snapshot.status, HealthStatus::Ok);
        assert!(snapshot.store_connected);
        assert_eq!(snapshot.config_summary.max_total, 200);
        assert_eq!(snapshot.config_summary.max_per_tenant, 10);
        assert_eq!(snapshot.config_summary.max_batch_size, 10);
    }

    #[tokio::test]
    async fn org_status_counts_running_and_pending() {
        let store = FakeStore::new();
        store.set_running_sync("acme", 2);
        store.enqueue(PendingJob::new(1, 1, "build", "acme/w", "acme", vec![])).await.unwrap();
        let stats = org_status(&store, "acme").await.unwrap();
        assert_eq!(stats.running, 2);
        assert_eq!(stats.pending, 1);
    }
}
