//! Seeds per-tenant cap overrides from a declarative file once, on
//! boot, and exposes CRUD.

use std::collections::HashMap;
use std::path::Path;

use jit_core::error::Result;
use jit_core::models::Tenant;
use jit_store::StateStore;
use serde::Deserialize;
use tracing::{event, instrument, Level};

#[derive(Debug, Deserialize)]
struct CapFile {
    #[serde(default)]
    org_limits: HashMap<Tenant, i64>,
}

/// Loads `path` and bulk-writes its `org_limits` map into `store`, unless
/// the store already has caps and `force` is false (an operator may have
/// edited them directly; a restart must not clobber that).
#[instrument(name = "tenant_caps::initialize_from_file", skip(store), fields(path = %path.as_ref().display()))]
pub async fn initialize_from_file(
    store: &dyn StateStore,
    path: impl AsRef<Path>,
    force: bool,
) -> Result<()> {
    if !force && !store.get_all_caps().await?.is_empty() {
        event!(Level::DEBUG, "tenant caps already populated, skipping seed");
        return Ok(());
    }
    let contents = std::fs::read_to_string(&path)?;
    let parsed: CapFile = serde_yaml::from_str(&contents)?;
    store.set_caps_bulk(&parsed.org_limits).await?;
    event!(Level::INFO, tenants = parsed.org_limits.len(), "seeded tenant caps");
    Ok(())
}

pub async fn get(store: &dyn StateStore, tenant: &str) -> Result<Option<i64>> {
    store.get_cap(tenant).await
}

pub async fn set(store: &dyn StateStore, tenant: &str, n: i64) -> Result<()> {
    store.set_cap(tenant, n).await
}

pub async fn delete(store: &dyn StateStore, tenant: &str) -> Result<bool> {
    store.delete_cap(tenant).await
}

pub async fn list(store: &dyn StateStore) -> Result<HashMap<Tenant, i64>> {
    store.get_all_caps().await
}

pub async fn reload(store: &dyn StateStore, path: impl AsRef<Path>) -> Result<()> {
    initialize_from_file(store, path, true).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use jit_store::FakeStore;
    use std::io::Write;

    #[tokio::test]
    async fn seeds_only_when_empty() {
        let store = FakeStore::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "org_limits:\n  acme: 5\n  contoso: 3").unwrap();

        initialize_from_file(&store, file.path(), false).await.unwrap();
        assert_eq!(get(&store, "acme").await.unwrap(), Some(5));

        set(&store, "acme", 99).await.unwrap();
        initialize_from_file(&store, file.path(), false).await.unwrap();
        assert_eq!(get(&store, "acme").await.unwrap(), Some(99));

        reload(&store, file.path()).await.unwrap();
        assert_eq!(get(&store, "acme").await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn crud_round_trips() {
        let store = FakeStore::new();
        assert_eq!(get(&store, "acme").await.unwrap(), None);
        set(&store, "acme", 4).await.unwrap();
        assert_eq!(list(&store).await.unwrap().len(), 1);
        assert!(delete(&store, "acme").await.unwrap());
        assert_eq!(get(&store, "acme").await.unwrap(), None);
    }
}
