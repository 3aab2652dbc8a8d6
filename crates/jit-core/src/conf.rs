//! Layered configuration: a YAML file overlaid with `RUNNER__`-prefixed
//! environment variables.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Connection and naming settings for the state store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Store {
    /// Connection URL for the key-value backend (e.g. `redis://127.0.0.1:6379`).
    pub url: String,
    /// Key namespace prefix, prepended to every key this service touches.
    #[serde(default = "default_store_namespace")]
    pub namespace: String,
    /// TTL, in seconds, applied to `RunnerRecord` hashes.
    #[serde(default = "default_runner_ttl")]
    pub runner_record_ttl_secs: u64,
}

fn default_store_namespace() -> String {
    "jit-runner".to_string()
}

fn default_runner_ttl() -> u64 {
    86_400
}

/// Pod-spec and namespace settings for the container cluster.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Cluster {
    pub namespace: String,
    pub runner_image: String,
    pub sidecar_image: String,
    #[serde(default = "default_managed_label")]
    pub managed_label: String,
    #[serde(default)]
    pub runner_cpu_request: String,
    #[serde(default)]
    pub runner_cpu_limit: String,
    #[serde(default)]
    pub runner_memory_request: String,
    #[serde(default)]
    pub runner_memory_limit: String,
    /// Grace period, in seconds, used when deleting a pod.
    #[serde(default = "default_grace_period")]
    pub pod_delete_grace_period_secs: u32,
    #[serde(default)]
    pub in_cluster: bool,
}

fn default_managed_label() -> String {
    "jit-runner".to_string()
}

fn default_grace_period() -> u32 {
    30
}

/// Upstream source-control endpoint and credential settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SourceControl {
    pub api_url: String,
    pub pat: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_runner_group")]
    pub runner_group: String,
    #[serde(default = "default_accepted_labels")]
    pub accepted_labels: Vec<String>,
}

fn default_api_version() -> String {
    "2022-11-28".to_string()
}

fn default_runner_group() -> String {
    "default".to_string()
}

fn default_accepted_labels() -> Vec<String> {
    vec!["self-hosted".to_string()]
}

/// Admission/dispatch tuning knobs.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Dispatch {
    #[serde(default = "default_max_total")]
    pub max_total: i64,
    #[serde(default = "default_max_per_tenant")]
    pub max_per_tenant: i64,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_dispatcher_period")]
    pub dispatcher_period_secs: u64,
    #[serde(default = "default_reconciler_period")]
    pub reconciler_period_secs: u64,
    #[serde(default = "default_cleanup_period")]
    pub cleanup_period_secs: u64,
    #[serde(default = "default_worker_attempts")]
    pub worker_max_attempts: u32,
    #[serde(default = "default_worker_backoff")]
    pub worker_backoff_secs: u64,
}

fn default_max_total() -> i64 {
    200
}
fn default_max_per_tenant() -> i64 {
    10
}
fn default_max_batch_size() -> usize {
    10
}
fn default_dispatcher_period() -> u64 {
    5
}
fn default_reconciler_period() -> u64 {
    60
}
fn default_cleanup_period() -> u64 {
    60
}
fn default_worker_attempts() -> u32 {
    3
}
fn default_worker_backoff() -> u64 {
    30
}

/// Where the declarative per-tenant cap overrides live on disk.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TenantCaps {
    #[serde(default = "default_cap_file")]
    pub file: String,
}

fn default_cap_file() -> String {
    "org-limits.yaml".to_string()
}

impl Default for TenantCaps {
    fn default() -> Self {
        TenantCaps { file: default_cap_file() }
    }
}

impl Default for Dispatch {
    fn default() -> Self {
        Dispatch {
            max_total: default_max_total(),
            max_per_tenant: default_max_per_tenant(),
            max_batch_size: default_max_batch_size(),
            dispatcher_period_secs: default_dispatcher_period(),
            reconciler_period_secs: default_reconciler_period(),
            cleanup_period_secs: default_cleanup_period(),
            worker_max_attempts: default_worker_attempts(),
            worker_backoff_secs: default_worker_backoff(),
        }
    }
}

/// The full process configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Conf {
    pub store: Store,
    pub cluster: Cluster,
    pub source_control: SourceControl,
    #[serde(default)]
    pub dispatch: Dispatch,
    #[serde(default)]
    pub tenant_caps: TenantCaps,
}

impl Conf {
    /// Load a config file, then overlay `RUNNER__`-prefixed (double
    /// underscore separated) environment variables on top.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let conf: Conf = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).format(config::FileFormat::Yaml))
            .add_source(
                config::Environment::with_prefix("runner")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;
        Ok(conf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_minimal_file_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
store:
  url: "redis://127.0.0.1:6379"
cluster:
  namespace: "jit-runners"
  runner_image: "ghcr.io/actions/actions-runner:latest"
  sidecar_image: "docker:dind"
source_control:
  api_url: "https://ghe.example.com/api/v3"
  pat: "secret"
"#
        )
        .unwrap();
        let conf = Conf::new(file.path()).unwrap();
        assert_eq!(conf.dispatch.max_total, 200);
        assert_eq!(conf.store.namespace, "jit-runner");
        assert_eq!(conf.tenant_caps.file, "org-limits.yaml");
    }

    #[test]
    fn env_overlay_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
store:
  url: "redis://127.0.0.1:6379"
cluster:
  namespace: "jit-runners"
  runner_image: "img"
  sidecar_image: "dind"
source_control:
  api_url: "https://ghe.example.com"
  pat: "secret"
dispatch:
  max_total: 50
"#
        )
        .unwrap();
        std::env::set_var("RUNNER__DISPATCH__MAX_TOTAL", "75");
        let conf = Conf::new(file.path()).unwrap();
        std::env::remove_var("RUNNER__DISPATCH__MAX_TOTAL");
        assert_eq!(conf.dispatch.max_total, 75);
    }
}
