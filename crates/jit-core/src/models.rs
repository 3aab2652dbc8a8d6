//! Domain types shared across the orchestrator, store, cluster, and
//! source-control crates.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An organization login. Kept as a bare string rather than a newtype
/// since the store treats it as an opaque key fragment.
pub type Tenant = String;

/// A job waiting on a tenant's FIFO queue.
///
/// Stored as a JSON payload inside the tenant's list in the state store;
/// `enqueued_at` is a monotonic-ish wall clock reading taken at enqueue
/// time, used only to order the global peek, never for cap decisions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingJob {
    pub job_id: i64,
    pub run_id: i64,
    pub job_name: String,
    pub repo_full_name: String,
    pub tenant: Tenant,
    pub labels: Vec<String>,
    /// Seconds since the Unix epoch. Missing on legacy entries, in which
    /// case callers must treat it as `0.0` (sorts to the front).
    #[serde(default)]
    pub enqueued_at: f64,
}

impl PendingJob {
    /// Build a pending job with `enqueued_at` unset; the store stamps it
    /// at the moment of the actual `enqueue` call.
    pub fn new(
        job_id: i64,
        run_id: i64,
        job_name: impl Into<String>,
        repo_full_name: impl Into<String>,
        tenant: impl Into<String>,
        labels: Vec<String>,
    ) -> Self {
        PendingJob {
            job_id,
            run_id,
            job_name: job_name.into(),
            repo_full_name: repo_full_name.into(),
            tenant: tenant.into(),
            labels,
            enqueued_at: 0.0,
        }
    }
}

/// A dispatched pod's bookkeeping record, stored as a hash with a TTL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunnerRecord {
    pub runner_name: String,
    pub tenant: Tenant,
    pub job_id: i64,
    pub run_id: i64,
    pub repo_full_name: String,
}

impl RunnerRecord {
    /// The pod name a runner record is created under: `jit-runner-<job_id>`.
    pub fn name_for(job_id: i64) -> String {
        format!("jit-runner-{job_id}")
    }
}

/// The phase of an observed pod, as reported by the cluster.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    /// A pod is "active" iff it is still consuming a concurrency slot.
    pub fn is_active(self) -> bool {
        matches!(self, PodPhase::Pending | PodPhase::Running)
    }

    /// A pod is terminal once it will never run again.
    pub fn is_terminal(self) -> bool {
        matches!(self, PodPhase::Succeeded | PodPhase::Failed)
    }
}

/// A pod as observed from the cluster's list API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PodInfo {
    pub name: String,
    pub tenant: Tenant,
    pub phase: PodPhase,
}

/// Everything the Dispatch Worker needs to submit a pod spec.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PodRequest {
    pub runner_name: String,
    pub tenant: Tenant,
    pub job_id: i64,
    pub encoded_jit_config: String,
    pub labels: Vec<String>,
}

/// The JIT configuration blob issued by the upstream source-control
/// service for a single ephemeral runner registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JitConfig {
    pub runner_id: i64,
    pub encoded_jit_config: String,
}

/// The inbound `workflow_job` webhook payload. HMAC verification and JSON
/// framing happen upstream of the core; this is the value the ingress
/// hands to admission once both have succeeded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookEvent {
    pub action: WorkflowJobAction,
    pub workflow_job: WorkflowJob,
    pub repository: Repository,
    pub organization: Option<Organization>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowJobAction {
    Queued,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowJob {
    pub id: i64,
    pub run_id: i64,
    pub name: String,
    pub labels: Vec<String>,
    pub runner_name: Option<String>,
    pub conclusion: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Repository {
    pub full_name: String,
    pub owner: Owner,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Owner {
    pub login: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Organization {
    pub login: String,
}

impl WebhookEvent {
    /// The tenant an event belongs to, preferring the `organization`
    /// field and falling back to the repository owner (observed upstream
    /// behavior: `organization` is absent on some deliveries).
    pub fn tenant(&self) -> Option<&str> {
        self.organization
            .as_ref()
            .map(|org| org.login.as_str())
            .or(Some(self.repository.owner.login.as_str()))
    }
}

/// Any-of label matching: true iff `labels` and `accepted` share at least
/// one element. This is the observed upstream semantics.
pub fn labels_match(labels: &[String], accepted: &HashSet<String>) -> bool {
    labels.iter().any(|l| accepted.contains(l))
}

/// A snapshot of a single tenant's queue/running state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TenantStats {
    pub running: i64,
    pub pending: i64,
}

/// Body of the observability `/metrics` surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub total_running: i64,
    pub max_total: i64,
    pub max_per_tenant: i64,
    pub tenants: std::collections::HashMap<Tenant, TenantStats>,
}

/// Body of the observability `/health` surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub store_connected: bool,
    pub config_summary: ConfigSummary,
}

/// The subset of the dispatch configuration worth surfacing alongside
/// health: the knobs that determine whether the fleet is under- or
/// over-provisioned relative to demand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigSummary {
    pub max_total: i64,
    pub max_per_tenant: i64,
    pub max_batch_size: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_match_is_any_of() {
        let accepted: HashSet<String> = ["self-hosted", "linux"].iter().map(|s| s.to_string()).collect();
        assert!(labels_match(&["linux".to_string(), "x64".to_string()], &accepted));
        assert!(!labels_match(&["windows".to_string()], &accepted));
    }

    #[test]
    fn runner_name_is_job_scoped() {
        assert_eq!(RunnerRecord::name_for(42), "jit-runner-42");
    }

    #[test]
    fn tenant_prefers_organization_over_owner() {
        let event = WebhookEvent {
            action: WorkflowJobAction::Queued,
            workflow_job: WorkflowJob {
                id: 1,
                run_id: 1,
                name: "build".into(),
                labels: vec!["linux".into()],
                runner_name: None,
                conclusion: None,
            },
            repository: Repository {
                full_name: "acme/widgets".into(),
                owner: Owner { login: "acme".into(), kind: "Organization".into() },
            },
            organization: Some(Organization { login: "acme-corp".into() }),
        };
        assert_eq!(event.tenant(), Some("acme-corp"));
    }
}
