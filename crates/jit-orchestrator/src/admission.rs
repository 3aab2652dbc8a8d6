//! Admission and enqueue. Unconditional enqueue on acceptance; caps are
//! the dispatcher's concern, never admission's.

use std::collections::HashSet;

use jit_core::error::Result;
use jit_core::models::{labels_match, PendingJob, WebhookEvent, WorkflowJobAction};
use jit_store::StateStore;
use tracing::{event, instrument, Level};

/// The outcome of one admission decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    AcceptedQueued,
    IgnoredLabelMismatch,
    IgnoredNoTenant,
    IgnoredNotQueuedAction,
}

/// Admits a single webhook event, enqueuing a [`PendingJob`] on acceptance.
#[instrument(name = "admission::admit", skip_all, fields(job_id = event.workflow_job.id))]
pub async fn admit(
    store: &dyn StateStore,
    accepted_labels: &HashSet<String>,
    event: &WebhookEvent,
) -> Result<Decision> {
    if event.action != WorkflowJobAction::Queued {
        return Ok(Decision::IgnoredNotQueuedAction);
    }
    if !labels_match(&event.workflow_job.labels, accepted_labels) {
        event!(Level::DEBUG, job_id = event.workflow_job.id, "label mismatch, ignoring");
        return Ok(Decision::IgnoredLabelMismatch);
    }
    let Some(tenant) = event.tenant() else {
        event!(Level::WARN, job_id = event.workflow_job.id, "no tenant resolvable, ignoring");
        return Ok(Decision::IgnoredNoTenant);
    };

    let job = PendingJob::new(
        event.workflow_job.id,
        event.workflow_job.run_id,
        event.workflow_job.name.clone(),
        event.repository.full_name.clone(),
        tenant,
        event.workflow_job.labels.clone(),
    );
    store.enqueue(job).await?;
    event!(Level::INFO, job_id = event.workflow_job.id, tenant, "accepted:queued");
    Ok(Decision::AcceptedQueued)
}
