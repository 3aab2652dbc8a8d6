//! The typed façade over the upstream GitHub-Enterprise-style source
//! control API: JIT runner config issuance and runner deregistration.

pub mod backends {
    pub mod github;

    #[cfg(feature = "test-support")]
    pub mod fake;
}

use async_trait::async_trait;
use jit_core::error::Result;
use jit_core::models::JitConfig;

pub use backends::github::GitHubSourceControl;
#[cfg(feature = "test-support")]
pub use backends::fake::FakeSourceControl;

/// The complete vocabulary the rest of the system needs from source control.
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Requests a JIT runner registration for `tenant`, scoped to
    /// `runner_group` with the given `labels`. Resolves the group name
    /// to its id first, as the upstream API requires.
    async fn generate_jit_config(
        &self,
        tenant: &str,
        runner_name: &str,
        labels: &[String],
    ) -> Result<JitConfig>;

    /// Deregisters a runner by name, tolerating an already-absent runner.
    async fn delete_runner(&self, tenant: &str, runner_name: &str) -> Result<()>;
}
