//! An in-memory [`SourceControl`] used by the orchestrator crate's own
//! unit and scenario tests. Configurable to fail the first N calls before
//! succeeding, to exercise the Dispatch Worker's retry path.

use std::sync::Mutex;

use jit_core::error::{Error, Result};
use jit_core::models::JitConfig;

use crate::SourceControl;

#[derive(Debug, Default)]
struct Inner {
    calls: u32,
    deleted: Vec<String>,
}

/// `fail_first_n_calls` counts `generate_jit_config` attempts only.
#[derive(Debug, Default)]
pub struct FakeSourceControl {
    fail_first_n_calls: u32,
    transient: bool,
    inner: Mutex<Inner>,
}

impl FakeSourceControl {
    pub fn new() -> Self {
        FakeSourceControl::default()
    }

    /// Fails the first `n` `generate_jit_config` calls with a transient
    /// (if `transient`) or permanent error, then succeeds.
    pub fn failing(n: u32, transient: bool) -> Self {
        FakeSourceControl { fail_first_n_calls: n, transient, inner: Mutex::new(Inner::default()) }
    }

    pub fn deleted_runners(&self) -> Vec<String> {
        self.inner.lock().unwrap().deleted.clone()
    }
}

#[async_trait::async_trait]
impl SourceControl for FakeSourceControl {
    async fn generate_jit_config(
        &self,
        _tenant: &str,
        runner_name: &str,
        _labels: &[String],
    ) -> Result<JitConfig> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls += 1;
        if inner.calls <= self.fail_first_n_calls {
            return if self.transient {
                Err(Error::SourceControlTransient("fake transient failure".into()))
            } else {
                Err(Error::SourceControlPermanent("fake permanent failure".into()))
            };
        }
        Ok(JitConfig { runner_id: inner.calls as i64, encoded_jit_config: format!("encoded-{runner_name}") })
    }

    async fn delete_runner(&self, _tenant: &str, runner_name: &str) -> Result<()> {
        self.inner.lock().unwrap().deleted.push(runner_name.to_string());
        Ok(())
    }
}
