//! Builds the key-value store's key scheme, namespaced by the
//! configured prefix.
//!
//! One function per key shape, rather than ad-hoc `format!` calls
//! scattered through the backend.

/// Builds namespaced keys for a single deployment of this service.
#[derive(Debug, Clone)]
pub struct Keys {
    namespace: String,
}

impl Keys {
    pub fn new(namespace: impl Into<String>) -> Self {
        Keys { namespace: namespace.into() }
    }

    pub fn org_running(&self, tenant: &str) -> String {
        format!("{ns}:org:{tenant}:running", ns = self.namespace)
    }

    pub fn org_pending(&self, tenant: &str) -> String {
        format!("{ns}:org:{tenant}:pending", ns = self.namespace)
    }

    pub fn org_pending_scan_pattern(&self) -> String {
        format!("{ns}:org:*:pending", ns = self.namespace)
    }

    pub fn org_limits(&self) -> String {
        format!("{ns}:org_limits", ns = self.namespace)
    }

    pub fn global_total(&self) -> String {
        format!("{ns}:global:total_running", ns = self.namespace)
    }

    pub fn runner_info(&self, runner_name: &str) -> String {
        format!("{ns}:runner:{runner_name}:info", ns = self.namespace)
    }

    pub fn runner_info_scan_pattern(&self) -> String {
        format!("{ns}:runner:*:info", ns = self.namespace)
    }

    /// Extracts the tenant from a key produced by [`Keys::org_pending`].
    pub fn tenant_from_pending_key(&self, key: &str) -> Option<String> {
        let rest = key.strip_prefix(&format!("{}:org:", self.namespace))?;
        let tenant = rest.strip_suffix(":pending")?;
        Some(tenant.to_string())
    }

    /// Extracts the runner name from a key produced by [`Keys::runner_info`].
    pub fn runner_name_from_info_key(&self, key: &str) -> Option<String> {
        let rest = key.strip_prefix(&format!("{}:runner:", self.namespace))?;
        let name = rest.strip_suffix(":info")?;
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_pending_key() {
        let keys = Keys::new("jit-runner");
        let key = keys.org_pending("acme");
        assert_eq!(key, "jit-runner:org:acme:pending");
        assert_eq!(keys.tenant_from_pending_key(&key).as_deref(), Some("acme"));
    }

    #[test]
    fn round_trips_runner_info_key() {
        let keys = Keys::new("jit-runner");
        let key = keys.runner_info("jit-runner-7");
        assert_eq!(key, "jit-runner:runner:jit-runner-7:info");
        assert_eq!(keys.runner_name_from_info_key(&key).as_deref(), Some("jit-runner-7"));
    }
}
