//! Tron namespace guard: which namespaces may be created or destroyed.
//!
//! Two independent axes:
//! - *protected*: fixed system names plus operator-configured extras; never created or deleted.
//! - *managed*: carries the fixed `tron-ns-` prefix; the only namespaces deletable without an
//!   explicit legacy override.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use tron_core::{TronError, TronResult};
use tracing::debug;

/// Ownership prefix of every namespace Tron creates for an application.
pub const MANAGED_PREFIX: &str = "tron-ns-";

/// Kubernetes system namespaces that are always protected.
pub const SYSTEM_NAMESPACES: [&str; 4] = ["kube-system", "kube-public", "kube-node-lease", "default"];

/// Environment variable holding extra protected names, comma-separated.
pub const PROTECTED_ENV: &str = "TRON_PROTECTED_NAMESPACES";

/// Namespace name for an application: `tron-ns-<application>`.
pub fn namespace_for_application(application_name: &str) -> String {
    format!("{}{}", MANAGED_PREFIX, application_name)
}

/// Stateless policy evaluated before every namespace mutation.
#[derive(Debug, Clone)]
pub struct NamespaceGuard {
    protected: BTreeSet<String>,
}

impl Default for NamespaceGuard {
    fn default() -> Self { Self::new(std::iter::empty::<String>()) }
}

impl NamespaceGuard {
    /// System names plus `extra`. Blank entries are ignored, whitespace is trimmed.
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut protected: BTreeSet<String> = SYSTEM_NAMESPACES.iter().map(|s| s.to_string()).collect();
        for ns in extra {
            let ns = ns.as_ref().trim();
            if !ns.is_empty() { protected.insert(ns.to_string()); }
        }
        Self { protected }
    }

    /// Build from `TRON_PROTECTED_NAMESPACES` (e.g. `tron,monitoring,ingress-nginx`).
    pub fn from_env() -> Self {
        let raw = std::env::var(PROTECTED_ENV).unwrap_or_default();
        let guard = Self::from_list(&raw);
        debug!(protected = %guard.protected_list(), "namespace guard configured");
        guard
    }

    /// Parse a comma-separated list of extra protected names.
    pub fn from_list(raw: &str) -> Self { Self::new(raw.split(',')) }

    pub fn is_protected(&self, namespace: &str) -> bool { self.protected.contains(namespace) }

    pub fn is_managed(&self, namespace: &str) -> bool { namespace.starts_with(MANAGED_PREFIX) }

    pub fn protected(&self) -> impl Iterator<Item = &str> { self.protected.iter().map(|s| s.as_str()) }

    fn protected_list(&self) -> String { self.protected.iter().cloned().collect::<Vec<_>>().join(", ") }

    fn refuse(&self, namespace: &str, operation: &str) -> TronError {
        TronError::ProtectedNamespace {
            namespace: namespace.to_string(),
            operation: operation.to_string(),
            protected: self.protected_list(),
        }
    }

    pub fn check_creatable(&self, namespace: &str) -> TronResult<()> {
        if self.is_protected(namespace) { return Err(self.refuse(namespace, "create")); }
        Ok(())
    }

    /// `legacy_override` must come from the caller's own persisted record of namespace
    /// ownership, never from the name itself.
    pub fn check_deletable(&self, namespace: &str, legacy_override: bool) -> TronResult<()> {
        if self.is_protected(namespace) { return Err(self.refuse(namespace, "delete")); }
        if !self.is_managed(namespace) && !legacy_override {
            return Err(TronError::NotManaged { namespace: namespace.to_string(), prefix: MANAGED_PREFIX.to_string() });
        }
        Ok(())
    }

    /// Application names may not shadow a protected namespace.
    pub fn check_application_name(&self, application_name: &str) -> TronResult<()> {
        if self.is_protected(application_name) { return Err(self.refuse(application_name, "use")); }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_namespaces_are_protected() {
        let g = NamespaceGuard::default();
        for ns in SYSTEM_NAMESPACES { assert!(g.is_protected(ns), "{}", ns); }
        assert!(!g.is_protected("my-app"));
        assert!(!g.is_protected("tron"));
    }

    #[test]
    fn extra_list_is_trimmed_and_blank_entries_ignored() {
        let g = NamespaceGuard::from_list(" tron , monitoring ,,");
        assert!(g.is_protected("tron"));
        assert!(g.is_protected("monitoring"));
        assert!(g.is_protected("kube-system"));
        assert_eq!(g.protected().count(), SYSTEM_NAMESPACES.len() + 2);
        assert_eq!(NamespaceGuard::from_list("").protected().count(), SYSTEM_NAMESPACES.len());
    }

    #[test]
    fn creatable_refuses_protected_only() {
        let g = NamespaceGuard::default();
        assert!(matches!(g.check_creatable("kube-system"), Err(TronError::ProtectedNamespace { .. })));
        assert!(g.check_creatable("tron-ns-demo").is_ok());
        assert!(g.check_creatable("random-ns").is_ok());
    }

    #[test]
    fn deletable_requires_managed_prefix_or_legacy_override() {
        let g = NamespaceGuard::default();
        assert!(g.check_deletable("tron-ns-demo", false).is_ok());
        assert!(matches!(g.check_deletable("random-ns", false), Err(TronError::NotManaged { .. })));
        assert!(g.check_deletable("random-ns", true).is_ok());
    }

    #[test]
    fn protected_wins_over_legacy_override() {
        let g = NamespaceGuard::from_list("tron-ns-infra");
        assert!(matches!(g.check_deletable("default", true), Err(TronError::ProtectedNamespace { .. })));
        // managed prefix does not unprotect a configured name
        assert!(matches!(g.check_deletable("tron-ns-infra", false), Err(TronError::ProtectedNamespace { .. })));
    }

    #[test]
    fn protected_error_names_operation_and_list() {
        let g = NamespaceGuard::default();
        let msg = g.check_deletable("kube-system", false).unwrap_err().to_string();
        assert!(msg.contains("kube-system"));
        assert!(msg.contains("delete"));
        assert!(msg.contains("kube-public"));
    }

    #[test]
    fn application_names_cannot_shadow_protected() {
        let g = NamespaceGuard::from_list("tron");
        assert!(g.check_application_name("kube-system").is_err());
        assert!(g.check_application_name("tron").is_err());
        assert!(g.check_application_name("production-api").is_ok());
    }

    #[test]
    fn application_namespace_uses_fixed_prefix() {
        assert_eq!(namespace_for_application("my-app"), "tron-ns-my-app");
        assert!(NamespaceGuard::default().is_managed(&namespace_for_application("x")));
    }
}
