use anyhow::Context;
use std::sync::Arc;

use flexstart_common::{RecoveryPolicy, DEFAULT_POLICY_NAME};
use flexstart_providers::PolicyStore;

/// Bundled fallback policy, shipped with the binary. Must always parse;
/// startup fails otherwise.
const BUNDLED_POLICY: &str = include_str!("../config/default-policy.json");

/// Resolves the effective recovery policy, in priority order:
/// 1. the named document an instance references (if any),
/// 2. the process-wide default document,
/// 3. the bundled static policy.
///
/// Fetch failures and malformed documents are soft: log and advance to the
/// next source.
pub struct PolicyResolver {
    store: Arc<dyn PolicyStore>,
    fallback: RecoveryPolicy,
}

impl PolicyResolver {
    pub fn new(store: Arc<dyn PolicyStore>, fallback: RecoveryPolicy) -> Self {
        Self { store, fallback }
    }

    pub fn bundled_policy() -> anyhow::Result<RecoveryPolicy> {
        RecoveryPolicy::parse(BUNDLED_POLICY).context("bundled default policy is malformed")
    }

    pub async fn resolve(&self, policy_ref: Option<&str>) -> RecoveryPolicy {
        if let Some(name) = policy_ref {
            if let Some(policy) = self.try_source(name).await {
                println!("📋 [policy] using instance policy {name}");
                return policy;
            }
        }
        if let Some(policy) = self.try_source(DEFAULT_POLICY_NAME).await {
            println!("📋 [policy] using default policy {DEFAULT_POLICY_NAME}");
            return policy;
        }
        println!("📋 [policy] falling back to bundled policy");
        self.fallback.clone()
    }

    async fn try_source(&self, name: &str) -> Option<RecoveryPolicy> {
        let document = match self.store.get(name).await {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                println!("📋 [policy] document {name} not found, trying next source");
                return None;
            }
            Err(e) => {
                eprintln!("⚠️ [policy] failed to fetch {name}: {e}");
                return None;
            }
        };
        match RecoveryPolicy::parse(&document) {
            Ok(policy) => Some(policy),
            Err(e) => {
                eprintln!("⚠️ [policy] document {name} is malformed: {e}");
                None
            }
        }
    }
}
