use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod bus;
pub mod error;
pub mod policy;
pub mod shape_patterns;

pub use error::{ProviderError, RecoveryError};
pub use policy::{BareMetalMode, RecoveryPolicy};

// --- Tag keys ---

/// Opt-in marker: only instances tagged `Flexible=true` are ever touched.
pub const TAG_FLEXIBLE: &str = "Flexible";
/// Durable marker recording the shape an instance had before recovery.
pub const TAG_ORIGINAL_TYPE: &str = "OriginalType";
/// Optional per-instance reference to a named recovery policy document.
pub const TAG_POLICY_REF: &str = "FlexibleConfigurationArn";

/// Name of the process-wide default policy document in the policy store.
pub const DEFAULT_POLICY_NAME: &str = "/flexible-instance-starter/default";

// --- Enums ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleState {
    Pending,
    Running,
    Stopping,
    Stopped,
    ShuttingDown,
    Terminated,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Pending => "pending",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
            LifecycleState::ShuttingDown => "shutting-down",
            LifecycleState::Terminated => "terminated",
        }
    }
}

// --- Entities ---

/// Immutable snapshot of a hardware shape from the provider catalog.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HardwareShape {
    /// Identifier in "family.size" form, e.g. "t3.large".
    pub id: String,
    pub vcpus: i32,
    pub memory_mib: i64,
    /// Primary supported architecture, e.g. "x86_64" or "arm64".
    pub architecture: String,
    pub bare_metal: bool,
    pub current_generation: bool,
    /// Total local instance storage in GB; 0 for EBS-only shapes.
    pub local_storage_gb: i64,
}

impl HardwareShape {
    /// Family prefix before the first '.', e.g. "t3" for "t3.large".
    pub fn family(&self) -> &str {
        self.id.split('.').next().unwrap_or(&self.id)
    }

    /// Burstable-performance class (t2/t3/t3a/t4g ...).
    pub fn is_burstable(&self) -> bool {
        self.id.starts_with('t') && !self.is_accelerated()
    }

    /// Flex class (m7i-flex and friends).
    pub fn is_flex(&self) -> bool {
        self.id.contains("-flex")
    }

    /// Accelerator / FPGA / specialized-inference families. These workloads
    /// cannot be safely moved across hardware families, so they are never
    /// eligible for substitution.
    pub fn is_accelerated(&self) -> bool {
        self.id.starts_with("inf")
            || self.id.starts_with("trn")
            || self.id.starts_with('g')
            || self.id.starts_with('p')
            || self.id.starts_with('f')
    }
}

/// The bounded view of a cloud instance this system reads and mutates.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Instance {
    pub id: String,
    pub shape_id: String,
    pub state: LifecycleState,
    pub tags: HashMap<String, String>,
}

impl Instance {
    /// True only when the explicit opt-in tag is present and set to "true".
    pub fn is_flexible(&self) -> bool {
        self.tags
            .get(TAG_FLEXIBLE)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    pub fn original_type_marker(&self) -> Option<&str> {
        self.tags.get(TAG_ORIGINAL_TYPE).map(String::as_str)
    }

    pub fn policy_ref(&self) -> Option<&str> {
        self.tags.get(TAG_POLICY_REF).map(String::as_str)
    }
}

/// Structured compatibility query derived from an original shape + policy.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CompatibilityQuery {
    pub architecture: String,
    pub vcpu_min: i32,
    pub vcpu_max: i32,
    pub memory_min_mib: i64,
    pub memory_max_mib: i64,
    pub include_burstable: bool,
    pub bare_metal: BareMetalMode,
    pub cpu_manufacturers: Vec<String>,
    pub excluded_shapes: Vec<String>,
    pub current_generation_only: bool,
    /// Minimum total local storage in GB, when the original has local disks.
    pub min_local_storage_gb: Option<i64>,
}

// --- Invocation results ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStatus {
    Started,
    Failed,
    Skipped,
    /// Batch budget ran out before this instance was looked at; a future
    /// delivery can still pick it up once the dedup window expires.
    NotAttempted,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Restart,
    TypeModified,
    None,
}

/// One entry per processed instance in an invocation's output.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRecoveryResult {
    pub instance_id: String,
    pub status: RecoveryStatus,
    pub action: RecoveryAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl InstanceRecoveryResult {
    pub fn skipped(instance_id: &str, detail: &str) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            status: RecoveryStatus::Skipped,
            action: RecoveryAction::None,
            old_type: None,
            new_type: None,
            detail: Some(detail.to_string()),
        }
    }

    pub fn failed(instance_id: &str, detail: &str) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            status: RecoveryStatus::Failed,
            action: RecoveryAction::None,
            old_type: None,
            new_type: None,
            detail: Some(detail.to_string()),
        }
    }

    pub fn not_attempted(instance_id: &str) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            status: RecoveryStatus::NotAttempted,
            action: RecoveryAction::None,
            old_type: None,
            new_type: None,
            detail: Some("batch budget exhausted".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(id: &str) -> HardwareShape {
        HardwareShape {
            id: id.to_string(),
            vcpus: 2,
            memory_mib: 8192,
            architecture: "x86_64".to_string(),
            bare_metal: false,
            current_generation: true,
            local_storage_gb: 0,
        }
    }

    #[test]
    fn family_classes() {
        assert!(shape("t3.large").is_burstable());
        assert!(!shape("m5.large").is_burstable());
        assert!(shape("m7i-flex.large").is_flex());
        assert!(shape("g4dn.xlarge").is_accelerated());
        assert!(shape("p3.2xlarge").is_accelerated());
        assert!(shape("inf1.xlarge").is_accelerated());
        assert!(shape("trn1.2xlarge").is_accelerated());
        assert!(shape("f1.2xlarge").is_accelerated());
        // "trn" wins over the burstable 't' prefix.
        assert!(!shape("trn1.2xlarge").is_burstable());
        assert!(!shape("c6g.large").is_accelerated());
        assert_eq!(shape("t3.large").family(), "t3");
    }

    #[test]
    fn flexible_tag_is_strict_opt_in() {
        let mut tags = HashMap::new();
        let mut inst = Instance {
            id: "i-1".to_string(),
            shape_id: "t3.large".to_string(),
            state: LifecycleState::Stopped,
            tags: tags.clone(),
        };
        assert!(!inst.is_flexible());

        tags.insert(TAG_FLEXIBLE.to_string(), "True".to_string());
        inst.tags = tags.clone();
        assert!(inst.is_flexible());

        tags.insert(TAG_FLEXIBLE.to_string(), "yes".to_string());
        inst.tags = tags;
        assert!(!inst.is_flexible());
    }

    #[test]
    fn result_serializes_camel_case() {
        let r = InstanceRecoveryResult {
            instance_id: "i-1".to_string(),
            status: RecoveryStatus::Started,
            action: RecoveryAction::TypeModified,
            old_type: Some("t3.large".to_string()),
            new_type: Some("t3a.large".to_string()),
            detail: None,
        };
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["instanceId"], "i-1");
        assert_eq!(v["status"], "started");
        assert_eq!(v["action"], "type_modified");
        assert_eq!(v["oldType"], "t3.large");
        assert_eq!(v["newType"], "t3a.large");
        assert!(v.get("detail").is_none());
    }
}
