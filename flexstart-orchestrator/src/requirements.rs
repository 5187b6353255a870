use flexstart_common::{CompatibilityQuery, HardwareShape, RecoveryPolicy};

/// Convert an original shape plus the effective policy into a compatibility
/// query.
///
/// Accelerator / FPGA / specialized-inference families return `None`: those
/// workloads cannot be safely moved across hardware families, so no catalog
/// query is ever issued for them.
pub fn translate(shape: &HardwareShape, policy: &RecoveryPolicy) -> Option<CompatibilityQuery> {
    if shape.is_accelerated() {
        println!(
            "⏭️ [translate] {} is an accelerator-class family, no substitution possible",
            shape.id
        );
        return None;
    }

    let memory_min_mib = if policy.memory_buffer_percentage > 0 {
        let multiplier = (100 - policy.memory_buffer_percentage.min(100)) as i64;
        shape.memory_mib * multiplier / 100
    } else {
        shape.memory_mib
    };

    let min_local_storage_gb = if shape.local_storage_gb > 0
        && policy.local_storage_buffer_percentage < 100
    {
        let multiplier = (100 - policy.local_storage_buffer_percentage) as i64;
        Some(shape.local_storage_gb * multiplier / 100)
    } else {
        None
    };

    Some(CompatibilityQuery {
        architecture: shape.architecture.clone(),
        vcpu_min: shape.vcpus,
        vcpu_max: shape.vcpus * policy.max_cpu_multiplier as i32,
        memory_min_mib,
        memory_max_mib: shape.memory_mib * policy.max_memory_multiplier as i64,
        include_burstable: shape.is_burstable() || shape.is_flex(),
        bare_metal: policy.bare_metal,
        cpu_manufacturers: policy.cpu_manufacturers.clone(),
        excluded_shapes: policy.excluded_instance_types.clone(),
        current_generation_only: true,
        min_local_storage_gb,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flexstart_common::BareMetalMode;

    fn t3_large() -> HardwareShape {
        HardwareShape {
            id: "t3.large".to_string(),
            vcpus: 2,
            memory_mib: 8192,
            architecture: "x86_64".to_string(),
            bare_metal: false,
            current_generation: true,
            local_storage_gb: 0,
        }
    }

    #[test]
    fn default_policy_doubles_upper_bounds() {
        let q = translate(&t3_large(), &RecoveryPolicy::default()).unwrap();
        assert_eq!(q.vcpu_min, 2);
        assert_eq!(q.vcpu_max, 4);
        assert_eq!(q.memory_min_mib, 8192);
        assert_eq!(q.memory_max_mib, 16384);
        assert!(q.include_burstable);
        assert_eq!(q.architecture, "x86_64");
        assert!(q.current_generation_only);
        assert_eq!(q.min_local_storage_gb, None);
    }

    #[test]
    fn memory_buffer_relaxes_lower_bound_only() {
        let policy = RecoveryPolicy {
            memory_buffer_percentage: 10,
            ..Default::default()
        };
        let q = translate(&t3_large(), &policy).unwrap();
        assert_eq!(q.memory_min_mib, 7372); // 8192 * 0.9, integer math
        assert_eq!(q.memory_max_mib, 16384);
    }

    #[test]
    fn non_burstable_original_excludes_burstable() {
        let shape = HardwareShape {
            id: "m5.large".to_string(),
            ..t3_large()
        };
        let q = translate(&shape, &RecoveryPolicy::default()).unwrap();
        assert!(!q.include_burstable);
    }

    #[test]
    fn flex_original_includes_burstable() {
        let shape = HardwareShape {
            id: "m7i-flex.large".to_string(),
            ..t3_large()
        };
        let q = translate(&shape, &RecoveryPolicy::default()).unwrap();
        assert!(q.include_burstable);
    }

    #[test]
    fn accelerator_families_short_circuit() {
        for id in ["g4dn.xlarge", "p3.2xlarge", "f1.2xlarge", "inf1.xlarge", "trn1.2xlarge"] {
            let shape = HardwareShape {
                id: id.to_string(),
                ..t3_large()
            };
            assert!(translate(&shape, &RecoveryPolicy::default()).is_none(), "{id}");
        }
    }

    #[test]
    fn local_storage_floor_applies_below_100_percent_buffer() {
        let shape = HardwareShape {
            id: "m5d.large".to_string(),
            local_storage_gb: 75,
            ..t3_large()
        };
        let policy = RecoveryPolicy {
            local_storage_buffer_percentage: 20,
            ..Default::default()
        };
        let q = translate(&shape, &policy).unwrap();
        assert_eq!(q.min_local_storage_gb, Some(60));

        let disabled = RecoveryPolicy {
            local_storage_buffer_percentage: 100,
            ..Default::default()
        };
        let q = translate(&shape, &disabled).unwrap();
        assert_eq!(q.min_local_storage_gb, None);
    }

    #[test]
    fn policy_passthrough_fields() {
        let policy = RecoveryPolicy {
            bare_metal: BareMetalMode::Excluded,
            excluded_instance_types: vec!["t2.*".to_string()],
            ..Default::default()
        };
        let q = translate(&t3_large(), &policy).unwrap();
        assert_eq!(q.bare_metal, BareMetalMode::Excluded);
        assert_eq!(q.excluded_shapes, vec!["t2.*"]);
    }
}
