use std::sync::Arc;
use std::time::Duration;

use flexstart_common::{
    Instance, LifecycleState, ProviderError, RecoveryError, TAG_ORIGINAL_TYPE,
};
use flexstart_providers::{InstanceDirectory, ShapeCatalog};

/// Fixed interval between stop-state polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);
/// 30 attempts at 10s apart bounds the wait at ~5 minutes.
pub const MAX_POLL_ATTEMPTS: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Shape restored to the recorded original; marker removed.
    Reverted { from: String, to: String },
    /// Shapes already matched; the stale marker was cleared.
    MarkerCleared,
    /// Nothing to do (not opted in, no marker, or instance terminated).
    NoAction(&'static str),
}

enum WaitResult {
    Stopped(Instance),
    Terminated,
    Invalid(LifecycleState),
    TimedOut(LifecycleState),
}

/// Restores an instance's original shape once it is safely stopped, driven
/// by stop-lifecycle notifications.
pub struct Reconciler {
    directory: Arc<dyn InstanceDirectory>,
    catalog: Arc<dyn ShapeCatalog>,
    poll_interval: Duration,
    max_attempts: u32,
}

impl Reconciler {
    pub fn new(directory: Arc<dyn InstanceDirectory>, catalog: Arc<dyn ShapeCatalog>) -> Self {
        Self {
            directory,
            catalog,
            poll_interval: POLL_INTERVAL,
            max_attempts: MAX_POLL_ATTEMPTS,
        }
    }

    pub fn with_polling(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.poll_interval = interval;
        self.max_attempts = max_attempts;
        self
    }

    pub async fn reconcile(&self, instance_id: &str) -> Result<ReconcileOutcome, RecoveryError> {
        let instance = self.directory.describe(instance_id).await?;
        if !instance.is_flexible() {
            println!("⏭️ [reconcile] instance {instance_id} is not opted in");
            return Ok(ReconcileOutcome::NoAction("not opted in"));
        }
        let Some(recorded) = instance.original_type_marker().map(str::to_string) else {
            println!("⏭️ [reconcile] instance {instance_id} carries no original-type marker");
            return Ok(ReconcileOutcome::NoAction("no marker"));
        };

        let instance = match self.wait_for_stopped(instance_id).await? {
            WaitResult::Stopped(instance) => instance,
            WaitResult::Terminated => {
                // Marker is moot on a terminated instance; leave it alone.
                println!("⏭️ [reconcile] instance {instance_id} is terminated, no action");
                return Ok(ReconcileOutcome::NoAction("terminated"));
            }
            WaitResult::Invalid(state) => {
                return Err(RecoveryError::Validation(format!(
                    "instance {instance_id} in state {} is unsafe to mutate",
                    state.as_str()
                )));
            }
            WaitResult::TimedOut(state) => {
                // Marker stays in place so a future notification can retry.
                return Err(RecoveryError::Timeout(format!(
                    "instance {instance_id} still {} after {} attempts",
                    state.as_str(),
                    self.max_attempts
                )));
            }
        };

        // Reject a marker naming a shape the catalog does not know, without
        // deleting it: silently losing recovery state is worse than retrying.
        if let Err(e) = self.catalog.describe_shape(&recorded).await {
            return match e {
                ProviderError::NotFound(_) => Err(RecoveryError::Validation(format!(
                    "marker on {instance_id} records unknown shape {recorded}"
                ))),
                other => Err(other.into()),
            };
        }

        if instance.shape_id == recorded {
            println!(
                "🧹 [reconcile] instance {instance_id} already on {recorded}, clearing stale marker"
            );
            self.directory
                .delete_tag(instance_id, TAG_ORIGINAL_TYPE)
                .await?;
            return Ok(ReconcileOutcome::MarkerCleared);
        }

        println!(
            "↩️ [reconcile] resetting instance {instance_id} shape {} -> {recorded}",
            instance.shape_id
        );
        self.directory.modify_shape(instance_id, &recorded).await?;
        // If this delete fails the marker is stale but harmless: the next
        // reconciliation sees matching shapes and merely clears it.
        self.directory
            .delete_tag(instance_id, TAG_ORIGINAL_TYPE)
            .await?;
        println!("✅ [reconcile] instance {instance_id} restored to {recorded}");

        Ok(ReconcileOutcome::Reverted {
            from: instance.shape_id,
            to: recorded,
        })
    }

    async fn wait_for_stopped(&self, instance_id: &str) -> Result<WaitResult, RecoveryError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let instance = self.directory.describe(instance_id).await?;
            println!(
                "⏱️ [reconcile] state check {attempt}/{} for {instance_id}: {}",
                self.max_attempts,
                instance.state.as_str()
            );
            match instance.state {
                LifecycleState::Stopped => return Ok(WaitResult::Stopped(instance)),
                LifecycleState::Terminated => return Ok(WaitResult::Terminated),
                LifecycleState::ShuttingDown | LifecycleState::Pending => {
                    return Ok(WaitResult::Invalid(instance.state))
                }
                LifecycleState::Stopping => {}
                other => {
                    eprintln!(
                        "⚠️ [reconcile] instance {instance_id} in unexpected state {}",
                        other.as_str()
                    );
                }
            }
            if attempt >= self.max_attempts {
                return Ok(WaitResult::TimedOut(instance.state));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flexstart_common::{HardwareShape, TAG_FLEXIBLE};
    use flexstart_providers::mock::MockCloud;
    use std::collections::HashMap;

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

    fn recovered_instance(id: &str, current: &str, marker: &str) -> Instance {
        let mut tags = HashMap::new();
        tags.insert(TAG_FLEXIBLE.to_string(), "true".to_string());
        tags.insert(TAG_ORIGINAL_TYPE.to_string(), marker.to_string());
        Instance {
            id: id.to_string(),
            shape_id: current.to_string(),
            state: LifecycleState::Stopped,
            tags,
        }
    }

    fn reconciler(cloud: &Arc<MockCloud>) -> Reconciler {
        Reconciler::new(cloud.clone(), cloud.clone())
            .with_polling(Duration::from_millis(0), 3)
    }

    fn seeded() -> Arc<MockCloud> {
        let cloud = Arc::new(MockCloud::new());
        cloud.add_shape(shape("t3.large"), Some(0.0832));
        cloud.add_shape(shape("t3a.large"), Some(0.0752));
        cloud
    }

    #[tokio::test]
    async fn reverts_shape_and_clears_marker() {
        let cloud = seeded();
        cloud.add_instance(recovered_instance("i-1", "t3a.large", "t3.large"));

        let outcome = reconciler(&cloud).reconcile("i-1").await.unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Reverted {
                from: "t3a.large".to_string(),
                to: "t3.large".to_string()
            }
        );
        let inst = cloud.instance("i-1").unwrap();
        assert_eq!(inst.shape_id, "t3.large");
        assert!(inst.tags.get(TAG_ORIGINAL_TYPE).is_none());

        // End state is idempotent: a second notification is a no-op.
        let again = reconciler(&cloud).reconcile("i-1").await.unwrap();
        assert_eq!(again, ReconcileOutcome::NoAction("no marker"));
        assert_eq!(cloud.modify_calls().len(), 1);
    }

    #[tokio::test]
    async fn waits_through_stopping_before_mutating() {
        let cloud = seeded();
        cloud.add_instance(recovered_instance("i-1", "t3a.large", "t3.large"));
        cloud.push_states(
            "i-1",
            &[
                LifecycleState::Stopped, // initial eligibility describe
                LifecycleState::Stopping,
                LifecycleState::Stopping,
                LifecycleState::Stopped,
            ],
        );

        let outcome = reconciler(&cloud).reconcile("i-1").await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Reverted { .. }));
    }

    #[tokio::test]
    async fn terminated_instance_is_left_alone() {
        let cloud = seeded();
        let mut inst = recovered_instance("i-1", "t3a.large", "t3.large");
        inst.state = LifecycleState::Terminated;
        cloud.add_instance(inst);

        let outcome = reconciler(&cloud).reconcile("i-1").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::NoAction("terminated"));
        assert!(cloud.modify_calls().is_empty());
        // Marker survives; it is moot but not ours to destroy here.
        assert!(cloud
            .instance("i-1")
            .unwrap()
            .tags
            .contains_key(TAG_ORIGINAL_TYPE));
    }

    #[tokio::test]
    async fn shutting_down_is_unsafe_to_mutate() {
        let cloud = seeded();
        let mut inst = recovered_instance("i-1", "t3a.large", "t3.large");
        inst.state = LifecycleState::ShuttingDown;
        cloud.add_instance(inst);

        let err = reconciler(&cloud).reconcile("i-1").await.unwrap_err();
        assert!(matches!(err, RecoveryError::Validation(_)));
        assert!(cloud.modify_calls().is_empty());
    }

    #[tokio::test]
    async fn poll_exhaustion_times_out_and_keeps_marker() {
        let cloud = seeded();
        let mut inst = recovered_instance("i-1", "t3a.large", "t3.large");
        inst.state = LifecycleState::Stopping;
        cloud.add_instance(inst);

        let err = reconciler(&cloud).reconcile("i-1").await.unwrap_err();
        assert!(matches!(err, RecoveryError::Timeout(_)));
        assert!(cloud
            .instance("i-1")
            .unwrap()
            .tags
            .contains_key(TAG_ORIGINAL_TYPE));
    }

    #[tokio::test]
    async fn unknown_marker_shape_is_rejected_without_deletion() {
        let cloud = seeded();
        cloud.add_instance(recovered_instance("i-1", "t3a.large", "no-such-shape"));

        let err = reconciler(&cloud).reconcile("i-1").await.unwrap_err();
        assert!(matches!(err, RecoveryError::Validation(_)));
        let inst = cloud.instance("i-1").unwrap();
        assert_eq!(inst.shape_id, "t3a.large");
        assert!(inst.tags.contains_key(TAG_ORIGINAL_TYPE));
    }

    #[tokio::test]
    async fn matching_shapes_just_clear_the_marker() {
        let cloud = seeded();
        cloud.add_instance(recovered_instance("i-1", "t3.large", "t3.large"));

        let outcome = reconciler(&cloud).reconcile("i-1").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::MarkerCleared);
        assert!(cloud.modify_calls().is_empty());
        assert!(cloud
            .instance("i-1")
            .unwrap()
            .tags
            .get(TAG_ORIGINAL_TYPE)
            .is_none());
    }

    #[tokio::test]
    async fn opted_out_instance_is_untouched() {
        let cloud = seeded();
        let mut inst = recovered_instance("i-1", "t3a.large", "t3.large");
        inst.tags.remove(TAG_FLEXIBLE);
        cloud.add_instance(inst);

        let outcome = reconciler(&cloud).reconcile("i-1").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::NoAction("not opted in"));
        assert_eq!(cloud.instance("i-1").unwrap().shape_id, "t3a.large");
    }
}
