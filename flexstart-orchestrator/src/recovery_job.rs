use std::sync::Arc;
use std::time::{Duration, Instant};

use flexstart_common::bus::StartFailureEvent;
use flexstart_common::{
    InstanceRecoveryResult, RecoveryAction, RecoveryError, RecoveryStatus, TAG_ORIGINAL_TYPE,
};
use flexstart_providers::{
    AdmitOutcome, DedupStore, InstanceDirectory, PricingCatalog, ShapeCatalog,
};

use crate::candidates;
use crate::policy::PolicyResolver;
use crate::pricing::PriceCache;
use crate::requirements;

/// Repeated notifications for the same instance inside this window are
/// duplicates, not new events.
pub const DEDUP_WINDOW: Duration = Duration::from_secs(300);

/// Wall-clock budget for one batch. Instances not reached before it runs out
/// are reported as not attempted so a later delivery can pick them up.
pub const DEFAULT_BATCH_BUDGET: Duration = Duration::from_secs(270);

/// The recovery decision engine: tries the original shape, then walks the
/// price-ordered candidate list, mutating the instance's shape and attempting
/// start, short-circuiting on first success.
pub struct RecoveryEngine {
    directory: Arc<dyn InstanceDirectory>,
    catalog: Arc<dyn ShapeCatalog>,
    pricing: Arc<dyn PricingCatalog>,
    dedup: Arc<dyn DedupStore>,
    resolver: PolicyResolver,
    region: String,
    budget: Duration,
}

impl RecoveryEngine {
    pub fn new(
        directory: Arc<dyn InstanceDirectory>,
        catalog: Arc<dyn ShapeCatalog>,
        pricing: Arc<dyn PricingCatalog>,
        dedup: Arc<dyn DedupStore>,
        resolver: PolicyResolver,
        region: String,
    ) -> Self {
        Self {
            directory,
            catalog,
            pricing,
            dedup,
            resolver,
            region,
            budget: DEFAULT_BATCH_BUDGET,
        }
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Process a failure notification carrying a batch of instance ids,
    /// strictly sequentially. One instance's failure never aborts its
    /// siblings; only the shared budget does.
    pub async fn process_batch(&self, event: &StartFailureEvent) -> Vec<InstanceRecoveryResult> {
        let deadline = Instant::now() + self.budget;
        let mut results = Vec::with_capacity(event.instance_ids.len());
        // Sibling instances often share a family; price lookups are memoized
        // across the whole batch.
        let mut prices = PriceCache::new(self.pricing.as_ref(), &self.region);

        for instance_id in &event.instance_ids {
            if Instant::now() >= deadline {
                eprintln!(
                    "⏳ [recovery] batch budget exhausted before instance {instance_id}, deferring"
                );
                results.push(InstanceRecoveryResult::not_attempted(instance_id));
                continue;
            }

            match self
                .dedup
                .conditional_put(instance_id, event.event_time, DEDUP_WINDOW)
                .await
            {
                Ok(AdmitOutcome::Admitted) => {}
                Ok(AdmitOutcome::Duplicate) => {
                    println!("🔁 [recovery] duplicate event for {instance_id}, skipping");
                    results.push(InstanceRecoveryResult::skipped(
                        instance_id,
                        "duplicate event within dedup window",
                    ));
                    continue;
                }
                Err(e) => {
                    // Fail closed: without the gate we cannot rule out a
                    // concurrent recovery of the same instance.
                    eprintln!("❌ [recovery] dedup store error for {instance_id}: {e}");
                    results.push(InstanceRecoveryResult::failed(
                        instance_id,
                        &format!("idempotency store error: {e}"),
                    ));
                    continue;
                }
            }

            results.push(self.recover_instance(instance_id, &mut prices).await);
        }

        results
    }

    async fn recover_instance(
        &self,
        instance_id: &str,
        prices: &mut PriceCache<'_>,
    ) -> InstanceRecoveryResult {
        match self.try_recover(instance_id, prices).await {
            Ok(result) => result,
            Err(e) => {
                eprintln!("❌ [recovery] instance {instance_id}: {e}");
                InstanceRecoveryResult::failed(instance_id, &e.to_string())
            }
        }
    }

    async fn try_recover(
        &self,
        instance_id: &str,
        prices: &mut PriceCache<'_>,
    ) -> Result<InstanceRecoveryResult, RecoveryError> {
        let instance = self.directory.describe(instance_id).await?;
        if !instance.is_flexible() {
            println!("⏭️ [recovery] instance {instance_id} is not opted in, skipping");
            return Ok(InstanceRecoveryResult::skipped(
                instance_id,
                "instance not opted in (Flexible != true)",
            ));
        }

        let original = self.catalog.describe_shape(&instance.shape_id).await?;

        // Durable marker before any mutation attempt. Idempotent: writing
        // the same value twice is harmless.
        self.directory
            .write_tag(instance_id, TAG_ORIGINAL_TYPE, &original.id)
            .await?;

        println!(
            "▶️ [recovery] attempting to start {instance_id} with current shape {}",
            original.id
        );
        match self.directory.start(instance_id).await {
            Ok(()) => {
                println!("✅ [recovery] started {instance_id} on its original shape");
                return Ok(InstanceRecoveryResult {
                    instance_id: instance_id.to_string(),
                    status: RecoveryStatus::Started,
                    action: RecoveryAction::Restart,
                    old_type: None,
                    new_type: None,
                    detail: None,
                });
            }
            Err(e) if e.is_capacity() => {
                println!(
                    "📉 [recovery] shape {} has no capacity, enumerating alternatives",
                    original.id
                );
            }
            // Not the targeted failure mode; do not try alternates.
            Err(e) => return Err(e.into()),
        }

        let policy = self.resolver.resolve(instance.policy_ref()).await;
        let Some(query) = requirements::translate(&original, &policy) else {
            return Ok(InstanceRecoveryResult::failed(
                instance_id,
                &format!("family of {} is not substitutable", original.id),
            ));
        };

        let ranked =
            candidates::enumerate(self.catalog.as_ref(), prices, &query, &original).await?;
        if ranked.is_empty() {
            return Ok(InstanceRecoveryResult::failed(
                instance_id,
                "no compatible shapes available",
            ));
        }
        println!(
            "🧭 [recovery] candidates for {instance_id}: {:?}",
            ranked
                .iter()
                .map(|(s, p)| format!("{} ({p})", s.id))
                .collect::<Vec<_>>()
        );

        for (shape, _) in &ranked {
            if shape.id == original.id {
                continue; // already tried first
            }
            println!(
                "🔧 [recovery] modifying {instance_id} shape to {}",
                shape.id
            );
            if let Err(e) = self.directory.modify_shape(instance_id, &shape.id).await {
                // The mutation itself may be transiently rejected; keep going.
                eprintln!(
                    "⚠️ [recovery] modify to {} failed for {instance_id}: {e}",
                    shape.id
                );
                continue;
            }
            match self.directory.start(instance_id).await {
                Ok(()) => {
                    println!(
                        "✅ [recovery] started {instance_id} on fallback shape {}",
                        shape.id
                    );
                    return Ok(InstanceRecoveryResult {
                        instance_id: instance_id.to_string(),
                        status: RecoveryStatus::Started,
                        action: RecoveryAction::TypeModified,
                        old_type: Some(original.id.clone()),
                        new_type: Some(shape.id.clone()),
                        detail: None,
                    });
                }
                Err(e) => {
                    println!(
                        "⚠️ [recovery] start with shape {} failed for {instance_id}: {e}",
                        shape.id
                    );
                    continue;
                }
            }
        }

        eprintln!("❌ [recovery] exhausted all compatible shapes for {instance_id}");
        Ok(InstanceRecoveryResult::failed(
            instance_id,
            "exhausted all compatible shapes",
        ))
    }
}
