use crate::logger;
use crate::reconciliation::{ReconcileOutcome, Reconciler};
use crate::recovery_job::RecoveryEngine;
use flexstart_common::bus::StartFailureEvent;
use flexstart_common::{InstanceRecoveryResult, RecoveryStatus};
use serde_json::json;
use sqlx::{Pool, Postgres};
use std::time::Instant;

/// Handles a batch start-failure notification end to end: recover each
/// instance, then persist one action log row per outcome.
pub async fn process_start_failure(
    db: Pool<Postgres>,
    engine: &RecoveryEngine,
    event: StartFailureEvent,
) -> Vec<InstanceRecoveryResult> {
    println!(
        "📩 [services] start-failure batch of {} instance(s) (correlation: {:?})",
        event.instance_ids.len(),
        event.correlation_id
    );

    let started = Instant::now();
    let results = engine.process_batch(&event).await;

    for result in &results {
        let status = match result.status {
            RecoveryStatus::Started => "success",
            RecoveryStatus::Skipped | RecoveryStatus::NotAttempted => "skipped",
            RecoveryStatus::Failed => "failed",
        };
        let metadata = json!({
            "action": result.action,
            "oldType": result.old_type,
            "newType": result.new_type,
            "correlationId": event.correlation_id,
        });
        let log = logger::log_event_with_metadata(
            &db,
            "INSTANCE_RECOVERY",
            status,
            &result.instance_id,
            result.detail.as_deref(),
            Some(metadata),
        )
        .await;
        match log {
            Ok(log_id) => {
                let _ = logger::log_event_complete(
                    &db,
                    log_id,
                    status,
                    started.elapsed().as_millis() as i32,
                    result.detail.as_deref(),
                )
                .await;
            }
            Err(e) => eprintln!(
                "⚠️ [services] failed to record recovery log for {}: {}",
                result.instance_id, e
            ),
        }
    }

    results
}

/// Overall status of one invocation: "ok" when every instance started or was
/// deliberately skipped, "partial" when any failed or went unattempted.
pub fn batch_status(results: &[InstanceRecoveryResult]) -> &'static str {
    let clean = results.iter().all(|r| {
        matches!(
            r.status,
            RecoveryStatus::Started | RecoveryStatus::Skipped
        )
    });
    if clean {
        "ok"
    } else {
        "partial"
    }
}

/// Handles an instance-stopped notification: restore the original shape
/// if a recovery marker is present.
pub async fn process_instance_stopped(
    db: Pool<Postgres>,
    reconciler: &Reconciler,
    instance_id: String,
    correlation_id: Option<String>,
) {
    println!(
        "📩 [services] instance-stopped for {instance_id} (correlation: {:?})",
        correlation_id
    );

    let started = Instant::now();
    let (status, detail, error) = match reconciler.reconcile(&instance_id).await {
        Ok(ReconcileOutcome::Reverted { from, to }) => (
            "success",
            json!({"action": "reverted", "from": from, "to": to}),
            None,
        ),
        Ok(ReconcileOutcome::MarkerCleared) => {
            ("success", json!({"action": "marker_cleared"}), None)
        }
        Ok(ReconcileOutcome::NoAction(reason)) => {
            ("skipped", json!({"action": "none", "reason": reason}), None)
        }
        Err(e) => ("failed", json!({"action": "none"}), Some(e.to_string())),
    };

    let log = logger::log_event_with_metadata(
        &db,
        "TYPE_RESET",
        status,
        &instance_id,
        error.as_deref(),
        Some(detail),
    )
    .await;
    match log {
        Ok(log_id) => {
            let _ = logger::log_event_complete(
                &db,
                log_id,
                status,
                started.elapsed().as_millis() as i32,
                error.as_deref(),
            )
            .await;
        }
        Err(e) => eprintln!(
            "⚠️ [services] failed to record reset log for {instance_id}: {}",
            e
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flexstart_common::{RecoveryAction, RecoveryStatus};

    fn started(id: &str) -> InstanceRecoveryResult {
        InstanceRecoveryResult {
            instance_id: id.to_string(),
            status: RecoveryStatus::Started,
            action: RecoveryAction::Restart,
            old_type: None,
            new_type: None,
            detail: None,
        }
    }

    #[test]
    fn batch_status_is_ok_for_started_and_skipped() {
        let results = vec![
            started("i-1"),
            InstanceRecoveryResult::skipped("i-2", "duplicate event within dedup window"),
        ];
        assert_eq!(batch_status(&results), "ok");
        assert_eq!(batch_status(&[]), "ok");
    }

    #[test]
    fn batch_status_is_partial_on_any_failure_or_deferral() {
        let results = vec![started("i-1"), InstanceRecoveryResult::failed("i-2", "boom")];
        assert_eq!(batch_status(&results), "partial");

        let deferred = vec![InstanceRecoveryResult::not_attempted("i-3")];
        assert_eq!(batch_status(&deferred), "partial");
    }
}
