use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -----------------------------------------------------------------------------
// Channels
// -----------------------------------------------------------------------------

pub const CHANNEL_RECOVERY_EVENTS: &str = "recovery_events";

// -----------------------------------------------------------------------------
// Events (EVT:*)
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryEventType {
    /// A StartInstances call failed with a capacity error.
    #[serde(rename = "EVT:START_FAILURE")]
    StartFailure,
    /// An instance entered its stop lifecycle.
    #[serde(rename = "EVT:INSTANCE_STOPPED")]
    InstanceStopped,
}

impl RecoveryEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryEventType::StartFailure => "EVT:START_FAILURE",
            RecoveryEventType::InstanceStopped => "EVT:INSTANCE_STOPPED",
        }
    }
}

/// Notification that one or more instances failed to start for lack of
/// capacity. Delivery is at-least-once; the deduplication gate absorbs
/// retries.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StartFailureEvent {
    pub instance_ids: Vec<String>,
    pub event_time: DateTime<Utc>,
    pub correlation_id: Option<String>,
}

/// Notification that a single instance is stopping/stopped.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InstanceStoppedEvent {
    pub instance_id: String,
    pub correlation_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecoveryEventEnvelope {
    pub event_id: Uuid,
    #[serde(rename = "type")]
    pub event_type: RecoveryEventType,
    pub occurred_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub source: String,
}

impl RecoveryEventEnvelope {
    pub fn new(event_type: RecoveryEventType, payload: serde_json::Value, source: &str) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            occurred_at: Utc::now(),
            payload,
            source: source.to_string(),
        }
    }
}
