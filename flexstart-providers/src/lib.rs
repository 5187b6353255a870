use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use flexstart_common::{CompatibilityQuery, HardwareShape, Instance, ProviderError};

pub mod mock;
pub mod postgres;
pub mod rest;

/// Instance read/mutate surface. Implementations must surface capacity
/// exhaustion as `ProviderError::CapacityUnavailable`, distinguishable from
/// all other failures.
#[async_trait]
pub trait InstanceDirectory: Send + Sync {
    /// Current instance snapshot, including its full tag set.
    async fn describe(&self, instance_id: &str) -> Result<Instance, ProviderError>;

    async fn start(&self, instance_id: &str) -> Result<(), ProviderError>;

    async fn modify_shape(&self, instance_id: &str, shape_id: &str) -> Result<(), ProviderError>;

    /// Idempotent: writing the same key/value twice is harmless.
    async fn write_tag(
        &self,
        instance_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), ProviderError>;

    async fn delete_tag(&self, instance_id: &str, key: &str) -> Result<(), ProviderError>;
}

#[async_trait]
pub trait ShapeCatalog: Send + Sync {
    async fn describe_shape(&self, shape_id: &str) -> Result<HardwareShape, ProviderError>;

    /// Execute a compatibility query. Order of results is the catalog order;
    /// the enumerator relies on it for stable price ties.
    async fn find_compatible(
        &self,
        query: &CompatibilityQuery,
    ) -> Result<Vec<HardwareShape>, ProviderError>;
}

/// On-demand pricing lookups. May be unavailable (network/region
/// restrictions); callers degrade to an unknown price, never crash.
#[async_trait]
pub trait PricingCatalog: Send + Sync {
    async fn price_of(&self, shape_id: &str, region: &str) -> Result<f64, ProviderError>;
}

#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Fetch a named policy document. `Ok(None)` means not found.
    async fn get(&self, name: &str) -> Result<Option<String>, ProviderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitOutcome {
    Admitted,
    Duplicate,
}

/// Durable idempotency store shared by all invocations. The conditional put
/// is the sole coordination point between overlapping deliveries.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Insert a dedup record unless an unexpired one already exists for the
    /// key. Must be atomic with respect to concurrent callers.
    async fn conditional_put(
        &self,
        key: &str,
        event_time: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<AdmitOutcome, ProviderError>;
}
