use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use flexstart_common::{
    BareMetalMode, CompatibilityQuery, HardwareShape, Instance, LifecycleState, ProviderError,
};

use crate::{AdmitOutcome, DedupStore, InstanceDirectory, PolicyStore, PricingCatalog, ShapeCatalog};

/// In-memory cloud used by tests and local bring-up. Implements every
/// provider contract behind a single mutex so scenarios stay deterministic.
pub struct MockCloud {
    inner: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    instances: HashMap<String, Instance>,
    /// Catalog order is preserved; the enumerator's stable sort depends on it.
    shapes: Vec<HardwareShape>,
    prices: HashMap<String, f64>,
    policies: HashMap<String, String>,
    /// Shape ids whose start attempts fail with a capacity error.
    capacity_blocked: HashSet<String>,
    /// Shape ids whose start attempts fail with a non-capacity error.
    start_broken: HashSet<String>,
    /// Shape ids whose modify attempts are rejected outright.
    modify_rejected: HashSet<String>,
    /// Scripted lifecycle states returned (and consumed) by describe().
    state_sequences: HashMap<String, VecDeque<LifecycleState>>,
    pricing_down: bool,
    /// None = healthy; Some(true) = recoverable failure; Some(false) = hard.
    catalog_failure: Option<bool>,
    // Call accounting for assertions.
    start_calls: Vec<(String, String)>,
    modify_calls: Vec<(String, String)>,
    find_calls: usize,
    price_calls: usize,
}

impl Default for MockCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCloud {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MockState::default()),
        }
    }

    pub fn add_instance(&self, instance: Instance) {
        let mut s = self.inner.lock().unwrap();
        s.instances.insert(instance.id.clone(), instance);
    }

    pub fn add_shape(&self, shape: HardwareShape, price: Option<f64>) {
        let mut s = self.inner.lock().unwrap();
        if let Some(p) = price {
            s.prices.insert(shape.id.clone(), p);
        }
        s.shapes.push(shape);
    }

    pub fn set_policy(&self, name: &str, document: &str) {
        let mut s = self.inner.lock().unwrap();
        s.policies.insert(name.to_string(), document.to_string());
    }

    pub fn block_capacity(&self, shape_id: &str) {
        let mut s = self.inner.lock().unwrap();
        s.capacity_blocked.insert(shape_id.to_string());
    }

    pub fn unblock_capacity(&self, shape_id: &str) {
        let mut s = self.inner.lock().unwrap();
        s.capacity_blocked.remove(shape_id);
    }

    /// Make start attempts on this shape fail with a non-capacity error.
    pub fn break_start(&self, shape_id: &str) {
        let mut s = self.inner.lock().unwrap();
        s.start_broken.insert(shape_id.to_string());
    }

    pub fn reject_modify_to(&self, shape_id: &str) {
        let mut s = self.inner.lock().unwrap();
        s.modify_rejected.insert(shape_id.to_string());
    }

    pub fn set_pricing_down(&self, down: bool) {
        self.inner.lock().unwrap().pricing_down = down;
    }

    /// Make find_compatible fail: `recoverable = true` for a transient error,
    /// `false` for a hard one.
    pub fn set_catalog_failure(&self, failure: Option<bool>) {
        self.inner.lock().unwrap().catalog_failure = failure;
    }

    /// Script the lifecycle states the next describe() calls will observe,
    /// in order. Once drained, describe() reports the stored state.
    pub fn push_states(&self, instance_id: &str, states: &[LifecycleState]) {
        let mut s = self.inner.lock().unwrap();
        s.state_sequences
            .entry(instance_id.to_string())
            .or_default()
            .extend(states.iter().copied());
    }

    pub fn instance(&self, instance_id: &str) -> Option<Instance> {
        self.inner.lock().unwrap().instances.get(instance_id).cloned()
    }

    pub fn start_calls(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().start_calls.clone()
    }

    pub fn modify_calls(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().modify_calls.clone()
    }

    pub fn find_calls(&self) -> usize {
        self.inner.lock().unwrap().find_calls
    }

    pub fn price_calls(&self) -> usize {
        self.inner.lock().unwrap().price_calls
    }
}

#[async_trait]
impl InstanceDirectory for MockCloud {
    async fn describe(&self, instance_id: &str) -> Result<Instance, ProviderError> {
        let mut s = self.inner.lock().unwrap();
        let scripted = s
            .state_sequences
            .get_mut(instance_id)
            .and_then(VecDeque::pop_front);
        let instance = s
            .instances
            .get(instance_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("instance {instance_id}")))?;
        match scripted {
            Some(state) => Ok(Instance { state, ..instance }),
            None => Ok(instance),
        }
    }

    async fn start(&self, instance_id: &str) -> Result<(), ProviderError> {
        let mut s = self.inner.lock().unwrap();
        let shape = s
            .instances
            .get(instance_id)
            .map(|i| i.shape_id.clone())
            .ok_or_else(|| ProviderError::NotFound(format!("instance {instance_id}")))?;
        s.start_calls.push((instance_id.to_string(), shape.clone()));
        if s.capacity_blocked.contains(&shape) {
            return Err(ProviderError::CapacityUnavailable { shape });
        }
        if s.start_broken.contains(&shape) {
            return Err(ProviderError::Api(format!("start failed for {shape}")));
        }
        if let Some(i) = s.instances.get_mut(instance_id) {
            i.state = LifecycleState::Running;
        }
        Ok(())
    }

    async fn modify_shape(&self, instance_id: &str, shape_id: &str) -> Result<(), ProviderError> {
        let mut s = self.inner.lock().unwrap();
        s.modify_calls
            .push((instance_id.to_string(), shape_id.to_string()));
        if s.modify_rejected.contains(shape_id) {
            return Err(ProviderError::Api(format!(
                "modify to {shape_id} rejected"
            )));
        }
        match s.instances.get_mut(instance_id) {
            Some(i) => {
                i.shape_id = shape_id.to_string();
                Ok(())
            }
            None => Err(ProviderError::NotFound(format!("instance {instance_id}"))),
        }
    }

    async fn write_tag(
        &self,
        instance_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), ProviderError> {
        let mut s = self.inner.lock().unwrap();
        match s.instances.get_mut(instance_id) {
            Some(i) => {
                i.tags.insert(key.to_string(), value.to_string());
                Ok(())
            }
            None => Err(ProviderError::NotFound(format!("instance {instance_id}"))),
        }
    }

    async fn delete_tag(&self, instance_id: &str, key: &str) -> Result<(), ProviderError> {
        let mut s = self.inner.lock().unwrap();
        match s.instances.get_mut(instance_id) {
            Some(i) => {
                i.tags.remove(key);
                Ok(())
            }
            None => Err(ProviderError::NotFound(format!("instance {instance_id}"))),
        }
    }
}

#[async_trait]
impl ShapeCatalog for MockCloud {
    async fn describe_shape(&self, shape_id: &str) -> Result<HardwareShape, ProviderError> {
        let s = self.inner.lock().unwrap();
        s.shapes
            .iter()
            .find(|sh| sh.id == shape_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("shape {shape_id}")))
    }

    async fn find_compatible(
        &self,
        query: &CompatibilityQuery,
    ) -> Result<Vec<HardwareShape>, ProviderError> {
        let mut s = self.inner.lock().unwrap();
        s.find_calls += 1;
        match s.catalog_failure {
            Some(true) => {
                return Err(ProviderError::Unavailable("catalog throttled".into()))
            }
            Some(false) => return Err(ProviderError::Api("catalog broken".into())),
            None => {}
        }
        let matches = s
            .shapes
            .iter()
            .filter(|sh| {
                sh.architecture == query.architecture
                    && sh.vcpus >= query.vcpu_min
                    && sh.vcpus <= query.vcpu_max
                    && sh.memory_mib >= query.memory_min_mib
                    && sh.memory_mib <= query.memory_max_mib
                    && (query.include_burstable || !sh.is_burstable())
                    && (!query.current_generation_only || sh.current_generation)
                    && match query.bare_metal {
                        BareMetalMode::Included => true,
                        BareMetalMode::Excluded => !sh.bare_metal,
                        BareMetalMode::Required => sh.bare_metal,
                    }
                    && query
                        .min_local_storage_gb
                        .map(|min| sh.local_storage_gb >= min)
                        .unwrap_or(true)
            })
            .cloned()
            .collect();
        Ok(matches)
    }
}

#[async_trait]
impl PricingCatalog for MockCloud {
    async fn price_of(&self, shape_id: &str, _region: &str) -> Result<f64, ProviderError> {
        let mut s = self.inner.lock().unwrap();
        s.price_calls += 1;
        if s.pricing_down {
            return Err(ProviderError::Unavailable("pricing catalog down".into()));
        }
        s.prices
            .get(shape_id)
            .copied()
            .ok_or_else(|| ProviderError::NotFound(format!("price for {shape_id}")))
    }
}

#[async_trait]
impl PolicyStore for MockCloud {
    async fn get(&self, name: &str) -> Result<Option<String>, ProviderError> {
        let s = self.inner.lock().unwrap();
        Ok(s.policies.get(name).cloned())
    }
}

/// In-memory dedup store with the same strict conditional-put semantics as
/// the Postgres implementation.
#[derive(Default)]
pub struct MockDedupStore {
    records: Mutex<HashMap<String, DateTime<Utc>>>,
    fail: Mutex<bool>,
}

impl MockDedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.fail.lock().unwrap() = failing;
    }
}

#[async_trait]
impl DedupStore for MockDedupStore {
    async fn conditional_put(
        &self,
        key: &str,
        _event_time: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<AdmitOutcome, ProviderError> {
        if *self.fail.lock().unwrap() {
            return Err(ProviderError::Unavailable("dedup store down".into()));
        }
        let now = Utc::now();
        let mut records = self.records.lock().unwrap();
        if let Some(expires_at) = records.get(key) {
            if *expires_at > now {
                return Ok(AdmitOutcome::Duplicate);
            }
        }
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| ProviderError::Api(format!("ttl out of range: {e}")))?;
        records.insert(key.to_string(), now + ttl);
        Ok(AdmitOutcome::Admitted)
    }
}
