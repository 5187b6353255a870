use std::collections::HashMap;

use flexstart_providers::PricingCatalog;

/// On-demand price of a shape. Lookup and parse failures become `Unknown`
/// rather than errors: such shapes stay available as a last resort, sorting
/// after every known price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Price {
    PerHour(f64),
    Unknown,
}

impl Price {
    pub fn is_known(&self) -> bool {
        matches!(self, Price::PerHour(_))
    }

    /// Ascending sort key; `Unknown` sinks to the end.
    pub fn sort_key(&self) -> f64 {
        match self {
            Price::PerHour(p) => *p,
            Price::Unknown => f64::INFINITY,
        }
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Price::PerHour(p) => write!(f, "${p}/h"),
            Price::Unknown => write!(f, "unknown"),
        }
    }
}

/// Memoizes successful price lookups for the lifetime of one batch
/// invocation. Not persisted across invocations.
pub struct PriceCache<'a> {
    catalog: &'a dyn PricingCatalog,
    region: String,
    cached: HashMap<String, Price>,
}

impl<'a> PriceCache<'a> {
    pub fn new(catalog: &'a dyn PricingCatalog, region: &str) -> Self {
        Self {
            catalog,
            region: region.to_string(),
            cached: HashMap::new(),
        }
    }

    pub async fn price_of(&mut self, shape_id: &str) -> Price {
        if let Some(price) = self.cached.get(shape_id) {
            return *price;
        }
        let price = match self.catalog.price_of(shape_id, &self.region).await {
            Ok(p) => Price::PerHour(p),
            Err(e) => {
                eprintln!("⚠️ [pricing] no price for {shape_id}: {e}");
                Price::Unknown
            }
        };
        // Only successful lookups are memoized; a transient pricing outage
        // should not pin Unknown for the rest of the evaluation.
        if price.is_known() {
            self.cached.insert(shape_id.to_string(), price);
        }
        price
    }
}
