use flexstart_common::shape_patterns::shape_matches_patterns;
use flexstart_common::{CompatibilityQuery, HardwareShape, ProviderError, RecoveryError};
use flexstart_providers::ShapeCatalog;

use crate::pricing::{Price, PriceCache};

/// Execute a compatibility query and return surviving candidates ordered
/// ascending by on-demand price (stable: catalog order breaks ties, shapes
/// with unknown prices sink to the end).
///
/// A recoverable provider failure yields an empty list, not an error; hard
/// failures are surfaced.
pub async fn enumerate(
    catalog: &dyn ShapeCatalog,
    prices: &mut PriceCache<'_>,
    query: &CompatibilityQuery,
    original: &HardwareShape,
) -> Result<Vec<(HardwareShape, Price)>, RecoveryError> {
    let matches = match catalog.find_compatible(query).await {
        Ok(shapes) => shapes,
        Err(e @ ProviderError::Unavailable(_)) => {
            eprintln!(
                "⚠️ [candidates] compatibility query for {} failed, treating as no matches: {e}",
                original.id
            );
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let allow_flex = original.is_flex() || original.is_burstable();

    let mut priced = Vec::with_capacity(matches.len());
    for shape in matches {
        if shape_matches_patterns(&shape.id, &query.excluded_shapes) {
            continue;
        }
        // Flex-class shapes only substitute for burstable/flex originals.
        if !allow_flex && shape.is_flex() {
            continue;
        }
        let price = prices.price_of(&shape.id).await;
        priced.push((shape, price));
    }

    priced.sort_by(|a, b| a.1.sort_key().total_cmp(&b.1.sort_key()));
    Ok(priced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flexstart_common::{BareMetalMode, RecoveryPolicy};
    use flexstart_providers::mock::MockCloud;

    fn shape(id: &str, vcpus: i32, memory_mib: i64) -> HardwareShape {
        HardwareShape {
            id: id.to_string(),
            vcpus,
            memory_mib,
            architecture: "x86_64".to_string(),
            bare_metal: false,
            current_generation: true,
            local_storage_gb: 0,
        }
    }

    fn t3_large_query() -> CompatibilityQuery {
        crate::requirements::translate(&shape("t3.large", 2, 8192), &RecoveryPolicy::default())
            .unwrap()
    }

    fn seeded_cloud() -> MockCloud {
        let cloud = MockCloud::new();
        cloud.add_shape(shape("t3.large", 2, 8192), Some(0.0832));
        cloud.add_shape(shape("t2.xlarge", 4, 16384), Some(0.1856));
        cloud.add_shape(shape("t3a.large", 2, 8192), Some(0.0752));
        // Outside the memory range; must not match.
        cloud.add_shape(shape("m5.4xlarge", 16, 65536), Some(0.768));
        cloud
    }

    #[tokio::test]
    async fn candidates_sorted_ascending_by_price() {
        let cloud = seeded_cloud();
        let mut prices = PriceCache::new(&cloud, "eu-west-1");
        let result = enumerate(&cloud, &mut prices, &t3_large_query(), &shape("t3.large", 2, 8192))
            .await
            .unwrap();

        let ids: Vec<&str> = result.iter().map(|(s, _)| s.id.as_str()).collect();
        assert_eq!(ids, vec!["t3a.large", "t3.large", "t2.xlarge"]);
        // Prices are non-decreasing across the sequence.
        for pair in result.windows(2) {
            assert!(pair[0].1.sort_key() <= pair[1].1.sort_key());
        }
    }

    #[tokio::test]
    async fn exclusion_patterns_discard_candidates() {
        let cloud = seeded_cloud();
        let mut query = t3_large_query();
        query.excluded_shapes = vec!["t2.*".to_string()];
        let mut prices = PriceCache::new(&cloud, "eu-west-1");
        let result = enumerate(&cloud, &mut prices, &query, &shape("t3.large", 2, 8192))
            .await
            .unwrap();
        assert!(result.iter().all(|(s, _)| !s.id.starts_with("t2.")));
    }

    #[tokio::test]
    async fn flex_candidates_dropped_for_plain_originals() {
        let cloud = MockCloud::new();
        cloud.add_shape(shape("m5.large", 2, 8192), Some(0.096));
        cloud.add_shape(shape("m7i-flex.large", 2, 8192), Some(0.0798));

        let original = shape("m5.large", 2, 8192);
        let query =
            crate::requirements::translate(&original, &RecoveryPolicy::default()).unwrap();
        let mut prices = PriceCache::new(&cloud, "eu-west-1");
        let result = enumerate(&cloud, &mut prices, &query, &original).await.unwrap();
        let ids: Vec<&str> = result.iter().map(|(s, _)| s.id.as_str()).collect();
        assert_eq!(ids, vec!["m5.large"]);
    }

    #[tokio::test]
    async fn flex_candidates_kept_for_burstable_originals() {
        let cloud = MockCloud::new();
        cloud.add_shape(shape("t3.large", 2, 8192), Some(0.0832));
        cloud.add_shape(shape("m7i-flex.large", 2, 8192), Some(0.0798));

        let original = shape("t3.large", 2, 8192);
        let query =
            crate::requirements::translate(&original, &RecoveryPolicy::default()).unwrap();
        let mut prices = PriceCache::new(&cloud, "eu-west-1");
        let result = enumerate(&cloud, &mut prices, &query, &original).await.unwrap();
        assert!(result.iter().any(|(s, _)| s.id == "m7i-flex.large"));
    }

    #[tokio::test]
    async fn unknown_price_sinks_to_the_end_not_out() {
        let cloud = MockCloud::new();
        cloud.add_shape(shape("t3a.large", 2, 8192), None); // no price listed
        cloud.add_shape(shape("t2.xlarge", 4, 16384), Some(0.1856));

        let mut prices = PriceCache::new(&cloud, "eu-west-1");
        let result = enumerate(&cloud, &mut prices, &t3_large_query(), &shape("t3.large", 2, 8192))
            .await
            .unwrap();
        let ids: Vec<&str> = result.iter().map(|(s, _)| s.id.as_str()).collect();
        assert_eq!(ids, vec!["t2.xlarge", "t3a.large"]);
        assert_eq!(result[1].1, Price::Unknown);
    }

    #[tokio::test]
    async fn recoverable_catalog_failure_yields_empty_not_error() {
        let cloud = seeded_cloud();
        cloud.set_catalog_failure(Some(true));
        let mut prices = PriceCache::new(&cloud, "eu-west-1");
        let result = enumerate(&cloud, &mut prices, &t3_large_query(), &shape("t3.large", 2, 8192))
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn hard_catalog_failure_is_surfaced() {
        let cloud = seeded_cloud();
        cloud.set_catalog_failure(Some(false));
        let mut prices = PriceCache::new(&cloud, "eu-west-1");
        let err = enumerate(&cloud, &mut prices, &t3_large_query(), &shape("t3.large", 2, 8192))
            .await
            .unwrap_err();
        assert!(matches!(err, RecoveryError::Provider(_)));
    }

    #[tokio::test]
    async fn bare_metal_exclusion_respected_by_catalog() {
        let cloud = MockCloud::new();
        let mut metal = shape("m5.metal", 2, 8192);
        metal.bare_metal = true;
        cloud.add_shape(metal, Some(0.05));
        cloud.add_shape(shape("t3a.large", 2, 8192), Some(0.0752));

        let mut query = t3_large_query();
        query.bare_metal = BareMetalMode::Excluded;
        let mut prices = PriceCache::new(&cloud, "eu-west-1");
        let result = enumerate(&cloud, &mut prices, &query, &shape("t3.large", 2, 8192))
            .await
            .unwrap();
        let ids: Vec<&str> = result.iter().map(|(s, _)| s.id.as_str()).collect();
        assert_eq!(ids, vec!["t3a.large"]);
    }
}
