//! Per-region cache of spot and on-demand prices, rebuilt once per invocation.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

/// Key into the spot price cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpotPriceKey {
    pub instance_type: String,
    pub availability_zone: String,
    pub product_description: String,
}

/// One sample pulled from a bulk spot-price history query.
#[derive(Debug, Clone)]
pub struct SpotPriceSample {
    pub price: f64,
    pub timestamp: SystemTime,
}

/// Covers the last 10 minutes of spot price history for one region, as a
/// single bulk query populates it once per invocation (`§4.2`). Missing
/// `(type, az, product)` triples price at `+inf`, which the selector treats
/// as "unavailable here now". Shared read-only across every ASG in the
/// region; the on-demand multiplier varies per ASG policy, so it is passed
/// into [`PriceOracle::on_demand_price`] rather than stored here.
#[derive(Debug, Default)]
pub struct PriceOracle {
    spot: HashMap<SpotPriceKey, SpotPriceSample>,
}

/// Spot price history lookback window honored when refreshing the cache.
pub const SPOT_HISTORY_LOOKBACK: Duration = Duration::from_secs(10 * 60);

impl PriceOracle {
    pub fn new() -> Self {
        Self { spot: HashMap::new() }
    }

    /// Ingest a bulk spot-price-history page; the most recent sample per
    /// `(type, az, product)` wins regardless of page ordering.
    pub fn ingest(&mut self, key: SpotPriceKey, sample: SpotPriceSample) {
        match self.spot.get(&key) {
            Some(existing) if existing.timestamp >= sample.timestamp => {}
            _ => {
                self.spot.insert(key, sample);
            }
        }
    }

    /// Current spot price, or `+inf` if no sample exists for this triple.
    pub fn spot_price(&self, instance_type: &str, az: &str, product: &str) -> f64 {
        let key = SpotPriceKey {
            instance_type: instance_type.to_string(),
            availability_zone: az.to_string(),
            product_description: product.to_string(),
        };
        self.spot.get(&key).map(|s| s.price).unwrap_or(f64::INFINITY)
    }

    /// On-demand list price scaled by the calling ASG's configured multiplier.
    pub fn on_demand_price(&self, catalog_price: f64, multiplier: f64) -> f64 {
        catalog_price * multiplier
    }
}
