//! Wire and domain types for the Keepa client.
//!
//! Prices arrive as integer cents with `-1` meaning "no offer"; the rating
//! average arrives scaled by ten (43 = 4.3 stars). Wire structs stay private
//! to this crate; callers only see [`ProductRecord`] and friends.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use nicheprobe_core::{Asin, Fulfillment, StockStatus};

/// Remote budget state reported by the health endpoint.
#[derive(Debug, Clone)]
pub struct ApiHealth {
    pub tokens_left: i64,
    pub refill_per_minute: f64,
    pub last_error: Option<String>,
}

/// One observation of a product's market-visible fields.
#[derive(Debug, Clone)]
pub struct Observation {
    pub captured_at: DateTime<Utc>,
    pub price_current: Option<Decimal>,
    pub price_original: Option<Decimal>,
    pub price_lowest_new: Option<Decimal>,
    pub price_lowest_used: Option<Decimal>,
    pub currency: String,
    pub coupon_discount_percent: Option<Decimal>,
    pub coupon_discount_amount: Option<Decimal>,
    pub deal_type: Option<String>,
    pub rank_primary: Option<i32>,
    pub rank_category: Option<String>,
    pub rank_secondary: Option<i32>,
    pub stock_status: StockStatus,
    pub stock_quantity: Option<i32>,
    pub fulfillment: Fulfillment,
    pub seller_count: Option<i32>,
    pub rating_avg: Option<Decimal>,
    pub rating_count: Option<i32>,
    pub review_count: Option<i32>,
    pub rating_distribution: Option<serde_json::Value>,
}

/// A catalog record plus its current observation, as fetched in one batch.
#[derive(Debug, Clone)]
pub struct ProductRecord {
    pub asin: Asin,
    pub title: Option<String>,
    pub brand: Option<String>,
    pub manufacturer: Option<String>,
    pub category_id: Option<i64>,
    pub category_path: Vec<String>,
    pub observation: Observation,
}

/// A product that could not be decoded from an otherwise healthy batch.
#[derive(Debug, Clone)]
pub struct ProductFailure {
    pub asin: String,
    pub reason: String,
}

/// Result of a batched fetch: one malformed record never fails the batch.
#[derive(Debug, Clone, Default)]
pub struct ProductBatch {
    pub records: Vec<ProductRecord>,
    pub failures: Vec<ProductFailure>,
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireEnvelope {
    pub tokens_left: Option<i64>,
    pub refill_rate: Option<f64>,
    pub error: Option<WireError>,
    pub products: Option<Vec<serde_json::Value>>,
    pub best_sellers_list: Option<WireBestSellers>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireError {
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireBestSellers {
    pub asin_list: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireProduct {
    asin: String,
    title: Option<String>,
    brand: Option<String>,
    manufacturer: Option<String>,
    root_category: Option<i64>,
    #[serde(default)]
    category_tree: Vec<WireCategory>,
    stats: Option<WireStats>,
}

#[derive(Debug, Deserialize)]
struct WireCategory {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStats {
    current: Option<WireCurrent>,
    stock_status: Option<String>,
    stock_quantity: Option<i32>,
    fulfillment: Option<String>,
    rating_distribution: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCurrent {
    price: Option<i64>,
    list_price: Option<i64>,
    lowest_new: Option<i64>,
    lowest_used: Option<i64>,
    coupon_percent: Option<i64>,
    coupon_amount: Option<i64>,
    deal_type: Option<String>,
    sales_rank: Option<i64>,
    sales_rank_category: Option<String>,
    sales_rank_secondary: Option<i64>,
    rating: Option<i64>,
    rating_count: Option<i64>,
    review_count: Option<i64>,
    seller_count: Option<i64>,
}

/// `-1` cents means "no offer"; anything non-negative is a real price.
fn cents(value: Option<i64>) -> Option<Decimal> {
    value.filter(|c| *c >= 0).map(|c| Decimal::new(c, 2))
}

fn rank(value: Option<i64>) -> Option<i32> {
    value
        .filter(|r| *r > 0)
        .and_then(|r| i32::try_from(r).ok())
}

fn count(value: Option<i64>) -> Option<i32> {
    value
        .filter(|c| *c >= 0)
        .and_then(|c| i32::try_from(c).ok())
}

/// Decodes a single product object from a batch payload.
///
/// Returns a human-readable reason on failure so the caller can isolate the
/// product instead of failing the whole batch.
pub(crate) fn parse_product(
    value: &serde_json::Value,
    captured_at: DateTime<Utc>,
) -> Result<ProductRecord, String> {
    let wire: WireProduct =
        serde_json::from_value(value.clone()).map_err(|e| format!("undecodable record: {e}"))?;

    let asin = Asin::new(&wire.asin).map_err(|e| e.to_string())?;

    let stats = wire.stats;
    let current = stats.as_ref().and_then(|s| s.current.as_ref());

    let stock_status = stats
        .as_ref()
        .and_then(|s| s.stock_status.as_deref())
        .and_then(|s| s.parse().ok())
        .unwrap_or(StockStatus::Unknown);
    let fulfillment = stats
        .as_ref()
        .and_then(|s| s.fulfillment.as_deref())
        .and_then(|s| s.parse().ok())
        .unwrap_or(Fulfillment::Unknown);

    let observation = Observation {
        captured_at,
        price_current: cents(current.and_then(|c| c.price)),
        price_original: cents(current.and_then(|c| c.list_price)),
        price_lowest_new: cents(current.and_then(|c| c.lowest_new)),
        price_lowest_used: cents(current.and_then(|c| c.lowest_used)),
        currency: "USD".to_owned(),
        coupon_discount_percent: current
            .and_then(|c| c.coupon_percent)
            .filter(|p| *p > 0)
            .map(|p| Decimal::new(p, 0)),
        coupon_discount_amount: cents(current.and_then(|c| c.coupon_amount)),
        deal_type: current.and_then(|c| c.deal_type.clone()),
        rank_primary: rank(current.and_then(|c| c.sales_rank)),
        rank_category: current.and_then(|c| c.sales_rank_category.clone()),
        rank_secondary: rank(current.and_then(|c| c.sales_rank_secondary)),
        stock_status,
        stock_quantity: stats.as_ref().and_then(|s| s.stock_quantity),
        fulfillment,
        seller_count: count(current.and_then(|c| c.seller_count)),
        rating_avg: current
            .and_then(|c| c.rating)
            .filter(|r| *r >= 0)
            .map(|r| Decimal::new(r, 1)),
        rating_count: count(current.and_then(|c| c.rating_count)),
        review_count: count(current.and_then(|c| c.review_count)),
        rating_distribution: stats.and_then(|s| s.rating_distribution),
    };

    Ok(ProductRecord {
        asin,
        title: wire.title,
        brand: wire.brand,
        manufacturer: wire.manufacturer,
        category_id: wire.root_category,
        category_path: wire.category_tree.into_iter().map(|c| c.name).collect(),
        observation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn parses_a_full_product_object() {
        let value = json!({
            "asin": "B09MOUNT01",
            "title": "Gooseneck dash mount",
            "brand": "ClampCo",
            "manufacturer": "ClampCo Ltd",
            "rootCategory": 7_072_562_011_i64,
            "categoryTree": [{"name": "Electronics"}, {"name": "Car Mounts"}],
            "stats": {
                "current": {
                    "price": 2_999,
                    "listPrice": 3_999,
                    "lowestNew": 2_899,
                    "lowestUsed": -1,
                    "salesRank": 8_500,
                    "salesRankCategory": "Electronics",
                    "rating": 43,
                    "ratingCount": 1_500,
                    "reviewCount": 1_200,
                    "sellerCount": 5
                },
                "stockStatus": "in_stock",
                "stockQuantity": 14,
                "fulfillment": "fba"
            }
        });

        let record = parse_product(&value, now()).expect("parses");
        assert_eq!(record.asin.as_str(), "B09MOUNT01");
        assert_eq!(record.category_path, vec!["Electronics", "Car Mounts"]);
        let obs = &record.observation;
        assert_eq!(obs.price_current, Some(dec!(29.99)));
        assert_eq!(obs.price_original, Some(dec!(39.99)));
        assert_eq!(obs.price_lowest_used, None, "-1 cents means no offer");
        assert_eq!(obs.rank_primary, Some(8_500));
        assert_eq!(obs.rating_avg, Some(dec!(4.3)));
        assert_eq!(obs.stock_status, StockStatus::InStock);
        assert_eq!(obs.fulfillment, Fulfillment::Fba);
        assert_eq!(obs.seller_count, Some(5));
    }

    #[test]
    fn missing_stats_yields_null_observation_fields() {
        let value = json!({ "asin": "B09MOUNT02" });
        let record = parse_product(&value, now()).expect("parses");
        let obs = &record.observation;
        assert!(obs.price_current.is_none());
        assert!(obs.rank_primary.is_none());
        assert_eq!(obs.stock_status, StockStatus::Unknown);
        assert_eq!(obs.fulfillment, Fulfillment::Unknown);
    }

    #[test]
    fn invalid_asin_is_a_per_product_failure() {
        let value = json!({ "asin": "SHORT" });
        let err = parse_product(&value, now()).unwrap_err();
        assert!(err.contains("asin"), "unexpected reason: {err}");
    }

    #[test]
    fn unknown_stock_string_degrades_to_unknown() {
        let value = json!({
            "asin": "B09MOUNT03",
            "stats": { "stockStatus": "sorta-available" }
        });
        let record = parse_product(&value, now()).expect("parses");
        assert_eq!(record.observation.stock_status, StockStatus::Unknown);
    }
}
