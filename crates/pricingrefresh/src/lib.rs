//! Periodic pricing refresh for instance types.
//!
//! For each configured region, queries the AWS Pricing `GetProducts` API
//! per instance type and upserts one row keyed by
//! `(instance_type_id, region, effective_date)`. The whole job is
//! idempotent: re-running with identical upstream data leaves exactly one
//! row per key with the most recent values.

use std::collections::HashMap;
use std::time::Duration;

use accelbench_db::models::instance_type::InstanceType;
use accelbench_db::models::pricing::UpsertPricing;
use accelbench_db::repositories::PricingRepo;
use accelbench_db::DbPool;
use anyhow::Context;
use aws_sdk_pricing::types::{Filter, FilterType};
use chrono::NaiveDate;
use serde::Deserialize;

/// Pause between Pricing API calls; the API is rate-limited.
const CALL_SPACING: Duration = Duration::from_millis(200);

/// Hours in a 1-year reserved term.
const HOURS_1YR: f64 = 8760.0;

/// Hours in a 3-year reserved term.
const HOURS_3YR: f64 = 26_280.0;

/// The relevant structure of one AWS price-list entry.
#[derive(Debug, Default, Deserialize)]
struct PriceDocument {
    #[serde(default)]
    terms: Terms,
}

#[derive(Debug, Default, Deserialize)]
struct Terms {
    #[serde(rename = "OnDemand", default)]
    on_demand: HashMap<String, TermEntry>,
    #[serde(rename = "Reserved", default)]
    reserved: HashMap<String, TermEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct TermEntry {
    #[serde(rename = "priceDimensions", default)]
    price_dimensions: HashMap<String, PriceDimension>,
    #[serde(rename = "termAttributes", default)]
    term_attributes: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct PriceDimension {
    #[serde(default)]
    unit: String,
    #[serde(rename = "pricePerUnit", default)]
    price_per_unit: HashMap<String, String>,
}

/// Hourly rates extracted for one instance type in one region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceRates {
    pub on_demand_hourly_usd: f64,
    pub reserved_1yr_hourly_usd: Option<f64>,
    pub reserved_3yr_hourly_usd: Option<f64>,
}

/// Outcome counters for one region.
#[derive(Debug, Default)]
pub struct RefreshSummary {
    pub updated: usize,
    pub total: usize,
}

/// Refresh pricing for every instance type in one region.
///
/// A failed lookup or upsert logs a warning and continues with the next
/// instance type.
pub async fn refresh_region(
    pool: &DbPool,
    client: &aws_sdk_pricing::Client,
    instance_types: &[InstanceType],
    region: &str,
    effective_date: NaiveDate,
) -> RefreshSummary {
    let mut summary = RefreshSummary {
        updated: 0,
        total: instance_types.len(),
    };

    for instance_type in instance_types {
        let rates = match fetch_rates(client, &instance_type.name, region).await {
            Ok(rates) => rates,
            Err(err) => {
                tracing::warn!(
                    instance = %instance_type.name,
                    region,
                    error = %err,
                    "Pricing lookup failed",
                );
                tokio::time::sleep(CALL_SPACING).await;
                continue;
            }
        };

        let row = UpsertPricing {
            instance_type_id: instance_type.id,
            region: region.to_string(),
            on_demand_hourly_usd: rates.on_demand_hourly_usd,
            reserved_1yr_hourly_usd: rates.reserved_1yr_hourly_usd,
            reserved_3yr_hourly_usd: rates.reserved_3yr_hourly_usd,
            effective_date,
        };
        match PricingRepo::upsert(pool, &row).await {
            Ok(()) => summary.updated += 1,
            Err(err) => {
                tracing::warn!(
                    instance = %instance_type.name,
                    region,
                    error = %err,
                    "Pricing upsert failed",
                );
            }
        }
        tokio::time::sleep(CALL_SPACING).await;
    }

    summary
}

/// Query the Pricing API for one instance type and extract hourly rates.
pub async fn fetch_rates(
    client: &aws_sdk_pricing::Client,
    instance_type: &str,
    region: &str,
) -> anyhow::Result<InstanceRates> {
    let filters = [
        ("instanceType", instance_type),
        ("operatingSystem", "Linux"),
        ("tenancy", "Shared"),
        ("preInstalledSw", "NA"),
        ("capacitystatus", "Used"),
        ("regionCode", region),
    ];

    let mut request = client
        .get_products()
        .service_code("AmazonEC2")
        .max_results(10);
    for (field, value) in filters {
        request = request.filters(
            Filter::builder()
                .r#type(FilterType::TermMatch)
                .field(field)
                .value(value)
                .build()
                .context("build pricing filter")?,
        );
    }

    let response = request.send().await.context("GetProducts")?;
    let price_list = response.price_list();
    let entry = price_list
        .first()
        .with_context(|| format!("no pricing found for {instance_type} in {region}"))?;

    let document: PriceDocument =
        serde_json::from_str(entry).context("parse price list entry")?;

    let on_demand = extract_on_demand(&document.terms.on_demand)
        .with_context(|| format!("no hourly on-demand price for {instance_type}"))?;

    Ok(InstanceRates {
        on_demand_hourly_usd: on_demand,
        reserved_1yr_hourly_usd: extract_reserved(&document.terms.reserved, "1yr"),
        reserved_3yr_hourly_usd: extract_reserved(&document.terms.reserved, "3yr"),
    })
}

/// The hourly (`unit == "Hrs"`) USD rate from the on-demand terms.
fn extract_on_demand(terms: &HashMap<String, TermEntry>) -> Option<f64> {
    for term in terms.values() {
        for dimension in term.price_dimensions.values() {
            if dimension.unit != "Hrs" {
                continue;
            }
            if let Some(usd) = dimension.price_per_unit.get("USD") {
                if let Ok(rate) = usd.parse::<f64>() {
                    return Some(rate);
                }
            }
        }
    }
    None
}

/// The effective hourly rate of an All Upfront, standard-class reserved
/// term of the given lease length (`"1yr"` or `"3yr"`).
fn extract_reserved(terms: &HashMap<String, TermEntry>, lease: &str) -> Option<f64> {
    let hours = match lease {
        "1yr" => HOURS_1YR,
        "3yr" => HOURS_3YR,
        _ => return None,
    };

    for term in terms.values() {
        let attrs = &term.term_attributes;
        if attrs.get("LeaseContractLength").map(String::as_str) != Some(lease)
            || attrs.get("PurchaseOption").map(String::as_str) != Some("All Upfront")
            || attrs.get("OfferingClass").map(String::as_str) != Some("standard")
        {
            continue;
        }

        // The upfront fee is the dimension with unit "Quantity".
        for dimension in term.price_dimensions.values() {
            if dimension.unit != "Quantity" {
                continue;
            }
            let upfront = dimension
                .price_per_unit
                .get("USD")
                .and_then(|usd| usd.parse::<f64>().ok());
            if let Some(upfront) = upfront {
                if upfront > 0.0 {
                    return Some(upfront / hours);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(json: serde_json::Value) -> PriceDocument {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn extracts_the_hourly_on_demand_rate() {
        let doc = document(serde_json::json!({
            "terms": {
                "OnDemand": {
                    "ABC.123": {
                        "priceDimensions": {
                            "ABC.123.456": {
                                "unit": "Hrs",
                                "pricePerUnit": { "USD": "1.0060000000" }
                            }
                        },
                        "termAttributes": {}
                    }
                }
            }
        }));
        assert_eq!(extract_on_demand(&doc.terms.on_demand), Some(1.006));
    }

    #[test]
    fn skips_non_hourly_dimensions() {
        let doc = document(serde_json::json!({
            "terms": {
                "OnDemand": {
                    "A": {
                        "priceDimensions": {
                            "A.1": { "unit": "Quantity", "pricePerUnit": { "USD": "500" } }
                        },
                        "termAttributes": {}
                    }
                }
            }
        }));
        assert_eq!(extract_on_demand(&doc.terms.on_demand), None);
    }

    #[test]
    fn reserved_rate_is_upfront_divided_by_term_hours() {
        let doc = document(serde_json::json!({
            "terms": {
                "Reserved": {
                    "R1": {
                        "priceDimensions": {
                            "R1.D1": { "unit": "Quantity", "pricePerUnit": { "USD": "8760" } }
                        },
                        "termAttributes": {
                            "LeaseContractLength": "1yr",
                            "PurchaseOption": "All Upfront",
                            "OfferingClass": "standard"
                        }
                    },
                    "R3": {
                        "priceDimensions": {
                            "R3.D1": { "unit": "Quantity", "pricePerUnit": { "USD": "26280" } }
                        },
                        "termAttributes": {
                            "LeaseContractLength": "3yr",
                            "PurchaseOption": "All Upfront",
                            "OfferingClass": "standard"
                        }
                    }
                }
            }
        }));
        assert_eq!(extract_reserved(&doc.terms.reserved, "1yr"), Some(1.0));
        assert_eq!(extract_reserved(&doc.terms.reserved, "3yr"), Some(1.0));
    }

    #[test]
    fn reserved_rate_ignores_other_purchase_options() {
        let doc = document(serde_json::json!({
            "terms": {
                "Reserved": {
                    "R1": {
                        "priceDimensions": {
                            "R1.D1": { "unit": "Quantity", "pricePerUnit": { "USD": "8760" } }
                        },
                        "termAttributes": {
                            "LeaseContractLength": "1yr",
                            "PurchaseOption": "Partial Upfront",
                            "OfferingClass": "standard"
                        }
                    }
                }
            }
        }));
        assert_eq!(extract_reserved(&doc.terms.reserved, "1yr"), None);
    }

    #[test]
    fn zero_upfront_is_not_a_rate() {
        let doc = document(serde_json::json!({
            "terms": {
                "Reserved": {
                    "R1": {
                        "priceDimensions": {
                            "R1.D1": { "unit": "Quantity", "pricePerUnit": { "USD": "0" } }
                        },
                        "termAttributes": {
                            "LeaseContractLength": "1yr",
                            "PurchaseOption": "All Upfront",
                            "OfferingClass": "standard"
                        }
                    }
                }
            }
        }));
        assert_eq!(extract_reserved(&doc.terms.reserved, "1yr"), None);
    }
}
