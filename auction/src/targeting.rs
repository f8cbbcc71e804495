//! Ad-server targeting: price bucketing and per-bid key assembly.
//!
//! Bids are regrouped by ad unit and sorted by descending price within each
//! group; every bid gets bidder-suffixed `hb_*` keys, the group winner also
//! gets the unsuffixed set the primary ad server keys its line items on.

use crate::accounts::PriceGranularity;
use crate::request::{AdUnit, Bid};
use std::collections::BTreeMap;

const HB_PB: &str = "hb_pb";
const HB_BIDDER: &str = "hb_bidder";
const HB_CACHE_ID: &str = "hb_cache_id";
const HB_SIZE: &str = "hb_size";
const HB_CREATIVE_LOADTYPE: &str = "hb_creative_loadtype";

const LOAD_METHOD_HTML: &str = "html";
const LOAD_METHOD_DEMAND_SDK: &str = "demand_sdk";

/// The one bidder whose creatives must load in its own SDK webview.
const DEMAND_SDK_BIDDER: &str = "audienceNetwork";

/// One rounding step: prices up to `max` round down to a multiple of
/// `increment`, formatted with `precision` decimals. Prices beyond the last
/// step bucket to its `max`.
struct BucketStep {
    max: f64,
    increment: f64,
    precision: usize,
}

const LOW: &[BucketStep] = &[BucketStep {
    max: 5.0,
    increment: 0.5,
    precision: 2,
}];

const MED: &[BucketStep] = &[BucketStep {
    max: 20.0,
    increment: 0.1,
    precision: 2,
}];

const HIGH: &[BucketStep] = &[BucketStep {
    max: 20.0,
    increment: 0.01,
    precision: 2,
}];

const AUTO: &[BucketStep] = &[
    BucketStep {
        max: 5.0,
        increment: 0.05,
        precision: 2,
    },
    BucketStep {
        max: 10.0,
        increment: 0.1,
        precision: 2,
    },
    BucketStep {
        max: 20.0,
        increment: 0.5,
        precision: 2,
    },
];

const DENSE: &[BucketStep] = &[
    BucketStep {
        max: 3.0,
        increment: 0.01,
        precision: 2,
    },
    BucketStep {
        max: 8.0,
        increment: 0.05,
        precision: 2,
    },
    BucketStep {
        max: 20.0,
        increment: 0.5,
        precision: 2,
    },
];

fn bucket_table(granularity: PriceGranularity) -> &'static [BucketStep] {
    match granularity {
        PriceGranularity::Low => LOW,
        PriceGranularity::Med => MED,
        PriceGranularity::High => HIGH,
        PriceGranularity::Auto => AUTO,
        PriceGranularity::Dense => DENSE,
    }
}

/// Rounds a CPM down to its granularity bucket and formats it.
///
/// Arithmetic runs in integer cents; every table increment is a whole number
/// of cents, so no float rounding can move a price across a bucket edge.
pub fn price_bucket(price: f64, granularity: PriceGranularity) -> String {
    let table = bucket_table(granularity);
    let price = price.max(0.0);

    let step = table
        .iter()
        .find(|step| price <= step.max)
        .unwrap_or_else(|| &table[table.len() - 1]);

    let cap_cents = (step.max * 100.0).round() as u64;
    let increment_cents = (step.increment * 100.0).round() as u64;
    let price_cents = ((price * 100.0).round() as u64).min(cap_cents);
    let bucket_cents = (price_cents / increment_cents) * increment_cents;

    format!(
        "{:.prec$}",
        bucket_cents as f64 / 100.0,
        prec = step.precision
    )
}

/// Regroups `bids` by ad unit (in request order), sorts each group by
/// descending price (stable on ties), and attaches targeting keys. Pure in
/// `(bids, granularity, max_key_length)`.
pub fn sort_bids_add_keywords(
    bids: Vec<Bid>,
    ad_units: &[AdUnit],
    granularity: PriceGranularity,
    max_key_length: usize,
) -> Vec<Bid> {
    let mut remaining = bids;
    let mut sorted = Vec::with_capacity(remaining.len());

    for unit in ad_units {
        let mut group: Vec<Bid> = Vec::new();
        let mut rest = Vec::with_capacity(remaining.len());
        for bid in remaining {
            if bid.ad_unit_code == unit.code {
                group.push(bid);
            } else {
                rest.push(bid);
            }
        }
        remaining = rest;

        if group.is_empty() {
            continue;
        }
        group.sort_by(|a, b| {
            b.price
                .partial_cmp(&a.price)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        for (rank, bid) in group.iter_mut().enumerate() {
            bid.ad_server_targeting = Some(targeting_keys(bid, rank == 0, granularity, max_key_length));
        }
        sorted.append(&mut group);
    }

    // Bids for unknown unit codes keep their arrival order, untouched.
    sorted.append(&mut remaining);
    sorted
}

fn targeting_keys(
    bid: &Bid,
    top_bid: bool,
    granularity: PriceGranularity,
    max_key_length: usize,
) -> BTreeMap<String, String> {
    let rounded_cpm = price_bucket(bid.price, granularity);
    let hb_size = (bid.width != 0 && bid.height != 0)
        .then(|| format!("{}x{}", bid.width, bid.height));

    let mut keys = BTreeMap::new();
    let mut insert = |name: &str, value: String| {
        let mut key = format!("{name}_{}", bid.bidder_code);
        truncate_key(&mut key, max_key_length);
        keys.insert(key, value);
    };

    insert(HB_PB, rounded_cpm.clone());
    insert(HB_BIDDER, bid.bidder_code.clone());
    insert(HB_CACHE_ID, bid.cache_id.clone());
    if let Some(size) = &hb_size {
        insert(HB_SIZE, size.clone());
    }

    if top_bid {
        let mut insert_top = |name: &str, value: String| {
            let mut key = name.to_string();
            truncate_key(&mut key, max_key_length);
            keys.insert(key, value);
        };

        insert_top(HB_PB, rounded_cpm);
        insert_top(HB_BIDDER, bid.bidder_code.clone());
        insert_top(HB_CACHE_ID, bid.cache_id.clone());
        if let Some(size) = hb_size {
            insert_top(HB_SIZE, size);
        }
        let load_method = if bid.bidder_code == DEMAND_SDK_BIDDER {
            LOAD_METHOD_DEMAND_SDK
        } else {
            LOAD_METHOD_HTML
        };
        insert_top(HB_CREATIVE_LOADTYPE, load_method.to_string());
    }

    keys
}

/// Byte-based truncation of key names, backed up to a UTF-8 boundary so a
/// multibyte bidder code cannot split a code point. Collisions caused by
/// truncation are accepted; last write wins.
fn truncate_key(key: &mut String, max_key_length: usize) {
    if max_key_length == 0 || key.len() <= max_key_length {
        return;
    }
    let mut cut = max_key_length;
    while !key.is_char_boundary(cut) {
        cut -= 1;
    }
    key.truncate(cut);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Size;

    fn bid(code: &str, bidder: &str, price: f64) -> Bid {
        Bid {
            bid_id: format!("{bidder}-{code}"),
            ad_unit_code: code.to_string(),
            bidder_code: bidder.to_string(),
            price,
            width: 300,
            height: 250,
            cache_id: format!("cache-{bidder}"),
            ..Bid::default()
        }
    }

    fn units(codes: &[&str]) -> Vec<AdUnit> {
        codes
            .iter()
            .map(|code| AdUnit {
                code: code.to_string(),
                sizes: vec![Size { w: 300, h: 250 }],
                bid_id: String::new(),
                params: serde_json::Value::Null,
            })
            .collect()
    }

    #[test]
    fn med_granularity_rounds_down_to_dimes() {
        assert_eq!(price_bucket(1.23, PriceGranularity::Med), "1.20");
        assert_eq!(price_bucket(0.04, PriceGranularity::Med), "0.00");
        assert_eq!(price_bucket(20.0, PriceGranularity::Med), "20.00");
    }

    #[test]
    fn granularity_tables_cover_their_edges() {
        assert_eq!(price_bucket(4.56, PriceGranularity::Low), "4.50");
        assert_eq!(price_bucket(4.56, PriceGranularity::High), "4.56");
        // Above every cap, prices bucket to the cap.
        assert_eq!(price_bucket(21.0, PriceGranularity::High), "20.00");
        assert_eq!(price_bucket(9.99, PriceGranularity::Low), "5.00");
        // Auto and dense switch increments between steps.
        assert_eq!(price_bucket(4.0, PriceGranularity::Auto), "4.00");
        assert_eq!(price_bucket(5.54, PriceGranularity::Auto), "5.50");
        assert_eq!(price_bucket(13.0, PriceGranularity::Auto), "13.00");
        assert_eq!(price_bucket(2.99, PriceGranularity::Dense), "2.99");
        assert_eq!(price_bucket(3.52, PriceGranularity::Dense), "3.50");
        assert_eq!(price_bucket(9.1, PriceGranularity::Dense), "9.00");
    }

    #[test]
    fn negative_prices_bucket_to_zero() {
        assert_eq!(price_bucket(-1.0, PriceGranularity::Med), "0.00");
    }

    #[test]
    fn groups_sort_descending_and_winner_gets_unsuffixed_keys() {
        let bids = vec![
            bid("u1", "rubicon", 0.50),
            bid("u1", "appnexus", 1.23),
            bid("u2", "rubicon", 2.00),
        ];
        let sorted = sort_bids_add_keywords(bids, &units(&["u1", "u2"]), PriceGranularity::Med, 0);

        let u1: Vec<_> = sorted.iter().filter(|b| b.ad_unit_code == "u1").collect();
        assert_eq!(u1[0].bidder_code, "appnexus");
        assert_eq!(u1[1].bidder_code, "rubicon");

        let winner_keys = u1[0].ad_server_targeting.as_ref().unwrap();
        assert_eq!(winner_keys["hb_pb"], "1.20");
        assert_eq!(winner_keys["hb_pb_appnexus"], "1.20");
        assert_eq!(winner_keys["hb_bidder"], "appnexus");
        assert_eq!(winner_keys["hb_cache_id"], "cache-appnexus");
        assert_eq!(winner_keys["hb_size"], "300x250");
        assert_eq!(winner_keys["hb_creative_loadtype"], "html");

        let loser_keys = u1[1].ad_server_targeting.as_ref().unwrap();
        assert_eq!(loser_keys["hb_pb_rubicon"], "0.50");
        assert!(!loser_keys.contains_key("hb_pb"));
        assert!(!loser_keys.contains_key("hb_creative_loadtype"));

        // u2's single bid is its own winner.
        let u2: Vec<_> = sorted.iter().filter(|b| b.ad_unit_code == "u2").collect();
        assert_eq!(u2[0].ad_server_targeting.as_ref().unwrap()["hb_pb"], "2.00");
    }

    #[test]
    fn audience_network_loads_in_its_own_sdk() {
        let bids = vec![bid("u1", "audienceNetwork", 1.0)];
        let sorted = sort_bids_add_keywords(bids, &units(&["u1"]), PriceGranularity::Med, 0);
        let keys = sorted[0].ad_server_targeting.as_ref().unwrap();
        assert_eq!(keys["hb_creative_loadtype"], "demand_sdk");
    }

    #[test]
    fn ties_keep_arrival_order() {
        let mut first = bid("u1", "appnexus", 1.0);
        first.bid_id = "first".to_string();
        let mut second = bid("u1", "rubicon", 1.0);
        second.bid_id = "second".to_string();

        let sorted =
            sort_bids_add_keywords(vec![first, second], &units(&["u1"]), PriceGranularity::Med, 0);
        assert_eq!(sorted[0].bid_id, "first");
        assert_eq!(sorted[1].bid_id, "second");
    }

    #[test]
    fn zero_dimensions_omit_the_size_key() {
        let mut no_size = bid("u1", "appnexus", 1.0);
        no_size.width = 0;
        no_size.height = 0;
        no_size.creative_media_type = "video".to_string();

        let sorted = sort_bids_add_keywords(vec![no_size], &units(&["u1"]), PriceGranularity::Med, 0);
        let keys = sorted[0].ad_server_targeting.as_ref().unwrap();
        assert!(!keys.contains_key("hb_size"));
        assert!(!keys.contains_key("hb_size_appnexus"));
    }

    #[test]
    fn key_names_truncate_to_byte_budget() {
        let bids = vec![bid("u1", "verylongbiddername", 1.0)];
        let sorted = sort_bids_add_keywords(bids, &units(&["u1"]), PriceGranularity::Med, 8);
        let keys = sorted[0].ad_server_targeting.as_ref().unwrap();

        // "hb_pb_verylongbiddername" cut to eight bytes; values stay whole.
        assert_eq!(keys["hb_pb_ve"], "1.00");
        // Unsuffixed winner keys within the budget survive as-is.
        assert_eq!(keys["hb_pb"], "1.00");
        assert_eq!(keys["hb_size"], "300x250");
        // Winner keys beyond the budget are cut like any other key name.
        assert_eq!(keys["hb_creat"], "html");
        assert!(!keys.contains_key("hb_creative_loadtype"));
        assert!(!keys.contains_key("hb_bidder"));
        // Suffixed "hb_bidder_*"/"hb_cache_id_*" and their unsuffixed forms
        // all land on "hb_bidde"/"hb_cache"; the values coincide.
        assert_eq!(keys["hb_bidde"], "verylongbiddername");
        assert_eq!(keys["hb_cache"], "cache-verylongbiddername");
    }

    #[test]
    fn truncation_below_prefix_still_truncates() {
        let bids = vec![bid("u1", "appnexus", 1.0)];
        let sorted = sort_bids_add_keywords(bids, &units(&["u1"]), PriceGranularity::Med, 3);
        let keys = sorted[0].ad_server_targeting.as_ref().unwrap();
        // Every key name, winner keys included, collapses to "hb_"; last
        // write wins, and the loadtype key is written last.
        assert_eq!(keys.len(), 1);
        assert_eq!(keys["hb_"], "html");
    }

    #[test]
    fn truncation_respects_utf8_boundaries() {
        let mut key = "hb_pb_bieter_ü".to_string();
        // Byte 14 falls inside the two-byte "ü"; the cut backs up to 13.
        truncate_key(&mut key, 14);
        assert_eq!(key, "hb_pb_bieter_");
    }
}
