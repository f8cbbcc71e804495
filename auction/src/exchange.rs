//! The auction orchestrator: deadline-bounded fan-out, per-bidder accounting,
//! and the post-processing pipeline.
//!
//! Every dispatched bidder runs as its own task and delivers exactly one
//! result record on a bounded channel, whatever happens to the call. The
//! aggregator drains exactly as many records as it dispatched, so a slow or
//! failing bidder can neither stall the auction past its deadline nor leak a
//! task.

use crate::accounts::Account;
use crate::adapters::{AdapterError, Registry};
use crate::cache_client::CacheClient;
use crate::errors::AuctionError;
use crate::metrics::AdapterLabels;
use crate::request::{AuctionRequest, Bid, BidderRequest};
use crate::sizes::reconcile_sizes;
use crate::targeting::sort_bids_add_keywords;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};

pub const STATUS_OK: &str = "OK";
pub const STATUS_NO_COOKIE: &str = "no_cookie";

#[derive(Debug, Serialize)]
pub struct AuctionResponse {
    pub tid: String,
    pub status: String,
    pub bidder_status: Vec<BidderRequest>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bids: Vec<Bid>,
}

/// One terminal record per dispatched bidder task.
struct BidResult {
    seat: usize,
    bidder: BidderRequest,
    bids: Vec<Bid>,
}

#[derive(Clone)]
pub struct Exchange {
    registry: Registry,
    cache: Option<CacheClient>,
}

impl Exchange {
    pub fn new(registry: Registry, cache: Option<CacheClient>) -> Self {
        Self { registry, cache }
    }

    /// Runs the auction to completion within the request deadline.
    ///
    /// Bidder-scoped failures are absorbed into the per-bidder status; only
    /// request-scoped failures (creative cache write) surface as errors.
    pub async fn hold_auction(
        &self,
        mut request: AuctionRequest,
        account: &Account,
    ) -> Result<AuctionResponse, AuctionError> {
        let deadline = request.deadline();
        let status = response_status(&request);
        let tid = request.tid.clone();

        let mut bidders = std::mem::take(&mut request.bidders);
        let shared = Arc::new(request);

        // Capacity of sent_bids means no send can ever block, even if the
        // aggregator has already bailed out with a request-scoped error.
        let (tx, mut rx) = mpsc::channel::<BidResult>(bidders.len().max(1));
        let mut sent_bids = 0usize;

        for (seat, bidder) in bidders.iter_mut().enumerate() {
            let Some(adapter) = self.registry.get(&bidder.bidder_code) else {
                bidder.error = "Unsupported bidder".to_string();
                continue;
            };

            let labels = AdapterLabels::new(&bidder.bidder_code, &account.id);
            labels.request();

            if shared.app.is_none() && shared.cookie.uid(adapter.family_name()).is_none() {
                bidder.no_cookie = true;
                bidder.usersync_info = Some(adapter.usersync_info());
                labels.no_cookie();
                if adapter.skip_no_cookies() {
                    continue;
                }
            }

            sent_bids += 1;
            let task_bidder = bidder.clone();
            let shared = shared.clone();
            let tx = tx.clone();

            tokio::spawn(async move {
                let started = Instant::now();
                // The outer timeout guards the deadline even against an
                // adapter that ignores the one it was handed.
                let outcome = timeout_at(
                    deadline,
                    adapter.call(deadline, &shared, &task_bidder),
                )
                .await;
                let elapsed = started.elapsed();

                let mut bidder = task_bidder;
                bidder.response_time_ms = elapsed.as_millis() as u64;
                labels.request_duration(elapsed);

                let mut bids = Vec::new();
                match outcome {
                    Err(_) | Ok(Err(AdapterError::Timeout)) => {
                        bidder.error = "Timed out".to_string();
                        labels.timeout();
                    }
                    Ok(Err(err)) => {
                        tracing::warn!(
                            bidder = %bidder.bidder_code,
                            error = %err,
                            "Error from bidder, ignoring all bids"
                        );
                        bidder.error = err.to_string();
                        labels.error();
                    }
                    Ok(Ok(bid_list)) if !bid_list.is_empty() => {
                        let mut valid = reconcile_sizes(bid_list, &bidder);
                        bidder.num_bids = valid.len();
                        labels.bids_received(valid.len() as u64);
                        for bid in &mut valid {
                            labels.price(bid.price * 1000.0);
                            bid.response_time_ms = bidder.response_time_ms;
                        }
                        bids = valid;
                    }
                    Ok(Ok(_)) => {
                        bidder.no_bid = true;
                        labels.no_bid();
                    }
                }

                let _ = tx
                    .send(BidResult {
                        seat,
                        bidder,
                        bids,
                    })
                    .await;
            });
        }
        drop(tx);

        // Drain exactly sent_bids records; each task is bound by the deadline,
        // so every record arrives. A missing sender only means a panicked
        // task, in which case its seat keeps the pre-dispatch diagnostics.
        let mut bids: Vec<Bid> = Vec::new();
        for _ in 0..sent_bids {
            let Some(result) = rx.recv().await else { break };
            bidders[result.seat] = result.bidder;
            bids.extend(result.bids);
        }

        if shared.cache_markup && !bids.is_empty() {
            let cache = self
                .cache
                .as_ref()
                .ok_or_else(|| AuctionError::CacheFailure("no cache_url configured".to_string()))?;
            let uuids = cache
                .put(deadline, &bids)
                .await
                .map_err(|e| AuctionError::CacheFailure(e.to_string()))?;
            for (bid, uuid) in bids.iter_mut().zip(uuids) {
                bid.cache_id = uuid;
                bid.adm = String::new();
                bid.nurl = String::new();
            }
        }

        if shared.sort_bids {
            bids = sort_bids_add_keywords(
                bids,
                &shared.ad_units,
                account.price_granularity,
                shared.max_key_length,
            );
        }

        tracing::debug!(
            ad_units = shared.ad_units.len(),
            url = %shared.url,
            account = %shared.account_id,
            bids = bids.len(),
            "Auction complete"
        );

        Ok(AuctionResponse {
            tid,
            status,
            bidder_status: bidders,
            bids,
        })
    }
}

/// App traffic has no third-party cookie to miss; everyone else without a
/// single live sync is told so up front.
pub fn response_status(request: &AuctionRequest) -> String {
    if request.app.is_none() && request.cookie.live_sync_count() == 0 {
        STATUS_NO_COOKIE.to_string()
    } else {
        STATUS_OK.to_string()
    }
}
