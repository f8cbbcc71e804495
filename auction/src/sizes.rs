//! Banner size reconciliation.
//!
//! Bidders sometimes return banner creatives without dimensions. When the
//! originating ad unit declared exactly one size there is nothing to guess,
//! so the bid inherits it; with several declared sizes the bidder failed to
//! disambiguate and the bid is dropped.

use crate::request::{Bid, BidderRequest, MEDIA_TYPE_BANNER};

/// Fills or drops dimensionless banner bids; everything else passes through.
/// Pure on its input, returns the compacted list.
pub fn reconcile_sizes(bids: Vec<Bid>, bidder: &BidderRequest) -> Vec<Bid> {
    let mut valid = Vec::with_capacity(bids.len());

    'bids: for mut bid in bids {
        if bid.creative_media_type != MEDIA_TYPE_BANNER || (bid.width != 0 && bid.height != 0) {
            valid.push(bid);
            continue;
        }

        for unit in &bidder.ad_units {
            if unit.bid_id == bid.bid_id && unit.code == bid.ad_unit_code {
                match unit.sizes.len() {
                    1 => {
                        bid.width = unit.sizes[0].w;
                        bid.height = unit.sizes[0].h;
                        valid.push(bid);
                    }
                    n if n > 1 => {
                        tracing::warn!(
                            bidder = %bid.bidder_code,
                            ad_unit = %bid.ad_unit_code,
                            "Bid rejected because no size was defined"
                        );
                    }
                    _ => {}
                }
                continue 'bids;
            }
        }
        // No matching ad unit: drop silently.
    }

    valid
}
