use crate::auction::{AuctionStatus, EndReason, Winner};
use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// All services depend on this type and it names events of each of
// them. Fine while everything lives in one crate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    Auction(AuctionEvent),
    Trade(TradeEvent),
    #[cfg(test)]
    Test,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionEvent {
    StatusChanged {
        auction_id: AuctionId,
        from: AuctionStatus,
        to: AuctionStatus,
    },
    BidPlaced {
        auction_id: AuctionId,
        bidder_id: UserId,
        amount: Amount,
        previous_bidder_id: Option<UserId>,
    },
    /// A late bid pushed the end of the auction
    Extended {
        auction_id: AuctionId,
        end_time: DateTime<Utc>,
    },
    Ended {
        auction_id: AuctionId,
        listing_id: ListingId,
        seller_id: UserId,
        winner: Option<Winner>,
        reason: EndReason,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeEvent {
    Completed {
        transaction_id: TransactionId,
        listing_id: ListingId,
        buyer_id: UserId,
        seller_id: UserId,
        amount: Amount,
    },
}
