use crate::types::*;
use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Outbid,
    AuctionWon,
    AuctionEnded,
    PurchaseCompleted,
    SaleCompleted,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        use NotificationKind::*;
        match self {
            Outbid => "outbid",
            AuctionWon => "auction_won",
            AuctionEnded => "auction_ended",
            PurchaseCompleted => "purchase_completed",
            SaleCompleted => "sale_completed",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use NotificationKind::*;
        Ok(match s {
            "outbid" => Outbid,
            "auction_won" => AuctionWon,
            "auction_ended" => AuctionEnded,
            "purchase_completed" => PurchaseCompleted,
            "sale_completed" => SaleCompleted,
            other => bail!("unknown notification kind: {other}"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub message: String,
    pub auction_id: Option<AuctionId>,
    pub listing_id: Option<ListingId>,
    pub transaction_id: Option<TransactionId>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: UserId,
        kind: NotificationKind,
        message: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_id(),
            user_id,
            kind,
            message,
            auction_id: None,
            listing_id: None,
            transaction_id: None,
            read: false,
            created_at,
        }
    }

    pub fn with_auction(mut self, auction_id: AuctionId) -> Self {
        self.auction_id = Some(auction_id);
        self
    }

    pub fn with_listing(mut self, listing_id: ListingId) -> Self {
        self.listing_id = Some(listing_id);
        self
    }

    pub fn with_transaction(mut self, transaction_id: TransactionId) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }
}
