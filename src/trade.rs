//! Completed sales and the platform commission taken on them
use crate::types::*;
use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Platform fee, in basis points of the sale amount, with a floor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionPolicy {
    pub rate_bps: u32,
    pub min_fee: Amount,
}

impl Default for CommissionPolicy {
    fn default() -> Self {
        Self {
            rate_bps: 500,
            min_fee: 0,
        }
    }
}

impl CommissionPolicy {
    /// Never more than the amount itself
    pub fn commission(&self, amount: Amount) -> Amount {
        let proportional = u128::from(amount) * u128::from(self.rate_bps) / 10_000;
        let proportional = Amount::try_from(proportional).unwrap_or(Amount::MAX);
        proportional.max(self.min_fee).min(amount)
    }

    pub fn quote(&self, amount: Amount) -> CommissionQuote {
        let commission = self.commission(amount);
        CommissionQuote {
            amount,
            commission,
            seller_proceeds: amount - commission,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommissionQuote {
    pub amount: Amount,
    pub commission: Amount,
    pub seller_proceeds: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Won in an auction
    Auction,
    /// Bought at the listing's fixed price
    Direct,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Auction => "auction",
            TransactionKind::Direct => "direct",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "auction" => TransactionKind::Auction,
            "direct" => TransactionKind::Direct,
            other => bail!("unknown transaction kind: {other}"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub kind: TransactionKind,
    pub auction_id: Option<AuctionId>,
    pub listing_id: ListingId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub amount: Amount,
    pub commission: Amount,
    pub seller_proceeds: Amount,
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn new(
        kind: TransactionKind,
        auction_id: Option<AuctionId>,
        listing_id: ListingId,
        buyer_id: UserId,
        seller_id: UserId,
        quote: CommissionQuote,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_id(),
            kind,
            auction_id,
            listing_id,
            buyer_id,
            seller_id,
            amount: quote.amount,
            commission: quote.commission,
            seller_proceeds: quote.seller_proceeds,
            created_at: now,
        }
    }

    pub fn involves(&self, user_id: UserIdRef) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }

    /// The other party of the transaction
    pub fn counterparty(&self, user_id: UserIdRef) -> Option<&UserId> {
        if self.buyer_id == user_id {
            Some(&self.seller_id)
        } else if self.seller_id == user_id {
            Some(&self.buyer_id)
        } else {
            None
        }
    }
}
