use crate::{persistence, types::Amount};
use thiserror::Error;

/// Errors reported back to API callers
///
/// Every variant has a stable machine-readable code that clients switch
/// on; the message is for humans.
#[derive(Error, Debug)]
pub enum MarketError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("not allowed: {0}")]
    Forbidden(String),
    #[error("bid is too low, minimum is {minimum}")]
    BidTooLow { minimum: Amount },
    #[error("auction already ended")]
    AuctionEnded,
    #[error("auction is not live")]
    AuctionNotLive,
    #[error("seller cannot bid on own auction")]
    SellerCannotBid,
    #[error("seller cannot buy own listing")]
    SellerCannotBuy,
    #[error("bidder already holds the highest bid")]
    AlreadyHighestBidder,
    #[error("insufficient balance: {available} available, {required} required")]
    InsufficientBalance { available: Amount, required: Amount },
    #[error("buy now is not available for this auction")]
    BuyNowUnavailable,
    #[error("cannot change status from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("listing is not available: {0}")]
    ListingUnavailable(String),
    #[error("transaction already reviewed by this user")]
    AlreadyReviewed,
    #[error("concurrent update, try again")]
    ConcurrentUpdate,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl MarketError {
    pub fn code(&self) -> &'static str {
        use MarketError::*;
        match self {
            NotFound { .. } => "NOT_FOUND",
            Validation(_) => "VALIDATION_ERROR",
            Forbidden(_) => "FORBIDDEN",
            BidTooLow { .. } => "BID_TOO_LOW",
            AuctionEnded => "AUCTION_ENDED",
            AuctionNotLive => "AUCTION_NOT_LIVE",
            SellerCannotBid => "SELLER_CANNOT_BID",
            SellerCannotBuy => "SELLER_CANNOT_BUY",
            AlreadyHighestBidder => "ALREADY_HIGHEST_BIDDER",
            InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            BuyNowUnavailable => "BUY_NOW_UNAVAILABLE",
            InvalidTransition { .. } => "INVALID_STATUS_TRANSITION",
            ListingUnavailable(_) => "LISTING_UNAVAILABLE",
            AlreadyReviewed => "ALREADY_REVIEWED",
            ConcurrentUpdate => "CONCURRENT_UPDATE",
            Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        MarketError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// The storage backend aborted the transaction in favor of a
    /// concurrent one; running it again may succeed
    pub fn is_conflict(&self) -> bool {
        matches!(self, MarketError::Internal(e) if persistence::is_conflict(e))
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        MarketError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

pub type MarketResult<T> = std::result::Result<T, MarketError>;
