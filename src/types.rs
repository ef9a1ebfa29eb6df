use crate::error::{MarketError, MarketResult};

/// Money, in VND. There are no minor units.
pub type Amount = u64;

/// Largest amount that can be stored
pub const MAX_AMOUNT: Amount = i64::MAX as Amount;

pub fn check_amount(amount: Amount, what: &str) -> MarketResult<()> {
    if MAX_AMOUNT < amount {
        return Err(MarketError::Validation(format!(
            "{what} cannot exceed {MAX_AMOUNT}"
        )));
    }
    Ok(())
}

pub type UserId = String;
pub type UserIdRef<'s> = &'s str;
pub type ListingId = String;
pub type ListingIdRef<'s> = &'s str;
pub type AuctionId = String;
pub type AuctionIdRef<'s> = &'s str;
pub type BidId = String;
pub type TransactionId = String;
pub type TransactionIdRef<'s> = &'s str;
pub type ReviewId = String;
pub type NotificationId = String;
pub type NotificationIdRef<'s> = &'s str;

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
