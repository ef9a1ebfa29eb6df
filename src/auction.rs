//! Auction domain: the lifecycle state machine and the bid rules
//!
//! Everything in here is pure; loading, locking and persisting auctions
//! is the job of [`crate::service::auction_engine`].
use crate::error::{MarketError, MarketResult};
use crate::types::*;
use anyhow::{bail, format_err};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionStatus {
    Draft,
    Pending,
    Scheduled,
    Live,
    Ended,
    Cancelled,
}

impl AuctionStatus {
    pub fn as_str(self) -> &'static str {
        use AuctionStatus::*;
        match self {
            Draft => "draft",
            Pending => "pending",
            Scheduled => "scheduled",
            Live => "live",
            Ended => "ended",
            Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AuctionStatus::Ended | AuctionStatus::Cancelled)
    }
}

impl fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuctionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use AuctionStatus::*;
        Ok(match s {
            "draft" => Draft,
            "pending" => Pending,
            "scheduled" => Scheduled,
            "live" => Live,
            "ended" => Ended,
            "cancelled" => Cancelled,
            other => bail!("unknown auction status: {other}"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Expired,
    BuyNow,
}

impl EndReason {
    pub fn as_str(self) -> &'static str {
        match self {
            EndReason::Expired => "expired",
            EndReason::BuyNow => "buy_now",
        }
    }
}

impl FromStr for EndReason {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "expired" => Ok(EndReason::Expired),
            "buy_now" => Ok(EndReason::BuyNow),
            other => Err(format_err!("unknown end reason: {other}")),
        }
    }
}

/// Who is asking for a status change, relative to the auction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Seller,
    Admin,
    Scheduler,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auction {
    pub id: AuctionId,
    pub listing_id: ListingId,
    pub seller_id: UserId,
    pub status: AuctionStatus,
    pub starting_price: Amount,
    pub min_increment: Amount,
    pub reserve_price: Option<Amount>,
    pub buy_now_price: Option<Amount>,
    pub current_price: Amount,
    pub highest_bidder_id: Option<UserId>,
    pub bid_count: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<EndReason>,
    pub winner_id: Option<UserId>,
    /// Bumped on every write, used for compare-and-swap updates
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAuction {
    pub listing_id: ListingId,
    pub seller_id: UserId,
    pub starting_price: Amount,
    pub min_increment: Amount,
    #[serde(default)]
    pub reserve_price: Option<Amount>,
    #[serde(default)]
    pub buy_now_price: Option<Amount>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl NewAuction {
    pub fn validate(&self) -> MarketResult<()> {
        let invalid = |msg: &str| Err(MarketError::Validation(msg.to_owned()));
        check_amount(self.starting_price, "starting price")?;
        check_amount(self.min_increment, "minimum increment")?;
        if let Some(price) = self.reserve_price {
            check_amount(price, "reserve price")?;
        }
        if let Some(price) = self.buy_now_price {
            check_amount(price, "buy now price")?;
        }
        if self.starting_price == 0 {
            return invalid("starting price must be positive");
        }
        if self.min_increment == 0 {
            return invalid("minimum increment must be positive");
        }
        if self.start_time >= self.end_time {
            return invalid("auction must start before it ends");
        }
        if let Some(buy_now) = self.buy_now_price {
            if buy_now <= self.starting_price {
                return invalid("buy now price must exceed the starting price");
            }
        }
        if let Some(reserve) = self.reserve_price {
            if reserve < self.starting_price {
                return invalid("reserve price cannot be below the starting price");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    pub auction_id: AuctionId,
    pub bidder_id: UserId,
    pub amount: Amount,
    pub placed_at: DateTime<Utc>,
}

/// How an acceptable bid is going to be applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidDecision {
    /// Regular bid, raising the current price
    Raise(Amount),
    /// Bid reached the buy-now price; it is capped to it and ends the auction
    BuyNow(Amount),
}

impl BidDecision {
    pub fn amount(self) -> Amount {
        match self {
            BidDecision::Raise(amount) | BidDecision::BuyNow(amount) => amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    pub user_id: UserId,
    pub amount: Amount,
}

/// What applying an accepted bid changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidEffects {
    /// The previous highest bidder and the amount they had held
    pub previous_bidder: Option<(UserId, Amount)>,
    pub extended_to: Option<DateTime<Utc>>,
    pub ended: bool,
}

impl Auction {
    pub fn create(new: NewAuction, now: DateTime<Utc>) -> MarketResult<Self> {
        new.validate()?;
        Ok(Self {
            id: new_id(),
            listing_id: new.listing_id,
            seller_id: new.seller_id,
            status: AuctionStatus::Draft,
            starting_price: new.starting_price,
            min_increment: new.min_increment,
            reserve_price: new.reserve_price,
            buy_now_price: new.buy_now_price,
            current_price: new.starting_price,
            highest_bidder_id: None,
            bid_count: 0,
            start_time: new.start_time,
            end_time: new.end_time,
            ended_at: None,
            end_reason: None,
            winner_id: None,
            version: 0,
            created_at: now,
        })
    }

    pub fn has_bids(&self) -> bool {
        self.highest_bidder_id.is_some()
    }

    /// The lowest amount the next bid may have
    pub fn min_next_bid(&self) -> Amount {
        if self.has_bids() {
            self.current_price.saturating_add(self.min_increment)
        } else {
            self.starting_price
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.end_time <= now
    }

    pub fn winner(&self) -> Option<Winner> {
        self.winner_id.as_ref().map(|user_id| Winner {
            user_id: user_id.clone(),
            amount: self.current_price,
        })
    }

    pub fn check_transition(
        &self,
        to: AuctionStatus,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> MarketResult<()> {
        use Actor::*;
        use AuctionStatus::*;

        let require = |allowed: &[Actor]| {
            if allowed.contains(&actor) {
                Ok(())
            } else {
                Err(MarketError::Forbidden(format!(
                    "{actor:?} cannot move auction from {} to {to}",
                    self.status
                )))
            }
        };
        let invalid = || Err(MarketError::invalid_transition(self.status, to));

        match (self.status, to) {
            (Draft, Pending) => require(&[Seller]),
            (Pending, Scheduled) => {
                require(&[Admin])?;
                if self.is_expired_at(now) {
                    return invalid();
                }
                Ok(())
            }
            (Pending, Draft) => require(&[Admin]),
            (Scheduled, Live) => {
                require(&[Admin, Scheduler])?;
                if now < self.start_time || self.is_expired_at(now) {
                    return invalid();
                }
                Ok(())
            }
            (Live, Ended) => {
                require(&[Admin, Scheduler])?;
                if !self.is_expired_at(now) {
                    return invalid();
                }
                Ok(())
            }
            (Draft | Pending | Scheduled, Cancelled) => require(&[Seller, Admin, Scheduler]),
            (Live, Cancelled) => {
                require(&[Admin])?;
                if self.has_bids() {
                    return invalid();
                }
                Ok(())
            }
            _ => invalid(),
        }
    }

    /// Validate and apply a status change
    pub fn transition(
        &mut self,
        to: AuctionStatus,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> MarketResult<()> {
        self.check_transition(to, actor, now)?;
        if to == AuctionStatus::Ended {
            self.finish(EndReason::Expired, now);
        } else {
            self.status = to;
        }
        Ok(())
    }

    /// Cancel the auction because its listing was taken off the market
    ///
    /// Unlike a regular cancellation this is allowed with bids standing.
    /// Returns the highest bidder and the amount they had held.
    pub fn withdraw(&mut self) -> MarketResult<Option<(UserId, Amount)>> {
        if self.status.is_terminal() {
            return Err(MarketError::invalid_transition(
                self.status,
                AuctionStatus::Cancelled,
            ));
        }
        self.status = AuctionStatus::Cancelled;
        Ok(self
            .highest_bidder_id
            .clone()
            .map(|bidder_id| (bidder_id, self.current_price)))
    }

    fn finish(&mut self, reason: EndReason, now: DateTime<Utc>) {
        self.status = AuctionStatus::Ended;
        self.ended_at = Some(now);
        self.end_reason = Some(reason);
        self.winner_id = match reason {
            EndReason::BuyNow => self.highest_bidder_id.clone(),
            EndReason::Expired => {
                let reserve_met = self
                    .reserve_price
                    .map(|reserve| self.current_price >= reserve)
                    .unwrap_or(true);
                if reserve_met {
                    self.highest_bidder_id.clone()
                } else {
                    None
                }
            }
        };
    }

    fn ensure_open(&self, now: DateTime<Utc>) -> MarketResult<()> {
        match self.status {
            AuctionStatus::Live => {}
            AuctionStatus::Ended | AuctionStatus::Cancelled => {
                return Err(MarketError::AuctionEnded)
            }
            _ => return Err(MarketError::AuctionNotLive),
        }
        if self.is_expired_at(now) {
            return Err(MarketError::AuctionEnded);
        }
        Ok(())
    }

    /// Check a bid against the auction state
    ///
    /// Wallet balance is not known here and is checked by the caller.
    pub fn check_bid(
        &self,
        bidder: UserIdRef,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> MarketResult<BidDecision> {
        check_amount(amount, "bid")?;
        self.ensure_open(now)?;
        if bidder == self.seller_id {
            return Err(MarketError::SellerCannotBid);
        }
        if self.highest_bidder_id.as_deref() == Some(bidder) {
            return Err(MarketError::AlreadyHighestBidder);
        }
        let minimum = self.min_next_bid();
        if amount < minimum {
            return Err(MarketError::BidTooLow { minimum });
        }
        Ok(match self.buy_now_price {
            Some(buy_now) if buy_now <= amount => BidDecision::BuyNow(buy_now),
            _ => BidDecision::Raise(amount),
        })
    }

    /// Check a buy-now request, returning the price to pay
    pub fn check_buy_now(&self, buyer: UserIdRef, now: DateTime<Utc>) -> MarketResult<Amount> {
        self.ensure_open(now)?;
        if buyer == self.seller_id {
            return Err(MarketError::SellerCannotBid);
        }
        self.buy_now_price.ok_or(MarketError::BuyNowUnavailable)
    }

    /// Apply a bid previously accepted by [`Self::check_bid`] or [`Self::check_buy_now`]
    pub fn apply_bid(
        &mut self,
        bidder: UserIdRef,
        decision: BidDecision,
        now: DateTime<Utc>,
        extension_window: Duration,
    ) -> BidEffects {
        let previous_price = self.current_price;
        let previous_bidder = self
            .highest_bidder_id
            .take()
            .map(|user_id| (user_id, previous_price));

        self.current_price = decision.amount();
        self.highest_bidder_id = Some(bidder.to_owned());
        self.bid_count += 1;

        match decision {
            BidDecision::BuyNow(_) => {
                self.finish(EndReason::BuyNow, now);
                BidEffects {
                    previous_bidder,
                    extended_to: None,
                    ended: true,
                }
            }
            BidDecision::Raise(_) => {
                let extended_to = if Duration::zero() < extension_window
                    && self.end_time - now < extension_window
                {
                    self.end_time = now + extension_window;
                    Some(self.end_time)
                } else {
                    None
                };
                BidEffects {
                    previous_bidder,
                    extended_to,
                    ended: false,
                }
            }
        }
    }
}

/// Query parameters for searching auctions
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuctionFilter {
    pub status: Option<AuctionStatus>,
    pub seller_id: Option<UserId>,
    pub listing_id: Option<ListingId>,
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

impl AuctionFilter {
    pub fn page_size(&self) -> usize {
        self.limit
            .unwrap_or(20)
            .min(crate::listing::MAX_PAGE_SIZE)
    }

    pub fn matches(&self, auction: &Auction) -> bool {
        self.status.map_or(true, |s| auction.status == s)
            && self
                .seller_id
                .as_ref()
                .map_or(true, |s| &auction.seller_id == s)
            && self
                .listing_id
                .as_ref()
                .map_or(true, |l| &auction.listing_id == l)
    }
}
