//! Server side arbitration of auctions
//!
//! Every operation runs in one persistence transaction that covers the
//! auction row, the affected wallets, the bid history and the events
//! appended to the log. The auction row is locked before anything else
//! and written with compare-and-swap on its `version`. An operation that
//! loses a race, or that the database aborts in favor of a concurrent
//! transaction, is re-run from scratch in a fresh transaction.
use crate::{
    auction::{
        Actor, Auction, AuctionFilter, AuctionStatus, Bid, BidDecision, EndReason, NewAuction,
    },
    clock::SharedClock,
    config::EngineConfig,
    error::{MarketError, MarketResult},
    event::{AuctionEvent, Event},
    event_log::SharedWriter,
    listing::ListingStatus,
    persistence::{Connection, Persistence, Transaction, TransactionOf},
    store::{take_user, Stores},
    types::*,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

/// An auction as shown to clients, with the floor for the next bid
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuctionView {
    #[serde(flatten)]
    pub auction: Auction,
    pub min_next_bid: Amount,
}

impl From<Auction> for AuctionView {
    fn from(auction: Auction) -> Self {
        Self {
            min_next_bid: auction.min_next_bid(),
            auction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BidReceipt {
    pub bid: Bid,
    pub auction: AuctionView,
}

/// Auctions started and closed by one scheduler pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DueReport {
    pub started: usize,
    pub closed: usize,
    pub cancelled: usize,
}

/// Who asks for a status change
#[derive(Debug, Clone, Copy)]
enum Requester<'r> {
    User(UserIdRef<'r>),
    Scheduler,
}

pub struct AuctionEngine<P: Persistence> {
    persistence: P,
    stores: Stores<P>,
    event_writer: SharedWriter<P>,
    clock: SharedClock,
    config: EngineConfig,
}

impl<P: Persistence> Clone for AuctionEngine<P> {
    fn clone(&self) -> Self {
        Self {
            persistence: self.persistence.clone(),
            stores: self.stores.clone(),
            event_writer: self.event_writer.clone(),
            clock: self.clock.clone(),
            config: self.config,
        }
    }
}

impl<P: Persistence> AuctionEngine<P> {
    pub fn new(
        persistence: P,
        stores: Stores<P>,
        event_writer: SharedWriter<P>,
        clock: SharedClock,
        config: EngineConfig,
    ) -> Self {
        Self {
            persistence,
            stores,
            event_writer,
            clock,
            config,
        }
    }

    /// Run `f` in a transaction, committing if it succeeds
    fn in_transaction<T>(
        &self,
        f: impl FnOnce(&mut TransactionOf<'_, P>) -> MarketResult<T>,
    ) -> MarketResult<T> {
        let run = || -> MarketResult<T> {
            let mut connection = self.persistence.get_connection()?;
            let mut transaction = connection.start_transaction()?;
            let res = f(&mut transaction)?;
            transaction.commit()?;
            Ok(res)
        };
        run().map_err(|e| {
            if e.is_conflict() {
                MarketError::ConcurrentUpdate
            } else {
                e
            }
        })
    }

    /// Run `attempt` in fresh transactions until it does not lose a
    /// compare-and-swap, signalled by returning `None`, and is not
    /// aborted by the database in favor of a concurrent transaction
    fn with_retries<T>(
        &self,
        what: &str,
        mut attempt: impl FnMut(&mut TransactionOf<'_, P>) -> MarketResult<Option<T>>,
    ) -> MarketResult<T> {
        for retry in 0..=self.config.bid_retry_limit {
            match self.try_once(&mut attempt) {
                Ok(Some(res)) => return Ok(res),
                Ok(None) => debug!(retry, "{what} lost a concurrent update"),
                Err(e) if e.is_conflict() => {
                    debug!(retry, "{what} conflicted with a concurrent transaction: {e}")
                }
                Err(e) => return Err(e),
            }
        }
        warn!("{what} gave up after {} retries", self.config.bid_retry_limit);
        Err(MarketError::ConcurrentUpdate)
    }

    fn try_once<T>(
        &self,
        attempt: &mut impl FnMut(&mut TransactionOf<'_, P>) -> MarketResult<Option<T>>,
    ) -> MarketResult<Option<T>> {
        let mut connection = self.persistence.get_connection()?;
        let mut transaction = connection.start_transaction()?;
        match attempt(&mut transaction)? {
            Some(res) => {
                transaction.commit()?;
                Ok(Some(res))
            }
            None => {
                transaction.rollback()?;
                Ok(None)
            }
        }
    }

    /// Load an auction and lock it for the rest of the transaction
    fn lock_auction_tr(
        &self,
        conn: &mut TransactionOf<'_, P>,
        id: AuctionIdRef,
    ) -> MarketResult<Auction> {
        self.stores
            .auctions
            .lock_tr(conn, id)?
            .ok_or_else(|| MarketError::not_found("auction", id))
    }

    fn load_auction_tr(
        &self,
        conn: &mut TransactionOf<'_, P>,
        id: AuctionIdRef,
    ) -> MarketResult<Auction> {
        self.stores
            .auctions
            .load_tr(conn, id)?
            .ok_or_else(|| MarketError::not_found("auction", id))
    }

    /// Create a draft auction for an active listing of the seller
    pub fn create_auction(&self, new: NewAuction) -> MarketResult<Auction> {
        let now = self.clock.now();
        self.in_transaction(|conn| {
            let mut listing = self
                .stores
                .listings
                .lock_tr(conn, &new.listing_id)?
                .ok_or_else(|| MarketError::not_found("listing", new.listing_id.as_str()))?;
            if listing.seller_id != new.seller_id {
                return Err(MarketError::Forbidden(
                    "only the seller can auction a listing".into(),
                ));
            }
            if listing.status != ListingStatus::Active {
                return Err(MarketError::ListingUnavailable(format!(
                    "listing is {}",
                    listing.status
                )));
            }
            let auction = Auction::create(new, now)?;

            listing.status = ListingStatus::InAuction;
            self.stores.listings.update_tr(conn, &listing)?;
            self.stores.auctions.insert_tr(conn, &auction)?;

            info!(auction_id = %auction.id, listing_id = %listing.id, "auction created");
            Ok(auction)
        })
    }

    pub fn get_auction(&self, id: AuctionIdRef) -> MarketResult<AuctionView> {
        self.in_transaction(|conn| Ok(self.load_auction_tr(conn, id)?.into()))
    }

    pub fn list_auctions(&self, filter: &AuctionFilter) -> MarketResult<Vec<AuctionView>> {
        self.in_transaction(|conn| {
            Ok(self
                .stores
                .auctions
                .list_tr(conn, filter)?
                .into_iter()
                .map(AuctionView::from)
                .collect())
        })
    }

    /// Bids of an auction, highest first
    pub fn list_bids(&self, auction_id: AuctionIdRef) -> MarketResult<Vec<Bid>> {
        self.in_transaction(|conn| {
            self.load_auction_tr(conn, auction_id)?;
            Ok(self.stores.auctions.bids_tr(conn, auction_id)?)
        })
    }

    /// Change the status of an auction on behalf of a user
    pub fn change_status(
        &self,
        auction_id: AuctionIdRef,
        to: AuctionStatus,
        actor_id: UserIdRef,
    ) -> MarketResult<AuctionView> {
        let now = self.clock.now();
        self.with_retries("status change", |conn| {
            self.transition_tr(conn, auction_id, to, Requester::User(actor_id), now)
        })
        .map(AuctionView::from)
    }

    fn transition_tr(
        &self,
        conn: &mut TransactionOf<'_, P>,
        auction_id: AuctionIdRef,
        to: AuctionStatus,
        requester: Requester,
        now: DateTime<Utc>,
    ) -> MarketResult<Option<Auction>> {
        let mut auction = self.lock_auction_tr(conn, auction_id)?;
        let actor = match requester {
            Requester::Scheduler => Actor::Scheduler,
            Requester::User(user_id) => {
                let user = self
                    .stores
                    .accounts
                    .load_tr(conn, user_id)?
                    .ok_or_else(|| MarketError::not_found("user", user_id))?;
                match (user.id == auction.seller_id, user.is_admin()) {
                    (true, false) => Actor::Seller,
                    (false, true) => Actor::Admin,
                    (false, false) => Actor::Other,
                    (true, true) => {
                        if auction.check_transition(to, Actor::Seller, now).is_ok() {
                            Actor::Seller
                        } else {
                            Actor::Admin
                        }
                    }
                }
            }
        };

        let from = auction.status;
        let expected_version = auction.version;
        auction.transition(to, actor, now)?;
        auction.version += 1;
        if !self
            .stores
            .auctions
            .update_tr(conn, &auction, expected_version)?
        {
            return Ok(None);
        }

        let mut events = vec![Event::Auction(AuctionEvent::StatusChanged {
            auction_id: auction.id.clone(),
            from,
            to,
        })];
        match to {
            AuctionStatus::Cancelled => self.return_listing_tr(conn, &auction.listing_id)?,
            AuctionStatus::Ended => {
                if auction.winner_id.is_none() {
                    self.return_listing_tr(conn, &auction.listing_id)?;
                    if let Some(bidder_id) = &auction.highest_bidder_id {
                        self.release_hold_tr(conn, bidder_id, auction.current_price)?;
                    }
                }
                events.push(ended_event(&auction));
            }
            _ => {}
        }
        self.event_writer.write_tr(conn, &events)?;

        info!(auction_id = %auction.id, %from, %to, ?actor, "auction status changed");
        Ok(Some(auction))
    }

    /// Put the listing of an auction that did not sell back on the market
    fn return_listing_tr(
        &self,
        conn: &mut TransactionOf<'_, P>,
        listing_id: ListingIdRef,
    ) -> MarketResult<()> {
        if let Some(mut listing) = self.stores.listings.lock_tr(conn, listing_id)? {
            if listing.status == ListingStatus::InAuction {
                listing.status = ListingStatus::Active;
                self.stores.listings.update_tr(conn, &listing)?;
            }
        }
        Ok(())
    }

    fn release_hold_tr(
        &self,
        conn: &mut TransactionOf<'_, P>,
        user_id: UserIdRef,
        amount: Amount,
    ) -> MarketResult<()> {
        let mut user = self
            .stores
            .accounts
            .lock_tr(conn, &[user_id])?
            .pop()
            .ok_or_else(|| MarketError::not_found("user", user_id))?;
        user.release(amount);
        self.stores.accounts.update_tr(conn, &user)?;
        Ok(())
    }

    /// Place a bid, holding its amount on the bidder's wallet
    pub fn place_bid(
        &self,
        auction_id: AuctionIdRef,
        bidder_id: UserIdRef,
        amount: Amount,
    ) -> MarketResult<BidReceipt> {
        self.with_retries("bid", |conn| {
            let now = self.clock.now();
            let auction = self.lock_auction_tr(conn, auction_id)?;
            let decision = auction.check_bid(bidder_id, amount, now)?;
            self.apply_bid_tr(conn, auction, bidder_id, decision, now)
        })
    }

    /// Win an auction right away at its buy-now price
    pub fn buy_now(
        &self,
        auction_id: AuctionIdRef,
        buyer_id: UserIdRef,
    ) -> MarketResult<BidReceipt> {
        self.with_retries("buy now", |conn| {
            let now = self.clock.now();
            let auction = self.lock_auction_tr(conn, auction_id)?;
            let price = auction.check_buy_now(buyer_id, now)?;
            self.apply_bid_tr(conn, auction, buyer_id, BidDecision::BuyNow(price), now)
        })
    }

    fn apply_bid_tr(
        &self,
        conn: &mut TransactionOf<'_, P>,
        mut auction: Auction,
        bidder_id: UserIdRef,
        decision: BidDecision,
        now: DateTime<Utc>,
    ) -> MarketResult<Option<BidReceipt>> {
        // both wallets are locked at once so that they are locked in id order
        let previous_id = auction
            .highest_bidder_id
            .clone()
            .filter(|previous_id| previous_id != bidder_id);
        let mut ids = vec![bidder_id];
        ids.extend(previous_id.as_deref());
        let mut users = self.stores.accounts.lock_tr(conn, &ids)?;
        let mut bidder = take_user(&mut users, bidder_id)
            .ok_or_else(|| MarketError::not_found("user", bidder_id))?;
        let mut previous_bidder = match &previous_id {
            Some(previous_id) => Some(
                take_user(&mut users, previous_id)
                    .ok_or_else(|| MarketError::not_found("user", previous_id.as_str()))?,
            ),
            None => None,
        };
        // a buy-now by the highest bidder only needs to cover the difference
        let already_held = if auction.highest_bidder_id.as_deref() == Some(bidder_id) {
            auction.current_price
        } else {
            0
        };
        let amount = decision.amount();
        bidder.ensure_available(amount.saturating_sub(already_held))?;

        let expected_version = auction.version;
        let effects = auction.apply_bid(bidder_id, decision, now, self.config.extension_window);
        auction.version += 1;
        if !self
            .stores
            .auctions
            .update_tr(conn, &auction, expected_version)?
        {
            return Ok(None);
        }

        if let Some((_, previous_amount)) = effects.previous_bidder {
            match previous_bidder.as_mut() {
                Some(previous) => {
                    previous.release(previous_amount);
                    self.stores.accounts.update_tr(conn, previous)?;
                }
                None => bidder.release(previous_amount),
            }
        }
        bidder.hold(amount)?;
        self.stores.accounts.update_tr(conn, &bidder)?;

        let bid = Bid {
            id: new_id(),
            auction_id: auction.id.clone(),
            bidder_id: bidder_id.to_owned(),
            amount,
            placed_at: now,
        };
        self.stores.auctions.insert_bid_tr(conn, &bid)?;

        let mut events = vec![Event::Auction(AuctionEvent::BidPlaced {
            auction_id: auction.id.clone(),
            bidder_id: bidder_id.to_owned(),
            amount,
            previous_bidder_id: previous_id,
        })];
        if let Some(end_time) = effects.extended_to {
            debug!(auction_id = %auction.id, %end_time, "auction extended by a late bid");
            events.push(Event::Auction(AuctionEvent::Extended {
                auction_id: auction.id.clone(),
                end_time,
            }));
        }
        if effects.ended {
            events.push(Event::Auction(AuctionEvent::StatusChanged {
                auction_id: auction.id.clone(),
                from: AuctionStatus::Live,
                to: AuctionStatus::Ended,
            }));
            events.push(ended_event(&auction));
        }
        self.event_writer.write_tr(conn, &events)?;

        info!(
            auction_id = %auction.id,
            bidder_id,
            amount,
            ended = effects.ended,
            "bid accepted"
        );
        Ok(Some(BidReceipt {
            bid,
            auction: auction.into(),
        }))
    }

    /// Start scheduled auctions whose start time has come
    ///
    /// Scheduled auctions that already ran past their end without ever
    /// starting are cancelled instead.
    pub fn start_due(&self) -> MarketResult<DueReport> {
        let now = self.clock.now();
        let due = self.in_transaction(|conn| Ok(self.stores.auctions.due_to_start_tr(conn, now)?))?;

        let mut report = DueReport::default();
        for auction in due {
            let to = if auction.is_expired_at(now) {
                AuctionStatus::Cancelled
            } else {
                AuctionStatus::Live
            };
            match self.scheduled_transition(&auction.id, to, now) {
                Ok(()) if to == AuctionStatus::Live => report.started += 1,
                Ok(()) => report.cancelled += 1,
                Err(e) if is_race(&e) => {
                    debug!(auction_id = %auction.id, "auction changed before it could start: {e}")
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    /// End live auctions whose end time has passed
    pub fn close_due(&self) -> MarketResult<DueReport> {
        let now = self.clock.now();
        let due = self.in_transaction(|conn| Ok(self.stores.auctions.due_to_close_tr(conn, now)?))?;

        let mut report = DueReport::default();
        for auction in due {
            match self.scheduled_transition(&auction.id, AuctionStatus::Ended, now) {
                Ok(()) => report.closed += 1,
                Err(e) if is_race(&e) => {
                    debug!(auction_id = %auction.id, "auction changed before it could close: {e}")
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    fn scheduled_transition(
        &self,
        auction_id: AuctionIdRef,
        to: AuctionStatus,
        now: DateTime<Utc>,
    ) -> MarketResult<()> {
        self.with_retries("scheduled status change", |conn| {
            self.transition_tr(conn, auction_id, to, Requester::Scheduler, now)
        })
        .map(|_| ())
    }
}

fn ended_event(auction: &Auction) -> Event {
    Event::Auction(AuctionEvent::Ended {
        auction_id: auction.id.clone(),
        listing_id: auction.listing_id.clone(),
        seller_id: auction.seller_id.clone(),
        winner: auction.winner(),
        reason: auction.end_reason.unwrap_or(EndReason::Expired),
    })
}

/// The auction was changed by someone else between listing and updating it
fn is_race(e: &MarketError) -> bool {
    matches!(
        e,
        MarketError::InvalidTransition { .. } | MarketError::ConcurrentUpdate
    )
}
