//! Users, wallets, listings and everything around a sale that is not an auction
use crate::{
    auction::{Auction, AuctionFilter, AuctionStatus},
    clock::SharedClock,
    error::{MarketError, MarketResult},
    event::{AuctionEvent, Event, TradeEvent},
    event_log::SharedWriter,
    listing::{Favorite, Listing, ListingFilter, ListingStatus, NewListing},
    notification::Notification,
    persistence::{Connection, Persistence, Transaction, TransactionOf},
    review::{NewReview, Review, ReviewSummary},
    store::{take_user, Stores},
    trade::{CommissionPolicy, CommissionQuote, TransactionKind, TransactionRecord},
    types::*,
    user::{NewUser, User},
};
use tracing::info;

/// Default and maximum number of notifications returned at once
const NOTIFICATION_PAGE: usize = 50;

pub struct Marketplace<P: Persistence> {
    persistence: P,
    stores: Stores<P>,
    event_writer: SharedWriter<P>,
    clock: SharedClock,
    commission: CommissionPolicy,
}

impl<P: Persistence> Clone for Marketplace<P> {
    fn clone(&self) -> Self {
        Self {
            persistence: self.persistence.clone(),
            stores: self.stores.clone(),
            event_writer: self.event_writer.clone(),
            clock: self.clock.clone(),
            commission: self.commission,
        }
    }
}

impl<P: Persistence> Marketplace<P> {
    pub fn new(
        persistence: P,
        stores: Stores<P>,
        event_writer: SharedWriter<P>,
        clock: SharedClock,
        commission: CommissionPolicy,
    ) -> Self {
        Self {
            persistence,
            stores,
            event_writer,
            clock,
            commission,
        }
    }

    /// Run `f` in a transaction, committing if it succeeds
    ///
    /// Losing to a concurrent transaction is reported as
    /// [`MarketError::ConcurrentUpdate`].
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
        run().map_err(|e: MarketError| {
            if e.is_conflict() {
                MarketError::ConcurrentUpdate
            } else {
                e
            }
        })
    }

    fn lock_user_tr(&self, conn: &mut TransactionOf<'_, P>, id: UserIdRef) -> MarketResult<User> {
        self.stores
            .accounts
            .lock_tr(conn, &[id])?
            .pop()
            .ok_or_else(|| MarketError::not_found("user", id))
    }

    fn lock_listing_tr(
        &self,
        conn: &mut TransactionOf<'_, P>,
        id: ListingIdRef,
    ) -> MarketResult<Listing> {
        self.stores
            .listings
            .lock_tr(conn, id)?
            .ok_or_else(|| MarketError::not_found("listing", id))
    }

    fn load_user_tr(&self, conn: &mut TransactionOf<'_, P>, id: UserIdRef) -> MarketResult<User> {
        self.stores
            .accounts
            .load_tr(conn, id)?
            .ok_or_else(|| MarketError::not_found("user", id))
    }

    fn load_listing_tr(
        &self,
        conn: &mut TransactionOf<'_, P>,
        id: ListingIdRef,
    ) -> MarketResult<Listing> {
        self.stores
            .listings
            .load_tr(conn, id)?
            .ok_or_else(|| MarketError::not_found("listing", id))
    }

    pub fn create_user(&self, new: NewUser) -> MarketResult<User> {
        let user = User::create(new, self.clock.now())?;
        self.in_transaction(|conn| {
            if self
                .stores
                .accounts
                .find_by_email_tr(conn, &user.email)?
                .is_some()
            {
                return Err(MarketError::Validation(format!(
                    "email {} is already registered",
                    user.email
                )));
            }
            self.stores.accounts.insert_tr(conn, &user)?;
            info!(user_id = %user.id, "user created");
            Ok(user)
        })
    }

    pub fn get_user(&self, id: UserIdRef) -> MarketResult<User> {
        self.in_transaction(|conn| self.load_user_tr(conn, id))
    }

    /// Top up a wallet
    pub fn deposit(&self, user_id: UserIdRef, amount: Amount) -> MarketResult<User> {
        self.in_transaction(|conn| {
            let mut user = self.lock_user_tr(conn, user_id)?;
            user.deposit(amount)?;
            self.stores.accounts.update_tr(conn, &user)?;
            info!(user_id, amount, "deposit");
            Ok(user)
        })
    }

    /// Take funds out of a wallet; held funds can't be withdrawn
    pub fn withdraw(&self, user_id: UserIdRef, amount: Amount) -> MarketResult<User> {
        self.in_transaction(|conn| {
            let mut user = self.lock_user_tr(conn, user_id)?;
            user.withdraw(amount)?;
            self.stores.accounts.update_tr(conn, &user)?;
            info!(user_id, amount, "withdrawal");
            Ok(user)
        })
    }

    pub fn create_listing(&self, new: NewListing) -> MarketResult<Listing> {
        let listing = Listing::create(new, self.clock.now())?;
        self.in_transaction(|conn| {
            self.load_user_tr(conn, &listing.seller_id)?;
            self.stores.listings.insert_tr(conn, &listing)?;
            info!(listing_id = %listing.id, seller_id = %listing.seller_id, "listing created");
            Ok(listing)
        })
    }

    pub fn get_listing(&self, id: ListingIdRef) -> MarketResult<Listing> {
        self.in_transaction(|conn| self.load_listing_tr(conn, id))
    }

    pub fn list_listings(&self, filter: &ListingFilter) -> MarketResult<Vec<Listing>> {
        self.in_transaction(|conn| Ok(self.stores.listings.list_tr(conn, filter)?))
    }

    /// Approve, reject or archive a listing
    ///
    /// Archiving a listing that is being auctioned withdraws its auction,
    /// releasing the funds held by the highest bid.
    pub fn change_listing_status(
        &self,
        listing_id: ListingIdRef,
        to: ListingStatus,
        actor_id: UserIdRef,
    ) -> MarketResult<Listing> {
        self.in_transaction(|conn| {
            let actor = self.load_user_tr(conn, actor_id)?;
            // auction rows are locked before listing rows
            let auction = if to == ListingStatus::Archived
                && self.load_listing_tr(conn, listing_id)?.status == ListingStatus::InAuction
            {
                self.lock_open_auction_tr(conn, listing_id)?
            } else {
                None
            };

            let mut listing = self.lock_listing_tr(conn, listing_id)?;
            let from = listing.status;
            listing.transition(to, actor.is_admin(), listing.seller_id == actor.id)?;

            let mut events = vec![];
            if let (ListingStatus::InAuction, Some(auction)) = (from, auction) {
                events.push(self.withdraw_auction_tr(conn, auction)?);
            }
            self.stores.listings.update_tr(conn, &listing)?;
            self.event_writer.write_tr(conn, &events)?;

            info!(listing_id, %from, %to, actor_id, "listing status changed");
            Ok(listing)
        })
    }

    /// The auction of a listing that has not ended or been cancelled yet
    fn lock_open_auction_tr(
        &self,
        conn: &mut TransactionOf<'_, P>,
        listing_id: ListingIdRef,
    ) -> MarketResult<Option<Auction>> {
        let filter = AuctionFilter {
            listing_id: Some(listing_id.to_owned()),
            ..Default::default()
        };
        let open = self
            .stores
            .auctions
            .list_tr(conn, &filter)?
            .into_iter()
            .find(|auction| !auction.status.is_terminal());
        let Some(open) = open else {
            return Ok(None);
        };
        Ok(self
            .stores
            .auctions
            .lock_tr(conn, &open.id)?
            .filter(|auction| !auction.status.is_terminal()))
    }

    fn withdraw_auction_tr(
        &self,
        conn: &mut TransactionOf<'_, P>,
        mut auction: Auction,
    ) -> MarketResult<Event> {
        let from = auction.status;
        let expected_version = auction.version;
        let released = auction.withdraw()?;
        auction.version += 1;
        if !self
            .stores
            .auctions
            .update_tr(conn, &auction, expected_version)?
        {
            return Err(MarketError::ConcurrentUpdate);
        }
        if let Some((bidder_id, amount)) = released {
            let mut bidder = self.lock_user_tr(conn, &bidder_id)?;
            bidder.release(amount);
            self.stores.accounts.update_tr(conn, &bidder)?;
            info!(auction_id = %auction.id, %bidder_id, amount, "bid hold released");
        }
        info!(auction_id = %auction.id, listing_id = %auction.listing_id, "auction withdrawn");
        Ok(Event::Auction(AuctionEvent::StatusChanged {
            auction_id: auction.id,
            from,
            to: AuctionStatus::Cancelled,
        }))
    }

    /// Buy a listing at its fixed price
    pub fn purchase_listing(
        &self,
        listing_id: ListingIdRef,
        buyer_id: UserIdRef,
    ) -> MarketResult<TransactionRecord> {
        let now = self.clock.now();
        self.in_transaction(|conn| {
            let mut listing = self.lock_listing_tr(conn, listing_id)?;
            if listing.status != ListingStatus::Active {
                return Err(MarketError::ListingUnavailable(format!(
                    "listing is {}",
                    listing.status
                )));
            }
            let price = listing.price.ok_or_else(|| {
                MarketError::ListingUnavailable("listing is only sold by auction".into())
            })?;
            if listing.seller_id == buyer_id {
                return Err(MarketError::SellerCannotBuy);
            }

            let quote = self.commission.quote(price);

            let mut users = self
                .stores
                .accounts
                .lock_tr(conn, &[buyer_id, listing.seller_id.as_str()])?;
            let mut buyer = take_user(&mut users, buyer_id)
                .ok_or_else(|| MarketError::not_found("user", buyer_id))?;
            let mut seller = take_user(&mut users, &listing.seller_id)
                .ok_or_else(|| MarketError::not_found("user", listing.seller_id.as_str()))?;

            buyer.charge(price)?;
            self.stores.accounts.update_tr(conn, &buyer)?;
            seller.credit(quote.seller_proceeds);
            self.stores.accounts.update_tr(conn, &seller)?;

            listing.status = ListingStatus::Sold;
            self.stores.listings.update_tr(conn, &listing)?;

            let record = TransactionRecord::new(
                TransactionKind::Direct,
                None,
                listing.id.clone(),
                buyer.id.clone(),
                seller.id.clone(),
                quote,
                now,
            );
            self.stores.trades.insert_tr(conn, &record)?;
            self.event_writer.write_tr(
                conn,
                &[Event::Trade(TradeEvent::Completed {
                    transaction_id: record.id.clone(),
                    listing_id: record.listing_id.clone(),
                    buyer_id: record.buyer_id.clone(),
                    seller_id: record.seller_id.clone(),
                    amount: record.amount,
                })],
            )?;

            info!(
                transaction_id = %record.id,
                listing_id,
                buyer_id,
                amount = record.amount,
                commission = record.commission,
                "listing purchased"
            );
            Ok(record)
        })
    }

    /// Returns `false` if the listing already was a favorite
    pub fn add_favorite(&self, user_id: UserIdRef, listing_id: ListingIdRef) -> MarketResult<bool> {
        let now = self.clock.now();
        self.in_transaction(|conn| {
            self.load_user_tr(conn, user_id)?;
            self.load_listing_tr(conn, listing_id)?;
            let favorite = Favorite {
                user_id: user_id.to_owned(),
                listing_id: listing_id.to_owned(),
                created_at: now,
            };
            Ok(self.stores.favorites.add_tr(conn, &favorite)?)
        })
    }

    /// Returns `false` if the listing was not a favorite
    pub fn remove_favorite(
        &self,
        user_id: UserIdRef,
        listing_id: ListingIdRef,
    ) -> MarketResult<bool> {
        self.in_transaction(|conn| Ok(self.stores.favorites.remove_tr(conn, user_id, listing_id)?))
    }

    pub fn favorites(&self, user_id: UserIdRef) -> MarketResult<Vec<Favorite>> {
        self.in_transaction(|conn| {
            self.load_user_tr(conn, user_id)?;
            Ok(self.stores.favorites.list_tr(conn, user_id)?)
        })
    }

    /// Review the other party of a transaction
    pub fn create_review(&self, new: NewReview) -> MarketResult<Review> {
        new.validate()?;
        let now = self.clock.now();
        self.in_transaction(|conn| {
            let record = self
                .stores
                .trades
                .load_tr(conn, &new.transaction_id)?
                .ok_or_else(|| MarketError::not_found("transaction", new.transaction_id.as_str()))?;
            let reviewee_id = record
                .counterparty(&new.reviewer_id)
                .ok_or_else(|| {
                    MarketError::Forbidden("only the buyer or the seller can review".into())
                })?
                .clone();
            if self
                .stores
                .reviews
                .find_tr(conn, &new.transaction_id, &new.reviewer_id)?
                .is_some()
            {
                return Err(MarketError::AlreadyReviewed);
            }

            let review = Review {
                id: new_id(),
                transaction_id: new.transaction_id,
                reviewer_id: new.reviewer_id,
                reviewee_id,
                rating: new.rating,
                comment: new.comment,
                created_at: now,
            };
            self.stores.reviews.insert_tr(conn, &review)?;
            info!(
                review_id = %review.id,
                transaction_id = %review.transaction_id,
                "review created"
            );
            Ok(review)
        })
    }

    /// Reviews received by a user, with their average rating
    pub fn reviews_for(&self, user_id: UserIdRef) -> MarketResult<ReviewSummary> {
        self.in_transaction(|conn| {
            self.load_user_tr(conn, user_id)?;
            let reviews = self.stores.reviews.list_for_reviewee_tr(conn, user_id)?;
            Ok(ReviewSummary::new(user_id.to_owned(), reviews))
        })
    }

    /// A user's notifications, newest first
    pub fn notifications(
        &self,
        user_id: UserIdRef,
        limit: Option<usize>,
    ) -> MarketResult<Vec<Notification>> {
        let limit = limit.unwrap_or(NOTIFICATION_PAGE).min(NOTIFICATION_PAGE);
        self.in_transaction(|conn| {
            self.load_user_tr(conn, user_id)?;
            Ok(self
                .stores
                .notifications
                .list_for_user_tr(conn, user_id, limit)?)
        })
    }

    pub fn mark_notification_read(
        &self,
        notification_id: NotificationIdRef,
        user_id: UserIdRef,
    ) -> MarketResult<Notification> {
        self.in_transaction(|conn| {
            let mut notification = self
                .stores
                .notifications
                .load_tr(conn, notification_id)?
                .ok_or_else(|| MarketError::not_found("notification", notification_id))?;
            if notification.user_id != user_id {
                return Err(MarketError::Forbidden(
                    "notification belongs to another user".into(),
                ));
            }
            self.stores.notifications.mark_read_tr(conn, notification_id)?;
            notification.read = true;
            Ok(notification)
        })
    }

    pub fn get_transaction(&self, id: TransactionIdRef) -> MarketResult<TransactionRecord> {
        self.in_transaction(|conn| {
            self.stores
                .trades
                .load_tr(conn, id)?
                .ok_or_else(|| MarketError::not_found("transaction", id))
        })
    }

    /// Purchases and sales of a user, newest first
    pub fn transactions_for(&self, user_id: UserIdRef) -> MarketResult<Vec<TransactionRecord>> {
        self.in_transaction(|conn| {
            self.load_user_tr(conn, user_id)?;
            Ok(self.stores.trades.list_for_user_tr(conn, user_id)?)
        })
    }

    pub fn commission_quote(&self, amount: Amount) -> CommissionQuote {
        self.commission.quote(amount)
    }
}
