use super::LogFollowerService;
use crate::{
    auction::Winner,
    clock::SharedClock,
    event::{AuctionEvent, Event, TradeEvent},
    event_log::SharedWriter,
    listing::ListingStatus,
    persistence::{Persistence, TransactionOf},
    store::{take_user, Stores},
    trade::{CommissionPolicy, TransactionKind, TransactionRecord},
    types::*,
};
use anyhow::{format_err, Result};
use tracing::{debug, info};

/// Turns won auctions into completed transactions
///
/// The winner pays out of the funds held by their winning bid and the
/// seller is credited with the price minus the platform commission.
pub struct Settlement<P: Persistence> {
    stores: Stores<P>,
    event_writer: SharedWriter<P>,
    commission: CommissionPolicy,
    clock: SharedClock,
}

impl<P: Persistence> Settlement<P> {
    pub fn new(
        stores: Stores<P>,
        event_writer: SharedWriter<P>,
        commission: CommissionPolicy,
        clock: SharedClock,
    ) -> Self {
        Self {
            stores,
            event_writer,
            commission,
            clock,
        }
    }

    fn settle_tr(
        &self,
        conn: &mut TransactionOf<'_, P>,
        auction_id: AuctionId,
        listing_id: ListingId,
        seller_id: UserId,
        winner: Winner,
    ) -> Result<()> {
        if let Some(existing) = self.stores.trades.find_by_auction_tr(conn, &auction_id)? {
            debug!(%auction_id, transaction_id = %existing.id, "auction already settled");
            return Ok(());
        }

        let quote = self.commission.quote(winner.amount);

        if let Some(mut listing) = self.stores.listings.lock_tr(conn, &listing_id)? {
            listing.status = ListingStatus::Sold;
            self.stores.listings.update_tr(conn, &listing)?;
        }

        let mut users = self
            .stores
            .accounts
            .lock_tr(conn, &[winner.user_id.as_str(), seller_id.as_str()])?;
        let mut buyer = take_user(&mut users, &winner.user_id).ok_or_else(|| {
            format_err!("winner {} of auction {auction_id} not found", winner.user_id)
        })?;
        let mut seller = take_user(&mut users, &seller_id)
            .ok_or_else(|| format_err!("seller {seller_id} of auction {auction_id} not found"))?;

        buyer.capture(quote.amount)?;
        self.stores.accounts.update_tr(conn, &buyer)?;
        seller.credit(quote.seller_proceeds);
        self.stores.accounts.update_tr(conn, &seller)?;

        let record = TransactionRecord::new(
            TransactionKind::Auction,
            Some(auction_id),
            listing_id,
            winner.user_id,
            seller_id,
            quote,
            self.clock.now(),
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
            auction_id = ?record.auction_id,
            amount = record.amount,
            commission = record.commission,
            "auction settled"
        );
        Ok(())
    }
}

impl<P: Persistence> LogFollowerService<P> for Settlement<P> {
    fn get_log_progress_id(&self) -> String {
        "settlement".into()
    }

    fn handle_event<'a>(&mut self, conn: &mut TransactionOf<'a, P>, event: Event) -> Result<()> {
        match event {
            Event::Auction(AuctionEvent::Ended {
                auction_id,
                listing_id,
                seller_id,
                winner: Some(winner),
                ..
            }) => self.settle_tr(conn, auction_id, listing_id, seller_id, winner),
            _ => Ok(()),
        }
    }
}
