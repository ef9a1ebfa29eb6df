use super::Harness;
use crate::{
    auction::{AuctionStatus, NewAuction},
    clock::Clock,
    event::{Event, TradeEvent},
    listing::ListingStatus,
    persistence::{Connection, Persistence, Transaction},
    service::LogFollowerService,
    trade::TransactionKind,
};
use anyhow::Result;
use chrono::Duration;

#[test]
fn won_auctions_are_settled_once() -> Result<()> {
    let h = Harness::new();
    let admin = h.admin()?;
    let seller = h.user("seller", 0)?;
    let alice = h.user("alice", 50_000)?;
    let bob = h.user("bob", 50_000)?;
    let listing = h.active_listing(&seller, &admin, None)?;
    let auction = h.live_auction(
        &seller,
        &admin,
        NewAuction {
            starting_price: 10_000,
            min_increment: 1_000,
            ..h.new_auction(&seller, &listing)
        },
    )?;
    h.engine.place_bid(&auction.id, &alice.id, 10_000)?;
    h.engine.place_bid(&auction.id, &bob.id, 20_000)?;
    h.clock.advance(Duration::hours(1));
    h.engine.close_due()?;

    let mut settlement = h.settlement()?;
    assert!(settlement.catch_up()? > 0);

    let trades = h.market.transactions_for(&bob.id)?;
    assert_eq!(trades.len(), 1);
    let record = &trades[0];
    assert_eq!(record.kind, TransactionKind::Auction);
    assert_eq!(record.auction_id.as_deref(), Some(auction.id.as_str()));
    assert_eq!(record.amount, 20_000);
    assert_eq!(record.commission, 1_000);
    assert_eq!(record.seller_proceeds, 19_000);

    assert_eq!(h.balance_of(&bob)?, (30_000, 0));
    assert_eq!(h.balance_of(&alice)?, (50_000, 0));
    assert_eq!(h.balance_of(&seller)?, (19_000, 0));
    assert_eq!(h.market.get_listing(&listing.id)?.status, ListingStatus::Sold);
    assert_eq!(h.market.transactions_for(&seller.id)?, trades);

    assert!(h.events()?.contains(&Event::Trade(TradeEvent::Completed {
        transaction_id: record.id.clone(),
        listing_id: listing.id.clone(),
        buyer_id: bob.id.clone(),
        seller_id: seller.id.clone(),
        amount: 20_000,
    })));

    // the progress was stored, a restarted follower has nothing to do
    assert_eq!(h.settlement()?.catch_up()?, 0);
    Ok(())
}

#[test]
fn redelivered_end_events_are_ignored() -> Result<()> {
    let h = Harness::new();
    let admin = h.admin()?;
    let seller = h.user("seller", 0)?;
    let alice = h.user("alice", 1_000)?;
    let listing = h.active_listing(&seller, &admin, None)?;
    let auction = h.live_auction(
        &seller,
        &admin,
        NewAuction {
            buy_now_price: Some(500),
            ..h.new_auction(&seller, &listing)
        },
    )?;
    h.engine.buy_now(&auction.id, &alice.id)?;
    assert_eq!(
        h.engine.get_auction(&auction.id)?.auction.status,
        AuctionStatus::Ended
    );

    let mut settlement = h.settlement()?;
    settlement.catch_up()?;

    // feed every event through the service a second time
    let mut service = crate::service::Settlement::new(
        h.stores.clone(),
        h.event_writer.clone(),
        h.commission,
        h.clock.clone(),
    );
    let mut conn = h.persistence.get_connection()?;
    let mut tr = conn.start_transaction()?;
    for event in h.events()? {
        service.handle_event(&mut tr, event)?;
    }
    tr.commit()?;

    assert_eq!(h.market.transactions_for(&alice.id)?.len(), 1);
    assert_eq!(h.balance_of(&alice)?, (500, 0));
    assert_eq!(h.balance_of(&seller)?, (475, 0));
    Ok(())
}

#[test]
fn auctions_without_a_winner_are_not_settled() -> Result<()> {
    let h = Harness::new();
    let admin = h.admin()?;
    let seller = h.user("seller", 0)?;
    let listing = h.active_listing(&seller, &admin, None)?;
    h.live_auction(&seller, &admin, h.new_auction(&seller, &listing))?;
    h.clock.set(h.clock.now() + Duration::hours(1));
    assert_eq!(h.engine.close_due()?.closed, 1);

    h.settlement()?.catch_up()?;
    assert!(h.market.transactions_for(&seller.id)?.is_empty());
    assert_eq!(h.market.get_listing(&listing.id)?.status, ListingStatus::Active);
    Ok(())
}
