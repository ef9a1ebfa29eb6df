use super::start_time;
use crate::{
    auction::*,
    error::MarketError,
    trade::CommissionPolicy,
    types::MAX_AMOUNT,
    user::{NewUser, Role, User},
};
use anyhow::Result;
use chrono::Duration;

fn new_auction() -> NewAuction {
    NewAuction {
        listing_id: "listing".into(),
        seller_id: "seller".into(),
        starting_price: 1_000,
        min_increment: 100,
        reserve_price: None,
        buy_now_price: Some(5_000),
        start_time: start_time(),
        end_time: start_time() + Duration::hours(2),
    }
}

fn live_auction() -> Result<Auction> {
    let mut auction = Auction::create(new_auction(), start_time())?;
    auction.status = AuctionStatus::Live;
    Ok(auction)
}

#[test]
fn new_auctions_are_validated() -> Result<()> {
    let now = start_time();
    for broken in [
        NewAuction {
            starting_price: 0,
            ..new_auction()
        },
        NewAuction {
            min_increment: 0,
            ..new_auction()
        },
        NewAuction {
            end_time: start_time(),
            ..new_auction()
        },
        NewAuction {
            buy_now_price: Some(1_000),
            ..new_auction()
        },
        NewAuction {
            reserve_price: Some(999),
            ..new_auction()
        },
        NewAuction {
            buy_now_price: Some(u64::MAX),
            ..new_auction()
        },
        NewAuction {
            starting_price: MAX_AMOUNT + 1,
            buy_now_price: None,
            ..new_auction()
        },
    ] {
        assert!(matches!(
            Auction::create(broken, now),
            Err(MarketError::Validation(_))
        ));
    }

    let auction = Auction::create(new_auction(), now)?;
    assert_eq!(auction.status, AuctionStatus::Draft);
    assert_eq!(auction.current_price, 1_000);
    assert_eq!(auction.min_next_bid(), 1_000);
    Ok(())
}

#[test]
fn status_transitions_follow_the_lifecycle() -> Result<()> {
    let now = start_time();
    let mut auction = Auction::create(new_auction(), now)?;

    assert!(matches!(
        auction.check_transition(AuctionStatus::Live, Actor::Admin, now),
        Err(MarketError::InvalidTransition { .. })
    ));
    assert!(matches!(
        auction.check_transition(AuctionStatus::Pending, Actor::Other, now),
        Err(MarketError::Forbidden(_))
    ));

    auction.transition(AuctionStatus::Pending, Actor::Seller, now)?;
    assert!(matches!(
        auction.check_transition(AuctionStatus::Scheduled, Actor::Seller, now),
        Err(MarketError::Forbidden(_))
    ));
    auction.transition(AuctionStatus::Scheduled, Actor::Admin, now)?;

    // not before the start time
    assert!(matches!(
        auction.check_transition(AuctionStatus::Live, Actor::Scheduler, now - Duration::seconds(1)),
        Err(MarketError::InvalidTransition { .. })
    ));
    auction.transition(AuctionStatus::Live, Actor::Scheduler, now)?;

    // not before the end time
    assert!(matches!(
        auction.check_transition(AuctionStatus::Ended, Actor::Scheduler, now),
        Err(MarketError::InvalidTransition { .. })
    ));
    let end = auction.end_time;
    auction.transition(AuctionStatus::Ended, Actor::Scheduler, end)?;
    assert_eq!(auction.end_reason, Some(EndReason::Expired));
    assert_eq!(auction.ended_at, Some(end));
    assert_eq!(auction.winner_id, None);

    for to in [AuctionStatus::Live, AuctionStatus::Cancelled, AuctionStatus::Draft] {
        assert!(matches!(
            auction.check_transition(to, Actor::Admin, end),
            Err(MarketError::InvalidTransition { .. })
        ));
    }
    Ok(())
}

#[test]
fn live_auctions_with_bids_cannot_be_cancelled() -> Result<()> {
    let now = start_time();
    let mut auction = live_auction()?;
    assert!(matches!(
        auction.check_transition(AuctionStatus::Cancelled, Actor::Seller, now),
        Err(MarketError::Forbidden(_))
    ));
    auction.check_transition(AuctionStatus::Cancelled, Actor::Admin, now)?;

    let decision = auction.check_bid("bidder", 1_000, now)?;
    auction.apply_bid("bidder", decision, now, Duration::zero());
    assert!(matches!(
        auction.check_transition(AuctionStatus::Cancelled, Actor::Admin, now),
        Err(MarketError::InvalidTransition { .. })
    ));
    Ok(())
}

#[test]
fn bids_are_checked_in_order() -> Result<()> {
    let now = start_time();
    let mut auction = live_auction()?;

    assert!(matches!(
        auction.check_bid("seller", 1_000, now),
        Err(MarketError::SellerCannotBid)
    ));
    assert!(matches!(
        auction.check_bid("alice", 999, now),
        Err(MarketError::BidTooLow { minimum: 1_000 })
    ));

    // the first bid may be the starting price itself
    let decision = auction.check_bid("alice", 1_000, now)?;
    assert_eq!(decision, BidDecision::Raise(1_000));
    let effects = auction.apply_bid("alice", decision, now, Duration::zero());
    assert_eq!(effects.previous_bidder, None);
    assert_eq!(auction.min_next_bid(), 1_100);

    assert!(matches!(
        auction.check_bid("alice", 2_000, now),
        Err(MarketError::AlreadyHighestBidder)
    ));
    assert!(matches!(
        auction.check_bid("bob", 1_099, now),
        Err(MarketError::BidTooLow { minimum: 1_100 })
    ));

    let decision = auction.check_bid("bob", 1_100, now)?;
    let effects = auction.apply_bid("bob", decision, now, Duration::zero());
    assert_eq!(effects.previous_bidder, Some(("alice".to_owned(), 1_000)));
    assert_eq!(auction.current_price, 1_100);
    assert_eq!(auction.bid_count, 2);

    assert!(matches!(
        auction.check_bid("carol", 5_000, auction.end_time),
        Err(MarketError::AuctionEnded)
    ));
    Ok(())
}

#[test]
fn bids_on_auctions_that_are_not_live_are_rejected() -> Result<()> {
    let now = start_time();
    let mut auction = Auction::create(new_auction(), now)?;
    assert!(matches!(
        auction.check_bid("alice", 1_000, now),
        Err(MarketError::AuctionNotLive)
    ));
    auction.status = AuctionStatus::Cancelled;
    assert!(matches!(
        auction.check_bid("alice", 1_000, now),
        Err(MarketError::AuctionEnded)
    ));
    Ok(())
}

#[test]
fn bid_at_buy_now_price_ends_the_auction() -> Result<()> {
    let now = start_time();
    let mut auction = live_auction()?;

    let decision = auction.check_bid("alice", 7_000, now)?;
    assert_eq!(decision, BidDecision::BuyNow(5_000));

    let effects = auction.apply_bid("alice", decision, now, Duration::minutes(5));
    assert!(effects.ended);
    assert_eq!(effects.extended_to, None);
    assert_eq!(auction.status, AuctionStatus::Ended);
    assert_eq!(auction.end_reason, Some(EndReason::BuyNow));
    assert_eq!(
        auction.winner(),
        Some(Winner {
            user_id: "alice".into(),
            amount: 5_000
        })
    );
    Ok(())
}

#[test]
fn buy_now_needs_a_buy_now_price() -> Result<()> {
    let now = start_time();
    let mut auction = live_auction()?;
    assert_eq!(auction.check_buy_now("alice", now)?, 5_000);
    assert!(matches!(
        auction.check_buy_now("seller", now),
        Err(MarketError::SellerCannotBid)
    ));
    auction.buy_now_price = None;
    assert!(matches!(
        auction.check_buy_now("alice", now),
        Err(MarketError::BuyNowUnavailable)
    ));
    Ok(())
}

#[test]
fn late_bids_extend_the_auction() -> Result<()> {
    let mut auction = live_auction()?;
    let window = Duration::minutes(2);

    let early = auction.end_time - Duration::minutes(10);
    let decision = auction.check_bid("alice", 1_000, early)?;
    assert_eq!(auction.apply_bid("alice", decision, early, window).extended_to, None);

    let late = auction.end_time - Duration::seconds(30);
    let decision = auction.check_bid("bob", 1_100, late)?;
    let effects = auction.apply_bid("bob", decision, late, window);
    assert_eq!(effects.extended_to, Some(late + window));
    assert_eq!(auction.end_time, late + window);
    Ok(())
}

#[test]
fn reserve_price_decides_the_winner() -> Result<()> {
    let now = start_time();
    for (bid, winner) in [(1_500, None), (2_000, Some("alice".to_owned()))] {
        let mut auction = Auction::create(
            NewAuction {
                reserve_price: Some(2_000),
                ..new_auction()
            },
            now,
        )?;
        auction.status = AuctionStatus::Live;
        let decision = auction.check_bid("alice", bid, now)?;
        auction.apply_bid("alice", decision, now, Duration::zero());

        let end = auction.end_time;
        auction.transition(AuctionStatus::Ended, Actor::Scheduler, end)?;
        assert_eq!(auction.winner_id, winner);
    }
    Ok(())
}

#[test]
fn commission_has_a_floor_and_a_ceiling() {
    let policy = CommissionPolicy {
        rate_bps: 500,
        min_fee: 20,
    };
    assert_eq!(policy.commission(10_000), 500);
    assert_eq!(policy.commission(100), 20);
    assert_eq!(policy.commission(10), 10);

    let quote = policy.quote(10_000);
    assert_eq!(quote.seller_proceeds, 9_500);
    assert_eq!(CommissionPolicy::default().commission(1_000_000), 50_000);
}

#[test]
fn amounts_that_cannot_be_stored_are_rejected() -> Result<()> {
    let auction = Auction {
        buy_now_price: None,
        ..live_auction()?
    };
    assert!(matches!(
        auction.check_bid("bidder", MAX_AMOUNT + 1, start_time()),
        Err(MarketError::Validation(_))
    ));
    assert_eq!(
        auction.check_bid("bidder", MAX_AMOUNT, start_time())?,
        BidDecision::Raise(MAX_AMOUNT)
    );

    let mut user = User::create(
        NewUser {
            name: "whale".into(),
            email: "whale@example.com".into(),
            role: Role::Member,
        },
        start_time(),
    )?;
    assert!(matches!(
        user.deposit(MAX_AMOUNT + 1),
        Err(MarketError::Validation(_))
    ));
    user.deposit(MAX_AMOUNT - 1)?;
    assert!(matches!(user.deposit(2), Err(MarketError::Validation(_))));
    user.deposit(1)?;
    assert_eq!(user.balance, MAX_AMOUNT);
    Ok(())
}
