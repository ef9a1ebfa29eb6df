use super::Harness;
use crate::{
    auction::NewAuction,
    notification::NotificationKind,
    user::User,
};
use anyhow::Result;

fn kinds(h: &Harness, user: &User) -> Result<Vec<NotificationKind>> {
    let mut kinds: Vec<_> = h
        .market
        .notifications(&user.id, None)?
        .into_iter()
        .map(|n| n.kind)
        .collect();
    kinds.sort_by_key(|k| k.as_str());
    Ok(kinds)
}

#[test]
fn users_are_notified_about_their_auctions() -> Result<()> {
    let h = Harness::new();
    let admin = h.admin()?;
    let seller = h.user("seller", 0)?;
    let alice = h.user("alice", 1_000)?;
    let bob = h.user("bob", 1_000)?;
    let listing = h.active_listing(&seller, &admin, None)?;
    let auction = h.live_auction(
        &seller,
        &admin,
        NewAuction {
            buy_now_price: Some(500),
            ..h.new_auction(&seller, &listing)
        },
    )?;

    h.engine.place_bid(&auction.id, &alice.id, 100)?;
    h.engine.place_bid(&auction.id, &bob.id, 200)?;
    h.engine.buy_now(&auction.id, &alice.id)?;

    let mut settlement = h.settlement()?;
    let mut notifier = h.notifier()?;
    settlement.catch_up()?;
    notifier.catch_up()?;

    assert_eq!(
        kinds(&h, &alice)?,
        vec![
            NotificationKind::AuctionWon,
            NotificationKind::Outbid,
            NotificationKind::PurchaseCompleted
        ]
    );
    assert_eq!(kinds(&h, &bob)?, vec![NotificationKind::Outbid]);
    assert_eq!(
        kinds(&h, &seller)?,
        vec![NotificationKind::AuctionEnded, NotificationKind::SaleCompleted]
    );

    let outbid = &h.market.notifications(&bob.id, None)?[0];
    assert_eq!(outbid.auction_id.as_deref(), Some(auction.id.as_str()));
    assert!(!outbid.read);

    // nothing is delivered twice
    assert_eq!(h.notifier()?.catch_up()?, 0);
    assert_eq!(kinds(&h, &bob)?.len(), 1);
    Ok(())
}

#[test]
fn notifications_are_marked_read_by_their_owner_only() -> Result<()> {
    let h = Harness::new();
    let admin = h.admin()?;
    let seller = h.user("seller", 0)?;
    let alice = h.user("alice", 1_000)?;
    let bob = h.user("bob", 1_000)?;
    let listing = h.active_listing(&seller, &admin, None)?;
    let auction = h.live_auction(&seller, &admin, h.new_auction(&seller, &listing))?;
    h.engine.place_bid(&auction.id, &alice.id, 100)?;
    h.engine.place_bid(&auction.id, &bob.id, 110)?;
    h.notifier()?.catch_up()?;

    let notification = h.market.notifications(&alice.id, None)?.remove(0);
    assert!(matches!(
        h.market.mark_notification_read(&notification.id, &bob.id),
        Err(crate::error::MarketError::Forbidden(_))
    ));
    assert!(h.market.mark_notification_read(&notification.id, &alice.id)?.read);
    assert!(h.market.notifications(&alice.id, None)?[0].read);
    Ok(())
}
