use super::LogFollowerService;
use crate::{
    clock::SharedClock,
    event::{AuctionEvent, Event, TradeEvent},
    notification::{Notification, NotificationKind},
    persistence::{Persistence, TransactionOf},
    store::SharedNotificationStore,
};
use anyhow::Result;
use tracing::debug;

/// Stores notifications for users affected by auction and trade events
pub struct Notifier<P: Persistence> {
    notifications: SharedNotificationStore<P>,
    clock: SharedClock,
}

impl<P: Persistence> Notifier<P> {
    pub fn new(notifications: SharedNotificationStore<P>, clock: SharedClock) -> Self {
        Self {
            notifications,
            clock,
        }
    }

    fn notifications_for(&self, event: Event) -> Vec<Notification> {
        let now = self.clock.now();
        match event {
            Event::Auction(AuctionEvent::BidPlaced {
                auction_id,
                bidder_id,
                amount,
                previous_bidder_id: Some(previous),
            }) if previous != bidder_id => vec![Notification::new(
                previous,
                NotificationKind::Outbid,
                format!("You have been outbid, the price is now {amount}"),
                now,
            )
            .with_auction(auction_id)],
            Event::Auction(AuctionEvent::Ended {
                auction_id,
                listing_id,
                seller_id,
                winner,
                ..
            }) => {
                let mut notifications = vec![];
                let seller_message = match &winner {
                    Some(winner) => {
                        notifications.push(
                            Notification::new(
                                winner.user_id.clone(),
                                NotificationKind::AuctionWon,
                                format!("You won the auction for {}", winner.amount),
                                now,
                            )
                            .with_auction(auction_id.clone())
                            .with_listing(listing_id.clone()),
                        );
                        format!("Your auction ended, sold for {}", winner.amount)
                    }
                    None => "Your auction ended without a winner".to_owned(),
                };
                notifications.push(
                    Notification::new(
                        seller_id,
                        NotificationKind::AuctionEnded,
                        seller_message,
                        now,
                    )
                    .with_auction(auction_id)
                    .with_listing(listing_id),
                );
                notifications
            }
            Event::Trade(TradeEvent::Completed {
                transaction_id,
                listing_id,
                buyer_id,
                seller_id,
                amount,
            }) => vec![
                Notification::new(
                    buyer_id,
                    NotificationKind::PurchaseCompleted,
                    format!("Your purchase of {amount} is complete"),
                    now,
                )
                .with_listing(listing_id.clone())
                .with_transaction(transaction_id.clone()),
                Notification::new(
                    seller_id,
                    NotificationKind::SaleCompleted,
                    format!("Your sale of {amount} is complete"),
                    now,
                )
                .with_listing(listing_id)
                .with_transaction(transaction_id),
            ],
            _ => vec![],
        }
    }
}

impl<P: Persistence> LogFollowerService<P> for Notifier<P> {
    fn get_log_progress_id(&self) -> String {
        "notifier".into()
    }

    fn handle_event<'a>(&mut self, conn: &mut TransactionOf<'a, P>, event: Event) -> Result<()> {
        for notification in self.notifications_for(event) {
            debug!(user_id = %notification.user_id, kind = notification.kind.as_str(), "notifying");
            self.notifications.insert_tr(conn, &notification)?;
        }
        Ok(())
    }
}
