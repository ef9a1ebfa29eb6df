mod auction;
mod config;
mod event_log;
mod http;
mod notifier;
mod persistence;
mod settlement;

use crate::{
    auction::{Auction, AuctionStatus, NewAuction},
    clock::{Clock, ManualClock, SharedClock},
    config::EngineConfig,
    event::Event,
    event_log::{SharedReader, SharedWriter},
    listing::{Listing, ListingDetails, ListingStatus, NewListing},
    persistence::{InMemoryPersistence, Persistence},
    service::{AuctionEngine, LogFollower, Marketplace, Notifier, Settlement},
    store::Stores,
    trade::CommissionPolicy,
    types::*,
    user::{NewUser, Role, User},
};
use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

type P = InMemoryPersistence;

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

/// Everything wired together on in-memory persistence and a manual clock
pub struct Harness {
    pub persistence: P,
    pub stores: Stores<P>,
    pub event_writer: SharedWriter<P>,
    pub event_reader: SharedReader<P>,
    pub clock: Arc<ManualClock>,
    pub commission: CommissionPolicy,
    pub engine: AuctionEngine<P>,
    pub market: Marketplace<P>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default(), Stores::in_memory())
    }

    pub fn with_config(config: EngineConfig, stores: Stores<P>) -> Self {
        let persistence = InMemoryPersistence::new();
        let (event_writer, event_reader) = crate::event_log::new_in_memory_shared();
        let clock = ManualClock::new(start_time());
        let shared_clock: SharedClock = clock.clone();
        let commission = CommissionPolicy::default();
        Self {
            engine: AuctionEngine::new(
                persistence.clone(),
                stores.clone(),
                event_writer.clone(),
                shared_clock.clone(),
                config,
            ),
            market: Marketplace::new(
                persistence.clone(),
                stores.clone(),
                event_writer.clone(),
                shared_clock,
                commission,
            ),
            persistence,
            stores,
            event_writer,
            event_reader,
            clock,
            commission,
        }
    }

    pub fn settlement(&self) -> Result<LogFollower<P, Settlement<P>>> {
        LogFollower::new(
            Settlement::new(
                self.stores.clone(),
                self.event_writer.clone(),
                self.commission,
                self.clock.clone(),
            ),
            self.persistence.clone(),
            self.event_reader.clone(),
            self.stores.progress.clone(),
        )
    }

    pub fn notifier(&self) -> Result<LogFollower<P, Notifier<P>>> {
        LogFollower::new(
            Notifier::new(self.stores.notifications.clone(), self.clock.clone()),
            self.persistence.clone(),
            self.event_reader.clone(),
            self.stores.progress.clone(),
        )
    }

    /// Everything on the event log so far
    pub fn events(&self) -> Result<Vec<Event>> {
        let mut conn = self.persistence.get_connection()?;
        let res = self.event_reader.read(
            &mut conn,
            self.event_reader.get_start_offset()?,
            usize::MAX,
            Some(std::time::Duration::ZERO),
        )?;
        Ok(res.data.into_iter().map(|e| e.details).collect())
    }

    pub fn user(&self, name: &str, balance: Amount) -> Result<User> {
        let user = self.market.create_user(NewUser {
            name: name.to_owned(),
            email: format!("{name}@example.com"),
            role: Role::Member,
        })?;
        if balance == 0 {
            return Ok(user);
        }
        Ok(self.market.deposit(&user.id, balance)?)
    }

    pub fn admin(&self) -> Result<User> {
        Ok(self.market.create_user(NewUser {
            name: "admin".into(),
            email: "admin@example.com".into(),
            role: Role::Admin,
        })?)
    }

    pub fn balance_of(&self, user: &User) -> Result<(Amount, Amount)> {
        let user = self.market.get_user(&user.id)?;
        Ok((user.balance, user.held))
    }

    /// A listing approved by `admin`
    pub fn active_listing(
        &self,
        seller: &User,
        admin: &User,
        price: Option<Amount>,
    ) -> Result<Listing> {
        let listing = self.market.create_listing(NewListing {
            seller_id: seller.id.clone(),
            title: "VinFast VF8, 2023".into(),
            description: "One owner".into(),
            location: "Hanoi".into(),
            price,
            details: ListingDetails::Ev {
                brand: "VinFast".into(),
                model: "VF8".into(),
                year: 2023,
                mileage_km: 12_000,
                battery_capacity_kwh: 87.7,
                range_km: 420,
            },
        })?;
        Ok(self
            .market
            .change_listing_status(&listing.id, ListingStatus::Active, &admin.id)?)
    }

    pub fn new_auction(&self, seller: &User, listing: &Listing) -> NewAuction {
        NewAuction {
            listing_id: listing.id.clone(),
            seller_id: seller.id.clone(),
            starting_price: 100,
            min_increment: 10,
            reserve_price: None,
            buy_now_price: None,
            start_time: self.clock.now(),
            end_time: self.clock.now() + Duration::hours(1),
        }
    }

    /// Create an auction and walk it through approval to `live`
    pub fn live_auction(&self, seller: &User, admin: &User, new: NewAuction) -> Result<Auction> {
        let auction = self.engine.create_auction(new)?;
        self.engine
            .change_status(&auction.id, AuctionStatus::Pending, &seller.id)?;
        self.engine
            .change_status(&auction.id, AuctionStatus::Scheduled, &admin.id)?;
        Ok(self
            .engine
            .change_status(&auction.id, AuctionStatus::Live, &admin.id)?
            .auction)
    }
}
