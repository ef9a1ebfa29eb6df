use crate::error::{MarketError, MarketResult};
use crate::types::*;
use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    /// Waiting for admin approval
    Pending,
    Active,
    Rejected,
    InAuction,
    Sold,
    Archived,
}

impl ListingStatus {
    pub fn as_str(self) -> &'static str {
        use ListingStatus::*;
        match self {
            Pending => "pending",
            Active => "active",
            Rejected => "rejected",
            InAuction => "in_auction",
            Sold => "sold",
            Archived => "archived",
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use ListingStatus::*;
        Ok(match s {
            "pending" => Pending,
            "active" => Active,
            "rejected" => Rejected,
            "in_auction" => InAuction,
            "sold" => Sold,
            "archived" => Archived,
            other => bail!("unknown listing status: {other}"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingKind {
    Ev,
    Battery,
}

impl ListingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ListingKind::Ev => "ev",
            ListingKind::Battery => "battery",
        }
    }
}

/// Category specific part of a listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ListingDetails {
    Ev {
        brand: String,
        model: String,
        year: u16,
        mileage_km: u32,
        battery_capacity_kwh: f32,
        range_km: u32,
    },
    Battery {
        brand: String,
        capacity_kwh: f32,
        health_percent: u8,
        cycle_count: u32,
        voltage: u32,
    },
}

impl ListingDetails {
    pub fn kind(&self) -> ListingKind {
        match self {
            ListingDetails::Ev { .. } => ListingKind::Ev,
            ListingDetails::Battery { .. } => ListingKind::Battery,
        }
    }

    pub fn brand(&self) -> &str {
        match self {
            ListingDetails::Ev { brand, .. } | ListingDetails::Battery { brand, .. } => brand,
        }
    }

    fn validate(&self) -> MarketResult<()> {
        if self.brand().trim().is_empty() {
            return Err(MarketError::Validation("brand is required".into()));
        }
        match self {
            ListingDetails::Ev {
                battery_capacity_kwh,
                ..
            } if *battery_capacity_kwh <= 0.0 => Err(MarketError::Validation(
                "battery capacity must be positive".into(),
            )),
            ListingDetails::Battery { capacity_kwh, .. } if *capacity_kwh <= 0.0 => Err(
                MarketError::Validation("battery capacity must be positive".into()),
            ),
            ListingDetails::Battery { health_percent, .. } if 100 < *health_percent => Err(
                MarketError::Validation("battery health is a percentage".into()),
            ),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub seller_id: UserId,
    pub title: String,
    pub description: String,
    pub location: String,
    /// Fixed price; listings without one can only be sold by auction
    pub price: Option<Amount>,
    pub details: ListingDetails,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewListing {
    pub seller_id: UserId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub price: Option<Amount>,
    pub details: ListingDetails,
}

impl Listing {
    pub fn create(new: NewListing, now: DateTime<Utc>) -> MarketResult<Self> {
        if new.title.trim().is_empty() {
            return Err(MarketError::Validation("title is required".into()));
        }
        if new.price == Some(0) {
            return Err(MarketError::Validation("price must be positive".into()));
        }
        if let Some(price) = new.price {
            check_amount(price, "price")?;
        }
        new.details.validate()?;
        Ok(Self {
            id: new_id(),
            seller_id: new.seller_id,
            title: new.title.trim().to_owned(),
            description: new.description,
            location: new.location,
            price: new.price,
            details: new.details,
            status: ListingStatus::Pending,
            created_at: now,
        })
    }

    /// Validate and apply a status change requested by a user
    pub fn transition(
        &mut self,
        to: ListingStatus,
        is_admin: bool,
        is_seller: bool,
    ) -> MarketResult<()> {
        use ListingStatus::*;
        let allowed = match (self.status, to) {
            (Pending, Active) | (Pending, Rejected) => is_admin,
            (Pending | Active | Rejected, Archived) => is_admin || is_seller,
            // withdraws the auction as well
            (InAuction, Archived) => is_admin,
            (Archived, Active) => is_admin,
            _ => return Err(MarketError::invalid_transition(self.status, to)),
        };
        if !allowed {
            return Err(MarketError::Forbidden(format!(
                "cannot move listing from {} to {to}",
                self.status
            )));
        }
        self.status = to;
        Ok(())
    }
}

/// Query parameters for searching listings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingFilter {
    pub kind: Option<ListingKind>,
    pub status: Option<ListingStatus>,
    pub seller_id: Option<UserId>,
    pub brand: Option<String>,
    pub min_price: Option<Amount>,
    pub max_price: Option<Amount>,
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

pub const MAX_PAGE_SIZE: usize = 100;

impl ListingFilter {
    pub fn page_size(&self) -> usize {
        self.limit.unwrap_or(20).min(MAX_PAGE_SIZE)
    }

    pub fn matches(&self, listing: &Listing) -> bool {
        self.kind.map_or(true, |k| listing.details.kind() == k)
            && self.status.map_or(true, |s| listing.status == s)
            && self
                .seller_id
                .as_ref()
                .map_or(true, |s| &listing.seller_id == s)
            && self
                .brand
                .as_ref()
                .map_or(true, |b| listing.details.brand().eq_ignore_ascii_case(b))
            && self
                .min_price
                .map_or(true, |min| listing.price.map_or(false, |p| min <= p))
            && self
                .max_price
                .map_or(true, |max| listing.price.map_or(false, |p| p <= max))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorite {
    pub user_id: UserId,
    pub listing_id: ListingId,
    pub created_at: DateTime<Utc>,
}
