use super::*;
use crate::persistence::postgres::{from_db_amount, to_db_amount};
use crate::persistence::{PostgresPersistence, PostgresTransaction};
use ::postgres::Row;

const AUCTION_COLUMNS: &str = "id, listing_id, seller_id, status, starting_price, min_increment, \
     reserve_price, buy_now_price, current_price, highest_bidder_id, bid_count, start_time, \
     end_time, ended_at, end_reason, winner_id, version, created_at";

pub struct PostgresAuctionStore;

impl PostgresAuctionStore {
    pub fn new_shared() -> SharedAuctionStore<PostgresPersistence> {
        Arc::new(Self)
    }
}

fn optional_amount(row: &Row, column: &str) -> Result<Option<Amount>> {
    row.get::<_, Option<i64>>(column)
        .map(from_db_amount)
        .transpose()
}

fn auction_from_row(row: &Row) -> Result<Auction> {
    Ok(Auction {
        id: row.get("id"),
        listing_id: row.get("listing_id"),
        seller_id: row.get("seller_id"),
        status: row.get::<_, &str>("status").parse()?,
        starting_price: from_db_amount(row.get("starting_price"))?,
        min_increment: from_db_amount(row.get("min_increment"))?,
        reserve_price: optional_amount(row, "reserve_price")?,
        buy_now_price: optional_amount(row, "buy_now_price")?,
        current_price: from_db_amount(row.get("current_price"))?,
        highest_bidder_id: row.get("highest_bidder_id"),
        bid_count: u64::try_from(row.get::<_, i64>("bid_count"))?,
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        ended_at: row.get("ended_at"),
        end_reason: row
            .get::<_, Option<&str>>("end_reason")
            .map(str::parse)
            .transpose()?,
        winner_id: row.get("winner_id"),
        version: u64::try_from(row.get::<_, i64>("version"))?,
        created_at: row.get("created_at"),
    })
}

fn bid_from_row(row: &Row) -> Result<Bid> {
    Ok(Bid {
        id: row.get("id"),
        auction_id: row.get("auction_id"),
        bidder_id: row.get("bidder_id"),
        amount: from_db_amount(row.get("amount"))?,
        placed_at: row.get("placed_at"),
    })
}

fn auctions_from_rows(rows: Vec<Row>) -> Result<Vec<Auction>> {
    rows.iter().map(auction_from_row).collect()
}

impl AuctionStore for PostgresAuctionStore {
    type Persistence = PostgresPersistence;

    fn insert_tr<'a>(&self, conn: &mut PostgresTransaction<'a>, auction: &Auction) -> Result<()> {
        conn.execute(
            &format!(
                "INSERT INTO auctions ({AUCTION_COLUMNS}) VALUES \
                 ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)"
            ),
            &[
                &auction.id,
                &auction.listing_id,
                &auction.seller_id,
                &auction.status.as_str(),
                &to_db_amount(auction.starting_price)?,
                &to_db_amount(auction.min_increment)?,
                &auction.reserve_price.map(to_db_amount).transpose()?,
                &auction.buy_now_price.map(to_db_amount).transpose()?,
                &to_db_amount(auction.current_price)?,
                &auction.highest_bidder_id,
                &i64::try_from(auction.bid_count)?,
                &auction.start_time,
                &auction.end_time,
                &auction.ended_at,
                &auction.end_reason.map(|r| r.as_str()),
                &auction.winner_id,
                &i64::try_from(auction.version)?,
                &auction.created_at,
            ],
        )?;
        Ok(())
    }

    fn load_tr<'a>(
        &self,
        conn: &mut PostgresTransaction<'a>,
        id: AuctionIdRef,
    ) -> Result<Option<Auction>> {
        conn.query_opt(
            &format!("SELECT {AUCTION_COLUMNS} FROM auctions WHERE id = $1"),
            &[&id],
        )?
        .map(|row| auction_from_row(&row))
        .transpose()
    }

    fn lock_tr<'a>(
        &self,
        conn: &mut PostgresTransaction<'a>,
        id: AuctionIdRef,
    ) -> Result<Option<Auction>> {
        conn.query_opt(
            &format!("SELECT {AUCTION_COLUMNS} FROM auctions WHERE id = $1 FOR NO KEY UPDATE"),
            &[&id],
        )?
        .map(|row| auction_from_row(&row))
        .transpose()
    }

    fn update_tr<'a>(
        &self,
        conn: &mut PostgresTransaction<'a>,
        auction: &Auction,
        expected_version: u64,
    ) -> Result<bool> {
        let updated = conn.execute(
            "UPDATE auctions SET status = $3, current_price = $4, highest_bidder_id = $5,
                 bid_count = $6, end_time = $7, ended_at = $8, end_reason = $9, winner_id = $10,
                 version = $11
             WHERE id = $1 AND version = $2",
            &[
                &auction.id,
                &i64::try_from(expected_version)?,
                &auction.status.as_str(),
                &to_db_amount(auction.current_price)?,
                &auction.highest_bidder_id,
                &i64::try_from(auction.bid_count)?,
                &auction.end_time,
                &auction.ended_at,
                &auction.end_reason.map(|r| r.as_str()),
                &auction.winner_id,
                &i64::try_from(auction.version)?,
            ],
        )?;
        Ok(updated == 1)
    }

    fn list_tr<'a>(
        &self,
        conn: &mut PostgresTransaction<'a>,
        filter: &AuctionFilter,
    ) -> Result<Vec<Auction>> {
        let rows = conn.query(
            &format!(
                "SELECT {AUCTION_COLUMNS} FROM auctions
                 WHERE ($1::TEXT IS NULL OR status = $1)
                   AND ($2::TEXT IS NULL OR seller_id = $2)
                   AND ($3::TEXT IS NULL OR listing_id = $3)
                 ORDER BY created_at DESC, id DESC
                 OFFSET $4 LIMIT $5"
            ),
            &[
                &filter.status.map(|s| s.as_str()),
                &filter.seller_id,
                &filter.listing_id,
                &i64::try_from(filter.offset)?,
                &i64::try_from(filter.page_size())?,
            ],
        )?;
        auctions_from_rows(rows)
    }

    fn due_to_start_tr<'a>(
        &self,
        conn: &mut PostgresTransaction<'a>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Auction>> {
        let rows = conn.query(
            &format!(
                "SELECT {AUCTION_COLUMNS} FROM auctions
                 WHERE status = 'scheduled' AND start_time <= $1
                 ORDER BY end_time, id"
            ),
            &[&now],
        )?;
        auctions_from_rows(rows)
    }

    fn due_to_close_tr<'a>(
        &self,
        conn: &mut PostgresTransaction<'a>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Auction>> {
        let rows = conn.query(
            &format!(
                "SELECT {AUCTION_COLUMNS} FROM auctions
                 WHERE status = 'live' AND end_time <= $1
                 ORDER BY end_time, id"
            ),
            &[&now],
        )?;
        auctions_from_rows(rows)
    }

    fn insert_bid_tr<'a>(&self, conn: &mut PostgresTransaction<'a>, bid: &Bid) -> Result<()> {
        conn.execute(
            "INSERT INTO bids (id, auction_id, bidder_id, amount, placed_at)
             VALUES ($1, $2, $3, $4, $5)",
            &[
                &bid.id,
                &bid.auction_id,
                &bid.bidder_id,
                &to_db_amount(bid.amount)?,
                &bid.placed_at,
            ],
        )?;
        Ok(())
    }

    fn bids_tr<'a>(
        &self,
        conn: &mut PostgresTransaction<'a>,
        auction_id: AuctionIdRef,
    ) -> Result<Vec<Bid>> {
        conn.query(
            "SELECT id, auction_id, bidder_id, amount, placed_at FROM bids
             WHERE auction_id = $1 ORDER BY amount DESC, placed_at DESC",
            &[&auction_id],
        )?
        .iter()
        .map(bid_from_row)
        .collect()
    }
}
