use super::*;
use crate::persistence::postgres::{from_db_amount, to_db_amount};
use crate::persistence::{PostgresPersistence, PostgresTransaction};
use ::postgres::Row;

const TRANSACTION_COLUMNS: &str = "id, kind, auction_id, listing_id, buyer_id, seller_id, amount, \
     commission, seller_proceeds, created_at";

pub struct PostgresTradeStore;

impl PostgresTradeStore {
    pub fn new_shared() -> SharedTradeStore<PostgresPersistence> {
        Arc::new(Self)
    }
}

fn record_from_row(row: &Row) -> Result<TransactionRecord> {
    Ok(TransactionRecord {
        id: row.get("id"),
        kind: row.get::<_, &str>("kind").parse()?,
        auction_id: row.get("auction_id"),
        listing_id: row.get("listing_id"),
        buyer_id: row.get("buyer_id"),
        seller_id: row.get("seller_id"),
        amount: from_db_amount(row.get("amount"))?,
        commission: from_db_amount(row.get("commission"))?,
        seller_proceeds: from_db_amount(row.get("seller_proceeds"))?,
        created_at: row.get("created_at"),
    })
}

impl TradeStore for PostgresTradeStore {
    type Persistence = PostgresPersistence;

    fn insert_tr<'a>(
        &self,
        conn: &mut PostgresTransaction<'a>,
        record: &TransactionRecord,
    ) -> Result<()> {
        conn.execute(
            &format!(
                "INSERT INTO transactions ({TRANSACTION_COLUMNS})
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
            ),
            &[
                &record.id,
                &record.kind.as_str(),
                &record.auction_id,
                &record.listing_id,
                &record.buyer_id,
                &record.seller_id,
                &to_db_amount(record.amount)?,
                &to_db_amount(record.commission)?,
                &to_db_amount(record.seller_proceeds)?,
                &record.created_at,
            ],
        )?;
        Ok(())
    }

    fn load_tr<'a>(
        &self,
        conn: &mut PostgresTransaction<'a>,
        id: TransactionIdRef,
    ) -> Result<Option<TransactionRecord>> {
        conn.query_opt(
            &format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1"),
            &[&id],
        )?
        .map(|row| record_from_row(&row))
        .transpose()
    }

    fn find_by_auction_tr<'a>(
        &self,
        conn: &mut PostgresTransaction<'a>,
        auction_id: AuctionIdRef,
    ) -> Result<Option<TransactionRecord>> {
        conn.query_opt(
            &format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE auction_id = $1"),
            &[&auction_id],
        )?
        .map(|row| record_from_row(&row))
        .transpose()
    }

    fn list_for_user_tr<'a>(
        &self,
        conn: &mut PostgresTransaction<'a>,
        user_id: UserIdRef,
    ) -> Result<Vec<TransactionRecord>> {
        conn.query(
            &format!(
                "SELECT {TRANSACTION_COLUMNS} FROM transactions
                 WHERE buyer_id = $1 OR seller_id = $1
                 ORDER BY created_at DESC, id DESC"
            ),
            &[&user_id],
        )?
        .iter()
        .map(record_from_row)
        .collect()
    }
}
