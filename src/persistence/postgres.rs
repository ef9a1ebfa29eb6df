use super::*;
use ::postgres::error::SqlState;
use anyhow::Context;
use r2d2_postgres::{postgres::NoTls, PostgresConnectionManager};
use std::error::Error as StdError;
use tracing::info;

const SCHEMA: &str = include_str!("postgres/schema.sql");

#[derive(Debug, Clone)]
pub struct PostgresPersistence {
    pool: r2d2::Pool<PostgresConnectionManager<NoTls>>,
}

impl PostgresPersistence {
    pub fn connect(url: &str, pool_size: u32) -> Result<Self> {
        let manager = PostgresConnectionManager::new(
            url.parse::<r2d2_postgres::postgres::Config>()
                .context("invalid postgres connection string")?,
            NoTls,
        );
        let pool = r2d2::Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .context("failed to build postgres connection pool")?;
        Ok(Self { pool })
    }

    /// Create all tables that don't exist yet
    pub fn migrate(&self) -> Result<()> {
        let mut conn = self.pool.get()?;
        conn.batch_execute(SCHEMA)?;
        info!("database schema is up to date");
        Ok(())
    }
}

impl Persistence for PostgresPersistence {
    type Connection = PostgresConnection;

    fn get_connection(&self) -> Result<Self::Connection> {
        Ok(self.pool.get()?)
    }
}

pub type PostgresConnection = r2d2::PooledConnection<PostgresConnectionManager<NoTls>>;

impl Connection for PostgresConnection {
    type Transaction<'a> = PostgresTransaction<'a>;

    fn start_transaction(&mut self) -> Result<PostgresTransaction<'_>> {
        Ok(::postgres::Client::transaction(self)?)
    }
}

pub type PostgresTransaction<'a> = ::postgres::Transaction<'a>;

impl<'a> Transaction for PostgresTransaction<'a> {
    fn commit(self) -> Result<()> {
        Ok(::postgres::Transaction::commit(self)?)
    }

    fn rollback(self) -> Result<()> {
        Ok(::postgres::Transaction::rollback(self)?)
    }
}

/// Deadlock victims and serialization failures can be retried
pub(crate) fn is_conflict(cause: &(dyn StdError + 'static)) -> bool {
    cause
        .downcast_ref::<::postgres::Error>()
        .and_then(::postgres::Error::code)
        .map_or(false, |code| {
            *code == SqlState::T_R_DEADLOCK_DETECTED
                || *code == SqlState::T_R_SERIALIZATION_FAILURE
        })
}

/// Amounts are unsigned in the domain, `BIGINT` in the database
pub fn to_db_amount(amount: u64) -> Result<i64> {
    Ok(i64::try_from(amount)?)
}

pub fn from_db_amount(amount: i64) -> Result<u64> {
    Ok(u64::try_from(amount)?)
}
