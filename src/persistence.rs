//! Database persistence traits
//!
//! Expressing atomic transactions spanning multiple stores in a
//! hexagonal architecture is not simple in any language. Here every
//! store is generic over a `Persistence`, and every store operation
//! that mutates state takes the persistence's transaction type, so
//! that a single transaction can cover the auction, the wallets, the
//! event log and the log-follower progress at once.
//!
//! Rows are locked in one global order: auction, listing, users by
//! ascending id, and the event log last. Transactions that still lose a
//! race report a [`Conflict`].
//!
//! Some discussion:
//!
//! * https://www.reddit.com/r/rust/comments/p9amqt/hexagonal_architecture_in_rust_1/h9ypjoo
//! * https://www.reddit.com/r/golang/comments/i1vy4s/ddd_vs_db_transactions_how_to_reconcile/
mod in_memory;
pub mod postgres;

pub use self::in_memory::*;
pub use self::postgres::{PostgresConnection, PostgresPersistence, PostgresTransaction};

use anyhow::Result;
use thiserror::Error;

/// An instance of a persistence (store) that can hold data
///
/// Must be cloneable and thread-safe.
pub trait Persistence: Send + Sync + Clone + 'static {
    type Connection: Connection + Send + 'static;

    /// Get a connection to a store
    fn get_connection(&self) -> Result<Self::Connection>;
}

/// A connection to a database/persistence
pub trait Connection {
    type Transaction<'a>: Transaction
    where
        Self: 'a;

    fn start_transaction(&mut self) -> Result<Self::Transaction<'_>>;
}

/// A database transaction to a database/persistence
///
/// Dropping a transaction without committing it rolls it back.
pub trait Transaction {
    fn commit(self) -> Result<()>;
    fn rollback(self) -> Result<()>;
}

pub type ConnectionOf<P> = <P as Persistence>::Connection;
pub type TransactionOf<'a, P> = <<P as Persistence>::Connection as Connection>::Transaction<'a>;

/// The transaction lost a race with a concurrent one and can be re-run
#[derive(Error, Debug)]
#[error("transaction conflicted with a concurrent one")]
pub struct Conflict;

/// Whether `err` was caused by a [`Conflict`] or the database aborting
/// the transaction in favor of a concurrent one
pub fn is_conflict(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.is::<Conflict>() || self::postgres::is_conflict(cause))
}
