//! Append-only log of [`Event`]s
//!
//! Writers append within a persistence transaction; readers follow the
//! log from an offset, optionally blocking until something new arrives.
mod in_memory;
mod postgres;

pub use self::in_memory::*;
pub use self::postgres::*;

use crate::{
    event::Event,
    persistence::{ConnectionOf, Persistence, TransactionOf},
};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

/// Position in the log, pointing right after the last consumed event
pub type Offset = u64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEvent {
    /// Offset right after this event
    pub offset: Offset,
    pub details: Event,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WithOffset<T> {
    pub offset: Offset,
    pub data: T,
}

pub trait Reader<P: Persistence> {
    /// Read up to `limit` events after `offset`
    ///
    /// Waits up to `timeout` (forever if `None`) when there is nothing new.
    fn read(
        &self,
        conn: &mut ConnectionOf<P>,
        offset: Offset,
        limit: usize,
        timeout: Option<Duration>,
    ) -> Result<WithOffset<Vec<LogEvent>>>;

    fn get_start_offset(&self) -> Result<Offset>;
}

pub trait Writer<P: Persistence> {
    /// Append events; they become visible to readers when the transaction commits
    fn write_tr<'a>(&self, conn: &mut TransactionOf<'a, P>, events: &[Event]) -> Result<()>;
}

pub type SharedReader<P> = Arc<dyn Reader<P> + Sync + Send + 'static>;
pub type SharedWriter<P> = Arc<dyn Writer<P> + Sync + Send + 'static>;
