mod in_memory;
mod postgres;

pub use self::in_memory::*;
pub use self::postgres::*;

use crate::{
    event_log::Offset,
    persistence::{ConnectionOf, Persistence, TransactionOf},
    service::ServiceIdRef,
};
use anyhow::Result;
use std::sync::Arc;

/// A persistent store to keep track of the last processed event
pub trait ProgressTracker {
    type Persistence: Persistence;

    fn load(
        &self,
        conn: &mut ConnectionOf<Self::Persistence>,
        id: ServiceIdRef,
    ) -> Result<Option<Offset>>;

    fn store_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        id: ServiceIdRef,
        offset: Offset,
    ) -> Result<()>;
}

pub type SharedProgressTracker<P> =
    Arc<dyn ProgressTracker<Persistence = P> + Send + Sync + 'static>;
