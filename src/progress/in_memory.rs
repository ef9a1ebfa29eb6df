use super::*;
use crate::persistence::{
    InMemoryConnection, InMemoryPersistence, InMemoryTable, InMemoryTransaction,
};
use crate::service::ServiceId;

#[derive(Default)]
pub struct InMemoryProgressTracker {
    store: InMemoryTable<ServiceId, Offset>,
}

impl InMemoryProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> SharedProgressTracker<InMemoryPersistence> {
        Arc::new(Self::new())
    }
}

impl ProgressTracker for InMemoryProgressTracker {
    type Persistence = InMemoryPersistence;

    fn load(&self, _conn: &mut InMemoryConnection, id: ServiceIdRef) -> Result<Option<Offset>> {
        Ok(self.store.get(id))
    }

    fn store_tr<'a>(
        &self,
        conn: &mut InMemoryTransaction<'a>,
        id: ServiceIdRef,
        offset: Offset,
    ) -> Result<()> {
        self.store.insert(conn, id.to_owned(), offset);
        Ok(())
    }
}
