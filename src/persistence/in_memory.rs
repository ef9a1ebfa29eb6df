use super::*;
use parking_lot::{Mutex, MutexGuard};
use std::{borrow::Borrow, collections::BTreeMap, sync::Arc};

type Journal = Vec<Box<dyn FnOnce() + Send>>;

/// Fake in-memory persistence.
///
/// Transactions are serialized by a single lock. Stores record how to
/// undo each of their writes in the transaction, so rollback (explicit
/// or on drop) restores the previous state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPersistence {
    lock: Arc<Mutex<()>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for InMemoryPersistence {
    type Connection = InMemoryConnection;

    fn get_connection(&self) -> Result<Self::Connection> {
        Ok(InMemoryConnection {
            lock: self.lock.clone(),
        })
    }
}

#[derive(Default, Debug)]
pub struct InMemoryConnection {
    lock: Arc<Mutex<()>>,
}

impl Connection for InMemoryConnection {
    type Transaction<'a> = InMemoryTransaction<'a>;

    fn start_transaction(&mut self) -> Result<InMemoryTransaction<'_>> {
        Ok(InMemoryTransaction {
            _lock_guard: self.lock.lock(),
            undo: Vec::new(),
            on_commit: Vec::new(),
        })
    }
}

pub struct InMemoryTransaction<'a> {
    _lock_guard: MutexGuard<'a, ()>,
    undo: Journal,
    on_commit: Journal,
}

impl<'a> InMemoryTransaction<'a> {
    /// Register a closure restoring the state a write is about to change
    pub fn record_undo(&mut self, f: impl FnOnce() + Send + 'static) {
        self.undo.push(Box::new(f));
    }

    /// Register a closure to run only once the transaction commits
    pub fn on_commit(&mut self, f: impl FnOnce() + Send + 'static) {
        self.on_commit.push(Box::new(f));
    }

    fn undo_all(&mut self) {
        while let Some(f) = self.undo.pop() {
            f();
        }
        self.on_commit.clear();
    }
}

impl<'a> Transaction for InMemoryTransaction<'a> {
    fn commit(mut self) -> Result<()> {
        self.undo.clear();
        for f in std::mem::take(&mut self.on_commit) {
            f();
        }
        Ok(())
    }

    fn rollback(mut self) -> Result<()> {
        self.undo_all();
        Ok(())
    }
}

impl<'a> Drop for InMemoryTransaction<'a> {
    fn drop(&mut self) {
        self.undo_all();
    }
}

impl<'a> std::fmt::Debug for InMemoryTransaction<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTransaction")
            .field("undo", &self.undo.len())
            .field("on_commit", &self.on_commit.len())
            .finish()
    }
}

/// A map whose writes are journaled in the current transaction
pub struct InMemoryTable<K, V>(Arc<Mutex<BTreeMap<K, V>>>);

impl<K, V> Default for InMemoryTable<K, V> {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(BTreeMap::new())))
    }
}

impl<K, V> InMemoryTable<K, V>
where
    K: Ord + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.0.lock().get(key).cloned()
    }

    pub fn insert(&self, tr: &mut InMemoryTransaction, key: K, value: V) -> Option<V> {
        let previous = self.0.lock().insert(key.clone(), value);
        let table = self.0.clone();
        let restore = previous.clone();
        tr.record_undo(move || {
            let mut table = table.lock();
            match restore {
                Some(value) => table.insert(key, value),
                None => table.remove(&key),
            };
        });
        previous
    }

    pub fn remove(&self, tr: &mut InMemoryTransaction, key: &K) -> Option<V> {
        let previous = self.0.lock().remove(key);
        if let Some(value) = previous.clone() {
            let table = self.0.clone();
            let key = key.clone();
            tr.record_undo(move || {
                table.lock().insert(key, value);
            });
        }
        previous
    }

    /// All values matching `f`, in key order
    pub fn filter(&self, mut f: impl FnMut(&V) -> bool) -> Vec<V> {
        self.0.lock().values().filter(|v| f(v)).cloned().collect()
    }
}
