mod postgres;

pub use self::postgres::*;

use crate::persistence::{
    InMemoryPersistence, InMemoryTable, InMemoryTransaction, Persistence, TransactionOf,
};
use crate::types::*;
use crate::user::User;
use anyhow::Result;
use std::sync::Arc;

/// Users and their wallets
pub trait AccountStore {
    type Persistence: Persistence;

    fn insert_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        user: &User,
    ) -> Result<()>;

    fn load_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        id: UserIdRef,
    ) -> Result<Option<User>>;

    /// Load users, locking their rows in ascending id order until the end
    /// of the transaction where the backend supports it
    ///
    /// Wallets are only written after being locked through here, in a
    /// single call per transaction.
    fn lock_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        ids: &[UserIdRef],
    ) -> Result<Vec<User>>;

    fn find_by_email_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        email: &str,
    ) -> Result<Option<User>>;

    fn update_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        user: &User,
    ) -> Result<()>;
}

/// Take the user with `id` out of the ones returned by [`AccountStore::lock_tr`]
pub fn take_user(users: &mut Vec<User>, id: UserIdRef) -> Option<User> {
    let pos = users.iter().position(|user| user.id == id)?;
    Some(users.swap_remove(pos))
}

pub type SharedAccountStore<P> = Arc<dyn AccountStore<Persistence = P> + Send + Sync>;

#[derive(Default)]
pub struct InMemoryAccountStore {
    users: InMemoryTable<UserId, User>,
}

impl InMemoryAccountStore {
    pub fn new_shared() -> SharedAccountStore<InMemoryPersistence> {
        Arc::new(Self::default())
    }
}

impl AccountStore for InMemoryAccountStore {
    type Persistence = InMemoryPersistence;

    fn insert_tr<'a>(&self, conn: &mut InMemoryTransaction<'a>, user: &User) -> Result<()> {
        self.users.insert(conn, user.id.clone(), user.clone());
        Ok(())
    }

    fn load_tr<'a>(
        &self,
        _conn: &mut InMemoryTransaction<'a>,
        id: UserIdRef,
    ) -> Result<Option<User>> {
        Ok(self.users.get(id))
    }

    fn lock_tr<'a>(
        &self,
        _conn: &mut InMemoryTransaction<'a>,
        ids: &[UserIdRef],
    ) -> Result<Vec<User>> {
        Ok(self.users.filter(|u| ids.contains(&u.id.as_str())))
    }

    fn find_by_email_tr<'a>(
        &self,
        _conn: &mut InMemoryTransaction<'a>,
        email: &str,
    ) -> Result<Option<User>> {
        Ok(self.users.filter(|u| u.email == email).into_iter().next())
    }

    fn update_tr<'a>(&self, conn: &mut InMemoryTransaction<'a>, user: &User) -> Result<()> {
        self.users.insert(conn, user.id.clone(), user.clone());
        Ok(())
    }
}
