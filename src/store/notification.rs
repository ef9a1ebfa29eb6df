mod postgres;

pub use self::postgres::*;

use super::{newest_first, page};
use crate::notification::Notification;
use crate::persistence::{
    InMemoryPersistence, InMemoryTable, InMemoryTransaction, Persistence, TransactionOf,
};
use crate::types::*;
use anyhow::Result;
use std::sync::Arc;

pub trait NotificationStore {
    type Persistence: Persistence;

    fn insert_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        notification: &Notification,
    ) -> Result<()>;

    fn load_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        id: NotificationIdRef,
    ) -> Result<Option<Notification>>;

    fn mark_read_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        id: NotificationIdRef,
    ) -> Result<()>;

    /// A user's notifications, newest first
    fn list_for_user_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        user_id: UserIdRef,
        limit: usize,
    ) -> Result<Vec<Notification>>;
}

pub type SharedNotificationStore<P> = Arc<dyn NotificationStore<Persistence = P> + Send + Sync>;

#[derive(Default)]
pub struct InMemoryNotificationStore {
    notifications: InMemoryTable<NotificationId, Notification>,
}

impl InMemoryNotificationStore {
    pub fn new_shared() -> SharedNotificationStore<InMemoryPersistence> {
        Arc::new(Self::default())
    }
}

impl NotificationStore for InMemoryNotificationStore {
    type Persistence = InMemoryPersistence;

    fn insert_tr<'a>(
        &self,
        conn: &mut InMemoryTransaction<'a>,
        notification: &Notification,
    ) -> Result<()> {
        self.notifications
            .insert(conn, notification.id.clone(), notification.clone());
        Ok(())
    }

    fn load_tr<'a>(
        &self,
        _conn: &mut InMemoryTransaction<'a>,
        id: NotificationIdRef,
    ) -> Result<Option<Notification>> {
        Ok(self.notifications.get(id))
    }

    fn mark_read_tr<'a>(
        &self,
        conn: &mut InMemoryTransaction<'a>,
        id: NotificationIdRef,
    ) -> Result<()> {
        if let Some(mut notification) = self.notifications.get(id) {
            notification.read = true;
            self.notifications.insert(conn, id.to_owned(), notification);
        }
        Ok(())
    }

    fn list_for_user_tr<'a>(
        &self,
        _conn: &mut InMemoryTransaction<'a>,
        user_id: UserIdRef,
        limit: usize,
    ) -> Result<Vec<Notification>> {
        let mut notifications = self.notifications.filter(|n| n.user_id == user_id);
        newest_first(&mut notifications, |n| (n.created_at, n.id.as_str()));
        Ok(page(notifications, 0, limit))
    }
}
