use super::*;
use crate::persistence::{PostgresPersistence, PostgresTransaction};
use ::postgres::Row;

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, kind, message, auction_id, listing_id, transaction_id, read, created_at";

pub struct PostgresNotificationStore;

impl PostgresNotificationStore {
    pub fn new_shared() -> SharedNotificationStore<PostgresPersistence> {
        Arc::new(Self)
    }
}

fn notification_from_row(row: &Row) -> Result<Notification> {
    Ok(Notification {
        id: row.get("id"),
        user_id: row.get("user_id"),
        kind: row.get::<_, &str>("kind").parse()?,
        message: row.get("message"),
        auction_id: row.get("auction_id"),
        listing_id: row.get("listing_id"),
        transaction_id: row.get("transaction_id"),
        read: row.get("read"),
        created_at: row.get("created_at"),
    })
}

impl NotificationStore for PostgresNotificationStore {
    type Persistence = PostgresPersistence;

    fn insert_tr<'a>(
        &self,
        conn: &mut PostgresTransaction<'a>,
        notification: &Notification,
    ) -> Result<()> {
        conn.execute(
            &format!(
                "INSERT INTO notifications ({NOTIFICATION_COLUMNS})
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
            ),
            &[
                &notification.id,
                &notification.user_id,
                &notification.kind.as_str(),
                &notification.message,
                &notification.auction_id,
                &notification.listing_id,
                &notification.transaction_id,
                &notification.read,
                &notification.created_at,
            ],
        )?;
        Ok(())
    }

    fn load_tr<'a>(
        &self,
        conn: &mut PostgresTransaction<'a>,
        id: NotificationIdRef,
    ) -> Result<Option<Notification>> {
        conn.query_opt(
            &format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1"),
            &[&id],
        )?
        .map(|row| notification_from_row(&row))
        .transpose()
    }

    fn mark_read_tr<'a>(
        &self,
        conn: &mut PostgresTransaction<'a>,
        id: NotificationIdRef,
    ) -> Result<()> {
        conn.execute("UPDATE notifications SET read = TRUE WHERE id = $1", &[&id])?;
        Ok(())
    }

    fn list_for_user_tr<'a>(
        &self,
        conn: &mut PostgresTransaction<'a>,
        user_id: UserIdRef,
        limit: usize,
    ) -> Result<Vec<Notification>> {
        conn.query(
            &format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications
                 WHERE user_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2"
            ),
            &[&user_id, &i64::try_from(limit)?],
        )?
        .iter()
        .map(notification_from_row)
        .collect()
    }
}
