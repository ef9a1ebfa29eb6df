use super::*;
use crate::persistence::postgres::{from_db_amount, to_db_amount};
use crate::persistence::{PostgresPersistence, PostgresTransaction};
use ::postgres::Row;

const USER_COLUMNS: &str = "id, name, email, role, balance, held, created_at";

pub struct PostgresAccountStore;

impl PostgresAccountStore {
    pub fn new_shared() -> SharedAccountStore<PostgresPersistence> {
        Arc::new(Self)
    }
}

fn user_from_row(row: &Row) -> Result<User> {
    Ok(User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        role: row.get::<_, &str>("role").parse()?,
        balance: from_db_amount(row.get("balance"))?,
        held: from_db_amount(row.get("held"))?,
        created_at: row.get("created_at"),
    })
}

impl AccountStore for PostgresAccountStore {
    type Persistence = PostgresPersistence;

    fn insert_tr<'a>(&self, conn: &mut PostgresTransaction<'a>, user: &User) -> Result<()> {
        conn.execute(
            "INSERT INTO users (id, name, email, role, balance, held, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &[
                &user.id,
                &user.name,
                &user.email,
                &user.role.as_str(),
                &to_db_amount(user.balance)?,
                &to_db_amount(user.held)?,
                &user.created_at,
            ],
        )?;
        Ok(())
    }

    fn load_tr<'a>(
        &self,
        conn: &mut PostgresTransaction<'a>,
        id: UserIdRef,
    ) -> Result<Option<User>> {
        conn.query_opt(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"),
            &[&id],
        )?
        .map(|row| user_from_row(&row))
        .transpose()
    }

    fn lock_tr<'a>(
        &self,
        conn: &mut PostgresTransaction<'a>,
        ids: &[UserIdRef],
    ) -> Result<Vec<User>> {
        // rows are locked in the order they are returned
        conn.query(
            &format!(
                "SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)
                 ORDER BY id FOR NO KEY UPDATE"
            ),
            &[&ids],
        )?
        .iter()
        .map(user_from_row)
        .collect()
    }

    fn find_by_email_tr<'a>(
        &self,
        conn: &mut PostgresTransaction<'a>,
        email: &str,
    ) -> Result<Option<User>> {
        conn.query_opt(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"),
            &[&email],
        )?
        .map(|row| user_from_row(&row))
        .transpose()
    }

    fn update_tr<'a>(&self, conn: &mut PostgresTransaction<'a>, user: &User) -> Result<()> {
        conn.execute(
            "UPDATE users SET name = $2, email = $3, role = $4, balance = $5, held = $6
             WHERE id = $1",
            &[
                &user.id,
                &user.name,
                &user.email,
                &user.role.as_str(),
                &to_db_amount(user.balance)?,
                &to_db_amount(user.held)?,
            ],
        )?;
        Ok(())
    }
}
