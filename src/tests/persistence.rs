use super::start_time;
use crate::{
    persistence::{
        is_conflict, Conflict, Connection, InMemoryPersistence, InMemoryTable, Persistence,
        Transaction,
    },
    store::{AccountStore, InMemoryAccountStore},
    user::{NewUser, Role, User},
};
use anyhow::{format_err, Result};

#[test]
fn committed_writes_stay() -> Result<()> {
    let persistence = InMemoryPersistence::new();
    let table = InMemoryTable::<String, u64>::default();

    let mut conn = persistence.get_connection()?;
    let mut tr = conn.start_transaction()?;
    table.insert(&mut tr, "a".into(), 1);
    table.insert(&mut tr, "b".into(), 2);
    tr.commit()?;

    assert_eq!(table.get("a"), Some(1));
    assert_eq!(table.filter(|_| true), vec![1, 2]);
    Ok(())
}

#[test]
fn rollback_restores_previous_state() -> Result<()> {
    let persistence = InMemoryPersistence::new();
    let table = InMemoryTable::<String, u64>::default();

    let mut conn = persistence.get_connection()?;
    let mut tr = conn.start_transaction()?;
    table.insert(&mut tr, "kept".into(), 1);
    table.insert(&mut tr, "removed".into(), 2);
    tr.commit()?;

    let mut tr = conn.start_transaction()?;
    table.insert(&mut tr, "kept".into(), 10);
    table.insert(&mut tr, "kept".into(), 100);
    table.insert(&mut tr, "new".into(), 3);
    assert_eq!(table.remove(&mut tr, &"removed".to_owned()), Some(2));
    tr.rollback()?;

    assert_eq!(table.get("kept"), Some(1));
    assert_eq!(table.get("removed"), Some(2));
    assert_eq!(table.get("new"), None);
    Ok(())
}

#[test]
fn dropped_transactions_roll_back() -> Result<()> {
    let persistence = InMemoryPersistence::new();
    let table = InMemoryTable::<String, u64>::default();

    let mut conn = persistence.get_connection()?;
    let failing = |conn: &mut crate::persistence::InMemoryConnection| -> Result<()> {
        let mut tr = conn.start_transaction()?;
        table.insert(&mut tr, "a".into(), 1);
        anyhow::bail!("something went wrong");
    };
    assert!(failing(&mut conn).is_err());

    assert_eq!(table.get("a"), None);
    Ok(())
}

#[test]
fn conflicts_are_recognized_behind_context() {
    let err = anyhow::Error::new(Conflict).context("storing a bid");
    assert!(is_conflict(&err));
    assert!(!is_conflict(&format_err!("disk full")));
}

#[test]
fn users_are_locked_in_id_order() -> Result<()> {
    let persistence = InMemoryPersistence::new();
    let accounts = InMemoryAccountStore::new_shared();

    let mut conn = persistence.get_connection()?;
    let mut tr = conn.start_transaction()?;
    for id in ["b", "c", "a"] {
        let user = User::create(
            NewUser {
                name: id.into(),
                email: format!("{id}@example.com"),
                role: Role::Member,
            },
            start_time(),
        )?;
        accounts.insert_tr(
            &mut tr,
            &User {
                id: id.into(),
                ..user
            },
        )?;
    }

    let locked: Vec<_> = accounts
        .lock_tr(&mut tr, &["c", "nobody", "a"])?
        .into_iter()
        .map(|user| user.id)
        .collect();
    assert_eq!(locked, vec!["a", "c"]);
    Ok(())
}
