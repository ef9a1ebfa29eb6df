use std::time::Duration;

use crate::{
    event::*,
    event_log::{self, LogEvent, WithOffset},
    persistence::{self, Connection, Persistence, Transaction},
};
use anyhow::Result;

#[test]
fn event_logs_sanity_check() -> Result<()> {
    let persistence = persistence::InMemoryPersistence::new();
    let (event_writer, event_reader) = event_log::new_in_memory_shared();

    let start_offset = event_reader.get_start_offset()?;

    let mut conn = persistence.get_connection()?;

    assert_eq!(
        event_reader.read(&mut conn, start_offset, 0, Some(Duration::from_secs(0)))?,
        WithOffset {
            offset: start_offset,
            data: vec![]
        }
    );

    assert_eq!(
        event_reader.read(&mut conn, start_offset, 1, Some(Duration::from_secs(0)))?,
        WithOffset {
            offset: start_offset,
            data: vec![]
        }
    );

    let mut tr = conn.start_transaction()?;
    event_writer.write_tr(&mut tr, &[Event::Test, Event::Test])?;
    tr.commit()?;

    let first = event_reader.read(&mut conn, start_offset, 1, Some(Duration::from_secs(0)))?;
    assert_eq!(
        first,
        WithOffset {
            offset: start_offset + 1,
            data: vec![LogEvent {
                offset: start_offset + 1,
                details: Event::Test
            }]
        }
    );

    let rest = event_reader.read(&mut conn, first.offset, 10, Some(Duration::from_secs(0)))?;
    assert_eq!(rest.offset, start_offset + 2);
    assert_eq!(rest.data.len(), 1);

    assert_eq!(
        event_reader.read(&mut conn, rest.offset, 1, Some(Duration::from_secs(0)))?,
        WithOffset {
            offset: rest.offset,
            data: vec![]
        }
    );

    Ok(())
}

#[test]
fn events_are_visible_only_after_commit() -> Result<()> {
    let persistence = persistence::InMemoryPersistence::new();
    let (event_writer, event_reader) = event_log::new_in_memory_shared();
    let start_offset = event_reader.get_start_offset()?;

    let mut conn = persistence.get_connection()?;
    let mut tr = conn.start_transaction()?;
    event_writer.write_tr(&mut tr, &[Event::Test])?;
    tr.rollback()?;

    {
        let mut tr = conn.start_transaction()?;
        event_writer.write_tr(&mut tr, &[Event::Test])?;
        // dropped without commit
    }

    let mut reader_conn = persistence.get_connection()?;
    assert!(event_reader
        .read(&mut reader_conn, start_offset, 10, Some(Duration::from_secs(0)))?
        .data
        .is_empty());
    Ok(())
}

#[test]
fn readers_wake_up_on_new_events() -> Result<()> {
    let persistence = persistence::InMemoryPersistence::new();
    let (event_writer, event_reader) = event_log::new_in_memory_shared();
    let start_offset = event_reader.get_start_offset()?;

    let reader = std::thread::spawn({
        let persistence = persistence.clone();
        move || -> Result<usize> {
            let mut conn = persistence.get_connection()?;
            let res =
                event_reader.read(&mut conn, start_offset, 10, Some(Duration::from_secs(10)))?;
            Ok(res.data.len())
        }
    });

    std::thread::sleep(Duration::from_millis(50));
    let mut conn = persistence.get_connection()?;
    let mut tr = conn.start_transaction()?;
    event_writer.write_tr(&mut tr, &[Event::Test])?;
    tr.commit()?;

    let read = reader
        .join()
        .map_err(|_| anyhow::format_err!("reader panicked"))??;
    assert_eq!(read, 1);
    Ok(())
}
