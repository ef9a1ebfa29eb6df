use super::*;
use crate::persistence::{PostgresConnection, PostgresPersistence, PostgresTransaction};
use ::postgres::types::Json;
use std::time::Instant;

/// Key of the advisory lock serializing writers.
///
/// `BIGSERIAL` ids are handed out before commit, so without it a reader
/// could skip over an event committed after a later one.
const EVENT_WRITE_LOCK: i64 = 0x6576_6d5f_6c6f_67;

pub struct PostgresEventLog {
    poll_interval: Duration,
}

impl PostgresEventLog {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

pub fn new_postgres_shared(
    poll_interval: Duration,
) -> (
    SharedWriter<PostgresPersistence>,
    SharedReader<PostgresPersistence>,
) {
    let log = Arc::new(PostgresEventLog::new(poll_interval));
    (log.clone(), log)
}

impl Reader<PostgresPersistence> for PostgresEventLog {
    fn read(
        &self,
        conn: &mut PostgresConnection,
        offset: Offset,
        limit: usize,
        timeout: Option<Duration>,
    ) -> Result<WithOffset<Vec<LogEvent>>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let rows = conn.query(
                "SELECT id, details FROM events WHERE id > $1 ORDER BY id LIMIT $2",
                &[&i64::try_from(offset)?, &i64::try_from(limit)?],
            )?;

            if !rows.is_empty() || limit == 0 {
                let mut new_offset = offset;
                let mut data = Vec::with_capacity(rows.len());
                for row in rows {
                    let id = Offset::try_from(row.get::<_, i64>("id"))?;
                    let Json(details) = row.get::<_, Json<Event>>("details");
                    // next read starts after this event
                    new_offset = id;
                    data.push(LogEvent {
                        offset: id,
                        details,
                    });
                }
                return Ok(WithOffset {
                    offset: new_offset,
                    data,
                });
            }

            let sleep = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if deadline <= now {
                        return Ok(WithOffset {
                            offset,
                            data: vec![],
                        });
                    }
                    self.poll_interval.min(deadline - now)
                }
                None => self.poll_interval,
            };
            std::thread::sleep(sleep);
        }
    }

    fn get_start_offset(&self) -> Result<Offset> {
        Ok(0)
    }
}

impl Writer<PostgresPersistence> for PostgresEventLog {
    fn write_tr<'a>(&self, conn: &mut PostgresTransaction<'a>, events: &[Event]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        conn.execute("SELECT pg_advisory_xact_lock($1)", &[&EVENT_WRITE_LOCK])?;
        for event in events {
            conn.execute(
                "INSERT INTO events (details) VALUES ($1)",
                &[&Json(event)],
            )?;
        }
        Ok(())
    }
}
