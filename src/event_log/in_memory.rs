use super::*;
use crate::persistence::{InMemoryConnection, InMemoryPersistence, InMemoryTransaction};
use anyhow::format_err;
use parking_lot::{Condvar, Mutex};

type InMemoryLogInner = Vec<Event>;

#[derive(Default)]
pub struct InMemoryLog {
    inner: Mutex<InMemoryLogInner>,
    condvar: Condvar,
}

impl InMemoryLog {
    fn append(&self, events: Vec<Event>) {
        let mut write = self.inner.lock();
        write.extend(events);
        self.condvar.notify_all();
    }
}

impl Reader<InMemoryPersistence> for InMemoryLog {
    fn read(
        &self,
        _conn: &mut InMemoryConnection,
        offset: Offset,
        limit: usize,
        timeout: Option<Duration>,
    ) -> Result<WithOffset<Vec<LogEvent>>> {
        let offset_usize = usize::try_from(offset)?;

        let mut read = self.inner.lock();

        if limit == 0 {
            return Ok(WithOffset {
                offset,
                data: vec![],
            });
        }

        if read.len() == offset_usize {
            if let Some(timeout) = timeout {
                self.condvar.wait_for(&mut read, timeout);
            } else {
                self.condvar.wait(&mut read);
            }
        }

        let res: Vec<_> = read
            .get(offset_usize..)
            .ok_or_else(|| format_err!("out of bounds"))?
            .iter()
            .take(limit)
            .zip(offset + 1..)
            .map(|(e, offset)| LogEvent {
                offset,
                details: e.clone(),
            })
            .collect();

        Ok(WithOffset {
            offset: offset + Offset::try_from(res.len())?,
            data: res,
        })
    }

    fn get_start_offset(&self) -> Result<Offset> {
        Ok(0)
    }
}

pub struct InMemoryLogWriter(Arc<InMemoryLog>);

impl Writer<InMemoryPersistence> for InMemoryLogWriter {
    fn write_tr<'a>(&self, conn: &mut InMemoryTransaction<'a>, events: &[Event]) -> Result<()> {
        let log = self.0.clone();
        let events = events.to_vec();
        conn.on_commit(move || log.append(events));
        Ok(())
    }
}

pub fn new_in_memory_shared() -> (
    SharedWriter<InMemoryPersistence>,
    SharedReader<InMemoryPersistence>,
) {
    let log = Arc::new(InMemoryLog::default());
    (Arc::new(InMemoryLogWriter(log.clone())), log)
}
