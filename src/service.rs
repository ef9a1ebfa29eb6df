pub mod auction_engine;
pub mod http;
pub mod marketplace;
pub mod notifier;
pub mod scheduler;
pub mod settlement;

pub use self::{
    auction_engine::*, http::*, marketplace::*, notifier::*, scheduler::*, settlement::*,
};
use crate::{
    event::Event,
    event_log::{LogEvent, Offset, SharedReader, WithOffset},
    persistence::{self, Connection, ConnectionOf, Persistence, Transaction, TransactionOf},
    progress::SharedProgressTracker,
};
use anyhow::{bail, format_err, Result};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};
use tracing::{debug, error, info};

pub type ServiceId = String;
pub type ServiceIdRef<'a> = &'a str;

/// How many events a log follower reads at once
const EVENT_BATCH_SIZE: usize = 16;

/// How long a log follower waits for new events before checking if it should stop
const EVENT_WAIT: Duration = Duration::from_secs(1);

/// A service that handles events on the log
pub trait LogFollowerService<P: Persistence>: Send {
    fn get_log_progress_id(&self) -> String;

    fn handle_event<'a>(&mut self, conn: &mut TransactionOf<'a, P>, event: Event) -> Result<()>;
}

/// A service that is a loop that does something
pub trait LoopService: Send {
    fn run_iteration(&mut self) -> Result<()>;
}

/// A log follower service together with its position in the log
///
/// Every event is handled in its own transaction, which also stores the
/// position after it, so every event is handled exactly once. Writes to
/// the event log take the last lock of a transaction, and handling one
/// event per transaction keeps it that way.
pub struct LogFollower<P: Persistence, S> {
    service: S,
    service_id: ServiceId,
    persistence: P,
    event_reader: SharedReader<P>,
    progress_store: SharedProgressTracker<P>,
    progress: Offset,
}

impl<P, S> LogFollower<P, S>
where
    P: Persistence,
    S: LogFollowerService<P>,
{
    pub fn new(
        service: S,
        persistence: P,
        event_reader: SharedReader<P>,
        progress_store: SharedProgressTracker<P>,
    ) -> Result<Self> {
        let service_id = service.get_log_progress_id();
        let mut connection = persistence.get_connection()?;
        let progress = match progress_store.load(&mut connection, &service_id)? {
            Some(offset) => offset,
            None => event_reader.get_start_offset()?,
        };
        debug!(service = %service_id, progress, "log follower starting");
        Ok(Self {
            service,
            service_id,
            persistence,
            event_reader,
            progress_store,
            progress,
        })
    }

    /// Handle the next batch of events, waiting up to `timeout` for one
    ///
    /// Returns the number of events handled. An event whose transaction
    /// loses to a concurrent one is left for the next poll.
    pub fn poll(&mut self, timeout: Option<Duration>) -> Result<usize> {
        let mut connection = self.persistence.get_connection()?;

        let WithOffset { data: events, .. } = self
            .event_reader
            .read(&mut connection, self.progress, EVENT_BATCH_SIZE, timeout)?;

        let mut count = 0;
        for event in events {
            match self.handle_tr(&mut connection, event) {
                Ok(()) => count += 1,
                Err(e) if persistence::is_conflict(&e) => {
                    debug!(service = %self.service_id, "event conflicted, will retry: {e}");
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(count)
    }

    fn handle_tr(&mut self, connection: &mut ConnectionOf<P>, event: LogEvent) -> Result<()> {
        let mut transaction = connection.start_transaction()?;
        self.service.handle_event(&mut transaction, event.details)?;
        self.progress_store
            .store_tr(&mut transaction, &self.service_id, event.offset)?;
        transaction.commit()?;
        self.progress = event.offset;
        Ok(())
    }

    /// Handle everything that is on the log right now
    pub fn catch_up(&mut self) -> Result<usize> {
        let mut total = 0;
        loop {
            match self.poll(Some(Duration::ZERO))? {
                0 => return Ok(total),
                n => total += n,
            }
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }
}

impl<P, S> LoopService for LogFollower<P, S>
where
    P: Persistence,
    S: LogFollowerService<P>,
{
    fn run_iteration(&mut self) -> Result<()> {
        self.poll(Some(EVENT_WAIT))?;
        Ok(())
    }
}

/// Service execution control instance
///
/// All services are basically a loop, and we would like to be able to
/// gracefully terminate them, and handle and top-level error of any
/// of them by gracefully stopping everything else.
#[derive(Clone)]
pub struct ServiceControl<P: Persistence> {
    stop_all: Arc<AtomicBool>,
    progress_store: SharedProgressTracker<P>,
    persistence: P,
}

impl<P: Persistence> ServiceControl<P> {
    pub fn new(persistence: P, progress_store: SharedProgressTracker<P>) -> Self {
        Self {
            stop_all: Default::default(),
            progress_store,
            persistence,
        }
    }

    pub fn stop_all(&self) {
        self.stop_all.store(true, Ordering::SeqCst);
    }

    pub fn spawn_log_follower(
        &self,
        service: impl LogFollowerService<P> + 'static,
        event_reader: SharedReader<P>,
    ) -> JoinHandle {
        match LogFollower::new(
            service,
            self.persistence.clone(),
            event_reader,
            self.progress_store.clone(),
        ) {
            Ok(follower) => self.spawn_loop(follower),
            // To avoid returning a `Result` directly from here, spawn a thread that will
            // immediately terminate with an error, just like the initial progress load was
            // done from the spawned thread itself.
            Err(e) => {
                self.stop_all();
                JoinHandle::new(Arc::new(AtomicBool::new(false)), thread::spawn(move || Err(e)))
            }
        }
    }

    pub fn spawn_loop(&self, mut service: impl LoopService + 'static) -> JoinHandle {
        self.spawn_loop_raw(move || service.run_iteration())
    }

    /// Start a new service as a loop, with a certain body
    ///
    /// This will take care of checking termination condition and
    /// handling any errors returned by `f`
    fn spawn_loop_raw<F>(&self, mut f: F) -> JoinHandle
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));

        JoinHandle::new(
            stop.clone(),
            thread::spawn({
                let stop_all = self.stop_all.clone();
                move || match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    while !stop.load(Ordering::SeqCst) && !stop_all.load(Ordering::SeqCst) {
                        if let Err(e) = f() {
                            error!("service failed, stopping all services: {e:#}");
                            stop_all.store(true, Ordering::SeqCst);
                            return Err(e);
                        }
                    }
                    Ok(())
                })) {
                    Err(_e) => {
                        stop_all.store(true, Ordering::SeqCst);
                        bail!("service panicked");
                    }
                    Ok(res) => res,
                }
            }),
        )
    }
}

/// Simple thread join wrapper that stops and joins the thread on drop
pub struct JoinHandle {
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<Result<()>>>,
}

impl JoinHandle {
    fn new(stop: Arc<AtomicBool>, handle: thread::JoinHandle<Result<()>>) -> Self {
        JoinHandle {
            stop,
            thread: Some(handle),
        }
    }

    fn join_mut(&mut self) -> Result<()> {
        if let Some(h) = self.thread.take() {
            h.join().map_err(|e| format_err!("join failed: {:?}", e))?
        } else {
            Ok(())
        }
    }

    pub fn join(mut self) -> Result<()> {
        self.join_mut()
    }
}

impl Drop for JoinHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Err(e) = self.join_mut() {
            info!("service finished with an error: {e:#}");
        }
    }
}
