//! Table of active forwarding sessions keyed by stream path.
//!
//! The table lock is held only to check, reserve, promote or remove a slot.
//! Opening the stream, building the delivery client and spawning the loop all
//! happen outside it. Each slot carries a generation so a finished loop only
//! ever evicts its own entry, never a later session reusing the same path.
//!
//! A loop that reaches the end of its stream evicts itself and then drains
//! its delivery client, so records already queued still reach the collector.
//! Sessions ended by `stop` close the client under its own policy instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use fluentd_async_types::LoggerInfo;

use crate::delivery::{Delivery, DeliveryFactory};
use crate::framing::LogRecords;
use crate::stream::{LogStream, StreamCloser};

use super::{Forwarder, SessionError};

const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

type Table = Arc<Mutex<HashMap<String, SessionSlot>>>;

enum SessionSlot {
    /// Reserved by a `start` call that is still opening the session.
    Starting { generation: u64 },
    Running(RunningSession),
}

impl SessionSlot {
    fn generation(&self) -> u64 {
        match self {
            Self::Starting { generation } => *generation,
            Self::Running(session) => session.generation,
        }
    }
}

struct RunningSession {
    generation: u64,
    closer: StreamCloser,
    delivery: Arc<dyn Delivery>,
    worker: JoinHandle<()>,
}

impl RunningSession {
    fn interrupt(&self) {
        self.closer.close();
    }

    /// Waits for the forwarder, then closes the client under its policy.
    fn finish(self, stream: &str) {
        if self.worker.join().is_err() {
            warn!(target: REGISTRY_TARGET, stream, "forwarder thread panicked");
        }
        close_delivery(self.delivery.as_ref(), stream);
    }

    /// Tears down a session that never made it into the table. The client is
    /// closed first so a drain started by the forwarder cannot hold up `start`.
    fn abort(self, stream: &str) {
        self.interrupt();
        close_delivery(self.delivery.as_ref(), stream);
        if self.worker.join().is_err() {
            warn!(target: REGISTRY_TARGET, stream, "forwarder thread panicked");
        }
    }
}

fn close_delivery(delivery: &dyn Delivery, stream: &str) {
    if let Err(error) = delivery.close() {
        warn!(
            target: REGISTRY_TARGET,
            stream,
            error = %error,
            "failed to close delivery client"
        );
    }
}

/// Owner of every active session.
pub struct Registry {
    sessions: Table,
    generations: AtomicU64,
    factory: Arc<dyn DeliveryFactory>,
}

impl Registry {
    /// Creates an empty registry whose sessions obtain delivery clients from
    /// `factory`.
    pub fn new(factory: Arc<dyn DeliveryFactory>) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            generations: AtomicU64::new(0),
            factory,
        }
    }

    /// Starts forwarding the FIFO at `stream_id` for the container in `info`.
    ///
    /// Returns once the forwarding thread runs. Two concurrent calls for the
    /// same stream never both succeed.
    pub fn start(&self, stream_id: &str, info: &LoggerInfo) -> Result<(), SessionError> {
        if info.container_id.is_empty() {
            return Err(SessionError::missing_field("ContainerID"));
        }
        if stream_id.is_empty() {
            return Err(SessionError::missing_field("File"));
        }

        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut table = self.table()?;
            if table.contains_key(stream_id) {
                return Err(SessionError::already_exists(stream_id));
            }
            table.insert(stream_id.to_owned(), SessionSlot::Starting { generation });
        }

        match self.launch(stream_id, info, generation) {
            Ok(session) => {
                self.promote(stream_id, session);
                info!(
                    target: REGISTRY_TARGET,
                    stream = stream_id,
                    container = %info.container_id,
                    "started forwarding log stream"
                );
                Ok(())
            }
            Err(error) => {
                release(&self.sessions, stream_id, generation);
                Err(error)
            }
        }
    }

    /// Stops forwarding `stream_id`. Unknown streams are a no-op.
    pub fn stop(&self, stream_id: &str) -> Result<(), SessionError> {
        let slot = self.table()?.remove(stream_id);
        match slot {
            Some(SessionSlot::Running(session)) => {
                session.interrupt();
                session.finish(stream_id);
                info!(target: REGISTRY_TARGET, stream = stream_id, "stopped forwarding log stream");
            }
            // The pending start sees its reservation gone and shuts itself down.
            Some(SessionSlot::Starting { .. }) => {
                debug!(target: REGISTRY_TARGET, stream = stream_id, "stopped a starting session");
            }
            None => {
                debug!(target: REGISTRY_TARGET, stream = stream_id, "stop for unknown stream ignored");
            }
        }
        Ok(())
    }

    /// Stops every session.
    pub fn stop_all(&self) {
        let drained: Vec<(String, SessionSlot)> = lock_recovering(&self.sessions).drain().collect();
        let running: Vec<(String, RunningSession)> = drained
            .into_iter()
            .filter_map(|(stream, slot)| match slot {
                SessionSlot::Running(session) => Some((stream, session)),
                SessionSlot::Starting { .. } => None,
            })
            .collect();

        for (_, session) in &running {
            session.interrupt();
        }
        let count = running.len();
        for (stream, session) in running {
            session.finish(&stream);
        }
        if count > 0 {
            info!(target: REGISTRY_TARGET, sessions = count, "stopped all log streams");
        }
    }

    /// Snapshot of registered stream ids, sorted.
    pub fn active_streams(&self) -> Vec<String> {
        let mut streams: Vec<String> = lock_recovering(&self.sessions).keys().cloned().collect();
        streams.sort();
        streams
    }

    fn table(&self) -> Result<MutexGuard<'_, HashMap<String, SessionSlot>>, SessionError> {
        self.sessions.lock().map_err(|_| SessionError::Internal {
            message: String::from("session table lock poisoned"),
        })
    }

    fn launch(
        &self,
        stream_id: &str,
        info: &LoggerInfo,
        generation: u64,
    ) -> Result<RunningSession, SessionError> {
        let stream = LogStream::open_fifo(stream_id).map_err(|source| SessionError::OpenStream {
            path: stream_id.into(),
            source,
        })?;
        let forwarder = Forwarder::new(info, self.factory.as_ref())?;
        let closer = stream.closer();
        let delivery = forwarder.delivery();

        let sessions = Arc::clone(&self.sessions);
        let key = stream_id.to_owned();
        let worker = thread::Builder::new()
            .name(format!("forwarder-{}", info.id()))
            .spawn(move || {
                let records = LogRecords::new(stream);
                forwarder.run(records);
                // A slot taken by `stop` or `stop_all` is closed by its taker.
                if !release(&sessions, &key, generation) {
                    return;
                }
                debug!(target: REGISTRY_TARGET, stream = %key, "evicted finished session");
                if let Err(error) = forwarder.delivery().drain() {
                    warn!(
                        target: REGISTRY_TARGET,
                        stream = %key,
                        error = %error,
                        "failed to drain delivery client"
                    );
                }
            });

        match worker {
            Ok(worker) => Ok(RunningSession {
                generation,
                closer,
                delivery,
                worker,
            }),
            Err(source) => {
                if let Err(error) = delivery.close() {
                    debug!(target: REGISTRY_TARGET, error = %error, "closing unused delivery client failed");
                }
                Err(SessionError::Spawn {
                    stream: stream_id.to_owned(),
                    source,
                })
            }
        }
    }

    /// Replaces the reservation with the running session, unless the session
    /// was stopped or already finished in the meantime.
    fn promote(&self, stream_id: &str, session: RunningSession) {
        let mut table = lock_recovering(&self.sessions);
        let reserved = table
            .get(stream_id)
            .is_some_and(|slot| matches!(slot, SessionSlot::Starting { generation } if *generation == session.generation));
        if reserved {
            table.insert(stream_id.to_owned(), SessionSlot::Running(session));
            return;
        }
        drop(table);
        session.abort(stream_id);
        debug!(target: REGISTRY_TARGET, stream = stream_id, "session ended before registration");
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Removes the slot for `stream_id` when it still belongs to `generation`.
fn release(sessions: &Table, stream_id: &str, generation: u64) -> bool {
    let mut table = lock_recovering(sessions);
    let owned = table
        .get(stream_id)
        .is_some_and(|slot| slot.generation() == generation);
    if owned {
        table.remove(stream_id);
    }
    owned
}

fn lock_recovering(sessions: &Table) -> MutexGuard<'_, HashMap<String, SessionSlot>> {
    sessions.lock().unwrap_or_else(PoisonError::into_inner)
}
