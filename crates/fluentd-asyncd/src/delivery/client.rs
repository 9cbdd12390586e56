//! Asynchronous Fluentd forward-protocol client.
//!
//! `post` encodes the event and appends it to a byte-bounded queue; a worker
//! thread drains the queue in order, reconnecting with exponential backoff
//! whenever a send fails.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::policy::DeliveryPolicy;

use super::connection::Connection;
use super::forward::encode_event;
use super::{DELIVERY_TARGET, Delivery, DeliveryError, Record};

/// Longest wait between two attempts.
pub const MAX_RETRY_WAIT: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct QueuedEvent {
    tag: String,
    bytes: Vec<u8>,
    chunk: Option<String>,
}

#[derive(Debug, Default)]
struct QueueState {
    events: VecDeque<QueuedEvent>,
    /// Bytes queued or in flight.
    pending_bytes: usize,
    closing: bool,
    abandon: bool,
}

#[derive(Debug)]
struct Shared {
    policy: DeliveryPolicy,
    state: Mutex<QueueState>,
    wakeup: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleeps for `wait` unless the client is force-closed meanwhile.
    /// Returns `false` when delivery should stop.
    fn backoff(&self, wait: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .wakeup
            .wait_timeout_while(guard, wait, |state| !state.abandon)
            .unwrap_or_else(PoisonError::into_inner);
        !guard.abandon
    }
}

/// Delivery client speaking the forward protocol to one collector.
#[derive(Debug)]
pub struct FluentClient {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl FluentClient {
    /// Starts the worker thread for `policy`. No connection is made until the
    /// first event is posted.
    pub fn new(policy: DeliveryPolicy) -> Result<Self, DeliveryError> {
        let shared = Arc::new(Shared {
            policy,
            state: Mutex::new(QueueState::default()),
            wakeup: Condvar::new(),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(String::from("fluent-delivery"))
            .spawn(move || run_worker(&worker_shared))
            .map_err(|source| DeliveryError::Spawn { source })?;

        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Policy the client was built with.
    #[must_use]
    pub fn policy(&self) -> &DeliveryPolicy {
        &self.shared.policy
    }

    /// Refuses further posts and waits for the worker. With `abandon` the
    /// worker drops whatever is still queued instead of sending it.
    fn shut_down(&self, abandon: bool) -> Result<(), DeliveryError> {
        {
            let mut state = self.shared.lock();
            state.closing = true;
            state.abandon |= abandon;
        }
        self.shared.wakeup.notify_all();

        // Only the first caller joins; a later forced close just raises the
        // abandon flag for the worker that caller is waiting on.
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match worker {
            Some(handle) => handle.join().map_err(|_| DeliveryError::WorkerPanicked),
            None => Ok(()),
        }
    }
}

impl Delivery for FluentClient {
    fn post(&self, tag: &str, time: SystemTime, record: &Record) -> Result<(), DeliveryError> {
        let policy = &self.shared.policy;
        let chunk = (policy.request_ack && !policy.target.is_datagram())
            .then(|| Uuid::new_v4().simple().to_string());
        let bytes = encode_event(
            tag,
            time,
            record,
            policy.sub_second_precision,
            chunk.as_deref(),
        )?;

        let mut state = self.shared.lock();
        if state.closing {
            return Err(DeliveryError::Closed);
        }
        if state.pending_bytes.saturating_add(bytes.len()) > policy.buffer_limit {
            return Err(DeliveryError::BufferFull {
                limit: policy.buffer_limit,
                pending: state.pending_bytes,
                needed: bytes.len(),
            });
        }
        state.pending_bytes += bytes.len();
        state.events.push_back(QueuedEvent {
            tag: tag.to_owned(),
            bytes,
            chunk,
        });
        drop(state);
        self.shared.wakeup.notify_one();
        Ok(())
    }

    fn close(&self) -> Result<(), DeliveryError> {
        self.shut_down(self.shared.policy.force_stop_on_close)
    }

    fn drain(&self) -> Result<(), DeliveryError> {
        self.shut_down(false)
    }
}

impl Drop for FluentClient {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.closing = true;
        state.abandon = true;
        drop(state);
        self.shared.wakeup.notify_all();
    }
}

fn run_worker(shared: &Shared) {
    let mut connection = None;
    while let Some(event) = next_event(shared) {
        deliver(shared, &mut connection, &event);
        let mut state = shared.lock();
        state.pending_bytes = state.pending_bytes.saturating_sub(event.bytes.len());
    }

    let abandoned = shared.lock().events.len();
    if abandoned > 0 {
        warn!(
            target: DELIVERY_TARGET,
            target_address = %shared.policy.target,
            abandoned,
            "delivery stopped with undelivered events"
        );
    }
    debug!(target: DELIVERY_TARGET, "delivery worker finished");
}

/// Blocks until an event is available; `None` once the worker should stop.
fn next_event(shared: &Shared) -> Option<QueuedEvent> {
    let mut state = shared.lock();
    loop {
        if state.abandon {
            return None;
        }
        if let Some(event) = state.events.pop_front() {
            return Some(event);
        }
        if state.closing {
            return None;
        }
        state = shared
            .wakeup
            .wait(state)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

fn deliver(shared: &Shared, connection: &mut Option<Connection>, event: &QueuedEvent) {
    let policy = &shared.policy;
    let mut failures: u64 = 0;
    loop {
        let error = match send_once(policy, connection, event) {
            Ok(()) => return,
            Err(error) => error,
        };

        if failures >= policy.max_retries {
            warn!(
                target: DELIVERY_TARGET,
                target_address = %policy.target,
                tag = %event.tag,
                attempts = failures + 1,
                error = %error,
                "discarding event after exhausting retries"
            );
            return;
        }

        let wait = retry_wait(policy.retry_wait, failures);
        debug!(
            target: DELIVERY_TARGET,
            target_address = %policy.target,
            error = %error,
            wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
            "delivery attempt failed; backing off"
        );
        failures += 1;
        if !shared.backoff(wait) {
            return;
        }
    }
}

fn send_once(
    policy: &DeliveryPolicy,
    connection: &mut Option<Connection>,
    event: &QueuedEvent,
) -> Result<(), DeliveryError> {
    // A failed attempt leaves `connection` empty so the next one reconnects.
    let mut socket = match connection.take() {
        Some(socket) => socket,
        None => Connection::open(&policy.target)?,
    };
    socket.send(&event.bytes)?;
    if let Some(chunk) = &event.chunk {
        socket.await_ack(chunk)?;
    }
    *connection = Some(socket);
    Ok(())
}

/// `base × 1.5^failures`, capped at [`MAX_RETRY_WAIT`].
fn retry_wait(base: Duration, failures: u64) -> Duration {
    // Past 200 failures every non-zero base is already capped.
    let exponent = i32::try_from(failures.min(200)).unwrap_or(200);
    let wait = base.as_secs_f64() * 1.5_f64.powi(exponent);
    if wait >= MAX_RETRY_WAIT.as_secs_f64() {
        MAX_RETRY_WAIT
    } else {
        Duration::from_secs_f64(wait)
    }
}
