//! Correlates multiplexed request/response exchanges on one connection.
//!
//! A client sends many logical requests over a single connection, each
//! tagged with a stream id. [`StreamCorrelator`] hands out those ids, keeps
//! one completion per in-flight exchange, and routes each tagged response
//! to the caller waiting for it, whatever order responses arrive in.
//!
//! ```text
//!  caller                 correlator                  I/O task
//!    | allocate() -------> id 3 registered
//!    | send request(3) ---------------------------------> wire
//!    |                                      <------------ response(3)
//!    |                    resolve(3, resp) <-------------|
//!    | <--- wait() yields resp, id 3 removed
//! ```
//!
//! Stream ids are odd and start at 3 (id 1 is reserved). Allocation is gated
//! behind a settings barrier that the I/O task opens once the peer's
//! parameters are known. On connection loss, [`StreamCorrelator::fail_all`]
//! fails every pending exchange with one shared cause.

use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};

/// How long [`StreamCorrelator::await_settings`] waits by default.
pub const DEFAULT_SETTINGS_TIMEOUT: Duration = Duration::from_secs(5);

const FIRST_STREAM_ID: u32 = 3;

/// Largest stream id a client may use (RFC 9113 §5.1.1).
const MAX_STREAM_ID: u32 = 0x7fff_ffff;

/// Errors seen by callers of the correlator.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    #[error("connection settings have not been received yet")]
    NotReady,

    #[error("timed out waiting for connection settings")]
    SettingsTimeout,

    #[error("connection is closed")]
    Closed,

    #[error("stream ids exhausted on this connection")]
    StreamIdsExhausted,

    #[error("peer allows at most {max} concurrent streams")]
    TooManyStreams { max: u32 },

    #[error("timed out waiting for the response")]
    Timeout,

    #[error("exchange was cancelled")]
    Cancelled,

    #[error("connection failed: {0}")]
    Connection(#[source] Arc<io::Error>),
}

/// Connection parameters announced by the peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerSettings {
    /// Upper bound on concurrently open streams, if the peer set one.
    pub max_concurrent_streams: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Barrier {
    Pending,
    Ready(PeerSettings),
    Closed,
}

type Completion<T> = oneshot::Sender<Result<T, StreamError>>;

struct Table<T> {
    next_id: u32,
    pending: BTreeMap<u32, Completion<T>>,
    closed: bool,
}

struct Shared<T> {
    table: Mutex<Table<T>>,
    barrier: watch::Sender<Barrier>,
}

/// Tracks in-flight exchanges for one physical connection.
///
/// Cloning is cheap and every clone refers to the same table, so the task
/// issuing requests and the task reading responses can each hold one.
///
/// # Examples
///
/// ```
/// use wirehttp::client::stream::{PeerSettings, StreamCorrelator};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), wirehttp::client::stream::StreamError> {
/// let correlator = StreamCorrelator::<String>::default();
/// correlator.settings_received(PeerSettings::default());
/// correlator.await_settings().await?;
///
/// let exchange = correlator.allocate()?;
/// assert_eq!(exchange.id(), 3);
///
/// correlator.resolve(exchange.id(), "200 OK".to_owned());
/// assert_eq!(exchange.wait(Duration::from_secs(1)).await?, "200 OK");
/// # Ok(())
/// # }
/// ```
pub struct StreamCorrelator<T> {
    shared: Arc<Shared<T>>,
    settings_timeout: Duration,
}

impl<T> Clone for StreamCorrelator<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            settings_timeout: self.settings_timeout,
        }
    }
}

impl<T> Default for StreamCorrelator<T> {
    fn default() -> Self {
        Self::new(DEFAULT_SETTINGS_TIMEOUT)
    }
}

impl<T> StreamCorrelator<T> {
    /// Creates a correlator whose settings barrier is still closed.
    pub fn new(settings_timeout: Duration) -> Self {
        let (barrier, _) = watch::channel(Barrier::Pending);
        Self {
            shared: Arc::new(Shared {
                table: Mutex::new(Table {
                    next_id: FIRST_STREAM_ID,
                    pending: BTreeMap::new(),
                    closed: false,
                }),
                barrier,
            }),
            settings_timeout,
        }
    }

    /// Opens the settings barrier. Only the first call has an effect, and
    /// none after the connection failed.
    pub fn settings_received(&self, settings: PeerSettings) {
        let opened = self.shared.barrier.send_if_modified(|state| {
            if *state == Barrier::Pending {
                *state = Barrier::Ready(settings);
                true
            } else {
                false
            }
        });
        if opened {
            debug!(?settings, "connection settings received");
        }
    }

    /// Waits for the settings barrier, at most the configured timeout.
    ///
    /// A timeout only ends this wait: settings arriving later still open the
    /// barrier for subsequent callers.
    pub async fn await_settings(&self) -> Result<PeerSettings, StreamError> {
        let mut rx = self.shared.barrier.subscribe();
        let waited = tokio::time::timeout(self.settings_timeout, async {
            rx.wait_for(|state| *state != Barrier::Pending)
                .await
                .map(|state| *state)
        })
        .await;

        match waited {
            Ok(Ok(Barrier::Ready(settings))) => Ok(settings),
            Ok(Ok(_)) | Ok(Err(_)) => Err(StreamError::Closed),
            Err(_) => {
                warn!(timeout = ?self.settings_timeout, "connection settings not received in time");
                Err(StreamError::SettingsTimeout)
            }
        }
    }

    /// Reserves the next stream id and registers its completion.
    ///
    /// # Errors
    ///
    /// - [`StreamError::NotReady`]: settings have not been received.
    /// - [`StreamError::Closed`]: [`fail_all`](Self::fail_all) already ran.
    /// - [`StreamError::TooManyStreams`]: the peer's concurrency limit is reached.
    /// - [`StreamError::StreamIdsExhausted`]: no odd id below 2^31 is left.
    pub fn allocate(&self) -> Result<PendingStream<T>, StreamError> {
        let settings = match *self.shared.barrier.borrow() {
            Barrier::Ready(settings) => settings,
            Barrier::Pending => return Err(StreamError::NotReady),
            Barrier::Closed => return Err(StreamError::Closed),
        };

        let (tx, rx) = oneshot::channel();
        let id = {
            let mut table = self.shared.table.lock();
            if table.closed {
                return Err(StreamError::Closed);
            }
            if let Some(max) = settings.max_concurrent_streams {
                if table.pending.len() >= max as usize {
                    return Err(StreamError::TooManyStreams { max });
                }
            }
            if table.next_id > MAX_STREAM_ID {
                return Err(StreamError::StreamIdsExhausted);
            }
            let id = table.next_id;
            table.next_id += 2;
            table.pending.insert(id, tx);
            id
        };

        debug!(stream_id = id, "stream allocated");
        Ok(PendingStream {
            id,
            rx,
            shared: Arc::downgrade(&self.shared),
        })
    }

    /// Completes the exchange for `stream_id` with `payload`.
    ///
    /// Returns `false` and drops the payload if the id is unknown, already
    /// resolved, or abandoned by its caller.
    pub fn resolve(&self, stream_id: u32, payload: T) -> bool {
        let completion = self.shared.table.lock().pending.remove(&stream_id);
        match completion {
            Some(tx) => {
                if tx.send(Ok(payload)).is_err() {
                    debug!(stream_id, "response arrived after the caller stopped waiting");
                }
                true
            }
            None => {
                warn!(stream_id, "response for unknown or already resolved stream, dropping");
                false
            }
        }
    }

    /// Abandons the exchange for `stream_id`; its waiter sees
    /// [`StreamError::Cancelled`]. Returns `false` if nothing was pending.
    pub fn cancel(&self, stream_id: u32) -> bool {
        let removed = self.shared.table.lock().pending.remove(&stream_id).is_some();
        if removed {
            debug!(stream_id, "stream cancelled");
        }
        removed
    }

    /// Fails every pending exchange with `cause` and closes the correlator.
    ///
    /// Returns the number of exchanges failed. Only the first call does
    /// anything; later calls return `0`.
    pub fn fail_all(&self, cause: io::Error) -> usize {
        let drained = {
            let mut table = self.shared.table.lock();
            if table.closed {
                return 0;
            }
            table.closed = true;
            std::mem::take(&mut table.pending)
        };
        self.shared.barrier.send_replace(Barrier::Closed);

        let cause = Arc::new(cause);
        let failed = drained.len();
        debug!(failed, cause = %cause, "connection failed, failing pending streams");
        for (_, tx) in drained {
            let _ = tx.send(Err(StreamError::Connection(Arc::clone(&cause))));
        }
        failed
    }

    /// Number of exchanges still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.shared.table.lock().pending.len()
    }

    /// Returns `true` once [`fail_all`](Self::fail_all) has run.
    pub fn is_closed(&self) -> bool {
        self.shared.table.lock().closed
    }
}

/// One allocated exchange, waiting for its response.
///
/// Dropping it (including after a timed-out [`wait`](Self::wait)) removes the
/// exchange from the correlator, so a late response is logged and dropped.
pub struct PendingStream<T> {
    id: u32,
    rx: oneshot::Receiver<Result<T, StreamError>>,
    shared: Weak<Shared<T>>,
}

impl<T> std::fmt::Debug for PendingStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingStream").field("id", &self.id).finish()
    }
}

impl<T> PendingStream<T> {
    /// The stream id to tag the outgoing request with.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Waits up to `timeout` for the response.
    ///
    /// Timing out only stops this wait; the request on the wire is untouched.
    pub async fn wait(mut self, timeout: Duration) -> Result<T, StreamError> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(StreamError::Cancelled),
            Err(_) => {
                debug!(stream_id = self.id, ?timeout, "gave up waiting for response");
                Err(StreamError::Timeout)
            }
        }
    }
}

impl<T> Drop for PendingStream<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.table.lock().pending.remove(&self.id);
        }
    }
}
