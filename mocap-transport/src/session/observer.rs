//! Consumers of session events.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;

use super::SessionState;
use crate::core::{Endpoint, Frame};
use crate::error::Error;

/// Receives events from a session.
///
/// Frame, framing and connection-lost events run synchronously on the
/// session's worker thread; long-running work there delays the frames queued
/// behind the current one. State changes are also reported from the thread
/// that opens or disconnects the session. No registry lock is held during any
/// callback, so observers may call back into the registry.
pub trait SessionObserver: Send + Sync {
    /// A frame was extracted. Frames arrive in wire order.
    fn on_frame(&self, endpoint: &Endpoint, frame: &Frame);

    /// The transport failed mid-stream; the session is closing.
    fn on_connection_lost(&self, _endpoint: &Endpoint, _error: &Error) {}

    /// The session moved to a new lifecycle state.
    fn on_state_changed(&self, _endpoint: &Endpoint, _state: SessionState) {}

    /// Corrupt bytes were skipped while resynchronizing.
    fn on_framing_error(&self, _endpoint: &Endpoint, _error: &Error) {}
}

impl<F> SessionObserver for F
where
    F: Fn(&Endpoint, &Frame) + Send + Sync,
{
    fn on_frame(&self, endpoint: &Endpoint, frame: &Frame) {
        self(endpoint, frame)
    }
}

/// Handle returned by [`ObserverList::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Entry = (ObserverId, Arc<dyn SessionObserver>);

/// Ordered, shareable list of observers.
///
/// Clones share the same list. Notification iterates over a snapshot, so
/// observers may add or remove entries (including themselves) from inside
/// a callback.
#[derive(Clone, Default)]
pub struct ObserverList {
    entries: Arc<RwLock<Vec<Entry>>>,
    next_id: Arc<AtomicU64>,
}

impl ObserverList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an observer; it is notified after all earlier ones.
    pub fn add<O: SessionObserver + 'static>(&self, observer: O) -> ObserverId {
        self.add_shared(Arc::new(observer))
    }

    /// Appends an observer the caller keeps a handle to.
    pub fn add_shared(&self, observer: Arc<dyn SessionObserver>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push((id, observer));
        id
    }

    /// Removes an observer. Returns false if it was not registered.
    pub fn remove(&self, id: ObserverId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<dyn SessionObserver>> {
        self.entries
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect()
    }

    pub(crate) fn notify_frame(&self, endpoint: &Endpoint, frame: &Frame) {
        for observer in self.snapshot() {
            observer.on_frame(endpoint, frame);
        }
    }

    pub(crate) fn notify_connection_lost(&self, endpoint: &Endpoint, error: &Error) {
        for observer in self.snapshot() {
            observer.on_connection_lost(endpoint, error);
        }
    }

    pub(crate) fn notify_state(&self, endpoint: &Endpoint, state: SessionState) {
        for observer in self.snapshot() {
            observer.on_state_changed(endpoint, state);
        }
    }

    pub(crate) fn notify_framing_error(&self, endpoint: &Endpoint, error: &Error) {
        for observer in self.snapshot() {
            observer.on_framing_error(endpoint, error);
        }
    }
}

impl fmt::Debug for ObserverList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverList")
            .field("len", &self.len())
            .finish()
    }
}

/// A frame tagged with the session it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedFrame {
    pub endpoint: Endpoint,
    pub frame: Frame,
}

/// Observer that forwards frames into a bounded channel.
///
/// Frames are dropped when the channel is full so a slow consumer never
/// stalls the receive loop.
#[derive(Debug)]
pub struct FrameChannel {
    tx: Sender<ReceivedFrame>,
    dropped: AtomicU64,
}

impl FrameChannel {
    /// Creates the observer and the receiving end.
    pub fn bounded(capacity: usize) -> (Self, Receiver<ReceivedFrame>) {
        let (tx, rx) = bounded(capacity);
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Number of frames dropped because the channel was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl SessionObserver for FrameChannel {
    fn on_frame(&self, endpoint: &Endpoint, frame: &Frame) {
        let item = ReceivedFrame {
            endpoint: *endpoint,
            frame: frame.clone(),
        };
        match self.tx.try_send(item) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::trace!("Frame channel full, dropped frame from {endpoint}");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
