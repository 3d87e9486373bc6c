//! Per-avatar freshness tracking.
//!
//! An actor is one avatar on one endpoint. It is suspended once no frame has
//! arrived for longer than the tracker's timeout, and resumed by the next
//! frame. Suspension is only detected by [`ActorTracker::poll`]; callers run
//! it from their own timer.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::core::{Endpoint, Frame, PacketHeader};
use crate::session::{SessionObserver, SessionState};

/// Silence after which an actor counts as suspended.
pub const DEFAULT_SUSPEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Identifies an actor: the avatar index within one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActorKey {
    pub endpoint: Endpoint,
    pub avatar_index: u32,
}

impl fmt::Display for ActorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.endpoint, self.avatar_index)
    }
}

/// Last known state of an actor.
#[derive(Debug, Clone)]
pub struct ActorStatus {
    pub key: ActorKey,
    pub header: PacketHeader,
    pub last_seen: Instant,
    pub suspended: bool,
}

/// Handle returned when registering a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

type Callback = Arc<dyn Fn(&ActorStatus) + Send + Sync>;

#[derive(Default)]
struct CallbackList {
    entries: Mutex<Vec<(CallbackId, Callback)>>,
}

impl CallbackList {
    fn push(&self, id: CallbackId, callback: Callback) {
        self.entries.lock().push((id, callback));
    }

    fn remove(&self, id: CallbackId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(entry, _)| *entry != id);
        entries.len() != before
    }

    fn notify(&self, status: &ActorStatus) {
        let snapshot: Vec<Callback> = self.entries.lock().iter().map(|(_, cb)| Arc::clone(cb)).collect();
        for callback in snapshot {
            callback(status);
        }
    }
}

/// Tracks which actors are currently sending frames.
///
/// Attach it to a session or registry observer list to feed it directly.
pub struct ActorTracker {
    timeout: Duration,
    actors: Mutex<HashMap<ActorKey, ActorStatus>>,
    on_suspend: CallbackList,
    on_resume: CallbackList,
    next_id: AtomicU64,
}

impl ActorTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            actors: Mutex::new(HashMap::new()),
            on_suspend: CallbackList::default(),
            on_resume: CallbackList::default(),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Registers a callback run when an actor stops sending frames.
    pub fn on_suspend<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&ActorStatus) + Send + Sync + 'static,
    {
        let id = self.next_callback_id();
        self.on_suspend.push(id, Arc::new(callback));
        id
    }

    /// Registers a callback run when a suspended actor sends again.
    pub fn on_resume<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&ActorStatus) + Send + Sync + 'static,
    {
        let id = self.next_callback_id();
        self.on_resume.push(id, Arc::new(callback));
        id
    }

    /// Removes a callback from whichever list holds it.
    pub fn unregister(&self, id: CallbackId) -> bool {
        self.on_suspend.remove(id) || self.on_resume.remove(id)
    }

    fn next_callback_id(&self) -> CallbackId {
        CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Records a frame. Returns true if the actor was suspended before.
    pub fn record(&self, endpoint: &Endpoint, frame: &Frame, now: Instant) -> bool {
        let key = ActorKey {
            endpoint: *endpoint,
            avatar_index: frame.avatar_index(),
        };

        let resumed = {
            let mut actors = self.actors.lock();
            match actors.get_mut(&key) {
                Some(status) => {
                    let was_suspended = status.suspended;
                    status.header = frame.header.clone();
                    status.last_seen = now;
                    status.suspended = false;
                    was_suspended.then(|| status.clone())
                }
                None => {
                    log::debug!("New actor {key} ({})", frame.header.avatar_name);
                    actors.insert(
                        key,
                        ActorStatus {
                            key,
                            header: frame.header.clone(),
                            last_seen: now,
                            suspended: false,
                        },
                    );
                    None
                }
            }
        };

        match resumed {
            Some(status) => {
                log::info!("Actor {key} resumed");
                self.on_resume.notify(&status);
                true
            }
            None => false,
        }
    }

    /// Suspends actors silent for longer than the timeout and returns them.
    pub fn poll(&self, now: Instant) -> Vec<ActorStatus> {
        let suspended: Vec<ActorStatus> = {
            let mut actors = self.actors.lock();
            actors
                .values_mut()
                .filter(|status| !status.suspended && now.saturating_duration_since(status.last_seen) > self.timeout)
                .map(|status| {
                    status.suspended = true;
                    status.clone()
                })
                .collect()
        };

        for status in &suspended {
            log::info!("Actor {} suspended", status.key);
            self.on_suspend.notify(status);
        }
        suspended
    }

    pub fn get(&self, key: &ActorKey) -> Option<ActorStatus> {
        self.actors.lock().get(key).cloned()
    }

    /// All known actors, suspended or not.
    pub fn actors(&self) -> Vec<ActorStatus> {
        self.actors.lock().values().cloned().collect()
    }

    /// Actors that are currently sending.
    pub fn active(&self) -> Vec<ActorStatus> {
        self.actors
            .lock()
            .values()
            .filter(|status| !status.suspended)
            .cloned()
            .collect()
    }

    /// Drops every actor belonging to `endpoint`.
    pub fn forget(&self, endpoint: &Endpoint) -> usize {
        let mut actors = self.actors.lock();
        let before = actors.len();
        actors.retain(|key, _| key.endpoint != *endpoint);
        before - actors.len()
    }
}

impl Default for ActorTracker {
    fn default() -> Self {
        Self::new(DEFAULT_SUSPEND_TIMEOUT)
    }
}

impl fmt::Debug for ActorTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorTracker")
            .field("timeout", &self.timeout)
            .field("actors", &self.actors.lock().len())
            .finish()
    }
}

impl SessionObserver for ActorTracker {
    fn on_frame(&self, endpoint: &Endpoint, frame: &Frame) {
        self.record(endpoint, frame, Instant::now());
    }

    fn on_state_changed(&self, endpoint: &Endpoint, state: SessionState) {
        if state == SessionState::Closed {
            let removed = self.forget(endpoint);
            if removed > 0 {
                log::debug!("Forgot {removed} actors of {endpoint}");
            }
        }
    }
}
