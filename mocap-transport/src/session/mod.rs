//! Receive sessions.
//!
//! A `Session` owns one transport and one reassembly buffer and drives them
//! from a dedicated worker thread:
//!
//! ```text
//! transport.receive ─▶ FrameBuffer::append ─▶ drain ─▶ observers
//!        ▲                                              │
//!        └──────────── until stop or connection lost ◀──┘
//! ```
//!
//! Lifecycle: `Idle → Connecting → Running → Stopping → Closed`. A failed
//! connect goes straight to `Closed`; a lost connection skips `Stopping`.

mod observer;

pub use observer::{FrameChannel, ObserverId, ObserverList, ReceivedFrame, SessionObserver};

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::{Condvar, Mutex};

use crate::buffer::FrameBuffer;
use crate::config::SessionConfig;
use crate::core::{Endpoint, EndpointId, EndpointSpec};
use crate::error::{Error, Result};
use crate::transport::{Interrupter, TcpTransport, Transport, UdpTransport};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    Idle = 0,
    Connecting = 1,
    Running = 2,
    Stopping = 3,
    Closed = 4,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Idle,
            1 => SessionState::Connecting,
            2 => SessionState::Running,
            3 => SessionState::Stopping,
            _ => SessionState::Closed,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Counters sampled by [`Session::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub bytes_received: u64,
    pub frames_delivered: u64,
    pub framing_errors: u64,
    pub bytes_discarded: u64,
}

#[derive(Debug, Default)]
struct Counters {
    bytes_received: AtomicU64,
    frames_delivered: AtomicU64,
    framing_errors: AtomicU64,
    bytes_discarded: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> SessionStats {
        SessionStats {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            framing_errors: self.framing_errors.load(Ordering::Relaxed),
            bytes_discarded: self.bytes_discarded.load(Ordering::Relaxed),
        }
    }
}

/// State shared between the session handle and its worker.
struct Shared {
    endpoint: Endpoint,
    state: AtomicU8,
    stop: AtomicBool,
    observers: ObserverList,
    counters: Counters,
    exited: Mutex<bool>,
    exited_cv: Condvar,
}

impl Shared {
    fn new(endpoint: Endpoint, observers: ObserverList) -> Self {
        Self {
            endpoint,
            state: AtomicU8::new(SessionState::Connecting as u8),
            stop: AtomicBool::new(false),
            observers,
            counters: Counters::default(),
            exited: Mutex::new(false),
            exited_cv: Condvar::new(),
        }
    }

    fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Moves to `to` unless already there, notifying observers on change.
    fn set_state(&self, to: SessionState) {
        let from = SessionState::from_u8(self.state.swap(to as u8, Ordering::AcqRel));
        if from != to {
            log::debug!("Session {}: {from} -> {to}", self.endpoint);
            self.observers.notify_state(&self.endpoint, to);
        }
    }

    /// Moves from `from` to `to` only if the current state is `from`.
    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        let changed = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if changed {
            log::debug!("Session {}: {from} -> {to}", self.endpoint);
            self.observers.notify_state(&self.endpoint, to);
        }
        changed
    }

    fn mark_exited(&self) {
        *self.exited.lock() = true;
        self.exited_cv.notify_all();
    }

    /// Blocks until the worker has returned from its last callback.
    fn wait_exited(&self) {
        let mut exited = self.exited.lock();
        while !*exited {
            self.exited_cv.wait(&mut exited);
        }
    }
}

/// Signals worker exit even if an observer panics.
struct ExitGuard(Arc<Shared>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.mark_exited();
    }
}

/// One live channel: a transport, its reassembly buffer and a receive thread.
///
/// Dropping the session disconnects it.
pub struct Session {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    interrupter: Option<Interrupter>,
}

impl Session {
    /// Connects or binds according to `spec` and starts receiving.
    pub fn open(spec: EndpointSpec, config: &SessionConfig, observers: ObserverList) -> Result<Self> {
        let requested = spec.endpoint();
        observers.notify_state(&requested, SessionState::Connecting);

        match Self::connect_transport(spec, config) {
            Ok(transport) => Self::launch(transport, config, observers),
            Err(e) => {
                log::warn!("Failed to open {requested}: {e}");
                observers.notify_state(&requested, SessionState::Closed);
                Err(e)
            }
        }
    }

    /// Opens the transport for `spec` without starting a session.
    pub(crate) fn connect_transport(spec: EndpointSpec, config: &SessionConfig) -> Result<Box<dyn Transport>> {
        match spec {
            EndpointSpec::Tcp(addr) => {
                TcpTransport::connect(addr, config).map(|t| Box::new(t) as Box<dyn Transport>)
            }
            EndpointSpec::Udp { port, peer } => {
                UdpTransport::bind(port, peer, config).map(|t| Box::new(t) as Box<dyn Transport>)
            }
        }
    }

    /// Connects to a TCP server and starts receiving.
    pub fn connect_tcp(target: &str, config: &SessionConfig, observers: ObserverList) -> Result<Self> {
        Self::open(EndpointSpec::tcp(target)?, config, observers)
    }

    /// Binds a UDP port and starts receiving.
    pub fn bind_udp(port: u16, config: &SessionConfig, observers: ObserverList) -> Result<Self> {
        Self::open(EndpointSpec::udp(port), config, observers)
    }

    /// Starts receiving from an already established transport.
    pub fn start<T: Transport>(transport: T, config: &SessionConfig, observers: ObserverList) -> Result<Self> {
        observers.notify_state(&transport.endpoint(), SessionState::Connecting);
        Self::launch(transport, config, observers)
    }

    /// Starts the worker for a transport that is already open.
    ///
    /// Observers must already have seen `Connecting`.
    pub(crate) fn launch<T: Transport>(mut transport: T, config: &SessionConfig, observers: ObserverList) -> Result<Self> {
        let endpoint = transport.endpoint();
        let shared = Arc::new(Shared::new(endpoint, observers));

        // One byte beyond the largest message makes truncation detectable.
        let message_limit = transport.max_message_size();
        let recv_size = match message_limit {
            Some(max) => config.recv_buffer_size.max(max + 1),
            None => config.recv_buffer_size,
        };

        let buffers = FrameBuffer::with_capacity(config.format, config.reserve_capacity).and_then(|buffer| {
            let mut recv = Vec::new();
            recv.try_reserve_exact(recv_size)?;
            recv.resize(recv_size, 0);
            Ok((buffer.with_max_payload_count(config.max_payload_count), recv))
        });
        let (buffer, recv) = match buffers {
            Ok(buffers) => buffers,
            Err(e) => {
                transport.disconnect();
                shared.set_state(SessionState::Closed);
                return Err(e);
            }
        };

        let interrupter = transport.interrupter();
        shared.set_state(SessionState::Running);

        let worker = Worker {
            transport,
            buffer,
            recv,
            message_oriented: message_limit.is_some(),
            shared: Arc::clone(&shared),
        };
        let handle = thread::Builder::new()
            .name(format!("mocap-session-{}", endpoint.id()))
            .spawn(move || worker.run());

        match handle {
            Ok(handle) => {
                log::info!("Session {endpoint} started");
                Ok(Self {
                    shared,
                    worker_id: handle.thread().id(),
                    worker: Mutex::new(Some(handle)),
                    interrupter,
                })
            }
            Err(e) => {
                shared.set_state(SessionState::Closed);
                Err(Error::Io(e))
            }
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.shared.endpoint
    }

    pub fn id(&self) -> EndpointId {
        self.shared.endpoint.id()
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// True while the worker is delivering frames.
    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    pub fn stats(&self) -> SessionStats {
        self.shared.counters.snapshot()
    }

    /// Observers notified by this session. Changes apply from the next event.
    pub fn observers(&self) -> &ObserverList {
        &self.shared.observers
    }

    /// Stops the receive loop and closes the transport.
    ///
    /// When this returns, no observer of this session is running or will run
    /// again. Called from inside an observer callback it only signals the
    /// worker, which finishes once the callback returns; a later call from
    /// another thread still waits for that. Calling it again is a no-op.
    pub fn disconnect(&self) {
        let endpoint = self.shared.endpoint;

        if !self.shared.stop.swap(true, Ordering::AcqRel) {
            self.shared.transition(SessionState::Running, SessionState::Stopping);
            if let Some(interrupt) = &self.interrupter {
                interrupt();
            }
        }

        if thread::current().id() == self.worker_id {
            log::debug!("Session {endpoint}: disconnect requested from its own receive loop");
            return;
        }

        let handle = self.worker.lock().take();
        match handle {
            Some(handle) => {
                if handle.join().is_err() {
                    log::error!("Session {endpoint}: receive loop panicked");
                }
                self.shared.set_state(SessionState::Closed);
                log::info!("Session {endpoint} disconnected");
            }
            // Another thread is joining, or already has.
            None => self.shared.wait_exited(),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.shared.endpoint)
            .field("state", &self.state())
            .field("stats", &self.stats())
            .finish()
    }
}

/// The receive loop, owned by the session thread.
struct Worker<T> {
    transport: T,
    buffer: FrameBuffer,
    recv: Vec<u8>,
    message_oriented: bool,
    shared: Arc<Shared>,
}

impl<T: Transport> Worker<T> {
    fn run(mut self) {
        let _exit = ExitGuard(Arc::clone(&self.shared));
        let endpoint = self.shared.endpoint;
        log::debug!("Session {endpoint}: receive loop started");

        let outcome = self.receive_loop();
        self.transport.disconnect();

        if let Err(e) = &outcome {
            log::error!("Session {endpoint}: {e}");
            self.shared.observers.notify_connection_lost(&endpoint, e);
        }
        self.shared.set_state(SessionState::Closed);
        log::debug!("Session {endpoint}: receive loop exited");
    }

    /// Returns `Err` only for failures the session cannot recover from.
    fn receive_loop(&mut self) -> Result<()> {
        let endpoint = self.shared.endpoint;

        while !self.shared.stop_requested() {
            let n = match self.transport.receive(&mut self.recv) {
                Ok(n) => n,
                // Interrupting a socket may surface as a closed connection.
                Err(_) if self.shared.stop_requested() => break,
                Err(e) => return Err(e),
            };
            if n == 0 {
                continue;
            }

            self.shared.counters.bytes_received.fetch_add(n as u64, Ordering::Relaxed);

            if self.message_oriented && n == self.recv.len() {
                let (start_token, end_token) = match &self.recv[..n] {
                    [a, b, ..] => (u16::from_le_bytes([*a, *b]), 0),
                    _ => (0, 0),
                };
                self.report_framing_error(&Error::Framing {
                    start_token,
                    end_token,
                    discarded: n,
                });
                continue;
            }

            self.buffer.append(&self.recv[..n])?;

            for item in self.buffer.drain() {
                if self.shared.stop_requested() {
                    return Ok(());
                }
                match item {
                    Ok(frame) => {
                        self.shared.counters.frames_delivered.fetch_add(1, Ordering::Relaxed);
                        self.shared.observers.notify_frame(&endpoint, &frame);
                    }
                    Err(e) => report_framing_error(&self.shared, &e),
                }
            }

            // Packets never continue into the next datagram.
            if self.message_oriented {
                if let Some(e) = self.buffer.discard_partial() {
                    self.report_framing_error(&e);
                }
            }
        }

        Ok(())
    }

    fn report_framing_error(&self, e: &Error) {
        report_framing_error(&self.shared, e);
    }
}

fn report_framing_error(shared: &Shared, e: &Error) {
    if let Error::Framing { discarded, .. } = e {
        shared.counters.framing_errors.fetch_add(1, Ordering::Relaxed);
        shared
            .counters
            .bytes_discarded
            .fetch_add(*discarded as u64, Ordering::Relaxed);
    }
    log::warn!("Session {}: {e}", shared.endpoint);
    shared.observers.notify_framing_error(&shared.endpoint, e);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Frame, HeaderFormat, PacketHeader};
    use crate::transport::{MemoryFeeder, MemoryTransport};
    use crossbeam_channel::{unbounded, Receiver};
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    const WAIT: Duration = Duration::from_secs(5);

    fn config() -> SessionConfig {
        SessionConfig::new().with_poll_interval(Duration::from_millis(10))
    }

    fn memory_session(port: u16, observers: ObserverList) -> (Session, MemoryFeeder) {
        let (transport, feeder) = MemoryTransport::pair(Endpoint::memory(port), Duration::from_millis(10));
        let session = Session::start(transport, &config(), observers).unwrap();
        (session, feeder)
    }

    fn packet(index: u32, values: &[f32]) -> Vec<u8> {
        let header = PacketHeader::new(HeaderFormat::Calc, 0, "Actor", index, 0);
        Frame::from_values(header, values.to_vec()).encode().unwrap()
    }

    fn frame_sink(observers: &ObserverList) -> Receiver<u32> {
        let (tx, rx) = unbounded();
        observers.add(move |_: &Endpoint, frame: &Frame| {
            let _ = tx.send(frame.frame_index());
        });
        rx
    }

    #[test]
    fn test_frames_delivered_in_order() {
        let observers = ObserverList::new();
        let rx = frame_sink(&observers);
        let (session, feeder) = memory_session(1, observers);
        assert!(session.is_running());

        let mut stream = Vec::new();
        for i in 0..20 {
            stream.extend(packet(i, &[i as f32, 1.0]));
        }
        for chunk in stream.chunks(37) {
            assert!(feeder.feed(chunk));
        }

        for expected in 0..20 {
            assert_eq!(rx.recv_timeout(WAIT).unwrap(), expected);
        }

        session.disconnect();
        assert_eq!(session.state(), SessionState::Closed);
        let stats = session.stats();
        assert_eq!(stats.frames_delivered, 20);
        assert_eq!(stats.bytes_received, stream.len() as u64);
    }

    #[test]
    fn test_state_notifications() {
        let observers = ObserverList::new();
        let (tx, rx) = unbounded();

        struct StateLog(crossbeam_channel::Sender<SessionState>);
        impl SessionObserver for StateLog {
            fn on_frame(&self, _: &Endpoint, _: &Frame) {}
            fn on_state_changed(&self, _: &Endpoint, state: SessionState) {
                let _ = self.0.send(state);
            }
        }
        observers.add(StateLog(tx));

        let (session, _feeder) = memory_session(2, observers);
        session.disconnect();

        let states: Vec<SessionState> = rx.try_iter().collect();
        assert_eq!(
            states,
            vec![
                SessionState::Connecting,
                SessionState::Running,
                SessionState::Stopping,
                SessionState::Closed
            ]
        );
    }

    #[test]
    fn test_no_callbacks_after_disconnect() {
        let observers = ObserverList::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        observers.add(move |_: &Endpoint, _: &Frame| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        let (session, feeder) = memory_session(3, observers);
        let bytes = packet(0, &[1.0]);
        let producer = thread::spawn(move || {
            while feeder.feed(bytes.clone()) {
                thread::sleep(Duration::from_micros(50));
            }
        });

        thread::sleep(Duration::from_millis(50));
        session.disconnect();
        let after = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), after);

        drop(session);
        producer.join().unwrap();
    }

    #[test]
    fn test_disconnect_waits_for_running_callback() {
        let observers = ObserverList::new();
        let (entered_tx, entered_rx) = unbounded();
        let finished = Arc::new(AtomicBool::new(false));
        let finished_clone = finished.clone();
        observers.add(move |_: &Endpoint, _: &Frame| {
            let _ = entered_tx.send(());
            thread::sleep(Duration::from_millis(100));
            finished_clone.store(true, Ordering::SeqCst);
        });

        let (session, feeder) = memory_session(4, observers);
        feeder.feed(packet(0, &[]));
        entered_rx.recv_timeout(WAIT).unwrap();

        session.disconnect();
        assert!(finished.load(Ordering::SeqCst));
    }

    #[test]
    fn test_disconnect_from_callback() {
        let observers = ObserverList::new();
        let slot: Arc<Mutex<Option<Arc<Session>>>> = Arc::new(Mutex::new(None));
        let slot_clone = slot.clone();
        let (tx, rx) = unbounded();
        observers.add(move |_: &Endpoint, frame: &Frame| {
            let _ = tx.send(frame.frame_index());
            if let Some(session) = slot_clone.lock().as_ref() {
                session.disconnect();
            }
        });

        let (session, feeder) = memory_session(5, observers);
        let session = Arc::new(session);
        *slot.lock() = Some(session.clone());

        let mut stream = packet(0, &[]);
        stream.extend(packet(1, &[]));
        feeder.feed(stream);

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 0);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        let deadline = std::time::Instant::now() + WAIT;
        while session.state() != SessionState::Closed && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(session.state(), SessionState::Closed);
        slot.lock().take();
    }

    #[test]
    fn test_connection_lost_notification() {
        struct LostLog(crossbeam_channel::Sender<String>);
        impl SessionObserver for LostLog {
            fn on_frame(&self, _: &Endpoint, _: &Frame) {}
            fn on_connection_lost(&self, _: &Endpoint, error: &Error) {
                let _ = self.0.send(error.to_string());
            }
        }

        let observers = ObserverList::new();
        let (tx, rx) = unbounded();
        observers.add(LostLog(tx));

        let (session, feeder) = memory_session(6, observers);
        drop(feeder);

        let reason = rx.recv_timeout(WAIT).unwrap();
        assert!(reason.contains("feeder dropped"));

        let deadline = std::time::Instant::now() + WAIT;
        while session.state() != SessionState::Closed && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(session.state(), SessionState::Closed);
        session.disconnect();
    }

    #[test]
    fn test_framing_errors_counted() {
        let observers = ObserverList::new();
        let rx = frame_sink(&observers);
        let (session, feeder) = memory_session(7, observers);

        let mut stream = vec![0xAB; 10];
        stream.extend(packet(42, &[3.0]));
        feeder.feed(stream);

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 42);
        session.disconnect();

        let stats = session.stats();
        assert_eq!(stats.framing_errors, 1);
        assert_eq!(stats.bytes_discarded, 10);
        assert_eq!(stats.frames_delivered, 1);
    }

    #[test]
    fn test_disconnect_after_self_disconnect_waits_for_worker() {
        let observers = ObserverList::new();
        let slot: Arc<Mutex<Option<Arc<Session>>>> = Arc::new(Mutex::new(None));
        let slot_clone = slot.clone();
        let (entered_tx, entered_rx) = unbounded();
        let finished = Arc::new(AtomicBool::new(false));
        let finished_clone = finished.clone();
        observers.add(move |_: &Endpoint, _: &Frame| {
            let session = slot_clone.lock().clone();
            if let Some(session) = session {
                session.disconnect();
            }
            let _ = entered_tx.send(());
            thread::sleep(Duration::from_millis(200));
            finished_clone.store(true, Ordering::SeqCst);
        });
        let later_calls = Arc::new(AtomicUsize::new(0));
        let later_clone = later_calls.clone();
        observers.add(move |_: &Endpoint, _: &Frame| {
            later_clone.fetch_add(1, Ordering::SeqCst);
        });

        let (session, feeder) = memory_session(9, observers);
        let session = Arc::new(session);
        *slot.lock() = Some(session.clone());

        feeder.feed(packet(0, &[]));
        entered_rx.recv_timeout(WAIT).unwrap();

        session.disconnect();
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(session.state(), SessionState::Closed);
        let at_return = later_calls.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(later_calls.load(Ordering::SeqCst), at_return);
        assert_eq!(at_return, 1);

        slot.lock().take();
    }

    #[test]
    fn test_concurrent_disconnects_both_wait() {
        let observers = ObserverList::new();
        let (entered_tx, entered_rx) = unbounded();
        let finished = Arc::new(AtomicBool::new(false));
        let finished_clone = finished.clone();
        observers.add(move |_: &Endpoint, _: &Frame| {
            let _ = entered_tx.send(());
            thread::sleep(Duration::from_millis(150));
            finished_clone.store(true, Ordering::SeqCst);
        });

        let (session, feeder) = memory_session(10, observers);
        let session = Arc::new(session);
        feeder.feed(packet(0, &[]));
        entered_rx.recv_timeout(WAIT).unwrap();

        let other = {
            let session = session.clone();
            let finished = finished.clone();
            thread::spawn(move || {
                session.disconnect();
                finished.load(Ordering::SeqCst)
            })
        };
        session.disconnect();
        assert!(finished.load(Ordering::SeqCst));
        assert!(other.join().unwrap());
    }

    #[test]
    fn test_disconnect_prompt_with_long_poll_interval() {
        let long = Duration::from_secs(30);
        let observers = ObserverList::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let (tx, rx) = unbounded();
        observers.add(move |_: &Endpoint, frame: &Frame| {
            count_clone.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(frame.frame_index());
        });

        let (transport, feeder) = MemoryTransport::pair(Endpoint::memory(11), long);
        let session = Session::start(transport, &SessionConfig::new().with_poll_interval(long), observers).unwrap();
        feeder.feed(packet(0, &[1.0]));
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 0);

        let started = Instant::now();
        session.disconnect();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(session.state(), SessionState::Closed);

        feeder.feed(packet(1, &[1.0]));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tcp_disconnect_prompt_with_long_read_timeout() {
        use std::io::Write;
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let config = SessionConfig::new().with_poll_interval(Duration::from_secs(30));

        let observers = ObserverList::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let (tx, rx) = unbounded();
        observers.add(move |_: &Endpoint, frame: &Frame| {
            count_clone.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(frame.frame_index());
        });

        let transport = TcpTransport::connect(addr, &config).unwrap();
        let (mut server, _) = listener.accept().unwrap();
        let session = Session::start(transport, &config, observers).unwrap();

        server.write_all(&packet(0, &[2.0])).unwrap();
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 0);

        let started = Instant::now();
        session.disconnect();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(session.state(), SessionState::Closed);

        let _ = server.write_all(&packet(1, &[2.0]));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    /// Memory transport that reports itself as message-oriented.
    struct Datagrams {
        inner: MemoryTransport,
        limit: usize,
    }

    impl Transport for Datagrams {
        fn endpoint(&self) -> Endpoint {
            self.inner.endpoint()
        }

        fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
            self.inner.receive(buf)
        }

        fn interrupter(&self) -> Option<Interrupter> {
            self.inner.interrupter()
        }

        fn max_message_size(&self) -> Option<usize> {
            Some(self.limit)
        }

        fn disconnect(&mut self) {
            self.inner.disconnect()
        }
    }

    #[test]
    fn test_message_boundaries_reset_reassembly() {
        let observers = ObserverList::new();
        let rx = frame_sink(&observers);
        let (inner, feeder) = MemoryTransport::pair(Endpoint::memory(12), Duration::from_millis(10));
        let transport = Datagrams { inner, limit: 100 };
        let session = Session::start(transport, &config().with_recv_buffer_size(1), observers).unwrap();

        // Oversized message: the receive buffer fills up.
        feeder.feed(packet(4, &[0.5; 10]));
        // Cut short: the rest never arrives in this message.
        feeder.feed(packet(6, &[0.5; 4])[..40].to_vec());
        feeder.feed(packet(7, &[0.5; 4]));

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 7);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        session.disconnect();

        let stats = session.stats();
        assert_eq!(stats.frames_delivered, 1);
        assert!(stats.framing_errors >= 2);
    }

    #[test]
    fn test_disconnect_idempotent() {
        let (session, _feeder) = memory_session(8, ObserverList::new());
        session.disconnect();
        session.disconnect();
        assert_eq!(session.state(), SessionState::Closed);
    }
}
