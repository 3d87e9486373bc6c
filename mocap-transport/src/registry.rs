//! Table of open sessions keyed by endpoint.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::config::SessionConfig;
use crate::core::{Endpoint, EndpointId, EndpointSpec};
use crate::error::{Error, Result};
use crate::session::{ObserverList, Session, SessionState};
use crate::transport::Transport;

/// Owns every open session and the observers they share.
///
/// At most one session exists per endpoint. An endpoint being opened is
/// reserved under the table mutex, so concurrent opens of the same endpoint
/// cannot both succeed. The mutex itself is never held while connecting or
/// while observers run.
#[derive(Debug)]
pub struct SessionRegistry {
    table: Mutex<Table>,
    observers: ObserverList,
    config: SessionConfig,
}

#[derive(Debug, Default)]
struct Table {
    sessions: HashMap<EndpointId, Arc<Session>>,
    /// Endpoints with an open in progress.
    opening: HashSet<EndpointId>,
}

impl Table {
    fn reserve(&mut self, id: EndpointId) -> Result<()> {
        if self.sessions.contains_key(&id) || !self.opening.insert(id) {
            return Err(Error::AlreadyOpen(id));
        }
        Ok(())
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            table: Mutex::new(Table::default()),
            observers: ObserverList::new(),
            config,
        }
    }

    /// Process-wide registry with the default configuration.
    pub fn global() -> &'static SessionRegistry {
        static GLOBAL: OnceLock<SessionRegistry> = OnceLock::new();
        GLOBAL.get_or_init(SessionRegistry::new)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Observers attached to every session this registry opens.
    pub fn observers(&self) -> &ObserverList {
        &self.observers
    }

    /// Connects to a TCP server given as `"host:port"`.
    pub fn connect_tcp(&self, target: &str) -> Result<EndpointId> {
        self.open(EndpointSpec::tcp(target)?)
    }

    /// Binds a UDP port, optionally accepting datagrams from `peer` only.
    pub fn bind_udp(&self, port: u16, peer: Option<IpAddr>) -> Result<EndpointId> {
        self.open(EndpointSpec::Udp { port, peer })
    }

    /// Opens a session and registers it.
    ///
    /// Returns the id of the session actually opened; for UDP port 0 this
    /// carries the port the OS assigned.
    pub fn open(&self, spec: EndpointSpec) -> Result<EndpointId> {
        self.open_with(spec.endpoint(), || Session::connect_transport(spec, &self.config))
    }

    /// Registers the session on the transport `connect` produces, which may
    /// carry a different endpoint than `requested`.
    fn open_with<F>(&self, requested: Endpoint, connect: F) -> Result<EndpointId>
    where
        F: FnOnce() -> Result<Box<dyn Transport>>,
    {
        self.table.lock().reserve(requested.id())?;

        let mut reserved = vec![requested.id()];
        let result = self.open_reserved(requested, connect, &mut reserved);

        let mut table = self.table.lock();
        for id in &reserved {
            table.opening.remove(id);
        }
        let session = result?;
        let id = session.id();
        log::info!("Registered session {} as {id}", session.endpoint());
        table.sessions.insert(id, Arc::new(session));
        Ok(id)
    }

    /// Connects and launches with `requested` reserved. Runs without the
    /// table lock; any further id reserved here is pushed onto `reserved`.
    fn open_reserved<F>(&self, requested: Endpoint, connect: F, reserved: &mut Vec<EndpointId>) -> Result<Session>
    where
        F: FnOnce() -> Result<Box<dyn Transport>>,
    {
        self.observers.notify_state(&requested, SessionState::Connecting);

        let failed = |e: Error| {
            log::warn!("Failed to open {requested}: {e}");
            self.observers.notify_state(&requested, SessionState::Closed);
            e
        };

        let mut transport = connect().map_err(failed)?;

        // UDP port 0 resolves to the assigned port only once bound.
        let id = transport.endpoint().id();
        if id != requested.id() {
            let reservation = self.table.lock().reserve(id);
            if let Err(e) = reservation {
                transport.disconnect();
                return Err(failed(e));
            }
            reserved.push(id);
        }

        Session::launch(transport, &self.config, self.observers.clone())
    }

    /// Looks up an open session.
    pub fn get(&self, id: EndpointId) -> Result<Arc<Session>> {
        self.table
            .lock()
            .sessions
            .get(&id)
            .cloned()
            .ok_or(Error::UnknownEndpoint(id))
    }

    pub fn contains(&self, id: EndpointId) -> bool {
        self.table.lock().sessions.contains_key(&id)
    }

    /// Disconnects and forgets a session. Unknown ids are ignored.
    pub fn close(&self, id: EndpointId) {
        let removed = self.table.lock().sessions.remove(&id);
        if let Some(session) = removed {
            session.disconnect();
            log::info!("Closed session {}", session.endpoint());
        }
    }

    /// Disconnects and forgets every session.
    pub fn close_all(&self) {
        let drained: Vec<Arc<Session>> = self.table.lock().sessions.drain().map(|(_, s)| s).collect();
        for session in drained {
            session.disconnect();
        }
    }

    pub fn len(&self) -> usize {
        self.table.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().sessions.is_empty()
    }

    /// Ids of all open sessions, in no particular order.
    pub fn ids(&self) -> Vec<EndpointId> {
        self.table.lock().sessions.keys().copied().collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}
