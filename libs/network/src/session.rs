//! Session Registry
//!
//! Tracks accepted inbound connections. Each session gets a unique id and
//! can later be bound to whatever identity the peer proves during its
//! handshake.

use crate::connection::ConnectionHandle;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub type SessionId = u32;

/// One accepted connection plus its optional binding
pub struct Session<B> {
    id: SessionId,
    connection: ConnectionHandle,
    binding: Mutex<Option<B>>,
}

impl<B: Clone> Session<B> {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    /// Attach a binding; fails with the existing one if already bound
    pub fn bind(&self, binding: B) -> std::result::Result<(), B> {
        let mut slot = self.binding.lock();
        match slot.as_ref() {
            Some(existing) => Err(existing.clone()),
            None => {
                *slot = Some(binding);
                Ok(())
            }
        }
    }

    pub fn binding(&self) -> Option<B> {
        self.binding.lock().clone()
    }

    pub fn is_bound(&self) -> bool {
        self.binding.lock().is_some()
    }

    /// Detach and return the binding
    pub fn unbind(&self) -> Option<B> {
        self.binding.lock().take()
    }
}

impl<B: fmt::Debug> fmt::Debug for Session<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer_addr", &self.connection.peer_addr())
            .field("binding", &*self.binding.lock())
            .finish()
    }
}

/// Live sessions keyed by id
pub struct SessionRegistry<B> {
    sessions: RwLock<HashMap<SessionId, Arc<Session<B>>>>,
    next_id: AtomicU32,
}

impl<B> Default for SessionRegistry<B> {
    fn default() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU32::new(1),
        }
    }
}

impl<B: Clone> SessionRegistry<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new, unbound session for `connection`
    pub fn create(&self, connection: ConnectionHandle) -> Arc<Session<B>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(Session {
            id,
            connection,
            binding: Mutex::new(None),
        });
        self.sessions.write().insert(id, Arc::clone(&session));
        session
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<Session<B>>> {
        self.sessions.read().get(&id).cloned()
    }

    pub fn remove(&self, id: SessionId) -> Option<Arc<Session<B>>> {
        self.sessions.write().remove(&id)
    }

    /// Visit sessions until `f` returns false
    pub fn for_each(&self, mut f: impl FnMut(&Arc<Session<B>>) -> bool) {
        let snapshot: Vec<_> = self.sessions.read().values().cloned().collect();
        for session in &snapshot {
            if !f(session) {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
