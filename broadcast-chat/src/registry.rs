use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::session::{Session, SessionId};

/// The set of live sessions a broadcast fans out to.
///
/// Register and unregister take the write lock; broadcast only needs the
/// read lock because delivery just queues onto each session's writer.
#[derive(Debug)]
pub struct Registry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    next_id: AtomicU64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> SessionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn register(&self, session: Arc<Session>) {
        let mut sessions = self.sessions.write().await;
        debug!(session = session.id(), live = sessions.len() + 1, "session registered");
        sessions.insert(session.id(), session);
    }

    pub async fn unregister(&self, id: SessionId) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(&id);
        if removed.is_some() {
            debug!(session = id, live = sessions.len(), "session unregistered");
        }
        removed
    }

    /// Queues `message` for every registered session except `sender`.
    ///
    /// A target that can no longer accept messages is logged and skipped;
    /// the rest still get the message. Returns how many sessions it was
    /// queued for.
    pub async fn broadcast(&self, sender: SessionId, message: &str) -> usize {
        if message.is_empty() {
            return 0;
        }

        let sessions = self.sessions.read().await;
        let mut delivered = 0;
        for (id, session) in sessions.iter().filter(|(id, _)| **id != sender) {
            match session.send_message(message) {
                Ok(()) => delivered += 1,
                Err(error) => warn!(
                    session = id,
                    login = session.login().unwrap_or("<pending>"),
                    %error,
                    "failed to deliver broadcast"
                ),
            }
        }
        delivered
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Logins of every session that has finished logging in.
    pub async fn logins(&self) -> Vec<String> {
        let sessions = self.sessions.read().await;
        let mut logins: Vec<String> = sessions
            .values()
            .filter_map(|session| session.login().map(str::to_string))
            .collect();
        logins.sort();
        logins
    }
}
