use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::session::{EditSession, SessionHandle};

/// Live sessions by id. Each session has its own lock; this map lock is
/// only held long enough to insert, look up or remove a handle.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, SessionHandle>>>,
}

impl SessionStore {
    pub async fn insert(&self, session: EditSession) -> SessionHandle {
        let handle = SessionHandle::new(session);
        self.sessions
            .write()
            .await
            .insert(handle.id(), handle.clone());
        info!(session_id = %handle.id(), "session opened");
        handle
    }

    pub async fn get(&self, id: Uuid) -> Option<SessionHandle> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Drops the session, canceling any commit it still has running.
    pub async fn remove(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id);
        match removed {
            Some(handle) => {
                handle.cancel().await;
                info!(session_id = %id, "session closed");
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
