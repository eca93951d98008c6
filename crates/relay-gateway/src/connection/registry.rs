//! Session registry
//!
//! Per-node map of identified users to their live connection. A user has
//! at most one session per node; identifying again replaces the older
//! session. Entries are removed by [`SessionGuard`] on every exit path of
//! the socket task.

use super::Connection;
use crate::protocol::CloseCode;
use dashmap::DashMap;
use relay_core::{PresenceDirectory, Snowflake};
use std::sync::Arc;
use tokio::runtime::Handle;

pub struct SessionRegistry {
    sessions: DashMap<Snowflake, Arc<Connection>>,
    presence: Arc<dyn PresenceDirectory>,
    node_id: String,
}

impl SessionRegistry {
    pub fn new(presence: Arc<dyn PresenceDirectory>, node_id: impl Into<String>) -> Self {
        Self {
            sessions: DashMap::new(),
            presence,
            node_id: node_id.into(),
        }
    }

    pub fn new_shared(presence: Arc<dyn PresenceDirectory>, node_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(presence, node_id))
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Register `connection` as the session of `user_id` on this node.
    ///
    /// Last write wins: a previous session of the same user is told to
    /// close. The returned guard removes the entry when dropped.
    pub async fn register(self: &Arc<Self>, user_id: Snowflake, connection: Arc<Connection>) -> SessionGuard {
        let session_id = connection.session_id().to_string();
        connection.identify(user_id);

        if let Some(previous) = self.sessions.insert(user_id, connection) {
            if previous.session_id() != session_id {
                tracing::info!(
                    user_id = %user_id,
                    replaced = %previous.session_id(),
                    session_id = %session_id,
                    "Session replaced on this node"
                );
                previous.close(CloseCode::SessionReplaced);
            }
        }

        self.refresh_presence(user_id).await;

        tracing::debug!(user_id = %user_id, session_id = %session_id, "Session registered");

        SessionGuard {
            registry: Arc::clone(self),
            user_id,
            session_id,
        }
    }

    pub fn lookup(&self, user_id: Snowflake) -> Option<Arc<Connection>> {
        self.sessions.get(&user_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove the entry of `user_id` if it still belongs to `session_id`
    pub fn remove(&self, user_id: Snowflake, session_id: &str) -> bool {
        self.sessions
            .remove_if(&user_id, |_, conn| conn.session_id() == session_id)
            .is_some()
    }

    /// Mark the user online on this node; also extends the presence TTL
    pub async fn refresh_presence(&self, user_id: Snowflake) {
        if let Err(e) = self.presence.mark_online(user_id, &self.node_id).await {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to mark user online");
        }
    }

    async fn clear_presence(&self, user_id: Snowflake) {
        // A new session may have registered since the guard dropped
        if self.sessions.contains_key(&user_id) {
            return;
        }
        if let Err(e) = self.presence.mark_offline(user_id, &self.node_id).await {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to mark user offline");
        }
        // A session that registered while mark_offline was in flight may
        // have had its presence removed underneath it
        if self.sessions.contains_key(&user_id) {
            self.refresh_presence(user_id).await;
        }
    }

    /// Users with a session on this node
    pub fn local_users(&self) -> Vec<Snowflake> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("node_id", &self.node_id)
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

/// Removes a registry entry when the owning socket task ends, however it
/// ends. Presence is cleared in the background.
#[must_use = "the session is removed as soon as the guard is dropped"]
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    user_id: Snowflake,
    session_id: String,
}

impl SessionGuard {
    pub fn user_id(&self) -> Snowflake {
        self.user_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if !self.registry.remove(self.user_id, &self.session_id) {
            return;
        }
        tracing::debug!(
            user_id = %self.user_id,
            session_id = %self.session_id,
            "Session removed"
        );

        match Handle::try_current() {
            Ok(handle) => {
                let registry = Arc::clone(&self.registry);
                let user_id = self.user_id;
                handle.spawn(async move { registry.clear_presence(user_id).await });
            }
            Err(_) => tracing::warn!(
                user_id = %self.user_id,
                "No runtime to clear presence; it expires with its TTL"
            ),
        }
    }
}
