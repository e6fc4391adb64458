//! Connection pool: tracks all active connections, and authenticated ones by user.

use std::sync::Arc;

use dashmap::DashMap;

use pairline_core::types::UserId;

use super::handle::{ConnectionHandle, ConnectionId};

/// Thread-safe pool of all active WebSocket connections.
#[derive(Debug, Default)]
pub struct ConnectionPool {
    /// Connection ID → connection handle for direct lookup.
    by_id: DashMap<ConnectionId, Arc<ConnectionHandle>>,
    /// User ID → connections that authenticated as that user, oldest first.
    by_user: DashMap<UserId, Vec<Arc<ConnectionHandle>>>,
}

impl ConnectionPool {
    /// Creates a new empty connection pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a (not yet authenticated) connection to the pool.
    pub fn add(&self, handle: Arc<ConnectionHandle>) {
        self.by_id.insert(handle.id, handle);
    }

    /// Associates a connection with a user.
    ///
    /// When the user then holds more than `max_per_user` connections the
    /// oldest ones are detached and returned so the caller can close them.
    pub fn bind_user(
        &self,
        user_id: &UserId,
        handle: &Arc<ConnectionHandle>,
        max_per_user: usize,
    ) -> Vec<Arc<ConnectionHandle>> {
        let mut connections = self.by_user.entry(user_id.clone()).or_default();
        if !connections.iter().any(|c| c.id == handle.id) {
            connections.push(handle.clone());
        }
        let excess = connections.len().saturating_sub(max_per_user.max(1));
        connections.drain(..excess).collect()
    }

    /// Removes a connection from the pool.
    pub fn remove(
        &self,
        conn_id: &ConnectionId,
        user_id: Option<&UserId>,
    ) -> Option<Arc<ConnectionHandle>> {
        let (_, handle) = self.by_id.remove(conn_id)?;
        if let Some(user_id) = user_id {
            self.unbind_user(user_id, conn_id);
        }
        Some(handle)
    }

    fn unbind_user(&self, user_id: &UserId, conn_id: &ConnectionId) {
        if let Some(mut connections) = self.by_user.get_mut(user_id) {
            connections.retain(|c| c.id != *conn_id);
            if connections.is_empty() {
                drop(connections);
                self.by_user.remove_if(user_id, |_, v| v.is_empty());
            }
        }
    }

    /// Gets a specific connection by ID.
    pub fn get(&self, conn_id: &ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.by_id.get(conn_id).map(|entry| entry.value().clone())
    }

    /// Gets all live connections for a user.
    pub fn user_connections(&self, user_id: &UserId) -> Vec<Arc<ConnectionHandle>> {
        self.by_user
            .get(user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Returns total number of active connections.
    pub fn connection_count(&self) -> usize {
        self.by_id.len()
    }

    /// Returns number of unique authenticated users.
    pub fn user_count(&self) -> usize {
        self.by_user.len()
    }

    /// Returns all connection handles.
    pub fn all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.by_id
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}
