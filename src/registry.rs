//! The connection registry.
//!
//! One registry instance owns every named connection of the application and
//! is passed to the components that need database access. Names map to
//! [`Handle`]s; connecting under a name that is already taken replaces the
//! previous handle and closes its connection. There is no process-global
//! registry, callers construct one and share it.

use crate::error::{DbError, DbResult};
use crate::handle::{Handle, NativeConnection, RawConnection};
use crate::settings::ConnectSettings;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Named database connections, one handle per name.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<String, Handle>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connection and register it under `settings.connection`.
    ///
    /// When the name is already taken the previous handle is replaced and its
    /// connection closed; clones of the old handle stay alive but their
    /// statements fail from then on.
    pub async fn connect(&self, settings: ConnectSettings) -> DbResult<Handle> {
        let conn = NativeConnection::open(&settings).await?;
        let handle = Handle::new(&settings, conn);

        let previous = {
            let mut connections = self.connections.write().await;
            connections.insert(settings.connection.clone(), handle.clone())
        };

        info!(
            connection = %settings.connection,
            dsn = %settings.dsn(),
            replaced = previous.is_some(),
            "Connected"
        );

        if let Some(previous) = previous {
            if let Err(err) = previous.close().await {
                warn!(
                    connection = %settings.connection,
                    error = %err,
                    "Failed to close replaced connection"
                );
            }
        }

        Ok(handle)
    }

    /// Look up the handle registered under `name`.
    pub async fn get_connection(&self, name: &str) -> DbResult<Handle> {
        self.connections
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::not_found(name))
    }

    /// Exclusive access to the native connection registered under `name`.
    ///
    /// See [`Handle::raw`]; handle operations on the same connection block
    /// until the returned guard is dropped.
    pub async fn raw_connection(&self, name: &str) -> DbResult<RawConnection> {
        let handle = self.get_connection(name).await?;
        let raw = handle.raw().await;
        if !raw.is_open() {
            return Err(DbError::closed(name));
        }
        Ok(raw)
    }

    /// Names of all registered connections.
    pub async fn names(&self) -> Vec<String> {
        self.connections.read().await.keys().cloned().collect()
    }

    /// Number of registered connections.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Whether the registry holds no connections.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Close and drop every registered connection.
    pub async fn close_all(&self) {
        let drained: Vec<(String, Handle)> = {
            let mut connections = self.connections.write().await;
            connections.drain().collect()
        };
        for (name, handle) in drained {
            if let Err(err) = handle.close().await {
                warn!(connection = %name, error = %err, "Failed to close connection");
            } else {
                info!(connection = %name, "Closed connection");
            }
        }
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry").finish_non_exhaustive()
    }
}
