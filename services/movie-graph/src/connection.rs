//! Single-handle connection manager with probe and reconnect.

use crate::graph_store::{Connector, GraphStore, StoreError};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Owns the one live store handle of a component.
///
/// The handle is replaced wholesale on reconnect. Between closing the old
/// handle and successfully opening a new one, `store()` reports
/// `StoreError::Disconnected`.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    store: Option<C::Store>,
    reconnect_backoff: Duration,
}

impl<C: Connector> ConnectionManager<C> {
    /// Connect and probe once. A failed probe is fatal for the caller.
    pub async fn connect(connector: C, reconnect_backoff: Duration) -> Result<Self, StoreError> {
        info!("🔄 Attempting to connect to graph store at {}", connector.target());

        let store = connector.connect().await.map_err(|e| {
            error!("❌ Failed to connect to {}: {}", connector.target(), e);
            e
        })?;

        if let Err(e) = store.ping().await {
            error!("❌ Liveness probe against {} failed: {}", connector.target(), e);
            store.close();
            return Err(e);
        }

        info!("✅ Successfully connected to {}", connector.target());
        Ok(Self {
            connector,
            store: Some(store),
            reconnect_backoff,
        })
    }

    pub fn store(&self) -> Result<&C::Store, StoreError> {
        self.store.as_ref().ok_or(StoreError::Disconnected)
    }

    /// Probe the handle and reconnect if it is dead.
    ///
    /// A failed probe is not an error here; only a failed reconnect is.
    pub async fn verify(&mut self) -> Result<(), StoreError> {
        let probe = match self.store() {
            Ok(store) => store.ping().await,
            Err(e) => Err(e),
        };

        match probe {
            Ok(()) => {
                debug!("Connection to {} is alive", self.connector.target());
                Ok(())
            }
            Err(e) => {
                warn!("⚠️  Connection check failed: {}", e);
                self.reconnect().await
            }
        }
    }

    /// Close the current handle, wait, and open a fresh one.
    ///
    /// The reconnect itself is not retried.
    pub async fn reconnect(&mut self) -> Result<(), StoreError> {
        info!("🔄 Reconnecting to {}...", self.connector.target());

        if let Some(old) = self.store.take() {
            old.close();
        }

        sleep(self.reconnect_backoff).await;

        match self.connector.connect().await {
            Ok(store) => {
                self.store = Some(store);
                info!("✅ Reconnected to {}", self.connector.target());
                Ok(())
            }
            Err(e) => {
                error!("❌ Reconnect to {} failed: {}", self.connector.target(), e);
                Err(e)
            }
        }
    }

    pub fn close(mut self) {
        if let Some(store) = self.store.take() {
            store.close();
        }
    }
}
