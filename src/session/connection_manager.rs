use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::store::{CacheHandle, StoreClient, StoreConnector};
use crate::{Result, StoreBridgeError};

/// A reference to the live shared client
pub type ConnectionRef = Arc<dyn StoreClient>;

/// The one live client and the configuration path it was opened with
struct SharedConnection {
    client: ConnectionRef,
    config_path: String,
}

/// Owns the single connection shared by every accessor of this process.
///
/// Construction, reconfiguration and cache acquisition all run under one
/// mutex, so no caller ever observes a half-closed connection and concurrent
/// accessors with the same configuration never open more than one client.
/// The manager is meant to be held in an `Arc` by the long-lived service
/// context and handed to each accessor.
pub struct ConnectionManager {
    connector: Arc<dyn StoreConnector>,
    shared: Mutex<Option<SharedConnection>>,
    connects: AtomicUsize,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            connector,
            shared: Mutex::new(None),
            connects: AtomicUsize::new(0),
        }
    }

    /// Make sure a client opened with `config_path` is live and return it.
    ///
    /// An existing client opened with the same path is returned as is. A
    /// client opened with a different path is closed first; if no new path is
    /// given, the manager stays without a client and the call fails.
    pub fn ensure_connection(&self, config_path: Option<&str>) -> Result<ConnectionRef> {
        let config_path = config_path.filter(|p| !p.trim().is_empty());
        let mut shared = self.shared.lock();

        if let Some(current) = shared.as_ref() {
            if Some(current.config_path.as_str()) == config_path {
                debug!("Reusing store client with config at '{}'", current.config_path);
                return Ok(current.client.clone());
            }
        }

        match shared.take() {
            None => {
                if config_path.is_none() {
                    return Err(StoreBridgeError::Configuration(
                        "'CONFIG' parameter (path to the store connection configuration) is required to connect to the store"
                            .to_string(),
                    ));
                }
            }
            Some(previous) => {
                info!("Closing store client with config at '{}'...", previous.config_path);
                previous.client.close().map_err(|e| {
                    warn!("Failed to close store client with config at '{}': {}", previous.config_path, e);
                    StoreBridgeError::Fatal(format!(
                        "Failed to close store client with config at '{}': {}",
                        previous.config_path, e
                    ))
                })?;
                info!("Store client closed");
            }
        }

        let Some(config_path) = config_path else {
            return Err(StoreBridgeError::Fatal(
                "Store client closed successfully, query execution is prevented".to_string(),
            ));
        };

        info!("Launching store client with config at '{}'...", config_path);
        let client = self.connector.connect(config_path).map_err(|e| match e {
            StoreBridgeError::Fatal(_) => e,
            other => StoreBridgeError::Fatal(format!(
                "Failed to launch store client with config at '{config_path}': {other}"
            )),
        })?;
        self.connects.fetch_add(1, Ordering::Relaxed);
        info!("Store client launched");

        *shared = Some(SharedConnection {
            client: client.clone(),
            config_path: config_path.to_string(),
        });
        Ok(client)
    }

    /// Borrow a handle to the named cache from the current client
    pub fn acquire_cache(&self, cache_name: &str) -> Result<Box<dyn CacheHandle>> {
        let shared = self.shared.lock();
        let current = shared.as_ref().ok_or_else(|| {
            StoreBridgeError::Fatal(format!(
                "No live store client to create cache '{cache_name}' with"
            ))
        })?;

        current.client.cache(cache_name)?.ok_or_else(|| {
            StoreBridgeError::Fatal(format!("Store returned no handle when creating cache '{cache_name}'"))
        })
    }

    /// Configuration path of the live client, if any
    pub fn current_config_path(&self) -> Option<String> {
        self.shared.lock().as_ref().map(|s| s.config_path.clone())
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock().is_some()
    }

    /// Number of clients opened over the manager's lifetime
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::Relaxed)
    }
}
