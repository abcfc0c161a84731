//! Backend capability traits and the connection registry.
//!
//! A dataset never talks to a query engine directly. It asks a
//! [`ConnectionRegistry`] for the live handle matching its connection
//! configuration, and the handle exposes exactly two capabilities via
//! the [`Backend`] trait: a generic `read` and a generic `write`, each
//! dispatching internally on a [`FileFormat`] tag. This keeps the core
//! crate free of engine types while still matching the "one reader and
//! one writer per supported format" contract.
//!
//! ## Caching semantics
//!
//! The registry guarantees at most one connection per distinct
//! configuration, where "distinct" means distinct normalized value (see
//! [`crate::config`]). Entries are never evicted or closed; a registry
//! shared for the process lifetime means iterative pipeline re-runs with
//! identical connection config never pay connection setup twice and
//! never exhaust connection-limited engines. The internal lock is held
//! across the whole check-then-create sequence, so concurrent first-use
//! calls with the same new configuration still produce a single handle.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use log::debug;
use snafu::{Backtrace, prelude::*};

use crate::config::{ConfigKey, ConfigValue, ConnectionConfig, FormatArgs};
use crate::format::FileFormat;

/// Errors raised while resolving or creating backend connections.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConnectionError {
    /// The configuration has no `backend` entry naming the backend kind.
    #[snafu(display("Connection configuration is missing the 'backend' entry"))]
    MissingBackendKey {
        /// The backtrace captured when the error occurred.
        backtrace: Backtrace,
    },

    /// The `backend` entry is present but is not a string.
    #[snafu(display("Connection configuration entry 'backend' must be a string"))]
    InvalidBackendKey {
        /// The backtrace captured when the error occurred.
        backtrace: Backtrace,
    },

    /// No connector handles the requested backend kind.
    #[snafu(display("Unknown backend '{kind}'"))]
    UnknownBackend {
        /// The backend kind that could not be resolved.
        kind: String,
        /// The backtrace captured when the error occurred.
        backtrace: Backtrace,
    },

    /// A connection parameter was rejected by the connector.
    #[snafu(display("Invalid connection parameter '{key}': {reason}"))]
    InvalidParameter {
        /// The offending parameter key.
        key: String,
        /// Why the parameter was rejected.
        reason: String,
        /// The backtrace captured when the error occurred.
        backtrace: Backtrace,
    },

    /// The connector failed while establishing the connection.
    #[snafu(display("Failed to connect to backend '{kind}': {source}"))]
    Connect {
        /// The backend kind being connected to.
        kind: String,
        /// Underlying engine error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Capability contract required of any live backend connection handle.
///
/// `Table` is the backend-native lazy handle over a file's data: a query
/// plan, not a materialized copy. `read` must not force execution and
/// must not retain a reference to the source path on the returned value.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Backend-native lazy table / query-plan handle.
    type Table: Send;
    /// Error type raised by reader and writer operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read the file at `path` in the given format.
    ///
    /// When `table_name` is given the data is also registered under that
    /// name in the backend's catalog.
    async fn read(
        &self,
        format: FileFormat,
        path: &str,
        table_name: Option<&str>,
        args: &FormatArgs,
    ) -> Result<Self::Table, Self::Error>;

    /// Write `data` to `path` in the given format, overwriting any
    /// previous contents.
    async fn write(
        &self,
        data: Self::Table,
        format: FileFormat,
        path: &str,
        args: &FormatArgs,
    ) -> Result<(), Self::Error>;
}

/// Resolves a backend kind plus connection parameters into a live handle.
///
/// `params` contains every configuration entry except the backend key,
/// which the registry has already removed.
pub trait Connector: Send + Sync + 'static {
    /// Backend type produced by this connector.
    type Backend: Backend;

    /// Establish a new connection for `kind` with the given parameters.
    fn connect(
        &self,
        kind: &str,
        params: &ConnectionConfig,
    ) -> Result<Arc<Self::Backend>, ConnectionError>;
}

/// Cache of live backend connections keyed by normalized configuration.
///
/// The registry is an explicitly constructed object rather than a bare
/// module-level static, so its lifecycle is visible and testable; share
/// one instance (behind an `Arc`) across every dataset that should reuse
/// connections. For any two configurations that are equal by normalized
/// value, [`ConnectionRegistry::get_or_create`] returns the identical
/// handle.
pub struct ConnectionRegistry<C: Connector> {
    connector: C,
    connections: Mutex<HashMap<ConfigKey, Arc<C::Backend>>>,
}

impl<C: Connector> ConnectionRegistry<C> {
    /// Create an empty registry backed by the given connector.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Number of distinct connections currently cached.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the registry holds no connections.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ConfigKey, Arc<C::Backend>>> {
        // A poisoned lock only means another thread panicked mid-insert;
        // the map itself is still usable.
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the cached handle for `config`, creating it on first use.
    ///
    /// The configuration's backend entry selects the connector behavior;
    /// the remaining entries are passed through as connection parameters.
    /// Repeat calls with an equal (by normalized value) configuration
    /// return the same handle. There is no teardown: handles live as long
    /// as the registry.
    pub fn get_or_create(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Arc<C::Backend>, ConnectionError> {
        let key = config.normalized();
        let mut connections = self.lock();

        if let Some(handle) = connections.get(&key) {
            return Ok(Arc::clone(handle));
        }

        let mut params = config.clone();
        let kind = match params.remove(ConnectionConfig::BACKEND_KEY) {
            Some(ConfigValue::Str(kind)) => kind,
            Some(_) => return InvalidBackendKeySnafu.fail(),
            None => return MissingBackendKeySnafu.fail(),
        };

        debug!("opening new '{kind}' backend connection");
        let handle = self.connector.connect(&kind, &params)?;
        connections.insert(key, Arc::clone(&handle));
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct MockBackend;

    #[async_trait]
    impl Backend for MockBackend {
        type Table = ();
        type Error = Infallible;

        async fn read(
            &self,
            _format: FileFormat,
            _path: &str,
            _table_name: Option<&str>,
            _args: &FormatArgs,
        ) -> Result<(), Infallible> {
            Ok(())
        }

        async fn write(
            &self,
            _data: (),
            _format: FileFormat,
            _path: &str,
            _args: &FormatArgs,
        ) -> Result<(), Infallible> {
            Ok(())
        }
    }

    struct MockConnector {
        connects: Arc<AtomicUsize>,
    }

    impl Connector for MockConnector {
        type Backend = MockBackend;

        fn connect(
            &self,
            kind: &str,
            _params: &ConnectionConfig,
        ) -> Result<Arc<MockBackend>, ConnectionError> {
            if kind != "mock" {
                return UnknownBackendSnafu { kind }.fail();
            }
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(MockBackend))
        }
    }

    fn mock_registry() -> (ConnectionRegistry<MockConnector>, Arc<AtomicUsize>) {
        let connects = Arc::new(AtomicUsize::new(0));
        let registry = ConnectionRegistry::new(MockConnector {
            connects: Arc::clone(&connects),
        });
        (registry, connects)
    }

    #[test]
    fn equal_configs_share_one_handle() {
        let (registry, connects) = mock_registry();

        let a = ConnectionConfig::new()
            .with("backend", "mock")
            .with("database", "analytics.db");
        let b = ConnectionConfig::new()
            .with("database", "analytics.db")
            .with("backend", "mock");

        let first = registry.get_or_create(&a).expect("first connect");
        let second = registry.get_or_create(&b).expect("cached lookup");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn differing_nested_values_get_distinct_handles() {
        let (registry, connects) = mock_registry();

        let base = ConnectionConfig::new().with("backend", "mock");
        let a = base.clone().with("threads", 2i64);
        let b = base.with("threads", 4i64);

        let first = registry.get_or_create(&a).expect("connect a");
        let second = registry.get_or_create(&b).expect("connect b");

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(connects.load(Ordering::SeqCst), 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn list_order_distinguishes_configs() {
        let (registry, _) = mock_registry();

        let a = ConnectionConfig::new().with("backend", "mock").with(
            "hosts",
            vec![ConfigValue::from("a"), ConfigValue::from("b")],
        );
        let b = ConnectionConfig::new().with("backend", "mock").with(
            "hosts",
            vec![ConfigValue::from("b"), ConfigValue::from("a")],
        );

        let first = registry.get_or_create(&a).expect("connect a");
        let second = registry.get_or_create(&b).expect("connect b");
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn missing_backend_entry_is_a_configuration_error() {
        let (registry, connects) = mock_registry();

        let err = registry
            .get_or_create(&ConnectionConfig::new().with("database", "x.db"))
            .expect_err("expected MissingBackendKey");
        assert!(matches!(err, ConnectionError::MissingBackendKey { .. }));

        let err = registry
            .get_or_create(&ConnectionConfig::new().with("backend", 1i64))
            .expect_err("expected InvalidBackendKey");
        assert!(matches!(err, ConnectionError::InvalidBackendKey { .. }));

        assert_eq!(connects.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_kind_propagates_and_is_not_cached() {
        let (registry, _) = mock_registry();

        let config = ConnectionConfig::new().with("backend", "duckdb");
        let err = registry
            .get_or_create(&config)
            .expect_err("expected UnknownBackend");
        assert!(matches!(err, ConnectionError::UnknownBackend { .. }));
        assert!(registry.is_empty());
    }
}
