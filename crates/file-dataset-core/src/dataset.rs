//! The versioned file dataset adapter.
//!
//! [`FileDataset`] holds the static configuration for one dataset (path
//! template, file format, table name, argument maps, version specifier)
//! and delegates the actual work: path resolution to
//! [`crate::version::VersionResolver`], connection sharing to
//! [`crate::connection::ConnectionRegistry`], and reading/writing to the
//! resolved [`crate::connection::Backend`] handle.
//!
//! ```rust,ignore
//! let dataset = FileDataset::builder("data/01_raw/cars.csv")
//!     .file_format(FileFormat::Csv)
//!     .table_name("cars")
//!     .version(Version::auto())
//!     .build(shared_registry())?;
//!
//! dataset.save(table).await?;
//! let reloaded = dataset.load().await?;
//! ```

use std::sync::Arc;

use serde::Serialize;
use snafu::prelude::*;

use crate::{
    config::{ConfigValue, ConnectionConfig, FormatArgs},
    connection::{Backend, ConnectionError, ConnectionRegistry, Connector},
    format::FileFormat,
    storage::{self, DataLocation, StorageError},
    version::{Version, VersionError, VersionResolver},
};

/// Backend-native table handle produced by datasets built on connector `C`.
pub type Table<C> = <<C as Connector>::Backend as Backend>::Table;

/// Errors raised by dataset construction and operations.
///
/// This layer adds no retry or recovery logic: file I/O failures here
/// are not expected to be transient, so everything fails fast and the
/// caller decides.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DatasetError {
    /// The file path template could not be parsed into a location.
    #[snafu(display("Invalid dataset filepath '{filepath}': {source}"))]
    InvalidFilepath {
        /// The filepath string as given at construction.
        filepath: String,
        /// Underlying storage error describing the rejection.
        source: StorageError,
    },

    /// Connection resolution or creation failed.
    #[snafu(display("Connection error: {source}"))]
    Connection {
        /// Underlying connection error.
        #[snafu(source, backtrace)]
        source: ConnectionError,
    },

    /// Version resolution failed.
    ///
    /// On load this usually means no prior save exists and no version
    /// was pinned; [`FileDataset::exists`] translates that case to
    /// `false` instead of surfacing it.
    #[snafu(display("Version resolution error: {source}"))]
    Version {
        /// Underlying version resolution error.
        #[snafu(source, backtrace)]
        source: VersionError,
    },

    /// Storage failure while checking existence or preparing directories.
    #[snafu(display("Storage error: {source}"))]
    Storage {
        /// Underlying storage error.
        source: StorageError,
    },

    /// The backend reader or writer failed (malformed file, unsupported
    /// argument, I/O failure). Propagated unwrapped.
    #[snafu(display("Backend {format} operation failed at {path}: {source}"))]
    BackendOperation {
        /// Format the failing operation was invoked for.
        format: FileFormat,
        /// Resolved path the operation targeted.
        path: String,
        /// Underlying backend error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Builder for [`FileDataset`]. Start from [`FileDataset::builder`].
#[derive(Debug, Clone)]
pub struct FileDatasetBuilder {
    filepath: String,
    file_format: FileFormat,
    table_name: Option<String>,
    connection: ConnectionConfig,
    load_args: FormatArgs,
    save_args: FormatArgs,
    version: Option<Version>,
    metadata: Option<ConfigValue>,
}

impl FileDatasetBuilder {
    fn new(filepath: impl Into<String>) -> Self {
        Self {
            filepath: filepath.into(),
            file_format: FileFormat::DEFAULT,
            table_name: None,
            connection: ConnectionConfig::default(),
            load_args: FormatArgs::new(),
            save_args: FormatArgs::new(),
            version: None,
            metadata: None,
        }
    }

    /// File format to read and write. Defaults to Parquet.
    pub fn file_format(mut self, format: FileFormat) -> Self {
        self.file_format = format;
        self
    }

    /// Name to register the loaded data under in the backend catalog.
    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = Some(name.into());
        self
    }

    /// Connection configuration. Defaults to an in-memory DataFusion
    /// session.
    pub fn connection(mut self, config: ConnectionConfig) -> Self {
        self.connection = config;
        self
    }

    /// Extra arguments for the backend reader.
    pub fn load_args(mut self, args: FormatArgs) -> Self {
        self.load_args = args;
        self
    }

    /// Extra arguments for the backend writer.
    pub fn save_args(mut self, args: FormatArgs) -> Self {
        self.save_args = args;
        self
    }

    /// Enable versioning with the given specifier.
    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Arbitrary metadata carried on the dataset, never interpreted here.
    pub fn metadata(mut self, metadata: impl Into<ConfigValue>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    /// Validate the configuration and build the dataset.
    ///
    /// The effective argument maps stored on the dataset are
    /// fully-populated copies made here (format defaults first, caller
    /// overrides second); mutating the maps passed into the builder
    /// afterwards has no effect on the dataset.
    pub fn build<C: Connector>(
        self,
        registry: Arc<ConnectionRegistry<C>>,
    ) -> Result<FileDataset<C>, DatasetError> {
        let location =
            DataLocation::parse(&self.filepath).context(InvalidFilepathSnafu {
                filepath: self.filepath.clone(),
            })?;

        let mut load_args = default_args(self.file_format);
        load_args.extend(self.load_args);
        let mut save_args = default_args(self.file_format);
        save_args.extend(self.save_args);

        let resolver = VersionResolver::new(location, self.version.clone());

        Ok(FileDataset {
            filepath: self.filepath,
            file_format: self.file_format,
            table_name: self.table_name,
            connection_config: self.connection,
            load_args,
            save_args,
            version: self.version,
            metadata: self.metadata,
            resolver,
            registry,
        })
    }
}

/// Per-format default reader/writer arguments, merged with caller
/// overrides at construction time. Empty for every format today; the
/// merge point exists so formats can grow defaults without touching
/// call sites.
fn default_args(_format: FileFormat) -> FormatArgs {
    FormatArgs::new()
}

/// A dataset stored as a (possibly versioned) file, read and written
/// through a shared backend connection.
///
/// Immutable after construction. Loading returns the backend's native
/// lazy table handle; only the data is loaded, no link to the underlying
/// file exists past [`FileDataset::load`].
pub struct FileDataset<C: Connector> {
    filepath: String,
    file_format: FileFormat,
    table_name: Option<String>,
    connection_config: ConnectionConfig,
    load_args: FormatArgs,
    save_args: FormatArgs,
    version: Option<Version>,
    metadata: Option<ConfigValue>,
    resolver: VersionResolver,
    registry: Arc<ConnectionRegistry<C>>,
}

impl<C: Connector> std::fmt::Debug for FileDataset<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDataset")
            .field("filepath", &self.filepath)
            .field("file_format", &self.file_format)
            .field("table_name", &self.table_name)
            .field("connection_config", &self.connection_config)
            .field("load_args", &self.load_args)
            .field("save_args", &self.save_args)
            .field("version", &self.version)
            .field("metadata", &self.metadata)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl<C: Connector> FileDataset<C> {
    /// Start building a dataset for the given file path template.
    pub fn builder(filepath: impl Into<String>) -> FileDatasetBuilder {
        FileDatasetBuilder::new(filepath)
    }

    /// The shared backend connection for this dataset's configuration.
    ///
    /// Created on first use; afterwards every dataset with an equal (by
    /// normalized value) connection configuration gets this same handle.
    pub fn connection(&self) -> Result<Arc<C::Backend>, DatasetError> {
        self.registry
            .get_or_create(&self.connection_config)
            .context(ConnectionSnafu)
    }

    /// Load the dataset.
    ///
    /// Resolves the load path (pinned or latest version), then invokes
    /// the backend reader for the configured format. Fails with a
    /// version error when no version can be resolved.
    pub async fn load(&self) -> Result<Table<C>, DatasetError> {
        let path = self
            .resolver
            .resolve_load_path()
            .await
            .context(VersionSnafu)?
            .to_string();
        let connection = self.connection()?;

        connection
            .read(
                self.file_format,
                &path,
                self.table_name.as_deref(),
                &self.load_args,
            )
            .await
            .map_err(|source| DatasetError::BackendOperation {
                format: self.file_format,
                path,
                source: Box::new(source),
            })
    }

    /// Save `data` to the dataset.
    ///
    /// Resolves the save path (pinned or freshly generated version),
    /// creates any missing parent directories, then invokes the backend
    /// writer for the configured format. Overwrites existing contents at
    /// the resolved path.
    pub async fn save(&self, data: Table<C>) -> Result<(), DatasetError> {
        let path = self
            .resolver
            .resolve_save_path()
            .await
            .context(VersionSnafu)?;
        storage::create_parent_dirs(&path).await.context(StorageSnafu)?;

        let connection = self.connection()?;
        let path = path.to_string();

        connection
            .write(data, self.file_format, &path, &self.save_args)
            .await
            .map_err(|source| DatasetError::BackendOperation {
                format: self.file_format,
                path,
                source: Box::new(source),
            })
    }

    /// Whether a loadable version of this dataset exists.
    ///
    /// A versioned dataset that has never been saved resolves to no
    /// version; that case is `Ok(false)`, not an error. Every other
    /// resolution failure propagates.
    pub async fn exists(&self) -> Result<bool, DatasetError> {
        let path = match self.resolver.resolve_load_path().await {
            Ok(path) => path,
            Err(VersionError::NotFound { .. }) => return Ok(false),
            Err(source) => return Err(DatasetError::Version { source }),
        };

        storage::exists(&path).await.context(StorageSnafu)
    }

    /// Static description of this dataset's configuration, for
    /// introspection and logging.
    ///
    /// Pure: never creates a connection and performs no I/O.
    pub fn describe(&self) -> DatasetInfo {
        DatasetInfo {
            filepath: self.filepath.clone(),
            file_format: self.file_format,
            table_name: self.table_name.clone(),
            backend: self
                .connection_config
                .backend_kind()
                .map(str::to_string),
            load_args: self.load_args.clone(),
            save_args: self.save_args.clone(),
            version: self.version.clone(),
        }
    }

    /// The file path template as given at construction.
    pub fn filepath(&self) -> &str {
        &self.filepath
    }

    /// The configured file format.
    pub fn file_format(&self) -> FileFormat {
        self.file_format
    }

    /// Metadata attached at construction, never interpreted by this crate.
    pub fn metadata(&self) -> Option<&ConfigValue> {
        self.metadata.as_ref()
    }
}

/// Static configuration snapshot returned by [`FileDataset::describe`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetInfo {
    /// File path template as given at construction.
    pub filepath: String,
    /// Configured file format.
    pub file_format: FileFormat,
    /// Table name used on load, if any.
    pub table_name: Option<String>,
    /// Backend kind from the connection configuration, if present.
    pub backend: Option<String>,
    /// Effective load arguments (defaults merged with overrides).
    pub load_args: FormatArgs,
    /// Effective save arguments (defaults merged with overrides).
    pub save_args: FormatArgs,
    /// Version specifier, if versioning is active.
    pub version: Option<Version>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::convert::Infallible;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[derive(Debug, Default)]
    struct MockBackend {
        last_read_path: std::sync::Mutex<Option<String>>,
    }

    #[async_trait]
    impl Backend for MockBackend {
        type Table = ();
        type Error = Infallible;

        async fn read(
            &self,
            _format: FileFormat,
            path: &str,
            _table_name: Option<&str>,
            _args: &FormatArgs,
        ) -> Result<(), Infallible> {
            *self.last_read_path.lock().unwrap() = Some(path.to_string());
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

    struct MockConnector;

    impl Connector for MockConnector {
        type Backend = MockBackend;

        fn connect(
            &self,
            _kind: &str,
            _params: &ConnectionConfig,
        ) -> Result<Arc<MockBackend>, ConnectionError> {
            Ok(Arc::new(MockBackend::default()))
        }
    }

    fn mock_registry() -> Arc<ConnectionRegistry<MockConnector>> {
        Arc::new(ConnectionRegistry::new(MockConnector))
    }

    #[test]
    fn describe_is_pure_and_never_connects() -> TestResult {
        let registry = mock_registry();
        let dataset = FileDataset::<MockConnector>::builder("data/cars.csv")
            .file_format(FileFormat::Csv)
            .table_name("cars")
            .version(Version::auto())
            .build(Arc::clone(&registry))?;

        let info = dataset.describe();

        assert_eq!(info.filepath, "data/cars.csv");
        assert_eq!(info.file_format, FileFormat::Csv);
        assert_eq!(info.table_name.as_deref(), Some("cars"));
        assert_eq!(info.backend.as_deref(), Some("datafusion"));
        assert_eq!(info.version, Some(Version::auto()));
        assert!(registry.is_empty());
        Ok(())
    }

    #[test]
    fn stored_args_are_copies_of_the_builder_maps() -> TestResult {
        let mut caller_args = FormatArgs::new();
        caller_args.insert("delimiter".to_string(), ConfigValue::from(";"));

        let dataset = FileDataset::<MockConnector>::builder("data/cars.csv")
            .file_format(FileFormat::Csv)
            .load_args(caller_args.clone())
            .build(mock_registry())?;

        // Later changes to the caller's map must not leak in.
        caller_args.insert("delimiter".to_string(), ConfigValue::from("|"));
        caller_args.insert("has_header".to_string(), ConfigValue::from(false));

        let info = dataset.describe();
        assert_eq!(info.load_args.get("delimiter"), Some(&ConfigValue::from(";")));
        assert!(!info.load_args.contains_key("has_header"));
        Ok(())
    }

    #[test]
    fn empty_filepaths_are_rejected_at_build() {
        let err = FileDataset::<MockConnector>::builder("")
            .build(mock_registry())
            .expect_err("expected InvalidFilepath");
        assert!(matches!(err, DatasetError::InvalidFilepath { .. }));
    }

    #[tokio::test]
    async fn remote_filepaths_pass_through_to_the_backend() -> TestResult {
        // Scheme-prefixed templates are valid configuration; the local
        // filesystem layer just cannot see them, so `exists` is false
        // while load hands the opaque path to the backend unchanged.
        let dataset = FileDataset::<MockConnector>::builder("s3://bucket/data/cars.parquet")
            .build(mock_registry())?;

        assert_eq!(dataset.filepath(), "s3://bucket/data/cars.parquet");
        assert!(!dataset.exists().await?);

        dataset.load().await?;
        let backend = dataset.connection()?;
        assert_eq!(
            backend.last_read_path.lock().unwrap().as_deref(),
            Some("s3://bucket/data/cars.parquet")
        );
        Ok(())
    }

    #[tokio::test]
    async fn exists_is_false_for_a_never_saved_versioned_dataset() -> TestResult {
        let tmp = TempDir::new()?;
        let registry = mock_registry();
        let dataset = FileDataset::<MockConnector>::builder(
            tmp.path().join("cars.parquet").display().to_string(),
        )
        .version(Version::auto())
        .build(Arc::clone(&registry))?;

        assert!(!dataset.exists().await?);
        // Existence checks need no connection either.
        assert!(registry.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn load_without_any_version_fails_with_version_error() -> TestResult {
        let tmp = TempDir::new()?;
        let dataset = FileDataset::<MockConnector>::builder(
            tmp.path().join("cars.parquet").display().to_string(),
        )
        .version(Version::auto())
        .build(mock_registry())?;

        let err = dataset.load().await.expect_err("expected Version error");
        assert!(matches!(err, DatasetError::Version { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn save_creates_missing_parent_directories() -> TestResult {
        let tmp = TempDir::new()?;
        let filepath = tmp.path().join("raw/company/cars.csv");
        let dataset = FileDataset::<MockConnector>::builder(filepath.display().to_string())
            .file_format(FileFormat::Csv)
            .build(mock_registry())?;

        dataset.save(()).await?;

        assert!(filepath.parent().expect("parent").is_dir());
        Ok(())
    }

    #[tokio::test]
    async fn datasets_with_equal_config_share_a_connection() -> TestResult {
        let registry = mock_registry();
        let config = ConnectionConfig::new()
            .with("backend", "mock")
            .with("database", "shared.db");

        let a = FileDataset::<MockConnector>::builder("data/a.parquet")
            .connection(config.clone())
            .build(Arc::clone(&registry))?;
        let b = FileDataset::<MockConnector>::builder("data/b.parquet")
            .connection(config)
            .build(Arc::clone(&registry))?;

        assert!(Arc::ptr_eq(&a.connection()?, &b.connection()?));
        assert_eq!(registry.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn unversioned_load_reads_the_template_path() -> TestResult {
        let tmp = TempDir::new()?;
        let filepath = tmp.path().join("cars.csv");
        tokio::fs::write(&filepath, b"id,name\n1,a\n").await?;

        let dataset = FileDataset::<MockConnector>::builder(filepath.display().to_string())
            .file_format(FileFormat::Csv)
            .build(mock_registry())?;

        assert!(dataset.exists().await?);
        dataset.load().await?;
        Ok(())
    }
}
