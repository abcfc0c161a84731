//! DataFusion backend for `file-dataset-core`.
//!
//! This crate intentionally keeps all DataFusion types out of the core
//! crate. The main entry points are [`DataFusionConnector`] (plugged into
//! a `ConnectionRegistry`) and [`shared_registry`] (the process-wide
//! registry most pipelines should share).
//!
//! ```rust,ignore
//! use file_dataset_datafusion::{shared_registry, DataFusionFileDataset};
//!
//! let dataset = DataFusionFileDataset::builder("data/01_raw/cars.csv")
//!     .file_format(FileFormat::Csv)
//!     .build(shared_registry())?;
//! ```

mod backend;

pub use backend::{DataFusionBackend, DataFusionBackendError, DataFusionConnector};

use std::sync::{Arc, OnceLock};

use file_dataset_core::connection::ConnectionRegistry;
use file_dataset_core::dataset::FileDataset;

/// File dataset specialized to the DataFusion backend.
pub type DataFusionFileDataset = FileDataset<DataFusionConnector>;

/// Process-wide connection registry shared by all DataFusion-backed
/// datasets.
///
/// Datasets built against this registry reuse one `SessionContext` per
/// distinct connection configuration for the lifetime of the process;
/// repeated dataset construction in iterative pipeline re-runs never
/// pays session setup twice. Handles are never closed.
pub fn shared_registry() -> Arc<ConnectionRegistry<DataFusionConnector>> {
    static REGISTRY: OnceLock<Arc<ConnectionRegistry<DataFusionConnector>>> = OnceLock::new();
    Arc::clone(
        REGISTRY.get_or_init(|| Arc::new(ConnectionRegistry::new(DataFusionConnector::default()))),
    )
}
