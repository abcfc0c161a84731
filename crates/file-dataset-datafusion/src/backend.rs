//! DataFusion implementations of the core backend traits.
//!
//! A connection handle is one in-memory [`SessionContext`]; the lazy
//! table type is DataFusion's [`DataFrame`], a logical plan that is not
//! executed until the caller collects it.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use datafusion::{
    config::CsvOptions,
    dataframe::DataFrameWriteOptions,
    error::DataFusionError,
    prelude::{
        CsvReadOptions, DataFrame, NdJsonReadOptions, ParquetReadOptions, SessionConfig,
        SessionContext,
    },
};
use snafu::prelude::*;

use file_dataset_core::{
    config::{ConfigValue, ConnectionConfig, FormatArgs},
    connection::{Backend, ConnectionError, Connector, InvalidParameterSnafu, UnknownBackendSnafu},
    format::FileFormat,
};

/// Errors raised by the DataFusion reader and writer implementations.
#[derive(Debug, Snafu)]
pub enum DataFusionBackendError {
    /// Underlying DataFusion failure (planning, malformed file, I/O).
    #[snafu(display("DataFusion error: {source}"))]
    DataFusion {
        /// The underlying engine error.
        source: DataFusionError,
    },

    /// The argument map contained a key this backend does not support
    /// for the given format.
    #[snafu(display("Unsupported {format} argument '{key}'"))]
    UnsupportedArgument {
        /// Format the argument was supplied for.
        format: FileFormat,
        /// The unsupported key.
        key: String,
    },

    /// An argument had a known key but an unusable value.
    #[snafu(display("Invalid argument '{key}': {reason}"))]
    InvalidArgument {
        /// The offending key.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Live DataFusion connection handle.
///
/// Wraps one in-memory `SessionContext`. Every dataset whose connection
/// configuration normalizes equally shares this handle, so tables
/// registered on load are visible to all of them.
pub struct DataFusionBackend {
    ctx: SessionContext,
}

impl std::fmt::Debug for DataFusionBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataFusionBackend").finish_non_exhaustive()
    }
}

impl DataFusionBackend {
    fn new(ctx: SessionContext) -> Self {
        Self { ctx }
    }

    /// The underlying session, for callers that need engine-native
    /// operations (for example, building a `DataFrame` from in-memory
    /// record batches, or querying tables registered on load).
    pub fn ctx(&self) -> &SessionContext {
        &self.ctx
    }
}

#[async_trait]
impl Backend for DataFusionBackend {
    type Table = DataFrame;
    type Error = DataFusionBackendError;

    async fn read(
        &self,
        format: FileFormat,
        path: &str,
        table_name: Option<&str>,
        args: &FormatArgs,
    ) -> Result<DataFrame, Self::Error> {
        // The extension filter must match the resolved path, not
        // DataFusion's per-format default, or templates with unusual
        // file names would list zero files.
        let ext = file_extension(path);

        match format {
            FileFormat::Csv => {
                let mut options = CsvReadOptions::new().file_extension(&ext);
                for (key, value) in args {
                    options = match key.as_str() {
                        "delimiter" => options.delimiter(delimiter_arg(key, value)?),
                        "has_header" => options.has_header(bool_arg(key, value)?),
                        _ => {
                            return UnsupportedArgumentSnafu { format, key }.fail();
                        }
                    };
                }
                match table_name {
                    Some(name) => {
                        self.ctx
                            .register_csv(name, path, options)
                            .await
                            .context(DataFusionSnafu)?;
                        self.ctx.table(name).await.context(DataFusionSnafu)
                    }
                    None => self.ctx.read_csv(path, options).await.context(DataFusionSnafu),
                }
            }
            FileFormat::Parquet => {
                ensure_no_args(format, args)?;
                let mut options = ParquetReadOptions::default();
                options.file_extension = &ext;
                match table_name {
                    Some(name) => {
                        self.ctx
                            .register_parquet(name, path, options)
                            .await
                            .context(DataFusionSnafu)?;
                        self.ctx.table(name).await.context(DataFusionSnafu)
                    }
                    None => self
                        .ctx
                        .read_parquet(path, options)
                        .await
                        .context(DataFusionSnafu),
                }
            }
            FileFormat::Json => {
                ensure_no_args(format, args)?;
                let mut options = NdJsonReadOptions::default();
                options.file_extension = &ext;
                match table_name {
                    Some(name) => {
                        self.ctx
                            .register_json(name, path, options)
                            .await
                            .context(DataFusionSnafu)?;
                        self.ctx.table(name).await.context(DataFusionSnafu)
                    }
                    None => self.ctx.read_json(path, options).await.context(DataFusionSnafu),
                }
            }
        }
    }

    async fn write(
        &self,
        data: DataFrame,
        format: FileFormat,
        path: &str,
        args: &FormatArgs,
    ) -> Result<(), Self::Error> {
        // The resolved path names one concrete file, never a directory
        // of partitioned outputs.
        let options = DataFrameWriteOptions::new().with_single_file_output(true);

        match format {
            FileFormat::Csv => {
                let mut csv = CsvOptions::default();
                for (key, value) in args {
                    match key.as_str() {
                        "delimiter" => csv.delimiter = delimiter_arg(key, value)?,
                        "has_header" => csv.has_header = Some(bool_arg(key, value)?),
                        _ => {
                            return UnsupportedArgumentSnafu { format, key }.fail();
                        }
                    }
                }
                data.write_csv(path, options, Some(csv))
                    .await
                    .context(DataFusionSnafu)?;
            }
            FileFormat::Parquet => {
                ensure_no_args(format, args)?;
                data.write_parquet(path, options, None)
                    .await
                    .context(DataFusionSnafu)?;
            }
            FileFormat::Json => {
                ensure_no_args(format, args)?;
                data.write_json(path, options, None)
                    .await
                    .context(DataFusionSnafu)?;
            }
        }

        Ok(())
    }
}

/// Connector for the in-process DataFusion engine.
///
/// Accepts backend kind `"datafusion"`. Supported connection parameters:
/// `target_partitions` and `batch_size`, both positive integers. A fresh
/// connection is an empty in-memory session.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataFusionConnector;

impl DataFusionConnector {
    /// Backend kind handled by this connector.
    pub const KIND: &'static str = "datafusion";
}

impl Connector for DataFusionConnector {
    type Backend = DataFusionBackend;

    fn connect(
        &self,
        kind: &str,
        params: &ConnectionConfig,
    ) -> Result<Arc<DataFusionBackend>, ConnectionError> {
        if kind != Self::KIND {
            return UnknownBackendSnafu { kind }.fail();
        }

        let mut config = SessionConfig::new();
        for (key, value) in params.iter() {
            config = match key.as_str() {
                "target_partitions" => config.with_target_partitions(usize_param(key, value)?),
                "batch_size" => config.with_batch_size(usize_param(key, value)?),
                _ => {
                    return InvalidParameterSnafu {
                        key,
                        reason: "unknown parameter for the datafusion backend",
                    }
                    .fail();
                }
            };
        }

        Ok(Arc::new(DataFusionBackend::new(
            SessionContext::new_with_config(config),
        )))
    }
}

fn usize_param(key: &str, value: &ConfigValue) -> Result<usize, ConnectionError> {
    match value {
        ConfigValue::Int(n) if *n > 0 => Ok(*n as usize),
        _ => InvalidParameterSnafu {
            key,
            reason: "expected a positive integer",
        }
        .fail(),
    }
}

fn bool_arg(key: &str, value: &ConfigValue) -> Result<bool, DataFusionBackendError> {
    match value {
        ConfigValue::Bool(b) => Ok(*b),
        _ => InvalidArgumentSnafu {
            key,
            reason: "expected a boolean",
        }
        .fail(),
    }
}

fn delimiter_arg(key: &str, value: &ConfigValue) -> Result<u8, DataFusionBackendError> {
    match value {
        ConfigValue::Str(s) if s.len() == 1 => Ok(s.as_bytes()[0]),
        _ => InvalidArgumentSnafu {
            key,
            reason: "expected a single-character string",
        }
        .fail(),
    }
}

fn ensure_no_args(format: FileFormat, args: &FormatArgs) -> Result<(), DataFusionBackendError> {
    match args.keys().next() {
        Some(key) => UnsupportedArgumentSnafu { format, key }.fail(),
        None => Ok(()),
    }
}

/// Extension filter (including the leading dot) for the file the
/// resolved path names; empty when the file name has no extension.
fn file_extension(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default()
}
