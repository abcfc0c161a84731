//! Dataset locations and local filesystem helpers.
//!
//! This module centralizes path- and filesystem-related logic for
//! `file-dataset-core`:
//!
//! - Parsing user-facing location strings (`file://` prefixes are
//!   accepted and stripped; other schemes such as `s3://` are carried
//!   opaquely and handed to the backend verbatim).
//! - Existence checks used by `exists()` and by version resolution.
//! - Idempotent parent-directory creation before saves; concurrent saves
//!   into the same parent must both succeed.
//! - Listing version-token subdirectories under a path template.
//!
//! The filesystem helpers here only see the local filesystem. Remote
//! locations are invisible to them: `exists` reports `false`,
//! `create_parent_dirs` is a no-op, and `list_subdirs` is empty. Whether
//! a backend can actually read a remote location is the backend's
//! concern, not this module's.

use std::{
    error::Error,
    fmt, io,
    path::{Path, PathBuf},
};

use snafu::{Backtrace, prelude::*};
use tokio::fs;

/// General result type used by storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors produced by the storage backend implementation.
///
/// Currently only a local filesystem backend exists; backend-specific
/// I/O errors are wrapped in this enum so higher layers can map them
/// into [`StorageError`] variants with additional context.
#[derive(Debug)]
pub enum BackendIoError {
    /// A local filesystem I/O error.
    Local(io::Error),
}

impl fmt::Display for BackendIoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendIoError::Local(e) => write!(f, "local I/O error: {e}"),
        }
    }
}

impl Error for BackendIoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BackendIoError::Local(e) => Some(e),
        }
    }
}

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// The location string was empty.
    #[snafu(display("Dataset location is empty"))]
    EmptyPath {
        /// The backtrace captured when the error occurred.
        backtrace: Backtrace,
    },

    /// An I/O error occurred on the local filesystem.
    #[snafu(display("Local I/O error at {path}: {source}"))]
    OtherIo {
        /// The path where the I/O error occurred.
        path: String,
        /// Underlying backend I/O error with platform-specific details.
        source: BackendIoError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },
}

/// Location of a dataset file or path template.
///
/// Local paths get full filesystem support. Scheme-prefixed locations
/// (`s3://...` and friends) are kept as opaque strings and passed to the
/// backend verbatim; this crate never performs I/O against them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataLocation {
    /// A file or template on the local filesystem.
    Local(PathBuf),
    /// A scheme-prefixed location handled entirely by the backend.
    Remote {
        /// The scheme, e.g. `s3`.
        scheme: String,
        /// The full location string as given by the caller.
        spec: String,
    },
}

impl DataLocation {
    /// Create a location for a local filesystem path.
    pub fn local(path: impl Into<PathBuf>) -> Self {
        DataLocation::Local(path.into())
    }

    /// Parse a user-facing location string.
    ///
    /// `file://` prefixes are stripped to a local path; any other scheme
    /// prefix produces an opaque remote location. Only an empty string
    /// is rejected.
    pub fn parse(spec: &str) -> StorageResult<Self> {
        let trimmed = spec.trim();
        if trimmed.is_empty() {
            return EmptyPathSnafu.fail();
        }
        if let Some(rest) = trimmed.strip_prefix("file://") {
            return Ok(DataLocation::local(rest));
        }
        if let Some((scheme, _)) = trimmed.split_once("://") {
            return Ok(DataLocation::Remote {
                scheme: scheme.to_string(),
                spec: trimmed.to_string(),
            });
        }
        Ok(DataLocation::local(trimmed))
    }

    /// Append a relative component to this location.
    pub fn join(&self, rel: impl AsRef<Path>) -> DataLocation {
        match self {
            DataLocation::Local(path) => DataLocation::Local(path.join(rel)),
            DataLocation::Remote { scheme, spec } => DataLocation::Remote {
                scheme: scheme.clone(),
                spec: format!(
                    "{}/{}",
                    spec.trim_end_matches('/'),
                    rel.as_ref().display()
                ),
            },
        }
    }

    /// Final path component, if there is one.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            DataLocation::Local(path) => path.file_name().and_then(|n| n.to_str()),
            DataLocation::Remote { spec, .. } => spec
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .filter(|name| !name.is_empty() && !name.contains(':')),
        }
    }

    /// Borrow the underlying local path, if this location is local.
    pub fn as_local(&self) -> Option<&Path> {
        match self {
            DataLocation::Local(path) => Some(path),
            DataLocation::Remote { .. } => None,
        }
    }
}

impl fmt::Display for DataLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataLocation::Local(path) => write!(f, "{}", path.display()),
            DataLocation::Remote { spec, .. } => f.write_str(spec),
        }
    }
}

/// Whether a filesystem entry exists at `location`.
///
/// A missing entry is `Ok(false)`, not an error. Remote locations are
/// always reported absent, since this layer cannot see them.
pub async fn exists(location: &DataLocation) -> StorageResult<bool> {
    match location {
        DataLocation::Local(path) => match fs::metadata(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BackendIoError::Local(e)).context(OtherIoSnafu {
                path: path.display().to_string(),
            }),
        },
        DataLocation::Remote { .. } => Ok(false),
    }
}

/// Recursively create the parent directories of `location`.
///
/// Idempotent: an already-present parent is success, so concurrent saves
/// into the same parent directory never fail on each other. A no-op for
/// remote locations; object stores have no directories to create.
pub async fn create_parent_dirs(location: &DataLocation) -> StorageResult<()> {
    match location {
        DataLocation::Local(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(BackendIoError::Local)
                    .context(OtherIoSnafu {
                        path: parent.display().to_string(),
                    })?;
            }
            Ok(())
        }
        DataLocation::Remote { .. } => Ok(()),
    }
}

/// Names of the immediate subdirectories of `location`.
///
/// A missing `location` yields an empty list so callers can report
/// "no versions" instead of a filesystem error, and remote locations
/// yield an empty list for the same reason. Non-directory entries and
/// entries with non-UTF-8 names are skipped.
pub async fn list_subdirs(location: &DataLocation) -> StorageResult<Vec<String>> {
    match location {
        DataLocation::Remote { .. } => Ok(Vec::new()),
        DataLocation::Local(path) => {
            let path_str = path.display().to_string();

            let mut entries = match fs::read_dir(path).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => {
                    return Err(BackendIoError::Local(e))
                        .context(OtherIoSnafu { path: path_str });
                }
            };

            let mut names = Vec::new();
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(BackendIoError::Local)
                .context(OtherIoSnafu {
                    path: path_str.clone(),
                })?
            {
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(BackendIoError::Local)
                    .context(OtherIoSnafu {
                        path: path_str.clone(),
                    })?;
                if !file_type.is_dir() {
                    continue;
                }
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }

            Ok(names)
        }
    }
}
