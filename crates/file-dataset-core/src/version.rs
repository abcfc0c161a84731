//! Version tokens and load/save path resolution.
//!
//! A versioned dataset stores each write under its own token directory:
//!
//! ```text
//! data/01_raw/cars.csv/                      # path template
//!   2026-08-20T09.15.01.321Z/cars.csv        # one version per save
//!   2026-08-23T14.02.44.007Z/cars.csv
//! ```
//!
//! Tokens are UTC timestamps formatted so lexicographic order equals
//! chronological order, which makes "latest version" a plain string
//! comparison over the template's subdirectories. Load resolution and
//! save resolution are independent: load picks the pinned or latest
//! existing token, save uses the pinned token or generates a fresh one.

use chrono::Utc;
use log::warn;
use serde::{Deserialize, Serialize};
use snafu::{Backtrace, prelude::*};

use crate::storage::{self, DataLocation, StorageError};

/// Chrono format string for version tokens, e.g. `2026-08-23T14.02.44.007Z`.
const TOKEN_FORMAT: &str = "%Y-%m-%dT%H.%M.%S%.3fZ";

/// Pinned load/save version tokens.
///
/// `None` on either side means "resolve automatically": the latest
/// existing version for load, a freshly generated token for save.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// Version to load, or `None` for the latest available.
    pub load: Option<String>,
    /// Version to save under, or `None` to generate a new token.
    pub save: Option<String>,
}

impl Version {
    /// Specifier that resolves both sides automatically.
    pub fn auto() -> Self {
        Self::default()
    }

    /// Pin the version to load; saves still generate fresh tokens.
    pub fn pinned_load(token: impl Into<String>) -> Self {
        Self {
            load: Some(token.into()),
            save: None,
        }
    }

    /// Pin the token to save under; loads still resolve to the latest.
    pub fn pinned_save(token: impl Into<String>) -> Self {
        Self {
            load: None,
            save: Some(token.into()),
        }
    }
}

/// Generate a fresh version token from the current UTC time.
pub fn generate_token() -> String {
    Utc::now().format(TOKEN_FORMAT).to_string()
}

/// Errors raised while resolving versioned paths.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum VersionError {
    /// No version of the dataset exists yet.
    ///
    /// Raised by load-path resolution when the template has no token
    /// directory containing the expected file. Callers checking for
    /// existence treat this as "does not exist" rather than a failure.
    #[snafu(display("No versions found for {path}"))]
    NotFound {
        /// The path template that has no versions.
        path: String,
        /// The backtrace captured when the error occurred.
        backtrace: Backtrace,
    },

    /// The path template has no file-name component to version.
    #[snafu(display("Cannot version path without a file name: {path}"))]
    InvalidTemplate {
        /// The offending path template.
        path: String,
        /// The backtrace captured when the error occurred.
        backtrace: Backtrace,
    },

    /// Storage failure while scanning for versions.
    #[snafu(display("Storage error while resolving version for {path}: {source}"))]
    Storage {
        /// The path template being resolved.
        path: String,
        /// Underlying storage error.
        source: StorageError,
    },
}

/// Resolves concrete load and save paths from a path template and an
/// optional version specifier.
///
/// With no specifier both resolutions return the template unchanged.
/// Resolution is a pure function of the template, the specifier, and
/// current filesystem state; no reconciliation between inconsistent
/// load and save pins is attempted here.
#[derive(Debug, Clone)]
pub struct VersionResolver {
    template: DataLocation,
    version: Option<Version>,
}

impl VersionResolver {
    /// Create a resolver over `template` with an optional specifier.
    pub fn new(template: DataLocation, version: Option<Version>) -> Self {
        Self { template, version }
    }

    /// Whether this resolver applies versioning at all.
    pub fn is_versioned(&self) -> bool {
        self.version.is_some()
    }

    fn file_name(&self) -> Result<&str, VersionError> {
        self.template.file_name().context(InvalidTemplateSnafu {
            path: self.template.to_string(),
        })
    }

    fn versioned_path(&self, token: &str) -> Result<DataLocation, VersionError> {
        let name = self.file_name()?;
        Ok(self.template.join(token).join(name))
    }

    /// Resolve the concrete path to load from.
    ///
    /// Pinned load token if given, otherwise the greatest token among
    /// the template's subdirectories that actually contains the expected
    /// file. Fails with [`VersionError::NotFound`] when nothing has been
    /// saved yet.
    pub async fn resolve_load_path(&self) -> Result<DataLocation, VersionError> {
        let Some(version) = &self.version else {
            return Ok(self.template.clone());
        };

        if let Some(token) = &version.load {
            return self.versioned_path(token);
        }

        let name = self.file_name()?.to_string();
        let mut tokens = storage::list_subdirs(&self.template)
            .await
            .context(StorageSnafu {
                path: self.template.to_string(),
            })?;
        tokens.sort();

        for token in tokens.iter().rev() {
            let candidate = self.template.join(token).join(&name);
            let found = storage::exists(&candidate).await.context(StorageSnafu {
                path: self.template.to_string(),
            })?;
            if found {
                return Ok(candidate);
            }
        }

        NotFoundSnafu {
            path: self.template.to_string(),
        }
        .fail()
    }

    /// Resolve the concrete path to save to.
    ///
    /// Pinned save token if given, otherwise a freshly generated one.
    pub async fn resolve_save_path(&self) -> Result<DataLocation, VersionError> {
        let Some(version) = &self.version else {
            return Ok(self.template.clone());
        };

        if let (Some(save), Some(load)) = (&version.save, &version.load) {
            if save != load {
                warn!(
                    "save version '{save}' does not match load version '{load}' for {template}",
                    template = self.template
                );
            }
        }

        let token = version.save.clone().unwrap_or_else(generate_token);
        self.versioned_path(&token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[tokio::test]
    async fn unversioned_resolution_returns_template() -> TestResult {
        let template = DataLocation::local("data/cars.csv");
        let resolver = VersionResolver::new(template.clone(), None);

        assert!(!resolver.is_versioned());
        assert_eq!(resolver.resolve_load_path().await?, template);
        assert_eq!(resolver.resolve_save_path().await?, template);
        Ok(())
    }

    #[tokio::test]
    async fn pinned_load_builds_versioned_path() -> TestResult {
        let resolver = VersionResolver::new(
            DataLocation::local("data/cars.csv"),
            Some(Version::pinned_load("2020-01-01T00.00.00.000Z")),
        );

        let path = resolver.resolve_load_path().await?;
        assert_eq!(
            path,
            DataLocation::local("data/cars.csv/2020-01-01T00.00.00.000Z/cars.csv")
        );
        Ok(())
    }

    #[tokio::test]
    async fn auto_save_generates_a_parseable_token() -> TestResult {
        let tmp = TempDir::new()?;
        let template = DataLocation::local(tmp.path().join("cars.csv"));
        let resolver = VersionResolver::new(template.clone(), Some(Version::auto()));

        let path = resolver.resolve_save_path().await?;
        assert_eq!(path.file_name(), Some("cars.csv"));

        let token = path
            .as_local()
            .expect("local")
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .expect("token directory");
        NaiveDateTime::parse_from_str(token, TOKEN_FORMAT)?;
        Ok(())
    }

    #[tokio::test]
    async fn latest_token_with_the_expected_file_wins() -> TestResult {
        let tmp = TempDir::new()?;
        let template = tmp.path().join("cars.csv");

        for token in [
            "2020-01-01T00.00.00.000Z",
            "2021-06-15T12.30.00.500Z",
            "2019-12-31T23.59.59.999Z",
        ] {
            let dir = template.join(token);
            tokio::fs::create_dir_all(&dir).await?;
            tokio::fs::write(dir.join("cars.csv"), b"rows").await?;
        }
        // Newer token directory without the expected file must be skipped.
        tokio::fs::create_dir_all(template.join("2022-01-01T00.00.00.000Z")).await?;

        let resolver = VersionResolver::new(
            DataLocation::local(&template),
            Some(Version::auto()),
        );
        let path = resolver.resolve_load_path().await?;
        assert_eq!(
            path,
            DataLocation::local(template.join("2021-06-15T12.30.00.500Z/cars.csv"))
        );
        Ok(())
    }

    #[tokio::test]
    async fn inconsistent_pins_save_under_the_save_pin() -> TestResult {
        // No reconciliation between the two pins: save uses the save
        // token, load keeps the load token, and resolution still works.
        let resolver = VersionResolver::new(
            DataLocation::local("data/cars.csv"),
            Some(Version {
                load: Some("2020-01-01T00.00.00.000Z".to_string()),
                save: Some("2021-06-15T12.30.00.500Z".to_string()),
            }),
        );

        assert_eq!(
            resolver.resolve_save_path().await?,
            DataLocation::local("data/cars.csv/2021-06-15T12.30.00.500Z/cars.csv")
        );
        assert_eq!(
            resolver.resolve_load_path().await?,
            DataLocation::local("data/cars.csv/2020-01-01T00.00.00.000Z/cars.csv")
        );
        Ok(())
    }

    #[tokio::test]
    async fn missing_versions_resolve_to_not_found() -> TestResult {
        let tmp = TempDir::new()?;
        let resolver = VersionResolver::new(
            DataLocation::local(tmp.path().join("never_saved.parquet")),
            Some(Version::auto()),
        );

        let err = resolver
            .resolve_load_path()
            .await
            .expect_err("expected NotFound");
        assert!(matches!(err, VersionError::NotFound { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn template_without_file_name_is_invalid() -> TestResult {
        let resolver = VersionResolver::new(DataLocation::local("/"), Some(Version::auto()));

        let err = resolver
            .resolve_save_path()
            .await
            .expect_err("expected InvalidTemplate");
        assert!(matches!(err, VersionError::InvalidTemplate { .. }));
        Ok(())
    }

    #[test]
    fn generated_tokens_sort_chronologically() {
        // Lexicographic comparison is the whole point of the token format.
        assert!("2026-08-23T14.02.44.007Z" > "2026-08-20T09.15.01.321Z");
        let token = generate_token();
        assert!(NaiveDateTime::parse_from_str(&token, TOKEN_FORMAT).is_ok());
    }
}
