//! File format identifiers used to select backend readers and writers.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

/// Supported file format tags.
///
/// Backends dispatch on this tag to pick the concrete reader or writer
/// for an operation; the actual codecs live in the backend engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    /// Columnar binary format with an embedded schema.
    Parquet,
    /// Delimited text.
    Csv,
    /// Newline-delimited JSON.
    Json,
}

impl FileFormat {
    /// Format used when a dataset does not specify one.
    pub const DEFAULT: FileFormat = FileFormat::Parquet;

    /// Lowercase identifier for this format.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Parquet => "parquet",
            FileFormat::Csv => "csv",
            FileFormat::Json => "json",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown file format identifier.
#[derive(Debug, Snafu)]
#[snafu(display("Unknown file format '{spec}' (expected one of: parquet, csv, json)"))]
pub struct ParseFileFormatError {
    spec: String,
}

impl FromStr for FileFormat {
    type Err = ParseFileFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "parquet" => Ok(FileFormat::Parquet),
            "csv" => Ok(FileFormat::Csv),
            "json" => Ok(FileFormat::Json),
            _ => ParseFileFormatSnafu { spec: s }.fail(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_formats_case_insensitively() {
        assert_eq!("parquet".parse::<FileFormat>().unwrap(), FileFormat::Parquet);
        assert_eq!("CSV".parse::<FileFormat>().unwrap(), FileFormat::Csv);
        assert_eq!("Json".parse::<FileFormat>().unwrap(), FileFormat::Json);
    }

    #[test]
    fn rejects_unknown_formats() {
        let err = "feather".parse::<FileFormat>().unwrap_err();
        assert!(err.to_string().contains("feather"));
    }

    #[test]
    fn display_matches_identifier() {
        assert_eq!(FileFormat::Parquet.to_string(), "parquet");
        assert_eq!(FileFormat::DEFAULT, FileFormat::Parquet);
    }
}
