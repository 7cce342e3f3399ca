use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::ExportError;

/// How a branch is exported: where to, where progress is published, and which keys end a
/// prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfiguration {
    #[serde(rename = "export_path")]
    pub path: String,
    #[serde(rename = "export_status_path")]
    pub status_path: String,
    #[serde(default)]
    pub last_keys_in_prefix_regexp: Vec<String>,
    #[serde(default)]
    pub is_continuous: bool,
}

impl ExportConfiguration {
    /// Compiles every entry of `last_keys_in_prefix_regexp`, in order.
    ///
    /// Fails on the first pattern that does not compile, reporting the pattern and its index.
    pub fn compile_last_keys_in_prefix_regexp(&self) -> Result<Vec<Regex>, ExportError> {
        self.last_keys_in_prefix_regexp
            .iter()
            .enumerate()
            .map(|(position, pattern)| {
                Regex::new(pattern).map_err(|source| ExportError::InvalidRegexp {
                    pattern: pattern.clone(),
                    position,
                    source,
                })
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), ExportError> {
        self.compile_last_keys_in_prefix_regexp().map(|_| ())
    }
}

/// One row of the administrative listing: a configuration with its branch names resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportConfigurationForBranch {
    pub repository: String,
    pub branch: String,
    #[serde(flatten)]
    pub configuration: ExportConfiguration,
}

/// Export status as stored in `catalog_branches_export_state.state`.
///
/// Decoding never fails: values outside the canonical set (including `export-repaired`)
/// read back as [`ExportStatus::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum ExportStatus {
    #[serde(rename = "in-progress")]
    InProgress,
    #[serde(rename = "exported-successfully")]
    Success,
    #[serde(rename = "export-failed")]
    Failed,
    #[serde(rename = "export-repaired")]
    Repaired,
    #[serde(rename = "unknown")]
    Unknown,
}

impl ExportStatus {
    pub fn as_db_str(self) -> &'static str {
        match self {
            ExportStatus::InProgress => "in-progress",
            ExportStatus::Success => "exported-successfully",
            ExportStatus::Failed => "export-failed",
            ExportStatus::Repaired => "export-repaired",
            ExportStatus::Unknown => "unknown",
        }
    }

    pub fn from_db_str(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "in-progress" => ExportStatus::InProgress,
            "exported-successfully" => ExportStatus::Success,
            "export-failed" => ExportStatus::Failed,
            // Not an error, just newer than this reader.
            _ => ExportStatus::Unknown,
        }
    }
}

impl From<String> for ExportStatus {
    fn from(value: String) -> Self {
        ExportStatus::from_db_str(&value)
    }
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// Current export progress of a branch. At most one per branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportState {
    pub current_ref: String,
    pub state: ExportStatus,
    pub error_message: Option<String>,
}

impl ExportState {
    pub fn new(current_ref: impl Into<String>, state: ExportStatus) -> Self {
        Self {
            current_ref: current_ref.into(),
            state,
            error_message: None,
        }
    }

    pub fn failed(current_ref: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            current_ref: current_ref.into(),
            state: ExportStatus::Failed,
            error_message: Some(message.into()),
        }
    }
}
