//! Kernel spec descriptor (`kernel.json`) used by launchers for discovery.
//!
//! The launcher substitutes [`CONNECTION_FILE_PLACEHOLDER`] in `argv` with the
//! path of a freshly written connection file before starting the kernel.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token in `argv` replaced by the connection file path at launch.
pub const CONNECTION_FILE_PLACEHOLDER: &str = "{connection_file}";

#[derive(Debug, Error)]
pub enum KernelSpecError {
    #[error("malformed kernel spec: {0}")]
    Json(#[from] serde_json::Error),

    #[error("kernel spec argv is empty")]
    EmptyArgv,

    #[error("kernel spec argv lacks the {{connection_file}} placeholder")]
    MissingPlaceholder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelSpec {
    pub argv: Vec<String>,
    pub display_name: String,
    pub language: String,
}

impl KernelSpec {
    /// Builds a spec that launches `program` with `-f {connection_file}`.
    pub fn for_program(
        program: impl Into<String>,
        display_name: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            argv: vec![
                program.into(),
                "-f".to_string(),
                CONNECTION_FILE_PLACEHOLDER.to_string(),
            ],
            display_name: display_name.into(),
            language: language.into(),
        }
    }

    /// Checks that `argv` names a program and contains the placeholder.
    ///
    /// # Errors
    ///
    /// Returns [`KernelSpecError::EmptyArgv`] or
    /// [`KernelSpecError::MissingPlaceholder`].
    pub fn validate(&self) -> Result<(), KernelSpecError> {
        if self.argv.is_empty() {
            return Err(KernelSpecError::EmptyArgv);
        }
        if !self.argv.iter().any(|a| a == CONNECTION_FILE_PLACEHOLDER) {
            return Err(KernelSpecError::MissingPlaceholder);
        }
        Ok(())
    }

    /// Parses and validates a `kernel.json` document.
    ///
    /// # Errors
    ///
    /// Returns [`KernelSpecError`] for malformed JSON or an invalid `argv`.
    pub fn from_json_str(json: &str) -> Result<Self, KernelSpecError> {
        let spec: KernelSpec = serde_json::from_str(json)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Serializes the spec as indented JSON.
    ///
    /// # Errors
    ///
    /// Returns [`KernelSpecError::Json`] if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, KernelSpecError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Returns `argv` with the placeholder replaced by `connection_file`.
    pub fn command_for(&self, connection_file: &str) -> Vec<String> {
        self.argv
            .iter()
            .map(|a| {
                if a == CONNECTION_FILE_PLACEHOLDER {
                    connection_file.to_string()
                } else {
                    a.clone()
                }
            })
            .collect()
    }
}
