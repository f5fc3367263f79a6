//! Error model for the machine interpreter.
//!
//! Two distinct channels, matching the states-language error design:
//!
//! - [`ValidationError`]/[`ValidationErrors`] — accumulated at parse time,
//!   before any state has run.
//! - [`MachineError`] — raised during execution, carries a states-language
//!   error name and a JSON cause.

use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

/// The kind of structural problem found while validating a machine document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    MissingRequiredField,
    InvalidKey,
    InvalidValue,
    InvalidJsonPath,
    InvalidCombination,
    NonRfc3339Timestamp,
}

impl std::fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ValidationErrorKind::MissingRequiredField => "Missing required field",
            ValidationErrorKind::InvalidKey => "Invalid Key",
            ValidationErrorKind::InvalidValue => "Invalid Value",
            ValidationErrorKind::InvalidJsonPath => "Invalid JSON path expression",
            ValidationErrorKind::InvalidCombination => "Invalid Combination",
            ValidationErrorKind::NonRfc3339Timestamp => "Non RFC3339 timestamp",
        };
        f.write_str(s)
    }
}

/// A single validation failure found while compiling a machine document.
#[derive(Debug, Clone, Error, Diagnostic, PartialEq, Eq)]
#[error("{kind} '{field}'{}", value.as_deref().map(|v| format!(": '{v}'")).unwrap_or_default())]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub field: String,
    pub value: Option<String>,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, field: impl Into<String>) -> Self {
        Self {
            kind,
            field: field.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// Zero or more [`ValidationError`]s accumulated while compiling a machine.
///
/// Validation never short-circuits: every rule in the document is checked
/// and every failure recorded, so a caller sees the whole picture in one
/// pass rather than fixing errors one at a time.
#[derive(Debug, Clone, Default, Diagnostic, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" : ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, err: ValidationError) {
        self.0.push(err);
    }

    pub fn extend(&mut self, other: ValidationErrors) {
        self.0.extend(other.0);
    }

    /// Return `Err(self)` if non-empty, `Ok(())` otherwise — the usual shape
    /// for "accumulate, then check at the end" validation passes.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl FromIterator<ValidationError> for ValidationErrors {
    fn from_iter<I: IntoIterator<Item = ValidationError>>(iter: I) -> Self {
        ValidationErrors(iter.into_iter().collect())
    }
}

/// The fixed states-language error names this engine can raise itself.
///
/// Fail states carry their own user-supplied name instead of one of these.
pub mod states_error {
    pub const ALL: &str = "States.ALL";
    pub const TIMEOUT: &str = "States.Timeout";
    pub const TASK_FAILED: &str = "States.TaskFailed";
    pub const TASK_PERMISSIONS: &str = "States.TaskPermissions";
    pub const RESULT_PATH_MATCH_FAILURE: &str = "States.ResultPathMatchFailure";
    pub const BRANCH_FAILED: &str = "States.BranchFailed";
    pub const NO_CHOICE_MATCHED: &str = "States.NoChoiceMatched";
}

/// A runtime error raised while executing a compiled machine.
///
/// Carries a states-language error name (one of the `States.*` constants,
/// or a Fail state's own `Error` field) and a JSON cause. Never retried or
/// recovered internally — raising one always aborts the execution loop.
#[derive(Debug, Clone, Error, Diagnostic, PartialEq)]
#[error("{name}: {cause}")]
pub struct MachineError {
    pub name: String,
    pub cause: Value,
}

impl MachineError {
    pub fn new(name: impl Into<String>, cause: Value) -> Self {
        Self {
            name: name.into(),
            cause,
        }
    }

    pub fn task_failed(cause: Value) -> Self {
        Self::new(states_error::TASK_FAILED, cause)
    }

    pub fn no_choice_matched() -> Self {
        Self::new(
            states_error::NO_CHOICE_MATCHED,
            Value::String("no Choice rule matched and no Default was set".into()),
        )
    }

    pub fn branch_failed(branch_error: &MachineError) -> Self {
        Self::new(
            states_error::BRANCH_FAILED,
            serde_json::json!({ "Name": branch_error.name, "Cause": branch_error.cause }),
        )
    }

    pub fn from_fail_state(error: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::new(error.into(), Value::String(cause.into()))
    }

    pub fn variable_unresolved(variable: &str) -> Self {
        Self::new(
            states_error::ALL,
            Value::String(format!("Variable '{variable}' did not resolve against the input")),
        )
    }

    pub fn operand_decode(variable: &str, expected_type: &str) -> Self {
        Self::new(
            states_error::ALL,
            Value::String(format!(
                "value at '{variable}' could not be decoded as {expected_type}"
            )),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(states_error::ALL, Value::String(message.into()))
    }
}
