//! JSONPath adapter.
//!
//! Wraps [`serde_json_path`] behind the narrow `compile`/`search` interface
//! the rest of the crate depends on. Nothing outside this module imports
//! `serde_json_path` directly, so the underlying engine could be swapped
//! without touching callers.

use crate::error::{ValidationError, ValidationErrorKind};
use serde_json::Value;
use serde_json_path::JsonPath;

/// A compiled JSONPath expression.
#[derive(Clone)]
pub struct CompiledPath {
    expr: String,
    inner: JsonPath,
}

impl std::fmt::Debug for CompiledPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CompiledPath").field(&self.expr).finish()
    }
}

/// Compile a JSONPath expression, or report why it doesn't parse.
///
/// Callers are expected to special-case the empty string (identity) before
/// reaching this function; `""` is not a JSONPath the underlying engine
/// understands.
pub fn compile(field: &str, expr: &str) -> Result<CompiledPath, ValidationError> {
    JsonPath::parse(expr)
        .map(|inner| CompiledPath {
            expr: expr.to_string(),
            inner,
        })
        .map_err(|_| {
            ValidationError::new(ValidationErrorKind::InvalidJsonPath, field).with_value(expr)
        })
}

impl CompiledPath {
    /// Apply this path to a document, returning the first matching node in
    /// document order, or `None` if the path matches nothing.
    ///
    /// `"$"` always returns the whole document. A path that matches more
    /// than one node (e.g. a wildcard or slice) yields only the first match
    /// — ASL path fields resolve to a single logical value.
    pub fn search(&self, doc: &Value) -> Option<Value> {
        if self.expr == "$" {
            return Some(doc.clone());
        }
        self.inner.query(doc).first().cloned()
    }

    pub fn as_str(&self) -> &str {
        &self.expr
    }
}
