//! Wire-format types: a direct, mostly-untyped mirror of the machine JSON.
//!
//! These are deserialized straight from the document with `serde` and then
//! walked by [`super::compile`] to build the validated, execution-ready
//! types in the parent module. Keeping the wire shape separate means a
//! malformed document (wrong JSON shape, unknown `Type`) fails during
//! `serde_json` decoding with an ordinary deserialize error, while
//! *structurally* invalid but well-shaped documents (dangling `Next`, empty
//! `Choices`, …) fail during the second, accumulating validation pass.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Deserializes a present field (including an explicit JSON `null`) as
/// `Some`. Paired with `#[serde(default)]`, which supplies `None` only when
/// the key is missing entirely — without this, `Option<Value>`'s own
/// `Deserialize` impl would treat a present `null` the same as an absent
/// key, and `ResultPath: null` (discard) would be indistinguishable from no
/// `ResultPath` at all (default to `$`).
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawMachine {
    pub start_at: String,
    pub states: rustc_hash::FxHashMap<String, RawStateDef>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "Type")]
pub enum RawStateDef {
    Task(RawTaskDef),
    Pass(RawPassDef),
    Choice(RawChoiceDef),
    Succeed(RawSucceedDef),
    Fail(RawFailDef),
    Parallel(RawParallelDef),
    /// Recognized so documents containing it parse; rejected at validation
    /// time rather than silently treated as a no-op (see `DESIGN.md`).
    Wait(RawWaitDef),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawTransition {
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub end: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawTaskDef {
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub input_path: Option<String>,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default, deserialize_with = "present_value")]
    pub result_path: Option<Value>,
    #[serde(flatten)]
    pub transition: RawTransition,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawPassDef {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub input_path: Option<String>,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default, deserialize_with = "present_value")]
    pub result_path: Option<Value>,
    #[serde(flatten)]
    pub transition: RawTransition,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawChoiceDef {
    #[serde(default)]
    pub choices: Vec<RawChoiceRule>,
    #[serde(default)]
    pub default: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawSucceedDef {}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawFailDef {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub cause: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawParallelDef {
    #[serde(default)]
    pub branches: Vec<Value>,
    #[serde(default)]
    pub input_path: Option<String>,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default, deserialize_with = "present_value")]
    pub result_path: Option<Value>,
    #[serde(flatten)]
    pub transition: RawTransition,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawWaitDef {}

/// Direct mirror of a single `ChoiceRule` JSON object: every field optional,
/// exactly mirroring the Go original's `BaseChoiceRuleDefinition` (one
/// typed pointer field per predicate) so validation can tell "absent" from
/// "present but wrong type" without guessing from an untyped map.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawChoiceRule {
    #[serde(default)]
    pub variable: Option<String>,
    #[serde(default)]
    pub next: Option<String>,

    #[serde(default)]
    pub string_equals: Option<String>,
    #[serde(default)]
    pub string_less_than: Option<String>,
    #[serde(default)]
    pub string_greater_than: Option<String>,
    #[serde(default)]
    pub string_less_than_equals: Option<String>,
    #[serde(default)]
    pub string_greater_than_equals: Option<String>,

    #[serde(default)]
    pub numeric_equals: Option<f64>,
    #[serde(default)]
    pub numeric_less_than: Option<f64>,
    #[serde(default)]
    pub numeric_greater_than: Option<f64>,
    #[serde(default)]
    pub numeric_less_than_equals: Option<f64>,
    #[serde(default)]
    pub numeric_greater_than_equals: Option<f64>,

    #[serde(default)]
    pub boolean_equals: Option<bool>,

    #[serde(default)]
    pub timestamp_equals: Option<String>,
    #[serde(default)]
    pub timestamp_less_than: Option<String>,
    #[serde(default)]
    pub timestamp_greater_than: Option<String>,
    #[serde(default)]
    pub timestamp_less_than_equals: Option<String>,
    #[serde(default)]
    pub timestamp_greater_than_equals: Option<String>,

    #[serde(default)]
    pub and: Option<Vec<RawChoiceRule>>,
    #[serde(default)]
    pub or: Option<Vec<RawChoiceRule>>,
    #[serde(default)]
    pub not: Option<Box<RawChoiceRule>>,
}
