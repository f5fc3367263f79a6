//! Choice-rule compilation and evaluation.
//!
//! A `ChoiceRule` is a recursive boolean expression tree: a comparison leaf
//! against a JSONPath-resolved operand, or a logical combinator (`And`,
//! `Or`, `Not`) over sub-rules. Compilation (`compile_top_level`) walks the
//! raw, depth-0 rule from a `Choice` state's `Choices` list and produces a
//! validated [`ChoiceRule`]; evaluation (`ChoiceRule::evaluate`) walks the
//! compiled tree against a JSON input value.
//!
//! The depth-0/depth>0 distinction in the spec (`Next` required at the top,
//! forbidden below it) is encoded in the types rather than checked at
//! runtime: [`ChoiceRule`] always carries a `next`, while nested
//! [`RuleNode`]s never do.

use crate::definition::raw::RawChoiceRule;
use crate::error::{MachineError, ValidationError, ValidationErrorKind};
use crate::jsonpath::{self, CompiledPath};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// One typed comparison predicate, with its operand already decoded from
/// JSON into the type the operator works over.
#[derive(Debug, Clone)]
pub enum Predicate {
    StringEquals(String),
    StringLessThan(String),
    StringGreaterThan(String),
    StringLessThanEquals(String),
    StringGreaterThanEquals(String),
    NumericEquals(f64),
    NumericLessThan(f64),
    NumericGreaterThan(f64),
    NumericLessThanEquals(f64),
    NumericGreaterThanEquals(f64),
    BooleanEquals(bool),
    TimestampEquals(DateTime<Utc>),
    TimestampLessThan(DateTime<Utc>),
    TimestampGreaterThan(DateTime<Utc>),
    TimestampLessThanEquals(DateTime<Utc>),
    TimestampGreaterThanEquals(DateTime<Utc>),
}

impl Predicate {
    fn type_name(&self) -> &'static str {
        use Predicate::*;
        match self {
            StringEquals(_) | StringLessThan(_) | StringGreaterThan(_) | StringLessThanEquals(_)
            | StringGreaterThanEquals(_) => "a string",
            NumericEquals(_) | NumericLessThan(_) | NumericGreaterThan(_)
            | NumericLessThanEquals(_) | NumericGreaterThanEquals(_) => "a number",
            BooleanEquals(_) => "a boolean",
            TimestampEquals(_) | TimestampLessThan(_) | TimestampGreaterThan(_)
            | TimestampLessThanEquals(_) | TimestampGreaterThanEquals(_) => {
                "an RFC3339 timestamp"
            }
        }
    }

    /// Decode `operand` as the type this predicate expects and apply the
    /// comparison. `variable` is only used to enrich error messages.
    fn apply(&self, variable: &str, operand: &Value) -> Result<bool, MachineError> {
        use Predicate::*;
        let decode_err = || MachineError::operand_decode(variable, self.type_name());

        match self {
            StringEquals(rhs) => Ok(operand.as_str().ok_or_else(decode_err)? == rhs),
            StringLessThan(rhs) => Ok(operand.as_str().ok_or_else(decode_err)? < rhs.as_str()),
            StringGreaterThan(rhs) => Ok(operand.as_str().ok_or_else(decode_err)? > rhs.as_str()),
            StringLessThanEquals(rhs) => {
                Ok(operand.as_str().ok_or_else(decode_err)? <= rhs.as_str())
            }
            StringGreaterThanEquals(rhs) => {
                Ok(operand.as_str().ok_or_else(decode_err)? >= rhs.as_str())
            }
            NumericEquals(rhs) => Ok(operand.as_f64().ok_or_else(decode_err)? == *rhs),
            NumericLessThan(rhs) => Ok(operand.as_f64().ok_or_else(decode_err)? < *rhs),
            NumericGreaterThan(rhs) => Ok(operand.as_f64().ok_or_else(decode_err)? > *rhs),
            NumericLessThanEquals(rhs) => Ok(operand.as_f64().ok_or_else(decode_err)? <= *rhs),
            NumericGreaterThanEquals(rhs) => Ok(operand.as_f64().ok_or_else(decode_err)? >= *rhs),
            BooleanEquals(rhs) => Ok(operand.as_bool().ok_or_else(decode_err)? == *rhs),
            TimestampEquals(rhs) => Ok(parse_timestamp(operand, variable)? == *rhs),
            TimestampLessThan(rhs) => Ok(parse_timestamp(operand, variable)? < *rhs),
            TimestampGreaterThan(rhs) => Ok(parse_timestamp(operand, variable)? > *rhs),
            TimestampLessThanEquals(rhs) => Ok(parse_timestamp(operand, variable)? <= *rhs),
            TimestampGreaterThanEquals(rhs) => Ok(parse_timestamp(operand, variable)? >= *rhs),
        }
    }
}

fn parse_timestamp(operand: &Value, variable: &str) -> Result<DateTime<Utc>, MachineError> {
    operand
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| MachineError::operand_decode(variable, "an RFC3339 timestamp"))
}

/// A node in the compiled rule tree. Never carries `Next` — only the
/// enclosing [`ChoiceRule`] (depth 0) does.
#[derive(Debug, Clone)]
pub enum RuleNode {
    Comparison {
        variable: String,
        path: CompiledPath,
        predicate: Predicate,
    },
    And(Vec<RuleNode>),
    Or(Vec<RuleNode>),
    Not(Box<RuleNode>),
}

impl RuleNode {
    pub fn evaluate(&self, input: &Value) -> Result<bool, MachineError> {
        match self {
            RuleNode::Comparison {
                variable,
                path,
                predicate,
            } => {
                let operand = path
                    .search(input)
                    .ok_or_else(|| MachineError::variable_unresolved(variable))?;
                predicate.apply(variable, &operand)
            }
            RuleNode::And(children) => {
                for child in children {
                    if !child.evaluate(input)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            RuleNode::Or(children) => {
                for child in children {
                    if child.evaluate(input)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            RuleNode::Not(child) => Ok(!child.evaluate(input)?),
        }
    }
}

/// A depth-0 rule from a `Choice` state's `Choices` list: a [`RuleNode`]
/// plus the state to transition to when the rule matches.
#[derive(Debug, Clone)]
pub struct ChoiceRule {
    pub next: String,
    pub node: RuleNode,
}

impl ChoiceRule {
    pub fn evaluate(&self, input: &Value) -> Result<bool, MachineError> {
        self.node.evaluate(input)
    }
}

/// Compile every top-level rule in a `Choice` state's `Choices` list,
/// returning every accumulated validation error rather than stopping at
/// the first — the definition validator needs the complete picture.
pub fn compile_choices_collecting(
    raw: &[RawChoiceRule],
) -> (Vec<ChoiceRule>, Vec<ValidationError>) {
    let mut errors = Vec::new();
    let mut rules = Vec::new();
    for rule in raw {
        match compile_rule(rule, 0) {
            Ok((node, next)) => rules.push(ChoiceRule {
                next: next.expect("depth 0 guarantees Next is present when there are no errors"),
                node,
            }),
            Err(errs) => errors.extend(errs),
        }
    }
    (rules, errors)
}

/// Validate and compile a single rule node at the given nesting `depth`.
///
/// Returns the compiled node and, at depth 0 only, its `Next` target.
/// Accumulates every structural problem found in this node and its
/// children rather than stopping at the first.
fn compile_rule(
    raw: &RawChoiceRule,
    depth: usize,
) -> Result<(RuleNode, Option<String>), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let variant_count = [
        raw.variable.is_some(),
        raw.and.is_some(),
        raw.or.is_some(),
        raw.not.is_some(),
    ]
    .into_iter()
    .filter(|p| *p)
    .count();

    if variant_count == 0 {
        errors.push(ValidationError::new(
            ValidationErrorKind::MissingRequiredField,
            "Variable/And/Or/Not",
        ));
    } else if variant_count > 1 {
        errors.push(ValidationError::new(
            ValidationErrorKind::InvalidCombination,
            "Variable/And/Or/Not",
        ));
    }

    if depth == 0 && raw.next.is_none() {
        errors.push(ValidationError::new(
            ValidationErrorKind::MissingRequiredField,
            "Next",
        ));
    }
    if depth > 0 && raw.next.is_some() {
        errors.push(ValidationError::new(
            ValidationErrorKind::InvalidKey,
            "Next",
        ));
    }

    let node = if let Some(variable) = raw.variable.as_deref() {
        compile_comparison(raw, variable, &mut errors)
    } else if let Some(children) = &raw.and {
        compile_combinator(children, depth, &mut errors).map(RuleNode::And)
    } else if let Some(children) = &raw.or {
        compile_combinator(children, depth, &mut errors).map(RuleNode::Or)
    } else if let Some(child) = &raw.not {
        // Recurse on the *child* rule, not `raw` itself — the bug present
        // in the source this engine is modeled on.
        match compile_rule(child, depth + 1) {
            Ok((node, _)) => Some(RuleNode::Not(Box::new(node))),
            Err(errs) => {
                errors.extend(errs);
                None
            }
        }
    } else {
        None
    };

    if errors.is_empty() {
        let node = node.expect("no errors implies exactly one variant matched");
        let next = raw.next.clone();
        Ok((node, next))
    } else {
        Err(errors)
    }
}

fn compile_combinator(
    children: &[RawChoiceRule],
    depth: usize,
    errors: &mut Vec<ValidationError>,
) -> Option<Vec<RuleNode>> {
    let mut nodes = Vec::with_capacity(children.len());
    let mut ok = true;
    for child in children {
        match compile_rule(child, depth + 1) {
            Ok((node, _)) => nodes.push(node),
            Err(errs) => {
                errors.extend(errs);
                ok = false;
            }
        }
    }
    ok.then_some(nodes)
}

fn compile_comparison(
    raw: &RawChoiceRule,
    variable: &str,
    errors: &mut Vec<ValidationError>,
) -> Option<RuleNode> {
    let path = match jsonpath::compile("Variable", variable) {
        Ok(p) => Some(p),
        Err(e) => {
            errors.push(e);
            None
        }
    };

    let predicates = collect_predicates(raw);
    let predicate = match predicates.len() {
        1 => Some(predicates.into_iter().next().unwrap()),
        0 => {
            errors.push(ValidationError::new(
                ValidationErrorKind::MissingRequiredField,
                predicate_field_list(),
            ));
            None
        }
        _ => {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidCombination,
                predicate_field_list(),
            ));
            None
        }
    };

    // Literal Timestamp* operands are validated as RFC3339 here, at
    // compile time, in addition to the evaluator enforcing it at
    // evaluation time for operands pulled from input (see SPEC_FULL §9).
    for (field, value) in timestamp_fields(raw) {
        if let Some(v) = value {
            if DateTime::parse_from_rfc3339(v).is_err() {
                errors.push(
                    ValidationError::new(ValidationErrorKind::NonRfc3339Timestamp, field)
                        .with_value(v.clone()),
                );
            }
        }
    }

    match (path, predicate) {
        (Some(path), Some(predicate)) => Some(RuleNode::Comparison {
            variable: variable.to_string(),
            path,
            predicate,
        }),
        _ => None,
    }
}

fn predicate_field_list() -> &'static str {
    "StringEquals/StringLessThan/StringGreaterThan/StringLessThanEquals/\
StringGreaterThanEquals/NumericEquals/NumericLessThan/NumericGreaterThan/\
NumericLessThanEquals/NumericGreaterThanEquals/BooleanEquals/TimestampEquals/\
TimestampLessThan/TimestampGreaterThan/TimestampLessThanEquals/\
TimestampGreaterThanEquals"
}

fn timestamp_fields(raw: &RawChoiceRule) -> Vec<(&'static str, &Option<String>)> {
    vec![
        ("TimestampEquals", &raw.timestamp_equals),
        ("TimestampLessThan", &raw.timestamp_less_than),
        ("TimestampGreaterThan", &raw.timestamp_greater_than),
        ("TimestampLessThanEquals", &raw.timestamp_less_than_equals),
        (
            "TimestampGreaterThanEquals",
            &raw.timestamp_greater_than_equals,
        ),
    ]
}

/// Build the (already-parsed-where-needed) `Predicate` for every operand
/// field present on `raw`. More than one entry here is itself a validation
/// error, reported by the caller.
fn collect_predicates(raw: &RawChoiceRule) -> Vec<Predicate> {
    let mut out = Vec::new();
    if let Some(v) = &raw.string_equals {
        out.push(Predicate::StringEquals(v.clone()));
    }
    if let Some(v) = &raw.string_less_than {
        out.push(Predicate::StringLessThan(v.clone()));
    }
    if let Some(v) = &raw.string_greater_than {
        out.push(Predicate::StringGreaterThan(v.clone()));
    }
    if let Some(v) = &raw.string_less_than_equals {
        out.push(Predicate::StringLessThanEquals(v.clone()));
    }
    if let Some(v) = &raw.string_greater_than_equals {
        out.push(Predicate::StringGreaterThanEquals(v.clone()));
    }
    if let Some(v) = raw.numeric_equals {
        out.push(Predicate::NumericEquals(v));
    }
    if let Some(v) = raw.numeric_less_than {
        out.push(Predicate::NumericLessThan(v));
    }
    if let Some(v) = raw.numeric_greater_than {
        out.push(Predicate::NumericGreaterThan(v));
    }
    if let Some(v) = raw.numeric_less_than_equals {
        out.push(Predicate::NumericLessThanEquals(v));
    }
    if let Some(v) = raw.numeric_greater_than_equals {
        out.push(Predicate::NumericGreaterThanEquals(v));
    }
    if let Some(v) = raw.boolean_equals {
        out.push(Predicate::BooleanEquals(v));
    }
    // Timestamp operands: only construct the predicate if the literal
    // parses; an unparsable literal is reported separately (NonRfc3339)
    // and the comparison is left absent so it doesn't also trip
    // "wrong operand count".
    if let Some(v) = &raw.timestamp_equals {
        if let Ok(dt) = DateTime::parse_from_rfc3339(v) {
            out.push(Predicate::TimestampEquals(dt.with_timezone(&Utc)));
        }
    }
    if let Some(v) = &raw.timestamp_less_than {
        if let Ok(dt) = DateTime::parse_from_rfc3339(v) {
            out.push(Predicate::TimestampLessThan(dt.with_timezone(&Utc)));
        }
    }
    if let Some(v) = &raw.timestamp_greater_than {
        if let Ok(dt) = DateTime::parse_from_rfc3339(v) {
            out.push(Predicate::TimestampGreaterThan(dt.with_timezone(&Utc)));
        }
    }
    if let Some(v) = &raw.timestamp_less_than_equals {
        if let Ok(dt) = DateTime::parse_from_rfc3339(v) {
            out.push(Predicate::TimestampLessThanEquals(dt.with_timezone(&Utc)));
        }
    }
    if let Some(v) = &raw.timestamp_greater_than_equals {
        if let Ok(dt) = DateTime::parse_from_rfc3339(v) {
            out.push(Predicate::TimestampGreaterThanEquals(
                dt.with_timezone(&Utc),
            ));
        }
    }
    out
}
