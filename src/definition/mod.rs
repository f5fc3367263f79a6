//! Validated, execution-ready machine definitions.
//!
//! [`Machine::compile`] is the only way to get a [`Machine`]: it decodes the
//! wire format ([`raw`]), then walks the result performing every structural
//! check described in `SPEC_FULL.md` §4.1 — dangling `Next` targets, an
//! unreachable or missing `StartAt`, malformed JSONPath expressions,
//! malformed `Choice` rules — accumulating every failure into one
//! [`ValidationErrors`] rather than stopping at the first.

pub mod raw;

use crate::choice::{self, ChoiceRule};
use crate::error::{ValidationError, ValidationErrorKind, ValidationErrors};
use crate::jsonpath::{self, CompiledPath};
use raw::{RawMachine, RawStateDef};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;

/// A compiled, executable state machine.
#[derive(Debug)]
pub struct Machine {
    pub start_at: String,
    pub states: FxHashMap<String, StateDefinition>,
    pub comment: Option<String>,
    pub version: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// The data/transition/IO-path fields every state kind besides `Succeed`
/// shares. Kept as its own struct so state kinds that don't have a `Next`
/// (`Succeed`, `Fail`) simply don't embed it, instead of carrying an
/// `Option<String>` that validation has to prove is always `None`.
#[derive(Debug)]
pub struct Transition {
    pub next: Option<String>,
    pub end: bool,
}

#[derive(Debug)]
pub struct TaskDef {
    pub resource: String,
    pub input_path: Option<CompiledPath>,
    pub output_path: Option<CompiledPath>,
    pub result_path: Option<ResultPath>,
    pub transition: Transition,
}

#[derive(Debug)]
pub struct PassDef {
    pub result: Option<Value>,
    pub input_path: Option<CompiledPath>,
    pub output_path: Option<CompiledPath>,
    pub result_path: Option<ResultPath>,
    pub transition: Transition,
}

#[derive(Debug)]
pub struct ChoiceDef {
    pub choices: Vec<ChoiceRule>,
    pub default: Option<String>,
}

#[derive(Debug)]
pub struct SucceedDef {}

#[derive(Debug)]
pub struct FailDef {
    pub error: Option<String>,
    pub cause: Option<String>,
}

#[derive(Debug)]
pub struct ParallelDef {
    pub branches: Vec<Arc<Machine>>,
    pub input_path: Option<CompiledPath>,
    pub output_path: Option<CompiledPath>,
    pub result_path: Option<ResultPath>,
    pub transition: Transition,
}

#[derive(Debug)]
pub enum StateDefinition {
    Task(TaskDef),
    Pass(PassDef),
    Choice(ChoiceDef),
    Succeed(SucceedDef),
    Fail(FailDef),
    Parallel(ParallelDef),
}

impl StateDefinition {
    pub fn transition(&self) -> Option<&Transition> {
        match self {
            StateDefinition::Task(s) => Some(&s.transition),
            StateDefinition::Pass(s) => Some(&s.transition),
            StateDefinition::Parallel(s) => Some(&s.transition),
            StateDefinition::Choice(_) | StateDefinition::Succeed(_) | StateDefinition::Fail(_) => {
                None
            }
        }
    }

    pub fn input_path(&self) -> Option<&CompiledPath> {
        match self {
            StateDefinition::Task(s) => s.input_path.as_ref(),
            StateDefinition::Pass(s) => s.input_path.as_ref(),
            StateDefinition::Parallel(s) => s.input_path.as_ref(),
            StateDefinition::Choice(_) | StateDefinition::Succeed(_) | StateDefinition::Fail(_) => {
                None
            }
        }
    }

    pub fn output_path(&self) -> Option<&CompiledPath> {
        match self {
            StateDefinition::Task(s) => s.output_path.as_ref(),
            StateDefinition::Pass(s) => s.output_path.as_ref(),
            StateDefinition::Parallel(s) => s.output_path.as_ref(),
            StateDefinition::Choice(_) | StateDefinition::Succeed(_) | StateDefinition::Fail(_) => {
                None
            }
        }
    }

    pub fn result_path(&self) -> Option<&ResultPath> {
        match self {
            StateDefinition::Task(s) => s.result_path.as_ref(),
            StateDefinition::Pass(s) => s.result_path.as_ref(),
            StateDefinition::Parallel(s) => s.result_path.as_ref(),
            StateDefinition::Choice(_) | StateDefinition::Succeed(_) | StateDefinition::Fail(_) => {
                None
            }
        }
    }
}

/// A `ResultPath`, distinguishing the three forms the field can take
/// (see `SPEC_FULL.md` §4.7.1). A `None` on the owning state (the field was
/// absent from the document) is treated the same as `Whole` — the real ASL
/// default — by [`crate::engine::apply_result_path`].
#[derive(Debug, Clone)]
pub enum ResultPath {
    /// `ResultPath: null` — discard the state's result, output == input.
    Discard,
    /// `ResultPath: "$"` — the result replaces the whole document.
    Whole,
    /// `ResultPath: "$.field"` — the result is spliced in as a single
    /// top-level field of the input document.
    Field(String),
}

impl ResultPath {
    fn compile(raw: Option<&Value>) -> Result<Option<ResultPath>, ValidationError> {
        let Some(value) = raw else {
            return Ok(None);
        };
        match value {
            Value::Null => Ok(Some(ResultPath::Discard)),
            Value::String(s) if s.is_empty() => Ok(None),
            Value::String(s) if s == "$" => Ok(Some(ResultPath::Whole)),
            Value::String(s) => {
                let field = s.strip_prefix("$.").ok_or_else(|| {
                    ValidationError::new(ValidationErrorKind::InvalidJsonPath, "ResultPath")
                        .with_value(s.clone())
                })?;
                if field.is_empty() || field.contains(['.', '[']) {
                    return Err(ValidationError::new(
                        ValidationErrorKind::InvalidJsonPath,
                        "ResultPath",
                    )
                    .with_value(s.clone()));
                }
                Ok(Some(ResultPath::Field(field.to_string())))
            }
            other => Err(ValidationError::new(
                ValidationErrorKind::InvalidValue,
                "ResultPath",
            )
            .with_value(other.to_string())),
        }
    }
}

struct Validator {
    errors: ValidationErrors,
}

impl Validator {
    fn push(&mut self, err: ValidationError) {
        self.errors.push(err);
    }

    fn compile_path(&mut self, field: &'static str, raw: &Option<String>) -> Option<CompiledPath> {
        match raw {
            None => None,
            Some(expr) if expr.is_empty() => None,
            Some(expr) if expr == "$" => jsonpath::compile(field, "$").ok(),
            Some(expr) => match jsonpath::compile(field, expr) {
                Ok(p) => Some(p),
                Err(e) => {
                    self.push(e);
                    None
                }
            },
        }
    }

    fn compile_result_path(&mut self, raw: &Option<Value>) -> Option<ResultPath> {
        match ResultPath::compile(raw.as_ref()) {
            Ok(rp) => rp,
            Err(e) => {
                self.push(e);
                None
            }
        }
    }

    fn transition(&mut self, state_name: &str, raw: &raw::RawTransition) -> Transition {
        if raw.next.is_none() && !raw.end {
            self.push(ValidationError::new(
                ValidationErrorKind::MissingRequiredField,
                format!("{state_name}.Next"),
            ));
        }
        if raw.next.is_some() && raw.end {
            self.push(ValidationError::new(
                ValidationErrorKind::InvalidCombination,
                format!("{state_name}.Next/End"),
            ));
        }
        Transition {
            next: raw.next.clone(),
            end: raw.end,
        }
    }
}

impl Machine {
    /// Compile a machine document (already-parsed JSON) into an executable
    /// [`Machine`], or every structural problem found in it.
    pub fn compile(doc: &Value) -> Result<Arc<Machine>, ValidationErrors> {
        let raw: RawMachine = serde_json::from_value(doc.clone()).map_err(|e| {
            ValidationErrors(vec![ValidationError::new(
                ValidationErrorKind::InvalidValue,
                "<document>",
            )
            .with_value(e.to_string())])
        })?;

        let mut v = Validator {
            errors: ValidationErrors::default(),
        };

        if raw.states.is_empty() {
            v.push(ValidationError::new(
                ValidationErrorKind::MissingRequiredField,
                "States",
            ));
        }

        let mut states = FxHashMap::default();
        for (name, raw_state) in &raw.states {
            if let Some(compiled) = compile_state(&mut v, name, raw_state) {
                states.insert(name.clone(), compiled);
            }
        }

        if !raw.states.contains_key(&raw.start_at) {
            v.push(
                ValidationError::new(ValidationErrorKind::InvalidValue, "StartAt")
                    .with_value(raw.start_at.clone()),
            );
        }

        for (name, state) in &states {
            validate_references(&mut v, name, state, &raw.states);
        }

        v.errors.clone().into_result()?;

        Ok(Arc::new(Machine {
            start_at: raw.start_at,
            states,
            comment: raw.comment,
            version: raw.version,
            timeout_seconds: raw.timeout_seconds,
        }))
    }
}

fn compile_state(
    v: &mut Validator,
    name: &str,
    raw_state: &RawStateDef,
) -> Option<StateDefinition> {
    match raw_state {
        RawStateDef::Task(t) => {
            let resource = match &t.resource {
                Some(r) => r.clone(),
                None => {
                    v.push(ValidationError::new(
                        ValidationErrorKind::MissingRequiredField,
                        format!("{name}.Resource"),
                    ));
                    String::new()
                }
            };
            Some(StateDefinition::Task(TaskDef {
                resource,
                input_path: v.compile_path("InputPath", &t.input_path),
                output_path: v.compile_path("OutputPath", &t.output_path),
                result_path: v.compile_result_path(&t.result_path),
                transition: v.transition(name, &t.transition),
            }))
        }
        RawStateDef::Pass(p) => Some(StateDefinition::Pass(PassDef {
            result: p.result.clone(),
            input_path: v.compile_path("InputPath", &p.input_path),
            output_path: v.compile_path("OutputPath", &p.output_path),
            result_path: v.compile_result_path(&p.result_path),
            transition: v.transition(name, &p.transition),
        })),
        RawStateDef::Choice(c) => {
            if c.choices.is_empty() {
                v.push(ValidationError::new(
                    ValidationErrorKind::MissingRequiredField,
                    format!("{name}.Choices"),
                ));
            }
            let (rules, errs) = choice::compile_choices_collecting(&c.choices);
            for e in errs {
                v.push(e);
            }
            Some(StateDefinition::Choice(ChoiceDef {
                choices: rules,
                default: c.default.clone(),
            }))
        }
        RawStateDef::Succeed(_) => Some(StateDefinition::Succeed(SucceedDef {})),
        RawStateDef::Fail(f) => {
            if f.error.as_deref().unwrap_or_default().is_empty() {
                v.push(ValidationError::new(
                    ValidationErrorKind::MissingRequiredField,
                    format!("{name}.Error"),
                ));
            }
            if f.cause.as_deref().unwrap_or_default().is_empty() {
                v.push(ValidationError::new(
                    ValidationErrorKind::MissingRequiredField,
                    format!("{name}.Cause"),
                ));
            }
            Some(StateDefinition::Fail(FailDef {
                error: f.error.clone(),
                cause: f.cause.clone(),
            }))
        }
        RawStateDef::Parallel(p) => {
            if p.branches.is_empty() {
                v.push(ValidationError::new(
                    ValidationErrorKind::MissingRequiredField,
                    format!("{name}.Branches"),
                ));
            }
            let mut branches = Vec::with_capacity(p.branches.len());
            for (i, branch_doc) in p.branches.iter().enumerate() {
                match Machine::compile(branch_doc) {
                    Ok(m) => branches.push(m),
                    Err(errs) => {
                        for mut e in errs.0 {
                            e.field = format!("{name}.Branches[{i}].{}", e.field);
                            v.push(e);
                        }
                    }
                }
            }
            Some(StateDefinition::Parallel(ParallelDef {
                branches,
                input_path: v.compile_path("InputPath", &p.input_path),
                output_path: v.compile_path("OutputPath", &p.output_path),
                result_path: v.compile_result_path(&p.result_path),
                transition: v.transition(name, &p.transition),
            }))
        }
        RawStateDef::Wait(_) => {
            v.push(ValidationError::new(
                ValidationErrorKind::InvalidValue,
                format!("{name}.Type"),
            ));
            None
        }
    }
}

fn validate_references(
    v: &mut Validator,
    name: &str,
    state: &StateDefinition,
    all: &FxHashMap<String, RawStateDef>,
) {
    let mut check = |field: &str, target: &str| {
        if !all.contains_key(target) {
            v.push(
                ValidationError::new(ValidationErrorKind::InvalidValue, format!("{name}.{field}"))
                    .with_value(target.to_string()),
            );
        }
    };

    match state {
        StateDefinition::Task(t) => {
            if let Some(next) = &t.transition.next {
                check("Next", next);
            }
        }
        StateDefinition::Pass(p) => {
            if let Some(next) = &p.transition.next {
                check("Next", next);
            }
        }
        StateDefinition::Parallel(p) => {
            if let Some(next) = &p.transition.next {
                check("Next", next);
            }
        }
        StateDefinition::Choice(c) => {
            for rule in &c.choices {
                check("Choices[].Next", &rule.next);
            }
            if let Some(default) = &c.default {
                check("Default", default);
            }
        }
        StateDefinition::Succeed(_) | StateDefinition::Fail(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compiles_a_two_state_linear_machine() {
        let doc = json!({
            "StartAt": "A",
            "States": {
                "A": {"Type": "Pass", "Result": {"x": 1}, "Next": "B"},
                "B": {"Type": "Succeed"}
            }
        });
        let machine = Machine::compile(&doc).unwrap();
        assert_eq!(machine.start_at, "A");
        assert_eq!(machine.states.len(), 2);
    }

    #[test]
    fn dangling_next_is_reported() {
        let doc = json!({
            "StartAt": "A",
            "States": {
                "A": {"Type": "Pass", "Next": "Missing"}
            }
        });
        let errs = Machine::compile(&doc).unwrap_err();
        assert!(errs
            .0
            .iter()
            .any(|e| e.kind == ValidationErrorKind::InvalidValue && e.field == "A.Next"));
    }

    #[test]
    fn wait_state_is_rejected() {
        let doc = json!({
            "StartAt": "A",
            "States": {
                "A": {"Type": "Wait", "Seconds": 5, "Next": "B"},
                "B": {"Type": "Succeed"}
            }
        });
        let errs = Machine::compile(&doc).unwrap_err();
        assert!(errs.0.iter().any(|e| e.field == "A.Type"));
    }

    #[test]
    fn validation_accumulates_multiple_errors_in_one_pass() {
        let doc = json!({
            "StartAt": "Missing",
            "States": {
                "A": {"Type": "Task", "Next": "AlsoMissing"}
            }
        });
        let errs = Machine::compile(&doc).unwrap_err();
        assert!(errs.0.len() >= 3, "expected StartAt + Resource + Next errors, got {:?}", errs.0);
    }

    #[test]
    fn parallel_branches_compile_recursively() {
        let doc = json!({
            "StartAt": "P",
            "States": {
                "P": {
                    "Type": "Parallel",
                    "Branches": [
                        {"StartAt": "X", "States": {"X": {"Type": "Succeed"}}},
                        {"StartAt": "Y", "States": {"Y": {"Type": "Succeed"}}}
                    ],
                    "End": true
                }
            }
        });
        let machine = Machine::compile(&doc).unwrap();
        match machine.states.get("P").unwrap() {
            StateDefinition::Parallel(p) => assert_eq!(p.branches.len(), 2),
            _ => panic!("expected Parallel"),
        }
    }

    #[test]
    fn result_path_field_form_parses() {
        let doc = json!({
            "StartAt": "A",
            "States": {
                "A": {"Type": "Pass", "ResultPath": "$.out", "End": true}
            }
        });
        let machine = Machine::compile(&doc).unwrap();
        match machine.states.get("A").unwrap() {
            StateDefinition::Pass(p) => {
                assert!(matches!(p.result_path, Some(ResultPath::Field(ref f)) if f == "out"));
            }
            _ => panic!("expected Pass"),
        }
    }

    #[test]
    fn fail_without_error_or_cause_is_rejected() {
        let doc = json!({
            "StartAt": "F",
            "States": {
                "F": {"Type": "Fail"}
            }
        });
        let errs = Machine::compile(&doc).unwrap_err();
        assert!(errs
            .0
            .iter()
            .any(|e| e.kind == ValidationErrorKind::MissingRequiredField && e.field == "F.Error"));
        assert!(errs
            .0
            .iter()
            .any(|e| e.kind == ValidationErrorKind::MissingRequiredField && e.field == "F.Cause"));
    }

    #[test]
    fn empty_path_fields_compile_as_identity_not_an_error() {
        let doc = json!({
            "StartAt": "A",
            "States": {
                "A": {
                    "Type": "Pass",
                    "InputPath": "",
                    "OutputPath": "",
                    "ResultPath": "",
                    "End": true
                }
            }
        });
        let machine = Machine::compile(&doc).unwrap();
        match machine.states.get("A").unwrap() {
            StateDefinition::Pass(p) => {
                assert!(p.input_path.is_none());
                assert!(p.output_path.is_none());
                assert!(p.result_path.is_none());
            }
            _ => panic!("expected Pass"),
        }
    }
}
