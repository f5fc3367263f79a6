//! The execution engine.
//!
//! [`execute`] drives a compiled [`Machine`] to termination: resolve the
//! current state, apply `InputPath`, run the state, splice the result back
//! in per `ResultPath`, apply `OutputPath`, then follow the transition or
//! stop (`SPEC_FULL.md` §4.7). `Parallel` states recurse into this same
//! loop once per branch, fanned out with [`tokio::task::JoinSet`].

use crate::definition::{Machine, ResultPath};
use crate::error::{states_error, MachineError};
use crate::invoker::{NullInvoker, OverrideTable, TaskInvoker};
use crate::runtime::{self, RuntimeContext, Transition};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// The final disposition of an execution. Only `Succeeded`/`Failed` are
/// produced by this engine; the remaining variants exist so a caller who
/// embeds a host-level timeout or cancellation layer on top has somewhere
/// to report it without inventing its own status type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Aborted,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Running => "RUNNING",
            Status::Succeeded => "SUCCEEDED",
            Status::Failed => "FAILED",
            Status::TimedOut => "TIMED_OUT",
            Status::Aborted => "ABORTED",
        }
    }
}

/// The outcome of running a machine to termination.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub input: Value,
    pub output: Value,
    pub status: Status,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Present when `status == Failed`; the error that ended the run.
    pub error: Option<MachineError>,
}

/// Knobs that don't change the machine's semantics but govern how this
/// engine runs it — the ambient concerns `SPEC_FULL.md` §7 calls for
/// alongside the core interpreter.
#[derive(Clone)]
pub struct EngineConfig {
    /// Hard cap on the number of states visited in one execution, guarding
    /// against a cyclic `Next` chain looping forever. `TimeoutSeconds` on
    /// the document is accepted at parse time but not enforced (see
    /// `SPEC_FULL.md` §9) — this is the substitute runaway-loop backstop.
    pub max_steps: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_steps: 10_000 }
    }
}

/// Everything [`execute`] needs beyond the machine and input, gathered so
/// callers don't have to thread four separate parameters through.
#[derive(Clone)]
pub struct Execution {
    pub invoker: Arc<dyn TaskInvoker>,
    pub overrides: Arc<OverrideTable>,
    pub config: EngineConfig,
}

impl Default for Execution {
    fn default() -> Self {
        Self {
            invoker: Arc::new(NullInvoker),
            overrides: Arc::new(OverrideTable::new()),
            config: EngineConfig::default(),
        }
    }
}

/// Run `machine` to termination, returning a result regardless of whether
/// it succeeded.
#[instrument(skip_all, fields(execution_id = %Uuid::new_v4(), start_at = %machine.start_at))]
pub async fn execute(machine: &Arc<Machine>, input: Value, exec: &Execution) -> ExecutionResult {
    let start = Utc::now();
    let ctx = RuntimeContext {
        invoker: exec.invoker.clone(),
        overrides: exec.overrides.clone(),
        max_steps: exec.config.max_steps,
    };

    let (output, status, error) = match run_to_completion(machine, input.clone(), &ctx).await {
        Ok(value) => (value, Status::Succeeded, None),
        Err(e) => {
            tracing::warn!(error = %e, "execution failed");
            (e.cause.clone(), Status::Failed, Some(e))
        }
    };

    ExecutionResult {
        input,
        output,
        status,
        start,
        end: Utc::now(),
        error,
    }
}

/// Drive the state loop for one machine (top-level or a `Parallel` branch)
/// and return its terminal output, or the error that ended it.
pub(crate) async fn run_to_completion(
    machine: &Arc<Machine>,
    input: Value,
    ctx: &RuntimeContext,
) -> Result<Value, MachineError> {
    let mut cursor = machine.start_at.clone();
    let mut value = input;

    for step in 0..ctx.max_steps {
        let def = machine.states.get(&cursor).ok_or_else(|| {
            MachineError::internal(format!("no such state '{cursor}' in machine"))
        })?;
        tracing::debug!(state = %cursor, step, "executing state");

        if let Some(path) = def.input_path() {
            value = path.search(&value).unwrap_or(Value::Null);
        }
        let pre_run_value = value.clone();

        let runtime = runtime::build(def, ctx);
        let outcome = runtime.run(value).await?;

        let mut output = apply_result_path(&pre_run_value, outcome.result, def.result_path());

        if let Some(path) = def.output_path() {
            output = path.search(&output).unwrap_or(Value::Null);
        }

        value = output;

        match outcome.transition {
            Transition::End => return Ok(value),
            Transition::Next(next) => {
                if next.is_empty() {
                    return Err(MachineError::no_choice_matched());
                }
                if !machine.states.contains_key(&next) {
                    return Err(MachineError::new(
                        states_error::ALL,
                        Value::String(format!("Next target '{next}' does not exist")),
                    ));
                }
                cursor = next;
            }
        }
    }

    Err(MachineError::internal(format!(
        "execution exceeded the configured step limit ({})",
        ctx.max_steps
    )))
}

/// Splice a state's result back into its pre-run input per `ResultPath`
/// (`SPEC_FULL.md` §4.7.1). `None` (the field was absent) behaves like
/// `Whole`, matching the real language's default.
pub(crate) fn apply_result_path(input: &Value, result: Value, result_path: Option<&ResultPath>) -> Value {
    match result_path {
        None | Some(ResultPath::Whole) => result,
        Some(ResultPath::Discard) => input.clone(),
        Some(ResultPath::Field(field)) => {
            let mut merged = input.clone();
            match merged.as_object_mut() {
                Some(map) => {
                    map.insert(field.clone(), result);
                    merged
                }
                None => {
                    let mut map = serde_json::Map::new();
                    map.insert(field.clone(), result);
                    Value::Object(map)
                }
            }
        }
    }
}

/// Run every branch of a `Parallel` state concurrently on a clone of
/// `input`, fail-fast, returning outputs in declaration order
/// (`SPEC_FULL.md` §4.5).
pub(crate) async fn run_branches(
    branches: &[Arc<Machine>],
    input: Value,
    ctx: &RuntimeContext,
) -> Result<Vec<Value>, MachineError> {
    let mut joinset = tokio::task::JoinSet::new();
    for (index, branch) in branches.iter().enumerate() {
        let branch = branch.clone();
        let input = input.clone();
        let ctx = ctx.clone();
        joinset.spawn(async move {
            let result = run_to_completion(&branch, input, &ctx).await;
            (index, result)
        });
    }

    let mut outputs: Vec<Option<Value>> = vec![None; branches.len()];
    let mut first_error: Option<MachineError> = None;

    while let Some(joined) = joinset.join_next().await {
        let (index, result) = match joined {
            Ok(pair) => pair,
            Err(join_err) => {
                if join_err.is_cancelled() {
                    continue;
                }
                if first_error.is_none() {
                    first_error = Some(MachineError::internal(format!(
                        "branch task panicked: {join_err}"
                    )));
                    joinset.abort_all();
                }
                continue;
            }
        };

        match result {
            Ok(value) => outputs[index] = Some(value),
            Err(branch_error) => {
                if first_error.is_none() {
                    tracing::warn!(branch = index, error = %branch_error, "parallel branch failed");
                    first_error = Some(MachineError::branch_failed(&branch_error));
                    joinset.abort_all();
                }
            }
        }
    }

    if let Some(err) = first_error {
        return Err(err);
    }

    Ok(outputs
        .into_iter()
        .map(|v| v.unwrap_or(Value::Null))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::{InvokerResponse, OverrideTable};
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoInvoker;

    #[async_trait]
    impl TaskInvoker for EchoInvoker {
        async fn invoke(&self, _resource: &str, input: Value) -> Result<InvokerResponse, MachineError> {
            Ok(InvokerResponse::ok(input))
        }
    }

    fn compile(doc: Value) -> Arc<Machine> {
        Machine::compile(&doc).expect("machine should compile")
    }

    #[tokio::test]
    async fn linear_task_chain_overridden_to_constant_output() {
        let doc = json!({
            "StartAt": "t1",
            "States": {
                "t1": {"Type": "Task", "Resource": "r1", "Next": "t2"},
                "t2": {"Type": "Task", "Resource": "r2", "Next": "t3"},
                "t3": {"Type": "Task", "Resource": "r3", "End": true}
            }
        });
        let machine = compile(doc);
        let mut overrides = OverrideTable::new();
        for r in ["r1", "r2", "r3"] {
            overrides.insert(r, Arc::new(|_: Value| Ok(json!("output"))));
        }
        let exec = Execution {
            invoker: Arc::new(EchoInvoker),
            overrides: Arc::new(overrides),
            config: EngineConfig::default(),
        };
        let result = execute(&machine, json!("input"), &exec).await;
        assert_eq!(result.status, Status::Succeeded);
        assert_eq!(result.output, json!("output"));
    }

    #[tokio::test]
    async fn pass_with_result_replaces_input() {
        let doc = json!({
            "StartAt": "P",
            "States": {
                "P": {"Type": "Pass", "Result": "zalandomp_22102018.zip", "Next": "V"},
                "V": {"Type": "Succeed"}
            }
        });
        let machine = compile(doc);
        let result = execute(&machine, json!(88), &Execution::default()).await;
        assert_eq!(result.status, Status::Succeeded);
        assert_eq!(result.output, json!("zalandomp_22102018.zip"));
    }

    #[tokio::test]
    async fn choice_selects_matching_branch() {
        let doc = json!({
            "StartAt": "C",
            "States": {
                "C": {
                    "Type": "Choice",
                    "Choices": [
                        {"Variable": "$.n", "NumericGreaterThan": 10, "Next": "Big"},
                        {"Variable": "$.n", "NumericLessThanEquals": 10, "Next": "Small"}
                    ]
                },
                "Big": {"Type": "Pass", "Result": "big", "End": true},
                "Small": {"Type": "Pass", "Result": "small", "End": true}
            }
        });
        let machine = compile(doc);
        let result = execute(&machine, json!({"n": 42}), &Execution::default()).await;
        assert_eq!(result.output, json!("big"));

        let result = execute(&machine, json!({"n": 1}), &Execution::default()).await;
        assert_eq!(result.output, json!("small"));
    }

    #[tokio::test]
    async fn choice_with_no_match_and_no_default_fails() {
        let doc = json!({
            "StartAt": "C",
            "States": {
                "C": {
                    "Type": "Choice",
                    "Choices": [
                        {"Variable": "$.n", "NumericGreaterThan": 100, "Next": "Big"}
                    ]
                },
                "Big": {"Type": "Succeed"}
            }
        });
        let machine = compile(doc);
        let result = execute(&machine, json!({"n": 1}), &Execution::default()).await;
        assert_eq!(result.status, Status::Failed);
        assert_eq!(
            result.error.unwrap().name,
            crate::error::states_error::NO_CHOICE_MATCHED
        );
    }

    #[tokio::test]
    async fn parallel_preserves_declaration_order() {
        let doc = json!({
            "StartAt": "P",
            "States": {
                "P": {
                    "Type": "Parallel",
                    "Branches": [
                        {"StartAt": "A", "States": {"A": {"Type": "Pass", "Result": "TEST_BRANCH_1_ARN_RESULT", "End": true}}},
                        {"StartAt": "B", "States": {"B": {"Type": "Pass", "Result": "TEST_BRANCH_2_ARN_RESULT", "End": true}}},
                        {"StartAt": "C", "States": {"C": {"Type": "Pass", "Result": "TEST_BRANCH_3_ARN_RESULT", "End": true}}}
                    ],
                    "End": true
                }
            }
        });
        let machine = compile(doc);
        let result = execute(&machine, json!("input"), &Execution::default()).await;
        assert_eq!(result.status, Status::Succeeded);
        assert_eq!(
            result.output,
            json!([
                "TEST_BRANCH_1_ARN_RESULT",
                "TEST_BRANCH_2_ARN_RESULT",
                "TEST_BRANCH_3_ARN_RESULT"
            ])
        );
    }

    #[tokio::test]
    async fn parallel_fails_fast_when_one_branch_fails() {
        let doc = json!({
            "StartAt": "P",
            "States": {
                "P": {
                    "Type": "Parallel",
                    "Branches": [
                        {"StartAt": "Ok", "States": {"Ok": {"Type": "Succeed"}}},
                        {"StartAt": "Bad", "States": {"Bad": {"Type": "Fail", "Error": "Boom", "Cause": "broken"}}}
                    ],
                    "End": true
                }
            }
        });
        let machine = compile(doc);
        let result = execute(&machine, json!("input"), &Execution::default()).await;
        assert_eq!(result.status, Status::Failed);
        assert_eq!(
            result.error.unwrap().name,
            crate::error::states_error::BRANCH_FAILED
        );
    }

    #[tokio::test]
    async fn result_path_field_merges_without_discarding_input() {
        let doc = json!({
            "StartAt": "P",
            "States": {
                "P": {"Type": "Pass", "Result": {"x": 1}, "ResultPath": "$.out", "End": true}
            }
        });
        let machine = compile(doc);
        let result = execute(&machine, json!({"keep": true}), &Execution::default()).await;
        assert_eq!(result.output, json!({"keep": true, "out": {"x": 1}}));
    }

    #[tokio::test]
    async fn result_path_null_discards_the_result() {
        let doc = json!({
            "StartAt": "P",
            "States": {
                "P": {"Type": "Pass", "Result": {"x": 1}, "ResultPath": null, "End": true}
            }
        });
        let machine = compile(doc);
        let result = execute(&machine, json!({"keep": true}), &Execution::default()).await;
        assert_eq!(result.output, json!({"keep": true}));
    }
}
