//! Per-kind state runtimes.
//!
//! Each [`StateDefinition`] variant gets a runtime object built fresh for
//! the step that needs it (`SPEC_FULL.md` §4.4) — carrying whatever shared
//! collaborators it needs (the task invoker, the override table) borrowed
//! for the duration of the call rather than owned. `run` does the kind's
//! actual work; the resulting [`Transition`] tells the engine where to go
//! next without the engine having to know how that was decided.

use crate::definition::{ChoiceDef, FailDef, ParallelDef, PassDef, StateDefinition, TaskDef};
use crate::error::{states_error, MachineError};
use crate::invoker::{OverrideTable, TaskInvoker};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Where control goes after a state finishes.
pub enum Transition {
    Next(String),
    End,
}

/// The value a state produced and where to go next.
pub struct RunOutcome {
    pub result: Value,
    pub transition: Transition,
}

impl RunOutcome {
    fn from_def_transition(result: Value, t: &crate::definition::Transition) -> Self {
        let transition = match &t.next {
            Some(next) => Transition::Next(next.clone()),
            None => Transition::End,
        };
        debug_assert!(t.next.is_some() || t.end);
        RunOutcome { result, transition }
    }
}

/// Shared collaborators every runtime that might invoke a `Task` or spawn a
/// `Parallel` sub-machine needs. Bundled so constructing a runtime for a
/// given step is a single call regardless of state kind.
#[derive(Clone)]
pub struct RuntimeContext {
    pub invoker: Arc<dyn TaskInvoker>,
    pub overrides: Arc<OverrideTable>,
    pub max_steps: usize,
}

#[async_trait]
pub trait StateRuntime: Send + Sync {
    async fn run(&self, input: Value) -> Result<RunOutcome, MachineError>;
}

/// Build the runtime for one state definition. Borrows `def` and `ctx` for
/// the duration of the step; nothing outlives the call.
pub fn build<'a>(def: &'a StateDefinition, ctx: &'a RuntimeContext) -> Box<dyn StateRuntime + 'a> {
    match def {
        StateDefinition::Pass(d) => Box::new(PassRuntime { def: d }),
        StateDefinition::Succeed(_) => Box::new(SucceedRuntime),
        StateDefinition::Fail(d) => Box::new(FailRuntime { def: d }),
        StateDefinition::Task(d) => Box::new(TaskRuntime { def: d, ctx }),
        StateDefinition::Choice(d) => Box::new(ChoiceRuntime { def: d }),
        StateDefinition::Parallel(d) => Box::new(ParallelRuntime { def: d, ctx }),
    }
}

struct PassRuntime<'a> {
    def: &'a PassDef,
}

#[async_trait]
impl StateRuntime for PassRuntime<'_> {
    async fn run(&self, input: Value) -> Result<RunOutcome, MachineError> {
        let result = self.def.result.clone().unwrap_or(input);
        Ok(RunOutcome::from_def_transition(result, &self.def.transition))
    }
}

struct SucceedRuntime;

#[async_trait]
impl StateRuntime for SucceedRuntime {
    async fn run(&self, input: Value) -> Result<RunOutcome, MachineError> {
        Ok(RunOutcome {
            result: input,
            transition: Transition::End,
        })
    }
}

struct FailRuntime<'a> {
    def: &'a FailDef,
}

#[async_trait]
impl StateRuntime for FailRuntime<'_> {
    async fn run(&self, _input: Value) -> Result<RunOutcome, MachineError> {
        let name = self
            .def
            .error
            .clone()
            .unwrap_or_else(|| states_error::ALL.to_string());
        let cause = self.def.cause.clone().unwrap_or_default();
        Err(MachineError::from_fail_state(name, cause))
    }
}

struct TaskRuntime<'a> {
    def: &'a TaskDef,
    ctx: &'a RuntimeContext,
}

#[async_trait]
impl StateRuntime for TaskRuntime<'_> {
    async fn run(&self, input: Value) -> Result<RunOutcome, MachineError> {
        let result = if let Some(f) = self.ctx.overrides.get(&self.def.resource) {
            f(input)?
        } else {
            let response = self.ctx.invoker.invoke(&self.def.resource, input).await?;
            if let Some(function_error) = response.function_error {
                tracing::warn!(
                    resource = %self.def.resource,
                    error = %function_error,
                    "task resource reported a function error"
                );
                return Err(MachineError::new(
                    states_error::TASK_FAILED,
                    response.payload,
                ));
            }
            response.payload
        };
        Ok(RunOutcome::from_def_transition(result, &self.def.transition))
    }
}

struct ChoiceRuntime<'a> {
    def: &'a ChoiceDef,
}

#[async_trait]
impl StateRuntime for ChoiceRuntime<'_> {
    async fn run(&self, input: Value) -> Result<RunOutcome, MachineError> {
        for rule in &self.def.choices {
            if rule.evaluate(&input)? {
                return Ok(RunOutcome {
                    result: input,
                    transition: Transition::Next(rule.next.clone()),
                });
            }
        }
        match &self.def.default {
            Some(default) => Ok(RunOutcome {
                result: input,
                transition: Transition::Next(default.clone()),
            }),
            None => {
                tracing::warn!("no Choice rule matched and no Default was set");
                Err(MachineError::no_choice_matched())
            }
        }
    }
}

struct ParallelRuntime<'a> {
    def: &'a ParallelDef,
    ctx: &'a RuntimeContext,
}

#[async_trait]
impl StateRuntime for ParallelRuntime<'_> {
    async fn run(&self, input: Value) -> Result<RunOutcome, MachineError> {
        let outputs = super::engine::run_branches(&self.def.branches, input, self.ctx).await?;
        Ok(RunOutcome::from_def_transition(
            Value::Array(outputs),
            &self.def.transition,
        ))
    }
}
