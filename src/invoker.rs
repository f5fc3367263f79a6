//! Task invocation.
//!
//! A `Task` state's `Resource` names something to run. Resolution is
//! two-tier (`SPEC_FULL.md` §4.6): an [`OverrideTable`] entry, checked
//! first and applied synchronously, or the [`TaskInvoker`] passed to the
//! engine, which may be async and may itself fail.

use crate::error::MachineError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// The outcome of invoking a resource that ran but reported failure through
/// the states-language `Error`/`Cause` convention rather than a hard
/// transport error. Distinguishing this from [`MachineError`] lets an
/// invoker surface a States.TaskFailed-shaped result without constructing
/// the error name/cause pairing itself.
#[derive(Debug, Clone)]
pub struct InvokerResponse {
    pub payload: Value,
    pub function_error: Option<String>,
}

impl InvokerResponse {
    pub fn ok(payload: Value) -> Self {
        Self {
            payload,
            function_error: None,
        }
    }

    pub fn failed(error: impl Into<String>, cause: Value) -> Self {
        Self {
            payload: cause,
            function_error: Some(error.into()),
        }
    }
}

/// Resolves a `Task` state's `Resource` string to a running computation.
///
/// Implementors decide what a resource name means — a local function
/// registry, an HTTP call, a message-queue round trip. The engine only
/// needs the result or the failure.
#[async_trait]
pub trait TaskInvoker: Send + Sync {
    async fn invoke(&self, resource: &str, input: Value) -> Result<InvokerResponse, MachineError>;
}

/// A synchronous, pure override for one resource name — checked before the
/// configured [`TaskInvoker`] is ever consulted.
pub type Override = Arc<dyn Fn(Value) -> Result<Value, MachineError> + Send + Sync>;

/// A table of resource-name overrides, consulted ahead of the default
/// invoker. Exists so tests (and deterministic replays) can pin a `Task`
/// state's output without standing up whatever the resource really names.
#[derive(Clone, Default)]
pub struct OverrideTable {
    entries: HashMap<String, Override>,
}

impl OverrideTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, resource: impl Into<String>, f: Override) {
        self.entries.insert(resource.into(), f);
    }

    pub fn with(mut self, resource: impl Into<String>, f: Override) -> Self {
        self.insert(resource, f);
        self
    }

    pub fn get(&self, resource: &str) -> Option<&Override> {
        self.entries.get(resource)
    }
}

/// Default invoker used when the caller supplies none: every resource
/// fails with `States.TaskPermissions`, since there is nothing a local
/// interpreter can reach on its own.
pub struct NullInvoker;

#[async_trait]
impl TaskInvoker for NullInvoker {
    async fn invoke(&self, resource: &str, _input: Value) -> Result<InvokerResponse, MachineError> {
        Err(MachineError::new(
            crate::error::states_error::TASK_PERMISSIONS,
            Value::String(format!(
                "no TaskInvoker configured to resolve resource '{resource}'"
            )),
        ))
    }
}
