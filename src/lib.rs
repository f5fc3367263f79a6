//! A local interpreter for a declarative state-machine language — a
//! dialect of the Amazon States Language (ASL).
//!
//! Compile a JSON document into a [`Machine`](definition::Machine) with
//! [`Machine::compile`](definition::Machine::compile), then drive it to
//! termination with [`engine::execute`]:
//!
//! ```
//! use serde_json::json;
//! use stepfn::definition::Machine;
//! use stepfn::engine::{execute, Execution};
//!
//! let doc = json!({
//!     "StartAt": "Greet",
//!     "States": {
//!         "Greet": { "Type": "Pass", "Result": "hello", "End": true }
//!     }
//! });
//! let machine = Machine::compile(&doc).unwrap();
//! let result = tokio::runtime::Runtime::new().unwrap().block_on(async {
//!     execute(&machine, json!(null), &Execution::default()).await
//! });
//! assert_eq!(result.output, json!("hello"));
//! ```
//!
//! `Task` states need a [`TaskInvoker`](invoker::TaskInvoker) (or an
//! [`OverrideTable`](invoker::OverrideTable) entry) to resolve their
//! `Resource`; without one, every `Task` fails with
//! `States.TaskPermissions`.

pub mod choice;
pub mod definition;
pub mod engine;
pub mod error;
pub mod invoker;
pub mod jsonpath;
pub mod runtime;

pub use definition::Machine;
pub use engine::{execute, Execution, ExecutionResult, Status};
pub use error::{MachineError, ValidationError, ValidationErrors};
