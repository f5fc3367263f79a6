//! Property-based law checks from `SPEC_FULL.md` §8.

#[macro_use]
extern crate proptest;

use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;
use stepfn::definition::Machine;
use stepfn::engine::{execute, Execution};
use stepfn::jsonpath;

/// A small recursive JSON value generator, bounded so proptest terminates
/// quickly — deep enough to exercise objects/arrays without blowing up
/// shrinking time.
fn json_value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        ".*".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
            prop::collection::hash_map(".{1,6}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(fut)
}

proptest! {
    /// Idempotence of path `"$"`: for all JSON `j`, `search("$", j) == Some(j)`.
    #[test]
    fn prop_dollar_path_is_identity(value in json_value_strategy()) {
        let path = jsonpath::compile("$.test", "$").unwrap();
        prop_assert_eq!(path.search(&value), Some(value));
    }

    /// Round-trip of Pass with Result=x: output equals x for any input.
    #[test]
    fn prop_pass_result_round_trips(result in json_value_strategy(), input in json_value_strategy()) {
        let doc = json!({
            "StartAt": "P",
            "States": {
                "P": {"Type": "Pass", "Result": result, "End": true}
            }
        });
        let machine = Machine::compile(&doc).unwrap();
        let expected = machine_pass_result(&machine);
        let out = block_on(execute(&machine, input, &Execution::default())).output;
        prop_assert_eq!(out, expected);
    }

    /// Commutativity of equality for StringEquals.
    #[test]
    fn prop_string_equals_commutes(a in ".*", b in ".*") {
        prop_assert_eq!(
            eval_string_equals(&a, &b),
            eval_string_equals(&b, &a),
        );
    }

    /// Commutativity of equality for NumericEquals.
    #[test]
    fn prop_numeric_equals_commutes(a in any::<i32>(), b in any::<i32>()) {
        prop_assert_eq!(
            eval_numeric_equals(a as f64, b as f64),
            eval_numeric_equals(b as f64, a as f64),
        );
    }

    /// Commutativity of equality for BooleanEquals.
    #[test]
    fn prop_boolean_equals_commutes(a in any::<bool>(), b in any::<bool>()) {
        prop_assert_eq!(
            eval_boolean_equals(a, b),
            eval_boolean_equals(b, a),
        );
    }
}

fn machine_pass_result(machine: &Arc<Machine>) -> Value {
    match machine.states.get(&machine.start_at).unwrap() {
        stepfn::definition::StateDefinition::Pass(p) => p.result.clone().unwrap(),
        _ => unreachable!(),
    }
}

fn choice_machine(rule: Value) -> Arc<Machine> {
    let doc = json!({
        "StartAt": "C",
        "States": {
            "C": {"Type": "Choice", "Choices": [rule]},
            "Matched": {"Type": "Succeed"}
        }
    });
    Machine::compile(&doc).unwrap()
}

fn eval_string_equals(a: &str, b: &str) -> bool {
    let machine = choice_machine(json!({"Variable": "$", "StringEquals": b, "Next": "Matched"}));
    let result = block_on(execute(&machine, json!(a), &Execution::default()));
    matches!(result.status, stepfn::engine::Status::Succeeded)
}

fn eval_numeric_equals(a: f64, b: f64) -> bool {
    let machine = choice_machine(json!({"Variable": "$", "NumericEquals": b, "Next": "Matched"}));
    let result = block_on(execute(&machine, json!(a), &Execution::default()));
    matches!(result.status, stepfn::engine::Status::Succeeded)
}

fn eval_boolean_equals(a: bool, b: bool) -> bool {
    let machine = choice_machine(json!({"Variable": "$", "BooleanEquals": b, "Next": "Matched"}));
    let result = block_on(execute(&machine, json!(a), &Execution::default()));
    matches!(result.status, stepfn::engine::Status::Succeeded)
}
