//! Property-based tests for the primitives and the reader.

use bedlam::{Bindings, Error, Interpreter, Value};
use proptest::prelude::*;

fn eval(source: &str, scope: Bindings) -> Result<Value, Error> {
    Interpreter::new()?.run(source, scope)
}

fn ints(xs: &[i64]) -> Value {
    Value::Seq(xs.iter().copied().map(Value::Int).collect())
}

/// Strategy for printable values that read back as themselves
fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Nil),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        "[a-zA-Z0-9 _.-]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop::collection::vec(inner, 0..4).prop_map(Value::Seq)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn addition_is_checked(a in any::<i64>(), b in any::<i64>()) {
        let result = eval("(+ a b)", Bindings::new().with("a", a).with("b", b));
        match a.checked_add(b) {
            Some(sum) => prop_assert_eq!(result, Ok(Value::Int(sum))),
            None => prop_assert!(
                matches!(result, Err(Error::IntegerOverflow { .. })),
                "got {:?}",
                result
            ),
        }
    }

    #[test]
    fn subtraction_and_multiplication_are_checked(a in any::<i64>(), b in any::<i64>()) {
        let scope = Bindings::new().with("a", a).with("b", b);
        let result = eval("(- a b)", scope.clone());
        match a.checked_sub(b) {
            Some(diff) => prop_assert_eq!(result, Ok(Value::Int(diff))),
            None => prop_assert!(
                matches!(result, Err(Error::IntegerOverflow { .. })),
                "got {:?}",
                result
            ),
        }
        let result = eval("(* a b)", scope);
        match a.checked_mul(b) {
            Some(product) => prop_assert_eq!(result, Ok(Value::Int(product))),
            None => prop_assert!(
                matches!(result, Err(Error::IntegerOverflow { .. })),
                "got {:?}",
                result
            ),
        }
    }

    #[test]
    fn division_is_true_division(a in -10_000i64..10_000, b in -100i64..100) {
        let result = eval("(/ a b)", Bindings::new().with("a", a).with("b", b));
        if b == 0 {
            prop_assert!(
                matches!(result, Err(Error::DivisionByZero { .. })),
                "got {:?}",
                result
            );
        } else {
            prop_assert_eq!(result, Ok(Value::Float(a as f64 / b as f64)));
        }
    }

    #[test]
    fn comparisons_agree_with_integers(a in any::<i64>(), b in any::<i64>()) {
        let scope = Bindings::new().with("a", a).with("b", b);
        let result = eval("[(< a b) (> a b) (= a b) (<= a b) (>= a b) (!= a b)]", scope);
        prop_assert_eq!(
            result,
            Ok(Value::from([a < b, a > b, a == b, a <= b, a >= b, a != b]))
        );
    }

    #[test]
    fn slice_splits_at_any_index(xs in prop::collection::vec(-50i64..50, 0..10), k in -15i64..15) {
        let scope = Bindings::new().with("xs", ints(&xs)).with("k", k);
        let result = eval("[(slice xs 0 k) (slice xs k)]", scope);
        let Ok(Value::Seq(parts)) = result else {
            return Err(TestCaseError::fail(format!("unexpected result {result:?}")));
        };
        let mut joined = Vec::new();
        for part in parts {
            let Value::Seq(items) = part else {
                return Err(TestCaseError::fail(format!("slice returned {part}")));
            };
            joined.extend(items);
        }
        prop_assert_eq!(Value::Seq(joined), ints(&xs));
    }

    #[test]
    fn reversed_slice_reverses(xs in prop::collection::vec(any::<i64>(), 0..10)) {
        let result = eval("(slice xs nil nil -1)", Bindings::new().with("xs", ints(&xs)));
        let reversed: Vec<i64> = xs.iter().rev().copied().collect();
        prop_assert_eq!(result, Ok(ints(&reversed)));
    }

    #[test]
    fn folds_agree_with_apply(xs in prop::collection::vec(-1000i64..1000, 0..12)) {
        let scope = Bindings::new().with("xs", ints(&xs));
        let result = eval("[(reduce + 0 xs) (apply + xs) (sum xs) (count xs)]", scope);
        let total: i64 = xs.iter().sum();
        prop_assert_eq!(
            result,
            Ok(ints(&[total, total, total, xs.len() as i64]))
        );
    }

    #[test]
    fn printed_values_read_back(value in arb_value()) {
        let source = value.to_string();
        prop_assert_eq!(eval(&source, Bindings::new()), Ok(value), "source: {}", source);
    }
}
