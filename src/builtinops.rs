//! Built-in operations registry.
//!
//! Every name bound in the root scope of an interpreter comes from the static
//! [`BUILTIN_OPS`] table, so the whole builtin surface can be audited in one
//! place. An entry is either a special form, which receives its argument nodes
//! unevaluated together with the caller's context, or a primitive function,
//! which receives evaluated arguments.
//!
//! ## Functions vs Special Forms
//!
//! - **Functions**: evaluate all arguments before application (`+`, `nth`,
//!   `and`, ...). Note that `and`/`or` are eager: every operand is evaluated
//!   before the result is picked.
//! - **Special Forms**: control evaluation of their arguments (`if`, `let`,
//!   `case`, `reduce`, ...). They live in [`crate::evaluator`].
//!
//! ## Numeric Rules
//!
//! - Integer arithmetic is overflow-checked and reports [`Error::IntegerOverflow`]
//! - A float operand anywhere promotes the result to a float
//! - `/` is true division and always produces a float
//!
//! ## Adding New Operations
//!
//! 1. Implement `fn(&[Value], Location) -> Result<Value, Error>` (or a special
//!    form in the evaluator)
//! 2. Add an entry to [`BUILTIN_OPS`] with its arity
//! 3. Add rows to the test tables below

use crate::Error;
use crate::ast::{Location, Node};
use crate::evaluator::{
    Context, Env, EvalResult, eval_apply, eval_case, eval_defn, eval_exit, eval_filter, eval_fn,
    eval_if, eval_let, eval_map, eval_partial, eval_reduce, eval_when, evaluate_all,
};
use crate::value::{Value, cmp_int_float};
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

/// Expected number of arguments for a callable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly n arguments
    Exact(usize),
    /// At least n arguments
    AtLeast(usize),
    /// Between min and max arguments (inclusive)
    Range(usize, usize),
    /// Any number of arguments
    Any,
}

impl Arity {
    pub fn accepts(self, got: usize) -> bool {
        match self {
            Arity::Exact(n) => got == n,
            Arity::AtLeast(n) => got >= n,
            Arity::Range(min, max) => (min..=max).contains(&got),
            Arity::Any => true,
        }
    }

    /// Check `got` against this arity, naming `form` in the error.
    pub fn validate(self, form: &str, got: usize, location: Location) -> Result<(), Error> {
        if self.accepts(got) {
            Ok(())
        } else {
            Err(Error::Arity {
                form: form.to_owned(),
                expected: self,
                got,
                location,
            })
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "exactly {n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(min, max) => write!(f, "between {min} and {max}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// Primitive over evaluated arguments
pub type PrimitiveFn = fn(&[Value], Location) -> Result<Value, Error>;

/// Special form over unevaluated argument nodes
pub type SpecialFormFn = fn(&[Rc<Node>], &Node, &Context) -> EvalResult;

/// Represents the implementation of a built-in (function or special form)
#[derive(Clone, Copy)]
pub enum OpKind {
    Function(PrimitiveFn),
    SpecialForm(SpecialFormFn),
}

impl fmt::Debug for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug)]
pub struct BuiltinOp {
    /// Name the operation is bound to in the root scope
    pub id: &'static str,
    pub op_kind: OpKind,
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl BuiltinOp {
    pub fn is_special_form(&self) -> bool {
        matches!(self.op_kind, OpKind::SpecialForm(_))
    }

    pub(crate) fn invoke(&self, args: &[Rc<Node>], node: &Node, ctx: &Context) -> EvalResult {
        self.arity.validate(self.id, args.len(), node.location)?;
        match self.op_kind {
            OpKind::Function(f) => {
                let values = evaluate_all(args, ctx)?;
                Ok(f(&values, node.location)?)
            }
            OpKind::SpecialForm(f) => f(args, node, ctx),
        }
    }
}

//
// Builtin Function Implementations
//

fn fixed_args<'a, const N: usize>(
    op: &str,
    args: &'a [Value],
    location: Location,
) -> Result<&'a [Value; N], Error> {
    args.try_into().map_err(|_| Error::Arity {
        form: op.to_owned(),
        expected: Arity::Exact(N),
        got: args.len(),
        location,
    })
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn from_value(value: &Value, op: &str, location: Location) -> Result<Num, Error> {
        match value {
            Value::Int(n) => Ok(Num::Int(*n)),
            Value::Float(n) => Ok(Num::Float(*n)),
            other => Err(Error::type_error(
                format!("{op} expects numbers, got {}", other.type_name()),
                location,
            )),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Float(n) => n,
        }
    }
}

impl From<Num> for Value {
    fn from(n: Num) -> Self {
        match n {
            Num::Int(n) => Value::Int(n),
            Num::Float(n) => Value::Float(n),
        }
    }
}

fn arith(
    op: &'static str,
    a: Num,
    b: Num,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
    location: Location,
) -> Result<Num, Error> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => int_op(x, y)
            .map(Num::Int)
            .ok_or(Error::IntegerOverflow { op, location }),
        _ => Ok(Num::Float(float_op(a.as_f64(), b.as_f64()))),
    }
}

fn builtin_add(args: &[Value], location: Location) -> Result<Value, Error> {
    args.iter()
        .try_fold(Num::Int(0), |acc, v| {
            let n = Num::from_value(v, "+", location)?;
            arith("+", acc, n, i64::checked_add, |x, y| x + y, location)
        })
        .map(Value::from)
}

fn builtin_sub(args: &[Value], location: Location) -> Result<Value, Error> {
    let [a, b] = fixed_args::<2>("-", args, location)?;
    let a = Num::from_value(a, "-", location)?;
    let b = Num::from_value(b, "-", location)?;
    arith("-", a, b, i64::checked_sub, |x, y| x - y, location).map(Value::from)
}

fn builtin_mul(args: &[Value], location: Location) -> Result<Value, Error> {
    args.iter()
        .try_fold(Num::Int(1), |acc, v| {
            let n = Num::from_value(v, "*", location)?;
            arith("*", acc, n, i64::checked_mul, |x, y| x * y, location)
        })
        .map(Value::from)
}

fn builtin_div(args: &[Value], location: Location) -> Result<Value, Error> {
    let [a, b] = fixed_args::<2>("/", args, location)?;
    let a = Num::from_value(a, "/", location)?.as_f64();
    let b = Num::from_value(b, "/", location)?.as_f64();
    if b == 0.0 {
        return Err(Error::DivisionByZero { location });
    }
    Ok(Value::Float(a / b))
}

/// Numbers compare numerically, strings lexicographically. NaN is unordered.
fn compare(a: &Value, b: &Value, op: &str, location: Location) -> Result<Option<Ordering>, Error> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Some(x.cmp(y))),
        (Value::String(x), Value::String(y)) => Ok(Some(x.cmp(y))),
        (Value::Float(x), Value::Float(y)) => Ok(x.partial_cmp(y)),
        (Value::Int(x), Value::Float(y)) => Ok(cmp_int_float(*x, *y)),
        (Value::Float(x), Value::Int(y)) => Ok(cmp_int_float(*y, *x).map(Ordering::reverse)),
        _ => Err(Error::type_error(
            format!(
                "cannot compare {} and {} with {op}",
                a.type_name(),
                b.type_name()
            ),
            location,
        )),
    }
}

// Macro to generate the ordering comparisons
macro_rules! comparison {
    ($name:ident, $op_str:expr, $ordering:pat) => {
        fn $name(args: &[Value], location: Location) -> Result<Value, Error> {
            let [a, b] = fixed_args::<2>($op_str, args, location)?;
            let ordering = compare(a, b, $op_str, location)?;
            Ok(Value::Bool(matches!(ordering, Some($ordering))))
        }
    };
}

comparison!(builtin_gt, ">", Ordering::Greater);
comparison!(builtin_lt, "<", Ordering::Less);

fn builtin_eq(args: &[Value], location: Location) -> Result<Value, Error> {
    let [a, b] = fixed_args::<2>("=", args, location)?;
    Ok(Value::Bool(a == b))
}

/// First falsy operand, else the last operand; `(and)` is true.
fn builtin_and(args: &[Value], _location: Location) -> Result<Value, Error> {
    Ok(args
        .iter()
        .find(|v| !v.is_truthy())
        .or(args.last())
        .cloned()
        .unwrap_or(Value::Bool(true)))
}

/// First truthy operand, else the last operand; `(or)` is nil.
fn builtin_or(args: &[Value], _location: Location) -> Result<Value, Error> {
    Ok(args
        .iter()
        .find(|v| v.is_truthy())
        .or(args.last())
        .cloned()
        .unwrap_or(Value::Nil))
}

fn builtin_not(args: &[Value], location: Location) -> Result<Value, Error> {
    let [value] = fixed_args::<1>("not", args, location)?;
    Ok(Value::Bool(!value.is_truthy()))
}

fn seq_arg<'a>(value: &'a Value, op: &str, location: Location) -> Result<&'a [Value], Error> {
    value.as_seq().ok_or_else(|| {
        Error::type_error(
            format!("{op} expects a vec, got {}", value.type_name()),
            location,
        )
    })
}

/// Resolve a possibly negative index against `len`.
fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let resolved = if index < 0 { index.checked_add(len)? } else { index };
    usize::try_from(resolved).ok()
}

fn builtin_nth(args: &[Value], location: Location) -> Result<Value, Error> {
    let [seq, index] = fixed_args::<2>("nth", args, location)?;
    let items = seq_arg(seq, "nth", location)?;
    let index = index.as_int().ok_or_else(|| {
        Error::type_error(
            format!("nth index must be an int, got {}", index.type_name()),
            location,
        )
    })?;
    resolve_index(index, items.len())
        .and_then(|i| items.get(i))
        .cloned()
        .ok_or(Error::IndexOutOfRange {
            index,
            len: items.len(),
            location,
        })
}

/// Indices selected by a slice with Python semantics: negative bounds count
/// from the end, out-of-range bounds are clamped, omitted bounds default by
/// the direction of `step`.
fn slice_indices(len: usize, start: Option<i64>, stop: Option<i64>, step: i64) -> Vec<i64> {
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let (lower, upper) = if step > 0 { (0, len) } else { (-1, len - 1) };
    let clamp = |bound: i64| {
        if bound < 0 {
            bound.saturating_add(len).max(lower)
        } else {
            bound.min(upper)
        }
    };
    let start = start.map_or(if step > 0 { lower } else { upper }, clamp);
    let stop = stop.map_or(if step > 0 { upper } else { lower }, clamp);

    let mut indices = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        indices.push(i);
        match i.checked_add(step) {
            Some(next) => i = next,
            None => break,
        }
    }
    indices
}

fn builtin_slice(args: &[Value], location: Location) -> Result<Value, Error> {
    let Some((seq, bounds)) = args.split_first() else {
        return Err(Error::Arity {
            form: "slice".to_owned(),
            expected: Arity::Range(2, 4),
            got: 0,
            location,
        });
    };
    let items = seq_arg(seq, "slice", location)?;
    let bound = |i: usize| match bounds.get(i) {
        None | Some(Value::Nil) => Ok(None),
        Some(Value::Int(n)) => Ok(Some(*n)),
        Some(other) => Err(Error::type_error(
            format!("slice bounds must be ints or nil, got {}", other.type_name()),
            location,
        )),
    };

    let step = bound(2)?.unwrap_or(1);
    if step == 0 {
        return Err(Error::type_error("slice step cannot be zero", location));
    }
    let selected = slice_indices(items.len(), bound(0)?, bound(1)?, step)
        .into_iter()
        .filter_map(|i| usize::try_from(i).ok().and_then(|i| items.get(i)).cloned())
        .collect();
    Ok(Value::Seq(selected))
}

fn builtin_join(args: &[Value], location: Location) -> Result<Value, Error> {
    let Some((separator, values)) = args.split_first() else {
        return Err(Error::Arity {
            form: "join".to_owned(),
            expected: Arity::AtLeast(1),
            got: 0,
            location,
        });
    };
    let Some(separator) = separator.as_str() else {
        return Err(Error::type_error(
            format!("join separator must be a string, got {}", separator.type_name()),
            location,
        ));
    };
    let parts: Vec<String> = values.iter().map(Value::to_text).collect();
    Ok(Value::String(parts.join(separator)))
}

/// Registry of all built-in operations, in the order they are bound.
pub static BUILTIN_OPS: [BuiltinOp; 25] = [
    // Binding and function forms
    BuiltinOp {
        id: "defn",
        op_kind: OpKind::SpecialForm(eval_defn),
        arity: Arity::AtLeast(3),
    },
    BuiltinOp {
        id: "fn",
        op_kind: OpKind::SpecialForm(eval_fn),
        arity: Arity::AtLeast(2),
    },
    BuiltinOp {
        id: "let",
        op_kind: OpKind::SpecialForm(eval_let),
        arity: Arity::AtLeast(2),
    },
    // Conditionals
    BuiltinOp {
        id: "if",
        op_kind: OpKind::SpecialForm(eval_if),
        arity: Arity::Exact(3),
    },
    BuiltinOp {
        id: "when",
        op_kind: OpKind::SpecialForm(eval_when),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: "case",
        op_kind: OpKind::SpecialForm(eval_case),
        arity: Arity::AtLeast(2),
    },
    // Higher-order helpers
    BuiltinOp {
        id: "partial",
        op_kind: OpKind::SpecialForm(eval_partial),
        arity: Arity::AtLeast(2),
    },
    BuiltinOp {
        id: "apply",
        op_kind: OpKind::SpecialForm(eval_apply),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: "map",
        op_kind: OpKind::SpecialForm(eval_map),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: "filter",
        op_kind: OpKind::SpecialForm(eval_filter),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: "reduce",
        op_kind: OpKind::SpecialForm(eval_reduce),
        arity: Arity::Exact(3),
    },
    BuiltinOp {
        id: "exit",
        op_kind: OpKind::SpecialForm(eval_exit),
        arity: Arity::Exact(1),
    },
    // Arithmetic
    BuiltinOp {
        id: "+",
        op_kind: OpKind::Function(builtin_add),
        arity: Arity::Any,
    },
    BuiltinOp {
        id: "-",
        op_kind: OpKind::Function(builtin_sub),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: "*",
        op_kind: OpKind::Function(builtin_mul),
        arity: Arity::Any,
    },
    BuiltinOp {
        id: "/",
        op_kind: OpKind::Function(builtin_div),
        arity: Arity::Exact(2),
    },
    // Comparison
    BuiltinOp {
        id: ">",
        op_kind: OpKind::Function(builtin_gt),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: "<",
        op_kind: OpKind::Function(builtin_lt),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: "=",
        op_kind: OpKind::Function(builtin_eq),
        arity: Arity::Exact(2),
    },
    // Logic
    BuiltinOp {
        id: "and",
        op_kind: OpKind::Function(builtin_and),
        arity: Arity::Any,
    },
    BuiltinOp {
        id: "or",
        op_kind: OpKind::Function(builtin_or),
        arity: Arity::Any,
    },
    BuiltinOp {
        id: "not",
        op_kind: OpKind::Function(builtin_not),
        arity: Arity::Exact(1),
    },
    // Sequences and strings
    BuiltinOp {
        id: "nth",
        op_kind: OpKind::Function(builtin_nth),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: "slice",
        op_kind: OpKind::Function(builtin_slice),
        arity: Arity::Range(2, 4),
    },
    BuiltinOp {
        id: "join",
        op_kind: OpKind::Function(builtin_join),
        arity: Arity::AtLeast(1),
    },
];

/// Constants bound next to the operations
const BUILTIN_CONSTANTS: [(&str, Value); 3] = [
    ("true", Value::Bool(true)),
    ("false", Value::Bool(false)),
    ("nil", Value::Nil),
];

/// Get all builtin operations
pub fn get_builtin_ops() -> &'static [BuiltinOp] {
    &BUILTIN_OPS
}

/// Find a builtin operation by name
pub fn find_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_OPS.iter().find(|op| op.id == id)
}

/// Bind every builtin operation and constant into `env`.
pub fn install_builtins(env: &Env) {
    for op in get_builtin_ops() {
        env.define(op.id, Value::Builtin(op));
    }
    for (name, value) in BUILTIN_CONSTANTS {
        env.define(name, value);
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    fn success<T: Into<Value>>(value: T) -> Option<Value> {
        Some(value.into())
    }

    /// Invoke a primitive through the registry with already-evaluated arguments.
    fn call_builtin(name: &str, args: &[Value]) -> Result<Value, Error> {
        let op = find_op(name).unwrap();
        op.arity.validate(op.id, args.len(), Location::default())?;
        match op.op_kind {
            OpKind::Function(func) => func(args, Location::default()),
            OpKind::SpecialForm(_) => {
                panic!("expected function builtin in tests, got special form: {name}")
            }
        }
    }

    /// Macro to create test cases, invoking builtins via the registry.
    macro_rules! test {
        ($name:expr, $args:expr, $expected:expr) => {
            ($name, call_builtin($name, $args), $expected)
        };
    }

    #[test]
    fn test_builtin_ops_registry() {
        let not_op = find_op("not").unwrap();
        assert_eq!(not_op.arity, Arity::Exact(1));
        assert!(!not_op.is_special_form());

        let if_op = find_op("if").unwrap();
        assert!(if_op.is_special_form());
        assert_eq!(if_op.arity, Arity::Exact(3));

        assert!(find_op("unknown").is_none());
        assert!(find_op("inc").is_none(), "inc lives in the prelude");

        let mut ids: Vec<_> = get_builtin_ops().iter().map(|op| op.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), BUILTIN_OPS.len(), "duplicate builtin ids");
    }

    #[test]
    fn test_install_builtins() {
        let env = crate::evaluator::Environment::root();
        install_builtins(&env);
        assert_eq!(env.get("nil"), Some(Value::Nil));
        assert_eq!(env.get("true"), Some(Value::Bool(true)));
        assert!(matches!(env.get("reduce"), Some(Value::Builtin(op)) if op.id == "reduce"));
        assert_eq!(env.len(), BUILTIN_OPS.len() + BUILTIN_CONSTANTS.len());
    }

    #[test]
    fn test_arity_display_and_validation() {
        assert_eq!(Arity::Exact(2).to_string(), "exactly 2");
        assert_eq!(Arity::AtLeast(1).to_string(), "at least 1");
        assert_eq!(Arity::Range(2, 4).to_string(), "between 2 and 4");
        assert!(Arity::Range(2, 4).accepts(4));
        assert!(!Arity::Range(2, 4).accepts(5));
        assert!(Arity::Any.accepts(0));

        let err = Arity::Exact(2)
            .validate("-", 3, Location::new(2, 5))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "ArityError: - expected exactly 2 arguments, got 3 (at line 2 column 5)"
        );
    }

    #[test]
    fn test_builtin_function_implementations() {
        type TestCase = (&'static str, Result<Value, Error>, Option<Value>);

        let test_cases: Vec<TestCase> = vec![
            // Arithmetic
            test!("+", &[], success(0)),
            test!("+", &[Value::Int(1), Value::Int(2), Value::Int(3)], success(6)),
            test!("+", &[Value::Int(1), Value::Float(0.5)], success(1.5)),
            test!("+", &[Value::Int(i64::MAX), Value::Int(1)], None),
            test!("+", &[Value::Int(1), Value::from("2")], None),
            test!("-", &[Value::Int(5), Value::Int(7)], success(-2)),
            test!("-", &[Value::Float(5.5), Value::Int(1)], success(4.5)),
            test!("-", &[Value::Int(i64::MIN), Value::Int(1)], None),
            test!("-", &[Value::Int(5)], None),
            test!("*", &[], success(1)),
            test!("*", &[Value::Int(2), Value::Int(3), Value::Int(4)], success(24)),
            test!("*", &[Value::Int(i64::MAX), Value::Int(2)], None),
            test!("/", &[Value::Int(7), Value::Int(2)], success(3.5)),
            test!("/", &[Value::Int(6), Value::Int(3)], success(2.0)),
            test!("/", &[Value::Int(1), Value::Int(0)], None),
            test!("/", &[Value::Int(1), Value::Float(0.0)], None),
            // Comparison
            test!(">", &[Value::Int(2), Value::Int(1)], success(true)),
            test!(">", &[Value::Int(1), Value::Float(1.5)], success(false)),
            test!("<", &[Value::Int(1), Value::Float(1.5)], success(true)),
            test!("<", &[Value::from("abc"), Value::from("abd")], success(true)),
            test!("<", &[Value::Float(f64::NAN), Value::Int(1)], success(false)),
            test!(">", &[Value::Int(9_007_199_254_740_993), Value::Float(9_007_199_254_740_992.0)], success(true)),
            test!("<", &[Value::Float(9_007_199_254_740_992.0), Value::Int(9_007_199_254_740_993)], success(true)),
            test!("=", &[Value::Int(9_007_199_254_740_993), Value::Float(9_007_199_254_740_992.0)], success(false)),
            test!("<", &[Value::Int(1), Value::from("a")], None),
            test!("<", &[Value::Int(1)], None),
            test!("=", &[Value::Int(1), Value::Float(1.0)], success(true)),
            test!("=", &[Value::from([1, 2]), Value::from([1, 2])], success(true)),
            test!("=", &[Value::from("a"), Value::Nil], success(false)),
            // Logic (eager, value-returning)
            test!("and", &[], success(true)),
            test!("and", &[Value::Int(1), Value::Int(2)], success(2)),
            test!("and", &[Value::Int(1), Value::Nil, Value::Int(2)], Some(Value::Nil)),
            test!("or", &[], Some(Value::Nil)),
            test!("or", &[Value::Nil, Value::Int(2)], success(2)),
            test!("or", &[Value::Nil, Value::Bool(false)], success(false)),
            test!("not", &[Value::Nil], success(true)),
            test!("not", &[Value::Int(0)], success(false)),
            // Sequences
            test!("nth", &[Value::from([10, 20, 30]), Value::Int(1)], success(20)),
            test!("nth", &[Value::from([10, 20, 30]), Value::Int(-1)], success(30)),
            test!("nth", &[Value::from([10, 20, 30]), Value::Int(3)], None),
            test!("nth", &[Value::from([10, 20, 30]), Value::Int(-4)], None),
            test!("nth", &[Value::from("abc"), Value::Int(0)], None),
            test!("nth", &[Value::from([1]), Value::from("0")], None),
            test!("slice", &[Value::from([1, 2, 3, 4]), Value::Int(1)], success([2, 3, 4])),
            test!(
                "slice",
                &[Value::from([1, 2, 3, 4]), Value::Int(1), Value::Int(3)],
                success([2, 3])
            ),
            test!(
                "slice",
                &[Value::from([1, 2, 3, 4]), Value::Int(-2), Value::Nil],
                success([3, 4])
            ),
            test!(
                "slice",
                &[Value::from([1, 2, 3, 4]), Value::Nil, Value::Nil, Value::Int(-1)],
                success([4, 3, 2, 1])
            ),
            test!(
                "slice",
                &[Value::from([1, 2, 3, 4, 5]), Value::Int(0), Value::Int(100), Value::Int(2)],
                success([1, 3, 5])
            ),
            test!(
                "slice",
                &[Value::from([1, 2, 3]), Value::Int(5)],
                Some(Value::Seq(vec![]))
            ),
            test!(
                "slice",
                &[Value::from([1, 2, 3]), Value::Int(0), Value::Int(3), Value::Int(0)],
                None
            ),
            test!("slice", &[Value::from([1, 2, 3]), Value::Float(1.0)], None),
            test!("slice", &[Value::from([1, 2, 3])], None),
            // Strings
            test!("join", &[Value::from(", ")], success("")),
            test!(
                "join",
                &[Value::from("-"), Value::from("a"), Value::Int(1), Value::Nil],
                success("a-1-nil")
            ),
            test!("join", &[Value::Int(1), Value::from("a")], None),
        ];

        for (name, result, expected) in test_cases {
            match (result, expected) {
                (Ok(actual), Some(expected)) => {
                    assert_eq!(actual, expected, "builtin {name}");
                }
                (Err(_), None) => {}
                (actual, expected) => {
                    panic!("builtin {name}: expected {expected:?}, got {actual:?}");
                }
            }
        }
    }

    #[test]
    fn test_error_kinds() {
        let overflow = call_builtin("*", &[Value::Int(i64::MAX), Value::Int(2)]).unwrap_err();
        assert!(matches!(overflow, Error::IntegerOverflow { op: "*", .. }));

        let zero = call_builtin("/", &[Value::Int(1), Value::Int(0)]).unwrap_err();
        assert!(matches!(zero, Error::DivisionByZero { .. }));

        let out_of_range =
            call_builtin("nth", &[Value::from([1, 2]), Value::Int(2)]).unwrap_err();
        assert!(matches!(
            out_of_range,
            Error::IndexOutOfRange {
                index: 2,
                len: 2,
                ..
            }
        ));

        let mixed = call_builtin("<", &[Value::Int(1), Value::from("a")]).unwrap_err();
        assert_eq!(
            mixed.to_string(),
            "Type error: cannot compare int and string with < (at line 1 column 0)"
        );
    }

    #[test]
    fn test_slice_indices_follow_python_rules() {
        let cases: [(usize, Option<i64>, Option<i64>, i64, Vec<i64>); 7] = [
            (5, None, None, 1, vec![0, 1, 2, 3, 4]),
            (5, Some(-3), None, 1, vec![2, 3, 4]),
            (5, Some(-100), Some(2), 1, vec![0, 1]),
            (5, None, None, -2, vec![4, 2, 0]),
            (5, Some(3), Some(0), -1, vec![3, 2, 1]),
            (5, Some(0), Some(3), -1, vec![]),
            (0, None, None, -1, vec![]),
        ];
        for (len, start, stop, step, expected) in cases {
            assert_eq!(
                slice_indices(len, start, stop, step),
                expected,
                "slice of {len} with ({start:?}, {stop:?}, {step})"
            );
        }
    }
}
