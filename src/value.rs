//! Runtime values produced by evaluation.
//!
//! [`Value`] covers the data types of the language (numbers, strings,
//! booleans, nil, sequences and maps) plus the three kinds of callables:
//! user closures, entries of the builtin table and host-provided native
//! functions. Conversion traits from common Rust types make it easy to build
//! values from literals, arrays and vectors.

use crate::Error;
use crate::ast::Node;
use crate::builtinops::{Arity, BuiltinOp};
use crate::evaluator::{Context, Env, EvalResult, evaluate_all};
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Ordered sequence, the result of a vector literal
    Seq(Vec<Value>),
    Map(MapValue),
    /// User-defined function created by `fn` or `defn`
    Function(Rc<Closure>),
    /// Entry of the builtin table
    Builtin(&'static BuiltinOp),
    /// Host-provided function, or a function built at runtime by `partial`
    Native(NativeFunction),
}

impl Value {
    /// Only `false` and `nil` are falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Seq(_) => "vec",
            Value::Map(_) => "map",
            Value::Function(_) | Value::Builtin(_) | Value::Native(_) => "function",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Function(_) | Value::Builtin(_) | Value::Native(_)
        )
    }

    /// True when this value is, or contains, a callable.
    pub fn holds_callable(&self) -> bool {
        match self {
            Value::Function(_) | Value::Builtin(_) | Value::Native(_) => true,
            Value::Seq(items) => items.iter().any(Value::holds_callable),
            Value::Map(map) => map
                .iter()
                .any(|(k, v)| k.holds_callable() || v.holds_callable()),
            _ => false,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view of the value; integers are widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapValue> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Textual form used by `join`: strings are inserted raw, everything
    /// else uses its printed representation.
    pub fn to_text(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Association list with structural keys.
///
/// Inserting an existing key replaces its value in place, so the first
/// occurrence fixes the position and the last one wins the value. Equality
/// ignores entry order.
#[derive(Clone, Default)]
pub struct MapValue {
    entries: Vec<(Value, Value)>,
}

impl MapValue {
    pub fn new() -> Self {
        MapValue::default()
    }

    pub fn insert(&mut self, key: Value, value: Value) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}

impl PartialEq for MapValue {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key).is_some_and(|v| v == value))
    }
}

impl FromIterator<(Value, Value)> for MapValue {
    fn from_iter<I: IntoIterator<Item = (Value, Value)>>(iter: I) -> Self {
        let mut map = MapValue::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

/// Formal parameter list of a closure.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Params {
    pub(crate) fixed: Vec<String>,
    /// Collects the arguments beyond `fixed` into a sequence
    pub(crate) rest: Option<String>,
}

impl Params {
    pub fn arity(&self) -> Arity {
        match self.rest {
            Some(_) => Arity::AtLeast(self.fixed.len()),
            None => Arity::Exact(self.fixed.len()),
        }
    }
}

/// A function value closing over its defining environment.
pub struct Closure {
    pub(crate) name: Option<String>,
    pub(crate) params: Params,
    pub(crate) body: Vec<Rc<Node>>,
    pub(crate) env: Env,
}

impl Closure {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Name used in arity errors.
    pub(crate) fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("fn")
    }
}

/// Signature shared by special forms and native functions: unevaluated
/// argument nodes, the call node, and the caller's context.
pub type NativeFn = dyn Fn(&[Rc<Node>], &Node, &Context) -> EvalResult;

#[derive(Clone)]
pub struct NativeFunction {
    name: Rc<str>,
    func: Rc<NativeFn>,
}

impl NativeFunction {
    /// A native function that receives its arguments unevaluated.
    pub fn new(
        name: impl Into<Rc<str>>,
        func: impl Fn(&[Rc<Node>], &Node, &Context) -> EvalResult + 'static,
    ) -> Self {
        NativeFunction {
            name: name.into(),
            func: Rc::new(func),
        }
    }

    /// A native function over evaluated arguments.
    ///
    /// Errors returned by `func` surface as [`Error::Host`] at the location
    /// of the call.
    pub fn eager<F, E>(name: impl Into<Rc<str>>, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, E> + 'static,
        E: fmt::Display,
    {
        NativeFunction::new(name, move |args, node, ctx| {
            let values = evaluate_all(args, ctx)?;
            func(&values).map_err(|e| {
                Error::Host {
                    message: e.to_string(),
                    location: node.location,
                }
                .into()
            })
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn call(&self, args: &[Rc<Node>], node: &Node, ctx: &Context) -> EvalResult {
        (self.func)(args, node, ctx)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                cmp_int_float(*a, *b) == Some(Ordering::Equal)
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Seq(a), Value::Seq(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a.id == b.id,
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(&a.func, &b.func),
            _ => false,
        }
    }
}

/// Exact ordering of an int against a float, without rounding the int.
/// `None` when `b` is NaN.
pub(crate) fn cmp_int_float(a: i64, b: f64) -> Option<Ordering> {
    // 2^63, the first float above i64::MAX
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if b.is_nan() {
        return None;
    }
    if b >= LIMIT {
        return Some(Ordering::Less);
    }
    if b < -LIMIT {
        return Some(Ordering::Greater);
    }
    let whole = b.trunc();
    // In range, so the cast is exact
    match a.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0_f64.partial_cmp(&(b - whole)),
        unequal => Some(unequal),
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for ch in s.chars() {
        match ch {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "\"")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{n:?}"),
            Value::String(s) => write_escaped(f, s),
            Value::Seq(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key} {value}")?;
                }
                write!(f, "}}")
            }
            Value::Function(closure) => match closure.name() {
                Some(name) => write!(f, "#<fn {name}>"),
                None => write!(f, "#<fn>"),
            },
            Value::Builtin(op) => write!(f, "#<builtin {}>", op.id),
            Value::Native(native) => write!(f, "#<native {}>", native.name()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(n) => write!(f, "Float({n:?})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Seq(items) => f.debug_tuple("Seq").field(items).finish(),
            Value::Map(map) => f.debug_map().entries(map.iter()).finish(),
            Value::Function(closure) => write!(
                f,
                "Function(name={:?}, params={:?})",
                closure.name, closure.params
            ),
            Value::Builtin(op) => write!(f, "Builtin({})", op.id),
            Value::Native(native) => write!(f, "Native({})", native.name()),
        }
    }
}

impl fmt::Debug for MapValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Int(i64::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(i64);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl From<MapValue> for Value {
    fn from(map: MapValue) -> Self {
        Value::Map(map)
    }
}

impl From<NativeFunction> for Value {
    fn from(native: NativeFunction) -> Self {
        Value::Native(native)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Nil, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Seq(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::Seq(arr.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value> + Clone> From<&[T]> for Value {
    fn from(slice: &[T]) -> Self {
        Value::Seq(slice.iter().cloned().map(Into::into).collect())
    }
}
