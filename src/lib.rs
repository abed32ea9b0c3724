//! Bedlam - a small embeddable Lisp-family scripting language
//!
//! The syntax is reduced to calls, vectors, maps and atoms:
//!
//! ```text
//! (defn square [x] (* x x))
//! (let [xs [1 2 3]]
//!   (map square xs))          ; [1 4 9]
//! (case (nth xs 0) 1 "one" "other")
//! ```
//!
//! Programs are evaluated by a tree-walking interpreter with lexical scoping and
//! closures. Callables receive their argument *nodes* unevaluated and decide for
//! themselves when to evaluate them, which is what lets `if`, `let`, `case` and
//! friends be ordinary entries in the builtin table rather than evaluator
//! special cases.
//!
//! ## Embedding
//!
//! ```
//! use bedlam::{Bindings, Interpreter, Value};
//!
//! let interpreter = Interpreter::new()?;
//! let scope = Bindings::new().with("limit", Value::Int(3));
//! let result = interpreter.run("(filter (fn [x] (< x limit)) [1 2 3 4])", scope)?;
//! assert_eq!(result, Value::from([1, 2]));
//! # Ok::<(), bedlam::Error>(())
//! ```
//!
//! ## Modules
//!
//! - `ast`: the node sum type consumed by the evaluator
//! - `reader`: source text to AST nodes
//! - `value`: runtime values
//! - `evaluator`: environments, dispatch and special forms
//! - `builtinops`: the builtin table (special forms and primitives)
//! - `prelude`: library functions written in the language itself
//! - `interpreter`: the embedding entry points
//! - `json`: JSON wire format for ASTs, scopes and results (feature `json`)

use crate::ast::Location;
use crate::builtinops::Arity;

/// Maximum nesting depth accepted by the reader
pub const MAX_PARSE_DEPTH: usize = 128;

/// Default maximum evaluation depth before a program is aborted with
/// [`Error::DepthLimitExceeded`]
pub const DEFAULT_MAX_EVAL_DEPTH: usize = 10_000;

/// Categorizes the different kinds of reader failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (bad tokens, unbalanced delimiters)
    InvalidSyntax,
    /// Input ended before the expression was complete
    Incomplete,
    /// Expression nesting exceeded [`MAX_PARSE_DEPTH`]
    TooDeeplyNested,
    /// Implementation-imposed limit exceeded (integer literal out of range)
    ImplementationLimit,
}

/// A reader failure with the position it was detected at.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} (at {location})")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    pub location: Location,
    /// The problematic character, if any was left in the input
    pub found: Option<char>,
}

impl ParseError {
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        location: Location,
        found: Option<char>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            location,
            found,
        }
    }
}

/// Error types for the interpreter.
///
/// Every evaluation error carries the location of the node that raised it.
/// The `exit` form is not an error: it travels as
/// [`evaluator::Unwind::Exit`] and is consumed by the driver.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("ParseError: {0}")]
    Parse(#[from] ParseError),

    #[error("InvalidAst: {0}")]
    InvalidAst(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("ArityError: {form} expected {expected} arguments, got {got} (at {location})")]
    Arity {
        form: String,
        expected: Arity,
        got: usize,
        location: Location,
    },

    #[error("Unable to resolve name {name} (at {location})")]
    UnresolvedName { name: String, location: Location },

    #[error("{callee} is not a function (at {location})")]
    NotCallable { callee: String, location: Location },

    #[error("Invalid function parameter: {message} (at {location})")]
    InvalidParameter { message: String, location: Location },

    #[error("Case failed to match (at {location})")]
    CaseFailed { location: Location },

    #[error("Division by zero (at {location})")]
    DivisionByZero { location: Location },

    #[error("Type error: {message} (at {location})")]
    TypeError { message: String, location: Location },

    #[error("Index {index} out of range for sequence of length {len} (at {location})")]
    IndexOutOfRange {
        index: i64,
        len: usize,
        location: Location,
    },

    #[error("Integer overflow in {op} (at {location})")]
    IntegerOverflow { op: &'static str, location: Location },

    #[error("Evaluation depth limit exceeded (max: {limit}) (at {location})")]
    DepthLimitExceeded { limit: usize, location: Location },

    #[error("{message} (at {location})")]
    Host { message: String, location: Location },

    #[error("Prelude failed to load: {0}")]
    Prelude(Box<Error>),
}

impl Error {
    pub(crate) fn type_error(message: impl Into<String>, location: Location) -> Self {
        Error::TypeError {
            message: message.into(),
            location,
        }
    }

    pub(crate) fn invalid_parameter(message: impl Into<String>, location: Location) -> Self {
        Error::InvalidParameter {
            message: message.into(),
            location,
        }
    }

    /// Source location of the node that raised this error, if any
    pub fn location(&self) -> Option<Location> {
        match self {
            Error::Parse(e) => Some(e.location),
            Error::Arity { location, .. }
            | Error::UnresolvedName { location, .. }
            | Error::NotCallable { location, .. }
            | Error::InvalidParameter { location, .. }
            | Error::CaseFailed { location }
            | Error::DivisionByZero { location }
            | Error::TypeError { location, .. }
            | Error::IndexOutOfRange { location, .. }
            | Error::IntegerOverflow { location, .. }
            | Error::DepthLimitExceeded { location, .. }
            | Error::Host { location, .. } => Some(*location),
            Error::Prelude(inner) => inner.location(),
            Error::InvalidAst(_) | Error::Json(_) => None,
        }
    }

    /// True for failures caused by exhausting interpreter resources rather
    /// than by the program's semantics.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, Error::DepthLimitExceeded { .. })
    }
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod interpreter;
pub mod prelude;
pub mod reader;
pub mod value;

#[cfg(feature = "json")]
pub mod json;

mod stack;

pub use ast::Node;
pub use evaluator::{Context, Environment, Unwind};
pub use interpreter::{Bindings, Interpreter, InterpreterConfig, Session};
pub use value::Value;

/// Interpret an already-read program with a fresh default [`Interpreter`].
///
/// Hosts running many programs should build one `Interpreter` and reuse it,
/// which loads the prelude only once.
pub fn interpret(program: &[Node], scope: Bindings) -> Result<Value, Error> {
    Interpreter::new()?.interpret(program, scope)
}

/// Read and interpret `source` with a fresh default [`Interpreter`].
pub fn run(source: &str, scope: Bindings) -> Result<Value, Error> {
    Interpreter::new()?.run(source, scope)
}
