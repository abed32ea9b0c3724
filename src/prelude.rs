//! Library functions written in the language itself.
//!
//! The bundled source lives in `prelude.bdl` and is compiled into the crate.
//! Hosts can substitute their own through
//! [`InterpreterConfig::with_prelude`](crate::InterpreterConfig::with_prelude).

use crate::Error;
use crate::evaluator::{Context, Env, Environment, Unwind, evaluate};
use crate::reader::read;

/// Source of the bundled prelude
pub const PRELUDE_SOURCE: &str = include_str!("prelude.bdl");

/// Evaluate `source` into a new frame on top of `builtins`.
///
/// Any failure is reported as [`Error::Prelude`]. An `exit` at the top level
/// ends loading early.
pub(crate) fn load(source: &str, builtins: &Env, max_depth: usize) -> Result<Env, Error> {
    let program = read(source).map_err(|e| Error::Prelude(Box::new(e)))?;
    let frame = Environment::child(builtins);
    let ctx = Context::new(frame.clone(), max_depth);

    for node in &program {
        match evaluate(node, &ctx) {
            Ok(_) => {}
            Err(Unwind::Exit(_)) => {
                tracing::debug!(at = %node.location, "prelude exited early");
                break;
            }
            Err(Unwind::Fail(e)) => return Err(Error::Prelude(Box::new(e))),
        }
    }

    tracing::debug!(definitions = frame.len(), "prelude loaded");
    Ok(frame)
}
