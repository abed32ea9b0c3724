//! Embedding entry points: configuration, initial scopes and the driver.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::builtinops::install_builtins;
use crate::evaluator::{Context, Env, Environment, EvalResult, Unwind, evaluate, release_frame};
use crate::value::NativeFunction;
use crate::{DEFAULT_MAX_EVAL_DEPTH, Error, Node, Value, prelude, reader};

/// Interpreter settings.
///
/// Under the `json` feature this deserializes from an object such as
/// `{"max_eval_depth": 500}`; omitted fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Deserialize), serde(default))]
pub struct InterpreterConfig {
    /// Nesting depth at which evaluation fails with
    /// [`Error::DepthLimitExceeded`]
    pub max_eval_depth: usize,
    /// Replacement prelude source; `None` loads the bundled one
    pub prelude: Option<String>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            max_eval_depth: DEFAULT_MAX_EVAL_DEPTH,
            prelude: None,
        }
    }
}

impl InterpreterConfig {
    pub fn with_max_eval_depth(mut self, max_eval_depth: usize) -> Self {
        self.max_eval_depth = max_eval_depth;
        self
    }

    pub fn with_prelude(mut self, source: impl Into<String>) -> Self {
        self.prelude = Some(source.into());
        self
    }
}

/// The initial scope of a program run.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: HashMap<String, Value>,
}

impl Bindings {
    pub fn new() -> Self {
        Bindings::default()
    }

    /// Builder-style [`Bindings::insert`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Bind a host function that receives its arguments already evaluated.
    /// An `Err` it returns surfaces as [`Error::Host`] at the call site.
    pub fn insert_fn<F, E>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(&[Value]) -> Result<Value, E> + 'static,
        E: fmt::Display,
    {
        let name = name.into();
        let native = NativeFunction::eager(name.as_str(), func);
        self.values.insert(name, Value::Native(native));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Bindings {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A loaded interpreter: the builtin frame plus the evaluated prelude.
///
/// Build one and reuse it across programs; each run gets its own top frame
/// so definitions made by one program are invisible to the next.
pub struct Interpreter {
    config: InterpreterConfig,
    builtins: Env,
    prelude: Env,
}

impl Interpreter {
    /// Interpreter with the default configuration and bundled prelude
    pub fn new() -> Result<Self, Error> {
        Interpreter::with_config(InterpreterConfig::default())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(max_eval_depth = config.max_eval_depth))]
    pub fn with_config(config: InterpreterConfig) -> Result<Self, Error> {
        let builtins = Environment::root();
        install_builtins(&builtins);

        let source = config.prelude.as_deref().unwrap_or(prelude::PRELUDE_SOURCE);
        let prelude = prelude::load(source, &builtins, config.max_eval_depth)?;

        Ok(Interpreter {
            config,
            builtins,
            prelude,
        })
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// The frame holding the builtin operations and constants
    pub fn builtins(&self) -> &Env {
        &self.builtins
    }

    /// The frame holding the prelude definitions; its parent is
    /// [`Interpreter::builtins`]
    pub fn prelude(&self) -> &Env {
        &self.prelude
    }

    /// Evaluate `program` top to bottom in a fresh frame holding `scope`.
    ///
    /// Returns the value of the last form (nil for an empty program), or the
    /// value passed to `exit`.
    pub fn interpret(&self, program: &[Node], scope: Bindings) -> Result<Value, Error> {
        let frame = Environment::with_bindings(&self.prelude, scope.values);
        let outcome = self.evaluate_program(program, &frame);
        release_frame(&frame, &outcome);
        settle(outcome)
    }

    /// A session whose definitions persist from one program to the next.
    pub fn session(&self, scope: Bindings) -> Session<'_> {
        Session {
            interpreter: self,
            frame: Environment::with_bindings(&self.prelude, scope.values),
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(forms = program.len()))]
    fn evaluate_program(&self, program: &[Node], frame: &Env) -> EvalResult {
        let ctx = Context::new(Rc::clone(frame), self.config.max_eval_depth);
        let mut last = Value::Nil;
        for node in program {
            last = evaluate(node, &ctx)?;
        }
        Ok(last)
    }

    /// Read `source` and interpret it.
    pub fn run(&self, source: &str, scope: Bindings) -> Result<Value, Error> {
        let program = reader::read(source)?;
        self.interpret(&program, scope)
    }
}

fn settle(outcome: EvalResult) -> Result<Value, Error> {
    let result = outcome.or_else(Unwind::into_result);
    if let Err(e) = &result {
        tracing::debug!(error = %e, "program failed");
    }
    result
}

/// A program frame kept across runs, created by [`Interpreter::session`].
///
/// Dropping the session releases everything it defined.
pub struct Session<'i> {
    interpreter: &'i Interpreter,
    frame: Env,
}

impl Session<'_> {
    /// Like [`Interpreter::interpret`], in this session's frame.
    pub fn interpret(&self, program: &[Node]) -> Result<Value, Error> {
        settle(self.interpreter.evaluate_program(program, &self.frame))
    }

    pub fn run(&self, source: &str) -> Result<Value, Error> {
        self.interpret(&reader::read(source)?)
    }

    /// The session's frame; its parent is [`Interpreter::prelude`]
    pub fn frame(&self) -> &Env {
        &self.frame
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.frame.clear();
    }
}

impl fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("names", &self.frame.local_names())
            .finish()
    }
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("config", &self.config)
            .field("builtins", &self.builtins.len())
            .field("prelude", &self.prelude.local_names())
            .finish()
    }
}

impl Drop for Interpreter {
    // Prelude closures capture the prelude frame, so it would otherwise keep
    // itself alive.
    fn drop(&mut self) {
        self.prelude.clear();
    }
}
