use crate::Error;
use crate::ast::{Location, Node, NodeKind, Tag};
use crate::builtinops::Arity;
use crate::stack::ensure_sufficient_stack;
use crate::value::{Closure, MapValue, NativeFunction, Params, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Shared handle to a scope frame
pub type Env = Rc<Environment>;

/// One frame of the lexical scope chain.
///
/// Frames are shared between the call that created them and every closure
/// that captured them, so bindings live behind a `RefCell`. The only mutation
/// the language performs is `defn` defining into the current frame.
#[derive(Default)]
pub struct Environment {
    bindings: RefCell<HashMap<String, Value>>,
    parent: Option<Env>,
}

impl Environment {
    /// A frame with no parent.
    pub fn root() -> Env {
        Rc::new(Environment::default())
    }

    pub fn child(parent: &Env) -> Env {
        Environment::with_bindings(parent, HashMap::new())
    }

    pub fn with_bindings(parent: &Env, bindings: HashMap<String, Value>) -> Env {
        Rc::new(Environment {
            bindings: RefCell::new(bindings),
            parent: Some(Rc::clone(parent)),
        })
    }

    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.bindings.borrow_mut().insert(name.into(), value);
    }

    /// Walk outward from this frame; the innermost binding wins.
    pub fn get(&self, name: &str) -> Option<Value> {
        let mut frame = self;
        loop {
            if let Some(value) = frame.bindings.borrow().get(name) {
                return Some(value.clone());
            }
            frame = frame.parent.as_deref()?;
        }
    }

    pub fn parent(&self) -> Option<&Env> {
        self.parent.as_ref()
    }

    /// Names bound directly in this frame, sorted.
    pub fn local_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bindings.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.bindings.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.borrow().is_empty()
    }

    /// Drop every binding in this frame, breaking closure cycles through it.
    pub(crate) fn clear(&self) {
        self.bindings.borrow_mut().clear();
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("names", &self.local_names())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

/// Non-local exits out of an evaluation.
///
/// `exit` travels as its own variant so nothing but the driver can mistake
/// it for a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum Unwind {
    Exit(Value),
    Fail(Error),
}

impl Unwind {
    /// Collapse at the driver boundary: an exit becomes the program's value.
    pub fn into_result(self) -> Result<Value, Error> {
        match self {
            Unwind::Exit(value) => Ok(value),
            Unwind::Fail(error) => Err(error),
        }
    }
}

impl From<Error> for Unwind {
    fn from(error: Error) -> Self {
        Unwind::Fail(error)
    }
}

pub type EvalResult<T = Value> = Result<T, Unwind>;

/// Evaluation context: the current scope plus depth accounting.
#[derive(Debug, Clone)]
pub struct Context {
    env: Env,
    depth: usize,
    max_depth: usize,
}

impl Context {
    pub fn new(env: Env, max_depth: usize) -> Self {
        Context {
            env,
            depth: 0,
            max_depth,
        }
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Same depth, different scope.
    pub(crate) fn with_env(&self, env: Env) -> Self {
        Context {
            env,
            depth: self.depth,
            max_depth: self.max_depth,
        }
    }

    fn deeper(&self, location: Location) -> Result<Self, Error> {
        if self.depth >= self.max_depth {
            return Err(Error::DepthLimitExceeded {
                limit: self.max_depth,
                location,
            });
        }
        Ok(Context {
            env: Rc::clone(&self.env),
            depth: self.depth + 1,
            max_depth: self.max_depth,
        })
    }
}

/// Evaluate a single node.
pub fn evaluate(node: &Node, ctx: &Context) -> EvalResult {
    let ctx = ctx.deeper(node.location)?;
    ensure_sufficient_stack(|| dispatch(node, &ctx))
}

/// Evaluate nodes left to right.
pub fn evaluate_all(nodes: &[Rc<Node>], ctx: &Context) -> EvalResult<Vec<Value>> {
    nodes.iter().map(|node| evaluate(node, ctx)).collect()
}

/// Evaluate body forms in order, returning the last value (nil when empty).
fn evaluate_body(body: &[Rc<Node>], ctx: &Context) -> EvalResult {
    let mut result = Value::Nil;
    for form in body {
        result = evaluate(form, ctx)?;
    }
    Ok(result)
}

fn dispatch(node: &Node, ctx: &Context) -> EvalResult {
    match &node.kind {
        NodeKind::Int(n) => Ok(Value::Int(*n)),
        NodeKind::Float(n) => Ok(Value::Float(*n)),
        NodeKind::String(s) => Ok(Value::String(s.clone())),
        NodeKind::Any(value) => Ok(value.clone()),
        NodeKind::Identifier(name) => ctx.env.get(name).ok_or_else(|| {
            Error::UnresolvedName {
                name: name.clone(),
                location: node.location,
            }
            .into()
        }),
        NodeKind::Vec(elements) => Ok(Value::Seq(evaluate_all(elements, ctx)?)),
        NodeKind::Map(elements) => eval_map_literal(elements, node, ctx),
        NodeKind::Call { callee, args } => {
            let func = evaluate(callee, ctx)?;
            if !func.is_callable() {
                return Err(Error::NotCallable {
                    callee: callee.to_string(),
                    location: node.location,
                }
                .into());
            }
            call_value(&func, args, node, ctx)
        }
    }
}

fn eval_map_literal(elements: &[Rc<Node>], node: &Node, ctx: &Context) -> EvalResult {
    if elements.len() % 2 != 0 {
        return Err(Error::type_error(
            format!(
                "map literal needs key/value pairs, got {} forms",
                elements.len()
            ),
            node.location,
        )
        .into());
    }
    let mut map = MapValue::new();
    for pair in elements.chunks(2) {
        if let [key, value] = pair {
            let key = evaluate(key, ctx)?;
            map.insert(key, evaluate(value, ctx)?);
        }
    }
    Ok(Value::Map(map))
}

/// Invoke a callable with unevaluated argument nodes.
pub(crate) fn call_value(func: &Value, args: &[Rc<Node>], node: &Node, ctx: &Context) -> EvalResult {
    match func {
        Value::Function(closure) => call_closure(closure, args, node, ctx),
        Value::Builtin(op) => op.invoke(args, node, ctx),
        Value::Native(native) => native.call(args, node, ctx),
        other => Err(Error::NotCallable {
            callee: other.to_string(),
            location: node.location,
        }
        .into()),
    }
}

fn call_closure(closure: &Closure, args: &[Rc<Node>], node: &Node, ctx: &Context) -> EvalResult {
    closure
        .params
        .arity()
        .validate(closure.display_name(), args.len(), node.location)?;
    tracing::trace!(
        function = closure.display_name(),
        args = args.len(),
        depth = ctx.depth,
        "call"
    );

    let frame = Environment::child(&closure.env);
    let (fixed_args, rest_args) = args.split_at(closure.params.fixed.len());
    for (param, arg) in closure.params.fixed.iter().zip(fixed_args) {
        let value = evaluate(arg, ctx)?;
        frame.define(param.clone(), value);
    }
    if let Some(rest) = &closure.params.rest {
        let values = evaluate_all(rest_args, ctx)?;
        frame.define(rest.clone(), Value::Seq(values));
    }

    let outcome = evaluate_body(&closure.body, &ctx.with_env(Rc::clone(&frame)));
    release_frame(&frame, &outcome);
    outcome
}

/// Empty a finished frame that nothing can reach any more.
///
/// A `defn` leaves a frame -> closure -> frame cycle behind. The only way a
/// frame outlives its evaluation is through a callable in the outcome, so
/// the frame is kept when the outcome holds one.
pub(crate) fn release_frame(frame: &Env, outcome: &EvalResult) {
    if Rc::strong_count(frame) == 1 {
        return;
    }
    let escapes = match outcome {
        Ok(value) | Err(Unwind::Exit(value)) => value.holds_callable(),
        Err(Unwind::Fail(_)) => false,
    };
    if !escapes {
        frame.clear();
    }
}

//
// Special forms
//

fn arity_error(form: &str, expected: Arity, args: &[Rc<Node>], node: &Node) -> Unwind {
    Error::Arity {
        form: form.to_owned(),
        expected,
        got: args.len(),
        location: node.location,
    }
    .into()
}

/// Parse a parameter vector: plain names with an optional trailing rest
/// formal written `& name` or `&name`.
fn parse_params(params_node: &Node) -> Result<Params, Error> {
    let NodeKind::Vec(elements) = &params_node.kind else {
        return Err(Error::invalid_parameter(
            format!("parameters must be a vector, got {}", params_node.tag()),
            params_node.location,
        ));
    };

    let mut params = Params::default();
    let mut iter = elements.iter();
    while let Some(element) = iter.next() {
        let Some(name) = element.as_identifier() else {
            return Err(Error::invalid_parameter(
                format!("{element} is not a name"),
                element.location,
            ));
        };
        if params.rest.is_some() {
            return Err(Error::invalid_parameter(
                format!("{name} follows the rest parameter"),
                element.location,
            ));
        }

        let rest_name = match name.strip_prefix('&') {
            Some("") => match iter.next() {
                Some(next) => match next.as_identifier() {
                    Some(next_name) if !next_name.starts_with('&') => Some(next_name.to_owned()),
                    _ => {
                        return Err(Error::invalid_parameter(
                            format!("{next} is not a valid rest parameter"),
                            next.location,
                        ));
                    }
                },
                None => {
                    return Err(Error::invalid_parameter(
                        "& must be followed by a name",
                        element.location,
                    ));
                }
            },
            Some(rest) => Some(rest.to_owned()),
            None => None,
        };

        let bound = rest_name.as_deref().unwrap_or(name);
        if params.fixed.iter().any(|p| p == bound) {
            return Err(Error::invalid_parameter(
                format!("duplicate parameter name {bound}"),
                element.location,
            ));
        }
        match rest_name {
            Some(rest) => params.rest = Some(rest),
            None => params.fixed.push(name.to_owned()),
        }
    }
    Ok(params)
}

fn make_closure(
    name: Option<String>,
    params_node: &Node,
    body: &[Rc<Node>],
    ctx: &Context,
) -> Result<Rc<Closure>, Error> {
    Ok(Rc::new(Closure {
        name,
        params: parse_params(params_node)?,
        body: body.to_vec(),
        env: Rc::clone(&ctx.env),
    }))
}

/// `(defn name [params] body...)`
pub(crate) fn eval_defn(args: &[Rc<Node>], node: &Node, ctx: &Context) -> EvalResult {
    let [name_node, params_node, body @ ..] = args else {
        return Err(arity_error("defn", Arity::AtLeast(3), args, node));
    };
    if body.is_empty() {
        return Err(arity_error("defn", Arity::AtLeast(3), args, node));
    }
    let Some(name) = name_node.as_identifier() else {
        return Err(Error::invalid_parameter(
            format!("defn name must be an identifier, got {name_node}"),
            name_node.location,
        )
        .into());
    };

    let closure = make_closure(Some(name.to_owned()), params_node, body, ctx)?;
    ctx.env.define(name, Value::Function(closure));
    Ok(Value::Nil)
}

/// `(fn [params] body...)`
pub(crate) fn eval_fn(args: &[Rc<Node>], node: &Node, ctx: &Context) -> EvalResult {
    match args {
        [params_node, body @ ..] if !body.is_empty() => {
            Ok(Value::Function(make_closure(None, params_node, body, ctx)?))
        }
        _ => Err(arity_error("fn", Arity::AtLeast(2), args, node)),
    }
}

/// `(let [name expr ...] body...)`
///
/// Binding expressions see the outer scope only; the body runs in one new
/// frame holding all of them.
pub(crate) fn eval_let(args: &[Rc<Node>], node: &Node, ctx: &Context) -> EvalResult {
    let [bindings_node, body @ ..] = args else {
        return Err(arity_error("let", Arity::AtLeast(2), args, node));
    };
    if body.is_empty() {
        return Err(arity_error("let", Arity::AtLeast(2), args, node));
    }
    let NodeKind::Vec(pairs) = &bindings_node.kind else {
        return Err(Error::invalid_parameter(
            format!("let bindings must be a vector, got {}", bindings_node.tag()),
            bindings_node.location,
        )
        .into());
    };
    if pairs.len() % 2 != 0 {
        return Err(Error::invalid_parameter(
            "let bindings need name/value pairs",
            bindings_node.location,
        )
        .into());
    }

    let mut bindings = HashMap::with_capacity(pairs.len() / 2);
    for pair in pairs.chunks(2) {
        let [name_node, expr] = pair else { continue };
        let Some(name) = name_node.as_identifier() else {
            return Err(Error::invalid_parameter(
                format!("{name_node} is not a name"),
                name_node.location,
            )
            .into());
        };
        bindings.insert(name.to_owned(), evaluate(expr, ctx)?);
    }

    let frame = Environment::with_bindings(&ctx.env, bindings);
    let outcome = evaluate_body(body, &ctx.with_env(Rc::clone(&frame)));
    release_frame(&frame, &outcome);
    outcome
}

/// `(if cond then else)`
pub(crate) fn eval_if(args: &[Rc<Node>], node: &Node, ctx: &Context) -> EvalResult {
    let [condition, then_branch, else_branch] = args else {
        return Err(arity_error("if", Arity::Exact(3), args, node));
    };
    if evaluate(condition, ctx)?.is_truthy() {
        evaluate(then_branch, ctx)
    } else {
        evaluate(else_branch, ctx)
    }
}

/// `(when cond then)`
pub(crate) fn eval_when(args: &[Rc<Node>], node: &Node, ctx: &Context) -> EvalResult {
    let [condition, then_branch] = args else {
        return Err(arity_error("when", Arity::Exact(2), args, node));
    };
    if evaluate(condition, ctx)?.is_truthy() {
        evaluate(then_branch, ctx)
    } else {
        Ok(Value::Nil)
    }
}

/// `(case subject key result ... [default])`
pub(crate) fn eval_case(args: &[Rc<Node>], node: &Node, ctx: &Context) -> EvalResult {
    let [subject, clauses @ ..] = args else {
        return Err(arity_error("case", Arity::AtLeast(2), args, node));
    };
    if clauses.is_empty() {
        return Err(arity_error("case", Arity::AtLeast(2), args, node));
    }
    let value = evaluate(subject, ctx)?;

    let mut pairs = clauses.chunks_exact(2);
    for pair in pairs.by_ref() {
        if let [key, result] = pair
            && evaluate(key, ctx)? == value
        {
            return evaluate(result, ctx);
        }
    }
    match pairs.remainder() {
        [default] => evaluate(default, ctx),
        _ => Err(Error::CaseFailed {
            location: node.location,
        }
        .into()),
    }
}

/// `(partial fn-expr fixed-arg...)`
///
/// Each call evaluates `fn-expr` and the fixed arguments in the scope where
/// `partial` was evaluated, then appends the caller's argument nodes
/// unevaluated and evaluates the combined call in the caller's context.
pub(crate) fn eval_partial(args: &[Rc<Node>], node: &Node, ctx: &Context) -> EvalResult {
    let [callee, fixed @ ..] = args else {
        return Err(arity_error("partial", Arity::AtLeast(2), args, node));
    };
    if fixed.is_empty() {
        return Err(arity_error("partial", Arity::AtLeast(2), args, node));
    }

    let callee = Rc::clone(callee);
    let fixed = fixed.to_vec();
    let defining_env = Rc::clone(&ctx.env);
    let origin = node.clone();
    let name = format!("partial {callee}");

    let native = NativeFunction::new(name, move |call_args, _call_node, call_ctx| {
        let defining_ctx = call_ctx.with_env(Rc::clone(&defining_env));
        let func = Node::any(evaluate(&callee, &defining_ctx)?, callee.location);
        let mut combined = Vec::with_capacity(fixed.len() + call_args.len());
        for arg in &fixed {
            let value = evaluate(arg, &defining_ctx)?;
            combined.push(Rc::new(Node::any(value, arg.location)));
        }
        combined.extend(call_args.iter().cloned());
        let call = origin.derive_call(Rc::new(func), combined);
        evaluate(&call, call_ctx)
    });
    Ok(Value::Native(native))
}

fn expect_seq(value: Value, form: &str, location: Location) -> Result<Vec<Value>, Error> {
    match value {
        Value::Seq(items) => Ok(items),
        other => Err(Error::type_error(
            format!("{form} expects a vec, got {}", other.type_name()),
            location,
        )),
    }
}

fn wrap_values(values: Vec<Value>, location: Location) -> Vec<Rc<Node>> {
    values
        .into_iter()
        .map(|value| Rc::new(Node::any(value, location)))
        .collect()
}

/// `(apply fn-expr seq-expr)`
pub(crate) fn eval_apply(args: &[Rc<Node>], node: &Node, ctx: &Context) -> EvalResult {
    let [func, seq] = args else {
        return Err(arity_error("apply", Arity::Exact(2), args, node));
    };
    let items = expect_seq(evaluate(seq, ctx)?, "apply", seq.location)?;
    let call = node.derive_call(Rc::clone(func), wrap_values(items, seq.location));
    evaluate(&call, ctx)
}

/// `(map fn-expr seq-expr)`
pub(crate) fn eval_map(args: &[Rc<Node>], node: &Node, ctx: &Context) -> EvalResult {
    let [func, seq] = args else {
        return Err(arity_error("map", Arity::Exact(2), args, node));
    };
    let items = expect_seq(evaluate(seq, ctx)?, "map", seq.location)?;
    let mut results = Vec::with_capacity(items.len());
    for item in wrap_values(items, seq.location) {
        let call = node.derive_call(Rc::clone(func), vec![item]);
        results.push(evaluate(&call, ctx)?);
    }
    Ok(Value::Seq(results))
}

/// `(filter fn-expr seq-expr)`
pub(crate) fn eval_filter(args: &[Rc<Node>], node: &Node, ctx: &Context) -> EvalResult {
    let [func, seq] = args else {
        return Err(arity_error("filter", Arity::Exact(2), args, node));
    };
    let items = expect_seq(evaluate(seq, ctx)?, "filter", seq.location)?;
    let mut kept = Vec::new();
    for item in items {
        let arg = Rc::new(Node::any(item.clone(), seq.location));
        let call = node.derive_call(Rc::clone(func), vec![arg]);
        if evaluate(&call, ctx)?.is_truthy() {
            kept.push(item);
        }
    }
    Ok(Value::Seq(kept))
}

/// Re-wrap a `reduce` accumulator as a node carrying the seed's tag.
///
/// Literal tags carry any value. An identifier tag turns the accumulator's
/// text back into a name to resolve, and composite tags cannot carry a value
/// at all.
fn rewrap_accumulator(tag: Tag, acc: Value, location: Location) -> Result<Node, Error> {
    match tag {
        Tag::Int | Tag::Float | Tag::String | Tag::Any => Ok(Node::any(acc, location)),
        Tag::Identifier => Ok(Node::new(NodeKind::Identifier(acc.to_text()), location)),
        Tag::Call | Tag::Vec | Tag::Map => Err(Error::type_error(
            format!(
                "reduce cannot carry a {} accumulator in a {tag} node",
                acc.type_name()
            ),
            location,
        )),
    }
}

/// `(reduce fn-expr init-expr seq-expr)`
///
/// A vec literal is folded over its raw child nodes; any other sequence
/// expression is evaluated and its elements wrapped.
pub(crate) fn eval_reduce(args: &[Rc<Node>], node: &Node, ctx: &Context) -> EvalResult {
    let [func, init, seq] = args else {
        return Err(arity_error("reduce", Arity::Exact(3), args, node));
    };

    let elements = match &seq.kind {
        NodeKind::Vec(children) => children.clone(),
        _ => {
            let items = expect_seq(evaluate(seq, ctx)?, "reduce", seq.location)?;
            wrap_values(items, seq.location)
        }
    };

    let seed_tag = init.tag();
    let mut acc = evaluate(init, ctx)?;
    for element in elements {
        let acc_node = rewrap_accumulator(seed_tag, acc, init.location)?;
        let call = node.derive_call(Rc::clone(func), vec![element, Rc::new(acc_node)]);
        acc = evaluate(&call, ctx)?;
    }
    Ok(acc)
}

/// `(exit value)`
pub(crate) fn eval_exit(args: &[Rc<Node>], node: &Node, ctx: &Context) -> EvalResult {
    let [value] = args else {
        return Err(arity_error("exit", Arity::Exact(1), args, node));
    };
    Err(Unwind::Exit(evaluate(value, ctx)?))
}
