//! Abstract syntax tree consumed by the evaluator.
//!
//! A program is a sequence of [`Node`]s. Every node carries the source
//! [`Location`] it was read from so that evaluation errors can point back at
//! the offending form. Children are held behind [`Rc`] so that special forms
//! can build derived call nodes (for `apply`, `map`, `partial` and friends)
//! that share subtrees with the program instead of deep-copying them.
//!
//! The constructor helpers at the bottom of this module ([`call`], [`ident`],
//! [`int`], ...) build nodes at the default location and are handy for hosts
//! that assemble programs directly as well as for tests.

use crate::value::Value;
use std::fmt;
use std::rc::Rc;

/// Position of a node in its source text.
///
/// Lines are 1-based, columns are 0-based character offsets within the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "json", derive(serde::Deserialize, serde::Serialize))]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub const fn new(line: usize, column: usize) -> Self {
        Location { line, column }
    }
}

impl Default for Location {
    fn default() -> Self {
        Location { line: 1, column: 0 }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {} column {}", self.line, self.column)
    }
}

/// The closed set of node tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Call,
    Identifier,
    Int,
    Float,
    String,
    Vec,
    Map,
    /// Wraps an already-evaluated runtime value
    Any,
}

impl Tag {
    pub fn as_str(self) -> &'static str {
        match self {
            Tag::Call => "call",
            Tag::Identifier => "identifier",
            Tag::Int => "int",
            Tag::Float => "float",
            Tag::String => "string",
            Tag::Vec => "vec",
            Tag::Map => "map",
            Tag::Any => "any",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Callee followed by unevaluated argument nodes
    Call {
        callee: Rc<Node>,
        args: Vec<Rc<Node>>,
    },
    Identifier(String),
    Int(i64),
    Float(f64),
    String(String),
    Vec(Vec<Rc<Node>>),
    /// Alternating key and value nodes
    Map(Vec<Rc<Node>>),
    Any(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub location: Location,
}

impl Node {
    pub fn new(kind: NodeKind, location: Location) -> Self {
        Node { kind, location }
    }

    pub fn tag(&self) -> Tag {
        match &self.kind {
            NodeKind::Call { .. } => Tag::Call,
            NodeKind::Identifier(_) => Tag::Identifier,
            NodeKind::Int(_) => Tag::Int,
            NodeKind::Float(_) => Tag::Float,
            NodeKind::String(_) => Tag::String,
            NodeKind::Vec(_) => Tag::Vec,
            NodeKind::Map(_) => Tag::Map,
            NodeKind::Any(_) => Tag::Any,
        }
    }

    /// Wrap a runtime value so it can be passed where a node is expected.
    pub fn any(value: Value, location: Location) -> Self {
        Node::new(NodeKind::Any(value), location)
    }

    /// Build a call node at this node's location.
    pub(crate) fn derive_call(&self, callee: Rc<Node>, args: Vec<Rc<Node>>) -> Node {
        Node::new(NodeKind::Call { callee, args }, self.location)
    }

    pub fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Identifier(name) => Some(name),
            _ => None,
        }
    }
}

fn write_children(f: &mut fmt::Formatter<'_>, children: &[Rc<Node>]) -> fmt::Result {
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{child}")?;
    }
    Ok(())
}

/// Renders the node back in source form.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::Call { callee, args } => {
                write!(f, "({callee}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                write!(f, ")")
            }
            NodeKind::Identifier(name) => f.write_str(name),
            NodeKind::Int(n) => write!(f, "{n}"),
            NodeKind::Float(n) => write!(f, "{n:?}"),
            NodeKind::String(s) => write!(f, "{}", Value::String(s.clone())),
            NodeKind::Vec(elements) => {
                write!(f, "[")?;
                write_children(f, elements)?;
                write!(f, "]")
            }
            NodeKind::Map(elements) => {
                write!(f, "{{")?;
                write_children(f, elements)?;
                write!(f, "}}")
            }
            NodeKind::Any(value) => write!(f, "{value}"),
        }
    }
}

//
// Construction helpers
//

fn rc_all(nodes: impl IntoIterator<Item = Node>) -> Vec<Rc<Node>> {
    nodes.into_iter().map(Rc::new).collect()
}

pub fn call(callee: Node, args: impl IntoIterator<Item = Node>) -> Node {
    Node::new(
        NodeKind::Call {
            callee: Rc::new(callee),
            args: rc_all(args),
        },
        Location::default(),
    )
}

pub fn ident(name: &str) -> Node {
    Node::new(NodeKind::Identifier(name.to_owned()), Location::default())
}

pub fn int(n: i64) -> Node {
    Node::new(NodeKind::Int(n), Location::default())
}

pub fn float(n: f64) -> Node {
    Node::new(NodeKind::Float(n), Location::default())
}

pub fn string(s: &str) -> Node {
    Node::new(NodeKind::String(s.to_owned()), Location::default())
}

pub fn vec(elements: impl IntoIterator<Item = Node>) -> Node {
    Node::new(NodeKind::Vec(rc_all(elements)), Location::default())
}

pub fn map(elements: impl IntoIterator<Item = Node>) -> Node {
    Node::new(NodeKind::Map(rc_all(elements)), Location::default())
}
