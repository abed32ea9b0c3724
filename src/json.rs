//! JSON wire format: AST nodes in, scopes in, result values out.
//!
//! An AST node on the wire is an object
//! `{"tag": "...", "payload": ..., "location": {"line": 1, "column": 0}}`.
//! `type` and `value` are accepted in place of `tag` and `payload`, and a
//! missing location defaults to line 1 column 0. `any` nodes only exist
//! inside the evaluator and are rejected.

use std::rc::Rc;

use serde_json::Map as JsonObject;
use serde_json::Value as Json;

use crate::ast::{Location, Node, NodeKind};
use crate::value::MapValue;
use crate::{Bindings, Error, InterpreterConfig, MAX_PARSE_DEPTH, Value};

/// Decode a program from JSON: either an array of nodes or a single node.
pub fn ast_from_json(input: &str) -> Result<Vec<Node>, Error> {
    let json: Json =
        serde_json::from_str(input).map_err(|e| Error::InvalidAst(format!("Invalid JSON: {e}")))?;

    match json {
        Json::Array(nodes) => nodes.iter().map(|n| node_from_json(n, 0)).collect(),
        node @ Json::Object(_) => Ok(vec![node_from_json(&node, 0)?]),
        other => Err(Error::InvalidAst(format!(
            "Expected a node or an array of nodes, got {}",
            json_type_name(&other)
        ))),
    }
}

/// Decode a single wire node.
pub fn node_from_json(json: &Json, depth: usize) -> Result<Node, Error> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(Error::InvalidAst(format!(
            "AST too deeply nested (max depth: {MAX_PARSE_DEPTH})"
        )));
    }
    let Json::Object(fields) = json else {
        return Err(Error::InvalidAst(format!(
            "Expected a node object, got {}",
            json_type_name(json)
        )));
    };

    let location = match fields.get("location") {
        None | Some(Json::Null) => Location::default(),
        Some(loc) => serde_json::from_value(loc.clone())
            .map_err(|e| Error::InvalidAst(format!("Invalid location {loc}: {e}")))?,
    };
    let invalid = |message: String| Error::InvalidAst(format!("{message} (at {location})"));

    let tag = match field(fields, "tag", "type") {
        Some(Json::String(tag)) => tag.as_str(),
        Some(other) => return Err(invalid(format!("Node tag must be a string, got {other}"))),
        None => return Err(invalid("Node is missing its tag".to_owned())),
    };
    let payload = field(fields, "payload", "value")
        .ok_or_else(|| invalid(format!("{tag} node is missing its payload")))?;

    let children = |payload: &Json| -> Result<Vec<Rc<Node>>, Error> {
        let Json::Array(items) = payload else {
            return Err(invalid(format!("{tag} payload must be an array, got {payload}")));
        };
        items
            .iter()
            .map(|item| node_from_json(item, depth + 1).map(Rc::new))
            .collect()
    };

    let kind = match tag {
        "call" => {
            let mut nodes = children(payload)?;
            if nodes.is_empty() {
                return Err(invalid("call node needs a callee".to_owned()));
            }
            let callee = nodes.remove(0);
            NodeKind::Call { callee, args: nodes }
        }
        "vec" => NodeKind::Vec(children(payload)?),
        "map" => NodeKind::Map(children(payload)?),
        "identifier" => match payload {
            Json::String(name) if !name.is_empty() => NodeKind::Identifier(name.clone()),
            _ => return Err(invalid(format!("identifier payload must be a name, got {payload}"))),
        },
        "string" => match payload {
            Json::String(s) => NodeKind::String(s.clone()),
            _ => return Err(invalid(format!("string payload must be a string, got {payload}"))),
        },
        "int" => match payload.as_i64() {
            Some(n) => NodeKind::Int(n),
            None => return Err(invalid(format!("int payload must be an integer, got {payload}"))),
        },
        "float" => match payload.as_f64() {
            Some(n) => NodeKind::Float(n),
            None => return Err(invalid(format!("float payload must be a number, got {payload}"))),
        },
        "any" => return Err(invalid("any nodes cannot be decoded".to_owned())),
        other => return Err(invalid(format!("Unknown node tag '{other}'"))),
    };

    Ok(Node::new(kind, location))
}

fn field<'a>(fields: &'a JsonObject<String, Json>, name: &str, alias: &str) -> Option<&'a Json> {
    fields.get(name).or_else(|| fields.get(alias))
}

fn json_type_name(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

impl Value {
    /// Convert host JSON data into a value. Integers that fit in `i64`
    /// become ints, every other number a float.
    pub fn from_json(json: &Json) -> Value {
        match json {
            Json::Null => Value::Nil,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::Seq(items.iter().map(Value::from_json).collect()),
            Json::Object(fields) => Value::Map(
                fields
                    .iter()
                    .map(|(k, v)| (Value::String(k.clone()), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Serialize a result value. Map keys become their string form.
    pub fn to_json(&self) -> Result<Json, Error> {
        match self {
            Value::Nil => Ok(Json::Null),
            Value::Bool(b) => Ok(Json::Bool(*b)),
            Value::Int(n) => Ok(Json::from(*n)),
            Value::Float(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .ok_or_else(|| Error::Json(format!("Cannot convert {n} to JSON"))),
            Value::String(s) => Ok(Json::String(s.clone())),
            Value::Seq(items) => Ok(Json::Array(
                items.iter().map(Value::to_json).collect::<Result<_, _>>()?,
            )),
            Value::Map(map) => map_to_json(map),
            Value::Function(_) | Value::Builtin(_) | Value::Native(_) => {
                Err(Error::Json(format!("Cannot convert {self} to JSON")))
            }
        }
    }
}

fn map_to_json(map: &MapValue) -> Result<Json, Error> {
    let mut object = JsonObject::new();
    for (key, value) in map.iter() {
        let name = key.to_text();
        if object.contains_key(&name) {
            return Err(Error::Json(format!("Duplicate JSON key {name:?} from {key}")));
        }
        object.insert(name, value.to_json()?);
    }
    Ok(Json::Object(object))
}

impl Bindings {
    /// Initial scope from a JSON object mapping names to values.
    pub fn from_json(input: &str) -> Result<Self, Error> {
        let json: Json =
            serde_json::from_str(input).map_err(|e| Error::Json(format!("Invalid JSON: {e}")))?;
        let Json::Object(fields) = json else {
            return Err(Error::Json(format!(
                "Bindings must be a JSON object, got {}",
                json_type_name(&json)
            )));
        };
        Ok(fields
            .iter()
            .map(|(name, value)| (name.as_str(), Value::from_json(value)))
            .collect())
    }
}

impl InterpreterConfig {
    pub fn from_json(input: &str) -> Result<Self, Error> {
        serde_json::from_str(input).map_err(|e| Error::Json(format!("Invalid configuration: {e}")))
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn decode(json: Json) -> Result<Vec<Node>, Error> {
        ast_from_json(&json.to_string())
    }

    #[test]
    fn test_decode_nodes() {
        let program = decode(json!([
            {"tag": "call", "payload": [
                {"tag": "identifier", "payload": "+", "location": {"line": 1, "column": 1}},
                {"tag": "int", "payload": 1, "location": {"line": 1, "column": 3}},
                {"tag": "float", "payload": 2.5, "location": {"line": 1, "column": 5}}
            ], "location": {"line": 1, "column": 0}},
            {"tag": "vec", "payload": [{"tag": "string", "payload": "a"}]},
            {"tag": "map", "payload": [
                {"tag": "string", "payload": "k"},
                {"tag": "int", "payload": 1}
            ]}
        ]))
        .unwrap();

        let rendered: Vec<String> = program.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["(+ 1 2.5)", "[\"a\"]", "{\"k\" 1}"]);

        let NodeKind::Call { callee, args } = &program[0].kind else {
            panic!("expected a call, got {:?}", program[0]);
        };
        assert_eq!(callee.location, Location::new(1, 1));
        assert_eq!(args[1].location, Location::new(1, 5));
        assert_eq!(program[1].location, Location::default());
    }

    #[test]
    fn test_decode_aliases_and_single_node() {
        let program = decode(json!({"type": "int", "value": 7})).unwrap();
        assert_eq!(program, vec![ast::int(7)]);

        // Int payloads are accepted for floats
        let program = decode(json!({"tag": "float", "payload": 2})).unwrap();
        assert_eq!(program, vec![ast::float(2.0)]);
    }

    #[test]
    fn test_decode_errors() {
        let cases = vec![
            (json!(42), "Expected a node or an array of nodes, got number"),
            (json!([1]), "Expected a node object, got number"),
            (json!({"payload": 1}), "Node is missing its tag"),
            (json!({"tag": "int"}), "int node is missing its payload"),
            (json!({"tag": "int", "payload": "1"}), "int payload must be an integer"),
            (json!({"tag": "int", "payload": 1.5}), "int payload must be an integer"),
            (json!({"tag": "identifier", "payload": ""}), "identifier payload must be a name"),
            (json!({"tag": "call", "payload": []}), "call node needs a callee"),
            (json!({"tag": "vec", "payload": 3}), "vec payload must be an array"),
            (json!({"tag": "any", "payload": 1}), "any nodes cannot be decoded"),
            (json!({"tag": "symbol", "payload": "x"}), "Unknown node tag 'symbol'"),
            (
                json!({"tag": "int", "payload": 1, "location": {"line": "one"}}),
                "Invalid location",
            ),
        ];
        for (input, expected) in cases {
            match decode(input.clone()) {
                Err(Error::InvalidAst(message)) => {
                    assert!(message.contains(expected), "{input}: got '{message}'")
                }
                other => panic!("{input}: expected InvalidAst, got {other:?}"),
            }
        }

        let err = ast_from_json("{").unwrap_err();
        assert!(matches!(err, Error::InvalidAst(ref m) if m.starts_with("Invalid JSON")));
    }

    #[test]
    fn test_decode_depth_limit() {
        let mut node = json!({"tag": "int", "payload": 0});
        for _ in 0..MAX_PARSE_DEPTH {
            node = json!({"tag": "vec", "payload": [node]});
        }
        let err = node_from_json(&node, 0).unwrap_err();
        assert!(matches!(err, Error::InvalidAst(ref m) if m.contains("too deeply nested")));
    }

    #[test]
    fn test_value_to_json() {
        let cases: Vec<(Value, Json)> = vec![
            (Value::Nil, json!(null)),
            (Value::Bool(true), json!(true)),
            (Value::Int(-3), json!(-3)),
            (Value::Float(0.5), json!(0.5)),
            (Value::from("hi"), json!("hi")),
            (Value::from([1, 2]), json!([1, 2])),
            (
                Value::Map(
                    [
                        (Value::from("a"), Value::Int(1)),
                        (Value::Int(2), Value::from([Value::Nil])),
                    ]
                    .into_iter()
                    .collect(),
                ),
                json!({"a": 1, "2": [null]}),
            ),
        ];
        for (value, expected) in cases {
            assert_eq!(value.to_json().unwrap(), expected, "value: {value}");
        }

        assert!(matches!(Value::Float(f64::NAN).to_json(), Err(Error::Json(_))));
        let builtin = Value::Builtin(crate::builtinops::find_op("+").unwrap());
        let err = Value::Seq(vec![builtin]).to_json().unwrap_err();
        assert_eq!(err, Error::Json("Cannot convert #<builtin +> to JSON".to_owned()));

        // Distinct keys with the same text form
        let clash = Value::Map(
            [
                (Value::from("1"), Value::Int(1)),
                (Value::Int(1), Value::Int(2)),
            ]
            .into_iter()
            .collect(),
        );
        assert_eq!(
            clash.to_json().unwrap_err(),
            Error::Json("Duplicate JSON key \"1\" from 1".to_owned())
        );
    }

    #[test]
    fn test_value_from_json() {
        let value = Value::from_json(&json!({"xs": [1, 2.5, null], "ok": true}));
        let Value::Map(map) = &value else {
            panic!("expected a map, got {value}");
        };
        assert_eq!(
            map.get(&Value::from("xs")),
            Some(&Value::Seq(vec![Value::Int(1), Value::Float(2.5), Value::Nil]))
        );
        assert_eq!(map.get(&Value::from("ok")), Some(&Value::Bool(true)));

        assert_eq!(Value::from_json(&json!(u64::MAX)), Value::Float(u64::MAX as f64));
    }

    #[test]
    fn test_bindings_and_config_from_json() {
        let scope = Bindings::from_json(r#"{"limit": 2, "xs": [1, 2, 3]}"#).unwrap();
        assert_eq!(scope.get("limit"), Some(&Value::Int(2)));
        let interpreter = crate::Interpreter::new().unwrap();
        let value = interpreter.run("(filter (fn [x] (> x limit)) xs)", scope).unwrap();
        assert_eq!(value.to_json().unwrap(), json!([3]));

        assert!(matches!(Bindings::from_json("[1]"), Err(Error::Json(_))));

        let config = InterpreterConfig::from_json(r#"{"max_eval_depth": 64}"#).unwrap();
        assert_eq!(config, InterpreterConfig::default().with_max_eval_depth(64));
        assert!(matches!(
            InterpreterConfig::from_json(r#"{"max_eval_depth": "deep"}"#),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_decoded_program_runs() {
        let program = ast_from_json(
            r#"[{"type": "call", "value": [
                {"type": "identifier", "value": "sum"},
                {"type": "vec", "value": [
                    {"type": "int", "value": 1},
                    {"type": "int", "value": 2}
                ]}
            ]}]"#,
        )
        .unwrap();
        let interpreter = crate::Interpreter::new().unwrap();
        let value = interpreter.interpret(&program, Bindings::new()).unwrap();
        assert_eq!(value, Value::Int(3));
    }
}
