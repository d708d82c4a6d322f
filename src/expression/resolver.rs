use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::schema::{Token, ValueSchema};
use crate::error::{FlowEngineError, Result};

/// 表达式求值时读取上下文的接口
pub trait ContextLookup: Send + Sync {
    /// `None` when `node_id` has not produced output yet, or `path` does not exist in it.
    fn lookup(&self, node_id: &str, path: &str) -> Option<Value>;
}

/// Walks a dot path (`user.tags.0`) inside a JSON value.
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|idx| items.get(idx)),
        _ => None,
    })
}

/// 求值后的输入
///
/// Undefined leaves are stored as `null` in `value` and listed by dot path in
/// `undefined`, so a runner can tell "explicitly null" from "not produced".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedInput {
    pub value: Value,
    pub undefined: BTreeSet<String>,
}

impl ResolvedInput {
    pub fn from_value(value: Value) -> Self {
        Self {
            value,
            undefined: BTreeSet::new(),
        }
    }

    pub fn empty() -> Self {
        Self::from_value(Value::Object(Map::new()))
    }

    pub fn is_undefined(&self, path: &str) -> bool {
        if self.undefined.contains("") {
            return true;
        }
        self.undefined.iter().any(|undefined| {
            path == undefined
                || path
                    .strip_prefix(undefined.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        if self.is_undefined(path) {
            return None;
        }
        lookup_path(&self.value, path)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    pub fn require(&self, node: &str, path: &str) -> Result<&Value> {
        self.get(path).ok_or_else(|| FlowEngineError::MissingInput {
            node: node.to_string(),
            field: path.to_string(),
        })
    }

    pub fn require_str(&self, node: &str, path: &str) -> Result<&str> {
        self.require(node, path)?.as_str().ok_or_else(|| {
            FlowEngineError::runner(node, format!("input `{path}` must be a string"))
        })
    }

    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        match self.get(path) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
        }
    }

    /// The resolved value with undefined leaves dropped from objects.
    pub fn defined_value(&self) -> Value {
        if self.undefined.is_empty() {
            return self.value.clone();
        }
        prune(&self.value, "", &self.undefined)
    }
}

fn prune(value: &Value, prefix: &str, undefined: &BTreeSet<String>) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter_map(|(key, child)| {
                    let path = join_path(prefix, key);
                    if undefined.contains(&path) {
                        None
                    } else {
                        Some((key.clone(), prune(child, &path, undefined)))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(idx, child)| prune(child, &join_path(prefix, &idx.to_string()), undefined))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn join_path(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{prefix}.{segment}")
    }
}

/// 按深度优先对字段树求值
pub fn resolve(schema: &ValueSchema, ctx: &dyn ContextLookup) -> ResolvedInput {
    let mut undefined = BTreeSet::new();
    let value = resolve_node(schema, ctx, "", &mut undefined);
    ResolvedInput { value, undefined }
}

/// Resolves an optional schema; a node without an input schema gets `{}`.
pub fn resolve_optional(schema: Option<&ValueSchema>, ctx: &dyn ContextLookup) -> ResolvedInput {
    match schema {
        Some(schema) => resolve(schema, ctx),
        None => ResolvedInput::empty(),
    }
}

fn resolve_node(
    schema: &ValueSchema,
    ctx: &dyn ContextLookup,
    path: &str,
    undefined: &mut BTreeSet<String>,
) -> Value {
    match schema {
        ValueSchema::Const { value } => value.clone(),
        ValueSchema::Expression { tokens } => match resolve_tokens(tokens, ctx) {
            Some(value) => value,
            None => {
                undefined.insert(path.to_string());
                Value::Null
            }
        },
        ValueSchema::Object { fields } => Value::Object(
            fields
                .iter()
                .map(|(key, field)| {
                    let child = join_path(path, key);
                    (key.clone(), resolve_node(field, ctx, &child, undefined))
                })
                .collect(),
        ),
        ValueSchema::Array { items } => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(idx, item)| {
                    let child = join_path(path, &idx.to_string());
                    resolve_node(item, ctx, &child, undefined)
                })
                .collect(),
        ),
    }
}

/// Evaluates one expression; `None` is the undefined marker.
pub fn resolve_tokens(tokens: &[Token], ctx: &dyn ContextLookup) -> Option<Value> {
    if let [Token::Reference { node_id, path }] = tokens {
        return ctx.lookup(node_id, path);
    }

    let mut rendered = String::new();
    for token in tokens {
        match token {
            Token::Input { value } => rendered.push_str(value),
            Token::Reference { node_id, path } => {
                let value = ctx.lookup(node_id, path)?;
                push_rendered(&mut rendered, &value);
            }
        }
    }
    Some(Value::String(rendered))
}

fn push_rendered(out: &mut String, value: &Value) {
    match value {
        Value::Null => {}
        Value::String(s) => out.push_str(s),
        other => out.push_str(&other.to_string()),
    }
}
