use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::expression::{resolve, ContextLookup, ValueSchema};

/// 比较运算符
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    IsEmpty,
    IsNotEmpty,
    Exists,
    NotExists,
}

/// 结构化的条件定义
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    Compare {
        left: ValueSchema,
        operator: Operator,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        right: Option<ValueSchema>,
    },
    All {
        conditions: Vec<Condition>,
    },
    Any {
        conditions: Vec<Condition>,
    },
    Not {
        condition: Box<Condition>,
    },
    Always,
}

impl Condition {
    pub fn compare(left: ValueSchema, operator: Operator, right: ValueSchema) -> Self {
        Condition::Compare {
            left,
            operator,
            right: Some(right),
        }
    }

    pub fn unary(left: ValueSchema, operator: Operator) -> Self {
        Condition::Compare {
            left,
            operator,
            right: None,
        }
    }

    pub fn evaluate(&self, ctx: &dyn ContextLookup) -> bool {
        match self {
            Condition::Always => true,
            Condition::All { conditions } => conditions.iter().all(|c| c.evaluate(ctx)),
            Condition::Any { conditions } => conditions.iter().any(|c| c.evaluate(ctx)),
            Condition::Not { condition } => !condition.evaluate(ctx),
            Condition::Compare {
                left,
                operator,
                right,
            } => {
                let left = resolve(left, ctx).get("").cloned();
                let right = right.as_ref().and_then(|r| resolve(r, ctx).get("").cloned());
                compare(left.as_ref(), *operator, right.as_ref())
            }
        }
    }

    pub fn schemas(&self) -> Vec<&ValueSchema> {
        match self {
            Condition::Always => Vec::new(),
            Condition::All { conditions } | Condition::Any { conditions } => {
                conditions.iter().flat_map(Condition::schemas).collect()
            }
            Condition::Not { condition } => condition.schemas(),
            Condition::Compare { left, right, .. } => {
                let mut out = vec![left];
                out.extend(right.as_ref());
                out
            }
        }
    }
}

fn compare(left: Option<&Value>, operator: Operator, right: Option<&Value>) -> bool {
    match operator {
        Operator::Exists => left.is_some_and(|v| !v.is_null()),
        Operator::NotExists => left.map_or(true, Value::is_null),
        Operator::IsEmpty => left.map_or(true, is_empty),
        Operator::IsNotEmpty => left.is_some_and(|v| !is_empty(v)),
        _ => {
            let (Some(left), Some(right)) = (left, right) else {
                return false;
            };
            match operator {
                Operator::Equals => loose_eq(left, right),
                Operator::NotEquals => !loose_eq(left, right),
                Operator::GreaterThan => numeric(left, right).is_some_and(|(l, r)| l > r),
                Operator::GreaterOrEqual => numeric(left, right).is_some_and(|(l, r)| l >= r),
                Operator::LessThan => numeric(left, right).is_some_and(|(l, r)| l < r),
                Operator::LessOrEqual => numeric(left, right).is_some_and(|(l, r)| l <= r),
                Operator::Contains => contains(left, right),
                Operator::NotContains => !contains(left, right),
                Operator::StartsWith => as_text(left).starts_with(&as_text(right)),
                Operator::EndsWith => as_text(left).ends_with(&as_text(right)),
                _ => false,
            }
        }
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn numeric(left: &Value, right: &Value) -> Option<(f64, f64)> {
    Some((as_number(left)?, as_number(right)?))
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    match (left, right) {
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            numeric(left, right).is_some_and(|(l, r)| l == r)
        }
        (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => {
            s.eq_ignore_ascii_case(if *b { "true" } else { "false" })
        }
        _ => false,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.iter().any(|item| loose_eq(item, needle)),
        Value::Object(map) => needle.as_str().is_some_and(|key| map.contains_key(key)),
        Value::String(s) => s.contains(&as_text(needle)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::lookup_path;
    use serde_json::json;

    struct One(Value);

    impl ContextLookup for One {
        fn lookup(&self, node_id: &str, path: &str) -> Option<Value> {
            (node_id == "n").then(|| lookup_path(&self.0, path).cloned()).flatten()
        }
    }

    fn ctx() -> One {
        One(json!({"score": "42", "tags": ["a", "b"], "name": "flow", "empty": ""}))
    }

    #[test]
    fn numeric_strings_compare_as_numbers() {
        let c = Condition::compare(
            ValueSchema::reference("n", "score"),
            Operator::GreaterThan,
            ValueSchema::constant(json!(40)),
        );
        assert!(c.evaluate(&ctx()));
        let c = Condition::compare(
            ValueSchema::reference("n", "score"),
            Operator::Equals,
            ValueSchema::constant(json!(42)),
        );
        assert!(c.evaluate(&ctx()));
    }

    #[test]
    fn undefined_operands_only_satisfy_absence_checks() {
        let missing = ValueSchema::reference("other", "x");
        assert!(!Condition::compare(
            missing.clone(),
            Operator::NotEquals,
            ValueSchema::constant(json!(1))
        )
        .evaluate(&ctx()));
        assert!(Condition::unary(missing.clone(), Operator::NotExists).evaluate(&ctx()));
        assert!(Condition::unary(missing, Operator::IsEmpty).evaluate(&ctx()));
    }

    #[test]
    fn combinators_and_containment() {
        let c = Condition::All {
            conditions: vec![
                Condition::compare(
                    ValueSchema::reference("n", "tags"),
                    Operator::Contains,
                    ValueSchema::constant(json!("b")),
                ),
                Condition::Not {
                    condition: Box::new(Condition::unary(
                        ValueSchema::reference("n", "name"),
                        Operator::IsEmpty,
                    )),
                },
                Condition::compare(
                    ValueSchema::reference("n", "name"),
                    Operator::StartsWith,
                    ValueSchema::constant(json!("fl")),
                ),
            ],
        };
        assert!(c.evaluate(&ctx()));
    }

    #[test]
    fn deserializes_tagged_json() {
        let c: Condition = serde_json::from_value(json!({
            "type": "compare",
            "left": {"type": "expression", "tokens": [{"type": "reference", "node_id": "n", "path": "empty"}]},
            "operator": "is_empty"
        }))
        .unwrap();
        assert!(c.evaluate(&ctx()));
    }
}
