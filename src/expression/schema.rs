use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FlowEngineError, Result};

/// 表达式片段
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Token {
    /// 字面文本
    Input { value: String },
    /// 引用某个节点输出中的字段
    Reference {
        node_id: String,
        #[serde(default)]
        path: String,
    },
}

impl Token {
    pub fn input(value: impl Into<String>) -> Self {
        Token::Input {
            value: value.into(),
        }
    }

    pub fn reference(node_id: impl Into<String>, path: impl Into<String>) -> Self {
        Token::Reference {
            node_id: node_id.into(),
            path: path.into(),
        }
    }
}

/// 有序的表达式片段列表
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Expression {
    pub tokens: Vec<Token>,
}

impl Expression {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    /// Parses the `{{node_id.path}}` template shorthand used by the editor.
    pub fn parse(template: &str) -> Result<Self> {
        let mut tokens = Vec::new();
        let mut rest = template;
        while let Some(open) = rest.find("{{") {
            if open > 0 {
                tokens.push(Token::input(&rest[..open]));
            }
            let after = &rest[open + 2..];
            let close = after.find("}}").ok_or_else(|| {
                FlowEngineError::InvalidExpression(format!("unterminated `{{{{` in `{template}`"))
            })?;
            tokens.push(parse_reference(after[..close].trim(), template)?);
            rest = &after[close + 2..];
        }
        if !rest.is_empty() {
            tokens.push(Token::input(rest));
        }
        Ok(Self { tokens })
    }

    pub fn references(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tokens.iter().filter_map(|token| match token {
            Token::Reference { node_id, path } => Some((node_id.as_str(), path.as_str())),
            Token::Input { .. } => None,
        })
    }
}

fn parse_reference(raw: &str, template: &str) -> Result<Token> {
    if raw.is_empty() {
        return Err(FlowEngineError::InvalidExpression(format!(
            "empty reference in `{template}`"
        )));
    }
    let (node_id, path) = raw.split_once('.').unwrap_or((raw, ""));
    let bad_path = !path.is_empty() && path.split('.').any(|seg| seg.is_empty());
    if node_id.is_empty() || bad_path {
        return Err(FlowEngineError::InvalidExpression(format!(
            "malformed reference `{raw}` in `{template}`"
        )));
    }
    Ok(Token::reference(node_id, path))
}

/// 节点输入/输出的字段树
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValueSchema {
    Const { value: Value },
    Expression { tokens: Vec<Token> },
    Object { fields: BTreeMap<String, ValueSchema> },
    Array { items: Vec<ValueSchema> },
}

impl ValueSchema {
    pub fn constant(value: Value) -> Self {
        ValueSchema::Const { value }
    }

    pub fn expression(expression: Expression) -> Self {
        ValueSchema::Expression {
            tokens: expression.tokens,
        }
    }

    pub fn reference(node_id: impl Into<String>, path: impl Into<String>) -> Self {
        ValueSchema::Expression {
            tokens: vec![Token::reference(node_id, path)],
        }
    }

    pub fn template(template: &str) -> Result<Self> {
        Expression::parse(template).map(Self::expression)
    }

    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, ValueSchema)>,
        K: Into<String>,
    {
        ValueSchema::Object {
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Every `(node_id, path)` referenced anywhere in the tree, depth-first.
    pub fn references(&self) -> Vec<(&str, &str)> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<(&'a str, &'a str)>) {
        match self {
            ValueSchema::Const { .. } => {}
            ValueSchema::Expression { tokens } => {
                for token in tokens {
                    if let Token::Reference { node_id, path } = token {
                        out.push((node_id.as_str(), path.as_str()));
                    }
                }
            }
            ValueSchema::Object { fields } => {
                for field in fields.values() {
                    field.collect_references(out);
                }
            }
            ValueSchema::Array { items } => {
                for item in items {
                    item.collect_references(out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_template_into_tokens() {
        let expr = Expression::parse("Hello {{start.user.name}}, bye").unwrap();
        assert_eq!(
            expr.tokens,
            vec![
                Token::input("Hello "),
                Token::reference("start", "user.name"),
                Token::input(", bye"),
            ]
        );
    }

    #[test]
    fn whole_output_reference_has_empty_path() {
        let expr = Expression::parse("{{ llm }}").unwrap();
        assert_eq!(expr.tokens, vec![Token::reference("llm", "")]);
    }

    #[test]
    fn malformed_templates_are_rejected() {
        assert!(Expression::parse("{{start.name").is_err());
        assert!(Expression::parse("{{}}").is_err());
        assert!(Expression::parse("{{start..name}}").is_err());
    }

    #[test]
    fn schema_deserializes_from_editor_json() {
        let schema: ValueSchema = serde_json::from_value(json!({
            "type": "object",
            "fields": {
                "url": {"type": "expression", "tokens": [
                    {"type": "input", "value": "https://x/"},
                    {"type": "reference", "node_id": "start", "path": "id"}
                ]},
                "retries": {"type": "const", "value": 2}
            }
        }))
        .unwrap();
        assert_eq!(schema.references(), vec![("start", "id")]);
    }
}
