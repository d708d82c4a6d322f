use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 参数值的形状
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchemaKind {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    /// A string restricted to a fixed set of values.
    Enum { values: Vec<String> },
    Array { items: Box<Schema> },
    Object {
        properties: BTreeMap<String, Schema>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        required: Vec<String>,
        #[serde(default = "Schema::open_by_default")]
        additional_properties: bool,
    },
    Any,
}

/// 节点参数 / 工具输入的 Schema
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Schema {
    #[serde(flatten)]
    pub kind: SchemaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// 允许为 null（参数未填写）
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub nullable: bool,
}

impl From<SchemaKind> for Schema {
    fn from(kind: SchemaKind) -> Self {
        Schema {
            kind,
            description: None,
            nullable: false,
        }
    }
}

impl Schema {
    pub fn any() -> Self {
        SchemaKind::Any.into()
    }

    pub fn string() -> Self {
        SchemaKind::String.into()
    }

    pub fn integer() -> Self {
        SchemaKind::Integer.into()
    }

    pub fn number() -> Self {
        SchemaKind::Number.into()
    }

    pub fn boolean() -> Self {
        SchemaKind::Boolean.into()
    }

    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SchemaKind::Enum {
            values: values.into_iter().map(Into::into).collect(),
        }
        .into()
    }

    pub fn array(items: Schema) -> Self {
        SchemaKind::Array {
            items: Box::new(items),
        }
        .into()
    }

    /// Unknown keys are accepted; see [`Schema::closed`].
    pub fn object<I, K>(properties: I, required: &[&str]) -> Self
    where
        I: IntoIterator<Item = (K, Schema)>,
        K: Into<String>,
    {
        SchemaKind::Object {
            properties: properties.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            required: required.iter().map(|s| s.to_string()).collect(),
            additional_properties: true,
        }
        .into()
    }

    pub fn empty_object() -> Self {
        Self::object(Vec::<(String, Schema)>::new(), &[])
    }

    /// Rejects object keys that are not declared.
    pub fn closed(mut self) -> Self {
        if let SchemaKind::Object {
            additional_properties,
            ..
        } = &mut self.kind
        {
            *additional_properties = false;
        }
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    fn open_by_default() -> bool {
        true
    }
}
