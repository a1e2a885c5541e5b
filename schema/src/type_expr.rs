use std::{borrow::Cow, fmt};

use schemars::{json_schema, JsonSchema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::is_identifier;

/// Built-in scalar types every backend must be able to name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Primitive {
    String,
    Integer,
    Number,
    Boolean,
    /// A free-form JSON object.
    Object,
}

impl Primitive {
    pub const ALL: [Primitive; 5] = [
        Primitive::String,
        Primitive::Integer,
        Primitive::Number,
        Primitive::Boolean,
        Primitive::Object,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Primitive::String  => "string",
            Primitive::Integer => "integer",
            Primitive::Number  => "number",
            Primitive::Boolean => "boolean",
            Primitive::Object  => "object",
        }
    }

    pub fn from_name(name: &str) -> Option<Primitive> {
        Primitive::ALL.into_iter().find(|p| p.name() == name)
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A semantic type reference as written in the schema.
///
/// In JSON schemas a type is a plain string (`"string"`, `"ChannelKey"`,
/// `"string[]"`), so the serde representation goes through [`TypeExpr::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TypeExpr {
    Primitive(Primitive),
    /// Reference to a named type, by name.
    Named(String),
    Array(Box<TypeExpr>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid type expression \"{text}\"")]
pub struct TypeExprError {
    pub text: String,
}

impl TypeExpr {
    pub fn parse(text: &str) -> Result<TypeExpr, TypeExprError> {
        let trimmed = text.trim();
        if let Some(item) = trimmed.strip_suffix("[]") {
            return TypeExpr::parse(item).map(|item| TypeExpr::Array(Box::new(item)));
        }
        if let Some(primitive) = Primitive::from_name(trimmed) {
            return Ok(TypeExpr::Primitive(primitive));
        }
        if is_identifier(trimmed) {
            return Ok(TypeExpr::Named(trimmed.to_string()));
        }
        Err(TypeExprError { text: text.to_string() })
    }

    /// The named type this expression ultimately refers to, looking through arrays.
    pub fn named(&self) -> Option<&str> {
        match self {
            TypeExpr::Primitive(_) => None,
            TypeExpr::Named(name)  => Some(name),
            TypeExpr::Array(item)  => item.named(),
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Primitive(p) => write!(f, "{}", p),
            TypeExpr::Named(name)  => f.write_str(name),
            TypeExpr::Array(item)  => write!(f, "{}[]", item),
        }
    }
}

impl TryFrom<String> for TypeExpr {
    type Error = TypeExprError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        TypeExpr::parse(&text)
    }
}

impl From<TypeExpr> for String {
    fn from(ty: TypeExpr) -> String {
        ty.to_string()
    }
}

impl JsonSchema for TypeExpr {
    fn schema_name() -> Cow<'static, str> {
        "TypeExpr".into()
    }

    fn json_schema(_: &mut SchemaGenerator) -> schemars::Schema {
        json_schema!({
            "type": "string",
            "description": "A primitive (string, integer, number, boolean, object) or a named type, followed by any number of `[]`.",
            "pattern": "^[A-Za-z_][A-Za-z0-9_]*(\\[\\])*$"
        })
    }
}
