use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{DocBlock, TypeExpr, SCHEMA_VERSION};

fn default_version() -> u32 {
    SCHEMA_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(default = "default_version")]
    pub version:     u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package:     Option<String>,
    #[serde(default)]
    pub definitions: Vec<Definition>,
    #[serde(default)]
    pub operations:  Vec<Operation>,
}

impl Default for Schema {
    fn default() -> Self {
        Schema {
            version:     SCHEMA_VERSION,
            package:     None,
            definitions: Vec::new(),
            operations:  Vec::new(),
        }
    }
}

impl Schema {
    pub fn definition(&self, name: &str) -> Option<&Definition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.operations.iter().find(|o| o.name == name)
    }
}

/// A reusable named type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Definition {
    pub name:       String,
    #[serde(default, skip_serializing_if = "DocBlock::is_empty")]
    pub doc:        DocBlock,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
    #[serde(flatten)]
    pub kind:       DefinitionKind,
    #[serde(skip)]
    pub line:       usize,
    #[serde(skip)]
    pub column:     usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DefinitionKind {
    /// `type ChannelKey = string;`
    Alias  { target: TypeExpr },
    /// A closed set of string literals.
    Enum   { variants: Vec<EnumVariant> },
    /// An object with named fields.
    Struct { fields: Vec<Parameter> },
    /// A failure an operation may report.
    Error  { fields: Vec<Parameter> },
}

impl DefinitionKind {
    pub fn label(&self) -> &'static str {
        match self {
            DefinitionKind::Alias { .. }  => "alias",
            DefinitionKind::Enum { .. }   => "enum",
            DefinitionKind::Struct { .. } => "struct",
            DefinitionKind::Error { .. }  => "error",
        }
    }
}

impl Definition {
    /// Fields of a struct or error definition.
    pub fn fields(&self) -> Option<&[Parameter]> {
        match &self.kind {
            DefinitionKind::Struct { fields } | DefinitionKind::Error { fields } => Some(fields),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnumVariant {
    pub name:       String,
    /// Literal sent on the wire; defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value:      Option<String>,
    #[serde(default, skip_serializing_if = "DocBlock::is_empty")]
    pub doc:        DocBlock,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
}

impl EnumVariant {
    pub fn literal(&self) -> &str {
        self.value.as_deref().unwrap_or(&self.name)
    }
}

/// A named field of an operation input, struct or error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name:       String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_:      Option<TypeExpr>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional:   bool,
    /// Exclusivity group: of all parameters sharing this identifier exactly
    /// one must be supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group:      Option<String>,
    #[serde(default, skip_serializing_if = "DocBlock::is_empty")]
    pub doc:        DocBlock,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
    #[serde(skip)]
    pub line:       usize,
    #[serde(skip)]
    pub column:     usize,
}

impl Parameter {
    pub fn new(name: &str, type_: TypeExpr) -> Self {
        Parameter {
            name:       name.to_string(),
            type_:      Some(type_),
            optional:   false,
            group:      None,
            doc:        DocBlock::default(),
            deprecated: false,
            line:       0,
            column:     0,
        }
    }
}

/// A named callable unit of the client API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub name:       String,
    #[serde(default, skip_serializing_if = "DocBlock::is_empty")]
    pub doc:        DocBlock,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
    #[serde(rename = "input", default)]
    pub params:     Vec<Parameter>,
    /// Success value; `None` means the operation resolves without a value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns:    Option<TypeExpr>,
    /// Names of `error` definitions the operation may fail with.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub throws:     Vec<String>,
    #[serde(skip)]
    pub line:       usize,
    #[serde(skip)]
    pub column:     usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Primitive;

    #[test]
    fn deserialize_json_schema() {
        let json = r#"{
            "package": "acme",
            "definitions": [
                { "name": "ChannelKey", "kind": "alias", "target": "string",
                  "doc": [{ "lang": "en", "title": "Channel key", "body": "From the console." }] },
                { "name": "Currency", "kind": "enum",
                  "variants": [{ "name": "KRW" }, { "name": "USD", "value": "CURRENCY_USD" }] }
            ],
            "operations": [{
                "name": "verify",
                "input": [
                    { "name": "storeId", "type": "string" },
                    { "name": "channelKey", "type": "ChannelKey", "group": "channel" },
                    { "name": "pgProvider", "type": "object", "group": "channel" }
                ]
            }]
        }"#;

        let schema: Schema = serde_json::from_str(json).unwrap();
        assert_eq!(schema.version, SCHEMA_VERSION);
        assert_eq!(schema.package.as_deref(), Some("acme"));
        assert_eq!(schema.definitions.len(), 2);

        let alias = schema.definition("ChannelKey").unwrap();
        assert_eq!(
            alias.kind,
            DefinitionKind::Alias { target: TypeExpr::Primitive(Primitive::String) }
        );
        assert_eq!(alias.doc.sections[0].title.as_deref(), Some("Channel key"));

        match &schema.definition("Currency").unwrap().kind {
            DefinitionKind::Enum { variants } => {
                assert_eq!(variants[0].literal(), "KRW");
                assert_eq!(variants[1].literal(), "CURRENCY_USD");
            }
            other => panic!("expected enum, got {:?}", other),
        }

        let verify = schema.operation("verify").unwrap();
        assert_eq!(verify.params.len(), 3);
        assert_eq!(verify.params[1].group.as_deref(), Some("channel"));
        assert_eq!(verify.returns, None);
    }

    #[test]
    fn serialize_skips_defaults() {
        let schema = Schema {
            operations: vec![Operation {
                name:       "ping".into(),
                doc:        DocBlock::default(),
                deprecated: false,
                params:     vec![Parameter::new("id", TypeExpr::Primitive(Primitive::String))],
                returns:    None,
                throws:     Vec::new(),
                line:       3,
                column:     1,
            }],
            ..Schema::default()
        };
        let json = serde_json::to_string(&schema).unwrap();
        assert_eq!(
            json,
            r#"{"version":1,"definitions":[],"operations":[{"name":"ping","input":[{"name":"id","type":"string"}]}]}"#
        );
    }
}
