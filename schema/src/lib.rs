//! Schema model for the sdkgen generator.
//!
//! A [`Schema`] is the in-memory entity graph every generation run starts
//! from: operations in declaration order, reusable named types, parameter
//! declarations (with optional exclusivity groups) and the documentation
//! blocks attached to each of them.
//!
//! ```
//! use sdkgen_schema::*;
//!
//! let ty = TypeExpr::parse("ChannelKey[]").unwrap();
//! assert_eq!(ty.named(), Some("ChannelKey"));
//! assert_eq!(ty.to_string(), "ChannelKey[]");
//!
//! let doc = DocBlock::from_doc_lines(["[ko] 채널 키", "콘솔에서 표시되는 채널 키입니다."]);
//! assert_eq!(doc.sections[0].lang.as_deref(), Some("ko"));
//! assert_eq!(doc.sections[0].title.as_deref(), Some("채널 키"));
//! ```

pub mod doc;
pub mod type_expr;
pub mod types;

pub use doc::*;
pub use type_expr::*;
pub use types::*;

/// The only schema format version this model understands.
pub const SCHEMA_VERSION: u32 = 1;

/// JSON Schema of the `.json` input format, for editor validation.
pub fn input_json_schema() -> schemars::Schema {
    schemars::schema_for!(Schema)
}

/// Returns true for `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert!(is_identifier("storeId"));
        assert!(is_identifier("_private"));
        assert!(is_identifier("Type2"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("2fast"));
        assert!(!is_identifier("with-dash"));
        assert!(!is_identifier("string[]"));
    }

    #[test]
    fn input_json_schema_describes_the_json_format() {
        let schema = serde_json::to_value(input_json_schema()).unwrap();
        assert_eq!(schema["properties"]["operations"]["items"]["$ref"], "#/$defs/Operation");

        let defs = &schema["$defs"];
        assert!(defs["Operation"]["properties"].get("input").is_some());
        assert!(defs["Operation"]["properties"].get("line").is_none());
        assert!(defs["Parameter"]["properties"].get("type").is_some());
        assert!(defs["Parameter"]["properties"].get("group").is_some());
        assert_eq!(defs["TypeExpr"]["type"], "string");
    }
}
