use std::collections::{BTreeMap, HashMap, HashSet};

use sdkgen_schema::{
    is_identifier, Definition, DefinitionKind, Parameter, Primitive, Schema, TypeExpr,
    SCHEMA_VERSION,
};
use tracing::warn;

use crate::{error::GenError, utils::quote};

/// Named types that would clash with identifiers every backend emits.
pub const RESERVED_TYPE_NAMES: [&str; 3] = ["Parameters", "Error", "Promise"];
/// Operation names that would clash with fixed output modules.
pub const RESERVED_OPERATION_NAMES: [&str; 4] = ["index", "loader", "exclusive", "parameters"];

/// Returns `Ok(())` if the schema is complete and consistent, or the first
/// `GenError::SchemaError` found otherwise.
pub fn verify_schema(schema: &Schema) -> Result<(), GenError> {
    if schema.version != SCHEMA_VERSION {
        return Err(GenError::schema(
            format!("Unsupported schema version {} (expected {})", schema.version, SCHEMA_VERSION),
            0,
            0,
        ));
    }

    let mut definitions: HashMap<&str, &Definition> = HashMap::new();

    // 1) Check duplicate / reserved type names
    for def in &schema.definitions {
        if !is_identifier(&def.name) {
            return Err(GenError::schema(
                format!("The type name {} is not a valid identifier", quote(&def.name)),
                def.line,
                def.column,
            ));
        }
        if Primitive::from_name(&def.name).is_some() {
            return Err(GenError::schema(
                format!("The type name {} shadows a primitive type", quote(&def.name)),
                def.line,
                def.column,
            ));
        }
        if RESERVED_TYPE_NAMES.contains(&def.name.as_str()) {
            return Err(GenError::schema(
                format!("The type name {} is reserved", quote(&def.name)),
                def.line,
                def.column,
            ));
        }
        if definitions.insert(def.name.as_str(), def).is_some() {
            return Err(GenError::schema(
                format!("The type {} is defined twice", quote(&def.name)),
                def.line,
                def.column,
            ));
        }
    }

    // 2) Check the body of each definition
    for def in &schema.definitions {
        let context = format!("{} {}", def.kind.label(), quote(&def.name));
        match &def.kind {
            DefinitionKind::Alias { target } => {
                check_reference(target, &definitions, &context, def.line, def.column)?;
            }
            DefinitionKind::Enum { variants } => {
                if variants.is_empty() {
                    return Err(GenError::schema(
                        format!("The enum {} has no variants", quote(&def.name)),
                        def.line,
                        def.column,
                    ));
                }
                let mut names = HashSet::new();
                let mut literals = HashSet::new();
                for variant in variants {
                    if !is_identifier(&variant.name) {
                        return Err(GenError::schema(
                            format!(
                                "The variant name {} in {} is not a valid identifier",
                                quote(&variant.name),
                                context
                            ),
                            def.line,
                            def.column,
                        ));
                    }
                    if !names.insert(variant.name.as_str()) || !literals.insert(variant.literal()) {
                        return Err(GenError::schema(
                            format!("The variant {} is declared twice in {}", quote(&variant.name), context),
                            def.line,
                            def.column,
                        ));
                    }
                }
            }
            DefinitionKind::Struct { fields } | DefinitionKind::Error { fields } => {
                check_fields(fields, &definitions, &context)?;
            }
        }
    }

    // 3) Check operations
    let mut operation_names = HashSet::new();
    for op in &schema.operations {
        let context = format!("operation {}", quote(&op.name));

        if !is_identifier(&op.name) {
            return Err(GenError::schema(
                format!("The operation name {} is not a valid identifier", quote(&op.name)),
                op.line,
                op.column,
            ));
        }
        if RESERVED_OPERATION_NAMES.contains(&op.name.as_str()) {
            return Err(GenError::schema(
                format!("The operation name {} is reserved", quote(&op.name)),
                op.line,
                op.column,
            ));
        }
        if !operation_names.insert(op.name.as_str()) {
            return Err(GenError::schema(
                format!("The operation {} is defined twice", quote(&op.name)),
                op.line,
                op.column,
            ));
        }

        check_fields(&op.params, &definitions, &context)?;

        if let Some(returns) = &op.returns {
            check_reference(returns, &definitions, &context, op.line, op.column)?;
            if let Some(name) = returns.named() {
                if matches!(definitions.get(name).map(|d| &d.kind), Some(DefinitionKind::Error { .. })) {
                    return Err(GenError::schema(
                        format!(
                            "The {} returns the error type {}; list it under throws instead",
                            context,
                            quote(name)
                        ),
                        op.line,
                        op.column,
                    ));
                }
            }
        }

        let mut thrown = HashSet::new();
        for name in &op.throws {
            match definitions.get(name.as_str()).map(|d| &d.kind) {
                Some(DefinitionKind::Error { .. }) => {}
                Some(other) => {
                    return Err(GenError::schema(
                        format!(
                            "The {} throws {} which is a {}, not an error",
                            context,
                            quote(name),
                            other.label()
                        ),
                        op.line,
                        op.column,
                    ));
                }
                None => {
                    return Err(GenError::schema(
                        format!("The error type {} thrown by {} is not defined", quote(name), context),
                        op.line,
                        op.column,
                    ));
                }
            }
            if !thrown.insert(name.as_str()) {
                return Err(GenError::schema(
                    format!("The {} throws {} twice", context, quote(name)),
                    op.line,
                    op.column,
                ));
            }
        }
    }

    Ok(())
}

fn check_reference(
    ty: &TypeExpr,
    definitions: &HashMap<&str, &Definition>,
    context: &str,
    line: usize,
    column: usize,
) -> Result<(), GenError> {
    match ty.named() {
        Some(name) if !definitions.contains_key(name) => Err(GenError::schema(
            format!("The type {} referenced by {} is not defined", quote(name), context),
            line,
            column,
        )),
        _ => Ok(()),
    }
}

/// Checks one field set (operation input, struct or error fields).
fn check_fields(
    fields: &[Parameter],
    definitions: &HashMap<&str, &Definition>,
    context: &str,
) -> Result<(), GenError> {
    let mut names = HashSet::new();
    let mut groups: BTreeMap<&str, Vec<&Parameter>> = BTreeMap::new();

    for field in fields {
        let field_context = format!("parameter {} of {}", quote(&field.name), context);

        if !is_identifier(&field.name) {
            return Err(GenError::schema(
                format!("The parameter name {} in {} is not a valid identifier", quote(&field.name), context),
                field.line,
                field.column,
            ));
        }
        if !names.insert(field.name.as_str()) {
            return Err(GenError::schema(
                format!("The parameter {} is declared twice in {}", quote(&field.name), context),
                field.line,
                field.column,
            ));
        }

        match &field.type_ {
            Some(ty) => check_reference(ty, definitions, &field_context, field.line, field.column)?,
            None if !field.optional => {
                return Err(GenError::schema(
                    format!("The required {} has no type", field_context),
                    field.line,
                    field.column,
                ));
            }
            None => {}
        }

        if let Some(group) = &field.group {
            if !is_identifier(group) {
                return Err(GenError::schema(
                    format!("The group name {} in {} is not a valid identifier", quote(group), context),
                    field.line,
                    field.column,
                ));
            }
            if field.optional {
                return Err(GenError::schema(
                    format!(
                        "The {} belongs to group {} and cannot be optional",
                        field_context,
                        quote(group)
                    ),
                    field.line,
                    field.column,
                ));
            }
            groups.entry(group.as_str()).or_default().push(field);
        }
    }

    for (group, members) in &groups {
        if members.len() == 1 {
            warn!(
                group = *group,
                parameter = members[0].name.as_str(),
                "group in {} has a single member; treating it as a required parameter",
                context
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parser::parse_schema, tokenizer::tokenize_schema};

    fn verify(text: &str) -> Result<(), GenError> {
        let schema = parse_schema(&tokenize_schema(text)?)?;
        verify_schema(&schema)
    }

    fn schema_error(text: &str) -> String {
        match verify(text) {
            Err(GenError::SchemaError { msg, .. }) => msg,
            other => panic!("expected SchemaError, got {:?}", other),
        }
    }

    #[test]
    fn test_verify_accepts_valid_schema() {
        verify(
            r#"
            type ChannelKey = string;
            error Failed { string code; }
            struct Result { string identityVerificationId; }
            operation verify returns Result throws Failed {
              string storeId;
              oneof channel { ChannelKey channelKey; object pgProvider; }
            }
            "#,
        )
        .expect("verification failed");
    }

    #[test]
    fn test_verify_duplicate_operation() {
        let msg = schema_error("operation verify {} operation verify {}");
        assert_eq!(msg, "The operation \"verify\" is defined twice");
    }

    #[test]
    fn test_verify_duplicate_and_reserved_types() {
        assert_eq!(
            schema_error("type A = string; type A = integer;"),
            "The type \"A\" is defined twice"
        );
        assert_eq!(schema_error("type Promise = string;"), "The type name \"Promise\" is reserved");
        assert_eq!(
            schema_error("type string = integer;"),
            "The type name \"string\" shadows a primitive type"
        );
        assert_eq!(schema_error("operation loader {}"), "The operation name \"loader\" is reserved");
    }

    #[test]
    fn test_verify_unresolved_reference_is_located() {
        let err = verify("operation verify {\n  Missing channelKey;\n}").unwrap_err();
        match err {
            GenError::SchemaError { msg, line, column } => {
                assert_eq!(
                    msg,
                    "The type \"Missing\" referenced by parameter \"channelKey\" of operation \"verify\" is not defined"
                );
                assert_eq!((line, column), (2, 11));
            }
            other => panic!("expected SchemaError, got {:?}", other),
        }
    }

    #[test]
    fn test_verify_unresolved_reference_through_array() {
        let msg = schema_error("struct A { Missing[] items; }");
        assert!(msg.contains("\"Missing\""), "{}", msg);
    }

    #[test]
    fn test_verify_required_parameter_without_type() {
        let mut schema = Schema::default();
        let mut op = sdkgen_schema::Operation {
            name:       "verify".into(),
            doc:        Default::default(),
            deprecated: false,
            params:     vec![Parameter::new("storeId", TypeExpr::Primitive(Primitive::String))],
            returns:    None,
            throws:     Vec::new(),
            line:       0,
            column:     0,
        };
        op.params[0].type_ = None;
        schema.operations.push(op.clone());
        let err = verify_schema(&schema).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Schema error: The required parameter \"storeId\" of operation \"verify\" has no type"
        );

        // Optional parameters may stay untyped
        op.params[0].optional = true;
        schema.operations[0] = op;
        verify_schema(&schema).expect("verification failed");
    }

    #[test]
    fn test_verify_group_members_cannot_be_optional() {
        let msg = schema_error("operation verify { oneof channel { string channelKey; object? pgProvider; } }");
        assert_eq!(
            msg,
            "The parameter \"pgProvider\" of operation \"verify\" belongs to group \"channel\" and cannot be optional"
        );
    }

    #[test]
    fn test_verify_single_member_group_is_accepted() {
        verify("operation verify { oneof channel { string channelKey; } }").expect("verification failed");
    }

    #[test]
    fn test_verify_enums() {
        assert_eq!(schema_error("enum E {}"), "The enum \"E\" has no variants");
        assert_eq!(
            schema_error("enum E { A; A; }"),
            "The variant \"A\" is declared twice in enum \"E\""
        );
        assert_eq!(
            schema_error(r#"enum E { A; B = "A"; }"#),
            "The variant \"B\" is declared twice in enum \"E\""
        );
    }

    #[test]
    fn test_verify_returns_and_throws() {
        assert_eq!(
            schema_error("error Failed { string code; } operation verify returns Failed {}"),
            "The operation \"verify\" returns the error type \"Failed\"; list it under throws instead"
        );
        assert_eq!(
            schema_error("struct Result { string id; } operation verify throws Result {}"),
            "The operation \"verify\" throws \"Result\" which is a struct, not an error"
        );
        assert_eq!(
            schema_error("operation verify throws Missing {}"),
            "The error type \"Missing\" thrown by operation \"verify\" is not defined"
        );
    }

    #[test]
    fn test_verify_duplicate_parameter() {
        assert_eq!(
            schema_error("struct S { string a; integer a; }"),
            "The parameter \"a\" is declared twice in struct \"S\""
        );
    }

    #[test]
    fn test_verify_version() {
        let schema = Schema { version: 2, ..Schema::default() };
        assert_eq!(
            verify_schema(&schema).unwrap_err().to_string(),
            "Schema error: Unsupported schema version 2 (expected 1)"
        );
    }
}
