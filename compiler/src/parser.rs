use crate::{
    tokenizer::Token,
    utils::{error, quote},
    error::GenError,
};
use lazy_static::lazy_static;
use regex::Regex;
use sdkgen_schema::{
    Definition, DefinitionKind, DocBlock, EnumVariant, Operation, Parameter, Schema, TypeExpr,
    SCHEMA_VERSION,
};

lazy_static! {
    static ref IDENTIFIER:        Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex");
    static ref EQUALS:            Regex = Regex::new(r"^=$").expect("valid regex");
    static ref SEMICOLON:         Regex = Regex::new(r"^;$").expect("valid regex");
    static ref COMMA:             Regex = Regex::new(r"^,$").expect("valid regex");
    static ref QUESTION:          Regex = Regex::new(r"^\?$").expect("valid regex");
    static ref INTEGER:           Regex = Regex::new(r"^-?\d+$").expect("valid regex");
    static ref STRING_LITERAL:    Regex = Regex::new(r#"^"(?:[^"\\]|\\.)*"$"#).expect("valid regex");
    static ref LEFT_BRACE:        Regex = Regex::new(r"^\{$").expect("valid regex");
    static ref RIGHT_BRACE:       Regex = Regex::new(r"^\}$").expect("valid regex");
    static ref ARRAY_TOKEN:       Regex = Regex::new(r"^\[\]$").expect("valid regex");
    static ref VERSION_KEYWORD:   Regex = Regex::new(r"^version$").expect("valid regex");
    static ref PACKAGE_KEYWORD:   Regex = Regex::new(r"^package$").expect("valid regex");
    static ref TYPE_KEYWORD:      Regex = Regex::new(r"^type$").expect("valid regex");
    static ref ENUM_KEYWORD:      Regex = Regex::new(r"^enum$").expect("valid regex");
    static ref STRUCT_KEYWORD:    Regex = Regex::new(r"^struct$").expect("valid regex");
    static ref ERROR_KEYWORD:     Regex = Regex::new(r"^error$").expect("valid regex");
    static ref OPERATION_KEYWORD: Regex = Regex::new(r"^operation$").expect("valid regex");
    static ref RETURNS_KEYWORD:   Regex = Regex::new(r"^returns$").expect("valid regex");
    static ref THROWS_KEYWORD:    Regex = Regex::new(r"^throws$").expect("valid regex");
    static ref ONEOF_KEYWORD:     Regex = Regex::new(r"^oneof$").expect("valid regex");
    static ref DEPRECATED_TOKEN:  Regex = Regex::new(r"^\[deprecated\]$").expect("valid regex");
    static ref EOF:               Regex = Regex::new(r"^$").expect("valid regex");
}

/// Parses the token stream of a textual schema into a [`Schema`].
pub fn parse_schema(tokens: &[Token]) -> Result<Schema, GenError> {
    Parser::new(tokens).parse()
}

struct Parser<'a> {
    tokens: &'a [Token],
    index:  usize,
    eof:    Token,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        let (line, column) = tokens.last().map_or((1, 1), |t| (t.line, t.column));
        Parser {
            tokens,
            index: 0,
            eof: Token { text: String::new(), line, column },
        }
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.index).unwrap_or(&self.eof)
    }

    fn at_end(&self) -> bool {
        self.index >= self.tokens.len() || EOF.is_match(&self.current().text)
    }

    fn peek(&self, test: &Regex) -> bool {
        self.index < self.tokens.len() && test.is_match(&self.current().text)
    }

    fn eat(&mut self, test: &Regex) -> bool {
        if self.peek(test) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, test: &Regex, expected: &str) -> Result<(), GenError> {
        if !self.eat(test) {
            let tok = self.current();
            return Err(error(
                &format!("Expected {} but found {}", expected, quote(&tok.text)),
                tok.line,
                tok.column,
            ));
        }
        Ok(())
    }

    /// Consumes an identifier and returns `(text, line, column)`.
    fn identifier(&mut self) -> Result<(String, usize, usize), GenError> {
        let tok = self.current();
        let found = (tok.text.clone(), tok.line, tok.column);
        self.expect(&IDENTIFIER, "identifier")?;
        Ok(found)
    }

    fn unexpected_token(&self) -> GenError {
        let tok = self.current();
        error(&format!("Unexpected token {}", quote(&tok.text)), tok.line, tok.column)
    }

    /// Collects consecutive `///` comments into a documentation block.
    fn docs(&mut self) -> DocBlock {
        let mut lines = Vec::new();
        while self.index < self.tokens.len() && self.current().is_doc() {
            lines.push(self.current().doc_text().to_string());
            self.index += 1;
        }
        DocBlock::from_doc_lines(lines)
    }

    fn reject_dangling_docs(&self, doc: &DocBlock, what: &str) -> Result<(), GenError> {
        if doc.is_empty() {
            return Ok(());
        }
        let tok = self.current();
        Err(error(
            &format!("Doc comment is not attached to anything before {}", what),
            tok.line,
            tok.column,
        ))
    }

    fn parse(mut self) -> Result<Schema, GenError> {
        let mut schema = Schema::default();

        // Header: optional version and package declarations. Docs read here
        // belong to the first declaration unless a header keyword follows.
        let mut pending = self.docs();
        if self.peek(&VERSION_KEYWORD) {
            self.reject_dangling_docs(&pending, "\"version\"")?;
            self.index += 1;
            let tok = self.current();
            let (text, line, column) = (tok.text.clone(), tok.line, tok.column);
            self.expect(&INTEGER, "integer")?;
            schema.version = text.parse::<u32>().map_err(|_| {
                error(&format!("Invalid version {}", quote(&text)), line, column)
            })?;
            self.expect(&SEMICOLON, "\";\"")?;
            pending = self.docs();
        } else {
            schema.version = SCHEMA_VERSION;
        }

        if self.peek(&PACKAGE_KEYWORD) {
            self.reject_dangling_docs(&pending, "\"package\"")?;
            self.index += 1;
            let (name, _, _) = self.identifier()?;
            schema.package = Some(name);
            self.expect(&SEMICOLON, "\";\"")?;
            pending = self.docs();
        }

        // Declarations one by one
        let mut pending = Some(pending);
        loop {
            let doc = match pending.take() {
                Some(doc) => doc,
                None => self.docs(),
            };
            if self.at_end() {
                self.reject_dangling_docs(&doc, "end of file")?;
                break;
            }

            if self.eat(&OPERATION_KEYWORD) {
                let operation = self.operation(doc)?;
                schema.operations.push(operation);
            } else if self.eat(&TYPE_KEYWORD) {
                let definition = self.alias(doc)?;
                schema.definitions.push(definition);
            } else if self.eat(&ENUM_KEYWORD) {
                let definition = self.enumeration(doc)?;
                schema.definitions.push(definition);
            } else if self.eat(&STRUCT_KEYWORD) {
                let (name, line, column, deprecated) = self.definition_head()?;
                let fields = self.members()?;
                schema.definitions.push(Definition {
                    name, doc, deprecated, line, column,
                    kind: DefinitionKind::Struct { fields },
                });
            } else if self.eat(&ERROR_KEYWORD) {
                let (name, line, column, deprecated) = self.definition_head()?;
                let fields = self.members()?;
                schema.definitions.push(Definition {
                    name, doc, deprecated, line, column,
                    kind: DefinitionKind::Error { fields },
                });
            } else {
                return Err(self.unexpected_token());
            }
        }

        Ok(schema)
    }

    fn definition_head(&mut self) -> Result<(String, usize, usize, bool), GenError> {
        let (name, line, column) = self.identifier()?;
        let deprecated = self.eat(&DEPRECATED_TOKEN);
        Ok((name, line, column, deprecated))
    }

    fn type_expr(&mut self) -> Result<TypeExpr, GenError> {
        let (name, line, column) = self.identifier()?;
        let mut ty = TypeExpr::parse(&name)
            .map_err(|e| error(&e.to_string(), line, column))?;
        while self.eat(&ARRAY_TOKEN) {
            ty = TypeExpr::Array(Box::new(ty));
        }
        Ok(ty)
    }

    fn alias(&mut self, doc: DocBlock) -> Result<Definition, GenError> {
        let (name, line, column, deprecated) = self.definition_head()?;
        self.expect(&EQUALS, "\"=\"")?;
        let target = self.type_expr()?;
        self.expect(&SEMICOLON, "\";\"")?;
        Ok(Definition {
            name, doc, deprecated, line, column,
            kind: DefinitionKind::Alias { target },
        })
    }

    fn enumeration(&mut self, doc: DocBlock) -> Result<Definition, GenError> {
        let (name, line, column, deprecated) = self.definition_head()?;
        self.expect(&LEFT_BRACE, "\"{\"")?;

        let mut variants = Vec::new();
        loop {
            let variant_doc = self.docs();
            if self.peek(&RIGHT_BRACE) {
                self.reject_dangling_docs(&variant_doc, "\"}\"")?;
                self.index += 1;
                break;
            }
            let (variant_name, _, _) = self.identifier()?;

            let value = if self.eat(&EQUALS) {
                let tok = self.current();
                let (text, l, c) = (tok.text.clone(), tok.line, tok.column);
                self.expect(&STRING_LITERAL, "string literal")?;
                let literal = serde_json::from_str::<String>(&text)
                    .map_err(|_| error(&format!("Invalid string literal {}", text), l, c))?;
                Some(literal)
            } else {
                None
            };

            let variant_deprecated = self.eat(&DEPRECATED_TOKEN);
            self.expect(&SEMICOLON, "\";\"")?;

            variants.push(EnumVariant {
                name:       variant_name,
                value,
                doc:        variant_doc,
                deprecated: variant_deprecated,
            });
        }

        Ok(Definition {
            name, doc, deprecated, line, column,
            kind: DefinitionKind::Enum { variants },
        })
    }

    fn operation(&mut self, doc: DocBlock) -> Result<Operation, GenError> {
        let (name, line, column, deprecated) = self.definition_head()?;

        let returns = if self.eat(&RETURNS_KEYWORD) {
            Some(self.type_expr()?)
        } else {
            None
        };

        let mut throws = Vec::new();
        if self.eat(&THROWS_KEYWORD) {
            loop {
                let (error_name, _, _) = self.identifier()?;
                throws.push(error_name);
                if !self.eat(&COMMA) {
                    break;
                }
            }
        }

        let params = self.members()?;

        Ok(Operation { name, doc, deprecated, params, returns, throws, line, column })
    }

    /// `{ field* }` where fields may be wrapped in `oneof <group> { ... }`.
    fn members(&mut self) -> Result<Vec<Parameter>, GenError> {
        self.expect(&LEFT_BRACE, "\"{\"")?;

        let mut fields = Vec::new();
        loop {
            let doc = self.docs();
            if self.peek(&RIGHT_BRACE) {
                self.reject_dangling_docs(&doc, "\"}\"")?;
                self.index += 1;
                break;
            }

            if self.eat(&ONEOF_KEYWORD) {
                self.reject_dangling_docs(&doc, "\"oneof\"")?;
                let (group, _, _) = self.identifier()?;
                self.expect(&LEFT_BRACE, "\"{\"")?;
                loop {
                    let member_doc = self.docs();
                    if self.peek(&RIGHT_BRACE) {
                        self.reject_dangling_docs(&member_doc, "\"}\"")?;
                        self.index += 1;
                        break;
                    }
                    let mut field = self.field(member_doc)?;
                    field.group = Some(group.clone());
                    fields.push(field);
                }
                continue;
            }

            if self.at_end() {
                return Err(self.unexpected_token());
            }
            fields.push(self.field(doc)?);
        }

        Ok(fields)
    }

    /// `Type[]? name [deprecated];`
    fn field(&mut self, doc: DocBlock) -> Result<Parameter, GenError> {
        let type_ = self.type_expr()?;
        let optional = self.eat(&QUESTION);
        let (name, line, column) = self.identifier()?;
        let deprecated = self.eat(&DEPRECATED_TOKEN);
        self.expect(&SEMICOLON, "\";\"")?;

        Ok(Parameter {
            name,
            type_: Some(type_),
            optional,
            group: None,
            doc,
            deprecated,
            line,
            column,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize_schema;
    use sdkgen_schema::Primitive;

    fn parse(text: &str) -> Result<Schema, GenError> {
        parse_schema(&tokenize_schema(text)?)
    }

    #[test]
    fn test_parse_header_and_alias() {
        let schema = parse("version 1;\npackage acme;\n/// Channel key.\ntype ChannelKey = string;").unwrap();
        assert_eq!(schema.version, 1);
        assert_eq!(schema.package.as_deref(), Some("acme"));
        let def = &schema.definitions[0];
        assert_eq!(def.name, "ChannelKey");
        assert_eq!((def.line, def.column), (4, 6));
        assert_eq!(def.kind, DefinitionKind::Alias { target: TypeExpr::Primitive(Primitive::String) });
        assert_eq!(def.doc.sections[0].body, "Channel key.");
    }

    #[test]
    fn test_parse_keeps_docs_without_header() {
        let schema = parse("/// Channel key.\ntype ChannelKey = string;").unwrap();
        assert_eq!(schema.package, None);
        assert_eq!(schema.definitions[0].doc.sections[0].body, "Channel key.");

        let schema = parse("version 1;\n/// Channel key.\ntype ChannelKey = string;").unwrap();
        assert_eq!(schema.definitions[0].doc.sections[0].body, "Channel key.");

        let schema = parse("/// Verifies a customer.\noperation verify { string id; }").unwrap();
        assert_eq!(schema.operations[0].doc.sections[0].body, "Verifies a customer.");
    }

    #[test]
    fn test_parse_rejects_docs_on_header() {
        let err = parse("/// orphan\nversion 1;").unwrap_err();
        assert!(matches!(err, GenError::ParseError { line: 2, column: 1, .. }), "got {:?}", err);

        let err = parse("version 1;\n/// orphan\npackage acme;").unwrap_err();
        assert!(matches!(err, GenError::ParseError { line: 3, column: 1, .. }), "got {:?}", err);
    }

    #[test]
    fn test_parse_enum_with_literals() {
        let schema = parse(
            r#"
            enum Currency {
              /// Korean won
              KRW;
              USD = "CURRENCY_USD" [deprecated];
            }
            "#,
        )
        .unwrap();
        match &schema.definitions[0].kind {
            DefinitionKind::Enum { variants } => {
                assert_eq!(variants.len(), 2);
                assert_eq!(variants[0].literal(), "KRW");
                assert_eq!(variants[0].doc.sections[0].body, "Korean won");
                assert_eq!(variants[1].literal(), "CURRENCY_USD");
                assert!(variants[1].deprecated);
            }
            other => panic!("expected enum, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_operation_with_group() {
        let schema = parse(
            r#"
            operation verify returns VerifyResult throws Failed, Cancelled {
              string storeId;
              oneof channel {
                ChannelKey channelKey;
                object pgProvider;
              }
              string[]? bypass [deprecated];
            }
            "#,
        )
        .unwrap();

        let op = &schema.operations[0];
        assert_eq!(op.name, "verify");
        assert_eq!(op.returns, Some(TypeExpr::Named("VerifyResult".into())));
        assert_eq!(op.throws, vec!["Failed".to_string(), "Cancelled".to_string()]);

        let names: Vec<&str> = op.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["storeId", "channelKey", "pgProvider", "bypass"]);
        assert_eq!(op.params[0].group, None);
        assert_eq!(op.params[1].group.as_deref(), Some("channel"));
        assert_eq!(op.params[2].group.as_deref(), Some("channel"));
        assert_eq!(op.params[2].type_, Some(TypeExpr::Primitive(Primitive::Object)));

        let bypass = &op.params[3];
        assert!(bypass.optional);
        assert!(bypass.deprecated);
        assert_eq!(bypass.type_.as_ref().map(|t| t.to_string()).as_deref(), Some("string[]"));
    }

    #[test]
    fn test_parse_struct_and_error() {
        let schema = parse(
            "struct Customer { string fullName; string? phone; }\nerror Failed { string code; }",
        )
        .unwrap();
        assert_eq!(schema.definitions[0].kind.label(), "struct");
        assert_eq!(schema.definitions[0].fields().map(|f| f.len()), Some(2));
        assert_eq!(schema.definitions[1].kind.label(), "error");
    }

    #[test]
    fn test_parse_reports_position() {
        let err = parse("operation verify {\n  string storeId\n}").unwrap_err();
        match err {
            GenError::ParseError { msg, line, column } => {
                assert_eq!(msg, "Expected \";\" but found \"}\"");
                assert_eq!((line, column), (3, 1));
            }
            other => panic!("expected ParseError, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_dangling_docs() {
        let err = parse("struct A {\n  string a;\n  /// orphan\n}").unwrap_err();
        assert!(matches!(err, GenError::ParseError { line: 4, .. }), "got {:?}", err);

        let err = parse("/// orphan at the end").unwrap_err();
        assert!(matches!(err, GenError::ParseError { .. }));
    }

    #[test]
    fn test_parse_unknown_declaration() {
        let err = parse("message Foo {}").unwrap_err();
        assert!(matches!(err, GenError::ParseError { line: 1, column: 1, .. }), "got {:?}", err);
    }
}
