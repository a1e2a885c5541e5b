//! Turns a verified [`Schema`] into the read-only IR the emission engine
//! walks: references point at canonical definitions, exclusivity groups are
//! explicit constraint records and the type graph is known to be acyclic.

use std::collections::HashMap;

use sdkgen_schema::{
    Definition, DefinitionKind, DocBlock, EnumVariant, Parameter, Primitive, Schema, TypeExpr,
};
use tracing::{debug, debug_span};

use crate::{error::GenError, utils::quote};

/// The kind of definition a named reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKind {
    Alias,
    Enum,
    Struct,
    Error,
}

impl NamedKind {
    fn of(kind: &DefinitionKind) -> NamedKind {
        match kind {
            DefinitionKind::Alias { .. }  => NamedKind::Alias,
            DefinitionKind::Enum { .. }   => NamedKind::Enum,
            DefinitionKind::Struct { .. } => NamedKind::Struct,
            DefinitionKind::Error { .. }  => NamedKind::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Primitive(Primitive),
    /// Reference to the single canonical definition called `name`.
    Named { name: String, kind: NamedKind },
    Array(Box<TypeRef>),
    /// An optional parameter declared without a type.
    Unknown,
}

impl TypeRef {
    /// Name of the definition this reference ends at, looking through arrays.
    pub fn named(&self) -> Option<&str> {
        match self {
            TypeRef::Named { name, .. } => Some(name),
            TypeRef::Array(item)        => item.named(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name:       String,
    pub ty:         TypeRef,
    pub optional:   bool,
    pub doc:        DocBlock,
    pub deprecated: bool,
}

/// One way of satisfying an exclusivity group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub present: String,
    pub absent:  Vec<String>,
}

/// "Exactly one of `members` is supplied", with every valid assignment
/// listed so backends can render it as a union, a runtime check or both.
#[derive(Debug, Clone, PartialEq)]
pub struct ExclusiveConstraint {
    pub group:       String,
    pub members:     Vec<Field>,
    pub assignments: Vec<Assignment>,
}

impl ExclusiveConstraint {
    fn new(group: String, members: Vec<Field>) -> Self {
        let assignments = members
            .iter()
            .map(|present| Assignment {
                present: present.name.clone(),
                absent:  members
                    .iter()
                    .filter(|m| m.name != present.name)
                    .map(|m| m.name.clone())
                    .collect(),
            })
            .collect();
        ExclusiveConstraint { group, members, assignments }
    }

    pub fn member_names(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.name.as_str()).collect()
    }

    /// True when exactly one of the named members is present.
    pub fn is_satisfied_by(&self, present: &[&str]) -> bool {
        let supplied: Vec<&str> = self
            .members
            .iter()
            .map(|m| m.name.as_str())
            .filter(|name| present.contains(name))
            .collect();
        match supplied.as_slice() {
            [only] => self.assignments.iter().any(|a| a.present == *only),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Field(Field),
    Exclusive(ExclusiveConstraint),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeBody {
    Alias(TypeRef),
    Enum(Vec<EnumVariant>),
    Struct(Vec<Member>),
    Error(Vec<Member>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedType {
    pub name:          String,
    pub doc:           DocBlock,
    pub deprecated:    bool,
    pub body:          TypeBody,
    /// Whether a value of this type (transitively) contains exclusivity groups.
    pub has_exclusive: bool,
}

impl ResolvedType {
    pub fn kind(&self) -> NamedKind {
        match self.body {
            TypeBody::Alias(_)  => NamedKind::Alias,
            TypeBody::Enum(_)   => NamedKind::Enum,
            TypeBody::Struct(_) => NamedKind::Struct,
            TypeBody::Error(_)  => NamedKind::Error,
        }
    }

    pub fn label(&self) -> &'static str {
        match self.body {
            TypeBody::Alias(_)  => "alias",
            TypeBody::Enum(_)   => "enum",
            TypeBody::Struct(_) => "struct",
            TypeBody::Error(_)  => "error",
        }
    }

    pub fn members(&self) -> &[Member] {
        match &self.body {
            TypeBody::Struct(members) | TypeBody::Error(members) => members,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOperation {
    pub name:       String,
    pub doc:        DocBlock,
    pub deprecated: bool,
    pub input:      Vec<Member>,
    pub returns:    Option<TypeRef>,
    pub throws:     Vec<String>,
}

/// The annotated, immutable IR shared by every backend in a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSchema {
    pub package:    Option<String>,
    pub types:      Vec<ResolvedType>,
    pub operations: Vec<ResolvedOperation>,
}

impl ResolvedSchema {
    pub fn type_named(&self, name: &str) -> Option<&ResolvedType> {
        self.types.iter().find(|t| t.name == name)
    }

    /// Whether any value reachable from `ty` needs exclusivity validation.
    pub fn needs_validation(&self, ty: &TypeRef) -> bool {
        ty.named()
            .and_then(|name| self.type_named(name))
            .map_or(false, |t| t.has_exclusive)
    }
}

/// Iterates every field of a member list, group members included, in order.
pub fn all_fields(members: &[Member]) -> impl Iterator<Item = &Field> {
    members.iter().flat_map(|member| match member {
        Member::Field(field)          => std::slice::from_ref(field).iter(),
        Member::Exclusive(constraint) => constraint.members.iter(),
    })
}

pub fn has_exclusive(members: &[Member]) -> bool {
    members.iter().any(|m| matches!(m, Member::Exclusive(_)))
}

/// Resolves a verified schema.
pub fn resolve_schema(schema: &Schema) -> Result<ResolvedSchema, GenError> {
    let _span = debug_span!("resolve").entered();

    let definitions: HashMap<&str, &Definition> =
        schema.definitions.iter().map(|d| (d.name.as_str(), d)).collect();

    // 1) The type graph must be acyclic before anything walks it
    detect_cycles(schema, &definitions)?;

    // 2) Resolve named types in declaration order
    let mut types = Vec::with_capacity(schema.definitions.len());
    for def in &schema.definitions {
        let context = format!("{} {}", def.kind.label(), quote(&def.name));
        let body = match &def.kind {
            DefinitionKind::Alias { target } => {
                TypeBody::Alias(resolve_type(target, &definitions, &context, (def.line, def.column))?)
            }
            DefinitionKind::Enum { variants } => TypeBody::Enum(variants.clone()),
            DefinitionKind::Struct { fields } => {
                TypeBody::Struct(resolve_members(fields, &definitions, &context)?)
            }
            DefinitionKind::Error { fields } => {
                TypeBody::Error(resolve_members(fields, &definitions, &context)?)
            }
        };
        types.push(ResolvedType {
            name:          def.name.clone(),
            doc:           def.doc.clone(),
            deprecated:    def.deprecated,
            body,
            has_exclusive: false,
        });
    }

    // 3) Propagate exclusivity through references
    let mut memo: HashMap<String, bool> = HashMap::new();
    for i in 0..types.len() {
        let name = types[i].name.clone();
        types[i].has_exclusive = contains_exclusive(&name, &types, &mut memo);
    }

    // 4) Operations in declaration order
    let mut operations = Vec::with_capacity(schema.operations.len());
    for op in &schema.operations {
        let context = format!("operation {}", quote(&op.name));
        let input = resolve_members(&op.params, &definitions, &context)?;
        let returns = match &op.returns {
            Some(ty) => Some(resolve_type(ty, &definitions, &context, (op.line, op.column))?),
            None => None,
        };
        debug!(operation = op.name.as_str(), members = input.len(), "resolved operation");
        operations.push(ResolvedOperation {
            name:       op.name.clone(),
            doc:        op.doc.clone(),
            deprecated: op.deprecated,
            input,
            returns,
            throws:     op.throws.clone(),
        });
    }

    Ok(ResolvedSchema {
        package: schema.package.clone(),
        types,
        operations,
    })
}

fn resolve_type(
    ty: &TypeExpr,
    definitions: &HashMap<&str, &Definition>,
    context: &str,
    at: (usize, usize),
) -> Result<TypeRef, GenError> {
    Ok(match ty {
        TypeExpr::Primitive(p) => TypeRef::Primitive(*p),
        TypeExpr::Array(item)  => TypeRef::Array(Box::new(resolve_type(item, definitions, context, at)?)),
        TypeExpr::Named(name)  => match definitions.get(name.as_str()) {
            Some(def) => TypeRef::Named { name: name.clone(), kind: NamedKind::of(&def.kind) },
            None => {
                return Err(GenError::schema(
                    format!("The type {} referenced by {} is not defined", quote(name), context),
                    at.0,
                    at.1,
                ))
            }
        },
    })
}

fn resolve_field(
    param: &Parameter,
    definitions: &HashMap<&str, &Definition>,
    context: &str,
) -> Result<Field, GenError> {
    let ty = match &param.type_ {
        Some(ty) => resolve_type(ty, definitions, context, (param.line, param.column))?,
        None if param.optional => TypeRef::Unknown,
        None => {
            return Err(GenError::schema(
                format!("The required parameter {} of {} has no type", quote(&param.name), context),
                param.line,
                param.column,
            ))
        }
    };
    let doc = match &param.type_ {
        Some(expr) if param.doc.is_empty() => inherited_doc(expr, definitions),
        _ => param.doc.clone(),
    };
    Ok(Field {
        name:       param.name.clone(),
        ty,
        optional:   param.optional,
        doc,
        deprecated: param.deprecated,
    })
}

/// Documentation an undocumented parameter takes from the type it refers
/// to. Arrays look at their items and undocumented aliases at their target.
fn inherited_doc(ty: &TypeExpr, definitions: &HashMap<&str, &Definition>) -> DocBlock {
    match ty {
        TypeExpr::Primitive(_) => DocBlock::default(),
        TypeExpr::Array(item) => inherited_doc(item, definitions),
        TypeExpr::Named(name) => match definitions.get(name.as_str()).copied() {
            Some(def) if !def.doc.is_empty() => def.doc.clone(),
            Some(Definition { kind: DefinitionKind::Alias { target }, .. }) => inherited_doc(target, definitions),
            _ => DocBlock::default(),
        },
    }
}

/// Partitions parameters into singletons and exclusivity groups. A group is
/// placed where its first member was declared; a group with one member
/// becomes a plain required field.
fn resolve_members(
    params: &[Parameter],
    definitions: &HashMap<&str, &Definition>,
    context: &str,
) -> Result<Vec<Member>, GenError> {
    let mut members: Vec<Member> = Vec::new();
    let mut group_slots: HashMap<&str, usize> = HashMap::new();

    for param in params {
        let field = resolve_field(param, definitions, context)?;
        match &param.group {
            None => members.push(Member::Field(field)),
            Some(group) => match group_slots.get(group.as_str()) {
                Some(&slot) => {
                    if let Member::Exclusive(constraint) = &mut members[slot] {
                        constraint.members.push(field);
                    }
                }
                None => {
                    group_slots.insert(group.as_str(), members.len());
                    members.push(Member::Exclusive(ExclusiveConstraint {
                        group:       group.clone(),
                        members:     vec![field],
                        assignments: Vec::new(),
                    }));
                }
            },
        }
    }

    Ok(members
        .into_iter()
        .map(|member| match member {
            Member::Exclusive(mut constraint) if constraint.members.len() == 1 => {
                let mut field = constraint.members.remove(0);
                field.optional = false;
                Member::Field(field)
            }
            Member::Exclusive(constraint) => {
                Member::Exclusive(ExclusiveConstraint::new(constraint.group, constraint.members))
            }
            field => field,
        })
        .collect())
}

/// Edges of the named-type graph leaving `def`, in declaration order.
fn edges(def: &Definition) -> Vec<&str> {
    match &def.kind {
        DefinitionKind::Alias { target } => target.named().into_iter().collect(),
        DefinitionKind::Enum { .. } => Vec::new(),
        DefinitionKind::Struct { fields } | DefinitionKind::Error { fields } => fields
            .iter()
            .filter_map(|f| f.type_.as_ref().and_then(TypeExpr::named))
            .collect(),
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Visit {
    InProgress,
    Done,
}

fn detect_cycles(schema: &Schema, definitions: &HashMap<&str, &Definition>) -> Result<(), GenError> {
    fn visit<'a>(
        name: &'a str,
        definitions: &HashMap<&str, &'a Definition>,
        state: &mut HashMap<&'a str, Visit>,
        stack: &mut Vec<&'a str>,
    ) -> Result<(), GenError> {
        match state.get(name) {
            Some(Visit::Done) => return Ok(()),
            Some(Visit::InProgress) => {
                let start = stack.iter().position(|n| *n == name).unwrap_or(0);
                let mut cycle: Vec<String> = stack[start..].iter().map(|n| n.to_string()).collect();
                cycle.push(name.to_string());
                return Err(GenError::CyclicReferenceError { cycle });
            }
            None => {}
        }

        let Some(&def) = definitions.get(name) else {
            return Ok(());
        };
        state.insert(name, Visit::InProgress);
        stack.push(name);
        for next in edges(def) {
            visit(next, definitions, state, stack)?;
        }
        stack.pop();
        state.insert(name, Visit::Done);
        Ok(())
    }

    let mut state = HashMap::new();
    let mut stack = Vec::new();
    for def in &schema.definitions {
        visit(def.name.as_str(), definitions, &mut state, &mut stack)?;
    }
    Ok(())
}

fn contains_exclusive(name: &str, types: &[ResolvedType], memo: &mut HashMap<String, bool>) -> bool {
    if let Some(&known) = memo.get(name) {
        return known;
    }
    let Some(ty) = types.iter().find(|t| t.name == name) else {
        return false;
    };
    let result = match &ty.body {
        TypeBody::Alias(target) => target
            .named()
            .map_or(false, |next| contains_exclusive(next, types, memo)),
        TypeBody::Enum(_) => false,
        TypeBody::Struct(members) | TypeBody::Error(members) => {
            has_exclusive(members)
                || all_fields(members).any(|f| {
                    f.ty.named().map_or(false, |next| contains_exclusive(next, types, memo))
                })
        }
    };
    memo.insert(name.to_string(), result);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parser::parse_schema, tokenizer::tokenize_schema};

    fn resolve(text: &str) -> Result<ResolvedSchema, GenError> {
        let schema = parse_schema(&tokenize_schema(text)?)?;
        resolve_schema(&schema)
    }

    #[test]
    fn test_resolve_locates_unknown_references() {
        let err = resolve("operation verify {\n  Missing key;\n}").unwrap_err();
        match err {
            GenError::SchemaError { msg, line, column } => {
                assert_eq!(msg, "The type \"Missing\" referenced by operation \"verify\" is not defined");
                assert_eq!((line, column), (2, 11));
            }
            other => panic!("expected SchemaError, got {:?}", other),
        }

        let err = resolve("\ntype A = Missing[];").unwrap_err();
        assert!(matches!(err, GenError::SchemaError { line: 2, column: 6, .. }), "got {:?}", err);
    }

    #[test]
    fn test_undocumented_fields_inherit_type_docs() {
        let resolved = resolve(
            r#"
            /// Channel key shown in the console.
            type ChannelKey = string;
            type Keys = ChannelKey;
            operation verify {
              ChannelKey channelKey;
              Keys[] fallbacks;
              /// Own text wins.
              ChannelKey primary;
              string storeId;
            }
            "#,
        )
        .expect("resolve failed");

        let docs: Vec<Vec<String>> = all_fields(&resolved.operations[0].input).map(|f| f.doc.lines()).collect();
        assert_eq!(docs[0], vec!["Channel key shown in the console."]);
        assert_eq!(docs[1], vec!["Channel key shown in the console."]);
        assert_eq!(docs[2], vec!["Own text wins."]);
        assert!(docs[3].is_empty());
        assert!(resolved.types[1].doc.is_empty());
    }

    #[test]
    fn test_resolve_partitions_groups() {
        let resolved = resolve(
            r#"
            type ChannelKey = string;
            operation verify {
              string storeId;
              oneof channel { ChannelKey channelKey; object pgProvider; }
              string id;
            }
            "#,
        )
        .expect("resolve failed");

        let op = &resolved.operations[0];
        assert_eq!(op.input.len(), 3);
        assert!(matches!(&op.input[0], Member::Field(f) if f.name == "storeId"));
        assert!(matches!(&op.input[2], Member::Field(f) if f.name == "id"));

        let Member::Exclusive(constraint) = &op.input[1] else {
            panic!("expected an exclusivity group, got {:?}", op.input[1]);
        };
        assert_eq!(constraint.group, "channel");
        assert_eq!(constraint.member_names(), vec!["channelKey", "pgProvider"]);
        assert_eq!(
            constraint.members[0].ty,
            TypeRef::Named { name: "ChannelKey".into(), kind: NamedKind::Alias }
        );
        assert_eq!(
            constraint.assignments,
            vec![
                Assignment { present: "channelKey".into(), absent: vec!["pgProvider".into()] },
                Assignment { present: "pgProvider".into(), absent: vec!["channelKey".into()] },
            ]
        );
    }

    #[test]
    fn test_exclusive_constraint_accepts_exactly_one() {
        let resolved = resolve("operation verify { oneof channel { string channelKey; object pgProvider; } }")
            .expect("resolve failed");
        let Member::Exclusive(constraint) = &resolved.operations[0].input[0] else {
            panic!("expected an exclusivity group");
        };
        assert!(constraint.is_satisfied_by(&["channelKey"]));
        assert!(constraint.is_satisfied_by(&["pgProvider", "storeId"]));
        assert!(!constraint.is_satisfied_by(&[]));
        assert!(!constraint.is_satisfied_by(&["channelKey", "pgProvider"]));
    }

    #[test]
    fn test_json_groups_need_not_be_adjacent() {
        let schema: Schema = serde_json::from_str(
            r#"{ "operations": [{ "name": "verify", "input": [
                { "name": "channelKey", "type": "string", "group": "channel" },
                { "name": "storeId", "type": "string" },
                { "name": "pgProvider", "type": "object", "group": "channel" },
                { "name": "extra", "optional": true }
            ]}]}"#,
        )
        .unwrap();
        let resolved = resolve_schema(&schema).expect("resolve failed");
        let input = &resolved.operations[0].input;
        assert_eq!(input.len(), 3);
        assert!(matches!(&input[0], Member::Exclusive(c) if c.member_names() == vec!["channelKey", "pgProvider"]));
        assert!(matches!(&input[2], Member::Field(f) if f.ty == TypeRef::Unknown && f.optional));
    }

    #[test]
    fn test_single_member_group_becomes_required_field() {
        let resolved = resolve("operation verify { oneof channel { string channelKey; } }").unwrap();
        assert_eq!(
            resolved.operations[0].input,
            vec![Member::Field(Field {
                name:       "channelKey".into(),
                ty:         TypeRef::Primitive(Primitive::String),
                optional:   false,
                doc:        DocBlock::default(),
                deprecated: false,
            })]
        );
    }

    #[test]
    fn test_cycle_is_reported_with_path() {
        let err = resolve("struct X { Y y; } struct Y { X[] xs; }").unwrap_err();
        match err {
            GenError::CyclicReferenceError { cycle } => assert_eq!(cycle, vec!["X", "Y", "X"]),
            other => panic!("expected CyclicReferenceError, got {:?}", other),
        }

        let err = resolve("type A = B; type B = C; type C = B;").unwrap_err();
        assert_eq!(err.to_string(), "Cyclic type reference: B -> C -> B");

        let err = resolve("struct Node { Node? next; }").unwrap_err();
        assert_eq!(err.to_string(), "Cyclic type reference: Node -> Node");
    }

    #[test]
    fn test_exclusivity_propagates_through_references() {
        let resolved = resolve(
            r#"
            struct Contact { oneof via { string email; string phone; } }
            struct Customer { Contact contact; }
            type Customers = Customer[];
            struct Plain { string name; }
            "#,
        )
        .unwrap();
        let flags: Vec<(&str, bool)> =
            resolved.types.iter().map(|t| (t.name.as_str(), t.has_exclusive)).collect();
        assert_eq!(
            flags,
            vec![("Contact", true), ("Customer", true), ("Customers", true), ("Plain", false)]
        );
        assert!(resolved.needs_validation(&TypeRef::Array(Box::new(TypeRef::Named {
            name: "Customer".into(),
            kind: NamedKind::Struct,
        }))));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let text = "type K = string; struct S { K a; oneof g { K b; string c; } } operation op { S s; K k; }";
        assert_eq!(resolve(text).unwrap(), resolve(text).unwrap());
    }
}
