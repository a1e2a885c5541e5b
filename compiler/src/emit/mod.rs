//! Emission engine: walks a [`ResolvedSchema`] with one [`TargetBackend`]
//! and produces named output units.

use std::{
    collections::BTreeSet,
    fs,
    path::Path,
};

use rayon::prelude::*;
use sdkgen_schema::DocBlock;
use tracing::{debug, debug_span, info};

use crate::{
    backend::{BackendDescriptor, CommentStyle, TargetBackend},
    config::RuntimeOptions,
    error::GenError,
    resolver::{Member, ResolvedOperation, ResolvedSchema, ResolvedType, TypeBody},
    utils::quote,
};

pub mod writer;

pub use writer::CodeWriter;

/// Directory holding one module per named type.
pub const TYPES_DIR: &str = "parameters";
pub const INDEX_MODULE: &str = "index";
pub const SHIM_MODULE: &str = "loader";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnitKind {
    Operation,
    NamedType,
    TypesIndex,
    Index,
    Shim,
    Support,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputUnit {
    /// Relative path with `/` separators, e.g. `parameters/ChannelKey.ts`.
    pub path:     String,
    pub kind:     UnitKind,
    pub contents: String,
}

/// Read-only view handed to every backend call.
#[derive(Debug, Clone, Copy)]
pub struct EmitContext<'a> {
    pub schema:     &'a ResolvedSchema,
    pub descriptor: &'a BackendDescriptor,
    pub runtime:    &'a RuntimeOptions,
}

impl<'a> EmitContext<'a> {
    pub fn type_name(&self, name: &str) -> String {
        self.descriptor.type_case.apply(name)
    }

    pub fn member_name(&self, name: &str) -> String {
        self.descriptor.member_case.apply(name)
    }

    pub fn function_name(&self, name: &str) -> String {
        self.descriptor.function_case.apply(name)
    }

    /// Name of the input type emitted for an operation.
    pub fn request_type_name(&self, op: &ResolvedOperation) -> String {
        format!("{}Request", self.type_name(&op.name))
    }

    /// File stem of an operation module.
    pub fn operation_module(&self, op_name: &str) -> String {
        match self.descriptor.module_case {
            Some(case) => case.apply(op_name),
            None => self.function_name(op_name),
        }
    }

    /// File stem of a named-type module.
    pub fn type_module(&self, type_name: &str) -> String {
        match self.descriptor.module_case {
            Some(case) => case.apply(type_name),
            None => self.type_name(type_name),
        }
    }

    pub fn describe_type(&self, ty: &ResolvedType) -> String {
        format!("{} {}", ty.label(), quote(&ty.name))
    }

    pub fn unsupported(&self, construct: &str, context: &str) -> GenError {
        GenError::unsupported(self.descriptor.name, construct, context)
    }

    /// A documentation comment in the backend's style. Text lines are kept
    /// verbatim (only `*/` is escaped); `@deprecated` and `tags` follow the
    /// prose after an empty line. Returns no lines when there is nothing to say.
    pub fn doc_comment(&self, doc: &DocBlock, deprecated: bool, tags: &[String]) -> Vec<String> {
        let mut text = doc.lines();
        let mut tail: Vec<String> = Vec::new();
        if deprecated {
            tail.push("@deprecated".to_string());
        }
        tail.extend(tags.iter().cloned());
        if !tail.is_empty() {
            if !text.is_empty() {
                text.push(String::new());
            }
            text.extend(tail);
        }
        self.comment(&text)
    }

    /// Arbitrary text as a documentation comment in the backend's style.
    pub fn comment(&self, text: &[String]) -> Vec<String> {
        render_comment(self.descriptor.doc_comment, text)
    }

    /// A plain line comment, e.g. for flagged runtime checks.
    pub fn line_comment(&self, text: &str) -> String {
        format!("{} {}", self.descriptor.line_comment, text)
    }

    fn header(&self) -> Vec<String> {
        let mut lines = vec![self.line_comment("This file is generated by sdkgen. Do not edit.")];
        if let Some(package) = &self.schema.package {
            lines.push(self.line_comment(&format!("Package: {}", package)));
        }
        lines
    }

    fn unit(&self, path: String, kind: UnitKind, body: String) -> OutputUnit {
        let mut w = CodeWriter::new(self.descriptor.indent);
        w.lines(self.header());
        w.blank();
        w.lines(body.trim_start_matches('\n').lines());
        OutputUnit { path, kind, contents: w.finish() }
    }

    fn path(&self, stem: &str) -> String {
        format!("{}.{}", stem, self.descriptor.extension)
    }
}

fn render_comment(style: CommentStyle, text: &[String]) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let escaped = text.iter().map(|line| line.replace("*/", "*\\/"));
    match style {
        CommentStyle::Block { open, prefix, close } => {
            let mut out = vec![open.to_string()];
            out.extend(escaped.map(|line| format!("{}{}", prefix, line).trim_end().to_string()));
            out.push(close.to_string());
            out
        }
        CommentStyle::Line { prefix } => escaped
            .map(|line| format!("{} {}", prefix, line).trim_end().to_string())
            .collect(),
    }
}

/// First exclusivity group in the schema, as `(group, location)`.
fn first_exclusive_group(schema: &ResolvedSchema) -> Option<(String, String)> {
    fn group(members: &[Member]) -> Option<&str> {
        members.iter().find_map(|m| match m {
            Member::Exclusive(c) => Some(c.group.as_str()),
            Member::Field(_) => None,
        })
    }
    schema
        .types
        .iter()
        .find_map(|t| group(t.members()).map(|g| (g.to_string(), format!("{} {}", t.label(), quote(&t.name)))))
        .or_else(|| {
            schema.operations.iter().find_map(|op| {
                group(&op.input).map(|g| (g.to_string(), format!("operation {}", quote(&op.name))))
            })
        })
}

/// First type or function binding that collides with a reserved word of
/// the backend.
fn reserved_binding(cx: &EmitContext) -> Option<GenError> {
    let reserved = |name: String, context: String| {
        cx.descriptor
            .is_reserved(&name)
            .then(|| cx.unsupported(&format!("reserved word {}", quote(&name)), &context))
    };
    cx.schema
        .types
        .iter()
        .find_map(|ty| reserved(cx.type_name(&ty.name), cx.describe_type(ty)))
        .or_else(|| {
            cx.schema.operations.iter().find_map(|op| {
                let context = format!("operation {}", quote(&op.name));
                reserved(cx.function_name(&op.name), context.clone())
                    .or_else(|| reserved(cx.request_type_name(op), context))
            })
        })
}

/// Renders the whole schema with one backend. Either every unit is produced
/// or the first error is returned; the IR is never modified.
pub fn emit(
    backend: &dyn TargetBackend,
    schema: &ResolvedSchema,
    runtime: &RuntimeOptions,
) -> Result<Vec<OutputUnit>, GenError> {
    let descriptor = backend.descriptor();
    let _span = debug_span!("emit", backend = descriptor.name).entered();
    let cx = EmitContext { schema, descriptor, runtime };

    // 1) Exclusivity groups need a rendering strategy
    if descriptor.union_strategy.is_none() {
        if let Some((group, location)) = first_exclusive_group(schema) {
            return Err(cx.unsupported(&format!("exclusivity group {}", quote(&group)), &location));
        }
    }

    // Emitted bindings must be legal names in the target
    if let Some(err) = reserved_binding(&cx) {
        return Err(err);
    }

    // 2) Named types, one module each
    let types = schema
        .types
        .par_iter()
        .map(|ty| -> Result<OutputUnit, GenError> {
            let body = match &ty.body {
                TypeBody::Alias(target)    => backend.render_alias(&cx, ty, target)?,
                TypeBody::Enum(variants)   => backend.render_enum(&cx, ty, variants)?,
                TypeBody::Struct(members)  => backend.render_struct(&cx, ty, members)?,
                TypeBody::Error(members)   => backend.render_error(&cx, ty, members)?,
            };
            let path = format!("{}/{}", TYPES_DIR, cx.path(&cx.type_module(&ty.name)));
            debug!(unit = path.as_str(), "rendered named type");
            Ok(cx.unit(path, UnitKind::NamedType, body))
        })
        .collect::<Result<Vec<_>, GenError>>()?;

    // 3) Operations, one module each
    let operations = schema
        .operations
        .par_iter()
        .map(|op| -> Result<OutputUnit, GenError> {
            let body = backend.render_operation(&cx, op)?;
            let path = cx.path(&cx.operation_module(&op.name));
            debug!(unit = path.as_str(), "rendered operation");
            Ok(cx.unit(path, UnitKind::Operation, body))
        })
        .collect::<Result<Vec<_>, GenError>>()?;

    // 4) Aggregation modules, the shim and support modules
    let mut units = types;
    units.push(cx.unit(
        format!("{}/{}", TYPES_DIR, cx.path(INDEX_MODULE)),
        UnitKind::TypesIndex,
        backend.render_types_index(&cx)?,
    ));
    units.extend(operations);
    units.push(cx.unit(cx.path(INDEX_MODULE), UnitKind::Index, backend.render_index(&cx)?));
    units.push(cx.unit(cx.path(SHIM_MODULE), UnitKind::Shim, backend.render_shim(&cx)?));
    for (name, body) in backend.render_support(&cx)? {
        units.push(cx.unit(cx.path(&name), UnitKind::Support, body));
    }

    // 5) Casing may map two names onto one file
    let mut seen = BTreeSet::new();
    for unit in &units {
        if !seen.insert(unit.path.to_lowercase()) {
            return Err(GenError::OutputCollision {
                backend: descriptor.name.to_string(),
                path:    unit.path.clone(),
            });
        }
    }

    info!(backend = descriptor.name, units = units.len(), "emitted");
    Ok(units)
}

/// Writes units below `out_dir`, creating directories as needed.
pub fn write_units(out_dir: &Path, units: &[OutputUnit]) -> Result<(), GenError> {
    for unit in units {
        let path = unit.path.split('/').fold(out_dir.to_path_buf(), |acc, part| acc.join(part));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, &unit.contents)?;
        debug!(path = %path.display(), "wrote unit");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CommentStyle, Scope, TargetBackend, UnionStrategy};
    use crate::resolver::TypeRef;
    use crate::utils::Case;

    struct Minimal {
        descriptor: BackendDescriptor,
    }

    impl Minimal {
        fn new(union_strategy: Option<UnionStrategy>) -> Self {
            Minimal {
                descriptor: BackendDescriptor {
                    name:           "minimal",
                    extension:      "txt",
                    type_case:      Case::Pascal,
                    member_case:    Case::Preserve,
                    function_case:  Case::Snake,
                    module_case:    None,
                    line_comment:   "#",
                    doc_comment:    CommentStyle::Line { prefix: "##" },
                    indent:         "  ",
                    reserved_words: &[],
                    union_strategy,
                },
            }
        }
    }

    impl TargetBackend for Minimal {
        fn descriptor(&self) -> &BackendDescriptor {
            &self.descriptor
        }

        fn type_ref(&self, _cx: &EmitContext, ty: &TypeRef, _scope: Scope) -> Result<String, GenError> {
            Ok(format!("{:?}", ty))
        }

        fn render_operation(&self, cx: &EmitContext, op: &ResolvedOperation) -> Result<String, GenError> {
            let mut w = CodeWriter::new(cx.descriptor.indent);
            w.lines(cx.doc_comment(&op.doc, op.deprecated, &[]));
            w.line(format!("op {}", cx.function_name(&op.name)));
            Ok(w.finish())
        }

        fn render_types_index(&self, _cx: &EmitContext) -> Result<String, GenError> {
            Ok(String::new())
        }

        fn render_index(&self, cx: &EmitContext) -> Result<String, GenError> {
            Ok(cx.schema.operations.iter().map(|op| format!("{}\n", op.name)).collect())
        }

        fn render_shim(&self, cx: &EmitContext) -> Result<String, GenError> {
            Ok(format!("global {}\n", cx.runtime.global_name))
        }
    }

    fn resolved(text: &str) -> ResolvedSchema {
        crate::compile_schema(text).expect("compile failed")
    }

    #[test]
    fn layout_and_header() {
        let schema = resolved("package acme;\n/// Verifies.\noperation verifyIdentity {}");
        let units = emit(&Minimal::new(None), &schema, &RuntimeOptions::default()).expect("emit failed");
        let paths: Vec<(&str, UnitKind)> = units.iter().map(|u| (u.path.as_str(), u.kind)).collect();
        assert_eq!(
            paths,
            vec![
                ("parameters/index.txt", UnitKind::TypesIndex),
                ("verify_identity.txt", UnitKind::Operation),
                ("index.txt", UnitKind::Index),
                ("loader.txt", UnitKind::Shim),
            ]
        );
        assert_eq!(
            units[1].contents,
            "# This file is generated by sdkgen. Do not edit.\n# Package: acme\n\n## Verifies.\nop verify_identity\n"
        );
        assert_eq!(units[3].contents.lines().last(), Some("global PortOne"));
    }

    #[test]
    fn missing_rules_are_unsupported() {
        let schema = resolved("type K = string; operation verify { K key; }");
        let err = emit(&Minimal::new(None), &schema, &RuntimeOptions::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Backend \"minimal\" cannot render alias types in alias \"K\""
        );
    }

    #[test]
    fn groups_need_a_union_strategy() {
        let schema = resolved("operation verify { oneof channel { string channelKey; object pgProvider; } }");
        let err = emit(&Minimal::new(None), &schema, &RuntimeOptions::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Backend \"minimal\" cannot render exclusivity group \"channel\" in operation \"verify\""
        );

        let units = emit(&Minimal::new(Some(UnionStrategy::RuntimeCheck)), &schema, &RuntimeOptions::default())
            .expect("emit failed");
        assert_eq!(units.len(), 4);
    }

    #[test]
    fn colliding_paths_fail_for_the_backend() {
        let schema = resolved("operation verifyIdentity {}\noperation verify_identity {}");
        let err = emit(&Minimal::new(None), &schema, &RuntimeOptions::default()).unwrap_err();
        match err {
            GenError::OutputCollision { backend, path } => {
                assert_eq!(backend, "minimal");
                assert_eq!(path, "verify_identity.txt");
            }
            other => panic!("expected OutputCollision, got {:?}", other),
        }
    }

    #[test]
    fn reserved_bindings_are_unsupported() {
        let mut backend = Minimal::new(None);
        backend.descriptor.reserved_words = &[&["delete", "Record"]];
        let runtime = RuntimeOptions::default();

        let err = emit(&backend, &resolved("operation delete { string id; }"), &runtime).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Backend \"minimal\" cannot render reserved word \"delete\" in operation \"delete\""
        );

        let err = emit(&backend, &resolved("struct Record { string id; }"), &runtime).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Backend \"minimal\" cannot render reserved word \"Record\" in struct \"Record\""
        );

        let units = emit(&backend, &resolved("operation deleteBillingKey {}"), &runtime).expect("emit failed");
        assert_eq!(units.len(), 4);
    }

    #[test]
    fn doc_comment_escapes_and_tags() {
        let schema = resolved("operation a {}");
        let backend = Minimal::new(None);
        let runtime = RuntimeOptions::default();
        let mut descriptor = backend.descriptor.clone();
        descriptor.doc_comment = CommentStyle::JSDOC;
        let cx = EmitContext { schema: &schema, descriptor: &descriptor, runtime: &runtime };

        let doc = DocBlock::from_doc_lines(["### 제목", "closes */ early", "", "second paragraph"]);
        assert_eq!(
            cx.doc_comment(&doc, true, &["@throws {Failed}".to_string()]),
            vec![
                "/**",
                " * ### 제목",
                " * closes *\\/ early",
                " *",
                " * second paragraph",
                " *",
                " * @deprecated",
                " * @throws {Failed}",
                " */",
            ]
        );
        assert!(cx.doc_comment(&DocBlock::default(), false, &[]).is_empty());
    }

    #[test]
    fn write_units_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let units = vec![OutputUnit {
            path:     "parameters/K.ts".into(),
            kind:     UnitKind::NamedType,
            contents: "export type K = string;\n".into(),
        }];
        write_units(dir.path(), &units).expect("write failed");
        let written = fs::read_to_string(dir.path().join("parameters").join("K.ts")).unwrap();
        assert_eq!(written, "export type K = string;\n");
    }
}
