use sdkgen_schema::{is_identifier, EnumVariant, Primitive};

use crate::{
    backend::{
        fill_template, operation_dependencies, script_url_expression, type_dependencies,
        BackendDescriptor, CommentStyle, Scope, TargetBackend, UnionStrategy, JS_RESERVED_WORDS, SHIM_BINDINGS,
        TS_TYPE_KEYWORDS,
    },
    emit::{CodeWriter, EmitContext, TYPES_DIR},
    error::GenError,
    resolver::{ExclusiveConstraint, Field, Member, ResolvedOperation, ResolvedType, TypeRef},
    utils::{quote, Case},
};

const LOADER_TEMPLATE: &str = include_str!("templates/loader.ts");

/// Property carried by every emitted error class, checked by the type guards.
pub const ERROR_MARKER: &str = "__sdkErrorType";

/// TypeScript modules with exclusivity groups as tagged unions.
pub struct TypeScriptBackend {
    descriptor: BackendDescriptor,
}

impl Default for TypeScriptBackend {
    fn default() -> Self {
        TypeScriptBackend {
            descriptor: BackendDescriptor {
                name:           "typescript",
                extension:      "ts",
                type_case:      Case::Pascal,
                member_case:    Case::Preserve,
                function_case:  Case::Camel,
                module_case:    None,
                line_comment:   "//",
                doc_comment:    CommentStyle::JSDOC,
                indent:         "  ",
                reserved_words: &[JS_RESERVED_WORDS, TS_TYPE_KEYWORDS, SHIM_BINDINGS],
                union_strategy: Some(UnionStrategy::TaggedUnion),
            },
        }
    }
}

impl TypeScriptBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn property_name(&self, cx: &EmitContext, name: &str) -> String {
        let name = cx.member_name(name);
        if is_identifier(&name) { name } else { quote(&name) }
    }

    /// Doc comment plus `name: Type;` at the given indentation.
    fn field_lines(&self, cx: &EmitContext, field: &Field, scope: Scope, indent: &str) -> Result<Vec<String>, GenError> {
        let mut lines: Vec<String> = cx
            .doc_comment(&field.doc, field.deprecated, &[])
            .into_iter()
            .map(|line| format!("{}{}", indent, line))
            .collect();
        lines.push(format!(
            "{}{}{}: {};",
            indent,
            self.property_name(cx, &field.name),
            if field.optional { "?" } else { "" },
            self.type_ref(cx, &field.ty, scope)?
        ));
        Ok(lines)
    }

    /// `( | { a: A; b?: never } | { a?: never; b: B } )`
    fn union_part(&self, cx: &EmitContext, constraint: &ExclusiveConstraint, scope: Scope) -> Result<Vec<String>, GenError> {
        let mut lines = vec![
            "(".to_string(),
            format!("  // oneof {}: exactly one of {}", constraint.group, constraint.member_names().join(", ")),
        ];
        for assignment in &constraint.assignments {
            lines.push("  | {".to_string());
            for member in &constraint.members {
                if member.name == assignment.present {
                    lines.extend(self.field_lines(cx, member, scope, "      ")?);
                } else {
                    lines.push(format!("      {}?: never;", self.property_name(cx, &member.name)));
                }
            }
            lines.push("    }".to_string());
        }
        lines.push(")".to_string());
        Ok(lines)
    }

    /// The pieces of an object type: one object literal for the plain fields,
    /// one union per exclusivity group.
    fn object_parts(&self, cx: &EmitContext, members: &[Member], scope: Scope) -> Result<Vec<Vec<String>>, GenError> {
        let mut fields = Vec::new();
        let mut unions = Vec::new();
        for member in members {
            match member {
                Member::Field(field) => fields.extend(self.field_lines(cx, field, scope, "  ")?),
                Member::Exclusive(constraint) => unions.push(self.union_part(cx, constraint, scope)?),
            }
        }

        let mut parts = Vec::new();
        if !fields.is_empty() {
            let mut object = vec!["{".to_string()];
            object.extend(fields);
            object.push("}".to_string());
            parts.push(object);
        }
        parts.extend(unions);
        if parts.is_empty() {
            parts.push(vec!["Record<string, never>".to_string()]);
        }
        Ok(parts)
    }

    fn type_imports(&self, cx: &EmitContext, ty: &ResolvedType) -> Vec<String> {
        type_dependencies(ty)
            .iter()
            .map(|name| {
                let name = cx.type_name(name);
                format!("import type {{ {} }} from \"./{}.js\";", name, name)
            })
            .collect()
    }

    fn returns(&self, cx: &EmitContext, op: &ResolvedOperation) -> Result<String, GenError> {
        match &op.returns {
            Some(ty) => self.type_ref(cx, ty, Scope::Root),
            None => Ok("void".to_string()),
        }
    }
}

/// Joins parts with ` & ` behind `head` and terminates the declaration.
fn declaration(head: &str, parts: Vec<Vec<String>>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for part in parts {
        let mut lines = part.into_iter();
        let first = lines.next().unwrap_or_default();
        match out.last_mut() {
            Some(last) => {
                last.push_str(" & ");
                last.push_str(&first);
            }
            None => out.push(format!("{}{}", head, first)),
        }
        out.extend(lines);
    }
    if let Some(last) = out.last_mut() {
        last.push(';');
    }
    out
}

fn primitive(p: Primitive) -> &'static str {
    match p {
        Primitive::String  => "string",
        Primitive::Integer => "number",
        Primitive::Number  => "number",
        Primitive::Boolean => "boolean",
        Primitive::Object  => "Record<string, unknown>",
    }
}

impl TargetBackend for TypeScriptBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn type_ref(&self, cx: &EmitContext, ty: &TypeRef, scope: Scope) -> Result<String, GenError> {
        Ok(match ty {
            TypeRef::Primitive(p) => primitive(*p).to_string(),
            TypeRef::Named { name, .. } => match scope {
                Scope::Root  => format!("Parameters.{}", cx.type_name(name)),
                Scope::Types => cx.type_name(name),
            },
            TypeRef::Array(item) => format!("{}[]", self.type_ref(cx, item, scope)?),
            TypeRef::Unknown => "unknown".to_string(),
        })
    }

    fn render_alias(&self, cx: &EmitContext, ty: &ResolvedType, target: &TypeRef) -> Result<String, GenError> {
        let mut w = CodeWriter::new(cx.descriptor.indent);
        w.lines(self.type_imports(cx, ty));
        w.blank();
        w.lines(cx.doc_comment(&ty.doc, ty.deprecated, &[]));
        w.line(format!(
            "export type {} = {};",
            cx.type_name(&ty.name),
            self.type_ref(cx, target, Scope::Types)?
        ));
        Ok(w.finish())
    }

    fn render_enum(&self, cx: &EmitContext, ty: &ResolvedType, variants: &[EnumVariant]) -> Result<String, GenError> {
        let name = cx.type_name(&ty.name);
        let mut w = CodeWriter::new(cx.descriptor.indent);
        w.lines(cx.doc_comment(&ty.doc, ty.deprecated, &[]));
        w.block::<GenError>(format!("export const {} = {{", name), "} as const;", |w| {
            for variant in variants {
                w.lines(cx.doc_comment(&variant.doc, variant.deprecated, &[]));
                w.line(format!("{}: {},", variant.name, quote(variant.literal())));
            }
            Ok(())
        })?;
        w.blank();
        w.line(format!("export type {} = (typeof {})[keyof typeof {}];", name, name, name));
        Ok(w.finish())
    }

    fn render_struct(&self, cx: &EmitContext, ty: &ResolvedType, members: &[Member]) -> Result<String, GenError> {
        let mut w = CodeWriter::new(cx.descriptor.indent);
        w.lines(self.type_imports(cx, ty));
        w.blank();
        w.lines(cx.doc_comment(&ty.doc, ty.deprecated, &[]));
        w.lines(declaration(
            &format!("export type {} = ", cx.type_name(&ty.name)),
            self.object_parts(cx, members, Scope::Types)?,
        ));
        Ok(w.finish())
    }

    fn render_error(&self, cx: &EmitContext, ty: &ResolvedType, members: &[Member]) -> Result<String, GenError> {
        let name = cx.type_name(&ty.name);
        let data = format!("{}Data", name);

        let mut w = CodeWriter::new(cx.descriptor.indent);
        w.lines(self.type_imports(cx, ty));
        w.blank();
        w.lines(declaration(
            &format!("export type {} = ", data),
            self.object_parts(cx, members, Scope::Types)?,
        ));
        w.blank();
        w.lines(cx.doc_comment(&ty.doc, ty.deprecated, &[]));
        w.block::<GenError>(format!("export class {} extends Error {{", name), "}", |w| {
            w.line(format!("readonly {} = {} as const;", ERROR_MARKER, quote(&ty.name)));
            w.line(format!("readonly data: {};", data));
            w.blank();
            w.block::<GenError>(format!("constructor(data: {}, message?: string) {{", data), "}", |w| {
                w.line(format!("super(message ?? {});", quote(&ty.name)));
                w.line(format!("this.name = {};", quote(&name)));
                w.line("this.data = data;");
                Ok(())
            })?;
            Ok(())
        })?;
        w.blank();
        w.block::<GenError>(
            format!("export function is{}(error: unknown): error is {} {{", name, name),
            "}",
            |w| {
                w.line("return (");
                w.indent();
                w.line("error != null &&");
                w.line("typeof error === \"object\" &&");
                w.line(format!("\"{}\" in error &&", ERROR_MARKER));
                w.line(format!("error.{} === {}", ERROR_MARKER, quote(&ty.name)));
                w.dedent();
                w.line(");");
                Ok(())
            },
        )?;
        Ok(w.finish())
    }

    fn render_operation(&self, cx: &EmitContext, op: &ResolvedOperation) -> Result<String, GenError> {
        let request = cx.request_type_name(op);
        let function = cx.function_name(&op.name);

        let mut w = CodeWriter::new(cx.descriptor.indent);
        if !operation_dependencies(op).is_empty() {
            w.line(format!("import type * as Parameters from \"./{}/index.js\";", TYPES_DIR));
        }
        w.line("import { loadScript } from \"./loader.js\";");
        w.blank();

        w.lines(declaration(
            &format!("export type {} = ", request),
            self.object_parts(cx, &op.input, Scope::Root)?,
        ));
        w.blank();

        let throws: Vec<String> = op
            .throws
            .iter()
            .map(|e| format!("@throws {{Parameters.{}}}", cx.type_name(e)))
            .collect();
        w.lines(cx.doc_comment(&op.doc, op.deprecated, &throws));
        let default = if op.input.is_empty() { " = {}" } else { "" };
        w.block::<GenError>(
            format!(
                "export function {}(request: {}{}): Promise<{}> {{",
                function,
                request,
                default,
                self.returns(cx, op)?
            ),
            "}",
            |w| {
                w.line(format!("return loadScript().then((sdk) => sdk.{}(request));", op.name));
                Ok(())
            },
        )?;
        Ok(w.finish())
    }

    fn render_types_index(&self, cx: &EmitContext) -> Result<String, GenError> {
        if cx.schema.types.is_empty() {
            return Ok("export {};\n".to_string());
        }
        Ok(cx
            .schema
            .types
            .iter()
            .map(|ty| format!("export * from \"./{}.js\";\n", cx.type_module(&ty.name)))
            .collect())
    }

    fn render_index(&self, cx: &EmitContext) -> Result<String, GenError> {
        let global = &cx.runtime.global_name;
        let mut w = CodeWriter::new(cx.descriptor.indent);
        for op in &cx.schema.operations {
            w.line(format!(
                "import {{ {} }} from \"./{}.js\";",
                cx.function_name(&op.name),
                cx.operation_module(&op.name)
            ));
        }
        w.blank();
        w.block::<GenError>(format!("const {} = {{", global), "};", |w| {
            for op in &cx.schema.operations {
                w.line(format!("{},", cx.function_name(&op.name)));
            }
            Ok(())
        })?;
        w.blank();
        w.line("export { setScriptUrl as __INTERNAL__setScriptUrl, ShimAcquisitionError } from \"./loader.js\";");
        for op in &cx.schema.operations {
            w.line(format!(
                "export {{ {}, type {} }} from \"./{}.js\";",
                cx.function_name(&op.name),
                cx.request_type_name(op),
                cx.operation_module(&op.name)
            ));
        }
        w.line(format!("export * from \"./{}/index.js\";", TYPES_DIR));
        w.blank();
        w.line(format!("export default {};", global));
        Ok(w.finish())
    }

    fn render_shim(&self, cx: &EmitContext) -> Result<String, GenError> {
        let mut imports = Vec::new();
        if cx.schema.operations.iter().any(|op| !operation_dependencies(op).is_empty()) {
            imports.push(format!("import type * as Parameters from \"./{}/index.js\";", TYPES_DIR));
        }
        let mut methods = Vec::new();
        for op in &cx.schema.operations {
            let request = cx.request_type_name(op);
            imports.push(format!(
                "import type {{ {} }} from \"./{}.js\";",
                request,
                cx.operation_module(&op.name)
            ));
            methods.push(format!("  {}(request: {}): Promise<{}>;", op.name, request, self.returns(cx, op)?));
        }

        let failure_note = if cx.runtime.retry_after_failure {
            "after a failed load the next caller starts a new attempt."
        } else {
            "a failed load is cached and returned to every later caller."
        };
        let script_url = script_url_expression(cx.runtime);
        let retry = cx.runtime.retry_after_failure.to_string();
        let imports = imports.join("\n");
        let methods = methods.join("\n");

        Ok(fill_template(
            LOADER_TEMPLATE,
            &[
                ("IMPORTS", imports.as_str()),
                ("METHODS", methods.as_str()),
                ("GLOBAL_NAME", cx.runtime.global_name.as_str()),
                ("SCRIPT_URL", script_url.as_str()),
                ("RETRY_AFTER_FAILURE", retry.as_str()),
                ("FAILURE_NOTE", failure_note),
            ],
        ))
    }
}
