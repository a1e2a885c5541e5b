//! Dart modules for web clients built on `dart:js_interop`.
//!
//! Every named type is a class with `fromJson`/`toJson`. An exclusivity
//! group becomes a sealed class with one final subclass per member, so a
//! request cannot be built with none or several of them.

use sdkgen_schema::{EnumVariant, Primitive};

use crate::{
    backend::{
        fill_template, operation_dependencies, type_dependencies, typescript::ERROR_MARKER,
        BackendDescriptor, CommentStyle, Scope, TargetBackend, UnionStrategy, SHIM_BINDINGS,
    },
    emit::{CodeWriter, EmitContext, TYPES_DIR},
    error::GenError,
    resolver::{ExclusiveConstraint, Field, Member, NamedKind, ResolvedOperation, ResolvedType, TypeBody, TypeRef},
    utils::{quote, Case},
};

const LOADER_TEMPLATE: &str = include_str!("templates/loader.dart");
const JSON_MODULE: &str = include_str!("templates/json.dart");

/// Support module holding `jsonObject`.
pub const JSON_MODULE_NAME: &str = "json";

/// Dart keywords, built-in identifiers and the `dart:core` types emitted
/// modules name.
pub const DART_RESERVED_WORDS: &[&str] = &[
    "abstract", "as", "assert", "async", "await", "base", "break", "case", "catch",
    "class", "const", "continue", "covariant", "default", "deferred", "do", "dynamic",
    "else", "enum", "export", "extends", "extension", "external", "factory", "false",
    "final", "finally", "for", "Function", "get", "hide", "if", "implements", "import",
    "in", "interface", "is", "late", "library", "mixin", "new", "null", "of", "on",
    "operator", "part", "required", "rethrow", "return", "sealed", "set", "show",
    "static", "super", "switch", "sync", "this", "throw", "true", "try", "type",
    "typedef", "var", "void", "when", "while", "with", "yield",
    "String", "int", "double", "num", "bool", "List", "Map", "Object", "Future",
    "Exception", "Error", "Record", "Type", "Never", "Null", "Iterable", "Set",
];

/// Members every generated enum already declares.
const ENUM_MEMBERS: [&str; 5] = ["values", "index", "name", "fromJson", "toJson"];

pub struct DartBackend {
    descriptor: BackendDescriptor,
}

impl Default for DartBackend {
    fn default() -> Self {
        DartBackend {
            descriptor: BackendDescriptor {
                name:           "dart",
                extension:      "dart",
                type_case:      Case::Pascal,
                member_case:    Case::Camel,
                function_case:  Case::Camel,
                module_case:    Some(Case::Snake),
                line_comment:   "//",
                doc_comment:    CommentStyle::Line { prefix: "///" },
                indent:         "  ",
                reserved_words: &[DART_RESERVED_WORDS, SHIM_BINDINGS, &["callSdk", "jsonObject", "SdkCallError"]],
                union_strategy: Some(UnionStrategy::TaggedUnion),
            },
        }
    }
}

/// Single-quoted Dart string literal.
fn dart_string(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('$', "\\$")
        .replace('\n', "\\n");
    format!("'{}'", escaped)
}

fn primitive(p: Primitive) -> &'static str {
    match p {
        Primitive::String  => "String",
        Primitive::Integer => "int",
        Primitive::Number  => "double",
        Primitive::Boolean => "bool",
        Primitive::Object  => "Map<String, dynamic>",
    }
}

fn nullable(ty: String) -> String {
    if ty.ends_with('?') { ty } else { format!("{}?", ty) }
}

/// Doc comment followed by `@deprecated` when needed.
fn annotated(cx: &EmitContext, doc: &sdkgen_schema::DocBlock, deprecated: bool, tags: &[String]) -> Vec<String> {
    let mut lines = cx.doc_comment(doc, false, tags);
    if deprecated {
        lines.push("@deprecated".to_string());
    }
    lines
}

/// Expression turning `expr` into its JSON value, or `None` when the value
/// is already JSON.
fn to_json(cx: &EmitContext, ty: &TypeRef, expr: &str) -> Option<String> {
    match ty {
        TypeRef::Primitive(_) | TypeRef::Unknown => None,
        TypeRef::Named { name, kind: NamedKind::Alias } => match cx.schema.type_named(name).map(|t| &t.body) {
            Some(TypeBody::Alias(target)) => to_json(cx, target, expr),
            _ => None,
        },
        TypeRef::Named { .. } => Some(format!("{}.toJson()", expr)),
        TypeRef::Array(item) => {
            to_json(cx, item, "e").map(|item| format!("{}.map((e) => {}).toList()", expr, item))
        }
    }
}

/// Expression reading a value of type `ty` from the decoded JSON `expr`.
fn from_json(cx: &EmitContext, ty: &TypeRef, expr: &str) -> String {
    match ty {
        TypeRef::Primitive(Primitive::String)  => format!("{} as String", expr),
        TypeRef::Primitive(Primitive::Integer) => format!("({} as num).toInt()", expr),
        TypeRef::Primitive(Primitive::Number)  => format!("({} as num).toDouble()", expr),
        TypeRef::Primitive(Primitive::Boolean) => format!("{} as bool", expr),
        TypeRef::Primitive(Primitive::Object)  => format!("jsonObject({})", expr),
        TypeRef::Unknown => expr.to_string(),
        TypeRef::Named { name, kind } => match kind {
            NamedKind::Alias => match cx.schema.type_named(name).map(|t| &t.body) {
                Some(TypeBody::Alias(target)) => from_json(cx, target, expr),
                _ => expr.to_string(),
            },
            NamedKind::Enum => format!("{}.fromJson({} as String)", cx.type_name(name), expr),
            NamedKind::Struct | NamedKind::Error => {
                format!("{}.fromJson(jsonObject({}))", cx.type_name(name), expr)
            }
        },
        TypeRef::Array(item) => format!(
            "({} as List<dynamic>).map((e) => {}).toList()",
            expr,
            from_json(cx, item, "e")
        ),
    }
}

/// Imports in path order followed by the body.
fn module(imports: Vec<String>, body: String, indent: &'static str) -> String {
    let mut w = CodeWriter::new(indent);
    w.lines(imports);
    w.blank();
    w.lines(body.lines());
    w.finish()
}

impl DartBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Member binding, suffixed with `_` when it would be a keyword.
    fn field_name(&self, cx: &EmitContext, name: &str) -> String {
        let name = cx.member_name(name);
        if self.descriptor.is_reserved(&name) { format!("{}_", name) } else { name }
    }

    fn field_type(&self, cx: &EmitContext, field: &Field) -> Result<String, GenError> {
        let ty = self.type_ref(cx, &field.ty, Scope::Types)?;
        Ok(if field.optional { nullable(ty) } else { ty })
    }

    /// Generated class names must not shadow a named type.
    fn check_generated(&self, cx: &EmitContext, name: &str, context: &str) -> Result<(), GenError> {
        if cx.schema.types.iter().any(|t| cx.type_name(&t.name) == name) {
            return Err(cx.unsupported(&format!("generated class {}", quote(name)), context));
        }
        Ok(())
    }

    fn union_name(&self, cx: &EmitContext, owner: &str, constraint: &ExclusiveConstraint) -> String {
        format!("{}{}", owner, cx.type_name(&constraint.group))
    }

    fn variant_name(&self, cx: &EmitContext, union: &str, field: &Field) -> String {
        format!("{}{}", union, cx.type_name(&field.name))
    }

    /// `'key': value` for one field of a `toJson` map literal.
    fn json_entry(&self, cx: &EmitContext, field: &Field) -> String {
        let name = self.field_name(cx, &field.name);
        let key = dart_string(&field.name);
        if field.optional {
            let value = to_json(cx, &field.ty, &format!("{}!", name)).unwrap_or_else(|| name.clone());
            format!("if ({} != null) {}: {},", name, key, value)
        } else {
            let value = to_json(cx, &field.ty, &name).unwrap_or_else(|| name.clone());
            format!("{}: {},", key, value)
        }
    }

    /// `name: decoded,` for one field of a `fromJson` factory.
    fn json_argument(&self, cx: &EmitContext, field: &Field) -> String {
        let access = format!("json[{}]", dart_string(&field.name));
        let value = from_json(cx, &field.ty, &access);
        if field.optional {
            format!("{}: {} == null ? null : {},", self.field_name(cx, &field.name), access, value)
        } else {
            format!("{}: {},", self.field_name(cx, &field.name), value)
        }
    }

    /// A data class for `members`, followed by one sealed hierarchy per
    /// exclusivity group. `error` carries the wire name of error classes.
    fn write_class(
        &self,
        cx: &EmitContext,
        w: &mut CodeWriter,
        name: &str,
        members: &[Member],
        error: Option<&str>,
        context: &str,
    ) -> Result<(), GenError> {
        let head = match error {
            Some(_) => format!("class {} implements Exception {{", name),
            None => format!("class {} {{", name),
        };
        w.block::<GenError>(head, "}", |w| {
            if let Some(wire) = error {
                w.line(format!("static const String sdkErrorType = {};", dart_string(wire)));
                w.blank();
            }

            for member in members {
                match member {
                    Member::Field(field) => {
                        w.lines(annotated(cx, &field.doc, field.deprecated, &[]));
                        w.line(format!("final {} {};", self.field_type(cx, field)?, self.field_name(cx, &field.name)));
                    }
                    Member::Exclusive(constraint) => {
                        w.lines(cx.comment(&[format!("Exactly one of {}.", constraint.member_names().join(", "))]));
                        w.line(format!(
                            "final {} {};",
                            self.union_name(cx, name, constraint),
                            self.field_name(cx, &constraint.group)
                        ));
                    }
                }
            }
            if !members.is_empty() {
                w.blank();
            }

            if members.is_empty() {
                w.line(format!("const {}();", name));
                w.blank();
                w.line(format!("factory {}.fromJson(Map<String, dynamic> json) => const {}();", name, name));
                w.blank();
                w.line("Map<String, dynamic> toJson() => <String, dynamic>{};");
            } else {
                w.block::<GenError>(format!("const {}({{", name), "});", |w| {
                    for member in members {
                        match member {
                            Member::Field(field) if field.optional => {
                                w.line(format!("this.{},", self.field_name(cx, &field.name)));
                            }
                            Member::Field(field) => {
                                w.line(format!("required this.{},", self.field_name(cx, &field.name)));
                            }
                            Member::Exclusive(constraint) => {
                                w.line(format!("required this.{},", self.field_name(cx, &constraint.group)));
                            }
                        }
                    }
                    Ok(())
                })?;
                w.blank();
                w.block::<GenError>(
                    format!("factory {}.fromJson(Map<String, dynamic> json) => {}(", name, name),
                    ");",
                    |w| {
                        for member in members {
                            match member {
                                Member::Field(field) => w.line(self.json_argument(cx, field)),
                                Member::Exclusive(constraint) => w.line(format!(
                                    "{}: {}.fromJson(json),",
                                    self.field_name(cx, &constraint.group),
                                    self.union_name(cx, name, constraint)
                                )),
                            };
                        }
                        Ok(())
                    },
                )?;
                w.blank();
                w.block::<GenError>("Map<String, dynamic> toJson() => {", "};", |w| {
                    for member in members {
                        match member {
                            Member::Field(field) => w.line(self.json_entry(cx, field)),
                            Member::Exclusive(constraint) => {
                                w.line(format!("...{}.toJson(),", self.field_name(cx, &constraint.group)))
                            }
                        };
                    }
                    Ok(())
                })?;
            }

            if error.is_some() {
                w.blank();
                w.line("@override");
                w.line(format!("String toString() => '{}(${{toJson()}})';", name));
            }
            Ok(())
        })?;

        for member in members {
            if let Member::Exclusive(constraint) = member {
                w.blank();
                self.write_union(cx, w, name, constraint, context)?;
            }
        }
        Ok(())
    }

    /// `sealed class OwnerGroup` plus `final class OwnerGroupMember` for
    /// every member of the group.
    fn write_union(
        &self,
        cx: &EmitContext,
        w: &mut CodeWriter,
        owner: &str,
        constraint: &ExclusiveConstraint,
        context: &str,
    ) -> Result<(), GenError> {
        let union = self.union_name(cx, owner, constraint);
        self.check_generated(cx, &union, context)?;
        let names = constraint.member_names();

        w.lines(cx.comment(&[format!("Exactly one of {}.", names.join(", "))]));
        w.block::<GenError>(format!("sealed class {} {{", union), "}", |w| {
            w.line(format!("const {}();", union));
            w.blank();
            w.block::<GenError>(
                format!("factory {}.fromJson(Map<String, dynamic> json) {{", union),
                "}",
                |w| {
                    let keys: Vec<String> = names.iter().map(|n| dart_string(n)).collect();
                    w.line(format!(
                        "final present = [{}].where((key) => json[key] != null).toList();",
                        keys.join(", ")
                    ));
                    w.block::<GenError>("if (present.length != 1) {", "}", |w| {
                        w.line(format!(
                            "throw ArgumentError({});",
                            dart_string(&format!(
                                "exactly one of {} must be provided for {}",
                                names.join(", "),
                                constraint.group
                            ))
                        ));
                        Ok(())
                    })?;
                    w.block::<GenError>("return switch (present.single) {", "};", |w| {
                        let last = constraint.members.len().saturating_sub(1);
                        for (i, field) in constraint.members.iter().enumerate() {
                            let pattern = if i == last { "_".to_string() } else { dart_string(&field.name) };
                            let access = format!("json[{}]", dart_string(&field.name));
                            w.line(format!(
                                "{} => {}({}),",
                                pattern,
                                self.variant_name(cx, &union, field),
                                from_json(cx, &field.ty, &access)
                            ));
                        }
                        Ok(())
                    })?;
                    Ok(())
                },
            )?;
            w.blank();
            w.line("Map<String, dynamic> toJson();");
            Ok(())
        })?;

        for field in &constraint.members {
            let variant = self.variant_name(cx, &union, field);
            self.check_generated(cx, &variant, context)?;
            let binding = self.field_name(cx, &field.name);

            w.blank();
            w.lines(annotated(cx, &field.doc, field.deprecated, &[]));
            w.block::<GenError>(format!("final class {} extends {} {{", variant, union), "}", |w| {
                w.line(format!("final {} {};", self.type_ref(cx, &field.ty, Scope::Types)?, binding));
                w.blank();
                w.line(format!("const {}(this.{});", variant, binding));
                w.blank();
                w.line("@override");
                let value = to_json(cx, &field.ty, &binding).unwrap_or_else(|| binding.clone());
                w.line(format!(
                    "Map<String, dynamic> toJson() => {{{}: {}}};",
                    dart_string(&field.name),
                    value
                ));
                Ok(())
            })?;
        }
        Ok(())
    }

    /// Imports of a module inside the named-type directory.
    fn type_imports(&self, body: &str, ty: &ResolvedType) -> Vec<String> {
        let mut imports = Vec::new();
        if body.contains("jsonObject(") {
            imports.push(format!("import '../{}.dart';", JSON_MODULE_NAME));
        }
        if !type_dependencies(ty).is_empty() {
            imports.push("import 'index.dart';".to_string());
        }
        imports
    }

    fn returns(&self, cx: &EmitContext, op: &ResolvedOperation) -> Result<String, GenError> {
        match &op.returns {
            Some(ty) => self.type_ref(cx, ty, Scope::Root),
            None => Ok("void".to_string()),
        }
    }

    /// `await callSdk(..)` plus the decoding return statement.
    fn write_call(&self, cx: &EmitContext, w: &mut CodeWriter, op: &ResolvedOperation) {
        let call = format!("callSdk(sdk, {}, request.toJson())", dart_string(&op.name));
        match &op.returns {
            Some(ty) => {
                w.line(format!("final result = await {};", call));
                w.line(format!("return {};", from_json(cx, ty, "result")));
            }
            None => {
                w.line(format!("await {};", call));
            }
        }
    }
}

impl TargetBackend for DartBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn type_ref(&self, cx: &EmitContext, ty: &TypeRef, _scope: Scope) -> Result<String, GenError> {
        Ok(match ty {
            TypeRef::Primitive(p) => primitive(*p).to_string(),
            TypeRef::Named { name, .. } => cx.type_name(name),
            TypeRef::Array(item) => format!("List<{}>", self.type_ref(cx, item, Scope::Types)?),
            TypeRef::Unknown => "Object?".to_string(),
        })
    }

    fn render_alias(&self, cx: &EmitContext, ty: &ResolvedType, target: &TypeRef) -> Result<String, GenError> {
        let mut w = CodeWriter::new(cx.descriptor.indent);
        w.lines(annotated(cx, &ty.doc, ty.deprecated, &[]));
        w.line(format!(
            "typedef {} = {};",
            cx.type_name(&ty.name),
            self.type_ref(cx, target, Scope::Types)?
        ));
        let body = w.finish();
        Ok(module(self.type_imports(&body, ty), body, cx.descriptor.indent))
    }

    fn render_enum(&self, cx: &EmitContext, ty: &ResolvedType, variants: &[EnumVariant]) -> Result<String, GenError> {
        let name = cx.type_name(&ty.name);
        let mut w = CodeWriter::new(cx.descriptor.indent);
        w.lines(annotated(cx, &ty.doc, ty.deprecated, &[]));
        w.block::<GenError>(format!("enum {} {{", name), "}", |w| {
            let last = variants.len().saturating_sub(1);
            for (i, variant) in variants.iter().enumerate() {
                let mut binding = self.field_name(cx, &variant.name);
                if ENUM_MEMBERS.contains(&binding.as_str()) {
                    binding.push('_');
                }
                w.lines(annotated(cx, &variant.doc, variant.deprecated, &[]));
                w.line(format!(
                    "{}({}){}",
                    binding,
                    dart_string(variant.literal()),
                    if i == last { ";" } else { "," }
                ));
            }
            w.blank();
            w.line("final String _value;");
            w.blank();
            w.line(format!("const {}(this._value);", name));
            w.blank();
            w.line(format!(
                "static {} fromJson(String value) => values.firstWhere((v) => v._value == value);",
                name
            ));
            w.blank();
            w.line("String toJson() => _value;");
            Ok(())
        })?;
        Ok(w.finish())
    }

    fn render_struct(&self, cx: &EmitContext, ty: &ResolvedType, members: &[Member]) -> Result<String, GenError> {
        let mut w = CodeWriter::new(cx.descriptor.indent);
        w.lines(annotated(cx, &ty.doc, ty.deprecated, &[]));
        self.write_class(cx, &mut w, &cx.type_name(&ty.name), members, None, &cx.describe_type(ty))?;
        let body = w.finish();
        Ok(module(self.type_imports(&body, ty), body, cx.descriptor.indent))
    }

    fn render_error(&self, cx: &EmitContext, ty: &ResolvedType, members: &[Member]) -> Result<String, GenError> {
        let mut w = CodeWriter::new(cx.descriptor.indent);
        w.lines(annotated(cx, &ty.doc, ty.deprecated, &[]));
        self.write_class(
            cx,
            &mut w,
            &cx.type_name(&ty.name),
            members,
            Some(&ty.name),
            &cx.describe_type(ty),
        )?;
        let body = w.finish();
        Ok(module(self.type_imports(&body, ty), body, cx.descriptor.indent))
    }

    fn render_operation(&self, cx: &EmitContext, op: &ResolvedOperation) -> Result<String, GenError> {
        let request = cx.request_type_name(op);
        let function = cx.function_name(&op.name);
        let context = format!("operation {}", quote(&op.name));
        self.check_generated(cx, &request, &context)?;

        let mut w = CodeWriter::new(cx.descriptor.indent);
        self.write_class(cx, &mut w, &request, &op.input, None, &context)?;
        w.blank();

        let throws: Vec<String> = op
            .throws
            .iter()
            .map(|e| format!("Throws [{}].", cx.type_name(e)))
            .collect();
        w.lines(annotated(cx, &op.doc, op.deprecated, &throws));
        let param = if op.input.is_empty() {
            format!("[{} request = const {}()]", request, request)
        } else {
            format!("{} request", request)
        };
        w.block::<GenError>(
            format!("Future<{}> {}({}) async {{", self.returns(cx, op)?, function, param),
            "}",
            |w| {
                w.line("final sdk = await loadScript();");
                if op.throws.is_empty() {
                    self.write_call(cx, w, op);
                    return Ok(());
                }
                w.block::<GenError>("try {", "} on SdkCallError catch (error) {", |w| {
                    self.write_call(cx, w, op);
                    Ok(())
                })?;
                w.indent();
                w.block::<GenError>("switch (error.type) {", "}", |w| {
                    for error in &op.throws {
                        let class = cx.type_name(error);
                        w.line(format!("case {}.sdkErrorType:", class));
                        w.indent();
                        w.line(format!("throw {}.fromJson(error.data);", class));
                        w.dedent();
                    }
                    Ok(())
                })?;
                w.line("rethrow;");
                w.dedent();
                w.line("}");
                Ok(())
            },
        )?;
        let body = w.finish();

        let mut imports = Vec::new();
        if body.contains("jsonObject(") {
            imports.push(format!("import '{}.dart';", JSON_MODULE_NAME));
        }
        imports.push("import 'loader.dart';".to_string());
        if !operation_dependencies(op).is_empty() {
            imports.push(format!("import '{}/index.dart';", TYPES_DIR));
        }
        Ok(module(imports, body, cx.descriptor.indent))
    }

    fn render_types_index(&self, cx: &EmitContext) -> Result<String, GenError> {
        Ok(cx
            .schema
            .types
            .iter()
            .map(|ty| format!("export '{}.dart';\n", cx.type_module(&ty.name)))
            .collect())
    }

    fn render_index(&self, cx: &EmitContext) -> Result<String, GenError> {
        let global = &cx.runtime.global_name;
        self.check_generated(cx, global, "the package index")?;

        let mut w = CodeWriter::new(cx.descriptor.indent);
        for op in &cx.schema.operations {
            let stem = cx.operation_module(&op.name);
            w.line(format!("import '{}.dart' as _{};", stem, stem));
        }
        w.blank();
        w.line("export 'loader.dart' show SdkCallError, ShimAcquisitionError, setScriptUrl;");
        w.line(format!("export '{}/index.dart';", TYPES_DIR));
        for op in &cx.schema.operations {
            w.line(format!("export '{}.dart';", cx.operation_module(&op.name)));
        }
        w.blank();
        w.line(format!("/// Every operation of the {} SDK.", global));
        w.block::<GenError>(format!("abstract final class {} {{", global), "}", |w| {
            for op in &cx.schema.operations {
                w.line(format!(
                    "static const {} = _{}.{};",
                    cx.function_name(&op.name),
                    cx.operation_module(&op.name),
                    cx.function_name(&op.name)
                ));
            }
            Ok(())
        })?;
        Ok(w.finish())
    }

    fn render_shim(&self, cx: &EmitContext) -> Result<String, GenError> {
        let failure_note = if cx.runtime.retry_after_failure {
            "after a failed load the next caller starts a new attempt."
        } else {
            "a failed load is cached and returned to every later caller."
        };
        let script_url = match &cx.runtime.script_url_env {
            Some(env) => format!(
                "const String.fromEnvironment({}, defaultValue: {})",
                dart_string(env),
                dart_string(&cx.runtime.script_url)
            ),
            None => dart_string(&cx.runtime.script_url),
        };
        let retry = cx.runtime.retry_after_failure.to_string();

        Ok(fill_template(
            LOADER_TEMPLATE,
            &[
                ("GLOBAL_NAME", cx.runtime.global_name.as_str()),
                ("SCRIPT_URL", script_url.as_str()),
                ("RETRY_AFTER_FAILURE", retry.as_str()),
                ("ERROR_MARKER", ERROR_MARKER),
                ("FAILURE_NOTE", failure_note),
            ],
        ))
    }

    fn render_support(&self, _cx: &EmitContext) -> Result<Vec<(String, String)>, GenError> {
        Ok(vec![(JSON_MODULE_NAME.to_string(), JSON_MODULE.to_string())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compile_schema, config::RuntimeOptions, emit::emit};

    fn render_with(text: &str, runtime: &RuntimeOptions) -> Vec<(String, String)> {
        let schema = compile_schema(text).expect("compile failed");
        emit(&DartBackend::new(), &schema, runtime)
            .expect("emit failed")
            .into_iter()
            .map(|u| (u.path, u.contents))
            .collect()
    }

    fn render(text: &str) -> Vec<(String, String)> {
        render_with(text, &RuntimeOptions::default())
    }

    fn unit<'a>(units: &'a [(String, String)], path: &str) -> &'a str {
        units
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, c)| c.as_str())
            .unwrap_or_else(|| panic!("missing unit {}", path))
    }

    #[test]
    fn test_layout_uses_snake_case_modules() {
        let units = render("type ChannelKey = string; operation loadIssueBillingKeyUI { ChannelKey channelKey; }");
        let paths: Vec<&str> = units.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "parameters/channel_key.dart",
                "parameters/index.dart",
                "load_issue_billing_key_ui.dart",
                "index.dart",
                "loader.dart",
                "json.dart",
            ]
        );
        assert_eq!(
            unit(&units, "parameters/channel_key.dart"),
            "// This file is generated by sdkgen. Do not edit.\n\ntypedef ChannelKey = String;\n"
        );
        assert_eq!(
            unit(&units, "parameters/index.dart"),
            "// This file is generated by sdkgen. Do not edit.\n\nexport 'channel_key.dart';\n"
        );
    }

    #[test]
    fn test_operation_with_sealed_union() {
        let units = render(
            r#"
            type ChannelKey = string;
            /// Verifies a customer.
            operation verify {
              string storeId;
              oneof channel { ChannelKey channelKey; object pgProvider; }
              string? id;
            }
            "#,
        );
        let expected = r#"// This file is generated by sdkgen. Do not edit.

import 'json.dart';
import 'loader.dart';
import 'parameters/index.dart';

class VerifyRequest {
  final String storeId;
  /// Exactly one of channelKey, pgProvider.
  final VerifyRequestChannel channel;
  final String? id;

  const VerifyRequest({
    required this.storeId,
    required this.channel,
    this.id,
  });

  factory VerifyRequest.fromJson(Map<String, dynamic> json) => VerifyRequest(
    storeId: json['storeId'] as String,
    channel: VerifyRequestChannel.fromJson(json),
    id: json['id'] == null ? null : json['id'] as String,
  );

  Map<String, dynamic> toJson() => {
    'storeId': storeId,
    ...channel.toJson(),
    if (id != null) 'id': id,
  };
}

/// Exactly one of channelKey, pgProvider.
sealed class VerifyRequestChannel {
  const VerifyRequestChannel();

  factory VerifyRequestChannel.fromJson(Map<String, dynamic> json) {
    final present = ['channelKey', 'pgProvider'].where((key) => json[key] != null).toList();
    if (present.length != 1) {
      throw ArgumentError('exactly one of channelKey, pgProvider must be provided for channel');
    }
    return switch (present.single) {
      'channelKey' => VerifyRequestChannelChannelKey(json['channelKey'] as String),
      _ => VerifyRequestChannelPgProvider(jsonObject(json['pgProvider'])),
    };
  }

  Map<String, dynamic> toJson();
}

final class VerifyRequestChannelChannelKey extends VerifyRequestChannel {
  final ChannelKey channelKey;

  const VerifyRequestChannelChannelKey(this.channelKey);

  @override
  Map<String, dynamic> toJson() => {'channelKey': channelKey};
}

final class VerifyRequestChannelPgProvider extends VerifyRequestChannel {
  final Map<String, dynamic> pgProvider;

  const VerifyRequestChannelPgProvider(this.pgProvider);

  @override
  Map<String, dynamic> toJson() => {'pgProvider': pgProvider};
}

/// Verifies a customer.
Future<void> verify(VerifyRequest request) async {
  final sdk = await loadScript();
  await callSdk(sdk, 'verify', request.toJson());
}
"#;
        assert_eq!(unit(&units, "verify.dart"), expected);
    }

    #[test]
    fn test_enum_and_nested_struct() {
        let units = render(
            r#"
            /// Payment currency.
            enum Currency {
              KRW = "CURRENCY_KRW";
              /// Old name.
              WON = "CURRENCY_WON" [deprecated];
            }
            struct Amount { integer total; Currency currency; Currency[]? accepted; }
            "#,
        );
        let currency = unit(&units, "parameters/currency.dart");
        assert!(currency.contains(
            "/// Payment currency.\nenum Currency {\n  krw('CURRENCY_KRW'),\n  /// Old name.\n  @deprecated\n  won('CURRENCY_WON');\n"
        ));
        assert!(currency.contains("static Currency fromJson(String value) => values.firstWhere((v) => v._value == value);"));

        let amount = unit(&units, "parameters/amount.dart");
        assert!(amount.starts_with("// This file is generated by sdkgen. Do not edit.\n\nimport 'index.dart';\n\nclass Amount {"));
        assert!(amount.contains("  final List<Currency>? accepted;\n"));
        assert!(amount.contains("    total: (json['total'] as num).toInt(),\n"));
        assert!(amount.contains("    currency: Currency.fromJson(json['currency'] as String),\n"));
        assert!(amount.contains(
            "    accepted: json['accepted'] == null ? null : (json['accepted'] as List<dynamic>).map((e) => Currency.fromJson(e as String)).toList(),\n"
        ));
        assert!(amount.contains("    'currency': currency.toJson(),\n"));
        assert!(amount.contains("    if (accepted != null) 'accepted': accepted!.map((e) => e.toJson()).toList(),\n"));
    }

    #[test]
    fn test_errors_and_throws() {
        let units = render(
            r#"
            error VerificationFailed { string code; }
            struct Result { string id; }
            /// Verifies.
            operation verify [deprecated] returns Result throws VerificationFailed { }
            "#,
        );
        let error = unit(&units, "parameters/verification_failed.dart");
        assert!(error.contains("class VerificationFailed implements Exception {\n  static const String sdkErrorType = 'VerificationFailed';\n"));
        assert!(error.contains("  String toString() => 'VerificationFailed(${toJson()})';\n"));

        let expected = r#"/// Verifies.
///
/// Throws [VerificationFailed].
@deprecated
Future<Result> verify([VerifyRequest request = const VerifyRequest()]) async {
  final sdk = await loadScript();
  try {
    final result = await callSdk(sdk, 'verify', request.toJson());
    return Result.fromJson(jsonObject(result));
  } on SdkCallError catch (error) {
    switch (error.type) {
      case VerificationFailed.sdkErrorType:
        throw VerificationFailed.fromJson(error.data);
    }
    rethrow;
  }
}
"#;
        let op = unit(&units, "verify.dart");
        assert!(op.ends_with(expected), "{}", op);
        assert!(op.contains("class VerifyRequest {\n  const VerifyRequest();\n"));
        assert!(op.contains("import 'json.dart';\nimport 'loader.dart';\nimport 'parameters/index.dart';\n"));
    }

    #[test]
    fn test_keywords_become_suffixed_fields() {
        let units = render("struct Range { integer default; integer? in; }");
        let range = unit(&units, "parameters/range.dart");
        assert!(range.contains("  final int default_;\n  final int? in_;\n"));
        assert!(range.contains("    'default': default_,\n    if (in_ != null) 'in': in_,\n"));
    }

    #[test]
    fn test_generated_class_must_not_shadow_types() {
        let schema = compile_schema(
            "struct VerifyRequestChannel { string id; } operation verify { oneof channel { string a; string b; } }",
        )
        .expect("compile failed");
        let err = emit(&DartBackend::new(), &schema, &RuntimeOptions::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Backend \"dart\" cannot render generated class \"VerifyRequestChannel\" in operation \"verify\""
        );
    }

    #[test]
    fn test_index_and_loader() {
        let mut runtime = RuntimeOptions::default();
        runtime.script_url_env = Some("JS_SDK_URL".into());
        runtime.retry_after_failure = true;
        let units = render_with("operation requestPayment { string storeId; }", &runtime);

        let index = unit(&units, "index.dart");
        assert!(index.contains("import 'request_payment.dart' as _request_payment;\n"));
        assert!(index.contains("export 'loader.dart' show SdkCallError, ShimAcquisitionError, setScriptUrl;\n"));
        assert!(index.contains("export 'request_payment.dart';\n"));
        assert!(index.contains(
            "abstract final class PortOne {\n  static const requestPayment = _request_payment.requestPayment;\n}"
        ));

        let loader = unit(&units, "loader.dart");
        assert!(loader.contains(
            "String _scriptUrl = const String.fromEnvironment('JS_SDK_URL', defaultValue: 'https://cdn.portone.io/v2/browser-sdk.js');"
        ));
        assert!(loader.contains("const bool _retryAfterFailure = true;"));
        assert!(loader.contains("getProperty<JSAny?>('__sdkErrorType'.toJS)"));
        assert!(loader.contains("after a failed load the next caller starts a new attempt."));
        assert!(!loader.contains("{{"));

        assert!(unit(&units, "json.dart").contains("Map<String, dynamic> jsonObject(Object? value)"));
    }
}
