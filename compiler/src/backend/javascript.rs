use std::collections::BTreeSet;

use sdkgen_schema::{EnumVariant, Primitive};

use crate::{
    backend::{
        fill_template, script_url_expression, BackendDescriptor, CommentStyle, Scope,
        TargetBackend, UnionStrategy, JS_RESERVED_WORDS, SHIM_BINDINGS,
    },
    emit::{CodeWriter, EmitContext, TYPES_DIR},
    error::GenError,
    resolver::{all_fields, has_exclusive, Member, ResolvedOperation, ResolvedType, TypeRef},
    utils::{quote, Case},
};

const LOADER_TEMPLATE: &str = include_str!("templates/loader.js");
const EXCLUSIVE_MODULE: &str = include_str!("templates/exclusive.js");

/// Support module holding `assertExactlyOne`.
pub const EXCLUSIVE_MODULE_NAME: &str = "exclusive";

/// Plain ES modules with JSDoc types. Exclusivity groups cannot be typed
/// here, so every group gets a flagged `EXCLUSIVE(..)` comment and an
/// `assertExactlyOne` call that runs before the request is sent.
pub struct JavaScriptBackend {
    descriptor: BackendDescriptor,
}

impl Default for JavaScriptBackend {
    fn default() -> Self {
        JavaScriptBackend {
            descriptor: BackendDescriptor {
                name:           "javascript",
                extension:      "js",
                type_case:      Case::Pascal,
                member_case:    Case::Preserve,
                function_case:  Case::Camel,
                module_case:    None,
                line_comment:   "//",
                doc_comment:    CommentStyle::JSDOC,
                indent:         "  ",
                reserved_words: &[JS_RESERVED_WORDS, SHIM_BINDINGS, &["assertExactlyOne"]],
                union_strategy: Some(UnionStrategy::RuntimeCheck),
            },
        }
    }
}

fn exclusive_note(group: &str, names: &[&str]) -> String {
    format!("EXCLUSIVE({}): exactly one of {} must be provided", group, names.join(", "))
}

fn check_function(cx: &EmitContext, type_name: &str) -> String {
    format!("check{}", cx.type_name(type_name))
}

impl JavaScriptBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// `@typedef {object}` text for a field set, property docs indented
    /// under their `@property` line.
    fn typedef_text(&self, cx: &EmitContext, name: &str, members: &[Member], scope: Scope) -> Result<Vec<String>, GenError> {
        let mut text = vec![format!("@typedef {{object}} {}", name)];
        for member in members {
            match member {
                Member::Field(field) => {
                    let ty = self.type_ref(cx, &field.ty, scope)?;
                    let prop = cx.member_name(&field.name);
                    if field.optional {
                        text.push(format!("@property {{{}}} [{}]", ty, prop));
                    } else {
                        text.push(format!("@property {{{}}} {}", ty, prop));
                    }
                    text.extend(field_description(&field.doc.lines(), field.deprecated));
                }
                Member::Exclusive(constraint) => {
                    let note = exclusive_note(&constraint.group, &constraint.member_names());
                    for field in &constraint.members {
                        let ty = self.type_ref(cx, &field.ty, scope)?;
                        text.push(format!("@property {{{}}} [{}] {}", ty, cx.member_name(&field.name), note));
                        text.extend(field_description(&field.doc.lines(), field.deprecated));
                    }
                }
            }
        }
        Ok(text)
    }

    /// Validation statements for `value`: group assertions plus checks of
    /// nested values whose types carry groups.
    fn write_checks(&self, cx: &EmitContext, w: &mut CodeWriter, value: &str, context: &str, members: &[Member]) {
        for member in members {
            match member {
                Member::Exclusive(constraint) => {
                    let names = constraint.member_names();
                    w.line(cx.line_comment(&exclusive_note(&constraint.group, &names)));
                    let keys: Vec<String> = names.iter().map(|n| quote(&cx.member_name(n))).collect();
                    w.line(format!(
                        "assertExactlyOne({}, {}, {}, [{}]);",
                        value,
                        quote(context),
                        quote(&constraint.group),
                        keys.join(", ")
                    ));
                    for field in &constraint.members {
                        write_nested_check(cx, w, &format!("{}.{}", value, cx.member_name(&field.name)), &field.ty, 0);
                    }
                }
                Member::Field(field) => {
                    write_nested_check(cx, w, &format!("{}.{}", value, cx.member_name(&field.name)), &field.ty, 0);
                }
            }
        }
    }

    /// Imports needed by [`Self::write_checks`] from a module at `scope`.
    fn check_imports(&self, cx: &EmitContext, members: &[Member], scope: Scope, own: Option<&str>) -> Vec<String> {
        let mut imports = Vec::new();
        let prefix = match scope {
            Scope::Root  => format!("./{}/", TYPES_DIR),
            Scope::Types => "./".to_string(),
        };
        if has_exclusive(members) {
            let support = match scope {
                Scope::Root  => format!("./{}.js", EXCLUSIVE_MODULE_NAME),
                Scope::Types => format!("../{}.js", EXCLUSIVE_MODULE_NAME),
            };
            imports.push(format!("import {{ assertExactlyOne }} from \"{}\";", support));
        }
        let nested: BTreeSet<&str> = all_fields(members)
            .filter(|f| cx.schema.needs_validation(&f.ty))
            .filter_map(|f| f.ty.named())
            .filter(|name| Some(*name) != own)
            .collect();
        for name in nested {
            imports.push(format!(
                "import {{ {} }} from \"{}{}.js\";",
                check_function(cx, name),
                prefix,
                cx.type_module(name)
            ));
        }
        imports
    }

    fn returns(&self, cx: &EmitContext, op: &ResolvedOperation) -> Result<String, GenError> {
        match &op.returns {
            Some(ty) => self.type_ref(cx, ty, Scope::Root),
            None => Ok("void".to_string()),
        }
    }

    /// `export function check<Name>(value)` for types that carry groups.
    fn write_check_function(
        &self,
        cx: &EmitContext,
        w: &mut CodeWriter,
        ty: &ResolvedType,
        body: impl FnOnce(&mut CodeWriter),
    ) -> Result<(), GenError> {
        let name = cx.type_name(&ty.name);
        w.lines(cx.comment(&[
            format!("Throws a `TypeError` when `value` breaks an exclusivity group of `{}`.", name),
            String::new(),
            format!("@param {{{}}} value", name),
        ]));
        w.block::<GenError>(format!("export function {}(value) {{", check_function(cx, &ty.name)), "}", |w| {
            body(w);
            Ok(())
        })?;
        Ok(())
    }
}

fn field_description(doc: &[String], deprecated: bool) -> Vec<String> {
    let mut lines: Vec<String> = doc
        .iter()
        .map(|line| if line.is_empty() { String::new() } else { format!("  {}", line) })
        .collect();
    if deprecated {
        lines.push("  Deprecated.".to_string());
    }
    lines
}

fn write_nested_check(cx: &EmitContext, w: &mut CodeWriter, expr: &str, ty: &TypeRef, depth: usize) {
    if !cx.schema.needs_validation(ty) {
        return;
    }
    match ty {
        TypeRef::Named { name, .. } => {
            w.line(format!("if ({} != null) {{", expr));
            w.indent();
            w.line(format!("{}({});", check_function(cx, name), expr));
            w.dedent();
            w.line("}");
        }
        TypeRef::Array(item) => {
            let var = format!("item{}", depth);
            w.line(format!("for (const {} of {} ?? []) {{", var, expr));
            w.indent();
            write_nested_check(cx, w, &var, item, depth + 1);
            w.dedent();
            w.line("}");
        }
        TypeRef::Primitive(_) | TypeRef::Unknown => {}
    }
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

impl TargetBackend for JavaScriptBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn type_ref(&self, cx: &EmitContext, ty: &TypeRef, scope: Scope) -> Result<String, GenError> {
        Ok(match ty {
            TypeRef::Primitive(p) => primitive(*p).to_string(),
            TypeRef::Named { name, .. } => {
                let module = match scope {
                    Scope::Root  => format!("./{}/{}.js", TYPES_DIR, cx.type_module(name)),
                    Scope::Types => format!("./{}.js", cx.type_module(name)),
                };
                format!("import({}).{}", quote(&module), cx.type_name(name))
            }
            TypeRef::Array(item) => format!("{}[]", self.type_ref(cx, item, scope)?),
            TypeRef::Unknown => "*".to_string(),
        })
    }

    fn render_alias(&self, cx: &EmitContext, ty: &ResolvedType, target: &TypeRef) -> Result<String, GenError> {
        let name = cx.type_name(&ty.name);
        let mut w = CodeWriter::new(cx.descriptor.indent);
        if ty.has_exclusive {
            if let Some(dep) = target.named() {
                w.line(format!(
                    "import {{ {} }} from \"./{}.js\";",
                    check_function(cx, dep),
                    cx.type_module(dep)
                ));
                w.blank();
            }
        }
        let typedef = format!("@typedef {{{}}} {}", self.type_ref(cx, target, Scope::Types)?, name);
        w.lines(cx.doc_comment(&ty.doc, ty.deprecated, &[typedef]));
        w.blank();
        if ty.has_exclusive {
            self.write_check_function(cx, &mut w, ty, |w| write_nested_check(cx, w, "value", target, 0))?;
        } else {
            w.line("export {};");
        }
        Ok(w.finish())
    }

    fn render_enum(&self, cx: &EmitContext, ty: &ResolvedType, variants: &[EnumVariant]) -> Result<String, GenError> {
        let name = cx.type_name(&ty.name);
        let mut w = CodeWriter::new(cx.descriptor.indent);
        w.lines(cx.doc_comment(&ty.doc, ty.deprecated, &[]));
        w.block::<GenError>(format!("export const {} = Object.freeze({{", name), "});", |w| {
            for variant in variants {
                w.lines(cx.doc_comment(&variant.doc, variant.deprecated, &[]));
                w.line(format!("{}: {},", variant.name, quote(variant.literal())));
            }
            Ok(())
        })?;
        w.blank();
        w.line(format!("/** @typedef {{(typeof {})[keyof typeof {}]}} {} */", name, name, name));
        Ok(w.finish())
    }

    fn render_struct(&self, cx: &EmitContext, ty: &ResolvedType, members: &[Member]) -> Result<String, GenError> {
        let name = cx.type_name(&ty.name);
        let mut w = CodeWriter::new(cx.descriptor.indent);
        if ty.has_exclusive {
            w.lines(self.check_imports(cx, members, Scope::Types, Some(&ty.name)));
            w.blank();
        }

        let mut text = ty.doc.lines();
        if ty.deprecated {
            if !text.is_empty() {
                text.push(String::new());
            }
            text.push("@deprecated".to_string());
        }
        if !text.is_empty() {
            text.push(String::new());
        }
        text.extend(self.typedef_text(cx, &name, members, Scope::Types)?);
        w.lines(cx.comment(&text));
        w.blank();

        if ty.has_exclusive {
            self.write_check_function(cx, &mut w, ty, |w| {
                self.write_checks(cx, w, "value", &name, members)
            })?;
        } else {
            w.line("export {};");
        }
        Ok(w.finish())
    }

    fn render_error(&self, cx: &EmitContext, ty: &ResolvedType, members: &[Member]) -> Result<String, GenError> {
        let name = cx.type_name(&ty.name);
        let data = format!("{}Data", name);
        let marker = super::typescript::ERROR_MARKER;

        let mut w = CodeWriter::new(cx.descriptor.indent);
        if ty.has_exclusive {
            w.lines(self.check_imports(cx, members, Scope::Types, Some(&ty.name)));
            w.blank();
        }
        w.lines(cx.comment(&self.typedef_text(cx, &data, members, Scope::Types)?));
        w.blank();
        w.lines(cx.doc_comment(&ty.doc, ty.deprecated, &[]));
        w.block::<GenError>(format!("export class {} extends Error {{", name), "}", |w| {
            w.lines(cx.comment(&[
                format!("@param {{{}}} data", data),
                "@param {string} [message]".to_string(),
            ]));
            w.block::<GenError>("constructor(data, message) {", "}", |w| {
                w.line(format!("super(message ?? {});", quote(&ty.name)));
                if ty.has_exclusive {
                    w.line(format!("{}(data);", check_function(cx, &ty.name)));
                }
                w.line(format!("this.{} = {};", marker, quote(&ty.name)));
                w.line(format!("this.name = {};", quote(&name)));
                w.line("this.data = data;");
                Ok(())
            })?;
            Ok(())
        })?;
        w.blank();
        w.lines(cx.comment(&[
            "@param {unknown} error".to_string(),
            format!("@returns {{error is {}}}", name),
        ]));
        w.block::<GenError>(format!("export function is{}(error) {{", name), "}", |w| {
            w.line(format!(
                "return error != null && typeof error === \"object\" && error.{} === {};",
                marker,
                quote(&ty.name)
            ));
            Ok(())
        })?;

        if ty.has_exclusive {
            w.blank();
            self.write_check_function(cx, &mut w, ty, |w| {
                self.write_checks(cx, w, "value", &name, members)
            })?;
        }
        Ok(w.finish())
    }

    fn render_operation(&self, cx: &EmitContext, op: &ResolvedOperation) -> Result<String, GenError> {
        let request = cx.request_type_name(op);
        let function = cx.function_name(&op.name);
        let validates = has_exclusive(&op.input)
            || all_fields(&op.input).any(|f| cx.schema.needs_validation(&f.ty));

        let mut w = CodeWriter::new(cx.descriptor.indent);
        w.line("import { loadScript } from \"./loader.js\";");
        w.lines(self.check_imports(cx, &op.input, Scope::Root, None));
        w.blank();

        w.lines(cx.comment(&self.typedef_text(cx, &request, &op.input, Scope::Root)?));
        w.blank();

        let mut tags = vec![if op.input.is_empty() {
            format!("@param {{{}}} [request]", request)
        } else {
            format!("@param {{{}}} request", request)
        }];
        tags.push(format!("@returns {{Promise<{}>}}", self.returns(cx, op)?));
        for error in &op.throws {
            let error_ref = TypeRef::Named {
                name: error.clone(),
                kind: crate::resolver::NamedKind::Error,
            };
            tags.push(format!("@throws {{{}}}", self.type_ref(cx, &error_ref, Scope::Root)?));
        }
        w.lines(cx.doc_comment(&op.doc, op.deprecated, &tags));

        let params = if op.input.is_empty() { "request = {}" } else { "request" };
        w.block::<GenError>(format!("export function {}({}) {{", function, params), "}", |w| {
            if validates {
                w.line("return new Promise((resolve) => {");
                w.indent();
                self.write_checks(cx, w, "request", &op.name, &op.input);
                w.line("resolve(loadScript());");
                w.dedent();
                w.line(format!("}}).then((sdk) => sdk.{}(request));", op.name));
            } else {
                w.line(format!("return loadScript().then((sdk) => sdk.{}(request));", op.name));
            }
            Ok(())
        })?;
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
        let functions: Vec<String> = cx.schema.operations.iter().map(|op| cx.function_name(&op.name)).collect();

        let mut w = CodeWriter::new(cx.descriptor.indent);
        for (op, function) in cx.schema.operations.iter().zip(&functions) {
            w.line(format!("import {{ {} }} from \"./{}.js\";", function, cx.operation_module(&op.name)));
        }
        w.blank();
        w.block::<GenError>(format!("const {} = {{", global), "};", |w| {
            for function in &functions {
                w.line(format!("{},", function));
            }
            Ok(())
        })?;
        w.blank();
        w.line("export { setScriptUrl as __INTERNAL__setScriptUrl, ShimAcquisitionError } from \"./loader.js\";");
        if !functions.is_empty() {
            w.line(format!("export {{ {} }};", functions.join(", ")));
        }
        w.line(format!("export * from \"./{}/index.js\";", TYPES_DIR));
        w.blank();
        w.line(format!("export default {};", global));
        Ok(w.finish())
    }

    fn render_shim(&self, cx: &EmitContext) -> Result<String, GenError> {
        let mut typedef = vec![format!("@typedef {{object}} {}", cx.runtime.global_name)];
        for op in &cx.schema.operations {
            typedef.push(format!(
                "@property {{(request: import(\"./{}.js\").{}) => Promise<{}>}} {}",
                cx.operation_module(&op.name),
                cx.request_type_name(op),
                self.returns(cx, op)?,
                op.name
            ));
        }
        let typedef = cx.comment(&typedef).join("\n");

        let failure_note = if cx.runtime.retry_after_failure {
            "after a failed load the next caller starts a new attempt."
        } else {
            "a failed load is cached and returned to every later caller."
        };
        let script_url = script_url_expression(cx.runtime);
        let retry = cx.runtime.retry_after_failure.to_string();

        Ok(fill_template(
            LOADER_TEMPLATE,
            &[
                ("TYPEDEFS", typedef.as_str()),
                ("GLOBAL_NAME", cx.runtime.global_name.as_str()),
                ("SCRIPT_URL", script_url.as_str()),
                ("RETRY_AFTER_FAILURE", retry.as_str()),
                ("FAILURE_NOTE", failure_note),
            ],
        ))
    }

    fn render_support(&self, cx: &EmitContext) -> Result<Vec<(String, String)>, GenError> {
        let uses_groups = cx.schema.types.iter().any(|t| has_exclusive(t.members()))
            || cx.schema.operations.iter().any(|op| has_exclusive(&op.input));
        if uses_groups {
            Ok(vec![(EXCLUSIVE_MODULE_NAME.to_string(), EXCLUSIVE_MODULE.to_string())])
        } else {
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compile_schema, config::RuntimeOptions, emit::emit};

    fn render(text: &str, runtime: &RuntimeOptions) -> Vec<(String, String)> {
        let schema = compile_schema(text).expect("compile failed");
        emit(&JavaScriptBackend::new(), &schema, runtime)
            .expect("emit failed")
            .into_iter()
            .map(|u| (u.path, u.contents))
            .collect()
    }

    fn unit<'a>(units: &'a [(String, String)], path: &str) -> &'a str {
        units
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, c)| c.as_str())
            .unwrap_or_else(|| panic!("missing unit {}", path))
    }

    const VERIFY: &str = r#"
        type ChannelKey = string;
        operation verify {
          /// ### 상점 ID
          string storeId;
          oneof channel { ChannelKey channelKey; object pgProvider; }
          string id;
        }
    "#;

    #[test]
    fn test_operation_runtime_check() {
        let units = render(VERIFY, &RuntimeOptions::default());
        let expected = r#"// This file is generated by sdkgen. Do not edit.

import { loadScript } from "./loader.js";
import { assertExactlyOne } from "./exclusive.js";

/**
 * @typedef {object} VerifyRequest
 * @property {string} storeId
 *   ### 상점 ID
 * @property {import("./parameters/ChannelKey.js").ChannelKey} [channelKey] EXCLUSIVE(channel): exactly one of channelKey, pgProvider must be provided
 * @property {Record<string, unknown>} [pgProvider] EXCLUSIVE(channel): exactly one of channelKey, pgProvider must be provided
 * @property {string} id
 */

/**
 * @param {VerifyRequest} request
 * @returns {Promise<void>}
 */
export function verify(request) {
  return new Promise((resolve) => {
    // EXCLUSIVE(channel): exactly one of channelKey, pgProvider must be provided
    assertExactlyOne(request, "verify", "channel", ["channelKey", "pgProvider"]);
    resolve(loadScript());
  }).then((sdk) => sdk.verify(request));
}
"#;
        assert_eq!(unit(&units, "verify.js"), expected);
        assert!(unit(&units, "exclusive.js").contains("export function assertExactlyOne(value, context, group, keys) {"));
    }

    #[test]
    fn test_nested_struct_validation() {
        let units = render(
            r#"
            struct Contact { oneof via { string email; string phone; } }
            struct Customer { string name; Contact[]? contacts; }
            operation pay { Customer customer; }
            "#,
            &RuntimeOptions::default(),
        );

        let contact = unit(&units, "parameters/Contact.js");
        assert!(contact.contains("import { assertExactlyOne } from \"../exclusive.js\";"));
        assert!(contact.contains("export function checkContact(value) {\n  // EXCLUSIVE(via): exactly one of email, phone must be provided\n  assertExactlyOne(value, \"Contact\", \"via\", [\"email\", \"phone\"]);\n}"));

        let customer = unit(&units, "parameters/Customer.js");
        assert!(customer.contains("import { checkContact } from \"./Contact.js\";"));
        assert!(customer.contains("for (const item0 of value.contacts ?? []) {\n    if (item0 != null) {\n      checkContact(item0);\n    }\n  }"));

        let pay = unit(&units, "pay.js");
        assert!(pay.contains("import { checkCustomer } from \"./parameters/Customer.js\";"));
        assert!(!pay.contains("assertExactlyOne"));
        assert!(pay.contains("if (request.customer != null) {\n      checkCustomer(request.customer);\n    }"));
    }

    #[test]
    fn test_plain_types_have_no_checks() {
        let units = render(
            "enum Currency { KRW; } struct Amount { Currency currency; } operation ping {}",
            &RuntimeOptions::default(),
        );
        assert!(unit(&units, "parameters/Amount.js").ends_with("export {};\n"));
        assert!(unit(&units, "parameters/Currency.js").contains("export const Currency = Object.freeze({\n  KRW: \"KRW\",\n});"));
        assert!(unit(&units, "ping.js").contains("export function ping(request = {}) {\n  return loadScript().then((sdk) => sdk.ping(request));\n}"));
        assert!(units.iter().all(|(p, _)| p != "exclusive.js"));
    }

    #[test]
    fn test_loader_follows_runtime_options() {
        let runtime = RuntimeOptions {
            global_name:         "Acme".into(),
            script_url:          "https://cdn.example.com/sdk.js".into(),
            script_url_env:      Some("ACME_SDK_URL".into()),
            retry_after_failure: true,
        };
        let units = render("operation ping {}", &runtime);
        let loader = unit(&units, "loader.js");
        assert!(loader.contains(" * @typedef {object} Acme\n * @property {(request: import(\"./ping.js\").PingRequest) => Promise<void>} ping\n"));
        assert!(loader.contains("let scriptUrl = process.env.ACME_SDK_URL ?? \"https://cdn.example.com/sdk.js\";"));
        assert!(loader.contains("const retryAfterFailure = true;"));
        assert!(loader.contains("window.Acme"));
        assert!(!loader.contains("{{"));

        let index = unit(&units, "index.js");
        assert!(index.contains("const Acme = {\n  ping,\n};"));
        assert!(index.contains("export { ping };"));
    }
}
