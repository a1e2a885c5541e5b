//! Per-target rendering rules.
//!
//! A backend is a [`BackendDescriptor`] (casing, comment syntax, union
//! strategy) plus one rendering method per IR node kind. Rules a backend
//! does not provide fall through to the default methods, which fail with
//! [`GenError::UnsupportedConstructError`] instead of emitting wrong code.

use std::collections::BTreeSet;

use sdkgen_schema::EnumVariant;

use crate::{
    config::RuntimeOptions,
    emit::EmitContext,
    error::GenError,
    resolver::{all_fields, Member, ResolvedOperation, ResolvedType, TypeBody, TypeRef},
    utils::{quote, Case},
};

pub mod dart;
pub mod javascript;
pub mod typescript;

pub use dart::DartBackend;
pub use javascript::JavaScriptBackend;
pub use typescript::TypeScriptBackend;

/// How documentation comments are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentStyle {
    /// `/**`, ` * line`, ` */`
    Block {
        open:   &'static str,
        prefix: &'static str,
        close:  &'static str,
    },
    /// Every line carries the prefix, e.g. `///` or `##`.
    Line { prefix: &'static str },
}

impl CommentStyle {
    pub const JSDOC: CommentStyle = CommentStyle::Block { open: "/**", prefix: " * ", close: " */" };
}

/// How a backend makes "exactly one of these members" hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnionStrategy {
    /// The emitted type itself rejects none-or-several (tagged/sum types).
    TaggedUnion,
    /// An explicit runtime assertion plus a flagged comment.
    RuntimeCheck,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
    pub name:           &'static str,
    /// Extension of every emitted module, without the dot.
    pub extension:      &'static str,
    pub type_case:      Case,
    pub member_case:    Case,
    pub function_case:  Case,
    /// Casing of module file stems; `None` keeps the binding's casing.
    pub module_case:    Option<Case>,
    /// Prefix of a plain line comment (used for headers and flags).
    pub line_comment:   &'static str,
    pub doc_comment:    CommentStyle,
    pub indent:         &'static str,
    /// `None` means the backend cannot express exclusivity groups at all.
    pub union_strategy: Option<UnionStrategy>,
    /// Word lists an emitted type or function binding must stay out of.
    pub reserved_words: &'static [&'static [&'static str]],
}

impl BackendDescriptor {
    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved_words.iter().any(|words| words.contains(&name))
    }
}

/// ECMAScript reserved words, strict-mode restrictions and the global
/// names emitted JS/TS modules refer to.
pub const JS_RESERVED_WORDS: &[&str] = &[
    "arguments", "await", "break", "case", "catch", "class", "const", "continue",
    "debugger", "default", "delete", "do", "else", "enum", "eval", "export",
    "extends", "false", "finally", "for", "function", "if", "implements", "import",
    "in", "instanceof", "interface", "let", "new", "null", "package", "private",
    "protected", "public", "return", "static", "super", "switch", "this", "throw",
    "true", "try", "typeof", "undefined", "var", "void", "while", "with", "yield",
    "Array", "Object", "Record", "String", "Number", "Boolean", "Symbol", "Map",
    "Set", "Date", "JSON", "Promise", "Error", "window", "document",
];

/// Names every emitted runtime shim exports into operation modules.
pub const SHIM_BINDINGS: &[&str] = &["loadScript", "setScriptUrl", "ShimAcquisitionError"];

/// TypeScript contextual type keywords and the utility types emitted
/// modules use.
pub const TS_TYPE_KEYWORDS: &[&str] = &[
    "any", "unknown", "never", "type", "keyof", "infer", "Partial", "Readonly",
    "Omit", "Pick", "Exclude",
];

/// Where a type reference is written from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Operation modules, the index and the shim.
    Root,
    /// Modules inside the named-type directory.
    Types,
}

/// Rendering rules for one output language.
///
/// Implementations return module bodies; the engine adds headers, lays out
/// paths and drives emission in parallel, so a backend must not keep any
/// mutable state between calls.
pub trait TargetBackend: Send + Sync {
    fn descriptor(&self) -> &BackendDescriptor;

    fn type_ref(&self, cx: &EmitContext, ty: &TypeRef, _scope: Scope) -> Result<String, GenError> {
        Err(cx.unsupported(type_ref_label(ty), "a type reference"))
    }

    fn render_alias(&self, cx: &EmitContext, ty: &ResolvedType, _target: &TypeRef) -> Result<String, GenError> {
        Err(cx.unsupported("alias types", &cx.describe_type(ty)))
    }

    fn render_enum(&self, cx: &EmitContext, ty: &ResolvedType, _variants: &[EnumVariant]) -> Result<String, GenError> {
        Err(cx.unsupported("enum types", &cx.describe_type(ty)))
    }

    fn render_struct(&self, cx: &EmitContext, ty: &ResolvedType, _members: &[Member]) -> Result<String, GenError> {
        Err(cx.unsupported("struct types", &cx.describe_type(ty)))
    }

    fn render_error(&self, cx: &EmitContext, ty: &ResolvedType, _members: &[Member]) -> Result<String, GenError> {
        Err(cx.unsupported("error types", &cx.describe_type(ty)))
    }

    fn render_operation(&self, cx: &EmitContext, op: &ResolvedOperation) -> Result<String, GenError> {
        Err(cx.unsupported("operations", &format!("operation \"{}\"", op.name)))
    }

    /// Module re-exporting every named type.
    fn render_types_index(&self, cx: &EmitContext) -> Result<String, GenError> {
        Err(cx.unsupported("the named-type index", "the package"))
    }

    /// Aggregation module re-exporting every operation.
    fn render_index(&self, cx: &EmitContext) -> Result<String, GenError> {
        Err(cx.unsupported("the package index", "the package"))
    }

    fn render_shim(&self, cx: &EmitContext) -> Result<String, GenError> {
        Err(cx.unsupported("the runtime shim", "the package"))
    }

    /// Extra fixed modules as `(module name, body)` pairs.
    fn render_support(&self, _cx: &EmitContext) -> Result<Vec<(String, String)>, GenError> {
        Ok(Vec::new())
    }
}

fn type_ref_label(ty: &TypeRef) -> &'static str {
    match ty {
        TypeRef::Primitive(_)  => "primitive types",
        TypeRef::Named { .. }  => "named type references",
        TypeRef::Array(_)      => "array types",
        TypeRef::Unknown       => "untyped parameters",
    }
}

/// Replaces every `{{KEY}}` placeholder of a fixed template.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |text, (key, value)| {
        text.replace(&format!("{{{{{}}}}}", key), value)
    })
}

/// Script location expression for JS-family shims, honouring the optional
/// build-time override variable.
pub fn script_url_expression(runtime: &RuntimeOptions) -> String {
    match &runtime.script_url_env {
        Some(env) => format!("process.env.{} ?? {}", env, quote(&runtime.script_url)),
        None => quote(&runtime.script_url),
    }
}

/// Named types referenced from a type, in name order.
pub fn collect_refs(ty: &TypeRef, out: &mut BTreeSet<String>) {
    match ty {
        TypeRef::Named { name, .. } => {
            out.insert(name.clone());
        }
        TypeRef::Array(item) => collect_refs(item, out),
        TypeRef::Primitive(_) | TypeRef::Unknown => {}
    }
}

/// Named types a named type's module depends on, itself excluded.
pub fn type_dependencies(ty: &ResolvedType) -> BTreeSet<String> {
    let mut refs = BTreeSet::new();
    match &ty.body {
        TypeBody::Alias(target) => collect_refs(target, &mut refs),
        TypeBody::Enum(_) => {}
        TypeBody::Struct(members) | TypeBody::Error(members) => {
            for field in all_fields(members) {
                collect_refs(&field.ty, &mut refs);
            }
        }
    }
    refs.remove(&ty.name);
    refs
}

/// Named types an operation module refers to (input, result and errors).
pub fn operation_dependencies(op: &ResolvedOperation) -> BTreeSet<String> {
    let mut refs = BTreeSet::new();
    for field in all_fields(&op.input) {
        collect_refs(&field.ty, &mut refs);
    }
    if let Some(returns) = &op.returns {
        collect_refs(returns, &mut refs);
    }
    refs.extend(op.throws.iter().cloned());
    refs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_words_span_every_list() {
        let descriptor = TypeScriptBackend::new().descriptor().clone();
        assert!(descriptor.is_reserved("delete"));
        assert!(descriptor.is_reserved("Record"));
        assert!(descriptor.is_reserved("Partial"));
        assert!(descriptor.is_reserved("loadScript"));
        assert!(!descriptor.is_reserved("requestPayment"));

        let descriptor = JavaScriptBackend::new().descriptor().clone();
        assert!(descriptor.is_reserved("default"));
        assert!(descriptor.is_reserved("assertExactlyOne"));
        assert!(!descriptor.is_reserved("Partial"));

        let descriptor = DartBackend::new().descriptor().clone();
        assert!(descriptor.is_reserved("required"));
        assert!(descriptor.is_reserved("List"));
        assert!(descriptor.is_reserved("jsonObject"));
        assert!(!descriptor.is_reserved("verify"));
    }

    #[test]
    fn templates_and_url_expression() {
        assert_eq!(
            fill_template("window.{{GLOBAL_NAME}} ?? {{GLOBAL_NAME}}Fallback", &[("GLOBAL_NAME", "PortOne")]),
            "window.PortOne ?? PortOneFallback"
        );

        let mut runtime = RuntimeOptions::default();
        assert_eq!(script_url_expression(&runtime), "\"https://cdn.portone.io/v2/browser-sdk.js\"");
        runtime.script_url_env = Some("JS_SDK_URL".into());
        assert_eq!(
            script_url_expression(&runtime),
            "process.env.JS_SDK_URL ?? \"https://cdn.portone.io/v2/browser-sdk.js\""
        );
    }
}
