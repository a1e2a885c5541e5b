use std::{fs, path::Path};

use sdkgen_schema::Schema;
use tracing::{debug, info_span, warn};

use crate::{
    config::RuntimeOptions,
    emit::{emit, OutputUnit},
    error::GenError,
    parser::parse_schema,
    registry::BackendRegistry,
    resolver::{resolve_schema, ResolvedSchema},
    tokenizer::tokenize_schema,
    verifier::verify_schema,
};

/// Parses the textual `.sdk` format into an unverified `Schema`.
pub fn parse_schema_text(text: &str) -> Result<Schema, GenError> {
    let tokens = tokenize_schema(text)?;
    debug!(tokens = tokens.len(), "tokenized schema");
    parse_schema(&tokens)
}

/// Parses the JSON encoding of a `Schema`.
pub fn parse_schema_json(text: &str) -> Result<Schema, GenError> {
    Ok(serde_json::from_str(text)?)
}

/// Reads a schema file; `.json` files use the JSON encoding, anything else
/// the textual format.
pub fn load_schema(path: &Path) -> Result<Schema, GenError> {
    let _span = info_span!("load", path = %path.display()).entered();
    let text = fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => parse_schema_json(&text),
        _ => parse_schema_text(&text),
    }
}

/// Verifies a schema and resolves it into the immutable IR.
pub fn resolve(schema: &Schema) -> Result<ResolvedSchema, GenError> {
    verify_schema(schema)?;
    resolve_schema(schema)
}

/// Compile a textual schema into its resolved IR.
/// Returns `Err(GenError)` if tokenization/parsing/verification/resolution fails.
pub fn compile_schema(text: &str) -> Result<ResolvedSchema, GenError> {
    let schema = parse_schema_text(text)?;
    resolve(&schema)
}

/// Renders the resolved schema with one registered backend.
pub fn generate(
    schema: &ResolvedSchema,
    registry: &BackendRegistry,
    backend: &str,
    runtime: &RuntimeOptions,
) -> Result<Vec<OutputUnit>, GenError> {
    let _span = info_span!("generate", backend).entered();
    let backend = registry.get(backend)?;
    emit(backend, schema, runtime)
}

/// Outcome of one backend in a multi-target run.
#[derive(Debug)]
pub struct BackendOutput {
    pub backend: String,
    pub result:  Result<Vec<OutputUnit>, GenError>,
}

impl BackendOutput {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Renders the schema with every named backend. A failing backend only
/// fails its own entry; the others still produce their units.
pub fn generate_all<S: AsRef<str>>(
    schema: &ResolvedSchema,
    registry: &BackendRegistry,
    backends: &[S],
    runtime: &RuntimeOptions,
) -> Vec<BackendOutput> {
    backends
        .iter()
        .map(|name| {
            let name = name.as_ref();
            let result = generate(schema, registry, name, runtime);
            if let Err(e) = &result {
                warn!(backend = name, error = %e, "backend failed");
            }
            BackendOutput { backend: name.to_string(), result }
        })
        .collect()
}
