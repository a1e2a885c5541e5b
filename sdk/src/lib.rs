//! sdkgen
//!
//! This crate bundles the generator with the runtime contract its output
//! follows.
//!
//! - `ScriptLoader`: the single-flight SDK loader every emitted `loader`
//!   module implements, as an executable state machine
//! - Re-exports of the compiler entry points and the schema model
//! - `schema_to_json` for dumping a loaded schema and `input_json_schema`
//!   for the JSON Schema of that format

pub mod error;
pub mod loader;

pub use error::{LocationLocked, ShimAcquisitionError};
pub use loader::{Acquire, AcquireFn, LoaderState, LoaderStatus, RetryPolicy, ScriptLoader};
pub use sdkgen_compiler::{
    compile_schema, generate, generate_all, load_schema, resolve, BackendOutput, BackendRegistry, GenError,
    GeneratorConfig, OutputUnit, ResolvedSchema, RuntimeOptions,
};
pub use sdkgen_schema::{input_json_schema, Definition, DocBlock, Operation, Parameter, Schema, TypeExpr};

/// Serialize a schema into pretty-printed JSON (the `.json` input format).
pub fn schema_to_json(schema: &Schema) -> Result<String, GenError> {
    Ok(serde_json::to_string_pretty(schema)?)
}

/// Pretty-printed JSON Schema of the `.json` input format.
pub fn json_schema_text() -> Result<String, GenError> {
    Ok(serde_json::to_string_pretty(&input_json_schema())?)
}

pub mod compiler {
    pub use sdkgen_compiler::*;
}

pub mod schema {
    pub use sdkgen_schema::*;
}
