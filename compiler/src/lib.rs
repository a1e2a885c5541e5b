//! sdkgen-compiler
//!
//! This crate implements:
//!  1) A tokenizer + parser for `.sdk` schema files, and a JSON loader,
//!  2) A schema verifier (duplicate names, unresolved references, malformed groups, etc.),
//!  3) The type resolver (canonical references, exclusivity constraints, cycle detection),
//!  4) The emission engine driving one [`TargetBackend`] per output language,
//!  5) The backend registry with the `typescript`, `javascript` and `dart` targets,
//!  6) Error types (`GenError`) and generator configuration.
//!
//! ```
//! use sdkgen_compiler::{compile_schema, generate, BackendRegistry, RuntimeOptions};
//!
//! let schema = compile_schema("operation ping {}").unwrap();
//! let units = generate(&schema, &BackendRegistry::with_builtin(), "typescript", &RuntimeOptions::default()).unwrap();
//! assert!(units.iter().any(|u| u.path == "ping.ts"));
//! ```

pub mod error;
pub mod utils;
pub mod tokenizer;
pub mod parser;
pub mod verifier;
pub mod resolver;
pub mod emit;
pub mod backend;
pub mod registry;
pub mod config;
pub mod compiler;

pub use backend::{BackendDescriptor, TargetBackend};
pub use compiler::{
    compile_schema, generate, generate_all, load_schema, parse_schema_json, parse_schema_text, resolve,
    BackendOutput,
};
pub use config::{GeneratorConfig, RuntimeOptions};
pub use emit::{write_units, OutputUnit, UnitKind};
pub use error::GenError;
pub use registry::BackendRegistry;
pub use resolver::ResolvedSchema;
