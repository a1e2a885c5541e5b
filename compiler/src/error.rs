use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}, column {column}: {msg}")]
    ParseError {
        msg:    String,
        line:   usize,
        column: usize,
    },

    /// Malformed or incomplete schema. Fatal for the whole run.
    #[error("Schema error{}: {msg}", location(.line, .column))]
    SchemaError {
        msg:    String,
        line:   usize,
        column: usize,
    },

    /// A named type references itself transitively.
    #[error("Cyclic type reference: {}", .cycle.join(" -> "))]
    CyclicReferenceError { cycle: Vec<String> },

    /// The selected backend has no rendering rule for a construct used by the
    /// schema. Fatal for that backend only.
    #[error("Backend \"{backend}\" cannot render {construct} in {context}")]
    UnsupportedConstructError {
        backend:   String,
        construct: String,
        context:   String,
    },

    /// Casing mapped two declarations onto one output file. Fatal for that
    /// backend only.
    #[error("Backend \"{backend}\" would write \"{path}\" twice; rename one of the colliding declarations")]
    OutputCollision {
        backend: String,
        path:    String,
    },

    #[error("Unknown target backend \"{0}\"")]
    UnknownBackend(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl GenError {
    pub fn schema(msg: impl Into<String>, line: usize, column: usize) -> GenError {
        GenError::SchemaError { msg: msg.into(), line, column }
    }

    pub fn unsupported(backend: &str, construct: &str, context: impl Into<String>) -> GenError {
        GenError::UnsupportedConstructError {
            backend:   backend.to_string(),
            construct: construct.to_string(),
            context:   context.into(),
        }
    }
}

fn location(line: &usize, column: &usize) -> String {
    if *line == 0 {
        String::new()
    } else {
        format!(" at line {}, column {}", line, column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_location_is_optional() {
        let located = GenError::schema("Operation \"verify\" is defined twice", 4, 1);
        assert_eq!(
            located.to_string(),
            "Schema error at line 4, column 1: Operation \"verify\" is defined twice"
        );

        let unlocated = GenError::schema("Unsupported schema version 2", 0, 0);
        assert_eq!(unlocated.to_string(), "Schema error: Unsupported schema version 2");
    }

    #[test]
    fn collision_names_backend_and_path() {
        let err = GenError::OutputCollision { backend: "typescript".into(), path: "parameters/Foo.ts".into() };
        assert_eq!(
            err.to_string(),
            "Backend \"typescript\" would write \"parameters/Foo.ts\" twice; rename one of the colliding declarations"
        );
    }

    #[test]
    fn cycle_is_printed_as_path() {
        let err = GenError::CyclicReferenceError { cycle: vec!["X".into(), "Y".into(), "X".into()] };
        assert_eq!(err.to_string(), "Cyclic type reference: X -> Y -> X");
    }
}
