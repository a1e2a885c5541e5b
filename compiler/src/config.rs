use std::{fs, path::{Path, PathBuf}};

use sdkgen_schema::is_identifier;
use serde::{Deserialize, Serialize};

use crate::{error::GenError, utils::quote};

pub const DEFAULT_GLOBAL_NAME: &str = "PortOne";
pub const DEFAULT_SCRIPT_URL: &str = "https://cdn.portone.io/v2/browser-sdk.js";
pub const DEFAULT_TARGET: &str = "typescript";

/// Generator settings, usually read from a JSON file passed with `--config`.
///
/// ```json
/// {
///   "targets": ["typescript", "javascript"],
///   "outDir": "generated",
///   "runtime": { "globalName": "PortOne", "scriptUrlEnv": "JS_SDK_URL" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GeneratorConfig {
    #[serde(default = "default_targets")]
    pub targets: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<PathBuf>,
    #[serde(default)]
    pub runtime: RuntimeOptions,
}

/// Values substituted into the emitted runtime shim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RuntimeOptions {
    /// Global object the external script defines, e.g. `window.PortOne`.
    #[serde(default = "default_global_name")]
    pub global_name:         String,
    #[serde(default = "default_script_url")]
    pub script_url:          String,
    /// Build-time environment variable that overrides `script_url`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_url_env:      Option<String>,
    /// Whether a caller after a failed load starts a new attempt instead of
    /// receiving the cached failure.
    #[serde(default)]
    pub retry_after_failure: bool,
}

fn default_targets() -> Vec<String> {
    vec![DEFAULT_TARGET.to_string()]
}

fn default_global_name() -> String {
    DEFAULT_GLOBAL_NAME.to_string()
}

fn default_script_url() -> String {
    DEFAULT_SCRIPT_URL.to_string()
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        RuntimeOptions {
            global_name:         default_global_name(),
            script_url:          default_script_url(),
            script_url_env:      None,
            retry_after_failure: false,
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            targets: default_targets(),
            out_dir: None,
            runtime: RuntimeOptions::default(),
        }
    }
}

impl GeneratorConfig {
    pub fn from_file(path: &Path) -> Result<Self, GenError> {
        let text = fs::read_to_string(path)?;
        let config: GeneratorConfig = serde_json::from_str(&text)
            .map_err(|e| GenError::ConfigError(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GenError> {
        if self.targets.is_empty() {
            return Err(GenError::ConfigError("at least one target is required".into()));
        }
        self.runtime.validate()
    }
}

impl RuntimeOptions {
    pub fn validate(&self) -> Result<(), GenError> {
        if !is_identifier(&self.global_name) {
            return Err(GenError::ConfigError(format!(
                "globalName {} is not a valid identifier",
                quote(&self.global_name)
            )));
        }
        if self.script_url.trim().is_empty() {
            return Err(GenError::ConfigError("scriptUrl must not be empty".into()));
        }
        if let Some(env) = &self.script_url_env {
            if !is_identifier(env) {
                return Err(GenError::ConfigError(format!(
                    "scriptUrlEnv {} is not a valid environment variable name",
                    quote(env)
                )));
            }
        }
        Ok(())
    }
}
