use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sdkgen::{json_schema_text, schema_to_json};
use sdkgen_compiler::backend::UnionStrategy;
use sdkgen_compiler::error::GenError;
use sdkgen_compiler::{generate_all, load_schema, resolve, write_units, BackendRegistry, GeneratorConfig};

#[derive(Parser)]
#[command(name = "sdkgen")]
#[command(about = "Generate typed browser SDK clients from an operation schema", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate client modules for every configured target
    Generate {
        /// Input `.sdk` or `.json` schema file
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory (one subdirectory per target when several are selected)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Target backend; repeat for several (defaults to the config file, then `typescript`)
        #[arg(short, long = "target")]
        targets: Vec<String>,

        /// JSON generator configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Global object the external script defines
        #[arg(long)]
        global_name: Option<String>,

        /// Default location of the external script
        #[arg(long)]
        script_url: Option<String>,

        /// Build-time environment variable overriding the script location
        #[arg(long)]
        script_url_env: Option<String>,

        /// Let a caller after a failed load start a new attempt
        #[arg(long)]
        retry_after_failure: bool,
    },

    /// Parse, verify and resolve a schema without writing anything
    Check {
        /// Input `.sdk` or `.json` schema file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Print a schema as JSON (the `.json` input format)
    Dump {
        /// Input `.sdk` or `.json` schema file
        #[arg(short, long)]
        input: PathBuf,

        /// Output `.json` file (if omitted, prints to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the JSON Schema of the `.json` input format
    JsonSchema {
        /// Output file (if omitted, prints to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the available target backends
    Targets,
}

fn main() -> Result<(), GenError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "sdkgen=info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let registry = BackendRegistry::with_builtin();

    match cli.command {
        Commands::Generate {
            input,
            out_dir,
            targets,
            config,
            global_name,
            script_url,
            script_url_env,
            retry_after_failure,
        } => {
            // Config file first, flags override it
            let mut config = match &config {
                Some(path) => GeneratorConfig::from_file(path)?,
                None => GeneratorConfig::default(),
            };
            if !targets.is_empty() {
                config.targets = targets;
            }
            if out_dir.is_some() {
                config.out_dir = out_dir;
            }
            if let Some(name) = global_name {
                config.runtime.global_name = name;
            }
            if let Some(url) = script_url {
                config.runtime.script_url = url;
            }
            if script_url_env.is_some() {
                config.runtime.script_url_env = script_url_env;
            }
            config.runtime.retry_after_failure |= retry_after_failure;
            config.validate()?;

            let out_dir = config
                .out_dir
                .clone()
                .ok_or_else(|| GenError::ConfigError("an output directory is required (--out-dir or outDir)".into()))?;

            let schema = resolve(&load_schema(&input)?)?;
            let outputs = generate_all(&schema, &registry, config.targets.as_slice(), &config.runtime);
            let per_target = outputs.len() > 1;

            let mut first_error = None;
            for output in outputs {
                match output.result {
                    Ok(units) => {
                        let dir = target_dir(&out_dir, &output.backend, per_target);
                        write_units(&dir, &units)?;
                        info!(backend = output.backend.as_str(), units = units.len(), dir = %dir.display(), "wrote");
                        println!("{}: {} files → {}", output.backend, units.len(), dir.display());
                    }
                    Err(e) => {
                        eprintln!("{}: {}", output.backend, e);
                        first_error.get_or_insert(e);
                    }
                }
            }
            match first_error {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        Commands::Check { input } => {
            let schema = resolve(&load_schema(&input)?)?;
            let groups = schema
                .operations
                .iter()
                .filter(|op| sdkgen_compiler::resolver::has_exclusive(&op.input))
                .count();
            println!(
                "{}: {} types, {} operations ({} with exclusivity groups)",
                input.display(),
                schema.types.len(),
                schema.operations.len(),
                groups
            );
            Ok(())
        }

        Commands::Dump { input, output } => {
            let schema = load_schema(&input)?;
            let json = schema_to_json(&schema)?;
            if let Some(out_path) = output {
                fs::write(&out_path, &json)?;
                println!("Schema JSON written to {}", out_path.display());
            } else {
                println!("{}", json);
            }
            Ok(())
        }

        Commands::JsonSchema { output } => {
            let json = json_schema_text()?;
            if let Some(out_path) = output {
                fs::write(&out_path, &json)?;
                println!("JSON Schema written to {}", out_path.display());
            } else {
                println!("{}", json);
            }
            Ok(())
        }

        Commands::Targets => {
            for d in registry.descriptors() {
                let unions = match d.union_strategy {
                    Some(UnionStrategy::TaggedUnion)  => "tagged unions",
                    Some(UnionStrategy::RuntimeCheck) => "runtime checks",
                    None                              => "unsupported",
                };
                println!("{:<12} .{:<4} exclusivity groups: {}", d.name, d.extension, unions);
            }
            Ok(())
        }
    }
}

fn target_dir(out_dir: &Path, backend: &str, per_target: bool) -> PathBuf {
    if per_target {
        out_dir.join(backend)
    } else {
        out_dir.to_path_buf()
    }
}
