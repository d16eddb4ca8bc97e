mod config;
mod logging;
mod replay;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tenure_core::{EntityType, Registry, RegistryError, DEFINITIONS_SCHEMA};

use config::CliConfig;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Lifecycle and audit governance engine.
#[derive(Parser)]
#[command(name = "tenure", version, about = "Lifecycle and audit governance engine")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Configuration file (default: ./tenure.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Lifecycle definitions to load instead of the built-in catalog
    #[arg(long, global = true)]
    definitions: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate lifecycle definitions against the schema and graph rules
    Validate,

    /// List entity types with their initial and terminal states
    Types,

    /// Show the states and guarded transitions of one entity type
    Graph {
        /// Entity type name, e.g. CostShareAgreement
        entity_type: String,
    },

    /// Run a JSON scenario of create/transition/edit steps in memory
    Replay {
        /// Path to the scenario JSON file
        scenario: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match CliConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(msg) => {
            report_error(&msg, cli.output, cli.quiet);
            process::exit(1);
        }
    };
    logging::init(config.log_filter.as_deref());

    let definitions = cli.definitions.or(config.definitions);

    match cli.command {
        Commands::Validate => cmd_validate(definitions.as_deref(), cli.output, cli.quiet),
        Commands::Types => {
            let registry = load_or_exit(definitions.as_deref(), cli.output, cli.quiet);
            cmd_types(&registry, cli.output, cli.quiet);
        }
        Commands::Graph { entity_type } => {
            let registry = load_or_exit(definitions.as_deref(), cli.output, cli.quiet);
            cmd_graph(&registry, &entity_type, cli.output, cli.quiet);
        }
        Commands::Replay { scenario } => {
            let registry = load_or_exit(definitions.as_deref(), cli.output, cli.quiet);
            replay::cmd_replay(registry, &scenario, cli.output, cli.quiet);
        }
    }
}

/// Why a definition document could not be loaded; every problem is listed.
struct LoadFailure {
    summary: String,
    problems: Vec<String>,
}

/// Load definitions from `path` (schema check, then graph validation), or
/// the built-in catalog when no path is given.
fn load_registry(path: Option<&Path>) -> Result<Registry, LoadFailure> {
    let fail = |summary: String| LoadFailure {
        summary,
        problems: Vec::new(),
    };
    let Some(path) = path else {
        return Registry::builtin().map_err(registry_failure);
    };

    let text = std::fs::read_to_string(path)
        .map_err(|e| fail(format!("error reading file '{}': {}", path.display(), e)))?;
    let doc: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| fail(format!("error parsing JSON in '{}': {}", path.display(), e)))?;

    let schema: serde_json::Value = serde_json::from_str(DEFINITIONS_SCHEMA)
        .map_err(|e| fail(format!("internal error: embedded schema: {}", e)))?;
    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| fail(format!("internal error: failed to compile schema: {}", e)))?;
    let schema_errors: Vec<String> = validator
        .iter_errors(&doc)
        .map(|e| format!("{}", e))
        .collect();
    if !schema_errors.is_empty() {
        return Err(LoadFailure {
            summary: format!("invalid definitions in '{}'", path.display()),
            problems: schema_errors,
        });
    }

    Registry::from_json(&doc).map_err(registry_failure)
}

fn registry_failure(err: RegistryError) -> LoadFailure {
    match err {
        RegistryError::Invalid { problems } => LoadFailure {
            summary: "invalid definitions".to_string(),
            problems: problems.iter().map(|p| p.to_string()).collect(),
        },
        other => LoadFailure {
            summary: other.to_string(),
            problems: Vec::new(),
        },
    }
}

fn report_load_failure(failure: &LoadFailure, output: OutputFormat, quiet: bool) {
    match output {
        OutputFormat::Text => {
            if !quiet {
                eprintln!("{}", failure.summary);
                for p in &failure.problems {
                    eprintln!("  - {}", p);
                }
            }
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "valid": false,
                "error": failure.summary,
                "problems": failure.problems,
            });
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&json).unwrap_or_default()
            );
        }
    }
}

fn load_or_exit(path: Option<&Path>, output: OutputFormat, quiet: bool) -> Registry {
    match load_registry(path) {
        Ok(r) => r,
        Err(failure) => {
            report_load_failure(&failure, output, quiet);
            process::exit(1);
        }
    }
}

fn cmd_validate(path: Option<&Path>, output: OutputFormat, quiet: bool) {
    let registry = load_or_exit(path, output, quiet);
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => println!(
            "valid: {} entity types (fingerprint {})",
            registry.len(),
            registry.fingerprint()
        ),
        OutputFormat::Json => print_json(&serde_json::json!({
            "valid": true,
            "entity_types": registry.len(),
            "fingerprint": registry.fingerprint(),
        })),
    }
}

fn cmd_types(registry: &Registry, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => {
            let width = registry
                .entity_types()
                .map(|t| t.as_str().len())
                .max()
                .unwrap_or(0);
            for graph in registry.graphs() {
                let terminal: Vec<&str> =
                    graph.terminal_states().iter().map(|s| s.as_str()).collect();
                println!(
                    "{:<width$}  initial: {}  terminal: {}",
                    graph.entity_type().as_str(),
                    graph.initial(),
                    terminal.join(", "),
                    width = width
                );
            }
        }
        OutputFormat::Json => {
            let types: Vec<serde_json::Value> = registry
                .graphs()
                .map(|graph| {
                    serde_json::json!({
                        "name": graph.entity_type(),
                        "initial": graph.initial(),
                        "terminal": graph.terminal_states(),
                        "states": graph.states(),
                    })
                })
                .collect();
            print_json(&serde_json::Value::Array(types));
        }
    }
}

fn cmd_graph(registry: &Registry, entity_type: &str, output: OutputFormat, quiet: bool) {
    let graph = match registry.graph(&EntityType::new(entity_type)) {
        Ok(g) => g,
        Err(e) => {
            report_error(&e.to_string(), output, quiet);
            process::exit(1);
        }
    };
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => {
            println!("{} (initial: {})", graph.entity_type(), graph.initial());
            println!("States:");
            for state in graph.states() {
                if graph.is_terminal(state) {
                    println!("  {} (terminal)", state);
                } else {
                    println!("  {}", state);
                }
            }
            println!("Transitions:");
            for edge in graph.edges() {
                if edge.guards.is_empty() {
                    println!("  {} -> {}", edge.from, edge.to);
                } else {
                    let guards: Vec<String> = edge
                        .guards
                        .iter()
                        .map(|g| format!("{}: {}", g.name(), g.describe()))
                        .collect();
                    println!("  {} -> {}  [{}]", edge.from, edge.to, guards.join("; "));
                }
            }
            let allow = graph.finalization_allow_list();
            if !allow.is_empty() {
                let fields: Vec<&str> = allow.iter().map(|f| f.as_str()).collect();
                println!("Editable after finalization: {}", fields.join(", "));
            }
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "entity_type": graph.entity_type(),
            "initial": graph.initial(),
            "states": graph.states(),
            "terminal": graph.terminal_states(),
            "transitions": graph.edges(),
            "editable_after_finalization": graph.finalization_allow_list(),
        })),
    }
}

pub(crate) fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value)
            .unwrap_or_else(|e| format!("serialization error: {}", e))
    );
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
