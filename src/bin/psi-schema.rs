//! PSI Schema CLI
//!
//! Command-line interface for compiling schemas and composing transformer chains.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use psi_schema::{
    load_schema, load_schema_str, BadValueError, Chain, Engine, EngineOptions, FunctionError,
    LoadError, TemplateStore, ValidateError,
};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "psi-schema")]
#[command(about = "Compile PSI schemas and compose transformer chains")]
#[command(version)]
struct Cli {
    /// Directory of *.json templates added to (or overriding) the predefined ones
    #[arg(long, global = true)]
    templates: Option<PathBuf>,

    /// Base URL of this service; joins rewrite locators under it to local references
    #[arg(long, global = true)]
    service_base: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a schema-language document to JSON Schema
    Compile {
        /// Schema file, or inline JSON with --inline
        schema: String,

        /// Treat SCHEMA as JSON text instead of a path
        #[arg(long)]
        inline: bool,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Validate a value against a schema-language document
    Validate {
        /// Schema file, or inline JSON with --inline
        schema: String,

        /// Value file, or inline JSON with --inline
        value: String,

        /// Treat SCHEMA and VALUE as JSON text instead of paths
        #[arg(long)]
        inline: bool,

        /// Resolve schema references inside the value before validating
        #[arg(long)]
        resolve_value: bool,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },

    /// Check whether values emitted under one schema are accepted by another
    Check {
        /// Emits schema file, or inline JSON with --inline
        emits: String,

        /// Accepts schema file, or inline JSON with --inline
        accepts: String,

        /// Treat EMITS and ACCEPTS as JSON text instead of paths
        #[arg(long)]
        inline: bool,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },

    /// Print a sample value satisfying a schema
    Witness {
        /// Schema file, or inline JSON with --inline
        schema: String,

        /// Treat SCHEMA as JSON text instead of a path
        #[arg(long)]
        inline: bool,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// List template names, or show one template
    Templates {
        /// Print this template with its variables left in place
        #[arg(long)]
        show: Option<String>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Inspect or build transformer chains
    Chain {
        #[command(subcommand)]
        command: ChainCommands,
    },

    /// Apply a transformer, optionally followed by a chain, to a value
    Apply {
        /// Starting transformer (e.g. Tlength, Iprice)
        #[arg(long)]
        start: String,

        /// Chain token to apply after the starting transformer
        #[arg(long)]
        chain: Option<String>,

        /// Value file, or inline JSON with --inline
        value: String,

        /// Treat VALUE as JSON text instead of a path
        #[arg(long)]
        inline: bool,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },
}

#[derive(Subcommand)]
enum ChainCommands {
    /// Decode a chain token to its JSON form
    Decode {
        /// Chain token
        token: String,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Join transformers after a starting transformer and print the token
    Join {
        /// Starting transformer (e.g. Tlength, Iprice)
        #[arg(long)]
        start: String,

        /// Existing chain token to extend
        #[arg(long)]
        chain: Option<String>,

        /// Transformers to join, in order
        #[arg(required = true)]
        next: Vec<String>,

        /// Description of the resulting chain
        #[arg(long)]
        description: Option<String>,

        /// Output token, chain and description as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let engine = match build_engine(cli.templates.as_deref(), cli.service_base) {
        Ok(engine) => engine,
        Err(code) => return ExitCode::from(code),
    };

    let result = match cli.command {
        Commands::Compile {
            schema,
            inline,
            output,
            pretty,
        } => run_compile(&engine, &schema, inline, output, pretty),

        Commands::Validate {
            schema,
            value,
            inline,
            resolve_value,
            json,
        } => run_validate(&engine, &schema, &value, inline, resolve_value, json),

        Commands::Check {
            emits,
            accepts,
            inline,
            json,
        } => run_check(&engine, &emits, &accepts, inline, json),

        Commands::Witness {
            schema,
            inline,
            pretty,
        } => run_witness(&engine, &schema, inline, pretty),

        Commands::Templates { show, pretty } => run_templates(&engine, show.as_deref(), pretty),

        Commands::Chain {
            command: ChainCommands::Decode { token, pretty },
        } => run_decode(&token, pretty),

        Commands::Chain {
            command:
                ChainCommands::Join {
                    start,
                    chain,
                    next,
                    description,
                    json,
                },
        } => run_join(
            &engine,
            &start,
            chain.as_deref(),
            &next,
            description.as_deref(),
            json,
        ),

        Commands::Apply {
            start,
            chain,
            value,
            inline,
            pretty,
        } => run_apply(&engine, &start, chain.as_deref(), &value, inline, pretty),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn build_engine(templates: Option<&Path>, service_base: Option<String>) -> Result<Engine, u8> {
    let mut store = TemplateStore::builtin().map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;
    if let Some(dir) = templates {
        store.load_dir(dir).map_err(|e| {
            eprintln!("Error loading templates: {}", e);
            e.exit_code() as u8
        })?;
    }

    let mut options = EngineOptions::new();
    if let Some(base) = service_base {
        options = options.service_base(base);
    }

    Engine::with_store(store, options).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })
}

/// Load JSON from a path, or parse `source` itself when `inline`.
fn load_source(source: &str, inline: bool) -> Result<Value, LoadError> {
    if inline {
        load_schema_str(source)
    } else {
        load_schema(Path::new(source))
    }
}

fn to_json(value: &Value, pretty: bool) -> Result<String, u8> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })
}

fn run_compile(
    engine: &Engine,
    source: &str,
    inline: bool,
    output: Option<PathBuf>,
    pretty: bool,
) -> Result<(), u8> {
    let schema = load_source(source, inline).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let compiled = engine.compile(&schema).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let json_output = to_json(&compiled, pretty)?;
    match output {
        Some(path) => {
            std::fs::write(&path, &json_output).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", json_output);
        }
    }

    Ok(())
}

fn run_validate(
    engine: &Engine,
    schema_source: &str,
    value_source: &str,
    inline: bool,
    resolve_value: bool,
    json_output: bool,
) -> Result<(), u8> {
    let schema = load_source(schema_source, inline).map_err(|e| {
        report_error(json_output, &format!("loading schema: {}", e));
        e.exit_code() as u8
    })?;
    let value = load_source(value_source, inline).map_err(|e| {
        report_error(json_output, &format!("loading value: {}", e));
        e.exit_code() as u8
    })?;

    let result = if resolve_value {
        engine.validate_with_resolution(&schema, &value)
    } else {
        engine.validate_schema(&schema, &value)
    };

    match result {
        Ok(()) => {
            if json_output {
                println!(r#"{{"valid":true}}"#);
            } else {
                println!("Valid");
            }
            Ok(())
        }
        Err(ValidateError::Invalid { errors }) => {
            if json_output {
                let output = json!({
                    "valid": false,
                    "errors": errors
                });
                println!("{}", output);
            } else {
                eprintln!("Validation failed:");
                for error in errors {
                    eprintln!("  {}", error);
                }
            }
            Err(1)
        }
        Err(ValidateError::Compile(e)) => {
            report_error(json_output, &e.to_string());
            Err(e.exit_code() as u8)
        }
    }
}

fn run_check(
    engine: &Engine,
    emits_source: &str,
    accepts_source: &str,
    inline: bool,
    json_output: bool,
) -> Result<(), u8> {
    let emits = load_source(emits_source, inline).map_err(|e| {
        report_error(json_output, &format!("loading emits schema: {}", e));
        e.exit_code() as u8
    })?;
    let accepts = load_source(accepts_source, inline).map_err(|e| {
        report_error(json_output, &format!("loading accepts schema: {}", e));
        e.exit_code() as u8
    })?;

    let incompatible = engine.is_incompatible(&emits, &accepts).map_err(|e| {
        report_error(json_output, &e.to_string());
        e.exit_code() as u8
    })?;

    if json_output {
        println!("{}", json!({ "compatible": !incompatible }));
    } else if incompatible {
        println!("Incompatible");
    } else {
        println!("Compatible");
    }

    if incompatible {
        Err(1)
    } else {
        Ok(())
    }
}

fn run_witness(engine: &Engine, source: &str, inline: bool, pretty: bool) -> Result<(), u8> {
    let schema = load_source(source, inline).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let witness = engine.witness(&schema).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    println!("{}", to_json(&witness, pretty)?);
    Ok(())
}

fn run_templates(engine: &Engine, show: Option<&str>, pretty: bool) -> Result<(), u8> {
    let templates = engine.templates();
    match show {
        Some(name) => {
            let template = templates.get(name).ok_or_else(|| {
                eprintln!("Error: no template named '{}'", name);
                2u8
            })?;
            println!("{}", to_json(&template.render_raw(), pretty)?);
        }
        None => {
            for name in templates.names() {
                println!("{}", name);
            }
        }
    }
    Ok(())
}

fn run_decode(token: &str, pretty: bool) -> Result<(), u8> {
    let chain = Chain::decode(token).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;
    println!("{}", to_json(&chain.to_json(), pretty)?);
    Ok(())
}

fn run_join(
    engine: &Engine,
    start: &str,
    existing: Option<&str>,
    next: &[String],
    description: Option<&str>,
    json_output: bool,
) -> Result<(), u8> {
    let fail = |e: psi_schema::ChainError| {
        report_error(json_output, &e.to_string());
        e.exit_code() as u8
    };

    let producer = engine.transformer(start).map_err(fail)?;
    let mut chain = existing.map(Chain::decode).transpose().map_err(fail)?;

    // Only the final join carries the description
    let last = next.len().saturating_sub(1);
    for (i, reference) in next.iter().enumerate() {
        let description = if i == last { description } else { None };
        chain = Some(
            Chain::create(engine, producer.as_ref(), chain, reference, description)
                .map_err(fail)?,
        );
    }

    let Some(chain) = chain else {
        report_error(json_output, "nothing to join");
        return Err(2);
    };

    if json_output {
        let output = json!({
            "token": chain.encode(),
            "chain": chain.to_json(),
            "emits": chain.emits(),
            "description": chain.description(),
        });
        println!("{}", output);
    } else {
        println!("{}", chain.encode());
    }
    Ok(())
}

fn run_apply(
    engine: &Engine,
    start: &str,
    token: Option<&str>,
    value_source: &str,
    inline: bool,
    pretty: bool,
) -> Result<(), u8> {
    let value = load_source(value_source, inline).map_err(|e| {
        eprintln!("Error loading value: {}", e);
        e.exit_code() as u8
    })?;

    let chain = token.map(Chain::decode).transpose().map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;
    let pipeline = engine.pipeline(start, chain.as_ref()).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    match pipeline.apply_checked(&value) {
        Ok(result) => {
            println!("{}", to_json(&result, pretty)?);
            Ok(())
        }
        Err(FunctionError::BadValue(BadValueError::Rejected { errors })) => {
            eprintln!("Value rejected:");
            for error in errors {
                eprintln!("  {}", error);
            }
            Err(1)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            Err(e.exit_code() as u8)
        }
    }
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", json!({ "valid": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}
