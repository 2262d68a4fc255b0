use jvm_mutator::config::EngineConfig;
use jvm_mutator::disasm;
use jvm_mutator::engine::MutationEngine;
use jvm_mutator::error::{ConfigError, EngineError};
use jvm_mutator::mutants::{ClassName, MutationDetails, MutationIdentifier};
use jvm_mutator::operators::Mutator;
use jvm_mutator::output;
use jvm_mutator::source::DirectorySource;

use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jvm-mutator", version, about = "Bytecode mutation for JVM class files")]
struct Cli {
    /// Log engine decisions to stderr (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct EngineArgs {
    /// Directory holding the compiled classes
    #[arg(short, long, env = "JVM_MUTATOR_CLASSPATH")]
    classpath: PathBuf,
    /// JSON engine config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Operators or groups to use (e.g. DEFAULTS, ALL, MATH), comma separated
    #[arg(short, long, value_delimiter = ',')]
    mutators: Vec<String>,
    /// Method name to scope mutations to; repeatable
    #[arg(long = "method")]
    methods: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the mutations found in a class
    List {
        /// Class name, dotted or internal form
        class: Option<String>,
        /// List every class below the classpath instead
        #[arg(long, conflicts_with = "class")]
        all: bool,
        #[command(flatten)]
        engine: EngineArgs,
        /// Output JSON instead of human-readable text
        #[arg(long)]
        json: bool,
    },
    /// Write the class with one mutation applied
    Mutate {
        /// Mutation id as printed by `list`, e.g. com/example/Foo.bar(I)V@MATH#0
        id: String,
        #[command(flatten)]
        engine: EngineArgs,
        /// Where to write the mutated class file
        #[arg(short, long)]
        out: PathBuf,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a mutation and the bytecode it changes
    Show {
        /// Mutation id as printed by `list`, e.g. com/example/Foo.bar(I)V@MATH#0
        id: String,
        #[command(flatten)]
        engine: EngineArgs,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = match cli.command {
        Commands::List { class, all, engine, json } => cmd_list(class, all, engine, json),
        Commands::Mutate { id, engine, out, json } => cmd_mutate(id, engine, out, json),
        Commands::Show { id, engine, json } => cmd_show(id, engine, json),
    };

    process::exit(exit_code);
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Builds the engine from the config file with command-line overrides.
///
/// `fallback` replaces the default operators when neither `--mutators` nor a
/// config file chose them.
fn build_engine(
    args: &EngineArgs,
    fallback: Option<Mutator>,
) -> Result<MutationEngine<DirectorySource>, ConfigError> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if !args.mutators.is_empty() {
        config.mutators = args
            .mutators
            .iter()
            .map(|m| m.parse::<Mutator>())
            .collect::<Result<_, _>>()?;
    } else if let (None, Some(mutator)) = (&args.config, fallback) {
        config.mutators = vec![mutator];
    }
    if !args.methods.is_empty() {
        config.target_methods = args.methods.clone();
    }
    Ok(config.build_engine(DirectorySource::new(&args.classpath)))
}

fn exit_code_for(err: &EngineError) -> i32 {
    match err {
        EngineError::ClassNotFound(_) | EngineError::MutationNotFound(_) => 2,
        _ => 3,
    }
}

fn engine_or_exit(args: &EngineArgs, fallback: Option<Mutator>) -> Result<MutationEngine<DirectorySource>, i32> {
    if !args.classpath.is_dir() {
        output::print_error(&format!(
            "Classpath not found: {}. Pass --classpath <dir> with compiled classes.",
            args.classpath.display()
        ));
        return Err(2);
    }
    build_engine(args, fallback).map_err(|e| {
        output::print_error(&e.to_string());
        2
    })
}

fn parse_id(id: &str) -> Result<MutationIdentifier, i32> {
    id.parse().map_err(|e: jvm_mutator::mutants::ParseIdentifierError| {
        output::print_error(&e.to_string());
        2
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> i32 {
    match serde_json::to_string(value) {
        Ok(s) => {
            println!("{}", s);
            0
        }
        Err(e) => {
            output::print_error(&format!("Failed to encode JSON: {}", e));
            3
        }
    }
}

fn cmd_list(class: Option<String>, all: bool, args: EngineArgs, json_mode: bool) -> i32 {
    let engine = match engine_or_exit(&args, None) {
        Ok(e) => e,
        Err(code) => return code,
    };

    let classes = match (class, all) {
        (Some(name), _) => vec![ClassName::new(name)],
        (None, true) => match engine.source().list_classes() {
            Ok(classes) => classes,
            Err(e) => {
                output::print_error(&format!("Failed to scan {}: {}", args.classpath.display(), e));
                return 3;
            }
        },
        (None, false) => {
            output::print_error("Pass a class name or --all.");
            return 2;
        }
    };

    let mut found: Vec<MutationDetails> = Vec::new();
    for class in &classes {
        match engine.discover(class) {
            Ok(mutations) => {
                if !json_mode {
                    output::print_mutations(class, &mutations);
                }
                found.extend(mutations);
            }
            Err(e) => {
                output::print_error(&e.to_string());
                return exit_code_for(&e);
            }
        }
    }

    if json_mode {
        return print_json(&found);
    }
    0
}

fn cmd_mutate(id: String, args: EngineArgs, out: PathBuf, json_mode: bool) -> i32 {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(code) => return code,
    };
    let engine = match engine_or_exit(&args, Some(Mutator::All)) {
        Ok(e) => e,
        Err(code) => return code,
    };

    let mutant = match engine.materialize(&id) {
        Ok(m) => m,
        Err(e) => {
            output::print_error(&e.to_string());
            return exit_code_for(&e);
        }
    };

    if let Err(e) = std::fs::write(&out, &mutant.bytes) {
        output::print_error(&format!("Failed to write {}: {}", out.display(), e));
        return 3;
    }

    if json_mode {
        return print_json(&mutant.details);
    }
    output::print_success(&format!("{} written to {}", mutant.details.id, out.display()));
    0
}

fn cmd_show(id: String, args: EngineArgs, json_mode: bool) -> i32 {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(code) => return code,
    };
    let engine = match engine_or_exit(&args, Some(Mutator::All)) {
        Ok(e) => e,
        Err(code) => return code,
    };

    let (original, mutant) = match engine
        .fetch_original(&id.class)
        .and_then(|original| Ok((original, engine.materialize(&id)?)))
    {
        Ok(pair) => pair,
        Err(e) => {
            output::print_error(&e.to_string());
            return exit_code_for(&e);
        }
    };

    if json_mode {
        return print_json(&mutant.details);
    }

    let listings = disasm::method_listing(&original, &id.method, &id.descriptor).and_then(|before| {
        let after = disasm::method_listing(&mutant.bytes, &id.method, &id.descriptor)?;
        Ok((before.unwrap_or_default(), after.unwrap_or_default()))
    });
    match listings {
        Ok((before, after)) => {
            output::print_mutant_detail(&mutant.details, &disasm::diff_listings(&before, &after));
            0
        }
        Err(e) => {
            output::print_error(&format!("Failed to disassemble {}: {}", id.class, e));
            3
        }
    }
}
