use clap::{Parser, Subcommand};
use richtext_sync::keys::SequentialKeys;
use richtext_sync::model::value_from_json;
use richtext_sync::validation::{Validation, validate_block, validate_value};
use richtext_sync::{Engine, EngineConfig, Schema, Value, build_list_index};
use serde_json::{Value as Json, json};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validates a value against a schema
    Validate {
        /// Schema JSON; the built-in default schema when omitted
        #[arg(long)]
        schema: Option<PathBuf>,
        value: PathBuf,
    },
    /// Prints the list index of a value
    Lists {
        #[arg(long)]
        schema: Option<PathBuf>,
        value: PathBuf,
    },
    /// Syncs OLD then NEW and prints the events of the second pass
    Diff {
        #[arg(long)]
        schema: Option<PathBuf>,
        old: PathBuf,
        new: PathBuf,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Validate { schema, value } => validate_command(schema.as_deref(), value),
        Commands::Lists { schema, value } => lists_command(schema.as_deref(), value),
        Commands::Diff { schema, old, new } => diff_command(schema.as_deref(), old, new),
    };
    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(2);
        }
    }
}

fn load_schema(path: Option<&Path>) -> Result<Schema, String> {
    match path {
        Some(path) => Schema::load(path).map_err(|err| err.to_string()),
        None => Ok(Schema::default()),
    }
}

fn read_json(path: &Path) -> Result<Json, String> {
    let text = std::fs::read_to_string(path).map_err(|err| format!("{}: {err}", path.display()))?;
    serde_json::from_str(&text).map_err(|err| format!("{}: {err}", path.display()))
}

fn read_value(path: &Path) -> Result<Option<Value>, String> {
    let json = read_json(path)?;
    if let Some(resolution) = validate_value(&json) {
        return Err(format!("{}: {}", path.display(), resolution.description));
    }
    value_from_json(json).map_err(|err| format!("{}: {err}", path.display()))
}

fn print_json(value: &Json) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|err| err.to_string())?;
    println!("{text}");
    Ok(())
}

fn validate_command(schema: Option<&Path>, path: &Path) -> Result<i32, String> {
    let schema = load_schema(schema)?;
    let json = read_json(path)?;
    if let Some(resolution) = validate_value(&json) {
        print_json(&json!({"valid": false, "index": null, "resolution": resolution}))?;
        return Ok(1);
    }
    let value = value_from_json(json)
        .map_err(|err| err.to_string())?
        .unwrap_or_default();

    let mut keys = SequentialKeys::with_prefix("new");
    let mut taken = HashSet::new();
    for (index, block) in value.iter().enumerate() {
        if let Validation::Invalid(resolution) = validate_block(block, index, &schema, &mut keys, &taken) {
            print_json(&json!({"valid": false, "index": index, "resolution": resolution}))?;
            return Ok(1);
        }
        taken.extend(block.key().map(str::to_string));
    }
    print_json(&json!({"valid": true}))?;
    Ok(0)
}

fn lists_command(schema: Option<&Path>, path: &Path) -> Result<i32, String> {
    let schema = load_schema(schema)?;
    let value = read_value(path)?.unwrap_or_default();
    let index = build_list_index(&value, &schema);
    let json = serde_json::to_value(&index).map_err(|err| err.to_string())?;
    print_json(&json)?;
    Ok(0)
}

fn diff_command(schema: Option<&Path>, old: &Path, new: &Path) -> Result<i32, String> {
    let schema = load_schema(schema)?;
    let old = read_value(old)?;
    let new = read_value(new)?;

    let mut engine = Engine::new(schema, EngineConfig::default()).with_key_generator(SequentialKeys::new());
    engine.update_value(old);
    engine.drain_events();
    engine.update_value(new);
    let events = serde_json::to_value(engine.drain_events()).map_err(|err| err.to_string())?;
    print_json(&events)?;
    Ok(0)
}
