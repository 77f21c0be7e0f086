//! Command-line interface for cdr-validate

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};

#[cfg(feature = "cli")]
use std::fs;
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
use rusqlite::Connection;

#[cfg(feature = "cli")]
use cdr_validate::{
    initialize_schema, DocId, DocumentSubmission, RuleRegistry, Schema, SchemaCache, SchemaType,
    SqliteStore, ValidRule, ValidationOrchestrator, ValidationTypes, ValidatorConfig,
};

#[cfg(feature = "cli")]
#[derive(Parser, Debug)]
#[command(name = "cdr-validate")]
#[command(author, version, about = "Clinical document schema and link validation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a schema and display its structure
    CheckSchema {
        /// Path to the schema document
        #[arg(value_name = "SCHEMA")]
        schema: PathBuf,
    },

    /// Create the document and link tables
    InitDb {
        /// SQLite database file
        #[arg(long)]
        db: PathBuf,
    },

    /// Store the schema of a document type
    AddSchema {
        /// SQLite database file
        #[arg(long)]
        db: PathBuf,

        /// Document type name
        #[arg(long)]
        doc_type: String,

        /// Path to the schema document
        #[arg(value_name = "SCHEMA")]
        schema: PathBuf,
    },

    /// Store the current working copy of a document
    AddDocument {
        /// SQLite database file
        #[arg(long)]
        db: PathBuf,

        /// Document id (CDR0000012345 or 12345)
        #[arg(long)]
        id: String,

        /// Document type name
        #[arg(long)]
        doc_type: String,

        /// Document title
        #[arg(long)]
        title: Option<String>,

        /// Path to the document
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Validate a document against its schema and the link graph
    Validate {
        /// SQLite database file
        #[arg(long)]
        db: PathBuf,

        /// Document type name
        #[arg(long)]
        doc_type: String,

        /// Id of the stored document, if any
        #[arg(long)]
        id: Option<String>,

        /// Validator configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Phases to run ("Schema", "Links"; empty for both)
        #[arg(long, default_value = "")]
        types: String,

        /// Update policy: validate-only, update-if-valid, update
        #[arg(long, default_value = "validate-only")]
        rule: String,

        /// Include locators in the error report
        #[arg(long)]
        locators: bool,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,

        /// Path to the document
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Check that nothing links to a document, then remove its links
    DeleteLinks {
        /// SQLite database file
        #[arg(long)]
        db: PathBuf,

        /// Document id
        #[arg(long)]
        id: String,

        /// Validator configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Update policy: validate-only, update-if-valid, update
        #[arg(long, default_value = "update-if-valid")]
        rule: String,
    },
}

#[cfg(feature = "cli")]
fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::CheckSchema { schema } => cmd_check_schema(schema),
        Commands::InitDb { db } => cmd_init_db(db),
        Commands::AddSchema { db, doc_type, schema } => cmd_add_schema(db, doc_type, schema),
        Commands::AddDocument {
            db,
            id,
            doc_type,
            title,
            file,
        } => cmd_add_document(db, id, doc_type, title, file),
        Commands::Validate {
            db,
            doc_type,
            id,
            config,
            types,
            rule,
            locators,
            json,
            file,
        } => cmd_validate(db, doc_type, id, config, types, rule, locators, json, file),
        Commands::DeleteLinks { db, id, config, rule } => cmd_delete_links(db, id, config, rule),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(feature = "cli")]
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[cfg(feature = "cli")]
fn parse_id(raw: &str) -> Result<DocId, Box<dyn std::error::Error>> {
    DocId::parse(raw).ok_or_else(|| format!("Invalid document id: {}", raw).into())
}

#[cfg(feature = "cli")]
fn load_config(path: Option<PathBuf>) -> Result<ValidatorConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(ValidatorConfig::from_file(path)?),
        None => Ok(ValidatorConfig::default()),
    }
}

#[cfg(feature = "cli")]
fn cmd_check_schema(schema_path: PathBuf) -> Result<bool, Box<dyn std::error::Error>> {
    let schema = Schema::from_string(&fs::read_to_string(&schema_path)?)?;

    println!("cdr-validate v{}", cdr_validate::VERSION);
    println!();
    println!("Schema Information:");
    println!("  Root Element: {}", schema.root_element().name);
    println!("  Root Type: {}", schema.root_element().type_name);
    println!();
    println!("Statistics:");
    println!("  Elements: {}", schema.element_count());
    println!("  Types: {}", schema.type_count());

    println!("\n=== Elements ===");
    for (element, type_name) in schema.elements() {
        println!("  {} : {}", element, type_name);
    }

    println!("\n=== Types ===");
    for schema_type in schema.types() {
        match schema_type {
            SchemaType::Simple(simple) if simple.is_builtin() => {}
            SchemaType::Simple(simple) => {
                println!("  {} (simple, {})", simple.name, simple.ur_type.name())
            }
            SchemaType::Complex(complex) => {
                println!("  {} (complex, {})", complex.name, complex.content.as_str())
            }
        }
    }

    Ok(true)
}

#[cfg(feature = "cli")]
fn cmd_init_db(db: PathBuf) -> Result<bool, Box<dyn std::error::Error>> {
    let conn = Connection::open(&db)?;
    initialize_schema(&conn)?;
    println!("Initialized {}", db.display());
    Ok(true)
}

#[cfg(feature = "cli")]
fn cmd_add_schema(
    db: PathBuf,
    doc_type: String,
    schema_path: PathBuf,
) -> Result<bool, Box<dyn std::error::Error>> {
    let xml = fs::read_to_string(&schema_path)?;
    // Refuse to store a schema that does not build
    Schema::from_string(&xml)?;

    let conn = Connection::open(&db)?;
    SqliteStore::new(&conn).add_schema(&doc_type, &xml)?;
    println!("Stored schema for {}", doc_type);
    Ok(true)
}

#[cfg(feature = "cli")]
fn cmd_add_document(
    db: PathBuf,
    id: String,
    doc_type: String,
    title: Option<String>,
    file: PathBuf,
) -> Result<bool, Box<dyn std::error::Error>> {
    let id = parse_id(&id)?;
    let xml = fs::read_to_string(&file)?;

    let conn = Connection::open(&db)?;
    SqliteStore::new(&conn).add_document(id, &doc_type, &xml, title.as_deref())?;
    println!("Stored {} ({})", id, doc_type);
    Ok(true)
}

#[cfg(feature = "cli")]
#[allow(clippy::too_many_arguments)]
fn cmd_validate(
    db: PathBuf,
    doc_type: String,
    id: Option<String>,
    config: Option<PathBuf>,
    types: String,
    rule: String,
    locators: bool,
    json_output: bool,
    file: PathBuf,
) -> Result<bool, Box<dyn std::error::Error>> {
    let config = load_config(config)?;
    let link_types = config.link_type_registry()?;
    let rules = RuleRegistry::default();
    let rule: ValidRule = rule.parse()?;
    let id = id.as_deref().map(parse_id).transpose()?;
    let xml = fs::read_to_string(&file)?;

    let mut conn = Connection::open(&db)?;
    let tx = conn.transaction()?;
    let outcome = {
        let store = SqliteStore::new(&tx);
        let orchestrator = ValidationOrchestrator::new(&store, &link_types, &rules, &config.limits)
            .with_locators(locators || config.error_locators);
        let mut cache = SchemaCache::new();
        orchestrator.validate(
            &mut cache,
            &DocumentSubmission {
                id,
                doc_type: &doc_type,
                xml: &xml,
            },
            rule,
            ValidationTypes::parse(&types),
        )?
    };
    tx.commit()?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("Status: {}", outcome.status);
        if outcome.effective_rule != rule {
            println!("Update policy demoted to {}", outcome.effective_rule);
        }
        if outcome.links_saved > 0 {
            println!("Links saved: {}", outcome.links_saved);
        }
        if !outcome.report.is_empty() {
            println!();
            print!("{}", outcome.report);
        }
    }

    Ok(outcome.is_valid())
}

#[cfg(feature = "cli")]
fn cmd_delete_links(
    db: PathBuf,
    id: String,
    config: Option<PathBuf>,
    rule: String,
) -> Result<bool, Box<dyn std::error::Error>> {
    let config = load_config(config)?;
    let link_types = config.link_type_registry()?;
    let rules = RuleRegistry::default();
    let rule: ValidRule = rule.parse()?;
    let id = parse_id(&id)?;

    let mut conn = Connection::open(&db)?;
    let tx = conn.transaction()?;
    let outcome = {
        let store = SqliteStore::new(&tx);
        ValidationOrchestrator::new(&store, &link_types, &rules, &config.limits)
            .with_locators(config.error_locators)
            .delete_document_links(id, rule)?
    };
    tx.commit()?;

    if outcome.deleted {
        println!("Links of {} deleted", id);
    } else {
        println!("Links of {} not deleted", id);
    }
    if !outcome.report.is_empty() {
        print!("{}", outcome.report);
    }
    Ok(outcome.errors.is_empty())
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Rebuild with --features cli");
    std::process::exit(1);
}
