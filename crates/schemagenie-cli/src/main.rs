//! SchemaGenie CLI - ask questions about OCA schemas stored in a graph database

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use schemagenie_core::Error;
use schemagenie_core::catalog::{SchemaDetail, SchemaSummary, render_attribute_match};
use schemagenie_core::chat::{ChatAnswer, ChatSession};
use schemagenie_core::config::Config;
use schemagenie_core::graph::{BackendKind, GraphStore, QueryResult, open_store};
use schemagenie_core::importer::{FileResult, ImportReport, Importer};
use schemagenie_core::llm::LlmClient;
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Parser)]
#[command(name = "schemagenie")]
#[command(author, version, about = "Natural-language assistant for OCA schemas in a graph database", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Graph backend (overrides graph.backend)
    #[arg(long, global = true)]
    backend: Option<BackendArg>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum BackendArg {
    Neo4j,
    Sqlite,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Neo4j => BackendKind::Neo4j,
            BackendArg::Sqlite => BackendKind::Sqlite,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Import a folder of OCA package JSON files
    Import {
        /// Folder to import (defaults to import.folder)
        #[arg(short, long)]
        folder: Option<PathBuf>,
        /// Parse and plan without writing to the graph
        #[arg(long)]
        dry_run: bool,
    },

    /// Inspect imported schemas
    Schemas {
        #[command(subcommand)]
        action: SchemaAction,
    },

    /// Search attributes across schemas
    Attributes {
        #[command(subcommand)]
        action: AttributeAction,
    },

    /// Ask a single question
    Ask {
        /// The question
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },

    /// Start an interactive chat
    Chat,

    /// Run a read-only Cypher query (Neo4j only)
    Query {
        /// Cypher query text
        cypher: String,
    },

    /// Show graph node and relationship counts
    Stats,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum SchemaAction {
    /// List all schemas
    List,
    /// Show schema details
    Show {
        /// Schema id or name
        key: String,
    },
}

#[derive(Subcommand)]
enum AttributeAction {
    /// Find attributes by name or description
    Search {
        keyword: String,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// List schemas that declare an attribute
    Schemas { name: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
    /// Reset to defaults
    Reset,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.quiet);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(quiet: bool) {
    let default_level = if quiet { "schemagenie=warn" } else { "schemagenie=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn report_error(err: &anyhow::Error) {
    match err.downcast_ref::<Error>() {
        Some(e) => {
            eprintln!("Error [{}]: {}", e.code(), e);
            if let Some(suggestion) = e.suggestion() {
                eprintln!("  Try: {}", suggestion);
            }
        }
        None => eprintln!("Error: {:#}", err),
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let out = Output {
        format: cli.format,
        quiet: cli.quiet,
    };
    let backend = cli.backend.map(BackendKind::from);

    match cli.command {
        Commands::Config { action } => cmd_config(action, out),
        Commands::Doctor => cmd_doctor(backend, out).await,
        command => {
            let config = Config::load()?;
            let store = open_store(&config, backend).await?;

            match command {
                Commands::Import { folder, dry_run } => {
                    let folder = folder.unwrap_or_else(|| config.import.folder.clone());
                    cmd_import(store, &folder, dry_run, out).await
                }
                Commands::Schemas { action } => cmd_schemas(store.as_ref(), action, &config, out).await,
                Commands::Attributes { action } => {
                    cmd_attributes(store.as_ref(), action, &config, out).await
                }
                Commands::Ask { question } => cmd_ask(store, &config, &question.join(" "), out).await,
                Commands::Chat => cmd_chat(store, &config, out).await,
                Commands::Query { cypher } => cmd_query(store.as_ref(), &cypher, out).await,
                Commands::Stats => cmd_stats(store.as_ref(), out).await,
                Commands::Config { .. } | Commands::Doctor => Ok(()),
            }
        }
    }
}

#[derive(Clone, Copy)]
struct Output {
    format: OutputFormat,
    quiet: bool,
}

impl Output {
    fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_import(
    store: Arc<dyn GraphStore>,
    folder: &std::path::Path,
    dry_run: bool,
    out: Output,
) -> anyhow::Result<()> {
    if !out.quiet && !out.json() {
        let mode = if dry_run { " (dry run)" } else { "" };
        println!(
            "Importing schemas from {} into {}{}...",
            folder.display(),
            store.backend(),
            mode
        );
    }

    let report = Importer::new(store).dry_run(dry_run).import_folder(folder).await?;

    if out.json() {
        out.print_json(&report)?;
    } else {
        print_import_report(&report, out.quiet);
    }

    if !report.is_success() {
        anyhow::bail!(
            "{} of {} file(s) failed to import",
            report.failed(),
            report.files.len()
        );
    }
    Ok(())
}

fn print_import_report(report: &ImportReport, quiet: bool) {
    if !quiet {
        for file in &report.files {
            match &file.result {
                FileResult::Imported(outcome) => {
                    let action = if outcome.created { "created" } else { "updated" };
                    println!(
                        "  [OK] {} ({}, {} attributes, {} metas)",
                        file.schema_name, action, outcome.attributes_written, outcome.metas_written
                    );
                }
                FileResult::Planned { schema_id, statements } => {
                    println!(
                        "  [--] {} ({}): {} statements planned",
                        file.schema_name,
                        schema_id,
                        statements.len()
                    );
                    for statement in statements {
                        debug!(schema = %file.schema_name, statement = %statement.text.trim(), "Planned");
                    }
                }
                FileResult::Failed { code, message } => {
                    println!("  [!!] {} [{}]: {}", file.schema_name, code, message);
                }
            }
        }
        println!();
    }

    let elapsed = report.finished_at - report.started_at;
    if report.dry_run {
        println!(
            "Dry run: {} planned, {} failed ({} ms).",
            report.planned(),
            report.failed(),
            elapsed.num_milliseconds()
        );
    } else {
        println!(
            "Imported {}, failed {} ({} ms).",
            report.imported(),
            report.failed(),
            elapsed.num_milliseconds()
        );
    }
}

async fn cmd_schemas(
    store: &dyn GraphStore,
    action: SchemaAction,
    config: &Config,
    out: Output,
) -> anyhow::Result<()> {
    match action {
        SchemaAction::List => {
            let schemas = store.list_schemas().await?;
            if out.json() {
                return out.print_json(&schemas);
            }
            if schemas.is_empty() {
                if !out.quiet {
                    println!("No schemas imported.");
                    println!("\nImport some with: schemagenie import --folder <dir>");
                }
                return Ok(());
            }
            if !out.quiet {
                println!("Schemas:");
            }
            for summary in &schemas {
                print_summary(summary);
            }
        }
        SchemaAction::Show { key } => {
            let detail = store
                .get_schema(&key)
                .await?
                .ok_or_else(|| Error::SchemaNotFound(key.clone()))?;
            if out.json() {
                return out.print_json(&detail);
            }
            print_detail(&detail, &config.chat.language);
        }
    }
    Ok(())
}

fn print_summary(summary: &SchemaSummary) {
    println!(
        "  {} - {} attributes, {} metas ({})",
        summary.name, summary.attribute_count, summary.meta_count, summary.id
    );
}

fn print_detail(detail: &SchemaDetail, language: &str) {
    println!("Schema: {}", detail.name);
    println!("  ID: {}", detail.id);
    println!("  Type: {}", detail.schema_type);
    if let Some(capture_base) = &detail.capture_base_id {
        println!("  Capture base: {}", capture_base);
    }
    if let Some(meta) = detail.meta_for(language) {
        match &meta.description {
            Some(desc) => println!("  Title: {} - {}", meta.name, desc),
            None => println!("  Title: {}", meta.name),
        }
    }
    println!("  Attributes ({}):", detail.attributes.len());
    for attr in &detail.attributes {
        let mut line = format!("    - {} [{}]", attr.name, attr.attribute_type);
        if let Some(unit) = &attr.unit {
            line.push_str(&format!(" unit={}", unit));
        }
        if let Some(format) = &attr.format {
            line.push_str(&format!(" format={}", format));
        }
        if let Some(desc) = attr.description_for(language) {
            line.push_str(&format!(": {}", desc));
        }
        println!("{}", line);

        let entries = attr.entries_for(language);
        if !entries.is_empty() {
            let listed: Vec<String> = entries
                .iter()
                .map(|(code, label)| format!("{}={}", code, label))
                .collect();
            println!("        values: {}", listed.join(", "));
        }
    }
}

async fn cmd_attributes(
    store: &dyn GraphStore,
    action: AttributeAction,
    config: &Config,
    out: Output,
) -> anyhow::Result<()> {
    match action {
        AttributeAction::Search { keyword, limit } => {
            let hits = store.search_attributes(&keyword, limit).await?;
            if out.json() {
                return out.print_json(&hits);
            }
            if hits.is_empty() {
                if !out.quiet {
                    println!("No attributes match '{}'.", keyword);
                }
                return Ok(());
            }
            for hit in &hits {
                println!("  {}", render_attribute_match(hit, &config.chat.language));
            }
        }
        AttributeAction::Schemas { name } => {
            let schemas = store.schemas_sharing_attribute(&name).await?;
            if out.json() {
                return out.print_json(&schemas);
            }
            if schemas.is_empty() {
                if !out.quiet {
                    println!("No schemas declare attribute '{}'.", name);
                }
                return Ok(());
            }
            if !out.quiet {
                println!("Schemas using '{}':", name);
            }
            for summary in &schemas {
                print_summary(summary);
            }
        }
    }
    Ok(())
}

fn chat_session(store: Arc<dyn GraphStore>, config: &Config) -> anyhow::Result<ChatSession> {
    let client = LlmClient::from_config(&config.llm)?;
    Ok(ChatSession::new(Arc::new(client), store, config.chat.clone()))
}

async fn cmd_ask(
    store: Arc<dyn GraphStore>,
    config: &Config,
    question: &str,
    out: Output,
) -> anyhow::Result<()> {
    let mut session = chat_session(store, config)?;
    let answer = session.ask(question).await?;

    if out.json() {
        return out.print_json(&answer);
    }
    print_answer(&answer, out.quiet);
    Ok(())
}

fn print_answer(answer: &ChatAnswer, quiet: bool) {
    println!("{}", answer.answer.trim());
    if quiet {
        return;
    }
    if let Some(cypher) = &answer.cypher {
        println!();
        println!("Cypher: {}", cypher);
        if let Some(error) = &answer.query_error {
            println!("  (query failed: {})", error);
        } else if let Some(rows) = &answer.rows {
            println!("  ({} rows)", rows.rows.len());
        }
    }
    println!("[{} | {} tokens]", answer.model, answer.tokens_used);
}

async fn cmd_chat(store: Arc<dyn GraphStore>, config: &Config, out: Output) -> anyhow::Result<()> {
    let mut session = chat_session(store, config)?;
    let mut editor = DefaultEditor::new().context("Failed to start line editor")?;

    if !out.quiet {
        println!("SchemaGenie chat ({})", session.model_name());
        if session.uses_cypher() {
            println!("Answers are grounded with generated read-only Cypher queries.");
        }
        println!("Type /reset to clear history, /quit to exit.\n");
    }

    loop {
        let line = match editor.readline("schemagenie> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e).context("Failed to read input"),
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if let Err(e) = editor.add_history_entry(input) {
            debug!(error = %e, "Could not add history entry");
        }

        match input {
            "/quit" | "/exit" => break,
            "/reset" => {
                session.reset();
                println!("History cleared.");
                continue;
            }
            "/help" => {
                println!("/reset  clear conversation history");
                println!("/quit   exit");
                continue;
            }
            _ => {}
        }

        match session.ask(input).await {
            Ok(answer) if out.json() => out.print_json(&answer)?,
            Ok(answer) => {
                print_answer(&answer, out.quiet);
                println!();
            }
            Err(e) => {
                warn!(error = %e, "Question failed");
                eprintln!("Error [{}]: {}", e.code(), e);
            }
        }
    }

    Ok(())
}

async fn cmd_query(store: &dyn GraphStore, cypher: &str, out: Output) -> anyhow::Result<()> {
    let result: QueryResult = store.run_read_query(cypher).await?;
    if out.json() {
        return out.print_json(&result);
    }
    if result.is_empty() {
        if !out.quiet {
            println!("(no rows)");
        }
        return Ok(());
    }
    print!("{}", result.to_text(result.rows.len()));
    Ok(())
}

async fn cmd_stats(store: &dyn GraphStore, out: Output) -> anyhow::Result<()> {
    let stats = store.stats().await?;
    let last_run = store.last_import_run().await?;

    if out.json() {
        return out.print_json(&serde_json::json!({
            "backend": store.backend(),
            "stats": stats,
            "last_import": last_run,
        }));
    }

    println!("Graph ({})", store.backend());
    println!("  Schemas:       {}", stats.schemas);
    println!("  Attributes:    {}", stats.attributes);
    println!("  Metas:         {}", stats.metas);
    println!("  Relationships: {}", stats.relationships);
    if let Some(run) = last_run {
        println!(
            "  Last import:   {} ({} imported, {} failed) from {}",
            run.finished_at.format("%Y-%m-%d %H:%M:%S"),
            run.files_imported,
            run.files_failed,
            run.folder
        );
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, out: Output) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !out.quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            if out.json() {
                let map: serde_json::Map<String, serde_json::Value> = items
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::String(v)))
                    .collect();
                return out.print_json(&map);
            }
            for (key, value) in items {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !out.quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(backend: Option<BackendKind>, out: Output) -> anyhow::Result<()> {
    let quiet = out.quiet;
    if !quiet {
        println!("SchemaGenie Health Check");
        println!("========================");
        println!();
    }

    let mut all_ok = true;

    let config = match Config::load() {
        Ok(config) => {
            if !quiet {
                println!("[OK] Configuration: Valid");
            }
            Some(config)
        }
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Configuration: Error - {:#}", e);
            }
            None
        }
    };

    if !quiet {
        match Config::config_path() {
            Ok(path) if path.exists() => println!("[OK] Config file: {}", path.display()),
            Ok(path) => println!("[--] Config file: {} (using defaults)", path.display()),
            Err(e) => println!("[!!] Config file: Error - {}", e),
        }
    }

    if let Some(config) = &config {
        match config.llm.redacted_api_key() {
            Ok(Some(redacted)) => {
                if !quiet {
                    println!("[OK] API Key: Configured ({})", redacted);
                }
            }
            Ok(None) => {
                all_ok = false;
                if !quiet {
                    println!("[!!] API Key: Not configured");
                    println!("     Set SCHEMAGENIE_API_KEY or OPENROUTER_API_KEY environment variable");
                }
            }
            Err(e) => {
                all_ok = false;
                if !quiet {
                    println!("[!!] API Key: Error - {}", e);
                }
            }
        }

        let kind = backend.unwrap_or(config.graph.backend);
        match open_store(config, Some(kind)).await {
            Ok(store) => match store.health_check().await {
                Ok(()) => {
                    if !quiet {
                        println!("[OK] Graph ({}): Connected", kind);
                        match kind {
                            BackendKind::Neo4j => println!("     URI: {}", config.neo4j.uri),
                            BackendKind::Sqlite => println!(
                                "     Path: {}",
                                config.graph.resolved_sqlite_path().display()
                            ),
                        }
                        if let Ok(stats) = store.stats().await {
                            println!(
                                "     Schemas: {}, Attributes: {}",
                                stats.schemas, stats.attributes
                            );
                        }
                    }
                }
                Err(e) => {
                    all_ok = false;
                    if !quiet {
                        println!("[!!] Graph ({}): Health check failed - {}", kind, e);
                        if kind == BackendKind::Neo4j && config.neo4j.resolved_password().is_none() {
                            println!("     NEO4J_PASSWORD is not set");
                        }
                    }
                }
            },
            Err(e) => {
                all_ok = false;
                if !quiet {
                    println!("[!!] Graph ({}): Failed to open - {:#}", kind, e);
                }
            }
        }
    }

    if !quiet {
        println!();
        if all_ok {
            println!("All checks passed!");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }

    if !all_ok {
        anyhow::bail!("Health check failed");
    }
    Ok(())
}
