//! Entigraph CLI - entity graph from conversation messages

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use entigraph_core::config::Config;
use entigraph_core::domain::graph::{
    AliasSpec, AliasType, EntityType, ExportFormat, GraphOrchestrator, IntegrityValidator, Message,
    SearchOptions, TimeRange,
};
use entigraph_core::infrastructure::graph::{SqliteGraphRepository, SqliteMessageSource};
use entigraph_core::storage::{Database, DatabaseConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "entigraph")]
#[command(author, version, about = "Entity-linking knowledge graph for conversations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

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

#[derive(Subcommand)]
enum Commands {
    /// Load messages from a JSON file
    Ingest {
        /// JSON array of {id, conversation_id, content, timestamp?}
        file: PathBuf,
    },

    /// Store and process a single message
    Process {
        /// Conversation ID
        #[arg(short, long)]
        conversation: String,
        /// Message ID
        #[arg(short, long)]
        message: String,
        /// Message text
        content: String,
    },

    /// Process every stored message of a conversation
    Conversation {
        /// Conversation ID
        id: String,
    },

    /// Show how a name would be linked
    Link {
        name: String,
        /// Entity type (person, organization, technical, ...)
        #[arg(short = 't', long = "type")]
        entity_type: String,
    },

    /// Manage entity aliases
    Alias {
        #[command(subcommand)]
        action: AliasAction,
    },

    /// Merge one entity into another
    Merge {
        /// Entity folded away
        source: String,
        /// Entity that survives
        target: String,
    },

    /// Show an entity with its aliases and relationships
    Graph {
        /// Entity ID
        entity: String,
    },

    /// Search entities by name or alias
    Search {
        query: String,
        /// Restrict to entity types (repeatable)
        #[arg(short = 't', long = "type")]
        types: Vec<String>,
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Export the whole graph
    Export {
        /// Graph format (json, graphml, cypher)
        #[arg(default_value = "json")]
        graph_format: String,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run integrity checks
    Check,

    /// Auto-correct logged validation errors
    Fix {
        /// Validation error IDs (all auto-correctable entries when omitted)
        ids: Vec<String>,
    },

    /// Summarize the validation error log
    Errors {
        /// Only errors from the last N hours
        #[arg(long)]
        since_hours: Option<i64>,
    },

    /// Show graph statistics
    Stats,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum AliasAction {
    /// Add an alias to an entity
    Add {
        entity: String,
        alias: String,
        /// Alias type (abbreviation, nickname, variation, translation)
        #[arg(short = 't', long = "type")]
        alias_type: Option<String>,
        #[arg(short, long, default_value_t = 1.0)]
        confidence: f64,
    },
    /// List aliases of an entity
    List { entity: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

/// One entry of an ingest file
#[derive(Debug, Deserialize)]
struct IngestMessage {
    id: String,
    conversation_id: String,
    content: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct IngestSummary {
    messages: usize,
    conversations: Vec<ConversationCount>,
}

#[derive(Debug, Serialize)]
struct ConversationCount {
    conversation_id: String,
    messages: u64,
}

/// Opened store plus the configuration it was opened with
struct App {
    config: Config,
    db: Database,
    repo: Arc<SqliteGraphRepository>,
    messages: Arc<SqliteMessageSource>,
}

impl App {
    async fn open() -> anyhow::Result<Self> {
        let config = Config::load()?;
        config.validate()?;
        let path = config.database_path();
        let db = Database::new(DatabaseConfig::with_path(&path)).await?;
        debug!(path = %path.display(), "Graph store opened");
        let repo = Arc::new(SqliteGraphRepository::new(db.pool().clone()));
        let messages = Arc::new(SqliteMessageSource::new(db.pool().clone()));
        Ok(Self {
            config,
            db,
            repo,
            messages,
        })
    }

    fn orchestrator(&self) -> GraphOrchestrator<SqliteGraphRepository> {
        GraphOrchestrator::new(self.repo.clone(), Arc::new(self.config.keyword_extractor()))
            .with_message_source(self.messages.clone())
            .with_config(self.config.orchestrator.clone())
            .with_linker_config(self.config.linker_config())
            .with_detector_config(self.config.detector.clone())
    }

    fn validator(&self) -> IntegrityValidator<SqliteGraphRepository> {
        IntegrityValidator::new(self.repo.clone())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so that --format json output stays parseable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("entigraph=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        if let Some(core) = e.downcast_ref::<entigraph_core::Error>() {
            eprintln!("Error [{}]: {}", core.code(), core);
            if let Some(suggestion) = core.suggestion() {
                eprintln!("  Suggestion: {}", suggestion);
            }
            std::process::exit(1);
        }
        return Err(e);
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let out = Output {
        format: cli.format,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Config { action } => cmd_config(action, out),
        command => {
            let app = App::open().await?;
            let result = dispatch(&app, command, out).await;
            app.db.close().await;
            result
        }
    }
}

async fn dispatch(app: &App, command: Commands, out: Output) -> anyhow::Result<()> {
    match command {
        Commands::Ingest { file } => cmd_ingest(app, &file, out).await,
        Commands::Process {
            conversation,
            message,
            content,
        } => cmd_process(app, &conversation, &message, &content, out).await,
        Commands::Conversation { id } => cmd_conversation(app, &id, out).await,
        Commands::Link { name, entity_type } => cmd_link(app, &name, &entity_type, out).await,
        Commands::Alias { action } => cmd_alias(app, action, out).await,
        Commands::Merge { source, target } => cmd_merge(app, &source, &target, out).await,
        Commands::Graph { entity } => cmd_graph(app, &entity, out).await,
        Commands::Search {
            query,
            types,
            limit,
        } => cmd_search(app, &query, &types, limit, out).await,
        Commands::Export {
            graph_format,
            output,
        } => cmd_export(app, &graph_format, output.as_deref(), out).await,
        Commands::Check => cmd_check(app, out).await,
        Commands::Fix { ids } => cmd_fix(app, ids, out).await,
        Commands::Errors { since_hours } => cmd_errors(app, since_hours, out).await,
        Commands::Stats => cmd_stats(app, out).await,
        Commands::Config { action } => cmd_config(action, out),
    }
}

// ============================================================================
// Output helpers
// ============================================================================

#[derive(Clone, Copy)]
struct Output {
    format: OutputFormat,
    quiet: bool,
}

impl Output {
    fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Print as JSON and return true when JSON output was requested
    fn emit_json<T: Serialize>(&self, value: &T) -> anyhow::Result<bool> {
        if self.json() {
            println!("{}", serde_json::to_string_pretty(value)?);
            return Ok(true);
        }
        Ok(false)
    }
}

fn parse_entity_type(s: &str) -> anyhow::Result<EntityType> {
    EntityType::parse(s).ok_or_else(|| {
        let known: Vec<_> = EntityType::all().iter().map(|t| t.as_str()).collect();
        anyhow::anyhow!("Unknown entity type '{}'. Expected one of: {}", s, known.join(", "))
    })
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_ingest(app: &App, file: &Path, out: Output) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(file)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file.display(), e))?;
    let entries: Vec<IngestMessage> = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("Invalid message file {}: {}", file.display(), e))?;

    let now = Utc::now();
    for entry in &entries {
        let message = Message::new(
            &entry.id,
            &entry.conversation_id,
            &entry.content,
            entry.timestamp.unwrap_or(now),
        );
        app.messages.store_message(&message).await?;
    }
    info!(file = %file.display(), messages = entries.len(), "Messages ingested");

    let conversations = app
        .messages
        .list_conversations()
        .await?
        .into_iter()
        .map(|(conversation_id, messages)| ConversationCount {
            conversation_id,
            messages,
        })
        .collect();
    let summary = IngestSummary {
        messages: entries.len(),
        conversations,
    };
    if out.emit_json(&summary)? {
        return Ok(());
    }
    if !out.quiet {
        println!("Ingested {} messages.", summary.messages);
        for c in &summary.conversations {
            println!("  {} ({} messages)", c.conversation_id, c.messages);
        }
        println!("\nNext: Run `entigraph conversation <id>` to build the graph.");
    }
    Ok(())
}

async fn cmd_process(
    app: &App,
    conversation: &str,
    message_id: &str,
    content: &str,
    out: Output,
) -> anyhow::Result<()> {
    let message = Message::new(message_id, conversation, content, Utc::now());
    app.messages.store_message(&message).await?;

    let result = app
        .orchestrator()
        .process_message_at(message_id, conversation, content, message.timestamp)
        .await?;
    if out.emit_json(&result)? {
        return Ok(());
    }
    if out.quiet {
        return Ok(());
    }

    println!(
        "Processed message '{}': {} entities ({} new), {} relationships",
        result.message_id, result.entities_extracted, result.entities_created, result.relationships_detected
    );
    let names: HashMap<&str, &str> = result
        .entities
        .iter()
        .map(|e| (e.id.as_str(), e.name.as_str()))
        .collect();
    for entity in &result.entities {
        println!("  [{}] {} ({})", entity.entity_type, entity.name, short_id(&entity.id));
    }
    for rel in &result.relationships {
        println!(
            "  {} -{}-> {} (strength {:.2})",
            names.get(rel.source_entity_id.as_str()).copied().unwrap_or(&rel.source_entity_id),
            rel.relationship_type,
            names.get(rel.target_entity_id.as_str()).copied().unwrap_or(&rel.target_entity_id),
            rel.strength
        );
    }
    for insight in &result.insights {
        println!("  * {}", insight.description);
    }
    for failure in &result.failures {
        println!("  [!!] {}", failure);
    }
    Ok(())
}

async fn cmd_conversation(app: &App, id: &str, out: Output) -> anyhow::Result<()> {
    let result = app.orchestrator().process_conversation(id).await?;
    if out.emit_json(&result)? {
        return Ok(());
    }
    if out.quiet {
        return Ok(());
    }

    println!("Conversation '{}':", result.conversation_id);
    println!("  Messages processed: {}", result.messages_processed);
    if result.messages_failed > 0 {
        println!("  Messages failed: {}", result.messages_failed);
    }
    println!("  Entities extracted: {}", result.entities_extracted);
    println!("  Relationships detected: {}", result.relationships_detected);
    println!("  Time: {} ms", result.processing_time_ms);
    if !result.insights.is_empty() {
        println!("\nInsights:");
        for insight in &result.insights {
            println!("  [{}] {}", insight.kind, insight.description);
        }
    }
    if !result.failures.is_empty() {
        println!("\nFailures:");
        for failure in &result.failures {
            println!("  {}", failure);
        }
    }
    Ok(())
}

async fn cmd_link(app: &App, name: &str, entity_type: &str, out: Output) -> anyhow::Result<()> {
    let entity_type = parse_entity_type(entity_type)?;
    let orchestrator = app.orchestrator();
    let result = orchestrator.linker().link_entity(name, entity_type).await?;
    if out.emit_json(&result)? {
        return Ok(());
    }

    match (&result.linked_entity, result.candidates.first()) {
        (Some(entity), Some(best)) => {
            if out.quiet {
                println!("{}", entity.id);
                return Ok(());
            }
            println!(
                "'{}' links to {} ({}) via {} match, similarity {:.2}",
                name,
                entity.name,
                entity.id,
                best.match_kind.as_str(),
                best.similarity
            );
            if result.candidates.len() > 1 {
                println!("\nOther candidates:");
                for candidate in &result.candidates[1..] {
                    println!(
                        "  {} ({}) {} {:.2}",
                        candidate.entity.name,
                        short_id(&candidate.entity.id),
                        candidate.match_kind.as_str(),
                        candidate.similarity
                    );
                }
            }
            for alias in &result.suggested_aliases {
                println!("  Suggested alias: {} [{}]", alias.alias, alias.alias_type);
            }
        }
        _ => {
            if !out.quiet {
                println!("No {} matches '{}'; a new entity would be created.", entity_type, name);
            }
        }
    }
    Ok(())
}

async fn cmd_alias(app: &App, action: AliasAction, out: Output) -> anyhow::Result<()> {
    let orchestrator = app.orchestrator();
    let linker = orchestrator.linker();

    match action {
        AliasAction::Add {
            entity,
            alias,
            alias_type,
            confidence,
        } => {
            let alias_type = match alias_type {
                Some(s) => AliasType::parse(&s)
                    .ok_or_else(|| anyhow::anyhow!("Unknown alias type '{}'", s))?,
                None => AliasType::infer(&alias),
            };
            let spec = AliasSpec::new(&alias, alias_type, confidence);
            let stored = linker.create_aliases(&entity, &[spec]).await?;
            if out.emit_json(&stored)? {
                return Ok(());
            }
            if !out.quiet {
                println!("Alias '{}' [{}] added to {}.", alias, alias_type, entity);
            }
        }
        AliasAction::List { entity } => {
            let aliases = linker.get_entity_aliases(&entity).await?;
            if out.emit_json(&aliases)? {
                return Ok(());
            }
            if aliases.is_empty() {
                if !out.quiet {
                    println!("No aliases for {}.", entity);
                }
            } else {
                for alias in aliases {
                    println!(
                        "  {} [{}] {:.2}",
                        alias.alias, alias.alias_type, alias.confidence_score
                    );
                }
            }
        }
    }
    Ok(())
}

async fn cmd_merge(app: &App, source: &str, target: &str, out: Output) -> anyhow::Result<()> {
    let outcome = app.orchestrator().linker().merge_entities(source, target).await?;
    if out.emit_json(&outcome)? {
        return Ok(());
    }
    if !out.quiet {
        println!("Merged {} into {}.", outcome.source_id, outcome.target_id);
        println!("  Mentions moved: {}", outcome.mentions_moved);
        println!("  Relationships moved: {}", outcome.relationships_moved);
        println!("  Relationships combined: {}", outcome.relationships_combined);
        if outcome.relationships_dropped > 0 {
            println!("  Relationships dropped: {}", outcome.relationships_dropped);
        }
        println!("  Aliases moved: {}", outcome.aliases_moved);
    }
    Ok(())
}

async fn cmd_graph(app: &App, entity_id: &str, out: Output) -> anyhow::Result<()> {
    let graph = app.orchestrator().get_entity_graph(entity_id).await?;
    let Some(entity) = &graph.entity else {
        return Err(entigraph_core::Error::EntityNotFound(entity_id.to_string()).into());
    };
    if out.emit_json(&graph)? {
        return Ok(());
    }

    println!("Entity: {}", entity.name);
    println!("  ID: {}", entity.id);
    println!("  Type: {}", entity.entity_type);
    println!("  Mentions: {}", entity.mention_count);
    println!("  Confidence: {:.2}", entity.confidence_score);
    if let Some(last) = entity.last_mentioned_at {
        println!("  Last mentioned: {}", last.format("%Y-%m-%d %H:%M:%S"));
    }
    if out.quiet {
        return Ok(());
    }

    if !graph.aliases.is_empty() {
        println!("\nAliases:");
        for alias in &graph.aliases {
            println!("  {} [{}]", alias.alias, alias.alias_type);
        }
    }
    if !graph.relationships.is_empty() {
        let names: HashMap<&str, &str> = graph
            .related_entities
            .iter()
            .map(|e| (e.id.as_str(), e.name.as_str()))
            .collect();
        println!("\nRelationships:");
        for rel in &graph.relationships {
            let other = rel.other_end(&entity.id);
            let other_name = names.get(other).copied().unwrap_or(other);
            let arrow = if rel.source_entity_id == entity.id { "->" } else { "<-" };
            println!(
                "  {} {} {} (strength {:.2}, {} mentions)",
                rel.relationship_type, arrow, other_name, rel.strength, rel.mention_count
            );
        }
    }
    Ok(())
}

async fn cmd_search(
    app: &App,
    query: &str,
    types: &[String],
    limit: Option<usize>,
    out: Output,
) -> anyhow::Result<()> {
    let mut options = SearchOptions::default();
    if !types.is_empty() {
        let types = types
            .iter()
            .map(|t| parse_entity_type(t))
            .collect::<anyhow::Result<Vec<_>>>()?;
        options = options.with_types(types);
    }
    if let Some(limit) = limit {
        options = options.with_limit(limit);
    }

    let result = app.orchestrator().search_knowledge_graph(query, &options).await?;
    if out.emit_json(&result)? {
        return Ok(());
    }

    if result.entities.is_empty() {
        if !out.quiet {
            println!("No entities match '{}'.", query);
        }
        return Ok(());
    }
    for hit in &result.entities {
        println!(
            "  {} - {} [{}] {:.2}",
            short_id(&hit.entity.id),
            hit.entity.name,
            hit.entity.entity_type,
            hit.score
        );
    }
    if !out.quiet {
        for insight in &result.insights {
            println!("  * {}", insight.description);
        }
    }
    Ok(())
}

async fn cmd_export(
    app: &App,
    graph_format: &str,
    output: Option<&Path>,
    out: Output,
) -> anyhow::Result<()> {
    let format = ExportFormat::parse(graph_format).ok_or_else(|| {
        let known: Vec<_> = ExportFormat::all().iter().map(|f| f.as_str()).collect();
        anyhow::anyhow!("Unknown export format '{}'. Expected one of: {}", graph_format, known.join(", "))
    })?;
    let document = app.orchestrator().export_knowledge_graph(format).await?;

    match output {
        Some(path) => {
            std::fs::write(path, &document)
                .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", path.display(), e))?;
            info!(path = %path.display(), format = %format, "Graph exported");
            if !out.quiet {
                println!("Exported graph as {} to {}", format, path.display());
            }
        }
        None => print!("{}", document),
    }
    Ok(())
}

async fn cmd_check(app: &App, out: Output) -> anyhow::Result<()> {
    let report = app.validator().run_integrity_checks().await?;
    if out.emit_json(&report)? {
        return Ok(());
    }
    if out.quiet {
        println!("{}", report.total_issues);
        return Ok(());
    }

    println!("Integrity Check");
    println!("===============");
    println!("  Orphaned mentions: {}", report.orphaned_mentions.len());
    println!("  Invalid relationships: {}", report.invalid_relationships.len());
    println!("  Inconsistent counts: {}", report.inconsistent_counts.len());
    println!("  Format errors: {}", report.format_errors.len());
    for issue in &report.format_errors {
        println!(
            "    {} {} [{}] {}",
            issue.table.as_str(),
            short_id(&issue.record_id),
            issue.issue.field.as_deref().unwrap_or("record"),
            issue.issue.message
        );
    }
    println!();
    println!("  Total issues: {}", report.total_issues);
    println!("  Auto-fixed: {}", report.auto_fixed_issues);
    if report.total_issues > report.auto_fixed_issues {
        println!("\nRun `entigraph fix` to apply automatic corrections.");
    }
    Ok(())
}

async fn cmd_fix(app: &App, ids: Vec<String>, out: Output) -> anyhow::Result<()> {
    let ids = if ids.is_empty() { None } else { Some(ids) };
    let report = app.validator().auto_correct_errors(ids.as_deref()).await?;
    if out.emit_json(&report)? {
        return Ok(());
    }
    if !out.quiet {
        println!("Corrections:");
        println!("  Attempted: {}", report.attempted);
        println!("  Successful: {}", report.successful);
        println!("  Failed: {}", report.failed);
        for error in &report.errors {
            println!("  [!!] {}", error);
        }
    }
    Ok(())
}

async fn cmd_errors(app: &App, since_hours: Option<i64>, out: Output) -> anyhow::Result<()> {
    let range = since_hours.map(TimeRange::last_hours);
    let summary = app.validator().get_validation_error_summary(range).await?;
    if out.emit_json(&summary)? {
        return Ok(());
    }
    if out.quiet {
        println!("{}", summary.uncorrected_errors);
        return Ok(());
    }

    println!("Validation Errors:");
    println!("  Total: {}", summary.total_errors);
    println!("  Uncorrected: {}", summary.uncorrected_errors);
    println!("  Auto-correctable: {}", summary.auto_correctable_errors);
    if !summary.errors_by_type.is_empty() {
        println!("  By type:");
        for (ty, count) in &summary.errors_by_type {
            println!("    {}: {}", ty, count);
        }
    }
    if !summary.errors_by_severity.is_empty() {
        println!("  By severity:");
        for (severity, count) in &summary.errors_by_severity {
            println!("    {}: {}", severity, count);
        }
    }
    if !summary.recent_errors.is_empty() {
        println!("\nRecent:");
        for record in &summary.recent_errors {
            let status = if record.is_corrected() { "fixed" } else { "open" };
            println!(
                "  {} [{}] {} {}: {}",
                short_id(&record.id),
                status,
                record.table_name,
                short_id(&record.record_id),
                record.error_message
            );
        }
    }
    Ok(())
}

async fn cmd_stats(app: &App, out: Output) -> anyhow::Result<()> {
    let stats = app.orchestrator().graph_stats().await?;
    if out.emit_json(&stats)? {
        return Ok(());
    }

    println!("Graph Statistics:");
    println!("  Entities: {}", stats.total_entities);
    println!("  Relationships: {}", stats.total_relationships);
    println!("  Aliases: {}", stats.total_aliases);
    println!("  Mentions: {}", stats.total_mentions);
    if out.quiet {
        return Ok(());
    }
    if !stats.entities_by_type.is_empty() {
        println!("  Entities by type:");
        for (ty, count) in &stats.entities_by_type {
            println!("    {}: {}", ty, count);
        }
    }
    if !stats.relationships_by_type.is_empty() {
        println!("  Relationships by type:");
        for (ty, count) in &stats.relationships_by_type {
            println!("    {}: {}", ty, count);
        }
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
            config.validate()?;
            config.save()?;
            if !out.quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            if out.json() {
                let map: std::collections::BTreeMap<_, _> = items.into_iter().collect();
                println!("{}", serde_json::to_string_pretty(&map)?);
            } else {
                for (key, value) in items {
                    println!("{} = {}", key, value);
                }
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
