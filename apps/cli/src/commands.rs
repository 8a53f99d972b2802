//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use campusguide_core::pipeline::{CampusGuide, ProgressReporter};
use campusguide_shared::{
    AppConfig, IngestionOutcome, IngestionRequest, QueryRequest, Scope, ScopeRef, init_config,
    init_config_at, load_config, load_config_from,
};
use campusguide_storage::Storage;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::server;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Campus Guide: answer questions about campus buildings.
#[derive(Parser)]
#[command(
    name = "campusguide",
    version,
    about = "Crawl campus building pages into a keyword knowledge base and answer questions from it.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.campusguide/campusguide.toml).
    #[arg(long, global = true, env = "CAMPUSGUIDE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Crawl a building page and store its FAQ knowledge.
    Ingest {
        /// Scope (building) ID the knowledge belongs to.
        #[arg(long)]
        scope: String,

        /// Page URL to crawl.
        #[arg(long)]
        url: String,

        /// Display label passed to the extractor (defaults to the stored label).
        #[arg(long)]
        label: Option<String>,

        /// Append to existing knowledge instead of replacing it.
        #[arg(long)]
        merge: bool,
    },

    /// Ask a question about the campus.
    Ask {
        question: String,

        /// Scope (building) ID to search first.
        #[arg(long)]
        scope: Option<String>,

        /// Building name shown to the model.
        #[arg(long)]
        scope_label: Option<String>,

        /// Extra context for the model.
        #[arg(long)]
        context: Option<String>,
    },

    /// Manage scopes (buildings).
    Scope {
        #[command(subcommand)]
        action: ScopeAction,
    },

    /// Serve the HTTP API.
    Serve {
        /// Listen address (overrides server.bind).
        #[arg(long)]
        bind: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Scope subcommands.
#[derive(Subcommand)]
pub(crate) enum ScopeAction {
    /// Create a scope, or update its label and number.
    Add {
        id: String,
        label: String,

        /// Building number, shown as `{n}호관`.
        #[arg(long)]
        ordinal: Option<i64>,
    },
    /// List all scopes with their knowledge counts.
    List,
    /// Show a scope's knowledge and recent ingestions.
    Show { id: String },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "campusguide=info",
        1 => "campusguide=debug",
        _ => "campusguide=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Ingest {
            scope,
            url,
            label,
            merge,
        } => cmd_ingest(config_path, scope, url, label, merge).await,
        Command::Ask {
            question,
            scope,
            scope_label,
            context,
        } => cmd_ask(config_path, question, scope, scope_label, context).await,
        Command::Scope { action } => match action {
            ScopeAction::Add { id, label, ordinal } => {
                cmd_scope_add(config_path, &id, &label, ordinal).await
            }
            ScopeAction::List => cmd_scope_list(config_path).await,
            ScopeAction::Show { id } => cmd_scope_show(config_path, &id).await,
        },
        Command::Serve { bind } => cmd_serve(config_path, bind.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(p) => Ok(load_config_from(p)?),
        None => Ok(load_config()?),
    }
}

async fn open_storage(config: &AppConfig) -> Result<Storage> {
    Ok(Storage::open(&config.database.resolved_path()?).await?)
}

// ---------------------------------------------------------------------------
// Pipelines
// ---------------------------------------------------------------------------

async fn cmd_ingest(
    config_path: Option<&Path>,
    scope: String,
    url: String,
    label: Option<String>,
    merge: bool,
) -> Result<()> {
    let config = resolve_config(config_path)?;
    let guide = CampusGuide::from_config(&config).await?;

    let request = IngestionRequest {
        scope_id: scope,
        scope_label: label,
        url,
        replace_existing: !merge,
    };
    info!(
        scope_id = %request.scope_id,
        url = %request.url,
        replace = request.replace_existing,
        "ingesting building page"
    );

    let reporter = CliProgress::new();
    let outcome = match guide.ingest(&request, &reporter).await {
        Ok(outcome) => outcome,
        Err(e) => {
            reporter.spinner.abandon_with_message("Ingestion failed");
            return Err(e.into());
        }
    };

    let stored = guide.storage().count_knowledge(&outcome.scope_id).await?;

    println!();
    println!("  Ingestion complete!");
    println!("  Scope:     {}", outcome.scope_id);
    println!("  Extracted: {}", outcome.faq_count);
    println!("  Mode:      {}", if merge { "merge" } else { "replace" });
    println!("  Stored:    {stored}");
    println!();

    Ok(())
}

async fn cmd_ask(
    config_path: Option<&Path>,
    question: String,
    scope: Option<String>,
    scope_label: Option<String>,
    context: Option<String>,
) -> Result<()> {
    if question.trim().is_empty() {
        return Err(eyre!("question must not be empty"));
    }

    let config = resolve_config(config_path)?;
    let guide = CampusGuide::from_config(&config).await?;

    let request = QueryRequest {
        question,
        scope_id: scope.map(ScopeRef::Text),
        scope_label,
        context,
    };
    let answer = guide.ask(&request).await?;
    println!("{}", answer.answer);
    Ok(())
}

async fn cmd_serve(config_path: Option<&Path>, bind: Option<&str>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let guide = Arc::new(CampusGuide::from_config(&config).await?);
    let bind = bind.unwrap_or(&config.server.bind);
    server::serve(guide, bind, &config.server.cors_origin).await
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _outcome: &IngestionOutcome) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Scopes
// ---------------------------------------------------------------------------

async fn cmd_scope_add(
    config_path: Option<&Path>,
    id: &str,
    label: &str,
    ordinal: Option<i64>,
) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = open_storage(&config).await?;

    let scope = Scope {
        id: id.trim().to_string(),
        label: label.trim().to_string(),
        ordinal,
    };
    storage.upsert_scope(&scope).await?;
    info!(scope_id = %scope.id, "scope saved");
    println!("Saved scope {} ({})", scope.id, scope.location_label());
    Ok(())
}

async fn cmd_scope_list(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = open_storage(&config).await?;

    let scopes = storage.list_scopes().await?;
    if scopes.is_empty() {
        println!("No scopes yet. Add one with `campusguide scope add <id> <label>`.");
        return Ok(());
    }

    println!("  {:<12} {:<28} {:>8}", "ID", "LOCATION", "RECORDS");
    for scope in &scopes {
        let count = storage.count_knowledge(&scope.id).await?;
        println!("  {:<12} {:<28} {:>8}", scope.id, scope.location_label(), count);
    }
    Ok(())
}

async fn cmd_scope_show(config_path: Option<&Path>, id: &str) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = open_storage(&config).await?;

    let scope = storage
        .get_scope(id)
        .await?
        .ok_or_else(|| eyre!("unknown scope '{id}'"))?;

    println!();
    println!("  {} ({})", scope.location_label(), scope.id);
    println!();

    let records = storage.list_knowledge(&scope.id).await?;
    if records.is_empty() {
        println!("  No knowledge stored.");
    }
    for record in &records {
        println!("  - {}: {}", record.keyword, record.answer);
    }

    let jobs = storage.list_ingest_jobs(&scope.id).await?;
    if !jobs.is_empty() {
        println!();
        println!("  Recent ingestions:");
        for job in jobs.iter().take(5) {
            let detail = match (&job.error, job.faq_count) {
                (Some(err), _) => err.clone(),
                (None, Some(n)) => format!("{n} extracted"),
                (None, None) => String::new(),
            };
            println!(
                "  {}  {:<9} {}  {}",
                job.started_at.format("%Y-%m-%d %H:%M"),
                job.status.as_str(),
                job.url,
                detail
            );
        }
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn cmd_config_init(config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(p) => {
            init_config_at(p)?;
            p.to_path_buf()
        }
        None => init_config()?,
    };
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
