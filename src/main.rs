use anyhow::Context;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use ticketscope::cli::{Cli, Commands, ConfigAction};
use ticketscope::config::{expand_home, Config, ConfigValidator};
use ticketscope::embedding::FastEmbedProvider;
use ticketscope::error::{Result, TicketscopeError};
use ticketscope::evidence::{
    extract_from_capture, parse_query_url, Capture, CaptureOptions, UrlResolver,
};
use ticketscope::retrieval::{render_context, IndexReport, PageExportSource, RetrievalEngine};
use ticketscope::triage::{Attachment, Ticket, Triage};

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    let config_path = cli.config;
    let profile = cli.profile;

    match cli.command {
        Commands::Index {
            root,
            collection,
            max_files,
            json,
        } => {
            let config = load_config(config_path, profile)?;
            cmd_index(&config, root, collection, max_files, json)?;
        }
        Commands::IndexWiki {
            export,
            collection,
            json,
        } => {
            let config = load_config(config_path, profile)?;
            cmd_index_wiki(&config, export, collection, json)?;
        }
        Commands::Query {
            question,
            collection,
            top_k,
            json,
        } => {
            let config = load_config(config_path, profile)?;
            cmd_query(&config, &question, collection, top_k, json)?;
        }
        Commands::Har { file, all } => {
            let config = load_config(config_path, profile)?;
            cmd_har(&config, &file, all)?;
        }
        Commands::SearchUrl { url, now } => {
            let config = load_config(config_path, profile)?;
            cmd_search_url(&config, &url, parse_now(now)?)?;
        }
        Commands::Triage {
            ticket,
            captures,
            now,
        } => {
            let config = load_config(config_path, profile)?;
            cmd_triage(&config, &ticket, captures, parse_now(now)?)?;
        }
        Commands::Config { action } => {
            cmd_config(config_path, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "ticketscope=debug"
    } else {
        "ticketscope=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn open_engine(config: &Config, collection: &str) -> Result<RetrievalEngine> {
    let provider = FastEmbedProvider::new(&config.embedding.model)?;
    RetrievalEngine::open(config, collection, Arc::new(provider))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| TicketscopeError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })?;
    println!("{}", json);
    Ok(())
}

fn print_report(collection: &str, report: &IndexReport, json: bool) -> Result<()> {
    if json {
        return print_json(report);
    }
    println!("✓ Indexed collection '{}'", collection);
    println!(
        "  Documents: {} ({} unreadable)",
        report.documents, report.unreadable
    );
    println!(
        "  Chunks: {} total, {} embedded, {} unchanged",
        report.chunks_total, report.chunks_embedded, report.chunks_unchanged
    );
    println!("  Took: {} ms", report.duration_ms);
    Ok(())
}

fn cmd_index(
    config: &Config,
    root: Option<PathBuf>,
    collection: Option<String>,
    max_files: Option<usize>,
    json: bool,
) -> Result<()> {
    let collection = collection.unwrap_or_else(|| config.codebase.collection.clone());
    let root = expand_home(&root.unwrap_or_else(|| config.codebase.root.clone()))?;

    let engine = open_engine(config, &collection)?;
    let report = engine.index_tree(
        &root,
        &config.codebase.include_patterns,
        &config.codebase.exclude_dirs,
        max_files,
    )?;
    print_report(&collection, &report, json)
}

fn cmd_index_wiki(
    config: &Config,
    export: Option<PathBuf>,
    collection: Option<String>,
    json: bool,
) -> Result<()> {
    let export = export
        .or_else(|| config.wiki.export_file.clone())
        .ok_or_else(|| {
            TicketscopeError::Config(
                "No wiki export given and wiki.export_file is not set".to_string(),
            )
        })?;
    let export = expand_home(&export)?;
    let collection = collection.unwrap_or_else(|| config.wiki.collection.clone());

    let engine = open_engine(config, &collection)?;
    let report = engine.index_source(&PageExportSource::new(&export))?;
    print_report(&collection, &report, json)
}

fn cmd_query(
    config: &Config,
    question: &str,
    collection: Option<String>,
    top_k: Option<usize>,
    json: bool,
) -> Result<()> {
    let collection = collection.unwrap_or_else(|| config.codebase.collection.clone());
    let top_k = top_k.unwrap_or(config.index.default_top_k);

    let engine = open_engine(config, &collection)?;
    let outcome = engine.query(question, top_k)?;

    if json {
        print_json(&outcome)
    } else {
        println!("{}", render_context(&outcome));
        Ok(())
    }
}

fn cmd_har(config: &Config, file: &Path, all: bool) -> Result<()> {
    let capture = Capture::from_path(file)?;
    let mut options = CaptureOptions::from(&config.triage);
    if all {
        options.errors_only = false;
    }
    print_json(&extract_from_capture(&capture, &options))
}

fn cmd_search_url(config: &Config, url: &str, now: DateTime<Utc>) -> Result<()> {
    let full_url = if url.contains(&config.url_resolution.short_path) {
        let resolver = UrlResolver::from_config(&config.url_resolution)?;
        match resolver.resolve_short_url(url, &config.log_search.cookies)? {
            Some(resolved) => resolved,
            None => {
                println!("✗ Could not resolve {}", url);
                println!("  The link may need fresh cookies in log_search.cookies");
                return Ok(());
            }
        }
    } else {
        url.to_string()
    };

    let Some(partial) = parse_query_url(&full_url, &config.log_search) else {
        println!("✗ Not a log-search URL with search state: {}", full_url);
        return Ok(());
    };

    print_json(&partial)?;
    match partial.complete(now) {
        Some(params) => print_json(&params),
        None => {
            println!("✗ Search is incomplete: a query and a start time are required");
            Ok(())
        }
    }
}

fn cmd_triage(
    config: &Config,
    ticket_path: &Path,
    captures: Vec<PathBuf>,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut ticket = Ticket::from_path(ticket_path)?;
    for path in captures {
        ticket = ticket.with_attachment(Attachment::Capture { path });
    }

    let triage = Triage::from_config(config)?;
    let report = triage.run(&ticket, now)?;
    print_json(&report)
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path, None)?;
            let value = serde_json::to_value(&config).map_err(|e| TicketscopeError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;

            match section {
                Some(section) => {
                    let part = value.get(&section).ok_or_else(|| {
                        TicketscopeError::Config(format!("Unknown config section: {}", section))
                    })?;
                    print_json(part)?;
                }
                None => print_json(&value)?,
            }
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            ConfigValidator::validate(&config)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| TicketscopeError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'ticketscope config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        ConfigValidator::validate(&config)?;
        return Ok(config);
    }

    match profile {
        Some(profile) => Config::load_with_profile(&path, &profile),
        None => Config::load(&path),
    }
}

fn parse_now(now: Option<String>) -> Result<DateTime<Utc>> {
    match now {
        Some(value) => {
            let parsed = DateTime::parse_from_rfc3339(&value)
                .with_context(|| format!("--now must be an RFC 3339 timestamp, got '{}'", value))?;
            Ok(parsed.with_timezone(&Utc))
        }
        None => Ok(Utc::now()),
    }
}
