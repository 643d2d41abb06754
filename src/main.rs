//! SmartTech Forecast Engine - AI-powered technology trend analysis
//!
//! Serves the forecast HTTP API, or analyzes a single query from the
//! terminal.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (configuration, bind failure, etc.)
//!   2 - One-shot analysis fell back to the placeholder result

mod analysis;
mod cli;
mod config;
mod error;
mod models;
mod report;
mod server;
mod store;

use analysis::{AgentConfig, ForecastAgent, QueryAnalyzer};
use anyhow::{Context, Result};
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use store::Database;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if args.init_config {
        return handle_init_config();
    }

    // A missing .env is normal.
    let _ = dotenvy::dotenv();

    init_logging(&args);

    info!("SmartTech Forecast Engine v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    let result = match args.query.clone() {
        Some(query) => run_query(&args, &query).await,
        None => run_server(&args).await.map(|_| 0),
    };

    match result {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Fatal: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default smarttech.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Set OPENAI_API_KEY in the environment or a .env file.");
    Ok(())
}

/// Initialize logging. `RUST_LOG` overrides the verbosity flags.
fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level().as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Load configuration from file or defaults, then environment and CLI.
fn load_config(args: &Args) -> Result<Config> {
    let mut config = if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        Config::load(config_path)?
    } else {
        match Config::load_default() {
            Ok(Some(config)) => {
                info!("Loaded default config from {}", CONFIG_FILE);
                config
            }
            Ok(None) => {
                debug!("No config file found, using defaults");
                Config::default()
            }
            Err(e) => {
                warn!("Failed to load config: {}", e);
                Config::default()
            }
        }
    };

    config.apply_env()?;
    config.merge_with_args(args);
    Ok(config)
}

fn build_agent(config: &Config) -> Result<ForecastAgent> {
    let agent = ForecastAgent::new(AgentConfig::from(&config.model))?;
    if agent.config().api_key.is_none() {
        warn!("OPENAI_API_KEY is not set; every analysis will return the placeholder result");
    }
    Ok(agent)
}

/// Run the HTTP service until shutdown.
async fn run_server(args: &Args) -> Result<()> {
    let config = load_config(args)?;
    let agent = build_agent(&config)?;

    let database = Arc::new(Database::new(config.database.path.clone()));
    info!("User database: {}", database.path());
    if config.auth.bearer_token.is_some() {
        info!("Bearer token required for analysis endpoints");
    }

    let state = server::AppState {
        analyzer: Arc::new(agent),
        database,
        bearer_token: config.auth.bearer_token.clone(),
        model_name: config.model.name.clone(),
        request_timeout: Duration::from_secs(config.server.request_timeout_seconds),
    };

    server::start_server(config.server.bind, state).await
}

/// Analyze one query and write the report. Returns the exit code.
async fn run_query(args: &Args, query: &str) -> Result<i32> {
    let config = load_config(args)?;

    if args.dry_run {
        return handle_dry_run(&config, query);
    }

    let agent = build_agent(&config)?;

    let spinner = if args.quiet {
        ProgressBar::hidden()
    } else {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(format!("Analyzing \"{}\" with {}", query, config.model.name));
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner
    };

    let analysis = agent.analyze(query).await;
    spinner.finish_and_clear();

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&analysis)?,
        OutputFormat::Markdown => report::generate_markdown_report(query, &analysis),
    };

    match args.output {
        Some(ref path) => {
            std::fs::write(path, &output)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!("✅ Report saved to: {}", path.display());
        }
        None => println!("{}", output),
    }

    if analysis.is_unavailable() {
        eprintln!("⛔ The model did not return a usable analysis (exit code 2).");
        return Ok(2);
    }

    Ok(0)
}

/// Handle --dry-run: print the request that would be sent.
fn handle_dry_run(config: &Config, query: &str) -> Result<i32> {
    println!("🔍 Dry run: no model call will be made.\n");
    println!("Model:    {}", config.model.name);
    println!("Endpoint: {}/chat/completions", config.model.api_base.trim_end_matches('/'));
    println!(
        "API key:  {}\n",
        if config.model.api_key.is_some() { "set" } else { "missing" }
    );
    println!("=== SYSTEM PROMPT ===\n{}\n", analysis::prompt::SYSTEM_PROMPT);
    println!("=== USER PROMPT ===\n{}\n", analysis::prompt::user_prompt(query));
    println!(
        "=== RESPONSE FORMAT ===\n{}",
        serde_json::to_string_pretty(&analysis::schema::response_format())?
    );
    Ok(0)
}
