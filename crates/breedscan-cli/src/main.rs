use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use breedscan_contracts::breeds::{Breed, BreedType};
use breedscan_contracts::events::EventLog;
use breedscan_contracts::recognition::{format_confidence, HistoryRecord, RecognitionResult};
use breedscan_contracts::RecognitionError;
use breedscan_engine::normalizer;
use breedscan_engine::{
    default_provider_registry, BreedQuery, BreedRecognizer, BreedStore, EngineConfig, MemoryStore,
    RestStore, StoreConfig,
};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "breedscan",
    version,
    about = "Identify Indian cattle and buffalo breeds from photos"
)]
struct Cli {
    /// Read breeds from a local JSON file instead of the hosted database.
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,
    /// Vision provider: gemini or dryrun.
    #[arg(long, global = true, default_value = "gemini")]
    provider: String,
    /// Append lifecycle events to this JSONL file.
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    /// Emit diagnostic logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Identify(IdentifyArgs),
    Breeds(BreedsArgs),
    History(HistoryArgs),
    Normalize(NormalizeArgs),
    Status,
}

#[derive(Debug, Parser)]
struct IdentifyArgs {
    /// Image file, or a `data:image/...;base64,` URL.
    #[arg(long)]
    image: String,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    user: Option<String>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Parser)]
struct BreedsArgs {
    #[arg(long = "type")]
    breed_type: Option<BreedType>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Parser)]
struct HistoryArgs {
    #[arg(long, default_value_t = 10)]
    limit: usize,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Parser)]
struct NormalizeArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    out: PathBuf,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("breedscan error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match &cli.command {
        Command::Identify(args) => run_identify(&cli, args),
        Command::Breeds(args) => run_breeds(&cli, args),
        Command::History(args) => run_history(&cli, args),
        Command::Normalize(args) => run_normalize(args),
        Command::Status => run_status(&cli),
    }
}

fn init_tracing(json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("breedscan=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn open_store(catalog: Option<&Path>) -> Result<Arc<dyn BreedStore>> {
    match catalog {
        Some(path) => Ok(Arc::new(MemoryStore::from_json_file(path)?)),
        None => {
            let config = StoreConfig::from_env()?;
            Ok(Arc::new(RestStore::new(&config)))
        }
    }
}

fn build_recognizer(cli: &Cli, model: Option<&str>) -> Result<BreedRecognizer> {
    let config = EngineConfig::from_env()?;
    let mut providers = default_provider_registry(&config);
    let Some(provider) = providers.take(&cli.provider) else {
        bail!(
            "unknown provider '{}' (available: {})",
            cli.provider,
            providers.names().join(", ")
        );
    };
    let store = open_store(cli.catalog.as_deref())?;
    let model = model
        .map(str::to_string)
        .unwrap_or_else(|| config.model.clone());
    let recognizer = BreedRecognizer::new(store, provider, model)
        .with_history_policy(config.history_policy);
    match &cli.events {
        Some(path) => recognizer.with_events(EventLog::with_new_session(path)),
        None => Ok(recognizer),
    }
}

fn run_identify(cli: &Cli, args: &IdentifyArgs) -> Result<i32> {
    let mut recognizer =
        build_recognizer(cli, args.model.as_deref())?.with_user(args.user.clone());
    info!(
        provider = recognizer.provider_name(),
        model = recognizer.model(),
        store = recognizer.store_name(),
        "identifying breed"
    );

    let outcome = if args.image.starts_with("data:") {
        recognizer.identify_data_url(&args.image)
    } else {
        recognizer.identify_file(Path::new(&args.image))
    };
    let result = match outcome {
        Ok(result) => result,
        Err(RecognitionError::ConfigurationMissing) => {
            eprintln!("API key required: {}", RecognitionError::ConfigurationMissing);
            return Ok(2);
        }
        Err(err) => return Err(err.into()),
    };

    let mut stdout = io::stdout().lock();
    if args.json {
        writeln!(stdout, "{}", serde_json::to_string_pretty(&result)?)?;
    } else {
        write!(stdout, "{}", render_result(&result))?;
    }
    Ok(0)
}

fn run_breeds(cli: &Cli, args: &BreedsArgs) -> Result<i32> {
    let store = open_store(cli.catalog.as_deref())?;
    let breeds = store.fetch_breeds(BreedQuery::listing(args.breed_type))?;
    let mut stdout = io::stdout().lock();
    if args.json {
        writeln!(stdout, "{}", serde_json::to_string_pretty(&breeds)?)?;
        return Ok(0);
    }
    if breeds.is_empty() {
        writeln!(stdout, "No breeds found.")?;
    }
    for breed in &breeds {
        writeln!(stdout, "{}", breed_line(breed))?;
    }
    Ok(0)
}

fn run_history(cli: &Cli, args: &HistoryArgs) -> Result<i32> {
    let store = open_store(cli.catalog.as_deref())?;
    let rows = store
        .recent_history(args.limit)
        .context("failed reading recognition history")?;
    let mut stdout = io::stdout().lock();
    if args.json {
        writeln!(stdout, "{}", serde_json::to_string_pretty(&rows)?)?;
        return Ok(0);
    }
    if rows.is_empty() {
        writeln!(stdout, "No recognitions recorded yet.")?;
    }
    for row in &rows {
        writeln!(stdout, "{}", history_line(row))?;
    }
    Ok(0)
}

fn run_normalize(args: &NormalizeArgs) -> Result<i32> {
    let image = normalizer::normalize_file(&args.image)?;
    if let Some(parent) = args.out.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed creating {}", parent.display()))?;
        }
    }
    fs::write(&args.out, image.decoded_bytes()?)
        .with_context(|| format!("failed writing {}", args.out.display()))?;
    println!(
        "{} ({}x{}, {})",
        args.out.display(),
        image.width,
        image.height,
        image.mime_type
    );
    Ok(0)
}

fn run_status(cli: &Cli) -> Result<i32> {
    let config = EngineConfig::from_env()?;
    let store_line = match (&cli.catalog, StoreConfig::from_env()) {
        (Some(path), _) => format!("local catalog {}", path.display()),
        (None, Ok(store)) => format!("configured ({})", store.url),
        (None, Err(err)) => format!("not configured: {err}"),
    };
    let status = json!({
        "provider": cli.provider,
        "model": config.model,
        "api_key_configured": config.api_key_configured(),
        "history_policy": config.history_policy.as_str(),
        "store": store_line,
    });
    println!("{}", serde_json::to_string_pretty(&status)?);
    if cli.provider == "gemini" && !config.api_key_configured() {
        eprintln!("API key required: {}", RecognitionError::ConfigurationMissing);
        return Ok(2);
    }
    Ok(0)
}

fn render_result(result: &RecognitionResult) -> String {
    let breed = &result.breed;
    let mut out = String::new();
    out.push_str(&format!(
        "{} ({}) {}% confidence\n",
        breed.name,
        breed.breed_type,
        format_confidence(result.confidence)
    ));
    if let Some(primary_use) = breed.primary_use {
        out.push_str(&format!("  Primary use: {primary_use}\n"));
    }
    if let Some(origin) = breed.origin_state.as_deref() {
        out.push_str(&format!("  Origin: {origin}\n"));
    }
    if let Some(milk) = breed.average_milk_yield.as_deref() {
        out.push_str(&format!("  Average milk yield: {milk}\n"));
    }
    if let Some(description) = breed.description.as_deref() {
        out.push_str(&format!("  {description}\n"));
    }
    if !breed.characteristics.is_empty() {
        out.push_str("  Characteristics:\n");
        for (key, value) in &breed.characteristics {
            out.push_str(&format!("    {}: {value}\n", humanize_key(key)));
        }
    }
    if !result.reasoning.trim().is_empty() {
        out.push_str(&format!("  Why: {}\n", result.reasoning.trim()));
    }
    if !result.alternatives.is_empty() {
        out.push_str("  Other possible matches:\n");
        for alt in &result.alternatives {
            out.push_str(&format!(
                "    {} ({}) {}%\n",
                alt.breed.name,
                alt.breed.breed_type,
                format_confidence(alt.confidence)
            ));
        }
    }
    out
}

fn breed_line(breed: &Breed) -> String {
    let mut line = format!("{} [{}]", breed.name, breed.breed_type);
    if let Some(origin) = breed.origin_state.as_deref() {
        line.push_str(&format!(" {origin}"));
    }
    if let Some(primary_use) = breed.primary_use {
        line.push_str(&format!(", {primary_use}"));
    }
    line
}

fn history_line(row: &HistoryRecord) -> String {
    format!(
        "{}  {}  {}%",
        row.recognition_date.as_deref().unwrap_or("-"),
        row.breed_id.as_deref().unwrap_or("-"),
        row.confidence_score
            .map(format_confidence)
            .unwrap_or_else(|| "-".to_string())
    )
}

fn humanize_key(key: &str) -> String {
    key.replace('_', " ")
}
