//! Feed captured page snapshots into a cache and show what a model may receive.
//!
//! # Examples
//!
//! ```sh
//! # Insert three snapshots (oldest first) and allocate for a model
//! scrape-cache --model gpt-4o --url https://example.com/feed snap1.html snap2.html snap3.html
//!
//! # Small cache, truncate oversized captures, JSON output
//! scrape-cache --model gemini-2.5-flash --max-tokens 50000 --oversize truncate --json *.html
//!
//! # Custom model table
//! scrape-cache --config limits.json --model my-local-model page.html
//!
//! # Inspect limits
//! scrape-cache --list-models
//! scrape-cache --info gpt-4o-mini
//! scrape-cache --print-schema
//! ```

use clap::{Parser, ValueEnum};
use scrape_cache::prelude::*;
use std::path::PathBuf;
use std::process;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Feed captured page snapshots into a bounded cache and report the
/// allocation a model would receive.
#[derive(Parser)]
#[command(name = "scrape-cache")]
struct Cli {
    // ── Capture ────────────────────────────────────────────────
    /// Snapshot files to insert, oldest first
    files: Vec<PathBuf>,

    /// Page URL the snapshots belong to
    #[arg(long)]
    url: Option<String>,

    /// Model to allocate for
    #[arg(long)]
    model: Option<String>,

    // ── Configuration ──────────────────────────────────────────
    /// JSON configuration file (capacity, oversize policy, model table)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Cache capacity in estimated tokens (overrides --config)
    #[arg(long)]
    max_tokens: Option<u64>,

    /// Handling of a single capture larger than the whole cache
    #[arg(long, value_enum)]
    oversize: Option<OversizeArg>,

    // ── Inspection ─────────────────────────────────────────────
    /// List configured models and exit
    #[arg(long)]
    list_models: bool,

    /// Show limits for one model and exit
    #[arg(long)]
    info: Option<String>,

    /// Print the configuration JSON Schema and exit
    #[arg(long)]
    print_schema: bool,

    // ── Output ─────────────────────────────────────────────────
    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum OversizeArg {
    Accept,
    Reject,
    Truncate,
}

impl From<OversizeArg> for OversizePolicy {
    fn from(arg: OversizeArg) -> Self {
        match arg {
            OversizeArg::Accept => OversizePolicy::AcceptNewest,
            OversizeArg::Reject => OversizePolicy::Reject,
            OversizeArg::Truncate => OversizePolicy::Truncate,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.print_schema {
        print_json(&EngineConfig::json_schema());
        return;
    }

    let config = match build_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    if cli.list_models {
        list_models(&config.model_table(), cli.json);
        return;
    }

    if let Some(model_id) = &cli.info {
        match config.model_table().get_model_info(model_id) {
            Some(info) if cli.json => print_json(&info),
            Some(info) => print_model_info(&info),
            None => {
                let err = AllocationError::UnknownModel {
                    model_id: model_id.clone(),
                };
                eprintln!("Error: {err}");
                process::exit(2);
            }
        }
        return;
    }

    let Some(model_id) = cli.model.as_deref() else {
        eprintln!("Error: --model is required (or use --list-models / --info / --print-schema)");
        process::exit(1);
    };

    let mut session = ScrapeSession::new(&config);
    if let Some(url) = &cli.url {
        session.update_tracked_url(url.clone());
    }

    for path in &cli.files {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error: failed to read {}: {e}", path.display());
                process::exit(1);
            }
        };
        let result = session.insert(content, capture_metadata(path, cli.url.as_deref()));
        info!(
            file = %path.display(),
            outcome = ?result.outcome,
            evicted = result.evicted,
            items = result.item_count,
            tokens = result.tokens,
            "captured"
        );
    }

    let size = session.get_size();
    match session.allocate(model_id) {
        Ok(allocation) if cli.json => {
            print_json(&serde_json::json!({ "size": size, "allocation": allocation }));
        }
        Ok(allocation) => {
            println!("{}", size.to_log_string());
            println!("{}", allocation.to_log_string());
            if let Some(warning) = &allocation.warning {
                println!("warning: {warning}");
            }
        }
        Err(err) => {
            if cli.json {
                print_json(&err);
            } else {
                eprintln!("Error: {err}");
            }
            process::exit(2);
        }
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_config(cli: &Cli) -> Result<EngineConfig, String> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(max_tokens) = cli.max_tokens {
        config = config.with_max_tokens(max_tokens);
    }
    if let Some(oversize) = cli.oversize {
        config = config.with_oversize_policy(oversize.into());
    }
    Ok(config)
}

fn capture_metadata(path: &std::path::Path, url: Option<&str>) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("source".into(), path.display().to_string().into());
    if let Some(url) = url {
        metadata.insert("url".into(), url.into());
    }
    metadata
}

fn list_models(table: &ModelTable, json: bool) {
    let infos: Vec<ModelInfo> = table
        .iter()
        .filter_map(|(id, _)| table.get_model_info(id))
        .collect();
    if json {
        print_json(&infos);
        return;
    }
    for info in &infos {
        println!(
            "{:<24} {:<24} safe {:>9} tok/min  ({} KB){}",
            info.model_id,
            info.display_name,
            info.safe_tpm,
            info.max_kb,
            if info.send_all { "  [send-all]" } else { "" },
        );
    }
}

fn print_model_info(info: &ModelInfo) {
    println!("{} ({})", info.display_name, info.model_id);
    println!("  declared TPM: {}", info.declared_tpm);
    println!("  safe TPM:     {}", info.safe_tpm);
    println!("  RPM:          {}", info.rpm);
    println!("  max payload:  ~{} KB", info.max_kb);
    println!(
        "  strategy:     {}",
        if info.send_all { "send entire cache" } else { "budgeted" }
    );
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => {
            eprintln!("Error: failed to serialize output: {e}");
            process::exit(1);
        }
    }
}
