use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use pdftables_core::config_file::{load_config, read_config};
use pdftables_core::pool::ExtractionPool;
use pdftables_core::ocr::TesseractOcr;
use pdftables_core::{ExtractionConfig, PdfBackend, PrivilegeTier, TableExtractor};
use pdftables_mupdf::MupdfBackend;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod output;

use output::ColorMode;

/// PDF table extractor - find tables in PDFs and score how trustworthy they are
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML config file (default: .pdftables.toml, then the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract tables from a single PDF
    Extract {
        /// Path to the PDF file
        file_path: PathBuf,

        /// Caller tier: free or paid (paid enables OCR for scanned documents)
        #[arg(long)]
        tier: Option<PrivilegeTier>,

        /// Mean confidence a strategy must reach to win
        #[arg(long)]
        threshold: Option<f64>,

        /// Time budget for the whole cascade, in seconds
        #[arg(long)]
        budget_secs: Option<f64>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Extract tables from many PDFs concurrently
    Batch {
        /// Paths to the PDF files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Number of concurrent workers
        #[arg(long)]
        workers: Option<usize>,

        /// Caller tier: free or paid
        #[arg(long)]
        tier: Option<PrivilegeTier>,

        /// Print one JSON object per file
        #[arg(long)]
        json: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Show which strategy would be tried first
    Select {
        /// Path to the PDF file
        file_path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Extract {
            file_path,
            tier,
            threshold,
            budget_secs,
            json,
            no_color,
        } => {
            let config = resolve_config(cli.config.as_deref(), threshold, budget_secs)?;
            extract(file_path, resolve_tier(tier)?, config, json, ColorMode(!no_color)).await
        }
        Command::Batch {
            files,
            workers,
            tier,
            json,
            no_color,
        } => {
            let mut config = resolve_config(cli.config.as_deref(), None, None)?;
            if let Some(n) = workers {
                config.pool.num_workers = n.max(1);
            }
            batch(files, resolve_tier(tier)?, config, json, ColorMode(!no_color)).await
        }
        Command::Select { file_path } => {
            let config = resolve_config(cli.config.as_deref(), None, None)?;
            select(&file_path, config)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve configuration: CLI flags > env vars > config file > defaults
fn resolve_config(
    config_path: Option<&Path>,
    threshold: Option<f64>,
    budget_secs: Option<f64>,
) -> anyhow::Result<ExtractionConfig> {
    let file = match config_path {
        Some(path) => read_config(path)?,
        None => load_config(),
    };
    let mut config = ExtractionConfig::default().apply_file(&file);

    if let Some(t) = threshold.or_else(|| env_parse("PDFTABLES_THRESHOLD")) {
        if !(0.0..=1.0).contains(&t) {
            anyhow::bail!("threshold must be between 0 and 1, got {}", t);
        }
        config.confidence_threshold = t;
    }
    if let Some(secs) = budget_secs.or_else(|| env_parse("PDFTABLES_BUDGET_SECS")) {
        if !secs.is_finite() || secs <= 0.0 {
            anyhow::bail!("time budget must be a positive number of seconds, got {}", secs);
        }
        config.time_budget = Duration::from_secs_f64(secs);
    }
    Ok(config)
}

fn env_parse(var: &str) -> Option<f64> {
    let value = std::env::var(var).ok()?;
    match value.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("ignoring {}={:?}: not a number", var, value);
            None
        }
    }
}

fn resolve_tier(flag: Option<PrivilegeTier>) -> anyhow::Result<PrivilegeTier> {
    if let Some(tier) = flag {
        return Ok(tier);
    }
    match std::env::var("PDFTABLES_TIER") {
        Ok(value) => value.parse().map_err(|e: String| anyhow::anyhow!(e)),
        Err(_) => Ok(PrivilegeTier::Free),
    }
}

fn build_extractor(config: ExtractionConfig, tier: PrivilegeTier) -> Arc<TableExtractor> {
    let backend: Arc<dyn PdfBackend> = Arc::new(MupdfBackend::new());
    if tier.allows_ocr() && !TesseractOcr::new(backend.clone(), config.ocr.clone()).tools_available() {
        tracing::warn!("pdftoppm or tesseract not found on PATH, scanned documents will not be OCRed");
    }
    Arc::new(TableExtractor::with_backend(backend, config))
}

/// Cancel `token` on Ctrl+C.
fn cancel_on_ctrl_c(token: &CancellationToken) {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

async fn extract(
    file_path: PathBuf,
    tier: PrivilegeTier,
    config: ExtractionConfig,
    json: bool,
    color: ColorMode,
) -> anyhow::Result<()> {
    if !file_path.exists() {
        anyhow::bail!("File not found: {}", file_path.display());
    }
    let file_name = display_name(&file_path);
    let extractor = build_extractor(config, tier);
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);

    let result = tokio::task::spawn_blocking({
        let extractor = extractor.clone();
        let cancel = cancel.clone();
        move || extractor.extract(&file_path, tier, Some(&cancel))
    })
    .await??;

    let mut writer = std::io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut writer, &result)?;
        writeln!(writer)?;
    } else {
        output::print_result(&mut writer, &file_name, &result, color)?;
    }
    Ok(())
}

async fn batch(
    files: Vec<PathBuf>,
    tier: PrivilegeTier,
    config: ExtractionConfig,
    json: bool,
    color: ColorMode,
) -> anyhow::Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};

    let pool_settings = config.pool.clone();
    let extractor = build_extractor(config, tier);
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);
    let pool = ExtractionPool::new(extractor, cancel, &pool_settings);

    let bar = ProgressBar::new(files.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.green/dim}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    let mut receivers = Vec::with_capacity(files.len());
    for path in &files {
        receivers.push(pool.submit_path(path.clone(), tier).await);
    }

    let mut results = Vec::with_capacity(files.len());
    for (path, rx) in files.iter().zip(receivers) {
        let name = display_name(path);
        bar.set_message(name.clone());
        let result = rx
            .await
            .map_err(|_| anyhow::anyhow!("worker dropped the job for {}", path.display()))?;
        bar.inc(1);
        results.push((name, result));
    }
    bar.finish_and_clear();
    pool.shutdown().await;

    let mut writer = std::io::stdout().lock();
    for (name, result) in &results {
        if json {
            let value = match result {
                Ok(aggregate) => serde_json::json!({ "file": name, "result": aggregate }),
                Err(e) => serde_json::json!({ "file": name, "error": e.to_string() }),
            };
            writeln!(writer, "{}", value)?;
        } else {
            output::print_batch_line(&mut writer, name, result, color)?;
        }
    }
    if !json {
        output::print_batch_summary(&mut writer, &results, color)?;
    }
    Ok(())
}

fn select(file_path: &Path, config: ExtractionConfig) -> anyhow::Result<()> {
    if !file_path.exists() {
        anyhow::bail!("File not found: {}", file_path.display());
    }
    let backend: Arc<dyn PdfBackend> = Arc::new(MupdfBackend::new());
    let ordering = TableExtractor::with_backend(backend, config).ordering(file_path);

    let mut writer = std::io::stdout().lock();
    output::print_selection(&mut writer, &display_name(file_path), &ordering)?;
    Ok(())
}
