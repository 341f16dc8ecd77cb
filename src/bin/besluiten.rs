//! CLI binary for verkeersbesluit-ingest.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `IngestConfig` and prints the ingested records.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use verkeersbesluit_ingest::pipeline::encode::encode_png;
use verkeersbesluit_ingest::{
    AttachmentStatus, DocumentRecord, Fetcher, ImageClassifier, IngestConfig,
    IngestProgressCallback, Ingestor, PageRenderer, PdfMaterializer, PdfiumRenderer,
    ProgressCallback, RecordError, VisionClassifier,
};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar over the day's search records. Records may finish out
/// of order when `--concurrency` is above 1.
struct CliProgressCallback {
    bar: ProgressBar,
    skipped: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Searching");
        bar.set_message("querying repository…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            skipped: AtomicUsize::new(0),
        })
    }
}

impl IngestProgressCallback for CliProgressCallback {
    fn on_run_start(&self, date: &str, total_records: usize) {
        self.bar.set_length(total_records as u64);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} records  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_prefix("Fetching");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{total_records} records published on {date}"))
        ));
    }

    fn on_record_complete(&self, index: usize, total: usize, id: &str, image_count: usize) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {:<28}  {}",
            green("✓"),
            index,
            total,
            id,
            dim(&format!("{image_count} images")),
        ));
        self.bar.inc(1);
    }

    fn on_record_skipped(&self, index: usize, total: usize, reason: &RecordError) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}",
            yellow("–"),
            index,
            total,
            dim(&reason.to_string()),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_records: usize, kept: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} of {} records kept  ({} skipped)",
            green("✔"),
            bold(&kept.to_string()),
            total_records,
            self.skipped.load(Ordering::SeqCst),
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Ingest one day and print a summary
  besluiten fetch 2024-05-01

  # Full records as JSON, attachments stored under ./public/afbeeldingen
  besluiten fetch 2024-05-01 --json --images-dir public/afbeeldingen > besluiten.json

  # Skip PDF attachments (no vision provider needed)
  besluiten fetch 2024-05-01 --no-materialize

  # Check what the classifier makes of an image or a PDF's first page
  besluiten classify bijlage.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium if it is not on the library path
"#;

/// Ingest Dutch traffic decisions from the official-publications repository.
#[derive(Parser, Debug)]
#[command(
    name = "besluiten",
    version,
    about = "Ingest Dutch traffic decisions (verkeersbesluiten) for a given day",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "BESLUITEN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "BESLUITEN_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest every traffic decision published on DATE (YYYY-MM-DD).
    Fetch(FetchArgs),
    /// Classify a PNG/JPEG image, or the first page of a PDF.
    Classify(ClassifyArgs),
}

#[derive(Args, Debug)]
struct FetchArgs {
    /// Publication day, YYYY-MM-DD.
    date: String,

    /// Print the records as JSON instead of a summary.
    #[arg(long, env = "BESLUITEN_JSON")]
    json: bool,

    /// Write the JSON records to this file.
    #[arg(short, long, env = "BESLUITEN_OUTPUT")]
    output: Option<PathBuf>,

    /// Leave PDF attachments unresolved.
    #[arg(long, env = "BESLUITEN_NO_MATERIALIZE")]
    no_materialize: bool,

    /// Directory for stored attachment images.
    #[arg(long, env = "BESLUITEN_IMAGES_DIR")]
    images_dir: Option<PathBuf>,

    /// Rendering DPI (72–400).
    #[arg(long, env = "BESLUITEN_DPI",
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: Option<u32>,

    /// Records processed concurrently. Requests stay throttled.
    #[arg(short, long, env = "BESLUITEN_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Minimum spacing between requests, in seconds.
    #[arg(long, env = "BESLUITEN_REQUEST_DELAY")]
    request_delay: Option<f64>,

    #[command(flatten)]
    llm: LlmArgs,
}

#[derive(Args, Debug)]
struct ClassifyArgs {
    /// Image or PDF file.
    input: PathBuf,

    #[command(flatten)]
    llm: LlmArgs,
}

#[derive(Args, Debug)]
struct LlmArgs {
    /// Vision model ID (e.g. gpt-4.1-nano).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Vision provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Confidence a map/aerial-photo verdict needs to be kept.
    #[arg(long, env = "BESLUITEN_MIN_CONFIDENCE")]
    min_confidence: Option<f32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless verbose logging is asked for.
    let show_progress = match &cli.command {
        Command::Fetch(args) => !cli.quiet && !args.json,
        Command::Classify(_) => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Fetch(ref args) => fetch(args, show_progress, cli.quiet).await,
        Command::Classify(ref args) => classify(args).await,
    }
}

async fn fetch(args: &FetchArgs, show_progress: bool, quiet: bool) -> Result<()> {
    let config = build_config(args)?;
    let fetcher = Arc::new(Fetcher::new(config.retry_policy()).context("Failed to build HTTP client")?);

    let materializer = if args.no_materialize {
        None
    } else {
        Some(
            PdfMaterializer::from_config(&config, Arc::clone(&fetcher))
                .context("Failed to set up PDF attachment handling (try --no-materialize)")?,
        )
    };

    let mut ingestor = Ingestor::with_fetcher(config, fetcher);
    if let Some(materializer) = materializer {
        ingestor = ingestor.with_materializer(materializer);
    }
    if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new();
        ingestor = ingestor.with_progress(cb);
    }

    let records = ingestor
        .run_and_materialize(&args.date)
        .await
        .with_context(|| format!("Ingestion for {} failed", args.date))?;

    if let Some(ref path) = args.output {
        let json = serde_json::to_vec_pretty(&records).context("Failed to serialise records")?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        if !quiet {
            eprintln!(
                "{}  {} records  →  {}",
                green("✔"),
                records.len(),
                bold(&path.display().to_string())
            );
        }
    } else if args.json {
        let json = serde_json::to_string_pretty(&records).context("Failed to serialise records")?;
        println!("{json}");
    } else if !quiet {
        print_summary(&records)?;
    }

    Ok(())
}

fn print_summary(records: &[DocumentRecord]) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    for record in records {
        let attachment = match &record.attachment {
            None => dim("no attachment"),
            Some(AttachmentStatus::Pending) => yellow("attachment pending"),
            Some(AttachmentStatus::Saved { path }) => green(path),
            Some(AttachmentStatus::Rejected { label, confidence }) => {
                dim(&format!("attachment rejected ({label} {confidence:.2})"))
            }
            Some(AttachmentStatus::Unavailable { reason }) => {
                dim(&format!("attachment unavailable: {reason}"))
            }
        };
        writeln!(
            handle,
            "{:<28}  {:>2} images  {}",
            record.id,
            record.images.len(),
            attachment
        )
        .context("Failed to write to stdout")?;
    }
    Ok(())
}

async fn classify(args: &ClassifyArgs) -> Result<()> {
    let bytes = tokio::fs::read(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input.display()))?;

    let mut builder = IngestConfig::builder();
    builder = apply_llm_args(builder, &args.llm);
    let config = builder.build().context("Invalid configuration")?;

    let image = if bytes.starts_with(b"%PDF") {
        let renderer = PdfiumRenderer::new(config.max_rendered_pixels);
        let dpi = config.dpi;
        let page = tokio::task::spawn_blocking(move || renderer.render_first_page(&bytes, dpi))
            .await
            .context("Render task panicked")?
            .context("Failed to render PDF")?;
        let Some(page) = page else {
            bail!("{} has no pages", args.input.display());
        };
        encode_png(&page).context("Failed to encode rendered page")?
    } else {
        bytes
    };

    let classifier = VisionClassifier::from_config(&config).context("No vision provider")?;
    let verdict = classifier
        .classify(&image)
        .await
        .context("Classification failed")?;

    println!(
        "{}  {} ({:.2})",
        if verdict.is_target_class {
            green("keep")
        } else {
            yellow("skip")
        },
        verdict.label,
        verdict.confidence
    );
    Ok(())
}

/// Map CLI args to `IngestConfig`.
fn build_config(args: &FetchArgs) -> Result<IngestConfig> {
    let mut builder = IngestConfig::builder();

    if let Some(ref dir) = args.images_dir {
        builder = builder.images_dir(dir.clone());
    }
    if let Some(dpi) = args.dpi {
        builder = builder.dpi(dpi);
    }
    if let Some(n) = args.concurrency {
        builder = builder.concurrency(n);
    }
    if let Some(secs) = args.request_delay {
        builder = builder.request_delay(request_delay(secs)?);
    }
    builder = apply_llm_args(builder, &args.llm);

    builder.build().context("Invalid configuration")
}

/// `--request-delay` seconds as a `Duration`; rejects negative, NaN and
/// out-of-range values.
fn request_delay(secs: f64) -> Result<Duration> {
    match Duration::try_from_secs_f64(secs) {
        Ok(d) => Ok(d),
        Err(e) => bail!("--request-delay must be a non-negative number of seconds ({e})"),
    }
}

fn apply_llm_args(
    mut builder: verkeersbesluit_ingest::IngestConfigBuilder,
    llm: &LlmArgs,
) -> verkeersbesluit_ingest::IngestConfigBuilder {
    if let Some(ref model) = llm.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = llm.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(c) = llm.min_confidence {
        builder = builder.min_confidence(c);
    }
    builder
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_delay_accepts_fractions() {
        assert_eq!(request_delay(2.5).unwrap(), Duration::from_millis(2500));
        assert_eq!(request_delay(0.0).unwrap(), Duration::ZERO);
    }

    #[test]
    fn request_delay_rejects_unrepresentable_values() {
        for bad in [-1.0, f64::NAN, f64::INFINITY, 1e30] {
            assert!(request_delay(bad).is_err(), "{bad} accepted");
        }
    }
}
