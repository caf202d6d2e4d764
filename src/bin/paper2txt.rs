//! CLI binary for paper2txt.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `RunConfig` and prints the run summary.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use paper2txt::{
    run_batch, status, ExtractionStrategy, FailureKind, PageSeparator, ProgressCallback,
    RunConfig, RunProgressCallback, RunSummary,
};
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
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

/// Terminal progress callback: one bar over the record collection plus a
/// log line per record.
struct CliProgressCallback {
    bar: ProgressBar,
    record_started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Loading checkpoint…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            record_started: Mutex::new(None),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.record_started
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl RunProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_records: usize, already_done: usize) {
        self.bar.set_length(total_records as u64);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>5}/{len} papers  \
                 ⏱ {elapsed_precise}  ETA {eta_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_prefix("Harvesting");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "{total_records} papers, {already_done} already done"
            ))
        ));
    }

    fn on_record_start(&self, _index: usize, _total: usize, id: &str) {
        if let Ok(mut t) = self.record_started.lock() {
            *t = Some(Instant::now());
        }
        self.bar.set_message(id.to_string());
    }

    fn on_record_resumed(&self, _index: usize, _total: usize, _id: &str) {
        self.bar.inc(1);
    }

    fn on_record_complete(&self, _index: usize, _total: usize, id: &str, chars: usize) {
        self.bar.println(format!(
            "  {} {:<20}  {}  {}",
            green("✓"),
            id,
            dim(&format!("{chars:>8} chars")),
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.inc(1);
    }

    fn on_record_failed(&self, _index: usize, _total: usize, id: &str, kind: FailureKind, error: String) {
        // Truncate very long error messages to keep output tidy.
        let msg = match error.char_indices().nth(79) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error,
        };
        self.bar.println(format!(
            "  {} {:<20}  {} {}  {}",
            red("✗"),
            id,
            red(&kind.to_string()),
            msg,
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, _summary: &RunSummary) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Harvest the filtered collection into data/papers (resumes by default)
  paper2txt data/cs_papers_filtered.json

  # Start over, ignoring the checkpoint log
  paper2txt --no-resume papers.json -o corpus/

  # Gentler rate: 2 requests per 3 seconds, 3 retries per paper
  paper2txt --burst 2 --window-ms 3000 --max-retries 3 papers.json

  # Rebuild every page from word boxes, mark page boundaries
  paper2txt --strategy layout --separator marker papers.json

  # How much is left?
  paper2txt --status papers.json

  # Machine-readable summary, logs mirrored to a file
  paper2txt --json --log-file processing.log papers.json > summary.json

INPUT:
  A JSON array of paper objects, or JSON Lines when the file ends in
  .jsonl / .ndjson. Every object needs a string "id" (see --id-field).

OUTPUT:
  <output-dir>/<id>.txt        ---METADATA--- / ---FULLTEXT--- document
  <output-dir>/processed_papers.log
                               one finished identifier per line

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH     Path to libpdfium (file or directory)
  RUST_LOG            Overrides the log filter (e.g. paper2txt=debug)
  PAPER2TXT_*         Every flag has an env override, e.g. PAPER2TXT_BURST
"#;

/// Fetch arXiv PDFs and write layout-preserving text documents.
#[derive(Parser, Debug)]
#[command(
    name = "paper2txt",
    version,
    about = "Fetch arXiv PDFs and write layout-preserving text documents",
    long_about = "Fetch the PDF of every paper in a pre-filtered record collection, extract its \
text with pdfium, and write one metadata + full-text document per paper. Requests are \
rate-limited; progress is checkpointed so an interrupted run resumes where it stopped.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Record collection (JSON array or JSON Lines).
    #[arg(env = "PAPER2TXT_INPUT", default_value = "data/cs_papers_filtered.json")]
    input: PathBuf,

    /// Directory for output documents and the checkpoint log.
    #[arg(short, long, env = "PAPER2TXT_OUTPUT_DIR", default_value = "data/papers")]
    output_dir: PathBuf,

    /// Directory for transient PDFs (default: the output directory).
    #[arg(long, env = "PAPER2TXT_ARTIFACT_DIR")]
    artifact_dir: Option<PathBuf>,

    /// Checkpoint log file name inside the output directory.
    #[arg(long, env = "PAPER2TXT_CHECKPOINT", default_value = paper2txt::config::DEFAULT_CHECKPOINT_FILE)]
    checkpoint: String,

    /// Reprocess every record, ignoring the checkpoint log.
    #[arg(long, env = "PAPER2TXT_NO_RESUME")]
    no_resume: bool,

    /// Record field holding the paper identifier.
    #[arg(long, env = "PAPER2TXT_ID_FIELD", default_value = "id")]
    id_field: String,

    /// Requests allowed per rate-limit window.
    #[arg(long, env = "PAPER2TXT_BURST", default_value_t = 4,
          value_parser = clap::value_parser!(u64).range(1..))]
    burst: u64,

    /// Rate-limit window in milliseconds.
    #[arg(long, env = "PAPER2TXT_WINDOW_MS", default_value_t = 1000,
          value_parser = clap::value_parser!(u64).range(1..))]
    window_ms: u64,

    /// Text extraction strategy.
    #[arg(long, env = "PAPER2TXT_STRATEGY", value_enum, default_value = "auto")]
    strategy: StrategyArg,

    /// Vertical tolerance (points) for grouping words into lines.
    #[arg(long, env = "PAPER2TXT_Y_TOLERANCE", default_value_t = 3.0)]
    y_tolerance: f32,

    /// Horizontal gap (points) that still joins glyphs into one word.
    #[arg(long, env = "PAPER2TXT_X_TOLERANCE", default_value_t = 1.0)]
    x_tolerance: f32,

    /// Page separator: blank, formfeed, marker, or a custom line.
    #[arg(long, env = "PAPER2TXT_SEPARATOR", default_value = "blank")]
    separator: String,

    /// Retries per paper after a failed download.
    #[arg(long, env = "PAPER2TXT_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Base delay before the first retry, doubled for each further retry.
    #[arg(long, env = "PAPER2TXT_RETRY_BACKOFF_MS", default_value_t = 500)]
    retry_backoff_ms: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PAPER2TXT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// PDF endpoint; the identifier is appended as a path segment.
    #[arg(long, env = "PAPER2TXT_BASE_URL", default_value = paper2txt::config::DEFAULT_BASE_URL)]
    base_url: String,

    /// User-Agent header sent with every request.
    #[arg(long, env = "PAPER2TXT_USER_AGENT")]
    user_agent: Option<String>,

    /// pdfium shared library, or the directory containing it.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Abort the run when an output document or checkpoint entry cannot be written.
    #[arg(long, env = "PAPER2TXT_HALT_ON_WRITE_ERROR")]
    halt_on_write_error: bool,

    /// Report checkpointed / pending counts and exit without fetching.
    #[arg(long)]
    status: bool,

    /// Print the run summary (or status) as JSON on stdout.
    #[arg(long, env = "PAPER2TXT_JSON")]
    json: bool,

    /// Also append logs to this file.
    #[arg(long, env = "PAPER2TXT_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PAPER2TXT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PAPER2TXT_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, env = "PAPER2TXT_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum StrategyArg {
    Auto,
    Native,
    Layout,
}

impl From<StrategyArg> for ExtractionStrategy {
    fn from(v: StrategyArg) -> Self {
        match v {
            StrategyArg::Auto => ExtractionStrategy::Auto,
            StrategyArg::Native => ExtractionStrategy::Native,
            StrategyArg::Layout => ExtractionStrategy::Layout,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs on the terminal when the progress bar
    // is active; the log file (if any) still gets everything.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.status;
    let level = if cli.verbose { "debug" } else { "info" };
    let console_level = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    init_logging(console_level, level, cli.log_file.as_ref())?;

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn RunProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Status mode ──────────────────────────────────────────────────────
    if cli.status {
        let st = status(&cli.input, &config).context("Failed to read run status")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&st).context("Failed to serialise status")?
            );
        } else {
            println!("Input:        {}", cli.input.display());
            println!("Checkpoint:   {}", config.checkpoint_path().display());
            println!("Records:      {}", st.total_records);
            println!("Done:         {}", st.checkpointed);
            println!("Pending:      {}", st.pending);
            println!("Log entries:  {}", st.checkpoint_entries);
        }
        return Ok(());
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let summary = run_batch(&cli.input, &config)
        .await
        .with_context(|| format!("Run over '{}' failed", cli.input.display()))?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        print_summary(&summary, &config);
    }

    Ok(())
}

/// Console layer at `console_level`, optional file layer at `file_level`.
/// `RUST_LOG` overrides both.
fn init_logging(console_level: &str, file_level: &str, log_file: Option<&PathBuf>) -> Result<()> {
    let filter = |default: &str| {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
    };

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(filter(file_level)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_filter(filter(console_level)),
        )
        .with(file_layer)
        .init();
    Ok(())
}

fn print_summary(summary: &RunSummary, config: &RunConfig) {
    let rate = summary
        .completion_rate()
        .map(|r| format!("{r:.2}%"))
        .unwrap_or_else(|| "n/a".to_string());
    eprintln!(
        "{}  {} processed ({} new, {} resumed)  {} failed  {}ms  →  {}",
        if summary.failed == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        bold(&summary.processed.to_string()),
        summary.newly_processed(),
        summary.resumed,
        if summary.failed == 0 {
            summary.failed.to_string()
        } else {
            red(&summary.failed.to_string())
        },
        summary.duration_ms,
        bold(&config.output_dir.display().to_string()),
    );
    eprintln!("   completion rate {}", bold(&rate));
    if summary.failed > 0 {
        eprintln!(
            "   {}",
            dim(&format!(
                "retrieval {}  /  extraction {}  /  persistence {}",
                summary.retrieval_failures, summary.extraction_failures, summary.persistence_failures
            ))
        );
        for f in &summary.failures {
            eprintln!("   {} {} ({}): {}", red("✗"), f.id, f.kind, dim(&f.detail));
        }
    }
}

/// Map CLI args to `RunConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<RunConfig> {
    let mut builder = RunConfig::builder()
        .output_dir(&cli.output_dir)
        .checkpoint_file(&cli.checkpoint)
        .resume(!cli.no_resume)
        .id_field(&cli.id_field)
        .burst_size(usize::try_from(cli.burst).unwrap_or(usize::MAX))
        .window_ms(cli.window_ms)
        .strategy(cli.strategy.clone().into())
        .y_tolerance(cli.y_tolerance)
        .x_tolerance(cli.x_tolerance)
        .page_separator(parse_separator(&cli.separator))
        .max_retries(cli.max_retries)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .download_timeout_secs(cli.download_timeout)
        .base_url(&cli.base_url)
        .halt_on_persistence_error(cli.halt_on_write_error);

    if let Some(ref dir) = cli.artifact_dir {
        builder = builder.artifact_dir(dir);
    }
    if let Some(ref ua) = cli.user_agent {
        builder = builder.user_agent(ua);
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_library(lib);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--separator` string into `PageSeparator`.
fn parse_separator(s: &str) -> PageSeparator {
    match s.to_lowercase().as_str() {
        "blank" | "none" => PageSeparator::Blank,
        "formfeed" | "ff" => PageSeparator::FormFeed,
        "marker" => PageSeparator::Marker,
        _ => PageSeparator::Custom(s.to_string()),
    }
}
