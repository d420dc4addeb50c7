//! CLI binary for mistral-ocr.
//!
//! A thin shim over the library crate: loads `config.toml`, applies flag
//! overrides, and runs one of the file / url / convert pipelines.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use mistral_ocr::pipeline::input::{collect_pdf_files, file_stem, is_url, item_output_name};
use mistral_ocr::settings::{search_paths, set_api_key, user_config_path, DEFAULT_CONFIG_TOML};
use mistral_ocr::{
    convert_json, BatchProgressCallback, BatchReport, LogFormat, OcrConfig, OcrProcessor,
    ProcessOptions, ProcessResult, ProgressCallback, Settings,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
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

/// Terminal progress: one bar for the batch plus a log line per file.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Collecting files…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("OCR");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total} file(s)…"))
        ));
    }

    fn on_item_start(&self, _index: usize, _total: usize, path: &Path) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.bar.set_message(name);
    }

    fn on_item_complete(&self, index: usize, total: usize, result: &ProcessResult) {
        let line = if result.was_skipped() {
            format!(
                "  {} {:>3}/{:<3}  {}  {}",
                dim("↷"),
                index + 1,
                total,
                dim("already done"),
                dim(&result.output_dir.display().to_string()),
            )
        } else {
            format!(
                "  {} {:>3}/{:<3}  {:<10}  {}  {}",
                green("✓"),
                index + 1,
                total,
                dim(&format!("{} pages", result.pages)),
                result.output_dir.display(),
                dim(&result.elapsed),
            )
        };
        self.bar.println(line);
        self.bar.inc(1);
    }

    fn on_item_error(&self, index: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}",
            red("✗"),
            index + 1,
            total,
            red(&truncate(error, 100)),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, succeeded: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} file(s) processed successfully",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} file(s) processed  ({} failed)",
                if succeeded == 0 { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let head: String = s.chars().take(max_chars - 1).collect();
        format!("{head}\u{2026}")
    } else {
        s.to_string()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # OCR one file into ./output/report/
  mistral-ocr file report.pdf

  # Every PDF under a directory plus a single file, without images
  mistral-ocr file scans/ extra.pdf --include-images false

  # OCR a document that is already online
  mistral-ocr url https://arxiv.org/pdf/1706.03762 --output-name attention

  # Rebuild output from a saved metadata.json (no API key needed)
  mistral-ocr convert output/report/metadata.json --output-name report-v2

  # Several keys and a mirror endpoint
  mistral-ocr file a.pdf --api-keys KEY1,KEY2 --base-urls https://api.mistral.ai/v1/,https://mirror.example/v1/

  # Write a starter config file
  mistral-ocr config gen -o config.toml

OUTPUT LAYOUT:
  <output-dir>/<name>/output.md       Markdown with image links rewritten
  <output-dir>/<name>/output.txt      plain text
  <output-dir>/<name>/metadata.json   run record incl. raw API response
  <output-dir>/<name>/images/         extracted images

  Files whose output.md already exists and is non-empty are skipped.

CONFIG FILE (first found wins):
  ./config.toml
  <user config dir>/mistral-ocr/config.toml
  /etc/mistral-ocr/config.toml

ENVIRONMENT VARIABLES:
  MISTRAL_API_KEY   API key used when none is configured
  RUST_LOG          Override the log filter (e.g. mistral_ocr=debug)
"#;

/// OCR PDFs and document URLs with the Mistral OCR API.
#[derive(Parser, Debug)]
#[command(
    name = "mistral-ocr",
    version,
    about = "OCR PDFs and document URLs with the Mistral OCR API",
    long_about = "Upload PDFs (or point at document URLs), run Mistral OCR, and save the result \
as Markdown, plain text, extracted images and a metadata record. Requests rotate across several \
API keys and endpoints and are retried with exponential backoff.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    global: GlobalArgs,
}

/// Flags accepted by every subcommand.
#[derive(Args, Debug)]
struct GlobalArgs {
    /// Path to a config.toml (default: search standard locations).
    #[arg(long, global = true, env = "MISTRAL_OCR_CONFIG")]
    config: Option<PathBuf>,

    /// Comma-separated API keys; replaces the configured list.
    #[arg(long, global = true, value_delimiter = ',')]
    api_keys: Vec<String>,

    /// Comma-separated API base URLs; replaces the configured list.
    #[arg(long, global = true, value_delimiter = ',')]
    base_urls: Vec<String>,

    /// Root output directory.
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Request and save page images (true/false).
    #[arg(long, global = true, action = ArgAction::Set)]
    include_images: Option<bool>,

    /// Output directory name (suffixed _1, _2, … for several files).
    #[arg(long, global = true)]
    output_name: Option<String>,

    /// Log level: trace, debug, info, warn, error.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Show what would be processed without calling the API.
    #[arg(long, global = true)]
    dry_run: bool,

    /// Per-request timeout in minutes.
    #[arg(long, global = true, default_value_t = 10,
          value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Retries per endpoint after the first attempt (0–10).
    #[arg(long, global = true, default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(0..=10))]
    max_retries: u32,

    /// Disable the progress bar.
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(flatten)]
    Run(RunCommand),
    /// Manage the config file.
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

/// Subcommands that load settings and process documents.
#[derive(Subcommand, Debug)]
enum RunCommand {
    /// OCR local PDF files and directories of PDFs.
    File {
        /// Files or directories (searched recursively for .pdf).
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// OCR a document available at a URL.
    Url {
        /// HTTP/HTTPS document URL.
        url: String,
    },
    /// Rebuild output from a saved OCR response or metadata.json.
    Convert {
        /// JSON file to convert.
        json: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the default config (or write it to a file).
    Gen {
        /// Write to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Store an API key in the active config file.
    SetApiKey {
        /// The API key.
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli { command, global } = Cli::parse();

    let run = match command {
        Command::Config { action } => return run_config_command(&action, global.config.as_deref()),
        Command::Run(run) => run,
    };
    reject_url_paths(&run)?;

    // ── Settings + overrides ─────────────────────────────────────────────
    let mut settings = Settings::load(global.config.as_deref())
        .context("Failed to load configuration")?
        .settings;
    apply_overrides(&mut settings, &global);

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs while the progress bar is active;
    // an explicit --log-level still wins.
    let show_progress =
        !global.no_progress && !global.dry_run && matches!(run, RunCommand::File { .. });
    init_logging(&settings, global.log_level.as_deref(), show_progress)?;

    // ── Build config ─────────────────────────────────────────────────────
    let config = settings
        .config_builder()
        .max_retries(global.max_retries)
        .request_timeout_secs(global.timeout * 60)
        .build()
        .context("Invalid configuration")?;
    let mut options = settings.process_options();
    options.custom_output_name = global.output_name.clone();

    if global.dry_run {
        print_dry_run(&run, &config, &options);
        return Ok(());
    }

    match &run {
        RunCommand::File { paths } => {
            let mut processor =
                OcrProcessor::new(&config, options).context("Failed to create OCR client")?;
            if show_progress {
                let cb = CliProgressCallback::new();
                processor = processor.with_progress(cb as ProgressCallback);
            }
            let report = processor
                .process_batch(paths)
                .await
                .context("Batch processing failed")?;
            print_batch_summary(&report, show_progress);
        }
        RunCommand::Url { url } => {
            let processor =
                OcrProcessor::new(&config, options).context("Failed to create OCR client")?;
            let result = processor
                .process_url(url)
                .await
                .with_context(|| format!("Failed to process {url}"))?;
            print_result(&result);
        }
        RunCommand::Convert { json } => {
            let result = convert_json(json, &options)
                .await
                .with_context(|| format!("Failed to convert {}", json.display()))?;
            print_result(&result);
        }
    }

    Ok(())
}

/// `file` takes local paths only; point URLs at the `url` subcommand.
fn reject_url_paths(run: &RunCommand) -> Result<()> {
    if let RunCommand::File { paths } = run {
        if let Some(url) = paths
            .iter()
            .map(|p| p.to_string_lossy())
            .find(|p| is_url(p))
        {
            bail!("'{url}' is a URL; use `mistral-ocr url {url}` instead");
        }
    }
    Ok(())
}

fn run_config_command(action: &ConfigCommand, explicit: Option<&Path>) -> Result<()> {
    match action {
        ConfigCommand::Gen { output: None } => {
            print!("{DEFAULT_CONFIG_TOML}");
        }
        ConfigCommand::Gen { output: Some(path) } => {
            mistral_ocr::settings::write_default_config(path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("{} Wrote {}", green("✔"), bold(&path.display().to_string()));
        }
        ConfigCommand::SetApiKey { key } => {
            let path = explicit
                .map(Path::to_path_buf)
                .or_else(|| search_paths().into_iter().find(|p| p.is_file()))
                .or_else(user_config_path)
                .context("Could not determine a config file location; pass --config")?;
            set_api_key(&path, key).with_context(|| format!("Failed to update {}", path.display()))?;
            eprintln!(
                "{} API key saved to {}",
                green("✔"),
                bold(&path.display().to_string())
            );
        }
    }
    Ok(())
}

/// Command-line flags take precedence over the config file.
fn apply_overrides(settings: &mut Settings, global: &GlobalArgs) {
    let keys: Vec<String> = global
        .api_keys
        .iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();
    if !keys.is_empty() {
        settings.api_keys = keys;
    }
    let urls: Vec<String> = global
        .base_urls
        .iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect();
    if !urls.is_empty() {
        settings.base_urls = urls;
    }
    if let Some(ref dir) = global.output_dir {
        settings.output_dir = dir.clone();
    }
    if let Some(include) = global.include_images {
        settings.include_images = include;
    }
    if let Some(ref level) = global.log_level {
        settings.log_level = level.clone();
    }
}

/// Install the tracing subscriber: stderr or a log file, console or JSON.
fn init_logging(settings: &Settings, explicit_level: Option<&str>, show_progress: bool) -> Result<()> {
    let level = match explicit_level {
        Some(level) => level,
        None if show_progress => "error",
        None => settings.log_level.as_str(),
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (writer, ansi) = match settings.log_file() {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(io::stderr), true),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);
    match settings.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Console => builder.with_ansi(ansi).init(),
    }
    Ok(())
}

fn print_dry_run(command: &RunCommand, config: &OcrConfig, options: &ProcessOptions) {
    eprintln!("{} {}", cyan("◆"), bold("Dry run: no requests will be sent"));
    eprintln!(
        "   endpoints: {}   keys: {}   max retries: {}",
        config.base_urls.join(", "),
        config.api_keys.len(),
        config.max_retries
    );
    if config.api_keys.is_empty() && !matches!(command, RunCommand::Convert { .. }) {
        eprintln!("   {}", red("no API key configured"));
    }

    match command {
        RunCommand::File { paths } => {
            let collected = collect_pdf_files(paths);
            let total = collected.files.len();
            for (index, path) in collected.files.iter().enumerate() {
                let name = item_output_name(path, options.output_name(), index, total);
                println!("{} → {}", path.display(), options.output_dir.join(name).display());
            }
            for (path, err) in &collected.errors {
                eprintln!("  {} {}: {}", red("✗"), path.display(), err.report());
            }
            eprintln!("   {total} file(s) would be processed");
        }
        RunCommand::Url { url } => {
            let name = options.output_name().unwrap_or("ocr-result-<timestamp>");
            println!("{url} → {}", options.output_dir.join(name).display());
        }
        RunCommand::Convert { json } => {
            let name = options
                .output_name()
                .map(str::to_string)
                .unwrap_or_else(|| file_stem(json));
            println!("{} → {}", json.display(), options.output_dir.join(name).display());
        }
    }
}

fn print_result(result: &ProcessResult) {
    if result.was_skipped() {
        eprintln!(
            "{} already done  →  {}",
            dim("↷"),
            bold(&result.output_dir.display().to_string())
        );
    } else {
        eprintln!(
            "{}  {} pages  {}  →  {}",
            green("✔"),
            result.pages,
            dim(&result.elapsed),
            bold(&result.output_dir.display().to_string()),
        );
    }
}

fn print_batch_summary(report: &BatchReport, show_progress: bool) {
    // The progress callback already printed per-file lines and a tick.
    if !show_progress {
        for result in &report.results {
            print_result(result);
        }
        eprintln!(
            "{} succeeded, {} failed",
            report.succeeded(),
            report.failed()
        );
    }
    if report.skipped() > 0 {
        eprintln!("   {} file(s) skipped as already done", report.skipped());
    }
    for failure in &report.failures {
        eprintln!(
            "  {} {}: {}",
            red("✗"),
            failure.path.display(),
            failure.error.report()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn config_and_run_commands_parse_into_separate_arms() {
        let cli = Cli::parse_from(["mistral-ocr", "config", "gen"]);
        assert!(matches!(cli.command, Command::Config { action: ConfigCommand::Gen { output: None } }));

        let cli = Cli::parse_from(["mistral-ocr", "url", "https://example.com/a.pdf", "--dry-run"]);
        assert!(cli.global.dry_run);
        assert!(matches!(cli.command, Command::Run(RunCommand::Url { .. })));
    }

    #[test]
    fn file_command_rejects_urls() {
        let run = RunCommand::File {
            paths: vec![PathBuf::from("a.pdf"), PathBuf::from("https://example.com/b.pdf")],
        };
        let err = reject_url_paths(&run).unwrap_err().to_string();
        assert!(err.contains("mistral-ocr url https://example.com/b.pdf"), "{err}");

        let run = RunCommand::File {
            paths: vec![PathBuf::from("scans"), PathBuf::from("a.pdf")],
        };
        assert!(reject_url_paths(&run).is_ok());
    }
}
