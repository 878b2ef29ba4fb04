//! CLI binary for edgequake-math2docx.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_math2docx::convert::write_atomic;
use edgequake_math2docx::{
    build_document, convert, ConversionConfig, ConversionProgressCallback, MergeDecision,
    ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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

/// Terminal progress callback: a live bar over slices plus one log line per
/// slice. Slices may finish out of order when concurrency > 1.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// The bar starts as a spinner; `on_conversion_start` gives it a length.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Loading image…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} slices  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Transcribing");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, slice_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&slice_num))
            .map_or(0.0, |t| t.elapsed().as_secs_f64())
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_slices: usize) {
        self.activate_bar(total_slices);
        let noun = if total_slices == 1 { "slice" } else { "slices" };
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Transcribing {total_slices} {noun}…"))
        ));
    }

    fn on_slice_start(&self, slice_num: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(slice_num, Instant::now());
        }
        self.bar.set_message(format!("slice {slice_num}"));
    }

    fn on_slice_complete(&self, slice_num: usize, total: usize, text_len: usize) {
        let secs = self.elapsed_secs(slice_num);
        self.bar.println(format!(
            "  {} Slice {:>2}/{:<2}  {:<8}  {}",
            green("✓"),
            slice_num,
            total,
            dim(&format!("{text_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_slice_error(&self, slice_num: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(slice_num);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Slice {:>2}/{:<2}  {}  {}",
            red("✗"),
            slice_num,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_slice_merged(&self, slice_num: usize, decision: &MergeDecision) {
        match decision {
            MergeDecision::Appended => {}
            MergeDecision::Trimmed { removed_chars } => self.bar.println(format!(
                "  {} Slice {:>2}  {}",
                cyan("↺"),
                slice_num,
                dim(&format!("{removed_chars} overlapping chars removed")),
            )),
            MergeDecision::Discarded => self.bar.println(format!(
                "  {} Slice {:>2}  {}",
                cyan("↺"),
                slice_num,
                dim("duplicate of previous slice, discarded"),
            )),
        }
    }

    fn on_document_assembled(&self, formulas: usize, fallbacks: usize) {
        let line = if fallbacks == 0 {
            format!("  {} {} equations", green("✓"), formulas)
        } else {
            format!(
                "  {} {} equations, {} kept as LaTeX",
                cyan("⚠"),
                formulas,
                red(&fallbacks.to_string())
            )
        };
        self.bar.println(line);
    }

    fn on_conversion_complete(&self, total_slices: usize, success_count: usize) {
        let failed = total_slices.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} slices transcribed successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} slices transcribed  ({} failed)",
                cyan("⚠"),
                bold(&success_count.to_string()),
                total_slices,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a photo of a worksheet (writes worksheet.docx)
  math2docx worksheet.jpg

  # Choose the output file and a document title
  math2docx scan.png -o homework3.docx --title "Homework 3"

  # Use a specific model
  math2docx --provider openai --model gpt-4.1 scan.png

  # Convert from URL
  math2docx https://example.com/exam.png -o exam.docx

  # Print the merged, normalized transcript instead of writing a document
  math2docx --dump-text scan.png

  # Re-render a saved transcript (no API key needed)
  math2docx --from-text transcript.txt -o transcript.docx

  # Segmented elements and stats as JSON
  math2docx --json scan.png > result.json

TALL IMAGES:
  Images taller than --slice-height are cut into overlapping strips, each
  transcribed separately. Text repeated where strips overlap is removed
  when the transcripts are merged.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  MATH2DOCX_*             Every flag, e.g. MATH2DOCX_SLICE_HEIGHT=1200
"#;

/// Convert images of math problems to Word documents using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "math2docx",
    version,
    about = "Convert images of math problems to editable Word documents using Vision LLMs",
    long_about = "Transcribe an image (local file or URL) of mathematical problems with a Vision \
Language Model and write a .docx in which every formula is a native, editable Word equation. \
Supports OpenAI, Anthropic, Google Gemini, Azure OpenAI, and any OpenAI-compatible endpoint.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image file path or HTTP/HTTPS URL (a transcript file with --from-text).
    input: String,

    /// Output .docx path. Default: the input name with a .docx extension.
    #[arg(short, long, env = "MATH2DOCX_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-mini, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Height of one image slice in pixels.
    #[arg(long, env = "MATH2DOCX_SLICE_HEIGHT", default_value_t = 1600)]
    slice_height: u32,

    /// Pixel overlap between consecutive slices.
    #[arg(long, env = "MATH2DOCX_SLICE_OVERLAP", default_value_t = 200)]
    slice_overlap: u32,

    /// Downscale images wider than this many pixels.
    #[arg(long, env = "MATH2DOCX_MAX_WIDTH", default_value_t = 2048)]
    max_width: u32,

    /// Number of concurrent VLM API calls.
    #[arg(short, long, env = "MATH2DOCX_CONCURRENCY", default_value_t = 2)]
    concurrency: usize,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "MATH2DOCX_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens per slice.
    #[arg(long, env = "MATH2DOCX_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "MATH2DOCX_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per slice on LLM failure.
    #[arg(long, env = "MATH2DOCX_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Title heading and document title property.
    #[arg(long, env = "MATH2DOCX_TITLE")]
    title: Option<String>,

    /// Body font family.
    #[arg(long, env = "MATH2DOCX_FONT", default_value = "Arial")]
    font: String,

    /// Body font size in points.
    #[arg(long, env = "MATH2DOCX_FONT_SIZE", default_value_t = 11.0)]
    font_size: f32,

    /// Treat INPUT as a transcript and only build the document.
    #[arg(long, env = "MATH2DOCX_FROM_TEXT")]
    from_text: bool,

    /// Print the merged, normalized transcript instead of writing a document.
    #[arg(long, env = "MATH2DOCX_DUMP_TEXT", conflicts_with = "json")]
    dump_text: bool,

    /// Print segmented elements, slices and stats as JSON instead of writing
    /// a document.
    #[arg(long, env = "MATH2DOCX_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "MATH2DOCX_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MATH2DOCX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MATH2DOCX_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "MATH2DOCX_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-slice LLM call timeout in seconds.
    #[arg(long, env = "MATH2DOCX_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,
}

impl Cli {
    /// Whether a .docx should be written at all.
    fn writes_document(&self) -> bool {
        !self.dump_text && !self.json
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; -v always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.from_text && cli.writes_document();
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

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.input));

    // ── Offline mode: transcript → document ──────────────────────────────
    if cli.from_text {
        let text = tokio::fs::read_to_string(&cli.input)
            .await
            .with_context(|| format!("Failed to read transcript from {:?}", cli.input))?;
        let rendered = build_document(&text, &config.document).context("Failed to build document")?;

        if cli.dump_text {
            print_stdout(&rendered.text)?;
        } else if cli.json {
            let json = serde_json::json!({
                "text": rendered.text,
                "elements": rendered.elements,
                "stats": rendered.assembly,
            });
            print_stdout(&serde_json::to_string_pretty(&json).context("Failed to serialise output")?)?;
        } else {
            write_atomic(&output_path, &rendered.docx)
                .await
                .context("Failed to write document")?;
            if !cli.quiet {
                let a = rendered.assembly;
                eprintln!(
                    "{}  {} equations ({} kept as LaTeX)  →  {}",
                    if a.fallback_formulas == 0 { green("✔") } else { cyan("⚠") },
                    a.display_formulas + a.inline_formulas,
                    a.fallback_formulas,
                    bold(&output_path.display().to_string()),
                );
            }
        }
        return Ok(());
    }

    // ── Run conversion ───────────────────────────────────────────────────
    let output = convert(&cli.input, &config)
        .await
        .context("Conversion failed")?;

    if cli.dump_text {
        print_stdout(&output.text)?;
    } else if cli.json {
        let json = serde_json::json!({
            "text": output.text,
            "elements": output.elements,
            "slices": output.slices,
            "stats": output.stats,
        });
        print_stdout(&serde_json::to_string_pretty(&json).context("Failed to serialise output")?)?;
    } else {
        write_atomic(&output_path, &output.docx)
            .await
            .context("Failed to write document")?;

        if !cli.quiet {
            let stats = &output.stats;
            eprintln!(
                "{}  {}/{} slices  {} equations  {}ms  →  {}",
                if stats.failed_slices == 0 && stats.fallback_formulas == 0 {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                stats.processed_slices,
                stats.total_slices,
                stats.display_formulas + stats.inline_formulas,
                stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
            eprintln!(
                "   {} tokens in  /  {} tokens out",
                dim(&stats.total_input_tokens.to_string()),
                dim(&stats.total_output_tokens.to_string()),
            );
            if stats.fallback_formulas > 0 {
                eprintln!(
                    "   {} formulas could not be converted and are shown as LaTeX",
                    red(&stats.fallback_formulas.to_string())
                );
            }
        }
    }

    Ok(())
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .slice_height(cli.slice_height)
        .slice_overlap(cli.slice_overlap)
        .max_image_width(cli.max_width)
        .concurrency(cli.concurrency)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout)
        .font(cli.font.clone(), cli.font_size);

    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref title) = cli.title {
        builder = builder.title(title.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    let mut config = builder.build().context("Invalid configuration")?;
    if !cli.from_text {
        config.document.footer = Some(credit_line(cli.provider.as_deref(), cli.model.as_deref()));
    }
    Ok(config)
}

/// Footer naming what produced the transcript.
fn credit_line(provider: Option<&str>, model: Option<&str>) -> String {
    match (provider, model) {
        (Some(p), Some(m)) => format!("Transcribed by math2docx with {p}/{m}"),
        (None, Some(m)) => format!("Transcribed by math2docx with {m}"),
        (Some(p), None) => format!("Transcribed by math2docx with {p}"),
        (None, None) => "Transcribed by math2docx".to_string(),
    }
}

/// `scan.png` → `scan.docx`; for URLs, the last path segment in the
/// current directory.
fn default_output_path(input: &str) -> PathBuf {
    let name = if input.starts_with("http://") || input.starts_with("https://") {
        input
            .split(['?', '#'])
            .next()
            .and_then(|u| u.trim_end_matches('/').rsplit('/').next())
            .filter(|s| !s.is_empty() && !s.contains(':'))
            .unwrap_or("output")
            .to_string()
    } else {
        input.to_string()
    };
    Path::new(&name).with_extension("docx")
}

fn print_stdout(text: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(text.as_bytes())
        .context("Failed to write to stdout")?;
    if !text.ends_with('\n') {
        handle.write_all(b"\n").ok();
    }
    Ok(())
}
