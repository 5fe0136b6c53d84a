//! CLI binary for recipe-extract.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use recipe_extract::catalog::SkipReason;
use recipe_extract::{
    extract_to_file, inspect_image, load_results, plan_import, plan_pairs, ExtractionConfig,
    ExtractionOutput, ExtractionProgressCallback, FallbackConverter, ImageDiagnostic,
    ProgressCallback,
};
use std::io;
use std::path::{Path, PathBuf};
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

/// Terminal progress callback: a live bar plus one log line per card.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start time of the card in flight; cards never overlap.
    started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Scanning directory…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Mutex::new(None),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.started
            .lock()
            .ok()
            .and_then(|mut s| s.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_items: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} cards  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_items as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_items} recipe cards…"))
        ));
    }

    fn on_item_start(&self, _index: usize, _total: usize, label: &str) {
        if let Ok(mut started) = self.started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_message(label.to_string());
    }

    fn on_item_complete(&self, index: usize, total: usize, label: &str) {
        let secs = self.elapsed_secs();
        self.bar.println(format!(
            "  {} Card {:>3}/{:<3}  {}  {}",
            green("✓"),
            index,
            total,
            label,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, index: usize, total: usize, label: &str, error: &str) {
        let secs = self.elapsed_secs();

        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Card {:>3}/{:<3}  {}  {}  {}",
            red("✗"),
            index,
            total,
            label,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_items: usize, succeeded: usize) {
        let failed = total_items.saturating_sub(succeeded);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} recipe cards extracted successfully",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} recipe cards extracted  ({} failed)",
                if failed == total_items {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&succeeded.to_string()),
                total_items,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract every card in a directory
  recipe-extract recipe_photos/

  # Choose the output file
  recipe-extract recipe_photos/ -o mimi_recipes.json

  # Show how photos will be paired (no API key needed)
  recipe-extract --list-pairs recipe_photos/

  # Debug-encode one photo, or a front/back pair (no API call)
  recipe-extract recipe_photos/ --test IMG_6165.HEIC
  recipe-extract recipe_photos/ --test IMG_6165.HEIC IMG_6166.HEIC

  # Preview what a catalog import would insert
  recipe-extract --import-plan extracted_recipes.json

PAIRING:
  Photos are sorted by file name and taken two at a time: the first of each
  pair is the front of the card, the second the back. An odd last photo is
  processed on its own.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Override log filtering (e.g. recipe_extract=debug)
"#;

/// Extract structured recipes from photographed recipe cards.
#[derive(Parser, Debug)]
#[command(
    name = "recipe-extract",
    version,
    about = "Extract structured recipes from photographed recipe cards using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory of card photos (front, back, front, back, … by file name).
    #[arg(required_unless_present = "import_plan")]
    dir: Option<PathBuf>,

    /// Write the results JSON array to this file.
    #[arg(short, long, env = "RECIPE_EXTRACT_OUTPUT", default_value = "extracted_recipes.json")]
    output: PathBuf,

    /// Debug-encode FRONT [BACK] (relative to DIR) without calling the model.
    #[arg(long = "test", num_args = 1..=2, value_names = ["FRONT", "BACK"])]
    test: Option<Vec<PathBuf>>,

    /// Print the pairing plan and exit.
    #[arg(long)]
    list_pairs: bool,

    /// Print the catalog import plan for an extraction output file and exit.
    #[arg(long, value_name = "FILE")]
    import_plan: Option<PathBuf>,

    /// Vision model ID (default: gpt-4o).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "RECIPE_EXTRACT_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max output tokens for a single-photo card.
    #[arg(long, env = "RECIPE_EXTRACT_MAX_TOKENS", default_value_t = 1000)]
    max_tokens: usize,

    /// Max output tokens for a front+back pair.
    #[arg(long, env = "RECIPE_EXTRACT_PAIR_MAX_TOKENS", default_value_t = 1500)]
    pair_max_tokens: usize,

    /// JPEG quality of the image sent to the model (1–100).
    #[arg(long, env = "RECIPE_EXTRACT_JPEG_QUALITY", default_value_t = 95,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "RECIPE_EXTRACT_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// OS converter for photos no built-in decoder can read: sips, magick, none.
    #[arg(long, env = "RECIPE_EXTRACT_FALLBACK", value_parser = parse_fallback)]
    fallback: Option<FallbackConverter>,

    /// Fallback converter timeout in seconds.
    #[arg(long, env = "RECIPE_EXTRACT_FALLBACK_TIMEOUT", default_value_t = 30)]
    fallback_timeout: u64,

    /// Per-card vision call timeout in seconds.
    #[arg(long, env = "RECIPE_EXTRACT_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Print machine-readable JSON to stdout instead of a summary.
    #[arg(long, env = "RECIPE_EXTRACT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "RECIPE_EXTRACT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "RECIPE_EXTRACT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "RECIPE_EXTRACT_QUIET")]
    quiet: bool,
}

fn parse_fallback(s: &str) -> std::result::Result<FallbackConverter, String> {
    FallbackConverter::parse(s)
        .ok_or_else(|| format!("unknown converter '{s}' (expected sips, magick or none)"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let extracting = cli.test.is_none() && !cli.list_pairs && cli.import_plan.is_none();
    let show_progress = extracting && !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Import-plan mode ─────────────────────────────────────────────────
    if let Some(ref file) = cli.import_plan {
        return print_import_plan(file, cli.json);
    }

    let dir = cli
        .dir
        .clone()
        .context("An image directory is required")?;

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── List-pairs mode ──────────────────────────────────────────────────
    if cli.list_pairs {
        return print_pairs(&dir, &config, cli.json);
    }

    // ── Debug-encode mode ────────────────────────────────────────────────
    if let Some(ref names) = cli.test {
        let mut diagnostics = Vec::with_capacity(names.len());
        for name in names {
            let diag = inspect_image(dir.join(name), &config)
                .await
                .with_context(|| format!("Failed to inspect {}", name.display()))?;
            diagnostics.push(diag);
        }
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&diagnostics).context("Failed to serialise diagnostics")?
            );
        } else {
            print_diagnostics(&diagnostics);
        }
        return Ok(());
    }

    // ── Full run ─────────────────────────────────────────────────────────
    let output = extract_to_file(&dir, &cli.output, &config)
        .await
        .context("Extraction failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output.stats).context("Failed to serialise stats")?
        );
    } else if !cli.quiet {
        print_summary(&output, &cli.output);
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .temperature(cli.temperature)
        .single_max_tokens(cli.max_tokens)
        .pair_max_tokens(cli.pair_max_tokens)
        .jpeg_quality(cli.jpeg_quality)
        .fallback_timeout_secs(cli.fallback_timeout)
        .api_timeout_secs(cli.api_timeout);

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
    if let Some(fallback) = cli.fallback {
        builder = builder.fallback(fallback);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_pairs(dir: &Path, config: &ExtractionConfig, json: bool) -> Result<()> {
    let pairs = plan_pairs(dir, config).context("Failed to list images")?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&pairs).context("Failed to serialise pairs")?
        );
        return Ok(());
    }

    let images: usize = pairs.iter().map(|p| if p.is_single() { 1 } else { 2 }).sum();
    println!("Found {} image files", images);
    println!("{}", "=".repeat(60));
    println!("Recipe pairs ({} total):", pairs.len());
    println!();
    for (i, pair) in pairs.iter().enumerate() {
        println!("Pair {}:", i + 1);
        println!("  Front: {}", pair.front.name());
        match pair.back {
            Some(ref back) => println!("  Back:  {}", back.name()),
            None => println!("  Back:  {}", dim("(no back image)")),
        }
        println!();
    }
    Ok(())
}

fn print_diagnostics(diagnostics: &[ImageDiagnostic]) {
    for diag in diagnostics {
        println!("{}", bold(&diag.image));
        println!("  {}", diag.format);
        println!("  True HEIC:    {}", diag.format.true_heic);
        let plan: Vec<String> = diag.plan.iter().map(|k| k.to_string()).collect();
        println!("  Decoders:     {}", plan.join(" → "));
        match (&diag.encoding, &diag.error) {
            (Some(enc), _) => {
                println!("  {} decoded with the {} decoder", green("✓"), enc.decoder);
                println!("  JPEG bytes:   {}", enc.jpeg_bytes);
                println!("  Base64 len:   {}", enc.base64_len);
                println!("  Estimated:    {:.1} KB", enc.estimated_kb());
            }
            (None, Some(err)) => println!("  {} {}", red("✗"), err),
            (None, None) => {}
        }
    }

    if let [front, back] = diagnostics {
        if let (Some(f), Some(b)) = (&front.encoding, &back.encoding) {
            println!(
                "{} Pair ready: {} + {} base64 chars",
                cyan("◆"),
                f.base64_len,
                b.base64_len
            );
        } else {
            println!(
                "{} Pair would be lost: at least one image failed to encode",
                red("✘")
            );
        }
    }
}

fn print_summary(output: &ExtractionOutput, path: &Path) {
    let stats = &output.stats;
    eprintln!(
        "{}  {}/{} cards  {}ms  →  {}",
        if stats.failed() == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        stats.succeeded,
        stats.total_items,
        stats.total_duration_ms,
        bold(&path.display().to_string()),
    );
    eprintln!(
        "   {} images, {} parse failures, {} transport failures, {} image failures ({} lost pairs)",
        stats.total_images,
        stats.parse_failures,
        stats.transport_failures,
        stats.image_failures,
        stats.lost_pairs,
    );
    eprintln!(
        "   {} tokens in  /  {} tokens out",
        dim(&stats.total_input_tokens.to_string()),
        dim(&stats.total_output_tokens.to_string()),
    );

    let failures: Vec<_> = output.results.iter().filter_map(|r| r.failure()).collect();
    if !failures.is_empty() {
        eprintln!();
        eprintln!("{}", bold("Failed cards:"));
        for f in failures {
            eprintln!("  {} {}  {}", red("✗"), f.provenance.label(), dim(&f.error));
        }
    }
}

fn print_import_plan(file: &Path, json: bool) -> Result<()> {
    let records = load_results(file)
        .with_context(|| format!("Failed to load results from {}", file.display()))?;
    let plan = plan_import(&records);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&plan).context("Failed to serialise import plan")?
        );
        return Ok(());
    }

    println!("Found {} records to process", records.len());
    for entry in &plan.entries {
        println!("  {} {}", green("+"), entry.recipe_name);
    }
    for skipped in &plan.skipped {
        let why = match skipped.reason {
            SkipReason::Failed => "extraction failed",
            SkipReason::MissingName => "no recipe name",
            SkipReason::Duplicate => "already planned",
        };
        println!(
            "  {} #{} {}  {}",
            dim("-"),
            skipped.index,
            skipped.recipe_name.as_deref().unwrap_or(""),
            dim(why)
        );
    }
    println!();
    println!("Would import: {} recipes", plan.entries.len());
    println!("Would skip:   {} records", plan.skipped.len());
    Ok(())
}
