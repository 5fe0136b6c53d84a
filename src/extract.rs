//! Directory-level extraction entry points.
//!
//! The controller walks the card list strictly in order: normalise the
//! card's photos, make one vision call, parse the reply, record the outcome,
//! move on. Nothing is retried and nothing aborts the run once discovery has
//! succeeded, so the output always has one entry per card.

use crate::config::{ExtractionConfig, DEFAULT_MODEL};
use crate::error::{DecoderKind, ExtractError, NormalizeFailure};
use crate::output::{
    ExtractionFailure, ExtractionOutput, ExtractionResult, ExtractionStats, FailureKind,
    Provenance,
};
use crate::pipeline::discover::{discover_images, pair_images, ImageAsset, ImagePair};
use crate::pipeline::llm::{build_request, CardImages, ProviderClient, VisionClient};
use crate::pipeline::normalize::{decoder_plan, normalize_image};
use crate::pipeline::parse::parse_response;
use crate::pipeline::sniff::{format_report, FormatReport};
use edgequake_llm::{LLMProvider, ProviderFactory};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Extract every recipe card in `dir`.
///
/// # Returns
/// `Ok(ExtractionOutput)` whenever the directory could be listed, even if
/// every card failed (check `output.stats`).
///
/// # Errors
/// Only fatal errors: the directory is missing or unreadable, or no vision
/// provider could be configured.
pub async fn extract(
    dir: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let dir = dir.as_ref();
    let images = discover(dir, config)?;
    let provider = resolve_provider(config).await?;
    let client = ProviderClient::new(provider, config.api_timeout_secs);
    run_cards(images, &client, config).await
}

/// Like [`extract`], but with a caller-supplied [`VisionClient`].
pub async fn extract_with_client<C: VisionClient>(
    dir: impl AsRef<Path>,
    client: &C,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let images = discover(dir.as_ref(), config)?;
    run_cards(images, client, config).await
}

/// List the images in `dir` and log what each one really is.
fn discover(dir: &Path, config: &ExtractionConfig) -> Result<Vec<ImageAsset>, ExtractError> {
    info!("Starting extraction: {}", dir.display());
    let images = discover_images(dir, config)?;
    if images.is_empty() {
        warn!("No image files found in {}", dir.display());
    }
    for asset in &images {
        match format_report(asset) {
            Ok(report) => debug!("{}: {}", asset.name(), report),
            Err(e) => debug!("{}: header unreadable: {}", asset.name(), e),
        }
    }
    Ok(images)
}

async fn run_cards<C: VisionClient>(
    images: Vec<ImageAsset>,
    client: &C,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let total_start = Instant::now();

    // ── Step 1: Pair ─────────────────────────────────────────────────────
    let total_images = images.len();
    let cards = pair_images(images);
    info!(
        "Found {} images, processing as {} recipe cards",
        total_images,
        cards.len()
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(cards.len());
    }

    // ── Step 2: One card at a time ───────────────────────────────────────
    let total = cards.len();
    let mut results = Vec::with_capacity(total);
    let mut input_tokens = 0u64;
    let mut output_tokens = 0u64;

    for (i, card) in cards.iter().enumerate() {
        let index = i + 1;
        let label = card.label();
        let kind = if card.is_single() { "single image" } else { "pair" };
        info!("Processing {} {}/{}: {}", kind, index, total, label);

        if let Some(ref cb) = config.progress_callback {
            cb.on_item_start(index, total, &label);
        }

        let outcome = process_card(card, client, config).await;
        input_tokens += outcome.input_tokens as u64;
        output_tokens += outcome.output_tokens as u64;

        match &outcome.result {
            ExtractionResult::Recipe(recipe) => {
                info!("Extracted recipe: {}", recipe.recipe_name);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_item_complete(index, total, &label);
                }
            }
            ExtractionResult::Failure(failure) => {
                warn!("{}: {}", label, failure.error);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_item_error(index, total, &label, &failure.error);
                }
            }
        }
        results.push(outcome.result);
    }

    // ── Step 3: Summarise ────────────────────────────────────────────────
    let mut stats = ExtractionStats::tally(total_images, &results);
    stats.total_input_tokens = input_tokens;
    stats.total_output_tokens = output_tokens;
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Extraction complete: {}/{} cards, {} parse failures, {} transport failures, {} image failures ({} lost pairs), {}ms",
        stats.succeeded,
        stats.total_items,
        stats.parse_failures,
        stats.transport_failures,
        stats.image_failures,
        stats.lost_pairs,
        stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(total, stats.succeeded);
    }

    Ok(ExtractionOutput { results, stats })
}

/// Extract `dir` and write the results array to `output_path`.
///
/// Uses atomic write (temp file + rename) so a crash never leaves a
/// truncated JSON file behind.
pub async fn extract_to_file(
    dir: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let output = extract(dir, config).await?;
    write_results(&output, output_path.as_ref()).await?;
    Ok(output)
}

/// Write the pretty-printed results array atomically.
pub async fn write_results(output: &ExtractionOutput, path: &Path) -> Result<(), ExtractError> {
    let json = output.results_json()?;
    let write_err = |e: std::io::Error| ExtractError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    info!("Saved {} results to {}", output.results.len(), path.display());
    Ok(())
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    dir: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(dir, config))
}

/// The pairing plan for `dir`, without decoding or calling anything.
pub fn plan_pairs(
    dir: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<Vec<ImagePair>, ExtractError> {
    Ok(pair_images(discover_images(dir.as_ref(), config)?))
}

// ── Per-card processing ──────────────────────────────────────────────────

/// One card's result plus the tokens it consumed.
struct CardOutcome {
    result: ExtractionResult,
    input_tokens: usize,
    output_tokens: usize,
}

impl From<ExtractionResult> for CardOutcome {
    fn from(result: ExtractionResult) -> Self {
        Self {
            result,
            input_tokens: 0,
            output_tokens: 0,
        }
    }
}

async fn process_card<C: VisionClient>(
    card: &ImagePair,
    client: &C,
    config: &ExtractionConfig,
) -> CardOutcome {
    let (images, provenance) = match &card.back {
        None => {
            let provenance = Provenance::single(card.front.name());
            match normalize_image(&card.front, config).await {
                Ok(img) => (CardImages::Single(img), provenance),
                Err(e) => return image_failure(e, provenance).into(),
            }
        }
        Some(back) => {
            let provenance = Provenance::pair(card.front.name(), back.name());
            // Both sides are attempted so the record names every unreadable file.
            let front = normalize_image(&card.front, config).await;
            let back = normalize_image(back, config).await;
            match (front, back) {
                (Ok(front), Ok(back)) => (CardImages::Pair { front, back }, provenance),
                (front, back) => {
                    let failures: Vec<NormalizeFailure> =
                        [front.err(), back.err()].into_iter().flatten().collect();
                    return lost_pair(&failures, provenance).into();
                }
            }
        }
    };

    let request = build_request(&images, config);
    match client.complete(request).await {
        Ok(response) => CardOutcome {
            result: parse_response(&response.text, provenance),
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
        },
        Err(e) => ExtractionResult::Failure(ExtractionFailure {
            error: format!("Vision request failed: {e}"),
            failure_kind: FailureKind::Transport,
            recipe_lost: false,
            failed_images: Vec::new(),
            parse_error: None,
            raw_response: None,
            provenance,
        })
        .into(),
    }
}

fn image_failure(failure: NormalizeFailure, provenance: Provenance) -> ExtractionResult {
    ExtractionResult::Failure(ExtractionFailure {
        error: failure.to_string(),
        failure_kind: FailureKind::Image,
        recipe_lost: false,
        failed_images: vec![failure.image],
        parse_error: None,
        raw_response: None,
        provenance,
    })
}

fn lost_pair(failures: &[NormalizeFailure], provenance: Provenance) -> ExtractionResult {
    for f in failures {
        warn!("{}", f);
    }
    let failed_images: Vec<String> = failures.iter().map(|f| f.image.clone()).collect();
    ExtractionResult::Failure(ExtractionFailure {
        error: format!(
            "Recipe pair lost - failed to process images: {}",
            failed_images.join(", ")
        ),
        failure_kind: FailureKind::Image,
        recipe_lost: true,
        failed_images,
        parse_error: None,
        raw_response: None,
        provenance,
    })
}

// ── Diagnostics ──────────────────────────────────────────────────────────

/// Transport-form sizes of an image that normalised successfully.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodingSummary {
    pub decoder: DecoderKind,
    pub jpeg_bytes: usize,
    pub base64_len: usize,
}

impl EncodingSummary {
    /// Decoded size of the base64 payload in KB.
    pub fn estimated_kb(&self) -> f64 {
        (self.base64_len * 3 / 4) as f64 / 1024.0
    }
}

/// What the debug encode of one image found.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageDiagnostic {
    pub image: String,
    pub format: FormatReport,
    /// Decoders that would be tried, in order.
    pub plan: Vec<DecoderKind>,
    pub encoding: Option<EncodingSummary>,
    /// Set when every decoder failed.
    pub error: Option<String>,
}

/// Sniff and normalise a single image without calling the model.
pub async fn inspect_image(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ImageDiagnostic, ExtractError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ExtractError::ImageNotFound {
            path: path.to_path_buf(),
        });
    }
    let asset = ImageAsset::new(path);
    let format = format_report(&asset).map_err(|e| ExtractError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    info!("{}: {}", asset.name(), format);
    let plan = decoder_plan(format.true_heic, config.fallback);

    let (encoding, error) = match normalize_image(&asset, config).await {
        Ok(img) => (
            Some(EncodingSummary {
                decoder: img.decoder,
                jpeg_bytes: img.bytes.len(),
                base64_len: img.to_base64().len(),
            }),
            None,
        ),
        Err(e) => (None, Some(e.to_string())),
    };

    Ok(ImageDiagnostic {
        image: asset.name(),
        format,
        plan,
        encoding,
        error,
    })
}

// ── Provider resolution ──────────────────────────────────────────────────

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ExtractError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the vision provider, from most-specific to least-specific:
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    honoured only when both are non-empty.
/// 4. **`OPENAI_API_KEY`** present → OpenAI with the configured model.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub async fn resolve_provider(
    config: &ExtractionConfig,
) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_vision_provider(&prov, &env_model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ExtractError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
