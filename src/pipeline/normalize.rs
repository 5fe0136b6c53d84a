//! Image normalisation: any card photo → canonical RGB JPEG bytes.
//!
//! Decoding is an ordered chain of candidates, each returning `Result`:
//!
//! ```text
//! heic (true HEIC only) ──▶ generic (content sniffing) ──▶ external (sips / magick)
//! ```
//!
//! The first two decode to pixels in-process and are followed by RGB
//! conversion and JPEG encoding; they run inside `spawn_blocking` because a
//! 12 MP decode is CPU-bound. The external converter writes a JPEG to a
//! temporary file whose bytes are used as-is. The temporary file is a
//! [`tempfile::TempPath`], removed when it drops on every exit path,
//! including timeouts.
//!
//! Failure of the whole chain is returned as [`NormalizeFailure`] listing
//! every attempt. It is never fatal to a run.

use crate::config::{ExtractionConfig, FallbackConverter};
use crate::error::{DecodeError, DecoderKind, NormalizeFailure};
use crate::pipeline::discover::ImageAsset;
use crate::pipeline::encode::{encode_jpeg, EncodedImage};
use crate::pipeline::sniff::{is_true_heic, sniff_bytes, HEADER_LEN};
use image::DynamicImage;
use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// An in-process decoder: bytes in, pixels out.
trait PixelDecoder: Send {
    fn kind(&self) -> DecoderKind;
    fn decode(&self, data: &[u8]) -> Result<DynamicImage, String>;
}

struct HeicDecoder;

impl PixelDecoder for HeicDecoder {
    fn kind(&self) -> DecoderKind {
        DecoderKind::Heic
    }

    fn decode(&self, data: &[u8]) -> Result<DynamicImage, String> {
        decode_heic(data)
    }
}

struct GenericDecoder;

impl PixelDecoder for GenericDecoder {
    fn kind(&self) -> DecoderKind {
        DecoderKind::Generic
    }

    fn decode(&self, data: &[u8]) -> Result<DynamicImage, String> {
        image::load_from_memory(data).map_err(|e| e.to_string())
    }
}

/// In-process candidates in the order they are tried.
fn in_process_chain(true_heic: bool) -> Vec<Box<dyn PixelDecoder>> {
    let mut chain: Vec<Box<dyn PixelDecoder>> = Vec::with_capacity(2);
    if true_heic {
        chain.push(Box::new(HeicDecoder));
    }
    chain.push(Box::new(GenericDecoder));
    chain
}

/// Full decoder plan for an asset, external converter included. Used for
/// diagnostics; [`normalize_image`] follows the same order.
pub fn decoder_plan(true_heic: bool, fallback: FallbackConverter) -> Vec<DecoderKind> {
    let mut plan: Vec<DecoderKind> = in_process_chain(true_heic)
        .iter()
        .map(|d| d.kind())
        .collect();
    if fallback != FallbackConverter::Disabled {
        plan.push(DecoderKind::External);
    }
    plan
}

/// Normalise one photo to JPEG bytes.
///
/// Tries every candidate decoder in order and returns the first success.
/// When all fail, the error lists each attempt so the run log explains why
/// a card was lost.
pub async fn normalize_image(
    asset: &ImageAsset,
    config: &ExtractionConfig,
) -> Result<EncodedImage, NormalizeFailure> {
    let name = asset.name();
    let quality = config.jpeg_quality;
    let owned = asset.clone();

    let mut attempts =
        match tokio::task::spawn_blocking(move || decode_in_process(&owned, quality)).await {
            Ok(Ok((bytes, decoder))) => {
                debug!("{}: {} decoder → {} JPEG bytes", name, decoder, bytes.len());
                return Ok(EncodedImage {
                    name,
                    bytes,
                    decoder,
                });
            }
            Ok(Err(attempts)) => attempts,
            Err(e) => vec![DecodeError::new(
                DecoderKind::Generic,
                format!("decode task panicked: {e}"),
            )],
        };

    for attempt in &attempts {
        warn!("{}: {}", name, attempt);
    }

    match convert_external(&asset.path, config).await {
        Ok(bytes) => {
            debug!("{}: external converter → {} JPEG bytes", name, bytes.len());
            Ok(EncodedImage {
                name,
                bytes,
                decoder: DecoderKind::External,
            })
        }
        Err(e) => {
            warn!("{}: {}", name, e);
            attempts.push(e);
            Err(NormalizeFailure {
                image: name,
                attempts,
            })
        }
    }
}

/// Read, sniff, decode, convert to RGB, and JPEG-encode without leaving the thread.
fn decode_in_process(
    asset: &ImageAsset,
    quality: u8,
) -> Result<(Vec<u8>, DecoderKind), Vec<DecodeError>> {
    let data = std::fs::read(&asset.path).map_err(|e| {
        vec![DecodeError::new(
            DecoderKind::Generic,
            format!("cannot read file: {e}"),
        )]
    })?;

    let header = &data[..data.len().min(HEADER_LEN)];
    let true_heic = is_true_heic(asset, header);
    debug!(
        "{}: detected {}, true HEIC: {}",
        asset.name(),
        sniff_bytes(header),
        true_heic
    );

    let mut attempts = Vec::new();
    for decoder in in_process_chain(true_heic) {
        let kind = decoder.kind();
        let encoded = decoder
            .decode(&data)
            .and_then(|img| encode_jpeg(&img, quality).map_err(|e| format!("JPEG encode failed: {e}")));
        match encoded {
            Ok(bytes) => return Ok((bytes, kind)),
            Err(detail) => {
                debug!("{}: {} decoder failed: {}", asset.name(), kind, detail);
                attempts.push(DecodeError::new(kind, detail));
            }
        }
    }
    Err(attempts)
}

// ── HEIC ─────────────────────────────────────────────────────────────────

#[cfg(feature = "heic")]
fn decode_heic(data: &[u8]) -> Result<DynamicImage, String> {
    use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

    let lib = LibHeif::new();
    let ctx = HeifContext::read_from_bytes(data).map_err(|e| e.to_string())?;
    let handle = ctx.primary_image_handle().map_err(|e| e.to_string())?;

    let has_alpha = handle.has_alpha_channel();
    let chroma = if has_alpha {
        RgbChroma::Rgba
    } else {
        RgbChroma::Rgb
    };
    let decoded = lib
        .decode(&handle, ColorSpace::Rgb(chroma), None)
        .map_err(|e| e.to_string())?;

    let (width, height) = (decoded.width(), decoded.height());
    let planes = decoded.planes();
    let plane = planes
        .interleaved
        .ok_or_else(|| "decoded HEIC has no interleaved plane".to_string())?;

    let channels = if has_alpha { 4 } else { 3 };
    let pixels = pack_rows(plane.data, plane.stride, width, height, channels)?;
    let image = if has_alpha {
        image::RgbaImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgba8)
    } else {
        image::RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8)
    };
    image.ok_or_else(|| "HEIC pixel buffer does not match its dimensions".to_string())
}

#[cfg(not(feature = "heic"))]
fn decode_heic(_data: &[u8]) -> Result<DynamicImage, String> {
    Err("HEIC support not compiled in (build with --features heic)".to_string())
}

/// Copy `height` rows of `width * channels` bytes out of a buffer whose rows
/// are `stride` bytes apart (rows may carry trailing padding).
#[cfg_attr(not(feature = "heic"), allow(dead_code))]
fn pack_rows(
    data: &[u8],
    stride: usize,
    width: u32,
    height: u32,
    channels: usize,
) -> Result<Vec<u8>, String> {
    let row_len = width as usize * channels;
    if stride < row_len {
        return Err(format!("stride {stride} shorter than row {row_len}"));
    }
    let needed = stride * (height as usize).saturating_sub(1) + row_len;
    if height > 0 && data.len() < needed {
        return Err(format!("pixel buffer {} bytes, need {needed}", data.len()));
    }
    let mut out = Vec::with_capacity(row_len * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        out.extend_from_slice(&data[start..start + row_len]);
    }
    Ok(out)
}

// ── External converter ───────────────────────────────────────────────────

/// Last resort: let the OS convert the file to JPEG.
async fn convert_external(path: &Path, config: &ExtractionConfig) -> Result<Vec<u8>, DecodeError> {
    let scratch = std::env::temp_dir();
    let timeout = config.fallback_timeout_secs;
    match config.fallback {
        FallbackConverter::Sips => {
            run_converter(
                "sips",
                |out| {
                    vec![
                        "-s".into(),
                        "format".into(),
                        "jpeg".into(),
                        path.into(),
                        "--out".into(),
                        out.into(),
                    ]
                },
                &scratch,
                timeout,
            )
            .await
        }
        FallbackConverter::ImageMagick => {
            run_converter("magick", |out| vec![path.into(), out.into()], &scratch, timeout).await
        }
        FallbackConverter::Disabled => Err(DecodeError::new(
            DecoderKind::External,
            "fallback converter disabled",
        )),
    }
}

/// Run `program` with arguments built around a fresh temporary output path
/// and return the bytes it wrote there.
async fn run_converter<F>(
    program: &str,
    build_args: F,
    scratch_dir: &Path,
    timeout_secs: u64,
) -> Result<Vec<u8>, DecodeError>
where
    F: FnOnce(&Path) -> Vec<OsString>,
{
    let fail = |detail: String| DecodeError::new(DecoderKind::External, detail);

    let out = tempfile::Builder::new()
        .prefix("recipe-card-")
        .suffix(".jpg")
        .tempfile_in(scratch_dir)
        .map_err(|e| fail(format!("failed to create temp file: {e}")))?
        .into_temp_path();

    let mut cmd = Command::new(program);
    cmd.args(build_args(&out)).kill_on_drop(true);

    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output())
        .await
        .map_err(|_| fail(format!("{program} timed out after {timeout_secs}s")))?
        .map_err(|e| fail(format!("failed to run {program}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(fail(format!(
            "{program} conversion failed (exit {}): {}",
            output.status,
            stderr.trim()
        )));
    }

    let bytes = tokio::fs::read(&out)
        .await
        .map_err(|e| fail(format!("failed to read {program} output: {e}")))?;
    if bytes.is_empty() {
        return Err(fail(format!("{program} produced an empty file")));
    }
    Ok(bytes)
}
