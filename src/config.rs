//! Configuration types for recipe-card extraction.
//!
//! All run behaviour is controlled through [`ExtractionConfig`], built via
//! its [`ExtractionConfigBuilder`]. Every knob lives in one struct so a run
//! can be logged and reproduced from its config alone.

use crate::error::ExtractError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// File extensions (lowercase, without the dot) picked up by discovery.
pub const DEFAULT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "heic", "bmp", "tiff"];

/// Default vision model.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Configuration for a recipe extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use recipe_extract::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .model("gpt-4o")
///     .jpeg_quality(90)
///     .build()
///     .unwrap();
/// assert_eq!(config.pair_max_tokens, 1500);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// LLM model identifier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is auto-detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum output tokens for a single-image card. Default: 1000.
    pub single_max_tokens: usize,

    /// Maximum output tokens for a front+back pair. Default: 1500.
    ///
    /// A pair carries two sides of content so the combined recipe is longer.
    pub pair_max_tokens: usize,

    /// Custom system prompt. If None, uses [`crate::prompts::SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// JPEG quality of the re-encoded transport image (1–100). Default: 95.
    pub jpeg_quality: u8,

    /// Extensions (lowercase, no dot) considered images during discovery.
    pub extensions: Vec<String>,

    /// OS-level converter tried when every in-process decoder fails.
    pub fallback: FallbackConverter,

    /// Timeout for the fallback converter subprocess in seconds. Default: 30.
    pub fallback_timeout_secs: u64,

    /// Per-vision-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Optional per-card progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            single_max_tokens: 1000,
            pair_max_tokens: 1500,
            system_prompt: None,
            jpeg_quality: 95,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            fallback: FallbackConverter::default(),
            fallback_timeout_secs: 30,
            api_timeout_secs: 60,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("single_max_tokens", &self.single_max_tokens)
            .field("pair_max_tokens", &self.pair_max_tokens)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("extensions", &self.extensions)
            .field("fallback", &self.fallback)
            .field("fallback_timeout_secs", &self.fallback_timeout_secs)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Whether `ext` (any case, with or without a leading dot) is a recognised image extension.
    pub fn is_image_extension(&self, ext: &str) -> bool {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        self.extensions.iter().any(|e| *e == ext)
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl fmt::Debug for ExtractionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ExtractionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn single_max_tokens(mut self, n: usize) -> Self {
        self.config.single_max_tokens = n;
        self
    }

    pub fn pair_max_tokens(mut self, n: usize) -> Self {
        self.config.pair_max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    /// Replace the recognised extension set. Entries are lowercased and stripped of dots.
    pub fn extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.extensions = exts
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    pub fn fallback(mut self, converter: FallbackConverter) -> Self {
        self.config.fallback = converter;
        self
    }

    pub fn fallback_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fallback_timeout_secs = secs.max(1);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.single_max_tokens == 0 || c.pair_max_tokens == 0 {
            return Err(ExtractError::InvalidConfig(
                "max tokens must be ≥ 1".into(),
            ));
        }
        if c.extensions.is_empty() {
            return Err(ExtractError::InvalidConfig(
                "at least one image extension is required".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// External image converter used as the last decoder in the chain.
///
/// macOS ships `sips`, which reads HEIC natively; elsewhere ImageMagick's
/// `magick` is the common equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackConverter {
    /// `sips -s format jpeg <in> --out <out>`
    Sips,
    /// `magick <in> <out>`
    ImageMagick,
    /// Skip the subprocess step.
    Disabled,
}

impl Default for FallbackConverter {
    fn default() -> Self {
        if cfg!(target_os = "macos") {
            FallbackConverter::Sips
        } else {
            FallbackConverter::ImageMagick
        }
    }
}

impl FallbackConverter {
    /// Parse a CLI/env value: `sips`, `magick`/`imagemagick`, `none`/`disabled`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sips" => Some(FallbackConverter::Sips),
            "magick" | "imagemagick" => Some(FallbackConverter::ImageMagick),
            "none" | "disabled" | "off" => Some(FallbackConverter::Disabled),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_card_extraction_bounds() {
        let c = ExtractionConfig::default();
        assert_eq!(c.temperature, 0.1);
        assert_eq!(c.single_max_tokens, 1000);
        assert_eq!(c.pair_max_tokens, 1500);
        assert_eq!(c.jpeg_quality, 95);
        assert_eq!(c.fallback_timeout_secs, 30);
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        let c = ExtractionConfig::default();
        assert!(c.is_image_extension("HEIC"));
        assert!(c.is_image_extension(".JPG"));
        assert!(c.is_image_extension("tiff"));
        assert!(!c.is_image_extension("txt"));
        assert!(!c.is_image_extension("webp"));
    }

    #[test]
    fn builder_clamps_and_normalises() {
        let c = ExtractionConfig::builder()
            .jpeg_quality(0)
            .temperature(9.0)
            .extensions([".PNG", "Jpg"])
            .build()
            .unwrap();
        assert_eq!(c.jpeg_quality, 1);
        assert_eq!(c.temperature, 2.0);
        assert_eq!(c.extensions, vec!["png", "jpg"]);
    }

    #[test]
    fn builder_rejects_empty_extensions() {
        let err = ExtractionConfig::builder()
            .extensions(Vec::<String>::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, ExtractError::InvalidConfig(_)));
    }

    #[test]
    fn fallback_parse() {
        assert_eq!(FallbackConverter::parse("SIPS"), Some(FallbackConverter::Sips));
        assert_eq!(
            FallbackConverter::parse("imagemagick"),
            Some(FallbackConverter::ImageMagick)
        );
        assert_eq!(FallbackConverter::parse("none"), Some(FallbackConverter::Disabled));
        assert_eq!(FallbackConverter::parse("gimp"), None);
    }
}
