//! # recipe-extract
//!
//! Turn a directory of photographed recipe cards into structured JSON using a
//! Vision Language Model.
//!
//! Each card is photographed twice, front then back. Files are sorted by name
//! and paired two at a time; each pair goes to the model in a single request
//! so the front and back are merged into one recipe. An odd last photo is
//! sent on its own.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image directory
//!  │
//!  ├─ 1. Discover   list images by name, pair front/back
//!  ├─ 2. Normalise  sniff header, decode (HEIC → generic → OS converter)
//!  ├─ 3. Encode     RGB JPEG q95 → base64 ImageData
//!  ├─ 4. VLM        one call per card (gpt-4o by default)
//!  ├─ 5. Parse      fenced or bare JSON → recipe record + provenance
//!  └─ 6. Output     JSON array, one entry per card, plus run stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use recipe_extract::{extract_to_file, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = ExtractionConfig::default();
//!     let output = extract_to_file("recipe_photos", "extracted_recipes.json", &config).await?;
//!     eprintln!(
//!         "{}/{} cards extracted",
//!         output.stats.succeeded, output.stats.total_items
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `recipe-extract` binary (clap + anyhow + indicatif + tracing-subscriber) |
//! | `heic`  | off     | In-process HEIC decoding via libheif (needs the system library) |
//!
//! Without `heic`, HEIC photos are converted by `sips` (macOS) or ImageMagick.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod catalog;
pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use catalog::{load_results, plan_import, CatalogEntry, ImportPlan};
pub use config::{ExtractionConfig, ExtractionConfigBuilder, FallbackConverter};
pub use error::{DecodeError, DecoderKind, ExtractError, NormalizeFailure, ParseError, VisionError};
pub use extract::{
    extract, extract_sync, extract_to_file, extract_with_client, inspect_image, plan_pairs,
    write_results, ImageDiagnostic,
};
pub use output::{
    ExtractionFailure, ExtractionOutput, ExtractionResult, ExtractionStats, FailureKind,
    Provenance, RecipeRecord,
};
pub use pipeline::discover::{ImageAsset, ImagePair};
pub use pipeline::llm::{VisionClient, VisionRequest, VisionResponse};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
