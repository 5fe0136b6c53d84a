//! Error types for the recipe-extract library.
//!
//! Two layers of error reflect two distinct failure modes:
//!
//! * [`ExtractError`] is **fatal**: the run cannot proceed at all (missing
//!   directory, provider not configured, output not writable). Returned as
//!   `Err(ExtractError)` from the top-level `extract*` functions.
//!
//! * Item errors ([`NormalizeFailure`], [`VisionError`], [`ParseError`]) are
//!   **non-fatal**: one card failed but every other card is fine. They are
//!   converted into [`crate::output::ExtractionFailure`] records so the
//!   output file still has one entry per discovered card.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the recipe-extract library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Image directory was not found at the given path.
    #[error("Image directory not found: '{path}'\nCheck the path exists and is readable.")]
    DirectoryNotFound { path: PathBuf },

    /// The path exists but is a file, not a directory.
    #[error("'{path}' is not a directory")]
    NotADirectory { path: PathBuf },

    /// Listing the directory failed (permissions, I/O).
    #[error("Failed to read directory '{path}': {source}")]
    ReadDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A single image requested in debug mode does not exist.
    #[error("Image not found: '{path}'")]
    ImageNotFound { path: PathBuf },

    /// Reading an input file (e.g. an extraction output for import planning) failed.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Results could not be (de)serialised.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Which decoder in the normalisation chain an attempt (or success) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecoderKind {
    /// libheif container decode, only tried for true HEIC files.
    Heic,
    /// Content-sniffing decoder from the `image` crate.
    Generic,
    /// OS-level converter subprocess (sips / ImageMagick).
    External,
}

impl fmt::Display for DecoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DecoderKind::Heic => "heic",
            DecoderKind::Generic => "generic",
            DecoderKind::External => "external",
        };
        f.write_str(name)
    }
}

/// One failed decoder attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} decoder: {detail}")]
pub struct DecodeError {
    pub kind: DecoderKind,
    pub detail: String,
}

impl DecodeError {
    pub fn new(kind: DecoderKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Every decoder in the chain failed for one image.
#[derive(Debug, Clone, Error)]
#[error("Failed to process image {image}: {}", join_attempts(.attempts))]
pub struct NormalizeFailure {
    /// File name of the image (not the full path).
    pub image: String,
    /// Attempts in the order they were tried.
    pub attempts: Vec<DecodeError>,
}

fn join_attempts(attempts: &[DecodeError]) -> String {
    if attempts.is_empty() {
        return "no decoder attempted".to_string();
    }
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A vision-model call failed before any text came back.
#[derive(Debug, Clone, Error)]
pub enum VisionError {
    /// The provider returned an error.
    #[error("{message}")]
    Api { message: String },

    /// The call exceeded the configured timeout.
    #[error("Vision call timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// The model responded but no usable JSON object could be recovered.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// An opening fence without a closing one, or more than one fenced block.
    #[error("ambiguous code fences in response")]
    AmbiguousFences,

    /// `serde_json` rejected the extracted text.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// Valid JSON, but not an object (e.g. an array or a bare string).
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_failure_lists_every_attempt() {
        let e = NormalizeFailure {
            image: "IMG_0001.HEIC".into(),
            attempts: vec![
                DecodeError::new(DecoderKind::Heic, "no ftyp box"),
                DecodeError::new(DecoderKind::Generic, "unsupported format"),
                DecodeError::new(DecoderKind::External, "sips exited 1"),
            ],
        };
        let msg = e.to_string();
        assert!(msg.contains("IMG_0001.HEIC"), "got: {msg}");
        assert!(msg.contains("heic decoder: no ftyp box"));
        assert!(msg.contains("external decoder: sips exited 1"));
    }

    #[test]
    fn timeout_display() {
        let e = VisionError::Timeout { secs: 60 };
        assert!(e.to_string().contains("60s"));
    }

    #[test]
    fn provider_not_configured_display() {
        let e = ExtractError::ProviderNotConfigured {
            provider: "openai".into(),
            hint: "Set OPENAI_API_KEY".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("openai"));
        assert!(msg.contains("OPENAI_API_KEY"));
    }

    #[test]
    fn parse_error_display() {
        assert_eq!(
            ParseError::NotAnObject("array").to_string(),
            "expected a JSON object, got array"
        );
    }
}
