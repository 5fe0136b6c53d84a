//! VLM interaction: build the card request and call the provider.
//!
//! Prompt text lives in [`crate::prompts`]; this module only decides which
//! instruction, images and bounds a card gets, and turns provider errors into
//! [`VisionError`]. There are no retries: a failed call fails that card once
//! and the run moves on.
//!
//! The controller talks to the model through [`VisionClient`] so tests can
//! substitute a fake and count calls. [`ProviderClient`] is the production
//! implementation over an `edgequake_llm` provider.

use crate::config::ExtractionConfig;
use crate::error::VisionError;
use crate::pipeline::encode::EncodedImage;
use crate::prompts::{PAIR_INSTRUCTION, SINGLE_INSTRUCTION, SYSTEM_PROMPT};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// The normalised photos of one card.
#[derive(Debug, Clone)]
pub enum CardImages {
    Single(EncodedImage),
    Pair {
        front: EncodedImage,
        back: EncodedImage,
    },
}

impl CardImages {
    pub fn is_pair(&self) -> bool {
        matches!(self, CardImages::Pair { .. })
    }

    /// Images in the order they are attached: front first.
    pub fn images(&self) -> Vec<&EncodedImage> {
        match self {
            CardImages::Single(img) => vec![img],
            CardImages::Pair { front, back } => vec![front, back],
        }
    }
}

/// Everything sent to the model for one card.
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub system_prompt: String,
    /// User-turn text; the images follow it.
    pub instruction: &'static str,
    pub images: Vec<ImageData>,
    pub max_tokens: usize,
    pub temperature: f32,
}

/// Free text returned by the model plus token usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisionResponse {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Build the request for a card.
///
/// Pairs get the front/back instruction and the larger token budget, since
/// two sides of a card carry more text than one.
pub fn build_request(card: &CardImages, config: &ExtractionConfig) -> VisionRequest {
    let (instruction, max_tokens) = if card.is_pair() {
        (PAIR_INSTRUCTION, config.pair_max_tokens)
    } else {
        (SINGLE_INSTRUCTION, config.single_max_tokens)
    };
    VisionRequest {
        system_prompt: config
            .system_prompt
            .clone()
            .unwrap_or_else(|| SYSTEM_PROMPT.to_string()),
        instruction,
        images: card.images().into_iter().map(EncodedImage::to_image_data).collect(),
        max_tokens,
        temperature: config.temperature,
    }
}

/// Something that can answer a [`VisionRequest`].
///
/// Implementations must not retry internally; the controller records
/// exactly one outcome per card.
pub trait VisionClient: Send + Sync {
    fn complete(
        &self,
        request: VisionRequest,
    ) -> impl Future<Output = Result<VisionResponse, VisionError>> + Send;
}

/// [`VisionClient`] backed by an `edgequake_llm` provider.
pub struct ProviderClient {
    provider: Arc<dyn LLMProvider>,
    timeout: Duration,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn LLMProvider>, api_timeout_secs: u64) -> Self {
        Self {
            provider,
            timeout: Duration::from_secs(api_timeout_secs),
        }
    }
}

impl VisionClient for ProviderClient {
    /// ## Message Layout
    ///
    /// 1. **System message**: recipe schema prompt (or the configured override)
    /// 2. **User message**: the instruction text with the card image(s) attached
    async fn complete(&self, request: VisionRequest) -> Result<VisionResponse, VisionError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(request.system_prompt.as_str()),
            ChatMessage::user_with_images(request.instruction, request.images),
        ];
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = tokio::time::timeout(self.timeout, self.provider.chat(&messages, Some(&options)))
            .await
            .map_err(|_| VisionError::Timeout {
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| VisionError::Api {
                message: e.to_string(),
            })?;

        debug!(
            "{} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        Ok(VisionResponse {
            text: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}
