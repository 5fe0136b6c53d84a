//! Recovering a JSON object from the model's free-form answer.
//!
//! Vision models are told to answer in JSON but routinely wrap it in a
//! Markdown fence, sometimes tagged `json`, sometimes not, and sometimes add
//! a sentence before or after. Extraction is a three-tier heuristic:
//!
//! 1. a ```` ```json ```` fence → text up to the next ```` ``` ````
//! 2. any ```` ``` ```` fence → text between the first and second marker
//! 3. otherwise the whole trimmed response
//!
//! An unclosed fence or more than one fenced block is rejected rather than
//! repaired. A rejected response is still kept verbatim in the failure record
//! so nothing the model produced is lost.

use crate::error::ParseError;
use crate::output::{ExtractionFailure, ExtractionResult, FailureKind, Provenance, RecipeRecord};
use serde_json::Value;
use tracing::warn;

const FENCE: &str = "```";
const JSON_FENCE: &str = "```json";

/// Locate the JSON text inside a model response.
pub fn extract_json_block(text: &str) -> Result<&str, ParseError> {
    if text.matches(FENCE).count() > 2 {
        return Err(ParseError::AmbiguousFences);
    }

    let opening = text
        .find(JSON_FENCE)
        .map(|pos| pos + JSON_FENCE.len())
        .or_else(|| text.find(FENCE).map(|pos| pos + FENCE.len()));

    match opening {
        Some(start) => {
            let len = text[start..].find(FENCE).ok_or(ParseError::AmbiguousFences)?;
            Ok(text[start..start + len].trim())
        }
        None => Ok(text.trim()),
    }
}

/// Parse the block as a JSON object.
pub fn parse_recipe_object(text: &str) -> Result<serde_json::Map<String, Value>, ParseError> {
    let block = extract_json_block(text)?;
    match serde_json::from_str::<Value>(block) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ParseError::NotAnObject(json_kind(&other))),
        Err(e) => Err(ParseError::InvalidJson(e.to_string())),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Turn a raw model response into a recipe or a parse-failure record.
pub fn parse_response(raw: &str, provenance: Provenance) -> ExtractionResult {
    match parse_recipe_object(raw) {
        Ok(obj) => ExtractionResult::Recipe(RecipeRecord::from_object(obj, provenance)),
        Err(e) => {
            warn!(
                "Failed to parse JSON from response for {}: {}",
                provenance.label(),
                e
            );
            ExtractionResult::Failure(ExtractionFailure {
                error: "Failed to parse JSON response".to_string(),
                failure_kind: FailureKind::Parse,
                recipe_lost: false,
                failed_images: Vec::new(),
                parse_error: Some(e.to_string()),
                raw_response: Some(raw.to_string()),
                provenance,
            })
        }
    }
}
