//! Output types: per-card results, recipe records, and run statistics.
//!
//! The JSON written to disk is an array of [`ExtractionResult`] values. A
//! success serialises as the recipe's fields plus provenance; a failure as an
//! `error` object plus the same provenance, so every entry maps back to the
//! photo(s) it came from.

use crate::prompts::UNKNOWN;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Where a result came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Provenance {
    /// A front+back pair.
    Pair {
        /// Both names, front first.
        source_images: Vec<String>,
        front_image: String,
        back_image: String,
    },
    /// A card with one photo (the odd file out).
    Single { source_image: String },
}

impl Provenance {
    pub fn single(name: impl Into<String>) -> Self {
        Provenance::Single {
            source_image: name.into(),
        }
    }

    pub fn pair(front: impl Into<String>, back: impl Into<String>) -> Self {
        let front = front.into();
        let back = back.into();
        Provenance::Pair {
            source_images: vec![front.clone(), back.clone()],
            front_image: front,
            back_image: back,
        }
    }

    pub fn is_pair(&self) -> bool {
        matches!(self, Provenance::Pair { .. })
    }

    /// Image names in front, back order.
    pub fn image_names(&self) -> Vec<&str> {
        match self {
            Provenance::Pair {
                front_image,
                back_image,
                ..
            } => vec![front_image.as_str(), back_image.as_str()],
            Provenance::Single { source_image } => vec![source_image.as_str()],
        }
    }

    /// Human-readable label, e.g. `"IMG_1.HEIC + IMG_2.HEIC"`.
    pub fn label(&self) -> String {
        self.image_names().join(" + ")
    }
}

/// Keys owned by [`Provenance`]; stripped from model output before injection.
const PROVENANCE_KEYS: &[&str] = &["source_image", "source_images", "front_image", "back_image"];

/// One ingredient line as returned by the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Ingredient {
    /// `{"item": …, "amount": …, "notes": …}` plus whatever else the model added.
    Detailed {
        item: String,
        amount: String,
        notes: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    /// A bare string such as `"2 cups flour"`.
    Plain(String),
}

impl Ingredient {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Object(mut obj) => Some(Ingredient::Detailed {
                item: scalar_string(obj.remove("item")),
                amount: scalar_string(obj.remove("amount")),
                notes: scalar_string(obj.remove("notes")),
                extra: obj,
            }),
            other => Some(Ingredient::Plain(scalar_string(Some(other)))),
        }
    }
}

/// A recipe recovered from one card.
///
/// Fields the model left out are filled with `"unknown"` (scalars) or empty
/// lists, matching what the model itself is told to answer when unsure.
/// Keys outside the schema are preserved in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipeRecord {
    pub recipe_name: String,
    pub ingredients: Vec<Ingredient>,
    pub instructions: Vec<String>,
    pub cooking_time: String,
    pub servings: String,
    pub difficulty: String,
    pub cuisine_type: String,
    pub dietary_info: Vec<String>,
    pub notes: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    #[serde(flatten)]
    pub provenance: Provenance,
}

impl RecipeRecord {
    /// Build a record from the model's JSON object and tag it with provenance.
    ///
    /// Never fails: non-string scalars are stringified, a lone string where a
    /// list is expected becomes a one-element list.
    pub fn from_object(mut obj: Map<String, Value>, provenance: Provenance) -> Self {
        for key in PROVENANCE_KEYS {
            obj.remove(*key);
        }
        let ingredients = match obj.remove("ingredients") {
            Some(Value::Array(items)) => items.into_iter().filter_map(Ingredient::from_value).collect(),
            Some(other) => Ingredient::from_value(other).into_iter().collect(),
            None => Vec::new(),
        };
        Self {
            recipe_name: scalar_string(obj.remove("recipe_name")),
            ingredients,
            instructions: string_list(obj.remove("instructions")),
            cooking_time: scalar_string(obj.remove("cooking_time")),
            servings: scalar_string(obj.remove("servings")),
            difficulty: scalar_string(obj.remove("difficulty")),
            cuisine_type: scalar_string(obj.remove("cuisine_type")),
            dietary_info: string_list(obj.remove("dietary_info")),
            notes: scalar_string(obj.remove("notes")),
            extra: obj,
            provenance,
        }
    }
}

fn scalar_string(value: Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => UNKNOWN.to_string(),
        Some(Value::String(s)) => s,
        Some(Value::Array(items)) => items
            .into_iter()
            .filter(|v| !v.is_null())
            .map(|v| scalar_string(Some(v)))
            .collect::<Vec<_>>()
            .join("; "),
        Some(other) => other.to_string(),
    }
}

fn string_list(value: Option<Value>) -> Vec<String> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .into_iter()
            .filter(|v| !v.is_null())
            .map(|v| scalar_string(Some(v)))
            .collect(),
        Some(other) => vec![scalar_string(Some(other))],
    }
}

/// Which stage a card failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No decoder could read at least one image; the model was never called.
    Image,
    /// The vision call itself failed.
    Transport,
    /// The model answered but no JSON object could be recovered.
    Parse,
}

/// A card that did not produce a recipe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionFailure {
    pub error: String,
    pub failure_kind: FailureKind,
    /// Pair only: at least one side could not be decoded, so nothing was sent.
    #[serde(skip_serializing_if = "is_false")]
    pub recipe_lost: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_images: Vec<String>,
    /// Parser diagnostic (parse failures only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
    /// The model's untouched response, kept for manual recovery.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    #[serde(flatten)]
    pub provenance: Provenance,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// The outcome for one card.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExtractionResult {
    Recipe(RecipeRecord),
    Failure(ExtractionFailure),
}

impl ExtractionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionResult::Recipe(_))
    }

    pub fn recipe(&self) -> Option<&RecipeRecord> {
        match self {
            ExtractionResult::Recipe(r) => Some(r),
            ExtractionResult::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ExtractionFailure> {
        match self {
            ExtractionResult::Failure(f) => Some(f),
            ExtractionResult::Recipe(_) => None,
        }
    }

    pub fn provenance(&self) -> &Provenance {
        match self {
            ExtractionResult::Recipe(r) => &r.provenance,
            ExtractionResult::Failure(f) => &f.provenance,
        }
    }

    /// True for a pair abandoned because one of its images was unreadable.
    pub fn is_lost(&self) -> bool {
        self.failure().is_some_and(|f| f.recipe_lost)
    }
}

/// Counts for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Number of image files discovered.
    pub total_images: usize,
    /// Pairs plus singletons; equals the length of the results array.
    pub total_items: usize,
    pub succeeded: usize,
    pub parse_failures: usize,
    pub transport_failures: usize,
    /// Image failures of any kind, lost pairs included.
    pub image_failures: usize,
    pub lost_pairs: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
}

impl ExtractionStats {
    /// Tally outcome counts. Token and timing fields are left at zero.
    pub fn tally(total_images: usize, results: &[ExtractionResult]) -> Self {
        let mut stats = ExtractionStats {
            total_images,
            total_items: results.len(),
            ..Default::default()
        };
        for result in results {
            match result {
                ExtractionResult::Recipe(_) => stats.succeeded += 1,
                ExtractionResult::Failure(f) => {
                    match f.failure_kind {
                        FailureKind::Image => stats.image_failures += 1,
                        FailureKind::Transport => stats.transport_failures += 1,
                        FailureKind::Parse => stats.parse_failures += 1,
                    }
                    if f.recipe_lost {
                        stats.lost_pairs += 1;
                    }
                }
            }
        }
        stats
    }

    pub fn failed(&self) -> usize {
        self.total_items.saturating_sub(self.succeeded)
    }
}

/// Full output of an extraction run.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutput {
    /// One entry per card, in sorted-filename order.
    pub results: Vec<ExtractionResult>,
    pub stats: ExtractionStats,
}

impl ExtractionOutput {
    /// Pretty-printed JSON array of results, as written to the output file.
    pub fn results_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.results)
    }
}
