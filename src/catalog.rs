//! Import planning for the recipe catalog.
//!
//! Turns an extraction output file into the rows the catalog store would
//! insert, without touching any database. Failures and nameless records are
//! skipped; names are unique, first occurrence wins.

use crate::error::ExtractError;
use crate::prompts::{NOT_SPECIFIED, UNKNOWN};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// `source` used when a record doesn't name one.
pub const DEFAULT_SOURCE: &str = "Mimi's Collection";

/// One catalog row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub recipe_name: String,
    pub cuisine_type: Option<String>,
    pub difficulty: Option<String>,
    pub prep_time: Option<String>,
    pub cook_time: Option<String>,
    pub total_time: Option<String>,
    pub servings: Option<String>,
    pub ingredients: Value,
    /// Flattened ingredient lines for full-text search.
    pub ingredients_text: String,
    pub instructions: Value,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// An extraction failure record.
    Failed,
    MissingName,
    /// A record with the same name was already planned.
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRecord {
    /// Position in the input array.
    pub index: usize,
    pub recipe_name: Option<String>,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportPlan {
    pub entries: Vec<CatalogEntry>,
    pub skipped: Vec<SkippedRecord>,
}

/// Read an extraction output file (a JSON array).
pub fn load_results(path: impl AsRef<Path>) -> Result<Vec<Value>, ExtractError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| ExtractError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(serde_json::from_str(&text)?)
}

/// Plan the import of `records` in order.
pub fn plan_import(records: &[Value]) -> ImportPlan {
    let mut plan = ImportPlan::default();
    let mut seen = HashSet::new();

    for (index, record) in records.iter().enumerate() {
        let obj = record.as_object();
        let name = obj.and_then(|o| known_text(o, "recipe_name"));

        let reason = match (obj, &name) {
            (Some(o), None) if o.contains_key("error") => Some(SkipReason::Failed),
            (_, None) => Some(SkipReason::MissingName),
            (_, Some(n)) if seen.contains(n) => Some(SkipReason::Duplicate),
            _ => None,
        };

        match (reason, obj, name) {
            (None, Some(o), Some(n)) => {
                seen.insert(n.clone());
                plan.entries.push(catalog_entry(o, n));
            }
            (reason, _, recipe_name) => {
                let reason = reason.unwrap_or(SkipReason::MissingName);
                debug!("Skipping record {}: {:?}", index, reason);
                plan.skipped.push(SkippedRecord {
                    index,
                    recipe_name,
                    reason,
                });
            }
        }
    }
    plan
}

fn catalog_entry(o: &Map<String, Value>, recipe_name: String) -> CatalogEntry {
    let ingredients = o.get("ingredients").cloned().unwrap_or_else(|| Value::Array(Vec::new()));
    CatalogEntry {
        recipe_name,
        cuisine_type: text_field(o, "cuisine_type"),
        difficulty: text_field(o, "difficulty"),
        prep_time: text_field(o, "prep_time"),
        // Extraction records call it `cooking_time`.
        cook_time: text_field(o, "cook_time").or_else(|| text_field(o, "cooking_time")),
        total_time: text_field(o, "total_time"),
        servings: text_field(o, "servings"),
        ingredients_text: ingredients_search_text(&ingredients),
        ingredients,
        instructions: o
            .get("instructions")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new())),
        description: text_field(o, "description"),
        notes: text_field(o, "notes"),
        source: text_field(o, "source").unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
    }
}

/// `"<quantity> <unit> <item>"` per ingredient, joined by `" | "`.
///
/// Objects without a legible `item` and non-string scalars are ignored. When
/// an object has neither `quantity` nor `unit`, its `amount` stands in.
/// Placeholder values (`"unknown"`, `"not specified"`) count as absent.
pub fn ingredients_search_text(ingredients: &Value) -> String {
    let Some(items) = ingredients.as_array() else {
        return String::new();
    };
    items
        .iter()
        .filter_map(|ingredient| match ingredient {
            Value::String(s) => Some(s.clone()),
            Value::Object(o) => {
                let item = known_text(o, "item")?;
                let quantity = known_text(o, "quantity");
                let unit = known_text(o, "unit");
                let (quantity, unit) = if quantity.is_none() && unit.is_none() {
                    (known_text(o, "amount").unwrap_or_default(), String::new())
                } else {
                    (quantity.unwrap_or_default(), unit.unwrap_or_default())
                };
                Some(format!("{quantity} {unit} {item}").trim().to_string())
            }
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

fn text_field(o: &Map<String, Value>, key: &str) -> Option<String> {
    match o.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// [`text_field`], minus empty strings and the filler the extractor writes
/// for fields the model could not read.
fn known_text(o: &Map<String, Value>, key: &str) -> Option<String> {
    text_field(o, key).filter(|s| !is_placeholder(s))
}

fn is_placeholder(s: &str) -> bool {
    let s = s.trim();
    s.is_empty() || s.eq_ignore_ascii_case(UNKNOWN) || s.eq_ignore_ascii_case(NOT_SPECIFIED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{Provenance, RecipeRecord};
    use serde_json::json;

    fn extracted(model_reply: Value, provenance: Provenance) -> Value {
        let Value::Object(obj) = model_reply else {
            panic!("reply must be an object");
        };
        serde_json::to_value(RecipeRecord::from_object(obj, provenance)).unwrap()
    }

    #[test]
    fn search_text_formats_each_shape() {
        let ingredients = json!([
            {"item": "flour", "quantity": "2", "unit": "cups"},
            {"item": "eggs", "amount": "3"},
            {"item": "salt"},
            "1 tsp vanilla",
            {"amount": "no item"},
            42
        ]);
        assert_eq!(
            ingredients_search_text(&ingredients),
            "2 cups flour | 3  eggs | salt | 1 tsp vanilla"
        );
        assert_eq!(ingredients_search_text(&json!(null)), "");
    }

    #[test]
    fn plan_skips_failures_nameless_and_duplicates() {
        let records = vec![
            json!({"recipe_name": "Brisket", "cooking_time": "4 hours",
                   "ingredients": [{"item": "brisket", "amount": "5 lb"}],
                   "instructions": ["Braise."], "source_image": "a.jpg"}),
            json!({"error": "Failed to parse JSON response", "raw_response": "…",
                   "source_image": "b.jpg"}),
            json!({"recipe_name": ""}),
            json!({"recipe_name": "Brisket", "source": "Aunt Ruth"}),
            json!("not an object"),
        ];
        let plan = plan_import(&records);

        assert_eq!(plan.entries.len(), 1);
        let entry = &plan.entries[0];
        assert_eq!(entry.recipe_name, "Brisket");
        assert_eq!(entry.cook_time.as_deref(), Some("4 hours"));
        assert_eq!(entry.ingredients_text, "5 lb  brisket");
        assert_eq!(entry.source, DEFAULT_SOURCE);
        assert_eq!(entry.description, None);

        let reasons: Vec<_> = plan.skipped.iter().map(|s| (s.index, s.reason)).collect();
        assert_eq!(
            reasons,
            vec![
                (1, SkipReason::Failed),
                (2, SkipReason::MissingName),
                (3, SkipReason::Duplicate),
                (4, SkipReason::MissingName),
            ]
        );
        assert_eq!(plan.skipped[2].recipe_name.as_deref(), Some("Brisket"));
    }

    #[test]
    fn extractor_filler_is_not_a_recipe_name() {
        let records = vec![
            extracted(
                json!({"ingredients": [{"item": "flour"}]}),
                Provenance::pair("IMG_1.HEIC", "IMG_2.HEIC"),
            ),
            extracted(json!({"notes": "faded"}), Provenance::single("IMG_3.jpg")),
            extracted(
                json!({"recipe_name": "Not Specified"}),
                Provenance::single("IMG_4.jpg"),
            ),
        ];
        assert_eq!(records[0]["recipe_name"], UNKNOWN);

        let plan = plan_import(&records);
        assert!(plan.entries.is_empty());
        let reasons: Vec<_> = plan.skipped.iter().map(|s| (s.index, s.reason)).collect();
        assert_eq!(
            reasons,
            vec![
                (0, SkipReason::MissingName),
                (1, SkipReason::MissingName),
                (2, SkipReason::MissingName),
            ]
        );
    }

    #[test]
    fn extractor_filler_is_left_out_of_search_text() {
        let record = extracted(
            json!({"recipe_name": "Kugel",
                   "ingredients": [{"item": "noodles", "amount": "1 lb"},
                                   {"item": "flour"},
                                   {"amount": "2 cups"}]}),
            Provenance::single("IMG_5.jpg"),
        );
        let plan = plan_import(&[record]);
        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.entries[0].ingredients_text, "1 lb  noodles | flour");
    }

    #[test]
    fn load_results_reads_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extracted_recipes.json");
        std::fs::write(&path, r#"[{"recipe_name": "Latkes"}]"#).unwrap();
        let records = load_results(&path).unwrap();
        assert_eq!(plan_import(&records).entries[0].recipe_name, "Latkes");

        let err = load_results(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ExtractError::ReadFailed { .. }));
    }
}
