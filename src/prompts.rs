//! Prompts for VLM-based recipe-card extraction.
//!
//! Every prompt lives here so that changing what the model is asked for
//! touches exactly one place, and tests can inspect prompts without a model.
//!
//! Callers can override the system prompt via
//! [`crate::config::ExtractionConfig::system_prompt`]; the per-request
//! instructions are fixed.

/// Default system prompt: the recipe JSON schema and the "unknown" convention.
pub const SYSTEM_PROMPT: &str = r#"You are a recipe extraction expert. Analyze the provided image and extract recipe information in the following structured JSON format:

{
  "recipe_name": "Name of the recipe",
  "ingredients": [
    {
      "item": "ingredient name",
      "amount": "quantity and unit",
      "notes": "any additional notes or preparation instructions"
    }
  ],
  "instructions": [
    "Step 1: First instruction",
    "Step 2: Second instruction"
  ],
  "cooking_time": "estimated cooking time",
  "servings": "number of servings",
  "difficulty": "easy/medium/hard",
  "cuisine_type": "type of cuisine if identifiable",
  "dietary_info": ["vegetarian", "gluten-free", etc. if applicable],
  "notes": "any additional notes or observations"
}

Be as detailed and accurate as possible. If any information is unclear or not visible, use "unknown" or "not specified" as appropriate."#;

/// User instruction for a card photographed on one side only.
pub const SINGLE_INSTRUCTION: &str =
    "Please extract the recipe information from this image and provide it in the specified JSON format.";

/// User instruction for a front+back pair. Images follow in front, back order.
pub const PAIR_INSTRUCTION: &str = "Please extract the complete recipe information from these two images. \
The first image is the FRONT of the recipe card, and the second image is the BACK of the recipe card. \
Combine information from both sides to provide comprehensive recipe data in the specified JSON format.";

/// Literal the model is told to use for fields it cannot read.
pub const UNKNOWN: &str = "unknown";

/// The prompt's other placeholder for missing details.
pub const NOT_SPECIFIED: &str = "not specified";
