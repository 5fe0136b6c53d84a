//! Pipeline stages for recipe-card extraction.
//!
//! Each submodule implements exactly one step, so each can be tested without
//! the others and without a live model.
//!
//! ## Data Flow
//!
//! ```text
//! discover ──▶ sniff ──▶ normalize ──▶ encode ──▶ llm ──▶ parse
//! (dir/pairs)  (header)  (decoders)    (JPEG)     (VLM)   (JSON)
//! ```
//!
//! 1. [`discover`]: list image files by name and group them front/back
//! 2. [`sniff`]: read the header bytes and decide what a file really is
//! 3. [`normalize`]: run the decoder chain (HEIC, generic, OS converter);
//!    decoding runs in `spawn_blocking`
//! 4. [`encode`]: JPEG-encode and base64-wrap for the request body
//! 5. [`llm`]: one vision call per card; the only stage with network I/O
//! 6. [`parse`]: recover a JSON object from the free-form reply

pub mod discover;
pub mod encode;
pub mod llm;
pub mod normalize;
pub mod parse;
pub mod sniff;
