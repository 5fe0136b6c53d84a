//! Integration tests for directory extraction.
//!
//! The vision model is replaced by a scripted [`VisionClient`] that counts
//! calls, so these run offline. Card photos are generated with the `image`
//! crate into a scratch directory.

use recipe_extract::{
    extract_with_client, inspect_image, plan_pairs, write_results, DecoderKind, ExtractError,
    ExtractionConfig, ExtractionProgressCallback, FailureKind, FallbackConverter, Provenance,
    VisionClient, VisionError, VisionRequest, VisionResponse,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Answers from a script; once the script runs out, every card is "Card N".
#[derive(Default)]
struct ScriptedClient {
    calls: AtomicUsize,
    script: Mutex<VecDeque<Result<VisionResponse, VisionError>>>,
    /// `(image count, max_tokens)` of every request received.
    seen: Mutex<Vec<(usize, usize)>>,
}

impl ScriptedClient {
    fn with_script(script: Vec<Result<VisionResponse, VisionError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn seen(&self) -> Vec<(usize, usize)> {
        self.seen.lock().unwrap().clone()
    }
}

impl VisionClient for ScriptedClient {
    async fn complete(&self, request: VisionRequest) -> Result<VisionResponse, VisionError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen
            .lock()
            .unwrap()
            .push((request.images.len(), request.max_tokens));
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(reply(&format!("{{\"recipe_name\": \"Card {n}\"}}"))))
    }
}

fn reply(text: &str) -> VisionResponse {
    VisionResponse {
        text: text.to_string(),
        input_tokens: 100,
        output_tokens: 20,
    }
}

fn write_jpeg(dir: &Path, name: &str) {
    let img = image::RgbImage::from_fn(16, 12, |x, y| image::Rgb([(x * 15) as u8, (y * 20) as u8, 128]));
    img.save_with_format(dir.join(name), image::ImageFormat::Jpeg)
        .unwrap();
}

fn write_garbage(dir: &Path, name: &str, bytes: &[u8]) {
    std::fs::write(dir.join(name), bytes).unwrap();
}

/// No OS converter: tests must not depend on sips or ImageMagick.
fn config() -> ExtractionConfig {
    ExtractionConfig::builder()
        .fallback(FallbackConverter::Disabled)
        .build()
        .unwrap()
}

// ── Pairing ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn three_images_yield_pair_then_single() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["c.jpg", "a.jpg", "b.jpg"] {
        write_jpeg(dir.path(), name);
    }
    let client = ScriptedClient::default();

    let output = extract_with_client(dir.path(), &client, &config())
        .await
        .unwrap();

    assert_eq!(output.results.len(), 2);
    assert_eq!(
        output.results[0].provenance(),
        &Provenance::pair("a.jpg", "b.jpg")
    );
    assert_eq!(output.results[1].provenance(), &Provenance::single("c.jpg"));
    assert!(output.results.iter().all(|r| r.is_success()));

    // The pair goes in one request with both photos and the larger budget.
    assert_eq!(client.seen(), vec![(2, 1500), (1, 1000)]);
    assert_eq!(output.stats.total_images, 3);
    assert_eq!(output.stats.succeeded, 2);
}

#[tokio::test]
async fn result_count_is_half_the_images_rounded_up() {
    for n in 0..=5usize {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..n {
            write_jpeg(dir.path(), &format!("IMG_{i:04}.jpg"));
        }
        let client = ScriptedClient::default();
        let output = extract_with_client(dir.path(), &client, &config())
            .await
            .unwrap();

        assert_eq!(output.results.len(), n.div_ceil(2), "n = {n}");
        let singles = output
            .results
            .iter()
            .filter(|r| !r.provenance().is_pair())
            .count();
        assert_eq!(singles, n % 2, "n = {n}");
        if n % 2 == 1 {
            assert!(!output.results.last().unwrap().provenance().is_pair());
        }
    }
}

#[test]
fn pairing_plan_is_deterministic_and_skips_other_files() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["IMG_0003.HEIC", "IMG_0001.jpg", "IMG_0002.PNG", "IMG_0004.jpeg"] {
        write_jpeg(dir.path(), name);
    }
    write_garbage(dir.path(), "notes.txt", b"grandma's handwriting key");
    std::fs::create_dir(dir.path().join("sub.jpg")).unwrap();

    let first = plan_pairs(dir.path(), &config()).unwrap();
    let second = plan_pairs(dir.path(), &config()).unwrap();
    assert_eq!(first, second);

    let labels: Vec<String> = first.iter().map(|p| p.label()).collect();
    assert_eq!(
        labels,
        vec!["IMG_0001.jpg + IMG_0002.PNG", "IMG_0003.HEIC + IMG_0004.jpeg"]
    );
}

#[tokio::test]
async fn missing_directory_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let client = ScriptedClient::default();
    let err = extract_with_client(dir.path().join("nope"), &client, &config())
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::DirectoryNotFound { .. }));
    assert_eq!(client.calls(), 0);
}

// ── Failure handling ─────────────────────────────────────────────────────────

#[tokio::test]
async fn unreadable_side_loses_the_pair_without_calling_the_model() {
    let dir = tempfile::tempdir().unwrap();
    write_jpeg(dir.path(), "IMG_0001.jpg");
    // Claims HEIC, has the container marker, but is not decodable.
    write_garbage(
        dir.path(),
        "IMG_0002.HEIC",
        b"\x00\x00\x00\x18ftypheic\x00\x00\x00\x00garbage",
    );
    let client = ScriptedClient::default();

    let output = extract_with_client(dir.path(), &client, &config())
        .await
        .unwrap();

    assert_eq!(client.calls(), 0);
    assert_eq!(output.results.len(), 1);
    let lost = &output.results[0];
    assert!(lost.is_lost());

    let v = serde_json::to_value(lost).unwrap();
    assert_eq!(v["recipe_lost"], true);
    assert_eq!(v["failed_images"], serde_json::json!(["IMG_0002.HEIC"]));
    assert_eq!(v["front_image"], "IMG_0001.jpg");
    assert_eq!(v["back_image"], "IMG_0002.HEIC");
    assert!(v["error"]
        .as_str()
        .unwrap()
        .starts_with("Recipe pair lost - failed to process images: IMG_0002.HEIC"));

    assert_eq!(output.stats.lost_pairs, 1);
    assert_eq!(output.stats.image_failures, 1);
}

#[tokio::test]
async fn transport_failure_is_recorded_and_the_run_continues() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a.jpg", "b.jpg", "c.jpg", "d.jpg"] {
        write_jpeg(dir.path(), name);
    }
    let client = ScriptedClient::with_script(vec![Err(VisionError::Api {
        message: "503 Service Unavailable".into(),
    })]);

    let output = extract_with_client(dir.path(), &client, &config())
        .await
        .unwrap();

    assert_eq!(client.calls(), 2);
    let failure = output.results[0].failure().unwrap();
    assert_eq!(failure.failure_kind, FailureKind::Transport);
    assert!(failure.error.contains("503"));
    assert!(output.results[1].is_success());
    assert_eq!(output.stats.transport_failures, 1);
    assert_eq!(output.stats.succeeded, 1);
}

#[tokio::test]
async fn prose_reply_keeps_raw_response() {
    let dir = tempfile::tempdir().unwrap();
    write_jpeg(dir.path(), "only.jpg");
    let raw = "Sorry, I can't make out the handwriting on this card.";
    let client = ScriptedClient::with_script(vec![Ok(reply(raw))]);

    let output = extract_with_client(dir.path(), &client, &config())
        .await
        .unwrap();

    let v = serde_json::to_value(&output.results[0]).unwrap();
    assert_eq!(v["error"], "Failed to parse JSON response");
    assert_eq!(v["raw_response"], raw);
    assert_eq!(v["source_image"], "only.jpg");
    assert_eq!(output.stats.parse_failures, 1);
}

#[tokio::test]
async fn fenced_reply_becomes_a_recipe_with_provenance() {
    let dir = tempfile::tempdir().unwrap();
    write_jpeg(dir.path(), "front.jpg");
    write_jpeg(dir.path(), "rear.jpg");
    let client = ScriptedClient::with_script(vec![Ok(reply(
        "Here you go:\n```json\n{\"recipe_name\": \"Mandelbrot\", \"servings\": 24}\n```",
    ))]);

    let output = extract_with_client(dir.path(), &client, &config())
        .await
        .unwrap();

    let recipe = output.results[0].recipe().unwrap();
    assert_eq!(recipe.recipe_name, "Mandelbrot");
    assert_eq!(recipe.servings, "24");
    assert_eq!(recipe.cooking_time, "unknown");
    assert_eq!(recipe.provenance, Provenance::pair("front.jpg", "rear.jpg"));
    assert_eq!(output.stats.total_input_tokens, 100);
    assert_eq!(output.stats.total_output_tokens, 20);
}

// ── Normalisation ────────────────────────────────────────────────────────────

#[tokio::test]
async fn mislabelled_heic_decodes_through_the_generic_path() {
    let dir = tempfile::tempdir().unwrap();
    write_jpeg(dir.path(), "photo.heic");

    let diag = inspect_image(dir.path().join("photo.heic"), &config())
        .await
        .unwrap();

    assert!(!diag.format.true_heic);
    assert_eq!(diag.plan, vec![DecoderKind::Generic]);
    assert_eq!(diag.format.to_string().split(", ").nth(1), Some("Detected: JPEG"));
    let enc = diag.encoding.expect("should encode");
    assert_eq!(enc.decoder, DecoderKind::Generic);
    assert!(enc.base64_len > enc.jpeg_bytes);
    assert!(diag.error.is_none());
}

#[tokio::test]
async fn undecodable_image_reports_every_attempt() {
    let dir = tempfile::tempdir().unwrap();
    write_garbage(dir.path(), "broken.png", b"\x89PNG\r\n\x1a\ntruncated");

    let diag = inspect_image(dir.path().join("broken.png"), &config())
        .await
        .unwrap();

    assert!(diag.encoding.is_none());
    let err = diag.error.unwrap();
    assert!(err.contains("broken.png"), "got: {err}");
    assert!(err.contains("generic decoder"), "got: {err}");
    assert!(err.contains("external decoder"), "got: {err}");
}

// ── Output ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn results_file_is_a_utf8_array_with_one_entry_per_card() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["1.jpg", "2.jpg", "3.jpg"] {
        write_jpeg(dir.path(), name);
    }
    let client = ScriptedClient::with_script(vec![Ok(reply(
        "{\"recipe_name\": \"Crème brûlée\", \"ingredients\": []}",
    ))]);
    let output = extract_with_client(dir.path(), &client, &config())
        .await
        .unwrap();

    let out_dir = tempfile::tempdir().unwrap();
    let path = out_dir.path().join("nested").join("extracted_recipes.json");
    write_results(&output, &path).await.unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("Crème brûlée"));
    let parsed: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed.as_array().unwrap().len(), 2);
    assert!(!path.with_extension("json.tmp").exists());
}

// ── Progress ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl ExtractionProgressCallback for Recorder {
    fn on_run_start(&self, total_items: usize) {
        self.events.lock().unwrap().push(format!("start {total_items}"));
    }
    fn on_item_complete(&self, index: usize, _total: usize, label: &str) {
        self.events.lock().unwrap().push(format!("ok {index} {label}"));
    }
    fn on_item_error(&self, index: usize, _total: usize, label: &str, _error: &str) {
        self.events.lock().unwrap().push(format!("err {index} {label}"));
    }
    fn on_run_complete(&self, total_items: usize, succeeded: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("done {succeeded}/{total_items}"));
    }
}

#[tokio::test]
async fn progress_events_follow_card_order() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a.jpg", "b.jpg", "c.jpg"] {
        write_jpeg(dir.path(), name);
    }
    let recorder = Arc::new(Recorder::default());
    let config = ExtractionConfig::builder()
        .fallback(FallbackConverter::Disabled)
        .progress_callback(Arc::clone(&recorder) as Arc<dyn ExtractionProgressCallback>)
        .build()
        .unwrap();
    let client = ScriptedClient::with_script(vec![Ok(reply("no json here"))]);

    extract_with_client(dir.path(), &client, &config)
        .await
        .unwrap();

    assert_eq!(
        *recorder.events.lock().unwrap(),
        vec![
            "start 2",
            "err 1 a.jpg + b.jpg",
            "ok 2 c.jpg",
            "done 1/2",
        ]
    );
}
