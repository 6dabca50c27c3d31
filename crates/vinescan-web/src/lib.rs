//! Browser bindings for the vinescan pipeline.
//!
//! This crate compiles to a WASM module the browser host loads directly.
//! It exposes two calls:
//!
//! - [`segment`]: decode and foliage-mask an image, nothing else. Lets
//!   the host show the segmented leaf before the model has loaded.
//! - [`classify`]: the full pipeline. The model itself lives on the JS
//!   side; the host passes a `predict(data, shape)` function that receives
//!   the flattened `(1, 224, 224, 3)` tensor as a `Float32Array` plus its
//!   shape and returns an array-like of four scores.
//!
//! Raster images are returned as raw RGBA `Uint8Array` buffers with their
//! dimensions. The verdict is a small JSON string ([`DisplayPayload`]).
//! Errors are thrown as JSON strings carrying the serialized
//! `PipelineError` and a user-facing message.
//!
//! No `tracing` subscriber is installed here, so the pipeline's stage
//! events are dropped in the browser. What reaches the console is the
//! diagnostics report, logged at debug level after every [`classify`].

use serde::Serialize;
use vinescan_pipeline::classifier::model_scores;
use vinescan_pipeline::diagnostics::Clock;
use vinescan_pipeline::preprocess::InputTensor;
use vinescan_pipeline::{
    Classifier, FoliageMasker, PipelineConfig, PipelineError, RecordLanguage, ScoreVector,
    StagedClassification,
};
use wasm_bindgen::prelude::*;

/// The verdict shown to the user, serialized as JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayPayload {
    /// Disease label.
    pub label: &'static str,
    /// Short description of the condition.
    pub description: &'static str,
    /// Recommended treatment.
    pub remedy: &'static str,
    /// Position of the winning class.
    pub class_index: usize,
    /// Raw model scores in class order.
    pub scores: Vec<f32>,
    /// Pixels kept by the foliage mask.
    pub foliage_pixels: u64,
    /// Fraction of the image kept by the foliage mask.
    pub coverage: f64,
}

impl DisplayPayload {
    /// Build the payload from a finished classification, with the record
    /// text in `language`.
    #[must_use]
    pub fn from_staged(staged: &StagedClassification, language: RecordLanguage) -> Self {
        let record = staged.result.record_in(language);
        Self {
            label: record.label,
            description: record.description,
            remedy: record.remedy,
            class_index: staged.result.class_index,
            scores: staged.result.scores.as_slice().to_vec(),
            foliage_pixels: staged.segmentation.foliage_pixels,
            coverage: staged.segmentation.coverage(),
        }
    }
}

/// Error body thrown to JS.
#[derive(Serialize)]
struct ErrorPayload<'a> {
    error: &'a PipelineError,
    message: String,
}

/// Parse the host's config JSON. An empty string means defaults.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if the JSON does not describe
/// a `PipelineConfig`.
pub fn parse_config(config_json: &str) -> Result<PipelineConfig, PipelineError> {
    if config_json.trim().is_empty() {
        return Ok(PipelineConfig::default());
    }
    serde_json::from_str(config_json).map_err(|e| PipelineError::InvalidConfig(e.to_string()))
}

/// Serialize an error for throwing across the WASM boundary.
#[must_use]
pub fn error_json(error: &PipelineError) -> String {
    let payload = ErrorPayload {
        error,
        message: error.user_message(),
    };
    serde_json::to_string(&payload)
        .unwrap_or_else(|ser_err| format!("\"serialization error: {ser_err}\""))
}

fn to_js_error(error: &PipelineError) -> JsValue {
    JsValue::from_str(&error_json(error))
}

/// [`Classifier`] that forwards to a host JavaScript function.
pub struct JsPredictor<'a> {
    predict: &'a js_sys::Function,
}

impl<'a> JsPredictor<'a> {
    /// Wrap a `predict(data: Float32Array, shape: number[])` function.
    #[must_use]
    pub const fn new(predict: &'a js_sys::Function) -> Self {
        Self { predict }
    }
}

impl Classifier for JsPredictor<'_> {
    fn predict(&self, input: &InputTensor) -> Result<ScoreVector, PipelineError> {
        let data = js_sys::Float32Array::from(input.to_vec().as_slice());
        let shape = js_sys::Array::new();
        for &dim in input.shape() {
            #[allow(clippy::cast_precision_loss)]
            shape.push(&JsValue::from_f64(dim as f64));
        }

        let returned = self
            .predict
            .call2(&JsValue::NULL, &data, &shape)
            .map_err(|e| PipelineError::Inference(format!("predict threw: {e:?}")))?;

        model_scores(scores_from_js(&returned)?)
    }
}

/// Read the value returned by the host's `predict`.
///
/// Only a plain `Array` or a `Float32Array` is accepted. Anything else,
/// a bare number in particular, would otherwise be coerced by the
/// `Float32Array` constructor into a buffer of zeros.
fn scores_from_js(returned: &JsValue) -> Result<Vec<f32>, PipelineError> {
    if let Some(typed) = returned.dyn_ref::<js_sys::Float32Array>() {
        return Ok(typed.to_vec());
    }
    if js_sys::Array::is_array(returned) {
        return Ok(js_sys::Float32Array::new(returned).to_vec());
    }
    Err(PipelineError::Inference(format!(
        "predict returned {returned:?}, expected an array of scores"
    )))
}

/// [`Clock`] backed by `performance.now()` through `web-time`.
struct WebClock;

impl Clock for WebClock {
    type Instant = web_time::Instant;

    fn now(&self) -> web_time::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &web_time::Instant) -> std::time::Duration {
        since.elapsed()
    }
}

/// Module initializer: route panics to the browser console.
#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
}

/// Set a field on a response object.
fn set(target: &js_sys::Object, key: &str, value: &JsValue) -> Result<(), JsValue> {
    js_sys::Reflect::set(target, &JsValue::from_str(key), value).map(|_| ())
}

fn set_raster(
    target: &js_sys::Object,
    prefix: &str,
    image: &vinescan_pipeline::types::RgbaImage,
) -> Result<(), JsValue> {
    set(target, &format!("{prefix}Width"), &JsValue::from_f64(f64::from(image.width())))?;
    set(target, &format!("{prefix}Height"), &JsValue::from_f64(f64::from(image.height())))?;
    set(
        target,
        &format!("{prefix}Pixels"),
        &js_sys::Uint8Array::from(image.as_raw().as_slice()),
    )
}

/// Decode and segment an image without running the model.
///
/// Returns an object with `originalWidth`, `originalHeight`,
/// `originalPixels`, `segmentedWidth`, `segmentedHeight`,
/// `segmentedPixels` (raw RGBA `Uint8Array`s) and `foliagePixels`.
///
/// # Errors
///
/// Throws a JSON error string (see [`error_json`]) if the config or image
/// cannot be parsed.
#[wasm_bindgen]
pub fn segment(image_bytes: &[u8], config_json: &str) -> Result<js_sys::Object, JsValue> {
    let config = parse_config(config_json).map_err(|e| to_js_error(&e))?;
    let image = vinescan_pipeline::preprocess::decode(image_bytes).map_err(|e| to_js_error(&e))?;
    let original = vinescan_pipeline::preprocess::to_rgba(&image);
    let segmentation = config.foliage_mask.segment(&original);

    let response = js_sys::Object::new();
    set_raster(&response, "original", &original)?;
    set_raster(&response, "segmented", &segmentation.image)?;
    #[allow(clippy::cast_precision_loss)]
    let foliage_pixels = segmentation.foliage_pixels as f64;
    set(&response, "foliagePixels", &JsValue::from_f64(foliage_pixels))?;
    Ok(response)
}

/// Run the full classification pipeline.
///
/// `predict` is called exactly once with `(data: Float32Array, shape:
/// number[])` and must return an array-like of scores in class order.
///
/// Returns an object with `payloadJson` (a JSON [`DisplayPayload`]) and
/// the original and segmented rasters as in [`segment`].
///
/// # Errors
///
/// Throws a JSON error string (see [`error_json`]) if any stage fails,
/// including a throwing `predict`.
#[wasm_bindgen]
pub fn classify(
    image_bytes: &[u8],
    config_json: &str,
    predict: &js_sys::Function,
) -> Result<js_sys::Object, JsValue> {
    let config = parse_config(config_json).map_err(|e| to_js_error(&e))?;
    let predictor = JsPredictor::new(predict);

    let (staged, diagnostics) = vinescan_pipeline::diagnostics::classify_with_diagnostics(
        image_bytes,
        &config,
        &predictor,
        &WebClock,
    )
    .map_err(|e| to_js_error(&e))?;

    web_sys::console::debug_1(&JsValue::from_str(&diagnostics.report()));

    let payload = DisplayPayload::from_staged(&staged, config.language);
    let payload_json = serde_json::to_string(&payload).map_err(|e| {
        to_js_error(&PipelineError::Context(format!(
            "failed to serialize display payload: {e}"
        )))
    })?;

    let response = js_sys::Object::new();
    set(&response, "payloadJson", &JsValue::from_str(&payload_json))?;
    set_raster(&response, "original", &staged.original)?;
    set_raster(&response, "segmented", staged.segmented())?;
    Ok(response)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use vinescan_pipeline::FoliageMaskKind;

    use super::*;

    struct Fixed(Vec<f32>);

    impl Classifier for Fixed {
        fn predict(&self, _input: &InputTensor) -> Result<ScoreVector, PipelineError> {
            Ok(ScoreVector::new(self.0.clone()))
        }
    }

    /// Host model stand-in: raw scores go through the same check as the
    /// values read back from JS.
    struct HostScores(Vec<f32>);

    impl Classifier for HostScores {
        fn predict(&self, _input: &InputTensor) -> Result<ScoreVector, PipelineError> {
            model_scores(self.0.clone())
        }
    }

    fn green_png() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(4, 4, image::Rgba([0, 200, 0, 255]));
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();
        buf
    }

    #[test]
    fn empty_config_means_defaults() {
        assert_eq!(parse_config("").unwrap(), PipelineConfig::default());
        assert_eq!(parse_config("  ").unwrap(), PipelineConfig::default());
    }

    #[test]
    fn config_selects_mask_strategy() {
        let config = parse_config(r#"{"foliage_mask":"HalfDegreeHue"}"#).unwrap();
        assert_eq!(config.foliage_mask, FoliageMaskKind::HalfDegreeHue);
    }

    #[test]
    fn bad_config_is_invalid_config_error() {
        let result = parse_config("{not json");
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn error_json_carries_kind_and_user_message() {
        let json = error_json(&PipelineError::EmptyInput);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["error"], "EmptyInput");
        assert_eq!(value["message"], "Please upload an image first.");
    }

    #[test]
    fn display_payload_from_staged() {
        let staged = vinescan_pipeline::classify_staged(
            &green_png(),
            &PipelineConfig::default(),
            &Fixed(vec![0.1, 0.6, 0.2, 0.1]),
        )
        .unwrap();
        let payload = DisplayPayload::from_staged(&staged, RecordLanguage::English);
        assert_eq!(payload.label, "Black Measles");
        assert_eq!(payload.class_index, 1);
        assert_eq!(payload.foliage_pixels, 16);
        assert_eq!(payload.scores, vec![0.1, 0.6, 0.2, 0.1]);

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["classIndex"], 1);
        assert_eq!(
            value["remedy"],
            "Practice orchard sanitation and control humidity."
        );
    }

    #[test]
    fn config_language_selects_record_text() {
        let config = parse_config(r#"{"language":"Indonesian"}"#).unwrap();
        assert_eq!(config.foliage_mask, PipelineConfig::DEFAULT_FOLIAGE_MASK);
        let staged = vinescan_pipeline::classify_staged(
            &green_png(),
            &config,
            &Fixed(vec![0.1, 0.6, 0.2, 0.1]),
        )
        .unwrap();
        let payload = DisplayPayload::from_staged(&staged, config.language);
        assert_eq!(payload.label, "Black Measles");
        assert_eq!(payload.remedy, "Terapkan sanitasi kebun dan kontrol kelembapan.");
    }

    #[test]
    fn host_scores_of_wrong_length_are_rejected() {
        let config = PipelineConfig::default();
        for scores in [vec![0.1, 0.2, 0.9], vec![], vec![0.2; 5]] {
            let result =
                vinescan_pipeline::classify_staged(&green_png(), &config, &HostScores(scores));
            let err = result.unwrap_err();
            assert!(matches!(err, PipelineError::ModelLoad(_)));
            let value: serde_json::Value = serde_json::from_str(&error_json(&err)).unwrap();
            assert!(value["error"]["ModelLoad"].is_string());
            assert_eq!(
                value["message"],
                "The classification model is unavailable. Please try again later."
            );
        }
    }

    #[test]
    fn host_scores_of_class_count_resolve() {
        let staged = vinescan_pipeline::classify_staged(
            &green_png(),
            &PipelineConfig::default(),
            &HostScores(vec![0.1, 0.2, 0.9, 0.3]),
        )
        .unwrap();
        assert_eq!(
            DisplayPayload::from_staged(&staged, RecordLanguage::English).label,
            "Leaf Blight"
        );
    }
}
