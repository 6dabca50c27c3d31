//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! Unlike [`crate::classify_staged`] which runs the entire pipeline in one
//! call, [`Pipeline`] lets the caller drive execution one step at a time:
//!
//! ```rust
//! # use vinescan_pipeline::{Classifier, Pipeline, PipelineConfig, PipelineError};
//! # fn run(png: Vec<u8>, model: &impl Classifier) -> Result<(), PipelineError> {
//! let segmented = Pipeline::new(png, PipelineConfig::default())
//!     .decode()?
//!     .segment();
//!
//! // The masked leaf can be shown before the model runs.
//! let _preview = segmented.segmented();
//!
//! let staged = segmented
//!     .prepare_input()
//!     .infer(model)?
//!     .resolve()?
//!     .into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next pipeline state
//! (or `Result` for fallible stages), carrying all previously computed
//! intermediates.

use crate::classifier::Classifier;
use crate::diagnostics::StageMetrics;
use crate::foliage::{FoliageMasker, Segmentation};
use crate::preprocess::InputTensor;
use crate::resolve::{ClassificationResult, ScoreVector};
use crate::types::{Dimensions, PipelineConfig, PipelineError, RgbaImage, StagedClassification};

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
///
/// Call [`decode`](Self::decode) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .decode() to continue"]
pub struct Pending {
    config: PipelineConfig,
    source: Vec<u8>,
}

impl Pending {
    /// The raw source image bytes.
    #[must_use]
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    /// Decode the source image and advance to the [`Decoded`] stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyInput`] if the source bytes are
    /// empty. Returns [`PipelineError::ImageDecode`] if the image
    /// format is unrecognized or the data is corrupt.
    pub fn decode(self) -> Result<Decoded, PipelineError> {
        let source_len = self.source.len();
        let image = crate::preprocess::decode(&self.source)?;
        let original = crate::preprocess::to_rgba(&image);
        let dimensions = Dimensions::of(&original);
        tracing::debug!(
            bytes = source_len,
            width = dimensions.width,
            height = dimensions.height,
            "decoded image"
        );
        Ok(Decoded {
            config: self.config,
            original,
            dimensions,
            source_len,
        })
    }
}

// ───────────────────────── Stage 1: Decoded ──────────────────────────

/// Pipeline state after decoding the source image.
///
/// Call [`segment`](Self::segment) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .segment() to continue"]
pub struct Decoded {
    config: PipelineConfig,
    original: RgbaImage,
    dimensions: Dimensions,
    source_len: usize,
}

impl Decoded {
    /// The original decoded RGBA image.
    #[must_use]
    pub const fn original(&self) -> &RgbaImage {
        &self.original
    }

    /// Source image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Apply the configured foliage mask and advance to [`Segmented`].
    pub fn segment(self) -> Segmented {
        let segmentation = self.config.foliage_mask.segment(&self.original);
        tracing::debug!(
            mask = %self.config.foliage_mask,
            foliage_pixels = segmentation.foliage_pixels,
            coverage = segmentation.coverage(),
            "segmented foliage"
        );
        Segmented {
            config: self.config,
            original: self.original,
            segmentation,
            dimensions: self.dimensions,
        }
    }
}

// ───────────────────────── Stage 2: Segmented ────────────────────────

/// Pipeline state after foliage segmentation.
///
/// The segmented image is final at this point; nothing later touches it.
/// Call [`prepare_input`](Self::prepare_input) to advance.
#[must_use = "pipeline stages are consumed by advancing — call .prepare_input() to continue"]
pub struct Segmented {
    config: PipelineConfig,
    original: RgbaImage,
    segmentation: Segmentation,
    dimensions: Dimensions,
}

impl Segmented {
    /// The foliage-masked image.
    #[must_use]
    pub const fn segmented(&self) -> &RgbaImage {
        &self.segmentation.image
    }

    /// Full segmentation output, including the binary mask.
    #[must_use]
    pub const fn segmentation(&self) -> &Segmentation {
        &self.segmentation
    }

    /// Resize the masked image into the model input tensor.
    pub fn prepare_input(self) -> Prepared {
        let tensor = InputTensor::from_rgba(&self.segmentation.image);
        tracing::debug!(shape = ?tensor.shape(), "prepared model input");
        Prepared {
            config: self.config,
            original: self.original,
            segmentation: self.segmentation,
            tensor,
            dimensions: self.dimensions,
        }
    }
}

// ───────────────────────── Stage 3: Prepared ─────────────────────────

/// Pipeline state holding the model input tensor.
///
/// Call [`infer`](Self::infer) with a [`Classifier`] to advance.
#[must_use = "pipeline stages are consumed by advancing — call .infer() to continue"]
pub struct Prepared {
    config: PipelineConfig,
    original: RgbaImage,
    segmentation: Segmentation,
    tensor: InputTensor,
    dimensions: Dimensions,
}

impl Prepared {
    /// The `(1, 224, 224, 3)` model input.
    #[must_use]
    pub const fn tensor(&self) -> &InputTensor {
        &self.tensor
    }

    /// Run the model once and advance to [`Inferred`].
    ///
    /// # Errors
    ///
    /// Propagates whatever the classifier returns, typically
    /// [`PipelineError::Inference`].
    pub fn infer<C: Classifier + ?Sized>(self, classifier: &C) -> Result<Inferred, PipelineError> {
        let scores = classifier.predict(&self.tensor)?;
        tracing::debug!(scores = ?scores.as_slice(), "model returned scores");
        Ok(Inferred {
            config: self.config,
            original: self.original,
            segmentation: self.segmentation,
            tensor: self.tensor,
            scores,
            dimensions: self.dimensions,
        })
    }
}

// ───────────────────────── Stage 4: Inferred ─────────────────────────

/// Pipeline state after the model produced its scores.
///
/// Call [`resolve`](Self::resolve) to advance.
#[must_use = "pipeline stages are consumed by advancing — call .resolve() to continue"]
pub struct Inferred {
    config: PipelineConfig,
    original: RgbaImage,
    segmentation: Segmentation,
    tensor: InputTensor,
    scores: ScoreVector,
    dimensions: Dimensions,
}

impl Inferred {
    /// Raw model scores.
    #[must_use]
    pub const fn scores(&self) -> &ScoreVector {
        &self.scores
    }

    /// Pick the winning class and advance to [`Resolved`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoScores`] or
    /// [`PipelineError::UnknownClass`] when the scores cannot be mapped to
    /// a disease.
    pub fn resolve(self) -> Result<Resolved, PipelineError> {
        let result = crate::resolve::resolve(self.scores)?;
        tracing::debug!(
            label = result.label(),
            index = result.class_index,
            "resolved classification"
        );
        Ok(Resolved {
            config: self.config,
            original: self.original,
            segmentation: self.segmentation,
            tensor: self.tensor,
            result,
            dimensions: self.dimensions,
        })
    }
}

// ───────────────────────── Stage 5: Resolved ─────────────────────────

/// Final pipeline state.
///
/// Call [`into_result`](Self::into_result) to extract the
/// [`StagedClassification`] containing all intermediates.
#[must_use = "call .into_result() to extract the StagedClassification"]
pub struct Resolved {
    config: PipelineConfig,
    original: RgbaImage,
    segmentation: Segmentation,
    tensor: InputTensor,
    result: ClassificationResult,
    dimensions: Dimensions,
}

impl Resolved {
    /// The classification.
    #[must_use]
    pub const fn result(&self) -> &ClassificationResult {
        &self.result
    }

    /// The configuration this run used.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Consume the pipeline and return the full [`StagedClassification`].
    #[must_use]
    pub fn into_result(self) -> StagedClassification {
        StagedClassification {
            original: self.original,
            segmentation: self.segmentation,
            tensor: self.tensor,
            result: self.result,
            dimensions: self.dimensions,
        }
    }
}

// ─────────────────────────── PipelineStage ───────────────────────────

/// Total number of stages in the pipeline.
pub const STAGE_COUNT: usize = 6;

/// Uniform view over every stage that has performed work.
///
/// [`Pending`] has processed nothing and does not implement it; it is
/// stage index 0.
pub trait PipelineStage {
    /// Human-readable name of this stage (e.g. `"decode"`, `"segment"`).
    const NAME: &str;

    /// Zero-based index of this stage (`1` for Decoded through `5` for
    /// Resolved).
    const INDEX: usize;

    /// Metrics describing the work done to reach this state.
    fn metrics(&self) -> StageMetrics;
}

impl PipelineStage for Decoded {
    const NAME: &str = "decode";
    const INDEX: usize = 1;

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Decode {
            input_bytes: self.source_len,
            width: self.dimensions.width,
            height: self.dimensions.height,
            pixel_count: self.dimensions.pixel_count(),
        }
    }
}

impl PipelineStage for Segmented {
    const NAME: &str = "segment";
    const INDEX: usize = 2;

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Segment {
            mask: self.config.foliage_mask.to_string(),
            foliage_pixels: self.segmentation.foliage_pixels,
            total_pixels: self.dimensions.pixel_count(),
            coverage: self.segmentation.coverage(),
        }
    }
}

impl PipelineStage for Prepared {
    const NAME: &str = "resize";
    const INDEX: usize = 3;

    fn metrics(&self) -> StageMetrics {
        let shape = self.tensor.shape();
        StageMetrics::Resize {
            source_width: self.dimensions.width,
            source_height: self.dimensions.height,
            target_size: crate::preprocess::MODEL_INPUT_SIZE,
            tensor_len: shape.iter().product(),
        }
    }
}

impl PipelineStage for Inferred {
    const NAME: &str = "inference";
    const INDEX: usize = 4;

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Inference {
            score_count: self.scores.len(),
        }
    }
}

impl PipelineStage for Resolved {
    const NAME: &str = "resolve";
    const INDEX: usize = 5;

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Resolve {
            label: self.result.label().to_string(),
            class_index: self.result.class_index,
            score: self.result.winning_score().unwrap_or(f32::NAN),
        }
    }
}

/// Entry point for the incremental pipeline.
pub struct Pipeline;

impl Pipeline {
    /// Create a new pipeline from source image bytes and config.
    ///
    /// No processing is performed: the bytes and config are simply
    /// stored. Call [`.decode()`](Pending::decode) to begin processing.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(image_bytes: Vec<u8>, config: PipelineConfig) -> Pending {
        Pending {
            config,
            source: image_bytes,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::foliage::FoliageMaskKind;

    /// Encode a half-green / half-red PNG.
    fn split_leaf_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(width, height, |x, _y| {
            if x < width / 2 {
                image::Rgba([0, 200, 0, 255])
            } else {
                image::Rgba([200, 0, 0, 255])
            }
        });
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

    /// Returns fixed scores and remembers the first tensor value it saw.
    struct Fixed {
        scores: Vec<f32>,
        seen: RefCell<Vec<f32>>,
    }

    impl Fixed {
        fn new(scores: Vec<f32>) -> Self {
            Self {
                scores,
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl Classifier for Fixed {
        fn predict(&self, input: &InputTensor) -> Result<ScoreVector, PipelineError> {
            self.seen.borrow_mut().push(input.as_array()[[0, 0, 0, 1]]);
            Ok(ScoreVector::new(self.scores.clone()))
        }
    }

    struct Failing;

    impl Classifier for Failing {
        fn predict(&self, _input: &InputTensor) -> Result<ScoreVector, PipelineError> {
            Err(PipelineError::Inference("boom".to_string()))
        }
    }

    #[test]
    fn pending_exposes_source_bytes() {
        let png = split_leaf_png(8, 8);
        let expected_len = png.len();
        let pending = Pipeline::new(png, PipelineConfig::default());
        assert_eq!(pending.source().len(), expected_len);
    }

    #[test]
    fn decode_empty_input_returns_error() {
        let result = Pipeline::new(vec![], PipelineConfig::default()).decode();
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn decode_corrupt_input_returns_error() {
        let result = Pipeline::new(vec![0xFF, 0x00], PipelineConfig::default()).decode();
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn decoded_exposes_original_and_metrics() {
        let png = split_leaf_png(10, 6);
        let len = png.len();
        let decoded = Pipeline::new(png, PipelineConfig::default())
            .decode()
            .unwrap();
        assert_eq!(decoded.original().dimensions(), (10, 6));
        assert!(matches!(
            decoded.metrics(),
            StageMetrics::Decode { input_bytes, width: 10, height: 6, pixel_count: 60 }
                if input_bytes == len
        ));
    }

    #[test]
    fn segmented_image_is_available_before_inference() {
        let segmented = Pipeline::new(split_leaf_png(10, 6), PipelineConfig::default())
            .decode()
            .unwrap()
            .segment();
        assert_eq!(segmented.segmented().get_pixel(0, 0).0, [0, 200, 0, 255]);
        assert_eq!(segmented.segmented().get_pixel(9, 0).0, [0, 0, 0, 255]);
        assert_eq!(segmented.segmentation().foliage_pixels, 30);
    }

    #[test]
    fn segment_uses_configured_strategy() {
        // (0, 30, 0): value 30 is kept by DegreeHue, dropped by HalfDegreeHue.
        let img = RgbaImage::from_pixel(2, 2, image::Rgba([0, 30, 0, 255]));
        let mut buf = Vec::new();
        image::ImageEncoder::write_image(
            image::codecs::png::PngEncoder::new(&mut buf),
            img.as_raw(),
            2,
            2,
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();

        let config = PipelineConfig {
            foliage_mask: FoliageMaskKind::HalfDegreeHue,
            ..PipelineConfig::default()
        };
        let segmented = Pipeline::new(buf, config).decode().unwrap().segment();
        assert_eq!(segmented.segmentation().foliage_pixels, 0);
    }

    #[test]
    fn prepared_tensor_has_model_shape() {
        let prepared = Pipeline::new(split_leaf_png(10, 6), PipelineConfig::default())
            .decode()
            .unwrap()
            .segment()
            .prepare_input();
        assert_eq!(prepared.tensor().shape(), &[1, 224, 224, 3]);
        assert!(matches!(
            prepared.metrics(),
            StageMetrics::Resize { tensor_len, .. } if tensor_len == 224 * 224 * 3
        ));
    }

    #[test]
    fn classifier_sees_segmented_input() {
        let model = Fixed::new(vec![0.1, 0.2, 0.3, 0.4]);
        let _ = Pipeline::new(split_leaf_png(10, 6), PipelineConfig::default())
            .decode()
            .unwrap()
            .segment()
            .prepare_input()
            .infer(&model)
            .unwrap();
        // Top-left pixel is green: the green channel reaches the model.
        assert_eq!(*model.seen.borrow(), vec![200.0]);
    }

    #[test]
    fn full_typed_pipeline() {
        let model = Fixed::new(vec![0.1, 0.2, 0.9, 0.4]);
        let resolved = Pipeline::new(split_leaf_png(10, 6), PipelineConfig::default())
            .decode()
            .unwrap()
            .segment()
            .prepare_input()
            .infer(&model)
            .unwrap()
            .resolve()
            .unwrap();
        assert_eq!(resolved.result().label(), "Leaf Blight");
        let staged = resolved.into_result();
        assert_eq!(
            staged.dimensions,
            Dimensions {
                width: 10,
                height: 6
            }
        );
        assert_eq!(staged.result.scores.as_slice(), &[0.1, 0.2, 0.9, 0.4]);
        assert_eq!(staged.segmented().dimensions(), (10, 6));
    }

    #[test]
    fn inference_failure_propagates_untouched() {
        let result = Pipeline::new(split_leaf_png(4, 4), PipelineConfig::default())
            .decode()
            .unwrap()
            .segment()
            .prepare_input()
            .infer(&Failing);
        assert!(matches!(result, Err(PipelineError::Inference(msg)) if msg == "boom"));
    }

    #[test]
    fn resolve_failure_on_empty_scores() {
        let model = Fixed::new(Vec::new());
        let result = Pipeline::new(split_leaf_png(4, 4), PipelineConfig::default())
            .decode()
            .unwrap()
            .segment()
            .prepare_input()
            .infer(&model)
            .unwrap()
            .resolve();
        assert!(matches!(result, Err(PipelineError::NoScores)));
    }

    #[test]
    fn stage_indices_are_sequential() {
        let indices = [
            Decoded::INDEX,
            Segmented::INDEX,
            Prepared::INDEX,
            Inferred::INDEX,
            Resolved::INDEX,
        ];
        assert_eq!(indices, [1, 2, 3, 4, 5]);
        assert_eq!(Resolved::INDEX + 1, STAGE_COUNT);
    }
}
