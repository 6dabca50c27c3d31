//! Pipeline diagnostics: timing and per-stage metrics.
//!
//! [`classify_with_diagnostics`] runs the same stages as
//! [`crate::classify_staged`] while timing each one. Timestamps come from a
//! caller-supplied [`Clock`] so the crate stays free of platform clocks:
//! the WASM host passes one backed by `web-time` (`performance.now()`),
//! native tools one backed by `std::time::Instant`.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classifier::Classifier;
use crate::pipeline::{Pipeline, PipelineStage};
use crate::types::{PipelineConfig, PipelineError, StagedClassification};

/// Serde support for `std::time::Duration` as fractional seconds.
pub(crate) mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Source of monotonic timestamps.
pub trait Clock {
    /// Opaque timestamp type.
    type Instant;

    /// Current timestamp.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Diagnostics collected from a single classification run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Stage 1: image decoding.
    pub decode: StageDiagnostics,
    /// Stage 2: foliage segmentation.
    pub segment: StageDiagnostics,
    /// Stage 3: nearest-neighbor resize and tensor conversion.
    pub resize: StageDiagnostics,
    /// Stage 4: model inference.
    pub inference: StageDiagnostics,
    /// Stage 5: arg-max and disease lookup.
    pub resolve: StageDiagnostics,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary of the run.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics that vary by pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Image decoding metrics.
    Decode {
        /// Size of the input image bytes.
        input_bytes: usize,
        /// Decoded image width in pixels.
        width: u32,
        /// Decoded image height in pixels.
        height: u32,
        /// Total pixel count (`width * height`).
        pixel_count: u64,
    },
    /// Foliage segmentation metrics.
    Segment {
        /// Which interval test was used.
        mask: String,
        /// Number of pixels kept as foliage.
        foliage_pixels: u64,
        /// Total pixel count.
        total_pixels: u64,
        /// `foliage_pixels / total_pixels`.
        coverage: f64,
    },
    /// Resize and tensor conversion metrics.
    Resize {
        /// Source width in pixels.
        source_width: u32,
        /// Source height in pixels.
        source_height: u32,
        /// Side length of the square model input.
        target_size: u32,
        /// Number of values in the tensor.
        tensor_len: usize,
    },
    /// Inference metrics.
    Inference {
        /// Length of the score vector.
        score_count: usize,
    },
    /// Resolution metrics.
    Resolve {
        /// Winning label.
        label: String,
        /// Winning index.
        class_index: usize,
        /// Winning score.
        score: f32,
    },
}

/// High-level summary of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Source image width in pixels.
    pub image_width: u32,
    /// Source image height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// Pixels kept by the foliage mask.
    pub foliage_pixels: u64,
    /// Winning label.
    pub label: String,
}

impl PipelineDiagnostics {
    /// Named stages in execution order.
    #[must_use]
    pub fn stages(&self) -> [(&'static str, &StageDiagnostics); 5] {
        [
            ("Decode", &self.decode),
            ("Segment", &self.segment),
            ("Resize", &self.resize),
            ("Inference", &self.inference),
            ("Resolve", &self.resolve),
        ]
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);

        for (name, diag) in self.stages() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Foliage pixels: {}  |  Result: {}",
            self.summary.foliage_pixels, self.summary.label,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Decode {
            input_bytes,
            width,
            height,
            ..
        } => format!("{input_bytes} bytes -> {width}x{height}"),
        StageMetrics::Segment {
            mask,
            foliage_pixels,
            total_pixels,
            coverage,
        } => format!(
            "{mask} kept {foliage_pixels}/{total_pixels} ({:.1}%)",
            coverage * 100.0
        ),
        StageMetrics::Resize {
            source_width,
            source_height,
            target_size,
            tensor_len,
        } => format!(
            "{source_width}x{source_height} -> {target_size}x{target_size} ({tensor_len} values)"
        ),
        StageMetrics::Inference { score_count } => format!("{score_count} scores"),
        StageMetrics::Resolve {
            label,
            class_index,
            score,
        } => format!("#{class_index} {label} (score={score:.4})"),
    }
}

fn stage<S: PipelineStage>(stage: &S, duration: Duration) -> StageDiagnostics {
    tracing::trace!(stage = S::NAME, index = S::INDEX, ms = duration_ms(duration), "stage done");
    StageDiagnostics {
        duration,
        metrics: stage.metrics(),
    }
}

/// Run the full pipeline, timing every stage.
///
/// Behaves exactly like [`crate::classify_staged`] and additionally
/// returns [`PipelineDiagnostics`].
///
/// # Errors
///
/// Returns the first stage error, untouched.
pub fn classify_with_diagnostics<C, K>(
    image_bytes: &[u8],
    config: &PipelineConfig,
    classifier: &C,
    clock: &K,
) -> Result<(StagedClassification, PipelineDiagnostics), PipelineError>
where
    C: Classifier + ?Sized,
    K: Clock,
{
    let start = clock.now();

    let t = clock.now();
    let decoded = Pipeline::new(image_bytes.to_vec(), *config).decode()?;
    let decode = stage(&decoded, clock.elapsed(&t));

    let t = clock.now();
    let segmented = decoded.segment();
    let segment = stage(&segmented, clock.elapsed(&t));

    let t = clock.now();
    let prepared = segmented.prepare_input();
    let resize = stage(&prepared, clock.elapsed(&t));

    let t = clock.now();
    let inferred = prepared.infer(classifier)?;
    let inference = stage(&inferred, clock.elapsed(&t));

    let t = clock.now();
    let resolved = inferred.resolve()?;
    let resolve = stage(&resolved, clock.elapsed(&t));

    let total_duration = clock.elapsed(&start);
    let staged = resolved.into_result();

    let summary = PipelineSummary {
        image_width: staged.dimensions.width,
        image_height: staged.dimensions.height,
        pixel_count: staged.dimensions.pixel_count(),
        foliage_pixels: staged.segmentation.foliage_pixels,
        label: staged.result.label().to_string(),
    };

    let diagnostics = PipelineDiagnostics {
        decode,
        segment,
        resize,
        inference,
        resolve,
        total_duration,
        summary,
    };

    tracing::debug!(
        total_ms = duration_ms(diagnostics.total_duration),
        label = %diagnostics.summary.label,
        "classification finished"
    );

    Ok((staged, diagnostics))
}
