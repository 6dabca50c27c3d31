//! Model inference: tensor in, one score per class out.
//!
//! The pipeline only sees the [`Classifier`] trait. Native hosts use
//! [`OnnxClassifier`] (behind the `onnx` cargo feature); the WASM crate
//! forwards to a host-supplied JavaScript function instead.

use std::sync::mpsc;
use std::time::Duration;

use crate::disease::DiseaseClass;
use crate::preprocess::InputTensor;
use crate::resolve::ScoreVector;
use crate::types::PipelineError;

#[cfg(feature = "onnx")]
pub use onnx::OnnxClassifier;

/// A loaded image-classification model.
///
/// Implementations are stateless from the caller's point of view: every
/// call runs the model exactly once and nothing is cached between calls.
pub trait Classifier {
    /// Score `input` against every disease class.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Inference`] if the model fails to run, or
    /// [`PipelineError::ModelLoad`] if its output does not fit the class
    /// table.
    fn predict(&self, input: &InputTensor) -> Result<ScoreVector, PipelineError>;
}

/// Accept a raw model output only if it has one score per class.
///
/// Every [`Classifier`] backed by an external model funnels its output
/// through here, so a model exported with a different head fails loudly
/// instead of resolving against the wrong table.
///
/// # Errors
///
/// Returns [`PipelineError::ModelLoad`] if `scores` does not hold exactly
/// [`DiseaseClass::COUNT`] values.
pub fn model_scores(scores: Vec<f32>) -> Result<ScoreVector, PipelineError> {
    if scores.len() != DiseaseClass::COUNT {
        return Err(PipelineError::ModelLoad(format!(
            "incompatible model: {} scores, expected {}",
            scores.len(),
            DiseaseClass::COUNT
        )));
    }
    Ok(ScoreVector::new(scores))
}

/// Run `load` on a helper thread and wait at most `timeout` for it.
///
/// On timeout the helper is abandoned and its eventual result dropped. A
/// helper that panics is reported as a load failure.
///
/// # Errors
///
/// Returns whatever `load` returns, [`PipelineError::ModelLoadTimeout`] if
/// it does not finish in time, or [`PipelineError::ModelLoad`] if it exits
/// without a result.
pub fn load_with_timeout<T, F>(timeout: Duration, load: F) -> Result<T, PipelineError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        // The receiver is gone if the caller already timed out.
        let _ = tx.send(load());
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            tracing::warn!(?timeout, "model load timed out");
            Err(PipelineError::ModelLoadTimeout { timeout })
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(PipelineError::ModelLoad(
            "model loader thread exited without a result".to_string(),
        )),
    }
}

#[cfg(feature = "onnx")]
mod onnx {
    use std::path::PathBuf;
    use std::sync::Mutex;

    use ort::session::Session;
    use ort::value::TensorRef;

    use super::{Classifier, load_with_timeout, model_scores};
    use crate::preprocess::InputTensor;
    use crate::resolve::ScoreVector;
    use crate::types::{ModelConfig, PipelineError};

    /// Classifier backed by an ONNX Runtime session.
    ///
    /// `Session::run` needs `&mut self`, so the session sits behind a
    /// `Mutex`; concurrent predictions serialize on it.
    pub struct OnnxClassifier {
        session: Mutex<Session>,
        model_path: PathBuf,
    }

    impl std::fmt::Debug for OnnxClassifier {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("OnnxClassifier")
                .field("model_path", &self.model_path)
                .finish_non_exhaustive()
        }
    }

    impl OnnxClassifier {
        /// Load the model described by `config`.
        ///
        /// Loading runs on a helper thread. If it has not finished within
        /// `config.load_timeout` the helper is abandoned and its eventual
        /// result dropped.
        ///
        /// # Errors
        ///
        /// Returns [`PipelineError::ModelLoad`] if the artifact is missing
        /// or ONNX Runtime rejects it, and
        /// [`PipelineError::ModelLoadTimeout`] if loading takes too long.
        pub fn load(config: &ModelConfig) -> Result<Self, PipelineError> {
            let model_path = config.model_path.clone();
            if !model_path.exists() {
                return Err(PipelineError::ModelLoad(format!(
                    "model not found at {}",
                    model_path.display()
                )));
            }

            let load_path = model_path.clone();
            let session =
                load_with_timeout(config.load_timeout, move || build_session(&load_path))?;

            tracing::info!("ONNX classifier loaded from {}", model_path.display());

            Ok(Self {
                session: Mutex::new(session),
                model_path,
            })
        }

        /// Path the model was loaded from.
        #[must_use]
        pub fn model_path(&self) -> &std::path::Path {
            &self.model_path
        }
    }

    fn build_session(path: &std::path::Path) -> Result<Session, PipelineError> {
        Session::builder()
            .map_err(|e| PipelineError::ModelLoad(e.to_string()))?
            .with_intra_threads(1)
            .map_err(|e| PipelineError::ModelLoad(e.to_string()))?
            .commit_from_file(path)
            .map_err(|e| PipelineError::ModelLoad(format!("ONNX load failed: {e}")))
    }

    impl Classifier for OnnxClassifier {
        fn predict(&self, input: &InputTensor) -> Result<ScoreVector, PipelineError> {
            let tensor = TensorRef::from_array_view(input.as_array())
                .map_err(|e| PipelineError::Inference(e.to_string()))?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| PipelineError::Inference("session lock poisoned".to_string()))?;

            let outputs = session
                .run(ort::inputs![tensor])
                .map_err(|e| PipelineError::Inference(format!("ONNX inference failed: {e}")))?;

            let (_shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| PipelineError::Inference(format!("output extraction: {e}")))?;

            model_scores(data.to_vec())
        }
    }

}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use super::*;

    /// Counts invocations and returns the mean red channel as the first
    /// score.
    struct Counting {
        calls: Cell<usize>,
    }

    impl Classifier for Counting {
        fn predict(&self, input: &InputTensor) -> Result<ScoreVector, PipelineError> {
            self.calls.set(self.calls.get() + 1);
            let arr = input.as_array();
            #[allow(clippy::cast_precision_loss)]
            let mean_red = arr.iter().step_by(3).sum::<f32>() / (arr.len() / 3) as f32;
            Ok(ScoreVector::new(vec![mean_red, 0.0, 0.0, 0.0]))
        }
    }

    #[test]
    fn trait_object_predicts_once_per_call() {
        let model = Counting {
            calls: Cell::new(0),
        };
        let classifier: &dyn Classifier = &model;
        let input = InputTensor::from_rgba(&image::RgbaImage::from_pixel(
            2,
            2,
            image::Rgba([100, 0, 0, 255]),
        ));
        let first = classifier.predict(&input).unwrap();
        let second = classifier.predict(&input).unwrap();
        assert_eq!(first, second);
        assert!((first.as_slice()[0] - 100.0).abs() < 1e-3);
        assert_eq!(model.calls.get(), 2);
    }

    #[test]
    fn model_scores_requires_one_score_per_class() {
        let scores = model_scores(vec![0.1, 0.2, 0.6, 0.1]).unwrap();
        assert_eq!(scores.len(), DiseaseClass::COUNT);

        for wrong in [vec![], vec![0.1, 0.2, 0.9], vec![0.0; 5]] {
            assert!(matches!(
                model_scores(wrong),
                Err(PipelineError::ModelLoad(_))
            ));
        }
    }

    #[test]
    fn load_with_timeout_returns_loader_result() {
        let loaded = load_with_timeout(Duration::from_secs(5), || Ok(7_u32)).unwrap();
        assert_eq!(loaded, 7);

        let failed: Result<u32, _> = load_with_timeout(Duration::from_secs(5), || {
            Err(PipelineError::ModelLoad("corrupt".to_string()))
        });
        assert!(matches!(failed, Err(PipelineError::ModelLoad(m)) if m == "corrupt"));
    }

    #[test]
    fn slow_loader_times_out() {
        let timeout = Duration::from_millis(20);
        let result: Result<(), _> = load_with_timeout(timeout, || {
            std::thread::sleep(Duration::from_millis(500));
            Ok(())
        });
        assert!(matches!(
            result,
            Err(PipelineError::ModelLoadTimeout { timeout: t }) if t == timeout
        ));
    }

    #[test]
    #[allow(clippy::panic)]
    fn panicking_loader_is_model_load_error() {
        let result: Result<(), _> = load_with_timeout(Duration::from_secs(5), || {
            panic!("loader crashed");
        });
        assert!(matches!(result, Err(PipelineError::ModelLoad(_))));
    }
}
