use std::path::Path;

use ndarray::{concatenate, Array2, Array4, Axis};
use tracing::info;

use crate::config::Config;
use crate::diagnosis::{self, PredictionResult};
use crate::error::AppError;
use crate::model::Classifier;
use crate::preprocess;

/// Runs the batch through the classifier `batch_size` rows at a time and stacks the
/// per-row scores back together.
pub fn predict_batched(
    classifier: &dyn Classifier,
    batch: &Array4<f32>,
    batch_size: usize,
) -> Result<Array2<f32>, AppError> {
    let outputs = batch
        .axis_chunks_iter(Axis(0), batch_size.max(1))
        .map(|chunk| classifier.predict(chunk))
        .collect::<Result<Vec<_>, _>>()?;

    let views: Vec<_> = outputs.iter().map(|o| o.view()).collect();
    concatenate(Axis(0), &views).map_err(|_| AppError::ClassCountMismatch {
        expected: diagnosis::DIAGNOSIS_CLASSES.len(),
        got: outputs.first().map_or(0, |o| o.ncols()),
    })
}

/// Stored upload in, diagnosis out. Blocking: call from a blocking worker.
pub fn diagnose(
    classifier: &dyn Classifier,
    config: &Config,
    stored: &Path,
) -> Result<PredictionResult, AppError> {
    let batch = preprocess::load_and_prepare(
        stored,
        config.img_width,
        config.img_height,
        config.pixel_scaling,
    )?;
    let scores = predict_batched(classifier, &batch, config.batch_size)?;

    let row = scores.row(0).to_vec();
    let result = diagnosis::map_prediction(&row)?;
    info!(
        file = %stored.display(),
        class = result.class_index,
        diagnosis = result.diagnosis,
        "diagnosed upload"
    );
    Ok(result)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, ImageOutputFormat, RgbImage};
    use ndarray::ArrayView4;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Returns the same scores for every row and counts forward passes.
    pub(crate) struct FixedClassifier {
        pub scores: Vec<f32>,
        pub calls: AtomicUsize,
    }

    impl FixedClassifier {
        pub(crate) fn new(scores: Vec<f32>) -> Self {
            Self {
                scores,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Classifier for FixedClassifier {
        fn predict(&self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let rows = batch.shape()[0];
            let data = self.scores.repeat(rows);
            Ok(Array2::from_shape_vec((rows, self.scores.len()), data).unwrap())
        }
    }

    pub(crate) const BENIGN_KERATOSIS: [f32; 8] = [0.1, 0.05, 0.6, 0.05, 0.05, 0.05, 0.05, 0.05];

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut Cursor::new(&mut buffer), ImageOutputFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn test_batches_are_split_by_batch_size() {
        let classifier = FixedClassifier::new(BENIGN_KERATOSIS.to_vec());
        let batch = Array4::<f32>::zeros((5, 2, 2, 3));

        let scores = predict_batched(&classifier, &batch, 2).unwrap();

        assert_eq!(scores.shape(), &[5, 8]);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_single_image_is_one_pass() {
        let classifier = FixedClassifier::new(BENIGN_KERATOSIS.to_vec());
        let batch = Array4::<f32>::zeros((1, 28, 28, 3));

        predict_batched(&classifier, &batch, 10).unwrap();

        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_diagnose_stored_upload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lesion.png");
        std::fs::write(&path, png_bytes(28, 28)).unwrap();
        let classifier = FixedClassifier::new(BENIGN_KERATOSIS.to_vec());

        let result = diagnose(&classifier, &Config::default(), &path).unwrap();

        assert_eq!(result.class_index, 2);
        assert_eq!(result.diagnosis, "Benign Keratosis");
    }

    #[test]
    fn test_diagnose_rejects_wrong_class_count() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lesion.png");
        std::fs::write(&path, png_bytes(28, 28)).unwrap();
        let classifier = FixedClassifier::new(vec![0.5, 0.5, 0.0]);

        let result = diagnose(&classifier, &Config::default(), &path);

        assert!(matches!(
            result,
            Err(AppError::ClassCountMismatch { expected: 8, got: 3 })
        ));
    }
}
