use serde::Serialize;

use crate::error::AppError;

/// Labels indexed by the model's output position.
pub const DIAGNOSIS_CLASSES: [&str; 8] = [
    "Actinic keratoses and intraepithelial carcinomae",
    "Basal Cell Carcinoma",
    "Benign Keratosis",
    "Dermatofibroma",
    "melanocytic nevus",
    "Vascular Lesion",
    "Melanoma",
    "No Cancer Detected",
];

pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub class_index: usize,
    pub diagnosis: &'static str,
    pub confidence: f32,
}

pub fn label_for(index: usize) -> &'static str {
    DIAGNOSIS_CLASSES
        .get(index)
        .copied()
        .unwrap_or(UNKNOWN_LABEL)
}

/// Index of the largest score. Ties go to the lowest index and NaN never wins.
pub fn arg_max(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((i, score)),
        }
    }
    best.map(|(i, _)| i)
}

/// Turns one row of class scores into a diagnosis.
pub fn map_prediction(scores: &[f32]) -> Result<PredictionResult, AppError> {
    if scores.len() != DIAGNOSIS_CLASSES.len() {
        return Err(AppError::ClassCountMismatch {
            expected: DIAGNOSIS_CLASSES.len(),
            got: scores.len(),
        });
    }

    let (class_index, confidence) = match arg_max(scores) {
        Some(i) => (i, scores[i]),
        // every score was NaN
        None => (DIAGNOSIS_CLASSES.len(), f32::NAN),
    };

    Ok(PredictionResult {
        class_index,
        diagnosis: label_for(class_index),
        confidence,
    })
}
