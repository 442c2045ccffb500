use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::pages;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("No file uploaded")]
    MissingFile,

    #[error("Filename {0:?} has no usable characters")]
    InvalidFilename(String),

    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Model not found at path: {0}")]
    ModelNotFound(String),

    #[error("TensorFlow error: {0}")]
    Tensorflow(String),

    #[error("Input shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<Option<i64>>,
        got: Vec<usize>,
    },

    #[error("Model produced {got} class scores but the diagnosis table has {expected}")]
    ClassCountMismatch { expected: usize, got: usize },

    #[error("Model download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("MODEL_DOWNLOAD_TOKEN is not a valid header value")]
    InvalidToken,

    #[error("Model download from {url} returned status {status}")]
    DownloadStatus { url: String, status: u16 },

    #[error("Inference worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("Model session lock poisoned")]
    Poisoned,
}

// Status wraps a raw pointer, keep only its message so errors stay Send + Sync.
impl From<tensorflow::Status> for AppError {
    fn from(status: tensorflow::Status) -> Self {
        AppError::Tensorflow(status.to_string())
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingFile | AppError::InvalidFilename(_) => StatusCode::BAD_REQUEST,
            // 413 when the body limit is hit, 400 for malformed bodies
            AppError::Multipart(err) => err.status(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            (status, pages::server_error()).into_response()
        } else {
            tracing::warn!(error = %self, %status, "rejected upload");
            (status, pages::bad_request(&self.to_string())).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_client_error() {
        let response = AppError::MissingFile.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_invalid_filename_message() {
        let error = AppError::InvalidFilename("../..".to_string());
        assert_eq!(error.to_string(), "Filename \"../..\" has no usable characters");
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_shape_mismatch_is_server_error() {
        let error = AppError::ShapeMismatch {
            expected: vec![None, Some(28), Some(28), Some(3)],
            got: vec![1, 32, 32, 3],
        };
        assert_eq!(
            error.to_string(),
            "Input shape mismatch: expected [None, Some(28), Some(28), Some(3)], got [1, 32, 32, 3]"
        );
        assert_eq!(error.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_image_error_conversion() {
        let image_error =
            image::ImageError::IoError(std::io::Error::new(std::io::ErrorKind::NotFound, "test"));
        match AppError::from(image_error) {
            AppError::Image(_) => {}
            other => panic!("Expected Image error, got {other:?}"),
        }
    }

    #[test]
    fn test_class_count_mismatch_is_server_error() {
        let error = AppError::ClassCountMismatch { expected: 8, got: 5 };
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
