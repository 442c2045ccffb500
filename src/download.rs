use std::path::Path;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use tracing::info;

use crate::config::ModelConfig;
use crate::error::AppError;

async fn download_file(url: &str, token: Option<&str>, path: &Path) -> Result<(), AppError> {
    info!("Downloading {} from {}", path.display(), url);

    let mut header_map = HeaderMap::new();
    if let Some(token) = token {
        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| AppError::InvalidToken)?;
        header_map.insert(AUTHORIZATION, auth_value);
    }
    header_map.insert(ACCEPT, HeaderValue::from_static("application/octet-stream"));

    let client = reqwest::Client::new();
    let response = client.get(url).headers(header_map).send().await?;

    if !response.status().is_success() {
        return Err(AppError::DownloadStatus {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let bytes = response.bytes().await?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

/// Makes sure the model artifact is on disk, fetching it from `MODEL_URL` when absent.
pub async fn ensure_model_present(model: &ModelConfig) -> Result<(), AppError> {
    info!("Checking model...");
    if model.path.exists() {
        return Ok(());
    }

    match &model.url {
        Some(url) => download_file(url, model.download_token.as_deref(), &model.path).await,
        None => Err(AppError::ModelNotFound(model.path.display().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn model_config(path: PathBuf, url: Option<&str>) -> ModelConfig {
        ModelConfig {
            path,
            url: url.map(str::to_string),
            download_token: None,
            input_op: "x".to_string(),
            output_op: "Identity".to_string(),
        }
    }

    #[tokio::test]
    async fn test_existing_model_needs_no_download() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frozen_graph.pb");
        std::fs::write(&path, b"graph").unwrap();

        let config = model_config(path.clone(), Some("http://127.0.0.1:9/unreachable"));
        ensure_model_present(&config).await.unwrap();

        assert_eq!(std::fs::read(path).unwrap(), b"graph");
    }

    #[tokio::test]
    async fn test_missing_model_without_url_is_not_found() {
        let dir = TempDir::new().unwrap();
        let config = model_config(dir.path().join("missing.pb"), None);

        match ensure_model_present(&config).await {
            Err(AppError::ModelNotFound(path)) => assert!(path.ends_with("missing.pb")),
            other => panic!("expected ModelNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_url_is_download_error() {
        let dir = TempDir::new().unwrap();
        let config = model_config(
            dir.path().join("missing.pb"),
            Some("http://127.0.0.1:9/model.pb"),
        );

        assert!(matches!(
            ensure_model_present(&config).await,
            Err(AppError::Download(_))
        ));
    }
}
