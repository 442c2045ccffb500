use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    handler::HandlerWithoutStateExt,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::config::Config;
use crate::diagnosis::PredictionResult;
use crate::error::AppError;
use crate::model::Classifier;
use crate::{pages, pipeline, upload};

/// Path prefix uploaded images are served under.
pub const UPLOADS_URL: &str = "/static/image";

#[derive(Serialize)]
struct PredictResponse {
    filename: String,
    #[serde(flatten)]
    result: PredictionResult,
}

pub struct AppState {
    pub config: Config,
    pub classifier: Arc<dyn Classifier>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let uploads =
        ServeDir::new(&state.config.upload_dir).not_found_service(not_found.into_service());

    Router::new()
        .route("/", get(index))
        .route("/home", get(index))
        .route("/try_now", get(try_now))
        .route("/learn", get(learn))
        .route("/q2", get(q2_form).post(q2_upload))
        .route("/q2/:filename", get(q2_image))
        .route("/api/predict", post(predict_handler))
        .route("/health", get(health_check))
        .nest_service(UPLOADS_URL, uploads)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(state.config.body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Html<String> {
    pages::index()
}

async fn try_now() -> Html<String> {
    pages::try_now()
}

async fn learn() -> Html<String> {
    pages::learn()
}

async fn q2_form() -> Html<String> {
    pages::upload_form()
}

async fn q2_upload(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Html<String>, AppError> {
    let (filename, result) = receive_and_diagnose(state, multipart).await?;
    Ok(pages::diagnosis(&filename, result.diagnosis))
}

async fn q2_image(Path(filename): Path<String>) -> Response {
    match upload::sanitize_filename(&filename) {
        Some(name) => (
            StatusCode::MOVED_PERMANENTLY,
            [(header::LOCATION, format!("{UPLOADS_URL}/{name}"))],
        )
            .into_response(),
        None => not_found().await.into_response(),
    }
}

async fn predict_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<PredictResponse>, AppError> {
    let (filename, result) = receive_and_diagnose(state, multipart).await?;
    Ok(Json(PredictResponse { filename, result }))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "OK" }))
}

async fn not_found() -> (StatusCode, Html<String>) {
    (StatusCode::NOT_FOUND, pages::not_found())
}

/// Stores the upload, then runs inference on a blocking worker. Returns the stored
/// filename alongside the diagnosis.
async fn receive_and_diagnose(
    state: Arc<AppState>,
    multipart: Multipart,
) -> Result<(String, PredictionResult), AppError> {
    let image = upload::receive(multipart).await?;
    let stored = upload::store(&state.config.upload_dir, &image).await?;
    let filename = stored
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let result = tokio::task::spawn_blocking(move || {
        pipeline::diagnose(state.classifier.as_ref(), &state.config, &stored)
    })
    .await??;

    Ok((filename, result))
}
