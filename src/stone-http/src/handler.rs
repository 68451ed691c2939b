use std::io;
use std::sync::Arc;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::{error, info, warn};
use serde_json::json;
use stone_serve::{ClassifyError, InferenceEngine, PredictionResult, UploadStore};
use tokio::task::JoinError;
use tower_http::cors::CorsLayer;

/// Multipart field carrying the image.
const IMAGE_FIELD: &str = "image";

#[derive(Clone)]
pub struct AppState {
    engine: Arc<InferenceEngine>,
    uploads: Arc<dyn UploadStore>,
}

impl AppState {
    pub fn new(engine: InferenceEngine, uploads: impl UploadStore + 'static) -> Self {
        AppState {
            engine: Arc::new(engine),
            uploads: Arc::new(uploads),
        }
    }
}

/// Routes served at the root and under `prefix`.
pub fn router(state: AppState, prefix: &str, max_upload_bytes: usize) -> Router {
    let mut router = Router::new().route("/", get(status).post(predict));

    let prefix = prefix.trim_end_matches('/');
    if !prefix.is_empty() {
        router = router
            .route(prefix, get(status).post(predict))
            .route(&format!("{}/", prefix), get(status).post(predict));
    }

    router
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn status() -> &'static str {
    "AI module is running"
}

async fn predict(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResult>, ApiError> {
    let mut multipart = multipart.map_err(|_| ApiError::Classify(ClassifyError::MissingInput))?;

    let mut image = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(IMAGE_FIELD) {
            image = Some(field.bytes().await?);
            break;
        }
    }

    let image = image.ok_or(ApiError::Classify(ClassifyError::MissingInput))?;
    info!("Received {} byte image", image.len());

    let predictions = tokio::task::spawn_blocking(move || {
        let path = state.uploads.save(&image).map_err(ApiError::Upload)?;
        state.engine.predict_file(&path).map_err(ApiError::Classify)
    })
    .await
    .map_err(ApiError::Worker)??;

    Ok(Json(predictions))
}

pub enum ApiError {
    Classify(ClassifyError),
    Multipart(MultipartError),
    Upload(io::Error),
    Worker(JoinError),
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Multipart(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Classify(err) if err.is_client_error() => {
                warn!("Rejected request: {}", err);
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            ApiError::Classify(err) => {
                error!("Classification failure: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            ApiError::Multipart(err) => {
                warn!("Malformed upload: {}", err);
                (StatusCode::BAD_REQUEST, format!("Malformed upload: {}", err))
            }
            ApiError::Upload(err) => {
                error!("Could not store upload: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Could not store upload".to_owned(),
                )
            }
            ApiError::Worker(err) => {
                error!("Classification worker failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Classification failure".to_owned(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
