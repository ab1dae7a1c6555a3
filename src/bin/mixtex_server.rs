//! HTTP service for image-to-LaTeX recognition.
//!
//! # Usage
//!
//! ```bash
//! mixtex-server [OPTIONS]
//! ```
//!
//! # Routes
//!
//! * `GET /` - service banner
//! * `GET /health` - `{"status": "healthy", "model_loaded": bool}`
//! * `POST /predict` - multipart `file` (an `image/*` upload), `use_dollars`, `convert_align`
//! * `POST /predict_base64` - multipart `image_data` (base64, data URLs accepted)
//! * `POST /predict_clipboard` - same fields as `/predict_base64`
//! * `POST /reload_model` - reloads the model from disk and swaps it in
//!
//! Recognitions answer `{"success": true, "latex": ..., "message": ...}`.
//! Undecodable images answer 400, everything else that fails answers 500,
//! both with `{"detail": ...}`.
//!
//! # Examples
//!
//! ```bash
//! mixtex-server --model-dir model/ --port 8000
//! curl -F file=@formula.png -F use_dollars=true http://127.0.0.1:8000/predict
//! ```

use anyhow::Context;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use image::RgbImage;
use mixtex_ocr::core::{OCRError, ProcessingStage};
use mixtex_ocr::core::config::{MixTexConfig, OrtExecutionProvider};
use mixtex_ocr::pipeline::{CancellationSignal, MixTexPipeline, ModelHandle};
use mixtex_ocr::processors::PostprocessOptions;
use mixtex_ocr::utils::{decode_base64_image, decode_image_bytes, init_tracing};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Command-line arguments
#[derive(Parser)]
#[command(name = "mixtex-server", version)]
#[command(about = "Serves image-to-LaTeX recognition over HTTP")]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8000)]
    port: u16,

    /// Directory holding encoder_model.onnx, decoder_model_merged.onnx and tokenizer.json
    #[arg(short, long)]
    model_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device to use for inference (e.g., 'cpu', 'cuda', 'cuda:0')
    #[arg(long, default_value = "cpu")]
    device: String,

    /// Per-request inference timeout in seconds
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone)]
struct AppState {
    model: Arc<ModelHandle>,
    config: Arc<MixTexConfig>,
    timeout: Duration,
}

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl ApiError {
    /// Maps a recognition error onto a status, prefixing the message with `context`.
    fn from_ocr(context: &str, err: OCRError) -> Self {
        if err.is_client_error() {
            ApiError::BadRequest(format!("{context}: {err}"))
        } else {
            ApiError::Internal(format!("{context}: {err}"))
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match self {
            ApiError::BadRequest(msg) | ApiError::Internal(msg) => msg,
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

#[derive(Debug, Serialize)]
struct PredictResponse {
    success: bool,
    latex: String,
    message: &'static str,
}

/// Fields shared by every predict route.
#[derive(Debug, Default)]
struct PredictForm {
    file_bytes: Option<Vec<u8>>,
    file_content_type: Option<String>,
    image_data: Option<String>,
    use_dollars: bool,
    convert_align: bool,
}

impl PredictForm {
    fn options(&self) -> PostprocessOptions {
        PostprocessOptions::new(self.use_dollars, self.convert_align)
    }
}

/// Parses an HTML form boolean the way browsers and curl send them.
fn parse_form_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

async fn parse_predict_form(mut multipart: Multipart) -> Result<PredictForm, ApiError> {
    let mut form = PredictForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("multipart parse error: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                form.file_content_type = field.content_type().map(str::to_string);
                form.file_bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::BadRequest(format!("failed to read file: {e}")))?
                        .to_vec(),
                );
            }
            "image_data" => {
                form.image_data = Some(field.text().await.map_err(|e| {
                    ApiError::BadRequest(format!("invalid image_data field: {e}"))
                })?);
            }
            "use_dollars" | "convert_align" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("invalid {name} field: {e}")))?;
                let value = parse_form_bool(&text).ok_or_else(|| {
                    ApiError::BadRequest(format!("{name} must be a boolean, got '{text}'"))
                })?;
                if name == "use_dollars" {
                    form.use_dollars = value;
                } else {
                    form.convert_align = value;
                }
            }
            _ => {
                let _ = field.bytes().await;
            }
        }
    }

    Ok(form)
}

/// Runs recognition off the async runtime, cancelling it once the timeout passes.
async fn recognize_blocking(
    state: &AppState,
    image: RgbImage,
    options: PostprocessOptions,
) -> Result<String, OCRError> {
    let pipeline: Arc<MixTexPipeline> = state.model.current()?;
    let cancel = CancellationSignal::new();
    let task_cancel = cancel.clone();
    let task = tokio::task::spawn_blocking(move || {
        pipeline
            .recognize(&image, &options, &task_cancel)
            .map(|recognition| recognition.latex)
    });

    match tokio::time::timeout(state.timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(OCRError::processing(
            ProcessingStage::Decoding,
            "recognition task failed",
            join_err,
        )),
        Err(_) => {
            cancel.cancel();
            Err(OCRError::cancelled(cancel.steps_completed(), "request timed out"))
        }
    }
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "MixTeX OCR API is running" }))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "model_loaded": state.model.is_loaded() }))
}

async fn predict(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PredictResponse>, ApiError> {
    let form = parse_predict_form(multipart).await?;
    if !state.model.is_loaded() {
        return Err(ApiError::Internal("Model not loaded".to_string()));
    }

    let is_image = form
        .file_content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("image/"));
    let bytes = match (&form.file_bytes, is_image) {
        (None, _) => return Err(ApiError::BadRequest("missing 'file' field".to_string())),
        (Some(_), false) => return Err(ApiError::BadRequest("File must be an image".to_string())),
        (Some(bytes), true) => bytes,
    };

    let image = decode_image_bytes(bytes).map_err(|e| ApiError::from_ocr("Prediction failed", e))?;
    let latex = recognize_blocking(&state, image, form.options())
        .await
        .map_err(|e| {
            error!("Prediction error: {e}");
            ApiError::from_ocr("Prediction failed", e)
        })?;

    Ok(Json(PredictResponse {
        success: true,
        latex,
        message: "recognition succeeded",
    }))
}

async fn predict_encoded(
    state: &AppState,
    multipart: Multipart,
    context: &str,
    message: &'static str,
) -> Result<Json<PredictResponse>, ApiError> {
    let form = parse_predict_form(multipart).await?;
    if !state.model.is_loaded() {
        return Err(ApiError::Internal("Model not loaded".to_string()));
    }

    let data = form
        .image_data
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("missing 'image_data' field".to_string()))?;
    let image = decode_base64_image(data).map_err(|e| ApiError::from_ocr(context, e))?;
    let latex = recognize_blocking(state, image, form.options())
        .await
        .map_err(|e| {
            error!("{context}: {e}");
            ApiError::from_ocr(context, e)
        })?;

    Ok(Json(PredictResponse {
        success: true,
        latex,
        message,
    }))
}

async fn predict_base64(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PredictResponse>, ApiError> {
    predict_encoded(&state, multipart, "Prediction failed", "recognition succeeded").await
}

async fn predict_clipboard(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PredictResponse>, ApiError> {
    predict_encoded(
        &state,
        multipart,
        "Clipboard prediction failed",
        "clipboard image recognized",
    )
    .await
}

async fn reload_model(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let model = Arc::clone(&state.model);
    let config = Arc::clone(&state.config);
    let result = tokio::task::spawn_blocking(move || model.reload(|| MixTexPipeline::load(&config)))
        .await
        .map_err(|e| ApiError::Internal(format!("Model reload failed: {e}")))?;

    match result {
        Ok(()) => Ok(Json(json!({ "success": true, "message": "model reloaded" }))),
        Err(e) => {
            error!("Model reload error: {e}");
            Err(ApiError::Internal(format!("Model reload failed: {e}")))
        }
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/predict_base64", post(predict_base64))
        .route("/predict_clipboard", post(predict_clipboard))
        .route("/reload_model", post(reload_model))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => error!("Failed to listen for SIGTERM: {e}"),
        }
    };

    #[cfg(unix)]
    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
        info!("Received Ctrl+C, shutting down");
    }
}

fn build_config(args: &Args) -> anyhow::Result<MixTexConfig> {
    let mut config = match &args.config {
        Some(path) => MixTexConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => MixTexConfig::default(),
    };
    if let Some(dir) = &args.model_dir {
        config.model_dir = Some(dir.clone());
    }
    let provider = OrtExecutionProvider::from_device(&args.device)?;
    if provider != OrtExecutionProvider::CPU {
        config.ort_session.execution_providers = Some(vec![provider, OrtExecutionProvider::CPU]);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(if args.verbose { "debug" } else { "info" });

    let config = Arc::new(build_config(&args)?);
    let model = Arc::new(ModelHandle::empty());

    let load_config = Arc::clone(&config);
    let load_model = Arc::clone(&model);
    let loaded = tokio::task::spawn_blocking(move || {
        load_model.reload(|| MixTexPipeline::load(&load_config))
    })
    .await?;
    if let Err(e) = loaded {
        warn!("Failed to load model during startup: {e}");
        warn!("Serving without a model; POST /reload_model once the files are in place");
    }

    let state = AppState {
        model,
        config,
        timeout: Duration::from_secs(args.timeout_secs),
    };

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on http://{addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
