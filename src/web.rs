use crate::{
    app::{errors::MapperError, CategoryMapper},
    platform::Platform,
    semantic::{SearchResult, DEFAULT_CHAIN_K, DEFAULT_TOP_K},
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::signal;

#[derive(Clone)]
struct SharedState {
    mapper: Arc<CategoryMapper>,
}

pub fn router(mapper: Arc<CategoryMapper>) -> Router {
    let shared_state = Arc::new(SharedState { mapper });

    Router::new()
        .route("/health", get(health))
        .route("/category/predict", post(predict))
        .route("/category/predict_all", post(predict_all))
        .route("/category/chain", post(chain))
        .route("/category/index", post(build_index).delete(delete_index))
        .route("/category/load", post(load_index))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::warn!("shutting down");
}

pub async fn serve(mapper: Arc<CategoryMapper>, host: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("listening on {addr}");

    axum::serve(listener, router(mapper))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[derive(Debug)]
struct HttpError(MapperError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            MapperError::Validation(_) => StatusCode::BAD_REQUEST,
            MapperError::NotFound(_) => StatusCode::NOT_FOUND,
            MapperError::NotLoaded(_) => StatusCode::SERVICE_UNAVAILABLE,
            MapperError::RemoteService(_) => {
                log::error!("{self:?}");
                StatusCode::BAD_GATEWAY
            }
            MapperError::CorruptState(_) | MapperError::Io(_) | MapperError::Internal(_) => {
                log::error!("{self:?}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (
            status,
            Json(json!({"success": false, "error": self.0.to_string()})),
        )
            .into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<MapperError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// Unwrap a JSON body, turning malformed or mistyped input into a 400.
fn payload<T: DeserializeOwned>(
    body: Result<Json<T>, JsonRejection>,
) -> Result<T, HttpError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| HttpError(MapperError::validation(rejection.body_text())))
}

fn platform_or_source(platform: Option<&str>) -> Result<Platform, HttpError> {
    match platform {
        Some(platform) => Ok(Platform::parse(platform)?),
        None => Ok(Platform::SOURCE),
    }
}

async fn health(State(state): State<Arc<SharedState>>) -> Json<Value> {
    let status = state.mapper.status();
    Json(json!({
        "status": "ok",
        "supportedPlatforms": status.supported_platforms,
        "loadedPlatforms": status.loaded_platforms,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub text: String,
    pub platform: Option<String>,
    pub k: Option<usize>,
}

async fn predict(
    State(state): State<Arc<SharedState>>,
    body: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<Value>, HttpError> {
    let payload = payload(body)?;
    log::debug!("payload: {payload:?}");

    let platform = platform_or_source(payload.platform.as_deref())?;
    let k = payload.k.unwrap_or(DEFAULT_TOP_K);

    let top_k = state.mapper.search(platform, &payload.text, k).await?;

    Ok(Json(json!({
        "success": true,
        "platform": platform,
        "topK": top_k,
    })))
}

#[derive(Debug, Deserialize)]
pub struct PredictAllRequest {
    pub text: String,
    pub platforms: Option<Vec<String>>,
    pub k: Option<usize>,
}

async fn predict_all(
    State(state): State<Arc<SharedState>>,
    body: Result<Json<PredictAllRequest>, JsonRejection>,
) -> Result<Json<Value>, HttpError> {
    let payload = payload(body)?;
    log::debug!("payload: {payload:?}");

    let platforms = match payload.platforms {
        Some(names) => names
            .iter()
            .map(|name| Platform::parse(name))
            .collect::<Result<Vec<_>, _>>()?,
        None => Platform::ALL.to_vec(),
    };
    let k = payload.k.unwrap_or(DEFAULT_TOP_K);

    let outcomes = state
        .mapper
        .search_all(&platforms, &payload.text, k)
        .await?;

    let results: Map<String, Value> = outcomes
        .into_iter()
        .map(|(platform, outcome)| (platform.to_string(), outcome_json(outcome)))
        .collect();

    Ok(Json(json!({"success": true, "results": results})))
}

fn outcome_json(outcome: Result<Vec<SearchResult>, MapperError>) -> Value {
    match outcome {
        Ok(top_k) => json!({"success": true, "topK": top_k}),
        Err(e) => json!({"success": false, "error": e.to_string()}),
    }
}

#[derive(Debug, Deserialize)]
pub struct ChainRequest {
    pub text: String,
    pub k: Option<usize>,
}

async fn chain(
    State(state): State<Arc<SharedState>>,
    body: Result<Json<ChainRequest>, JsonRejection>,
) -> Result<Json<Value>, HttpError> {
    let payload = payload(body)?;
    log::debug!("payload: {payload:?}");

    let entries = state
        .mapper
        .chain(&payload.text, payload.k.unwrap_or(DEFAULT_CHAIN_K))
        .await?;

    Ok(Json(json!({"success": true, "results": entries})))
}

#[derive(Debug, Default, Deserialize)]
pub struct PlatformRequest {
    pub platform: Option<String>,
}

/// Platform requests may omit the body entirely.
fn platform_payload(
    body: Result<Json<PlatformRequest>, JsonRejection>,
) -> Result<Platform, HttpError> {
    let request = match body {
        Err(JsonRejection::MissingJsonContentType(_)) => PlatformRequest::default(),
        other => payload(other)?,
    };
    platform_or_source(request.platform.as_deref())
}

async fn build_index(
    State(state): State<Arc<SharedState>>,
    body: Result<Json<PlatformRequest>, JsonRejection>,
) -> Result<Json<Value>, HttpError> {
    let platform = platform_payload(body)?;
    let count = state.mapper.build(platform).await?;

    Ok(Json(json!({"success": true, "platform": platform, "count": count})))
}

async fn load_index(
    State(state): State<Arc<SharedState>>,
    body: Result<Json<PlatformRequest>, JsonRejection>,
) -> Result<Json<Value>, HttpError> {
    let platform = platform_payload(body)?;
    let count = state.mapper.load(platform).await?;

    Ok(Json(json!({"success": true, "platform": platform, "count": count})))
}

async fn delete_index(
    State(state): State<Arc<SharedState>>,
    body: Result<Json<PlatformRequest>, JsonRejection>,
) -> Result<Json<Value>, HttpError> {
    let platform = platform_payload(body)?;
    state.mapper.delete(platform).await?;

    Ok(Json(json!({"success": true, "platform": platform})))
}
