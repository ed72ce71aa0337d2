use axum::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Extension, FromRequest, Path, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast::Sender as BroadcastSender;
use tracing::{debug, error, info};

use super::middleware::{cors, require_admin, CorsPolicy, RoleGate};
use crate::config::HttpConfig;
use crate::model::Observation;
use crate::service::ServiceError;

const UNAVAILABLE_MESSAGE: &str = "The server is temporarily unavailable, please try again later";

#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct IdBody {
    pub id: i64,
}

/// Every non-success outcome a handler can produce.
#[derive(Debug)]
pub enum ApiError {
    InvalidInput(String),
    InvalidId(String),
    NotFound(i64),
    Unavailable,
}

impl ApiError {
    fn invalid_input(rejection: &JsonRejection) -> Self {
        Self::InvalidInput(rejection.body_text())
    }

    /// NotFound is told apart by its kind; everything else is logged here
    /// and hidden from the client.
    fn from_service(err: ServiceError) -> Self {
        if let Some(id) = err.kind().not_found_id() {
            debug!(op = %err.op(), id, "record not found");
            return Self::NotFound(id);
        }
        error!(op = %err.op(), error = %err, "request failed");
        Self::Unavailable
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::InvalidInput(reason) => (StatusCode::BAD_REQUEST, format!("invalid input: {reason}")),
            Self::InvalidId(reason) => (StatusCode::BAD_REQUEST, format!("parseID: {reason}")),
            Self::NotFound(id) => (StatusCode::NOT_FOUND, format!("record with id={id} not found")),
            Self::Unavailable => (StatusCode::INTERNAL_SERVER_ERROR, UNAVAILABLE_MESSAGE.to_string()),
        };
        (status, Json(MessageBody { message })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Path ids that fail to extract (e.g. invalid UTF-8) or to parse are both
/// reported as `parseID` errors.
fn parse_id(path: Result<Path<String>, PathRejection>) -> Result<i64, ApiError> {
    let Path(raw) = path.map_err(|rejection| ApiError::InvalidId(rejection.body_text()))?;
    raw.parse::<i64>()
        .map_err(|err| ApiError::InvalidId(format!("failed to parse id={raw:?}: {err}")))
}

/// Request body decoded as an observation. An empty body, with or without a
/// content type, decodes to `Observation::default()`.
struct ObservationPayload(Observation);

#[async_trait]
impl<S> FromRequest<S> for ObservationPayload
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let headers = req.headers().clone();
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::InvalidInput(rejection.body_text()))?;
        if bytes.is_empty() {
            return Ok(Self(Observation::default()));
        }

        let mut body = Request::new(Body::from(bytes));
        *body.headers_mut() = headers;
        let Json(ob) = Json::<Observation>::from_request(body, state)
            .await
            .map_err(|rejection| ApiError::invalid_input(&rejection))?;
        Ok(Self(ob))
    }
}

pub fn router(state: Arc<crate::AppState>, config: &HttpConfig) -> Router {
    Router::new()
        .route("/weather", post(add_handler))
        .route(
            "/weather/:id",
            get(get_handler).put(update_handler).delete(delete_handler),
        )
        .route("/weathers", get(list_handler))
        .layer(Extension(state))
        .layer(middleware::from_fn_with_state(
            RoleGate { required: config.require_admin_role },
            require_admin,
        ))
        .layer(middleware::from_fn_with_state(
            CorsPolicy::new(config.cors_origin.clone()),
            cors,
        ))
}

/// Serves the API until `shutdown` fires.
pub async fn run(
    state: Arc<crate::AppState>,
    config: HttpConfig,
    shutdown: BroadcastSender<()>,
) -> anyhow::Result<()> {
    let app = router(state, &config);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, cors_origin = %config.cors_origin, "starting rest server");

    let mut shutdown_sub = shutdown.subscribe();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_sub.recv().await;
        })
        .await?;
    info!("rest server stopped");
    Ok(())
}

async fn add_handler(
    Extension(state): Extension<Arc<crate::AppState>>,
    payload: Result<ObservationPayload, ApiError>,
) -> ApiResult<IdBody> {
    let ObservationPayload(ob) = payload?;
    let id = state.service.add(ob).await.map_err(ApiError::from_service)?;
    Ok(Json(IdBody { id }))
}

async fn get_handler(
    Extension(state): Extension<Arc<crate::AppState>>,
    path: Result<Path<String>, PathRejection>,
) -> ApiResult<Observation> {
    let id = parse_id(path)?;
    let ob = state.service.get(id).await.map_err(ApiError::from_service)?;
    Ok(Json(ob))
}

async fn update_handler(
    Extension(state): Extension<Arc<crate::AppState>>,
    path: Result<Path<String>, PathRejection>,
    payload: Result<ObservationPayload, ApiError>,
) -> ApiResult<MessageBody> {
    // body errors are reported before id errors
    let ObservationPayload(ob) = payload?;
    let id = parse_id(path)?;
    state.service.update(ob.with_id(id)).await.map_err(ApiError::from_service)?;
    Ok(Json(MessageBody { message: "successfully updated".to_string() }))
}

async fn delete_handler(
    Extension(state): Extension<Arc<crate::AppState>>,
    path: Result<Path<String>, PathRejection>,
) -> ApiResult<Observation> {
    let id = parse_id(path)?;
    let ob = state.service.delete(id).await.map_err(ApiError::from_service)?;
    Ok(Json(ob))
}

async fn list_handler(
    Extension(state): Extension<Arc<crate::AppState>>,
) -> ApiResult<Vec<Observation>> {
    let obs = state.service.list().await.map_err(ApiError::from_service)?;
    Ok(Json(obs))
}
