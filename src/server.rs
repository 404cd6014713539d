//! HTTP surface of the game.
//!
//! A thin axum layer over [`Engine`]: each handler identifies the browser
//! session from the `memory_session` cookie (issuing a fresh UUID when it is
//! missing or malformed), runs the engine call on tokio's blocking pool, and
//! maps [`GameError`]s onto status codes with a JSON [`ErrorBody`].
//!
//! | Route | Engine operation |
//! |-------|------------------|
//! | `GET /api/game/board` | [`Engine::board`] |
//! | `POST /api/game/init` | [`Engine::start_new_round`] |
//! | `POST /api/image/crop` | [`Engine::resolve_crop`] |
//! | `POST /api/game/check/{pos1}/{pos2}` | [`Engine::check_match`] |
//! | `POST /api/game/reset` | [`Engine::reset`] |
//! | `GET /api/image/dimensions/{filename}` | [`Engine::dimensions`] |
//! | `GET /api/image/square/{filename}` | [`Engine::square_suggestion`] |
//! | `GET /img/{*path}` | [`Engine::image_path`] |
//! | `GET /healthz` | liveness |

use crate::api::{CropRequest, ErrorBody, StatusResponse};
use crate::engine::{Engine, GameError};
use crate::store::{MemoryStore, SessionId};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{FromRequestParts, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "memory_session";

pub type GameEngine = Engine<MemoryStore>;

#[derive(Clone)]
pub struct AppState {
    engine: Arc<GameEngine>,
}

/// Build the application router.
pub fn router(engine: Arc<GameEngine>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/api/game/board", get(board))
        .route("/api/game/init", post(init))
        .route("/api/game/check/{pos1}/{pos2}", post(check))
        .route("/api/game/reset", post(reset))
        .route("/api/image/crop", post(crop))
        .route("/api/image/dimensions/{filename}", get(dimensions))
        .route("/api/image/square/{filename}", get(square))
        .route("/img/{*path}", get(image))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { engine })
}

/// Bind and serve until Ctrl-C.
pub async fn serve(engine: Arc<GameEngine>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(engine))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
}

// =============================================================================
// Session cookie
// =============================================================================

/// The caller's session, and whether it was just issued.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    issued: bool,
}

impl Session {
    fn from_headers(headers: &HeaderMap) -> Self {
        let existing = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE)
            .map(|(_, value)| value)
            .filter(|value| uuid::Uuid::parse_str(value).is_ok());

        match existing {
            Some(value) => Self {
                id: SessionId::new(value),
                issued: false,
            },
            None => Self {
                id: SessionId::generate(),
                issued: true,
            },
        }
    }

    /// Turn an engine result into a response, attaching the cookie if new.
    fn respond<T: Serialize>(&self, result: Result<T, GameError>) -> Response {
        let mut response = match result {
            Ok(body) => Json(body).into_response(),
            Err(err) => ApiError(err).into_response(),
        };
        if self.issued {
            let cookie = format!(
                "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax",
                self.id
            );
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
        }
        response
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Session {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

// =============================================================================
// Errors
// =============================================================================

pub struct ApiError(pub GameError);

pub fn status_for(err: &GameError) -> StatusCode {
    match err {
        GameError::NotFound => StatusCode::NOT_FOUND,
        GameError::Unreadable(_)
        | GameError::InvalidIndex(_)
        | GameError::AlreadyMatched(_)
        | GameError::MissingField(_)
        | GameError::NotSquare
        | GameError::InvalidCrop(_) => StatusCode::BAD_REQUEST,
        GameError::NotPending(_) | GameError::NoActiveRound => StatusCode::CONFLICT,
        GameError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}

/// Run an engine call on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T, GameError>
where
    F: FnOnce() -> Result<T, GameError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| GameError::Storage(format!("worker failed: {e}")))?
}

fn parse_position(raw: &str, field: &'static str) -> Result<i64, GameError> {
    raw.parse().map_err(|_| GameError::MissingField(field))
}

// =============================================================================
// Handlers
// =============================================================================

async fn health() -> &'static str {
    "ok"
}

async fn board(State(state): State<AppState>, session: Session) -> Response {
    let id = session.id.clone();
    let result = blocking(move || state.engine.board(&id, &mut rand::rng())).await;
    session.respond(result)
}

async fn init(State(state): State<AppState>, session: Session) -> Response {
    let id = session.id.clone();
    let result = blocking(move || state.engine.start_new_round(&id, &mut rand::rng())).await;
    session.respond(result)
}

async fn crop(State(state): State<AppState>, session: Session, body: Bytes) -> Response {
    let id = session.id.clone();
    let result = match CropRequest::parse(&body) {
        Ok(req) => {
            blocking(move || {
                state
                    .engine
                    .resolve_crop(&id, &req.filename, req.crop_box, &mut rand::rng())
            })
            .await
        }
        Err(err) => Err(err),
    };
    session.respond(result)
}

async fn check(
    State(state): State<AppState>,
    session: Session,
    Path((pos1, pos2)): Path<(String, String)>,
) -> Response {
    let id = session.id.clone();
    let result = match (parse_position(&pos1, "pos1"), parse_position(&pos2, "pos2")) {
        (Ok(pos1), Ok(pos2)) => {
            blocking(move || state.engine.check_match(&id, pos1, pos2, &mut rand::rng())).await
        }
        (Err(err), _) | (_, Err(err)) => Err(err),
    };
    session.respond(result)
}

async fn reset(State(state): State<AppState>, session: Session) -> Response {
    let id = session.id.clone();
    let result = blocking(move || state.engine.reset(&id).map(|()| StatusResponse::ok())).await;
    session.respond(result)
}

async fn dimensions(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let dims = blocking(move || state.engine.dimensions(&filename))
        .await
        .map_err(ApiError)?;
    Ok(Json(dims).into_response())
}

async fn square(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let region = blocking(move || state.engine.square_suggestion(&filename))
        .await
        .map_err(ApiError)?;
    Ok(Json(region).into_response())
}

async fn image(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    let file = blocking(move || state.engine.image_path(&path))
        .await
        .map_err(ApiError)?;
    let bytes = tokio::fs::read(&file)
        .await
        .map_err(|_| ApiError(GameError::NotFound))?;
    let content_type = content_type_for(&file);
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

fn content_type_for(path: &std::path::Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}
