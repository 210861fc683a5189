use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use iptv_core::{Selected, SessionClient, SessionError};
use iptv_core::switcher::StepOutcome;
use iptv_proto::protocol::{Direction, LifecycleSignal, SessionState};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[derive(Clone)]
struct HttpState {
    session: SessionClient,
}

#[derive(Serialize)]
struct ChannelInfo {
    idx: usize,
    name: String,
    url: String,
    logo: Option<String>,
    group: Option<String>,
}

#[derive(Deserialize)]
struct ChannelFilter {
    group: Option<String>,
}

#[derive(Deserialize)]
struct SelectRequest {
    url: String,
}

#[derive(Serialize)]
struct StepResponse {
    moved: bool,
    display_index: Option<usize>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

struct ApiError(SessionError);

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            SessionError::InvalidLocator(_) => StatusCode::BAD_REQUEST,
            SessionError::UnknownChannel(_) => StatusCode::NOT_FOUND,
            SessionError::ConstructionFailure(_) => StatusCode::BAD_GATEWAY,
            SessionError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SessionError::Closed => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

pub fn start_server(bind_address: String, port: u16, session: SessionClient) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(session);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

fn router(session: SessionClient) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/groups", get(get_groups))
        .route("/api/channels", get(get_channels))
        .route("/api/select", post(select))
        .route("/api/pick/:idx", post(pick))
        .route("/api/step/:direction", post(step))
        .route("/api/pause", post(pause))
        .route("/api/resume", post(resume))
        .route("/api/stop", post(stop))
        .route("/api/release", post(release))
        .route("/api/lifecycle/:signal", post(lifecycle))
        .route("/api/playlist/reload", post(reload_playlist))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(HttpState { session })
}

async fn get_state(State(state): State<HttpState>) -> Json<SessionState> {
    Json(state.session.snapshot().await)
}

async fn get_groups(State(state): State<HttpState>) -> Json<Vec<String>> {
    Json(state.session.snapshot().await.groups)
}

async fn get_channels(
    State(state): State<HttpState>,
    Query(filter): Query<ChannelFilter>,
) -> Json<Vec<ChannelInfo>> {
    let snapshot = state.session.snapshot().await;
    let channels = snapshot
        .channels
        .into_iter()
        .enumerate()
        .filter(|(_, c)| match &filter.group {
            Some(group) => c.group.as_ref() == Some(group),
            None => true,
        })
        .map(|(idx, c)| ChannelInfo {
            idx,
            name: c.name,
            url: c.url,
            logo: c.logo,
            group: c.group,
        })
        .collect();
    Json(channels)
}

async fn select(
    State(state): State<HttpState>,
    Json(req): Json<SelectRequest>,
) -> Result<Json<Selected>, ApiError> {
    info!("HTTP API: Select {}", req.url);
    Ok(Json(state.session.select_channel(&req.url).await?))
}

async fn pick(
    State(state): State<HttpState>,
    Path(idx): Path<usize>,
) -> Result<Json<Selected>, ApiError> {
    info!("HTTP API: Pick channel {}", idx);
    Ok(Json(state.session.pick(idx).await?))
}

async fn step(State(state): State<HttpState>, Path(direction): Path<String>) -> Response {
    let direction: Direction = match direction.parse() {
        Ok(d) => d,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(ErrorBody { error: e.to_string() })).into_response(),
    };
    info!("HTTP API: Step {:?}", direction);
    match state.session.step(direction).await {
        Ok(StepOutcome::Moved { display_index }) => Json(StepResponse {
            moved: true,
            display_index: Some(display_index),
        })
        .into_response(),
        Ok(StepOutcome::Clamped) => Json(StepResponse {
            moved: false,
            display_index: state.session.snapshot().await.display_index,
        })
        .into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

async fn pause(State(state): State<HttpState>) -> Result<StatusCode, ApiError> {
    info!("HTTP API: Pause");
    state.session.pause().await?;
    Ok(StatusCode::OK)
}

async fn resume(State(state): State<HttpState>) -> Result<StatusCode, ApiError> {
    info!("HTTP API: Resume");
    state.session.resume().await?;
    Ok(StatusCode::OK)
}

async fn stop(State(state): State<HttpState>) -> Result<StatusCode, ApiError> {
    info!("HTTP API: Stop");
    state.session.stop().await?;
    Ok(StatusCode::OK)
}

async fn release(State(state): State<HttpState>) -> Result<StatusCode, ApiError> {
    info!("HTTP API: Release");
    state.session.release().await?;
    Ok(StatusCode::OK)
}

async fn lifecycle(State(state): State<HttpState>, Path(signal): Path<String>) -> Response {
    let signal: LifecycleSignal = match signal.parse() {
        Ok(s) => s,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(ErrorBody { error: e.to_string() })).into_response(),
    };
    info!("HTTP API: Lifecycle {:?}", signal);
    match state.session.lifecycle(signal).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

async fn reload_playlist(State(state): State<HttpState>) -> Result<StatusCode, ApiError> {
    info!("HTTP API: Reload playlist");
    state.session.reload_playlist().await?;
    Ok(StatusCode::ACCEPTED)
}
