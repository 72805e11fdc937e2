use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use shared::{
    domain::{EndpointId, InstanceId},
    error::{ApiError, ErrorCode},
    protocol::{ClientRequest, CoordinatorStatus},
};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

mod actor;
mod app_state;
mod config;
mod coordinator;
mod endpoint;

use actor::CoordinatorHandle;
use app_state::AppState;
use config::load_settings;
use coordinator::Coordinator;

const MAX_WS_MESSAGE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Deserialize)]
struct WsQuery {
    endpoint: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings();
    tracing_subscriber::fmt()
        .with_env_filter(settings.log_filter.as_str())
        .init();

    let state = AppState {
        coordinator: CoordinatorHandle::spawn(Coordinator::new()),
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "coordinator listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CoordinatorStatus>, (StatusCode, Json<ApiError>)> {
    state.coordinator.status().await.map(Json).ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(
                ErrorCode::Unavailable,
                "coordinator is not running",
            )),
        )
    })
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(q): Query<WsQuery>,
) -> Response {
    let endpoint = match q.endpoint.parse::<EndpointId>() {
        Ok(endpoint) => endpoint,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiError::new(ErrorCode::Validation, e.to_string())),
            )
                .into_response();
        }
    };
    ws.max_message_size(MAX_WS_MESSAGE_BYTES)
        .on_upgrade(move |socket| ws_connection(state, socket, endpoint))
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket, endpoint: EndpointId) {
    let Some(attachment) = state.coordinator.attach(endpoint).await else {
        warn!(endpoint = %endpoint, "ws: coordinator unavailable, closing socket");
        return;
    };
    let instance_id = attachment.instance_id;
    let mut events_rx = attachment.events;
    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let coordinator = state.coordinator.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                WsMessage::Text(text) => {
                    handle_client_request(&coordinator, instance_id, endpoint, &text).await
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.coordinator.close(instance_id).await;
    debug!(endpoint = %endpoint, instance_id = instance_id.0, "ws: connection finished");
}

async fn handle_client_request(
    coordinator: &CoordinatorHandle,
    instance_id: InstanceId,
    endpoint: EndpointId,
    text: &str,
) {
    let request = match serde_json::from_str::<ClientRequest>(text) {
        Ok(request) => request,
        Err(error) => {
            warn!(
                endpoint = %endpoint,
                instance_id = instance_id.0,
                %error,
                "ws: dropping malformed request"
            );
            return;
        }
    };

    match request {
        ClientRequest::Ready => coordinator.ready(instance_id).await,
        ClientRequest::Send {
            destination,
            message,
        } => coordinator.send(instance_id, destination, message).await,
        ClientRequest::RequestResend => coordinator.request_resend(instance_id).await,
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
