//! HTTP surface
//!
//! - `GET /v1/ws/updates`: viewer WebSocket, receives stream status events
//! - `GET /v1/ws/streamstatus`: status WebSocket, frames are relayed to viewers
//! - `GET /v1/api/live`: public streams currently publishing
//! - `GET /v1/api/live/{name}`: one live stream, public or not, 404 when offline
//! - `GET /v1/api/hubs`: hub counters
//! - `GET|POST /v1/rpc/handle_stream`: check a `name`/`key` pair for an
//!   external ingest front end; 200 accepted, 400 no name, 401 rejected

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Form, Path, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tokio::net::TcpListener;

use crate::hub::{HubHandle, HubStats};
use crate::registry::{ActiveStream, StreamRegistry};
use crate::store::MetadataStore;
use crate::transport::{serve_client, HubConfig};

/// Shared state for the HTTP handlers
pub struct AppState<S: MetadataStore> {
    pub viewers: HubHandle,
    pub status: HubHandle,
    pub registry: Arc<StreamRegistry<S>>,
    pub hub_config: HubConfig,
}

impl<S: MetadataStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            viewers: self.viewers.clone(),
            status: self.status.clone(),
            registry: Arc::clone(&self.registry),
            hub_config: self.hub_config,
        }
    }
}

pub fn router<S: MetadataStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/v1/ws/updates", get(ws_updates::<S>))
        .route("/v1/ws/streamstatus", get(ws_status::<S>))
        .route("/v1/api/live", get(live_streams::<S>))
        .route("/v1/api/live/{name}", get(live_stream::<S>))
        .route("/v1/api/hubs", get(hub_stats::<S>))
        .route(
            "/v1/rpc/handle_stream",
            get(handle_stream_query::<S>).post(handle_stream_form::<S>),
        )
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown` completes
pub async fn serve<S, F>(listener: TcpListener, state: AppState<S>, shutdown: F) -> std::io::Result<()>
where
    S: MetadataStore,
    F: Future<Output = ()> + Send + 'static,
{
    tracing::info!(addr = %listener.local_addr()?, "HTTP API listening");

    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await
}

async fn ws_updates<S: MetadataStore>(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState<S>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_client(socket, addr, state.viewers, state.hub_config))
}

async fn ws_status<S: MetadataStore>(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState<S>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_client(socket, addr, state.status, state.hub_config))
}

async fn live_streams<S: MetadataStore>(State(state): State<AppState<S>>) -> Json<Vec<ActiveStream>> {
    let mut streams = state.registry.active_streams();
    streams.retain(|stream| stream.is_public);
    Json(streams)
}

async fn live_stream<S: MetadataStore>(
    Path(name): Path<String>,
    State(state): State<AppState<S>>,
) -> Response {
    match state.registry.lookup(&name) {
        Some(stream) => Json(stream).into_response(),
        None => error_response(StatusCode::NOT_FOUND, &format!("stream {name} is not live")),
    }
}

/// Publish credentials, as query string or form body
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StreamCredentials {
    name: String,
    key: String,
}

async fn handle_stream_query<S: MetadataStore>(
    State(state): State<AppState<S>>,
    Query(credentials): Query<StreamCredentials>,
) -> Response {
    handle_stream(&state, credentials).await
}

async fn handle_stream_form<S: MetadataStore>(
    State(state): State<AppState<S>>,
    Form(credentials): Form<StreamCredentials>,
) -> Response {
    handle_stream(&state, credentials).await
}

async fn handle_stream<S: MetadataStore>(state: &AppState<S>, credentials: StreamCredentials) -> Response {
    if credentials.name.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No stream name");
    }

    match state.registry.authenticate(&credentials.name, &credentials.key).await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(e) => error_response(StatusCode::UNAUTHORIZED, &e.to_string()),
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

async fn hub_stats<S: MetadataStore>(State(state): State<AppState<S>>) -> Json<Vec<HubStats>> {
    let mut stats = Vec::with_capacity(2);
    stats.extend(state.viewers.stats().await);
    stats.extend(state.status.stats().await);
    Json(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use crate::hub::Hub;
    use crate::session::Session;
    use crate::store::{MemoryStore, StreamRecord};

    async fn start() -> (SocketAddr, Arc<StreamRegistry<MemoryStore>>) {
        let (viewer_hub, viewers) = Hub::new("updates");
        viewer_hub.spawn();
        let (status_hub, status) = Hub::new("status");
        status_hub.spawn();

        let mut unlisted = StreamRecord::new("hidden", "secret2");
        unlisted.display_name = Some("Rehearsal".into());
        unlisted.is_public = false;
        let store = MemoryStore::with_records([StreamRecord::new("alpha", "secret1"), unlisted]).unwrap();
        let registry = Arc::new(StreamRegistry::new(store, status.clone()));
        let state = AppState {
            viewers,
            status,
            registry: Arc::clone(&registry),
            hub_config: HubConfig::default(),
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, state, std::future::pending()));
        (addr, registry)
    }

    async fn get(addr: SocketAddr, path: &str) -> String {
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        send(addr, &request).await
    }

    async fn post_form(addr: SocketAddr, path: &str, body: &str) -> String {
        let request = format!(
            "POST {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\
             Content-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        send(addr, &request).await
    }

    async fn send(addr: SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_live_endpoints() {
        let (addr, registry) = start().await;

        let response = get(addr, "/v1/api/live").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("[]"));

        let session: Session = registry.authenticate("alpha", "secret1").await.unwrap();
        registry.open_session(&session, Vec::new()).unwrap();

        let response = get(addr, "/v1/api/live").await;
        assert!(response.contains("\"name\":\"alpha\""));

        let response = get(addr, "/v1/api/live/alpha").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("\"createdAt\""));

        let response = get(addr, "/v1/api/live/beta").await;
        assert!(response.starts_with("HTTP/1.1 404"));
        assert!(response.contains("\"error\""));
    }

    #[tokio::test]
    async fn test_unlisted_stream_hidden_from_directory() {
        let (addr, registry) = start().await;

        let session = registry.authenticate("hidden", "secret2").await.unwrap();
        registry.open_session(&session, Vec::new()).unwrap();

        let response = get(addr, "/v1/api/live").await;
        assert!(response.ends_with("[]"));

        let response = get(addr, "/v1/api/live/hidden").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("\"displayName\":\"Rehearsal\""));
        assert!(response.contains("\"isPublic\":false"));
    }

    #[tokio::test]
    async fn test_handle_stream_endpoint() {
        let (addr, registry) = start().await;

        let response = post_form(addr, "/v1/rpc/handle_stream", "name=alpha&key=secret1").await;
        assert!(response.starts_with("HTTP/1.1 200"));

        let response = post_form(addr, "/v1/rpc/handle_stream", "name=alpha&key=wrong").await;
        assert!(response.starts_with("HTTP/1.1 401"));

        let response = post_form(addr, "/v1/rpc/handle_stream", "name=gamma&key=secret1").await;
        assert!(response.starts_with("HTTP/1.1 401"));

        let response = post_form(addr, "/v1/rpc/handle_stream", "key=secret1").await;
        assert!(response.starts_with("HTTP/1.1 400"));
        assert!(response.contains("No stream name"));

        let response = get(addr, "/v1/rpc/handle_stream?name=alpha&key=secret1").await;
        assert!(response.starts_with("HTTP/1.1 200"));

        let response = get(addr, "/v1/rpc/handle_stream?name=&key=secret1").await;
        assert!(response.starts_with("HTTP/1.1 400"));

        // A credential check never claims the name
        assert_eq!(registry.stream_count(), 0);
    }

    #[tokio::test]
    async fn test_hub_stats_endpoint() {
        let (addr, _registry) = start().await;

        let response = get(addr, "/v1/api/hubs").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("\"topic\":\"updates\""));
        assert!(response.contains("\"topic\":\"status\""));
    }

    #[tokio::test]
    async fn test_websocket_requires_upgrade() {
        let (addr, _registry) = start().await;

        let response = get(addr, "/v1/ws/updates").await;
        assert!(!response.starts_with("HTTP/1.1 200"));
    }
}
