//! HTTP Server for the chunkload API.
//!
//! # API Endpoints
//!
//! | Method | Path                                | Description                   |
//! |--------|-------------------------------------|-------------------------------|
//! | GET    | `/health`                           | Health check                  |
//! | POST   | `/api/uploads`                      | Open an upload session        |
//! | GET    | `/api/uploads/{id}`                 | Session progress              |
//! | PUT    | `/api/uploads/{id}/chunks/{index}`  | Upload one chunk (`?total=n`) |
//! | POST   | `/api/uploads/{id}/finalize`        | Assemble and parse the file   |
//! | GET    | `/api/uploads/{id}/preview`         | Typed preview of the file     |
//! | GET    | `/api/logs`                         | SSE stream of server activity |

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post, put},
    Router,
};
use chunkload::{FileInfo, Preview};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, LOG_BROADCASTER};
use super::types::{error_response, status_for, ChunkQuery, FinalizeResponse, SessionCreated};
use crate::config::ServerConfig;
use crate::error::{ServerResult, SessionError};
use crate::sessions::{spawn_sweeper, ChunkAck, SessionStore, UploadSession};

/// Longest pause between two sweeps of expired sessions
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

type ApiError = (StatusCode, Json<Value>);

fn api_error(err: SessionError) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        log_error(format!("Internal error: {}", err));
    }
    (status, Json(error_response(&err.to_string())))
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SessionStore>,
}

/// Build the application router around `store`
pub fn router(store: Arc<SessionStore>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    let body_limit = usize::try_from(store.limits().max_chunk_size).unwrap_or(usize::MAX);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/uploads", post(create_session))
        .route("/api/uploads/{id}", get(session_status))
        .route("/api/uploads/{id}/chunks/{index}", put(upload_chunk))
        .route("/api/uploads/{id}/finalize", post(finalize_session))
        .route("/api/uploads/{id}/preview", get(get_preview))
        .route("/api/logs", get(sse_logs))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(AppState { store })
}

/// Start the HTTP server
pub async fn start_server(config: ServerConfig) -> ServerResult<()> {
    let store = Arc::new(SessionStore::from_config(&config));
    let sweep_every = config
        .session_ttl()
        .clamp(Duration::from_secs(1), SWEEP_INTERVAL);
    spawn_sweeper(Arc::clone(&store), sweep_every);
    let app = router(store);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    println!("🚀 Chunkload server running on http://localhost:{}", config.port);
    println!("   POST /api/uploads                     - Open a session");
    println!("   PUT  /api/uploads/{{id}}/chunks/{{index}} - Upload a chunk");
    println!("   POST /api/uploads/{{id}}/finalize       - Finalize");
    println!("   GET  /api/uploads/{{id}}/preview        - Preview");
    println!("   GET  /api/logs                        - SSE log stream");
    println!("   GET  /health                          - Health check");
    println!();
    println!("📂 Spooling to {}", config.spool_dir.display());
    println!("⏱️  Idle sessions expire after {}s", config.session_ttl_secs);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "chunkload",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.store.count().await,
        "maxChunkSize": state.store.limits().max_chunk_size,
    }))
}

/// SSE endpoint: recent history, then live entries
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (history, receiver) = LOG_BROADCASTER.subscribe_with_history();
    let live = BroadcastStream::new(receiver).filter_map(|result| result.ok());

    let stream = tokio_stream::iter(history)
        .chain(live)
        .filter_map(|entry| {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok::<_, Infallible>(Event::default().data(json)))
        });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

async fn create_session(
    State(state): State<AppState>,
    Json(file): Json<FileInfo>,
) -> Result<(StatusCode, Json<SessionCreated>), ApiError> {
    let session = state.store.create(file).await.map_err(api_error)?;
    let created = SessionCreated::new(&session, state.store.limits().max_chunk_size);
    Ok((StatusCode::CREATED, Json(created)))
}

async fn session_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UploadSession>, ApiError> {
    state.store.get(&id).await.map(Json).map_err(api_error)
}

async fn upload_chunk(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, u64)>,
    Query(query): Query<ChunkQuery>,
    body: Bytes,
) -> Result<Json<ChunkAck>, ApiError> {
    state
        .store
        .accept_chunk(&id, index, query.total, &body)
        .await
        .map(Json)
        .map_err(api_error)
}

async fn finalize_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FinalizeResponse>, ApiError> {
    let preview = state.store.finalize(&id).await.map_err(api_error)?;

    Ok(Json(FinalizeResponse {
        session_id: preview.session_id,
        status: "finalized".to_string(),
        columns: preview.columns,
        total_rows: preview.total_rows,
    }))
}

async fn get_preview(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Preview>, ApiError> {
    state.store.preview(&id).await.map(Json).map_err(api_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::SessionLimits;
    use chunkload::{
        ColumnType, FileInfo, HttpTransport, MemoryFile, TransportError, UploadConfig,
        UploadOrchestrator, UploadOutcome, UploadTransport,
    };
    use tempfile::tempdir;
    use tokio_util::sync::CancellationToken;

    async fn spawn_server(spool_dir: &std::path::Path) -> String {
        let limits = SessionLimits {
            max_file_size: 1024 * 1024,
            max_chunk_size: 64,
            preview_rows: 2,
            session_ttl: Duration::from_secs(60),
        };
        let store = Arc::new(SessionStore::new(spool_dir, limits));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, router(store)).await.unwrap();
        });

        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_chunked_upload_end_to_end() {
        let dir = tempdir().unwrap();
        let transport = HttpTransport::new(spawn_server(dir.path()).await);
        let config = UploadConfig::default()
            .with_chunk_size(16)
            .with_retry_delay_ms(0);
        let orchestrator = UploadOrchestrator::new(transport.clone(), config);

        let file = MemoryFile::csv(
            "people.csv",
            "id,name,score\n1,Alice,95\n2,Bob,87\n3,Carol,78.5\n",
        );
        let session_id = match orchestrator.start(&file).await {
            UploadOutcome::Completed { session_id } => session_id,
            other => panic!("Expected completion, got {:?}", other),
        };

        let preview = transport
            .fetch_preview(&session_id, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(preview.columns, vec!["id", "name", "score"]);
        assert_eq!(preview.total_rows, 3);
        assert_eq!(preview.rows.len(), 2);
        assert_eq!(preview.rows[0]["name"], "Alice");
        assert_eq!(preview.column_types["score"], ColumnType::Number);
    }

    #[tokio::test]
    async fn test_out_of_order_chunk_is_conflict() {
        let dir = tempdir().unwrap();
        let transport = HttpTransport::new(spawn_server(dir.path()).await);
        let cancel = CancellationToken::new();

        let file = FileInfo::new("a.csv", 8, "text/csv");
        let session_id = transport.initialize(&file, &cancel).await.unwrap();

        let err = transport
            .send_chunk(&session_id, 1, 2, b"1,2\n", &cancel)
            .await
            .unwrap_err();
        match err {
            TransportError::Status { status, message } => {
                assert_eq!(status, 409);
                assert!(message.contains("out of order"));
            }
            other => panic!("Expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_preview_requires_finalize() {
        let dir = tempdir().unwrap();
        let transport = HttpTransport::new(spawn_server(dir.path()).await);
        let cancel = CancellationToken::new();

        let missing = transport.fetch_preview("nope", &cancel).await.unwrap_err();
        assert!(matches!(missing, TransportError::Status { status: 404, .. }));

        let file = FileInfo::new("a.csv", 8, "text/csv");
        let session_id = transport.initialize(&file, &cancel).await.unwrap();
        let pending = transport.fetch_preview(&session_id, &cancel).await.unwrap_err();
        assert!(matches!(pending, TransportError::Status { status: 409, .. }));
    }

    #[tokio::test]
    async fn test_invalid_content_is_unprocessable() {
        let dir = tempdir().unwrap();
        let transport = HttpTransport::new(spawn_server(dir.path()).await);
        let orchestrator = UploadOrchestrator::new(transport, UploadConfig::default());

        let file = MemoryFile::csv("data.csv", "{\"users\": [{\"id\": 1}]}");
        match orchestrator.start(&file).await {
            UploadOutcome::Failed { message, retryable } => {
                assert!(retryable);
                assert!(message.contains("422"));
            }
            other => panic!("Expected failure, got {:?}", other),
        }
    }
}
