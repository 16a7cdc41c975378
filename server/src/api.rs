use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use common::{MintComposer, MintError, MintForm};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::canvas::{CanvasError, ExportFormat};
use crate::content::{ContentStore, PublishError, Publisher};
use crate::engine::{EngineError, EngineHandle, StyleUpdate};
use crate::sessions::Canvases;
use crate::ws;

#[derive(Clone)]
pub struct AppState {
    pub canvases: Arc<Mutex<Canvases>>,
    pub content: ContentStore,
    pub publisher: Arc<Publisher>,
    pub composer: Arc<MintComposer>,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl ToString) -> ApiError {
    (status, Json(json!({ "error": message.to_string() })))
}

fn engine_error(e: EngineError) -> ApiError {
    match e {
        EngineError::Canvas(CanvasError::InvalidBrushWidth(_)) => {
            api_error(StatusCode::BAD_REQUEST, e)
        }
        e => {
            tracing::error!("Canvas engine error: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/canvas", post(create_canvas))
        .route("/api/canvas/{id}", get(get_canvas))
        .route("/api/canvas/{id}/undo", post(undo))
        .route("/api/canvas/{id}/redo", post(redo))
        .route("/api/canvas/{id}/style", put(set_style))
        .route("/api/canvas/{id}/image.png", get(get_image))
        .route("/api/canvas/{id}/publish", post(publish))
        .route("/api/mint", post(mint))
        .route("/ipfs/{cid}", get(get_content))
        .route("/api/health", get(health))
        .route("/ws/{id}", get(ws_upgrade))
        .with_state(state)
}

async fn engine(state: &AppState, id: u64) -> Result<EngineHandle, ApiError> {
    state
        .canvases
        .lock()
        .await
        .get(id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("canvas {id} not found")))
}

async fn create_canvas(State(state): State<AppState>) -> impl IntoResponse {
    let mut canvases = state.canvases.lock().await;
    let (id, _) = canvases.create();
    let config = *canvases.config();
    tracing::info!("Created canvas {}", id);
    (
        StatusCode::CREATED,
        Json(json!({
            "id": id,
            "width": config.width,
            "height": config.height,
        })),
    )
}

async fn get_canvas(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = engine(&state, id).await?;
    let history = engine.state().await.map_err(engine_error)?;
    Ok(Json(history))
}

async fn undo(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = engine(&state, id).await?;
    let history = engine.undo().await.map_err(engine_error)?;
    Ok(Json(history))
}

async fn redo(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = engine(&state, id).await?;
    let history = engine.redo().await.map_err(engine_error)?;
    Ok(Json(history))
}

async fn set_style(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(update): Json<StyleUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = engine(&state, id).await?;
    let history = engine.set_style(update).await.map_err(engine_error)?;
    Ok(Json(history))
}

async fn get_image(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = engine(&state, id).await?;
    let png = engine
        .export(ExportFormat::Png)
        .await
        .map_err(engine_error)?;
    Ok((
        [
            (header::CONTENT_TYPE, ExportFormat::Png.content_type()),
            (header::CACHE_CONTROL, "no-cache, must-revalidate"),
        ],
        png,
    ))
}

async fn publish(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(form): Json<MintForm>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = engine(&state, id).await?;
    match state.publisher.publish(&engine, &form).await {
        Ok(published) => Ok(Json(published)),
        Err(PublishError::Validation(e)) => Err(api_error(StatusCode::BAD_REQUEST, e)),
        Err(PublishError::Engine(e)) => Err(engine_error(e)),
        Err(e @ PublishError::Upload(_)) => Err(api_error(StatusCode::BAD_GATEWAY, e)),
    }
}

#[derive(Deserialize)]
struct MintRequest {
    recipient: String,
    content_url: String,
}

async fn mint(
    State(state): State<AppState>,
    Json(request): Json<MintRequest>,
) -> Result<impl IntoResponse, ApiError> {
    match state.composer.compose(&request.recipient, &request.content_url) {
        Ok(transaction) => Ok(Json(transaction)),
        Err(e @ (MintError::InvalidAddress(_) | MintError::Validation(_))) => {
            tracing::warn!("Rejected mint for {:?}: {}", request.recipient, e);
            Err(api_error(StatusCode::BAD_REQUEST, e))
        }
        Err(e) => {
            tracing::error!("Failed to compose mint: {}", e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e))
        }
    }
}

async fn get_content(
    State(state): State<AppState>,
    Path(cid): Path<String>,
) -> Result<Response, ApiError> {
    let content = state.content.get(&cid).await.map_err(|e| {
        tracing::error!("Failed to read content {}: {}", cid, e);
        api_error(StatusCode::BAD_GATEWAY, e)
    })?;
    match content {
        Some(content) => Ok((
            [
                (header::CONTENT_TYPE, content.content_type),
                (header::CACHE_CONTROL, "public, max-age=31536000, immutable".to_string()),
            ],
            content.bytes,
        )
            .into_response()),
        None => Err(api_error(StatusCode::NOT_FOUND, format!("{cid} not found"))),
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let canvases = state.canvases.lock().await.len();
    let uploads = state.content.upload_count().await.ok();

    Json(json!({
        "status": "ok",
        "canvases": canvases,
        "upload_count": uploads,
    }))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = engine(&state, id).await?;
    Ok(ws.on_upgrade(move |socket| ws::handle_socket(socket, engine)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::CanvasConfig;
    use axum::body::Body;
    use axum::http::Request;
    use common::mint::{MintParams, FEE_AMOUNT, MAX_CONTENT_URL_BYTES, MINT_MESSAGE_AMOUNT};
    use common::Color;
    use tower::ServiceExt;

    const OWNER: &str = "EQBsrBcQEljeB4clOLGBHEM5UvzZZy6_Rv65obhkJV89NdA9";

    fn app() -> Router {
        let content = ContentStore::memory();
        let state = AppState {
            canvases: Arc::new(Mutex::new(Canvases::new(
                8,
                CanvasConfig {
                    width: 24,
                    height: 24,
                    background: Some(Color::WHITE),
                },
            ))),
            content: content.clone(),
            publisher: Arc::new(Publisher::new(content, "http://gateway.test")),
            composer: Arc::new(MintComposer::new(MintParams::default()).unwrap()),
        };
        router(state)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, Vec<u8>) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn json_of(bytes: &[u8]) -> serde_json::Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_canvas_lifecycle() {
        let app = app();
        let (status, body) = send(&app, "POST", "/api/canvas", None).await;
        assert_eq!(status, StatusCode::CREATED);
        let created = json_of(&body);
        assert_eq!(created["width"], 24);
        let id = created["id"].as_u64().unwrap();

        let (status, body) = send(&app, "GET", &format!("/api/canvas/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let history = json_of(&body);
        assert_eq!(history["undo_depth"], 0);
        assert_eq!(history["color"], "#000000");

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/api/canvas/{id}/style"),
            Some(json!({ "color": "#ff8800", "width": 20 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let history = json_of(&body);
        assert_eq!(history["color"], "#ff8800");
        assert_eq!(history["width"], 20.0);

        let (status, _) = send(
            &app,
            "PUT",
            &format!("/api/canvas/{id}/style"),
            Some(json!({ "width": 99 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, "POST", &format!("/api/canvas/{id}/undo"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body)["redo_depth"], 0);

        let (status, body) = send(&app, "GET", &format!("/api/canvas/{id}/image.png"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..4], b"\x89PNG");
    }

    #[tokio::test]
    async fn test_unknown_canvas_is_not_found() {
        let app = app();
        let (status, body) = send(&app, "POST", "/api/canvas/42/redo", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json_of(&body)["error"].is_string());
    }

    #[tokio::test]
    async fn test_publish_then_fetch_from_gateway() {
        let app = app();
        let (_, body) = send(&app, "POST", "/api/canvas", None).await;
        let id = json_of(&body)["id"].as_u64().unwrap();

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/canvas/{id}/publish"),
            Some(json!({ "name": "" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_of(&body)["error"], "name is required");

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/canvas/{id}/publish"),
            Some(json!({ "name": "Doodle" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let published = json_of(&body);
        let metadata_url = published["metadata_url"].as_str().unwrap();
        let path = metadata_url.strip_prefix("http://gateway.test").unwrap();

        let (status, body) = send(&app, "GET", path, None).await;
        assert_eq!(status, StatusCode::OK);
        let metadata = json_of(&body);
        assert_eq!(metadata["name"], "Doodle");
        assert_eq!(metadata["image"], published["image_url"]);

        let (status, _) = send(&app, "GET", "/ipfs/unknown", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_mint_request() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/api/mint",
            Some(json!({
                "recipient": OWNER,
                "content_url": "https://gateway/ipfs/QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let request = json_of(&body);
        let messages = request["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0]["payload"].as_str().is_some_and(|p| !p.is_empty()));
        assert!(messages[1].get("payload").is_none());
        assert_eq!(messages[0]["amount"], MINT_MESSAGE_AMOUNT.to_string());
        assert_eq!(messages[1]["amount"], FEE_AMOUNT.to_string());
        assert!(request["validUntil"].as_u64().is_some());

        let (status, body) = send(
            &app,
            "POST",
            "/api/mint",
            Some(json!({ "recipient": "not-an-address", "content_url": "https://x" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json_of(&body)["error"]
            .as_str()
            .unwrap()
            .starts_with("invalid address"));
    }

    #[tokio::test]
    async fn test_mint_rejects_oversized_content_url() {
        let app = app();
        let content_url = format!("https://gateway/ipfs/{}", "a".repeat(1_000_000));
        let (status, body) = send(
            &app,
            "POST",
            "/api/mint",
            Some(json!({ "recipient": OWNER, "content_url": content_url })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            json_of(&body)["error"],
            format!("content_url must be at most {MAX_CONTENT_URL_BYTES} bytes")
        );
    }

    #[tokio::test]
    async fn test_health() {
        let app = app();
        let (status, body) = send(&app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        let health = json_of(&body);
        assert_eq!(health["status"], "ok");
        assert_eq!(health["canvases"], 0);
    }
}
