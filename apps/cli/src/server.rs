//! HTTP entrypoints for ingestion and question answering.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use axum::routing::post;
use campusguide_core::{CampusGuide, SilentProgress};
use campusguide_shared::{
    ErrorKind, GuideError, IngestionOutcome, IngestionRequest, QueryAnswer, QueryRequest,
};
use color_eyre::eyre::{Result, eyre};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub(crate) const INGEST_ROUTE: &str = "/api/admin/crawl-building-faq";
pub(crate) const QUERY_ROUTE: &str = "/api/building-ai";

#[derive(Clone)]
struct AppState {
    guide: Arc<CampusGuide>,
}

/// Build the router with both entrypoints and the CORS policy.
pub(crate) fn router(guide: Arc<CampusGuide>, cors_origin: &str) -> Result<Router> {
    let cors = if cors_origin.trim() == "*" {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origin = HeaderValue::from_str(cors_origin.trim())
            .map_err(|e| eyre!("invalid server.cors_origin '{cors_origin}': {e}"))?;
        CorsLayer::new().allow_origin(origin)
    }
    .allow_methods(Any)
    .allow_headers(Any);

    Ok(Router::new()
        .route(INGEST_ROUTE, post(crawl_building_faq))
        .route(QUERY_ROUTE, post(building_ai))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { guide }))
}

/// Bind `bind` and serve until the process is stopped.
pub(crate) async fn serve(guide: Arc<CampusGuide>, bind: &str, cors_origin: &str) -> Result<()> {
    let app = router(guide, cors_origin)?;
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| eyre!("cannot bind {bind}: {e}"))?;

    info!(addr = %listener.local_addr()?, "campus guide API listening");
    println!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn crawl_building_faq(
    State(state): State<AppState>,
    payload: std::result::Result<Json<IngestionRequest>, JsonRejection>,
) -> std::result::Result<Json<IngestionOutcome>, ApiError> {
    let Json(request) = payload.map_err(ApiError::from)?;
    let outcome = state.guide.ingest(&request, &SilentProgress).await?;
    Ok(Json(outcome))
}

async fn building_ai(
    State(state): State<AppState>,
    payload: std::result::Result<Json<QueryRequest>, JsonRejection>,
) -> std::result::Result<Json<QueryAnswer>, ApiError> {
    let Json(request) = payload.map_err(ApiError::from)?;
    let answer = state.guide.ask(&request).await?;
    Ok(Json(answer))
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error response wrapper: `{"detail": ..., "kind": ...}`.
pub(crate) struct ApiError(GuideError);

impl From<GuideError> for ApiError {
    fn from(e: GuideError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(GuideError::validation(rejection.body_text()))
    }
}

pub(crate) fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::UpstreamFetch | ErrorKind::Llm => StatusCode::BAD_GATEWAY,
        ErrorKind::ExtractionParse
        | ErrorKind::Persistence
        | ErrorKind::Config
        | ErrorKind::Io => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            tracing::error!(kind = kind.as_str(), error = %self.0, "request failed");
        }
        let body = json!({ "detail": self.0.to_string(), "kind": kind });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use campusguide_core::{GuideSettings, PromptTemplates, ScriptedModel};
    use campusguide_crawler::Fetcher;
    use campusguide_shared::{FetchConfig, Scope};
    use campusguide_storage::Storage;
    use tower::ServiceExt;

    async fn test_guide(model: Arc<ScriptedModel>) -> Arc<CampusGuide> {
        let db = std::env::temp_dir().join(format!("cg_test_{}.db", uuid::Uuid::now_v7()));
        let storage = Storage::open(&db).await.unwrap();
        storage
            .upsert_scope(&Scope {
                id: "1".into(),
                label: "본관".into(),
                ordinal: Some(1),
            })
            .await
            .unwrap();
        let fetcher = Fetcher::new(&FetchConfig::default()).unwrap();
        Arc::new(CampusGuide::new(
            storage,
            fetcher,
            model,
            PromptTemplates::default(),
            GuideSettings::default(),
        ))
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn query_returns_answer() {
        let model = Arc::new(ScriptedModel::with_replies(["정보가 없어요"]));
        let app = router(test_guide(model.clone()).await, "*").unwrap();

        let response = app
            .oneshot(post_json(
                QUERY_ROUTE,
                r#"{"question": "화장실 어디 있어?", "scopeId": null}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"answer": "정보가 없어요"}));
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn unknown_scope_is_bad_request() {
        let model = Arc::new(ScriptedModel::new());
        let app = router(test_guide(model.clone()).await, "*").unwrap();

        let response = app
            .oneshot(post_json(
                INGEST_ROUTE,
                r#"{"scopeId": "999", "url": "https://campus.example/b999"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["kind"], "validation");
        assert!(body["detail"].as_str().unwrap().contains("999"));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_field_is_bad_request() {
        let model = Arc::new(ScriptedModel::new());
        let app = router(test_guide(model).await, "*").unwrap();

        let response = app
            .oneshot(post_json(INGEST_ROUTE, r#"{"url": "https://campus.example"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["kind"], "validation");
    }

    #[tokio::test]
    async fn model_failure_is_bad_gateway() {
        let model = Arc::new(ScriptedModel::new());
        model.push_error(GuideError::Llm("connection refused".into()));
        let app = router(test_guide(model).await, "*").unwrap();

        let response = app
            .oneshot(post_json(QUERY_ROUTE, r#"{"question": "매점?"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_json(response).await["kind"], "llm");
    }

    #[tokio::test]
    async fn cors_allows_configured_origin() {
        let model = Arc::new(ScriptedModel::with_replies(["ok"]));
        let app = router(test_guide(model).await, "https://map.campus.example").unwrap();

        let mut request = post_json(QUERY_ROUTE, r#"{"question": "매점?"}"#);
        request
            .headers_mut()
            .insert("origin", HeaderValue::from_static("https://map.campus.example"));
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "https://map.campus.example"
        );
    }

    #[test]
    fn status_mapping() {
        assert_eq!(status_for(ErrorKind::UpstreamFetch), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(ErrorKind::ExtractionParse), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_for(ErrorKind::Persistence), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_for(ErrorKind::Validation), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn invalid_cors_origin_rejected() {
        // Header values cannot contain newlines.
        let guide = test_guide(Arc::new(ScriptedModel::new())).await;
        assert!(router(guide, "bad\norigin").is_err());
    }
}
