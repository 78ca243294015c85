//! HTTP surface for the QA engine.
//!
//! Deliberately thin: request validation and JSON shaping only, with all
//! logic behind [`QaEngine`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/ask?question=...` | Answer a natural-language question |
//! | `GET`  | `/health` | Index state, corpus size, last refresh time |
//!
//! # Error Contract
//!
//! Error responses use a JSON envelope:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser-based chat
//! frontends can call the API directly.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::engine::{Health, QaEngine};
use crate::models::Answer;

#[derive(Clone)]
struct AppState {
    engine: Arc<QaEngine>,
}

/// Builds the router. Split from [`run_server`] so tests can drive the
/// routes without binding a socket.
pub fn router(engine: Arc<QaEngine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ask", get(handle_ask))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { engine })
}

/// Binds and serves until the process is terminated.
pub async fn run_server(engine: Arc<QaEngine>, bind: &str) -> anyhow::Result<()> {
    let app = router(engine);

    tracing::info!(bind, "QA server listening");
    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

// ============ GET /ask ============

#[derive(Deserialize)]
struct AskParams {
    question: Option<String>,
}

/// JSON response body for `GET /ask`: the rendered answer plus the
/// structured extraction result.
#[derive(Serialize)]
struct AskResponse {
    answer: String,
    #[serde(flatten)]
    detail: Answer,
}

async fn handle_ask(
    State(state): State<AppState>,
    Query(params): Query<AskParams>,
) -> Result<Json<AskResponse>, AppError> {
    let question = params.question.unwrap_or_default();
    if question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let detail = state.engine.answer(&question);
    Ok(Json(AskResponse {
        answer: detail.text.clone(),
        detail,
    }))
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    #[serde(flatten)]
    health: Health,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        health: state.engine.health(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Message, Snapshot};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn ready_router() -> Router {
        let engine = Arc::new(QaEngine::new(6));
        engine.publish(Snapshot::new(vec![Message {
            id: "m1".to_string(),
            author: "Vikram Desai".to_string(),
            timestamp: None,
            content: "I now own 3 cars".to_string(),
        }]));
        router(engine)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ask_without_question_is_bad_request() {
        let response = ready_router()
            .oneshot(Request::builder().uri("/ask").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "bad_request");
        assert_eq!(body["error"]["message"], "question must not be empty");
    }

    #[tokio::test]
    async fn test_ask_with_blank_question_is_bad_request() {
        let response = ready_router()
            .oneshot(
                Request::builder()
                    .uri("/ask?question=%20")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "bad_request");
    }

    #[tokio::test]
    async fn test_ask_answers_with_flattened_detail() {
        let response = ready_router()
            .oneshot(
                Request::builder()
                    .uri("/ask?question=How%20many%20cars%20does%20Vikram%20Desai%20have%3F")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["answer"], "Vikram Desai has 3 cars.");
        assert_eq!(body["type"], "count");
        assert_eq!(body["value"], 3);
        assert_eq!(body["sources"][0], "m1");
    }

    #[tokio::test]
    async fn test_health_reports_engine_state() {
        let response = ready_router()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["index_state"], "ready");
        assert_eq!(body["corpus_size"], 1);
        // Publishing a snapshot without a refresh leaves the marker unset.
        assert!(body["last_refresh_time"].is_null());
    }
}
