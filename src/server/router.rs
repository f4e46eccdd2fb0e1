use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::handlers::{chat, config, feedback, health, models, rag, sessions, tokens};
use crate::state::AppState;

/// Creates the application router with every route plus CORS and request
/// tracing.
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state.settings.server.cors_allowed_origins);
    Router::new()
        .route("/health", get(health::health))
        .route("/status", get(health::get_status))
        .route("/chat", post(chat::chat))
        .route("/chat/", post(chat::chat))
        .route("/ask", post(chat::ask))
        .route("/api/retrieve", post(rag::retrieve))
        .route("/api/context", post(rag::context))
        .route("/api/ingest/url", post(rag::ingest_url))
        .route("/api/ingest/text", post(rag::ingest_text))
        .route("/api/index/rebuild", post(rag::rebuild_index))
        .route("/api/index/stats", get(rag::index_stats))
        .route(
            "/api/sessions",
            get(sessions::list_sessions).post(sessions::create_session),
        )
        .route(
            "/api/sessions/:session_id",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        .route(
            "/api/sessions/:session_id/messages",
            get(sessions::get_session_messages),
        )
        .route(
            "/api/sessions/:session_id/transcript",
            get(sessions::get_transcript),
        )
        .route(
            "/api/feedback",
            get(feedback::list_feedback).post(feedback::save_feedback),
        )
        .route("/api/tokens/count", post(tokens::count_tokens))
        .route("/api/models", get(models::list_models))
        .route("/api/models/:model_id", get(models::get_model))
        .route(
            "/api/config",
            get(config::get_config)
                .post(config::update_config)
                .patch(config::patch_config),
        )
        .with_state(state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(configured: &[String]) -> CorsLayer {
    let origins = resolve_allowed_origins(configured);

    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok())
                .collect::<Vec<_>>(),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
}

fn resolve_allowed_origins(configured: &[String]) -> Vec<String> {
    let origins: Vec<String> = configured
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect();

    if origins.is_empty() {
        return default_local_origins();
    }
    origins
}

fn default_local_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
        "http://localhost:8501".to_string(),
        "http://127.0.0.1".to_string(),
        "http://127.0.0.1:3000".to_string(),
        "http://127.0.0.1:5173".to_string(),
        "http://127.0.0.1:8000".to_string(),
        "http://127.0.0.1:8501".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_origin_list_falls_back_to_local() {
        let origins = resolve_allowed_origins(&[" ".to_string()]);
        assert!(origins.contains(&"http://localhost:3000".to_string()));
    }

    #[test]
    fn configured_origins_are_trimmed() {
        let origins = resolve_allowed_origins(&[" https://shop.example ".to_string()]);
        assert_eq!(origins, vec!["https://shop.example".to_string()]);
    }
}
