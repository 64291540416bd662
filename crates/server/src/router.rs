use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::services::{ServeDir, ServeFile};

use crate::bootstrap::AppState;
use crate::{agents_api, chat, conversations, health, voice};

/// The full route table, plus static chat-UI serving when the built UI
/// directory is present.
pub fn create_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/health", get(health::health))
        .route("/voice", post(voice::voice))
        .route("/transcribe", post(voice::transcribe_only))
        .route("/tts", post(voice::tts_only))
        .route("/api/chat", post(chat::chat))
        .route("/api/chat/audio", post(chat::chat_audio))
        .route("/api/conversations", get(conversations::list_conversations))
        .route("/api/conversations/recent", get(conversations::recent_messages))
        .route("/api/conversations/{id}", get(conversations::get_conversation))
        .route("/api/agents", get(agents_api::list_agents))
        .route("/api/agents/switch", post(agents_api::switch_agent))
        .route("/reload-config", post(agents_api::reload_config))
        .with_state(state.clone());

    let ui_dir = state.chat_ui_dir();
    if ui_dir.exists() {
        let spa = ServeDir::new(&ui_dir).not_found_service(ServeFile::new(ui_dir.join("index.html")));
        api.fallback_service(spa)
    } else {
        api
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use tempfile::TempDir;
    use tower::util::ServiceExt;

    use parlance_core::config::AppConfig;

    use crate::bootstrap::bootstrap_with_config;
    use crate::router::create_router;

    const ROUTING_FIXTURE: &str = r#"
keywords = ["agent", "diet"]

[[command]]
name = "log"
agents = ["diet"]
silent = true
aliases = ["add"]

[[agent]]
name = "diet"
path = "/tmp/agents/diet"
voice = "af_heart"
"#;

    async fn test_router(dir: &TempDir) -> Router {
        fs::write(dir.path().join("agents.toml"), ROUTING_FIXTURE).expect("routing fixture");

        let mut config = AppConfig::default();
        config.paths.routing_config = dir.path().join("agents.toml");
        config.paths.session_file = dir.path().join(".agent-session.json");
        config.paths.conversations_root = dir.path().join("conversations");
        config.sounds.dir = dir.path().join("sound-effects");
        config.paths.chat_ui_dir = dir.path().join("chat-ui/dist");

        let app = bootstrap_with_config(config).await.expect("bootstrap should succeed");
        create_router(app.state)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        serde_json::from_slice(&bytes).expect("body should be json")
    }

    #[tokio::test]
    async fn health_reports_loaded_routing() {
        let dir = TempDir::new().expect("tempdir");
        let router = test_router(&dir).await;

        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["agents"], 1);
        assert_eq!(json["commands"], 1);
    }

    #[tokio::test]
    async fn agents_listing_tracks_the_sticky_switch() {
        let dir = TempDir::new().expect("tempdir");
        let router = test_router(&dir).await;

        let listing = body_json(
            router
                .clone()
                .oneshot(Request::get("/api/agents").body(Body::empty()).expect("request"))
                .await
                .expect("response"),
        )
        .await;
        assert_eq!(listing[0]["name"], "diet");
        assert_eq!(listing[0]["active"], false);
        assert_eq!(listing[1]["name"], "default");
        assert_eq!(listing[1]["active"], true);

        let switch = router
            .clone()
            .oneshot(
                Request::post("/api/agents/switch")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"agent":"diet"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(switch.status(), StatusCode::OK);

        let listing = body_json(
            router
                .oneshot(Request::get("/api/agents").body(Body::empty()).expect("request"))
                .await
                .expect("response"),
        )
        .await;
        assert_eq!(listing[0]["active"], true, "diet should now be sticky");
        assert_eq!(listing[1]["active"], false);
    }

    #[tokio::test]
    async fn switching_to_an_unknown_agent_is_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let router = test_router(&dir).await;

        let response = router
            .oneshot(
                Request::post("/api/agents/switch")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"agent":"no-such-agent"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn tiny_voice_bodies_are_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let router = test_router(&dir).await;

        let response = router
            .oneshot(Request::post("/voice").body(Body::from("too small")).expect("request"))
            .await
            .expect("response");
        // No cue sounds staged in the fixture, so the fallback status
        // surfaces instead of audio.
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reload_config_picks_up_edits() {
        let dir = TempDir::new().expect("tempdir");
        let router = test_router(&dir).await;

        fs::write(
            dir.path().join("agents.toml"),
            format!("{ROUTING_FIXTURE}\n[[agent]]\nname = \"budget\"\npath = \"/tmp/agents/budget\"\n"),
        )
        .expect("rewrite routing fixture");

        let response = router
            .clone()
            .oneshot(Request::post("/reload-config").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["agents"], 2);

        let health = body_json(
            router
                .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
                .await
                .expect("response"),
        )
        .await;
        assert_eq!(health["agents"], 2);
    }

    #[tokio::test]
    async fn conversations_listing_is_empty_for_a_fresh_agent() {
        let dir = TempDir::new().expect("tempdir");
        let router = test_router(&dir).await;

        let response = router
            .oneshot(Request::get("/api/conversations").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json.as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn unknown_conversation_id_is_not_found() {
        let dir = TempDir::new().expect("tempdir");
        let router = test_router(&dir).await;

        let response = router
            .oneshot(
                Request::get("/api/conversations/not-a-date").body(Body::empty()).expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
