#[cfg(test)]
mod chat_handler_tests {
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::api::{app_state::AppState, create_router};
    use crate::config::PipelineConfig;
    use crate::index::SimpleEmbeddingModel;
    use crate::llm::StubLanguageModel;
    use crate::observability::PipelineMetrics;
    use crate::services::{SessionLocks, TurnOrchestrator, create_nugget_service};
    use crate::storage::{GraphStore, InMemoryGraphStore};

    const MESSAGE: &str =
        "In 2023 we hired 40 engineers in three months and half of them left.";

    fn app() -> Router {
        let store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        let locks = SessionLocks::new();
        let orchestrator = TurnOrchestrator::new(
            store.clone(),
            Arc::new(StubLanguageModel),
            Arc::new(SimpleEmbeddingModel::new(64)),
            PipelineConfig::default(),
            locks.clone(),
            Arc::new(PipelineMetrics::default()),
        );
        let nugget_service = create_nugget_service(store, locks);
        create_router(AppState::new(orchestrator, nugget_service))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(match body {
                Some(json) => Body::from(json.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_chat_turn_captures_and_graph_is_readable() {
        let app = app();

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/chat_turn",
            Some(json!({ "message": MESSAGE })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "captured");
        assert_eq!(body["update_kind"], "addition");
        assert_eq!(body["new_nodes"].as_array().unwrap().len(), 1);
        assert_eq!(body["captured_nuggets"][0]["is_new"], true);
        assert_eq!(body["next_question"]["gap_type"], "example");

        let session_id = body["session_id"].as_str().unwrap().to_string();
        let node_id = body["new_nodes"][0]["id"].as_str().unwrap().to_string();

        let (status, graph) = send(&app, "GET", &format!("/api/v1/sessions/{}/graph", session_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(graph["nodes"].as_array().unwrap().len(), 1);
        assert!(graph["nodes"][0].get("embedding").is_none());

        let (status, detail) = send(&app, "GET", &format!("/api/v1/nodes/{}", node_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["provenance"].as_array().unwrap().len(), 1);
        assert_eq!(detail["provenance"][0]["source_kind"], "chat");
        assert!(detail["nugget"].is_object());
    }

    #[tokio::test]
    async fn test_unknown_node_and_session_are_404() {
        let app = app();
        let (status, body) = send(&app, "GET", "/api/v1/nodes/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");

        let (status, _) = send(&app, "GET", "/api/v1/sessions/nope/graph", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let app = app();
        let (status, body) = send(&app, "POST", "/api/v1/chat_turn", Some(json!({ "message": "" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["retryable"], false);
    }

    #[tokio::test]
    async fn test_vague_message_gets_recovery_question() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/chat_turn",
            Some(json!({ "session_id": "s-vague", "message": "ok" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "extraction_failed");
        assert_eq!(body["reason"], "nothing_captured");
        assert_eq!(body["turn_number"], 1);
        assert!(body["recovery_question"].as_str().unwrap().ends_with('?'));

        let (_, graph) = send(&app, "GET", "/api/v1/sessions/s-vague/graph", None).await;
        assert!(graph["nodes"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nugget_feedback_and_listing() {
        let app = app();
        let (_, body) = send(
            &app,
            "POST",
            "/api/v1/chat_turn",
            Some(json!({ "session_id": "s-feedback", "message": MESSAGE })),
        )
        .await;
        let nugget_id = body["captured_nuggets"][0]["nugget_id"].as_str().unwrap().to_string();
        let score = body["captured_nuggets"][0]["score"].as_u64().unwrap();

        let (status, receipt) = send(
            &app,
            "POST",
            &format!("/api/v1/nuggets/{}/feedback", nugget_id),
            Some(json!({ "feedback": "up" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(receipt["score"].as_u64().unwrap(), score + 5);

        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/v1/nuggets/{}/status", nugget_id),
            Some(json!({ "status": "explored" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, list) = send(
            &app,
            "GET",
            "/api/v1/sessions/s-feedback/nuggets?status=explored&sort_by=created_at",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["total"], 1);
        assert_eq!(list["nuggets"][0]["user_feedback"], "up");
    }

    #[tokio::test]
    async fn test_metrics_count_turns() {
        let app = app();
        send(&app, "POST", "/api/v1/chat_turn", Some(json!({ "message": MESSAGE }))).await;

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("pipeline_turns_captured_total 1"));
    }
}
