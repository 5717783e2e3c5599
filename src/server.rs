//! HTTP surface
//!
//! - `POST /alerts/:kind` alert webhooks (fatal, nonfatal, regression, velocity)
//! - `POST /slack/interactions` button clicks
//! - `GET|POST /test-crash` manual trigger
//! - `GET /health`
//!
//! Every webhook finishes its work before responding, bounded by the
//! invocation timeout.

use crate::crash::{AlertKind, CrashAlert};
use crate::pipeline::CrashPipeline;
use crate::scenarios::{CustomIssue, ScenarioRunner};
use crate::slack::{verify_signature, InteractionHandler, InteractionPayload};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<CrashPipeline>,
    pub interactions: Arc<InteractionHandler>,
    pub scenarios: Arc<ScenarioRunner>,
    pub signing_secret: Option<String>,
    pub invocation_timeout: Duration,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/alerts/:kind", post(alert_handler))
        .route("/slack/interactions", post(interaction_handler))
        .route("/test-crash", get(test_crash_handler).post(test_crash_handler))
        .with_state(state)
}

pub async fn serve(bind: &str, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Webhook server listening on {}", bind);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn health_handler() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// Run `work` within the invocation budget. `None` means it timed out.
async fn within_budget<T>(budget: Duration, work: impl Future<Output = T>) -> Option<T> {
    match tokio::time::timeout(budget, work).await {
        Ok(value) => Some(value),
        Err(_) => {
            error!(budget_secs = budget.as_secs(), "Invocation timed out");
            None
        }
    }
}

async fn alert_handler(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(event): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let Some(kind) = AlertKind::from_slug(&kind).filter(|k| *k != AlertKind::Test) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("unknown alert kind '{}'", kind)})),
        );
    };

    let Some(alert) = CrashAlert::from_event(kind, &event) else {
        warn!(?kind, "Alert event has no issue payload, ignoring");
        return (StatusCode::OK, Json(json!({"ignored": true})));
    };

    match within_budget(state.invocation_timeout, state.pipeline.handle_alert(&alert)).await {
        Some(Ok(outcome)) => (
            StatusCode::OK,
            Json(json!({
                "threadTs": outcome.thread_ts,
                "resolved": outcome.resolved,
                "fixOffered": outcome.fix_offered,
            })),
        ),
        Some(Err(e)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        ),
        None => (
            StatusCode::GATEWAY_TIMEOUT,
            Json(json!({"error": "invocation timed out"})),
        ),
    }
}

async fn interaction_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    if let Some(secret) = state.signing_secret.as_deref() {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
        };
        let now = chrono::Utc::now().timestamp();
        if let Err(e) = verify_signature(
            secret,
            header("x-slack-request-timestamp"),
            &body,
            header("x-slack-signature"),
            now,
        ) {
            warn!(error = %e, "Rejected interaction request");
            return (StatusCode::UNAUTHORIZED, "invalid signature");
        }
    }

    let payload = match InteractionPayload::from_form(&body) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "Malformed interaction payload");
            return (StatusCode::OK, "ok");
        }
    };

    match within_budget(state.invocation_timeout, state.interactions.handle(&payload)).await {
        Some(Ok(outcome)) => info!(?outcome, "Interaction handled"),
        Some(Err(e)) => error!(error = %e, "Interaction failed"),
        None => {}
    }

    // Always acknowledge; outcomes are reported in the thread.
    (StatusCode::OK, "ok")
}

#[derive(Debug, Default, Deserialize)]
struct TriggerQuery {
    scenario: Option<String>,
}

async fn test_crash_handler(
    State(state): State<AppState>,
    method: Method,
    Query(query): Query<TriggerQuery>,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let custom = if method == Method::POST && !body.is_empty() {
        match serde_json::from_slice::<CustomIssue>(&body) {
            Ok(custom) => Some(custom),
            Err(e) => {
                warn!(error = %e, "Ignoring unparseable trigger body");
                None
            }
        }
    } else {
        None
    };

    let work = state
        .scenarios
        .trigger(query.scenario.as_deref(), custom.as_ref());
    match within_budget(state.invocation_timeout, work).await {
        Some(response) => {
            let status = StatusCode::from_u16(response.status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(response.body().clone()))
        }
        None => (
            StatusCode::GATEWAY_TIMEOUT,
            Json(json!({"success": false, "error": "invocation timed out"})),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::SourceHost;
    use crate::llm::DiagnosticEngine;
    use crate::parser::SignalParser;
    use crate::remediation::RemediationPublisher;
    use crate::resolver::{SourceResolver, TreeCache};
    use crate::slack::{sign, ChatClient, Notifier};
    use crate::testing::{FakeChat, FakeModel, FakeSourceHost};

    fn state(chat: Arc<FakeChat>, model: FakeModel, secret: Option<&str>) -> AppState {
        let host: Arc<dyn SourceHost> = Arc::new(FakeSourceHost::new());
        let chat_dyn: Arc<dyn ChatClient> = chat;
        let resolver = Arc::new(SourceResolver::new(
            host.clone(),
            Arc::new(TreeCache::new(Duration::from_secs(300))),
            "main",
        ));
        let engine = Arc::new(DiagnosticEngine::new(
            Arc::new(model),
            2048,
            16384,
            Duration::from_secs(5),
        ));
        let notifier = Arc::new(Notifier::new(chat_dyn.clone(), "C123", ""));
        let pipeline = Arc::new(CrashPipeline::new(
            SignalParser::new("swift").unwrap(),
            host.clone(),
            resolver.clone(),
            engine.clone(),
            notifier,
        ));
        let publisher = Arc::new(RemediationPublisher::new(host.clone(), "main", vec![]));
        let interactions = Arc::new(InteractionHandler::new(
            chat_dyn,
            host,
            resolver,
            engine,
            publisher,
            vec!["bug".into()],
            "C123",
        ));
        AppState {
            scenarios: Arc::new(ScenarioRunner::new(pipeline.clone())),
            pipeline,
            interactions,
            signing_secret: secret.map(str::to_string),
            invocation_timeout: Duration::from_secs(300),
        }
    }

    fn interaction_headers(secret: &str, ts: i64, body: &[u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-slack-request-timestamp", ts.to_string().parse().unwrap());
        headers.insert("x-slack-signature", sign(secret, ts, body).parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn test_health() {
        assert_eq!(health_handler().await.0["status"], "ok");
    }

    #[tokio::test]
    async fn test_alert_without_issue_is_ignored() {
        let chat = Arc::new(FakeChat::new());
        let st = state(chat.clone(), FakeModel::new(), None);
        let (status, body) =
            alert_handler(State(st), Path("fatal".into()), Json(json!({"data": {}}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.0["ignored"], true);
        assert!(chat.posted().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_alert_kind_is_404() {
        let st = state(Arc::new(FakeChat::new()), FakeModel::new(), None);
        let (status, _) =
            alert_handler(State(st), Path("bogus".into()), Json(json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_alert_runs_pipeline() {
        let chat = Arc::new(FakeChat::new());
        let st = state(chat.clone(), FakeModel::new().reply("analysis"), None);
        let event = json!({
            "appId": "1:1:android:abc",
            "data": {"payload": {"issue": {"id": "9", "title": "SIGSEGV", "subtitle": "no file"}}}
        });
        let (status, body) = alert_handler(State(st), Path("regression".into()), Json(event)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.0["fixOffered"], false);
        assert!(chat.posted()[0].text.contains("Regressed issue"));
    }

    #[tokio::test]
    async fn test_interaction_rejects_bad_signature() {
        let chat = Arc::new(FakeChat::new());
        let st = state(chat.clone(), FakeModel::new(), Some("secret"));
        let body = Bytes::from_static(b"payload=%7B%7D");
        let ts = chrono::Utc::now().timestamp();
        let headers = interaction_headers("other-secret", ts, &body);

        let (status, _) = interaction_handler(State(st), headers, body).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(chat.posted().is_empty());
    }

    #[tokio::test]
    async fn test_interaction_with_valid_signature_is_acknowledged() {
        let chat = Arc::new(FakeChat::new());
        let st = state(chat.clone(), FakeModel::new(), Some("secret"));
        let payload = json!({"type": "view_submission", "actions": []}).to_string();
        let body = Bytes::from(format!(
            "payload={}",
            url::form_urlencoded::byte_serialize(payload.as_bytes()).collect::<String>()
        ));
        let ts = chrono::Utc::now().timestamp();
        let headers = interaction_headers("secret", ts, &body);

        let (status, text) = interaction_handler(State(st), headers, body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn test_trigger_unknown_scenario_is_400() {
        let st = state(Arc::new(FakeChat::new()), FakeModel::new(), None);
        let (status, body) = test_crash_handler(
            State(st),
            Method::GET,
            Query(TriggerQuery {
                scenario: Some("missing".into()),
            }),
            Bytes::new(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.0["available"].is_array());
    }

    #[tokio::test]
    async fn test_trigger_custom_post_body() {
        let chat = Arc::new(FakeChat::new());
        let st = state(chat.clone(), FakeModel::new().reply("analysis"), None);
        let body = Bytes::from(json!({"title": "SIGABRT", "subtitle": "Foo.swift:3"}).to_string());
        let (status, response) =
            test_crash_handler(State(st), Method::POST, Query(TriggerQuery::default()), body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.0["issue"]["id"], "CUSTOM_TEST");
        assert!(chat.posted()[0].text.starts_with("🧪"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_expiry_returns_none() {
        let slow = tokio::time::sleep(Duration::from_secs(10));
        assert!(within_budget(Duration::from_secs(1), slow).await.is_none());
        assert_eq!(within_budget(Duration::from_secs(1), async { 5 }).await, Some(5));
    }
}
