// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end lifecycle scenarios over the full router, with a wiremock
//! gateway standing in for the downstream action service.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use http_body_util::BodyExt;
use intake_config::Settings;
use intake_core::Candidate;
use intake_daemon::{AppState, Stores, build_app};
use intake_normalize::{ProjectResolver, StaticProjectResolver, StubProjectResolver};
use intake_store::memory::MemoryStore;
use intake_store::{ClarificationStore, IntentStore, JournalStore};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "change-me";

struct Harness {
    app: Router,
    store: MemoryStore,
}

fn harness(settings: Settings, resolver: Arc<dyn ProjectResolver>) -> Harness {
    let store = MemoryStore::new();
    let shared = Arc::new(store.clone());
    let stores = Stores {
        intents: shared.clone(),
        clarifications: shared.clone(),
        journal: shared,
    };
    let state = Arc::new(AppState::new(settings, stores, resolver).unwrap());
    Harness {
        app: build_app(state),
        store,
    }
}

async fn post(app: &Router, uri: &str, body: Value) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

async fn get(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// -- Scenario 1: fresh create_task → ready -------------------------------

#[tokio::test]
async fn fresh_create_task_reaches_ready_with_two_journal_rows() {
    let h = harness(Settings::default(), Arc::new(StubProjectResolver));
    let response = post(
        &h.app,
        "/v1/intents",
        json!({"kind": "intent", "intent_type": "create_task", "fields": {"title": "Ship this"}}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let envelope = json_body(response).await;

    assert_eq!(envelope["status"], "ready");
    assert_eq!(envelope["plan"]["actions"][0]["action"], "notion.tasks.create");
    assert_eq!(envelope["plan"]["actions"][0]["payload"]["title"], "Ship this");

    let intent_id = envelope["intent_id"].as_str().unwrap();
    let artifacts = h.store.list_for_intent(intent_id).await.unwrap();
    let statuses: Vec<&str> = artifacts.iter().map(|a| a.status.as_str()).collect();
    assert_eq!(statuses, vec!["received", "ready"]);
    // Every journal row carries a verifiable content hash.
    for artifact in &artifacts {
        assert_eq!(
            artifact.artifact_hash,
            intake_core::sha256_hex(&intake_core::canonical_json(&artifact.artifact))
        );
    }
}

// -- Scenario 2: ambiguous project → clarification → answer → ready ------

#[tokio::test]
async fn ambiguous_project_round_trip_reaches_ready() {
    let resolver = Arc::new(StaticProjectResolver::new(vec![
        Candidate {
            id: "proj_123".into(),
            label: "John".into(),
            score: Some(0.95),
            meta: None,
        },
        Candidate {
            id: "proj_456".into(),
            label: "Sagita".into(),
            score: Some(0.94),
            meta: None,
        },
    ]));
    let h = harness(Settings::default(), resolver);

    let response = post(
        &h.app,
        "/v1/intents",
        json!({"kind": "intent", "intent_type": "create_task",
               "fields": {"title": "x", "project": "John and Sagita"}}),
    )
    .await;
    let envelope = json_body(response).await;
    assert_eq!(envelope["status"], "needs_clarification");
    assert_eq!(envelope["clarification"]["expected_answer_type"], "choice");
    let clarification_id = envelope["clarification"]["clarification_id"]
        .as_str()
        .unwrap()
        .to_string();
    let intent_id = envelope["intent_id"].as_str().unwrap().to_string();

    let response = post(
        &h.app,
        &format!("/v1/clarifications/{clarification_id}/answer"),
        json!({"choice_id": "proj_123"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let envelope = json_body(response).await;
    assert_eq!(envelope["status"], "ready");
    assert_eq!(
        envelope["plan"]["actions"][0]["payload"]["project"],
        "proj_123"
    );

    let row = IntentStore::get(&h.store, &intent_id).await.unwrap().unwrap();
    assert_eq!(row.status, intake_core::IntentStatus::Ready);
}

// -- Scenario 3: idempotent repost ---------------------------------------

#[tokio::test]
async fn idempotent_repost_shares_identity_and_the_open_clarification() {
    let resolver = Arc::new(StaticProjectResolver::new(vec![]));
    let h = harness(Settings::default(), resolver);
    let body = json!({"kind": "intent", "intent_type": "create_task",
                      "fields": {"title": "x", "project": "unknown"}});

    let first = json_body(post(&h.app, "/v1/intents", body.clone()).await).await;
    let second = json_body(post(&h.app, "/v1/intents", body).await).await;

    assert_eq!(first["intent_id"], second["intent_id"]);
    assert_eq!(first["receipt_id"], second["receipt_id"]);
    assert_eq!(h.store.list_open(None).await.unwrap().len(), 1);
}

// -- Scenario 4: expiry ---------------------------------------------------

#[tokio::test]
async fn aged_clarification_expires_and_cascades_to_the_intent() {
    let h = harness(Settings::default(), Arc::new(StubProjectResolver));
    let envelope = json_body(
        post(
            &h.app,
            "/v1/intents",
            json!({"kind": "intent", "intent_type": "create_task",
                   "fields": {"title": "x", "project": "nowhere"}}),
        )
        .await,
    )
    .await;
    let intent_id = envelope["intent_id"].as_str().unwrap().to_string();
    let clarification_id = envelope["clarification"]["clarification_id"]
        .as_str()
        .unwrap()
        .to_string();

    h.store
        .set_clarification_created_at(
            &clarification_id,
            chrono::Utc::now() - chrono::Duration::hours(73),
        )
        .await;

    let listing = json_body(get(&h.app, "/v1/clarifications?status=open").await).await;
    assert_eq!(listing, json!([]));

    let row = IntentStore::get(&h.store, &intent_id).await.unwrap().unwrap();
    assert_eq!(row.status, intake_core::IntentStatus::Expired);
}

// -- Scenario 5: low confidence ------------------------------------------

#[tokio::test]
async fn low_confidence_packet_is_rejected_by_policy() {
    let h = harness(Settings::default(), Arc::new(StubProjectResolver));
    let envelope = json_body(
        post(
            &h.app,
            "/v1/intents",
            json!({"kind": "intent", "intent_type": "create_task",
                   "confidence": 0.1, "fields": {"title": "x"}}),
        )
        .await,
    )
    .await;
    assert_eq!(envelope["status"], "rejected");
    assert_eq!(envelope["error_code"], "POLICY_LOW_CONFIDENCE");
}

// -- Scenario 6: execution failure ---------------------------------------

fn executing_settings(gateway_url: &str) -> Settings {
    Settings {
        execute_actions: true,
        gateway_base_url: Some(gateway_url.to_string()),
        gateway_bearer_token: Some("gw-token".into()),
        ..Settings::default()
    }
}

#[tokio::test]
async fn gateway_failure_surfaces_code_and_journals_the_action() {
    let gateway = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/tasks/create"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": {"code": "tasks_create_failed", "message": "downstream sad"}
        })))
        .mount(&gateway)
        .await;

    let h = harness(
        executing_settings(&gateway.uri()),
        Arc::new(StubProjectResolver),
    );
    let envelope = json_body(
        post(
            &h.app,
            "/v1/intents",
            json!({"kind": "intent", "intent_type": "create_task", "fields": {"title": "x"}}),
        )
        .await,
    )
    .await;

    assert_eq!(envelope["status"], "failed");
    assert_eq!(envelope["error_code"], "EXECUTION_FAILED");
    assert_eq!(envelope["error"]["code"], "tasks_create_failed");
    assert_eq!(envelope["error"]["details"]["status_code"], 500);

    let intent_id = envelope["intent_id"].as_str().unwrap();
    let action_row = h
        .store
        .latest(intent_id, intake_core::ArtifactKind::Action, "failed")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(action_row.action.as_deref(), Some("notion.tasks.create"));
    let row = IntentStore::get(&h.store, intent_id).await.unwrap().unwrap();
    assert_eq!(row.status, intake_core::IntentStatus::Failed);
}

#[tokio::test]
async fn gateway_success_executes_and_extracts_the_task_id() {
    let gateway = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/tasks/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "data": {"notion_page_id": "pg_77"}
        })))
        .mount(&gateway)
        .await;

    let h = harness(
        executing_settings(&gateway.uri()),
        Arc::new(StubProjectResolver),
    );
    let envelope = json_body(
        post(
            &h.app,
            "/v1/intents",
            json!({"kind": "intent", "intent_type": "create_task",
                   "request_id": "req-e2e", "fields": {"title": "Go"}}),
        )
        .await,
    )
    .await;

    assert_eq!(envelope["status"], "executed");
    assert_eq!(envelope["details"]["notion_task_id"], "pg_77");
    assert_eq!(envelope["details"]["request_id"], "req-e2e");

    let intent_id = envelope["intent_id"].as_str().unwrap();
    let row = IntentStore::get(&h.store, intent_id).await.unwrap().unwrap();
    assert_eq!(row.status, intake_core::IntentStatus::Executed);
    assert!(
        h.store
            .latest(intent_id, intake_core::ArtifactKind::Action, "executed")
            .await
            .unwrap()
            .is_some()
    );

    // Replaying the same body returns the executed envelope verbatim.
    let replay = json_body(
        post(
            &h.app,
            "/v1/intents",
            json!({"kind": "intent", "intent_type": "create_task",
                   "request_id": "req-e2e", "fields": {"title": "Go"}}),
        )
        .await,
    )
    .await;
    assert_eq!(replay["status"], "executed");
    assert_eq!(replay["intent_id"], envelope["intent_id"]);
}
