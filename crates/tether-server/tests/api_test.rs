// End-to-end tests for the dispatch API over the in-memory store.

use std::collections::HashMap;
use std::sync::Arc;

use actix_web::{App, test, web};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use parking_lot::Mutex;
use serde_json::json;

use tether_api::message::{ControlMessage, DataMessage};
use tether_common::TetherError;
use tether_core::BrokerPublisher;
use tether_persistence::{
    ConnectionStore, ConnectorClientState, MemoryConnectionStore, MessageMetadata,
};
use tether_server::api;
use tether_server::middleware::IdentityAuth;
use tether_server::model::{AppState, Configuration};

#[derive(Default)]
struct RecordingBroker {
    data: Mutex<Vec<(String, DataMessage)>>,
    control: Mutex<Vec<(String, ControlMessage)>>,
}

#[async_trait]
impl BrokerPublisher for RecordingBroker {
    async fn publish_data(
        &self,
        client_id: &str,
        message: &DataMessage,
    ) -> Result<(), TetherError> {
        self.data.lock().push((client_id.to_string(), message.clone()));
        Ok(())
    }

    async fn publish_control(
        &self,
        client_id: &str,
        message: &ControlMessage,
    ) -> Result<(), TetherError> {
        self.control.lock().push((client_id.to_string(), message.clone()));
        Ok(())
    }
}

fn identity_header(org_id: &str) -> (&'static str, String) {
    let document = format!(
        r#"{{"identity":{{"org_id":"{}","account_number":"0001","type":"User"}}}}"#,
        org_id
    );
    ("x-rh-identity", BASE64.encode(document))
}

fn associate_header(org_id: &str) -> (&'static str, String) {
    let document = format!(
        r#"{{"identity":{{"org_id":"{}","account_number":"0001","type":"Associate"}}}}"#,
        org_id
    );
    ("x-rh-identity", BASE64.encode(document))
}

async fn seed(store: &MemoryConnectionStore, client_id: &str, org_id: &str, dispatchers: serde_json::Value) {
    let now = tether_common::now_utc();
    store
        .register(&ConnectorClientState {
            client_id: client_id.to_string(),
            org_id: org_id.to_string(),
            account: "0001".to_string(),
            canonical_facts: Some(json!({"fqdn": "host.example.com"})),
            dispatchers,
            tags: json!({}),
            message_metadata: MessageMetadata {
                latest_message_id: "m1".to_string(),
                latest_timestamp: now,
            },
            created_at: now,
            updated_at: now,
            stale_timestamp: now,
            tenant_lookup_timestamp: None,
            tenant_lookup_failure_count: 0,
        })
        .await
        .unwrap();
}

struct TestContext {
    store: Arc<MemoryConnectionStore>,
    broker: Arc<RecordingBroker>,
    state: Arc<AppState>,
}

fn context() -> TestContext {
    let store = Arc::new(MemoryConnectionStore::new());
    let broker = Arc::new(RecordingBroker::default());
    let state = Arc::new(AppState {
        configuration: Configuration::from_values(config::Config::builder().build().unwrap()),
        store: store.clone(),
        broker: broker.clone(),
    });
    TestContext {
        store,
        broker,
        state,
    }
}

macro_rules! app {
    ($ctx:expr) => {
        test::init_service(
            App::new().service(
                web::scope("/api/tether")
                    .wrap(IdentityAuth::new(HashMap::new()))
                    .app_data(web::Data::from($ctx.state.clone()))
                    .service(api::v1::routes())
                    .service(api::v2::routes()),
            ),
        )
        .await
    };
}

#[actix_web::test]
async fn test_send_message_routes_to_broker() {
    let ctx = context();
    seed(&ctx.store, "c1", "org-1", json!({"rhc-worker-playbook": {}})).await;
    let app = app!(ctx);

    let req = test::TestRequest::post()
        .uri("/api/tether/v2/connections/c1/message")
        .insert_header(identity_header("org-1"))
        .set_json(json!({"directive": "d", "payload": "p"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    let body: serde_json::Value = test::read_body_json(resp).await;
    let id = body["id"].as_str().unwrap().to_string();
    assert!(uuid::Uuid::parse_str(&id).is_ok());

    let published = ctx.broker.data.lock();
    assert_eq!(published.len(), 1);
    let (client_id, message) = &published[0];
    assert_eq!(client_id, "c1");
    assert_eq!(message.message_id, id);
    assert_eq!(message.directive, "d");
    assert_eq!(message.content, json!("p"));
    assert_eq!(message.version, 1);
}

#[actix_web::test]
async fn test_cross_tenant_send_is_blocked() {
    let ctx = context();
    seed(&ctx.store, "c1", "org-1", json!({"rhc-worker-playbook": {}})).await;
    let app = app!(ctx);

    let req = test::TestRequest::post()
        .uri("/api/tether/v2/connections/c1/message")
        .insert_header(identity_header("org-2"))
        .set_json(json!({"directive": "d", "payload": "p"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    assert!(ctx.broker.data.lock().is_empty());
}

#[actix_web::test]
async fn test_empty_directive_is_rejected() {
    let ctx = context();
    seed(&ctx.store, "c1", "org-1", json!({})).await;
    let app = app!(ctx);

    let req = test::TestRequest::post()
        .uri("/api/tether/v2/connections/c1/message")
        .insert_header(identity_header("org-1"))
        .set_json(json!({"directive": "", "payload": "p"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    assert!(ctx.broker.data.lock().is_empty());
}

#[actix_web::test]
async fn test_satellite_relaxation_serves_cross_tenant_status() {
    let ctx = context();
    seed(&ctx.store, "c2", "org-a", json!({"foreman_rh_cloud": {}})).await;
    let app = app!(ctx);

    let req = test::TestRequest::get()
        .uri("/api/tether/v2/connections/c2/status")
        .insert_header(identity_header("org-b"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "connected");
    assert_eq!(body["org_id"], "org-a");
    assert_eq!(body["client_id"], "c2");
}

#[actix_web::test]
async fn test_status_of_unknown_agent_is_disconnected() {
    let ctx = context();
    let app = app!(ctx);

    let req = test::TestRequest::get()
        .uri("/api/tether/v2/connections/ghost/status")
        .insert_header(identity_header("org-1"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"status": "disconnected"}));
}

#[actix_web::test]
async fn test_list_is_paginated_and_tenant_scoped() {
    let ctx = context();
    for id in ["a1", "a2", "a3"] {
        seed(&ctx.store, id, "org-1", json!({})).await;
    }
    seed(&ctx.store, "b1", "org-2", json!({})).await;
    let app = app!(ctx);

    let req = test::TestRequest::get()
        .uri("/api/tether/v2/connections?offset=0&limit=2")
        .insert_header(identity_header("org-1"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["meta"]["count"], 3);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"][0]["client_id"], "a1");
    assert!(
        body["links"]["next"]
            .as_str()
            .unwrap()
            .contains("offset=2")
    );
}

#[actix_web::test]
async fn test_non_integer_paging_is_rejected() {
    let ctx = context();
    let app = app!(ctx);

    let req = test::TestRequest::get()
        .uri("/api/tether/v2/connections?offset=abc&limit=2")
        .insert_header(identity_header("org-1"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn test_unauthenticated_request_is_rejected() {
    let ctx = context();
    let app = app!(ctx);

    let req = test::TestRequest::get()
        .uri("/api/tether/v2/connections/c1/status")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
async fn test_reconnect_requires_admin_and_non_negative_delay() {
    let ctx = context();
    seed(&ctx.store, "c1", "org-1", json!({})).await;
    let app = app!(ctx);

    // a plain user may not issue commands
    let req = test::TestRequest::post()
        .uri("/api/tether/v2/connections/c1/reconnect")
        .insert_header(identity_header("org-1"))
        .set_json(json!({"delay": 5}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    // negative delay is invalid
    let req = test::TestRequest::post()
        .uri("/api/tether/v2/connections/c1/reconnect")
        .insert_header(associate_header("org-1"))
        .set_json(json!({"delay": -1}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // an associate with a sane delay reaches the broker
    let req = test::TestRequest::post()
        .uri("/api/tether/v2/connections/c1/reconnect")
        .insert_header(associate_header("org-1"))
        .set_json(json!({"delay": 5}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    let control = ctx.broker.control.lock();
    assert_eq!(control.len(), 1);
    assert_eq!(control[0].0, "c1");
    assert_eq!(control[0].1.content["command"], "reconnect");
    assert_eq!(control[0].1.content["arguments"]["delay"], 5);
}

#[actix_web::test]
async fn test_ping_dispatches_command() {
    let ctx = context();
    seed(&ctx.store, "c1", "org-1", json!({})).await;
    let app = app!(ctx);

    let req = test::TestRequest::post()
        .uri("/api/tether/v2/connections/c1/ping")
        .insert_header(identity_header("org-1"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    assert_eq!(ctx.broker.control.lock()[0].1.content["command"], "ping");
}

#[actix_web::test]
async fn test_cross_tenant_listing_requires_admin() {
    let ctx = context();
    seed(&ctx.store, "c1", "org-1", json!({})).await;
    seed(&ctx.store, "c2", "org-2", json!({})).await;
    let app = app!(ctx);

    let req = test::TestRequest::get()
        .uri("/api/tether/v2/connections/all")
        .insert_header(identity_header("org-1"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    let req = test::TestRequest::get()
        .uri("/api/tether/v2/connections/all")
        .insert_header(associate_header("org-1"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["meta"]["count"], 2);
}

#[actix_web::test]
async fn test_v1_surface_is_account_scoped() {
    let ctx = context();
    seed(&ctx.store, "c1", "org-1", json!({})).await;
    let app = app!(ctx);

    // the seeded record belongs to account 0001, same as the caller
    let req = test::TestRequest::get()
        .uri("/api/tether/v1/connections/c1/status")
        .insert_header(identity_header("org-other"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "connected");
    assert_eq!(body["account"], "0001");
}
