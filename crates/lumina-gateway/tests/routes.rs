// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Route-level tests driven through `tower::ServiceExt::oneshot`.

use std::time::Duration;

use axum::Router;
use axum::body::Body;
use http::{Request, StatusCode};
use lumina_core::{Channel, EscalationReason, SenderRole};
use lumina_gateway::{GatewayState, WhatsAppWebhook, app};
use lumina_storage::queries::conversations;
use lumina_test_utils::{MockGenerator, TestHarness};
use serde_json::{Value, json};
use tower::ServiceExt;

const TOKEN: &str = "operator-token";
const APP_SECRET: &str = "meta-app-secret";
const VERIFY_TOKEN: &str = "verify-me";

async fn setup(generator: MockGenerator) -> (TestHarness, Router) {
    let harness = TestHarness::builder()
        .with_generator(generator)
        .build()
        .await
        .unwrap();
    let state = GatewayState::new(harness.router.clone(), Some(TOKEN.to_string()))
        .with_whatsapp(WhatsAppWebhook {
            app_secret: APP_SECRET.to_string(),
            verify_token: VERIFY_TOKEN.to_string(),
        });
    (harness, app(state))
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn chat(app: &Router, client_ref: &str, text: &str) -> Value {
    let (status, body) = call(
        app,
        "POST",
        "/v1/chat",
        Some(TOKEN),
        Some(json!({ "client_ref": client_ref, "text": text })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body
}

#[tokio::test]
async fn health_is_public_and_api_requires_token() {
    let (_harness, app) = setup(MockGenerator::new()).await;

    let (status, body) = call(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _) = call(&app, "GET", "/v1/escalations", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app, "GET", "/v1/escalations", Some("wrong"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app, "GET", "/metrics", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn web_chat_returns_the_automated_reply() {
    let (_harness, app) = setup(MockGenerator::new()).await;
    let body = chat(&app, "visitor-1", "¿Cuál es el horario?").await;
    assert_eq!(body["handled_by"], "automated");
    assert_eq!(body["reply"], "Con gusto te ayudo.");
    assert!(body["escalation"].is_null());

    let (status, _) = call(
        &app,
        "POST",
        "/v1/chat",
        Some(TOKEN),
        Some(json!({ "client_ref": "visitor-1", "text": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn takeover_lifecycle_over_http() {
    let generator = MockGenerator::with_replies(vec![MockGenerator::hinted(
        "Te comunico con alguien del equipo.",
        0.9,
        EscalationReason::ExplicitClientRequest,
    )]);
    let (_harness, app) = setup(generator).await;

    let body = chat(&app, "visitor-2", "Quiero hablar con una persona").await;
    let conv = body["conversation_id"].as_str().unwrap().to_string();
    assert_eq!(body["escalation"]["reason"], "explicit_client_request");

    let (status, body) = call(
        &app,
        "POST",
        &format!("/v1/conversations/{conv}/takeover"),
        Some(TOKEN),
        Some(json!({ "agent_id": "ana" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["session"]["holder"], "ana");
    assert_eq!(body["control"], json!({ "state": "human", "holder": "ana" }));

    let (status, body) = call(
        &app,
        "POST",
        &format!("/v1/conversations/{conv}/takeover"),
        Some(TOKEN),
        Some(json!({ "agent_id": "luis" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let body = chat(&app, "visitor-2", "¿Sigues ahí?").await;
    assert_eq!(body["handled_by"], "human");
    assert!(body["reply"].is_null());

    let (status, body) = call(
        &app,
        "POST",
        &format!("/v1/conversations/{conv}/reply"),
        Some(TOKEN),
        Some(json!({ "agent_id": "ana", "text": "Sí, aquí estoy." })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["sender"], "human");

    let (status, _) = call(
        &app,
        "POST",
        &format!("/v1/conversations/{conv}/transfer"),
        Some(TOKEN),
        Some(json!({ "agent_id": "ana", "to_agent": "luis", "reason": "turno" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        &app,
        "POST",
        &format!("/v1/conversations/{conv}/end"),
        Some(TOKEN),
        Some(json!({ "agent_id": "luis", "resolution": "cita agendada" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["control"], json!({ "state": "automated" }));

    let (status, body) = call(
        &app,
        "GET",
        &format!("/v1/conversations/{conv}/session"),
        Some(TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, body) = call(
        &app,
        "GET",
        &format!("/v1/conversations/{conv}/messages"),
        Some(TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["messages"].as_array().unwrap().len() >= 6);
}

#[tokio::test]
async fn escalation_ledger_over_http() {
    let generator = MockGenerator::with_replies(vec![MockGenerator::reply("No estoy segura.", 0.2)]);
    let (_harness, app) = setup(generator).await;
    let body = chat(&app, "visitor-3", "¿Me sirve el peeling?").await;
    let id = body["escalation"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["escalation"]["priority"], "high");

    let (status, body) = call(&app, "GET", "/v1/escalations?status=pending", Some(TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    let (status, _) = call(
        &app,
        "POST",
        &format!("/v1/escalations/{id}/resolve"),
        Some(TOKEN),
        Some(json!({ "resolution": "listo" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = call(
        &app,
        "POST",
        &format!("/v1/escalations/{id}/assign"),
        Some(TOKEN),
        Some(json!({ "agent_id": "ana" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "assigned");

    let (status, body) = call(
        &app,
        "POST",
        &format!("/v1/escalations/{id}/resolve"),
        Some(TOKEN),
        Some(json!({ "resolution": "listo" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "resolved");

    let (status, body) = call(&app, "GET", "/v1/escalations/stats", Some(TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    let (status, _) = call(&app, "GET", "/v1/escalations/nope", Some(TOKEN), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        "POST",
        "/v1/escalations/cleanup",
        Some(TOKEN),
        Some(json!({ "hours_threshold": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &app,
        "POST",
        "/v1/escalations/cleanup",
        Some(TOKEN),
        Some(json!({ "hours_threshold": 24 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expired"], 0);
}

#[tokio::test]
async fn whatsapp_handshake() {
    let (_harness, app) = setup(MockGenerator::new()).await;
    let request = Request::builder()
        .uri(format!(
            "/webhooks/whatsapp?hub.mode=subscribe&hub.verify_token={VERIFY_TOKEN}&hub.challenge=1158201444"
        ))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"1158201444");

    let request = Request::builder()
        .uri("/webhooks/whatsapp?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=1")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

fn webhook_body(message_id: &str) -> String {
    webhook_text(message_id, "Hola, ¿tienen citas mañana?")
}

fn webhook_text(message_id: &str, text: &str) -> String {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "changes": [{
                "value": {
                    "messages": [{
                        "from": "5215550001111",
                        "id": message_id,
                        "timestamp": "1700000000",
                        "type": "text",
                        "text": { "body": text }
                    }]
                }
            }]
        }]
    })
    .to_string()
}

async fn post_webhook(app: &Router, body: &str, signature: Option<&str>) -> StatusCode {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/whatsapp")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("x-hub-signature-256", signature);
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();
    app.clone().oneshot(request).await.unwrap().status()
}

#[tokio::test]
async fn whatsapp_webhook_requires_a_valid_signature() {
    let (harness, app) = setup(MockGenerator::new()).await;
    let body = webhook_body("wamid.1");

    assert_eq!(post_webhook(&app, &body, None).await, StatusCode::UNAUTHORIZED);
    let forged = lumina_whatsapp::sign("not-the-secret", body.as_bytes()).unwrap();
    assert_eq!(
        post_webhook(&app, &body, Some(&forged)).await,
        StatusCode::UNAUTHORIZED
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    let found = harness
        .db
        .read(|conn| conversations::find_open(conn, "5215550001111", Channel::Whatsapp))
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn signed_webhook_is_routed_once() {
    let (harness, app) = setup(MockGenerator::new()).await;
    let body = webhook_body("wamid.2");
    let signature = lumina_whatsapp::sign(APP_SECRET, body.as_bytes()).unwrap();

    assert_eq!(post_webhook(&app, &body, Some(&signature)).await, StatusCode::OK);
    // Meta retry of the same delivery.
    assert_eq!(post_webhook(&app, &body, Some(&signature)).await, StatusCode::OK);

    let mut messages = Vec::new();
    for _ in 0..100 {
        let found = harness
            .db
            .read(|conn| conversations::find_open(conn, "5215550001111", Channel::Whatsapp))
            .await
            .unwrap();
        if let Some(conv) = found {
            messages = harness.messages(&conv.id).await.unwrap();
            if messages.len() >= 2 {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    let conv = harness
        .db
        .read(|conn| conversations::find_open(conn, "5215550001111", Channel::Whatsapp))
        .await
        .unwrap()
        .unwrap();
    let messages_after = harness.messages(&conv.id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages_after.len(), 2);
    assert_eq!(harness.generator.calls(), 1);

    let sent = harness.transport.sent_messages().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].client_ref, "5215550001111");
}

#[tokio::test]
async fn consecutive_webhooks_keep_arrival_order() {
    let (harness, app) = setup(MockGenerator::new()).await;
    let texts = ["primero", "segundo", "tercero"];
    for (i, text) in texts.iter().enumerate() {
        let body = webhook_text(&format!("wamid.order.{i}"), text);
        let signature = lumina_whatsapp::sign(APP_SECRET, body.as_bytes()).unwrap();
        assert_eq!(post_webhook(&app, &body, Some(&signature)).await, StatusCode::OK);
    }

    let mut messages = Vec::new();
    for _ in 0..200 {
        let found = harness
            .db
            .read(|conn| conversations::find_open(conn, "5215550001111", Channel::Whatsapp))
            .await
            .unwrap();
        if let Some(conv) = found {
            messages = harness.messages(&conv.id).await.unwrap();
            if messages.len() >= 2 * texts.len() {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let client: Vec<&str> = messages
        .iter()
        .filter(|m| m.sender == SenderRole::Client)
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(client, texts);
    assert_eq!(harness.generator.calls(), texts.len());
}
