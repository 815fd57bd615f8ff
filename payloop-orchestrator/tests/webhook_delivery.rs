//! Webhook delivery scenarios driven through the orchestrator

mod support;

use std::time::Duration;

use payloop_common::WebhookDeliveryInput;
use payloop_orchestrator::{
    OrchestrationError, WebhookOptions,
    memory::{Scripted, ScriptedProcessor, ScriptedTransport, WebhookEventStatus},
    ports::TransportResponse,
};
use serde_json::json;
use tokio::time::Instant;

use support::{PROCESSOR, config, harness_with};

fn event(event_id: &str, secret: Option<&str>) -> WebhookDeliveryInput {
    WebhookDeliveryInput {
        webhook_event_id: event_id.to_string(),
        merchant_id: "mer_test".to_string(),
        webhook_url: "https://merchant.example/webhooks/payloop".to_string(),
        webhook_secret: secret.map(ToString::to_string),
        payload: json!({
            "type": "payment.captured",
            "data": { "orderId": "ord_1", "amount": 12_500 },
        }),
    }
}

fn respond(status_code: u16, success: bool) -> Scripted<TransportResponse> {
    Scripted::Respond(TransportResponse {
        status_code,
        success,
    })
}

#[tokio::test(start_paused = true)]
async fn test_delivery_exhausts_attempt_ceiling() {
    let transport = ScriptedTransport::new().then_repeat(&respond(500, false), 5);
    let h = harness_with(ScriptedProcessor::new(PROCESSOR), transport, &config());

    let started = Instant::now();
    let result = h
        .orchestrator
        .start_webhook_delivery(event("evt_fail", None))
        .unwrap()
        .result()
        .await;

    assert!(!result.success);
    assert_eq!(result.attempts, 5);
    assert_eq!(result.delivered_at, None);
    assert_eq!(result.status_code, Some(500));
    assert_eq!(
        result.error_message.as_deref(),
        Some("Webhook endpoint responded with status 500")
    );

    // 10 + 20 + 40 + 80 seconds of backoff
    let waited = started.elapsed();
    assert!(
        waited >= Duration::from_secs(150) && waited < Duration::from_secs(151),
        "waited {waited:?}"
    );

    let record = h.events.record("evt_fail").unwrap();
    assert_eq!(record.status, WebhookEventStatus::Failed);
    assert_eq!(record.attempts.len(), 5);
    assert_eq!(record.attempts.last().unwrap().next_retry_at, None);
    assert_eq!(h.transport.requests().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_delivery_succeeds_on_third_attempt() {
    let transport = ScriptedTransport::new()
        .then(Scripted::Fail("connection refused".to_string()))
        .then(respond(502, false))
        .then(respond(204, true));
    let h = harness_with(ScriptedProcessor::new(PROCESSOR), transport, &config());

    let result = h
        .orchestrator
        .start_webhook_delivery(event("evt_ok", Some("whsec_test")))
        .unwrap()
        .result()
        .await;

    assert!(result.success);
    assert_eq!(result.attempts, 3);
    assert_eq!(result.status_code, Some(204));
    assert!(result.delivered_at.is_some());
    assert_eq!(result.error_message, None);

    let record = h.events.record("evt_ok").unwrap();
    assert_eq!(record.status, WebhookEventStatus::Delivered);
    assert_eq!(record.delivered_at, result.delivered_at);
    assert_eq!(
        record.attempts.iter().map(|a| a.attempt).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(
        record.attempts[0].error.as_deref(),
        Some("connection refused")
    );
    assert_eq!(record.attempts[1].status_code, Some(502));

    for request in h.transport.requests() {
        assert_eq!(request.url, "https://merchant.example/webhooks/payloop");
        assert_eq!(
            request.signature,
            Some(format!("t=0,v1=whsec_test:{}", request.body.len()))
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_success_flag_is_required() {
    // A 200 the transport did not recognise as success still counts as a failure
    let transport = ScriptedTransport::new()
        .then(respond(200, false))
        .then(respond(200, true));
    let h = harness_with(ScriptedProcessor::new(PROCESSOR), transport, &config());

    let result = h
        .orchestrator
        .start_webhook_delivery(event("evt_flag", None))
        .unwrap()
        .result()
        .await;

    assert!(result.success);
    assert_eq!(result.attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn test_custom_ceiling_from_config() {
    let mut config = config();
    config.webhook = WebhookOptions {
        maximum_attempts: 2,
        initial_interval_ms: 1_000,
        ..WebhookOptions::default()
    };

    let transport = ScriptedTransport::new().then_repeat(&respond(503, false), 3);
    let h = harness_with(ScriptedProcessor::new(PROCESSOR), transport, &config);

    let result = h
        .orchestrator
        .start_webhook_delivery(event("evt_short", None))
        .unwrap()
        .result()
        .await;

    assert!(!result.success);
    assert_eq!(result.attempts, 2);
    assert_eq!(h.transport.requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_delivery_is_rejected_while_running() {
    let transport = ScriptedTransport::new().then(respond(503, false));
    let h = harness_with(ScriptedProcessor::new(PROCESSOR), transport, &config());

    let handle = h
        .orchestrator
        .start_webhook_delivery(event("evt_dup", None))
        .unwrap();
    assert_eq!(handle.instance_id(), "webhook-evt_dup");
    assert!(h.orchestrator.is_running("webhook-evt_dup"));

    let error = h
        .orchestrator
        .start_webhook_delivery(event("evt_dup", None))
        .unwrap_err();
    assert!(matches!(error, OrchestrationError::WorkflowAlreadyStarted(ref id) if id == "webhook-evt_dup"));

    let result = handle.result().await;
    assert!(result.success);
    assert!(!h.orchestrator.is_running("webhook-evt_dup"));
}
