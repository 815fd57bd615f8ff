//! Shared fixtures for orchestrator integration tests
#![allow(dead_code)] // Not every test file uses every helper

use std::{collections::HashMap, sync::Arc, time::Duration};

use payloop_common::{PaymentConfig, PaymentInput, PaymentResult, PaymentStatus};
use payloop_orchestrator::{
    ActivityOptions, Collaborators, OrchestrationError, Orchestrator, OrchestratorConfig,
    PaymentOptions, PaymentPhase, ProcessorRegistry, RetryPolicy, WebhookOptions,
    memory::{
        MemoryOrderStore, MemoryWebhookEventStore, Scripted, ScriptedProcessor,
        ScriptedTransport, StaticConfigProvider,
    },
    ports::WebhookSigner,
};

pub const MERCHANT: &str = "mer_test";
pub const PROCESSOR: &str = "stripe";

/// Deterministic stand-in for an HMAC signer.
pub struct TestSigner;

impl WebhookSigner for TestSigner {
    fn sign(&self, secret: &str, body: &[u8]) -> anyhow::Result<String> {
        Ok(format!("t=0,v1={secret}:{}", body.len()))
    }
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub processor: ScriptedProcessor,
    pub orders: MemoryOrderStore,
    pub transport: ScriptedTransport,
    pub events: MemoryWebhookEventStore,
}

pub fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        activities: ActivityOptions {
            start_to_close_timeout_secs: 30,
            retry: RetryPolicy {
                maximum_attempts: 3,
                ..RetryPolicy::default()
            },
        },
        payment: PaymentOptions::default(),
        webhook: WebhookOptions::default(),
    }
}

pub fn harness(processor: ScriptedProcessor) -> Harness {
    harness_with(processor, ScriptedTransport::new(), &config())
}

pub fn harness_with(
    processor: ScriptedProcessor,
    transport: ScriptedTransport,
    config: &OrchestratorConfig,
) -> Harness {
    let mut registry = ProcessorRegistry::new();
    registry
        .register_processor(processor.clone())
        .expect("fresh registry accepts the processor");

    let orders = MemoryOrderStore::new();
    let events = MemoryWebhookEventStore::new();

    let orchestrator = Orchestrator::new(
        config,
        Arc::new(registry),
        Collaborators {
            configs: Arc::new(StaticConfigProvider::new([PaymentConfig {
                merchant_id: MERCHANT.to_string(),
                processor: PROCESSOR.to_string(),
                test_mode: true,
                credentials: HashMap::from([(
                    "secret_key".to_string(),
                    "sk_test_123".to_string(),
                )]),
            }])),
            orders: Arc::new(orders.clone()),
            webhook_transport: Arc::new(transport.clone()),
            webhook_signer: Arc::new(TestSigner),
            webhook_events: Arc::new(events.clone()),
        },
    );

    Harness {
        orchestrator,
        processor,
        orders,
        transport,
        events,
    }
}

pub fn payment_input(order_id: &str) -> PaymentInput {
    PaymentInput::new(order_id, MERCHANT, 12_500, "INR", PROCESSOR)
}

pub fn requires_action(processor_order_id: &str) -> Scripted<PaymentResult> {
    Scripted::Respond(PaymentResult {
        processor_order_id: Some(processor_order_id.to_string()),
        redirect_url: Some(format!("https://bank.example/3ds/{processor_order_id}")),
        ..PaymentResult::with_status(PaymentStatus::RequiresAction)
    })
}

/// Let the runtime make progress until `instance_id` reaches `phase`.
pub async fn wait_for_phase(
    orchestrator: &Orchestrator,
    instance_id: &str,
    phase: PaymentPhase,
) -> Result<(), OrchestrationError> {
    for _ in 0..1000 {
        if orchestrator.phase(instance_id)? == phase {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    panic!("{instance_id} never reached {phase}");
}
