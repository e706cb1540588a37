//! End-to-end tests for the WhatsApp webhook.
//!
//! Each test spins up the full Axum router on a random port backed by an
//! in-memory database and drives it over HTTP with reqwest.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::timeout;

use bettermeals_agent::agent::{ConversationAgent, CookAssistant};
use bettermeals_agent::config::ReplyConfig;
use bettermeals_agent::error::LlmError;
use bettermeals_agent::llm::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
};
use bettermeals_agent::store::{Database, LibSqlBackend, UserRecord, collections, form_types};
use bettermeals_agent::tools::{BackendClient, default_registry};
use bettermeals_agent::webhook::{Dispatcher, app_router};
use bettermeals_agent::workflow::StoreFormChecker;
use bettermeals_agent::workflow::onboarding::OnboardingService;
use bettermeals_agent::workflow::weekly_plan::WeeklyPlanService;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Stub LLM: routes "plan" messages to recommendations, everything else to
/// chat, and echoes a fixed phrasing for worker calls.
struct StubLlm;

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }
    fn cost_per_token(&self) -> (Decimal, Decimal) {
        (Decimal::ZERO, Decimal::ZERO)
    }
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let system = request
            .messages
            .first()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let last = request
            .messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let content = if system.contains("supervisor") {
            if last.contains("plan") {
                r#"{"intent": "recommend", "args": {}}"#.to_string()
            } else {
                r#"{"intent": "chat", "args": {}}"#.to_string()
            }
        } else if system.contains("recommendation agent") {
            "Your week is planned. Reply to approve.".to_string()
        } else {
            "stub reply".to_string()
        };
        Ok(CompletionResponse {
            content,
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: FinishReason::Stop,
        })
    }
}

/// Start the full app on a random port, return (base url, db).
async fn start_server() -> (String, Arc<dyn Database>) {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let llm: Arc<dyn LlmProvider> = Arc::new(StubLlm);
    let backend = Arc::new(BackendClient::stub());
    let forms = Arc::new(StoreFormChecker::new(Arc::clone(&db)));

    let onboarding = Arc::new(OnboardingService::new(
        Arc::clone(&db),
        forms.clone(),
        ReplyConfig::default(),
    ));
    let weekly_plan = Arc::new(WeeklyPlanService::new(
        Arc::clone(&db),
        forms,
        Arc::clone(&backend),
        ReplyConfig::default(),
    ));
    let cook = Arc::new(CookAssistant::new(Arc::clone(&db), Arc::clone(&llm)));
    let agent = Arc::new(
        ConversationAgent::new(
            Arc::clone(&db),
            Arc::clone(&llm),
            llm,
            Arc::new(default_registry(backend)),
        )
        .await,
    );
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&db),
        cook,
        onboarding,
        weekly_plan,
        agent,
    ));
    let app = app_router(dispatcher);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://127.0.0.1:{port}"), db)
}

async fn send(base: &str, phone: &str, text: &str) -> Value {
    let resp = reqwest::Client::new()
        .post(format!("{base}/webhooks/whatsapp"))
        .json(&serde_json::json!({"phone_number": phone, "text": text}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    resp.json().await.unwrap()
}

async fn reply(base: &str, phone: &str, text: &str) -> String {
    send(base, phone, text).await["reply"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn health_endpoint() {
    timeout(TEST_TIMEOUT, async {
        let (base, _) = start_server().await;
        let resp = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(resp.status(), 200);
        let json: Value = resp.json().await.unwrap();
        assert_eq!(json["status"], "ok");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn malformed_body_gets_apology() {
    timeout(TEST_TIMEOUT, async {
        let (base, _) = start_server().await;
        let resp = reqwest::Client::new()
            .post(format!("{base}/webhooks/whatsapp"))
            .header("content-type", "application/json")
            .body("this is not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let json: Value = resp.json().await.unwrap();
        assert!(json["reply"].as_str().unwrap().starts_with("Sorry"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn full_journey_from_greeting_to_agent() {
    timeout(TEST_TIMEOUT, async {
        let (base, db) = start_server().await;
        let phone = "+919999000001";

        // Onboarding: greeting, name, form link.
        assert_eq!(
            reply(&base, phone, "hi").await,
            "Hey! I'm Zuko from Bettermeals. May I know your name?"
        );
        let form = reply(&base, phone, "Shiwani").await;
        assert!(form.contains("Shiwani"));

        // The form is not submitted yet: no household exists.
        let gated = reply(&base, phone, "done").await;
        assert!(!gated.contains("₹149"));

        // Submitting the form creates the user and household.
        db.upsert_household("hh-e2e", &serde_json::json!({"name": "Shiwani's home"}))
            .await
            .unwrap();
        db.upsert_user(&UserRecord {
            id: "u-e2e".into(),
            whatsapp_number: phone.into(),
            household_id: Some("hh-e2e".into()),
            data: serde_json::json!({}),
        })
        .await
        .unwrap();

        assert!(reply(&base, phone, "done").await.contains("₹149"));
        reply(&base, phone, "yes").await;
        let payment = reply(&base, phone, "yes").await;
        assert!(payment.contains("9639293454@ybl"));

        let status: Value = reqwest::get(format!("{base}/api/onboarding/{phone}/status"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["completed"], true);

        let household = db.get_household("hh-e2e").await.unwrap().unwrap();
        assert_eq!(household.data["onboarding"]["status"], "completed");
        assert_eq!(household.data["onboarding"]["user_data"]["name"], "Shiwani");

        // Weekly plan: dashboard link, then approval once the review form is in.
        let welcome = reply(&base, phone, "hello").await;
        assert!(welcome.contains("https://bettermeals.in/app/dashboard/hh-e2e"));
        assert!(
            reply(&base, phone, "approved")
                .await
                .starts_with("Please review your weekly meal plan first")
        );
        db.record_form_submission(phone, form_types::WEEKLY_PLAN_REVIEW, Utc::now())
            .await
            .unwrap();
        assert_eq!(
            reply(&base, phone, "approved").await,
            "Great! Thanks for confirming your preferences for the week."
        );
        let approvals = db
            .list_workflow_status(collections::WEEKLY_PLAN_STATUS, phone)
            .await
            .unwrap();
        assert_eq!(approvals.len(), 1);

        // Locked week: the general agent takes over.
        let json = send(&base, phone, "plan dinners for next week").await;
        assert_eq!(json["reply"], "Your week is planned. Reply to approve.");
        assert_eq!(json["pending_action"], "approve_plan");

        let json = send(&base, phone, "thanks!").await;
        assert_eq!(json["reply"], "stub reply");
        assert!(json.get("pending_action").is_none());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn cooks_bypass_household_flows() {
    timeout(TEST_TIMEOUT, async {
        let (base, db) = start_server().await;
        db.add_cook("+918888000001", "Ramesh").await.unwrap();

        assert_eq!(reply(&base, "+918888000001", "out of paneer").await, "stub reply");
        assert_eq!(
            reply(&base, "+918888000001", "  ").await,
            "I need your message to help you. What would you like to know?"
        );

        let log = db
            .list_workflow_messages(collections::COOK_MESSAGES, "+918888000001", None)
            .await
            .unwrap();
        assert_eq!(log.len(), 2);
        assert!(
            db.list_workflow_messages(collections::ONBOARDING_MESSAGES, "+918888000001", None)
                .await
                .unwrap()
                .is_empty()
        );
    })
    .await
    .expect("test timed out");
}
