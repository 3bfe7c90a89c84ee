//! End-to-end tests over the HTTP surface and the drip cycle.

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::{Duration, Utc};
use secrecy::SecretString;
use tower::util::ServiceExt;
use uuid::Uuid;

use dripcourse::account::model::Account;
use dripcourse::billing::client::BillingClient;
use dripcourse::billing::webhook::sign_payload;
use dripcourse::config::TRIAL_LIMIT;
use dripcourse::email::Mailer;
use dripcourse::error::{BillingError, DeliveryError, PlanGenerationError};
use dripcourse::goals::model::{ExperienceStage, GoalCategory};
use dripcourse::plan::generator::PlanGenerator;
use dripcourse::plan::model::PlanEntryDraft;
use dripcourse::scheduler::cycle::DripCycle;
use dripcourse::server::{AppDeps, build_router};
use dripcourse::store::{LibSqlBackend, Store};

// ── Test doubles ────────────────────────────────────────────────────

struct RecordingMailer {
    sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingMailer {
    fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }

    fn last_body(&self) -> String {
        self.sent.lock().unwrap().last().unwrap().2.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), DeliveryError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.into(), subject.into(), html_body.into()));
        Ok(())
    }
}

struct FakeBilling {
    cancelled: Mutex<Vec<String>>,
}

impl FakeBilling {
    fn new() -> Self {
        Self {
            cancelled: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl BillingClient for FakeBilling {
    async fn create_checkout_session(
        &self,
        _email: &str,
        account_id: Uuid,
    ) -> Result<String, BillingError> {
        Ok(format!("https://pay.example/checkout/{account_id}"))
    }

    async fn create_portal_session(&self, _customer_id: &str) -> Result<String, BillingError> {
        Ok("https://pay.example/portal".into())
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), BillingError> {
        self.cancelled.lock().unwrap().push(subscription_id.into());
        Ok(())
    }
}

struct FakeGenerator;

#[async_trait]
impl PlanGenerator for FakeGenerator {
    async fn generate(
        &self,
        _category: GoalCategory,
        goal_text: &str,
        _stage: ExperienceStage,
    ) -> Result<Vec<PlanEntryDraft>, PlanGenerationError> {
        Ok((1..=14)
            .map(|day| PlanEntryDraft {
                day_number: day,
                subject: format!("Day {day}: {goal_text}"),
                preview: format!("Preview {day}"),
                content: format!("Lesson {day} toward {goal_text}."),
            })
            .collect())
    }
}

struct Harness {
    app: Router,
    store: Arc<LibSqlBackend>,
    mailer: Arc<RecordingMailer>,
    billing: Arc<FakeBilling>,
    cycle: Arc<DripCycle>,
    webhook_secret: SecretString,
}

const BASE_URL: &str = "https://course.example";
const CRON_SECRET: &str = "cron-test-secret";

async fn harness() -> Harness {
    let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let mailer = Arc::new(RecordingMailer::new());
    let billing = Arc::new(FakeBilling::new());
    let webhook_secret = SecretString::from("whsec_test");

    let cycle = Arc::new(DripCycle::new(
        store.clone() as Arc<dyn Store>,
        mailer.clone() as Arc<dyn Mailer>,
        billing.clone() as Arc<dyn BillingClient>,
        BASE_URL.into(),
    ));

    let app = build_router(AppDeps {
        store: store.clone(),
        mailer: mailer.clone(),
        billing: billing.clone(),
        generator: Arc::new(FakeGenerator),
        cycle: cycle.clone(),
        base_url: BASE_URL.into(),
        cron_secret: Some(CRON_SECRET.into()),
        webhook_secret: webhook_secret.clone(),
    });

    Harness {
        app,
        store,
        mailer,
        billing,
        cycle,
        webhook_secret,
    }
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn with_session(mut request: Request<Body>, account_id: Uuid) -> Request<Body> {
    request.headers_mut().insert(
        header::COOKIE,
        format!("session={account_id}").parse().unwrap(),
    );
    request
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Sign up, verify the magic link, and onboard with a goal. Returns the
/// signed-in account.
async fn onboarded_account(h: &Harness, email: &str) -> Account {
    let response = h
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/send-link",
            serde_json::json!({ "email": email }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Pull the token out of the delivered email
    let body = h.mailer.last_body();
    let start = body.find("token=").unwrap() + "token=".len();
    let token: String = body[start..]
        .chars()
        .take_while(|c| c.is_ascii_hexdigit())
        .collect();

    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/auth/verify?token={token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(response.headers().contains_key(header::SET_COOKIE));

    let account = h.store.get_account_by_email(email).await.unwrap().unwrap();

    let response = h
        .app
        .clone()
        .oneshot(with_session(
            json_request(
                "POST",
                "/api/goals",
                serde_json::json!({
                    "category": "learning",
                    "goal_text": "Learn woodworking",
                    "stage": "just_started"
                }),
            ),
            account.id,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    h.store.get_account(account.id).await.unwrap().unwrap()
}

// ── Auth ────────────────────────────────────────────────────────────

#[tokio::test]
async fn magic_link_is_single_use() {
    let h = harness().await;
    h.app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/send-link",
            serde_json::json!({ "email": "once@example.com" }),
        ))
        .await
        .unwrap();

    let body = h.mailer.last_body();
    let start = body.find("token=").unwrap() + "token=".len();
    let token: String = body[start..]
        .chars()
        .take_while(|c| c.is_ascii_hexdigit())
        .collect();
    let uri = format!("/api/auth/verify?token={token}");

    let first = h
        .app
        .clone()
        .oneshot(Request::builder().uri(&uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(first.headers().contains_key(header::SET_COOKIE));

    // Replay lands back on the login page without a session
    let second = h
        .app
        .clone()
        .oneshot(Request::builder().uri(&uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(!second.headers().contains_key(header::SET_COOKIE));
    let location = second.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.contains("error=invalid"));
}

#[tokio::test]
async fn bad_email_is_rejected() {
    let h = harness().await;
    let response = h
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/send-link",
            serde_json::json!({ "email": "not-an-email" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn protected_routes_require_session() {
    let h = harness().await;
    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/goals")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ── Trial journey ───────────────────────────────────────────────────

#[tokio::test]
async fn full_trial_runs_seven_emails_then_halts() {
    let h = harness().await;
    let account = onboarded_account(&h, "trial@example.com").await;
    assert!(account.onboarding_complete);
    assert!(account.next_send_at.is_some());

    let mailer_base = h.mailer.sent.lock().unwrap().len();
    let mut clock = account.next_send_at.unwrap();
    for _ in 0..TRIAL_LIMIT {
        let report = h.cycle.run(clock).await.unwrap();
        assert_eq!(report.sent, 1);
        clock += Duration::hours(24);
    }

    let loaded = h.store.get_account(account.id).await.unwrap().unwrap();
    assert_eq!(loaded.emails_sent, TRIAL_LIMIT);
    assert!(loaded.next_send_at.is_none(), "halted at the trial gate");

    // Further cycles send nothing
    let report = h.cycle.run(clock + Duration::days(30)).await.unwrap();
    assert_eq!(report.sent, 0);

    let sent = h.mailer.sent.lock().unwrap();
    let course_emails = &sent[mailer_base..];
    assert_eq!(course_emails.len(), TRIAL_LIMIT as usize);
    // Planned subjects, in order, with the checkout link on the final one
    assert_eq!(course_emails[0].1, "Day 1: Learn woodworking");
    assert!(course_emails[TRIAL_LIMIT as usize - 1]
        .2
        .contains("pay.example/checkout"));
    assert!(!course_emails[0].2.contains("pay.example/checkout"));
}

#[tokio::test]
async fn checkout_webhook_resumes_the_drip() {
    let h = harness().await;
    let account = onboarded_account(&h, "resume@example.com").await;

    let mut clock = account.next_send_at.unwrap();
    for _ in 0..TRIAL_LIMIT {
        h.cycle.run(clock).await.unwrap();
        clock += Duration::hours(24);
    }
    assert!(h
        .store
        .get_account(account.id)
        .await
        .unwrap()
        .unwrap()
        .next_send_at
        .is_none());

    // Provider reports a completed checkout
    let payload = serde_json::json!({
        "type": "checkout.session.completed",
        "data": { "object": {
            "client_reference_id": account.id.to_string(),
            "subscription": "sub_42",
            "customer": "cus_42"
        }}
    })
    .to_string();
    let signature = sign_payload(&h.webhook_secret, Utc::now().timestamp(), payload.as_bytes());

    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/webhooks/billing")
                .header("billing-signature", signature)
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let loaded = h.store.get_account(account.id).await.unwrap().unwrap();
    assert!(loaded.has_subscribed);
    assert_eq!(loaded.subscription_id.as_deref(), Some("sub_42"));
    let resumed_at = loaded.next_send_at.expect("drip resumed");

    // Day 8 goes out past the gate, still from the plan
    let report = h.cycle.run(resumed_at).await.unwrap();
    assert_eq!(report.sent, 1);
    let loaded = h.store.get_account(account.id).await.unwrap().unwrap();
    assert_eq!(loaded.emails_sent, TRIAL_LIMIT + 1);
    assert_eq!(
        h.mailer.sent.lock().unwrap().last().unwrap().1,
        "Day 8: Learn woodworking"
    );
}

#[tokio::test]
async fn webhook_rejects_bad_signatures() {
    let h = harness().await;
    let payload = serde_json::json!({
        "type": "checkout.session.completed",
        "data": { "object": {} }
    })
    .to_string();

    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/webhooks/billing")
                .header("billing-signature", "t=1,v1=deadbeef")
                .body(Body::from(payload.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/webhooks/billing")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn subscription_deleted_halts_and_is_idempotent() {
    let h = harness().await;
    let account = onboarded_account(&h, "deleted@example.com").await;

    let payload = serde_json::json!({
        "type": "customer.subscription.deleted",
        "data": { "object": {
            "metadata": { "account_id": account.id.to_string() }
        }}
    })
    .to_string();

    for _ in 0..2 {
        let signature =
            sign_payload(&h.webhook_secret, Utc::now().timestamp(), payload.as_bytes());
        let response = h
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/webhooks/billing")
                    .header("billing-signature", signature)
                    .body(Body::from(payload.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let loaded = h.store.get_account(account.id).await.unwrap().unwrap();
    assert!(loaded.is_cancelled);
    assert!(loaded.next_send_at.is_none());
    assert_eq!(h.cycle.run(Utc::now() + Duration::days(1)).await.unwrap().sent, 0);
}

#[tokio::test]
async fn webhook_for_unknown_account_is_acknowledged() {
    let h = harness().await;
    let payload = serde_json::json!({
        "type": "checkout.session.completed",
        "data": { "object": { "client_reference_id": Uuid::new_v4().to_string() } }
    })
    .to_string();
    let signature = sign_payload(&h.webhook_secret, Utc::now().timestamp(), payload.as_bytes());

    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/webhooks/billing")
                .header("billing-signature", signature)
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// ── Goals ───────────────────────────────────────────────────────────

#[tokio::test]
async fn terminal_goal_rejects_edits_and_keeps_history() {
    let h = harness().await;
    let account = onboarded_account(&h, "goal@example.com").await;

    // Send one email so the plan has history
    h.cycle.run(account.next_send_at.unwrap()).await.unwrap();

    let goals = h.store.list_goals(account.id).await.unwrap();
    let goal_id = goals[0].id;

    let response = h
        .app
        .clone()
        .oneshot(with_session(
            json_request(
                "POST",
                &format!("/api/goals/{goal_id}/complete"),
                serde_json::json!({}),
            ),
            account.id,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["completed_at"].is_string());

    // Edits and re-closing now conflict
    for (method, uri) in [
        ("PATCH", format!("/api/goals/{goal_id}")),
        ("POST", format!("/api/goals/{goal_id}/cancel")),
        ("POST", format!("/api/goals/{goal_id}/complete")),
    ] {
        let response = h
            .app
            .clone()
            .oneshot(with_session(
                json_request(method, &uri, serde_json::json!({ "goal_text": "New" })),
                account.id,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT, "{method} {uri}");
    }

    // Send history on the frozen plan is intact
    let plan = h.store.list_plan_entries(goal_id).await.unwrap();
    assert!(plan[0].sent_at.is_some());
}

#[tokio::test]
async fn foreign_goals_read_as_not_found() {
    let h = harness().await;
    let alice = onboarded_account(&h, "alice@example.com").await;
    let bob = onboarded_account(&h, "bob@example.com").await;

    let alice_goal = h.store.list_goals(alice.id).await.unwrap()[0].id;
    let response = h
        .app
        .clone()
        .oneshot(with_session(
            Request::builder()
                .uri(format!("/api/goals/{alice_goal}"))
                .body(Body::empty())
                .unwrap(),
            bob.id,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn goal_update_changes_fields() {
    let h = harness().await;
    let account = onboarded_account(&h, "edit@example.com").await;
    let goal_id = h.store.list_goals(account.id).await.unwrap()[0].id;

    let response = h
        .app
        .clone()
        .oneshot(with_session(
            json_request(
                "PATCH",
                &format!("/api/goals/{goal_id}"),
                serde_json::json!({ "goal_text": "Master joinery", "stage": "intermediate" }),
            ),
            account.id,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["goal_text"], "Master joinery");
    assert_eq!(body["stage"], "intermediate");
    assert_eq!(body["category"], "learning");
}

// ── Cron trigger ────────────────────────────────────────────────────

#[tokio::test]
async fn cron_endpoint_requires_the_shared_secret() {
    let h = harness().await;

    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/cron/send-emails")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/cron/send-emails")
                .header(header::AUTHORIZATION, format!("Bearer {CRON_SECRET}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["sent"], 0);
}

// ── Account deletion ────────────────────────────────────────────────

#[tokio::test]
async fn account_deletion_cancels_subscription_and_removes_data() {
    let h = harness().await;
    let account = onboarded_account(&h, "bye@example.com").await;

    // Mark subscribed so deletion has something to cancel
    use dripcourse::account::model::{AccountPatch, FieldUpdate};
    let patch = AccountPatch {
        has_subscribed: FieldUpdate::Set(true),
        subscription_id: FieldUpdate::Set(Some("sub_del".into())),
        ..Default::default()
    };
    h.store.apply_account_patch(account.id, &patch).await.unwrap();

    let response = h
        .app
        .clone()
        .oneshot(with_session(
            Request::builder()
                .method("DELETE")
                .uri("/api/account")
                .body(Body::empty())
                .unwrap(),
            account.id,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(response.headers().contains_key(header::SET_COOKIE));

    assert_eq!(
        h.billing.cancelled.lock().unwrap().as_slice(),
        ["sub_del".to_string()]
    );
    assert!(h.store.get_account(account.id).await.unwrap().is_none());
    assert!(h.store.list_goals(account.id).await.unwrap().is_empty());
}
