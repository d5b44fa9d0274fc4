#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use harmony_backend::{
    config::{
        Config, NotificationConfig, ReceiptConfig, SchedulerConfig, StorageBackend, StripeConfig,
    },
    dto::stripe_dto::CreatedCheckoutSession,
    error::{Error, Result},
    middleware::auth::Claims,
    models::{content_item::ContentItem, payment_record::PaymentRecord},
    routes,
    services::{
        checkout_service::{CheckoutGateway, SessionRequest},
        notification_service::{ContentNotifier, PaymentNotifier},
        publication_service::PublicationService,
    },
    store::MemoryStore,
    utils::{signature::signature_header, time::Recurrence},
    AppState, Backends,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test_secret_key";
pub const WEBHOOK_SECRET: &str = "whsec_test";

pub fn test_config() -> Config {
    Config {
        server_address: "127.0.0.1:0".into(),
        storage_backend: StorageBackend::Memory,
        database_url: None,
        jwt_secret: JWT_SECRET.into(),
        public_rps: 1000,
        admin_rps: 1000,
        frontend_url: None,
        stripe: StripeConfig {
            secret_key: "sk_test".into(),
            webhook_secret: WEBHOOK_SECRET.into(),
            api_base: "http://localhost:12111".into(),
            currency: "usd".into(),
            signature_tolerance_secs: 300,
        },
        receipts: ReceiptConfig {
            prefix: "H4A".into(),
            start_sequence: 44210,
        },
        scheduler: SchedulerConfig {
            enabled: false,
            recurrence: Recurrence::parse("sun,mon,wed,fri", "11:58", "America/New_York")
                .expect("recurrence"),
            notify_on_publish: true,
        },
        notifications: NotificationConfig {
            sender_name: "Harmony 4 All".into(),
            site_url: "http://localhost:3000".into(),
            ..NotificationConfig::default()
        },
    }
}

#[derive(Default)]
pub struct RecordingContentNotifier {
    pub subscriber_calls: Mutex<Vec<Uuid>>,
    pub webhook_calls: Mutex<Vec<Uuid>>,
    pub fail_webhook: bool,
}

impl RecordingContentNotifier {
    pub fn failing_webhook() -> Self {
        Self {
            fail_webhook: true,
            ..Self::default()
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriber_calls.lock().unwrap().len()
    }

    pub fn webhook_count(&self) -> usize {
        self.webhook_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ContentNotifier for RecordingContentNotifier {
    async fn notify_all_subscribers(&self, item: &ContentItem) -> anyhow::Result<()> {
        self.subscriber_calls.lock().unwrap().push(item.id);
        Ok(())
    }

    async fn notify_external_webhook(&self, item: &ContentItem) -> anyhow::Result<()> {
        self.webhook_calls.lock().unwrap().push(item.id);
        if self.fail_webhook {
            anyhow::bail!("relay returned 500");
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPaymentNotifier {
    pub donor_emails: Mutex<Vec<Uuid>>,
    pub admin_emails: Mutex<Vec<Uuid>>,
    pub sms: Mutex<Vec<Uuid>>,
}

impl RecordingPaymentNotifier {
    pub fn donor_email_count(&self) -> usize {
        self.donor_emails.lock().unwrap().len()
    }

    pub fn admin_email_count(&self) -> usize {
        self.admin_emails.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentNotifier for RecordingPaymentNotifier {
    async fn send_donor_confirmation(&self, record: &PaymentRecord) -> anyhow::Result<()> {
        self.donor_emails.lock().unwrap().push(record.id);
        Ok(())
    }

    async fn send_admin_notification(&self, record: &PaymentRecord) -> anyhow::Result<()> {
        self.admin_emails.lock().unwrap().push(record.id);
        Ok(())
    }

    async fn send_donor_sms(&self, record: &PaymentRecord) -> anyhow::Result<()> {
        self.sms.lock().unwrap().push(record.id);
        Ok(())
    }
}

/// Hands out `cs_test_<n>` sessions with a matching `pi_test_<n>` intent, or
/// `sub_test_<n>` for recurring donations.
#[derive(Default)]
pub struct FakeGateway {
    pub counter: AtomicUsize,
    pub fail: bool,
}

#[async_trait]
impl CheckoutGateway for FakeGateway {
    async fn create_session(&self, request: &SessionRequest) -> Result<CreatedCheckoutSession> {
        if self.fail {
            return Err(Error::Gateway("provider unavailable".into()));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let recurring = request.donation_type.is_recurring();
        Ok(CreatedCheckoutSession {
            id: format!("cs_test_{}", n),
            url: Some(format!("https://checkout.test/cs_test_{}", n)),
            payment_intent: (!recurring).then(|| format!("pi_test_{}", n)),
            subscription: recurring.then(|| format!("sub_test_{}", n)),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub content_notifier: Arc<RecordingContentNotifier>,
    pub payment_notifier: Arc<RecordingPaymentNotifier>,
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(test_config(), FakeGateway::default())
}

pub fn spawn_app_with(config: Config, gateway: FakeGateway) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let content_notifier = Arc::new(RecordingContentNotifier::default());
    let payment_notifier = Arc::new(RecordingPaymentNotifier::default());
    let state = AppState::new(
        Arc::new(config),
        Backends {
            content: store.clone(),
            payments: store.clone(),
            content_notifier: content_notifier.clone(),
            payment_notifier: payment_notifier.clone(),
            gateway: Arc::new(gateway),
        },
    );
    TestApp {
        router: routes::router(state.clone()),
        state,
        store,
        content_notifier,
        payment_notifier,
    }
}

pub fn publication_service(
    store: Arc<MemoryStore>,
    notifier: Arc<RecordingContentNotifier>,
    notify_on_publish: bool,
) -> PublicationService {
    PublicationService::new(
        store,
        notifier,
        chrono_tz::America::New_York,
        notify_on_publish,
    )
}

pub fn token_for(role: &str) -> String {
    let claims = Claims {
        sub: format!("{}@harmony.test", role),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        role: Some(role.to_string()),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("token")
}

pub fn signed_webhook(payload: &Value) -> Request<Body> {
    let body = payload.to_string();
    let header = signature_header(
        body.as_bytes(),
        WEBHOOK_SECRET,
        chrono::Utc::now().timestamp(),
    )
    .expect("signature");
    Request::builder()
        .method("POST")
        .uri("/api/donations/webhook")
        .header("content-type", "application/json")
        .header("stripe-signature", header)
        .body(Body::from(body))
        .unwrap()
}

pub fn json_request(method: &str, uri: &str, body: &Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}
