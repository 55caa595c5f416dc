#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use orderflow_api::{
    config::AppConfig,
    db::ensure_schema,
    events,
    handlers::router,
    payments::{GatewayError, GatewaySession, OpenSessionRequest, PaymentGateway},
    AppState,
};
use sea_orm::{ConnectOptions, Database};
use serde_json::Value;
use sha2::Sha256;
use tower::ServiceExt;

/// Recording gateway double. Flip `fail` to make `open_session` error out.
#[derive(Default)]
pub struct StubGateway {
    pub fail: AtomicBool,
    pub calls: Mutex<Vec<OpenSessionRequest>>,
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn open_session(
        &self,
        request: OpenSessionRequest,
    ) -> Result<GatewaySession, GatewayError> {
        self.calls.lock().unwrap().push(request.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::new("stub gateway configured to fail"));
        }
        Ok(GatewaySession {
            session_id: format!("sess_{}", request.reference),
            redirect_url: format!("https://pay.example/{}", request.reference),
        })
    }
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub gateway: Arc<StubGateway>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::build(None).await
    }

    pub async fn spawn_with_secret(secret: &str) -> Self {
        Self::build(Some(secret.to_string())).await
    }

    async fn build(webhook_secret: Option<String>) -> Self {
        // One pooled connection, or each checkout would see its own empty
        // in-memory database.
        let mut opts = ConnectOptions::new("sqlite::memory:");
        opts.max_connections(1).sqlx_logging(false);
        let db = Arc::new(Database::connect(opts).await.expect("sqlite connect"));
        ensure_schema(&db).await.expect("schema");

        let mut config = AppConfig::for_database("sqlite::memory:");
        config.payment_webhook_secret = webhook_secret;
        let config = Arc::new(config);

        let (event_sender, event_rx) = events::channel(64);
        tokio::spawn(events::process_events(event_rx));

        let gateway = Arc::new(StubGateway::default());
        let state = AppState::new(
            db,
            config,
            Arc::new(event_sender),
            gateway.clone(),
        );
        let router = router(state.clone());

        Self {
            state,
            router,
            gateway,
        }
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        read_json(response).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request("GET", uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request("POST", uri, Some(body)).await
    }

    pub async fn put(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request("PUT", uri, Some(body)).await
    }

    /// Posts a webhook body with a valid HMAC signature over it.
    pub async fn post_signed(&self, uri: &str, secret: &str, body: Value) -> (StatusCode, Value) {
        let payload = body.to_string();
        let ts = chrono::Utc::now().timestamp().to_string();
        let mut mac =
            Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac key");
        mac.update(format!("{ts}.{payload}").as_bytes());
        let sig = hex::encode(mac.finalize().into_bytes());

        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-timestamp", ts)
            .header("x-signature", sig)
            .body(Body::from(payload))
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        read_json(response).await
    }
}

/// Reads a money field that may arrive as a JSON string or number.
pub fn dec(value: &Value) -> rust_decimal::Decimal {
    use std::str::FromStr;
    match value {
        Value::String(s) => rust_decimal::Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => {
            rust_decimal::Decimal::from_str(&n.to_string()).expect("decimal number")
        }
        other => panic!("not a decimal value: {other:?}"),
    }
}

async fn read_json(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}
