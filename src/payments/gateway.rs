use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::errors::ServiceError;

/// One line forwarded to the gateway's hosted checkout page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionItem {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Request to open a hosted payment session.
#[derive(Debug, Clone, Serialize)]
pub struct OpenSessionRequest {
    pub reference: String,
    pub customer_email: String,
    pub amount: Decimal,
    pub currency: String,
    pub items: Vec<SessionItem>,
}

/// The gateway's answer: where to send the customer, and its own session id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySession {
    pub session_id: String,
    pub redirect_url: String,
}

/// Everything the gateway can do wrong collapses into one error carrying the
/// upstream message; the caller decides whether a retry is worth it.
#[derive(Debug, thiserror::Error)]
#[error("payment gateway error: {message}")]
pub struct GatewayError {
    pub message: String,
}

impl GatewayError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        ServiceError::PaymentFailed(err.message)
    }
}

/// Seam between checkout initiation and the external gateway. Opening a
/// session is a pure side-effecting call with no local state change; it is
/// never responsible for rolling back the staging step.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn open_session(
        &self,
        request: OpenSessionRequest,
    ) -> Result<GatewaySession, GatewayError>;
}

/// HTTP implementation over the gateway's REST API.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpPaymentGateway {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, request), fields(reference = %request.reference))]
    async fn open_session(
        &self,
        request: OpenSessionRequest,
    ) -> Result<GatewaySession, GatewayError> {
        let url = format!("{}/v1/checkout/sessions", self.base_url);
        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            error!(error = %e, "gateway unreachable");
            GatewayError::new(format!("gateway unreachable: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, "gateway rejected session");
            return Err(GatewayError::new(format!(
                "gateway returned {status}: {body}"
            )));
        }

        let session: GatewaySession = response
            .json()
            .await
            .map_err(|e| GatewayError::new(format!("malformed gateway response: {e}")))?;

        info!(session_id = %session.session_id, "payment session opened");
        Ok(session)
    }
}
