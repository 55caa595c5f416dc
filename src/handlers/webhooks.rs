//! Payment gateway webhook reconciler.
//!
//! The gateway retries every non-2xx response, so the handlers here follow a
//! strict discipline: malformed payloads and undecodable references fail with
//! a client error and no side effects; a reference that decodes but points at
//! an already-consumed (or reaped) staged record resolves to HTTP 200 with an
//! explanatory message, because an error response would only trigger a retry
//! storm for work that is already done.

use axum::{body::Bytes, extract::State, http::HeaderMap, response::IntoResponse, Json};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    events::Event,
    payments::decode_order_reference,
    AppState,
};

type HmacSha256 = Hmac<Sha256>;

/// A gateway callback, classified by payload shape before any strict
/// deserialization. Unknown shapes stay distinct instead of being guessed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayNotification {
    StatusUpdate(StatusPayload),
    StagedSuccess(StagedPayload),
    StagedFailure(StagedPayload),
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, ToSchema)]
pub struct StatusPayload {
    pub status: String,
    pub order_id: Option<String>,
    pub payment_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, ToSchema)]
pub struct StagedPayload {
    pub order_id: Option<String>,
    pub payment_id: Option<String>,
    pub reason: Option<String>,
}

impl GatewayNotification {
    /// Classifies a raw payload by shape: an `event` discriminator wins,
    /// otherwise a bare `status` field marks the direct-flow status form.
    pub fn classify(value: &Value) -> GatewayNotification {
        let Some(obj) = value.as_object() else {
            return GatewayNotification::Unrecognized;
        };

        if let Some(event) = obj.get("event").and_then(Value::as_str) {
            return match event {
                "payment.succeeded" => Self::parse_staged(value, GatewayNotification::StagedSuccess),
                "payment.failed" => Self::parse_staged(value, GatewayNotification::StagedFailure),
                _ => GatewayNotification::Unrecognized,
            };
        }

        if obj.get("status").map_or(false, Value::is_string) {
            return serde_json::from_value::<StatusPayload>(value.clone())
                .map(GatewayNotification::StatusUpdate)
                .unwrap_or(GatewayNotification::Unrecognized);
        }

        GatewayNotification::Unrecognized
    }

    fn parse_staged(
        value: &Value,
        wrap: fn(StagedPayload) -> GatewayNotification,
    ) -> GatewayNotification {
        serde_json::from_value::<StagedPayload>(value.clone())
            .map(wrap)
            .unwrap_or(GatewayNotification::Unrecognized)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// POST /webhooks/payment — classified ingress for all gateway callbacks.
#[utoipa::path(
    post,
    path = "/webhooks/payment",
    request_body = String,
    responses(
        (status = 200, description = "Webhook reconciled", body = WebhookResponse),
        (status = 400, description = "Malformed payload or reference", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    tag = "Webhooks"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let value = authenticate_and_parse(&state, &headers, &body)?;

    match GatewayNotification::classify(&value) {
        GatewayNotification::StatusUpdate(payload) => handle_status_update(&state, payload).await,
        GatewayNotification::StagedSuccess(payload) => handle_staged_success(&state, payload).await,
        GatewayNotification::StagedFailure(payload) => handle_staged_failure(&state, payload).await,
        GatewayNotification::Unrecognized => Err(ServiceError::BadRequest(
            "unrecognized webhook payload".to_string(),
        )),
    }
}

/// POST /webhooks/payment/success — outcome-specific alias used by gateways
/// that encode the result in the callback URL rather than the body.
#[utoipa::path(
    post,
    path = "/webhooks/payment/success",
    request_body = StagedPayload,
    responses((status = 200, description = "Staged checkout promoted", body = WebhookResponse)),
    tag = "Webhooks"
)]
pub async fn payment_success_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let value = authenticate_and_parse(&state, &headers, &body)?;
    let payload = serde_json::from_value::<StagedPayload>(value)
        .map_err(|e| ServiceError::BadRequest(format!("invalid payload: {e}")))?;
    handle_staged_success(&state, payload).await
}

/// POST /webhooks/payment/failure
#[utoipa::path(
    post,
    path = "/webhooks/payment/failure",
    request_body = StagedPayload,
    responses((status = 200, description = "Staged checkout abandoned", body = WebhookResponse)),
    tag = "Webhooks"
)]
pub async fn payment_failure_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let value = authenticate_and_parse(&state, &headers, &body)?;
    let payload = serde_json::from_value::<StagedPayload>(value)
        .map_err(|e| ServiceError::BadRequest(format!("invalid payload: {e}")))?;
    handle_staged_failure(&state, payload).await
}

fn authenticate_and_parse(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Value, ServiceError> {
    match &state.config.payment_webhook_secret {
        Some(secret) => {
            if !verify_signature(
                headers,
                body,
                secret,
                state.config.payment_webhook_tolerance_secs,
            ) {
                warn!("webhook signature verification failed");
                return Err(ServiceError::Unauthorized(
                    "invalid webhook signature".to_string(),
                ));
            }
        }
        None => {
            warn!("webhook signature verification skipped; no secret configured");
        }
    }

    serde_json::from_slice(body).map_err(|e| ServiceError::BadRequest(format!("invalid json: {e}")))
}

/// Direct-flow status webhook: the reference names an already-real order.
async fn handle_status_update(
    state: &AppState,
    payload: StatusPayload,
) -> Result<Json<WebhookResponse>, ServiceError> {
    let opaque = payload
        .order_id
        .ok_or_else(|| ServiceError::BadRequest("order_id is required".to_string()))?;
    let decoded = decode_order_reference(&opaque)
        .ok_or_else(|| ServiceError::BadRequest("undecodable order reference".to_string()))?;
    let order_id = Uuid::parse_str(&decoded)
        .map_err(|_| ServiceError::BadRequest("order reference is not an order id".to_string()))?;

    let updated = state
        .services
        .orders
        .apply_gateway_status(order_id, &payload.status, payload.payment_id)
        .await?;

    Ok(Json(WebhookResponse {
        success: true,
        order_id: Some(opaque),
        order_number: Some(updated.order_number),
        status: Some(updated.status),
        message: None,
    }))
}

/// Staged-flow success webhook: promote the snapshot into a real order, then
/// dispose of it. A missing staged record means a duplicate or late delivery
/// and resolves to success with no further writes.
async fn handle_staged_success(
    state: &AppState,
    payload: StagedPayload,
) -> Result<Json<WebhookResponse>, ServiceError> {
    let reference = decode_staged_reference(payload.order_id)?;

    let Some(staged) = state.services.staged_orders.get_staged(&reference).await? else {
        info!(reference = %reference, "success webhook for missing staged order");
        return Ok(Json(already_processed(reference)));
    };

    // The delete is the claim: a concurrent or retried delivery finds the
    // record gone and resolves to already-processed, so at most one order
    // can ever be minted for a reference. The snapshot in hand carries
    // everything promotion needs.
    if !state.services.staged_orders.delete_staged(&reference).await? {
        info!(reference = %reference, "staged order claimed by a concurrent delivery");
        return Ok(Json(already_processed(reference)));
    }

    let order = state.services.orders.create_order_from_staged(&staged).await?;

    if let Err(e) = state
        .event_sender
        .send(Event::StagedOrderPromoted {
            reference: reference.clone(),
            order_id: order.id,
        })
        .await
    {
        warn!(error = %e, "failed to send promotion event");
    }

    Ok(Json(WebhookResponse {
        success: true,
        order_id: Some(order.id.to_string()),
        order_number: Some(order.order_number),
        status: Some(order.status),
        message: None,
    }))
}

/// Staged-flow failure webhook: delete the snapshot, never create an order.
/// Only a still-present staged record is acted on, so a failure racing a
/// success can never un-create the promoted order.
async fn handle_staged_failure(
    state: &AppState,
    payload: StagedPayload,
) -> Result<Json<WebhookResponse>, ServiceError> {
    let reference = decode_staged_reference(payload.order_id)?;

    let deleted = state.services.staged_orders.delete_staged(&reference).await?;
    if deleted {
        info!(reference = %reference, reason = ?payload.reason, "staged checkout abandoned");
        if let Err(e) = state
            .event_sender
            .send(Event::StagedOrderAbandoned {
                reference: reference.clone(),
            })
            .await
        {
            warn!(error = %e, "failed to send abandonment event");
        }
    } else {
        info!(reference = %reference, "failure webhook for missing staged order");
    }

    Ok(Json(WebhookResponse {
        success: true,
        order_id: None,
        order_number: None,
        status: None,
        message: Some(if deleted {
            "staged checkout abandoned".to_string()
        } else {
            "already processed or expired".to_string()
        }),
    }))
}

fn decode_staged_reference(order_id: Option<String>) -> Result<String, ServiceError> {
    let opaque =
        order_id.ok_or_else(|| ServiceError::BadRequest("order_id is required".to_string()))?;
    decode_order_reference(&opaque)
        .ok_or_else(|| ServiceError::BadRequest("undecodable order reference".to_string()))
}

fn already_processed(reference: String) -> WebhookResponse {
    WebhookResponse {
        success: true,
        order_id: None,
        order_number: None,
        status: None,
        message: Some(format!(
            "staged order {reference} already processed or expired"
        )),
    }
}

/// Generic HMAC scheme: `x-signature` is hex HMAC-SHA256 of
/// `"{x-timestamp}.{body}"`, with the timestamp bounded by the configured
/// tolerance. Comparison is constant-time.
fn verify_signature(headers: &HeaderMap, payload: &Bytes, secret: &str, tolerance_secs: u64) -> bool {
    let (Some(ts), Some(sig)) = (headers.get("x-timestamp"), headers.get("x-signature")) else {
        return false;
    };
    let (Ok(ts), Ok(sig)) = (ts.to_str(), sig.to_str()) else {
        return false;
    };
    if let Ok(ts_i) = ts.parse::<i64>() {
        let now = chrono::Utc::now().timestamp();
        if (now - ts_i).unsigned_abs() > tolerance_secs {
            return false;
        }
    } else {
        return false;
    }

    let signed = format!("{}.{}", ts, std::str::from_utf8(payload).unwrap_or(""));
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(signed.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&expected, sig)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_status_form() {
        let value = json!({"status": "completed", "order_id": "ORDER-x-1", "payment_id": "p1"});
        match GatewayNotification::classify(&value) {
            GatewayNotification::StatusUpdate(p) => {
                assert_eq!(p.status, "completed");
                assert_eq!(p.order_id.as_deref(), Some("ORDER-x-1"));
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn classifies_outcome_events() {
        let success = json!({"event": "payment.succeeded", "order_id": "ORDER-x-1"});
        assert!(matches!(
            GatewayNotification::classify(&success),
            GatewayNotification::StagedSuccess(_)
        ));

        let failure = json!({"event": "payment.failed", "order_id": "ORDER-x-1", "reason": "card declined"});
        assert!(matches!(
            GatewayNotification::classify(&failure),
            GatewayNotification::StagedFailure(_)
        ));
    }

    #[test]
    fn unknown_shapes_stay_unrecognized() {
        for value in [
            json!([1, 2, 3]),
            json!({"event": "invoice.created"}),
            json!({"hello": "world"}),
            json!("status"),
        ] {
            assert_eq!(
                GatewayNotification::classify(&value),
                GatewayNotification::Unrecognized
            );
        }
    }

    #[test]
    fn signature_round_trip() {
        use hmac::Mac;
        let secret = "shhh";
        let body = Bytes::from_static(b"{\"status\":\"completed\"}");
        let ts = chrono::Utc::now().timestamp().to_string();

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.{}", ts, std::str::from_utf8(&body).unwrap()).as_bytes());
        let sig = hex::encode(mac.finalize().into_bytes());

        let mut headers = HeaderMap::new();
        headers.insert("x-timestamp", ts.parse().unwrap());
        headers.insert("x-signature", sig.parse().unwrap());
        assert!(verify_signature(&headers, &body, secret, 300));
        assert!(!verify_signature(&headers, &body, "wrong", 300));

        headers.insert("x-timestamp", "0".parse().unwrap());
        assert!(!verify_signature(&headers, &body, secret, 300));
    }
}
