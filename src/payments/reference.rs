//! Opaque order reference codec.
//!
//! The reference round-trips our internal identifier through the payment
//! gateway: `"ORDER-{id}-{unix_millis}"`. The gateway is free to reformat,
//! truncate or echo it back differently than sent, so decoding is tolerant
//! and never panics: anything malformed is simply `None`.

use chrono::Utc;

const PREFIX: &str = "ORDER-";

/// Encodes an internal identifier for the trip through the gateway.
pub fn encode_order_reference(internal_id: &str) -> String {
    format!("{}{}-{}", PREFIX, internal_id, Utc::now().timestamp_millis())
}

/// Decodes a gateway-echoed reference back into the internal identifier.
///
/// Validates the literal prefix, then splits the trailing millis segment off
/// the end; the identifier itself may contain hyphens (UUIDs, staged
/// references), so the split is from the right.
pub fn decode_order_reference(encoded: &str) -> Option<String> {
    let rest = encoded.strip_prefix(PREFIX)?;
    let (id, millis) = rest.rsplit_once('-')?;
    if id.is_empty() || millis.is_empty() || !millis.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(id.to_string())
}
