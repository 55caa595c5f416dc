use strum::{Display, EnumIter, EnumString};

use crate::errors::ServiceError;

/// Order lifecycle states. `Delivered` and `Cancelled` are terminal.
///
/// This is a validated-enum machine, not a strict-adjacency one: operators
/// may jump between non-terminal states freely, but the value itself must
/// always be one of these variants and nothing leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Parses a status value, rejecting anything outside the enumerated set.
    pub fn parse(value: &str) -> Result<Self, ServiceError> {
        value
            .parse()
            .map_err(|_| ServiceError::InvalidStatus(format!("unknown order status: {value}")))
    }

    /// Whether an explicit update from `self` to `to` is accepted.
    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        if self.is_terminal() {
            return self == to;
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

/// Outcome of mapping a raw gateway status string onto our state pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayStatusMapping {
    /// Recognized status: apply the payment status and, when present, the
    /// order status.
    Apply {
        payment_status: PaymentStatus,
        order_status: Option<OrderStatus>,
    },
    /// Unrecognized status: change nothing, but keep the raw string in the
    /// audit trail for later inspection.
    AuditOnly,
}

/// Maps the gateway's status vocabulary onto (payment_status, status).
/// "paid" is the gateway's alias for a completed payment.
pub fn map_gateway_status(raw: &str) -> GatewayStatusMapping {
    match raw.to_ascii_lowercase().as_str() {
        "completed" | "success" | "paid" => GatewayStatusMapping::Apply {
            payment_status: PaymentStatus::Completed,
            order_status: Some(OrderStatus::Confirmed),
        },
        "failed" | "cancelled" | "canceled" => GatewayStatusMapping::Apply {
            payment_status: PaymentStatus::Failed,
            order_status: Some(OrderStatus::Cancelled),
        },
        "pending" => GatewayStatusMapping::Apply {
            payment_status: PaymentStatus::Pending,
            order_status: None,
        },
        _ => GatewayStatusMapping::AuditOnly,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_statuses() {
        assert_eq!(OrderStatus::parse("pending").unwrap(), OrderStatus::Pending);
        assert_eq!(
            OrderStatus::parse("delivered").unwrap(),
            OrderStatus::Delivered
        );
        assert!(OrderStatus::parse("on_hold").is_err());
        assert!(OrderStatus::parse("").is_err());
    }

    #[test]
    fn non_terminal_states_allow_arbitrary_jumps() {
        assert!(OrderStatus::Confirmed.can_transition_to(OrderStatus::Delivered));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn terminal_states_are_final() {
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Confirmed));
        // A no-op repeat of the terminal value is tolerated.
        assert!(OrderStatus::Delivered.can_transition_to(OrderStatus::Delivered));
    }

    #[test]
    fn gateway_mapping_covers_aliases() {
        for raw in ["completed", "success", "paid", "PAID"] {
            assert_eq!(
                map_gateway_status(raw),
                GatewayStatusMapping::Apply {
                    payment_status: PaymentStatus::Completed,
                    order_status: Some(OrderStatus::Confirmed),
                }
            );
        }
        for raw in ["failed", "cancelled", "canceled"] {
            assert_eq!(
                map_gateway_status(raw),
                GatewayStatusMapping::Apply {
                    payment_status: PaymentStatus::Failed,
                    order_status: Some(OrderStatus::Cancelled),
                }
            );
        }
        assert_eq!(
            map_gateway_status("pending"),
            GatewayStatusMapping::Apply {
                payment_status: PaymentStatus::Pending,
                order_status: None,
            }
        );
        assert_eq!(
            map_gateway_status("requires_action"),
            GatewayStatusMapping::AuditOnly
        );
    }
}
