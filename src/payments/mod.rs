pub mod gateway;
pub mod reference;

pub use gateway::{
    GatewayError, GatewaySession, HttpPaymentGateway, OpenSessionRequest, PaymentGateway,
    SessionItem,
};
pub use reference::{decode_order_reference, encode_order_reference};
