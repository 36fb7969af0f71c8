//! Payment gateway client and webhook payload types

pub mod services;

pub use services::{
    ChargeRequest, ChargeResponse, GatewayEvent, GatewayEventType, HttpGateway, PaymentGateway,
    RefundRequest, RefundResponse, SIGNATURE_HEADER,
};
