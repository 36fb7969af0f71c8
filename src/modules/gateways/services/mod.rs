pub mod gateway_trait;
pub mod http_gateway;

pub use gateway_trait::{
    ChargeRequest, ChargeResponse, GatewayEvent, GatewayEventType, PaymentGateway, RefundRequest,
    RefundResponse,
};
pub use http_gateway::{HttpGateway, SIGNATURE_HEADER};
