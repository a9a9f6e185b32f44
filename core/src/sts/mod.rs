//! Security token service pipeline
//!
//! Turns an inbound bearer credential into a downstream access token.

pub mod exchange;
pub mod extract;
pub mod response;

pub use exchange::Gateway;
pub use extract::extract_bearer;
pub use response::{respond, ExchangeResponse, GatewayResponse};
