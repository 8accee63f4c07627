pub mod axum_http;
pub mod gateways;
pub mod in_memory;
pub mod postgres;
