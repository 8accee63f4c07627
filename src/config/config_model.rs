use crate::domain::value_objects::enums::gateway_providers::GatewayProvider;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub server: Server,
    pub database: Database,
    pub gateway: Gateway,
    pub billing: Billing,
}

#[derive(Debug, Clone)]
pub struct Server {
    pub port: u16,
    pub body_limit: u64,
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct Gateway {
    pub provider: GatewayProvider,
    pub timeout_secs: u64,
    pub webhook_secret: Option<String>,
    pub daraja: Option<Daraja>,
    pub payhero: Option<PayHero>,
}

#[derive(Debug, Clone)]
pub struct Daraja {
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub shortcode: String,
    pub passkey: String,
    pub callback_url: String,
}

#[derive(Debug, Clone)]
pub struct PayHero {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub channel_id: i64,
    pub callback_url: String,
}

#[derive(Debug, Clone)]
pub struct Billing {
    pub currency: String,
    pub monthly_price: i64,
    pub lifetime_price: i64,
    pub commission_rate_bps: u32,
    pub expiry_grace_hours: i64,
    pub worker_interval_secs: u64,
    pub max_event_attempts: i32,
}
