use anyhow::{Context, Result};

use crate::{
    config::{
        config_model::{Billing, Daraja, Database, DotEnvyConfig, Gateway, PayHero, Server},
        stage::Stage,
    },
    domain::value_objects::{
        commissions::{CommissionRate, DEFAULT_COMMISSION_RATE_BPS, MAX_COMMISSION_RATE_BPS},
        enums::gateway_providers::GatewayProvider,
    },
};

const DARAJA_SANDBOX_URL: &str = "https://sandbox.safaricom.co.ke";
const PAYHERO_BASE_URL: &str = "https://backend.payhero.co.ke";

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let server = Server {
        port: std::env::var("SERVER_PORT")
            .expect("SERVER_PORT is invalid")
            .parse()?,
        body_limit: std::env::var("SERVER_BODY_LIMIT")
            .expect("SERVER_BODY_LIMIT is invalid")
            .parse()?,
        timeout: std::env::var("SERVER_TIMEOUT")
            .expect("SERVER_TIMEOUT is invalid")
            .parse()?,
    };

    let database = Database {
        url: std::env::var("DATABASE_URL").expect("DATABASE_URL is invalid"),
        max_connections: optional_parsed("DATABASE_MAX_CONNECTIONS", 10)?,
    };

    let provider_name = std::env::var("GATEWAY_PROVIDER").unwrap_or_else(|_| "daraja".to_string());
    let provider = GatewayProvider::from_str(&provider_name)
        .with_context(|| format!("GATEWAY_PROVIDER {} is invalid", provider_name))?;

    let daraja = match std::env::var("DARAJA_CONSUMER_KEY") {
        Ok(consumer_key) => Some(Daraja {
            base_url: std::env::var("DARAJA_BASE_URL")
                .unwrap_or_else(|_| DARAJA_SANDBOX_URL.to_string()),
            consumer_key,
            consumer_secret: std::env::var("DARAJA_CONSUMER_SECRET")
                .expect("DARAJA_CONSUMER_SECRET is invalid"),
            shortcode: std::env::var("DARAJA_SHORTCODE").expect("DARAJA_SHORTCODE is invalid"),
            passkey: std::env::var("DARAJA_PASSKEY").expect("DARAJA_PASSKEY is invalid"),
            callback_url: std::env::var("DARAJA_CALLBACK_URL")
                .expect("DARAJA_CALLBACK_URL is invalid"),
        }),
        Err(_) => None,
    };

    let payhero = match std::env::var("PAYHERO_USERNAME") {
        Ok(username) => Some(PayHero {
            base_url: std::env::var("PAYHERO_BASE_URL")
                .unwrap_or_else(|_| PAYHERO_BASE_URL.to_string()),
            username,
            password: std::env::var("PAYHERO_PASSWORD").expect("PAYHERO_PASSWORD is invalid"),
            channel_id: std::env::var("PAYHERO_CHANNEL_ID")
                .expect("PAYHERO_CHANNEL_ID is invalid")
                .parse()?,
            callback_url: std::env::var("PAYHERO_CALLBACK_URL")
                .expect("PAYHERO_CALLBACK_URL is invalid"),
        }),
        Err(_) => None,
    };

    let gateway = Gateway {
        provider,
        timeout_secs: optional_parsed("GATEWAY_TIMEOUT_SECS", 30)?,
        webhook_secret: std::env::var("GATEWAY_WEBHOOK_SECRET")
            .ok()
            .filter(|secret| !secret.is_empty()),
        daraja,
        payhero,
    };

    let commission_rate_bps =
        optional_parsed("COMMISSION_RATE_BPS", DEFAULT_COMMISSION_RATE_BPS)?;
    if CommissionRate::checked(commission_rate_bps).is_none() {
        anyhow::bail!(
            "COMMISSION_RATE_BPS {} is above {}",
            commission_rate_bps,
            MAX_COMMISSION_RATE_BPS
        );
    }

    let billing = Billing {
        currency: std::env::var("BILLING_CURRENCY").unwrap_or_else(|_| "KES".to_string()),
        monthly_price: std::env::var("PLAN_PRICE_MONTHLY")
            .expect("PLAN_PRICE_MONTHLY is invalid")
            .parse()?,
        lifetime_price: std::env::var("PLAN_PRICE_LIFETIME")
            .expect("PLAN_PRICE_LIFETIME is invalid")
            .parse()?,
        commission_rate_bps,
        expiry_grace_hours: optional_parsed("SUBSCRIPTION_EXPIRY_GRACE_HOURS", 24)?,
        worker_interval_secs: optional_parsed("BILLING_WORKER_INTERVAL_SECS", 60)?,
        max_event_attempts: optional_parsed("BILLING_EVENT_MAX_ATTEMPTS", 5)?,
    };

    Ok(DotEnvyConfig {
        server,
        database,
        gateway,
        billing,
    })
}

pub fn get_stage() -> Stage {
    dotenvy::dotenv().ok();

    let stage_str = std::env::var("STAGE").unwrap_or("".to_string());
    Stage::try_from(&stage_str).unwrap_or_default()
}

fn optional_parsed<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{} is invalid", key)),
        Err(_) => Ok(default),
    }
}
