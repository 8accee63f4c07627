pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod observability;
pub mod services;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tracing::{info, warn};

use crate::{
    application::services::{BillingServices, BillingSettings},
    config::{config_loader, stage::Stage},
    domain::value_objects::{commissions::CommissionRate, payments::PlanPricing},
    infrastructure::{
        axum_http::http_serve,
        gateways,
        postgres::{postgres_connection, repositories},
    },
    services::billing_worker::BillingWorker,
};

pub async fn run() -> Result<()> {
    let dotenvy_env = Arc::new(config_loader::load()?);
    info!("ENV has been loaded");

    let stage = config_loader::get_stage();
    if dotenvy_env.gateway.webhook_secret.is_none() {
        if stage == Stage::Production {
            anyhow::bail!("GATEWAY_WEBHOOK_SECRET is required when STAGE is Production");
        }
        warn!(%stage, "GATEWAY_WEBHOOK_SECRET is not set, webhook signatures are not checked");
    }

    let postgres_pool = postgres_connection::establish_connection(
        &dotenvy_env.database.url,
        dotenvy_env.database.max_connections,
    )?;
    info!("Postgres connection has been established");

    let stores = repositories::billing_stores(Arc::new(postgres_pool));
    let gateways = Arc::new(gateways::build_gateways(&dotenvy_env.gateway)?);
    info!(primary = %gateways.primary().provider(), "Payment gateways have been configured");

    let billing = &dotenvy_env.billing;
    let settings = BillingSettings {
        pricing: PlanPricing {
            monthly: billing.monthly_price,
            lifetime: billing.lifetime_price,
        },
        currency: billing.currency.clone(),
        commission_rate: CommissionRate::from_basis_points(billing.commission_rate_bps),
        max_event_attempts: billing.max_event_attempts,
        expiry_grace: chrono::Duration::hours(billing.expiry_grace_hours),
    };
    let services = BillingServices::new(stores, gateways, settings);

    let worker = BillingWorker::new(
        Arc::clone(&services.billing_events),
        Arc::clone(&services.lifecycle),
        services.settings.expiry_grace,
        Duration::from_secs(billing.worker_interval_secs),
    );
    let worker_loop = tokio::spawn(worker.run());

    tokio::select! {
        result = http_serve::start(Arc::clone(&dotenvy_env), services) => result?,
        result = worker_loop => result??,
    };

    Ok(())
}
