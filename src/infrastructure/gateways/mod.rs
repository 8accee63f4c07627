pub mod daraja;
pub mod payhero;
pub mod signature;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tracing::error;

use crate::{
    config::config_model::Gateway,
    domain::{
        repositories::payment_gateway::{GatewayError, PaymentGateway, PaymentGateways},
        value_objects::enums::gateway_providers::GatewayProvider,
    },
};

use self::{daraja::DarajaGateway, payhero::PayHeroGateway, signature::WebhookVerifier};

pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("failed to build gateway http client")
}

/// Builds every configured gateway; the configured provider becomes primary.
pub fn build_gateways(config: &Gateway) -> Result<PaymentGateways> {
    let http = build_http_client(Duration::from_secs(config.timeout_secs))?;
    let verifier = WebhookVerifier::new(config.webhook_secret.clone());

    let mut configured: Vec<Arc<dyn PaymentGateway>> = Vec::new();
    if let Some(daraja) = &config.daraja {
        configured.push(Arc::new(DarajaGateway::new(
            http.clone(),
            daraja.clone(),
            verifier.clone(),
        )));
    }
    if let Some(payhero) = &config.payhero {
        configured.push(Arc::new(PayHeroGateway::new(
            http.clone(),
            payhero.clone(),
            verifier.clone(),
        )));
    }

    let primary_index = configured
        .iter()
        .position(|gateway| gateway.provider() == config.provider)
        .with_context(|| {
            format!(
                "GATEWAY_PROVIDER is {} but that gateway has no credentials configured",
                config.provider
            )
        })?;

    let primary = configured.remove(primary_index);
    Ok(configured
        .into_iter()
        .fold(PaymentGateways::new(primary), |gateways, gateway| {
            gateways.with_gateway(gateway)
        }))
}

pub(crate) fn transport_error(
    provider: GatewayProvider,
    context: &str,
    err: reqwest::Error,
) -> GatewayError {
    error!(
        %provider,
        context = %context,
        timeout = err.is_timeout(),
        error = %err,
        "gateway request failed before a response"
    );
    GatewayError::Unavailable {
        provider,
        context: context.to_string(),
        message: err.to_string(),
    }
}

pub(crate) fn decode_error(
    provider: GatewayProvider,
    context: &str,
    err: impl std::fmt::Display,
) -> GatewayError {
    error!(%provider, context = %context, error = %err, "gateway response could not be decoded");
    GatewayError::InvalidResponse {
        provider,
        context: context.to_string(),
        message: err.to_string(),
    }
}

/// Reads the body of a non-2xx response, logs it and maps 5xx to
/// `Unavailable` and everything else to `InvalidRequest`.
pub(crate) async fn ensure_success(
    provider: GatewayProvider,
    resp: reqwest::Response,
    context: &str,
) -> Result<reqwest::Response, GatewayError> {
    if resp.status().is_success() {
        return Ok(resp);
    }

    let status = resp.status();
    let body = read_body(resp).await;
    Err(status_error(provider, status, &body, context))
}

pub(crate) async fn read_body(resp: reqwest::Response) -> String {
    match resp.text().await {
        Ok(text) if !text.is_empty() => text,
        Ok(_) => "<empty response body>".to_string(),
        Err(err) => format!("<failed to read response body: {err}>"),
    }
}

pub(crate) fn status_error(
    provider: GatewayProvider,
    status: reqwest::StatusCode,
    body: &str,
    context: &str,
) -> GatewayError {
    error!(
        %provider,
        status = %status,
        response_body = %body,
        context = %context,
        "gateway api request failed"
    );

    let message = format!("status {}: {}", status, body);
    if status.is_server_error() {
        GatewayError::Unavailable {
            provider,
            context: context.to_string(),
            message,
        }
    } else {
        GatewayError::InvalidRequest {
            provider,
            context: context.to_string(),
            message,
        }
    }
}
