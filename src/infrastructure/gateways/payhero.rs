use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    config::config_model::PayHero,
    domain::{
        repositories::payment_gateway::{GatewayError, PaymentGateway},
        value_objects::{
            enums::{gateway_providers::GatewayProvider, payment_statuses::PaymentStatus},
            gateway_events::{
                GatewayEvent, PayHeroCallback, PolledStatus, ProviderEvent, PushReceipt,
                PushRequest,
            },
        },
    },
    infrastructure::gateways::{
        decode_error, ensure_success, read_body, signature::WebhookVerifier, status_error,
        transport_error,
    },
};

const PROVIDER: GatewayProvider = GatewayProvider::PayHero;

/// PayHero aggregator, basic-auth against its v2 payments api.
pub struct PayHeroGateway {
    http: reqwest::Client,
    config: PayHero,
    verifier: WebhookVerifier,
}

#[derive(Serialize)]
struct PaymentBody<'a> {
    amount: i64,
    phone_number: &'a str,
    channel_id: i64,
    provider: &'static str,
    external_reference: &'a str,
    callback_url: &'a str,
}

#[derive(Deserialize)]
struct PaymentResponse {
    #[serde(default)]
    success: bool,
    status: Option<String>,
    reference: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: Option<String>,
}

#[derive(Deserialize)]
struct TransactionStatusResponse {
    status: Option<String>,
    provider_reference: Option<String>,
    result_code: Option<String>,
    result_desc: Option<String>,
}

impl PayHeroGateway {
    pub fn new(http: reqwest::Client, config: PayHero, verifier: WebhookVerifier) -> Self {
        Self {
            http,
            config,
            verifier,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

fn polled_from_transaction(parsed: TransactionStatusResponse) -> PolledStatus {
    let status = match parsed.status.as_deref().map(str::to_ascii_uppercase).as_deref() {
        Some("SUCCESS") => PaymentStatus::Success,
        Some("FAILED") | Some("CANCELLED") => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    };

    if status == PaymentStatus::Pending {
        return PolledStatus::pending(parsed.result_desc.or(parsed.status));
    }

    PolledStatus {
        status,
        result_code: parsed.result_code.or(parsed.provider_reference),
        result_desc: parsed.result_desc.or(parsed.status),
    }
}

#[async_trait]
impl PaymentGateway for PayHeroGateway {
    fn provider(&self) -> GatewayProvider {
        PROVIDER
    }

    async fn initiate_push(&self, request: PushRequest) -> Result<PushReceipt, GatewayError> {
        let context = "payments";
        let resp = self
            .http
            .post(self.url("/api/v2/payments"))
            .basic_auth(&self.config.username, Some(&self.config.password))
            .json(&PaymentBody {
                amount: request.amount,
                phone_number: &request.phone_number,
                channel_id: self.config.channel_id,
                provider: "m-pesa",
                external_reference: &request.account_reference,
                callback_url: &self.config.callback_url,
            })
            .send()
            .await
            .map_err(|err| transport_error(PROVIDER, context, err))?;
        let resp = ensure_success(PROVIDER, resp, context).await?;
        let parsed: PaymentResponse = resp
            .json()
            .await
            .map_err(|err| decode_error(PROVIDER, context, err))?;

        if !parsed.success {
            return Err(GatewayError::InvalidRequest {
                provider: PROVIDER,
                context: context.to_string(),
                message: format!(
                    "payment rejected with status {}",
                    parsed.status.unwrap_or_default()
                ),
            });
        }

        let correlation_id = parsed
            .checkout_request_id
            .or(parsed.reference)
            .ok_or_else(|| decode_error(PROVIDER, context, "response carried no reference"))?;

        info!(
            %correlation_id,
            account_reference = %request.account_reference,
            "payhero: stk push accepted"
        );
        Ok(PushReceipt {
            correlation_id,
            provider_status: parsed.status.unwrap_or_else(|| "QUEUED".to_string()),
            response_description: None,
        })
    }

    async fn poll_status(&self, correlation_id: &str) -> Result<PolledStatus, GatewayError> {
        let context = "transaction status";
        let resp = self
            .http
            .get(self.url("/api/v2/transaction-status"))
            .query(&[("reference", correlation_id)])
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .await
            .map_err(|err| transport_error(PROVIDER, context, err))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(PolledStatus::pending(Some("transaction not found yet".to_string())));
        }
        if !status.is_success() {
            let body = read_body(resp).await;
            return Err(status_error(PROVIDER, status, &body, context));
        }

        let parsed: TransactionStatusResponse = resp
            .json()
            .await
            .map_err(|err| decode_error(PROVIDER, context, err))?;
        Ok(polled_from_transaction(parsed))
    }

    fn verify_signature(&self, payload: &[u8], signature: &str) -> bool {
        self.verifier.verify(payload, signature)
    }

    fn parse_callback(&self, payload: &[u8]) -> Result<GatewayEvent, GatewayError> {
        let context = "payment callback";
        let invalid = |err: serde_json::Error| GatewayError::InvalidRequest {
            provider: PROVIDER,
            context: context.to_string(),
            message: err.to_string(),
        };

        let raw: serde_json::Value = serde_json::from_slice(payload).map_err(invalid)?;
        let callback: PayHeroCallback = serde_json::from_value(raw.clone()).map_err(invalid)?;

        Ok(ProviderEvent::PayHero(callback).normalize(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> PayHeroGateway {
        PayHeroGateway::new(
            reqwest::Client::new(),
            PayHero {
                base_url: "http://127.0.0.1:9".to_string(),
                username: "user".to_string(),
                password: "pass".to_string(),
                channel_id: 911,
                callback_url: "https://billing.example.com/api/v1/webhooks/payhero".to_string(),
            },
            WebhookVerifier::new(None),
        )
    }

    fn transaction(status: &str) -> TransactionStatusResponse {
        TransactionStatusResponse {
            status: Some(status.to_string()),
            provider_reference: Some("SGR7QKXYZ".to_string()),
            result_code: None,
            result_desc: None,
        }
    }

    #[test]
    fn transaction_status_maps_to_payment_status() {
        assert_eq!(
            polled_from_transaction(transaction("SUCCESS")).status,
            PaymentStatus::Success
        );
        assert_eq!(
            polled_from_transaction(transaction("failed")).status,
            PaymentStatus::Failed
        );
        assert_eq!(
            polled_from_transaction(transaction("QUEUED")).status,
            PaymentStatus::Pending
        );
    }

    #[test]
    fn queued_transaction_carries_no_result_code() {
        let polled = polled_from_transaction(transaction("QUEUED"));

        assert_eq!(polled.result_code, None);
        assert_eq!(polled.result_desc.as_deref(), Some("QUEUED"));
    }

    #[test]
    fn callback_is_parsed_into_gateway_event() {
        let body = br#"{"status":true,"response":{"Amount":1999,"CheckoutRequestID":"ws_CO_77","ExternalReference":"PLAN-ABC","MerchantRequestID":"m1","MpesaReceiptNumber":"SGR7QKXYZ","Phone":"254712345678","ResultCode":0,"ResultDesc":"ok","Status":"Success"}}"#;

        let event = gateway().parse_callback(body).unwrap();

        assert_eq!(event.transaction_id, "ws_CO_77");
        assert_eq!(event.status, PaymentStatus::Success);
    }

    #[test]
    fn malformed_callback_is_rejected() {
        let result = gateway().parse_callback(b"not json");

        assert!(matches!(result, Err(GatewayError::InvalidRequest { .. })));
    }
}
