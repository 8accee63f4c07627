use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    config::config_model::Daraja,
    domain::{
        repositories::payment_gateway::{GatewayError, PaymentGateway},
        value_objects::{
            enums::{gateway_providers::GatewayProvider, payment_statuses::PaymentStatus},
            gateway_events::{
                DarajaCallback, GatewayEvent, PolledStatus, ProviderEvent, PushReceipt,
                PushRequest,
            },
        },
    },
    infrastructure::gateways::{
        decode_error, ensure_success, read_body, signature::WebhookVerifier, status_error,
        transport_error,
    },
};

const PROVIDER: GatewayProvider = GatewayProvider::Daraja;
// Returned by stkpushquery while the subscriber has not answered the prompt yet.
const STILL_PROCESSING_ERROR_CODE: &str = "500.001.1001";
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
// Daraja timestamps are East Africa Time.
const EAT_OFFSET_SECS: i64 = 3 * 3600;

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Safaricom Daraja STK push (Lipa na M-Pesa Online).
pub struct DarajaGateway {
    http: reqwest::Client,
    config: Daraja,
    verifier: WebhookVerifier,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushBody<'a> {
    business_short_code: &'a str,
    password: String,
    timestamp: String,
    transaction_type: &'static str,
    amount: i64,
    party_a: &'a str,
    party_b: &'a str,
    phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    callback_url: &'a str,
    account_reference: &'a str,
    transaction_desc: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushResponse {
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
    response_code: String,
    response_description: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkQueryBody<'a> {
    business_short_code: &'a str,
    password: String,
    timestamp: String,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StkQueryResponse {
    result_code: Option<String>,
    result_desc: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DarajaErrorBody {
    error_code: Option<String>,
    error_message: Option<String>,
}

impl DarajaGateway {
    pub fn new(http: reqwest::Client, config: Daraja, verifier: WebhookVerifier) -> Self {
        Self {
            http,
            config,
            verifier,
            token: Mutex::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// `YYYYMMDDHHmmss` in EAT and the matching base64(shortcode + passkey + timestamp).
    fn password(&self) -> (String, String) {
        let timestamp = (Utc::now() + chrono::Duration::seconds(EAT_OFFSET_SECS))
            .format("%Y%m%d%H%M%S")
            .to_string();
        let password =
            encode_password(&self.config.shortcode, &self.config.passkey, &timestamp);
        (password, timestamp)
    }

    async fn access_token(&self) -> Result<String, GatewayError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN {
                return Ok(token.access_token.clone());
            }
        }

        let context = "oauth token";
        let resp = self
            .http
            .get(self.url("/oauth/v1/generate"))
            .query(&[("grant_type", "client_credentials")])
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .send()
            .await
            .map_err(|err| transport_error(PROVIDER, context, err))?;
        let resp = ensure_success(PROVIDER, resp, context).await?;
        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|err| decode_error(PROVIDER, context, err))?;

        let expires_in = token
            .expires_in
            .as_deref()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(3599);
        debug!(expires_in, "daraja: access token refreshed");

        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(expires_in),
        });
        Ok(token.access_token)
    }
}

fn encode_password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{}{}{}", shortcode, passkey, timestamp))
}

#[async_trait]
impl PaymentGateway for DarajaGateway {
    fn provider(&self) -> GatewayProvider {
        PROVIDER
    }

    async fn initiate_push(&self, request: PushRequest) -> Result<PushReceipt, GatewayError> {
        let context = "stk push";
        let token = self.access_token().await?;
        let (password, timestamp) = self.password();

        let body = StkPushBody {
            business_short_code: &self.config.shortcode,
            password,
            timestamp,
            transaction_type: "CustomerPayBillOnline",
            amount: request.amount,
            party_a: &request.phone_number,
            party_b: &self.config.shortcode,
            phone_number: &request.phone_number,
            callback_url: &self.config.callback_url,
            account_reference: &request.account_reference,
            transaction_desc: &request.transaction_desc,
        };

        let resp = self
            .http
            .post(self.url("/mpesa/stkpush/v1/processrequest"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|err| transport_error(PROVIDER, context, err))?;
        let resp = ensure_success(PROVIDER, resp, context).await?;
        let parsed: StkPushResponse = resp
            .json()
            .await
            .map_err(|err| decode_error(PROVIDER, context, err))?;

        if parsed.response_code != "0" {
            return Err(GatewayError::InvalidRequest {
                provider: PROVIDER,
                context: context.to_string(),
                message: format!(
                    "response code {}: {}",
                    parsed.response_code,
                    parsed.response_description.unwrap_or_default()
                ),
            });
        }

        info!(
            checkout_request_id = %parsed.checkout_request_id,
            account_reference = %request.account_reference,
            "daraja: stk push accepted"
        );
        Ok(PushReceipt {
            correlation_id: parsed.checkout_request_id,
            provider_status: parsed.response_code,
            response_description: parsed.response_description,
        })
    }

    async fn poll_status(&self, correlation_id: &str) -> Result<PolledStatus, GatewayError> {
        let context = "stk push query";
        let token = self.access_token().await?;
        let (password, timestamp) = self.password();

        let resp = self
            .http
            .post(self.url("/mpesa/stkpushquery/v1/query"))
            .bearer_auth(token)
            .json(&StkQueryBody {
                business_short_code: &self.config.shortcode,
                password,
                timestamp,
                checkout_request_id: correlation_id,
            })
            .send()
            .await
            .map_err(|err| transport_error(PROVIDER, context, err))?;

        let status = resp.status();
        let body = read_body(resp).await;

        if !status.is_success() {
            let error = serde_json::from_str::<DarajaErrorBody>(&body).ok();
            let still_processing = error
                .as_ref()
                .and_then(|error| error.error_code.as_deref())
                == Some(STILL_PROCESSING_ERROR_CODE);
            if still_processing || status == reqwest::StatusCode::NOT_FOUND {
                return Ok(PolledStatus::pending(
                    error.and_then(|error| error.error_message),
                ));
            }
            return Err(status_error(PROVIDER, status, &body, context));
        }

        let parsed: StkQueryResponse =
            serde_json::from_str(&body).map_err(|err| decode_error(PROVIDER, context, err))?;

        Ok(match parsed.result_code.as_deref() {
            None => PolledStatus::pending(parsed.result_desc),
            Some(code) => PolledStatus {
                status: if code == "0" {
                    PaymentStatus::Success
                } else {
                    PaymentStatus::Failed
                },
                result_code: Some(code.to_string()),
                result_desc: parsed.result_desc,
            },
        })
    }

    fn verify_signature(&self, payload: &[u8], signature: &str) -> bool {
        self.verifier.verify(payload, signature)
    }

    fn parse_callback(&self, payload: &[u8]) -> Result<GatewayEvent, GatewayError> {
        let context = "stk callback";
        let raw: serde_json::Value =
            serde_json::from_slice(payload).map_err(|err| invalid_callback(context, err))?;
        let callback: DarajaCallback =
            serde_json::from_value(raw.clone()).map_err(|err| invalid_callback(context, err))?;

        Ok(ProviderEvent::Daraja(callback).normalize(raw))
    }
}

fn invalid_callback(context: &str, err: serde_json::Error) -> GatewayError {
    GatewayError::InvalidRequest {
        provider: PROVIDER,
        context: context.to_string(),
        message: err.to_string(),
    }
}
