use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::domain::value_objects::enums::payment_statuses::PaymentStatus;

/// Outbound STK push request, already validated and normalised.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushRequest {
    pub amount: i64,
    pub phone_number: String,
    pub account_reference: String,
    pub transaction_desc: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushReceipt {
    pub correlation_id: String,
    pub provider_status: String,
    pub response_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolledStatus {
    pub status: PaymentStatus,
    pub result_code: Option<String>,
    pub result_desc: Option<String>,
}

impl PolledStatus {
    pub fn pending(result_desc: Option<String>) -> Self {
        Self {
            status: PaymentStatus::Pending,
            result_code: None,
            result_desc,
        }
    }
}

/// Provider-neutral view of a confirmation, whether it came from a webhook or a poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayEvent {
    pub transaction_id: String,
    pub amount: Option<i64>,
    pub phone_number: Option<String>,
    pub status: PaymentStatus,
    pub account_reference: Option<String>,
    pub transaction_desc: Option<String>,
    pub result_code: Option<String>,
    pub result_desc: Option<String>,
    pub callback_metadata: Value,
    pub raw: Value,
}

impl GatewayEvent {
    pub fn from_poll(correlation_id: &str, polled: &PolledStatus) -> Self {
        let raw = json!({
            "source": "poll",
            "status": polled.status,
            "result_code": polled.result_code,
            "result_desc": polled.result_desc,
        });

        Self {
            transaction_id: correlation_id.to_string(),
            amount: None,
            phone_number: None,
            status: polled.status,
            account_reference: None,
            transaction_desc: None,
            result_code: polled.result_code.clone(),
            result_desc: polled.result_desc.clone(),
            callback_metadata: Value::Null,
            raw,
        }
    }
}

// Daraja: {"Body": {"stkCallback": {...}}}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DarajaCallback {
    #[serde(rename = "Body")]
    pub body: DarajaCallbackBody,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DarajaCallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: DarajaStkCallback,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct DarajaStkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    pub result_code: i64,
    pub result_desc: Option<String>,
    pub callback_metadata: Option<DarajaCallbackMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DarajaCallbackMetadata {
    #[serde(rename = "Item", default)]
    pub item: Vec<DarajaMetadataItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DarajaMetadataItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Value,
}

// PayHero: {"status": true, "response": {...}}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayHeroCallback {
    #[serde(default)]
    pub status: bool,
    pub response: PayHeroCallbackResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct PayHeroCallbackResponse {
    pub amount: Option<f64>,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    pub external_reference: Option<String>,
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: Option<String>,
    pub mpesa_receipt_number: Option<String>,
    pub phone: Option<String>,
    pub result_code: i64,
    pub result_desc: Option<String>,
    pub status: Option<String>,
}

/// One variant per gateway body shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    Daraja(DarajaCallback),
    PayHero(PayHeroCallback),
}

impl ProviderEvent {
    /// `raw` is the body exactly as received, kept for audit.
    pub fn normalize(self, raw: Value) -> GatewayEvent {
        match self {
            ProviderEvent::Daraja(callback) => normalize_daraja(callback.body.stk_callback, raw),
            ProviderEvent::PayHero(callback) => normalize_payhero(callback.response, raw),
        }
    }
}

fn normalize_daraja(callback: DarajaStkCallback, raw: Value) -> GatewayEvent {
    let mut metadata = Map::new();
    for item in callback
        .callback_metadata
        .map(|metadata| metadata.item)
        .unwrap_or_default()
    {
        metadata.insert(item.name, item.value);
    }

    let amount = metadata.get("Amount").and_then(value_as_amount);
    let phone_number = metadata.get("PhoneNumber").and_then(value_as_text);

    GatewayEvent {
        transaction_id: callback.checkout_request_id,
        amount,
        phone_number,
        status: status_from_result_code(callback.result_code),
        account_reference: None,
        transaction_desc: None,
        result_code: Some(callback.result_code.to_string()),
        result_desc: callback.result_desc,
        callback_metadata: Value::Object(metadata),
        raw,
    }
}

fn normalize_payhero(response: PayHeroCallbackResponse, raw: Value) -> GatewayEvent {
    let succeeded = response.result_code == 0
        && response
            .status
            .as_deref()
            .map(|status| status.eq_ignore_ascii_case("success"))
            .unwrap_or(true);

    let callback_metadata = json!({
        "MpesaReceiptNumber": response.mpesa_receipt_number,
        "MerchantRequestID": response.merchant_request_id,
        "Status": response.status,
    });

    GatewayEvent {
        transaction_id: response.checkout_request_id,
        amount: response.amount.map(|amount| amount.round() as i64),
        phone_number: response.phone,
        status: if succeeded {
            PaymentStatus::Success
        } else {
            PaymentStatus::Failed
        },
        account_reference: response.external_reference,
        transaction_desc: None,
        result_code: Some(response.result_code.to_string()),
        result_desc: response.result_desc,
        callback_metadata,
        raw,
    }
}

fn status_from_result_code(result_code: i64) -> PaymentStatus {
    if result_code == 0 {
        PaymentStatus::Success
    } else {
        PaymentStatus::Failed
    }
}

fn value_as_amount(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_f64().map(|amount| amount.round() as i64),
        Value::String(text) => text.parse::<f64>().ok().map(|amount| amount.round() as i64),
        _ => None,
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) => Some(text.clone()),
        _ => None,
    }
}
