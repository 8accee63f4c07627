#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use mpesa_billing::{
    application::services::{BillingServices, BillingSettings, BillingStores},
    config::config_model::Daraja,
    domain::{
        entities::{
            payments::InsertPaymentEntity, referrals::ReferralEntity,
            subscriptions::SubscriptionEntity, users::UserEntity,
        },
        repositories::{payment_gateway::PaymentGateways, payments::PaymentRepository},
        value_objects::{
            commissions::CommissionRate,
            enums::{
                gateway_providers::GatewayProvider, payment_statuses::PaymentStatus,
                plan_types::PlanType, referral_statuses::ReferralPaymentStatus,
                subscription_statuses::SubscriptionStatus, user_roles::UserRole,
            },
            payments::{PaymentPurpose, PlanPricing},
        },
    },
    infrastructure::{
        gateways::{daraja::DarajaGateway, signature::WebhookVerifier},
        in_memory::InMemoryBillingStore,
    },
};
use serde_json::json;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_test";
pub const MONTHLY_PRICE: i64 = 1999;
pub const LIFETIME_PRICE: i64 = 9999;

pub struct Harness {
    pub store: InMemoryBillingStore,
    pub services: BillingServices,
}

pub fn harness() -> Harness {
    let store = InMemoryBillingStore::new();
    let services = services_for(store.billing_stores());

    Harness { store, services }
}

/// Wires the usecases over `stores`, so a test can swap one repository out.
pub fn services_for(stores: BillingStores) -> BillingServices {
    // Callbacks are parsed and verified locally, the base url is never dialled.
    let daraja = DarajaGateway::new(
        reqwest::Client::new(),
        Daraja {
            base_url: "http://127.0.0.1:9".to_string(),
            consumer_key: "key".to_string(),
            consumer_secret: "secret".to_string(),
            shortcode: "174379".to_string(),
            passkey: "passkey".to_string(),
            callback_url: "https://billing.test/api/v1/webhooks/daraja".to_string(),
        },
        WebhookVerifier::new(Some(WEBHOOK_SECRET.to_string())),
    );
    let gateways = Arc::new(PaymentGateways::new(Arc::new(daraja)));

    let settings = BillingSettings {
        pricing: PlanPricing {
            monthly: MONTHLY_PRICE,
            lifetime: LIFETIME_PRICE,
        },
        currency: "KES".to_string(),
        commission_rate: CommissionRate::from_basis_points(1000),
        max_event_attempts: 5,
        expiry_grace: Duration::hours(24),
    };
    BillingServices::new(stores, gateways, settings)
}

pub fn user(role: UserRole) -> UserEntity {
    UserEntity {
        id: Uuid::new_v4(),
        role: role.to_string(),
        has_paid: false,
        is_locked: true,
        plan: None,
        subscription_expires_at: None,
        available_balance: 0,
        total_earned: 0,
    }
}

pub fn pending_referral(referrer_id: Uuid, client_id: Uuid) -> ReferralEntity {
    ReferralEntity {
        id: Uuid::new_v4(),
        referrer_id,
        client_id,
        product_id: "site-builder".to_string(),
        payment_status: ReferralPaymentStatus::Pending.to_string(),
        commission_earned: None,
        credited_at: None,
        created_at: Utc::now(),
    }
}

pub fn active_monthly(user_id: Uuid, period_end: DateTime<Utc>) -> SubscriptionEntity {
    let now = Utc::now();
    SubscriptionEntity {
        id: Uuid::new_v4(),
        user_id,
        plan_id: PlanType::Monthly.to_string(),
        status: SubscriptionStatus::Active.to_string(),
        current_period_start: period_end - PlanType::Monthly.period(),
        current_period_end: period_end,
        trial_ends_at: None,
        extra_storage_gb: 0,
        pages_used: 0,
        storage_used_mb: 0,
        auto_renew: true,
        payment_method: "mpesa".to_string(),
        created_at: now,
        updated_at: now,
    }
}

/// Seeds a pending ledger row as if the gateway had accepted the push.
pub async fn pending_payment(
    store: &InMemoryBillingStore,
    user_id: Uuid,
    plan_type: PlanType,
    purpose: PaymentPurpose,
    amount: i64,
) -> String {
    let correlation_id = format!("ws_CO_{}", Uuid::new_v4().simple());
    store
        .create(InsertPaymentEntity {
            correlation_id: correlation_id.clone(),
            user_id,
            amount,
            currency: "KES".to_string(),
            plan_type: plan_type.to_string(),
            account_reference: purpose.new_reference(),
            provider: GatewayProvider::Daraja.to_string(),
            status: PaymentStatus::Pending.to_string(),
        })
        .await
        .expect("seed payment");
    correlation_id
}

pub fn daraja_callback(correlation_id: &str, result_code: i64, amount: i64) -> Vec<u8> {
    let body = if result_code == 0 {
        json!({
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "29115-34620561-1",
                    "CheckoutRequestID": correlation_id,
                    "ResultCode": 0,
                    "ResultDesc": "The service request is processed successfully.",
                    "CallbackMetadata": {
                        "Item": [
                            { "Name": "Amount", "Value": amount },
                            { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" },
                            { "Name": "PhoneNumber", "Value": 254708374149u64 }
                        ]
                    }
                }
            }
        })
    } else {
        json!({
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "29115-34620561-1",
                    "CheckoutRequestID": correlation_id,
                    "ResultCode": result_code,
                    "ResultDesc": "Request cancelled by user"
                }
            }
        })
    };
    serde_json::to_vec(&body).expect("serialize callback")
}
