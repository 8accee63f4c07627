use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    entities::{billing_events::BillingEventEntity, payments::PaymentEntity},
    value_objects::enums::{payment_statuses::PaymentStatus, plan_types::PlanType},
};

pub const PLAN_REFERENCE_PREFIX: &str = "PLAN-";
pub const RENEWAL_REFERENCE_PREFIX: &str = "RENEW-";

// Daraja rejects account references longer than 12 characters.
const ACCOUNT_REFERENCE_MAX_LEN: usize = 12;

/// Result of the single conditional ledger update.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// `settlement` is the `payment_settled` outbox row committed with the transition.
    Applied {
        payment: PaymentEntity,
        settlement: BillingEventEntity,
    },
    AlreadyTerminal(PaymentEntity),
    NotFound,
}

/// What a payment pays for, encoded in its account reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentPurpose {
    Plan,
    Renewal,
}

impl PaymentPurpose {
    pub fn from_reference(account_reference: &str) -> Self {
        if account_reference.starts_with(RENEWAL_REFERENCE_PREFIX) {
            PaymentPurpose::Renewal
        } else {
            PaymentPurpose::Plan
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            PaymentPurpose::Plan => PLAN_REFERENCE_PREFIX,
            PaymentPurpose::Renewal => RENEWAL_REFERENCE_PREFIX,
        }
    }

    pub fn new_reference(&self) -> String {
        let prefix = self.prefix();
        let suffix_len = ACCOUNT_REFERENCE_MAX_LEN - prefix.len();
        let suffix = Uuid::new_v4().simple().to_string().to_ascii_uppercase();
        format!("{}{}", prefix, &suffix[..suffix_len])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanPricing {
    pub monthly: i64,
    pub lifetime: i64,
}

impl PlanPricing {
    pub fn price_for(&self, plan_type: PlanType) -> i64 {
        match plan_type {
            PlanType::Monthly => self.monthly,
            PlanType::Lifetime => self.lifetime,
        }
    }
}

/// Accepts `07XXXXXXXX`, `01XXXXXXXX`, `7XXXXXXXX`, `+2547XXXXXXXX` and
/// `2547XXXXXXXX`; returns the `254…` form gateways expect.
pub fn normalize_msisdn(phone_number: &str) -> Option<String> {
    let digits: String = phone_number
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    let digits = digits.strip_prefix('+').unwrap_or(&digits);

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let national = if let Some(rest) = digits.strip_prefix("254") {
        rest
    } else if let Some(rest) = digits.strip_prefix('0') {
        rest
    } else {
        digits
    };

    if national.len() != 9 || !(national.starts_with('7') || national.starts_with('1')) {
        return None;
    }

    Some(format!("254{}", national))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanPaymentRequest {
    pub user_id: Uuid,
    pub plan_type: PlanType,
    pub phone_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalPaymentRequest {
    pub user_id: Uuid,
    pub phone_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitiatedPayment {
    pub payment_id: Uuid,
    pub correlation_id: String,
    pub account_reference: String,
    pub amount: i64,
    pub status: PaymentStatus,
    pub response_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentStatusView {
    pub correlation_id: String,
    pub status: PaymentStatus,
    pub result_code: Option<String>,
    pub result_desc: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msisdn_is_normalised_to_international_form() {
        assert_eq!(normalize_msisdn("0712345678").as_deref(), Some("254712345678"));
        assert_eq!(normalize_msisdn("+254 712 345 678").as_deref(), Some("254712345678"));
        assert_eq!(normalize_msisdn("712345678").as_deref(), Some("254712345678"));
        assert_eq!(normalize_msisdn("0110345678").as_deref(), Some("254110345678"));
    }

    #[test]
    fn msisdn_rejects_garbage() {
        assert_eq!(normalize_msisdn(""), None);
        assert_eq!(normalize_msisdn("07123"), None);
        assert_eq!(normalize_msisdn("0812345678"), None);
        assert_eq!(normalize_msisdn("07abc45678"), None);
    }

    #[test]
    fn references_fit_daraja_limit_and_round_trip_purpose() {
        let plan = PaymentPurpose::Plan.new_reference();
        let renewal = PaymentPurpose::Renewal.new_reference();

        assert_eq!(plan.len(), 12);
        assert_eq!(renewal.len(), 12);
        assert_eq!(PaymentPurpose::from_reference(&plan), PaymentPurpose::Plan);
        assert_eq!(PaymentPurpose::from_reference(&renewal), PaymentPurpose::Renewal);
    }
}
