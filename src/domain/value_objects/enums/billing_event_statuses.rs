use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BillingEventStatus {
    #[default]
    Pending,
    Processed,
    Failed,
}

impl Display for BillingEventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            BillingEventStatus::Pending => "pending",
            BillingEventStatus::Processed => "processed",
            BillingEventStatus::Failed => "failed",
        };
        write!(f, "{}", status)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BillingEventType {
    PaymentSettled,
    SubscriptionActivated,
}

impl Display for BillingEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BillingEventType::PaymentSettled => write!(f, "payment_settled"),
            BillingEventType::SubscriptionActivated => write!(f, "subscription_activated"),
        }
    }
}

impl BillingEventType {
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "payment_settled" => Some(BillingEventType::PaymentSettled),
            "subscription_activated" => Some(BillingEventType::SubscriptionActivated),
            _ => None,
        }
    }
}
