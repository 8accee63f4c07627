use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    entities::{billing_events::BillingEventEntity, subscriptions::SubscriptionEntity},
    value_objects::enums::subscription_statuses::SubscriptionStatus,
};

pub const MOBILE_MONEY_PAYMENT_METHOD: &str = "mpesa";

/// Period bounds and flags written by a successful plan payment.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionActivation {
    pub user_id: Uuid,
    pub plan_id: String,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub auto_renew: bool,
    pub payment_method: String,
}

impl SubscriptionActivation {
    /// An active subscription that already runs past this activation keeps
    /// its own plan, period and renewal flag; the period end never moves back.
    pub fn preserving_longer(self, existing: Option<&SubscriptionEntity>) -> Self {
        match existing {
            Some(current) if current.outlasts(self.current_period_end) => Self {
                user_id: self.user_id,
                plan_id: current.plan_id.clone(),
                current_period_start: current.current_period_start,
                current_period_end: current.current_period_end,
                auto_renew: current.auto_renew,
                payment_method: current.payment_method.clone(),
            },
            _ => self,
        }
    }
}

/// Outcome of a lifecycle write that also settles its `payment_settled`
/// outbox event in the same transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementWrite<T> {
    Applied(T),
    /// The subscription guard did not match; nothing was written.
    Rejected,
    /// Another consumer settled the event first.
    AlreadySettled,
}

impl<T> SettlementWrite<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> SettlementWrite<U> {
        match self {
            SettlementWrite::Applied(value) => SettlementWrite::Applied(f(value)),
            SettlementWrite::Rejected => SettlementWrite::Rejected,
            SettlementWrite::AlreadySettled => SettlementWrite::AlreadySettled,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivatedSubscription {
    pub subscription: SubscriptionEntity,
    /// No subscription row existed before this activation.
    pub first_activation: bool,
    pub event: Option<BillingEventEntity>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionModel {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub extra_storage_gb: i32,
    pub pages_used: i32,
    pub storage_used_mb: i64,
    pub auto_renew: bool,
    pub payment_method: String,
}

impl From<SubscriptionEntity> for SubscriptionModel {
    fn from(entity: SubscriptionEntity) -> Self {
        let status = entity.subscription_status();
        Self {
            id: entity.id,
            user_id: entity.user_id,
            plan_id: entity.plan_id,
            status,
            current_period_start: entity.current_period_start,
            current_period_end: entity.current_period_end,
            trial_ends_at: entity.trial_ends_at,
            extra_storage_gb: entity.extra_storage_gb,
            pages_used: entity.pages_used,
            storage_used_mb: entity.storage_used_mb,
            auto_renew: entity.auto_renew,
            payment_method: entity.payment_method,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn activation(user_id: Uuid, period_end: DateTime<Utc>) -> SubscriptionActivation {
        SubscriptionActivation {
            user_id,
            plan_id: "monthly".to_string(),
            current_period_start: period_end - Duration::days(30),
            current_period_end: period_end,
            auto_renew: true,
            payment_method: MOBILE_MONEY_PAYMENT_METHOD.to_string(),
        }
    }

    fn lifetime(user_id: Uuid, status: SubscriptionStatus, period_end: DateTime<Utc>) -> SubscriptionEntity {
        SubscriptionEntity {
            id: Uuid::new_v4(),
            user_id,
            plan_id: "lifetime".to_string(),
            status: status.to_string(),
            current_period_start: Utc::now(),
            current_period_end: period_end,
            trial_ends_at: None,
            extra_storage_gb: 0,
            pages_used: 0,
            storage_used_mb: 0,
            auto_renew: false,
            payment_method: MOBILE_MONEY_PAYMENT_METHOD.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn longer_active_period_is_kept() {
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        let current = lifetime(user_id, SubscriptionStatus::Active, now + Duration::days(36_500));

        let effective = activation(user_id, now + Duration::days(30)).preserving_longer(Some(&current));

        assert_eq!(effective.current_period_end, current.current_period_end);
        assert_eq!(effective.plan_id, "lifetime");
        assert!(!effective.auto_renew);
    }

    #[test]
    fn expired_or_shorter_period_is_replaced() {
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        let wanted = activation(user_id, now + Duration::days(30));

        let expired = lifetime(user_id, SubscriptionStatus::Expired, now + Duration::days(300));
        assert_eq!(wanted.clone().preserving_longer(Some(&expired)), wanted);

        let shorter = lifetime(user_id, SubscriptionStatus::Active, now + Duration::days(3));
        assert_eq!(wanted.clone().preserving_longer(Some(&shorter)), wanted);

        assert_eq!(wanted.clone().preserving_longer(None), wanted);
    }
}
