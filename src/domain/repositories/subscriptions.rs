use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::{
    entities::{billing_events::InsertBillingEventEntity, subscriptions::SubscriptionEntity},
    value_objects::subscriptions::{
        ActivatedSubscription, SettlementWrite, SubscriptionActivation,
    },
};

/// Every mutating method also writes the user's entitlement columns in the same transaction.
///
/// Methods taking a `settlement_id` mark that pending `payment_settled` outbox
/// event processed in the same transaction, and write nothing when it is no
/// longer pending.
#[automock]
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<SubscriptionEntity>>;

    /// Creates or overwrites the user's subscription, keeping an active period
    /// that already ends later. `first_activation_event` is appended to the
    /// outbox only when no subscription row existed.
    async fn activate(
        &self,
        activation: SubscriptionActivation,
        settlement_id: Uuid,
        first_activation_event: InsertBillingEventEntity,
    ) -> Result<SettlementWrite<ActivatedSubscription>>;

    /// Compare-and-set on `current_period_end`; `Rejected` when the row is no
    /// longer active, no longer auto-renewing, or was extended concurrently.
    async fn extend_period(
        &self,
        user_id: Uuid,
        expected_period_end: DateTime<Utc>,
        new_period_end: DateTime<Utc>,
        settlement_id: Uuid,
    ) -> Result<SettlementWrite<SubscriptionEntity>>;

    /// `Rejected` when there is no active auto-renewing subscription.
    async fn expire_for_renewal_failure(
        &self,
        user_id: Uuid,
        settlement_id: Uuid,
    ) -> Result<SettlementWrite<SubscriptionEntity>>;

    async fn cancel_auto_renew(&self, user_id: Uuid) -> Result<Option<SubscriptionEntity>>;

    async fn expire_lapsed(&self, cutoff: DateTime<Utc>) -> Result<Vec<SubscriptionEntity>>;
}
