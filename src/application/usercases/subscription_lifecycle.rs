use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    application::usercases::user_locks::UserLocks,
    domain::{
        entities::{
            billing_events::InsertBillingEventEntity, payments::PaymentEntity,
            subscriptions::SubscriptionEntity,
        },
        repositories::subscriptions::SubscriptionRepository,
        value_objects::{
            enums::plan_types::PlanType,
            subscriptions::{
                ActivatedSubscription, MOBILE_MONEY_PAYMENT_METHOD, SettlementWrite,
                SubscriptionActivation, SubscriptionModel,
            },
        },
    },
};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("no active auto-renewing subscription for user {0}")]
    RenewalTargetMissing(Uuid),
    #[error("subscription for user {0} changed while renewing")]
    SubscriptionChanged(Uuid),
    #[error("no subscription for user {0}")]
    SubscriptionNotFound(Uuid),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl LifecycleError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            LifecycleError::RenewalTargetMissing(_) | LifecycleError::SubscriptionChanged(_) => {
                StatusCode::CONFLICT
            }
            LifecycleError::SubscriptionNotFound(_) => StatusCode::NOT_FOUND,
            LifecycleError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;

/// Entitlement change that followed a settled payment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEffect {
    Activated { first_activation: bool },
    Renewed,
    ExpiredAfterFailedRenewal,
    None,
    /// Queued in the outbox; the billing worker retries it.
    Deferred { reason: String },
    /// Money moved but no entitlement change applies; needs manual follow-up.
    Failed { reason: String },
}

pub struct SubscriptionLifecycleUseCase {
    subscription_repo: Arc<dyn SubscriptionRepository>,
    locks: UserLocks,
}

impl SubscriptionLifecycleUseCase {
    pub fn new(subscription_repo: Arc<dyn SubscriptionRepository>) -> Self {
        Self {
            subscription_repo,
            locks: UserLocks::new(),
        }
    }

    /// Starts (or restarts) a paid period from now, settling `settlement_id`.
    /// The outbox event that drives commission is only written the first
    /// time a user ever subscribes.
    pub async fn activate_first(
        &self,
        user_id: Uuid,
        plan_type: PlanType,
        payment: &PaymentEntity,
        settlement_id: Uuid,
    ) -> LifecycleResult<SettlementWrite<ActivatedSubscription>> {
        let _guard = self.locks.lock(user_id).await;

        let now = Utc::now();
        let activation = SubscriptionActivation {
            user_id,
            plan_id: plan_type.to_string(),
            current_period_start: now,
            current_period_end: now + plan_type.period(),
            auto_renew: plan_type.auto_renews(),
            payment_method: MOBILE_MONEY_PAYMENT_METHOD.to_string(),
        };
        let event = InsertBillingEventEntity::subscription_activated(payment, &plan_type.to_string());

        let written = self
            .subscription_repo
            .activate(activation, settlement_id, event)
            .await
            .map_err(|err| {
                error!(
                    %user_id,
                    payment_id = %payment.id,
                    db_error = ?err,
                    "lifecycle: failed to activate subscription"
                );
                LifecycleError::Internal(err)
            })?;

        if let SettlementWrite::Applied(activated) = &written {
            info!(
                %user_id,
                plan = %plan_type,
                first_activation = activated.first_activation,
                effective_plan = %activated.subscription.plan_id,
                period_end = %activated.subscription.current_period_end,
                "lifecycle: subscription activated"
            );
        }
        Ok(written)
    }

    /// Extends an auto-renewing subscription by exactly one monthly period
    /// counted from its current end, not from now.
    pub async fn renew(
        &self,
        user_id: Uuid,
        settlement_id: Uuid,
    ) -> LifecycleResult<SettlementWrite<SubscriptionEntity>> {
        let _guard = self.locks.lock(user_id).await;

        let subscription = self.load_renewable(user_id).await?;
        let new_period_end = subscription.current_period_end + PlanType::Monthly.period();

        let written = self
            .subscription_repo
            .extend_period(
                user_id,
                subscription.current_period_end,
                new_period_end,
                settlement_id,
            )
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "lifecycle: failed to extend period");
                LifecycleError::Internal(err)
            })?;

        match written {
            SettlementWrite::Applied(renewed) => {
                info!(
                    %user_id,
                    previous_period_end = %subscription.current_period_end,
                    period_end = %renewed.current_period_end,
                    "lifecycle: subscription renewed"
                );
                Ok(SettlementWrite::Applied(renewed))
            }
            SettlementWrite::Rejected => {
                warn!(%user_id, "lifecycle: subscription changed while renewing");
                Err(LifecycleError::SubscriptionChanged(user_id))
            }
            SettlementWrite::AlreadySettled => Ok(SettlementWrite::AlreadySettled),
        }
    }

    /// A failed renewal payment expires the subscription and locks the site.
    /// `has_paid` is left as it was.
    pub async fn expire_on_renewal_failure(
        &self,
        user_id: Uuid,
        settlement_id: Uuid,
    ) -> LifecycleResult<SettlementWrite<SubscriptionEntity>> {
        let _guard = self.locks.lock(user_id).await;

        let written = self
            .subscription_repo
            .expire_for_renewal_failure(user_id, settlement_id)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "lifecycle: failed to expire subscription");
                LifecycleError::Internal(err)
            })?;

        match written {
            SettlementWrite::Applied(expired) => {
                info!(%user_id, "lifecycle: subscription expired after failed renewal");
                Ok(SettlementWrite::Applied(expired))
            }
            SettlementWrite::Rejected => {
                warn!(%user_id, "lifecycle: no auto-renewing subscription to expire");
                Err(LifecycleError::RenewalTargetMissing(user_id))
            }
            SettlementWrite::AlreadySettled => Ok(SettlementWrite::AlreadySettled),
        }
    }

    /// Stops future renewals. The current period still runs to its end.
    pub async fn cancel_auto_renew(&self, user_id: Uuid) -> LifecycleResult<SubscriptionModel> {
        let _guard = self.locks.lock(user_id).await;

        let cancelled = self
            .subscription_repo
            .cancel_auto_renew(user_id)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "lifecycle: failed to cancel auto-renew");
                LifecycleError::Internal(err)
            })?
            .ok_or(LifecycleError::SubscriptionNotFound(user_id))?;

        info!(
            %user_id,
            period_end = %cancelled.current_period_end,
            "lifecycle: auto-renew cancelled"
        );
        Ok(SubscriptionModel::from(cancelled))
    }

    /// Expires subscriptions whose period ended more than `grace` before `now`.
    pub async fn expire_lapsed(
        &self,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> LifecycleResult<Vec<SubscriptionEntity>> {
        let cutoff = now - grace;
        let expired = self
            .subscription_repo
            .expire_lapsed(cutoff)
            .await
            .map_err(|err| {
                error!(%cutoff, db_error = ?err, "lifecycle: lapsed sweep failed");
                LifecycleError::Internal(err)
            })?;

        if !expired.is_empty() {
            info!(expired_count = expired.len(), %cutoff, "lifecycle: lapsed subscriptions expired");
        }
        Ok(expired)
    }

    pub async fn current(&self, user_id: Uuid) -> LifecycleResult<SubscriptionModel> {
        let subscription = self
            .subscription_repo
            .find_by_user_id(user_id)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "lifecycle: failed to load subscription");
                LifecycleError::Internal(err)
            })?
            .ok_or(LifecycleError::SubscriptionNotFound(user_id))?;

        Ok(SubscriptionModel::from(subscription))
    }

    async fn load_renewable(&self, user_id: Uuid) -> LifecycleResult<SubscriptionEntity> {
        let subscription = self
            .subscription_repo
            .find_by_user_id(user_id)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "lifecycle: failed to load subscription");
                LifecycleError::Internal(err)
            })?;

        match subscription {
            Some(subscription) if subscription.is_renewable() => Ok(subscription),
            Some(subscription) => {
                error!(
                    %user_id,
                    status = %subscription.status,
                    auto_renew = subscription.auto_renew,
                    "lifecycle: renewal target is not an active auto-renewing subscription"
                );
                Err(LifecycleError::RenewalTargetMissing(user_id))
            }
            None => {
                error!(%user_id, "lifecycle: renewal target has no subscription");
                Err(LifecycleError::RenewalTargetMissing(user_id))
            }
        }
    }
}
