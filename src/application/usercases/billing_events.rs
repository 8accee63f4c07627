use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    application::usercases::{
        commissions::{CommissionError, CommissionUseCase},
        subscription_lifecycle::{LifecycleEffect, LifecycleError, SubscriptionLifecycleUseCase},
    },
    domain::{
        entities::billing_events::BillingEventEntity,
        repositories::{billing_events::BillingEventRepository, payments::PaymentRepository},
        value_objects::{
            commissions::{CommissionOutcome, CommissionRate},
            enums::{
                billing_event_statuses::{BillingEventStatus, BillingEventType},
                payment_statuses::PaymentStatus,
            },
            payments::PaymentPurpose,
            subscriptions::SettlementWrite,
        },
    },
};

pub const DEFAULT_MAX_EVENT_ATTEMPTS: i32 = 5;

#[derive(Debug, Error)]
pub enum BillingEventError {
    #[error("unknown billing event type {0}")]
    UnknownEventType(String),
    #[error("payment {0} referenced by billing event not found")]
    PaymentMissing(Uuid),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Commission(#[from] CommissionError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl BillingEventError {
    /// Retrying cannot fix these.
    fn is_permanent(&self) -> bool {
        matches!(
            self,
            BillingEventError::UnknownEventType(_) | BillingEventError::PaymentMissing(_)
        )
    }
}

pub type BillingEventResult<T> = std::result::Result<T, BillingEventError>;

#[derive(Debug, Clone, PartialEq)]
pub enum EventProcessing {
    Settled(LifecycleEffect),
    Commission(CommissionOutcome),
    Skipped,
}

enum SettlementStep {
    /// The lifecycle write marked the event processed in its own transaction.
    Written {
        effect: LifecycleEffect,
        follow_up: Option<BillingEventEntity>,
    },
    /// Nothing to write; the event is marked processed separately.
    Unchanged(LifecycleEffect),
    AlreadySettled,
}

/// Outbox consumer. `payment_settled` events apply the entitlement change of a
/// settled payment; `subscription_activated` events credit the commission.
/// Both are retried until `max_attempts`.
pub struct BillingEventUseCase {
    event_repo: Arc<dyn BillingEventRepository>,
    payment_repo: Arc<dyn PaymentRepository>,
    lifecycle: Arc<SubscriptionLifecycleUseCase>,
    commissions: Arc<CommissionUseCase>,
    commission_rate: CommissionRate,
    max_attempts: i32,
}

impl BillingEventUseCase {
    pub fn new(
        event_repo: Arc<dyn BillingEventRepository>,
        payment_repo: Arc<dyn PaymentRepository>,
        lifecycle: Arc<SubscriptionLifecycleUseCase>,
        commissions: Arc<CommissionUseCase>,
        commission_rate: CommissionRate,
        max_attempts: i32,
    ) -> Self {
        Self {
            event_repo,
            payment_repo,
            lifecycle,
            commissions,
            commission_rate,
            max_attempts,
        }
    }

    pub async fn process_event(
        &self,
        event: BillingEventEntity,
    ) -> BillingEventResult<EventProcessing> {
        if event.status != BillingEventStatus::Pending.to_string() {
            return Ok(EventProcessing::Skipped);
        }

        match BillingEventType::from_str(&event.event_type) {
            Some(BillingEventType::PaymentSettled) => self.process_settlement(event).await,
            Some(BillingEventType::SubscriptionActivated) => self.process_commission(event).await,
            None => {
                let err = BillingEventError::UnknownEventType(event.event_type.clone());
                self.record_failure(&event, err).await
            }
        }
    }

    /// Drains up to `limit` pending events. Returns how many were processed successfully.
    pub async fn process_pending(&self, limit: i64) -> BillingEventResult<usize> {
        let events = self.event_repo.list_pending(limit).await.map_err(|err| {
            error!(db_error = ?err, "billing events: failed to list pending events");
            BillingEventError::Internal(err)
        })?;

        let mut processed = 0;
        for event in events {
            match self.process_event(event).await {
                Ok(EventProcessing::Settled(_)) | Ok(EventProcessing::Commission(_)) => {
                    processed += 1
                }
                Ok(EventProcessing::Skipped) | Err(_) => {}
            }
        }

        Ok(processed)
    }

    async fn process_settlement(
        &self,
        event: BillingEventEntity,
    ) -> BillingEventResult<EventProcessing> {
        let step = match self.settle(&event).await {
            Ok(step) => step,
            Err(err) => return self.record_failure(&event, err).await,
        };

        let effect = match step {
            SettlementStep::Written { effect, follow_up } => {
                if let Some(follow_up) = follow_up {
                    // The follow-up row records its own failure and is retried by the worker.
                    if let Err(err) = self.process_commission(follow_up).await {
                        warn!(
                            event_id = %event.id,
                            error = ?err,
                            "billing events: commission deferred to billing worker"
                        );
                    }
                }
                effect
            }
            SettlementStep::Unchanged(effect) => {
                self.mark_processed(&event).await?;
                effect
            }
            SettlementStep::AlreadySettled => {
                info!(event_id = %event.id, "billing events: settlement already applied");
                return Ok(EventProcessing::Skipped);
            }
        };

        info!(
            event_id = %event.id,
            payment_id = %event.payment_id,
            user_id = %event.user_id,
            effect = ?effect,
            "billing events: payment settled"
        );
        Ok(EventProcessing::Settled(effect))
    }

    async fn settle(&self, event: &BillingEventEntity) -> BillingEventResult<SettlementStep> {
        let payment = self
            .payment_repo
            .find_by_id(event.payment_id)
            .await
            .map_err(|err| {
                error!(payment_id = %event.payment_id, db_error = ?err, "billing events: failed to load payment");
                BillingEventError::Internal(err)
            })?
            .ok_or(BillingEventError::PaymentMissing(event.payment_id))?;
        let purpose = PaymentPurpose::from_reference(&payment.account_reference);

        let written = match (payment.payment_status(), purpose) {
            (Some(PaymentStatus::Success), PaymentPurpose::Plan) => {
                let Some(plan_type) = payment.plan() else {
                    return Ok(manual_follow_up(
                        event,
                        format!("unknown plan type {}", payment.plan_type),
                    ));
                };
                self.lifecycle
                    .activate_first(payment.user_id, plan_type, &payment, event.id)
                    .await?
                    .map(|activated| {
                        (
                            LifecycleEffect::Activated {
                                first_activation: activated.first_activation,
                            },
                            activated.event,
                        )
                    })
            }
            (Some(PaymentStatus::Success), PaymentPurpose::Renewal) => {
                match self.lifecycle.renew(payment.user_id, event.id).await {
                    Ok(written) => written.map(|_| (LifecycleEffect::Renewed, None)),
                    Err(LifecycleError::RenewalTargetMissing(_)) => {
                        return Ok(manual_follow_up(
                            event,
                            "renewal paid without an active auto-renewing subscription".to_string(),
                        ));
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            (Some(PaymentStatus::Failed), PaymentPurpose::Renewal) => {
                match self
                    .lifecycle
                    .expire_on_renewal_failure(payment.user_id, event.id)
                    .await
                {
                    Ok(written) => {
                        written.map(|_| (LifecycleEffect::ExpiredAfterFailedRenewal, None))
                    }
                    // Nothing left to expire.
                    Err(LifecycleError::RenewalTargetMissing(_)) => {
                        return Ok(SettlementStep::Unchanged(LifecycleEffect::None));
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            (Some(PaymentStatus::Failed), PaymentPurpose::Plan) => {
                return Ok(SettlementStep::Unchanged(LifecycleEffect::None));
            }
            (Some(PaymentStatus::Pending), _) | (None, _) => {
                warn!(
                    event_id = %event.id,
                    payment_id = %payment.id,
                    status = %payment.status,
                    "billing events: settlement event for an unsettled payment"
                );
                return Ok(SettlementStep::Unchanged(LifecycleEffect::None));
            }
        };

        Ok(match written {
            SettlementWrite::Applied((effect, follow_up)) => {
                SettlementStep::Written { effect, follow_up }
            }
            SettlementWrite::Rejected | SettlementWrite::AlreadySettled => {
                SettlementStep::AlreadySettled
            }
        })
    }

    async fn process_commission(
        &self,
        event: BillingEventEntity,
    ) -> BillingEventResult<EventProcessing> {
        let outcome = match self
            .commissions
            .credit_if_referred(event.user_id, event.amount, self.commission_rate)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => return self.record_failure(&event, err.into()).await,
        };

        self.mark_processed(&event).await?;
        info!(
            event_id = %event.id,
            user_id = %event.user_id,
            outcome = ?outcome,
            "billing events: commission event processed"
        );
        Ok(EventProcessing::Commission(outcome))
    }

    async fn mark_processed(&self, event: &BillingEventEntity) -> BillingEventResult<()> {
        self.event_repo.mark_processed(event.id).await.map_err(|err| {
            error!(event_id = %event.id, db_error = ?err, "billing events: failed to mark processed");
            BillingEventError::Internal(err)
        })
    }

    async fn record_failure(
        &self,
        event: &BillingEventEntity,
        err: BillingEventError,
    ) -> BillingEventResult<EventProcessing> {
        let max_attempts = if err.is_permanent() {
            1
        } else {
            self.max_attempts
        };
        let attempts = event.attempts + 1;

        if attempts >= max_attempts {
            error!(
                event_id = %event.id,
                event_type = %event.event_type,
                payment_id = %event.payment_id,
                user_id = %event.user_id,
                attempts,
                error = ?err,
                "billing events: event failed permanently, manual reconciliation required"
            );
        } else {
            warn!(
                event_id = %event.id,
                attempts,
                error = ?err,
                "billing events: event processing failed"
            );
        }

        self.event_repo
            .mark_attempt_failed(event.id, err.to_string(), max_attempts)
            .await
            .map_err(|db_err| {
                error!(event_id = %event.id, db_error = ?db_err, "billing events: failed to record attempt");
                BillingEventError::Internal(db_err)
            })?;
        Err(err)
    }
}

fn manual_follow_up(event: &BillingEventEntity, reason: String) -> SettlementStep {
    error!(
        event_id = %event.id,
        payment_id = %event.payment_id,
        user_id = %event.user_id,
        amount = event.amount,
        %reason,
        "billing events: payment recorded but entitlement not updated, manual reconciliation required"
    );
    SettlementStep::Unchanged(LifecycleEffect::Failed { reason })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use mockall::predicate::eq;

    use super::*;
    use crate::domain::{
        entities::{payments::PaymentEntity, subscriptions::SubscriptionEntity},
        repositories::{
            billing_events::MockBillingEventRepository, payments::MockPaymentRepository,
            referrals::MockReferralRepository, subscriptions::MockSubscriptionRepository,
            users::MockUserRepository,
        },
        value_objects::{
            enums::{plan_types::PlanType, subscription_statuses::SubscriptionStatus},
            subscriptions::ActivatedSubscription,
        },
    };

    fn pending_event(event_type: &str, payment: &PaymentEntity) -> BillingEventEntity {
        BillingEventEntity {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            user_id: payment.user_id,
            payment_id: payment.id,
            amount: payment.amount,
            product_id: payment.plan_type.clone(),
            status: BillingEventStatus::Pending.to_string(),
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    fn payment(account_reference: &str, status: PaymentStatus) -> PaymentEntity {
        PaymentEntity {
            id: Uuid::new_v4(),
            correlation_id: "ws_CO_1".to_string(),
            user_id: Uuid::new_v4(),
            amount: 1999,
            currency: "KES".to_string(),
            plan_type: PlanType::Monthly.to_string(),
            account_reference: account_reference.to_string(),
            provider: "daraja".to_string(),
            status: status.to_string(),
            raw_callback: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn payments_returning(payment: PaymentEntity) -> MockPaymentRepository {
        let mut payment_repo = MockPaymentRepository::new();
        payment_repo
            .expect_find_by_id()
            .with(eq(payment.id))
            .returning(move |_| Ok(Some(payment.clone())));
        payment_repo
    }

    fn active_subscription(user_id: Uuid) -> SubscriptionEntity {
        let now = Utc::now();
        SubscriptionEntity {
            id: Uuid::new_v4(),
            user_id,
            plan_id: PlanType::Monthly.to_string(),
            status: SubscriptionStatus::Active.to_string(),
            current_period_start: now,
            current_period_end: now + PlanType::Monthly.period(),
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

    fn usecase(
        event_repo: MockBillingEventRepository,
        payment_repo: MockPaymentRepository,
        subscription_repo: MockSubscriptionRepository,
        referral_repo: MockReferralRepository,
        max_attempts: i32,
    ) -> BillingEventUseCase {
        BillingEventUseCase::new(
            Arc::new(event_repo),
            Arc::new(payment_repo),
            Arc::new(SubscriptionLifecycleUseCase::new(Arc::new(subscription_repo))),
            Arc::new(CommissionUseCase::new(
                Arc::new(referral_repo),
                Arc::new(MockUserRepository::new()),
            )),
            CommissionRate::default(),
            max_attempts,
        )
    }

    #[tokio::test]
    async fn activation_event_runs_commission_and_is_marked_processed() {
        let paid = payment("PLAN-ABCDEFG", PaymentStatus::Success);
        let event = pending_event("subscription_activated", &paid);
        let event_id = event.id;

        let mut referral_repo = MockReferralRepository::new();
        referral_repo
            .expect_find_pending_by_client()
            .with(eq(event.user_id))
            .returning(|_| Ok(None));
        let mut event_repo = MockBillingEventRepository::new();
        event_repo
            .expect_mark_processed()
            .with(eq(event_id))
            .times(1)
            .returning(|_| Ok(()));
        event_repo.expect_mark_attempt_failed().never();

        let usecase = usecase(
            event_repo,
            MockPaymentRepository::new(),
            MockSubscriptionRepository::new(),
            referral_repo,
            DEFAULT_MAX_EVENT_ATTEMPTS,
        );

        assert_eq!(
            usecase.process_event(event).await.unwrap(),
            EventProcessing::Commission(CommissionOutcome::NoPendingReferral)
        );
    }

    #[tokio::test]
    async fn storage_failure_records_attempt() {
        let paid = payment("PLAN-ABCDEFG", PaymentStatus::Success);
        let event = pending_event("subscription_activated", &paid);
        let event_id = event.id;

        let mut referral_repo = MockReferralRepository::new();
        referral_repo
            .expect_find_pending_by_client()
            .returning(|_| Err(anyhow::anyhow!("connection reset")));
        let mut event_repo = MockBillingEventRepository::new();
        event_repo.expect_mark_processed().never();
        event_repo
            .expect_mark_attempt_failed()
            .withf(move |id, _, max_attempts| *id == event_id && *max_attempts == 3)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let usecase = usecase(
            event_repo,
            MockPaymentRepository::new(),
            MockSubscriptionRepository::new(),
            referral_repo,
            3,
        );

        assert!(usecase.process_event(event).await.is_err());
    }

    #[tokio::test]
    async fn unknown_event_type_fails_immediately() {
        let paid = payment("PLAN-ABCDEFG", PaymentStatus::Success);
        let event = pending_event("plan_downgraded", &paid);

        let mut event_repo = MockBillingEventRepository::new();
        event_repo
            .expect_mark_attempt_failed()
            .withf(|_, _, max_attempts| *max_attempts == 1)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let usecase = usecase(
            event_repo,
            MockPaymentRepository::new(),
            MockSubscriptionRepository::new(),
            MockReferralRepository::new(),
            DEFAULT_MAX_EVENT_ATTEMPTS,
        );

        assert!(matches!(
            usecase.process_event(event).await,
            Err(BillingEventError::UnknownEventType(_))
        ));
    }

    #[tokio::test]
    async fn settled_plan_payment_activates_and_runs_commission_inline() {
        let paid = payment("PLAN-ABCDEFG", PaymentStatus::Success);
        let settlement = pending_event("payment_settled", &paid);
        let settlement_id = settlement.id;
        let follow_up = pending_event("subscription_activated", &paid);
        let follow_up_id = follow_up.id;
        let user_id = paid.user_id;

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_activate()
            .withf(move |activation, settled, _| {
                activation.user_id == user_id && *settled == settlement_id
            })
            .times(1)
            .returning(move |_, _, _| {
                Ok(SettlementWrite::Applied(ActivatedSubscription {
                    subscription: active_subscription(user_id),
                    first_activation: true,
                    event: Some(follow_up.clone()),
                }))
            });
        let mut referral_repo = MockReferralRepository::new();
        referral_repo
            .expect_find_pending_by_client()
            .returning(|_| Ok(None));
        let mut event_repo = MockBillingEventRepository::new();
        // The settlement is closed inside the activation write; only the follow-up is marked here.
        event_repo
            .expect_mark_processed()
            .with(eq(follow_up_id))
            .times(1)
            .returning(|_| Ok(()));
        event_repo.expect_mark_attempt_failed().never();

        let usecase = usecase(
            event_repo,
            payments_returning(paid),
            subscription_repo,
            referral_repo,
            DEFAULT_MAX_EVENT_ATTEMPTS,
        );

        assert_eq!(
            usecase.process_event(settlement).await.unwrap(),
            EventProcessing::Settled(LifecycleEffect::Activated {
                first_activation: true
            })
        );
    }

    #[tokio::test]
    async fn transient_activation_failure_is_kept_for_retry() {
        let paid = payment("PLAN-ABCDEFG", PaymentStatus::Success);
        let settlement = pending_event("payment_settled", &paid);
        let settlement_id = settlement.id;

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_activate()
            .returning(|_, _, _| Err(anyhow::anyhow!("pool timed out")));
        let mut event_repo = MockBillingEventRepository::new();
        event_repo.expect_mark_processed().never();
        event_repo
            .expect_mark_attempt_failed()
            .withf(move |id, error, max_attempts| {
                *id == settlement_id
                    && error.contains("pool timed out")
                    && *max_attempts == DEFAULT_MAX_EVENT_ATTEMPTS
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let usecase = usecase(
            event_repo,
            payments_returning(paid),
            subscription_repo,
            MockReferralRepository::new(),
            DEFAULT_MAX_EVENT_ATTEMPTS,
        );

        assert!(matches!(
            usecase.process_event(settlement).await,
            Err(BillingEventError::Lifecycle(LifecycleError::Internal(_)))
        ));
    }

    #[tokio::test]
    async fn successful_renewal_extends_subscription() {
        let paid = payment("RENEW-ABCDEF", PaymentStatus::Success);
        let settlement = pending_event("payment_settled", &paid);
        let settlement_id = settlement.id;
        let current = active_subscription(paid.user_id);
        let period_end = current.current_period_end;

        let mut subscription_repo = MockSubscriptionRepository::new();
        let found = current.clone();
        subscription_repo
            .expect_find_by_user_id()
            .returning(move |_| Ok(Some(found.clone())));
        subscription_repo
            .expect_extend_period()
            .with(
                eq(paid.user_id),
                eq(period_end),
                eq(period_end + PlanType::Monthly.period()),
                eq(settlement_id),
            )
            .times(1)
            .returning(move |_, _, new_end, _| {
                Ok(SettlementWrite::Applied(SubscriptionEntity {
                    current_period_end: new_end,
                    ..current.clone()
                }))
            });
        subscription_repo.expect_activate().never();
        let mut event_repo = MockBillingEventRepository::new();
        event_repo.expect_mark_processed().never();

        let usecase = usecase(
            event_repo,
            payments_returning(paid),
            subscription_repo,
            MockReferralRepository::new(),
            DEFAULT_MAX_EVENT_ATTEMPTS,
        );

        assert_eq!(
            usecase.process_event(settlement).await.unwrap(),
            EventProcessing::Settled(LifecycleEffect::Renewed)
        );
    }

    #[tokio::test]
    async fn renewal_paid_without_renewable_subscription_is_flagged_and_closed() {
        let paid = payment("RENEW-ABCDEF", PaymentStatus::Success);
        let settlement = pending_event("payment_settled", &paid);
        let settlement_id = settlement.id;

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_find_by_user_id()
            .returning(|_| Ok(None));
        subscription_repo.expect_extend_period().never();
        let mut event_repo = MockBillingEventRepository::new();
        event_repo
            .expect_mark_processed()
            .with(eq(settlement_id))
            .times(1)
            .returning(|_| Ok(()));

        let usecase = usecase(
            event_repo,
            payments_returning(paid),
            subscription_repo,
            MockReferralRepository::new(),
            DEFAULT_MAX_EVENT_ATTEMPTS,
        );

        assert!(matches!(
            usecase.process_event(settlement).await.unwrap(),
            EventProcessing::Settled(LifecycleEffect::Failed { .. })
        ));
    }

    #[tokio::test]
    async fn failed_plan_payment_is_closed_without_changes() {
        let failed = payment("PLAN-ABCDEFG", PaymentStatus::Failed);
        let settlement = pending_event("payment_settled", &failed);
        let settlement_id = settlement.id;

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo.expect_activate().never();
        let mut event_repo = MockBillingEventRepository::new();
        event_repo
            .expect_mark_processed()
            .with(eq(settlement_id))
            .times(1)
            .returning(|_| Ok(()));

        let usecase = usecase(
            event_repo,
            payments_returning(failed),
            subscription_repo,
            MockReferralRepository::new(),
            DEFAULT_MAX_EVENT_ATTEMPTS,
        );

        assert_eq!(
            usecase.process_event(settlement).await.unwrap(),
            EventProcessing::Settled(LifecycleEffect::None)
        );
    }

    #[tokio::test]
    async fn failed_renewal_expires_subscription() {
        let failed = payment("RENEW-ABCDEF", PaymentStatus::Failed);
        let settlement = pending_event("payment_settled", &failed);
        let settlement_id = settlement.id;
        let user_id = failed.user_id;

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_expire_for_renewal_failure()
            .with(eq(user_id), eq(settlement_id))
            .times(1)
            .returning(move |user_id, _| {
                Ok(SettlementWrite::Applied(SubscriptionEntity {
                    status: SubscriptionStatus::Expired.to_string(),
                    ..active_subscription(user_id)
                }))
            });

        let usecase = usecase(
            MockBillingEventRepository::new(),
            payments_returning(failed),
            subscription_repo,
            MockReferralRepository::new(),
            DEFAULT_MAX_EVENT_ATTEMPTS,
        );

        assert_eq!(
            usecase.process_event(settlement).await.unwrap(),
            EventProcessing::Settled(LifecycleEffect::ExpiredAfterFailedRenewal)
        );
    }

    #[tokio::test]
    async fn settlement_applied_by_another_consumer_is_skipped() {
        let paid = payment("PLAN-ABCDEFG", PaymentStatus::Success);
        let settlement = pending_event("payment_settled", &paid);

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_activate()
            .times(1)
            .returning(|_, _, _| Ok(SettlementWrite::AlreadySettled));
        let mut event_repo = MockBillingEventRepository::new();
        event_repo.expect_mark_processed().never();
        event_repo.expect_mark_attempt_failed().never();

        let usecase = usecase(
            event_repo,
            payments_returning(paid),
            subscription_repo,
            MockReferralRepository::new(),
            DEFAULT_MAX_EVENT_ATTEMPTS,
        );

        assert_eq!(
            usecase.process_event(settlement).await.unwrap(),
            EventProcessing::Skipped
        );
    }

    #[tokio::test]
    async fn settlement_for_missing_payment_fails_immediately() {
        let paid = payment("PLAN-ABCDEFG", PaymentStatus::Success);
        let settlement = pending_event("payment_settled", &paid);

        let mut payment_repo = MockPaymentRepository::new();
        payment_repo.expect_find_by_id().returning(|_| Ok(None));
        let mut event_repo = MockBillingEventRepository::new();
        event_repo
            .expect_mark_attempt_failed()
            .withf(|_, _, max_attempts| *max_attempts == 1)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let usecase = usecase(
            event_repo,
            payment_repo,
            MockSubscriptionRepository::new(),
            MockReferralRepository::new(),
            DEFAULT_MAX_EVENT_ATTEMPTS,
        );

        assert!(matches!(
            usecase.process_event(settlement).await,
            Err(BillingEventError::PaymentMissing(_))
        ));
    }
}
