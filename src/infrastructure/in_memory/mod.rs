//! Process-local implementation of every billing repository, backed by one
//! mutex so each method is atomic the same way a Postgres transaction is.
//! Used by the integration tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    application::services::BillingStores,
    domain::{
        entities::{
            affiliate_earnings::AffiliateEarningsEntity,
            billing_events::{BillingEventEntity, InsertBillingEventEntity},
            payments::{InsertPaymentEntity, PaymentEntity},
            referrals::ReferralEntity,
            subscriptions::SubscriptionEntity,
            users::UserEntity,
        },
        repositories::{
            billing_events::BillingEventRepository,
            payments::{LedgerError, PaymentRepository},
            referrals::ReferralRepository,
            subscriptions::SubscriptionRepository,
            users::UserRepository,
        },
        value_objects::{
            commissions::ReferralCredit,
            enums::{
                billing_event_statuses::BillingEventStatus, payment_statuses::PaymentStatus,
                referral_statuses::ReferralPaymentStatus,
                subscription_statuses::SubscriptionStatus,
            },
            payments::TransitionOutcome,
            subscriptions::{ActivatedSubscription, SettlementWrite, SubscriptionActivation},
        },
    },
};

#[derive(Default)]
struct StoreState {
    payments: HashMap<String, PaymentEntity>,
    subscriptions: HashMap<Uuid, SubscriptionEntity>,
    referrals: Vec<ReferralEntity>,
    users: HashMap<Uuid, UserEntity>,
    earnings: HashMap<(Uuid, String), AffiliateEarningsEntity>,
    billing_events: Vec<BillingEventEntity>,
}

impl StoreState {
    fn push_event(&mut self, insert: InsertBillingEventEntity) -> BillingEventEntity {
        let event = BillingEventEntity {
            id: Uuid::new_v4(),
            event_type: insert.event_type,
            user_id: insert.user_id,
            payment_id: insert.payment_id,
            amount: insert.amount,
            product_id: insert.product_id,
            status: insert.status,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            processed_at: None,
        };
        self.billing_events.push(event.clone());
        event
    }

    fn pending_event_mut(&mut self, event_id: Uuid) -> Option<&mut BillingEventEntity> {
        let pending = BillingEventStatus::Pending.to_string();
        self.billing_events
            .iter_mut()
            .find(|event| event.id == event_id && event.status == pending)
    }

    fn is_pending(&mut self, event_id: Uuid) -> bool {
        self.pending_event_mut(event_id).is_some()
    }

    fn settle(&mut self, event_id: Uuid) {
        if let Some(event) = self.pending_event_mut(event_id) {
            event.status = BillingEventStatus::Processed.to_string();
            event.processed_at = Some(Utc::now());
            event.last_error = None;
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryBillingStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn billing_stores(&self) -> BillingStores {
        BillingStores {
            payments: Arc::new(self.clone()),
            subscriptions: Arc::new(self.clone()),
            referrals: Arc::new(self.clone()),
            users: Arc::new(self.clone()),
            billing_events: Arc::new(self.clone()),
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert_user(&self, user: UserEntity) {
        self.state().users.insert(user.id, user);
    }

    pub fn insert_referral(&self, referral: ReferralEntity) {
        self.state().referrals.push(referral);
    }

    pub fn insert_subscription(&self, subscription: SubscriptionEntity) {
        self.state()
            .subscriptions
            .insert(subscription.user_id, subscription);
    }

    pub fn user(&self, user_id: Uuid) -> Option<UserEntity> {
        self.state().users.get(&user_id).cloned()
    }

    pub fn payment(&self, correlation_id: &str) -> Option<PaymentEntity> {
        self.state().payments.get(correlation_id).cloned()
    }

    pub fn subscription(&self, user_id: Uuid) -> Option<SubscriptionEntity> {
        self.state().subscriptions.get(&user_id).cloned()
    }

    pub fn referral(&self, referral_id: Uuid) -> Option<ReferralEntity> {
        self.state()
            .referrals
            .iter()
            .find(|referral| referral.id == referral_id)
            .cloned()
    }

    pub fn billing_events(&self) -> Vec<BillingEventEntity> {
        self.state().billing_events.clone()
    }
}

#[async_trait]
impl PaymentRepository for InMemoryBillingStore {
    async fn create(
        &self,
        insert_payment_entity: InsertPaymentEntity,
    ) -> Result<PaymentEntity, LedgerError> {
        let mut state = self.state();
        if state
            .payments
            .contains_key(&insert_payment_entity.correlation_id)
        {
            return Err(LedgerError::DuplicateCorrelationId(
                insert_payment_entity.correlation_id,
            ));
        }

        let now = Utc::now();
        let payment = PaymentEntity {
            id: Uuid::new_v4(),
            correlation_id: insert_payment_entity.correlation_id,
            user_id: insert_payment_entity.user_id,
            amount: insert_payment_entity.amount,
            currency: insert_payment_entity.currency,
            plan_type: insert_payment_entity.plan_type,
            account_reference: insert_payment_entity.account_reference,
            provider: insert_payment_entity.provider,
            status: insert_payment_entity.status,
            raw_callback: None,
            created_at: now,
            updated_at: now,
        };
        state
            .payments
            .insert(payment.correlation_id.clone(), payment.clone());

        Ok(payment)
    }

    async fn find_by_id(&self, payment_id: Uuid) -> Result<Option<PaymentEntity>> {
        Ok(self
            .state()
            .payments
            .values()
            .find(|payment| payment.id == payment_id)
            .cloned())
    }

    async fn find_by_correlation_id(&self, correlation_id: &str) -> Result<Option<PaymentEntity>> {
        Ok(self.state().payments.get(correlation_id).cloned())
    }

    async fn transition_if_pending(
        &self,
        correlation_id: &str,
        status: PaymentStatus,
        raw_callback: Option<serde_json::Value>,
    ) -> Result<TransitionOutcome> {
        if !status.is_terminal() {
            anyhow::bail!("payments can only transition to a terminal status");
        }

        let mut state = self.state();
        let Some(payment) = state.payments.get_mut(correlation_id) else {
            return Ok(TransitionOutcome::NotFound);
        };

        if payment.payment_status() != Some(PaymentStatus::Pending) {
            return Ok(TransitionOutcome::AlreadyTerminal(payment.clone()));
        }

        payment.status = status.to_string();
        payment.raw_callback = raw_callback;
        payment.updated_at = Utc::now();
        let payment = payment.clone();

        let settlement = state.push_event(InsertBillingEventEntity::payment_settled(&payment));

        Ok(TransitionOutcome::Applied {
            payment,
            settlement,
        })
    }
}

#[async_trait]
impl SubscriptionRepository for InMemoryBillingStore {
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        Ok(self.state().subscriptions.get(&user_id).cloned())
    }

    async fn activate(
        &self,
        activation: SubscriptionActivation,
        settlement_id: Uuid,
        first_activation_event: InsertBillingEventEntity,
    ) -> Result<SettlementWrite<ActivatedSubscription>> {
        let mut state = self.state();
        if !state.is_pending(settlement_id) {
            return Ok(SettlementWrite::AlreadySettled);
        }

        let now = Utc::now();
        let existing = state.subscriptions.get(&activation.user_id);
        let first_activation = existing.is_none();
        let activation = activation.preserving_longer(existing);

        let subscription = state
            .subscriptions
            .entry(activation.user_id)
            .or_insert_with(|| SubscriptionEntity {
                id: Uuid::new_v4(),
                user_id: activation.user_id,
                plan_id: activation.plan_id.clone(),
                status: SubscriptionStatus::Active.to_string(),
                current_period_start: activation.current_period_start,
                current_period_end: activation.current_period_end,
                trial_ends_at: None,
                extra_storage_gb: 0,
                pages_used: 0,
                storage_used_mb: 0,
                auto_renew: activation.auto_renew,
                payment_method: activation.payment_method.clone(),
                created_at: now,
                updated_at: now,
            });
        subscription.plan_id = activation.plan_id.clone();
        subscription.status = SubscriptionStatus::Active.to_string();
        subscription.current_period_start = activation.current_period_start;
        subscription.current_period_end = activation.current_period_end;
        subscription.auto_renew = activation.auto_renew;
        subscription.payment_method = activation.payment_method.clone();
        subscription.updated_at = now;
        let subscription = subscription.clone();

        if let Some(user) = state.users.get_mut(&activation.user_id) {
            user.has_paid = true;
            user.is_locked = false;
            user.plan = Some(activation.plan_id.clone());
            user.subscription_expires_at = Some(activation.current_period_end);
        }

        let event = first_activation.then(|| state.push_event(first_activation_event));
        state.settle(settlement_id);

        Ok(SettlementWrite::Applied(ActivatedSubscription {
            subscription,
            first_activation,
            event,
        }))
    }

    async fn extend_period(
        &self,
        user_id: Uuid,
        expected_period_end: DateTime<Utc>,
        new_period_end: DateTime<Utc>,
        settlement_id: Uuid,
    ) -> Result<SettlementWrite<SubscriptionEntity>> {
        let mut state = self.state();
        if !state.is_pending(settlement_id) {
            return Ok(SettlementWrite::AlreadySettled);
        }

        let Some(subscription) = state.subscriptions.get_mut(&user_id) else {
            return Ok(SettlementWrite::Rejected);
        };
        if !subscription.is_renewable() || subscription.current_period_end != expected_period_end
        {
            return Ok(SettlementWrite::Rejected);
        }

        subscription.current_period_end = new_period_end;
        subscription.updated_at = Utc::now();
        let subscription = subscription.clone();

        if let Some(user) = state.users.get_mut(&user_id) {
            user.subscription_expires_at = Some(new_period_end);
        }
        state.settle(settlement_id);

        Ok(SettlementWrite::Applied(subscription))
    }

    async fn expire_for_renewal_failure(
        &self,
        user_id: Uuid,
        settlement_id: Uuid,
    ) -> Result<SettlementWrite<SubscriptionEntity>> {
        let mut state = self.state();
        if !state.is_pending(settlement_id) {
            return Ok(SettlementWrite::AlreadySettled);
        }

        let Some(subscription) = state.subscriptions.get_mut(&user_id) else {
            return Ok(SettlementWrite::Rejected);
        };
        if !subscription.is_renewable() {
            return Ok(SettlementWrite::Rejected);
        }

        subscription.status = SubscriptionStatus::Expired.to_string();
        subscription.updated_at = Utc::now();
        let subscription = subscription.clone();

        if let Some(user) = state.users.get_mut(&user_id) {
            user.is_locked = true;
        }
        state.settle(settlement_id);

        Ok(SettlementWrite::Applied(subscription))
    }

    async fn cancel_auto_renew(&self, user_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        let mut state = self.state();
        let Some(subscription) = state.subscriptions.get_mut(&user_id) else {
            return Ok(None);
        };
        if subscription.subscription_status() != SubscriptionStatus::Active {
            return Ok(None);
        }

        subscription.status = SubscriptionStatus::Cancelled.to_string();
        subscription.auto_renew = false;
        subscription.updated_at = Utc::now();

        Ok(Some(subscription.clone()))
    }

    async fn expire_lapsed(&self, cutoff: DateTime<Utc>) -> Result<Vec<SubscriptionEntity>> {
        let mut state = self.state();
        let now = Utc::now();

        let mut expired = Vec::new();
        for subscription in state.subscriptions.values_mut() {
            let lapsable = matches!(
                subscription.subscription_status(),
                SubscriptionStatus::Active | SubscriptionStatus::Cancelled
            );
            if lapsable && subscription.current_period_end < cutoff {
                subscription.status = SubscriptionStatus::Expired.to_string();
                subscription.updated_at = now;
                expired.push(subscription.clone());
            }
        }

        for subscription in &expired {
            if let Some(user) = state.users.get_mut(&subscription.user_id) {
                user.is_locked = true;
            }
        }

        Ok(expired)
    }
}

#[async_trait]
impl ReferralRepository for InMemoryBillingStore {
    async fn find_pending_by_client(&self, client_id: Uuid) -> Result<Option<ReferralEntity>> {
        let pending = ReferralPaymentStatus::Pending.to_string();
        Ok(self
            .state()
            .referrals
            .iter()
            .filter(|referral| referral.client_id == client_id && referral.payment_status == pending)
            .min_by_key(|referral| referral.created_at)
            .cloned())
    }

    async fn credit_referral(&self, credit: ReferralCredit) -> Result<bool> {
        let mut state = self.state();
        let pending = ReferralPaymentStatus::Pending.to_string();

        let Some(referral) = state
            .referrals
            .iter_mut()
            .find(|referral| referral.id == credit.referral_id && referral.payment_status == pending)
        else {
            return Ok(false);
        };
        referral.payment_status = ReferralPaymentStatus::Paid.to_string();
        referral.commission_earned = Some(credit.commission);
        referral.credited_at = Some(credit.credited_at);

        if let Some(affiliate) = state.users.get_mut(&credit.affiliate_id) {
            affiliate.available_balance += credit.commission;
            affiliate.total_earned += credit.commission;
        }

        let earnings = state
            .earnings
            .entry((credit.affiliate_id, credit.product_id.clone()))
            .or_insert_with(|| AffiliateEarningsEntity {
                affiliate_id: credit.affiliate_id,
                product_id: credit.product_id.clone(),
                total_commission: 0,
                paid_referrals: 0,
                updated_at: credit.credited_at,
            });
        earnings.total_commission += credit.commission;
        earnings.paid_referrals += 1;
        earnings.updated_at = credit.credited_at;

        Ok(true)
    }

    async fn find_earnings(
        &self,
        affiliate_id: Uuid,
        product_id: &str,
    ) -> Result<Option<AffiliateEarningsEntity>> {
        Ok(self
            .state()
            .earnings
            .get(&(affiliate_id, product_id.to_string()))
            .cloned())
    }
}

#[async_trait]
impl UserRepository for InMemoryBillingStore {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserEntity>> {
        Ok(self.state().users.get(&user_id).cloned())
    }
}

#[async_trait]
impl BillingEventRepository for InMemoryBillingStore {
    async fn list_pending(&self, limit: i64) -> Result<Vec<BillingEventEntity>> {
        let pending = BillingEventStatus::Pending.to_string();
        Ok(self
            .state()
            .billing_events
            .iter()
            .filter(|event| event.status == pending)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn mark_processed(&self, event_id: Uuid) -> Result<()> {
        self.state().settle(event_id);
        Ok(())
    }

    async fn mark_attempt_failed(
        &self,
        event_id: Uuid,
        error: String,
        max_attempts: i32,
    ) -> Result<()> {
        let mut state = self.state();
        let Some(event) = state.pending_event_mut(event_id) else {
            return Ok(());
        };
        event.attempts += 1;
        event.last_error = Some(error);
        if event.attempts >= max_attempts {
            event.status = BillingEventStatus::Failed.to_string();
        }
        Ok(())
    }
}
