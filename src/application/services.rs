use std::sync::Arc;

use chrono::Duration;

use crate::{
    application::usercases::{
        billing_events::BillingEventUseCase, commissions::CommissionUseCase,
        payment_initiation::PaymentInitiationUseCase,
        payment_reconciliation::PaymentReconciliationUseCase,
        subscription_lifecycle::SubscriptionLifecycleUseCase,
    },
    domain::{
        repositories::{
            billing_events::BillingEventRepository, payment_gateway::PaymentGateways,
            payments::PaymentRepository, referrals::ReferralRepository,
            subscriptions::SubscriptionRepository, users::UserRepository,
        },
        value_objects::{commissions::CommissionRate, payments::PlanPricing},
    },
};

/// Storage handles, constructed once at startup and shared by every usecase.
#[derive(Clone)]
pub struct BillingStores {
    pub payments: Arc<dyn PaymentRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub referrals: Arc<dyn ReferralRepository>,
    pub users: Arc<dyn UserRepository>,
    pub billing_events: Arc<dyn BillingEventRepository>,
}

#[derive(Debug, Clone)]
pub struct BillingSettings {
    pub pricing: PlanPricing,
    pub currency: String,
    pub commission_rate: CommissionRate,
    pub max_event_attempts: i32,
    pub expiry_grace: Duration,
}

#[derive(Clone)]
pub struct BillingServices {
    pub initiation: Arc<PaymentInitiationUseCase>,
    pub reconciliation: Arc<PaymentReconciliationUseCase>,
    pub lifecycle: Arc<SubscriptionLifecycleUseCase>,
    pub commissions: Arc<CommissionUseCase>,
    pub billing_events: Arc<BillingEventUseCase>,
    pub settings: BillingSettings,
}

impl BillingServices {
    pub fn new(stores: BillingStores, gateways: Arc<PaymentGateways>, settings: BillingSettings) -> Self {
        let lifecycle = Arc::new(SubscriptionLifecycleUseCase::new(Arc::clone(
            &stores.subscriptions,
        )));
        let commissions = Arc::new(CommissionUseCase::new(
            Arc::clone(&stores.referrals),
            Arc::clone(&stores.users),
        ));
        let billing_events = Arc::new(BillingEventUseCase::new(
            Arc::clone(&stores.billing_events),
            Arc::clone(&stores.payments),
            Arc::clone(&lifecycle),
            Arc::clone(&commissions),
            settings.commission_rate,
            settings.max_event_attempts,
        ));
        let reconciliation = Arc::new(PaymentReconciliationUseCase::new(
            Arc::clone(&stores.payments),
            Arc::clone(&gateways),
            Arc::clone(&billing_events),
        ));
        let initiation = Arc::new(PaymentInitiationUseCase::new(
            Arc::clone(&stores.payments),
            Arc::clone(&stores.subscriptions),
            gateways,
            settings.pricing,
            settings.currency.clone(),
        ));

        Self {
            initiation,
            reconciliation,
            lifecycle,
            commissions,
            billing_events,
            settings,
        }
    }
}
