use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{
    entities::payments::InsertPaymentEntity,
    repositories::{
        payment_gateway::{GatewayError, PaymentGateways},
        payments::{LedgerError, PaymentRepository},
        subscriptions::SubscriptionRepository,
    },
    value_objects::{
        enums::{payment_statuses::PaymentStatus, plan_types::PlanType},
        gateway_events::PushRequest,
        payments::{InitiatedPayment, PaymentPurpose, PlanPricing, normalize_msisdn},
    },
};

#[derive(Debug, Error)]
pub enum InitiationError {
    #[error("invalid phone number {0}")]
    InvalidPhone(String),
    #[error("no active auto-renewing monthly subscription for user {0}")]
    NoRenewableSubscription(Uuid),
    #[error("user {0} already has an active {1} plan that outlasts this purchase")]
    EntitlementOutlastsPlan(Uuid, String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl InitiationError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            InitiationError::InvalidPhone(_) => StatusCode::BAD_REQUEST,
            InitiationError::NoRenewableSubscription(_)
            | InitiationError::EntitlementOutlastsPlan(..) => StatusCode::CONFLICT,
            InitiationError::Gateway(GatewayError::InvalidRequest { .. }) => {
                StatusCode::BAD_REQUEST
            }
            InitiationError::Gateway(_) => StatusCode::BAD_GATEWAY,
            InitiationError::Ledger(LedgerError::DuplicateCorrelationId(_)) => StatusCode::CONFLICT,
            InitiationError::Ledger(_) | InitiationError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

pub type InitiationResult<T> = std::result::Result<T, InitiationError>;

/// Client-triggered STK push. The gateway is called first; the ledger row is
/// only written once the gateway has accepted the push.
pub struct PaymentInitiationUseCase {
    payment_repo: Arc<dyn PaymentRepository>,
    subscription_repo: Arc<dyn SubscriptionRepository>,
    gateways: Arc<PaymentGateways>,
    pricing: PlanPricing,
    currency: String,
}

impl PaymentInitiationUseCase {
    pub fn new(
        payment_repo: Arc<dyn PaymentRepository>,
        subscription_repo: Arc<dyn SubscriptionRepository>,
        gateways: Arc<PaymentGateways>,
        pricing: PlanPricing,
        currency: String,
    ) -> Self {
        Self {
            payment_repo,
            subscription_repo,
            gateways,
            pricing,
            currency,
        }
    }

    pub async fn initiate_plan_payment(
        &self,
        user_id: Uuid,
        plan_type: PlanType,
        phone_number: &str,
    ) -> InitiationResult<InitiatedPayment> {
        let subscription = self
            .subscription_repo
            .find_by_user_id(user_id)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "payments: failed to load subscription for plan purchase");
                InitiationError::Internal(err)
            })?;

        // A purchase that cannot move the period end forward would be charged for nothing.
        if let Some(current) = subscription {
            if current.outlasts(Utc::now() + plan_type.period()) {
                warn!(
                    %user_id,
                    plan = %plan_type,
                    current_plan = %current.plan_id,
                    period_end = %current.current_period_end,
                    "payments: plan purchase rejected, current entitlement runs longer"
                );
                return Err(InitiationError::EntitlementOutlastsPlan(
                    user_id,
                    current.plan_id,
                ));
            }
        }

        self.initiate(user_id, plan_type, PaymentPurpose::Plan, phone_number)
            .await
    }

    pub async fn initiate_renewal(
        &self,
        user_id: Uuid,
        phone_number: &str,
    ) -> InitiationResult<InitiatedPayment> {
        let subscription = self
            .subscription_repo
            .find_by_user_id(user_id)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "payments: failed to load subscription for renewal");
                InitiationError::Internal(err)
            })?;

        let renewable = subscription
            .as_ref()
            .map(|subscription| {
                subscription.is_renewable()
                    && PlanType::from_str(&subscription.plan_id) == Some(PlanType::Monthly)
            })
            .unwrap_or(false);
        if !renewable {
            warn!(%user_id, "payments: renewal requested without a renewable subscription");
            return Err(InitiationError::NoRenewableSubscription(user_id));
        }

        self.initiate(user_id, PlanType::Monthly, PaymentPurpose::Renewal, phone_number)
            .await
    }

    async fn initiate(
        &self,
        user_id: Uuid,
        plan_type: PlanType,
        purpose: PaymentPurpose,
        phone_number: &str,
    ) -> InitiationResult<InitiatedPayment> {
        let phone_number = normalize_msisdn(phone_number)
            .ok_or_else(|| InitiationError::InvalidPhone(phone_number.to_string()))?;

        let amount = self.pricing.price_for(plan_type);
        let account_reference = purpose.new_reference();
        let gateway = self.gateways.primary();

        info!(
            %user_id,
            plan = %plan_type,
            amount,
            %account_reference,
            provider = %gateway.provider(),
            "payments: initiating push payment"
        );

        let receipt = gateway
            .initiate_push(PushRequest {
                amount,
                phone_number,
                account_reference: account_reference.clone(),
                transaction_desc: format!("{} plan", plan_type),
            })
            .await
            .map_err(|err| {
                error!(%user_id, %account_reference, error = %err, "payments: push initiation failed");
                InitiationError::Gateway(err)
            })?;

        let payment = self
            .payment_repo
            .create(InsertPaymentEntity {
                correlation_id: receipt.correlation_id.clone(),
                user_id,
                amount,
                currency: self.currency.clone(),
                plan_type: plan_type.to_string(),
                account_reference: account_reference.clone(),
                provider: gateway.provider().to_string(),
                status: PaymentStatus::Pending.to_string(),
            })
            .await
            .map_err(|err| {
                // The push already reached the phone; a callback for it will be logged as unknown.
                error!(
                    %user_id,
                    correlation_id = %receipt.correlation_id,
                    error = %err,
                    "payments: failed to record pending payment"
                );
                InitiationError::Ledger(err)
            })?;

        info!(
            %user_id,
            payment_id = %payment.id,
            correlation_id = %payment.correlation_id,
            "payments: pending payment recorded"
        );

        Ok(InitiatedPayment {
            payment_id: payment.id,
            correlation_id: payment.correlation_id,
            account_reference,
            amount,
            status: PaymentStatus::Pending,
            response_description: receipt.response_description,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::domain::{
        entities::{payments::PaymentEntity, subscriptions::SubscriptionEntity},
        repositories::{
            payment_gateway::MockPaymentGateway, payments::MockPaymentRepository,
            subscriptions::MockSubscriptionRepository,
        },
        value_objects::{
            enums::{gateway_providers::GatewayProvider, subscription_statuses::SubscriptionStatus},
            gateway_events::PushReceipt,
        },
    };

    const PRICING: PlanPricing = PlanPricing {
        monthly: 1999,
        lifetime: 19999,
    };

    fn usecase(
        payment_repo: MockPaymentRepository,
        subscription_repo: MockSubscriptionRepository,
        gateway: MockPaymentGateway,
    ) -> PaymentInitiationUseCase {
        PaymentInitiationUseCase::new(
            Arc::new(payment_repo),
            Arc::new(subscription_repo),
            Arc::new(PaymentGateways::new(Arc::new(gateway))),
            PRICING,
            "KES".to_string(),
        )
    }

    fn no_subscription() -> MockSubscriptionRepository {
        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_find_by_user_id()
            .returning(|_| Ok(None));
        subscription_repo
    }

    fn subscription(
        user_id: Uuid,
        plan_type: PlanType,
        status: SubscriptionStatus,
        period_end: chrono::DateTime<Utc>,
    ) -> SubscriptionEntity {
        let now = Utc::now();
        SubscriptionEntity {
            id: Uuid::new_v4(),
            user_id,
            plan_id: plan_type.to_string(),
            status: status.to_string(),
            current_period_start: now - Duration::days(10),
            current_period_end: period_end,
            trial_ends_at: None,
            extra_storage_gb: 0,
            pages_used: 0,
            storage_used_mb: 0,
            auto_renew: plan_type.auto_renews() && status == SubscriptionStatus::Active,
            payment_method: "mpesa".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn gateway() -> MockPaymentGateway {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_provider()
            .return_const(GatewayProvider::Daraja);
        gateway
    }

    fn stored(insert: InsertPaymentEntity) -> PaymentEntity {
        PaymentEntity {
            id: Uuid::new_v4(),
            correlation_id: insert.correlation_id,
            user_id: insert.user_id,
            amount: insert.amount,
            currency: insert.currency,
            plan_type: insert.plan_type,
            account_reference: insert.account_reference,
            provider: insert.provider,
            status: insert.status,
            raw_callback: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn accepted_push_records_pending_payment() {
        let user_id = Uuid::new_v4();
        let mut gateway = gateway();
        gateway
            .expect_initiate_push()
            .withf(|request| {
                request.amount == 1999
                    && request.phone_number == "254712345678"
                    && request.account_reference.starts_with("PLAN-")
            })
            .times(1)
            .returning(|_| {
                Ok(PushReceipt {
                    correlation_id: "ws_CO_1".to_string(),
                    provider_status: "0".to_string(),
                    response_description: Some("Success. Request accepted for processing".to_string()),
                })
            });
        let mut payment_repo = MockPaymentRepository::new();
        payment_repo
            .expect_create()
            .withf(move |insert| {
                insert.user_id == user_id
                    && insert.correlation_id == "ws_CO_1"
                    && insert.status == "pending"
                    && insert.provider == "daraja"
                    && insert.plan_type == "monthly"
            })
            .times(1)
            .returning(|insert| Ok(stored(insert)));

        let initiated = usecase(payment_repo, no_subscription(), gateway)
            .initiate_plan_payment(user_id, PlanType::Monthly, "0712 345 678")
            .await
            .unwrap();

        assert_eq!(initiated.correlation_id, "ws_CO_1");
        assert_eq!(initiated.status, PaymentStatus::Pending);
        assert_eq!(initiated.amount, 1999);
    }

    #[tokio::test]
    async fn gateway_outage_leaves_no_ledger_row() {
        let mut gateway = gateway();
        gateway.expect_initiate_push().returning(|_| {
            Err(GatewayError::Unavailable {
                provider: GatewayProvider::Daraja,
                context: "stk push".to_string(),
                message: "timed out".to_string(),
            })
        });
        let mut payment_repo = MockPaymentRepository::new();
        payment_repo.expect_create().never();

        let result = usecase(payment_repo, no_subscription(), gateway)
            .initiate_plan_payment(Uuid::new_v4(), PlanType::Lifetime, "0712345678")
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn invalid_phone_never_reaches_gateway() {
        let mut gateway = gateway();
        gateway.expect_initiate_push().never();

        let result = usecase(MockPaymentRepository::new(), no_subscription(), gateway)
            .initiate_plan_payment(Uuid::new_v4(), PlanType::Monthly, "12345")
            .await;

        assert!(matches!(result, Err(InitiationError::InvalidPhone(_))));
    }

    #[tokio::test]
    async fn duplicate_correlation_id_is_a_conflict() {
        let mut gateway = gateway();
        gateway.expect_initiate_push().returning(|_| {
            Ok(PushReceipt {
                correlation_id: "ws_CO_dup".to_string(),
                provider_status: "0".to_string(),
                response_description: None,
            })
        });
        let mut payment_repo = MockPaymentRepository::new();
        payment_repo
            .expect_create()
            .returning(|insert| Err(LedgerError::DuplicateCorrelationId(insert.correlation_id)));

        let err = usecase(payment_repo, no_subscription(), gateway)
            .initiate_plan_payment(Uuid::new_v4(), PlanType::Monthly, "0712345678")
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn renewal_requires_active_auto_renewing_subscription() {
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo.expect_find_by_user_id().returning(move |user_id| {
            Ok(Some(subscription(
                user_id,
                PlanType::Monthly,
                SubscriptionStatus::Cancelled,
                now + Duration::days(20),
            )))
        });
        let mut gateway = gateway();
        gateway.expect_initiate_push().never();

        let result = usecase(MockPaymentRepository::new(), subscription_repo, gateway)
            .initiate_renewal(user_id, "0712345678")
            .await;

        assert!(matches!(result, Err(InitiationError::NoRenewableSubscription(id)) if id == user_id));
    }

    #[tokio::test]
    async fn plan_purchase_that_cannot_extend_active_entitlement_is_rejected() {
        let user_id = Uuid::new_v4();
        let lifetime_end = Utc::now() + PlanType::Lifetime.period();
        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo.expect_find_by_user_id().returning(move |user_id| {
            Ok(Some(subscription(
                user_id,
                PlanType::Lifetime,
                SubscriptionStatus::Active,
                lifetime_end,
            )))
        });
        let mut gateway = gateway();
        gateway.expect_initiate_push().never();
        let mut payment_repo = MockPaymentRepository::new();
        payment_repo.expect_create().never();

        let err = usecase(payment_repo, subscription_repo, gateway)
            .initiate_plan_payment(user_id, PlanType::Monthly, "0712345678")
            .await
            .unwrap_err();

        assert!(matches!(err, InitiationError::EntitlementOutlastsPlan(id, _) if id == user_id));
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn active_monthly_user_may_buy_a_longer_plan() {
        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo.expect_find_by_user_id().returning(|user_id| {
            Ok(Some(subscription(
                user_id,
                PlanType::Monthly,
                SubscriptionStatus::Active,
                Utc::now() + Duration::days(12),
            )))
        });
        let mut gateway = gateway();
        gateway.expect_initiate_push().times(1).returning(|_| {
            Ok(PushReceipt {
                correlation_id: "ws_CO_upgrade".to_string(),
                provider_status: "0".to_string(),
                response_description: None,
            })
        });
        let mut payment_repo = MockPaymentRepository::new();
        payment_repo
            .expect_create()
            .times(1)
            .returning(|insert| Ok(stored(insert)));

        let initiated = usecase(payment_repo, subscription_repo, gateway)
            .initiate_plan_payment(Uuid::new_v4(), PlanType::Lifetime, "0712345678")
            .await
            .unwrap();

        assert_eq!(initiated.amount, 19999);
    }
}
