use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    application::usercases::{
        billing_events::{BillingEventUseCase, EventProcessing},
        subscription_lifecycle::LifecycleEffect,
    },
    domain::{
        entities::billing_events::BillingEventEntity,
        repositories::{payment_gateway::PaymentGateways, payments::PaymentRepository},
        value_objects::{
            enums::{gateway_providers::GatewayProvider, payment_statuses::PaymentStatus},
            gateway_events::GatewayEvent,
            payments::{PaymentStatusView, TransitionOutcome},
        },
    },
};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("webhook signature verification failed")]
    InvalidSignature,
    #[error("malformed callback payload: {0}")]
    MalformedPayload(String),
    #[error("unknown payment provider {0}")]
    UnknownProvider(String),
    #[error("payment {0} not found")]
    PaymentNotFound(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ReconcileError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            ReconcileError::InvalidSignature => StatusCode::UNAUTHORIZED,
            ReconcileError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            ReconcileError::UnknownProvider(_) | ReconcileError::PaymentNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ReconcileError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type ReconcileResult<T> = std::result::Result<T, ReconcileError>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Applied {
        payment_id: Uuid,
        status: PaymentStatus,
        effect: LifecycleEffect,
    },
    Duplicate {
        payment_id: Uuid,
        status: PaymentStatus,
    },
    UnknownPayment,
    StillPending,
}

pub struct PaymentReconciliationUseCase {
    payment_repo: Arc<dyn PaymentRepository>,
    gateways: Arc<PaymentGateways>,
    billing_events: Arc<BillingEventUseCase>,
}

impl PaymentReconciliationUseCase {
    pub fn new(
        payment_repo: Arc<dyn PaymentRepository>,
        gateways: Arc<PaymentGateways>,
        billing_events: Arc<BillingEventUseCase>,
    ) -> Self {
        Self {
            payment_repo,
            gateways,
            billing_events,
        }
    }

    /// Verifies, parses and reconciles one raw gateway callback.
    pub async fn handle_webhook(
        &self,
        provider: &str,
        payload: &[u8],
        signature: Option<&str>,
    ) -> ReconcileResult<ReconcileOutcome> {
        let gateway = GatewayProvider::from_str(provider)
            .and_then(|provider| self.gateways.get(provider))
            .ok_or_else(|| {
                warn!(provider, "reconciliation: webhook for unconfigured provider");
                ReconcileError::UnknownProvider(provider.to_string())
            })?;

        if !gateway.verify_signature(payload, signature.unwrap_or_default()) {
            warn!(
                provider = %gateway.provider(),
                signature_present = signature.is_some(),
                "reconciliation: webhook signature rejected"
            );
            return Err(ReconcileError::InvalidSignature);
        }

        let event = gateway.parse_callback(payload).map_err(|err| {
            warn!(
                provider = %gateway.provider(),
                error = %err,
                "reconciliation: malformed webhook payload"
            );
            ReconcileError::MalformedPayload(err.to_string())
        })?;

        self.reconcile(event).await
    }

    /// Applies a normalized event exactly once. Replays, late events and
    /// unknown correlation ids all succeed without touching state.
    ///
    /// The entitlement change rides on the `payment_settled` outbox row
    /// committed with the transition: it is applied inline here and, if that
    /// fails, retried by the billing worker.
    pub async fn reconcile(&self, event: GatewayEvent) -> ReconcileResult<ReconcileOutcome> {
        let correlation_id = event.transaction_id.clone();
        info!(
            %correlation_id,
            status = %event.status,
            result_code = ?event.result_code,
            "reconciliation: event received"
        );

        if !event.status.is_terminal() {
            return Ok(ReconcileOutcome::StillPending);
        }

        let transition = self
            .payment_repo
            .transition_if_pending(&correlation_id, event.status, Some(event.raw))
            .await
            .map_err(|err| {
                error!(
                    %correlation_id,
                    db_error = ?err,
                    "reconciliation: ledger transition failed"
                );
                ReconcileError::Internal(err)
            })?;

        match transition {
            TransitionOutcome::NotFound => {
                warn!(%correlation_id, "reconciliation: no payment for correlation id");
                Ok(ReconcileOutcome::UnknownPayment)
            }
            TransitionOutcome::AlreadyTerminal(payment) => {
                info!(
                    %correlation_id,
                    status = %payment.status,
                    incoming_status = %event.status,
                    "reconciliation: payment already terminal, ignoring event"
                );
                Ok(ReconcileOutcome::Duplicate {
                    payment_id: payment.id,
                    status: payment.payment_status().unwrap_or(event.status),
                })
            }
            TransitionOutcome::Applied {
                payment,
                settlement,
            } => {
                let effect = self.apply_settlement(settlement).await;
                info!(
                    %correlation_id,
                    payment_id = %payment.id,
                    status = %event.status,
                    effect = ?effect,
                    "reconciliation: payment transitioned"
                );
                Ok(ReconcileOutcome::Applied {
                    payment_id: payment.id,
                    status: event.status,
                    effect,
                })
            }
        }
    }

    /// Status read for the client. Only a still-pending payment triggers a
    /// gateway poll, and a conclusive poll result goes through `reconcile`.
    pub async fn refresh_from_poll(&self, correlation_id: &str) -> ReconcileResult<PaymentStatusView> {
        let payment = self
            .payment_repo
            .find_by_correlation_id(correlation_id)
            .await
            .map_err(|err| {
                error!(%correlation_id, db_error = ?err, "reconciliation: failed to load payment");
                ReconcileError::Internal(err)
            })?
            .ok_or_else(|| ReconcileError::PaymentNotFound(correlation_id.to_string()))?;

        let status = payment.payment_status().unwrap_or_default();
        if status.is_terminal() {
            return Ok(PaymentStatusView {
                correlation_id: payment.correlation_id,
                status,
                result_code: None,
                result_desc: None,
            });
        }

        let Some(gateway) = GatewayProvider::from_str(&payment.provider)
            .and_then(|provider| self.gateways.get(provider))
        else {
            warn!(
                %correlation_id,
                provider = %payment.provider,
                "reconciliation: payment provider no longer configured, cannot poll"
            );
            return Ok(PaymentStatusView {
                correlation_id: payment.correlation_id,
                status,
                result_code: None,
                result_desc: None,
            });
        };

        let polled = match gateway.poll_status(correlation_id).await {
            Ok(polled) => polled,
            Err(err) => {
                warn!(%correlation_id, error = %err, "reconciliation: status poll failed");
                return Ok(PaymentStatusView {
                    correlation_id: payment.correlation_id,
                    status,
                    result_code: None,
                    result_desc: None,
                });
            }
        };

        let status = match self
            .reconcile(GatewayEvent::from_poll(correlation_id, &polled))
            .await?
        {
            ReconcileOutcome::Applied { status, .. } | ReconcileOutcome::Duplicate { status, .. } => {
                status
            }
            ReconcileOutcome::StillPending | ReconcileOutcome::UnknownPayment => status,
        };

        Ok(PaymentStatusView {
            correlation_id: payment.correlation_id,
            status,
            result_code: polled.result_code,
            result_desc: polled.result_desc,
        })
    }

    async fn apply_settlement(&self, settlement: BillingEventEntity) -> LifecycleEffect {
        let event_id = settlement.id;
        match self.billing_events.process_event(settlement).await {
            Ok(EventProcessing::Settled(effect)) => effect,
            Ok(_) => LifecycleEffect::Deferred {
                reason: "settled by another consumer".to_string(),
            },
            Err(err) => {
                warn!(
                    %event_id,
                    error = ?err,
                    "reconciliation: entitlement change deferred to billing worker"
                );
                LifecycleEffect::Deferred {
                    reason: err.to_string(),
                }
            }
        }
    }
}
