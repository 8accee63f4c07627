use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    entities::payments::{InsertPaymentEntity, PaymentEntity},
    value_objects::{enums::payment_statuses::PaymentStatus, payments::TransitionOutcome},
};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("payment with correlation id {0} already exists")]
    DuplicateCorrelationId(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Durable record of every push payment. Rows are never deleted and only
/// `transition_if_pending` changes their status.
#[automock]
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create(
        &self,
        insert_payment_entity: InsertPaymentEntity,
    ) -> Result<PaymentEntity, LedgerError>;

    async fn find_by_id(&self, payment_id: Uuid) -> Result<Option<PaymentEntity>>;

    async fn find_by_correlation_id(&self, correlation_id: &str) -> Result<Option<PaymentEntity>>;

    /// Atomically moves a `pending` row to `status` and appends its
    /// `payment_settled` outbox event in the same transaction. Terminal rows
    /// are returned untouched as `AlreadyTerminal`.
    async fn transition_if_pending(
        &self,
        correlation_id: &str,
        status: PaymentStatus,
        raw_callback: Option<serde_json::Value>,
    ) -> Result<TransitionOutcome>;
}
