use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::{
    prelude::*,
    result::{DatabaseErrorKind, Error as DieselError},
};
use uuid::Uuid;

use crate::{
    domain::{
        entities::{
            billing_events::{BillingEventEntity, InsertBillingEventEntity},
            payments::{InsertPaymentEntity, PaymentEntity},
        },
        repositories::payments::{LedgerError, PaymentRepository},
        value_objects::{enums::payment_statuses::PaymentStatus, payments::TransitionOutcome},
    },
    infrastructure::postgres::{
        postgres_connection::PgPoolSquad,
        schema::{billing_events, payments},
    },
};

pub struct PaymentPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl PaymentPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl PaymentRepository for PaymentPostgres {
    async fn create(
        &self,
        insert_payment_entity: InsertPaymentEntity,
    ) -> Result<PaymentEntity, LedgerError> {
        let mut conn = Arc::clone(&self.db_pool)
            .get()
            .map_err(anyhow::Error::from)?;

        let inserted = diesel::insert_into(payments::table)
            .values(&insert_payment_entity)
            .returning(PaymentEntity::as_returning())
            .get_result::<PaymentEntity>(&mut conn);

        match inserted {
            Ok(payment) => Ok(payment),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => Err(
                LedgerError::DuplicateCorrelationId(insert_payment_entity.correlation_id),
            ),
            Err(err) => Err(LedgerError::Internal(err.into())),
        }
    }

    async fn find_by_id(&self, payment_id: Uuid) -> Result<Option<PaymentEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let payment = payments::table
            .find(payment_id)
            .select(PaymentEntity::as_select())
            .first::<PaymentEntity>(&mut conn)
            .optional()?;

        Ok(payment)
    }

    async fn find_by_correlation_id(&self, correlation_id: &str) -> Result<Option<PaymentEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let payment = payments::table
            .filter(payments::correlation_id.eq(correlation_id))
            .select(PaymentEntity::as_select())
            .first::<PaymentEntity>(&mut conn)
            .optional()?;

        Ok(payment)
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

        let mut conn = Arc::clone(&self.db_pool).get()?;

        let applied = conn.transaction::<_, DieselError, _>(|conn| {
            let payment = diesel::update(payments::table)
                .filter(payments::correlation_id.eq(correlation_id))
                .filter(payments::status.eq(PaymentStatus::Pending.to_string()))
                .set((
                    payments::status.eq(status.to_string()),
                    payments::raw_callback.eq(raw_callback),
                    payments::updated_at.eq(Utc::now()),
                ))
                .returning(PaymentEntity::as_returning())
                .get_result::<PaymentEntity>(conn)
                .optional()?;

            let Some(payment) = payment else {
                return Ok(None);
            };

            let settlement = diesel::insert_into(billing_events::table)
                .values(&InsertBillingEventEntity::payment_settled(&payment))
                .returning(BillingEventEntity::as_returning())
                .get_result::<BillingEventEntity>(conn)?;

            Ok(Some((payment, settlement)))
        })?;

        if let Some((payment, settlement)) = applied {
            return Ok(TransitionOutcome::Applied {
                payment,
                settlement,
            });
        }

        let existing = payments::table
            .filter(payments::correlation_id.eq(correlation_id))
            .select(PaymentEntity::as_select())
            .first::<PaymentEntity>(&mut conn)
            .optional()?;

        Ok(match existing {
            Some(payment) => TransitionOutcome::AlreadyTerminal(payment),
            None => TransitionOutcome::NotFound,
        })
    }
}
