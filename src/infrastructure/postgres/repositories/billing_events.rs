use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::{
        entities::billing_events::BillingEventEntity,
        repositories::billing_events::BillingEventRepository,
        value_objects::enums::billing_event_statuses::BillingEventStatus,
    },
    infrastructure::postgres::{postgres_connection::PgPoolSquad, schema::billing_events},
};

pub struct BillingEventPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl BillingEventPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl BillingEventRepository for BillingEventPostgres {
    async fn list_pending(&self, limit: i64) -> Result<Vec<BillingEventEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let events = billing_events::table
            .filter(billing_events::status.eq(BillingEventStatus::Pending.to_string()))
            .order(billing_events::created_at.asc())
            .limit(limit)
            .select(BillingEventEntity::as_select())
            .load::<BillingEventEntity>(&mut conn)?;

        Ok(events)
    }

    async fn mark_processed(&self, event_id: Uuid) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        diesel::update(billing_events::table)
            .filter(billing_events::id.eq(event_id))
            .filter(billing_events::status.eq(BillingEventStatus::Pending.to_string()))
            .set((
                billing_events::status.eq(BillingEventStatus::Processed.to_string()),
                billing_events::processed_at.eq(Some(Utc::now())),
                billing_events::last_error.eq::<Option<String>>(None),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    async fn mark_attempt_failed(
        &self,
        event_id: Uuid,
        error: String,
        max_attempts: i32,
    ) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let pending = BillingEventStatus::Pending.to_string();

        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            diesel::update(billing_events::table)
                .filter(billing_events::id.eq(event_id))
                .filter(billing_events::status.eq(&pending))
                .set((
                    billing_events::attempts.eq(billing_events::attempts + 1),
                    billing_events::last_error.eq(Some(error)),
                ))
                .execute(conn)?;

            diesel::update(billing_events::table)
                .filter(billing_events::id.eq(event_id))
                .filter(billing_events::status.eq(&pending))
                .filter(billing_events::attempts.ge(max_attempts))
                .set(billing_events::status.eq(BillingEventStatus::Failed.to_string()))
                .execute(conn)?;

            Ok(())
        })?;

        Ok(())
    }
}
