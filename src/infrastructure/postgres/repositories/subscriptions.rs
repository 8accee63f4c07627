use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{prelude::*, result::Error as DieselError};
use uuid::Uuid;

use crate::{
    domain::{
        entities::{
            billing_events::{BillingEventEntity, InsertBillingEventEntity},
            subscriptions::{InsertSubscriptionEntity, SubscriptionEntity},
        },
        repositories::subscriptions::SubscriptionRepository,
        value_objects::{
            enums::{
                billing_event_statuses::BillingEventStatus,
                subscription_statuses::SubscriptionStatus,
            },
            subscriptions::{ActivatedSubscription, SettlementWrite, SubscriptionActivation},
        },
    },
    infrastructure::postgres::{
        postgres_connection::PgPoolSquad,
        schema::{billing_events, subscriptions, users},
    },
};

pub struct SubscriptionPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl SubscriptionPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

/// Marks the settlement event processed. The row lock makes a concurrent
/// claimer wait for this transaction and then match nothing.
fn claim_settlement(conn: &mut PgConnection, settlement_id: Uuid) -> QueryResult<bool> {
    let claimed = diesel::update(billing_events::table)
        .filter(billing_events::id.eq(settlement_id))
        .filter(billing_events::status.eq(BillingEventStatus::Pending.to_string()))
        .set((
            billing_events::status.eq(BillingEventStatus::Processed.to_string()),
            billing_events::processed_at.eq(Some(Utc::now())),
            billing_events::last_error.eq::<Option<String>>(None),
        ))
        .execute(conn)?;

    Ok(claimed == 1)
}

/// A guard miss aborts with `RollbackTransaction` so the claim is undone too.
fn settled<T>(result: Result<SettlementWrite<T>, DieselError>) -> Result<SettlementWrite<T>> {
    match result {
        Err(DieselError::RollbackTransaction) => Ok(SettlementWrite::Rejected),
        other => Ok(other?),
    }
}

#[async_trait]
impl SubscriptionRepository for SubscriptionPostgres {
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let subscription = subscriptions::table
            .filter(subscriptions::user_id.eq(user_id))
            .select(SubscriptionEntity::as_select())
            .first::<SubscriptionEntity>(&mut conn)
            .optional()?;

        Ok(subscription)
    }

    async fn activate(
        &self,
        activation: SubscriptionActivation,
        settlement_id: Uuid,
        first_activation_event: InsertBillingEventEntity,
    ) -> Result<SettlementWrite<ActivatedSubscription>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let now = Utc::now();

        let activated = conn.transaction::<_, DieselError, _>(|conn| {
            if !claim_settlement(conn, settlement_id)? {
                return Ok(SettlementWrite::AlreadySettled);
            }

            let existing = subscriptions::table
                .filter(subscriptions::user_id.eq(activation.user_id))
                .select(SubscriptionEntity::as_select())
                .for_update()
                .first::<SubscriptionEntity>(conn)
                .optional()?;
            let first_activation = existing.is_none();
            let activation = activation.preserving_longer(existing.as_ref());

            let subscription = match existing {
                Some(current) => diesel::update(subscriptions::table.find(current.id))
                    .set((
                        subscriptions::plan_id.eq(&activation.plan_id),
                        subscriptions::status.eq(SubscriptionStatus::Active.to_string()),
                        subscriptions::current_period_start.eq(activation.current_period_start),
                        subscriptions::current_period_end.eq(activation.current_period_end),
                        subscriptions::auto_renew.eq(activation.auto_renew),
                        subscriptions::payment_method.eq(&activation.payment_method),
                        subscriptions::updated_at.eq(now),
                    ))
                    .returning(SubscriptionEntity::as_returning())
                    .get_result::<SubscriptionEntity>(conn)?,
                None => diesel::insert_into(subscriptions::table)
                    .values(&InsertSubscriptionEntity {
                        user_id: activation.user_id,
                        plan_id: activation.plan_id.clone(),
                        status: SubscriptionStatus::Active.to_string(),
                        current_period_start: activation.current_period_start,
                        current_period_end: activation.current_period_end,
                        auto_renew: activation.auto_renew,
                        payment_method: activation.payment_method.clone(),
                    })
                    .returning(SubscriptionEntity::as_returning())
                    .get_result::<SubscriptionEntity>(conn)?,
            };

            diesel::update(users::table.find(activation.user_id))
                .set((
                    users::has_paid.eq(true),
                    users::is_locked.eq(false),
                    users::plan.eq(Some(activation.plan_id.clone())),
                    users::subscription_expires_at.eq(Some(activation.current_period_end)),
                ))
                .execute(conn)?;

            let event = if first_activation {
                let event = diesel::insert_into(billing_events::table)
                    .values(&first_activation_event)
                    .returning(BillingEventEntity::as_returning())
                    .get_result::<BillingEventEntity>(conn)?;
                Some(event)
            } else {
                None
            };

            Ok(SettlementWrite::Applied(ActivatedSubscription {
                subscription,
                first_activation,
                event,
            }))
        });

        settled(activated)
    }

    async fn extend_period(
        &self,
        user_id: Uuid,
        expected_period_end: DateTime<Utc>,
        new_period_end: DateTime<Utc>,
        settlement_id: Uuid,
    ) -> Result<SettlementWrite<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let extended = conn.transaction::<_, DieselError, _>(|conn| {
            if !claim_settlement(conn, settlement_id)? {
                return Ok(SettlementWrite::AlreadySettled);
            }

            let extended = diesel::update(subscriptions::table)
                .filter(subscriptions::user_id.eq(user_id))
                .filter(subscriptions::status.eq(SubscriptionStatus::Active.to_string()))
                .filter(subscriptions::auto_renew.eq(true))
                .filter(subscriptions::current_period_end.eq(expected_period_end))
                .set((
                    subscriptions::current_period_end.eq(new_period_end),
                    subscriptions::updated_at.eq(Utc::now()),
                ))
                .returning(SubscriptionEntity::as_returning())
                .get_result::<SubscriptionEntity>(conn)
                .optional()?
                .ok_or(DieselError::RollbackTransaction)?;

            diesel::update(users::table.find(user_id))
                .set(users::subscription_expires_at.eq(Some(new_period_end)))
                .execute(conn)?;

            Ok(SettlementWrite::Applied(extended))
        });

        settled(extended)
    }

    async fn expire_for_renewal_failure(
        &self,
        user_id: Uuid,
        settlement_id: Uuid,
    ) -> Result<SettlementWrite<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let expired = conn.transaction::<_, DieselError, _>(|conn| {
            if !claim_settlement(conn, settlement_id)? {
                return Ok(SettlementWrite::AlreadySettled);
            }

            let expired = diesel::update(subscriptions::table)
                .filter(subscriptions::user_id.eq(user_id))
                .filter(subscriptions::status.eq(SubscriptionStatus::Active.to_string()))
                .filter(subscriptions::auto_renew.eq(true))
                .set((
                    subscriptions::status.eq(SubscriptionStatus::Expired.to_string()),
                    subscriptions::updated_at.eq(Utc::now()),
                ))
                .returning(SubscriptionEntity::as_returning())
                .get_result::<SubscriptionEntity>(conn)
                .optional()?
                .ok_or(DieselError::RollbackTransaction)?;

            // has_paid stays as it is: the user did pay at some point.
            diesel::update(users::table.find(user_id))
                .set(users::is_locked.eq(true))
                .execute(conn)?;

            Ok(SettlementWrite::Applied(expired))
        });

        settled(expired)
    }

    async fn cancel_auto_renew(&self, user_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let cancelled = diesel::update(subscriptions::table)
            .filter(subscriptions::user_id.eq(user_id))
            .filter(subscriptions::status.eq(SubscriptionStatus::Active.to_string()))
            .set((
                subscriptions::status.eq(SubscriptionStatus::Cancelled.to_string()),
                subscriptions::auto_renew.eq(false),
                subscriptions::updated_at.eq(Utc::now()),
            ))
            .returning(SubscriptionEntity::as_returning())
            .get_result::<SubscriptionEntity>(&mut conn)
            .optional()?;

        Ok(cancelled)
    }

    async fn expire_lapsed(&self, cutoff: DateTime<Utc>) -> Result<Vec<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let expired = conn.transaction::<Vec<SubscriptionEntity>, diesel::result::Error, _>(|conn| {
            let expired = diesel::update(subscriptions::table)
                .filter(subscriptions::status.eq_any(vec![
                    SubscriptionStatus::Active.to_string(),
                    SubscriptionStatus::Cancelled.to_string(),
                ]))
                .filter(subscriptions::current_period_end.lt(cutoff))
                .set((
                    subscriptions::status.eq(SubscriptionStatus::Expired.to_string()),
                    subscriptions::updated_at.eq(Utc::now()),
                ))
                .returning(SubscriptionEntity::as_returning())
                .get_results::<SubscriptionEntity>(conn)?;

            let user_ids: Vec<Uuid> = expired.iter().map(|subscription| subscription.user_id).collect();
            if !user_ids.is_empty() {
                diesel::update(users::table.filter(users::id.eq_any(user_ids)))
                    .set(users::is_locked.eq(true))
                    .execute(conn)?;
            }

            Ok(expired)
        })?;

        Ok(expired)
    }
}
