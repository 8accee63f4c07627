use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::{
        entities::payments::PaymentEntity,
        value_objects::enums::billing_event_statuses::{BillingEventStatus, BillingEventType},
    },
    infrastructure::postgres::schema::billing_events,
};

/// Outbox row written in the same transaction as the state change it announces.
#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = billing_events)]
pub struct BillingEventEntity {
    pub id: Uuid,
    pub event_type: String,
    pub user_id: Uuid,
    pub payment_id: Uuid,
    pub amount: i64,
    pub product_id: String,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = billing_events)]
pub struct InsertBillingEventEntity {
    pub event_type: String,
    pub user_id: Uuid,
    pub payment_id: Uuid,
    pub amount: i64,
    pub product_id: String,
    pub status: String,
}

impl InsertBillingEventEntity {
    /// Written with the ledger transition; drives the entitlement change.
    pub fn payment_settled(payment: &PaymentEntity) -> Self {
        Self::pending(BillingEventType::PaymentSettled, payment, &payment.plan_type)
    }

    /// Written with a user's first activation; drives the commission.
    pub fn subscription_activated(payment: &PaymentEntity, product_id: &str) -> Self {
        Self::pending(BillingEventType::SubscriptionActivated, payment, product_id)
    }

    fn pending(event_type: BillingEventType, payment: &PaymentEntity, product_id: &str) -> Self {
        Self {
            event_type: event_type.to_string(),
            user_id: payment.user_id,
            payment_id: payment.id,
            amount: payment.amount,
            product_id: product_id.to_string(),
            status: BillingEventStatus::Pending.to_string(),
        }
    }
}
