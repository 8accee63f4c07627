use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::enums::{
        payment_statuses::PaymentStatus, plan_types::PlanType,
    },
    infrastructure::postgres::schema::payments,
};

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = payments)]
pub struct PaymentEntity {
    pub id: Uuid,
    pub correlation_id: String,
    pub user_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub plan_type: String,
    pub account_reference: String,
    pub provider: String,
    pub status: String,
    pub raw_callback: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentEntity {
    pub fn payment_status(&self) -> Option<PaymentStatus> {
        PaymentStatus::from_str(&self.status)
    }

    pub fn plan(&self) -> Option<PlanType> {
        PlanType::from_str(&self.plan_type)
    }
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = payments)]
pub struct InsertPaymentEntity {
    pub correlation_id: String,
    pub user_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub plan_type: String,
    pub account_reference: String,
    pub provider: String,
    pub status: String,
}
