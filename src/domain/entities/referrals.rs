use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infrastructure::postgres::schema::referrals;

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = referrals)]
pub struct ReferralEntity {
    pub id: Uuid,
    pub referrer_id: Uuid,
    pub client_id: Uuid,
    pub product_id: String,
    pub payment_status: String,
    pub commission_earned: Option<i64>,
    pub credited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
