use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infrastructure::postgres::schema::affiliate_earnings;

#[derive(Debug, Clone, PartialEq, Selectable, Queryable)]
#[diesel(table_name = affiliate_earnings)]
pub struct AffiliateEarningsEntity {
    pub affiliate_id: Uuid,
    pub product_id: String,
    pub total_commission: i64,
    pub paid_referrals: i32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = affiliate_earnings)]
pub struct InsertAffiliateEarningsEntity {
    pub affiliate_id: Uuid,
    pub product_id: String,
    pub total_commission: i64,
    pub paid_referrals: i32,
    pub updated_at: DateTime<Utc>,
}
