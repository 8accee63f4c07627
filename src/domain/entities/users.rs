use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::enums::user_roles::UserRole,
    infrastructure::postgres::schema::users,
};

/// The slice of the user record billing reads and writes. Everything else on
/// the row belongs to the dashboard.
#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = users)]
pub struct UserEntity {
    pub id: Uuid,
    pub role: String,
    pub has_paid: bool,
    pub is_locked: bool,
    pub plan: Option<String>,
    pub subscription_expires_at: Option<DateTime<Utc>>,
    pub available_balance: i64,
    pub total_earned: i64,
}

impl UserEntity {
    pub fn is_affiliate(&self) -> bool {
        UserRole::from_str(&self.role) == Some(UserRole::Affiliate)
    }
}
