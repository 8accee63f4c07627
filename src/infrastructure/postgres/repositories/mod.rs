pub mod billing_events;
pub mod payments;
pub mod referrals;
pub mod subscriptions;
pub mod users;

use std::sync::Arc;

use crate::{
    application::services::BillingStores,
    infrastructure::postgres::postgres_connection::PgPoolSquad,
};

pub fn billing_stores(db_pool: Arc<PgPoolSquad>) -> BillingStores {
    BillingStores {
        payments: Arc::new(payments::PaymentPostgres::new(Arc::clone(&db_pool))),
        subscriptions: Arc::new(subscriptions::SubscriptionPostgres::new(Arc::clone(&db_pool))),
        referrals: Arc::new(referrals::ReferralPostgres::new(Arc::clone(&db_pool))),
        users: Arc::new(users::UserPostgres::new(Arc::clone(&db_pool))),
        billing_events: Arc::new(billing_events::BillingEventPostgres::new(db_pool)),
    }
}
