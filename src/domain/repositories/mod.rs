pub mod billing_events;
pub mod payment_gateway;
pub mod payments;
pub mod referrals;
pub mod subscriptions;
pub mod users;
