pub mod affiliate_earnings;
pub mod billing_events;
pub mod payments;
pub mod referrals;
pub mod subscriptions;
pub mod users;
