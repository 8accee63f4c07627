pub mod commissions;
pub mod enums;
pub mod gateway_events;
pub mod payments;
pub mod subscriptions;
