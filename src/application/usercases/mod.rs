pub mod billing_events;
pub mod commissions;
pub mod payment_initiation;
pub mod payment_reconciliation;
pub mod subscription_lifecycle;
pub mod user_locks;
