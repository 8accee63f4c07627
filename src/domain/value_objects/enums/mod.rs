pub mod billing_event_statuses;
pub mod gateway_providers;
pub mod payment_statuses;
pub mod plan_types;
pub mod referral_statuses;
pub mod subscription_statuses;
pub mod user_roles;
