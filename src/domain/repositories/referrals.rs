use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::{
    entities::{affiliate_earnings::AffiliateEarningsEntity, referrals::ReferralEntity},
    value_objects::commissions::ReferralCredit,
};

#[automock]
#[async_trait]
pub trait ReferralRepository: Send + Sync {
    async fn find_pending_by_client(&self, client_id: Uuid) -> Result<Option<ReferralEntity>>;

    /// Marks the referral paid, credits the affiliate balance and bumps the
    /// earnings aggregate in one transaction. Returns `false` when the
    /// referral was no longer pending.
    async fn credit_referral(&self, credit: ReferralCredit) -> Result<bool>;

    async fn find_earnings(
        &self,
        affiliate_id: Uuid,
        product_id: &str,
    ) -> Result<Option<AffiliateEarningsEntity>>;
}
