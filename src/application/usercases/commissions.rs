use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{
    repositories::{referrals::ReferralRepository, users::UserRepository},
    value_objects::commissions::{CommissionOutcome, CommissionRate, ReferralCredit},
};

#[derive(Debug, Error)]
pub enum CommissionError {
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type CommissionResult<T> = std::result::Result<T, CommissionError>;

pub struct CommissionUseCase {
    referral_repo: Arc<dyn ReferralRepository>,
    user_repo: Arc<dyn UserRepository>,
}

impl CommissionUseCase {
    pub fn new(
        referral_repo: Arc<dyn ReferralRepository>,
        user_repo: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            referral_repo,
            user_repo,
        }
    }

    /// Credits the referring affiliate for a user's first payment. A referral
    /// is credited at most once no matter how many callers race here.
    pub async fn credit_if_referred(
        &self,
        user_id: Uuid,
        payment_amount: i64,
        rate: CommissionRate,
    ) -> CommissionResult<CommissionOutcome> {
        let referral = match self
            .referral_repo
            .find_pending_by_client(user_id)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "commissions: failed to load referral");
                CommissionError::Internal(err)
            })? {
            Some(referral) => referral,
            None => {
                debug!(%user_id, "commissions: no pending referral");
                return Ok(CommissionOutcome::NoPendingReferral);
            }
        };

        let affiliate = self
            .user_repo
            .find_by_id(referral.referrer_id)
            .await
            .map_err(|err| {
                error!(
                    referrer_id = %referral.referrer_id,
                    db_error = ?err,
                    "commissions: failed to load affiliate"
                );
                CommissionError::Internal(err)
            })?;

        let affiliate = match affiliate {
            Some(affiliate) if affiliate.is_affiliate() => affiliate,
            other => {
                warn!(
                    referral_id = %referral.id,
                    referrer_id = %referral.referrer_id,
                    referrer_role = ?other.map(|user| user.role),
                    "commissions: referrer missing or not an affiliate, skipping credit"
                );
                return Ok(CommissionOutcome::AffiliateMissing {
                    referral_id: referral.id,
                });
            }
        };

        let commission = rate.commission_for(payment_amount);
        let credit = ReferralCredit {
            referral_id: referral.id,
            affiliate_id: affiliate.id,
            product_id: referral.product_id.clone(),
            commission,
            credited_at: Utc::now(),
        };

        let credited = self
            .referral_repo
            .credit_referral(credit)
            .await
            .map_err(|err| {
                error!(
                    referral_id = %referral.id,
                    db_error = ?err,
                    "commissions: failed to credit referral"
                );
                CommissionError::Internal(err)
            })?;

        if !credited {
            info!(
                referral_id = %referral.id,
                "commissions: referral already credited by another worker"
            );
            return Ok(CommissionOutcome::AlreadyCredited {
                referral_id: referral.id,
            });
        }

        info!(
            referral_id = %referral.id,
            affiliate_id = %affiliate.id,
            client_id = %user_id,
            payment_amount,
            commission,
            rate_bps = rate.basis_points(),
            "commissions: affiliate credited"
        );
        Ok(CommissionOutcome::Credited {
            referral_id: referral.id,
            affiliate_id: affiliate.id,
            commission,
        })
    }
}
