use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_COMMISSION_RATE_BPS: u32 = 1_000;
pub const MAX_COMMISSION_RATE_BPS: u32 = 10_000;

const BASIS_POINTS_PER_UNIT: i64 = 10_000;

/// Commission rate in basis points (1000 = 10%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionRate {
    basis_points: u32,
}

impl Default for CommissionRate {
    fn default() -> Self {
        Self::from_basis_points(DEFAULT_COMMISSION_RATE_BPS)
    }
}

impl CommissionRate {
    pub fn from_basis_points(basis_points: u32) -> Self {
        Self { basis_points }
    }

    /// `None` above 100%.
    pub fn checked(basis_points: u32) -> Option<Self> {
        (basis_points <= MAX_COMMISSION_RATE_BPS).then(|| Self::from_basis_points(basis_points))
    }

    pub fn basis_points(&self) -> u32 {
        self.basis_points
    }

    /// Round-half-up on whole currency units.
    pub fn commission_for(&self, amount: i64) -> i64 {
        if amount <= 0 {
            return 0;
        }
        let scaled = amount as i128 * self.basis_points as i128;
        let half = (BASIS_POINTS_PER_UNIT / 2) as i128;
        i64::try_from((scaled + half) / BASIS_POINTS_PER_UNIT as i128).unwrap_or(i64::MAX)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferralCredit {
    pub referral_id: Uuid,
    pub affiliate_id: Uuid,
    pub product_id: String,
    pub commission: i64,
    pub credited_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommissionOutcome {
    Credited {
        referral_id: Uuid,
        affiliate_id: Uuid,
        commission: i64,
    },
    NoPendingReferral,
    AffiliateMissing {
        referral_id: Uuid,
    },
    AlreadyCredited {
        referral_id: Uuid,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_percent_of_1999_rounds_up_to_200() {
        assert_eq!(CommissionRate::default().commission_for(1999), 200);
    }

    #[test]
    fn half_unit_rounds_up_and_below_half_rounds_down() {
        let rate = CommissionRate::from_basis_points(1_000);
        assert_eq!(rate.commission_for(1995), 200);
        assert_eq!(rate.commission_for(1994), 199);
        assert_eq!(rate.commission_for(0), 0);
    }

    #[test]
    fn rates_above_one_hundred_percent_are_rejected() {
        assert!(CommissionRate::checked(MAX_COMMISSION_RATE_BPS).is_some());
        assert_eq!(CommissionRate::checked(MAX_COMMISSION_RATE_BPS + 1), None);
    }

    #[test]
    fn oversized_commission_saturates_instead_of_wrapping() {
        let rate = CommissionRate::from_basis_points(u32::MAX);
        assert_eq!(rate.commission_for(i64::MAX), i64::MAX);
    }
}
