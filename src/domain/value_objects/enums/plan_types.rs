use std::fmt::Display;

use chrono::Duration;
use serde::{Deserialize, Serialize};

pub const MONTHLY_PERIOD_DAYS: i64 = 30;
pub const LIFETIME_PERIOD_DAYS: i64 = 36_500;

#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    #[default]
    Monthly,
    Lifetime,
}

impl Display for PlanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let plan = match self {
            PlanType::Monthly => "monthly",
            PlanType::Lifetime => "lifetime",
        };
        write!(f, "{}", plan)
    }
}

impl PlanType {
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "monthly" => Some(PlanType::Monthly),
            "lifetime" => Some(PlanType::Lifetime),
            _ => None,
        }
    }

    /// Length of one paid period. Lifetime is modelled as a hundred years.
    pub fn period(&self) -> Duration {
        match self {
            PlanType::Monthly => Duration::days(MONTHLY_PERIOD_DAYS),
            PlanType::Lifetime => Duration::days(LIFETIME_PERIOD_DAYS),
        }
    }

    pub fn auto_renews(&self) -> bool {
        matches!(self, PlanType::Monthly)
    }
}
