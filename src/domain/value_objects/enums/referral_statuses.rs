use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReferralPaymentStatus {
    #[default]
    Pending,
    Paid,
}

impl Display for ReferralPaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            ReferralPaymentStatus::Pending => "pending",
            ReferralPaymentStatus::Paid => "paid",
        };
        write!(f, "{}", status)
    }
}
