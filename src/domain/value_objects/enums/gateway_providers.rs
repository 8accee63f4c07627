use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Mobile-money gateways this service can talk to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GatewayProvider {
    /// Safaricom Daraja, direct integration.
    Daraja,
    /// PayHero aggregator.
    PayHero,
}

impl Display for GatewayProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let provider = match self {
            GatewayProvider::Daraja => "daraja",
            GatewayProvider::PayHero => "payhero",
        };
        write!(f, "{}", provider)
    }
}

impl GatewayProvider {
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "daraja" | "mpesa" => Some(GatewayProvider::Daraja),
            "payhero" => Some(GatewayProvider::PayHero),
            _ => None,
        }
    }
}
