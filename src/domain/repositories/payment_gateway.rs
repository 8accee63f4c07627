use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use mockall::automock;
use thiserror::Error;

use crate::domain::value_objects::{
    enums::gateway_providers::GatewayProvider,
    gateway_events::{GatewayEvent, PolledStatus, PushReceipt, PushRequest},
};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{provider} unavailable during {context}: {message}")]
    Unavailable {
        provider: GatewayProvider,
        context: String,
        message: String,
    },
    #[error("{provider} rejected {context}: {message}")]
    InvalidRequest {
        provider: GatewayProvider,
        context: String,
        message: String,
    },
    #[error("{provider} returned an unexpected response during {context}: {message}")]
    InvalidResponse {
        provider: GatewayProvider,
        context: String,
        message: String,
    },
}

/// One mobile-money gateway. Implementations own their HTTP client, credentials
/// and webhook secret.
#[automock]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn provider(&self) -> GatewayProvider;

    async fn initiate_push(&self, request: PushRequest) -> Result<PushReceipt, GatewayError>;

    /// Unknown or still-processing ids come back as `pending`, not as errors.
    async fn poll_status(&self, correlation_id: &str) -> Result<PolledStatus, GatewayError>;

    /// `signature` is the hex HMAC-SHA256 of the raw body, `""` when the header was absent.
    fn verify_signature(&self, payload: &[u8], signature: &str) -> bool;

    fn parse_callback(&self, payload: &[u8]) -> Result<GatewayEvent, GatewayError>;
}

/// Configured gateways keyed by provider, plus the one used for new pushes.
#[derive(Clone)]
pub struct PaymentGateways {
    primary: GatewayProvider,
    gateways: HashMap<GatewayProvider, Arc<dyn PaymentGateway>>,
}

impl PaymentGateways {
    pub fn new(primary: Arc<dyn PaymentGateway>) -> Self {
        let provider = primary.provider();
        let mut gateways: HashMap<GatewayProvider, Arc<dyn PaymentGateway>> = HashMap::new();
        gateways.insert(provider, primary);
        Self {
            primary: provider,
            gateways,
        }
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.provider(), gateway);
        self
    }

    pub fn primary(&self) -> Arc<dyn PaymentGateway> {
        Arc::clone(&self.gateways[&self.primary])
    }

    pub fn get(&self, provider: GatewayProvider) -> Option<Arc<dyn PaymentGateway>> {
        self.gateways.get(&provider).cloned()
    }
}
