use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tracing::{debug, error, info};

use crate::application::usercases::{
    billing_events::BillingEventUseCase, subscription_lifecycle::SubscriptionLifecycleUseCase,
};

pub const EVENT_BATCH_SIZE: i64 = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerTick {
    pub events_processed: usize,
    pub subscriptions_expired: usize,
}

pub struct BillingWorker {
    billing_events: Arc<BillingEventUseCase>,
    lifecycle: Arc<SubscriptionLifecycleUseCase>,
    expiry_grace: chrono::Duration,
    interval: Duration,
}

impl BillingWorker {
    pub fn new(
        billing_events: Arc<BillingEventUseCase>,
        lifecycle: Arc<SubscriptionLifecycleUseCase>,
        expiry_grace: chrono::Duration,
        interval: Duration,
    ) -> Self {
        Self {
            billing_events,
            lifecycle,
            expiry_grace,
            interval,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        info!(interval_secs = self.interval.as_secs(), "billing worker: started");
        loop {
            let tick = self.tick().await;
            if tick != WorkerTick::default() {
                info!(
                    events_processed = tick.events_processed,
                    subscriptions_expired = tick.subscriptions_expired,
                    "billing worker: tick finished"
                );
            } else {
                debug!("billing worker: nothing to do");
            }

            tokio::time::sleep(self.interval).await;
        }
    }

    /// One pass: drain the outbox, then expire lapsed subscriptions.
    /// Failures are logged and retried on the next pass.
    pub async fn tick(&self) -> WorkerTick {
        let events_processed = match self.billing_events.process_pending(EVENT_BATCH_SIZE).await {
            Ok(count) => count,
            Err(err) => {
                error!(error = %err, "billing worker: outbox drain failed");
                0
            }
        };

        let subscriptions_expired = match self
            .lifecycle
            .expire_lapsed(Utc::now(), self.expiry_grace)
            .await
        {
            Ok(expired) => expired.len(),
            Err(err) => {
                error!(error = %err, "billing worker: lapsed sweep failed");
                0
            }
        };

        WorkerTick {
            events_processed,
            subscriptions_expired,
        }
    }
}
