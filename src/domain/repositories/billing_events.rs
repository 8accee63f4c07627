use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::billing_events::BillingEventEntity;

#[automock]
#[async_trait]
pub trait BillingEventRepository: Send + Sync {
    async fn list_pending(&self, limit: i64) -> Result<Vec<BillingEventEntity>>;

    /// No-op unless the event is still `pending`.
    async fn mark_processed(&self, event_id: Uuid) -> Result<()>;

    /// Records the error and bumps `attempts` on a `pending` event; it turns
    /// `failed` once `attempts` reaches `max_attempts`.
    async fn mark_attempt_failed(
        &self,
        event_id: Uuid,
        error: String,
        max_attempts: i32,
    ) -> Result<()>;
}
