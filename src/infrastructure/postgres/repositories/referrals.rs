use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::{
        entities::{
            affiliate_earnings::{AffiliateEarningsEntity, InsertAffiliateEarningsEntity},
            referrals::ReferralEntity,
        },
        repositories::referrals::ReferralRepository,
        value_objects::{
            commissions::ReferralCredit, enums::referral_statuses::ReferralPaymentStatus,
        },
    },
    infrastructure::postgres::{
        postgres_connection::PgPoolSquad,
        schema::{affiliate_earnings, referrals, users},
    },
};

pub struct ReferralPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl ReferralPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl ReferralRepository for ReferralPostgres {
    async fn find_pending_by_client(&self, client_id: Uuid) -> Result<Option<ReferralEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let referral = referrals::table
            .filter(referrals::client_id.eq(client_id))
            .filter(referrals::payment_status.eq(ReferralPaymentStatus::Pending.to_string()))
            .order(referrals::created_at.asc())
            .select(ReferralEntity::as_select())
            .first::<ReferralEntity>(&mut conn)
            .optional()?;

        Ok(referral)
    }

    async fn credit_referral(&self, credit: ReferralCredit) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let credited = conn.transaction::<bool, diesel::result::Error, _>(|conn| {
            let updated = diesel::update(referrals::table.find(credit.referral_id))
                .filter(referrals::payment_status.eq(ReferralPaymentStatus::Pending.to_string()))
                .set((
                    referrals::payment_status.eq(ReferralPaymentStatus::Paid.to_string()),
                    referrals::commission_earned.eq(Some(credit.commission)),
                    referrals::credited_at.eq(Some(credit.credited_at)),
                ))
                .execute(conn)?;

            if updated == 0 {
                return Ok(false);
            }

            diesel::update(users::table.find(credit.affiliate_id))
                .set((
                    users::available_balance.eq(users::available_balance + credit.commission),
                    users::total_earned.eq(users::total_earned + credit.commission),
                ))
                .execute(conn)?;

            diesel::insert_into(affiliate_earnings::table)
                .values(&InsertAffiliateEarningsEntity {
                    affiliate_id: credit.affiliate_id,
                    product_id: credit.product_id.clone(),
                    total_commission: credit.commission,
                    paid_referrals: 1,
                    updated_at: credit.credited_at,
                })
                .on_conflict((affiliate_earnings::affiliate_id, affiliate_earnings::product_id))
                .do_update()
                .set((
                    affiliate_earnings::total_commission
                        .eq(affiliate_earnings::total_commission + credit.commission),
                    affiliate_earnings::paid_referrals.eq(affiliate_earnings::paid_referrals + 1),
                    affiliate_earnings::updated_at.eq(credit.credited_at),
                ))
                .execute(conn)?;

            Ok(true)
        })?;

        Ok(credited)
    }

    async fn find_earnings(
        &self,
        affiliate_id: Uuid,
        product_id: &str,
    ) -> Result<Option<AffiliateEarningsEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let earnings = affiliate_earnings::table
            .filter(affiliate_earnings::affiliate_id.eq(affiliate_id))
            .filter(affiliate_earnings::product_id.eq(product_id))
            .select(AffiliateEarningsEntity::as_select())
            .first::<AffiliateEarningsEntity>(&mut conn)
            .optional()?;

        Ok(earnings)
    }
}
