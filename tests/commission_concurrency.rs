mod support;

use mpesa_billing::{
    application::usercases::payment_reconciliation::ReconcileOutcome,
    domain::value_objects::{
        commissions::{CommissionOutcome, CommissionRate},
        enums::{plan_types::PlanType, user_roles::UserRole},
        payments::PaymentPurpose,
    },
    infrastructure::gateways::signature::sign_payload,
};
use support::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_credits_pay_the_affiliate_once() {
    let Harness { store, services } = harness();
    let affiliate = user(UserRole::Affiliate);
    let client = user(UserRole::User);
    store.insert_user(affiliate.clone());
    store.insert_user(client.clone());
    store.insert_referral(pending_referral(affiliate.id, client.id));

    let rate = CommissionRate::from_basis_points(1000);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let commissions = services.commissions.clone();
            let client_id = client.id;
            tokio::spawn(async move {
                commissions
                    .credit_if_referred(client_id, MONTHLY_PRICE, rate)
                    .await
            })
        })
        .collect();

    let mut credited = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            CommissionOutcome::Credited { commission, .. } => {
                assert_eq!(commission, 200);
                credited += 1;
            }
            CommissionOutcome::AlreadyCredited { .. } | CommissionOutcome::NoPendingReferral => {}
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    assert_eq!(credited, 1);
    let affiliate = store.user(affiliate.id).unwrap();
    assert_eq!(affiliate.available_balance, 200);
    assert_eq!(affiliate.total_earned, 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_webhook_deliveries_apply_once() {
    let Harness { store, services } = harness();
    let affiliate = user(UserRole::Affiliate);
    let client = user(UserRole::User);
    store.insert_user(affiliate.clone());
    store.insert_user(client.clone());
    store.insert_referral(pending_referral(affiliate.id, client.id));

    let correlation_id = pending_payment(
        &store,
        client.id,
        PlanType::Monthly,
        PaymentPurpose::Plan,
        MONTHLY_PRICE,
    )
    .await;
    let body = daraja_callback(&correlation_id, 0, MONTHLY_PRICE);
    let signature = sign_payload(WEBHOOK_SECRET, &body);

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let reconciliation = services.reconciliation.clone();
            let body = body.clone();
            let signature = signature.clone();
            tokio::spawn(async move {
                reconciliation
                    .handle_webhook("daraja", &body, Some(&signature))
                    .await
            })
        })
        .collect();

    let mut applied = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            ReconcileOutcome::Applied { .. } => applied += 1,
            ReconcileOutcome::Duplicate { .. } => {}
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    assert_eq!(applied, 1);
    // One payment_settled and one subscription_activated.
    assert_eq!(store.billing_events().len(), 2);
    assert_eq!(store.user(affiliate.id).unwrap().available_balance, 200);
}
