use super::common::*;
use crate::billing::domain::{ActorId, BillStatus, Payment, PaymentStatus};
use crate::billing::repository::{BillingEvent, BillingStore};
use crate::billing::service::{BillingError, BillingService};
use rust_decimal_macros::dec;
use std::sync::Arc;

#[test]
fn completed_payment_settles_the_bill() {
    let (service, _, _, notifier) = build_service();
    let bill = service
        .create_bill(new_bill(dec!(300.00), date(2025, 3, 20)), &admin(), run_at())
        .expect("bill created");

    let payment = service
        .process_payment(new_payment(&bill.id, dec!(300.00), "txn-settle"), &admin(), run_at())
        .expect("payment processed");
    assert_eq!(payment.resident_id, bill.resident_id);

    let statement = service
        .bill_statement(&bill.id, run_at())
        .expect("statement");
    assert_eq!(statement.status, "paid");
    assert_eq!(statement.remaining_balance, dec!(0.00));

    let paid_events = notifier
        .events()
        .into_iter()
        .filter(|event| matches!(event, BillingEvent::BillPaid { .. }))
        .count();
    assert_eq!(paid_events, 1);
}

#[test]
fn partial_payment_leaves_the_bill_partially_paid() {
    let (service, _, _, _) = build_service();
    let bill = service
        .create_bill(new_bill(dec!(300.00), date(2025, 3, 20)), &admin(), run_at())
        .expect("bill created");

    service
        .process_payment(new_payment(&bill.id, dec!(120.00), "txn-partial"), &admin(), run_at())
        .expect("payment processed");

    let statement = service
        .bill_statement(&bill.id, run_at())
        .expect("statement");
    assert_eq!(statement.status, "partially_paid");
    assert_eq!(statement.remaining_balance, dec!(180.00));
}

#[test]
fn pending_capture_does_not_move_the_bill() {
    let (service, _, _, _) = build_service();
    let bill = service
        .create_bill(new_bill(dec!(300.00), date(2025, 3, 20)), &admin(), run_at())
        .expect("bill created");

    let mut capture = new_payment(&bill.id, dec!(300.00), "txn-pending");
    capture.status = PaymentStatus::Pending;
    let payment = service
        .process_payment(capture, &admin(), run_at())
        .expect("payment recorded");

    let statement = service
        .bill_statement(&bill.id, run_at())
        .expect("statement");
    assert_eq!(statement.status, "pending");

    // Completion arrives later and reconciles the parent bill.
    service
        .update_payment_status(&payment.id, PaymentStatus::Completed, &admin(), run_at())
        .expect("status updated");
    let statement = service
        .bill_statement(&bill.id, run_at())
        .expect("statement");
    assert_eq!(statement.status, "paid");
}

#[test]
fn leaving_completion_reverses_the_balance() {
    let (service, _, _, _) = build_service();
    let bill = service
        .create_bill(new_bill(dec!(300.00), date(2025, 3, 20)), &admin(), run_at())
        .expect("bill created");
    let payment = service
        .process_payment(new_payment(&bill.id, dec!(300.00), "txn-void"), &admin(), run_at())
        .expect("payment processed");

    service
        .update_payment_status(&payment.id, PaymentStatus::Failed, &admin(), run_at())
        .expect("status updated");

    let statement = service
        .bill_statement(&bill.id, run_at())
        .expect("statement");
    assert_eq!(statement.status, "pending");
    assert_eq!(statement.remaining_balance, dec!(300.00));
}

#[test]
fn duplicate_transaction_ids_conflict() {
    let (service, _, _, _) = build_service();
    let bill = service
        .create_bill(new_bill(dec!(300.00), date(2025, 3, 20)), &admin(), run_at())
        .expect("bill created");

    service
        .process_payment(new_payment(&bill.id, dec!(100.00), "txn-dup"), &admin(), run_at())
        .expect("first capture");
    match service.process_payment(new_payment(&bill.id, dec!(100.00), "txn-dup"), &admin(), run_at())
    {
        Err(BillingError::Conflict) => {}
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[test]
fn payment_validation_rejects_bad_input() {
    let (service, _, _, _) = build_service();
    let bill = service
        .create_bill(new_bill(dec!(300.00), date(2025, 3, 20)), &admin(), run_at())
        .expect("bill created");

    let zero = new_payment(&bill.id, dec!(0.00), "txn-zero");
    match service.process_payment(zero, &admin(), run_at()) {
        Err(BillingError::Validation(_)) => {}
        other => panic!("expected validation error, got {other:?}"),
    }

    let mut wrong_currency = new_payment(&bill.id, dec!(100.00), "txn-eur");
    wrong_currency.currency = "EUR".to_string();
    match service.process_payment(wrong_currency, &admin(), run_at()) {
        Err(BillingError::Validation(_)) => {}
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn cancelled_bills_reject_payments() {
    let (service, _, _, _) = build_service();
    let bill = service
        .create_bill(new_bill(dec!(300.00), date(2025, 3, 20)), &admin(), run_at())
        .expect("bill created");
    service
        .cancel_bill(&bill.id, &admin(), run_at())
        .expect("bill cancelled");

    match service.process_payment(
        new_payment(&bill.id, dec!(300.00), "txn-late"),
        &admin(),
        run_at(),
    ) {
        Err(BillingError::InvalidState(_)) => {}
        other => panic!("expected invalid state, got {other:?}"),
    }
}

#[test]
fn full_refund_round_trips_the_balance() {
    let (service, store, _, _) = build_service();
    let bill = service
        .create_bill(new_bill(dec!(300.00), date(2025, 3, 20)), &admin(), run_at())
        .expect("bill created");
    let payment = service
        .process_payment(new_payment(&bill.id, dec!(300.00), "txn-refund"), &admin(), run_at())
        .expect("payment processed");

    let refund = service
        .refund_payment(&payment.id, dec!(300.00), "duplicate charge", &admin(), run_at())
        .expect("refund issued");
    assert_eq!(refund.amount, dec!(-300.00));
    assert_eq!(refund.status, PaymentStatus::Completed);
    assert_eq!(
        refund.metadata.get(Payment::META_ORIGINAL_PAYMENT),
        Some(&payment.id.0)
    );
    assert_eq!(
        refund.metadata.get(Payment::META_REFUND_REASON),
        Some(&"duplicate charge".to_string())
    );

    let statement = service
        .bill_statement(&bill.id, run_at())
        .expect("statement");
    assert_eq!(statement.status, "pending");
    assert_eq!(statement.remaining_balance, dec!(300.00));

    let original = store
        .fetch_payment(&payment.id)
        .expect("fetch succeeds")
        .expect("payment present");
    assert_eq!(
        original.metadata.get(Payment::META_REFUNDED),
        Some(&"true".to_string())
    );
    // The original stays completed; the negative row carries the reversal.
    assert_eq!(original.status, PaymentStatus::Completed);
}

#[test]
fn refunds_cannot_exceed_the_refundable_balance() {
    let (service, _, _, _) = build_service();
    let bill = service
        .create_bill(new_bill(dec!(300.00), date(2025, 3, 20)), &admin(), run_at())
        .expect("bill created");
    let payment = service
        .process_payment(new_payment(&bill.id, dec!(300.00), "txn-cap"), &admin(), run_at())
        .expect("payment processed");

    match service.refund_payment(&payment.id, dec!(400.00), "too much", &admin(), run_at()) {
        Err(BillingError::InvalidState(_)) => {}
        other => panic!("expected invalid state, got {other:?}"),
    }

    service
        .refund_payment(&payment.id, dec!(200.00), "partial", &admin(), run_at())
        .expect("first refund");
    service
        .refund_payment(&payment.id, dec!(100.00), "remainder", &admin(), run_at())
        .expect("second refund drains the balance");
    match service.refund_payment(&payment.id, dec!(0.01), "overdraw", &admin(), run_at()) {
        Err(BillingError::InvalidState(_)) => {}
        other => panic!("expected invalid state, got {other:?}"),
    }
}

#[test]
fn refunds_require_a_completed_non_refund_original() {
    let (service, _, _, _) = build_service();
    let bill = service
        .create_bill(new_bill(dec!(300.00), date(2025, 3, 20)), &admin(), run_at())
        .expect("bill created");

    let mut capture = new_payment(&bill.id, dec!(300.00), "txn-pend");
    capture.status = PaymentStatus::Pending;
    let pending = service
        .process_payment(capture, &admin(), run_at())
        .expect("payment recorded");
    match service.refund_payment(&pending.id, dec!(100.00), "early", &admin(), run_at()) {
        Err(BillingError::InvalidState(_)) => {}
        other => panic!("expected invalid state, got {other:?}"),
    }

    let paid = service
        .process_payment(new_payment(&bill.id, dec!(300.00), "txn-paid"), &admin(), run_at())
        .expect("payment processed");
    let refund = service
        .refund_payment(&paid.id, dec!(100.00), "partial", &admin(), run_at())
        .expect("refund issued");
    match service.refund_payment(&refund.id, dec!(100.00), "refund the refund", &admin(), run_at())
    {
        Err(BillingError::InvalidState(_)) => {}
        other => panic!("expected invalid state, got {other:?}"),
    }
}

#[test]
fn first_overdue_transition_notifies_and_escalates_in_rotation() {
    let (service, _, _, notifier) = build_service();

    // Created already past due: reconciliation lands on overdue immediately.
    service
        .create_bill(new_bill(dec!(50.00), date(2025, 3, 1)), &admin(), run_at())
        .expect("first overdue bill");
    service
        .create_bill(new_bill(dec!(60.00), date(2025, 3, 2)), &admin(), run_at())
        .expect("second overdue bill");
    service
        .create_bill(new_bill(dec!(70.00), date(2025, 3, 3)), &admin(), run_at())
        .expect("third overdue bill");

    let escalations: Vec<ActorId> = notifier
        .events()
        .into_iter()
        .filter_map(|event| match event {
            BillingEvent::OverdueEscalated { admin_id, .. } => Some(admin_id),
            _ => None,
        })
        .collect();
    assert_eq!(
        escalations,
        vec![
            ActorId("admin-1".to_string()),
            ActorId("admin-2".to_string()),
            ActorId("admin-1".to_string()),
        ]
    );
}

#[test]
fn reconcile_twice_sends_no_duplicate_notifications() {
    let (service, _, _, notifier) = build_service();
    let bill = service
        .create_bill(new_bill(dec!(50.00), date(2025, 3, 1)), &admin(), run_at())
        .expect("overdue bill");

    let before = notifier.events().len();
    service
        .reconcile_bill(&bill.id, run_at())
        .expect("first re-run");
    service
        .reconcile_bill(&bill.id, run_at())
        .expect("second re-run");
    assert_eq!(notifier.events().len(), before);
}

#[test]
fn payment_survives_a_failing_notifier() {
    let store = Arc::new(MemoryStore::default());
    let directory = Arc::new(MemoryDirectory::default());
    directory.add_property(property());
    directory.add_resident(renter());
    let service = BillingService::new(
        store.clone(),
        directory,
        Arc::new(FailingNotifier),
        settings(),
    );

    let bill = service
        .create_bill(new_bill(dec!(300.00), date(2025, 3, 20)), &admin(), run_at())
        .expect("bill created despite dead transport");
    service
        .process_payment(new_payment(&bill.id, dec!(300.00), "txn-dark"), &admin(), run_at())
        .expect("payment processed despite dead transport");

    let statement = service
        .bill_statement(&bill.id, run_at())
        .expect("statement");
    assert_eq!(statement.status, "paid");
}

#[test]
fn paid_and_cancelled_bills_reject_updates() {
    let (service, _, _, _) = build_service();
    let bill = service
        .create_bill(new_bill(dec!(300.00), date(2025, 3, 20)), &admin(), run_at())
        .expect("bill created");
    service
        .process_payment(new_payment(&bill.id, dec!(300.00), "txn-lock"), &admin(), run_at())
        .expect("payment processed");

    match service.update_bill(&bill.id, Default::default(), run_at()) {
        Err(BillingError::InvalidState(_)) => {}
        other => panic!("expected invalid state, got {other:?}"),
    }
}

#[test]
fn cancelling_an_unpaid_bill_soft_deletes_it() {
    let (service, store, _, _) = build_service();
    let bill = service
        .create_bill(new_bill(dec!(300.00), date(2025, 3, 20)), &admin(), run_at())
        .expect("bill created");

    let cancelled = service
        .cancel_bill(&bill.id, &admin(), run_at())
        .expect("bill cancelled");
    assert_eq!(cancelled.status, BillStatus::Cancelled);
    assert!(cancelled.deleted_at.is_some());

    // With a payment on file the row is kept.
    let paid_bill = service
        .create_bill(new_bill(dec!(100.00), date(2025, 3, 20)), &admin(), run_at())
        .expect("bill created");
    service
        .process_payment(new_payment(&paid_bill.id, dec!(40.00), "txn-keep"), &admin(), run_at())
        .expect("payment processed");
    let cancelled = service
        .cancel_bill(&paid_bill.id, &admin(), run_at())
        .expect("bill cancelled");
    assert!(cancelled.deleted_at.is_none());

    let stored = store
        .fetch_bill(&paid_bill.id)
        .expect("fetch succeeds")
        .expect("row retained");
    assert_eq!(stored.status, BillStatus::Cancelled);

    // Reconciliation never overwrites the terminal state.
    let reconciled = service
        .reconcile_bill(&paid_bill.id, run_at())
        .expect("reconcile succeeds");
    assert_eq!(reconciled.status, BillStatus::Cancelled);
}
