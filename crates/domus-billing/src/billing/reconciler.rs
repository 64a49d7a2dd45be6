use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::domain::{Bill, BillStatus, Payment};
use super::ledger::{is_fully_paid, paid_amount};

/// Outcome of re-deriving a bill's status, including which notifications the
/// transition fires. Re-applying the same history yields the same outcome
/// with both notification flags false.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub previous: BillStatus,
    pub next: BillStatus,
    pub notify_paid: bool,
    pub notify_overdue: bool,
}

impl Reconciliation {
    pub fn changed(&self) -> bool {
        self.previous != self.next
    }
}

/// Status priority ladder over a freshly reloaded bill: fully paid, then past
/// due, then partially paid, then pending. `Cancelled` is terminal and is
/// never overwritten here.
pub fn derive_status(bill: &Bill, payments: &[Payment], today: NaiveDate) -> BillStatus {
    if bill.status == BillStatus::Cancelled {
        return BillStatus::Cancelled;
    }
    if is_fully_paid(bill, payments) {
        return BillStatus::Paid;
    }
    if bill.due_date < today {
        return BillStatus::Overdue;
    }
    if paid_amount(bill, payments) > Decimal::ZERO {
        return BillStatus::PartiallyPaid;
    }
    BillStatus::Pending
}

/// Derive the next status and the notifications owed for the transition.
/// Notifications fire only on the first transition into `Paid` or `Overdue`;
/// re-running against an unchanged history stays silent.
pub fn reconcile(bill: &Bill, payments: &[Payment], today: NaiveDate) -> Reconciliation {
    let previous = bill.status;
    let next = derive_status(bill, payments, today);
    Reconciliation {
        previous,
        next,
        notify_paid: next == BillStatus::Paid && previous != BillStatus::Paid,
        notify_overdue: next == BillStatus::Overdue && previous != BillStatus::Overdue,
    }
}
