use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use super::domain::{Bill, BillId, Payment};

/// Round to currency precision (two decimal places, banker's rounding).
pub fn to_currency(amount: Decimal) -> Decimal {
    amount.round_dp(2)
}

/// Sum of completed payment amounts applied to the bill. Refund rows carry
/// negative amounts and subtract themselves; soft-deleted rows still count so
/// the audit trail never silently changes a balance.
pub fn paid_amount(bill: &Bill, payments: &[Payment]) -> Decimal {
    payments
        .iter()
        .filter(|payment| payment.bill_id == bill.id)
        .filter(|payment| payment.status.is_completed())
        .map(|payment| payment.amount)
        .sum()
}

pub fn remaining_balance(bill: &Bill, payments: &[Payment]) -> Decimal {
    bill.amount - paid_amount(bill, payments)
}

pub fn is_fully_paid(bill: &Bill, payments: &[Payment]) -> bool {
    remaining_balance(bill, payments) <= Decimal::ZERO
}

pub fn is_overdue(bill: &Bill, payments: &[Payment], today: NaiveDate) -> bool {
    !is_fully_paid(bill, payments) && bill.due_date < today
}

/// Point-in-time view of a bill with its derived balances, for API responses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillStatement {
    pub bill_id: BillId,
    pub status: &'static str,
    pub amount: Decimal,
    pub currency: String,
    pub paid_amount: Decimal,
    pub remaining_balance: Decimal,
    pub is_fully_paid: bool,
    pub is_overdue: bool,
    pub due_date: NaiveDate,
}

/// Assemble a statement from a freshly loaded bill and its payment history.
pub fn statement(bill: &Bill, payments: &[Payment], today: NaiveDate) -> BillStatement {
    let paid = paid_amount(bill, payments);
    BillStatement {
        bill_id: bill.id.clone(),
        status: bill.status.label(),
        amount: bill.amount,
        currency: bill.currency.clone(),
        paid_amount: paid,
        remaining_balance: bill.amount - paid,
        is_fully_paid: is_fully_paid(bill, payments),
        is_overdue: is_overdue(bill, payments, today),
        due_date: bill.due_date,
    }
}
