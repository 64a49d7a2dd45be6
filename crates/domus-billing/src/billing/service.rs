use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::{
    Actor, Bill, BillId, BillStatus, BillType, Payment, PaymentId, PaymentStatus, Property,
    PropertyId, Recurrence, Resident, ResidencyTerm, ResidentId, ServiceAttachment, ServiceId,
    ServiceOffering,
};
use super::eligibility::{bill_amount, EligibilityPolicy};
use super::ledger::{self, to_currency, BillStatement};
use super::proration::{self, RevenueSummary};
use super::reconciler;
use super::repository::{
    BillingEvent, BillingStore, Directory, NotificationPublisher, StoreError,
};
use super::schedule;

/// Rotation-counter key used to spread overdue escalations across admins.
const OVERDUE_ROTATION_KEY: &str = "overdue_escalation";

/// Tunables for billing runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingSettings {
    /// Days between a billing run and the due date of the bills it raises.
    pub due_offset_days: i64,
    /// Currency applied to bills raised by the scheduler.
    pub currency: String,
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            due_offset_days: 15,
            currency: "USD".to_string(),
        }
    }
}

/// Operator-supplied fields for a manually created bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBill {
    pub property_id: PropertyId,
    pub resident_id: ResidentId,
    pub bill_type: BillType,
    pub amount: Decimal,
    pub currency: String,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub recurrence: Option<Recurrence>,
    #[serde(default)]
    pub next_billing_date: Option<NaiveDate>,
}

/// Mutable subset accepted by `update_bill`; absent fields are unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillPatch {
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub recurrence: Option<Recurrence>,
    #[serde(default)]
    pub next_billing_date: Option<NaiveDate>,
}

/// Capture-side fields for a new payment against a bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPayment {
    pub bill_id: BillId,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub transaction_id: String,
    pub payment_date: DateTime<Utc>,
}

/// Error raised by billing operations.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("a concurrent run already handled this unit of work")]
    Conflict,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Facade composing the store, directory, and notifier around the pure
/// billing rules. Single source of truth for bill status: every mutation
/// routes back through [`BillingService::reconcile_bill`].
pub struct BillingService<S, D, N> {
    store: Arc<S>,
    directory: Arc<D>,
    notifier: Arc<N>,
    policy: EligibilityPolicy,
    settings: BillingSettings,
}

static BILL_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static PAYMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_bill_id() -> BillId {
    let id = BILL_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    BillId(format!("bill-{id:06}"))
}

fn next_payment_id() -> PaymentId {
    let id = PAYMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    PaymentId(format!("pay-{id:06}"))
}

impl<S, D, N> BillingService<S, D, N>
where
    S: BillingStore + 'static,
    D: Directory + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(
        store: Arc<S>,
        directory: Arc<D>,
        notifier: Arc<N>,
        settings: BillingSettings,
    ) -> Self {
        Self::with_policy(store, directory, notifier, settings, EligibilityPolicy::standard())
    }

    pub fn with_policy(
        store: Arc<S>,
        directory: Arc<D>,
        notifier: Arc<N>,
        settings: BillingSettings,
        policy: EligibilityPolicy,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
            policy,
            settings,
        }
    }

    pub fn policy(&self) -> &EligibilityPolicy {
        &self.policy
    }

    /// Create a bill on an operator's behalf and reconcile it immediately.
    pub fn create_bill(
        &self,
        new_bill: NewBill,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Bill, BillingError> {
        if new_bill.amount <= Decimal::ZERO {
            return Err(BillingError::Validation(
                "bill amount must be positive".to_string(),
            ));
        }
        self.require_property(&new_bill.property_id)?;
        self.require_resident(&new_bill.resident_id)?;

        let bill = Bill {
            id: next_bill_id(),
            property_id: new_bill.property_id,
            resident_id: new_bill.resident_id,
            bill_type: new_bill.bill_type,
            amount: to_currency(new_bill.amount),
            currency: new_bill.currency,
            due_date: new_bill.due_date,
            status: BillStatus::Pending,
            recurrence: new_bill.recurrence,
            next_billing_date: new_bill.next_billing_date,
            created_by: actor.id.clone(),
            created_at: now,
            deleted_at: None,
        };
        let stored = self.store.insert_bill(bill)?;
        self.notify(BillingEvent::BillIssued {
            bill_id: stored.id.clone(),
            resident_id: stored.resident_id.clone(),
        });
        self.reconcile_bill(&stored.id, now)
    }

    /// Apply an operator patch to a bill that is still open, then reconcile.
    pub fn update_bill(
        &self,
        id: &BillId,
        patch: BillPatch,
        now: DateTime<Utc>,
    ) -> Result<Bill, BillingError> {
        let mut bill = self.require_bill(id)?;
        match bill.status {
            BillStatus::Cancelled => {
                return Err(BillingError::InvalidState(
                    "cancelled bills cannot be updated".to_string(),
                ))
            }
            BillStatus::Paid => {
                return Err(BillingError::InvalidState(
                    "fully paid bills cannot be updated".to_string(),
                ))
            }
            _ => {}
        }

        if let Some(amount) = patch.amount {
            if amount <= Decimal::ZERO {
                return Err(BillingError::Validation(
                    "bill amount must be positive".to_string(),
                ));
            }
            bill.amount = to_currency(amount);
        }
        if let Some(due_date) = patch.due_date {
            bill.due_date = due_date;
        }
        if let Some(recurrence) = patch.recurrence {
            bill.recurrence = Some(recurrence);
        }
        if let Some(next) = patch.next_billing_date {
            bill.next_billing_date = Some(next);
        }

        self.store.update_bill(bill)?;
        self.reconcile_bill(id, now)
    }

    /// Administrative cancel. Bills with no payment history are soft-deleted
    /// alongside the status change; once money has moved the row is kept.
    pub fn cancel_bill(
        &self,
        id: &BillId,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Bill, BillingError> {
        let mut bill = self.require_bill(id)?;
        if bill.status == BillStatus::Cancelled {
            return Ok(bill);
        }
        if bill.status == BillStatus::Paid {
            return Err(BillingError::InvalidState(
                "fully paid bills cannot be cancelled".to_string(),
            ));
        }
        let payments = self.store.payments_for_bill(id)?;
        bill.status = BillStatus::Cancelled;
        if payments.is_empty() {
            bill.deleted_at = Some(now);
        }
        self.store.update_bill(bill.clone())?;
        info!(bill = %bill.id.0, actor = %actor.id.0, "bill cancelled");
        Ok(bill)
    }

    /// Derived-balance view of a bill for API consumers.
    pub fn bill_statement(
        &self,
        id: &BillId,
        now: DateTime<Utc>,
    ) -> Result<BillStatement, BillingError> {
        let bill = self.require_bill(id)?;
        let payments = self.store.payments_for_bill(id)?;
        Ok(ledger::statement(&bill, &payments, now.date_naive()))
    }

    /// Re-derive a bill's status from a fresh read of the row and its
    /// payment history. Idempotent: re-running with no intervening mutation
    /// leaves the status unchanged and fires no notifications.
    pub fn reconcile_bill(
        &self,
        id: &BillId,
        now: DateTime<Utc>,
    ) -> Result<Bill, BillingError> {
        let mut bill = self.require_bill(id)?;
        let payments = self.store.payments_for_bill(id)?;
        let outcome = reconciler::reconcile(&bill, &payments, now.date_naive());

        if outcome.changed() {
            bill.status = outcome.next;
            self.store.update_bill(bill.clone())?;
        }
        if outcome.notify_paid {
            self.notify(BillingEvent::BillPaid {
                bill_id: bill.id.clone(),
                resident_id: bill.resident_id.clone(),
            });
        }
        if outcome.notify_overdue {
            self.notify(BillingEvent::BillOverdue {
                bill_id: bill.id.clone(),
                resident_id: bill.resident_id.clone(),
            });
            self.escalate_overdue(&bill);
        }
        Ok(bill)
    }

    /// Attachment-based sweep for one property. Per-attachment and
    /// per-resident failures are logged and skipped; the run returns how
    /// many bills it created.
    pub fn generate_bills_for_property(
        &self,
        property_id: &PropertyId,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<u32, BillingError> {
        let property = self.require_property(property_id)?;
        let attachments = self.store.attachments_for_property(property_id)?;
        let terms = self.directory.terms_for_property(property_id)?;

        let mut created = 0u32;
        for attachment in &attachments {
            match self.bill_attachment(&property, attachment, &terms, actor, now) {
                Ok(count) => created += count,
                Err(BillingError::Conflict) => {
                    info!(
                        attachment = %attachment.id.0,
                        "another run already billed this attachment"
                    );
                }
                Err(err) => {
                    warn!(
                        attachment = %attachment.id.0,
                        error = %err,
                        "skipping attachment in billing run"
                    );
                }
            }
        }
        info!(property = %property_id.0, created, "property billing run finished");
        Ok(created)
    }

    fn bill_attachment(
        &self,
        property: &Property,
        attachment: &ServiceAttachment,
        terms: &[ResidencyTerm],
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<u32, BillingError> {
        let service = self.require_service(&attachment.service_id)?;
        if !schedule::attachment_due(attachment, &service, now) {
            return Ok(0);
        }

        let amount = bill_amount(attachment.billing_type, attachment.price, property);
        if amount <= Decimal::ZERO {
            return Err(BillingError::Validation(format!(
                "service '{}' prices to a non-positive amount",
                service.id.0
            )));
        }
        let eligible = self.policy.eligible_terms(terms, service.bill_type);
        if eligible.is_empty() {
            return Ok(0);
        }

        // Win the anchor before touching the ledger; the loser of the race
        // sees a Conflict and skips the whole attachment.
        self.store
            .claim_attachment(&attachment.id, attachment.last_billed_at, now)
            .map_err(claim_error)?;

        let due_date = (now + Duration::days(self.settings.due_offset_days)).date_naive();
        let mut created = 0u32;
        let mut billed = BTreeSet::new();
        for term in eligible {
            if !billed.insert(term.resident_id.clone()) {
                continue;
            }
            match self.issue_service_bill(property, &service, term, amount, due_date, actor, now) {
                Ok(()) => created += 1,
                Err(err) => {
                    warn!(
                        resident = %term.resident_id.0,
                        service = %service.id.0,
                        error = %err,
                        "skipping resident in billing run"
                    );
                }
            }
        }
        Ok(created)
    }

    #[allow(clippy::too_many_arguments)]
    fn issue_service_bill(
        &self,
        property: &Property,
        service: &ServiceOffering,
        term: &ResidencyTerm,
        amount: Decimal,
        due_date: NaiveDate,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<(), BillingError> {
        let bill = Bill {
            id: next_bill_id(),
            property_id: property.id.clone(),
            resident_id: term.resident_id.clone(),
            bill_type: service.bill_type,
            amount,
            currency: self.settings.currency.clone(),
            due_date,
            status: BillStatus::Pending,
            recurrence: None,
            next_billing_date: None,
            created_by: actor.id.clone(),
            created_at: now,
            deleted_at: None,
        };
        let stored = self.store.insert_bill(bill)?;
        self.notify(BillingEvent::BillIssued {
            bill_id: stored.id.clone(),
            resident_id: stored.resident_id.clone(),
        });
        self.reconcile_bill(&stored.id, now)?;
        Ok(())
    }

    /// Bills-based sweep over recurring templates. Each template is handled
    /// independently so one failure never blocks the rest of the run.
    pub fn generate_recurring_bills(
        &self,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<u32, BillingError> {
        let templates = self.store.recurring_templates(now.date_naive())?;
        let mut created = 0u32;
        for template in &templates {
            match self.regenerate_template(template, actor, now) {
                Ok(true) => created += 1,
                Ok(false) => {}
                Err(BillingError::Conflict) => {
                    info!(
                        bill = %template.id.0,
                        "another run already regenerated this template"
                    );
                }
                Err(err) => {
                    warn!(
                        bill = %template.id.0,
                        error = %err,
                        "skipping recurring template"
                    );
                }
            }
        }
        info!(created, "recurring billing sweep finished");
        Ok(created)
    }

    fn regenerate_template(
        &self,
        template: &Bill,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<bool, BillingError> {
        let today = now.date_naive();
        if !schedule::template_due(template.recurrence, template.next_billing_date, today) {
            return Ok(false);
        }
        if template.status == BillStatus::Cancelled || template.deleted_at.is_some() {
            return Ok(false);
        }
        let (Some(recurrence), Some(next_due)) = (template.recurrence, template.next_billing_date)
        else {
            return Ok(false);
        };

        let advanced = schedule::advance_date(next_due, recurrence);
        self.store
            .claim_bill_regeneration(&template.id, next_due, advanced)
            .map_err(claim_error)?;

        // The spawned bill is a one-off; the template stays the single
        // regeneration source for the cadence.
        let bill = Bill {
            id: next_bill_id(),
            property_id: template.property_id.clone(),
            resident_id: template.resident_id.clone(),
            bill_type: template.bill_type,
            amount: template.amount,
            currency: template.currency.clone(),
            due_date: today + Duration::days(self.settings.due_offset_days),
            status: BillStatus::Pending,
            recurrence: None,
            next_billing_date: None,
            created_by: actor.id.clone(),
            created_at: now,
            deleted_at: None,
        };
        let stored = self.store.insert_bill(bill)?;
        self.notify(BillingEvent::BillIssued {
            bill_id: stored.id.clone(),
            resident_id: stored.resident_id.clone(),
        });
        self.reconcile_bill(&stored.id, now)?;
        Ok(true)
    }

    /// Record a captured payment; reconcile the parent bill iff the capture
    /// already denotes received money.
    pub fn process_payment(
        &self,
        new_payment: NewPayment,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Payment, BillingError> {
        if new_payment.amount <= Decimal::ZERO {
            return Err(BillingError::Validation(
                "payment amount must be positive".to_string(),
            ));
        }
        let bill = self.require_bill(&new_payment.bill_id)?;
        if bill.status == BillStatus::Cancelled {
            return Err(BillingError::InvalidState(
                "cancelled bills cannot accept payments".to_string(),
            ));
        }
        if new_payment.currency != bill.currency {
            return Err(BillingError::Validation(format!(
                "payment currency '{}' does not match bill currency '{}'",
                new_payment.currency, bill.currency
            )));
        }

        let payment = Payment {
            id: next_payment_id(),
            bill_id: new_payment.bill_id,
            resident_id: bill.resident_id.clone(),
            amount: to_currency(new_payment.amount),
            currency: new_payment.currency,
            status: new_payment.status,
            transaction_id: new_payment.transaction_id,
            payment_date: new_payment.payment_date,
            processed_by: actor.id.clone(),
            metadata: BTreeMap::new(),
            created_at: now,
            deleted_at: None,
        };
        let stored = self.store.insert_payment(payment).map_err(claim_error)?;
        if stored.status.is_completed() {
            self.reconcile_bill(&stored.bill_id, now)?;
        }
        Ok(stored)
    }

    /// Mutate a payment's status. Crossing the completion boundary in either
    /// direction re-runs reconciliation: money arriving, or a reversal that
    /// reopens the balance.
    pub fn update_payment_status(
        &self,
        id: &PaymentId,
        status: PaymentStatus,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Payment, BillingError> {
        let mut payment = self.require_payment(id)?;
        if payment.status == status {
            return Ok(payment);
        }
        let crossed_completion = payment.status.is_completed() != status.is_completed();
        payment.status = status;
        self.store.update_payment(payment.clone())?;
        info!(payment = %payment.id.0, status = status.label(), actor = %actor.id.0, "payment status updated");
        if crossed_completion {
            self.reconcile_bill(&payment.bill_id, now)?;
        }
        Ok(payment)
    }

    /// Issue a refund as a new negative completed payment linked back to the
    /// original. The refundable balance shrinks with every prior refund.
    pub fn refund_payment(
        &self,
        id: &PaymentId,
        amount: Decimal,
        reason: &str,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Payment, BillingError> {
        if amount <= Decimal::ZERO {
            return Err(BillingError::Validation(
                "refund amount must be positive".to_string(),
            ));
        }
        let mut original = self.require_payment(id)?;
        if original.is_refund() {
            return Err(BillingError::InvalidState(
                "refunds cannot themselves be refunded".to_string(),
            ));
        }
        if !original.status.is_completed() {
            return Err(BillingError::InvalidState(
                "only completed payments can be refunded".to_string(),
            ));
        }

        let amount = to_currency(amount);
        let siblings = self.store.payments_for_bill(&original.bill_id)?;
        let already_refunded: Decimal = siblings
            .iter()
            .filter(|payment| payment.status.is_completed())
            .filter(|payment| {
                payment.metadata.get(Payment::META_ORIGINAL_PAYMENT) == Some(&original.id.0)
            })
            .map(|payment| -payment.amount)
            .sum();
        let refundable = original.amount - already_refunded;
        if amount > refundable {
            return Err(BillingError::InvalidState(format!(
                "refund of {amount} exceeds refundable balance {refundable}"
            )));
        }

        let refund_id = next_payment_id();
        let mut metadata = BTreeMap::new();
        metadata.insert(
            Payment::META_ORIGINAL_PAYMENT.to_string(),
            original.id.0.clone(),
        );
        metadata.insert(Payment::META_REFUND_REASON.to_string(), reason.to_string());

        let refund = Payment {
            transaction_id: format!("refund-{}", refund_id.0),
            id: refund_id,
            bill_id: original.bill_id.clone(),
            resident_id: original.resident_id.clone(),
            amount: -amount,
            currency: original.currency.clone(),
            status: PaymentStatus::Completed,
            payment_date: now,
            processed_by: actor.id.clone(),
            metadata,
            created_at: now,
            deleted_at: None,
        };
        let stored = self.store.insert_payment(refund)?;

        original
            .metadata
            .insert(Payment::META_REFUNDED.to_string(), "true".to_string());
        self.store.update_payment(original)?;

        self.reconcile_bill(&stored.bill_id, now)?;
        Ok(stored)
    }

    /// Month-by-month sales and rental revenue for a reporting year.
    pub fn monthly_revenue_summary(&self, year: i32) -> Result<RevenueSummary, BillingError> {
        let terms = self.directory.terms()?;
        Ok(proration::monthly_revenue_summary(year, &terms))
    }

    /// Dispatch is fire-and-forget: a failed notification is logged and the
    /// financial write it follows stands.
    fn notify(&self, event: BillingEvent) {
        if let Err(err) = self.notifier.publish(event.clone()) {
            warn!(error = %err, ?event, "notification dispatch failed");
        }
    }

    fn escalate_overdue(&self, bill: &Bill) {
        let admins = match self.directory.admin_roster() {
            Ok(admins) => admins,
            Err(err) => {
                warn!(error = %err, "admin roster unavailable, skipping escalation");
                return;
            }
        };
        if admins.is_empty() {
            return;
        }
        let index = match self.store.advance_rotation(OVERDUE_ROTATION_KEY, admins.len()) {
            Ok(index) => index,
            Err(err) => {
                warn!(error = %err, "rotation counter unavailable, skipping escalation");
                return;
            }
        };
        let Some(admin) = admins.get(index) else {
            return;
        };
        self.notify(BillingEvent::OverdueEscalated {
            bill_id: bill.id.clone(),
            admin_id: admin.clone(),
        });
    }

    fn require_property(&self, id: &PropertyId) -> Result<Property, BillingError> {
        self.directory
            .property(id)?
            .ok_or_else(|| BillingError::NotFound {
                kind: "property",
                id: id.0.clone(),
            })
    }

    fn require_resident(&self, id: &ResidentId) -> Result<Resident, BillingError> {
        self.directory
            .resident(id)?
            .ok_or_else(|| BillingError::NotFound {
                kind: "resident",
                id: id.0.clone(),
            })
    }

    fn require_service(&self, id: &ServiceId) -> Result<ServiceOffering, BillingError> {
        self.directory
            .service(id)?
            .ok_or_else(|| BillingError::NotFound {
                kind: "service",
                id: id.0.clone(),
            })
    }

    fn require_bill(&self, id: &BillId) -> Result<Bill, BillingError> {
        self.store
            .fetch_bill(id)?
            .ok_or_else(|| BillingError::NotFound {
                kind: "bill",
                id: id.0.clone(),
            })
    }

    fn require_payment(&self, id: &PaymentId) -> Result<Payment, BillingError> {
        self.store
            .fetch_payment(id)?
            .ok_or_else(|| BillingError::NotFound {
                kind: "payment",
                id: id.0.clone(),
            })
    }
}

/// Map a lost conditional update onto the engine's Conflict kind; everything
/// else stays a store failure.
fn claim_error(err: StoreError) -> BillingError {
    match err {
        StoreError::Conflict => BillingError::Conflict,
        other => BillingError::Store(other),
    }
}
