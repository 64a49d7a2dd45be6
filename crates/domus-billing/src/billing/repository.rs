use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    ActorId, AttachmentId, Bill, BillId, Payment, PaymentId, Property, PropertyId, Resident,
    ResidentId, ResidencyTerm, ServiceAttachment, ServiceId, ServiceOffering,
};

/// Storage abstraction over the financial rows the engine owns. Every read
/// that feeds a decision goes through here so callers always see fresh rows,
/// and the two `claim_*` operations are the conditional updates that
/// serialize concurrent billing runs.
pub trait BillingStore: Send + Sync {
    fn insert_bill(&self, bill: Bill) -> Result<Bill, StoreError>;
    fn update_bill(&self, bill: Bill) -> Result<(), StoreError>;
    fn fetch_bill(&self, id: &BillId) -> Result<Option<Bill>, StoreError>;
    /// Bills carrying a recurrence whose next billing date has arrived.
    fn recurring_templates(&self, today: NaiveDate) -> Result<Vec<Bill>, StoreError>;

    /// Insert a payment row. `transaction_id` is unique; a duplicate insert
    /// is a `Conflict` so retried captures stay idempotent.
    fn insert_payment(&self, payment: Payment) -> Result<Payment, StoreError>;
    fn update_payment(&self, payment: Payment) -> Result<(), StoreError>;
    fn fetch_payment(&self, id: &PaymentId) -> Result<Option<Payment>, StoreError>;
    /// Full payment history for a bill, soft-deleted rows included.
    fn payments_for_bill(&self, bill_id: &BillId) -> Result<Vec<Payment>, StoreError>;

    fn attachments_for_property(
        &self,
        property_id: &PropertyId,
    ) -> Result<Vec<ServiceAttachment>, StoreError>;

    /// Advance an attachment's billing anchor iff it still holds
    /// `expected_anchor`. Losing the race is a `Conflict`, which callers
    /// treat as "another run already handled this attachment".
    fn claim_attachment(
        &self,
        id: &AttachmentId,
        expected_anchor: Option<DateTime<Utc>>,
        run_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Advance a template bill's next billing date iff it still holds
    /// `expected_next`. Same conditional-update contract as
    /// [`BillingStore::claim_attachment`].
    fn claim_bill_regeneration(
        &self,
        id: &BillId,
        expected_next: NaiveDate,
        new_next: NaiveDate,
    ) -> Result<(), StoreError>;

    /// Durable keyed round-robin counter: returns the next index modulo
    /// `len` and persists the advance, so rotation survives restarts and is
    /// shared across service instances.
    fn advance_rotation(&self, key: &str, len: usize) -> Result<usize, StoreError>;
}

/// Read-only lookups owned by the surrounding CRUD services. Missing records
/// surface as `Ok(None)` and become typed not-found errors in the engine.
pub trait Directory: Send + Sync {
    fn property(&self, id: &PropertyId) -> Result<Option<Property>, StoreError>;
    fn resident(&self, id: &ResidentId) -> Result<Option<Resident>, StoreError>;
    fn service(&self, id: &ServiceId) -> Result<Option<ServiceOffering>, StoreError>;
    fn terms_for_property(
        &self,
        property_id: &PropertyId,
    ) -> Result<Vec<ResidencyTerm>, StoreError>;
    /// Every residency term, for revenue reporting.
    fn terms(&self) -> Result<Vec<ResidencyTerm>, StoreError>;
    /// Admins eligible for overdue escalations, in rotation order.
    fn admin_roster(&self) -> Result<Vec<ActorId>, StoreError>;
}

/// Error enumeration for store and directory failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists or a concurrent run won the update")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Typed events handed to the notification collaborator. Dispatch is
/// fire-and-forget; delivery failures never roll back a financial write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BillingEvent {
    BillIssued {
        bill_id: BillId,
        resident_id: ResidentId,
    },
    BillPaid {
        bill_id: BillId,
        resident_id: ResidentId,
    },
    BillOverdue {
        bill_id: BillId,
        resident_id: ResidentId,
    },
    OverdueEscalated {
        bill_id: BillId,
        admin_id: ActorId,
    },
}

/// Trait describing the outbound notification hook (e-mail/push adapters).
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, event: BillingEvent) -> Result<(), NotifyError>;
}

/// Notification dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
