//! Billing and payment reconciliation engine.
//!
//! The modules here split the engine the same way the runtime does: pure
//! rule modules (ledger, eligibility, reconciler, schedule, proration) that
//! never touch storage, the port traits the engine consumes, and a service
//! facade that wires them together behind the HTTP router.

pub mod domain;
pub mod eligibility;
pub mod ledger;
pub mod proration;
pub mod reconciler;
pub mod repository;
pub mod router;
pub mod schedule;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    Actor, ActorId, ActorRole, AttachmentBillingType, AttachmentId, AttachmentStatus, Bill,
    BillId, BillStatus, BillType, Payment, PaymentId, PaymentStatus, Property, PropertyId,
    Recurrence, RelationshipKind, Resident, ResidencyTerm, ResidentId, ServiceAttachment,
    ServiceId, ServiceOffering, TermId,
};
pub use eligibility::{DefaultEligibility, EligibilityPolicy};
pub use ledger::BillStatement;
pub use proration::{MonthlyRevenue, RevenueSummary};
pub use repository::{
    BillingEvent, BillingStore, Directory, NotificationPublisher, NotifyError, StoreError,
};
pub use router::billing_router;
pub use service::{
    BillPatch, BillingError, BillingService, BillingSettings, NewBill, NewPayment,
};
