use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Identifier wrapper for properties managed by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyId(pub String);

/// Identifier wrapper for residents (buyers, co-buyers, renters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResidentId(pub String);

/// Identifier wrapper for billable service offerings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceId(pub String);

/// Identifier wrapper for property-service attachments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttachmentId(pub String);

/// Identifier wrapper for resident-property residency terms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TermId(pub String);

/// Identifier wrapper for bills raised by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BillId(pub String);

/// Identifier wrapper for payments and refunds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PaymentId(pub String);

/// Identifier wrapper for resolved actors (operators and residents).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub String);

/// Service categories a bill can be raised for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillType {
    Maintenance,
    Water,
    Electricity,
    Gas,
    Internet,
    Security,
    Cleaning,
    Rent,
    PropertyTax,
    Insurance,
    Other,
}

impl BillType {
    pub const fn label(self) -> &'static str {
        match self {
            BillType::Maintenance => "maintenance",
            BillType::Water => "water",
            BillType::Electricity => "electricity",
            BillType::Gas => "gas",
            BillType::Internet => "internet",
            BillType::Security => "security",
            BillType::Cleaning => "cleaning",
            BillType::Rent => "rent",
            BillType::PropertyTax => "property_tax",
            BillType::Insurance => "insurance",
            BillType::Other => "other",
        }
    }
}

/// Lifecycle states a bill moves through. `Cancelled` is set only by an
/// explicit administrative action and is never overwritten by reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    Pending,
    PartiallyPaid,
    Paid,
    Overdue,
    Cancelled,
}

impl BillStatus {
    pub const fn label(self) -> &'static str {
        match self {
            BillStatus::Pending => "pending",
            BillStatus::PartiallyPaid => "partially_paid",
            BillStatus::Paid => "paid",
            BillStatus::Overdue => "overdue",
            BillStatus::Cancelled => "cancelled",
        }
    }
}

/// Re-billing cadence for recurring charges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    Monthly,
    Quarterly,
    Biannual,
    Annual,
}

impl Recurrence {
    /// Length of one billing period in calendar months.
    pub const fn months(self) -> u32 {
        match self {
            Recurrence::Monthly => 1,
            Recurrence::Quarterly => 3,
            Recurrence::Biannual => 6,
            Recurrence::Annual => 12,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Recurrence::Monthly => "monthly",
            Recurrence::Quarterly => "quarterly",
            Recurrence::Biannual => "biannual",
            Recurrence::Annual => "annual",
        }
    }
}

/// Canonical payment status vocabulary. `Completed` is the single
/// "money received" value; reconciliation counts exactly those rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub const fn is_completed(self) -> bool {
        matches!(self, PaymentStatus::Completed)
    }
}

/// How an attached service is priced. Unrecognized wire values land on
/// `Other` and are priced like `Fixed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentBillingType {
    Fixed,
    AreaBased,
    Prepaid,
    #[serde(other)]
    Other,
}

impl AttachmentBillingType {
    pub const fn label(self) -> &'static str {
        match self {
            AttachmentBillingType::Fixed => "fixed",
            AttachmentBillingType::AreaBased => "area_based",
            AttachmentBillingType::Prepaid => "prepaid",
            AttachmentBillingType::Other => "other",
        }
    }
}

/// Lifecycle of a property-service attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentStatus {
    Active,
    Inactive,
    PendingPayment,
    Expired,
}

impl AttachmentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            AttachmentStatus::Active => "active",
            AttachmentStatus::Inactive => "inactive",
            AttachmentStatus::PendingPayment => "pending_payment",
            AttachmentStatus::Expired => "expired",
        }
    }
}

/// How a resident is tied to a property. Unrecognized wire values land on
/// `Other` and fall through to the eligibility policy's default rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Buyer,
    CoBuyer,
    Renter,
    #[serde(other)]
    Other,
}

impl RelationshipKind {
    pub const fn label(self) -> &'static str {
        match self {
            RelationshipKind::Buyer => "buyer",
            RelationshipKind::CoBuyer => "co_buyer",
            RelationshipKind::Renter => "renter",
            RelationshipKind::Other => "other",
        }
    }
}

/// Role tag on an already-resolved caller. The engine never inspects where
/// the actor record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Admin,
    Manager,
    Resident,
}

impl ActorRole {
    pub const fn label(self) -> &'static str {
        match self {
            ActorRole::Admin => "admin",
            ActorRole::Manager => "manager",
            ActorRole::Resident => "resident",
        }
    }
}

/// Resolved caller identity handed in by the surrounding auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: ActorRole,
}

/// A single charge owed by a resident. Paid amount and remaining balance are
/// derived from the payment history, never stored on the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    pub id: BillId,
    pub property_id: PropertyId,
    pub resident_id: ResidentId,
    pub bill_type: BillType,
    pub amount: Decimal,
    pub currency: String,
    pub due_date: NaiveDate,
    pub status: BillStatus,
    pub recurrence: Option<Recurrence>,
    pub next_billing_date: Option<NaiveDate>,
    pub created_by: ActorId,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A monetary transaction applied against a bill. Negative amounts are
/// refunds; metadata links a refund back to its original payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub bill_id: BillId,
    pub resident_id: ResidentId,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub transaction_id: String,
    pub payment_date: DateTime<Utc>,
    pub processed_by: ActorId,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// Metadata key linking a refund row to the payment it reverses.
    pub const META_ORIGINAL_PAYMENT: &'static str = "original_payment_id";
    /// Metadata key carrying the operator-supplied refund reason.
    pub const META_REFUND_REASON: &'static str = "reason";
    /// Metadata key stamped onto an original payment once refunded.
    pub const META_REFUNDED: &'static str = "refunded";

    pub fn is_refund(&self) -> bool {
        self.amount < Decimal::ZERO
    }
}

/// Pivot record describing what a property is billed for and when it was
/// last billed. `last_billed_at` is the anchor for both pre-paid and
/// recurring cadence decisions; it only moves through an atomic claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceAttachment {
    pub id: AttachmentId,
    pub property_id: PropertyId,
    pub service_id: ServiceId,
    pub billing_type: AttachmentBillingType,
    pub price: Decimal,
    pub status: AttachmentStatus,
    pub activated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_billed_at: Option<DateTime<Utc>>,
}

/// Pivot record tying a resident to a property for a span of time. Drives
/// both service eligibility and day-weighted rent proration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidencyTerm {
    pub id: TermId,
    pub property_id: PropertyId,
    pub resident_id: ResidentId,
    pub relationship: Option<RelationshipKind>,
    pub sale_price: Option<Decimal>,
    pub ownership_share: Option<Decimal>,
    pub monthly_rent: Option<Decimal>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

/// Property snapshot consumed from the directory collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub name: String,
    pub area: Decimal,
}

/// Resident snapshot consumed from the directory collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resident {
    pub id: ResidentId,
    pub name: String,
}

/// A billable service offering (water, security, cleaning, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOffering {
    pub id: ServiceId,
    pub name: String,
    pub bill_type: BillType,
    pub is_recurring: bool,
    pub recurrence: Option<Recurrence>,
}
