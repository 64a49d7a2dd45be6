use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::domain::{
    AttachmentBillingType, BillType, Property, RelationshipKind, ResidencyTerm,
};
use super::ledger::to_currency;

/// What a relationship with no matching table entry may be billed for.
/// `AllServices` reproduces the historical behavior where an unknown or
/// absent relationship was billable for everything; making it a named rule
/// keeps that policy auditable instead of implicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultEligibility {
    AllServices,
    NoServices,
}

/// Explicit relationship-to-billable-category table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityPolicy {
    pub owner_bill_types: BTreeSet<BillType>,
    pub renter_bill_types: BTreeSet<BillType>,
    pub default_rule: DefaultEligibility,
}

impl EligibilityPolicy {
    /// The standard table: owners cover property-level services, renters
    /// cover consumption utilities, everything else falls to the default.
    pub fn standard() -> Self {
        Self {
            owner_bill_types: BTreeSet::from([
                BillType::Security,
                BillType::Cleaning,
                BillType::Other,
            ]),
            renter_bill_types: BTreeSet::from([
                BillType::Electricity,
                BillType::Gas,
                BillType::Water,
            ]),
            default_rule: DefaultEligibility::AllServices,
        }
    }

    pub fn allows(&self, relationship: Option<RelationshipKind>, bill_type: BillType) -> bool {
        match relationship {
            Some(RelationshipKind::Buyer) | Some(RelationshipKind::CoBuyer) => {
                self.owner_bill_types.contains(&bill_type)
            }
            Some(RelationshipKind::Renter) => self.renter_bill_types.contains(&bill_type),
            Some(RelationshipKind::Other) | None => {
                self.default_rule == DefaultEligibility::AllServices
            }
        }
    }

    /// Residency terms on a property that owe for the given category.
    pub fn eligible_terms<'a>(
        &self,
        terms: &'a [ResidencyTerm],
        bill_type: BillType,
    ) -> Vec<&'a ResidencyTerm> {
        terms
            .iter()
            .filter(|term| self.allows(term.relationship, bill_type))
            .collect()
    }
}

/// Amount to charge for one attachment. Area-based services are priced per
/// 100 area units; the division rounds to currency precision rather than
/// truncating. Anything unrecognized is priced like a fixed service.
pub fn bill_amount(
    billing_type: AttachmentBillingType,
    base_price: Decimal,
    property: &Property,
) -> Decimal {
    match billing_type {
        AttachmentBillingType::AreaBased => {
            to_currency(base_price * property.area / Decimal::from(100))
        }
        AttachmentBillingType::Fixed
        | AttachmentBillingType::Prepaid
        | AttachmentBillingType::Other => to_currency(base_price),
    }
}
