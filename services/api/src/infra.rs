use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal_macros::dec;

use domus_billing::billing::{
    ActorId, AttachmentBillingType, AttachmentId, AttachmentStatus, Bill, BillId, BillType,
    BillingEvent, BillingStore, Directory, NotificationPublisher, NotifyError, Payment,
    PaymentId, Property, PropertyId, Recurrence, RelationshipKind, Resident, ResidencyTerm,
    ResidentId, ServiceAttachment, ServiceId, ServiceOffering, StoreError, TermId,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryBillingStore {
    inner: Arc<Mutex<StoreInner>>,
}

#[derive(Default)]
struct StoreInner {
    bills: HashMap<BillId, Bill>,
    payments: HashMap<PaymentId, Payment>,
    transactions: HashSet<String>,
    attachments: HashMap<AttachmentId, ServiceAttachment>,
    rotations: HashMap<String, usize>,
}

impl InMemoryBillingStore {
    pub(crate) fn add_attachment(&self, attachment: ServiceAttachment) {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        guard.attachments.insert(attachment.id.clone(), attachment);
    }

    pub(crate) fn bills(&self) -> Vec<Bill> {
        let guard = self.inner.lock().expect("store mutex poisoned");
        guard.bills.values().cloned().collect()
    }
}

impl BillingStore for InMemoryBillingStore {
    fn insert_bill(&self, bill: Bill) -> Result<Bill, StoreError> {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        if guard.bills.contains_key(&bill.id) {
            return Err(StoreError::Conflict);
        }
        guard.bills.insert(bill.id.clone(), bill.clone());
        Ok(bill)
    }

    fn update_bill(&self, bill: Bill) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        if !guard.bills.contains_key(&bill.id) {
            return Err(StoreError::NotFound);
        }
        guard.bills.insert(bill.id.clone(), bill);
        Ok(())
    }

    fn fetch_bill(&self, id: &BillId) -> Result<Option<Bill>, StoreError> {
        let guard = self.inner.lock().expect("store mutex poisoned");
        Ok(guard.bills.get(id).cloned())
    }

    fn recurring_templates(&self, today: NaiveDate) -> Result<Vec<Bill>, StoreError> {
        let guard = self.inner.lock().expect("store mutex poisoned");
        Ok(guard
            .bills
            .values()
            .filter(|bill| bill.recurrence.is_some())
            .filter(|bill| {
                bill.next_billing_date
                    .map(|next| next <= today)
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    fn insert_payment(&self, payment: Payment) -> Result<Payment, StoreError> {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        if guard.payments.contains_key(&payment.id)
            || guard.transactions.contains(&payment.transaction_id)
        {
            return Err(StoreError::Conflict);
        }
        guard.transactions.insert(payment.transaction_id.clone());
        guard.payments.insert(payment.id.clone(), payment.clone());
        Ok(payment)
    }

    fn update_payment(&self, payment: Payment) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        if !guard.payments.contains_key(&payment.id) {
            return Err(StoreError::NotFound);
        }
        guard.payments.insert(payment.id.clone(), payment);
        Ok(())
    }

    fn fetch_payment(&self, id: &PaymentId) -> Result<Option<Payment>, StoreError> {
        let guard = self.inner.lock().expect("store mutex poisoned");
        Ok(guard.payments.get(id).cloned())
    }

    fn payments_for_bill(&self, bill_id: &BillId) -> Result<Vec<Payment>, StoreError> {
        let guard = self.inner.lock().expect("store mutex poisoned");
        Ok(guard
            .payments
            .values()
            .filter(|payment| &payment.bill_id == bill_id)
            .cloned()
            .collect())
    }

    fn attachments_for_property(
        &self,
        property_id: &PropertyId,
    ) -> Result<Vec<ServiceAttachment>, StoreError> {
        let guard = self.inner.lock().expect("store mutex poisoned");
        Ok(guard
            .attachments
            .values()
            .filter(|attachment| &attachment.property_id == property_id)
            .cloned()
            .collect())
    }

    fn claim_attachment(
        &self,
        id: &AttachmentId,
        expected_anchor: Option<DateTime<Utc>>,
        run_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        let attachment = guard.attachments.get_mut(id).ok_or(StoreError::NotFound)?;
        if attachment.last_billed_at != expected_anchor {
            return Err(StoreError::Conflict);
        }
        attachment.last_billed_at = Some(run_at);
        Ok(())
    }

    fn claim_bill_regeneration(
        &self,
        id: &BillId,
        expected_next: NaiveDate,
        new_next: NaiveDate,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        let bill = guard.bills.get_mut(id).ok_or(StoreError::NotFound)?;
        if bill.next_billing_date != Some(expected_next) {
            return Err(StoreError::Conflict);
        }
        bill.next_billing_date = Some(new_next);
        Ok(())
    }

    fn advance_rotation(&self, key: &str, len: usize) -> Result<usize, StoreError> {
        if len == 0 {
            return Err(StoreError::Unavailable("empty rotation".to_string()));
        }
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        let counter = guard.rotations.entry(key.to_string()).or_insert(0);
        let index = *counter % len;
        *counter += 1;
        Ok(index)
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryDirectory {
    inner: Arc<Mutex<DirectoryInner>>,
}

#[derive(Default)]
struct DirectoryInner {
    properties: HashMap<PropertyId, Property>,
    residents: HashMap<ResidentId, Resident>,
    services: HashMap<ServiceId, ServiceOffering>,
    terms: Vec<ResidencyTerm>,
    admins: Vec<ActorId>,
}

impl InMemoryDirectory {
    pub(crate) fn add_property(&self, property: Property) {
        let mut guard = self.inner.lock().expect("directory mutex poisoned");
        guard.properties.insert(property.id.clone(), property);
    }

    pub(crate) fn add_resident(&self, resident: Resident) {
        let mut guard = self.inner.lock().expect("directory mutex poisoned");
        guard.residents.insert(resident.id.clone(), resident);
    }

    pub(crate) fn add_service(&self, service: ServiceOffering) {
        let mut guard = self.inner.lock().expect("directory mutex poisoned");
        guard.services.insert(service.id.clone(), service);
    }

    pub(crate) fn add_term(&self, term: ResidencyTerm) {
        let mut guard = self.inner.lock().expect("directory mutex poisoned");
        guard.terms.push(term);
    }

    pub(crate) fn set_admins(&self, admins: Vec<ActorId>) {
        let mut guard = self.inner.lock().expect("directory mutex poisoned");
        guard.admins = admins;
    }
}

impl Directory for InMemoryDirectory {
    fn property(&self, id: &PropertyId) -> Result<Option<Property>, StoreError> {
        let guard = self.inner.lock().expect("directory mutex poisoned");
        Ok(guard.properties.get(id).cloned())
    }

    fn resident(&self, id: &ResidentId) -> Result<Option<Resident>, StoreError> {
        let guard = self.inner.lock().expect("directory mutex poisoned");
        Ok(guard.residents.get(id).cloned())
    }

    fn service(&self, id: &ServiceId) -> Result<Option<ServiceOffering>, StoreError> {
        let guard = self.inner.lock().expect("directory mutex poisoned");
        Ok(guard.services.get(id).cloned())
    }

    fn terms_for_property(
        &self,
        property_id: &PropertyId,
    ) -> Result<Vec<ResidencyTerm>, StoreError> {
        let guard = self.inner.lock().expect("directory mutex poisoned");
        Ok(guard
            .terms
            .iter()
            .filter(|term| &term.property_id == property_id)
            .cloned()
            .collect())
    }

    fn terms(&self) -> Result<Vec<ResidencyTerm>, StoreError> {
        let guard = self.inner.lock().expect("directory mutex poisoned");
        Ok(guard.terms.clone())
    }

    fn admin_roster(&self) -> Result<Vec<ActorId>, StoreError> {
        let guard = self.inner.lock().expect("directory mutex poisoned");
        Ok(guard.admins.clone())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryNotificationPublisher {
    events: Arc<Mutex<Vec<BillingEvent>>>,
}

impl InMemoryNotificationPublisher {
    pub(crate) fn events(&self) -> Vec<BillingEvent> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }
}

impl NotificationPublisher for InMemoryNotificationPublisher {
    fn publish(&self, event: BillingEvent) -> Result<(), NotifyError> {
        let mut guard = self.events.lock().expect("notifier mutex poisoned");
        guard.push(event);
        Ok(())
    }
}

/// Fill the in-memory adapters with a small demo portfolio: two properties,
/// an owner, two renters, and a mix of prepaid and recurring attachments.
pub(crate) fn seed_portfolio(directory: &InMemoryDirectory, store: &InMemoryBillingStore) {
    let seeded_at = Utc
        .with_ymd_and_hms(2025, 1, 1, 8, 0, 0)
        .single()
        .unwrap_or_else(Utc::now);

    directory.add_property(Property {
        id: PropertyId("prop-100".to_string()),
        name: "Maple Court 4B".to_string(),
        area: dec!(250),
    });
    directory.add_property(Property {
        id: PropertyId("prop-200".to_string()),
        name: "Juniper Row 12".to_string(),
        area: dec!(140),
    });

    directory.add_resident(Resident {
        id: ResidentId("res-owner".to_string()),
        name: "Dana Whitfield".to_string(),
    });
    directory.add_resident(Resident {
        id: ResidentId("res-renter".to_string()),
        name: "Priya Shah".to_string(),
    });
    directory.add_resident(Resident {
        id: ResidentId("res-renter-2".to_string()),
        name: "Marcus Lee".to_string(),
    });

    directory.add_service(ServiceOffering {
        id: ServiceId("svc-security".to_string()),
        name: "Security patrol".to_string(),
        bill_type: BillType::Security,
        is_recurring: false,
        recurrence: None,
    });
    directory.add_service(ServiceOffering {
        id: ServiceId("svc-water".to_string()),
        name: "Water supply".to_string(),
        bill_type: BillType::Water,
        is_recurring: true,
        recurrence: Some(Recurrence::Monthly),
    });
    directory.add_service(ServiceOffering {
        id: ServiceId("svc-cleaning".to_string()),
        name: "Common-area cleaning".to_string(),
        bill_type: BillType::Cleaning,
        is_recurring: true,
        recurrence: Some(Recurrence::Quarterly),
    });

    directory.add_term(ResidencyTerm {
        id: TermId("term-owner".to_string()),
        property_id: PropertyId("prop-100".to_string()),
        resident_id: ResidentId("res-owner".to_string()),
        relationship: Some(RelationshipKind::Buyer),
        sale_price: Some(dec!(250000.00)),
        ownership_share: Some(dec!(1.0)),
        monthly_rent: None,
        start_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap_or_default(),
        end_date: None,
        created_at: seeded_at,
    });
    directory.add_term(ResidencyTerm {
        id: TermId("term-renter".to_string()),
        property_id: PropertyId("prop-100".to_string()),
        resident_id: ResidentId("res-renter".to_string()),
        relationship: Some(RelationshipKind::Renter),
        sale_price: None,
        ownership_share: None,
        monthly_rent: Some(dec!(1200.00)),
        start_date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap_or_default(),
        end_date: None,
        created_at: seeded_at,
    });
    directory.add_term(ResidencyTerm {
        id: TermId("term-renter-2".to_string()),
        property_id: PropertyId("prop-200".to_string()),
        resident_id: ResidentId("res-renter-2".to_string()),
        relationship: Some(RelationshipKind::Renter),
        sale_price: None,
        ownership_share: None,
        monthly_rent: Some(dec!(950.00)),
        start_date: NaiveDate::from_ymd_opt(2024, 11, 1).unwrap_or_default(),
        end_date: NaiveDate::from_ymd_opt(2025, 5, 31),
        created_at: seeded_at,
    });

    directory.set_admins(vec![
        ActorId("admin-1".to_string()),
        ActorId("admin-2".to_string()),
    ]);

    store.add_attachment(ServiceAttachment {
        id: AttachmentId("att-security".to_string()),
        property_id: PropertyId("prop-100".to_string()),
        service_id: ServiceId("svc-security".to_string()),
        billing_type: AttachmentBillingType::Prepaid,
        price: dec!(180.00),
        status: AttachmentStatus::Active,
        activated_at: seeded_at,
        expires_at: None,
        last_billed_at: None,
    });
    store.add_attachment(ServiceAttachment {
        id: AttachmentId("att-water".to_string()),
        property_id: PropertyId("prop-100".to_string()),
        service_id: ServiceId("svc-water".to_string()),
        billing_type: AttachmentBillingType::AreaBased,
        price: dec!(12.50),
        status: AttachmentStatus::Active,
        activated_at: seeded_at,
        expires_at: None,
        last_billed_at: None,
    });
    store.add_attachment(ServiceAttachment {
        id: AttachmentId("att-cleaning".to_string()),
        property_id: PropertyId("prop-200".to_string()),
        service_id: ServiceId("svc-cleaning".to_string()),
        billing_type: AttachmentBillingType::Fixed,
        price: dec!(60.00),
        status: AttachmentStatus::Active,
        activated_at: seeded_at,
        expires_at: None,
        last_billed_at: None,
    });
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
