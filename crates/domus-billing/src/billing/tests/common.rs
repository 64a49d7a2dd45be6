use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::billing::domain::{
    Actor, ActorId, ActorRole, AttachmentBillingType, AttachmentId, AttachmentStatus, Bill,
    BillId, BillStatus, BillType, Payment, PaymentId, PaymentStatus, Property, PropertyId,
    Recurrence, RelationshipKind, Resident, ResidencyTerm, ResidentId, ServiceAttachment,
    ServiceId, ServiceOffering, TermId,
};
use crate::billing::repository::{
    BillingEvent, BillingStore, Directory, NotificationPublisher, NotifyError, StoreError,
};
use crate::billing::service::{BillingService, BillingSettings, NewBill, NewPayment};

pub(super) fn run_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn admin() -> Actor {
    Actor {
        id: ActorId("admin-1".to_string()),
        role: ActorRole::Admin,
    }
}

pub(super) fn settings() -> BillingSettings {
    BillingSettings {
        due_offset_days: 15,
        currency: "USD".to_string(),
    }
}

pub(super) fn property() -> Property {
    Property {
        id: PropertyId("prop-100".to_string()),
        name: "Maple Court 4B".to_string(),
        area: dec!(250),
    }
}

pub(super) fn owner() -> Resident {
    Resident {
        id: ResidentId("res-owner".to_string()),
        name: "Dana Whitfield".to_string(),
    }
}

pub(super) fn renter() -> Resident {
    Resident {
        id: ResidentId("res-renter".to_string()),
        name: "Priya Shah".to_string(),
    }
}

pub(super) fn security_service() -> ServiceOffering {
    ServiceOffering {
        id: ServiceId("svc-security".to_string()),
        name: "Security patrol".to_string(),
        bill_type: BillType::Security,
        is_recurring: false,
        recurrence: None,
    }
}

pub(super) fn water_service() -> ServiceOffering {
    ServiceOffering {
        id: ServiceId("svc-water".to_string()),
        name: "Water supply".to_string(),
        bill_type: BillType::Water,
        is_recurring: true,
        recurrence: Some(Recurrence::Monthly),
    }
}

pub(super) fn prepaid_attachment() -> ServiceAttachment {
    ServiceAttachment {
        id: AttachmentId("att-security".to_string()),
        property_id: property().id,
        service_id: security_service().id,
        billing_type: AttachmentBillingType::Prepaid,
        price: dec!(180.00),
        status: AttachmentStatus::Active,
        activated_at: run_at(),
        expires_at: None,
        last_billed_at: None,
    }
}

pub(super) fn water_attachment() -> ServiceAttachment {
    ServiceAttachment {
        id: AttachmentId("att-water".to_string()),
        property_id: property().id,
        service_id: water_service().id,
        billing_type: AttachmentBillingType::AreaBased,
        price: dec!(12.50),
        status: AttachmentStatus::Active,
        activated_at: run_at(),
        expires_at: None,
        last_billed_at: None,
    }
}

pub(super) fn owner_term() -> ResidencyTerm {
    ResidencyTerm {
        id: TermId("term-owner".to_string()),
        property_id: property().id,
        resident_id: owner().id,
        relationship: Some(RelationshipKind::Buyer),
        sale_price: Some(dec!(250000.00)),
        ownership_share: Some(dec!(1.0)),
        monthly_rent: None,
        start_date: date(2024, 6, 1),
        end_date: None,
        created_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
            .single()
            .expect("valid timestamp"),
    }
}

pub(super) fn renter_term() -> ResidencyTerm {
    ResidencyTerm {
        id: TermId("term-renter".to_string()),
        property_id: property().id,
        resident_id: renter().id,
        relationship: Some(RelationshipKind::Renter),
        sale_price: None,
        ownership_share: None,
        monthly_rent: Some(dec!(1200.00)),
        start_date: date(2025, 1, 15),
        end_date: None,
        created_at: Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0)
            .single()
            .expect("valid timestamp"),
    }
}

pub(super) fn bill_fixture(id: &str, amount: Decimal, due_date: NaiveDate) -> Bill {
    Bill {
        id: BillId(id.to_string()),
        property_id: property().id,
        resident_id: renter().id,
        bill_type: BillType::Rent,
        amount,
        currency: "USD".to_string(),
        due_date,
        status: BillStatus::Pending,
        recurrence: None,
        next_billing_date: None,
        created_by: admin().id,
        created_at: run_at(),
        deleted_at: None,
    }
}

pub(super) fn payment_fixture(id: &str, bill_id: &BillId, amount: Decimal) -> Payment {
    Payment {
        id: PaymentId(id.to_string()),
        bill_id: bill_id.clone(),
        resident_id: renter().id,
        amount,
        currency: "USD".to_string(),
        status: PaymentStatus::Completed,
        transaction_id: format!("txn-{id}"),
        payment_date: run_at(),
        processed_by: admin().id,
        metadata: BTreeMap::new(),
        created_at: run_at(),
        deleted_at: None,
    }
}

pub(super) fn new_bill(amount: Decimal, due_date: NaiveDate) -> NewBill {
    NewBill {
        property_id: property().id,
        resident_id: renter().id,
        bill_type: BillType::Rent,
        amount,
        currency: "USD".to_string(),
        due_date,
        recurrence: None,
        next_billing_date: None,
    }
}

pub(super) fn new_payment(bill_id: &BillId, amount: Decimal, transaction_id: &str) -> NewPayment {
    NewPayment {
        bill_id: bill_id.clone(),
        amount,
        currency: "USD".to_string(),
        status: PaymentStatus::Completed,
        transaction_id: transaction_id.to_string(),
        payment_date: run_at(),
    }
}

/// Service wired against fully seeded memory adapters: one property, one
/// owner, one renter, a prepaid security attachment, a recurring area-based
/// water attachment, and two admins in the escalation rotation.
pub(super) fn build_service() -> (
    BillingService<MemoryStore, MemoryDirectory, MemoryNotifier>,
    Arc<MemoryStore>,
    Arc<MemoryDirectory>,
    Arc<MemoryNotifier>,
) {
    let store = Arc::new(MemoryStore::default());
    let directory = Arc::new(MemoryDirectory::default());
    let notifier = Arc::new(MemoryNotifier::default());

    directory.add_property(property());
    directory.add_resident(owner());
    directory.add_resident(renter());
    directory.add_service(security_service());
    directory.add_service(water_service());
    directory.add_term(owner_term());
    directory.add_term(renter_term());
    directory.set_admins(vec![
        ActorId("admin-1".to_string()),
        ActorId("admin-2".to_string()),
    ]);

    store.add_attachment(prepaid_attachment());
    store.add_attachment(water_attachment());

    let service = BillingService::new(
        store.clone(),
        directory.clone(),
        notifier.clone(),
        settings(),
    );
    (service, store, directory, notifier)
}

#[derive(Default, Clone)]
pub(super) struct MemoryStore {
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

impl MemoryStore {
    pub(super) fn add_attachment(&self, attachment: ServiceAttachment) {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        guard.attachments.insert(attachment.id.clone(), attachment);
    }

    pub(super) fn attachment(&self, id: &AttachmentId) -> Option<ServiceAttachment> {
        let guard = self.inner.lock().expect("store mutex poisoned");
        guard.attachments.get(id).cloned()
    }

    pub(super) fn bills(&self) -> Vec<Bill> {
        let guard = self.inner.lock().expect("store mutex poisoned");
        guard.bills.values().cloned().collect()
    }
}

impl BillingStore for MemoryStore {
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
            .filter(|bill| bill.next_billing_date.map(|next| next <= today).unwrap_or(false))
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
pub(super) struct MemoryDirectory {
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

impl MemoryDirectory {
    pub(super) fn add_property(&self, property: Property) {
        let mut guard = self.inner.lock().expect("directory mutex poisoned");
        guard.properties.insert(property.id.clone(), property);
    }

    pub(super) fn add_resident(&self, resident: Resident) {
        let mut guard = self.inner.lock().expect("directory mutex poisoned");
        guard.residents.insert(resident.id.clone(), resident);
    }

    pub(super) fn add_service(&self, service: ServiceOffering) {
        let mut guard = self.inner.lock().expect("directory mutex poisoned");
        guard.services.insert(service.id.clone(), service);
    }

    pub(super) fn add_term(&self, term: ResidencyTerm) {
        let mut guard = self.inner.lock().expect("directory mutex poisoned");
        guard.terms.push(term);
    }

    pub(super) fn set_admins(&self, admins: Vec<ActorId>) {
        let mut guard = self.inner.lock().expect("directory mutex poisoned");
        guard.admins = admins;
    }
}

impl Directory for MemoryDirectory {
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
pub(super) struct MemoryNotifier {
    events: Arc<Mutex<Vec<BillingEvent>>>,
}

impl MemoryNotifier {
    pub(super) fn events(&self) -> Vec<BillingEvent> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }
}

impl NotificationPublisher for MemoryNotifier {
    fn publish(&self, event: BillingEvent) -> Result<(), NotifyError> {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(event);
        Ok(())
    }
}

/// Notifier whose transport is always down, for fire-and-forget tests.
pub(super) struct FailingNotifier;

impl NotificationPublisher for FailingNotifier {
    fn publish(&self, _event: BillingEvent) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp offline".to_string()))
    }
}
