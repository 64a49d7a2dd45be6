use crate::infra::{
    parse_date, seed_portfolio, InMemoryBillingStore, InMemoryDirectory,
    InMemoryNotificationPublisher,
};
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use clap::Args;
use std::sync::Arc;

use domus_billing::billing::{
    Actor, ActorId, ActorRole, BillingService, BillingSettings, NewPayment, PaymentStatus,
    PropertyId, RevenueSummary,
};
use domus_billing::error::AppError;
use rust_decimal_macros::dec;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Billing run date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) as_of: Option<NaiveDate>,
    /// Reporting year for the revenue summary. Defaults to the run year.
    #[arg(long)]
    pub(crate) year: Option<i32>,
}

#[derive(Args, Debug)]
pub(crate) struct RevenueReportArgs {
    /// Reporting year
    #[arg(long)]
    pub(crate) year: i32,
}

type DemoService =
    BillingService<InMemoryBillingStore, InMemoryDirectory, InMemoryNotificationPublisher>;

fn build_demo_service() -> (
    Arc<DemoService>,
    Arc<InMemoryBillingStore>,
    Arc<InMemoryNotificationPublisher>,
) {
    let store = Arc::new(InMemoryBillingStore::default());
    let directory = Arc::new(InMemoryDirectory::default());
    let notifier = Arc::new(InMemoryNotificationPublisher::default());
    seed_portfolio(&directory, &store);
    let service = Arc::new(BillingService::new(
        store.clone(),
        directory,
        notifier.clone(),
        BillingSettings::default(),
    ));
    (service, store, notifier)
}

fn operator() -> Actor {
    Actor {
        id: ActorId("admin-1".to_string()),
        role: ActorRole::Admin,
    }
}

fn run_timestamp(as_of: Option<NaiveDate>) -> DateTime<Utc> {
    match as_of.and_then(|date| {
        Utc.with_ymd_and_hms(date.year(), date.month(), date.day(), 9, 0, 0)
            .single()
    }) {
        Some(at) => at,
        None => Utc::now(),
    }
}

pub(crate) fn run_revenue_report(args: RevenueReportArgs) -> Result<(), AppError> {
    let (service, _, _) = build_demo_service();
    let summary = service.monthly_revenue_summary(args.year)?;
    render_revenue_summary(&summary);
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { as_of, year } = args;
    let now = run_timestamp(as_of);
    let year = year.unwrap_or_else(|| now.year());
    let actor = operator();

    println!("Billing engine demo");
    println!("Run timestamp: {now}");

    let (service, store, notifier) = build_demo_service();

    println!("\nBilling sweep");
    for property in ["prop-100", "prop-200"] {
        let created =
            service.generate_bills_for_property(&PropertyId(property.to_string()), &actor, now)?;
        println!("- {property}: {created} bill(s) created");
    }

    let mut bills = store.bills();
    bills.sort_by(|a, b| a.id.0.cmp(&b.id.0));
    println!("\nOpen bills");
    for bill in &bills {
        let statement = service.bill_statement(&bill.id, now)?;
        println!(
            "- {} | {} | {} | {} {} due {} | status {}",
            bill.id.0,
            bill.bill_type.label(),
            bill.resident_id.0,
            statement.remaining_balance,
            bill.currency,
            bill.due_date,
            statement.status
        );
    }

    if let Some(first) = bills.first() {
        println!("\nPayment capture");
        let payment = service.process_payment(
            NewPayment {
                bill_id: first.id.clone(),
                amount: first.amount,
                currency: first.currency.clone(),
                status: PaymentStatus::Completed,
                transaction_id: format!("demo-txn-{}", first.id.0),
                payment_date: now,
            },
            &actor,
            now,
        )?;
        let statement = service.bill_statement(&first.id, now)?;
        println!(
            "- settled {} with {} -> status {}, remaining {}",
            first.id.0, payment.id.0, statement.status, statement.remaining_balance
        );

        let half = (first.amount / dec!(2)).round_dp(2);
        let refund = service.refund_payment(&payment.id, half, "demo adjustment", &actor, now)?;
        let statement = service.bill_statement(&first.id, now)?;
        println!(
            "- refunded {} via {} -> status {}, remaining {}",
            half, refund.id.0, statement.status, statement.remaining_balance
        );
    }

    println!("\nRe-running the sweep (idempotence check)");
    for property in ["prop-100", "prop-200"] {
        let created =
            service.generate_bills_for_property(&PropertyId(property.to_string()), &actor, now)?;
        println!("- {property}: {created} bill(s) created");
    }

    println!("\nRevenue summary {year}");
    let summary = service.monthly_revenue_summary(year)?;
    render_revenue_summary(&summary);

    let events = notifier.events();
    if events.is_empty() {
        println!("\nNotifications: none dispatched");
    } else {
        println!("\nNotifications dispatched");
        for event in events {
            println!("- {event:?}");
        }
    }

    Ok(())
}

fn render_revenue_summary(summary: &RevenueSummary) {
    println!("Sales revenue by month");
    for month in &summary.sales {
        println!("- {}: {}", month.month_label, month.total);
    }
    println!("Rental revenue by month (day-weighted)");
    for month in &summary.rental {
        println!("- {}: {}", month.month_label, month.total);
    }
}
