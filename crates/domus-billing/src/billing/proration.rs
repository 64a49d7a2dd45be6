use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

use super::domain::{RelationshipKind, ResidencyTerm};
use super::ledger::to_currency;

/// Day-weighted revenue recognized for one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRevenue {
    pub month: u32,
    pub month_label: &'static str,
    pub total: Decimal,
}

/// Read-only revenue report: sales recognized point-in-time, rental revenue
/// prorated across occupancy days.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueSummary {
    pub year: i32,
    pub sales: Vec<MonthlyRevenue>,
    pub rental: Vec<MonthlyRevenue>,
}

fn month_label(month: u32) -> &'static str {
    match month {
        1 => "january",
        2 => "february",
        3 => "march",
        4 => "april",
        5 => "may",
        6 => "june",
        7 => "july",
        8 => "august",
        9 => "september",
        10 => "october",
        11 => "november",
        _ => "december",
    }
}

fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = start.checked_add_months(Months::new(1))?.pred_opt()?;
    Some((start, end))
}

/// Days of `[term_start, term_end]` falling inside the month window, both
/// bounds inclusive. Open-ended terms clamp to the window end.
pub fn active_days(
    term_start: NaiveDate,
    term_end: Option<NaiveDate>,
    month_start: NaiveDate,
    month_end: NaiveDate,
) -> i64 {
    let begin = term_start.max(month_start);
    let finish = term_end.unwrap_or(month_end).min(month_end);
    if finish < begin {
        return 0;
    }
    (finish - begin).num_days() + 1
}

/// `monthly_rent * active_days / days_in_month`, rounded to currency
/// precision. A full month of occupancy yields exactly the monthly rent.
pub fn prorated_rent(monthly_rent: Decimal, active_days: i64, days_in_month: i64) -> Decimal {
    if days_in_month == 0 || active_days <= 0 {
        return Decimal::ZERO;
    }
    to_currency(monthly_rent * Decimal::from(active_days) / Decimal::from(days_in_month))
}

/// Month-by-month revenue for a reporting year. Rental terms contribute
/// day-weighted rent for every month they overlap; buyer and co-buyer terms
/// recognize their sale price in full in the month the record was created.
pub fn monthly_revenue_summary(year: i32, terms: &[ResidencyTerm]) -> RevenueSummary {
    let mut sales = Vec::with_capacity(12);
    let mut rental = Vec::with_capacity(12);

    for month in 1..=12 {
        let Some((month_start, month_end)) = month_bounds(year, month) else {
            continue;
        };
        let days_in_month = (month_end - month_start).num_days() + 1;

        let mut rent_total = Decimal::ZERO;
        let mut sales_total = Decimal::ZERO;
        for term in terms {
            match term.relationship {
                Some(RelationshipKind::Renter) => {
                    let Some(rent) = term.monthly_rent else {
                        continue;
                    };
                    let days =
                        active_days(term.start_date, term.end_date, month_start, month_end);
                    rent_total += prorated_rent(rent, days, days_in_month);
                }
                Some(RelationshipKind::Buyer) | Some(RelationshipKind::CoBuyer) => {
                    let created = term.created_at.date_naive();
                    if created.year() == year && created.month() == month {
                        if let Some(price) = term.sale_price {
                            sales_total += price;
                        }
                    }
                }
                Some(RelationshipKind::Other) | None => {}
            }
        }

        sales.push(MonthlyRevenue {
            month,
            month_label: month_label(month),
            total: to_currency(sales_total),
        });
        rental.push(MonthlyRevenue {
            month,
            month_label: month_label(month),
            total: to_currency(rent_total),
        });
    }

    RevenueSummary {
        year,
        sales,
        rental,
    }
}
