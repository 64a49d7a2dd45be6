use chrono::{DateTime, Months, NaiveDate, Utc};

use super::domain::{
    AttachmentBillingType, AttachmentStatus, Recurrence, ServiceAttachment, ServiceOffering,
};

/// One recurrence period after `from`. Month arithmetic clamps to the last
/// day of shorter months (Jan 31 + 1 month = Feb 28/29) rather than
/// overflowing into the next one.
pub fn next_billing_date(from: DateTime<Utc>, recurrence: Recurrence) -> DateTime<Utc> {
    from.checked_add_months(Months::new(recurrence.months()))
        .unwrap_or(from)
}

/// Calendar-date counterpart of [`next_billing_date`] for bill templates.
pub fn advance_date(from: NaiveDate, recurrence: Recurrence) -> NaiveDate {
    from.checked_add_months(Months::new(recurrence.months()))
        .unwrap_or(from)
}

/// Whether a billing run should raise bills for this attachment right now.
///
/// Pre-paid attachments bill exactly once over their lifetime: they are due
/// only while the anchor is unset (an operator reactivates one by clearing
/// it). Recurring services require a recognized cadence; a recurring service
/// with no recurrence value is never due, even with an unset anchor.
pub fn attachment_due(
    attachment: &ServiceAttachment,
    service: &ServiceOffering,
    now: DateTime<Utc>,
) -> bool {
    if attachment.status != AttachmentStatus::Active {
        return false;
    }
    if attachment.billing_type == AttachmentBillingType::Prepaid {
        return attachment.last_billed_at.is_none();
    }
    if service.is_recurring {
        let Some(recurrence) = service.recurrence else {
            return false;
        };
        return match attachment.last_billed_at {
            None => true,
            Some(anchor) => now >= next_billing_date(anchor, recurrence),
        };
    }
    false
}

/// Whether a template bill is due to spawn its next occurrence.
pub fn template_due(
    recurrence: Option<Recurrence>,
    next_billing_date: Option<NaiveDate>,
    today: NaiveDate,
) -> bool {
    recurrence.is_some() && next_billing_date.map(|next| next <= today).unwrap_or(false)
}
