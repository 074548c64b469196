//! Active windows: the days of a form on which a line-item accepts marks.

use crate::models::{LineItem, LineItemKind, MedicationSchedule, ReportingMonth, GRID_DAYS};

/// Whether `item` is active on `day` of a form for `month`.
///
/// Vitals rows are active on every grid day. Medications follow
/// [`schedule_is_active`].
pub fn is_active(item: &LineItem, month: ReportingMonth, day: u8) -> bool {
    match &item.kind {
        LineItemKind::Vitals(_) => (1..=GRID_DAYS).contains(&day),
        LineItemKind::Medication(schedule) => schedule_is_active(schedule, month, day),
    }
}

/// A medication is active from its start day through its stop date, but only
/// on the form of the month it started in. A medication carried over from an
/// earlier month is never active. Days that do not exist in the month (the
/// 30th of February) are inactive.
pub fn schedule_is_active(schedule: &MedicationSchedule, month: ReportingMonth, day: u8) -> bool {
    if !month.contains(schedule.start_date) {
        return false;
    }
    let Some(date) = month.date(day) else {
        return false;
    };
    day >= schedule.start_date.day() && schedule.stop_date.map_or(true, |stop| date <= stop)
}

/// The active days of `item`, ascending.
pub fn active_days(item: &LineItem, month: ReportingMonth) -> impl Iterator<Item = u8> + '_ {
    (1..=GRID_DAYS).filter(move |&day| is_active(item, month, day))
}
