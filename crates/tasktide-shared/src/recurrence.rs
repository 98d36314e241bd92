//! Next-occurrence generation for recurring tasks.

use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, TimeZone, Utc};

use crate::task::{NewTask, Task};
use crate::types::{RecurringType, TaskStatus};

/// Advance a due date by one period.
///
/// Monthly steps keep the day of month and time of day. A day that does not
/// exist in the next month spills over into the one after it, so Jan 31
/// becomes Mar 2 (or Mar 3 outside leap years).
pub fn advance(due: DateTime<Utc>, kind: RecurringType) -> DateTime<Utc> {
    match kind {
        RecurringType::Daily => due + Duration::days(1),
        RecurringType::Weekly => due + Duration::days(7),
        RecurringType::Monthly => {
            let (year, month) = if due.month() == 12 {
                (due.year() + 1, 1)
            } else {
                (due.year(), due.month() + 1)
            };
            // the 1st always exists; the offset carries any overflow
            let date = NaiveDate::from_ymd_opt(year, month, 1)
                .and_then(|first| first.checked_add_days(Days::new(u64::from(due.day() - 1))));
            match date {
                Some(date) => Utc.from_utc_datetime(&date.and_time(due.time())),
                None => due,
            }
        }
    }
}

/// The pending copy of `task` due one period later, or `None` when the task
/// does not recur or has no due date.
pub fn next_occurrence(task: &Task) -> Option<NewTask> {
    if !task.is_recurring {
        return None;
    }
    let due = task.due_date?;
    let kind = task.recurring_type?;

    let mut next = task.to_new();
    next.status = TaskStatus::Pending;
    next.completed_at = None;
    next.due_date = Some(advance(due, kind));
    Some(next)
}
