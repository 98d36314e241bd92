//! Reports derived from a user's tasks.
//!
//! All functions take the already loaded task list plus the reference
//! instants, so they can be tested without a database.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;

use crate::constants::{BOTTLENECK_LIMIT, SUGGESTION_LIMIT, TOP_TAGS_LIMIT};
use crate::gamification::{completion_days, local_day, streak_from_days};
use crate::task::Task;
use crate::types::{Priority, TaskStatus};
use crate::urgency::{prioritize, ScoredTask};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelCount {
    #[serde(rename = "_id")]
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub pending_tasks: usize,
    pub overdue_tasks: usize,
    /// Percentage rounded to two decimals.
    pub completion_rate: f64,
    pub tasks_by_priority: Vec<LabelCount>,
    pub tasks_by_tag: Vec<LabelCount>,
}

fn is_overdue_at(task: &Task, today_start: DateTime<Utc>) -> bool {
    task.status == TaskStatus::Pending && task.due_date.is_some_and(|due| due < today_start)
}

pub fn overview(tasks: &[Task], today_start: DateTime<Utc>) -> Overview {
    let total = tasks.len();
    let completed = tasks.iter().filter(|t| t.is_completed()).count();
    let overdue = tasks.iter().filter(|t| is_overdue_at(t, today_start)).count();

    let completion_rate = if total > 0 {
        (completed as f64 / total as f64 * 10_000.0).round() / 100.0
    } else {
        0.0
    };

    let tasks_by_priority = Priority::ALL
        .iter()
        .map(|p| LabelCount {
            label: p.as_str().to_string(),
            count: tasks.iter().filter(|t| t.priority == *p).count(),
        })
        .filter(|c| c.count > 0)
        .collect();

    let mut tag_counts: HashMap<&str, usize> = HashMap::new();
    for tag in tasks.iter().flat_map(|t| t.tags.iter()) {
        *tag_counts.entry(tag.as_str()).or_default() += 1;
    }
    let mut tasks_by_tag: Vec<LabelCount> = tag_counts
        .into_iter()
        .map(|(tag, count)| LabelCount {
            label: tag.to_string(),
            count,
        })
        .collect();
    tasks_by_tag.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    tasks_by_tag.truncate(TOP_TAGS_LIMIT);

    Overview {
        total_tasks: total,
        completed_tasks: completed,
        pending_tasks: total - completed,
        overdue_tasks: overdue,
        completion_rate,
        tasks_by_priority,
        tasks_by_tag,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Productivity {
    pub daily_completion: Vec<LabelCount>,
    pub daily_created: Vec<LabelCount>,
    pub period: String,
}

fn count_by_day(
    stamps: impl Iterator<Item = DateTime<Utc>>,
    since: DateTime<Utc>,
    offset: &FixedOffset,
) -> Vec<LabelCount> {
    let mut days: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for ts in stamps.filter(|ts| *ts >= since) {
        *days.entry(local_day(ts, offset)).or_default() += 1;
    }
    days.into_iter()
        .map(|(day, count)| LabelCount {
            label: day.format("%Y-%m-%d").to_string(),
            count,
        })
        .collect()
}

/// Per-day completion and creation counts since `since`, oldest day first.
/// Days are calendar days at `offset`, the same ones streaks count.
pub fn productivity(
    tasks: &[Task],
    since: DateTime<Utc>,
    days: u32,
    offset: &FixedOffset,
) -> Productivity {
    let completions = tasks
        .iter()
        .filter(|t| t.is_completed())
        .filter_map(|t| t.completed_at);
    Productivity {
        daily_completion: count_by_day(completions, since, offset),
        daily_created: count_by_day(tasks.iter().map(|t| t.created_at), since, offset),
        period: format!("{days} days"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakReport {
    pub current_streak: u32,
    pub max_streak: u32,
    pub total_completed_days: usize,
}

/// `max_streak` reports the stored streak, falling back to the computed one
/// while nothing has been stored yet.
pub fn streak_report(
    tasks: &[Task],
    stored_streak: u32,
    today: NaiveDate,
    offset: &FixedOffset,
) -> StreakReport {
    let days = completion_days(tasks, offset);
    let current = streak_from_days(&days, today);
    StreakReport {
        current_streak: current,
        max_streak: if stored_streak > 0 { stored_streak } else { current },
        total_completed_days: days.len(),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bottlenecks {
    pub overdue_tasks: Vec<Task>,
    pub long_pending_tasks: Vec<Task>,
    pub high_priority_pending: usize,
    pub total_overdue: usize,
}

fn overdue_oldest_first(tasks: &[Task], today_start: DateTime<Utc>) -> Vec<Task> {
    let mut overdue: Vec<Task> = tasks
        .iter()
        .filter(|t| is_overdue_at(t, today_start))
        .cloned()
        .collect();
    overdue.sort_by_key(|t| t.due_date);
    overdue
}

pub fn bottlenecks(tasks: &[Task], today_start: DateTime<Utc>) -> Bottlenecks {
    let mut overdue = overdue_oldest_first(tasks, today_start);
    overdue.truncate(BOTTLENECK_LIMIT);

    let mut long_pending: Vec<Task> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Pending)
        .cloned()
        .collect();
    long_pending.sort_by_key(|t| t.created_at);
    long_pending.truncate(BOTTLENECK_LIMIT);

    let high_priority_pending = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Pending && t.priority == Priority::High)
        .count();

    Bottlenecks {
        total_overdue: overdue.len(),
        overdue_tasks: overdue,
        long_pending_tasks: long_pending,
        high_priority_pending,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestions {
    pub overdue: Vec<Task>,
    pub high_priority_today: Vec<Task>,
    pub high_urgency: Vec<ScoredTask>,
}

pub fn suggestions(tasks: &[Task], now: DateTime<Utc>, today_start: DateTime<Utc>) -> Suggestions {
    let mut overdue = overdue_oldest_first(tasks, today_start);
    overdue.truncate(SUGGESTION_LIMIT);

    let tomorrow_start = today_start + chrono::Duration::days(1);
    let high_priority_today: Vec<Task> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Pending && t.priority == Priority::High)
        .filter(|t| {
            t.due_date
                .is_some_and(|due| due >= today_start && due < tomorrow_start)
        })
        .take(SUGGESTION_LIMIT)
        .cloned()
        .collect();

    let pending: Vec<Task> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Pending)
        .cloned()
        .collect();
    let mut high_urgency = prioritize(pending, now);
    high_urgency.truncate(SUGGESTION_LIMIT);

    Suggestions {
        overdue,
        high_priority_today,
        high_urgency,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::NewTask;
    use crate::types::{TaskId, UserId};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 20, 15, 0, 0).unwrap()
    }

    fn today_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 20, 0, 0, 0).unwrap()
    }

    fn make(priority: Priority, due: Option<DateTime<Utc>>, tags: &[&str]) -> Task {
        let new = NewTask {
            title: "t".into(),
            priority,
            due_date: due,
            tags: tags.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        Task::from_new(TaskId::new(), UserId::new(), new, now() - Duration::days(2))
    }

    #[test]
    fn overview_counts_and_rate() {
        let mut done = make(Priority::High, None, &["work"]);
        done.set_status(TaskStatus::Completed, now());
        let tasks = vec![
            done,
            make(Priority::Low, Some(now() - Duration::days(3)), &["work", "home"]),
            make(Priority::Low, Some(now() + Duration::days(1)), &[]),
        ];

        let o = overview(&tasks, today_start());
        assert_eq!(o.total_tasks, 3);
        assert_eq!(o.completed_tasks, 1);
        assert_eq!(o.pending_tasks, 2);
        assert_eq!(o.overdue_tasks, 1);
        assert_eq!(o.completion_rate, 33.33);
        assert_eq!(o.tasks_by_tag[0], LabelCount { label: "work".into(), count: 2 });
        assert_eq!(o.tasks_by_priority.len(), 2);
    }

    #[test]
    fn overview_of_nothing_has_zero_rate() {
        assert_eq!(overview(&[], today_start()).completion_rate, 0.0);
    }

    #[test]
    fn productivity_groups_by_day() {
        let mut a = make(Priority::Low, None, &[]);
        a.set_status(TaskStatus::Completed, now());
        let mut b = make(Priority::Low, None, &[]);
        b.set_status(TaskStatus::Completed, now() - Duration::hours(1));
        let mut old = make(Priority::Low, None, &[]);
        old.set_status(TaskStatus::Completed, now() - Duration::days(30));

        let utc = FixedOffset::east_opt(0).unwrap();
        let report = productivity(&[a, b, old], today_start() - Duration::days(7), 7, &utc);
        assert_eq!(report.daily_completion.len(), 1);
        assert_eq!(report.daily_completion[0].label, "2024-08-20");
        assert_eq!(report.daily_completion[0].count, 2);
        assert_eq!(report.daily_created[0].label, "2024-08-18");
        assert_eq!(report.period, "7 days");
    }

    #[test]
    fn productivity_days_follow_the_offset() {
        // 15:00 UTC is already the next day at UTC+10.
        let mut late = make(Priority::Low, None, &[]);
        late.set_status(TaskStatus::Completed, now());
        let tokyo_ish = FixedOffset::east_opt(10 * 3600).unwrap();

        let report = productivity(&[late], today_start() - Duration::days(7), 7, &tokyo_ish);
        assert_eq!(report.daily_completion[0].label, "2024-08-21");
        assert_eq!(
            local_day(now(), &tokyo_ish).format("%Y-%m-%d").to_string(),
            report.daily_completion[0].label
        );
    }

    #[test]
    fn streak_report_prefers_stored_streak() {
        let mut t = make(Priority::Low, None, &[]);
        t.set_status(TaskStatus::Completed, now());
        let offset = FixedOffset::east_opt(0).unwrap();
        let today = now().date_naive();

        let fresh = streak_report(std::slice::from_ref(&t), 0, today, &offset);
        assert_eq!(fresh.current_streak, 1);
        assert_eq!(fresh.max_streak, 1);

        let stored = streak_report(&[t], 12, today, &offset);
        assert_eq!(stored.max_streak, 12);
        assert_eq!(stored.total_completed_days, 1);
    }

    #[test]
    fn suggestions_buckets() {
        let overdue = make(Priority::Medium, Some(now() - Duration::days(2)), &[]);
        let due_today = make(Priority::High, Some(today_start() + Duration::hours(20)), &[]);
        let later = make(Priority::Low, Some(now() + Duration::days(20)), &[]);

        let s = suggestions(&[later, overdue.clone(), due_today.clone()], now(), today_start());
        assert_eq!(s.overdue, vec![overdue]);
        assert_eq!(s.high_priority_today, vec![due_today.clone()]);
        assert_eq!(s.high_urgency[0].task, due_today);
        assert_eq!(s.high_urgency.len(), 3);
    }

    #[test]
    fn bottlenecks_sort_oldest_first() {
        let a = make(Priority::High, Some(now() - Duration::days(1)), &[]);
        let b = make(Priority::High, Some(now() - Duration::days(5)), &[]);
        let r = bottlenecks(&[a.clone(), b.clone()], today_start());
        assert_eq!(r.overdue_tasks, vec![b, a]);
        assert_eq!(r.high_priority_pending, 2);
        assert_eq!(r.total_overdue, 2);
    }
}
