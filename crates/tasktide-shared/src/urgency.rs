//! Urgency scoring.
//!
//! The score is only used to order tasks: a priority weight plus a
//! due-date proximity term, capped at 10 for tasks due today or overdue.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::constants::{MAX_TIME_SCORE, MILLIS_PER_DAY};
use crate::task::Task;
use crate::types::{Priority, TaskStatus};

pub fn priority_weight(priority: Priority) -> u32 {
    match priority {
        Priority::Low => 1,
        Priority::Medium => 2,
        Priority::High => 3,
    }
}

/// Whole days until `due`, rounded up. Zero or negative once the due date
/// has been reached.
pub fn days_until_due(due: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (due - now).num_milliseconds();
    // ceil for both signs
    millis.div_euclid(MILLIS_PER_DAY) + i64::from(millis.rem_euclid(MILLIS_PER_DAY) != 0)
}

pub fn urgency_score(priority: Priority, due: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u32 {
    let Some(due) = due else {
        return 0;
    };

    let priority_score = priority_weight(priority) * 2;
    let days = days_until_due(due, now);
    let time_score = if days <= 0 {
        MAX_TIME_SCORE
    } else {
        (MAX_TIME_SCORE - days).max(0)
    };

    priority_score + time_score as u32
}

pub fn is_overdue(task: &Task, now: DateTime<Utc>) -> bool {
    task.status == TaskStatus::Pending && task.due_date.is_some_and(|due| due < now)
}

/// A task annotated with its derived ranking fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredTask {
    #[serde(flatten)]
    pub task: Task,
    pub urgency_score: u32,
    pub is_overdue: bool,
}

impl ScoredTask {
    pub fn score(task: Task, now: DateTime<Utc>) -> Self {
        Self {
            urgency_score: urgency_score(task.priority, task.due_date, now),
            is_overdue: is_overdue(&task, now),
            task,
        }
    }
}

/// Score every task and order by descending urgency. The sort is stable, so
/// tasks with equal scores keep their input order.
pub fn prioritize(tasks: Vec<Task>, now: DateTime<Utc>) -> Vec<ScoredTask> {
    let mut scored: Vec<ScoredTask> = tasks.into_iter().map(|t| ScoredTask::score(t, now)).collect();
    scored.sort_by(|a, b| b.urgency_score.cmp(&a.urgency_score));
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::NewTask;
    use crate::types::{TaskId, UserId};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()
    }

    fn task(title: &str, priority: Priority, due: Option<DateTime<Utc>>) -> Task {
        let new = NewTask {
            title: title.into(),
            priority,
            due_date: due,
            ..Default::default()
        };
        Task::from_new(TaskId::new(), UserId::new(), new, now())
    }

    #[test]
    fn overdue_high_priority_scores_sixteen() {
        for days_ago in [1, 3, 30] {
            let due = now() - Duration::days(days_ago);
            assert_eq!(urgency_score(Priority::High, Some(due), now()), 16);
        }
    }

    #[test]
    fn medium_due_in_five_days_scores_nine() {
        let due = now() + Duration::days(5);
        assert_eq!(urgency_score(Priority::Medium, Some(due), now()), 9);
    }

    #[test]
    fn no_due_date_scores_zero() {
        for priority in Priority::ALL {
            assert_eq!(urgency_score(priority, None, now()), 0);
        }
    }

    #[test]
    fn partial_days_round_up() {
        let due = now() + Duration::hours(30);
        assert_eq!(days_until_due(due, now()), 2);
        // low: 2 + (10 - 2)
        assert_eq!(urgency_score(Priority::Low, Some(due), now()), 10);

        let earlier_today = now() - Duration::hours(2);
        assert_eq!(days_until_due(earlier_today, now()), 0);
    }

    #[test]
    fn far_future_time_score_floors_at_zero() {
        let due = now() + Duration::days(40);
        assert_eq!(urgency_score(Priority::Low, Some(due), now()), 2);
    }

    #[test]
    fn prioritize_is_stable_for_ties() {
        let tasks = vec![
            task("a", Priority::Low, None),
            task("b", Priority::High, Some(now() - Duration::days(1))),
            task("c", Priority::Medium, None),
            task("d", Priority::Medium, Some(now() + Duration::days(5))),
        ];
        let order: Vec<String> = prioritize(tasks, now())
            .into_iter()
            .map(|s| s.task.title)
            .collect();
        assert_eq!(order, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn completed_tasks_are_never_overdue() {
        let mut t = task("x", Priority::Low, Some(now() - Duration::days(2)));
        assert!(is_overdue(&t, now()));
        t.set_status(TaskStatus::Completed, now());
        assert!(!is_overdue(&t, now()));
    }
}
