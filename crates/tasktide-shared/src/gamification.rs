//! Points, streaks and achievements.
//!
//! Two point tables exist. [`PointTable::Display`] is what the dashboard
//! totals over all completed tasks; [`PointTable::Award`] is what gets added
//! to (or taken from) the stored user balance on each toggle. They disagree
//! on purpose and are kept apart by call site.

use chrono::{DateTime, Days, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;

use crate::task::Task;
use crate::types::{Priority, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointTable {
    /// Dashboard total: high 10, medium 5, low 3.
    Display,
    /// Stored balance, applied incrementally: high 15, medium 10, low 5.
    Award,
}

impl PointTable {
    pub fn points(self, priority: Priority) -> u32 {
        match (self, priority) {
            (PointTable::Display, Priority::High) => 10,
            (PointTable::Display, Priority::Medium) => 5,
            (PointTable::Display, Priority::Low) => 3,
            (PointTable::Award, Priority::High) => 15,
            (PointTable::Award, Priority::Medium) => 10,
            (PointTable::Award, Priority::Low) => 5,
        }
    }
}

/// Sum of display points over completed tasks.
pub fn total_points(tasks: &[Task]) -> u32 {
    tasks
        .iter()
        .filter(|t| t.is_completed())
        .map(|t| PointTable::Display.points(t.priority))
        .sum()
}

/// Calendar day of `ts` as seen from `offset`.
pub fn local_day(ts: DateTime<Utc>, offset: &FixedOffset) -> NaiveDate {
    ts.with_timezone(offset).date_naive()
}

/// The instant `day` begins in `offset`.
pub fn local_day_start(day: NaiveDate, offset: &FixedOffset) -> DateTime<Utc> {
    let midnight = day.and_time(NaiveTime::MIN) - Duration::seconds(i64::from(offset.local_minus_utc()));
    Utc.from_utc_datetime(&midnight)
}

/// Distinct days with at least one completion, newest first.
pub fn completion_days(tasks: &[Task], offset: &FixedOffset) -> Vec<NaiveDate> {
    let mut days: Vec<NaiveDate> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .filter_map(|t| t.completed_at)
        .map(|ts| local_day(ts, offset))
        .collect();
    days.sort_unstable_by(|a, b| b.cmp(a));
    days.dedup();
    days
}

/// Length of the run of consecutive days ending at `today`. `days` must be
/// distinct and sorted newest first.
pub fn streak_from_days(days: &[NaiveDate], today: NaiveDate) -> u32 {
    let mut streak = 0;
    for (i, day) in days.iter().enumerate() {
        let expected = today.checked_sub_days(Days::new(i as u64));
        if expected != Some(*day) {
            break;
        }
        streak += 1;
    }
    streak
}

pub fn current_streak(tasks: &[Task], today: NaiveDate, offset: &FixedOffset) -> u32 {
    streak_from_days(&completion_days(tasks, offset), today)
}

/// How the stored streak changes after a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakChange {
    Unchanged,
    Increment,
    /// Start a new streak at 1.
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionAward {
    pub points_delta: i64,
    pub streak: StreakChange,
}

impl CompletionAward {
    pub const NONE: CompletionAward = CompletionAward {
        points_delta: 0,
        streak: StreakChange::Unchanged,
    };
}

/// Stored-balance update for a status toggle.
///
/// Completing awards points and, on the first completion of the day,
/// extends the streak if something was completed yesterday or restarts it
/// otherwise. Un-completing takes the points back but leaves the streak
/// alone.
pub fn completion_award(
    was: TaskStatus,
    now: TaskStatus,
    priority: Priority,
    completed_today_elsewhere: bool,
    completed_yesterday: bool,
) -> CompletionAward {
    let points = i64::from(PointTable::Award.points(priority));
    match (was, now) {
        (TaskStatus::Pending, TaskStatus::Completed) => {
            let streak = if completed_today_elsewhere {
                StreakChange::Unchanged
            } else if completed_yesterday {
                StreakChange::Increment
            } else {
                StreakChange::Reset
            };
            CompletionAward {
                points_delta: points,
                streak,
            }
        }
        (TaskStatus::Completed, TaskStatus::Pending) => CompletionAward {
            points_delta: -points,
            streak: StreakChange::Unchanged,
        },
        _ => CompletionAward::NONE,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Achievement {
    pub name: &'static str,
    pub icon: &'static str,
    pub description: &'static str,
}

pub fn achievements(completed_count: usize, points: u32, streak: u32) -> Vec<Achievement> {
    let mut earned = Vec::new();
    if completed_count >= 10 {
        earned.push(Achievement {
            name: "Task Master",
            icon: "🏆",
            description: "Completed 10 tasks",
        });
    }
    if completed_count >= 50 {
        earned.push(Achievement {
            name: "Productivity Pro",
            icon: "⭐",
            description: "Completed 50 tasks",
        });
    }
    if streak >= 7 {
        earned.push(Achievement {
            name: "Week Warrior",
            icon: "🔥",
            description: "7-day streak",
        });
    }
    if streak >= 30 {
        earned.push(Achievement {
            name: "Month Master",
            icon: "💎",
            description: "30-day streak",
        });
    }
    if points >= 100 {
        earned.push(Achievement {
            name: "Century Club",
            icon: "💯",
            description: "100+ points",
        });
    }
    earned
}

#[derive(Debug, Clone, Serialize)]
pub struct GamificationSummary {
    pub points: u32,
    pub streak: u32,
    pub achievements: Vec<Achievement>,
}

pub fn summarize(tasks: &[Task], today: NaiveDate, offset: &FixedOffset) -> GamificationSummary {
    let points = total_points(tasks);
    let streak = current_streak(tasks, today, offset);
    let completed = tasks.iter().filter(|t| t.is_completed()).count();
    GamificationSummary {
        points,
        streak,
        achievements: achievements(completed, points, streak),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::NewTask;
    use crate::types::{TaskId, UserId};
    use chrono::{Duration, TimeZone};

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 18, 0, 0).unwrap()
    }

    fn completed(priority: Priority, at: DateTime<Utc>) -> Task {
        let new = NewTask {
            title: "t".into(),
            priority,
            status: TaskStatus::Completed,
            completed_at: Some(at),
            ..Default::default()
        };
        Task::from_new(TaskId::new(), UserId::new(), new, at)
    }

    fn pending(priority: Priority) -> Task {
        let new = NewTask {
            title: "p".into(),
            priority,
            ..Default::default()
        };
        Task::from_new(TaskId::new(), UserId::new(), new, now())
    }

    #[test]
    fn streak_stops_at_first_gap() {
        let tasks = vec![
            completed(Priority::Low, now()),
            completed(Priority::Low, now() - Duration::days(1)),
            completed(Priority::Low, now() - Duration::days(3)),
        ];
        let today = now().date_naive();
        assert_eq!(current_streak(&tasks, today, &utc()), 2);
    }

    #[test]
    fn streak_is_zero_without_completion_today() {
        let tasks = vec![completed(Priority::Low, now() - Duration::days(1))];
        assert_eq!(current_streak(&tasks, now().date_naive(), &utc()), 0);
    }

    #[test]
    fn several_completions_on_one_day_count_once() {
        let tasks = vec![
            completed(Priority::High, now()),
            completed(Priority::High, now() - Duration::hours(3)),
            completed(Priority::High, now() - Duration::days(1)),
        ];
        assert_eq!(completion_days(&tasks, &utc()).len(), 2);
        assert_eq!(current_streak(&tasks, now().date_naive(), &utc()), 2);
    }

    #[test]
    fn offset_moves_day_boundary() {
        // 23:30 UTC is already tomorrow at UTC+2
        let late = Utc.with_ymd_and_hms(2024, 6, 14, 23, 30, 0).unwrap();
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(
            local_day(late, &plus_two),
            NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
        );
    }

    #[test]
    fn local_day_start_shifts_by_offset() {
        let day = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(
            local_day_start(day, &plus_two),
            Utc.with_ymd_and_hms(2024, 6, 14, 22, 0, 0).unwrap()
        );
        assert_eq!(
            local_day_start(day, &utc()),
            Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn display_points_only_count_completed() {
        let tasks = vec![
            completed(Priority::High, now()),
            completed(Priority::Medium, now()),
            completed(Priority::Low, now()),
            pending(Priority::High),
        ];
        assert_eq!(total_points(&tasks), 18);
    }

    #[test]
    fn award_table_differs_from_display() {
        assert_eq!(PointTable::Award.points(Priority::High), 15);
        assert_eq!(PointTable::Display.points(Priority::High), 10);
    }

    #[test]
    fn first_completion_of_day_extends_or_resets_streak() {
        let extend = completion_award(
            TaskStatus::Pending,
            TaskStatus::Completed,
            Priority::Medium,
            false,
            true,
        );
        assert_eq!(extend.points_delta, 10);
        assert_eq!(extend.streak, StreakChange::Increment);

        let reset = completion_award(
            TaskStatus::Pending,
            TaskStatus::Completed,
            Priority::Low,
            false,
            false,
        );
        assert_eq!(reset.streak, StreakChange::Reset);

        let again = completion_award(
            TaskStatus::Pending,
            TaskStatus::Completed,
            Priority::Low,
            true,
            false,
        );
        assert_eq!(again.streak, StreakChange::Unchanged);
        assert_eq!(again.points_delta, 5);
    }

    #[test]
    fn uncompleting_refunds_points_but_keeps_streak() {
        let award = completion_award(
            TaskStatus::Completed,
            TaskStatus::Pending,
            Priority::High,
            false,
            true,
        );
        assert_eq!(award.points_delta, -15);
        assert_eq!(award.streak, StreakChange::Unchanged);
    }

    #[test]
    fn achievements_by_threshold() {
        assert!(achievements(9, 99, 6).is_empty());
        let names: Vec<_> = achievements(50, 100, 30).iter().map(|a| a.name).collect();
        assert_eq!(
            names,
            vec![
                "Task Master",
                "Productivity Pro",
                "Week Warrior",
                "Month Master",
                "Century Club"
            ]
        );
    }
}
