//! The task record and the payloads used to create and edit it.
//!
//! Every change to `status` goes through [`Task::set_status`], which keeps
//! `completed_at` populated exactly when the task is completed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ValidationError;
use crate::types::{Priority, RecurringType, TaskId, TaskStatus, UserId};

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A task owned by exactly one user, optionally shared read-only with others.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    /// The creating user. Only the owner may modify the task.
    pub user_id: UserId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub recurring_type: Option<RecurringType>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Users with read access, without duplicates.
    #[serde(default)]
    pub shared_with: Vec<UserId>,
    /// File references in upload order.
    #[serde(default)]
    pub attachments: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Build a persisted task from a validated payload.
    pub fn from_new(id: TaskId, owner: UserId, new: NewTask, now: DateTime<Utc>) -> Self {
        let mut task = Self {
            id,
            user_id: owner,
            title: new.title,
            description: new.description,
            status: TaskStatus::Pending,
            priority: new.priority,
            tags: normalize_tags(new.tags),
            due_date: new.due_date,
            is_recurring: new.is_recurring,
            recurring_type: if new.is_recurring { new.recurring_type } else { None },
            completed_at: None,
            shared_with: Vec::new(),
            attachments: new.attachments,
            created_at: now,
            updated_at: now,
        };
        task.share_with(new.shared_with);
        task.status = new.status;
        task.completed_at = match new.status {
            TaskStatus::Completed => Some(new.completed_at.unwrap_or(now)),
            TaskStatus::Pending => None,
        };
        task
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Change the status, stamping or clearing `completed_at` to match.
    /// Setting the status it already has leaves the timestamp untouched.
    pub fn set_status(&mut self, status: TaskStatus, now: DateTime<Utc>) {
        if self.status == status {
            return;
        }
        self.status = status;
        self.completed_at = match status {
            TaskStatus::Completed => Some(now),
            TaskStatus::Pending => None,
        };
        self.updated_at = now;
    }

    /// Flip between pending and completed. Returns the previous status.
    pub fn toggle_status(&mut self, now: DateTime<Utc>) -> TaskStatus {
        let previous = self.status;
        let next = match previous {
            TaskStatus::Pending => TaskStatus::Completed,
            TaskStatus::Completed => TaskStatus::Pending,
        };
        self.set_status(next, now);
        previous
    }

    /// Add users to `shared_with`, keeping first-seen order.
    pub fn share_with(&mut self, users: impl IntoIterator<Item = UserId>) {
        for user in users {
            if !self.shared_with.contains(&user) {
                self.shared_with.push(user);
            }
        }
    }

    pub fn is_visible_to(&self, user: UserId) -> bool {
        self.user_id == user || self.shared_with.contains(&user)
    }

    pub fn make_recurring(&mut self, kind: RecurringType, now: DateTime<Utc>) {
        self.is_recurring = true;
        self.recurring_type = Some(kind);
        self.updated_at = now;
    }

    /// The task's content without identity or bookkeeping timestamps.
    pub fn to_new(&self) -> NewTask {
        NewTask {
            title: self.title.clone(),
            description: self.description.clone(),
            status: self.status,
            priority: self.priority,
            tags: self.tags.clone(),
            due_date: self.due_date,
            is_recurring: self.is_recurring,
            recurring_type: self.recurring_type,
            completed_at: self.completed_at,
            shared_with: self.shared_with.clone(),
            attachments: self.attachments.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// NewTask
// ---------------------------------------------------------------------------

/// A task payload with no id yet: the create request body, and the output of
/// the recurrence generator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub recurring_type: Option<RecurringType>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub shared_with: Vec<UserId>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl NewTask {
    /// Trim the title and check the recurring fields agree.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        self.title = self.title.trim().to_string();
        if self.title.is_empty() {
            return Err(ValidationError::MissingTitle);
        }
        if self.is_recurring && self.recurring_type.is_none() {
            return Err(ValidationError::MissingRecurringType);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TaskUpdate
// ---------------------------------------------------------------------------

/// Partial edit of a task. Absent fields keep their current value; for the
/// nullable fields an explicit `null` clears the value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "some_or_null")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub is_recurring: Option<bool>,
    #[serde(default, deserialize_with = "some_or_null")]
    pub recurring_type: Option<Option<RecurringType>>,
}

impl TaskUpdate {
    pub fn apply(self, task: &mut Task, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if let Some(title) = self.title {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(ValidationError::MissingTitle);
            }
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(tags) = self.tags {
            task.tags = normalize_tags(tags);
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(recurring_type) = self.recurring_type {
            task.recurring_type = recurring_type;
        }
        if let Some(is_recurring) = self.is_recurring {
            task.is_recurring = is_recurring;
        }
        if task.is_recurring && task.recurring_type.is_none() {
            return Err(ValidationError::MissingRecurringType);
        }
        if !task.is_recurring {
            task.recurring_type = None;
        }
        if let Some(status) = self.status {
            task.set_status(status, now);
        }
        task.updated_at = now;
        Ok(())
    }
}

fn some_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Trim tags, drop empty ones and remove duplicates while keeping order.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn sample() -> Task {
        let new = NewTask {
            title: "Write report".into(),
            ..Default::default()
        };
        Task::from_new(TaskId::new(), UserId::new(), new, now())
    }

    #[test]
    fn completed_at_tracks_status() {
        let mut task = sample();
        assert!(task.completed_at.is_none());

        let later = now() + chrono::Duration::hours(1);
        assert_eq!(task.toggle_status(later), TaskStatus::Pending);
        assert_eq!(task.completed_at, Some(later));

        task.toggle_status(later);
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn new_completed_task_gets_timestamp() {
        let new = NewTask {
            title: "Done already".into(),
            status: TaskStatus::Completed,
            ..Default::default()
        };
        let task = Task::from_new(TaskId::new(), UserId::new(), new, now());
        assert_eq!(task.completed_at, Some(now()));
    }

    #[test]
    fn validate_rejects_blank_title_and_untyped_recurrence() {
        let mut blank = NewTask {
            title: "   ".into(),
            ..Default::default()
        };
        assert!(matches!(blank.validate(), Err(ValidationError::MissingTitle)));

        let mut untyped = NewTask {
            title: "Gym".into(),
            is_recurring: true,
            ..Default::default()
        };
        assert!(matches!(
            untyped.validate(),
            Err(ValidationError::MissingRecurringType)
        ));
    }

    #[test]
    fn share_with_keeps_set_semantics() {
        let mut task = sample();
        let a = UserId::new();
        let b = UserId::new();
        task.share_with([a, b, a]);
        task.share_with([b]);
        assert_eq!(task.shared_with, vec![a, b]);
        assert!(task.is_visible_to(a));
        assert!(!task.is_visible_to(UserId::new()));
    }

    #[test]
    fn update_applies_only_present_fields() {
        let mut task = sample();
        task.description = "keep me".into();

        let update: TaskUpdate =
            serde_json::from_str(r#"{"priority":"high","dueDate":null,"tags":["a"," a ","b"]}"#)
                .unwrap();
        update.apply(&mut task, now()).unwrap();

        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.description, "keep me");
        assert_eq!(task.tags, vec!["a".to_string(), "b".to_string()]);
        assert!(task.due_date.is_none());
    }

    #[test]
    fn update_turning_off_recurrence_clears_type() {
        let mut task = sample();
        task.make_recurring(RecurringType::Daily, now());

        let update: TaskUpdate = serde_json::from_str(r#"{"isRecurring":false}"#).unwrap();
        update.apply(&mut task, now()).unwrap();
        assert!(task.recurring_type.is_none());
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json.get("userId").is_some());
        assert!(json.get("isRecurring").is_some());
        assert_eq!(json["completedAt"], serde_json::Value::Null);
    }
}
