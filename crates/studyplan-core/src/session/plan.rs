use std::collections::HashSet;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};

/// Allowed range for a user-supplied estimate, in minutes.
pub const USER_ESTIMATE_RANGE: RangeInclusive<u32> = 1..=60;

/// A unit of work referenced by a plan. Owned by the task service;
/// the engine only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    /// Source estimate in minutes.
    pub estimated_time: u32,
    /// User override in minutes.
    #[serde(default)]
    pub user_estimate: Option<u32>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>, estimated_time: u32) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            estimated_time,
            user_estimate: None,
        }
    }

    pub fn with_user_estimate(mut self, minutes: u32) -> Self {
        self.user_estimate = Some(minutes);
        self
    }

    /// The estimate that counts: the user's override if set.
    pub fn effective_estimate_min(&self) -> u32 {
        self.user_estimate.unwrap_or(self.estimated_time)
    }
}

/// Ordered work list plus a time budget. Presentation order is work order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPlan {
    pub id: String,
    /// Total budget in whole seconds.
    pub scheduled_duration: u64,
    #[serde(default)]
    pub tasks_planned: Vec<Task>,
}

impl SessionPlan {
    pub fn new(id: impl Into<String>, scheduled_duration: u64, tasks_planned: Vec<Task>) -> Self {
        Self {
            id: id.into(),
            scheduled_duration,
            tasks_planned,
        }
    }

    /// Check the plan is usable for a session.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidPlan`] if the budget is zero, a task id
    /// repeats, or a user estimate falls outside [`USER_ESTIMATE_RANGE`].
    pub fn validate(&self) -> Result<()> {
        if self.scheduled_duration == 0 {
            return Err(SessionError::InvalidPlan(
                "scheduled duration must be greater than zero".into(),
            ));
        }

        let mut seen = HashSet::with_capacity(self.tasks_planned.len());
        for task in &self.tasks_planned {
            if !seen.insert(task.id.as_str()) {
                return Err(SessionError::InvalidPlan(format!(
                    "task id '{}' appears more than once",
                    task.id
                )));
            }
            if let Some(minutes) = task.user_estimate {
                if !USER_ESTIMATE_RANGE.contains(&minutes) {
                    return Err(SessionError::InvalidPlan(format!(
                        "user estimate for task '{}' must be between {} and {} minutes, got {}",
                        task.id,
                        USER_ESTIMATE_RANGE.start(),
                        USER_ESTIMATE_RANGE.end(),
                        minutes
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn task(&self, index: usize) -> Option<&Task> {
        self.tasks_planned.get(index)
    }

    pub fn task_count(&self) -> usize {
        self.tasks_planned.len()
    }

    /// Sum of effective estimates, in minutes.
    pub fn total_estimate_min(&self) -> u64 {
        self.tasks_planned
            .iter()
            .map(|t| u64::from(t.effective_estimate_min()))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_estimate_overrides_source_estimate() {
        let task = Task::new("t1", "Read chapter 3", 45).with_user_estimate(30);
        assert_eq!(task.effective_estimate_min(), 30);
        assert_eq!(Task::new("t2", "Lab", 20).effective_estimate_min(), 20);
    }

    #[test]
    fn zero_budget_is_invalid() {
        let plan = SessionPlan::new("p", 0, vec![]);
        assert!(matches!(plan.validate(), Err(SessionError::InvalidPlan(_))));
    }

    #[test]
    fn empty_task_list_is_valid() {
        assert!(SessionPlan::new("p", 60, vec![]).validate().is_ok());
    }

    #[test]
    fn duplicate_task_ids_are_rejected() {
        let plan = SessionPlan::new(
            "p",
            600,
            vec![Task::new("a", "One", 10), Task::new("a", "Two", 10)],
        );
        let err = plan.validate().unwrap_err();
        assert!(err.to_string().contains("'a'"));
    }

    #[test]
    fn user_estimate_bounds_are_inclusive() {
        for (minutes, ok) in [(0, false), (1, true), (60, true), (61, false)] {
            let plan = SessionPlan::new(
                "p",
                600,
                vec![Task::new("a", "One", 10).with_user_estimate(minutes)],
            );
            assert_eq!(plan.validate().is_ok(), ok, "user estimate {minutes}");
        }
    }

    #[test]
    fn deserializes_camel_case_payload() {
        let json = r#"{
            "id": "plan-7",
            "scheduledDuration": 3600,
            "tasksPlanned": [
                {"id": "t1", "title": "Essay", "estimatedTime": 40, "userEstimate": 25},
                {"id": "t2", "title": "Quiz", "estimatedTime": 15}
            ]
        }"#;
        let plan: SessionPlan = serde_json::from_str(json).unwrap();
        assert_eq!(plan.task_count(), 2);
        assert_eq!(plan.total_estimate_min(), 40);
        assert_eq!(plan.task(1).unwrap().user_estimate, None);
    }
}
