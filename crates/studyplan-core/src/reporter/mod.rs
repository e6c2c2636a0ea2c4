//! Completion reporting.
//!
//! A finalized session is reported once to the task service, which answers
//! with the task statuses it updated. The engine only cares whether the call
//! succeeded; the updated statuses are handed back to the caller untouched.

pub mod http;
pub mod keyring_store;

pub use http::HttpCompletionReporter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ReporterError;
use crate::session::SessionSummary;

/// Request body sent to the task service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    pub session_id: String,
    pub actual_duration_seconds: u64,
    pub completions: Vec<ReportedCompletion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedCompletion {
    pub task_id: String,
    pub time_spent_seconds: u64,
}

/// Task state as updated by the task service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusUpdate {
    pub id: String,
    pub status: String,
}

/// Successful reporter response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportAck {
    #[serde(default)]
    pub updated_tasks: Vec<TaskStatusUpdate>,
}

impl CompletionReport {
    pub fn from_summary(summary: &SessionSummary) -> Self {
        Self {
            session_id: summary.session_id.clone(),
            actual_duration_seconds: summary.actual_duration_seconds,
            completions: summary
                .completions
                .iter()
                .map(|c| ReportedCompletion {
                    task_id: c.task_id.clone(),
                    time_spent_seconds: c.time_spent_seconds,
                })
                .collect(),
        }
    }
}

/// Remote endpoint accepting finalized sessions.
///
/// Any error is treated as retryable by the engine. Timeouts are the
/// implementation's business.
#[async_trait]
pub trait CompletionReporter: Send + Sync {
    async fn report(&self, report: &CompletionReport) -> Result<ReportAck, ReporterError>;
}
