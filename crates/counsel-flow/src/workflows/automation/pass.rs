use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::repository::{GenerationError, MessagingError, StoreError};
use super::scoring::ScoringConfig;

/// Settings handed to every pass. Callers supply defaults via `Default`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationConfig {
    pub scoring: ScoringConfig,
    pub sla_threshold_minutes: u32,
    /// Upper bound for any single store, messaging, or generation call.
    pub call_timeout_ms: u64,
    /// Width of the window after `time_of_day` during which a reminder may fire.
    pub reminder_window_minutes: u32,
    /// Cap on per-record error messages kept in a summary.
    pub max_error_messages: usize,
    /// Email cooldown when a rule does not set `cooldown_days`.
    pub default_cooldown_days: u32,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            sla_threshold_minutes: 60,
            call_timeout_ms: 5_000,
            reminder_window_minutes: 60,
            max_error_messages: 20,
            default_cooldown_days: 1,
        }
    }
}

impl AutomationConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    Rules,
    Reminders,
    Assignment,
    Sla,
}

impl PassKind {
    pub const fn all() -> [Self; 4] {
        [Self::Assignment, Self::Rules, Self::Reminders, Self::Sla]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Rules => "rules",
            Self::Reminders => "reminders",
            Self::Assignment => "assignment",
            Self::Sla => "sla",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "rules" | "rule" => Some(Self::Rules),
            "reminders" | "reminder" => Some(Self::Reminders),
            "assignment" | "assign" | "auto-assign" => Some(Self::Assignment),
            "sla" => Some(Self::Sla),
            _ => None,
        }
    }
}

/// Aggregate outcome of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    pub processed: u32,
    pub created: u32,
    pub sent: u32,
    pub assigned: u32,
    pub skipped: u32,
    /// Demands left unassigned because no staff had capacity.
    pub no_capacity: u32,
    pub errors: u32,
    pub error_messages: Vec<String>,
    #[serde(skip)]
    max_error_messages: usize,
}

impl PassSummary {
    pub fn new(max_error_messages: usize) -> Self {
        Self {
            max_error_messages,
            ..Self::default()
        }
    }

    pub fn record_error(&mut self, context: impl std::fmt::Display, error: &AutomationError) {
        self.errors += 1;
        if self.error_messages.len() < self.max_error_messages {
            self.error_messages.push(format!("{context}: {error}"));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassReport {
    pub kind: PassKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: PassSummary,
}

/// Failure taxonomy for automation work.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AutomationError {
    #[error("invalid {entity} '{id}': {reason}")]
    Validation {
        entity: &'static str,
        id: String,
        reason: String,
    },
    #[error("dispatch failed: {0}")]
    Dispatch(String),
    #[error("concurrent update conflict on {0}")]
    ConcurrencyConflict(String),
    #[error("{operation} timed out after {millis} ms")]
    Timeout { operation: &'static str, millis: u64 },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Messaging(#[from] MessagingError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Runs one collaborator call under the configured timeout.
pub(crate) async fn bounded<T, E, F>(
    limit: Duration,
    operation: &'static str,
    call: F,
) -> Result<T, AutomationError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<AutomationError>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(AutomationError::Timeout {
            operation,
            millis: limit.as_millis() as u64,
        }),
    }
}
