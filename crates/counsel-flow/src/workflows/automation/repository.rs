use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Application, AlertId, Channel, CommunicationLog, Document, Lead, LeadId, NewCommunication,
    NewSlaAlert, NewTask, RecordRef, ReminderId, RuleId, SlaAlert, Staff, StaffId, Task,
};
use super::reminders::Reminder;
use super::rules::WorkflowRule;

/// Narrows the snapshot a pass reads. The default selects everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFilter {
    /// Restrict to these record ids; empty means no restriction.
    #[serde(default)]
    pub record_ids: Vec<String>,
    #[serde(default)]
    pub assigned_to: Option<StaffId>,
}

impl SnapshotFilter {
    pub fn admits(&self, record_id: &str, assigned_to: Option<&StaffId>) -> bool {
        let id_ok = self.record_ids.is_empty() || self.record_ids.iter().any(|id| id == record_id);
        let owner_ok = match &self.assigned_to {
            Some(owner) => assigned_to == Some(owner),
            None => true,
        };
        id_ok && owner_ok
    }
}

/// Capacity claim plus `assigned_to` write, applied as one unit by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentCommit {
    pub staff_id: StaffId,
    /// The staff member's `current_students` as read; the commit fails if it changed.
    pub expected_load: u32,
    pub target: RecordRef,
    pub committed_at: DateTime<Utc>,
}

/// Record store collaborator. Conditional writes report lost races as `Conflict`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list_leads(&self, filter: &SnapshotFilter) -> Result<Vec<Lead>, StoreError>;
    async fn list_applications(
        &self,
        filter: &SnapshotFilter,
    ) -> Result<Vec<Application>, StoreError>;
    async fn list_documents(&self, filter: &SnapshotFilter) -> Result<Vec<Document>, StoreError>;
    async fn list_communications(
        &self,
        filter: &SnapshotFilter,
    ) -> Result<Vec<CommunicationLog>, StoreError>;
    async fn list_staff(&self) -> Result<Vec<Staff>, StoreError>;
    async fn list_rules(&self) -> Result<Vec<WorkflowRule>, StoreError>;
    async fn list_reminders(&self) -> Result<Vec<Reminder>, StoreError>;
    async fn fetch_reminder(&self, id: &ReminderId) -> Result<Option<Reminder>, StoreError>;
    async fn fetch_lead(&self, id: &LeadId) -> Result<Option<Lead>, StoreError>;
    async fn open_tasks(&self) -> Result<Vec<Task>, StoreError>;

    async fn create_task(&self, task: NewTask) -> Result<Task, StoreError>;
    async fn create_alert(&self, alert: NewSlaAlert) -> Result<SlaAlert, StoreError>;
    async fn log_communication(
        &self,
        entry: NewCommunication,
    ) -> Result<CommunicationLog, StoreError>;

    /// Fails with `Conflict` when the load moved or capacity is gone, and with
    /// `AlreadyAssigned` when the target gained an assignee since it was read.
    async fn commit_assignment(&self, commit: &AssignmentCommit) -> Result<(), StoreError>;
    async fn flag_urgent(&self, record: &RecordRef) -> Result<(), StoreError>;
    /// Records `observed` as the last seen status so `status_change` fires once per
    /// change. Fails with `Conflict` when the status moved away from `observed`.
    async fn acknowledge_status(
        &self,
        record: &RecordRef,
        observed: &str,
    ) -> Result<(), StoreError>;
    /// Fails with `Conflict` when the lead is already flagged.
    async fn mark_sla_breached(&self, id: &LeadId) -> Result<(), StoreError>;
    /// Undoes `mark_sla_breached` when the alert could not be written.
    async fn clear_sla_breach(&self, id: &LeadId) -> Result<(), StoreError>;
    async fn record_rule_outcome(
        &self,
        id: &RuleId,
        executions: u32,
        successes: u32,
    ) -> Result<(), StoreError>;
    /// Sets `last_triggered` and bumps `trigger_count` only if `last_triggered`
    /// still equals `expected`.
    async fn mark_reminder_fired(
        &self,
        id: &ReminderId,
        expected: Option<DateTime<Utc>>,
        fired_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    /// Takes the dispatch lease for a reminder before any message goes out. Fails with
    /// `Conflict` when `last_triggered` moved away from `expected` or another pass
    /// holds a lease younger than `lease`. `mark_reminder_fired` releases the lease.
    async fn claim_reminder(
        &self,
        id: &ReminderId,
        expected: Option<DateTime<Utc>>,
        claimed_at: DateTime<Utc>,
        lease: Duration,
    ) -> Result<(), StoreError>;
    /// Drops a lease taken at `claimed_at` without firing.
    async fn release_reminder(
        &self,
        id: &ReminderId,
        claimed_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn fetch_alert(&self, id: &AlertId) -> Result<Option<SlaAlert>, StoreError>;
    async fn update_alert(&self, alert: SlaAlert) -> Result<SlaAlert, StoreError>;
}

/// Error enumeration for store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("conditional write lost to a concurrent update")]
    Conflict,
    #[error("record already has an assignee")]
    AlreadyAssigned,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Who a message is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub user_id: String,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: Channel,
    pub recipient: Recipient,
    pub subject: Option<String>,
    pub body: String,
}

/// Outbound messaging collaborator (e-mail gateway, in-app notifications).
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, message: OutboundMessage) -> Result<(), MessagingError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessagingError {
    #[error("message transport unavailable: {0}")]
    Transport(String),
    #[error("message rejected: {0}")]
    Rejected(String),
}

/// Text-generation collaborator used for personalized drafts.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Structured variant. The default asks for plain text and parses it as JSON.
    async fn generate_structured(
        &self,
        prompt: &str,
        schema: &serde_json::Value,
    ) -> Result<serde_json::Value, GenerationError> {
        let prompt = format!("{prompt}\n\nRespond only with JSON matching this schema:\n{schema}");
        let raw = self.generate(&prompt).await?;
        serde_json::from_str(raw.trim()).map_err(|err| GenerationError::Malformed(err.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("text generation unavailable: {0}")]
    Unavailable(String),
    #[error("generated output malformed: {0}")]
    Malformed(String),
}
