//! Lead scoring, counselor assignment, workflow rules, reminders, and SLA checks.
//!
//! Every sub-engine runs as a pass over a snapshot read from a [`RecordStore`]. Passes
//! keep no state between runs beyond what they write back, so manual and scheduled
//! invocations behave the same.

pub mod assignment;
pub mod domain;
pub mod memory;
pub mod pass;
pub mod reminders;
pub mod repository;
pub mod router;
pub mod rules;
pub mod scoring;
pub mod service;
pub mod sla;
pub mod subject;
pub mod templates;

#[cfg(test)]
mod tests;

pub use assignment::{assign, AssignmentPass, AssignmentResult, Assigner, Demand, StaffPool};
pub use domain::{
    AlertId, AlertStatus, Application, ApplicationId, ApplicationStatus, Channel,
    CommunicationLog, Direction, Document, DocumentId, DocumentStatus, Lead, LeadId, LeadStatus,
    RecordKind, RecordRef, ReminderId, RuleId, Sentiment, SlaAlert, SlaAlertType, Staff, StaffId,
    StaffStatus, Task, TaskId, TaskPriority, TaskStatus,
};
pub use memory::InMemoryStore;
pub use pass::{AutomationConfig, AutomationError, PassKind, PassReport, PassSummary};
pub use reminders::{
    Audience, DeliveryChannels, Frequency, MessageTemplate, Reminder, ReminderScheduler,
    ReminderTiming, ReminderType, TriggerCondition,
};
pub use repository::{
    AssignmentCommit, GenerationError, MessageSender, MessagingError, OutboundMessage, Recipient,
    RecordStore, SnapshotFilter, StoreError, TextGenerator,
};
pub use router::automation_router;
pub use rules::{ActionType, RuleEngine, TriggerConditions, TriggerType, WorkflowRule};
pub use scoring::{
    LeadScore, LeadScorer, LeadTier, ScoreComponent, ScoreFactor, ScoringConfig, ScoringWeights,
    TierThresholds,
};
pub use service::AutomationService;
pub use sla::SlaMonitor;
