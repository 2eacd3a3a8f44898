//! Trigger → action workflow rules evaluated against every open record each pass.

mod actions;
mod triggers;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::assignment::{Assigner, StaffPool};
use super::domain::{
    Application, CommunicationLog, Document, Lead, RecordRef, RuleId, StaffId, Task, TaskPriority,
};
use super::pass::{bounded, AutomationConfig, AutomationError, PassSummary};
use super::repository::{MessageSender, RecordStore, SnapshotFilter, StoreError, TextGenerator};
use super::subject::Subject;

use actions::ActionContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    CommunicationGap,
    DeadlineApproaching,
    DocumentPending,
    StatusChange,
    SentimentNegative,
    Scheduled,
}

impl TriggerType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::CommunicationGap => "communication_gap",
            Self::DeadlineApproaching => "deadline_approaching",
            Self::DocumentPending => "document_pending",
            Self::StatusChange => "status_change",
            Self::SentimentNegative => "sentiment_negative",
            Self::Scheduled => "scheduled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    CreateTask,
    SendEmail,
    SendPersonalizedEmail,
    NotifyCounselor,
    FlagUrgent,
}

impl ActionType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::CreateTask => "create_task",
            Self::SendEmail => "send_email",
            Self::SendPersonalizedEmail => "send_personalized_email",
            Self::NotifyCounselor => "notify_counselor",
            Self::FlagUrgent => "flag_urgent",
        }
    }

    const fn is_email(self) -> bool {
        matches!(self, Self::SendEmail | Self::SendPersonalizedEmail)
    }
}

/// Type-specific trigger parameters. Unused fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConditions {
    #[serde(default)]
    pub days_threshold: Option<u32>,
    /// `status_change` only fires for transitions into this status label.
    #[serde(default)]
    pub to_status: Option<String>,
    /// Minimum days between two emails from this rule to the same record.
    #[serde(default)]
    pub cooldown_days: Option<u32>,
    #[serde(default)]
    pub only_unassigned: bool,
}

/// Operator-configured automation entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRule {
    pub id: RuleId,
    pub name: String,
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub trigger_conditions: TriggerConditions,
    pub action_type: ActionType,
    #[serde(default = "default_priority")]
    pub task_priority: TaskPriority,
    #[serde(default)]
    pub task_title_template: Option<String>,
    #[serde(default)]
    pub email_subject_template: Option<String>,
    #[serde(default)]
    pub email_template: Option<String>,
    pub is_active: bool,
    #[serde(default)]
    pub executions_count: u32,
    #[serde(default)]
    pub success_count: u32,
}

fn default_priority() -> TaskPriority {
    TaskPriority::Medium
}

impl WorkflowRule {
    pub fn validate(&self) -> Result<(), AutomationError> {
        let invalid = |reason: &str| AutomationError::Validation {
            entity: "rule",
            id: self.id.0.clone(),
            reason: reason.to_string(),
        };

        if matches!(
            self.trigger_type,
            TriggerType::CommunicationGap | TriggerType::DeadlineApproaching
        ) && self.trigger_conditions.days_threshold.is_none()
        {
            return Err(invalid("trigger requires days_threshold"));
        }

        if self.action_type.is_email() && is_blank(self.email_template.as_deref()) {
            return Err(invalid("email actions require email_template"));
        }

        if self.action_type == ActionType::SendEmail
            && is_blank(self.email_subject_template.as_deref())
        {
            return Err(invalid("send_email requires email_subject_template"));
        }

        Ok(())
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|text| text.trim().is_empty()).unwrap_or(true)
}

/// Records read once at pass start.
#[derive(Debug, Default)]
pub(crate) struct RuleSnapshot {
    pub leads: Vec<Lead>,
    pub applications: Vec<Application>,
    pub documents: Vec<Document>,
    pub communications: Vec<CommunicationLog>,
    pub open_tasks: Vec<Task>,
}

/// Mutable state carried across rules within one pass.
pub(crate) struct PassState {
    pub pool: StaffPool,
    /// Assignments committed during this pass, so later rules see them.
    pub assigned: HashMap<RecordRef, StaffId>,
}

impl PassState {
    pub fn owner_of(&self, subject: &Subject<'_>) -> Option<StaffId> {
        subject
            .assigned_to()
            .cloned()
            .or_else(|| self.assigned.get(&subject.reference()).cloned())
    }
}

/// Collaborators for one rule pass.
pub struct RuleEngine<'a, S: ?Sized, M: ?Sized, G: ?Sized> {
    pub store: &'a S,
    pub sender: &'a M,
    pub generator: &'a G,
    pub config: &'a AutomationConfig,
}

impl<S, M, G> RuleEngine<'_, S, M, G>
where
    S: RecordStore + ?Sized,
    M: MessageSender + ?Sized,
    G: TextGenerator + ?Sized,
{
    /// Evaluates every active rule against the filtered snapshot.
    ///
    /// Only a failed snapshot read aborts the pass; per-record failures are counted
    /// in the summary and evaluation moves on.
    pub async fn run_pass(
        &self,
        filter: &SnapshotFilter,
        now: DateTime<Utc>,
    ) -> Result<PassSummary, AutomationError> {
        let limit = self.config.call_timeout();
        let rules = bounded(limit, "list_rules", self.store.list_rules()).await?;
        let snapshot = RuleSnapshot {
            leads: bounded(limit, "list_leads", self.store.list_leads(filter)).await?,
            applications: bounded(limit, "list_applications", self.store.list_applications(filter))
                .await?,
            documents: bounded(limit, "list_documents", self.store.list_documents(filter)).await?,
            communications: bounded(
                limit,
                "list_communications",
                self.store.list_communications(filter),
            )
            .await?,
            open_tasks: bounded(limit, "open_tasks", self.store.open_tasks()).await?,
        };
        let mut state = PassState {
            pool: StaffPool::new(bounded(limit, "list_staff", self.store.list_staff()).await?),
            assigned: HashMap::new(),
        };
        let assigner = Assigner::new(limit);
        let context = ActionContext {
            store: self.store,
            sender: self.sender,
            generator: self.generator,
            config: self.config,
            assigner: &assigner,
            now,
        };
        let mut summary = PassSummary::new(self.config.max_error_messages);

        for rule in &rules {
            if !rule.is_active {
                debug!(rule = %rule.id, "skipping inactive rule");
                continue;
            }
            if let Err(err) = rule.validate() {
                warn!(rule = %rule.id, error = %err, "skipping misconfigured rule");
                summary.skipped += 1;
                summary.record_error(format!("rule {}", rule.id), &err);
                continue;
            }

            let subjects = triggers::matching(rule, &snapshot, &state, now);
            let mut executions = 0u32;
            let mut successes = 0u32;

            for subject in subjects {
                summary.processed += 1;
                if actions::already_handled(rule, &subject, &snapshot, self.config, now) {
                    debug!(rule = %rule.id, record = %subject.reference(), "already handled");
                    summary.skipped += 1;
                    continue;
                }

                executions += 1;
                let outcome = actions::execute(&context, rule, &subject, &mut state).await;

                match outcome {
                    Ok(Some(effects)) => {
                        successes += 1;
                        summary.created += effects.created;
                        summary.sent += effects.sent;
                        summary.assigned += effects.assigned;
                        summary.no_capacity += effects.no_capacity;
                    }
                    Ok(None) => summary.skipped += 1,
                    Err(AutomationError::Store(StoreError::AlreadyAssigned)) => {
                        debug!(record = %subject.reference(), "record assigned by a concurrent pass");
                        summary.skipped += 1;
                    }
                    Err(err) => {
                        warn!(
                            rule = %rule.id,
                            record = %subject.reference(),
                            action = rule.action_type.label(),
                            error = %err,
                            "rule action failed"
                        );
                        summary.record_error(
                            format!("rule {} on {}", rule.id, subject.reference()),
                            &err,
                        );
                    }
                }
            }

            if executions > 0 {
                if let Err(err) = bounded(
                    limit,
                    "record_rule_outcome",
                    self.store
                        .record_rule_outcome(&rule.id, executions, successes),
                )
                .await
                {
                    warn!(rule = %rule.id, error = %err, "failed to record rule counters");
                    summary.record_error(format!("rule {}", rule.id), &err);
                }
            }
        }

        let watches_status = rules
            .iter()
            .any(|rule| rule.is_active && rule.trigger_type == TriggerType::StatusChange);
        if watches_status {
            self.acknowledge_changes(&snapshot, &mut summary).await;
        }

        info!(
            processed = summary.processed,
            created = summary.created,
            sent = summary.sent,
            assigned = summary.assigned,
            skipped = summary.skipped,
            errors = summary.errors,
            "rule pass complete"
        );
        Ok(summary)
    }

    async fn acknowledge_changes(&self, snapshot: &RuleSnapshot, summary: &mut PassSummary) {
        let changed = snapshot
            .leads
            .iter()
            .map(Subject::Lead)
            .chain(snapshot.applications.iter().map(Subject::Application))
            .filter(|subject| subject.status_changed());

        for subject in changed {
            let record = subject.reference();
            match bounded(
                self.config.call_timeout(),
                "acknowledge_status",
                self.store.acknowledge_status(&record, subject.status_label()),
            )
            .await
            {
                Ok(()) => {}
                Err(AutomationError::Store(StoreError::Conflict)) => {
                    debug!(%record, "status moved during the pass, left for the next one");
                }
                Err(err) => {
                    warn!(%record, error = %err, "failed to acknowledge status change");
                    summary.record_error(&record, &err);
                }
            }
        }
    }
}
