//! Process-local `RecordStore` used by the API service, the demo, and tests.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::domain::{
    AlertId, AlertStatus, Application, ApplicationId, CommunicationLog, Document, DocumentId,
    Lead, LeadId, LeadStatus, NewCommunication, NewSlaAlert, NewTask, RecordKind, RecordRef,
    ReminderId, RuleId, SlaAlert, Staff, StaffId, Task, TaskId, TaskStatus,
};
use super::reminders::Reminder;
use super::repository::{AssignmentCommit, RecordStore, SnapshotFilter, StoreError};
use super::rules::WorkflowRule;

#[derive(Debug, Default)]
struct MemoryState {
    leads: BTreeMap<LeadId, Lead>,
    applications: BTreeMap<ApplicationId, Application>,
    documents: BTreeMap<DocumentId, Document>,
    staff: BTreeMap<StaffId, Staff>,
    communications: Vec<CommunicationLog>,
    rules: Vec<WorkflowRule>,
    reminders: Vec<Reminder>,
    reminder_claims: BTreeMap<ReminderId, DateTime<Utc>>,
    tasks: Vec<Task>,
    alerts: Vec<SlaAlert>,
    sequence: u64,
}

impl MemoryState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{prefix}-{:06}", self.sequence)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
    }

    fn seed(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_lead(&self, lead: Lead) {
        self.seed().leads.insert(lead.id.clone(), lead);
    }

    pub fn insert_application(&self, application: Application) {
        self.seed()
            .applications
            .insert(application.id.clone(), application);
    }

    pub fn insert_document(&self, document: Document) {
        self.seed().documents.insert(document.id.clone(), document);
    }

    pub fn insert_staff(&self, staff: Staff) {
        self.seed().staff.insert(staff.id.clone(), staff);
    }

    pub fn insert_communication(&self, entry: CommunicationLog) {
        self.seed().communications.push(entry);
    }

    pub fn insert_rule(&self, rule: WorkflowRule) {
        self.seed().rules.push(rule);
    }

    pub fn insert_reminder(&self, reminder: Reminder) {
        self.seed().reminders.push(reminder);
    }

    pub fn insert_alert(&self, alert: SlaAlert) {
        self.seed().alerts.push(alert);
    }

    pub fn leads(&self) -> Vec<Lead> {
        self.seed().leads.values().cloned().collect()
    }

    pub fn lead(&self, id: &LeadId) -> Option<Lead> {
        self.seed().leads.get(id).cloned()
    }

    pub fn application(&self, id: &ApplicationId) -> Option<Application> {
        self.seed().applications.get(id).cloned()
    }

    pub fn staff(&self) -> Vec<Staff> {
        self.seed().staff.values().cloned().collect()
    }

    pub fn staff_member(&self, id: &StaffId) -> Option<Staff> {
        self.seed().staff.get(id).cloned()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.seed().tasks.clone()
    }

    pub fn alerts(&self) -> Vec<SlaAlert> {
        self.seed().alerts.clone()
    }

    pub fn communications(&self) -> Vec<CommunicationLog> {
        self.seed().communications.clone()
    }

    pub fn rule(&self, id: &RuleId) -> Option<WorkflowRule> {
        self.seed().rules.iter().find(|rule| &rule.id == id).cloned()
    }

    pub fn reminder(&self, id: &ReminderId) -> Option<Reminder> {
        self.seed()
            .reminders
            .iter()
            .find(|reminder| &reminder.id == id)
            .cloned()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn list_leads(&self, filter: &SnapshotFilter) -> Result<Vec<Lead>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .leads
            .values()
            .filter(|lead| filter.admits(lead.id.as_str(), lead.assigned_to.as_ref()))
            .cloned()
            .collect())
    }

    async fn list_applications(
        &self,
        filter: &SnapshotFilter,
    ) -> Result<Vec<Application>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .applications
            .values()
            .filter(|app| filter.admits(app.id.as_str(), app.assigned_to.as_ref()))
            .cloned()
            .collect())
    }

    async fn list_documents(&self, filter: &SnapshotFilter) -> Result<Vec<Document>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .documents
            .values()
            .filter(|doc| filter.admits(doc.id.as_str(), doc.assigned_to.as_ref()))
            .cloned()
            .collect())
    }

    async fn list_communications(
        &self,
        filter: &SnapshotFilter,
    ) -> Result<Vec<CommunicationLog>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .communications
            .iter()
            .filter(|entry| {
                filter.record_ids.is_empty() || filter.record_ids.contains(&entry.record_id)
            })
            .cloned()
            .collect())
    }

    async fn list_staff(&self) -> Result<Vec<Staff>, StoreError> {
        Ok(self.lock()?.staff.values().cloned().collect())
    }

    async fn list_rules(&self) -> Result<Vec<WorkflowRule>, StoreError> {
        Ok(self.lock()?.rules.clone())
    }

    async fn list_reminders(&self) -> Result<Vec<Reminder>, StoreError> {
        Ok(self.lock()?.reminders.clone())
    }

    async fn fetch_reminder(&self, id: &ReminderId) -> Result<Option<Reminder>, StoreError> {
        Ok(self
            .lock()?
            .reminders
            .iter()
            .find(|reminder| &reminder.id == id)
            .cloned())
    }

    async fn fetch_lead(&self, id: &LeadId) -> Result<Option<Lead>, StoreError> {
        Ok(self.lock()?.leads.get(id).cloned())
    }

    async fn open_tasks(&self) -> Result<Vec<Task>, StoreError> {
        Ok(self
            .lock()?
            .tasks
            .iter()
            .filter(|task| task.status.is_open())
            .cloned()
            .collect())
    }

    async fn create_task(&self, task: NewTask) -> Result<Task, StoreError> {
        let mut state = self.lock()?;
        let task = Task {
            id: TaskId(state.next_id("task")),
            title: task.title,
            description: task.description,
            assigned_to: task.assigned_to,
            priority: task.priority,
            due_date: task.due_date,
            status: TaskStatus::Pending,
            source_rule: task.source_rule,
            related_record: task.related_record,
            created_date: task.created_date,
        };
        state.tasks.push(task.clone());
        Ok(task)
    }

    async fn create_alert(&self, alert: NewSlaAlert) -> Result<SlaAlert, StoreError> {
        let mut state = self.lock()?;
        let alert = SlaAlert {
            id: AlertId(state.next_id("alert")),
            inquiry_id: alert.inquiry_id,
            alert_type: alert.alert_type,
            time_elapsed_minutes: alert.time_elapsed_minutes,
            status: AlertStatus::Pending,
            created_date: alert.created_date,
            resolved_date: None,
        };
        state.alerts.push(alert.clone());
        Ok(alert)
    }

    async fn log_communication(
        &self,
        entry: NewCommunication,
    ) -> Result<CommunicationLog, StoreError> {
        let mut state = self.lock()?;
        let entry = CommunicationLog {
            id: state.next_id("comm"),
            record_id: entry.record_id,
            rule_id: entry.rule_id,
            channel: entry.channel,
            direction: entry.direction,
            sentiment: None,
            subject: entry.subject,
            created_date: entry.created_date,
        };
        state.communications.push(entry.clone());
        Ok(entry)
    }

    async fn commit_assignment(&self, commit: &AssignmentCommit) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;

        let staff = state
            .staff
            .get_mut(&commit.staff_id)
            .ok_or(StoreError::NotFound)?;
        if staff.current_students != commit.expected_load || !staff.is_eligible() {
            return Err(StoreError::Conflict);
        }

        let target = &commit.target;
        match target.kind {
            RecordKind::Lead => {
                let lead = state
                    .leads
                    .get_mut(target.id.as_str())
                    .ok_or(StoreError::NotFound)?;
                if lead.assigned_to.is_some() {
                    return Err(StoreError::AlreadyAssigned);
                }
                lead.assigned_to = Some(commit.staff_id.clone());
                if lead.status == LeadStatus::New {
                    lead.status = LeadStatus::Assigned;
                }
                lead.updated_date = commit.committed_at;
            }
            RecordKind::Application => {
                let app = state
                    .applications
                    .get_mut(target.id.as_str())
                    .ok_or(StoreError::NotFound)?;
                if app.assigned_to.is_some() {
                    return Err(StoreError::AlreadyAssigned);
                }
                app.assigned_to = Some(commit.staff_id.clone());
            }
            RecordKind::Document => {
                let doc = state
                    .documents
                    .get_mut(target.id.as_str())
                    .ok_or(StoreError::NotFound)?;
                if doc.assigned_to.is_some() {
                    return Err(StoreError::AlreadyAssigned);
                }
                doc.assigned_to = Some(commit.staff_id.clone());
                // Documents ride on the student's caseload seat.
                return Ok(());
            }
        }

        staff.current_students += 1;
        Ok(())
    }

    async fn flag_urgent(&self, record: &RecordRef) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let flag = match record.kind {
            RecordKind::Lead => state
                .leads
                .get_mut(record.id.as_str())
                .map(|lead| &mut lead.is_urgent),
            RecordKind::Application => state
                .applications
                .get_mut(record.id.as_str())
                .map(|app| &mut app.is_urgent),
            RecordKind::Document => state
                .documents
                .get_mut(record.id.as_str())
                .map(|doc| &mut doc.is_urgent),
        };
        *flag.ok_or(StoreError::NotFound)? = true;
        Ok(())
    }

    async fn acknowledge_status(
        &self,
        record: &RecordRef,
        observed: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        match record.kind {
            RecordKind::Lead => {
                let lead = state
                    .leads
                    .get_mut(record.id.as_str())
                    .ok_or(StoreError::NotFound)?;
                if lead.status.label() != observed {
                    return Err(StoreError::Conflict);
                }
                lead.previous_status = Some(lead.status);
            }
            RecordKind::Application => {
                let app = state
                    .applications
                    .get_mut(record.id.as_str())
                    .ok_or(StoreError::NotFound)?;
                if app.status.label() != observed {
                    return Err(StoreError::Conflict);
                }
                app.previous_status = Some(app.status);
            }
            RecordKind::Document => {}
        }
        Ok(())
    }

    async fn mark_sla_breached(&self, id: &LeadId) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let lead = state.leads.get_mut(id).ok_or(StoreError::NotFound)?;
        if lead.sla_breached {
            return Err(StoreError::Conflict);
        }
        lead.sla_breached = true;
        Ok(())
    }

    async fn clear_sla_breach(&self, id: &LeadId) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let lead = state.leads.get_mut(id).ok_or(StoreError::NotFound)?;
        lead.sla_breached = false;
        Ok(())
    }

    async fn record_rule_outcome(
        &self,
        id: &RuleId,
        executions: u32,
        successes: u32,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let rule = state
            .rules
            .iter_mut()
            .find(|rule| &rule.id == id)
            .ok_or(StoreError::NotFound)?;
        rule.executions_count += executions;
        rule.success_count += successes;
        Ok(())
    }

    async fn mark_reminder_fired(
        &self,
        id: &ReminderId,
        expected: Option<DateTime<Utc>>,
        fired_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let reminder = state
            .reminders
            .iter_mut()
            .find(|reminder| &reminder.id == id)
            .ok_or(StoreError::NotFound)?;
        if reminder.last_triggered != expected {
            return Err(StoreError::Conflict);
        }
        reminder.last_triggered = Some(fired_at);
        reminder.trigger_count += 1;
        state.reminder_claims.remove(id);
        Ok(())
    }

    async fn claim_reminder(
        &self,
        id: &ReminderId,
        expected: Option<DateTime<Utc>>,
        claimed_at: DateTime<Utc>,
        lease: Duration,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let reminder = state
            .reminders
            .iter()
            .find(|reminder| &reminder.id == id)
            .ok_or(StoreError::NotFound)?;
        if reminder.last_triggered != expected {
            return Err(StoreError::Conflict);
        }
        if let Some(held) = state.reminder_claims.get(id) {
            if claimed_at - *held < lease {
                return Err(StoreError::Conflict);
            }
        }
        state.reminder_claims.insert(id.clone(), claimed_at);
        Ok(())
    }

    async fn release_reminder(
        &self,
        id: &ReminderId,
        claimed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.reminder_claims.get(id) == Some(&claimed_at) {
            state.reminder_claims.remove(id);
        }
        Ok(())
    }

    async fn fetch_alert(&self, id: &AlertId) -> Result<Option<SlaAlert>, StoreError> {
        Ok(self
            .lock()?
            .alerts
            .iter()
            .find(|alert| &alert.id == id)
            .cloned())
    }

    async fn update_alert(&self, alert: SlaAlert) -> Result<SlaAlert, StoreError> {
        let mut state = self.lock()?;
        let slot = state
            .alerts
            .iter_mut()
            .find(|existing| existing.id == alert.id)
            .ok_or(StoreError::NotFound)?;
        *slot = alert.clone();
        Ok(alert)
    }
}
