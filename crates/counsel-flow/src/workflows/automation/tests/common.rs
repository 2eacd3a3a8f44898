use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::workflows::automation::domain::{
    AlertId, Application, ApplicationId, ApplicationStatus, Channel, CommunicationLog,
    Direction, Document, DocumentId, DocumentStatus, Lead, LeadId, LeadStatus, NewCommunication,
    NewSlaAlert, NewTask, RecordRef, ReminderId, RuleId, Sentiment, SlaAlert, Staff, StaffId,
    StaffStatus, Task, TaskPriority,
};
use crate::workflows::automation::reminders::{
    Audience, DeliveryChannels, Frequency, MessageTemplate, Reminder, ReminderTiming,
    ReminderType, TriggerCondition,
};
use crate::workflows::automation::repository::{
    AssignmentCommit, GenerationError, MessageSender, MessagingError, OutboundMessage,
    RecordStore, SnapshotFilter, StoreError, TextGenerator,
};
use crate::workflows::automation::rules::{
    ActionType, TriggerConditions, TriggerType, WorkflowRule,
};
use crate::workflows::automation::{AutomationConfig, AutomationService, InMemoryStore};

/// Monday 2026-03-02, 09:15 UTC.
pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 15, 0).unwrap()
}

pub(super) fn today() -> NaiveDate {
    now().date_naive()
}

pub(super) fn days_ago(days: i64) -> DateTime<Utc> {
    now() - chrono::Duration::days(days)
}

pub(super) fn config() -> AutomationConfig {
    AutomationConfig {
        call_timeout_ms: 200,
        ..AutomationConfig::default()
    }
}

pub(super) fn complete_lead(id: &str) -> Lead {
    Lead {
        id: LeadId::from(id),
        full_name: "Priya Sharma".to_string(),
        email: Some("priya@example.com".to_string()),
        phone: Some("+91 98765 43210".to_string()),
        country_of_interest: Some("UK".to_string()),
        degree_level: Some("Masters".to_string()),
        field_of_study: Some("Computer Science".to_string()),
        message: Some(
            "I would like to study a taught masters in the UK starting next September."
                .to_string(),
        ),
        status: LeadStatus::New,
        previous_status: None,
        assigned_to: None,
        response_time_minutes: None,
        sla_breached: false,
        is_urgent: false,
        created_date: days_ago(3),
        updated_date: days_ago(3),
    }
}

pub(super) fn bare_lead(id: &str) -> Lead {
    Lead {
        id: LeadId::from(id),
        full_name: "Tomas Silva".to_string(),
        email: None,
        phone: None,
        country_of_interest: None,
        degree_level: None,
        field_of_study: None,
        message: None,
        status: LeadStatus::New,
        previous_status: None,
        assigned_to: None,
        response_time_minutes: None,
        sla_breached: false,
        is_urgent: false,
        created_date: days_ago(1),
        updated_date: days_ago(1),
    }
}

pub(super) fn staff(id: &str, load: u32, max: u32, specializations: &[&str]) -> Staff {
    Staff {
        id: StaffId::from(id),
        full_name: format!("Counselor {id}"),
        email: Some(format!("{id}@consultancy.example")),
        specializations: specializations
            .iter()
            .map(|spec| spec.to_string())
            .collect::<BTreeSet<_>>(),
        current_students: load,
        max_students: max,
        is_available: true,
        status: StaffStatus::Active,
    }
}

pub(super) fn application(id: &str, deadline_in_days: Option<i64>) -> Application {
    Application {
        id: ApplicationId::from(id),
        student_id: format!("student-{id}"),
        student_name: "Amara Okafor".to_string(),
        student_email: Some("amara@example.com".to_string()),
        course_name: "MSc Data Science".to_string(),
        university_name: "University of Leeds".to_string(),
        destination_country: Some("UK".to_string()),
        status: ApplicationStatus::InProgress,
        previous_status: None,
        deadline: deadline_in_days.map(|days| today() + chrono::Duration::days(days)),
        assigned_to: None,
        is_urgent: false,
        created_date: days_ago(30),
    }
}

pub(super) fn document(id: &str, document_type: &str, status: DocumentStatus) -> Document {
    Document {
        id: DocumentId::from(id),
        student_id: "student-1".to_string(),
        student_name: "Amara Okafor".to_string(),
        student_email: Some("amara@example.com".to_string()),
        document_type: document_type.to_string(),
        status,
        requested_date: days_ago(10),
        expiry_date: None,
        assigned_to: None,
        is_urgent: false,
    }
}

pub(super) fn inbound(record_id: &str, sentiment: Sentiment, at: DateTime<Utc>) -> CommunicationLog {
    CommunicationLog {
        id: format!("in-{record_id}-{}", at.timestamp()),
        record_id: record_id.to_string(),
        rule_id: None,
        channel: Channel::Email,
        direction: Direction::Inbound,
        sentiment: Some(sentiment),
        subject: None,
        created_date: at,
    }
}

pub(super) fn rule(id: &str, trigger_type: TriggerType, action_type: ActionType) -> WorkflowRule {
    WorkflowRule {
        id: RuleId::from(id),
        name: format!("Rule {id}"),
        trigger_type,
        trigger_conditions: TriggerConditions::default(),
        action_type,
        task_priority: TaskPriority::Medium,
        task_title_template: None,
        email_subject_template: Some("Update for {{first_name}}".to_string()),
        email_template: Some("Hi {{first_name}}, checking in about {{status}}.".to_string()),
        is_active: true,
        executions_count: 0,
        success_count: 0,
    }
}

pub(super) fn deadline_reminder(id: &str, days_before: u32) -> Reminder {
    Reminder {
        id: ReminderId::from(id),
        name: "Deadline in a week".to_string(),
        reminder_type: ReminderType::ApplicationDeadline,
        trigger_condition: TriggerCondition {
            days_before_deadline: Some(days_before),
            target_audience: Audience::Student,
            ..TriggerCondition::default()
        },
        reminder_timing: ReminderTiming {
            frequency: Frequency::Daily,
            time_of_day: NaiveTime::from_hms_opt(9, 0, 0),
            specific_date: None,
            days_of_week: Vec::new(),
        },
        delivery_channels: DeliveryChannels {
            in_app: true,
            email: true,
        },
        message_template: MessageTemplate {
            subject: "{{course_name}} deadline".to_string(),
            body: "Hi {{first_name}}, {{university_name}} closes on {{deadline_date}}.".to_string(),
        },
        is_active: true,
        last_triggered: None,
        trigger_count: 0,
    }
}

/// Sender that records every message and can be told to reject one channel.
#[derive(Default)]
pub(super) struct RecordingSender {
    messages: Mutex<Vec<OutboundMessage>>,
    failing_channel: Mutex<Option<Channel>>,
    delay: Option<Duration>,
}

impl RecordingSender {
    pub(super) fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub(super) fn failing_on(channel: Channel) -> Self {
        let sender = Self::default();
        *sender.failing_channel.lock().expect("sender mutex poisoned") = Some(channel);
        sender
    }

    pub(super) fn messages(&self) -> Vec<OutboundMessage> {
        self.messages.lock().expect("sender mutex poisoned").clone()
    }

    pub(super) fn count(&self, channel: Channel) -> usize {
        self.messages()
            .iter()
            .filter(|message| message.channel == channel)
            .count()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, message: OutboundMessage) -> Result<(), MessagingError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if *self.failing_channel.lock().expect("sender mutex poisoned") == Some(message.channel) {
            return Err(MessagingError::Transport("gateway down".to_string()));
        }
        self.messages
            .lock()
            .expect("sender mutex poisoned")
            .push(message);
        Ok(())
    }
}

/// Generator returning a canned reply, optionally after a delay.
pub(super) struct CannedGenerator {
    reply: String,
    delay: Option<Duration>,
    pub(super) prompts: Mutex<Vec<String>>,
}

impl CannedGenerator {
    pub(super) fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn slow(delay: Duration) -> Self {
        Self {
            reply: "{}".to_string(),
            delay: Some(delay),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

impl Default for CannedGenerator {
    fn default() -> Self {
        Self::replying(r#"{"subject":"A note from your counselor","body":"Drafted body"}"#)
    }
}

#[async_trait]
impl TextGenerator for CannedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts
            .lock()
            .expect("generator mutex poisoned")
            .push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.reply.clone())
    }
}

/// In-memory store with scripted failures layered on top.
#[derive(Default)]
pub(super) struct ScriptedStore {
    pub(super) inner: InMemoryStore,
    /// Commits to fail with `Conflict`, each simulating another pass taking one seat.
    pub(super) assignment_conflicts: AtomicUsize,
    pub(super) fire_conflicts: AtomicUsize,
    /// Next fire write loses to another pass that already recorded the fire.
    pub(super) fired_elsewhere: AtomicBool,
    pub(super) unavailable: AtomicBool,
    pub(super) fail_task_creation: AtomicBool,
    pub(super) fail_alert_creation: AtomicBool,
}

impl ScriptedStore {
    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl RecordStore for ScriptedStore {
    async fn list_leads(&self, filter: &SnapshotFilter) -> Result<Vec<Lead>, StoreError> {
        self.check()?;
        self.inner.list_leads(filter).await
    }

    async fn list_applications(
        &self,
        filter: &SnapshotFilter,
    ) -> Result<Vec<Application>, StoreError> {
        self.check()?;
        self.inner.list_applications(filter).await
    }

    async fn list_documents(&self, filter: &SnapshotFilter) -> Result<Vec<Document>, StoreError> {
        self.check()?;
        self.inner.list_documents(filter).await
    }

    async fn list_communications(
        &self,
        filter: &SnapshotFilter,
    ) -> Result<Vec<CommunicationLog>, StoreError> {
        self.check()?;
        self.inner.list_communications(filter).await
    }

    async fn list_staff(&self) -> Result<Vec<Staff>, StoreError> {
        self.check()?;
        self.inner.list_staff().await
    }

    async fn list_rules(&self) -> Result<Vec<WorkflowRule>, StoreError> {
        self.check()?;
        self.inner.list_rules().await
    }

    async fn list_reminders(&self) -> Result<Vec<Reminder>, StoreError> {
        self.check()?;
        self.inner.list_reminders().await
    }

    async fn fetch_reminder(&self, id: &ReminderId) -> Result<Option<Reminder>, StoreError> {
        self.inner.fetch_reminder(id).await
    }

    async fn fetch_lead(&self, id: &LeadId) -> Result<Option<Lead>, StoreError> {
        self.check()?;
        self.inner.fetch_lead(id).await
    }

    async fn open_tasks(&self) -> Result<Vec<Task>, StoreError> {
        self.inner.open_tasks().await
    }

    async fn create_task(&self, task: NewTask) -> Result<Task, StoreError> {
        if self.fail_task_creation.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("task table locked".to_string()));
        }
        self.inner.create_task(task).await
    }

    async fn create_alert(&self, alert: NewSlaAlert) -> Result<SlaAlert, StoreError> {
        if self.fail_alert_creation.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("alert table locked".to_string()));
        }
        self.inner.create_alert(alert).await
    }

    async fn log_communication(
        &self,
        entry: NewCommunication,
    ) -> Result<CommunicationLog, StoreError> {
        self.inner.log_communication(entry).await
    }

    async fn commit_assignment(&self, commit: &AssignmentCommit) -> Result<(), StoreError> {
        if Self::take(&self.assignment_conflicts) {
            if let Some(mut member) = self.inner.staff_member(&commit.staff_id) {
                member.current_students += 1;
                self.inner.insert_staff(member);
            }
            return Err(StoreError::Conflict);
        }
        self.inner.commit_assignment(commit).await
    }

    async fn flag_urgent(&self, record: &RecordRef) -> Result<(), StoreError> {
        self.inner.flag_urgent(record).await
    }

    async fn acknowledge_status(
        &self,
        record: &RecordRef,
        observed: &str,
    ) -> Result<(), StoreError> {
        self.inner.acknowledge_status(record, observed).await
    }

    async fn mark_sla_breached(&self, id: &LeadId) -> Result<(), StoreError> {
        self.inner.mark_sla_breached(id).await
    }

    async fn clear_sla_breach(&self, id: &LeadId) -> Result<(), StoreError> {
        self.inner.clear_sla_breach(id).await
    }

    async fn record_rule_outcome(
        &self,
        id: &RuleId,
        executions: u32,
        successes: u32,
    ) -> Result<(), StoreError> {
        self.inner.record_rule_outcome(id, executions, successes).await
    }

    async fn mark_reminder_fired(
        &self,
        id: &ReminderId,
        expected: Option<DateTime<Utc>>,
        fired_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if Self::take(&self.fire_conflicts) {
            return Err(StoreError::Conflict);
        }
        if self.fired_elsewhere.swap(false, Ordering::SeqCst) {
            self.inner.mark_reminder_fired(id, expected, fired_at).await?;
            return Err(StoreError::Conflict);
        }
        self.inner.mark_reminder_fired(id, expected, fired_at).await
    }

    async fn claim_reminder(
        &self,
        id: &ReminderId,
        expected: Option<DateTime<Utc>>,
        claimed_at: DateTime<Utc>,
        lease: chrono::Duration,
    ) -> Result<(), StoreError> {
        self.inner.claim_reminder(id, expected, claimed_at, lease).await
    }

    async fn release_reminder(
        &self,
        id: &ReminderId,
        claimed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner.release_reminder(id, claimed_at).await
    }

    async fn fetch_alert(&self, id: &AlertId) -> Result<Option<SlaAlert>, StoreError> {
        self.inner.fetch_alert(id).await
    }

    async fn update_alert(&self, alert: SlaAlert) -> Result<SlaAlert, StoreError> {
        self.inner.update_alert(alert).await
    }
}

pub(super) type TestService = AutomationService<InMemoryStore, RecordingSender, CannedGenerator>;

pub(super) fn build_service(
    store: InMemoryStore,
) -> (Arc<TestService>, Arc<InMemoryStore>, Arc<RecordingSender>) {
    let store = Arc::new(store);
    let sender = Arc::new(RecordingSender::default());
    let service = Arc::new(AutomationService::new(
        store.clone(),
        sender.clone(),
        Arc::new(CannedGenerator::default()),
        config(),
    ));
    (service, store, sender)
}

pub(super) async fn read_json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
