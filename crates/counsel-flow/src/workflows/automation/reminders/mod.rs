//! Deadline and document reminders with per-channel delivery.

mod matching;
mod timing;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::assignment::StaffPool;
use super::domain::{ApplicationStatus, Channel, ReminderId};
use super::pass::{bounded, AutomationConfig, AutomationError, PassSummary};
use super::repository::{
    MessageSender, OutboundMessage, Recipient, RecordStore, SnapshotFilter, StoreError,
};
use super::subject::Subject;
use super::templates::{render, TemplateContext};

pub use matching::matching;
pub use timing::is_due;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderType {
    ApplicationDeadline,
    DocumentExpiry,
    DocumentPending,
    ApplicationStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    #[default]
    Student,
    Counselor,
    Both,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerCondition {
    #[serde(default)]
    pub application_statuses: Vec<ApplicationStatus>,
    #[serde(default)]
    pub document_types: Vec<String>,
    #[serde(default)]
    pub days_before_deadline: Option<u32>,
    #[serde(default)]
    pub days_until_expiry: Option<u32>,
    #[serde(default)]
    pub target_audience: Audience,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Once,
    Daily,
    Weekly,
    OnDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderTiming {
    pub frequency: Frequency,
    #[serde(default)]
    pub time_of_day: Option<NaiveTime>,
    #[serde(default)]
    pub specific_date: Option<NaiveDate>,
    /// Weekly only; empty means every day.
    #[serde(default)]
    pub days_of_week: Vec<Weekday>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryChannels {
    #[serde(default)]
    pub in_app: bool,
    #[serde(default)]
    pub email: bool,
}

impl DeliveryChannels {
    pub fn enabled(&self) -> Vec<Channel> {
        let mut channels = Vec::with_capacity(2);
        if self.in_app {
            channels.push(Channel::InApp);
        }
        if self.email {
            channels.push(Channel::Email);
        }
        channels
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplate {
    #[serde(default)]
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: ReminderId,
    pub name: String,
    pub reminder_type: ReminderType,
    #[serde(default)]
    pub trigger_condition: TriggerCondition,
    pub reminder_timing: ReminderTiming,
    pub delivery_channels: DeliveryChannels,
    pub message_template: MessageTemplate,
    pub is_active: bool,
    #[serde(default)]
    pub last_triggered: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trigger_count: u32,
}

impl Reminder {
    pub fn validate(&self) -> Result<(), AutomationError> {
        let invalid = |reason: &str| AutomationError::Validation {
            entity: "reminder",
            id: self.id.0.clone(),
            reason: reason.to_string(),
        };
        let condition = &self.trigger_condition;

        match self.reminder_type {
            ReminderType::ApplicationDeadline if condition.days_before_deadline.is_none() => {
                return Err(invalid("application_deadline requires days_before_deadline"));
            }
            ReminderType::DocumentExpiry if condition.days_until_expiry.is_none() => {
                return Err(invalid("document_expiry requires days_until_expiry"));
            }
            ReminderType::ApplicationStatus if condition.application_statuses.is_empty() => {
                return Err(invalid("application_status requires at least one status"));
            }
            _ => {}
        }

        if self.reminder_timing.frequency == Frequency::OnDate
            && self.reminder_timing.specific_date.is_none()
        {
            return Err(invalid("on_date timing requires specific_date"));
        }
        if self.delivery_channels.enabled().is_empty() {
            return Err(invalid("no delivery channel enabled"));
        }
        if self.message_template.body.trim().is_empty() {
            return Err(invalid("message body is empty"));
        }
        Ok(())
    }

    pub fn is_due(&self, now: DateTime<Utc>, window_minutes: u32) -> bool {
        timing::is_due(&self.reminder_timing, self.last_triggered, now, window_minutes)
    }
}

const FIRE_ATTEMPTS: usize = 2;

/// Collaborators for one reminder pass.
pub struct ReminderScheduler<'a, S: ?Sized, M: ?Sized> {
    pub store: &'a S,
    pub sender: &'a M,
    pub config: &'a AutomationConfig,
}

impl<S, M> ReminderScheduler<'_, S, M>
where
    S: RecordStore + ?Sized,
    M: MessageSender + ?Sized,
{
    pub async fn run_pass(
        &self,
        filter: &SnapshotFilter,
        now: DateTime<Utc>,
    ) -> Result<PassSummary, AutomationError> {
        let limit = self.config.call_timeout();
        let reminders = bounded(limit, "list_reminders", self.store.list_reminders()).await?;
        let applications =
            bounded(limit, "list_applications", self.store.list_applications(filter)).await?;
        let documents = bounded(limit, "list_documents", self.store.list_documents(filter)).await?;
        let staff = StaffPool::new(bounded(limit, "list_staff", self.store.list_staff()).await?);
        let today = now.date_naive();
        let mut summary = PassSummary::new(self.config.max_error_messages);

        for reminder in reminders.iter().filter(|reminder| reminder.is_active) {
            if let Err(err) = reminder.validate() {
                warn!(reminder = %reminder.id, error = %err, "skipping misconfigured reminder");
                summary.skipped += 1;
                summary.record_error(format!("reminder {}", reminder.id), &err);
                continue;
            }

            let matches = matching(
                reminder.reminder_type,
                &reminder.trigger_condition,
                &applications,
                &documents,
                today,
            );
            if matches.is_empty() {
                continue;
            }
            summary.processed += matches.len() as u32;

            if !reminder.is_due(now, self.config.reminder_window_minutes) {
                debug!(reminder = %reminder.id, "reminder not due");
                summary.skipped += matches.len() as u32;
                continue;
            }

            let current = match self.refresh_if_due(reminder, now).await {
                Ok(Some(current)) => current,
                Ok(None) => {
                    debug!(reminder = %reminder.id, "reminder fired by a concurrent pass");
                    summary.skipped += matches.len() as u32;
                    continue;
                }
                Err(err) => {
                    warn!(reminder = %reminder.id, error = %err, "failed to refresh reminder");
                    summary.record_error(format!("reminder {}", reminder.id), &err);
                    continue;
                }
            };

            match self.claim(&current, now).await {
                Ok(()) => {}
                Err(AutomationError::Store(StoreError::Conflict)) => {
                    debug!(reminder = %current.id, "reminder claimed by a concurrent pass");
                    summary.skipped += matches.len() as u32;
                    continue;
                }
                Err(err) => {
                    warn!(reminder = %current.id, error = %err, "failed to claim reminder");
                    summary.record_error(format!("reminder {}", current.id), &err);
                    continue;
                }
            }

            let mut attempted = false;
            for subject in &matches {
                attempted |= self
                    .deliver(&current, subject, &staff, today, &mut summary)
                    .await;
            }

            if !attempted {
                self.release(&current, now).await;
            } else {
                if let Err(err) = self.mark_fired(&current, now).await {
                    warn!(reminder = %current.id, error = %err, "failed to record reminder fire");
                    summary.record_error(format!("reminder {}", current.id), &err);
                } else {
                    info!(reminder = %current.id, records = matches.len(), "reminder fired");
                }
            }
        }

        info!(
            processed = summary.processed,
            sent = summary.sent,
            skipped = summary.skipped,
            errors = summary.errors,
            "reminder pass complete"
        );
        Ok(summary)
    }

    /// Re-reads the reminder right before dispatch; `None` when it stopped being due.
    async fn refresh_if_due(
        &self,
        reminder: &Reminder,
        now: DateTime<Utc>,
    ) -> Result<Option<Reminder>, AutomationError> {
        let fresh = bounded(
            self.config.call_timeout(),
            "fetch_reminder",
            self.store.fetch_reminder(&reminder.id),
        )
        .await?;
        Ok(fresh.filter(|fresh| {
            fresh.is_active && fresh.is_due(now, self.config.reminder_window_minutes)
        }))
    }

    /// Takes the dispatch lease so concurrent passes cannot both send this window.
    async fn claim(&self, reminder: &Reminder, now: DateTime<Utc>) -> Result<(), AutomationError> {
        let lease = Duration::minutes(i64::from(self.config.reminder_window_minutes.max(1)));
        bounded(
            self.config.call_timeout(),
            "claim_reminder",
            self.store
                .claim_reminder(&reminder.id, reminder.last_triggered, now, lease),
        )
        .await
    }

    async fn release(&self, reminder: &Reminder, now: DateTime<Utc>) {
        let released = bounded(
            self.config.call_timeout(),
            "release_reminder",
            self.store.release_reminder(&reminder.id, now),
        );
        if let Err(err) = released.await {
            warn!(reminder = %reminder.id, error = %err, "failed to release reminder claim");
        }
    }

    /// Sends one record's reminder on every enabled channel to every recipient.
    /// Returns whether any dispatch was attempted.
    async fn deliver(
        &self,
        reminder: &Reminder,
        subject: &Subject<'_>,
        staff: &StaffPool,
        today: NaiveDate,
        summary: &mut PassSummary,
    ) -> bool {
        let counselor = subject.assigned_to().and_then(|id| staff.get(id));
        let recipients = recipients(reminder.trigger_condition.target_audience, subject, staff);
        if recipients.is_empty() {
            debug!(reminder = %reminder.id, record = %subject.reference(), "no recipients");
            summary.skipped += 1;
            return false;
        }

        let context = TemplateContext {
            subject: *subject,
            counselor,
            today,
        };
        let title = render(&reminder.message_template.subject, &context);
        let body = render(&reminder.message_template.body, &context);
        let limit = self.config.call_timeout();
        let mut attempted = false;

        for recipient in &recipients {
            for channel in reminder.delivery_channels.enabled() {
                if channel == Channel::Email && recipient.email.is_none() {
                    debug!(
                        reminder = %reminder.id,
                        recipient = %recipient.user_id,
                        "recipient has no email address"
                    );
                    continue;
                }

                attempted = true;
                let message = OutboundMessage {
                    channel,
                    recipient: recipient.clone(),
                    subject: Some(title.clone()).filter(|text| !text.is_empty()),
                    body: body.clone(),
                };
                match bounded(limit, "send_reminder", self.sender.send(message)).await {
                    Ok(()) => summary.sent += 1,
                    Err(err) => {
                        warn!(
                            reminder = %reminder.id,
                            record = %subject.reference(),
                            channel = channel.label(),
                            error = %err,
                            "reminder delivery failed"
                        );
                        summary.record_error(
                            format!("reminder {} on {}", reminder.id, subject.reference()),
                            &err,
                        );
                    }
                }
            }
        }
        attempted
    }

    /// Compare-and-set on `last_triggered`. A lost race re-reads once and retries only
    /// while the fresh record is still due; a fire by another pass is never overwritten.
    async fn mark_fired(
        &self,
        reminder: &Reminder,
        now: DateTime<Utc>,
    ) -> Result<(), AutomationError> {
        let limit = self.config.call_timeout();
        let mut expected = reminder.last_triggered;

        for attempt in 1..=FIRE_ATTEMPTS {
            match bounded(
                limit,
                "mark_reminder_fired",
                self.store.mark_reminder_fired(&reminder.id, expected, now),
            )
            .await
            {
                Ok(()) => return Ok(()),
                Err(AutomationError::Store(StoreError::Conflict)) if attempt < FIRE_ATTEMPTS => {
                    let fresh = bounded(
                        limit,
                        "fetch_reminder",
                        self.store.fetch_reminder(&reminder.id),
                    )
                    .await?
                    .ok_or(AutomationError::Store(StoreError::NotFound))?;
                    if !fresh.is_due(now, self.config.reminder_window_minutes) {
                        break;
                    }
                    expected = fresh.last_triggered;
                }
                Err(AutomationError::Store(StoreError::Conflict)) => break,
                Err(other) => return Err(other),
            }
        }

        Err(AutomationError::ConcurrencyConflict(format!(
            "reminder {}",
            reminder.id
        )))
    }
}

fn recipients(audience: Audience, subject: &Subject<'_>, staff: &StaffPool) -> Vec<Recipient> {
    let counselor = || {
        subject
            .assigned_to()
            .and_then(|id| staff.get(id))
            .map(|member| Recipient {
                user_id: member.id.0.clone(),
                name: member.full_name.clone(),
                email: member.email.clone(),
            })
    };

    match audience {
        Audience::Student => vec![subject.contact()],
        Audience::Counselor => counselor().into_iter().collect(),
        Audience::Both => std::iter::once(subject.contact()).chain(counselor()).collect(),
    }
}
