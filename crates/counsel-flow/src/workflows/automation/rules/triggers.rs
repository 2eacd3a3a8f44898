use chrono::{DateTime, Utc};

use super::super::domain::{Direction, DocumentStatus, Sentiment};
use super::super::subject::Subject;
use super::{PassState, RuleSnapshot, TriggerType, WorkflowRule};

/// Records in the snapshot whose trigger condition holds for `rule` right now.
pub(super) fn matching<'a>(
    rule: &WorkflowRule,
    snapshot: &'a RuleSnapshot,
    state: &PassState,
    now: DateTime<Utc>,
) -> Vec<Subject<'a>> {
    let conditions = &rule.trigger_conditions;
    let today = now.date_naive();

    let subjects: Vec<Subject<'a>> = match rule.trigger_type {
        TriggerType::CommunicationGap => {
            let threshold = i64::from(conditions.days_threshold.unwrap_or_default());
            snapshot
                .leads
                .iter()
                .filter(|lead| lead.status.is_open())
                .filter(|lead| {
                    let last_contact = last_contact(snapshot, lead.id.as_str())
                        .unwrap_or(lead.created_date)
                        .max(lead.created_date);
                    (now - last_contact).num_days() >= threshold
                })
                .map(Subject::Lead)
                .collect()
        }
        TriggerType::DeadlineApproaching => {
            let threshold = i64::from(conditions.days_threshold.unwrap_or_default());
            snapshot
                .applications
                .iter()
                .filter(|app| app.status.awaits_submission())
                .filter(|app| {
                    app.deadline
                        .map(|deadline| (0..=threshold).contains(&(deadline - today).num_days()))
                        .unwrap_or(false)
                })
                .map(Subject::Application)
                .collect()
        }
        TriggerType::DocumentPending => {
            let threshold = i64::from(conditions.days_threshold.unwrap_or_default());
            snapshot
                .documents
                .iter()
                .filter(|doc| doc.status == DocumentStatus::Pending)
                .filter(|doc| (now - doc.requested_date).num_days() >= threshold)
                .map(Subject::Document)
                .collect()
        }
        TriggerType::StatusChange => snapshot
            .leads
            .iter()
            .map(Subject::Lead)
            .chain(snapshot.applications.iter().map(Subject::Application))
            .filter(|subject| subject.status_changed())
            .filter(|subject| match conditions.to_status.as_deref() {
                Some(target) => subject.status_label().eq_ignore_ascii_case(target.trim()),
                None => true,
            })
            .collect(),
        TriggerType::SentimentNegative => snapshot
            .leads
            .iter()
            .filter(|lead| lead.status.is_open())
            .filter(|lead| {
                latest_inbound_sentiment(snapshot, lead.id.as_str()) == Some(Sentiment::Negative)
            })
            .map(Subject::Lead)
            .collect(),
        TriggerType::Scheduled => snapshot
            .leads
            .iter()
            .filter(|lead| lead.status.is_open())
            .map(Subject::Lead)
            .collect(),
    };

    if conditions.only_unassigned {
        subjects
            .into_iter()
            .filter(|subject| state.owner_of(subject).is_none())
            .collect()
    } else {
        subjects
    }
}

fn last_contact(snapshot: &RuleSnapshot, record_id: &str) -> Option<DateTime<Utc>> {
    snapshot
        .communications
        .iter()
        .filter(|entry| entry.record_id == record_id)
        .map(|entry| entry.created_date)
        .max()
}

fn latest_inbound_sentiment(snapshot: &RuleSnapshot, record_id: &str) -> Option<Sentiment> {
    snapshot
        .communications
        .iter()
        .filter(|entry| entry.record_id == record_id && entry.direction == Direction::Inbound)
        .max_by_key(|entry| entry.created_date)
        .and_then(|entry| entry.sentiment)
}
