use chrono::NaiveDate;

use super::super::domain::{Application, Document, DocumentStatus};
use super::super::subject::Subject;
use super::{ReminderType, TriggerCondition};

/// Records a reminder applies to on `today`.
pub fn matching<'a>(
    reminder_type: ReminderType,
    condition: &TriggerCondition,
    applications: &'a [Application],
    documents: &'a [Document],
    today: NaiveDate,
) -> Vec<Subject<'a>> {
    match reminder_type {
        ReminderType::ApplicationDeadline => {
            let Some(days) = condition.days_before_deadline else {
                return Vec::new();
            };
            applications
                .iter()
                .filter(|app| status_admitted(condition, app))
                .filter(|app| {
                    app.deadline
                        .is_some_and(|deadline| (deadline - today).num_days() == i64::from(days))
                })
                .map(Subject::Application)
                .collect()
        }
        ReminderType::ApplicationStatus => applications
            .iter()
            .filter(|app| condition.application_statuses.contains(&app.status))
            .map(Subject::Application)
            .collect(),
        ReminderType::DocumentExpiry => {
            let Some(days) = condition.days_until_expiry else {
                return Vec::new();
            };
            documents
                .iter()
                .filter(|doc| doc.status != DocumentStatus::Expired)
                .filter(|doc| type_admitted(condition, doc))
                .filter(|doc| {
                    doc.expiry_date
                        .is_some_and(|expiry| (expiry - today).num_days() == i64::from(days))
                })
                .map(Subject::Document)
                .collect()
        }
        ReminderType::DocumentPending => documents
            .iter()
            .filter(|doc| doc.status == DocumentStatus::Pending)
            .filter(|doc| type_admitted(condition, doc))
            .map(Subject::Document)
            .collect(),
    }
}

/// An empty status list means "still working towards submission".
fn status_admitted(condition: &TriggerCondition, app: &Application) -> bool {
    if condition.application_statuses.is_empty() {
        app.status.awaits_submission()
    } else {
        condition.application_statuses.contains(&app.status)
    }
}

fn type_admitted(condition: &TriggerCondition, doc: &Document) -> bool {
    condition.document_types.is_empty()
        || condition
            .document_types
            .iter()
            .any(|kind| kind.trim().eq_ignore_ascii_case(doc.document_type.trim()))
}
