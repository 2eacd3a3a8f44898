use chrono::NaiveDate;

use super::domain::{Application, Document, Lead, RecordRef, StaffId};
use super::repository::Recipient;

/// Borrowed view over any record an automation can act on.
#[derive(Debug, Clone, Copy)]
pub enum Subject<'a> {
    Lead(&'a Lead),
    Application(&'a Application),
    Document(&'a Document),
}

impl<'a> Subject<'a> {
    pub fn reference(&self) -> RecordRef {
        match self {
            Subject::Lead(lead) => RecordRef::lead(&lead.id),
            Subject::Application(app) => RecordRef::application(&app.id),
            Subject::Document(doc) => RecordRef::document(&doc.id),
        }
    }

    pub fn id(&self) -> &'a str {
        match self {
            Subject::Lead(lead) => lead.id.as_str(),
            Subject::Application(app) => app.id.as_str(),
            Subject::Document(doc) => doc.id.as_str(),
        }
    }

    pub fn assigned_to(&self) -> Option<&'a StaffId> {
        match self {
            Subject::Lead(lead) => lead.assigned_to.as_ref(),
            Subject::Application(app) => app.assigned_to.as_ref(),
            Subject::Document(doc) => doc.assigned_to.as_ref(),
        }
    }

    pub fn person_name(&self) -> &'a str {
        match self {
            Subject::Lead(lead) => &lead.full_name,
            Subject::Application(app) => &app.student_name,
            Subject::Document(doc) => &doc.student_name,
        }
    }

    pub fn email(&self) -> Option<&'a str> {
        let email = match self {
            Subject::Lead(lead) => lead.email.as_deref(),
            Subject::Application(app) => app.student_email.as_deref(),
            Subject::Document(doc) => doc.student_email.as_deref(),
        };
        super::domain::present(email)
    }

    /// The lead or student behind the record, as a message recipient.
    pub fn contact(&self) -> Recipient {
        let user_id = match self {
            Subject::Lead(lead) => lead.id.0.clone(),
            Subject::Application(app) => app.student_id.clone(),
            Subject::Document(doc) => doc.student_id.clone(),
        };
        Recipient {
            user_id,
            name: self.person_name().to_string(),
            email: self.email().map(str::to_string),
        }
    }

    pub fn status_label(&self) -> &'static str {
        match self {
            Subject::Lead(lead) => lead.status.label(),
            Subject::Application(app) => app.status.label(),
            Subject::Document(doc) => doc.status.label(),
        }
    }

    /// True when the status differs from the last observed one. Records never
    /// observed before do not count as changed.
    pub fn status_changed(&self) -> bool {
        match self {
            Subject::Lead(lead) => lead.previous_status.is_some_and(|prev| prev != lead.status),
            Subject::Application(app) => {
                app.previous_status.is_some_and(|prev| prev != app.status)
            }
            Subject::Document(_) => false,
        }
    }

    pub fn is_urgent(&self) -> bool {
        match self {
            Subject::Lead(lead) => lead.is_urgent,
            Subject::Application(app) => app.is_urgent,
            Subject::Document(doc) => doc.is_urgent,
        }
    }

    pub fn interest_tags(&self) -> Vec<String> {
        match self {
            Subject::Lead(lead) => lead.interest_tags(),
            Subject::Application(app) => app.interest_tags(),
            Subject::Document(_) => Vec::new(),
        }
    }

    /// Deadline or expiry the record is working towards, if any.
    pub fn target_date(&self) -> Option<NaiveDate> {
        match self {
            Subject::Lead(_) => None,
            Subject::Application(app) => app.deadline,
            Subject::Document(doc) => doc.expiry_date,
        }
    }

    /// Whether the assigner can attach this record to a counselor's caseload.
    pub fn is_caseload_record(&self) -> bool {
        matches!(self, Subject::Lead(_) | Subject::Application(_))
    }

    pub fn describe(&self) -> String {
        match self {
            Subject::Lead(lead) => {
                let mut parts = vec![format!("Lead {} ({})", lead.full_name, lead.status.label())];
                if let Some(country) = &lead.country_of_interest {
                    parts.push(format!("interested in {country}"));
                }
                if let Some(field) = &lead.field_of_study {
                    parts.push(format!("field: {field}"));
                }
                parts.join(", ")
            }
            Subject::Application(app) => {
                let mut text = format!(
                    "Application for {} at {} by {} ({})",
                    app.course_name,
                    app.university_name,
                    app.student_name,
                    app.status.label()
                );
                if let Some(deadline) = app.deadline {
                    text.push_str(&format!(", deadline {deadline}"));
                }
                text
            }
            Subject::Document(doc) => {
                let mut text = format!(
                    "{} document for {} ({})",
                    doc.document_type,
                    doc.student_name,
                    doc.status.label()
                );
                if let Some(expiry) = doc.expiry_date {
                    text.push_str(&format!(", expires {expiry}"));
                }
                text
            }
        }
    }
}
