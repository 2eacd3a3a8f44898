//! Placeholder rendering shared by workflow rules and reminders.
//!
//! Templates use `{{name}}` markers. Each record type maps the names it knows to a
//! field; known names with no value render empty, unknown names are left as written
//! so misconfigured templates stay visible in the output.

use chrono::NaiveDate;

use super::domain::{Application, Document, Lead, Staff};
use super::subject::Subject;

/// Field lookup for one record type.
pub trait TemplateFields {
    /// `None` when the name is not a placeholder this type understands.
    fn field(&self, name: &str) -> Option<String>;
}

fn or_empty(value: Option<&String>) -> Option<String> {
    Some(value.cloned().unwrap_or_default())
}

fn first_name(full_name: &str) -> String {
    full_name.split_whitespace().next().unwrap_or_default().to_string()
}

impl TemplateFields for Lead {
    fn field(&self, name: &str) -> Option<String> {
        match name {
            "student_name" | "lead_name" | "name" => Some(self.full_name.clone()),
            "first_name" => Some(first_name(&self.full_name)),
            "email" => or_empty(self.email.as_ref()),
            "phone" => or_empty(self.phone.as_ref()),
            "country" | "destination_country" => or_empty(self.country_of_interest.as_ref()),
            "degree_level" => or_empty(self.degree_level.as_ref()),
            "field_of_study" | "course_name" => or_empty(self.field_of_study.as_ref()),
            "status" => Some(self.status.label().to_string()),
            _ => None,
        }
    }
}

impl TemplateFields for Application {
    fn field(&self, name: &str) -> Option<String> {
        match name {
            "student_name" | "name" => Some(self.student_name.clone()),
            "first_name" => Some(first_name(&self.student_name)),
            "email" => or_empty(self.student_email.as_ref()),
            "course_name" => Some(self.course_name.clone()),
            "university_name" => Some(self.university_name.clone()),
            "country" | "destination_country" => or_empty(self.destination_country.as_ref()),
            "deadline_date" => Some(
                self.deadline
                    .map(|date| date.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
            ),
            "status" => Some(self.status.label().to_string()),
            _ => None,
        }
    }
}

impl TemplateFields for Document {
    fn field(&self, name: &str) -> Option<String> {
        match name {
            "student_name" | "name" => Some(self.student_name.clone()),
            "first_name" => Some(first_name(&self.student_name)),
            "email" => or_empty(self.student_email.as_ref()),
            "document_type" => Some(self.document_type.clone()),
            "expiry_date" => Some(
                self.expiry_date
                    .map(|date| date.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
            ),
            "requested_date" => Some(self.requested_date.format("%Y-%m-%d").to_string()),
            "status" => Some(self.status.label().to_string()),
            _ => None,
        }
    }
}

/// A record plus the pass-level values templates may reference.
pub struct TemplateContext<'a> {
    pub subject: Subject<'a>,
    pub counselor: Option<&'a Staff>,
    pub today: NaiveDate,
}

impl TemplateFields for TemplateContext<'_> {
    fn field(&self, name: &str) -> Option<String> {
        let from_record = match self.subject {
            Subject::Lead(lead) => lead.field(name),
            Subject::Application(app) => app.field(name),
            Subject::Document(doc) => doc.field(name),
        };
        if from_record.is_some() {
            return from_record;
        }

        match name {
            "counselor_name" => or_empty(self.counselor.map(|staff| &staff.full_name)),
            "today" => Some(self.today.format("%Y-%m-%d").to_string()),
            "days_remaining" => Some(
                self.subject
                    .target_date()
                    .map(|date| (date - self.today).num_days().to_string())
                    .unwrap_or_default(),
            ),
            "record_type" => Some(self.subject.reference().kind.label().to_string()),
            _ => None,
        }
    }
}

pub fn render(template: &str, fields: &dyn TemplateFields) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            output.push_str(&rest[start..]);
            return output;
        };

        let name = after_open[..end].trim();
        match fields.field(name) {
            Some(value) => output.push_str(&value),
            None => output.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after_open[end + 2..];
    }

    output.push_str(rest);
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::automation::domain::{ApplicationId, ApplicationStatus};
    use chrono::{TimeZone, Utc};

    fn application() -> Application {
        Application {
            id: ApplicationId::from("app-1"),
            student_id: "stu-1".to_string(),
            student_name: "Amara Okafor".to_string(),
            student_email: Some("amara@example.com".to_string()),
            course_name: "MSc Data Science".to_string(),
            university_name: "University of Leeds".to_string(),
            destination_country: Some("UK".to_string()),
            status: ApplicationStatus::InProgress,
            previous_status: None,
            deadline: NaiveDate::from_ymd_opt(2026, 3, 15),
            assigned_to: None,
            is_urgent: false,
            created_date: Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn renders_record_and_context_fields() {
        let app = application();
        let context = TemplateContext {
            subject: Subject::Application(&app),
            counselor: None,
            today: NaiveDate::from_ymd_opt(2026, 3, 8).unwrap(),
        };
        let text = render(
            "Hi {{ first_name }}, {{course_name}} closes {{deadline_date}} ({{days_remaining}} days).",
            &context,
        );
        assert_eq!(
            text,
            "Hi Amara, MSc Data Science closes 2026-03-15 (7 days)."
        );
    }

    #[test]
    fn leaves_unknown_and_unterminated_markers() {
        let app = application();
        assert_eq!(render("{{nope}} and {{status", &app), "{{nope}} and {{status");
        assert_eq!(render("{{counselor_name}}", &app), "{{counselor_name}}");
    }

    #[test]
    fn missing_known_fields_render_empty() {
        let mut app = application();
        app.destination_country = None;
        assert_eq!(render("[{{country}}]", &app), "[]");
    }
}
