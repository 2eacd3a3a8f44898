use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

record_id!(
    /// Identifier of an inbound inquiry.
    LeadId
);
record_id!(
    /// Identifier of a counselor or other staff member.
    StaffId
);
record_id!(ApplicationId);
record_id!(DocumentId);
record_id!(RuleId);
record_id!(ReminderId);
record_id!(TaskId);
record_id!(AlertId);

/// Lifecycle of an inquiry from first contact to outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Assigned,
    Contacted,
    Qualified,
    Converted,
    NotInterested,
    Lost,
}

impl LeadStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Assigned => "assigned",
            Self::Contacted => "contacted",
            Self::Qualified => "qualified",
            Self::Converted => "converted",
            Self::NotInterested => "not_interested",
            Self::Lost => "lost",
        }
    }

    pub const fn is_open(self) -> bool {
        matches!(
            self,
            Self::New | Self::Assigned | Self::Contacted | Self::Qualified
        )
    }
}

/// A prospective student's inquiry as held in the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub country_of_interest: Option<String>,
    #[serde(default)]
    pub degree_level: Option<String>,
    #[serde(default)]
    pub field_of_study: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    pub status: LeadStatus,
    /// Status seen by the last automation pass, maintained by the store.
    #[serde(default)]
    pub previous_status: Option<LeadStatus>,
    #[serde(default)]
    pub assigned_to: Option<StaffId>,
    #[serde(default)]
    pub response_time_minutes: Option<u32>,
    #[serde(default)]
    pub sla_breached: bool,
    #[serde(default)]
    pub is_urgent: bool,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
}

impl Lead {
    /// Interest fields used for specialization matching, lowercased.
    pub fn interest_tags(&self) -> Vec<String> {
        [
            &self.country_of_interest,
            &self.degree_level,
            &self.field_of_study,
        ]
        .into_iter()
        .filter_map(|value| present(value.as_deref()))
        .map(|value| value.to_lowercase())
        .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffStatus {
    Active,
    OnLeave,
    Inactive,
}

/// Counselor profile with its caseload counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Staff {
    pub id: StaffId,
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub specializations: BTreeSet<String>,
    pub current_students: u32,
    pub max_students: u32,
    pub is_available: bool,
    pub status: StaffStatus,
}

impl Staff {
    pub fn has_capacity(&self) -> bool {
        self.current_students < self.max_students
    }

    pub fn is_eligible(&self) -> bool {
        self.is_available && self.status == StaffStatus::Active && self.has_capacity()
    }

    pub fn specializes_in(&self, tags: &[String]) -> bool {
        self.specializations
            .iter()
            .any(|spec| tags.iter().any(|tag| spec.trim().eq_ignore_ascii_case(tag)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    InProgress,
    Submitted,
    OfferReceived,
    Accepted,
    Rejected,
    Enrolled,
    Withdrawn,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::InProgress => "in_progress",
            Self::Submitted => "submitted",
            Self::OfferReceived => "offer_received",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Enrolled => "enrolled",
            Self::Withdrawn => "withdrawn",
        }
    }

    /// Applications that still have work ahead of their deadline.
    pub const fn awaits_submission(self) -> bool {
        matches!(self, Self::Draft | Self::InProgress)
    }
}

/// A student's university application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub student_id: String,
    pub student_name: String,
    #[serde(default)]
    pub student_email: Option<String>,
    pub course_name: String,
    pub university_name: String,
    #[serde(default)]
    pub destination_country: Option<String>,
    pub status: ApplicationStatus,
    #[serde(default)]
    pub previous_status: Option<ApplicationStatus>,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    #[serde(default)]
    pub assigned_to: Option<StaffId>,
    #[serde(default)]
    pub is_urgent: bool,
    pub created_date: DateTime<Utc>,
}

impl Application {
    pub fn interest_tags(&self) -> Vec<String> {
        [self.destination_country.as_deref(), Some(self.course_name.as_str())]
            .into_iter()
            .filter_map(present)
            .map(|value| value.to_lowercase())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Uploaded,
    Approved,
    Rejected,
    Expired,
}

impl DocumentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploaded => "uploaded",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }
}

/// A requested or held student document (passport, transcript, visa...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub student_id: String,
    pub student_name: String,
    #[serde(default)]
    pub student_email: Option<String>,
    pub document_type: String,
    pub status: DocumentStatus,
    pub requested_date: DateTime<Utc>,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub assigned_to: Option<StaffId>,
    #[serde(default)]
    pub is_urgent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    InApp,
}

impl Channel {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::InApp => "in_app",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

/// One message exchanged with a lead or student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunicationLog {
    pub id: String,
    pub record_id: String,
    #[serde(default)]
    pub rule_id: Option<RuleId>,
    pub channel: Channel,
    pub direction: Direction,
    #[serde(default)]
    pub sentiment: Option<Sentiment>,
    #[serde(default)]
    pub subject: Option<String>,
    pub created_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCommunication {
    pub record_id: String,
    pub rule_id: Option<RuleId>,
    pub channel: Channel,
    pub direction: Direction,
    pub subject: Option<String>,
    pub created_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    /// One step up, never below `High`.
    pub fn elevated(self) -> Self {
        match self {
            Self::Low | Self::Medium => Self::High,
            Self::High | Self::Urgent => Self::Urgent,
        }
    }

    pub const fn due_in_days(self) -> i64 {
        match self {
            Self::Urgent => 0,
            Self::High => 1,
            Self::Medium => 3,
            Self::Low => 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub const fn is_open(self) -> bool {
        !matches!(self, Self::Completed)
    }
}

/// Kinds of record an automation can act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Lead,
    Application,
    Document,
}

impl RecordKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Lead => "lead",
            Self::Application => "application",
            Self::Document => "document",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordRef {
    pub kind: RecordKind,
    pub id: String,
}

impl RecordRef {
    pub fn lead(id: &LeadId) -> Self {
        Self {
            kind: RecordKind::Lead,
            id: id.0.clone(),
        }
    }

    pub fn application(id: &ApplicationId) -> Self {
        Self {
            kind: RecordKind::Application,
            id: id.0.clone(),
        }
    }

    pub fn document(id: &DocumentId) -> Self {
        Self {
            kind: RecordKind::Document,
            id: id.0.clone(),
        }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.label(), self.id)
    }
}

/// Follow-up work item for a staff member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub assigned_to: Option<StaffId>,
    pub priority: TaskPriority,
    pub due_date: NaiveDate,
    pub status: TaskStatus,
    #[serde(default)]
    pub source_rule: Option<RuleId>,
    #[serde(default)]
    pub related_record: Option<RecordRef>,
    pub created_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub assigned_to: Option<StaffId>,
    pub priority: TaskPriority,
    pub due_date: NaiveDate,
    pub source_rule: Option<RuleId>,
    pub related_record: Option<RecordRef>,
    pub created_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaAlertType {
    /// A first response was recorded but took longer than the threshold.
    SlowResponse,
    /// No response yet and the lead is older than the threshold.
    NoResponse,
}

impl SlaAlertType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::SlowResponse => "slow_response",
            Self::NoResponse => "no_response",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Pending,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaAlert {
    pub id: AlertId,
    pub inquiry_id: LeadId,
    pub alert_type: SlaAlertType,
    pub time_elapsed_minutes: u32,
    pub status: AlertStatus,
    pub created_date: DateTime<Utc>,
    #[serde(default)]
    pub resolved_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSlaAlert {
    pub inquiry_id: LeadId,
    pub alert_type: SlaAlertType,
    pub time_elapsed_minutes: u32,
    pub created_date: DateTime<Utc>,
}

/// Treats blank strings the same as missing values.
pub(crate) fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
