use crate::infra::{parse_timestamp, ApiService, LoggingSender, UnconfiguredGenerator};
use chrono::{DateTime, Duration, Utc};
use clap::Args;
use counsel_flow::config::AppConfig;
use counsel_flow::error::AppError;
use counsel_flow::workflows::automation::{
    ActionType, Application, ApplicationId, ApplicationStatus, Audience, AutomationConfig,
    AutomationService, Channel, CommunicationLog, DeliveryChannels, Direction, Document,
    DocumentId, DocumentStatus, Frequency, InMemoryStore, Lead, LeadId, LeadStatus,
    MessageTemplate, PassKind, PassReport, Reminder, ReminderId, ReminderTiming, ReminderType,
    RuleId, Sentiment, SnapshotFilter, Staff, StaffId, StaffStatus, TaskPriority,
    TriggerCondition, TriggerConditions, TriggerType, WorkflowRule,
};
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Evaluation instant (RFC 3339). Defaults to now.
    #[arg(long, value_parser = parse_timestamp)]
    pub(crate) at: Option<DateTime<Utc>>,
    /// Print every delivered message after the pass summaries.
    #[arg(long)]
    pub(crate) show_messages: bool,
}

#[derive(Args, Debug)]
pub(crate) struct RunArgs {
    /// Pass to run: rules, reminders, assignment, or sla
    #[arg(value_parser = parse_pass_kind)]
    pub(crate) kind: PassKind,
    /// Restrict the pass to these record ids (repeatable)
    #[arg(long = "record")]
    pub(crate) records: Vec<String>,
    /// Restrict the pass to records owned by this counselor
    #[arg(long)]
    pub(crate) assigned_to: Option<String>,
    /// Evaluation instant (RFC 3339). Defaults to now.
    #[arg(long, value_parser = parse_timestamp)]
    pub(crate) at: Option<DateTime<Utc>>,
}

pub(crate) fn parse_pass_kind(raw: &str) -> Result<PassKind, String> {
    PassKind::parse(raw).ok_or_else(|| {
        format!("unknown pass '{raw}' (expected rules, reminders, assignment, or sla)")
    })
}

pub(crate) async fn run_pass_command(args: RunArgs) -> Result<(), AppError> {
    let RunArgs {
        kind,
        records,
        assigned_to,
        at,
    } = args;

    let now = at.unwrap_or_else(Utc::now);
    let config = AppConfig::load()?;
    let service = demo_service(now, config.automation);
    let filter = SnapshotFilter {
        record_ids: records,
        assigned_to: assigned_to.map(StaffId),
    };

    let report = service.run_pass(kind, &filter, now).await?;
    let rendered = serde_json::to_string_pretty(&report).map_err(std::io::Error::from)?;
    println!("{rendered}");
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { at, show_messages } = args;
    let now = at.unwrap_or_else(Utc::now);
    let config = AppConfig::load()?;
    let sender = Arc::new(LoggingSender::default());
    let service = AutomationService::new(
        Arc::new(seeded_store(now)),
        sender.clone(),
        Arc::new(UnconfiguredGenerator),
        config.automation,
    );
    let store = service.store();

    println!("Counsel Flow automation demo ({})", now.format("%Y-%m-%d %H:%M UTC"));
    let reports = service.run_all(&SnapshotFilter::default(), now).await?;
    for report in &reports {
        render_report(report);
    }

    println!("\nCaseloads after the run");
    for staff in store.staff() {
        println!(
            "- {}: {}/{} students",
            staff.full_name, staff.current_students, staff.max_students
        );
    }

    let tasks = store.tasks();
    println!("\nOpen tasks ({})", tasks.len());
    for task in &tasks {
        println!(
            "- [{}] {} (due {}, owner {})",
            task.priority.label(),
            task.title,
            task.due_date,
            task.assigned_to
                .as_ref()
                .map(|id| id.as_str())
                .unwrap_or("unassigned")
        );
    }

    let alerts = store.alerts();
    println!("\nSLA alerts ({})", alerts.len());
    for alert in &alerts {
        println!(
            "- {} on {} after {} min",
            alert.alert_type.label(),
            alert.inquiry_id,
            alert.time_elapsed_minutes
        );
    }

    if show_messages {
        println!("\nDelivered messages");
        for message in sender.delivered() {
            println!(
                "- {} to {}: {}",
                message.channel.label(),
                message.recipient.name,
                message.subject.as_deref().unwrap_or("(no subject)")
            );
        }
    }

    Ok(())
}

fn render_report(report: &PassReport) {
    let summary = &report.summary;
    println!("\n{} pass", report.kind.label());
    println!(
        "- processed {} | created {} | sent {} | assigned {} | skipped {} | errors {}",
        summary.processed,
        summary.created,
        summary.sent,
        summary.assigned,
        summary.skipped,
        summary.errors
    );
    if summary.no_capacity > 0 {
        println!("- {} records found no counselor capacity", summary.no_capacity);
    }
    for message in &summary.error_messages {
        println!("  ! {message}");
    }
}

pub(crate) fn demo_service(now: DateTime<Utc>, config: AutomationConfig) -> ApiService {
    AutomationService::new(
        Arc::new(seeded_store(now)),
        Arc::new(LoggingSender::default()),
        Arc::new(UnconfiguredGenerator),
        config,
    )
}

/// A small consultancy caseload that exercises every pass relative to `now`.
pub(crate) fn seeded_store(now: DateTime<Utc>) -> InMemoryStore {
    let store = InMemoryStore::new();
    let today = now.date_naive();

    store.insert_staff(counselor("staff-nadia", "Nadia Rahman", 8, 12, &["uk", "masters"]));
    store.insert_staff(counselor("staff-tomas", "Tomas Silva", 3, 10, &["canada", "australia"]));
    store.insert_staff(counselor("staff-grace", "Grace Lee", 15, 15, &["usa"]));

    store.insert_lead(Lead {
        message: Some(
            "I would like to start an MSc in Computer Science in the UK next September."
                .to_string(),
        ),
        ..lead("lead-1001", "Priya Sharma", now - Duration::hours(2))
    });
    store.insert_lead(Lead {
        country_of_interest: Some("Canada".to_string()),
        degree_level: Some("Bachelors".to_string()),
        field_of_study: None,
        assigned_to: Some(StaffId::from("staff-tomas")),
        ..lead("lead-1002", "Daniel Okoro", now - Duration::hours(30))
    });
    store.insert_lead(Lead {
        status: LeadStatus::Contacted,
        assigned_to: Some(StaffId::from("staff-tomas")),
        response_time_minutes: Some(240),
        country_of_interest: Some("Australia".to_string()),
        ..lead("lead-1003", "Mei Chen", now - Duration::days(12))
    });
    store.insert_lead(Lead {
        status: LeadStatus::Qualified,
        previous_status: Some(LeadStatus::Contacted),
        assigned_to: Some(StaffId::from("staff-nadia")),
        response_time_minutes: Some(25),
        ..lead("lead-1004", "Lucas Fernandes", now - Duration::days(6))
    });

    store.insert_communication(communication(
        "comm-1",
        "lead-1003",
        Direction::Outbound,
        None,
        now - Duration::days(9),
    ));
    store.insert_communication(communication(
        "comm-2",
        "lead-1004",
        Direction::Inbound,
        Some(Sentiment::Negative),
        now - Duration::days(1),
    ));

    store.insert_application(Application {
        id: ApplicationId::from("app-2001"),
        student_id: "student-amara".to_string(),
        student_name: "Amara Okafor".to_string(),
        student_email: Some("amara.okafor@mail.example".to_string()),
        course_name: "MSc Data Science".to_string(),
        university_name: "University of Leeds".to_string(),
        destination_country: Some("UK".to_string()),
        status: ApplicationStatus::InProgress,
        previous_status: None,
        deadline: Some(today + Duration::days(14)),
        assigned_to: Some(StaffId::from("staff-nadia")),
        is_urgent: false,
        created_date: now - Duration::days(20),
    });

    store.insert_document(Document {
        id: DocumentId::from("doc-3001"),
        student_id: "student-amara".to_string(),
        student_name: "Amara Okafor".to_string(),
        student_email: Some("amara.okafor@mail.example".to_string()),
        document_type: "Passport".to_string(),
        status: DocumentStatus::Pending,
        requested_date: now - Duration::days(5),
        expiry_date: None,
        assigned_to: Some(StaffId::from("staff-nadia")),
        is_urgent: false,
    });
    store.insert_document(Document {
        id: DocumentId::from("doc-3002"),
        student_id: "student-amara".to_string(),
        student_name: "Amara Okafor".to_string(),
        student_email: Some("amara.okafor@mail.example".to_string()),
        document_type: "IELTS".to_string(),
        status: DocumentStatus::Approved,
        requested_date: now - Duration::days(60),
        expiry_date: Some(today + Duration::days(30)),
        assigned_to: Some(StaffId::from("staff-nadia")),
        is_urgent: false,
    });

    store.insert_rule(WorkflowRule {
        trigger_conditions: TriggerConditions {
            days_threshold: Some(7),
            ..TriggerConditions::default()
        },
        task_priority: TaskPriority::High,
        task_title_template: Some("Follow up with {{first_name}}".to_string()),
        ..rule(
            "rule-gap",
            "Silent leads",
            TriggerType::CommunicationGap,
            ActionType::CreateTask,
        )
    });
    store.insert_rule(WorkflowRule {
        trigger_conditions: TriggerConditions {
            to_status: Some("qualified".to_string()),
            ..TriggerConditions::default()
        },
        email_subject_template: Some("Next steps, {{first_name}}".to_string()),
        email_template: Some(
            "Hi {{first_name}}, {{counselor_name}} will share a shortlist for {{country}} this week."
                .to_string(),
        ),
        ..rule(
            "rule-qualified",
            "Qualified follow-up",
            TriggerType::StatusChange,
            ActionType::SendEmail,
        )
    });
    store.insert_rule(rule(
        "rule-unhappy",
        "Negative sentiment escalation",
        TriggerType::SentimentNegative,
        ActionType::NotifyCounselor,
    ));
    store.insert_rule(WorkflowRule {
        trigger_conditions: TriggerConditions {
            days_threshold: Some(3),
            ..TriggerConditions::default()
        },
        task_title_template: Some("Chase {{document_type}} from {{first_name}}".to_string()),
        ..rule(
            "rule-documents",
            "Outstanding documents",
            TriggerType::DocumentPending,
            ActionType::CreateTask,
        )
    });

    store.insert_reminder(Reminder {
        trigger_condition: TriggerCondition {
            days_before_deadline: Some(14),
            target_audience: Audience::Both,
            ..TriggerCondition::default()
        },
        delivery_channels: DeliveryChannels {
            in_app: true,
            email: true,
        },
        message_template: MessageTemplate {
            subject: "{{university_name}} deadline in {{days_remaining}} days".to_string(),
            body: "Hi {{first_name}}, {{course_name}} closes on {{deadline_date}}.".to_string(),
        },
        ..reminder(
            "rem-deadline",
            "Two weeks to deadline",
            ReminderType::ApplicationDeadline,
        )
    });
    store.insert_reminder(Reminder {
        trigger_condition: TriggerCondition {
            document_types: vec!["ielts".to_string()],
            days_until_expiry: Some(30),
            ..TriggerCondition::default()
        },
        message_template: MessageTemplate {
            subject: "{{document_type}} expires soon".to_string(),
            body: "Hi {{first_name}}, your {{document_type}} expires on {{expiry_date}}."
                .to_string(),
        },
        ..reminder(
            "rem-ielts",
            "Test score expiry",
            ReminderType::DocumentExpiry,
        )
    });

    store
}

fn counselor(id: &str, name: &str, load: u32, max: u32, specializations: &[&str]) -> Staff {
    Staff {
        id: StaffId::from(id),
        full_name: name.to_string(),
        email: Some(format!("{id}@consultancy.example")),
        specializations: specializations.iter().map(|s| s.to_string()).collect(),
        current_students: load,
        max_students: max,
        is_available: true,
        status: StaffStatus::Active,
    }
}

fn lead(id: &str, name: &str, created: DateTime<Utc>) -> Lead {
    Lead {
        id: LeadId::from(id),
        full_name: name.to_string(),
        email: Some(format!("{id}@mail.example")),
        phone: Some("+44 7700 900123".to_string()),
        country_of_interest: Some("UK".to_string()),
        degree_level: Some("Masters".to_string()),
        field_of_study: Some("Computer Science".to_string()),
        message: None,
        status: LeadStatus::New,
        previous_status: None,
        assigned_to: None,
        response_time_minutes: None,
        sla_breached: false,
        is_urgent: false,
        created_date: created,
        updated_date: created,
    }
}

fn communication(
    id: &str,
    record_id: &str,
    direction: Direction,
    sentiment: Option<Sentiment>,
    at: DateTime<Utc>,
) -> CommunicationLog {
    CommunicationLog {
        id: id.to_string(),
        record_id: record_id.to_string(),
        rule_id: None,
        channel: Channel::Email,
        direction,
        sentiment,
        subject: None,
        created_date: at,
    }
}

fn rule(id: &str, name: &str, trigger_type: TriggerType, action_type: ActionType) -> WorkflowRule {
    WorkflowRule {
        id: RuleId::from(id),
        name: name.to_string(),
        trigger_type,
        trigger_conditions: TriggerConditions::default(),
        action_type,
        task_priority: TaskPriority::Medium,
        task_title_template: None,
        email_subject_template: None,
        email_template: None,
        is_active: true,
        executions_count: 0,
        success_count: 0,
    }
}

fn reminder(id: &str, name: &str, reminder_type: ReminderType) -> Reminder {
    Reminder {
        id: ReminderId::from(id),
        name: name.to_string(),
        reminder_type,
        trigger_condition: TriggerCondition::default(),
        reminder_timing: ReminderTiming {
            frequency: Frequency::Daily,
            time_of_day: None,
            specific_date: None,
            days_of_week: Vec::new(),
        },
        delivery_channels: DeliveryChannels {
            in_app: true,
            email: false,
        },
        message_template: MessageTemplate {
            subject: String::new(),
            body: String::new(),
        },
        is_active: true,
        last_triggered: None,
        trigger_count: 0,
    }
}
