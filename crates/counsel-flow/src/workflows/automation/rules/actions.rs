use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::super::assignment::{self, Assigner, AssignmentResult, Demand};
use super::super::domain::{Channel, Direction, NewCommunication, NewTask, StaffId, TaskPriority};
use super::super::pass::{bounded, AutomationConfig, AutomationError};
use super::super::repository::{
    GenerationError, MessageSender, OutboundMessage, RecordStore, TextGenerator,
};
use super::super::subject::Subject;
use super::super::templates::{render, TemplateContext};
use super::{ActionType, PassState, RuleSnapshot, WorkflowRule};

/// Counters contributed by one successful action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(super) struct ActionEffects {
    pub created: u32,
    pub sent: u32,
    pub assigned: u32,
    pub no_capacity: u32,
}

pub(super) struct ActionContext<'a, S: ?Sized, M: ?Sized, G: ?Sized> {
    pub store: &'a S,
    pub sender: &'a M,
    pub generator: &'a G,
    pub config: &'a AutomationConfig,
    pub assigner: &'a Assigner,
    pub now: DateTime<Utc>,
}

/// True when the action already took effect for this record and must not repeat.
pub(super) fn already_handled(
    rule: &WorkflowRule,
    subject: &Subject<'_>,
    snapshot: &RuleSnapshot,
    config: &AutomationConfig,
    now: DateTime<Utc>,
) -> bool {
    match rule.action_type {
        ActionType::CreateTask | ActionType::NotifyCounselor => {
            let record = subject.reference();
            snapshot.open_tasks.iter().any(|task| {
                task.status.is_open()
                    && task.source_rule.as_ref() == Some(&rule.id)
                    && task.related_record.as_ref() == Some(&record)
            })
        }
        ActionType::SendEmail | ActionType::SendPersonalizedEmail => {
            let cooldown = rule
                .trigger_conditions
                .cooldown_days
                .unwrap_or(config.default_cooldown_days);
            if cooldown == 0 {
                return false;
            }
            let since = now - Duration::days(i64::from(cooldown));
            snapshot.communications.iter().any(|entry| {
                entry.record_id == subject.id()
                    && entry.rule_id.as_ref() == Some(&rule.id)
                    && entry.created_date > since
            })
        }
        ActionType::FlagUrgent => subject.is_urgent(),
    }
}

/// Runs the rule's action for one record. `Ok(None)` means nothing was done.
pub(super) async fn execute<S, M, G>(
    ctx: &ActionContext<'_, S, M, G>,
    rule: &WorkflowRule,
    subject: &Subject<'_>,
    state: &mut PassState,
) -> Result<Option<ActionEffects>, AutomationError>
where
    S: RecordStore + ?Sized,
    M: MessageSender + ?Sized,
    G: TextGenerator + ?Sized,
{
    match rule.action_type {
        ActionType::CreateTask => create_task(ctx, rule, subject, state).await.map(Some),
        ActionType::SendEmail => send_email(ctx, rule, subject, state, false).await.map(Some),
        ActionType::SendPersonalizedEmail => {
            send_email(ctx, rule, subject, state, true).await.map(Some)
        }
        ActionType::NotifyCounselor => notify_counselor(ctx, rule, subject, state).await,
        ActionType::FlagUrgent => {
            bounded(
                ctx.config.call_timeout(),
                "flag_urgent",
                ctx.store.flag_urgent(&subject.reference()),
            )
            .await?;
            info!(rule = %rule.id, record = %subject.reference(), "record flagged urgent");
            Ok(Some(ActionEffects::default()))
        }
    }
}

async fn create_task<S, M, G>(
    ctx: &ActionContext<'_, S, M, G>,
    rule: &WorkflowRule,
    subject: &Subject<'_>,
    state: &mut PassState,
) -> Result<ActionEffects, AutomationError>
where
    S: RecordStore + ?Sized,
    M: MessageSender + ?Sized,
    G: TextGenerator + ?Sized,
{
    let mut effects = ActionEffects::default();
    let mut owner = state.owner_of(subject);

    if owner.is_none() {
        let demand = demand_for(subject);
        let result = if subject.is_caseload_record() {
            ctx.assigner
                .assign_and_commit(ctx.store, &demand, &mut state.pool, ctx.now)
                .await?
        } else {
            assignment::assign(&demand, state.pool.staff(), ctx.now)
        };

        match result {
            AssignmentResult::Assigned { staff_id, .. } => {
                if subject.is_caseload_record() {
                    effects.assigned += 1;
                    state.assigned.insert(demand.record.clone(), staff_id.clone());
                }
                owner = Some(staff_id);
            }
            AssignmentResult::NoCapacity => {
                warn!(record = %demand.record, "no staff capacity, task left unassigned");
                effects.no_capacity += 1;
            }
        }
    }

    let title = task_title(rule, subject, state, owner.as_ref(), ctx.now);
    write_task(ctx, rule, subject, title, owner, rule.task_priority).await?;
    effects.created += 1;
    Ok(effects)
}

async fn notify_counselor<S, M, G>(
    ctx: &ActionContext<'_, S, M, G>,
    rule: &WorkflowRule,
    subject: &Subject<'_>,
    state: &mut PassState,
) -> Result<Option<ActionEffects>, AutomationError>
where
    S: RecordStore + ?Sized,
    M: MessageSender + ?Sized,
    G: TextGenerator + ?Sized,
{
    let Some(owner) = state.owner_of(subject) else {
        debug!(rule = %rule.id, record = %subject.reference(), "no counselor to notify");
        return Ok(None);
    };

    let title = match rule.task_title_template.as_deref() {
        Some(_) => task_title(rule, subject, state, Some(&owner), ctx.now),
        None => format!("Attention needed: {}", subject.person_name()),
    };
    write_task(ctx, rule, subject, title, Some(owner), rule.task_priority.elevated()).await?;
    Ok(Some(ActionEffects {
        created: 1,
        ..ActionEffects::default()
    }))
}

async fn write_task<S, M, G>(
    ctx: &ActionContext<'_, S, M, G>,
    rule: &WorkflowRule,
    subject: &Subject<'_>,
    title: String,
    owner: Option<StaffId>,
    priority: TaskPriority,
) -> Result<(), AutomationError>
where
    S: RecordStore + ?Sized,
    M: MessageSender + ?Sized,
    G: TextGenerator + ?Sized,
{
    let task = NewTask {
        title,
        description: format!(
            "{}\n\nCreated by rule '{}' ({}).",
            subject.describe(),
            rule.name,
            rule.trigger_type.label()
        ),
        assigned_to: owner,
        priority,
        due_date: ctx.now.date_naive() + Duration::days(priority.due_in_days()),
        source_rule: Some(rule.id.clone()),
        related_record: Some(subject.reference()),
        created_date: ctx.now,
    };

    let created = bounded(
        ctx.config.call_timeout(),
        "create_task",
        ctx.store.create_task(task),
    )
    .await?;
    info!(
        rule = %rule.id,
        task = %created.id,
        record = %subject.reference(),
        priority = created.priority.label(),
        "follow-up task created"
    );
    Ok(())
}

#[derive(Debug, Deserialize)]
struct DraftedEmail {
    #[serde(default)]
    subject: Option<String>,
    body: String,
}

async fn send_email<S, M, G>(
    ctx: &ActionContext<'_, S, M, G>,
    rule: &WorkflowRule,
    subject: &Subject<'_>,
    state: &PassState,
    personalized: bool,
) -> Result<ActionEffects, AutomationError>
where
    S: RecordStore + ?Sized,
    M: MessageSender + ?Sized,
    G: TextGenerator + ?Sized,
{
    let recipient = subject.contact();
    if recipient.email.is_none() {
        return Err(AutomationError::Dispatch(format!(
            "{} has no email address",
            subject.reference()
        )));
    }

    let owner = state.owner_of(subject);
    let context = TemplateContext {
        subject: *subject,
        counselor: owner.as_ref().and_then(|id| state.pool.get(id)),
        today: ctx.now.date_naive(),
    };
    let mut subject_line = render(
        rule.email_subject_template.as_deref().unwrap_or_default(),
        &context,
    );
    let mut body = render(rule.email_template.as_deref().unwrap_or_default(), &context);

    if personalized {
        let draft = draft_personalized(ctx, subject, &subject_line, &body).await?;
        if let Some(drafted_subject) = draft.subject.filter(|text| !text.trim().is_empty()) {
            subject_line = drafted_subject;
        }
        body = draft.body;
    }

    let limit = ctx.config.call_timeout();
    let message = OutboundMessage {
        channel: Channel::Email,
        recipient,
        subject: Some(subject_line.clone()),
        body,
    };
    bounded(limit, "send_email", ctx.sender.send(message)).await?;

    let entry = NewCommunication {
        record_id: subject.id().to_string(),
        rule_id: Some(rule.id.clone()),
        channel: Channel::Email,
        direction: Direction::Outbound,
        subject: Some(subject_line),
        created_date: ctx.now,
    };
    if let Err(err) = bounded(limit, "log_communication", ctx.store.log_communication(entry)).await
    {
        warn!(
            rule = %rule.id,
            record = %subject.reference(),
            error = %err,
            "email sent but communication log write failed"
        );
    }

    info!(rule = %rule.id, record = %subject.reference(), personalized, "email sent");
    Ok(ActionEffects {
        sent: 1,
        ..ActionEffects::default()
    })
}

async fn draft_personalized<S, M, G>(
    ctx: &ActionContext<'_, S, M, G>,
    subject: &Subject<'_>,
    subject_line: &str,
    body: &str,
) -> Result<DraftedEmail, AutomationError>
where
    S: RecordStore + ?Sized,
    M: MessageSender + ?Sized,
    G: TextGenerator + ?Sized,
{
    let prompt = format!(
        "Rewrite this email to {name} so it reads as a personal note from their counselor. \
         Keep every date, name, and requirement unchanged.\n\n\
         Context: {context}\nSubject: {subject_line}\nBody:\n{body}",
        name = subject.person_name(),
        context = subject.describe(),
    );
    let schema = json!({
        "type": "object",
        "properties": {
            "subject": { "type": "string" },
            "body": { "type": "string" }
        },
        "required": ["body"]
    });

    let value = bounded(
        ctx.config.call_timeout(),
        "generate_email",
        ctx.generator.generate_structured(&prompt, &schema),
    )
    .await?;
    serde_json::from_value(value)
        .map_err(|err| GenerationError::Malformed(err.to_string()).into())
}

fn demand_for(subject: &Subject<'_>) -> Demand {
    Demand {
        record: subject.reference(),
        interest_tags: subject.interest_tags(),
    }
}

fn task_title(
    rule: &WorkflowRule,
    subject: &Subject<'_>,
    state: &PassState,
    owner: Option<&StaffId>,
    now: DateTime<Utc>,
) -> String {
    match rule.task_title_template.as_deref() {
        Some(template) if !template.trim().is_empty() => {
            let context = TemplateContext {
                subject: *subject,
                counselor: owner.and_then(|id| state.pool.get(id)),
                today: now.date_naive(),
            };
            render(template, &context)
        }
        _ => format!("{}: {}", rule.name, subject.person_name()),
    }
}
