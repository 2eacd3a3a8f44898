use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::common::*;

use crate::workflows::automation::domain::{
    ApplicationStatus, Channel, DocumentStatus, ReminderId, StaffId,
};
use crate::workflows::automation::reminders::{
    Audience, Frequency, ReminderScheduler, ReminderType,
};
use crate::workflows::automation::repository::{RecordStore, SnapshotFilter};
use crate::workflows::automation::{InMemoryStore, PassSummary, StoreError};

async fn run_reminders<S: RecordStore>(
    store: &S,
    sender: &RecordingSender,
    at: DateTime<Utc>,
) -> PassSummary {
    let config = config();
    ReminderScheduler {
        store,
        sender,
        config: &config,
    }
    .run_pass(&SnapshotFilter::default(), at)
    .await
    .expect("reminder pass")
}

#[tokio::test]
async fn daily_deadline_reminder_fires_once_per_day() {
    let store = InMemoryStore::new();
    store.insert_application(application("app-1", Some(5)));
    store.insert_reminder(deadline_reminder("rem-7d", 7));
    let sender = RecordingSender::default();

    let early = run_reminders(&store, &sender, now()).await;
    assert_eq!(early.sent, 0);
    assert!(store.reminder(&ReminderId::from("rem-7d")).unwrap().last_triggered.is_none());

    store.insert_application(application("app-2", Some(7)));
    let first = run_reminders(&store, &sender, now()).await;
    assert_eq!(first.processed, 1);
    assert_eq!(first.sent, 2);
    assert_eq!(sender.count(Channel::Email), 1);
    assert_eq!(sender.count(Channel::InApp), 1);

    let fired = store.reminder(&ReminderId::from("rem-7d")).unwrap();
    assert_eq!(fired.last_triggered.map(|at| at.date_naive()), Some(today()));
    assert_eq!(fired.trigger_count, 1);

    let later = now() + chrono::Duration::minutes(20);
    let again = run_reminders(&store, &sender, later).await;
    assert_eq!(again.sent, 0);
    assert_eq!(again.skipped, 1);
    assert_eq!(sender.messages().len(), 2);
}

#[tokio::test]
async fn message_renders_record_placeholders() {
    let store = InMemoryStore::new();
    store.insert_application(application("app-1", Some(7)));
    store.insert_reminder(deadline_reminder("rem-7d", 7));
    let sender = RecordingSender::default();

    run_reminders(&store, &sender, now()).await;

    let message = &sender.messages()[0];
    assert_eq!(message.subject.as_deref(), Some("MSc Data Science deadline"));
    assert_eq!(
        message.body,
        "Hi Amara, University of Leeds closes on 2026-03-09."
    );
    assert_eq!(message.recipient.user_id, "student-app-1");
}

#[tokio::test]
async fn once_reminder_never_fires_twice() {
    let store = InMemoryStore::new();
    store.insert_application(application("app-1", Some(7)));
    let mut once = deadline_reminder("rem-once", 7);
    once.reminder_timing.frequency = Frequency::Once;
    once.reminder_timing.time_of_day = None;
    store.insert_reminder(once);
    let sender = RecordingSender::default();

    for day in 0..3 {
        run_reminders(&store, &sender, now() + chrono::Duration::days(day)).await;
    }

    assert_eq!(sender.count(Channel::Email), 1);
    assert_eq!(store.reminder(&ReminderId::from("rem-once")).unwrap().trigger_count, 1);
}

#[tokio::test]
async fn outside_time_window_is_skipped() {
    let store = InMemoryStore::new();
    store.insert_application(application("app-1", Some(7)));
    store.insert_reminder(deadline_reminder("rem-7d", 7));
    let sender = RecordingSender::default();

    let evening = now() + chrono::Duration::hours(8);
    let summary = run_reminders(&store, &sender, evening).await;

    assert_eq!(summary.skipped, 1);
    assert!(sender.messages().is_empty());
}

#[tokio::test]
async fn failed_channel_does_not_block_the_other() {
    let store = InMemoryStore::new();
    store.insert_application(application("app-1", Some(7)));
    store.insert_reminder(deadline_reminder("rem-7d", 7));
    let sender = RecordingSender::failing_on(Channel::Email);

    let summary = run_reminders(&store, &sender, now()).await;

    assert_eq!(summary.sent, 1);
    assert_eq!(summary.errors, 1);
    assert_eq!(sender.count(Channel::InApp), 1);
    assert!(store
        .reminder(&ReminderId::from("rem-7d"))
        .unwrap()
        .last_triggered
        .is_some());
}

#[tokio::test]
async fn counselor_audience_uses_assigned_staff() {
    let store = InMemoryStore::new();
    let mut owned = application("app-1", Some(7));
    owned.assigned_to = Some(StaffId::from("s-1"));
    store.insert_application(owned);
    store.insert_application(application("app-2", Some(7)));
    store.insert_staff(staff("s-1", 3, 10, &[]));
    let mut reminder = deadline_reminder("rem-counselor", 7);
    reminder.trigger_condition.target_audience = Audience::Counselor;
    reminder.delivery_channels.in_app = false;
    store.insert_reminder(reminder);
    let sender = RecordingSender::default();

    let summary = run_reminders(&store, &sender, now()).await;

    assert_eq!(summary.sent, 1);
    assert_eq!(summary.skipped, 1);
    let message = &sender.messages()[0];
    assert_eq!(message.recipient.user_id, "s-1");
    assert_eq!(message.recipient.email.as_deref(), Some("s-1@consultancy.example"));
}

#[tokio::test]
async fn lost_fire_race_is_retried_once() {
    let store = ScriptedStore::default();
    store.inner.insert_application(application("app-1", Some(7)));
    store.inner.insert_reminder(deadline_reminder("rem-7d", 7));
    store.fire_conflicts.store(1, Ordering::SeqCst);
    let sender = RecordingSender::default();

    let summary = run_reminders(&store, &sender, now()).await;

    assert_eq!(summary.errors, 0);
    assert_eq!(
        store.inner.reminder(&ReminderId::from("rem-7d")).unwrap().trigger_count,
        1
    );
}

#[tokio::test]
async fn repeated_fire_conflict_is_an_error() {
    let store = ScriptedStore::default();
    store.inner.insert_application(application("app-1", Some(7)));
    store.inner.insert_reminder(deadline_reminder("rem-7d", 7));
    store.fire_conflicts.store(2, Ordering::SeqCst);
    let sender = RecordingSender::default();

    let summary = run_reminders(&store, &sender, now()).await;

    assert_eq!(summary.errors, 1);
    assert!(summary.error_messages[0].contains("concurrent update conflict"));
    assert!(store
        .inner
        .reminder(&ReminderId::from("rem-7d"))
        .unwrap()
        .last_triggered
        .is_none());
}

#[tokio::test]
async fn invalid_reminder_is_reported() {
    let store = InMemoryStore::new();
    store.insert_application(application("app-1", Some(7)));
    let mut broken = deadline_reminder("rem-broken", 7);
    broken.trigger_condition.days_before_deadline = None;
    store.insert_reminder(broken);
    let mut silent = deadline_reminder("rem-silent", 7);
    silent.delivery_channels.in_app = false;
    silent.delivery_channels.email = false;
    store.insert_reminder(silent);

    let summary = run_reminders(&store, &RecordingSender::default(), now()).await;

    assert_eq!(summary.errors, 2);
    assert!(summary.error_messages[0].contains("days_before_deadline"));
    assert!(summary.error_messages[1].contains("no delivery channel"));
}

#[tokio::test]
async fn expiry_reminder_filters_document_types() {
    let store = InMemoryStore::new();
    let mut passport = document("doc-1", "Passport", DocumentStatus::Approved);
    passport.expiry_date = Some(today() + chrono::Duration::days(30));
    store.insert_document(passport);
    let mut visa = document("doc-2", "visa", DocumentStatus::Approved);
    visa.expiry_date = Some(today() + chrono::Duration::days(30));
    store.insert_document(visa);

    let mut reminder = deadline_reminder("rem-expiry", 7);
    reminder.reminder_type = ReminderType::DocumentExpiry;
    reminder.trigger_condition.days_before_deadline = None;
    reminder.trigger_condition.days_until_expiry = Some(30);
    reminder.trigger_condition.document_types = vec!["passport".to_string()];
    reminder.delivery_channels.in_app = false;
    reminder.message_template.subject = "{{document_type}} renewal".to_string();
    reminder.message_template.body = "Your {{document_type}} expires on {{expiry_date}}.".to_string();
    store.insert_reminder(reminder);
    let sender = RecordingSender::default();

    let summary = run_reminders(&store, &sender, now()).await;

    assert_eq!(summary.processed, 1);
    assert_eq!(sender.messages()[0].body, "Your Passport expires on 2026-04-01.");
}

#[tokio::test]
async fn status_reminder_targets_listed_statuses() {
    let store = InMemoryStore::new();
    let mut offer = application("app-1", None);
    offer.status = ApplicationStatus::OfferReceived;
    store.insert_application(offer);
    store.insert_application(application("app-2", None));

    let mut reminder = deadline_reminder("rem-offer", 7);
    reminder.reminder_type = ReminderType::ApplicationStatus;
    reminder.trigger_condition.days_before_deadline = None;
    reminder.trigger_condition.application_statuses = vec![ApplicationStatus::OfferReceived];
    reminder.delivery_channels.email = false;
    store.insert_reminder(reminder);
    let sender = RecordingSender::default();

    let summary = run_reminders(&store, &sender, now()).await;

    assert_eq!(summary.processed, 1);
    assert_eq!(sender.count(Channel::InApp), 1);
}

#[tokio::test]
async fn concurrent_passes_fire_a_reminder_once() {
    let store = InMemoryStore::new();
    store.insert_application(application("app-1", Some(7)));
    store.insert_reminder(deadline_reminder("rem-7d", 7));
    let sender = RecordingSender::slow(Duration::from_millis(50));

    let (first, second) = tokio::join!(
        run_reminders(&store, &sender, now()),
        run_reminders(&store, &sender, now()),
    );

    assert_eq!(first.sent + second.sent, 2);
    assert_eq!(first.errors + second.errors, 0);
    assert_eq!(first.skipped + second.skipped, 1);
    assert_eq!(sender.messages().len(), 2);
    let reminder = store.reminder(&ReminderId::from("rem-7d")).unwrap();
    assert_eq!(reminder.trigger_count, 1);
    assert_eq!(reminder.last_triggered, Some(now()));
}

#[tokio::test]
async fn fire_recorded_by_another_pass_is_not_overwritten() {
    let store = ScriptedStore::default();
    store.inner.insert_application(application("app-1", Some(7)));
    store.inner.insert_reminder(deadline_reminder("rem-7d", 7));
    store.fired_elsewhere.store(true, Ordering::SeqCst);
    let sender = RecordingSender::default();

    let summary = run_reminders(&store, &sender, now()).await;

    assert_eq!(summary.errors, 1);
    assert!(summary.error_messages[0].contains("concurrent update conflict"));
    assert_eq!(
        store.inner.reminder(&ReminderId::from("rem-7d")).unwrap().trigger_count,
        1
    );
}

#[tokio::test]
async fn reminder_claim_holds_for_the_lease() {
    let store = InMemoryStore::new();
    store.insert_reminder(deadline_reminder("rem-7d", 7));
    let id = ReminderId::from("rem-7d");
    let lease = chrono::Duration::minutes(60);

    store.claim_reminder(&id, None, now(), lease).await.unwrap();
    let contested = store
        .claim_reminder(&id, None, now() + chrono::Duration::minutes(5), lease)
        .await;
    assert_eq!(contested, Err(StoreError::Conflict));

    store
        .claim_reminder(&id, None, now() + chrono::Duration::minutes(61), lease)
        .await
        .unwrap();
    store
        .release_reminder(&id, now() + chrono::Duration::minutes(61))
        .await
        .unwrap();
    store.claim_reminder(&id, None, now() + chrono::Duration::minutes(62), lease).await.unwrap();

    let stale = store.claim_reminder(&id, Some(now()), now(), lease).await;
    assert_eq!(stale, Err(StoreError::Conflict));
}
