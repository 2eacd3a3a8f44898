use std::sync::atomic::Ordering;
use std::time::Duration;

use super::common::*;

use crate::workflows::automation::assignment::{
    assign, AssignmentPass, AssignmentResult, Assigner, Demand, StaffPool,
};
use crate::workflows::automation::domain::{
    DocumentId, DocumentStatus, LeadId, LeadStatus, RecordRef, StaffId, StaffStatus,
};
use crate::workflows::automation::repository::{AssignmentCommit, RecordStore};
use crate::workflows::automation::{AutomationError, InMemoryStore, SnapshotFilter};

fn demand(tags: &[&str]) -> Demand {
    Demand {
        record: RecordRef::lead(&LeadId::from("lead-1")),
        interest_tags: tags.iter().map(|tag| tag.to_string()).collect(),
    }
}

fn chosen(result: &AssignmentResult) -> Option<&str> {
    match result {
        AssignmentResult::Assigned { staff_id, .. } => Some(staff_id.as_str()),
        AssignmentResult::NoCapacity => None,
    }
}

#[test]
fn specialist_with_room_beats_idle_generalist() {
    let pool = vec![staff("generalist", 10, 50, &[]), staff("uk-desk", 48, 50, &["UK"])];
    let result = assign(&demand(&["uk"]), &pool, now());
    assert_eq!(chosen(&result), Some("uk-desk"));
    assert!(matches!(
        result,
        AssignmentResult::Assigned {
            specialization_match: true,
            expected_load: 48,
            ..
        }
    ));
}

#[test]
fn full_specialist_falls_back_to_least_loaded() {
    let pool = vec![
        staff("uk-desk", 50, 50, &["UK"]),
        staff("busy", 30, 50, &[]),
        staff("quiet", 12, 50, &[]),
    ];
    let result = assign(&demand(&["uk"]), &pool, now());
    assert_eq!(chosen(&result), Some("quiet"));
}

#[test]
fn ties_break_on_staff_id() {
    let pool = vec![staff("s-b", 5, 50, &["UK"]), staff("s-a", 5, 50, &["UK"])];
    assert_eq!(chosen(&assign(&demand(&["uk"]), &pool, now())), Some("s-a"));
}

#[test]
fn unavailable_and_inactive_staff_are_ignored() {
    let mut away = staff("away", 0, 50, &[]);
    away.is_available = false;
    let mut on_leave = staff("leave", 0, 50, &[]);
    on_leave.status = StaffStatus::OnLeave;
    let result = assign(&demand(&[]), &[away, on_leave], now());
    assert_eq!(result, AssignmentResult::NoCapacity);
}

#[test]
fn empty_pool_has_no_capacity() {
    assert_eq!(assign(&demand(&["uk"]), &[], now()), AssignmentResult::NoCapacity);
}

#[tokio::test]
async fn document_commit_sets_owner_without_taking_a_seat() {
    let store = InMemoryStore::new();
    store.insert_document(document("doc-1", "passport", DocumentStatus::Pending));
    store.insert_staff(staff("s-1", 7, 10, &[]));

    let commit = AssignmentCommit {
        staff_id: StaffId::from("s-1"),
        expected_load: 7,
        target: RecordRef::document(&DocumentId::from("doc-1")),
        committed_at: now(),
    };
    store.commit_assignment(&commit).await.expect("document commit");

    assert_eq!(store.staff_member(&StaffId::from("s-1")).unwrap().current_students, 7);
    let documents = store
        .list_documents(&SnapshotFilter::default())
        .await
        .expect("documents");
    assert_eq!(documents[0].assigned_to, Some(StaffId::from("s-1")));
}

#[tokio::test]
async fn commit_retries_once_after_losing_a_race() {
    let store = ScriptedStore::default();
    store.inner.insert_lead(complete_lead("lead-1"));
    store.inner.insert_staff(staff("uk-desk", 48, 50, &["UK"]));
    store.inner.insert_staff(staff("generalist", 10, 50, &[]));
    store.assignment_conflicts.store(1, Ordering::SeqCst);

    let mut pool = StaffPool::new(store.inner.staff());
    let result = Assigner::new(Duration::from_millis(200))
        .assign_and_commit(&store, &demand(&["uk"]), &mut pool, now())
        .await
        .expect("assignment");

    // The concurrent pass took seat 49, so the retry sees 49/50 and still fits.
    assert_eq!(chosen(&result), Some("uk-desk"));
    let desk = store.inner.staff_member(&StaffId::from("uk-desk")).unwrap();
    assert_eq!(desk.current_students, 50);
    assert!(desk.current_students <= desk.max_students);
}

#[tokio::test]
async fn second_conflict_is_reported() {
    let store = ScriptedStore::default();
    store.inner.insert_lead(complete_lead("lead-1"));
    store.inner.insert_staff(staff("a", 0, 50, &[]));
    store.inner.insert_staff(staff("b", 0, 50, &[]));
    store.assignment_conflicts.store(2, Ordering::SeqCst);

    let mut pool = StaffPool::new(store.inner.staff());
    let result = Assigner::new(Duration::from_millis(200))
        .assign_and_commit(&store, &demand(&[]), &mut pool, now())
        .await;

    assert!(matches!(result, Err(AutomationError::ConcurrencyConflict(_))));
    assert!(store.inner.lead(&LeadId::from("lead-1")).unwrap().assigned_to.is_none());
}

#[tokio::test]
async fn assignment_pass_serves_hot_leads_first() {
    let store = InMemoryStore::new();
    let mut cold = bare_lead("lead-cold");
    cold.created_date = days_ago(10);
    store.insert_lead(cold);
    store.insert_lead(complete_lead("lead-hot"));
    store.insert_staff(staff("only", 4, 5, &[]));

    let config = config();
    let summary = AssignmentPass {
        store: &store,
        config: &config,
    }
    .run_pass(&SnapshotFilter::default(), now())
    .await
    .expect("pass");

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.assigned, 1);
    assert_eq!(summary.no_capacity, 1);

    let hot = store.lead(&LeadId::from("lead-hot")).unwrap();
    assert_eq!(hot.assigned_to, Some(StaffId::from("only")));
    assert_eq!(hot.status, LeadStatus::Assigned);
    assert!(store.lead(&LeadId::from("lead-cold")).unwrap().assigned_to.is_none());

    let only = store.staff_member(&StaffId::from("only")).unwrap();
    assert_eq!(only.current_students, 5);
}

#[tokio::test]
async fn assignment_pass_never_double_books() {
    let store = InMemoryStore::new();
    for idx in 0..6 {
        store.insert_lead(complete_lead(&format!("lead-{idx}")));
    }
    store.insert_staff(staff("a", 0, 2, &[]));
    store.insert_staff(staff("b", 1, 2, &[]));

    let config = config();
    let pass = AssignmentPass {
        store: &store,
        config: &config,
    };
    let first = pass.run_pass(&SnapshotFilter::default(), now()).await.unwrap();
    let second = pass.run_pass(&SnapshotFilter::default(), now()).await.unwrap();

    assert_eq!(first.assigned, 3);
    assert_eq!(second.assigned, 0);
    for id in ["a", "b"] {
        let member = store.staff_member(&StaffId::from(id)).unwrap();
        assert!(member.current_students <= member.max_students);
    }
}
