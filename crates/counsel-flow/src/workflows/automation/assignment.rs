use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::domain::{LeadStatus, RecordRef, Staff, StaffId};
use super::pass::{bounded, AutomationConfig, AutomationError, PassSummary};
use super::repository::{AssignmentCommit, RecordStore, SnapshotFilter, StoreError};
use super::scoring::LeadScorer;

/// Something that needs an owner: a lead, an application, or a follow-up task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Demand {
    pub record: RecordRef,
    /// Lowercased interest tags matched against staff specializations.
    pub interest_tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AssignmentResult {
    Assigned {
        staff_id: StaffId,
        /// Load read from the snapshot; the commit re-checks it.
        expected_load: u32,
        specialization_match: bool,
        decided_at: DateTime<Utc>,
    },
    NoCapacity,
}

/// Picks a counselor for `demand` from `candidates`.
///
/// Only available, active staff below capacity are eligible. Specialists for any of
/// the demand's tags are preferred; within the chosen partition the lowest load wins
/// and the staff id breaks ties so identical snapshots give identical answers.
pub fn assign(demand: &Demand, candidates: &[Staff], now: DateTime<Utc>) -> AssignmentResult {
    let eligible: Vec<&Staff> = candidates.iter().filter(|staff| staff.is_eligible()).collect();

    let (specialists, generalists): (Vec<&Staff>, Vec<&Staff>) = eligible
        .into_iter()
        .partition(|staff| staff.specializes_in(&demand.interest_tags));

    let specialization_match = !specialists.is_empty();
    let pool = if specialization_match {
        specialists
    } else {
        generalists
    };

    match pool
        .into_iter()
        .min_by(|a, b| {
            a.current_students
                .cmp(&b.current_students)
                .then_with(|| a.id.cmp(&b.id))
        }) {
        Some(staff) => AssignmentResult::Assigned {
            staff_id: staff.id.clone(),
            expected_load: staff.current_students,
            specialization_match,
            decided_at: now,
        },
        None => AssignmentResult::NoCapacity,
    }
}

/// Staff snapshot for one pass, kept current as the pass commits assignments.
#[derive(Debug, Clone, Default)]
pub struct StaffPool {
    staff: Vec<Staff>,
}

impl StaffPool {
    pub fn new(staff: Vec<Staff>) -> Self {
        Self { staff }
    }

    pub fn staff(&self) -> &[Staff] {
        &self.staff
    }

    pub fn get(&self, id: &StaffId) -> Option<&Staff> {
        self.staff.iter().find(|staff| &staff.id == id)
    }

    fn record_commit(&mut self, id: &StaffId) {
        if let Some(staff) = self.staff.iter_mut().find(|staff| &staff.id == id) {
            staff.current_students += 1;
        }
    }

    fn replace(&mut self, staff: Vec<Staff>) {
        self.staff = staff;
    }
}

/// Commits assignment decisions with a capacity re-check at write time.
#[derive(Debug, Clone)]
pub struct Assigner {
    call_timeout: Duration,
}

const COMMIT_ATTEMPTS: usize = 2;

impl Assigner {
    pub fn new(call_timeout: Duration) -> Self {
        Self { call_timeout }
    }

    /// Selects, then claims capacity and writes `assigned_to` in one conditional
    /// store call. A lost race refreshes the staff snapshot and retries once.
    pub async fn assign_and_commit<S>(
        &self,
        store: &S,
        demand: &Demand,
        pool: &mut StaffPool,
        now: DateTime<Utc>,
    ) -> Result<AssignmentResult, AutomationError>
    where
        S: RecordStore + ?Sized,
    {
        for attempt in 1..=COMMIT_ATTEMPTS {
            let decision = assign(demand, pool.staff(), now);
            let AssignmentResult::Assigned {
                staff_id,
                expected_load,
                ..
            } = &decision
            else {
                debug!(record = %demand.record, "no staff capacity for demand");
                return Ok(AssignmentResult::NoCapacity);
            };

            let commit = AssignmentCommit {
                staff_id: staff_id.clone(),
                expected_load: *expected_load,
                target: demand.record.clone(),
                committed_at: now,
            };

            match bounded(
                self.call_timeout,
                "commit_assignment",
                store.commit_assignment(&commit),
            )
            .await
            {
                Ok(()) => {
                    pool.record_commit(staff_id);
                    return Ok(decision);
                }
                Err(AutomationError::Store(StoreError::Conflict)) if attempt < COMMIT_ATTEMPTS => {
                    warn!(
                        record = %demand.record,
                        staff = %staff_id,
                        "assignment lost a capacity race, refreshing staff snapshot"
                    );
                    let fresh = bounded(self.call_timeout, "list_staff", store.list_staff()).await?;
                    pool.replace(fresh);
                }
                Err(AutomationError::Store(StoreError::Conflict)) => {
                    return Err(AutomationError::ConcurrencyConflict(format!(
                        "assignment of {}",
                        demand.record
                    )));
                }
                Err(other) => return Err(other),
            }
        }

        Err(AutomationError::ConcurrencyConflict(format!(
            "assignment of {}",
            demand.record
        )))
    }
}

/// "Run now" auto-assignment over unassigned new leads, best leads first.
pub struct AssignmentPass<'a, S: ?Sized> {
    pub store: &'a S,
    pub config: &'a AutomationConfig,
}

impl<S> AssignmentPass<'_, S>
where
    S: RecordStore + ?Sized,
{
    pub async fn run_pass(
        &self,
        filter: &SnapshotFilter,
        now: DateTime<Utc>,
    ) -> Result<PassSummary, AutomationError> {
        let limit = self.config.call_timeout();
        let leads = bounded(limit, "list_leads", self.store.list_leads(filter)).await?;
        let mut pool = StaffPool::new(bounded(limit, "list_staff", self.store.list_staff()).await?);
        let scorer = LeadScorer::new(self.config.scoring.clone());
        let assigner = Assigner::new(limit);
        let mut summary = PassSummary::new(self.config.max_error_messages);

        let mut queue: Vec<_> = leads
            .iter()
            .filter(|lead| lead.status == LeadStatus::New && lead.assigned_to.is_none())
            .map(|lead| (scorer.score(lead), lead))
            .collect();
        queue.sort_by(|(a_score, a), (b_score, b)| {
            b_score
                .tier
                .cmp(&a_score.tier)
                .then_with(|| b_score.score.cmp(&a_score.score))
                .then_with(|| a.created_date.cmp(&b.created_date))
                .then_with(|| a.id.cmp(&b.id))
        });

        for (score, lead) in queue {
            summary.processed += 1;
            let demand = Demand {
                record: RecordRef::lead(&lead.id),
                interest_tags: lead.interest_tags(),
            };

            match assigner
                .assign_and_commit(self.store, &demand, &mut pool, now)
                .await
            {
                Ok(AssignmentResult::Assigned {
                    staff_id,
                    specialization_match,
                    ..
                }) => {
                    info!(
                        lead = %lead.id,
                        staff = %staff_id,
                        tier = score.tier.label(),
                        score = score.score,
                        specialization_match,
                        "lead assigned"
                    );
                    summary.assigned += 1;
                }
                Ok(AssignmentResult::NoCapacity) => {
                    summary.no_capacity += 1;
                    summary.skipped += 1;
                }
                Err(AutomationError::Store(StoreError::AlreadyAssigned)) => {
                    debug!(lead = %lead.id, "lead assigned by a concurrent pass");
                    summary.skipped += 1;
                }
                Err(err) => {
                    warn!(lead = %lead.id, error = %err, "lead assignment failed");
                    summary.record_error(format!("lead {}", lead.id), &err);
                }
            }
        }

        info!(
            processed = summary.processed,
            assigned = summary.assigned,
            no_capacity = summary.no_capacity,
            errors = summary.errors,
            "assignment pass complete"
        );
        Ok(summary)
    }
}
