use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use super::assignment::AssignmentPass;
use super::domain::{AlertId, LeadId, SlaAlert};
use super::pass::{bounded, AutomationConfig, AutomationError, PassKind, PassReport};
use super::reminders::ReminderScheduler;
use super::repository::{MessageSender, RecordStore, SnapshotFilter, StoreError, TextGenerator};
use super::rules::RuleEngine;
use super::scoring::{LeadScore, LeadScorer};
use super::sla::SlaMonitor;

/// Single entry point for every automation pass, shared by HTTP, CLI, and the scheduler.
pub struct AutomationService<S, M, G> {
    store: Arc<S>,
    sender: Arc<M>,
    generator: Arc<G>,
    config: AutomationConfig,
    scorer: LeadScorer,
}

impl<S, M, G> AutomationService<S, M, G>
where
    S: RecordStore + 'static,
    M: MessageSender + 'static,
    G: TextGenerator + 'static,
{
    pub fn new(store: Arc<S>, sender: Arc<M>, generator: Arc<G>, config: AutomationConfig) -> Self {
        let scorer = LeadScorer::new(config.scoring.clone());
        Self {
            store,
            sender,
            generator,
            config,
            scorer,
        }
    }

    pub fn config(&self) -> &AutomationConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Runs one pass of `kind` over the records admitted by `filter`.
    pub async fn run_pass(
        &self,
        kind: PassKind,
        filter: &SnapshotFilter,
        now: DateTime<Utc>,
    ) -> Result<PassReport, AutomationError> {
        let started_at = Utc::now();
        let summary = match kind {
            PassKind::Rules => {
                RuleEngine {
                    store: self.store.as_ref(),
                    sender: self.sender.as_ref(),
                    generator: self.generator.as_ref(),
                    config: &self.config,
                }
                .run_pass(filter, now)
                .await?
            }
            PassKind::Reminders => {
                ReminderScheduler {
                    store: self.store.as_ref(),
                    sender: self.sender.as_ref(),
                    config: &self.config,
                }
                .run_pass(filter, now)
                .await?
            }
            PassKind::Assignment => {
                AssignmentPass {
                    store: self.store.as_ref(),
                    config: &self.config,
                }
                .run_pass(filter, now)
                .await?
            }
            PassKind::Sla => {
                SlaMonitor {
                    store: self.store.as_ref(),
                    config: &self.config,
                }
                .run_pass(filter, now)
                .await?
            }
        };

        let report = PassReport {
            kind,
            started_at,
            finished_at: Utc::now(),
            summary,
        };
        info!(
            pass = kind.label(),
            elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
            "automation pass finished"
        );
        Ok(report)
    }

    /// Runs every pass kind in order, stopping at the first snapshot failure.
    pub async fn run_all(
        &self,
        filter: &SnapshotFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<PassReport>, AutomationError> {
        let mut reports = Vec::with_capacity(PassKind::all().len());
        for kind in PassKind::all() {
            reports.push(self.run_pass(kind, filter, now).await?);
        }
        Ok(reports)
    }

    pub async fn score_lead(&self, id: &LeadId) -> Result<LeadScore, AutomationError> {
        let lead = bounded(
            self.config.call_timeout(),
            "fetch_lead",
            self.store.fetch_lead(id),
        )
        .await?
        .ok_or(StoreError::NotFound)?;
        Ok(self.scorer.score(&lead))
    }

    pub async fn resolve_alert(
        &self,
        id: &AlertId,
        now: DateTime<Utc>,
    ) -> Result<SlaAlert, AutomationError> {
        SlaMonitor {
            store: self.store.as_ref(),
            config: &self.config,
        }
        .resolve_alert(id, now)
        .await
    }
}
