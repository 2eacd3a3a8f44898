//! Response-time SLA checks for inbound leads.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::domain::{AlertId, AlertStatus, Lead, LeadStatus, NewSlaAlert, SlaAlert, SlaAlertType};
use super::pass::{bounded, AutomationConfig, AutomationError, PassSummary};
use super::repository::{RecordStore, SnapshotFilter, StoreError};

/// Breach, if any, for one lead at `now`.
pub fn breach_for(lead: &Lead, threshold_minutes: u32, now: DateTime<Utc>) -> Option<(SlaAlertType, u32)> {
    if lead.sla_breached {
        return None;
    }

    match lead.response_time_minutes {
        Some(minutes) if minutes > threshold_minutes => Some((SlaAlertType::SlowResponse, minutes)),
        Some(_) => None,
        None if lead.status == LeadStatus::New => {
            let waited = (now - lead.created_date).num_minutes();
            let waited = u32::try_from(waited.max(0)).unwrap_or(u32::MAX);
            (waited > threshold_minutes).then_some((SlaAlertType::NoResponse, waited))
        }
        None => None,
    }
}

pub struct SlaMonitor<'a, S: ?Sized> {
    pub store: &'a S,
    pub config: &'a AutomationConfig,
}

impl<S> SlaMonitor<'_, S>
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
        let mut summary = PassSummary::new(self.config.max_error_messages);

        for lead in &leads {
            summary.processed += 1;
            let Some((alert_type, elapsed)) =
                breach_for(lead, self.config.sla_threshold_minutes, now)
            else {
                continue;
            };

            // Flag first so a concurrent pass that loses the race raises no second alert.
            match bounded(limit, "mark_sla_breached", self.store.mark_sla_breached(&lead.id)).await
            {
                Ok(()) => {}
                Err(AutomationError::Store(StoreError::Conflict)) => {
                    debug!(lead = %lead.id, "breach already flagged");
                    summary.skipped += 1;
                    continue;
                }
                Err(err) => {
                    warn!(lead = %lead.id, error = %err, "failed to flag SLA breach");
                    summary.record_error(format!("lead {}", lead.id), &err);
                    continue;
                }
            }

            let alert = NewSlaAlert {
                inquiry_id: lead.id.clone(),
                alert_type,
                time_elapsed_minutes: elapsed,
                created_date: now,
            };
            match bounded(limit, "create_alert", self.store.create_alert(alert)).await {
                Ok(alert) => {
                    warn!(
                        lead = %lead.id,
                        alert = %alert.id,
                        elapsed_minutes = elapsed,
                        threshold_minutes = self.config.sla_threshold_minutes,
                        "SLA breached"
                    );
                    summary.created += 1;
                }
                Err(err) => {
                    warn!(lead = %lead.id, error = %err, "failed to create SLA alert");
                    summary.record_error(format!("lead {}", lead.id), &err);
                    self.unflag(lead, limit).await;
                }
            }
        }

        info!(
            processed = summary.processed,
            created = summary.created,
            skipped = summary.skipped,
            errors = summary.errors,
            "SLA pass complete"
        );
        Ok(summary)
    }

    /// Clears the breach flag after a failed alert write so the next pass retries.
    async fn unflag(&self, lead: &Lead, limit: Duration) {
        let cleared = bounded(limit, "clear_sla_breach", self.store.clear_sla_breach(&lead.id));
        if let Err(err) = cleared.await {
            warn!(
                lead = %lead.id,
                error = %err,
                "SLA breach left flagged without an alert"
            );
        }
    }

    /// Marks an alert resolved. Resolving a resolved alert returns it unchanged.
    pub async fn resolve_alert(
        &self,
        id: &AlertId,
        now: DateTime<Utc>,
    ) -> Result<SlaAlert, AutomationError> {
        let limit = self.config.call_timeout();
        let mut alert = bounded(limit, "fetch_alert", self.store.fetch_alert(id))
            .await?
            .ok_or(StoreError::NotFound)?;

        if alert.status == AlertStatus::Resolved {
            debug!(alert = %id, "alert already resolved");
            return Ok(alert);
        }

        alert.status = AlertStatus::Resolved;
        alert.resolved_date = Some(now);
        let saved = bounded(limit, "update_alert", self.store.update_alert(alert)).await?;
        info!(alert = %id, lead = %saved.inquiry_id, "SLA alert resolved");
        Ok(saved)
    }
}
