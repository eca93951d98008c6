//! Reconciler - resolves half messages whose outcome was never reported

use std::time::Duration;

use chrono::Utc;
use relay_core::{MessageStatus, Resolution, Snowflake};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use super::context::ServiceContext;
use super::error::ServiceResult;
use super::publish::{DeliveryOutcome, PublishPipeline};
use super::writer::TransactionalWriter;

/// Counts from one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub published: usize,
    pub discarded: usize,
    /// Left in place for the next pass
    pub deferred: usize,
}

impl ReconcileReport {
    pub fn total(&self) -> usize {
        self.published + self.discarded + self.deferred
    }
}

pub struct Reconciler<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> Reconciler<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Resolve every half message older than `reconcile_stale_after`.
    ///
    /// Committed entries are published unless another publisher still holds
    /// a live lease on them; entries whose writer died after claiming are
    /// picked up once the lease lapses.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> ServiceResult<ReconcileReport> {
        let stale_after = chrono::Duration::from_std(self.ctx.settings().reconcile_stale_after)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        let cutoff = Utc::now() - stale_after;
        let stale = self.ctx.half_log().stale(cutoff).await?;

        let writer = TransactionalWriter::new(self.ctx);
        let pipeline = PublishPipeline::new(self.ctx);
        let mut report = ReconcileReport::default();

        for half in stale {
            let message_id = half.message_id();
            let resolution = match writer.check_state(message_id).await {
                Ok(Resolution::Commit) => self.committed_status(message_id).await,
                other => other.map(Pending::from),
            };
            match resolution {
                Ok(Pending::Publish) => match pipeline.deliver(half).await {
                    DeliveryOutcome::Published { .. } => report.published += 1,
                    DeliveryOutcome::AlreadyClaimed => {}
                    DeliveryOutcome::Deferred => report.deferred += 1,
                },
                Ok(Pending::AwaitingReview) => {
                    debug!(message_id = %message_id, "Half message waits for its approval");
                    report.deferred += 1;
                }
                Ok(Pending::Discard) => {
                    if pipeline.discard(message_id).await {
                        report.discarded += 1;
                    }
                }
                Err(e) => {
                    warn!(message_id = %message_id, error = %e, "Half message left unresolved");
                    report.deferred += 1;
                }
            }
        }

        if report.total() > 0 {
            info!(
                published = report.published,
                discarded = report.discarded,
                deferred = report.deferred,
                "Reconciliation pass finished"
            );
        }
        Ok(report)
    }
}

impl Reconciler<'_> {
    /// Committed events are only published once the message left review
    async fn committed_status(&self, message_id: Snowflake) -> ServiceResult<Pending> {
        let status = self
            .ctx
            .message_repo()
            .find_by_id(message_id)
            .await?
            .map(|m| m.status);
        Ok(match status {
            Some(MessageStatus::UnderReview) => Pending::AwaitingReview,
            Some(MessageStatus::Rejected) | None => Pending::Discard,
            Some(_) => Pending::Publish,
        })
    }
}

/// What to do with one stale half message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Publish,
    Discard,
    AwaitingReview,
}

impl From<Resolution> for Pending {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Commit => Pending::Publish,
            Resolution::Rollback => Pending::Discard,
        }
    }
}

/// Run reconciliation every `interval` until `shutdown` flips to true
pub async fn run_reconciler(
    ctx: ServiceContext,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = Reconciler::new(&ctx).run_once().await {
                    warn!(error = %e, "Reconciliation pass failed");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("Reconciler stopping");
                    break;
                }
            }
        }
    }
}
