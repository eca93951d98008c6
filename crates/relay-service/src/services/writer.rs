//! Transactional writer - the local half of the publish protocol
//!
//! `execute_local_write` turns the storage call into a tri-state
//! [`LocalTxState`]; it never surfaces an error. `check_state` resolves a lost
//! outcome from the timeline and never answers `Unknown`.

use relay_core::{DomainError, InboxEntry, LocalTxState, Message, Resolution, Snowflake};
use tracing::{debug, error, instrument, warn};

use super::context::ServiceContext;
use super::error::{ServiceError, ServiceResult};

pub struct TransactionalWriter<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> TransactionalWriter<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Persist the timeline row and inbox rows atomically.
    ///
    /// The write runs on its own task under `local_write_timeout`. If the
    /// timeout fires or the task dies, the task is aborted and awaited, and
    /// the outcome is reported as `Unknown`.
    #[instrument(skip(self, message, inbox), fields(message_id = %message.id, inbox = inbox.len()))]
    pub async fn execute_local_write(
        &self,
        message: &Message,
        inbox: Vec<InboxEntry>,
    ) -> LocalTxState {
        let repo = self.ctx.message_repo_arc();
        let message = message.clone();
        let mut handle =
            tokio::spawn(async move { repo.insert_with_inbox(&message, &inbox).await });

        match tokio::time::timeout(self.ctx.settings().local_write_timeout, &mut handle).await {
            Ok(Ok(Ok(()))) => LocalTxState::Commit,
            Ok(Ok(Err(e))) => {
                warn!(error = %e, "Local write rolled back");
                LocalTxState::Rollback
            }
            Ok(Err(e)) => {
                error!(error = %e, "Local write task failed");
                LocalTxState::Unknown
            }
            Err(_) => {
                handle.abort();
                // Wait for the task to stop so it cannot race check_state
                let _ = handle.await;
                warn!("Local write outcome lost to timeout");
                LocalTxState::Unknown
            }
        }
    }

    /// Resolve the outcome of a local write from durable state.
    ///
    /// Presence of the timeline row is COMMIT, absence is ROLLBACK. Storage
    /// errors are retried; if every attempt fails the error is returned and
    /// the caller must leave the half message for a later pass.
    #[instrument(skip(self))]
    pub async fn check_state(&self, message_id: Snowflake) -> ServiceResult<Resolution> {
        let settings = self.ctx.settings();
        let attempts = settings.check_state_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.ctx.message_repo().exists(message_id).await {
                Ok(exists) => {
                    let resolution = Resolution::from_timeline_presence(exists);
                    debug!(?resolution, attempt, "check_state resolved");
                    return Ok(resolution);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "check_state lookup failed");
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(settings.check_state_backoff * attempt).await;
                    }
                }
            }
        }

        error!(
            error = ?last_error,
            "check_state exhausted its attempts"
        );
        Err(ServiceError::Domain(DomainError::ReconciliationAmbiguity(
            message_id,
        )))
    }
}
