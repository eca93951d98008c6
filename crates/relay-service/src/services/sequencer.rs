//! Sequencer - per-channel monotonic sequence numbers

use relay_core::Snowflake;
use tracing::{info, instrument};

use super::context::ServiceContext;
use super::error::ServiceResult;

/// Sequencer service
pub struct SequencerService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> SequencerService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Allocate the next seq_id of a channel. The first allocation is 1.
    #[instrument(skip(self))]
    pub async fn next_seq(&self, channel_id: Snowflake) -> ServiceResult<i64> {
        Ok(self.ctx.sequence_repo().next_seq(channel_id).await?)
    }

    pub async fn current_seq(&self, channel_id: Snowflake) -> ServiceResult<i64> {
        Ok(self.ctx.sequence_repo().current_seq(channel_id).await?)
    }

    /// Lift the counter past every seq_id already in the timeline.
    ///
    /// Run after restoring the counter store from an older snapshot.
    #[instrument(skip(self))]
    pub async fn resync(&self, channel_id: Snowflake) -> ServiceResult<i64> {
        let seq = self.ctx.sequence_repo().resync(channel_id).await?;
        info!(channel_id = %channel_id, seq, "Sequence counter resynced");
        Ok(seq)
    }
}
