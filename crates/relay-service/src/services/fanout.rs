//! Fan-out decision - write or read fan-out per send

use relay_core::{FanoutMode, Snowflake};
use tracing::debug;

use super::context::ServiceContext;
use super::error::ServiceResult;

/// How one send will reach its audience
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutDecision {
    pub mode: FanoutMode,
    pub live_members: i64,
    /// Active member ids for write fan-out; `None` for read fan-out
    pub recipients: Option<Vec<Snowflake>>,
}

impl FanoutDecision {
    #[inline]
    pub fn writes_inbox(&self) -> bool {
        self.mode.writes_inbox()
    }
}

/// Chooses the fan-out mode from the live member count
pub struct FanoutDecider<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> FanoutDecider<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Count members fresh and pick the mode; member ids are only loaded
    /// when inbox rows will be written.
    pub async fn decide(&self, channel_id: Snowflake) -> ServiceResult<FanoutDecision> {
        let membership = self.ctx.membership();
        let live_members = membership.live_member_count(channel_id).await?;
        let mode = FanoutMode::for_member_count(live_members, self.ctx.settings().read_threshold);

        let recipients = if mode.writes_inbox() {
            Some(membership.member_ids(channel_id).await?)
        } else {
            None
        };

        debug!(channel_id = %channel_id, live_members, mode = %mode, "Fan-out decided");

        Ok(FanoutDecision {
            mode,
            live_members,
            recipients,
        })
    }
}
