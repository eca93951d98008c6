//! Fan-out mode - how a committed message reaches its recipients

use serde::{Deserialize, Serialize};

/// Live member count at which a channel switches to read fan-out
pub const DEFAULT_READ_FANOUT_THRESHOLD: i64 = 500;

/// Delivery strategy chosen per send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FanoutMode {
    /// One inbox row per recipient is written with the timeline row
    WriteFanout,
    /// Only the timeline row is written; members pull through sync
    ReadFanout,
}

impl FanoutMode {
    /// Read fan-out iff `live_members >= threshold`.
    ///
    /// Evaluated against membership as it is at send time. Two sends that
    /// straddle a membership change across the threshold may pick different
    /// modes; nothing is versioned against a membership epoch.
    #[inline]
    pub fn for_member_count(live_members: i64, threshold: i64) -> Self {
        if live_members >= threshold {
            Self::ReadFanout
        } else {
            Self::WriteFanout
        }
    }

    #[inline]
    pub fn writes_inbox(self) -> bool {
        matches!(self, Self::WriteFanout)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WriteFanout => "WRITE_FANOUT",
            Self::ReadFanout => "READ_FANOUT",
        }
    }
}

impl std::fmt::Display for FanoutMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
