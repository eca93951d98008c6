//! Local transaction state reported to the publish layer

use serde::{Deserialize, Serialize};

/// Outcome of a local write as observed by the publisher.
///
/// `Unknown` means the writer never reported (timeout, lost task). It is only
/// ever an input to reconciliation, which turns it into a [`Resolution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocalTxState {
    Commit,
    Rollback,
    Unknown,
}

/// A definitive outcome, derived from durable state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resolution {
    Commit,
    Rollback,
}

impl LocalTxState {
    /// The definitive outcome, if this state carries one
    #[inline]
    pub fn resolved(self) -> Option<Resolution> {
        match self {
            Self::Commit => Some(Resolution::Commit),
            Self::Rollback => Some(Resolution::Rollback),
            Self::Unknown => None,
        }
    }
}

impl Resolution {
    /// Timeline row present means the local write committed
    #[inline]
    pub fn from_timeline_presence(exists: bool) -> Self {
        if exists {
            Self::Commit
        } else {
            Self::Rollback
        }
    }

    #[inline]
    pub fn is_commit(self) -> bool {
        matches!(self, Self::Commit)
    }
}

impl From<Resolution> for LocalTxState {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Commit => Self::Commit,
            Resolution::Rollback => Self::Rollback,
        }
    }
}
