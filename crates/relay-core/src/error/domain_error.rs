//! Domain errors - error types for the domain layer

use thiserror::Error;

use crate::entities::MessageStatus;
use crate::value_objects::Snowflake;

/// Domain layer errors
#[derive(Debug, Error)]
pub enum DomainError {
    // =========================================================================
    // Not Found Errors
    // =========================================================================
    #[error("Channel not found: {0}")]
    ChannelNotFound(Snowflake),

    #[error("Message not found: {0}")]
    MessageNotFound(Snowflake),

    #[error("Member not found in channel")]
    MemberNotFound,

    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Content must not be empty")]
    EmptyContent,

    #[error("Content too long: max {max} characters")]
    ContentTooLong { max: usize },

    #[error("Invalid media reference: {0}")]
    InvalidMediaReference(String),

    // =========================================================================
    // Authorization Errors
    // =========================================================================
    #[error("Not a member of this channel")]
    NotChannelMember,

    #[error("Member is muted until {0}")]
    MemberMuted(chrono::DateTime<chrono::Utc>),

    #[error("Only the sender or a channel admin may do this")]
    NotMessageSender,

    // =========================================================================
    // Conflict Errors
    // =========================================================================
    #[error("Already a member of this channel")]
    AlreadyMember,

    #[error("Channel is full: max {max} members")]
    ChannelFull { max: i32 },

    #[error("Channel is not active")]
    ChannelInactive,

    #[error("Cannot change message status from {from:?} to {to:?}")]
    InvalidStatusTransition {
        from: MessageStatus,
        to: MessageStatus,
    },

    // =========================================================================
    // Write / Reconciliation Errors
    // =========================================================================
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Commit state of message {0} could not be resolved")]
    ReconciliationAmbiguity(Snowflake),

    // =========================================================================
    // Infrastructure Errors (wrapped)
    // =========================================================================
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl DomainError {
    /// Get an error code string for API responses
    pub fn code(&self) -> &'static str {
        match self {
            // Not Found
            Self::ChannelNotFound(_) => "UNKNOWN_CHANNEL",
            Self::MessageNotFound(_) => "UNKNOWN_MESSAGE",
            Self::MemberNotFound => "UNKNOWN_MEMBER",

            // Validation
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::EmptyContent => "EMPTY_CONTENT",
            Self::ContentTooLong { .. } => "CONTENT_TOO_LONG",
            Self::InvalidMediaReference(_) => "INVALID_MEDIA_REFERENCE",

            // Authorization
            Self::NotChannelMember => "NOT_CHANNEL_MEMBER",
            Self::MemberMuted(_) => "MEMBER_MUTED",
            Self::NotMessageSender => "NOT_MESSAGE_SENDER",

            // Conflict
            Self::AlreadyMember => "ALREADY_MEMBER",
            Self::ChannelFull { .. } => "CHANNEL_FULL",
            Self::ChannelInactive => "CHANNEL_INACTIVE",
            Self::InvalidStatusTransition { .. } => "INVALID_STATUS_TRANSITION",

            // Write path
            Self::PersistenceFailure(_) => "PERSISTENCE_FAILURE",
            Self::ReconciliationAmbiguity(_) => "RECONCILIATION_AMBIGUITY",

            // Infrastructure
            Self::DatabaseError(_) => "DATABASE_ERROR",
            Self::CacheError(_) => "CACHE_ERROR",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ChannelNotFound(_) | Self::MessageNotFound(_) | Self::MemberNotFound
        )
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::ValidationError(_)
                | Self::EmptyContent
                | Self::ContentTooLong { .. }
                | Self::InvalidMediaReference(_)
        )
    }

    /// Check if this is an authorization error
    pub fn is_authorization(&self) -> bool {
        matches!(
            self,
            Self::NotChannelMember | Self::MemberMuted(_) | Self::NotMessageSender
        )
    }

    /// Check if this is a conflict error
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::AlreadyMember
                | Self::ChannelFull { .. }
                | Self::ChannelInactive
                | Self::InvalidStatusTransition { .. }
        )
    }

    /// Durable state could not be written or read
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            Self::PersistenceFailure(_) | Self::ReconciliationAmbiguity(_) | Self::DatabaseError(_)
        )
    }
}
