//! Data transfer objects for API requests and responses
//!
//! This module provides:
//! - Request DTOs with validation for API inputs
//! - Response DTOs for serializing API outputs

pub mod requests;
pub mod responses;

pub use requests::{
    AddMemberRequest, CreateChannelRequest, LimitParams, MentionParams, ReactionParams,
    RecallRequest, ReviewDecisionRequest, SetAdminRequest, SubmitMessageRequest, SyncParams,
    MAX_PAGE_LIMIT,
};

pub use responses::{
    ChannelResponse, HealthChecks, HealthResponse, InboxEntryResponse, MemberResponse,
    MessageResponse, ReactionResponse, ReadinessResponse, ReadsResponse, RecallRecordResponse,
    SubmitMessageResponse, SyncResponse,
};
