//! Business logic services
//!
//! The delivery engine (sequencer, fan-out decision, transactional writer,
//! publish pipeline, reconciler, offline queue) and the use-case services
//! built on it.

pub mod channel;
pub mod context;
pub mod error;
pub mod fanout;
pub mod message;
pub mod moderation;
pub mod offline;
pub mod publish;
pub mod reaction;
pub mod read_state;
pub mod reconciler;
pub mod sequencer;
pub mod writer;

// Re-export all services for convenience
pub use channel::ChannelService;
pub use context::{EngineSettings, ServiceContext, ServiceContextBuilder};
pub use error::{ServiceError, ServiceResult};
pub use fanout::{FanoutDecider, FanoutDecision};
pub use message::MessageService;
pub use moderation::{AllowAll, KeywordModeration};
pub use offline::{DrainReport, OfflineQueueService, OfflineSink};
pub use publish::{DeliveryHandle, DeliveryOutcome, PublishPipeline};
pub use reaction::ReactionService;
pub use read_state::ReadStateService;
pub use reconciler::{run_reconciler, ReconcileReport, Reconciler};
pub use sequencer::SequencerService;
pub use writer::TransactionalWriter;
