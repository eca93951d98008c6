//! Service context - dependency container for services
//!
//! Holds every repository and collaborator behind a trait object, plus the
//! id generator and engine settings. Binaries wire in the Postgres/Redis
//! implementations; tests wire in in-memory ones.

use std::sync::Arc;
use std::time::Duration;

use relay_common::AppConfig;
use relay_core::traits::{
    ChannelRepository, EventPublisher, HalfMessageLog, InboxRepository, MembershipDirectory,
    MessageRepository, ModerationPolicy, OfflineQueueRepository, PresenceDirectory,
    ReactionRepository, ReadReceiptRepository, SequenceRepository,
};
use relay_core::{RetryPolicy, Snowflake, SnowflakeGenerator, DEFAULT_READ_FANOUT_THRESHOLD};

use super::error::{ServiceError, ServiceResult};

/// Tunables of the delivery engine
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Live member count at which sends use read fan-out
    pub read_threshold: i64,
    /// Time allowed for the local write before its outcome counts as unknown
    pub local_write_timeout: Duration,
    pub check_state_attempts: u32,
    /// Delay before the n-th check_state retry is `n * check_state_backoff`
    pub check_state_backoff: Duration,
    /// Half messages older than this are resolved by the reconciler
    pub reconcile_stale_after: Duration,
    /// A publishing lease older than this may be taken over
    pub publish_lease: Duration,
    /// Pause before check_state on a write whose outcome was lost, so a
    /// commit already in flight can land first
    pub unknown_settle: Duration,
    pub offline_max_retry: i32,
    pub retry_policy: RetryPolicy,
    pub drain_batch_size: i64,
    /// Pushed offline entries become due again if unacknowledged this long
    pub ack_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            read_threshold: DEFAULT_READ_FANOUT_THRESHOLD,
            local_write_timeout: Duration::from_secs(5),
            check_state_attempts: 3,
            check_state_backoff: Duration::from_millis(200),
            reconcile_stale_after: Duration::from_secs(30),
            publish_lease: Duration::from_secs(30),
            unknown_settle: Duration::from_secs(1),
            offline_max_retry: 5,
            retry_policy: RetryPolicy::default(),
            drain_batch_size: 100,
            ack_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            read_threshold: config.fanout.read_threshold,
            local_write_timeout: config.delivery.local_write_timeout(),
            check_state_attempts: config.delivery.check_state_attempts.max(1),
            reconcile_stale_after: config.delivery.reconcile_stale_after(),
            publish_lease: config.delivery.publish_lease(),
            unknown_settle: config.delivery.unknown_settle(),
            offline_max_retry: config.offline.max_retry,
            retry_policy: RetryPolicy::new(
                config.offline.base_backoff(),
                config.offline.max_backoff(),
            ),
            drain_batch_size: config.offline.drain_batch_size,
            ack_timeout: config.offline.ack_timeout(),
            ..Self::default()
        }
    }
}

/// Service context containing all dependencies
///
/// Cheap to clone; post-commit work takes an owned clone into its task.
#[derive(Clone)]
pub struct ServiceContext {
    // Storage owned by the engine
    sequence_repo: Arc<dyn SequenceRepository>,
    message_repo: Arc<dyn MessageRepository>,
    inbox_repo: Arc<dyn InboxRepository>,
    offline_repo: Arc<dyn OfflineQueueRepository>,
    receipt_repo: Arc<dyn ReadReceiptRepository>,
    reaction_repo: Arc<dyn ReactionRepository>,

    // Membership collaborator
    membership: Arc<dyn MembershipDirectory>,
    channel_repo: Arc<dyn ChannelRepository>,

    // Delivery plumbing
    presence: Arc<dyn PresenceDirectory>,
    half_log: Arc<dyn HalfMessageLog>,
    publisher: Arc<dyn EventPublisher>,

    moderation: Arc<dyn ModerationPolicy>,
    snowflake_generator: Arc<SnowflakeGenerator>,
    settings: Arc<EngineSettings>,
}

impl ServiceContext {
    /// Start building a context
    pub fn builder() -> ServiceContextBuilder {
        ServiceContextBuilder::new()
    }

    // === Storage ===

    pub fn sequence_repo(&self) -> &dyn SequenceRepository {
        self.sequence_repo.as_ref()
    }

    pub fn message_repo(&self) -> &dyn MessageRepository {
        self.message_repo.as_ref()
    }

    pub fn inbox_repo(&self) -> &dyn InboxRepository {
        self.inbox_repo.as_ref()
    }

    pub fn offline_repo(&self) -> &dyn OfflineQueueRepository {
        self.offline_repo.as_ref()
    }

    pub fn receipt_repo(&self) -> &dyn ReadReceiptRepository {
        self.receipt_repo.as_ref()
    }

    pub fn reaction_repo(&self) -> &dyn ReactionRepository {
        self.reaction_repo.as_ref()
    }

    // === Membership ===

    pub fn membership(&self) -> &dyn MembershipDirectory {
        self.membership.as_ref()
    }

    pub fn channel_repo(&self) -> &dyn ChannelRepository {
        self.channel_repo.as_ref()
    }

    // === Delivery ===

    pub fn presence(&self) -> &dyn PresenceDirectory {
        self.presence.as_ref()
    }

    pub fn half_log(&self) -> &dyn HalfMessageLog {
        self.half_log.as_ref()
    }

    pub fn publisher(&self) -> &dyn EventPublisher {
        self.publisher.as_ref()
    }

    /// Shared handle to the message repository, for spawned local writes
    pub(crate) fn message_repo_arc(&self) -> Arc<dyn MessageRepository> {
        Arc::clone(&self.message_repo)
    }

    pub fn moderation(&self) -> &dyn ModerationPolicy {
        self.moderation.as_ref()
    }

    pub fn settings(&self) -> &EngineSettings {
        self.settings.as_ref()
    }

    /// Generate a new Snowflake ID
    pub fn generate_id(&self) -> Snowflake {
        self.snowflake_generator.generate()
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("repositories", &"...")
            .field("worker_id", &self.snowflake_generator.worker_id())
            .field("settings", &self.settings)
            .finish()
    }
}

/// Builder for creating ServiceContext with custom configuration
#[derive(Default)]
pub struct ServiceContextBuilder {
    sequence_repo: Option<Arc<dyn SequenceRepository>>,
    message_repo: Option<Arc<dyn MessageRepository>>,
    inbox_repo: Option<Arc<dyn InboxRepository>>,
    offline_repo: Option<Arc<dyn OfflineQueueRepository>>,
    receipt_repo: Option<Arc<dyn ReadReceiptRepository>>,
    reaction_repo: Option<Arc<dyn ReactionRepository>>,
    membership: Option<Arc<dyn MembershipDirectory>>,
    channel_repo: Option<Arc<dyn ChannelRepository>>,
    presence: Option<Arc<dyn PresenceDirectory>>,
    half_log: Option<Arc<dyn HalfMessageLog>>,
    publisher: Option<Arc<dyn EventPublisher>>,
    moderation: Option<Arc<dyn ModerationPolicy>>,
    snowflake_generator: Option<Arc<SnowflakeGenerator>>,
    settings: Option<EngineSettings>,
}

impl ServiceContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sequence_repo(mut self, repo: Arc<dyn SequenceRepository>) -> Self {
        self.sequence_repo = Some(repo);
        self
    }

    pub fn message_repo(mut self, repo: Arc<dyn MessageRepository>) -> Self {
        self.message_repo = Some(repo);
        self
    }

    pub fn inbox_repo(mut self, repo: Arc<dyn InboxRepository>) -> Self {
        self.inbox_repo = Some(repo);
        self
    }

    pub fn offline_repo(mut self, repo: Arc<dyn OfflineQueueRepository>) -> Self {
        self.offline_repo = Some(repo);
        self
    }

    pub fn receipt_repo(mut self, repo: Arc<dyn ReadReceiptRepository>) -> Self {
        self.receipt_repo = Some(repo);
        self
    }

    pub fn reaction_repo(mut self, repo: Arc<dyn ReactionRepository>) -> Self {
        self.reaction_repo = Some(repo);
        self
    }

    pub fn membership(mut self, directory: Arc<dyn MembershipDirectory>) -> Self {
        self.membership = Some(directory);
        self
    }

    pub fn channel_repo(mut self, repo: Arc<dyn ChannelRepository>) -> Self {
        self.channel_repo = Some(repo);
        self
    }

    pub fn presence(mut self, presence: Arc<dyn PresenceDirectory>) -> Self {
        self.presence = Some(presence);
        self
    }

    pub fn half_log(mut self, log: Arc<dyn HalfMessageLog>) -> Self {
        self.half_log = Some(log);
        self
    }

    pub fn publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn moderation(mut self, policy: Arc<dyn ModerationPolicy>) -> Self {
        self.moderation = Some(policy);
        self
    }

    pub fn snowflake_generator(mut self, generator: Arc<SnowflakeGenerator>) -> Self {
        self.snowflake_generator = Some(generator);
        self
    }

    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Build the ServiceContext
    ///
    /// # Errors
    /// Returns `ServiceError::Validation` if any required dependency is missing
    pub fn build(self) -> ServiceResult<ServiceContext> {
        fn required<T>(value: Option<T>, name: &str) -> ServiceResult<T> {
            value.ok_or_else(|| ServiceError::validation(format!("{name} is required")))
        }

        Ok(ServiceContext {
            sequence_repo: required(self.sequence_repo, "sequence_repo")?,
            message_repo: required(self.message_repo, "message_repo")?,
            inbox_repo: required(self.inbox_repo, "inbox_repo")?,
            offline_repo: required(self.offline_repo, "offline_repo")?,
            receipt_repo: required(self.receipt_repo, "receipt_repo")?,
            reaction_repo: required(self.reaction_repo, "reaction_repo")?,
            membership: required(self.membership, "membership")?,
            channel_repo: required(self.channel_repo, "channel_repo")?,
            presence: required(self.presence, "presence")?,
            half_log: required(self.half_log, "half_log")?,
            publisher: required(self.publisher, "publisher")?,
            moderation: self
                .moderation
                .unwrap_or_else(|| Arc::new(super::moderation::AllowAll)),
            snowflake_generator: self
                .snowflake_generator
                .unwrap_or_else(|| Arc::new(SnowflakeGenerator::default())),
            settings: Arc::new(self.settings.unwrap_or_default()),
        })
    }
}
