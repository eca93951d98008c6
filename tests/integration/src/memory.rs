//! In-memory backends for engine tests
//!
//! `MemoryStore` mirrors the Postgres repositories row for row: the same
//! uniqueness rules, orderings, clamps, and single-transaction writes.
//! Presence, the half message log, and the event bus stand in for Redis.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use relay_core::traits::{
    ChannelRepository, EventPublisher, HalfMessageLog, InboxRepository, MembershipDirectory,
    MessageRepository, OfflineQueueRepository, PresenceDirectory, ReactionRepository,
    ReadReceiptRepository, RepoResult, SequenceRepository, SyncQuery,
};
use relay_core::entities::private_pair;
use relay_core::{
    Channel, ChannelMember, DomainError, HalfMessage, InboxEntry, MemberRole, Message,
    MessageCommittedEvent, MessageStatus, NewOfflineEntry, OfflineQueueEntry, Reaction,
    ReadReceipt, RecallRecord, Snowflake,
};
use tokio::sync::broadcast;

/// Failure injected into the next `insert_with_inbox`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFault {
    /// The transaction rolls back with a database error
    Fail,
    /// The transaction commits, then the caller never hears back
    CommitThenStall(Duration),
    /// The caller never hears back and nothing is written
    StallWithoutCommit(Duration),
    /// The caller never hears back; the commit lands after the delay even if
    /// the caller gives up first
    CommitAfter(Duration),
}

#[derive(Default)]
struct Tables {
    sequences: HashMap<Snowflake, i64>,
    messages: HashMap<Snowflake, Message>,
    /// (channel_id, seq_id) unique index
    seq_index: HashSet<(Snowflake, i64)>,
    inbox: Vec<InboxEntry>,
    offline: BTreeMap<i64, OfflineQueueEntry>,
    next_offline_id: i64,
    receipts: HashMap<(Snowflake, Snowflake), ReadReceipt>,
    channels: HashMap<Snowflake, Channel>,
    members: HashMap<(Snowflake, Snowflake), ChannelMember>,
    /// Ordered user pair to private channel id
    private_channels: HashMap<(Snowflake, Snowflake), Snowflake>,
    reactions: Vec<Reaction>,
    recalls: HashMap<Snowflake, RecallRecord>,
}

/// Every engine-owned table plus channel membership
#[derive(Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    write_fault: Mutex<Option<WriteFault>>,
    failing_lookups: Mutex<u32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `fault` to the next local write only
    pub fn inject_write_fault(&self, fault: WriteFault) {
        *self.write_fault.lock() = Some(fault);
    }

    /// Make the next `count` existence checks fail
    pub fn fail_lookups(&self, count: u32) {
        *self.failing_lookups.lock() = count;
    }

    pub fn message_count(&self, channel_id: Snowflake) -> usize {
        self.tables
            .lock()
            .messages
            .values()
            .filter(|m| m.channel_id == channel_id)
            .count()
    }

    pub fn member(&self, channel_id: Snowflake, user_id: Snowflake) -> Option<ChannelMember> {
        self.tables.lock().members.get(&(channel_id, user_id)).cloned()
    }

    pub fn offline_entries(&self) -> Vec<OfflineQueueEntry> {
        self.tables.lock().offline.values().cloned().collect()
    }

    fn write(&self, message: &Message, inbox: &[InboxEntry]) -> RepoResult<()> {
        write_rows(&mut self.tables.lock(), message, inbox)
    }
}

fn write_rows(t: &mut Tables, message: &Message, inbox: &[InboxEntry]) -> RepoResult<()> {
    if t.messages.contains_key(&message.id)
        || t.seq_index.contains(&(message.channel_id, message.seq_id))
    {
        return Err(DomainError::DatabaseError(format!(
            "duplicate key for message {} seq {}",
            message.id, message.seq_id
        )));
    }

    t.seq_index.insert((message.channel_id, message.seq_id));
    t.messages.insert(message.id, message.clone());
    t.inbox.extend(inbox.iter().cloned());

    for member in t.members.values_mut() {
        if member.channel_id == message.channel_id
            && member.is_active()
            && member.user_id != message.sender_id
        {
            member.unread_count += 1;
        }
    }
    Ok(())
}

// ============================================================================
// Sequences
// ============================================================================

#[async_trait]
impl SequenceRepository for MemoryStore {
    async fn next_seq(&self, channel_id: Snowflake) -> RepoResult<i64> {
        let mut t = self.tables.lock();
        let seq = t.sequences.entry(channel_id).or_insert(0);
        *seq += 1;
        Ok(*seq)
    }

    async fn current_seq(&self, channel_id: Snowflake) -> RepoResult<i64> {
        Ok(self.tables.lock().sequences.get(&channel_id).copied().unwrap_or(0))
    }

    async fn resync(&self, channel_id: Snowflake) -> RepoResult<i64> {
        let mut t = self.tables.lock();
        let max_timeline = t
            .messages
            .values()
            .filter(|m| m.channel_id == channel_id)
            .map(|m| m.seq_id)
            .max()
            .unwrap_or(0);
        let seq = t.sequences.entry(channel_id).or_insert(0);
        *seq = (*seq).max(max_timeline);
        Ok(*seq)
    }
}

// ============================================================================
// Timeline
// ============================================================================

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn insert_with_inbox(&self, message: &Message, inbox: &[InboxEntry]) -> RepoResult<()> {
        let fault = self.write_fault.lock().take();
        match fault {
            None => self.write(message, inbox),
            Some(WriteFault::Fail) => Err(DomainError::DatabaseError(
                "connection reset during commit".to_string(),
            )),
            Some(WriteFault::CommitThenStall(stall)) => {
                self.write(message, inbox)?;
                tokio::time::sleep(stall).await;
                Ok(())
            }
            Some(WriteFault::StallWithoutCommit(stall)) => {
                tokio::time::sleep(stall).await;
                Err(DomainError::DatabaseError("statement timeout".to_string()))
            }
            Some(WriteFault::CommitAfter(delay)) => {
                let tables = Arc::clone(&self.tables);
                let (message, inbox) = (message.clone(), inbox.to_vec());
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = write_rows(&mut tables.lock(), &message, &inbox);
                });
                std::future::pending().await
            }
        }
    }

    async fn exists(&self, message_id: Snowflake) -> RepoResult<bool> {
        {
            let mut failing = self.failing_lookups.lock();
            if *failing > 0 {
                *failing -= 1;
                return Err(DomainError::DatabaseError("pool timed out".to_string()));
            }
        }
        Ok(self.tables.lock().messages.contains_key(&message_id))
    }

    async fn find_by_id(&self, message_id: Snowflake) -> RepoResult<Option<Message>> {
        Ok(self.tables.lock().messages.get(&message_id).cloned())
    }

    async fn find_by_ids(&self, message_ids: &[Snowflake]) -> RepoResult<Vec<Message>> {
        let t = self.tables.lock();
        let mut found: Vec<Message> = message_ids
            .iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .filter_map(|id| t.messages.get(id).cloned())
            .collect();
        found.sort_by_key(|m| m.id);
        Ok(found)
    }

    async fn sync(&self, channel_id: Snowflake, query: SyncQuery) -> RepoResult<Vec<Message>> {
        let limit = query.limit.clamp(1, 100) as usize;
        let t = self.tables.lock();
        let mut rows: Vec<Message> = t
            .messages
            .values()
            .filter(|m| m.channel_id == channel_id && m.seq_id > query.cursor)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.seq_id);
        rows.truncate(limit);
        Ok(rows)
    }

    async fn update_status(
        &self,
        message_id: Snowflake,
        from: MessageStatus,
        to: MessageStatus,
    ) -> RepoResult<bool> {
        let mut t = self.tables.lock();
        match t.messages.get_mut(&message_id) {
            Some(message) if message.status == from => {
                message.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn recall(&self, record: &RecallRecord) -> RepoResult<bool> {
        let mut t = self.tables.lock();
        match t.messages.get_mut(&record.message_id) {
            Some(message) if message.status == MessageStatus::Normal => {
                message.status = MessageStatus::Recalled;
            }
            _ => return Ok(false),
        }
        t.recalls.insert(record.message_id, record.clone());
        Ok(true)
    }

    async fn find_recall(&self, message_id: Snowflake) -> RepoResult<Option<RecallRecord>> {
        Ok(self.tables.lock().recalls.get(&message_id).cloned())
    }

    async fn mentioning(
        &self,
        user_id: Snowflake,
        before: Option<Snowflake>,
        limit: i64,
    ) -> RepoResult<Vec<Message>> {
        let limit = limit.clamp(1, 100) as usize;
        let t = self.tables.lock();
        let mut rows: Vec<Message> = t
            .messages
            .values()
            .filter(|m| {
                m.status == MessageStatus::Normal
                    && m.mentioned_user_ids.contains(&user_id)
                    && before.map_or(true, |b| m.id < b)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        rows.truncate(limit);
        Ok(rows)
    }
}

// ============================================================================
// Inbox
// ============================================================================

#[async_trait]
impl InboxRepository for MemoryStore {
    async fn list_for_user(&self, user_id: Snowflake, limit: i64) -> RepoResult<Vec<InboxEntry>> {
        let limit = limit.clamp(1, 100) as usize;
        let t = self.tables.lock();
        let mut rows: Vec<InboxEntry> = t
            .inbox
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.message_id.cmp(&a.message_id))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    async fn find_by_message(&self, message_id: Snowflake) -> RepoResult<Vec<InboxEntry>> {
        let t = self.tables.lock();
        let mut rows: Vec<InboxEntry> = t
            .inbox
            .iter()
            .filter(|e| e.message_id == message_id)
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.user_id);
        Ok(rows)
    }
}

// ============================================================================
// Offline queue
// ============================================================================

#[async_trait]
impl OfflineQueueRepository for MemoryStore {
    async fn enqueue(&self, entry: &NewOfflineEntry) -> RepoResult<OfflineQueueEntry> {
        let mut t = self.tables.lock();
        t.next_offline_id += 1;
        let row = OfflineQueueEntry {
            id: t.next_offline_id,
            user_id: entry.user_id,
            message_id: entry.message_id,
            channel_id: entry.channel_id,
            priority: entry.priority,
            retry_count: 0,
            max_retry: entry.max_retry,
            next_retry_at: None,
            delivered: false,
            delivered_at: None,
            created_at: Utc::now(),
        };
        t.offline.insert(row.id, row.clone());
        Ok(row)
    }

    async fn pending_for_user(
        &self,
        user_id: Snowflake,
        now: DateTime<Utc>,
        limit: i64,
    ) -> RepoResult<Vec<OfflineQueueEntry>> {
        let limit = limit.clamp(1, 1000) as usize;
        let t = self.tables.lock();
        let mut rows: Vec<OfflineQueueEntry> = t
            .offline
            .values()
            .filter(|e| e.user_id == user_id && e.is_due(now))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn mark_delivered(&self, entry_id: i64, user_id: Snowflake) -> RepoResult<bool> {
        let mut t = self.tables.lock();
        match t.offline.get_mut(&entry_id) {
            Some(entry) if entry.user_id == user_id && !entry.delivered => {
                entry.delivered = true;
                entry.delivered_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_attempt(
        &self,
        entry_id: i64,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> RepoResult<()> {
        let mut t = self.tables.lock();
        if let Some(entry) = t.offline.get_mut(&entry_id).filter(|e| !e.delivered) {
            entry.retry_count += 1;
            entry.next_retry_at = next_retry_at;
        }
        Ok(())
    }

    async fn find_by_user(&self, user_id: Snowflake) -> RepoResult<Vec<OfflineQueueEntry>> {
        Ok(self
            .tables
            .lock()
            .offline
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }
}

// ============================================================================
// Read receipts
// ============================================================================

#[async_trait]
impl ReadReceiptRepository for MemoryStore {
    async fn mark_as_read(&self, receipt: &ReadReceipt, seq_id: i64) -> RepoResult<bool> {
        let mut t = self.tables.lock();
        let key = (receipt.message_id, receipt.user_id);
        let inserted = !t.receipts.contains_key(&key);
        if inserted {
            t.receipts.insert(key, receipt.clone());
        }

        if let Some(member) = t.members.get_mut(&(receipt.channel_id, receipt.user_id)) {
            member.unread_count = 0;
            member.last_read_seq = seq_id;
        }
        for entry in &mut t.inbox {
            if entry.user_id == receipt.user_id && entry.message_id == receipt.message_id {
                entry.is_read = true;
            }
        }
        Ok(inserted)
    }

    async fn count_reads(&self, message_id: Snowflake) -> RepoResult<i64> {
        let t = self.tables.lock();
        Ok(t.receipts.keys().filter(|(m, _)| *m == message_id).count() as i64)
    }

    async fn list_readers(&self, message_id: Snowflake, limit: i64) -> RepoResult<Vec<Snowflake>> {
        let limit = limit.clamp(1, 1000) as usize;
        let t = self.tables.lock();
        let mut readers: Vec<&ReadReceipt> = t
            .receipts
            .values()
            .filter(|r| r.message_id == message_id)
            .collect();
        readers.sort_by(|a, b| b.read_at.cmp(&a.read_at).then(a.user_id.cmp(&b.user_id)));
        Ok(readers.into_iter().take(limit).map(|r| r.user_id).collect())
    }
}

// ============================================================================
// Channels and membership
// ============================================================================

#[async_trait]
impl MembershipDirectory for MemoryStore {
    async fn find_channel(&self, channel_id: Snowflake) -> RepoResult<Option<Channel>> {
        Ok(self.tables.lock().channels.get(&channel_id).cloned())
    }

    async fn find_member(
        &self,
        channel_id: Snowflake,
        user_id: Snowflake,
    ) -> RepoResult<Option<ChannelMember>> {
        Ok(self
            .tables
            .lock()
            .members
            .get(&(channel_id, user_id))
            .filter(|m| m.is_active())
            .cloned())
    }

    async fn member_ids(&self, channel_id: Snowflake) -> RepoResult<Vec<Snowflake>> {
        let t = self.tables.lock();
        let mut ids: Vec<Snowflake> = t
            .members
            .values()
            .filter(|m| m.channel_id == channel_id && m.is_active())
            .map(|m| m.user_id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn live_member_count(&self, channel_id: Snowflake) -> RepoResult<i64> {
        let t = self.tables.lock();
        Ok(t.members
            .values()
            .filter(|m| m.channel_id == channel_id && m.is_active())
            .count() as i64)
    }

    async fn list_members(&self, channel_id: Snowflake) -> RepoResult<Vec<ChannelMember>> {
        let t = self.tables.lock();
        let mut members: Vec<ChannelMember> = t
            .members
            .values()
            .filter(|m| m.channel_id == channel_id && m.is_active())
            .cloned()
            .collect();
        members.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.user_id.cmp(&b.user_id)));
        Ok(members)
    }

    async fn channels_of(&self, user_id: Snowflake) -> RepoResult<Vec<Channel>> {
        let t = self.tables.lock();
        let mut channels: Vec<Channel> = t
            .members
            .values()
            .filter(|m| m.user_id == user_id && m.is_active())
            .filter_map(|m| t.channels.get(&m.channel_id).cloned())
            .collect();
        channels.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        Ok(channels)
    }

    async fn find_private_channel(
        &self,
        user_a: Snowflake,
        user_b: Snowflake,
    ) -> RepoResult<Option<Channel>> {
        let t = self.tables.lock();
        Ok(t.private_channels
            .get(&private_pair(user_a, user_b))
            .and_then(|id| t.channels.get(id))
            .cloned())
    }
}

#[async_trait]
impl ChannelRepository for MemoryStore {
    async fn create(&self, channel: &Channel, owner: &ChannelMember) -> RepoResult<()> {
        let mut t = self.tables.lock();
        if t.channels.contains_key(&channel.id) {
            return Err(DomainError::ValidationError(format!(
                "channel {} already exists",
                channel.id
            )));
        }
        let mut stored = channel.clone();
        stored.member_count = 1;
        t.channels.insert(channel.id, stored);
        t.members.insert((owner.channel_id, owner.user_id), owner.clone());
        Ok(())
    }

    async fn add_member(&self, member: &ChannelMember) -> RepoResult<()> {
        let mut t = self.tables.lock();
        let key = (member.channel_id, member.user_id);

        let channel = t
            .channels
            .get(&member.channel_id)
            .ok_or(DomainError::ChannelNotFound(member.channel_id))?;
        if !channel.is_active() {
            return Err(DomainError::ChannelInactive);
        }
        if t.members.get(&key).is_some_and(ChannelMember::is_active) {
            return Err(DomainError::AlreadyMember);
        }
        if !channel.has_capacity() {
            return Err(DomainError::ChannelFull {
                max: channel.max_members,
            });
        }

        t.members.insert(key, member.clone());
        if let Some(channel) = t.channels.get_mut(&member.channel_id) {
            channel.member_count += 1;
            channel.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn remove_member(&self, channel_id: Snowflake, user_id: Snowflake) -> RepoResult<()> {
        let mut t = self.tables.lock();
        match t.members.get_mut(&(channel_id, user_id)) {
            Some(member) if member.is_active() => member.left_at = Some(Utc::now()),
            _ => return Err(DomainError::MemberNotFound),
        }
        if let Some(channel) = t.channels.get_mut(&channel_id) {
            channel.member_count = (channel.member_count - 1).max(0);
            channel.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn create_private(
        &self,
        channel: &Channel,
        members: &[ChannelMember; 2],
    ) -> RepoResult<Channel> {
        let mut t = self.tables.lock();
        let pair = private_pair(members[0].user_id, members[1].user_id);
        if let Some(existing) = t.private_channels.get(&pair).and_then(|id| t.channels.get(id)) {
            return Ok(existing.clone());
        }
        if t.channels.contains_key(&channel.id) {
            return Err(DomainError::ValidationError(format!(
                "channel {} already exists",
                channel.id
            )));
        }

        let mut stored = channel.clone();
        stored.member_count = 2;
        t.channels.insert(channel.id, stored.clone());
        t.private_channels.insert(pair, channel.id);
        for member in members {
            t.members.insert((member.channel_id, member.user_id), member.clone());
        }
        Ok(stored)
    }

    async fn set_role(
        &self,
        channel_id: Snowflake,
        user_id: Snowflake,
        role: MemberRole,
    ) -> RepoResult<()> {
        match self.tables.lock().members.get_mut(&(channel_id, user_id)) {
            Some(member) if member.is_active() => {
                member.role = role;
                Ok(())
            }
            _ => Err(DomainError::MemberNotFound),
        }
    }
}

// ============================================================================
// Reactions
// ============================================================================

#[async_trait]
impl ReactionRepository for MemoryStore {
    async fn add(&self, reaction: &Reaction) -> RepoResult<bool> {
        let mut t = self.tables.lock();
        let exists = t.reactions.iter().any(|r| {
            r.message_id == reaction.message_id
                && r.user_id == reaction.user_id
                && r.emoji == reaction.emoji
        });
        if !exists {
            t.reactions.push(reaction.clone());
        }
        Ok(!exists)
    }

    async fn remove(
        &self,
        message_id: Snowflake,
        user_id: Snowflake,
        emoji: &str,
    ) -> RepoResult<bool> {
        let mut t = self.tables.lock();
        let before = t.reactions.len();
        t.reactions
            .retain(|r| !(r.message_id == message_id && r.user_id == user_id && r.emoji == emoji));
        Ok(t.reactions.len() < before)
    }

    async fn list_for_message(&self, message_id: Snowflake) -> RepoResult<Vec<Reaction>> {
        let t = self.tables.lock();
        let mut rows: Vec<Reaction> = t
            .reactions
            .iter()
            .filter(|r| r.message_id == message_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.user_id.cmp(&b.user_id)));
        Ok(rows)
    }
}

// ============================================================================
// Presence
// ============================================================================

/// Nodes holding a session per user
#[derive(Default)]
pub struct MemoryPresence {
    nodes: Mutex<HashMap<Snowflake, HashSet<String>>>,
}

impl MemoryPresence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresenceDirectory for MemoryPresence {
    async fn mark_online(&self, user_id: Snowflake, node_id: &str) -> RepoResult<()> {
        self.nodes
            .lock()
            .entry(user_id)
            .or_default()
            .insert(node_id.to_string());
        Ok(())
    }

    async fn mark_offline(&self, user_id: Snowflake, node_id: &str) -> RepoResult<()> {
        let mut nodes = self.nodes.lock();
        if let Some(set) = nodes.get_mut(&user_id) {
            set.remove(node_id);
            if set.is_empty() {
                nodes.remove(&user_id);
            }
        }
        Ok(())
    }

    async fn is_online(&self, user_id: Snowflake) -> RepoResult<bool> {
        Ok(self.nodes.lock().contains_key(&user_id))
    }
}

// ============================================================================
// Half message log
// ============================================================================

#[derive(Default)]
struct HalfEntries {
    pending: HashMap<Snowflake, HalfMessage>,
    /// Lease start per entry being published
    leases: HashMap<Snowflake, DateTime<Utc>>,
}

#[derive(Default)]
pub struct MemoryHalfLog {
    entries: Mutex<HalfEntries>,
    failing_prepares: Mutex<u32>,
}

impl MemoryHalfLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, message_id: Snowflake) -> bool {
        self.entries.lock().pending.contains_key(&message_id)
    }

    pub fn is_leased(&self, message_id: Snowflake) -> bool {
        self.entries.lock().leases.contains_key(&message_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().pending.is_empty()
    }

    /// Make the next `count` prepares fail
    pub fn fail_prepares(&self, count: u32) {
        *self.failing_prepares.lock() = count;
    }
}

#[async_trait]
impl HalfMessageLog for MemoryHalfLog {
    async fn prepare(&self, half: &HalfMessage) -> RepoResult<()> {
        {
            let mut failing = self.failing_prepares.lock();
            if *failing > 0 {
                *failing -= 1;
                return Err(DomainError::CacheError("redis down".to_string()));
            }
        }
        self.entries
            .lock()
            .pending
            .insert(half.message_id(), half.clone());
        Ok(())
    }

    async fn claim(
        &self,
        message_id: Snowflake,
        expired_before: DateTime<Utc>,
    ) -> RepoResult<bool> {
        let mut entries = self.entries.lock();
        if !entries.pending.contains_key(&message_id) {
            return Ok(false);
        }
        if entries
            .leases
            .get(&message_id)
            .is_some_and(|&leased_at| leased_at >= expired_before)
        {
            return Ok(false);
        }
        entries.leases.insert(message_id, Utc::now());
        Ok(true)
    }

    async fn release(&self, message_id: Snowflake) -> RepoResult<()> {
        self.entries.lock().leases.remove(&message_id);
        Ok(())
    }

    async fn complete(&self, message_id: Snowflake) -> RepoResult<bool> {
        let mut entries = self.entries.lock();
        entries.leases.remove(&message_id);
        Ok(entries.pending.remove(&message_id).is_some())
    }

    async fn stale(&self, cutoff: DateTime<Utc>) -> RepoResult<Vec<HalfMessage>> {
        let mut stale: Vec<HalfMessage> = self
            .entries
            .lock()
            .pending
            .values()
            .filter(|h| h.is_stale(cutoff))
            .cloned()
            .collect();
        stale.sort_by_key(|h| h.prepared_at);
        Ok(stale)
    }
}

// ============================================================================
// Event bus
// ============================================================================

/// Broadcast bus every gateway node subscribes to
pub struct MemoryBus {
    sender: broadcast::Sender<MessageCommittedEvent>,
    published: Mutex<Vec<Snowflake>>,
    failures: Mutex<u32>,
    hangs: Mutex<u32>,
}

impl MemoryBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            published: Mutex::new(Vec::new()),
            failures: Mutex::new(0),
            hangs: Mutex::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MessageCommittedEvent> {
        self.sender.subscribe()
    }

    /// Make the next `count` publishes fail
    pub fn fail_publishes(&self, count: u32) {
        *self.failures.lock() = count;
    }

    /// Make the next `count` publishes never return, as if the broker
    /// connection froze
    pub fn hang_publishes(&self, count: u32) {
        *self.hangs.lock() = count;
    }

    /// Message ids in publish order, one per publish
    pub fn published(&self) -> Vec<Snowflake> {
        self.published.lock().clone()
    }

    pub fn publish_count(&self, message_id: Snowflake) -> usize {
        self.published
            .lock()
            .iter()
            .filter(|&&id| id == message_id)
            .count()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventPublisher for MemoryBus {
    async fn publish(&self, event: &MessageCommittedEvent) -> RepoResult<u32> {
        {
            let mut failures = self.failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(DomainError::CacheError("broker unavailable".to_string()));
            }
        }
        let hang = {
            let mut hangs = self.hangs.lock();
            let hang = *hangs > 0;
            *hangs = hangs.saturating_sub(1);
            hang
        };
        if hang {
            return std::future::pending().await;
        }
        self.published.lock().push(event.message_id);
        // No subscribers is not an error
        let receivers = self.sender.send(event.clone()).unwrap_or(0);
        Ok(receivers as u32)
    }
}
