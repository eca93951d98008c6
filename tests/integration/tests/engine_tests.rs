//! Engine integration tests
//!
//! End-to-end runs of the delivery engine over in-memory storage: submit,
//! fan-out, transactional publish, routing across gateway nodes, offline
//! replay, reconciliation, and read state. No external services needed.
//!
//! Run with: cargo test -p integration-tests --test engine_tests

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use integration_tests::{text_request, Harness, WriteFault};
use relay_core::traits::{
    HalfMessageLog, InboxRepository, MessageRepository, PresenceDirectory, SequenceRepository,
};
use relay_core::{
    DomainError, FanoutMode, HalfMessage, InboxEntry, Message, MessageCommittedEvent,
    MessageContent, MessageStatus, OfflineQueueEntry, Snowflake, DEFAULT_PRIORITY,
    MENTION_PRIORITY,
};
use relay_gateway::handlers::offline::{drain_to, sweep};
use relay_gateway::protocol::PushCommand;
use relay_service::{
    DeliveryOutcome, KeywordModeration, MessageService, OfflineQueueService, OfflineSink,
    ReadStateService, Reconciler, SequencerService, ServiceError, SyncParams,
    TransactionalWriter,
};

fn sync_all() -> SyncParams {
    SyncParams {
        cursor: 0,
        limit: Some(100),
    }
}

fn persistence_failed(err: &ServiceError) -> bool {
    matches!(err.as_domain(), Some(DomainError::PersistenceFailure(_)))
}

async fn wait_offline(h: &Harness, user_id: Snowflake) {
    for _ in 0..100 {
        if !h.presence.is_online(user_id).await.unwrap() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("presence of {user_id} was never cleared");
}

// ============================================================================
// Cross-node delivery
// ============================================================================

#[tokio::test]
async fn test_two_member_channel_across_nodes() {
    let h = Harness::new();
    let [u1, u2] = h.users(2)[..] else { unreachable!() };
    let channel = h.channel_with(u1, &[u2]).await;

    let p = h.node("node-p");
    let q = h.node("node-q");
    let mut c1 = p.connect(u1).await;
    let mut c2 = q.connect(u2).await;

    let (response, delivery) = h.send(channel, u1, text_request("hi")).await.unwrap();
    assert_eq!(response.seq_id, 1);
    assert_eq!(response.fanout_mode, FanoutMode::WriteFanout);

    // Timeline and inbox are written before submit returns
    let stored = h.store.find_by_id(response.message_id).await.unwrap().unwrap();
    assert_eq!(stored.seq_id, 1);
    let inbox = h.store.find_by_message(response.message_id).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].user_id, u2);

    let outcome = delivery.unwrap().await.unwrap();
    assert_eq!(
        outcome,
        DeliveryOutcome::Published {
            subscribers: 2,
            queued: 0
        }
    );

    let push = c2.next_push().await.expect("u2 receives the message on node q");
    assert_eq!(push.command(), PushCommand::MsgPush);
    let body = push.body.unwrap();
    assert_eq!(body.message_id, response.message_id.into_inner());
    assert_eq!(body.seq_id, 1);

    let ack = c1.next_push().await.expect("sender is acked on node p");
    assert_eq!(ack.command(), PushCommand::MsgAck);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(c1.queued_pushes().is_empty());
    assert!(c2.queued_pushes().is_empty());
    assert!(h.store.offline_entries().is_empty());

    p.stop().await;
    q.stop().await;
}

#[tokio::test]
async fn test_large_channel_uses_read_fanout() {
    let h = Harness::new();
    let members = h.users(600);
    let sender = members[0];
    let channel = h.channel_with(sender, &members).await;
    let mut events = h.bus.subscribe();

    let (response, outcome) = h.send_text(channel, sender, "announcement").await;
    assert_eq!(response.fanout_mode, FanoutMode::ReadFanout);
    assert_eq!(
        outcome,
        DeliveryOutcome::Published {
            subscribers: 1,
            queued: 0
        }
    );

    assert!(h.store.find_by_message(response.message_id).await.unwrap().is_empty());
    assert!(h.store.offline_entries().is_empty());

    let event = events.recv().await.unwrap();
    assert_eq!(event.message_id, response.message_id);
    assert!(event.receiver_ids.is_none());

    let page = MessageService::new(&h.ctx)
        .sync(channel, members[599], sync_all())
        .await
        .unwrap();
    assert_eq!(page.messages.len(), 1);
    assert_eq!(page.messages[0].id, response.message_id);
    assert_eq!(page.next_cursor, response.seq_id);
}

#[tokio::test]
async fn test_fanout_threshold_boundary() {
    let h = Harness::new();
    let members = h.users(500);
    let owner = members[0];
    let channel = h.channel_with(owner, &members[..499]).await;

    let (below, _) = h.send_text(channel, owner, "499 members").await;
    assert_eq!(below.fanout_mode, FanoutMode::WriteFanout);
    assert_eq!(
        h.store.find_by_message(below.message_id).await.unwrap().len(),
        498
    );

    relay_service::ChannelService::new(&h.ctx)
        .add_member(channel, owner, members[499], relay_core::MemberRole::Member)
        .await
        .unwrap();

    let (at, _) = h.send_text(channel, owner, "500 members").await;
    assert_eq!(at.fanout_mode, FanoutMode::ReadFanout);
    assert!(h.store.find_by_message(at.message_id).await.unwrap().is_empty());
}

// ============================================================================
// Offline queue
// ============================================================================

#[tokio::test]
async fn test_offline_member_is_queued_and_drained_on_reconnect() {
    let h = Harness::new();
    let [u1, u2] = h.users(2)[..] else { unreachable!() };
    let channel = h.channel_with(u1, &[u2]).await;

    let p = h.node("node-p");
    let q = h.node("node-q");
    let _c1 = p.connect(u1).await;

    let (response, outcome) = h.send_text(channel, u1, "are you there?").await;
    assert_eq!(
        outcome,
        DeliveryOutcome::Published {
            subscribers: 2,
            queued: 1
        }
    );

    let queue = OfflineQueueService::new(&h.ctx);
    let entries = queue.entries_for_user(u2).await.unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.message_id, response.message_id);
    assert!(!entry.delivered);
    assert_eq!(entry.retry_count, 0);
    assert_eq!(entry.priority, DEFAULT_PRIORITY);

    let mut c2 = q.connect(u2).await;
    let report = drain_to(&h.ctx, u2, c2.connection.clone()).await.unwrap();
    assert_eq!(report.pushed, 1);

    let push = c2.next_push().await.expect("queued message replayed");
    assert_eq!(push.command(), PushCommand::OfflinePush);
    assert_eq!(push.body.unwrap().entry_id, entry.id);

    // Pushed but not yet acknowledged
    let entries = queue.entries_for_user(u2).await.unwrap();
    assert!(!entries[0].delivered);
    assert_eq!(entries[0].retry_count, 1);
    assert!(entries[0].next_retry_at.is_some());

    assert!(!queue.acknowledge(u1, entry.id).await.unwrap());
    assert!(queue.acknowledge(u2, entry.id).await.unwrap());
    assert!(!queue.acknowledge(u2, entry.id).await.unwrap());

    let entries = queue.entries_for_user(u2).await.unwrap();
    assert!(entries[0].delivered);
    assert!(entries[0].delivered_at.is_some());

    // Nothing left to replay
    let again = drain_to(&h.ctx, u2, c2.connection.clone()).await.unwrap();
    assert_eq!(again.pushed, 0);

    p.stop().await;
    q.stop().await;
}

#[tokio::test]
async fn test_unacknowledged_push_is_replayed_after_ack_timeout() {
    let h = Harness::new();
    let [u1, u2] = h.users(2)[..] else { unreachable!() };
    let channel = h.channel_with(u1, &[u2]).await;
    h.send_text(channel, u1, "did you get this?").await;

    let node = h.node("node-q");
    let mut c2 = node.connect(u2).await;
    let first = drain_to(&h.ctx, u2, c2.connection.clone()).await.unwrap();
    assert_eq!(first.pushed, 1);
    let entry_id = c2.next_push().await.unwrap().body.unwrap().entry_id;

    // Not due again until the ack timeout runs out
    let early = drain_to(&h.ctx, u2, c2.connection.clone()).await.unwrap();
    assert_eq!(early.pushed, 0);

    tokio::time::sleep(h.ctx.settings().ack_timeout + Duration::from_millis(30)).await;
    let replay = drain_to(&h.ctx, u2, c2.connection.clone()).await.unwrap();
    assert_eq!(replay.pushed, 1);
    assert_eq!(c2.next_push().await.unwrap().body.unwrap().entry_id, entry_id);

    let entries = OfflineQueueService::new(&h.ctx)
        .entries_for_user(u2)
        .await
        .unwrap();
    assert_eq!(entries[0].retry_count, 2);
    assert!(!entries[0].delivered);

    node.stop().await;
}

#[tokio::test]
async fn test_sweep_does_not_wait_on_a_stalled_session() {
    let h = Harness::new();
    let [u1, slow, fast] = h.users(3)[..] else { unreachable!() };
    let channel = h.channel_with(u1, &[slow, fast]).await;
    for text in ["one", "two", "three"] {
        h.send_text(channel, u1, text).await;
    }

    let node = h.node("node-q");
    // Room for one frame and nobody reading it
    let _stalled = node.connect_with_buffer(slow, 1).await;
    let mut reader = node.connect(fast).await;

    let pushed = tokio::time::timeout(Duration::from_secs(1), sweep(&h.ctx, &node.registry))
        .await
        .expect("sweep finished despite the full queue");
    assert_eq!(pushed, 4);
    assert_eq!(reader.queued_pushes().len(), 3);

    let entries = OfflineQueueService::new(&h.ctx)
        .entries_for_user(slow)
        .await
        .unwrap();
    assert!(entries.iter().all(|e| e.retry_count == 1 && !e.delivered));

    node.stop().await;
}

#[tokio::test]
async fn test_disconnect_clears_presence_and_queues_later_messages() {
    let h = Harness::new();
    let [u1, u2] = h.users(2)[..] else { unreachable!() };
    let channel = h.channel_with(u1, &[u2]).await;

    let q = h.node("node-q");
    let mut c2 = q.connect(u2).await;
    assert!(h.presence.is_online(u2).await.unwrap());

    c2.disconnect();
    wait_offline(&h, u2).await;
    assert!(q.registry.lookup(u2).is_none());

    let (_, outcome) = h.send_text(channel, u1, "missed you").await;
    assert!(matches!(outcome, DeliveryOutcome::Published { queued: 1, .. }));

    q.stop().await;
}

#[tokio::test]
async fn test_offline_drain_pushes_mentions_first() {
    let h = Harness::new();
    let [u1, u2] = h.users(2)[..] else { unreachable!() };
    let channel = h.channel_with(u1, &[u2]).await;

    let (plain, _) = h.send_text(channel, u1, "plain").await;
    let mut request = text_request("hey you");
    request.mentioned_user_ids = vec![u2, u2];
    let (mention, delivery) = h.send(channel, u1, request).await.unwrap();
    delivery.unwrap().await.unwrap();

    let stored = h.store.find_by_id(mention.message_id).await.unwrap().unwrap();
    assert_eq!(stored.mentioned_user_ids, vec![u2]);

    let node = h.node("node-q");
    let mut c2 = node.connect(u2).await;
    drain_to(&h.ctx, u2, c2.connection.clone()).await.unwrap();

    let first = c2.next_push().await.unwrap().body.unwrap();
    let second = c2.next_push().await.unwrap().body.unwrap();
    assert_eq!(first.message_id, mention.message_id.into_inner());
    assert_eq!(second.message_id, plain.message_id.into_inner());

    let entries = OfflineQueueService::new(&h.ctx)
        .entries_for_user(u2)
        .await
        .unwrap();
    let mention_entry = entries
        .iter()
        .find(|e| e.message_id == mention.message_id)
        .unwrap();
    assert_eq!(mention_entry.priority, MENTION_PRIORITY);

    node.stop().await;
}

struct RefusingSink;

#[async_trait]
impl OfflineSink for RefusingSink {
    async fn push(&self, _entry: &OfflineQueueEntry, _message: &Message) -> bool {
        false
    }
}

#[tokio::test]
async fn test_exhausted_entries_are_retained_without_next_attempt() {
    let h = Harness::new();
    let [u1, u2] = h.users(2)[..] else { unreachable!() };
    let channel = h.channel_with(u1, &[u2]).await;
    h.send_text(channel, u1, "undeliverable").await;

    let queue = OfflineQueueService::new(&h.ctx);
    let max_retry = h.ctx.settings().offline_max_retry;

    // Each failed push reschedules until max_retry is exceeded
    for attempt in 0..=max_retry {
        let report = queue.drain(u2, &RefusingSink).await.unwrap();
        assert_eq!(report.failed, 1, "attempt {attempt} should be due");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let report = queue.drain(u2, &RefusingSink).await.unwrap();
    assert_eq!(report.failed, 0);
    assert_eq!(report.pushed, 0);

    let entries = queue.entries_for_user(u2).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].delivered);
    assert!(entries[0].is_exhausted());
    assert_eq!(entries[0].next_retry_at, None);
}

#[tokio::test]
async fn test_recalled_message_is_skipped_on_drain() {
    let h = Harness::new();
    let [u1, u2] = h.users(2)[..] else { unreachable!() };
    let channel = h.channel_with(u1, &[u2]).await;

    let (response, _) = h.send_text(channel, u1, "oops").await;
    MessageService::new(&h.ctx)
        .recall(channel, response.message_id, u1, None)
        .await
        .unwrap();

    let node = h.node("node-q");
    let mut c2 = node.connect(u2).await;
    let report = drain_to(&h.ctx, u2, c2.connection.clone()).await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.pushed, 0);
    assert!(c2.queued_pushes().is_empty());

    node.stop().await;
}

// ============================================================================
// Sequencing
// ============================================================================

#[tokio::test]
async fn test_concurrent_senders_get_distinct_ordered_seqs() {
    let h = Harness::new();
    let [u1, u2] = h.users(2)[..] else { unreachable!() };
    let channel = h.channel_with(u1, &[u2]).await;

    let (a, b) = tokio::join!(
        h.send(channel, u1, text_request("from u1")),
        h.send(channel, u2, text_request("from u2")),
    );
    let mut seqs = vec![a.unwrap().0.seq_id, b.unwrap().0.seq_id];
    seqs.sort_unstable();
    assert_eq!(seqs, vec![1, 2]);

    assert_eq!(h.store.message_count(channel), 2);
    let page = MessageService::new(&h.ctx)
        .sync(channel, u1, sync_all())
        .await
        .unwrap();
    let synced: Vec<i64> = page.messages.iter().map(|m| m.seq_id).collect();
    assert_eq!(synced, vec![1, 2]);
}

#[tokio::test]
async fn test_seq_ids_are_gap_free_under_contention() {
    let h = Harness::new();
    let members = h.users(8);
    let channel = h.channel_with(members[0], &members).await;

    let mut tasks = Vec::new();
    for i in 0..40 {
        let ctx = h.ctx.clone();
        let sender = members[i % members.len()];
        tasks.push(tokio::spawn(async move {
            MessageService::new(&ctx)
                .submit(channel, sender, text_request(&format!("message {i}")))
                .await
                .map(|r| r.seq_id)
        }));
    }

    let mut seqs = Vec::new();
    for task in tasks {
        seqs.push(task.await.unwrap().unwrap());
    }
    seqs.sort_unstable();
    assert_eq!(seqs, (1..=40).collect::<Vec<i64>>());
    assert_eq!(
        SequencerService::new(&h.ctx).current_seq(channel).await.unwrap(),
        40
    );
}

#[tokio::test]
async fn test_resync_lifts_counter_past_timeline() {
    let h = Harness::new();
    let [u1] = h.users(1)[..] else { unreachable!() };
    let channel = h.channel_with(u1, &[]).await;

    // A row written while the counter store was behind
    let message = Message::new(h.ctx.generate_id(), channel, u1, 10, MessageContent::text("restored"));
    h.store.insert_with_inbox(&message, &[]).await.unwrap();
    assert_eq!(h.store.current_seq(channel).await.unwrap(), 0);

    let sequencer = SequencerService::new(&h.ctx);
    assert_eq!(sequencer.resync(channel).await.unwrap(), 10);
    assert_eq!(sequencer.next_seq(channel).await.unwrap(), 11);
}

// ============================================================================
// Transactional publish
// ============================================================================

#[tokio::test]
async fn test_lost_commit_signal_is_published_exactly_once() {
    let h = Harness::new();
    let [u1, u2] = h.users(2)[..] else { unreachable!() };
    let channel = h.channel_with(u1, &[u2]).await;

    let node = h.node("node-q");
    let mut c2 = node.connect(u2).await;

    h.store
        .inject_write_fault(WriteFault::CommitThenStall(Duration::from_secs(5)));
    let (response, delivery) = h.send(channel, u1, text_request("survives")).await.unwrap();

    // check_state found the timeline row
    let writer = TransactionalWriter::new(&h.ctx);
    assert!(writer.check_state(response.message_id).await.unwrap().is_commit());

    let outcome = delivery.expect("resolved as committed").await.unwrap();
    assert!(matches!(outcome, DeliveryOutcome::Published { .. }));

    let push = c2.next_push().await.expect("routed once");
    assert_eq!(push.body.unwrap().message_id, response.message_id.into_inner());

    let report = Reconciler::new(&h.ctx).run_once().await.unwrap();
    assert_eq!(report.total(), 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(c2.queued_pushes().is_empty());
    assert_eq!(h.bus.publish_count(response.message_id), 1);

    node.stop().await;
}

#[tokio::test]
async fn test_rolled_back_write_is_never_published() {
    let h = Harness::new();
    let [u1, u2] = h.users(2)[..] else { unreachable!() };
    let channel = h.channel_with(u1, &[u2]).await;

    h.store.inject_write_fault(WriteFault::Fail);
    let err = h.send(channel, u1, text_request("lost")).await.unwrap_err();
    assert!(persistence_failed(&err));
    assert_eq!(err.status_code(), 500);

    assert_eq!(h.store.message_count(channel), 0);
    assert!(h.half_log.is_empty());
    assert!(h.bus.published().is_empty());
    assert!(h.store.offline_entries().is_empty());

    // The burned seq leaves a gap, never a duplicate
    let (next, _) = h.send_text(channel, u1, "retry").await;
    assert_eq!(next.seq_id, 2);
}

#[tokio::test]
async fn test_unresolved_stall_without_commit_is_discarded_by_reconciler() {
    let h = Harness::new();
    let [u1, u2] = h.users(2)[..] else { unreachable!() };
    let channel = h.channel_with(u1, &[u2]).await;

    h.store
        .inject_write_fault(WriteFault::StallWithoutCommit(Duration::from_secs(5)));
    let err = h.send(channel, u1, text_request("never landed")).await.unwrap_err();
    assert!(persistence_failed(&err));

    // The half message stays for the reconciler
    assert_eq!(h.half_log.len(), 1);

    let report = Reconciler::new(&h.ctx).run_once().await.unwrap();
    assert_eq!(report.discarded, 1);
    assert_eq!(report.published, 0);
    assert!(h.half_log.is_empty());
    assert!(h.bus.published().is_empty());
}

#[tokio::test]
async fn test_reconciler_publishes_orphaned_commit_exactly_once() {
    let h = Harness::new();
    let [u1, u2] = h.users(2)[..] else { unreachable!() };
    let channel = h.channel_with(u1, &[u2]).await;

    // Committed, then the process died before publishing
    let seq = SequencerService::new(&h.ctx).next_seq(channel).await.unwrap();
    let message = Message::new(h.ctx.generate_id(), channel, u1, seq, MessageContent::text("orphan"));
    let recipients = vec![u1, u2];
    h.store
        .insert_with_inbox(&message, &InboxEntry::for_recipients(&message, &recipients))
        .await
        .unwrap();
    h.half_log
        .prepare(&HalfMessage::new(MessageCommittedEvent::new(
            &message,
            Some(recipients),
        )))
        .await
        .unwrap();

    let reconciler_a = Reconciler::new(&h.ctx);
    let reconciler_b = Reconciler::new(&h.ctx);
    let (first, second) = tokio::join!(reconciler_a.run_once(), reconciler_b.run_once());
    let published = first.unwrap().published + second.unwrap().published;
    assert_eq!(published, 1);

    let report = Reconciler::new(&h.ctx).run_once().await.unwrap();
    assert_eq!(report.total(), 0);
    assert_eq!(h.bus.publish_count(message.id), 1);

    // u2 had no session anywhere
    let queued = OfflineQueueService::new(&h.ctx)
        .entries_for_user(u2)
        .await
        .unwrap();
    assert_eq!(queued.len(), 1);
}

#[tokio::test]
async fn test_failed_publish_is_retried_by_reconciler() {
    let h = Harness::new();
    let [u1, u2] = h.users(2)[..] else { unreachable!() };
    let channel = h.channel_with(u1, &[u2]).await;

    h.bus.fail_publishes(1);
    let (response, delivery) = h.send(channel, u1, text_request("later")).await.unwrap();
    assert_eq!(delivery.unwrap().await.unwrap(), DeliveryOutcome::Deferred);
    assert!(h.half_log.contains(response.message_id));
    assert!(h.bus.published().is_empty());

    let report = Reconciler::new(&h.ctx).run_once().await.unwrap();
    assert_eq!(report.published, 1);
    assert_eq!(h.bus.publish_count(response.message_id), 1);
    assert!(!h.half_log.contains(response.message_id));
}

#[tokio::test]
async fn test_publisher_dying_after_claim_is_republished_once_lease_lapses() {
    let mut settings = integration_tests::test_settings();
    settings.publish_lease = Duration::from_millis(200);
    let h = Harness::with_settings(settings);
    let [u1, u2] = h.users(2)[..] else { unreachable!() };
    let channel = h.channel_with(u1, &[u2]).await;

    h.bus.hang_publishes(1);
    let (response, delivery) = h.send(channel, u1, text_request("in flight")).await.unwrap();
    let id = response.message_id;
    for _ in 0..100 {
        if h.half_log.is_leased(id) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(h.half_log.is_leased(id));

    // The process dies with the publish outstanding
    let delivery = delivery.unwrap();
    delivery.abort();
    assert!(delivery.await.unwrap_err().is_cancelled());
    assert!(h.half_log.contains(id));
    assert_eq!(h.bus.publish_count(id), 0);

    // A live lease is left alone
    let report = Reconciler::new(&h.ctx).run_once().await.unwrap();
    assert_eq!(report.published, 0);
    assert_eq!(h.bus.publish_count(id), 0);

    tokio::time::sleep(Duration::from_millis(250)).await;
    let report = Reconciler::new(&h.ctx).run_once().await.unwrap();
    assert_eq!(report.published, 1);
    assert_eq!(h.bus.publish_count(id), 1);
    assert!(!h.half_log.contains(id));
    assert!(!h.half_log.is_leased(id));
}

#[tokio::test]
async fn test_commit_landing_after_timeout_is_reported_as_success() {
    let mut settings = integration_tests::test_settings();
    settings.unknown_settle = Duration::from_millis(300);
    let h = Harness::with_settings(settings);
    let [u1, u2] = h.users(2)[..] else { unreachable!() };
    let channel = h.channel_with(u1, &[u2]).await;

    // Times out at 150ms, the commit still lands at 250ms
    h.store
        .inject_write_fault(WriteFault::CommitAfter(Duration::from_millis(250)));
    let (response, delivery) = h.send(channel, u1, text_request("slow commit")).await.unwrap();
    assert!(matches!(
        delivery.unwrap().await.unwrap(),
        DeliveryOutcome::Published { .. }
    ));
    assert_eq!(h.bus.publish_count(response.message_id), 1);
    assert_eq!(h.store.message_count(channel), 1);
    assert!(h.half_log.is_empty());
}

#[tokio::test]
async fn test_check_state_retries_failed_lookups() {
    let h = Harness::new();
    let [u1] = h.users(1)[..] else { unreachable!() };
    let channel = h.channel_with(u1, &[]).await;
    let (response, _) = h.send_text(channel, u1, "present").await;

    let writer = TransactionalWriter::new(&h.ctx);
    let attempts = h.ctx.settings().check_state_attempts;

    h.store.fail_lookups(attempts - 1);
    assert!(writer.check_state(response.message_id).await.unwrap().is_commit());

    h.store.fail_lookups(attempts);
    let err = writer.check_state(response.message_id).await.unwrap_err();
    assert!(matches!(
        err.as_domain(),
        Some(DomainError::ReconciliationAmbiguity(id)) if *id == response.message_id
    ));

    let unknown = h.ctx.generate_id();
    assert!(!writer.check_state(unknown).await.unwrap().is_commit());
}

// ============================================================================
// Review, recall, read state
// ============================================================================

#[tokio::test]
async fn test_held_message_is_published_only_after_approval() {
    let h = Harness::with(
        integration_tests::test_settings(),
        Arc::new(KeywordModeration::new(["spoiler"])),
    );
    let [owner, member] = h.users(2)[..] else { unreachable!() };
    let channel = h.channel_with(owner, &[member]).await;

    let (response, delivery) = h
        .send(channel, member, text_request("Big SPOILER ahead"))
        .await
        .unwrap();
    assert!(delivery.is_none());
    assert!(h.half_log.is_empty());
    assert!(h.bus.published().is_empty());

    let messages = MessageService::new(&h.ctx);
    let owner_view = messages.sync(channel, owner, sync_all()).await.unwrap();
    assert!(owner_view.messages.is_empty());
    assert_eq!(owner_view.next_cursor, response.seq_id);
    let sender_view = messages.sync(channel, member, sync_all()).await.unwrap();
    assert_eq!(sender_view.messages[0].status, MessageStatus::UnderReview);

    let denied = messages
        .resolve_review(channel, response.message_id, member, true)
        .await
        .unwrap_err();
    assert_eq!(denied.status_code(), 403);

    let handle = messages
        .resolve_review(channel, response.message_id, owner, true)
        .await
        .unwrap()
        .expect("approval publishes");
    assert!(matches!(
        handle.await.unwrap(),
        DeliveryOutcome::Published { .. }
    ));
    assert_eq!(h.bus.publish_count(response.message_id), 1);

    let stored = h.store.find_by_id(response.message_id).await.unwrap().unwrap();
    assert_eq!(stored.status, MessageStatus::Normal);
}

#[tokio::test]
async fn test_approval_with_failed_prepare_can_be_retried() {
    let h = Harness::with(
        integration_tests::test_settings(),
        Arc::new(KeywordModeration::new(["spoiler"])),
    );
    let [owner, member] = h.users(2)[..] else { unreachable!() };
    let channel = h.channel_with(owner, &[member]).await;
    let (response, _) = h
        .send(channel, member, text_request("spoiler inside"))
        .await
        .unwrap();

    let messages = MessageService::new(&h.ctx);
    h.half_log.fail_prepares(1);
    assert!(messages
        .resolve_review(channel, response.message_id, owner, true)
        .await
        .is_err());

    let stored = h.store.find_by_id(response.message_id).await.unwrap().unwrap();
    assert_eq!(stored.status, MessageStatus::UnderReview);
    assert!(h.half_log.is_empty());

    let handle = messages
        .resolve_review(channel, response.message_id, owner, true)
        .await
        .unwrap()
        .expect("approval publishes");
    assert!(matches!(
        handle.await.unwrap(),
        DeliveryOutcome::Published { .. }
    ));
    assert_eq!(h.bus.publish_count(response.message_id), 1);
}

#[tokio::test]
async fn test_reconciler_holds_events_of_messages_under_review() {
    let h = Harness::new();
    let [u1, u2] = h.users(2)[..] else { unreachable!() };
    let channel = h.channel_with(u1, &[u2]).await;

    // An approval recorded its event, then died before the status flip
    let seq = SequencerService::new(&h.ctx).next_seq(channel).await.unwrap();
    let mut message =
        Message::new(h.ctx.generate_id(), channel, u2, seq, MessageContent::text("held"));
    message.status = MessageStatus::UnderReview;
    h.store.insert_with_inbox(&message, &[]).await.unwrap();
    h.half_log
        .prepare(&HalfMessage::new(MessageCommittedEvent::new(&message, None)))
        .await
        .unwrap();

    let report = Reconciler::new(&h.ctx).run_once().await.unwrap();
    assert_eq!(report.deferred, 1);
    assert!(h.bus.published().is_empty());
    assert!(h.half_log.contains(message.id));

    // Once some approval lands the event goes out
    h.store
        .update_status(message.id, MessageStatus::UnderReview, MessageStatus::Normal)
        .await
        .unwrap();
    let report = Reconciler::new(&h.ctx).run_once().await.unwrap();
    assert_eq!(report.published, 1);
    assert_eq!(h.bus.publish_count(message.id), 1);
}

#[tokio::test]
async fn test_rejected_message_stays_hidden() {
    let h = Harness::with(
        integration_tests::test_settings(),
        Arc::new(KeywordModeration::new(["spoiler"])),
    );
    let [owner, member] = h.users(2)[..] else { unreachable!() };
    let channel = h.channel_with(owner, &[member]).await;

    let (response, _) = h
        .send(channel, member, text_request("spoiler"))
        .await
        .unwrap();
    let messages = MessageService::new(&h.ctx);
    let handle = messages
        .resolve_review(channel, response.message_id, owner, false)
        .await
        .unwrap();
    assert!(handle.is_none());
    assert!(h.bus.published().is_empty());

    let stored = h.store.find_by_id(response.message_id).await.unwrap().unwrap();
    assert_eq!(stored.status, MessageStatus::Rejected);

    // A second decision is an invalid transition
    let err = messages
        .resolve_review(channel, response.message_id, owner, true)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 409);
}

#[tokio::test]
async fn test_recall_redacts_content() {
    let h = Harness::new();
    let [u1, u2] = h.users(2)[..] else { unreachable!() };
    let channel = h.channel_with(u1, &[u2]).await;
    let (response, _) = h.send_text(channel, u1, "regrettable").await;

    let messages = MessageService::new(&h.ctx);
    let err = messages
        .recall(channel, response.message_id, u2, None)
        .await
        .unwrap_err();
    assert!(matches!(err.as_domain(), Some(DomainError::NotMessageSender)));

    messages.recall(channel, response.message_id, u1, None).await.unwrap();

    let view = messages
        .get_message(channel, response.message_id, u2)
        .await
        .unwrap();
    assert_eq!(view.status, MessageStatus::Recalled);
    assert!(matches!(view.content, MessageContent::System { .. }));

    let inbox = messages.inbox(u2, 10).await.unwrap();
    assert_eq!(inbox[0].preview, "[recalled]");

    assert!(messages.recall(channel, response.message_id, u1, None).await.is_err());
}

#[tokio::test]
async fn test_mark_as_read_resets_unread_and_is_idempotent() {
    let h = Harness::new();
    let [u1, u2] = h.users(2)[..] else { unreachable!() };
    let channel = h.channel_with(u1, &[u2]).await;

    h.send_text(channel, u1, "one").await;
    let (second, _) = h.send_text(channel, u1, "two").await;
    assert_eq!(h.store.member(channel, u2).unwrap().unread_count, 2);
    assert_eq!(h.store.member(channel, u1).unwrap().unread_count, 0);

    let reads = ReadStateService::new(&h.ctx);
    reads.mark_as_read(channel, second.message_id, u2).await.unwrap();
    reads.mark_as_read(channel, second.message_id, u2).await.unwrap();

    let member = h.store.member(channel, u2).unwrap();
    assert_eq!(member.unread_count, 0);
    assert_eq!(member.last_read_seq, second.seq_id);

    let summary = reads.reads(channel, second.message_id, u1, 10).await.unwrap();
    assert_eq!(summary.count, 1);
    assert_eq!(summary.reader_ids, vec![u2]);

    let inbox = h.store.list_for_user(u2, 10).await.unwrap();
    let read = inbox.iter().find(|e| e.message_id == second.message_id).unwrap();
    assert!(read.is_read);
}

#[tokio::test]
async fn test_non_member_cannot_send_or_sync() {
    let h = Harness::new();
    let [owner, outsider] = h.users(2)[..] else { unreachable!() };
    let channel = h.channel_with(owner, &[]).await;

    let err = h
        .send(channel, outsider, text_request("let me in"))
        .await
        .unwrap_err();
    assert!(matches!(err.as_domain(), Some(DomainError::NotChannelMember)));

    let err = MessageService::new(&h.ctx)
        .sync(channel, outsider, sync_all())
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 403);
    assert_eq!(h.store.current_seq(channel).await.unwrap(), 0);
}
