//! API Integration Tests
//!
//! These tests require:
//! - Running PostgreSQL instance
//! - Running Redis instance
//! - Environment variables: DATABASE_URL, REDIS_URL, JWT_SECRET
//!
//! Run with: cargo test -p integration-tests --test api_tests

use integration_tests::{
    assert_json, assert_status, check_test_env, fixtures::*, unique_suffix, TestServer,
};
use relay_core::Snowflake;
use reqwest::StatusCode;
use serde_json::json;

fn new_user() -> Snowflake {
    Snowflake::new(unique_suffix() as i64 * 7_919)
}

/// Server plus a channel owned by one user with one more member
struct ChannelSetup {
    server: TestServer,
    channel_id: String,
    owner: Snowflake,
    owner_token: String,
    member: Snowflake,
    member_token: String,
}

async fn setup_channel() -> ChannelSetup {
    let server = TestServer::start().await.expect("Failed to start server");
    let owner = new_user();
    let member = new_user();
    let owner_token = server.token_for(owner).unwrap();
    let member_token = server.token_for(member).unwrap();

    let response = server
        .post_auth("/api/v1/channels", &owner_token, &CreateChannelBody::unique())
        .await
        .unwrap();
    let channel: ChannelBody = assert_json(response, StatusCode::CREATED).await.unwrap();

    let response = server
        .put_auth(
            &format!("/api/v1/channels/{}/members/{member}", channel.id),
            &owner_token,
            &json!({}),
        )
        .await
        .unwrap();
    assert_status(response, StatusCode::CREATED).await.unwrap();

    ChannelSetup {
        server,
        channel_id: channel.id,
        owner,
        owner_token,
        member,
        member_token,
    }
}

// ============================================================================
// Health Check Tests
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    if !check_test_env().await {
        return;
    }

    let server = TestServer::start().await.expect("Failed to start server");
    let response = server.get("/health").await.expect("Request failed");
    assert_status(response, StatusCode::OK).await.unwrap();
}

#[tokio::test]
async fn test_health_ready() {
    if !check_test_env().await {
        return;
    }

    let server = TestServer::start().await.expect("Failed to start server");
    let response = server.get("/health/ready").await.expect("Request failed");
    assert_status(response, StatusCode::OK).await.unwrap();
}

// ============================================================================
// Auth Tests
// ============================================================================

#[tokio::test]
async fn test_missing_token_is_rejected() {
    if !check_test_env().await {
        return;
    }

    let server = TestServer::start().await.expect("Failed to start server");
    let response = server.get("/api/v1/users/@me/inbox").await.unwrap();
    let body: ErrorBody = assert_json(response, StatusCode::UNAUTHORIZED).await.unwrap();
    assert_eq!(body.error.code, "MISSING_AUTHORIZATION");
}

#[tokio::test]
async fn test_invalid_token_is_rejected() {
    if !check_test_env().await {
        return;
    }

    let server = TestServer::start().await.expect("Failed to start server");
    let response = server
        .get_auth("/api/v1/users/@me/inbox", "not-a-token")
        .await
        .unwrap();
    assert_status(response, StatusCode::UNAUTHORIZED).await.unwrap();
}

// ============================================================================
// Channel Tests
// ============================================================================

#[tokio::test]
async fn test_create_channel_and_add_member() {
    if !check_test_env().await {
        return;
    }

    let setup = setup_channel().await;
    let response = setup
        .server
        .get_auth(
            &format!("/api/v1/channels/{}", setup.channel_id),
            &setup.member_token,
        )
        .await
        .unwrap();
    let channel: ChannelBody = assert_json(response, StatusCode::OK).await.unwrap();

    assert_eq!(channel.owner_id, setup.owner.to_string());
    assert_eq!(channel.member_count, 2);
    assert_eq!(channel.status, "ACTIVE");
}

#[tokio::test]
async fn test_add_member_twice_conflicts() {
    if !check_test_env().await {
        return;
    }

    let setup = setup_channel().await;
    let response = setup
        .server
        .put_auth(
            &format!(
                "/api/v1/channels/{}/members/{}",
                setup.channel_id, setup.member
            ),
            &setup.owner_token,
            &json!({}),
        )
        .await
        .unwrap();
    let body: ErrorBody = assert_json(response, StatusCode::CONFLICT).await.unwrap();
    assert_eq!(body.error.code, "ALREADY_MEMBER");
}

#[tokio::test]
async fn test_member_cannot_grant_admin() {
    if !check_test_env().await {
        return;
    }

    let setup = setup_channel().await;
    let response = setup
        .server
        .put_auth(
            &format!(
                "/api/v1/channels/{}/members/{}",
                setup.channel_id,
                new_user()
            ),
            &setup.member_token,
            &json!({ "role": "ADMIN" }),
        )
        .await
        .unwrap();
    assert_status(response, StatusCode::FORBIDDEN).await.unwrap();
}

#[tokio::test]
async fn test_owner_cannot_leave() {
    if !check_test_env().await {
        return;
    }

    let setup = setup_channel().await;
    let response = setup
        .server
        .delete_auth(
            &format!(
                "/api/v1/channels/{}/members/{}",
                setup.channel_id, setup.owner
            ),
            &setup.owner_token,
        )
        .await
        .unwrap();
    assert_status(response, StatusCode::CONFLICT).await.unwrap();
}

// ============================================================================
// Message Tests
// ============================================================================

#[tokio::test]
async fn test_submit_and_sync() {
    if !check_test_env().await {
        return;
    }

    let setup = setup_channel().await;
    let path = format!("/api/v1/channels/{}/messages", setup.channel_id);

    let response = setup
        .server
        .post_auth(&path, &setup.owner_token, &text_message("hi"))
        .await
        .unwrap();
    let first: SubmitBody = assert_json(response, StatusCode::CREATED).await.unwrap();
    assert_eq!(first.seq_id, 1);
    assert_eq!(first.fanout_mode, "WRITE_FANOUT");

    let response = setup
        .server
        .post_auth(&path, &setup.member_token, &text_message("hello back"))
        .await
        .unwrap();
    let second: SubmitBody = assert_json(response, StatusCode::CREATED).await.unwrap();
    assert_eq!(second.seq_id, 2);

    let response = setup
        .server
        .get_auth(&format!("{path}?cursor=0&limit=1"), &setup.member_token)
        .await
        .unwrap();
    let page: SyncBody = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(page.messages.len(), 1);
    assert_eq!(page.messages[0].id, first.message_id);
    assert_eq!(page.next_cursor, 1);
    assert!(page.has_more);

    let response = setup
        .server
        .get_auth(
            &format!("{path}?cursor={}", page.next_cursor),
            &setup.member_token,
        )
        .await
        .unwrap();
    let rest: SyncBody = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(rest.messages.len(), 1);
    assert_eq!(rest.messages[0].seq_id, 2);
    assert_eq!(rest.messages[0].sender_id, setup.member.to_string());
}

#[tokio::test]
async fn test_submit_rejects_empty_text() {
    if !check_test_env().await {
        return;
    }

    let setup = setup_channel().await;
    let response = setup
        .server
        .post_auth(
            &format!("/api/v1/channels/{}/messages", setup.channel_id),
            &setup.owner_token,
            &text_message("   "),
        )
        .await
        .unwrap();
    let body: ErrorBody = assert_json(response, StatusCode::BAD_REQUEST).await.unwrap();
    assert_eq!(body.error.code, "EMPTY_CONTENT");
}

#[tokio::test]
async fn test_non_member_cannot_submit() {
    if !check_test_env().await {
        return;
    }

    let setup = setup_channel().await;
    let outsider = setup.server.token_for(new_user()).unwrap();
    let response = setup
        .server
        .post_auth(
            &format!("/api/v1/channels/{}/messages", setup.channel_id),
            &outsider,
            &text_message("let me in"),
        )
        .await
        .unwrap();
    let body: ErrorBody = assert_json(response, StatusCode::FORBIDDEN).await.unwrap();
    assert_eq!(body.error.code, "NOT_CHANNEL_MEMBER");
}

#[tokio::test]
async fn test_mark_read_and_reads() {
    if !check_test_env().await {
        return;
    }

    let setup = setup_channel().await;
    let path = format!("/api/v1/channels/{}/messages", setup.channel_id);
    let response = setup
        .server
        .post_auth(&path, &setup.owner_token, &text_message("read me"))
        .await
        .unwrap();
    let sent: SubmitBody = assert_json(response, StatusCode::CREATED).await.unwrap();

    for _ in 0..2 {
        let response = setup
            .server
            .post_auth(
                &format!("{path}/{}/read", sent.message_id),
                &setup.member_token,
                &json!({}),
            )
            .await
            .unwrap();
        assert_status(response, StatusCode::NO_CONTENT).await.unwrap();
    }

    let response = setup
        .server
        .get_auth(
            &format!("{path}/{}/reads", sent.message_id),
            &setup.owner_token,
        )
        .await
        .unwrap();
    let reads: ReadsBody = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(reads.count, 1);
    assert_eq!(reads.reader_ids, vec![setup.member.to_string()]);
}

#[tokio::test]
async fn test_recall_and_inbox() {
    if !check_test_env().await {
        return;
    }

    let setup = setup_channel().await;
    let path = format!("/api/v1/channels/{}/messages", setup.channel_id);
    let response = setup
        .server
        .post_auth(
            &path,
            &setup.owner_token,
            &text_message_mentioning("ping", &[setup.member.to_string()]),
        )
        .await
        .unwrap();
    let sent: SubmitBody = assert_json(response, StatusCode::CREATED).await.unwrap();

    let response = setup
        .server
        .get_auth("/api/v1/users/@me/inbox", &setup.member_token)
        .await
        .unwrap();
    let inbox: Vec<InboxBody> = assert_json(response, StatusCode::OK).await.unwrap();
    let entry = inbox
        .iter()
        .find(|e| e.message_id == sent.message_id)
        .expect("inbox row for the member");
    assert!(entry.is_mentioned);
    assert!(!entry.is_read);
    assert_eq!(entry.channel_id, setup.channel_id);

    // Only the sender or an admin may recall
    let response = setup
        .server
        .post_auth(
            &format!("{path}/{}/recall", sent.message_id),
            &setup.member_token,
            &json!({}),
        )
        .await
        .unwrap();
    assert_status(response, StatusCode::FORBIDDEN).await.unwrap();

    let response = setup
        .server
        .post_auth(
            &format!("{path}/{}/recall", sent.message_id),
            &setup.owner_token,
            &json!({}),
        )
        .await
        .unwrap();
    assert_status(response, StatusCode::NO_CONTENT).await.unwrap();

    let response = setup
        .server
        .get_auth(
            &format!("{path}/{}", sent.message_id),
            &setup.member_token,
        )
        .await
        .unwrap();
    let message: MessageBody = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(message.status, "RECALLED");
    assert_eq!(message.content["type"], "SYSTEM");
}

#[tokio::test]
async fn test_unknown_message_is_not_found() {
    if !check_test_env().await {
        return;
    }

    let setup = setup_channel().await;
    let response = setup
        .server
        .get_auth(
            &format!(
                "/api/v1/channels/{}/messages/{}",
                setup.channel_id,
                new_user()
            ),
            &setup.owner_token,
        )
        .await
        .unwrap();
    let body: ErrorBody = assert_json(response, StatusCode::NOT_FOUND).await.unwrap();
    assert_eq!(body.error.code, "UNKNOWN_MESSAGE");
}

// ============================================================================
// Private channels, roles, reactions and mentions
// ============================================================================

#[tokio::test]
async fn test_private_channel_opens_once() {
    if !check_test_env().await {
        return;
    }

    let server = TestServer::start().await.expect("Failed to start server");
    let (a, b) = (new_user(), new_user());
    let (a_token, b_token) = (server.token_for(a).unwrap(), server.token_for(b).unwrap());

    let response = server
        .post_auth(&format!("/api/v1/channels/private/{b}"), &a_token, &json!({}))
        .await
        .unwrap();
    let opened: ChannelBody = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(opened.member_count, 2);
    assert_eq!(opened.peer_id, Some(b.to_string()));

    let response = server
        .post_auth(&format!("/api/v1/channels/private/{a}"), &b_token, &json!({}))
        .await
        .unwrap();
    let reopened: ChannelBody = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(reopened.id, opened.id);

    let response = server
        .get_auth("/api/v1/users/@me/channels", &b_token)
        .await
        .unwrap();
    let channels: Vec<ChannelBody> = assert_json(response, StatusCode::OK).await.unwrap();
    let row = channels
        .iter()
        .find(|c| c.id == opened.id)
        .expect("private channel listed for the peer");
    assert_eq!(row.peer_id, Some(a.to_string()));
}

#[tokio::test]
async fn test_owner_promotes_member_to_admin() {
    if !check_test_env().await {
        return;
    }

    let setup = setup_channel().await;
    let admins = format!(
        "/api/v1/channels/{}/admins/{}",
        setup.channel_id, setup.member
    );

    let response = setup
        .server
        .put_auth(&admins, &setup.member_token, &json!({ "isAdmin": true }))
        .await
        .unwrap();
    assert_status(response, StatusCode::FORBIDDEN).await.unwrap();

    let response = setup
        .server
        .put_auth(&admins, &setup.owner_token, &json!({ "isAdmin": true }))
        .await
        .unwrap();
    let member: MemberBody = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(member.role, "ADMIN");

    let response = setup
        .server
        .get_auth(
            &format!("/api/v1/channels/{}/members", setup.channel_id),
            &setup.member_token,
        )
        .await
        .unwrap();
    let members: Vec<MemberBody> = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(members.len(), 2);
    assert!(members
        .iter()
        .any(|m| m.user_id == setup.member.to_string() && m.role == "ADMIN"));
}

#[tokio::test]
async fn test_reactions_round_trip() {
    if !check_test_env().await {
        return;
    }

    let setup = setup_channel().await;
    let path = format!("/api/v1/channels/{}/messages", setup.channel_id);
    let response = setup
        .server
        .post_auth(&path, &setup.owner_token, &text_message("react to me"))
        .await
        .unwrap();
    let sent: SubmitBody = assert_json(response, StatusCode::CREATED).await.unwrap();
    let reactions = format!("{path}/{}/reactions", sent.message_id);
    let thumbs_up = "%F0%9F%91%8D";

    for _ in 0..2 {
        let response = setup
            .server
            .put_auth(
                &format!("{reactions}?emoji={thumbs_up}"),
                &setup.member_token,
                &json!({}),
            )
            .await
            .unwrap();
        assert_status(response, StatusCode::NO_CONTENT).await.unwrap();
    }

    let response = setup
        .server
        .get_auth(&reactions, &setup.owner_token)
        .await
        .unwrap();
    let listed: Vec<ReactionBody> = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].user_id, setup.member.to_string());
    assert_eq!(listed[0].emoji, "👍");

    let response = setup
        .server
        .delete_auth(&format!("{reactions}?emoji={thumbs_up}"), &setup.member_token)
        .await
        .unwrap();
    assert_status(response, StatusCode::NO_CONTENT).await.unwrap();

    let response = setup
        .server
        .get_auth(&reactions, &setup.owner_token)
        .await
        .unwrap();
    let listed: Vec<ReactionBody> = assert_json(response, StatusCode::OK).await.unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn test_recall_reason_is_audited() {
    if !check_test_env().await {
        return;
    }

    let setup = setup_channel().await;
    let path = format!("/api/v1/channels/{}/messages", setup.channel_id);
    let response = setup
        .server
        .post_auth(&path, &setup.member_token, &text_message("wrong chat"))
        .await
        .unwrap();
    let sent: SubmitBody = assert_json(response, StatusCode::CREATED).await.unwrap();
    let recall = format!("{path}/{}/recall", sent.message_id);

    let response = setup
        .server
        .post_auth(&recall, &setup.owner_token, &json!({ "reason": "off topic" }))
        .await
        .unwrap();
    assert_status(response, StatusCode::NO_CONTENT).await.unwrap();

    let response = setup
        .server
        .get_auth(&recall, &setup.member_token)
        .await
        .unwrap();
    let record: RecallBody = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(record.recalled_by, setup.owner.to_string());
    assert_eq!(record.reason.as_deref(), Some("off topic"));
    assert_eq!(record.original_content["text"], "wrong chat");
}

#[tokio::test]
async fn test_mentions_are_listed_for_the_mentioned_user() {
    if !check_test_env().await {
        return;
    }

    let setup = setup_channel().await;
    let path = format!("/api/v1/channels/{}/messages", setup.channel_id);
    let response = setup
        .server
        .post_auth(
            &path,
            &setup.owner_token,
            &text_message_mentioning("look", &[setup.member.to_string()]),
        )
        .await
        .unwrap();
    let sent: SubmitBody = assert_json(response, StatusCode::CREATED).await.unwrap();

    let response = setup
        .server
        .get_auth("/api/v1/users/@me/mentions?limit=10", &setup.member_token)
        .await
        .unwrap();
    let mentions: Vec<MessageBody> = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(mentions.len(), 1);
    assert_eq!(mentions[0].id, sent.message_id);

    let response = setup
        .server
        .get_auth("/api/v1/users/@me/mentions", &setup.owner_token)
        .await
        .unwrap();
    let mentions: Vec<MessageBody> = assert_json(response, StatusCode::OK).await.unwrap();
    assert!(mentions.is_empty());
}
