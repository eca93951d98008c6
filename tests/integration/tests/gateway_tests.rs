//! Gateway socket tests
//!
//! Drives the WebSocket gateway with a real client over loopback, backed by
//! the in-memory engine. No external services needed.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use std::time::Duration;

use integration_tests::{
    next_control, next_frame, next_frame_within, send_json, GatewayServer, Harness,
};
use prost::Message as _;
use relay_core::traits::PresenceDirectory;
use relay_core::Snowflake;
use relay_gateway::protocol::{PushCommand, PushPacket};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message as WsMessage;

async fn wait_until_offline(h: &Harness, user_id: Snowflake) {
    for _ in 0..200 {
        if !h.presence.is_online(user_id).await.unwrap() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("user {user_id} still online");
}

fn close_code(frame: Option<WsMessage>) -> Option<u16> {
    match frame {
        Some(WsMessage::Close(Some(close))) => Some(u16::from(close.code)),
        _ => None,
    }
}

#[tokio::test]
async fn test_hello_identify_ready() {
    let h = Harness::new();
    let gateway = GatewayServer::start_with_heartbeat(&h, "node-ws", 30_000).await;
    let [user] = h.users(1)[..] else { unreachable!() };

    let mut ws = gateway.connect(None).await;
    let hello = next_control(&mut ws).await;
    assert_eq!(hello["op"], 10);
    assert_eq!(hello["d"]["heartbeat_interval"], 30_000);

    send_json(
        &mut ws,
        &json!({ "op": 2, "d": { "token": gateway.token_for(user) } }),
    )
    .await;
    let ready = next_control(&mut ws).await;
    assert_eq!(ready["op"], 3);
    assert_eq!(ready["d"]["userId"], user.to_string());
    assert_eq!(ready["d"]["nodeId"], "node-ws");

    assert!(gateway.registry.lookup(user).is_some());
    assert!(h.presence.is_online(user).await.unwrap());

    gateway.stop().await;
}

#[tokio::test]
async fn test_heartbeat_is_acknowledged() {
    let h = Harness::new();
    let gateway = GatewayServer::start(&h, "node-ws").await;
    let [user] = h.users(1)[..] else { unreachable!() };

    let mut ws = gateway.connect_identified(user, None).await;
    send_json(&mut ws, &json!({ "op": 1 })).await;
    let ack = next_control(&mut ws).await;
    assert_eq!(ack["op"], 11);

    gateway.stop().await;
}

#[tokio::test]
async fn test_bad_token_closes_with_authentication_failed() {
    let h = Harness::new();
    let gateway = GatewayServer::start(&h, "node-ws").await;

    let mut ws = gateway.connect(None).await;
    let _hello = next_control(&mut ws).await;
    send_json(&mut ws, &json!({ "op": 2, "d": { "token": "garbage" } })).await;

    assert_eq!(close_code(next_frame(&mut ws).await), Some(4004));

    gateway.stop().await;
}

#[tokio::test]
async fn test_server_op_from_client_closes_with_unknown_opcode() {
    let h = Harness::new();
    let gateway = GatewayServer::start(&h, "node-ws").await;

    let mut ws = gateway.connect(None).await;
    let _hello = next_control(&mut ws).await;
    send_json(&mut ws, &json!({ "op": 3 })).await;

    assert_eq!(close_code(next_frame(&mut ws).await), Some(4001));

    gateway.stop().await;
}

#[tokio::test]
async fn test_silent_client_times_out() {
    let h = Harness::new();
    let gateway = GatewayServer::start_with_heartbeat(&h, "node-ws", 100).await;

    let mut ws = gateway.connect(None).await;
    let _hello = next_control(&mut ws).await;

    let frame = next_frame_within(&mut ws, Duration::from_secs(3)).await;
    assert_eq!(close_code(frame), Some(4009));

    gateway.stop().await;
}

#[tokio::test]
async fn test_push_arrives_as_protobuf_by_default() {
    let h = Harness::new();
    let gateway = GatewayServer::start(&h, "node-ws").await;
    let [sender, recipient] = h.users(2)[..] else { unreachable!() };
    let channel = h.channel_with(sender, &[recipient]).await;

    let mut ws = gateway.connect_identified(recipient, None).await;
    let (response, _) = h.send_text(channel, sender, "over the wire").await;

    let bytes = match next_frame(&mut ws).await {
        Some(WsMessage::Binary(bytes)) => bytes,
        other => panic!("expected a binary push, got {other:?}"),
    };
    let packet = PushPacket::decode(&bytes[..]).unwrap();
    assert_eq!(packet.command(), PushCommand::MsgPush);
    let body = packet.body.unwrap();
    assert_eq!(body.message_id, response.message_id.into_inner());
    assert_eq!(body.seq_id, response.seq_id);

    gateway.stop().await;
}

#[tokio::test]
async fn test_offline_backlog_replays_as_json_after_identify() {
    let h = Harness::new();
    let gateway = GatewayServer::start(&h, "node-ws").await;
    let [sender, recipient] = h.users(2)[..] else { unreachable!() };
    let channel = h.channel_with(sender, &[recipient]).await;

    let (response, _) = h.send_text(channel, sender, "while you were away").await;
    assert_eq!(h.store.offline_entries().len(), 1);

    let mut ws = gateway.connect_identified(recipient, Some("json")).await;
    let push: Value = next_control(&mut ws).await;
    assert_eq!(push["header"]["command"], PushCommand::OfflinePush as i32);
    assert_eq!(push["body"]["messageId"], response.message_id.to_string());
    assert_eq!(push["body"]["channelId"], channel.to_string());

    gateway.stop().await;
}

#[tokio::test]
async fn test_offline_ack_marks_entry_delivered() {
    let h = Harness::new();
    let gateway = GatewayServer::start(&h, "node-ws").await;
    let [sender, recipient] = h.users(2)[..] else { unreachable!() };
    let channel = h.channel_with(sender, &[recipient]).await;
    h.send_text(channel, sender, "ack me").await;

    let mut ws = gateway.connect_identified(recipient, Some("json")).await;
    let push: Value = next_control(&mut ws).await;
    let entry_id = push["body"]["entryId"].as_i64().expect("entry id on offline push");
    assert!(!h.store.offline_entries()[0].delivered);

    send_json(&mut ws, &json!({ "op": 4, "d": { "entryId": entry_id } })).await;

    let mut delivered = false;
    for _ in 0..200 {
        if h.store.offline_entries()[0].delivered {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(delivered, "entry {entry_id} was never acknowledged");

    gateway.stop().await;
}

#[tokio::test]
async fn test_offline_ack_before_identify_closes_with_not_authenticated() {
    let h = Harness::new();
    let gateway = GatewayServer::start(&h, "node-ws").await;

    let mut ws = gateway.connect(None).await;
    let _hello = next_control(&mut ws).await;
    send_json(&mut ws, &json!({ "op": 4, "d": { "entryId": 1 } })).await;

    assert_eq!(close_code(next_frame(&mut ws).await), Some(4003));

    gateway.stop().await;
}

#[tokio::test]
async fn test_closing_socket_clears_session_and_presence() {
    let h = Harness::new();
    let gateway = GatewayServer::start(&h, "node-ws").await;
    let [user] = h.users(1)[..] else { unreachable!() };

    let mut ws = gateway.connect_identified(user, None).await;
    assert!(h.presence.is_online(user).await.unwrap());

    ws.close(None).await.unwrap();
    wait_until_offline(&h, user).await;
    assert!(gateway.registry.lookup(user).is_none());

    gateway.stop().await;
}
