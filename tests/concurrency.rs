//! §8 scenario 3: two concurrent reads, replied to in reverse order, each
//! resolve to the correct window and the right transaction id. The generic
//! loopback responder answers strictly in request order, so this test
//! drives a small hand-rolled server to control reply ordering directly.

use std::time::Duration;

use rmap_client::client::ClientNode;
use rmap_client::config::ClientConfig;
use rmap_client::packet::{self, ParsedPacket, PacketConfig, ReadReplyConfig};
use rmap_client::ssdtp2;
use rmap_client::target::TargetDescriptor;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

mod common;

/// Wire size of a Read-Command against the `{ path=[2], reply=[3] }` target:
/// target_path(1) + 4 + padded reply(4) + 12 = 21, plus the 12-byte SSDTP2
/// envelope.
const READ_COMMAND_FRAME_LEN: usize = 12 + 21;

fn pattern_for(memory_address: u32) -> Vec<u8> {
    (0..64u8).map(|b| b.wrapping_add(memory_address as u8)).collect()
}

fn encode_read_reply_frame(transaction_id: u16, memory_address: u32) -> Vec<u8> {
    let data = pattern_for(memory_address);
    let config = PacketConfig::ReadReply(ReadReplyConfig {
        reply_path: &[0x03],
        initiator_logical_address: 0xfe,
        target_logical_address: 0x32,
        transaction_id,
        status: 0,
        data: &data,
        increment: true,
    });
    let mut packet = vec![0u8; config.size()];
    config.encode(&mut packet).unwrap();
    let mut frame = vec![0u8; 12 + packet.len()];
    ssdtp2::write_rmap_envelope(&mut frame[..12], packet.len() as u64);
    frame[12..].copy_from_slice(&packet);
    frame
}

#[tokio::test]
async fn out_of_order_replies_resolve_the_correct_future() {
    common::init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut first_cmd = vec![0u8; READ_COMMAND_FRAME_LEN];
        socket.read_exact(&mut first_cmd).await.unwrap();
        let mut second_cmd = vec![0u8; READ_COMMAND_FRAME_LEN];
        socket.read_exact(&mut second_cmd).await.unwrap();

        let (first_id, first_addr) = match packet::parse(&first_cmd[12..]).unwrap() {
            ParsedPacket::ReadCommand(c) => (c.transaction_id, c.memory_address),
            _ => panic!("expected a read command"),
        };
        let (second_id, second_addr) = match packet::parse(&second_cmd[12..]).unwrap() {
            ParsedPacket::ReadCommand(c) => (c.transaction_id, c.memory_address),
            _ => panic!("expected a read command"),
        };

        // Reply to the second request first.
        socket.write_all(&encode_read_reply_frame(second_id, second_addr)).await.unwrap();
        socket.write_all(&encode_read_reply_frame(first_id, first_addr)).await.unwrap();
    });

    let config = ClientConfig::builder(addr.ip().to_string(), addr.port().to_string()).build();
    let node = ClientNode::new(config);
    node.set_initiator_logical_address(0xfe);
    node.connect(Duration::from_secs(1)).await.unwrap();
    let loop_node = node.clone();
    tokio::spawn(async move { loop_node.run_loop().await });

    let target = TargetDescriptor::new(0x32, 0xfe, [0x02], [0x03]);
    let first_rx = node.read_async(&target, 0x00, 64, |_| {}).await;
    let second_rx = node.read_async(&target, 0x40, 64, |_| {}).await;

    let first_reply = first_rx.await.unwrap().unwrap();
    let second_reply = second_rx.await.unwrap().unwrap();

    assert_eq!(first_reply.data, pattern_for(0x00));
    assert_eq!(second_reply.data, pattern_for(0x40));

    server.await.unwrap();
}
