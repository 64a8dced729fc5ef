//! §8 scenario 5: `emit_time_code` puts exactly the literal 14-byte fixture
//! on the wire, captured here over a real socket rather than just the
//! in-memory encoder (see `crate::ssdtp2`'s own unit test for that).

use std::time::Duration;

use hex_literal::hex;
use rmap_client::client::ClientNode;
use rmap_client::config::ClientConfig;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

mod common;

#[tokio::test]
async fn emit_time_code_matches_literal_wire_fixture() {
    common::init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut wire = [0u8; 14];
        socket.read_exact(&mut wire).await.unwrap();
        wire
    });

    let config = ClientConfig::builder(addr.ip().to_string(), addr.port().to_string()).build();
    let node = ClientNode::new(config);
    node.connect(Duration::from_secs(1)).await.unwrap();
    node.emit_time_code(0x2a).await.unwrap();

    let wire = server.await.unwrap();
    assert_eq!(wire, hex!("30 00 00 00 00 00 00 00 00 00 00 02 2a 00"));
}
