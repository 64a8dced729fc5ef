//! Shared scaffolding for the end-to-end scenario tests (§8): a standard
//! target descriptor and a helper that binds a [`LoopbackResponder`],
//! serves it in the background, and hands back a connected, running
//! client pointed at it.

use std::sync::Arc;
use std::time::Duration;

use rmap_client::client::ClientNode;
use rmap_client::config::ClientConfig;
use rmap_client::loopback::LoopbackResponder;
use rmap_client::target::TargetDescriptor;

pub const INITIATOR_LOGICAL_ADDRESS: u8 = 0xfe;
pub const TARGET_LOGICAL_ADDRESS: u8 = 0x32;

/// Installs a `tracing` subscriber that writes through the test harness
/// (so log lines only surface for failing tests), the same
/// `tracing_subscriber::fmt()` setup the reference codebase's binaries use.
/// `try_init` rather than `init`, since every test file in this crate calls
/// this and a subscriber can only be installed once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// The `{ tla=0x32, path=[2], reply=[3] }` target used throughout §8's
/// literal scenarios.
pub fn standard_target() -> TargetDescriptor {
    TargetDescriptor::new(TARGET_LOGICAL_ADDRESS, INITIATOR_LOGICAL_ADDRESS, [0x02], [0x03])
}

/// Binds a loopback responder on an ephemeral port, serves exactly one
/// connection in the background, and returns a `ClientNode` already
/// connected and running its receive loop against it.
pub async fn connected_client(config: ClientConfig) -> (Arc<ClientNode>, Arc<LoopbackResponder>) {
    let responder = Arc::new(LoopbackResponder::bind("127.0.0.1:0").await.unwrap());
    let addr = responder.local_addr().unwrap();
    let serving = responder.clone();
    tokio::spawn(async move {
        let _ = serving.serve_one().await;
    });

    let config = ClientConfig { ip_address: addr.ip().to_string(), port: addr.port().to_string(), ..config };
    let node = ClientNode::new(config);
    node.set_initiator_logical_address(INITIATOR_LOGICAL_ADDRESS);
    node.connect(Duration::from_secs(1)).await.unwrap();
    let loop_node = node.clone();
    tokio::spawn(async move { loop_node.run_loop().await });

    (node, responder)
}
