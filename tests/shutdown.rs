//! §8 scenario: two consecutive `shutdown` calls both succeed, and a
//! subsequent `read`/`write` against the now-closed node returns
//! `NotConnected` rather than hanging.

use std::time::Duration;

use rmap_client::error::Error;

mod common;

#[tokio::test]
async fn shutdown_twice_then_operations_see_not_connected() {
    common::init_tracing();
    let (node, _responder) =
        common::connected_client(rmap_client::config::ClientConfig::builder("", "").build()).await;
    let target = common::standard_target();

    node.shutdown().await.unwrap();
    node.shutdown().await.unwrap();

    // Give the run_loop task a moment to observe the socket shutdown and
    // drain any outstanding transactions; not required for the assertions
    // below but keeps the scenario close to a real caller's timing.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let write_err = node.write(&target, 0x00, &[0x01, 0x02, 0x03, 0x04]).await.unwrap_err();
    assert!(matches!(write_err, Error::NotConnected));

    let mut out = [0u8; 4];
    let read_err = node.read(&target, 0x00, &mut out).await.unwrap_err();
    assert!(matches!(read_err, Error::NotConnected));
}
