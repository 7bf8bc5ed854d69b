use std::time::Duration;

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::UnixListener,
};

use eth_rpc_core::Connection;
use eth_rpc_transport_ipc::Ipc;

/// Spawns a throwaway Unix-domain socket server that accepts one connection,
/// echoes back a single canned reply per request, and exits once the
/// connection is closed by the client.
async fn spawn_echo_server(path: &std::path::Path, reply: &'static str) {
    let listener = UnixListener::bind(path).unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 4096];
        loop {
            let read = match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            let _ = &buf[..read];
            if stream.write_all(reply.as_bytes()).await.is_err() {
                break;
            }
        }
    });
}

#[tokio::test]
async fn call_over_ipc_socket_round_trips() {
    let dir = std::env::temp_dir();
    let path = dir.join(format!("eth-rpc-core-test-{}.sock", std::process::id()));
    let _ = std::fs::remove_file(&path);

    spawn_echo_server(&path, r#"{"jsonrpc":"2.0","id":1,"result":"0x1234"}"#).await;
    // give the listener a moment to bind and accept
    tokio::time::sleep(Duration::from_millis(50)).await;

    let ipc = Ipc::connect(&path).await.unwrap();
    let id = ipc.request_id();
    let request = eth_rpc_core::jsonrpc::Request { id, method: "eth_blockNumber", params: () }.to_json();

    let result = ipc.send_raw_request(id, request).await.unwrap();
    assert_eq!(result.get(), r#""0x1234""#);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn connect_to_missing_socket_fails() {
    let path = std::env::temp_dir().join("eth-rpc-core-test-does-not-exist.sock");
    let _ = std::fs::remove_file(&path);
    assert!(Ipc::connect(&path).await.is_err());
}
