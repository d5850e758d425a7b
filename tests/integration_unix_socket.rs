#![cfg(unix)]

mod common;

use common::{test_config, wait_for_event};
use presence_link::ipc::{encode, Opcode};
use presence_link::{Event, PresenceClient, ReadyInfo};
use serde_json::{json, Value};
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

fn read_frame(stream: &mut UnixStream) -> Option<(u32, Vec<u8>)> {
    let mut header = [0u8; 8];
    stream.read_exact(&mut header).ok()?;
    let opcode = u32::from_le_bytes(header[0..4].try_into().ok()?);
    let len = u32::from_le_bytes(header[4..8].try_into().ok()?) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).ok()?;
    Some((opcode, payload))
}

/// Accept one client, answer its handshake with READY, then wait for it to leave
fn serve_once(listener: UnixListener) -> JoinHandle<Value> {
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let (opcode, payload) = read_frame(&mut stream).unwrap();
        assert_eq!(opcode, u32::from(Opcode::Handshake));

        let ready = json!({ "cmd": "DISPATCH", "evt": "READY", "data": { "v": 1 } });
        let frame = encode(Opcode::Frame, &serde_json::to_vec(&ready).unwrap());
        stream.write_all(&frame).unwrap();

        while read_frame(&mut stream).is_some() {}
        serde_json::from_slice(&payload).unwrap()
    })
}

#[test]
fn connects_to_first_available_socket() {
    let dir = tempfile::tempdir().unwrap();
    let listener = UnixListener::bind(dir.path().join("discord-ipc-3")).unwrap();
    let server = serve_once(listener);

    let config = test_config().with_socket_dirs(vec![dir.path().to_path_buf()]);
    let mut client = PresenceClient::new(config).unwrap();
    client.start().unwrap();

    let events = wait_for_event(&mut client, Duration::from_secs(5), |event| {
        matches!(event, Event::Ready(_))
    });
    assert!(matches!(events[0], Event::Ready(ReadyInfo { endpoint: 3, .. })));

    client.stop().unwrap();
    let handshake = server.join().unwrap();
    assert_eq!(handshake["v"], 1);
    assert_eq!(handshake["client_id"], common::CLIENT_ID);
}

#[test]
fn discover_lists_existing_sockets() {
    let dir = tempfile::tempdir().unwrap();
    let _first = UnixListener::bind(dir.path().join("discord-ipc-1")).unwrap();
    let _second = UnixListener::bind(dir.path().join("discord-ipc-4")).unwrap();
    std::fs::write(dir.path().join("discord-ipc-2"), b"not a socket").unwrap();

    let config = test_config().with_socket_dirs(vec![dir.path().to_path_buf()]);
    let client = PresenceClient::new(config).unwrap();
    let found: Vec<u8> = client
        .discover_endpoints()
        .into_iter()
        .map(|endpoint| endpoint.index)
        .collect();
    assert_eq!(found, vec![1, 4]);
}
