//! Device sessions against a scripted fake device.

use attsync_device::frame::{self, ACK_HEADER, FRAME_LEN};
use attsync_device::{
    DeviceClient, DeviceProfile, DeviceSession, DeviceTimeouts, ProtocolError, SessionPhase,
};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// What the fake device does after each received frame.
#[derive(Clone)]
enum Step {
    Reply(Vec<u8>),
    ReplyChunks(Vec<Vec<u8>>),
    Silent,
    Hangup,
}

fn fast_profile() -> DeviceProfile {
    DeviceProfile::default().with_timeouts(DeviceTimeouts {
        connect_secs: 2,
        handshake_secs: 1,
        setup_secs: 1,
        data_secs: 2,
        idle_gap_ms: 300,
        handshake_pause_ms: 0,
        setup_pause_ms: 0,
    })
}

/// Spawns a device that answers each frame with the next step and reports
/// every frame it received.
fn spawn_device(steps: Vec<Step>) -> (String, mpsc::Receiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        for step in steps {
            let mut frame = [0u8; FRAME_LEN];
            if stream.read_exact(&mut frame).is_err() {
                return;
            }
            let _ = tx.send(frame.to_vec());

            match step {
                Step::Reply(bytes) => stream.write_all(&bytes).unwrap(),
                Step::ReplyChunks(chunks) => {
                    for chunk in chunks {
                        stream.write_all(&chunk).unwrap();
                        stream.flush().unwrap();
                        thread::sleep(Duration::from_millis(50));
                    }
                }
                Step::Silent => {
                    drain_until_closed(&mut stream);
                    return;
                }
                Step::Hangup => return,
            }
        }
    });

    (addr, rx)
}

fn drain_until_closed(stream: &mut TcpStream) {
    let mut buf = [0u8; 64];
    while matches!(stream.read(&mut buf), Ok(n) if n > 0) {}
}

fn compact(subject: u32, ts: u32) -> Vec<u8> {
    let mut rec = vec![0u8; 20];
    rec[0..4].copy_from_slice(&subject.to_le_bytes());
    rec[7..11].copy_from_slice(&ts.to_le_bytes());
    rec[19] = 0x40;
    rec
}

fn data_reply(subjects: &[u32]) -> Vec<u8> {
    let mut data = ACK_HEADER.to_vec();
    data.extend_from_slice(&[0, 0]);
    for (i, s) in subjects.iter().enumerate() {
        data.extend_from_slice(&compact(*s, 1_000 + i as u32));
    }
    data
}

#[test]
fn full_pull_uses_device_token() {
    let data = data_reply(&[1, 2, 3, 0, 5, 6]);
    let (first, rest) = data.split_at(40);

    let (addr, frames) = spawn_device(vec![
        Step::Reply(vec![0xaa, 0x55, 0x01, 0x00]),
        Step::Reply(vec![0xaa, 0x55, 0x01, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x18, 0x00]),
        Step::ReplyChunks(vec![first.to_vec(), rest.to_vec()]),
    ]);

    let outcome = DeviceClient::new(addr, fast_profile()).pull().unwrap();
    assert_eq!(outcome.token, 0x2c);
    assert_eq!(outcome.bytes_received, data.len());
    assert_eq!(outcome.reply.records.len(), 5);
    assert_eq!(outcome.reply.noise, 1);

    let sent: Vec<Vec<u8>> = frames.try_iter().collect();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0], frame::handshake([0xff, 0xff, 0, 0]).to_vec());
    assert_eq!(sent[1], frame::setup([0xff, 0xff, 0, 0]).to_vec());
    assert_eq!(sent[2], frame::data_request(0x2c).to_vec());
}

#[test]
fn short_setup_reply_uses_default_token() {
    let (addr, frames) = spawn_device(vec![
        Step::Reply(vec![0xaa, 0x55]),
        Step::Reply(vec![0xaa, 0x55, 0x01]),
        Step::Reply(data_reply(&[10, 11, 12, 13, 14])),
    ]);

    let profile = fast_profile().with_default_token(0x03);
    let outcome = DeviceClient::new(addr, profile).pull().unwrap();
    assert_eq!(outcome.token, 0x03);

    let sent: Vec<Vec<u8>> = frames.try_iter().collect();
    let request = &sent[2];
    assert_eq!(request[7], 0x03);
    assert_eq!(request[13], 0x03);
}

#[test]
fn small_reply_means_no_data() {
    let (addr, _frames) = spawn_device(vec![
        Step::Reply(vec![0xaa]),
        Step::Reply(vec![0xaa, 0x55, 0x01, 0x00, 0x05]),
        Step::Reply(data_reply(&[1])),
    ]);

    let outcome = DeviceClient::new(addr, fast_profile()).pull().unwrap();
    assert_eq!(outcome.bytes_received, 0);
    assert!(outcome.reply.records.is_empty());
}

#[test]
fn silent_handshake_times_out() {
    let (addr, _frames) = spawn_device(vec![Step::Silent]);

    let err = DeviceClient::new(addr, fast_profile()).pull().unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::Timeout {
            phase: SessionPhase::Handshaking
        }
    ));
    assert!(err.is_retryable());
}

#[test]
fn hangup_during_setup_aborts() {
    let (addr, _frames) = spawn_device(vec![Step::Reply(vec![0xaa, 0x55]), Step::Hangup]);

    let err = DeviceClient::new(addr, fast_profile()).pull().unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::EmptyReply { .. } | ProtocolError::Io(_)
    ));
}

#[test]
fn steps_must_run_in_order() {
    let (addr, _frames) = spawn_device(vec![Step::Silent]);
    let mut session = DeviceSession::connect(&addr, &fast_profile()).unwrap();
    assert_eq!(session.phase(), SessionPhase::Connecting);

    let err = session.request_data().unwrap_err();
    assert!(matches!(err, ProtocolError::OutOfOrder { .. }));

    session.close();
    assert_eq!(session.phase(), SessionPhase::Closed);
}
