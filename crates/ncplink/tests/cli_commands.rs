#![cfg(feature = "cli")]

use std::io::ErrorKind;
use std::net::{TcpListener, TcpStream};
use std::process::{Command, Output};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use ncplink::ash::{AshError, Frame, FrameReader, FrameWriter, Inbound};

const VERSION: u8 = 0x00;
const ECHO: u8 = 0x81;

/// Serve one connection as a scripted coprocessor and return its address.
fn spawn_fake_ncp() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
    let addr = listener.local_addr().expect("listener has an address");
    thread::spawn(move || {
        if let Ok((conn, _)) = listener.accept() {
            serve(conn);
        }
    });
    format!("tcp://{addr}")
}

fn serve(conn: TcpStream) {
    conn.set_read_timeout(Some(Duration::from_millis(100)))
        .expect("read timeout should apply");
    let mut writer = FrameWriter::new(conn.try_clone().expect("stream should clone"));
    let mut reader = FrameReader::new(conn);
    let (mut rx_next, mut tx_next) = (0u8, 0u8);

    loop {
        let frame = match reader.read_frame() {
            Ok(Inbound::Frame(frame)) => frame,
            Ok(_) => continue,
            Err(AshError::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                continue
            }
            Err(_) => return,
        };
        let payload = match frame {
            Frame::Reset => {
                rx_next = 0;
                tx_next = 0;
                let _ = writer.write_frame(&Frame::ResetAck {
                    version: 2,
                    code: 0x0B,
                });
                continue;
            }
            Frame::Data {
                frame_num, payload, ..
            } if frame_num == rx_next => payload,
            Frame::Data { .. } => {
                let _ = writer.write_frame(&Frame::Ack { ack_num: rx_next });
                continue;
            }
            _ => continue,
        };
        rx_next = (rx_next + 1) & 7;

        let (seq, id, params) = (payload[0], payload[2], &payload[3..]);
        let replies: Vec<Vec<u8>> = match id {
            VERSION => vec![
                vec![seq, 0x80, VERSION, params[0], 0x02, 0x30, 0x67],
                // stackStatusHandler(networkUp), unsolicited.
                vec![seq, 0x90, 0x19, 0x90],
            ],
            ECHO => {
                let mut reply = vec![seq, 0x80, ECHO, params.len() as u8];
                reply.extend_from_slice(params);
                vec![reply]
            }
            _ => vec![vec![seq, 0x80, 0x58, 0x31]],
        };
        for reply in replies {
            let _ = writer.write_frame(&Frame::Data {
                frame_num: tx_next,
                ack_num: rx_next,
                retransmit: false,
                payload: Bytes::from(reply),
            });
            tx_next = (tx_next + 1) & 7;
        }
    }
}

fn ncplink(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ncplink"))
        .args(["--log-level", "error", "--format", "json"])
        .args(args)
        .env_remove("NCPLINK_DEVICE")
        .env_remove("NCPLINK_BAUD")
        .output()
        .expect("ncplink should run")
}

#[test]
fn version_prints_package_version() {
    let output = ncplink(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn probe_reports_coprocessor_version() {
    let device = spawn_fake_ncp();
    let output = ncplink(&["probe", &device]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"protocol_version\":4"));
    assert!(stdout.contains("\"stack_version\":\"6.7.3.0\""));
    assert!(stdout.contains("\"reset_reason\":\"software\""));
    assert!(stdout.contains("\"transport\":\"tcp\""));
}

#[test]
fn send_prints_echo_reply() {
    let device = spawn_fake_ncp();
    let output = ncplink(&["send", &device, "--command", "0x81", "--data", "cafe"]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"command\":\"echo\""));
    assert!(stdout.contains("\"data\":\"02cafe\""));
}

#[test]
fn rejected_command_exits_60() {
    let device = spawn_fake_ncp();
    let output = ncplink(&["send", &device, "--command", "0xF0"]);

    assert_eq!(output.status.code(), Some(60));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid frame id"));
}

#[test]
fn listen_prints_callbacks() {
    let device = spawn_fake_ncp();
    let output = ncplink(&["listen", &device, "--count", "1"]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"callback\":\"stackStatusHandler\""));
    assert!(stdout.contains("\"kind\":\"async\""));
    assert!(stdout.contains("\"data\":\"90\""));
}

#[test]
fn unreachable_bridge_exits_3() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        listener.local_addr().expect("listener has an address").port()
    };
    let output = ncplink(&["probe", &format!("tcp://127.0.0.1:{port}")]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn bad_hex_is_usage_error() {
    let output = ncplink(&["send", "tcp://127.0.0.1:9", "--command", "5", "--data", "xyz"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn out_of_range_timeout_is_usage_error() {
    let device = spawn_fake_ncp();
    let output = ncplink(&["probe", &device, "--timeout", "30s"]);
    assert_eq!(output.status.code(), Some(64));
}
