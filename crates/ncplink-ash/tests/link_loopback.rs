#![cfg(unix)]

use std::io::{ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::Receiver;
use ncplink_ash::{
    AshError, DeliveryError, Frame, FrameReader, FrameWriter, Inbound, Link, LinkConfig,
    PayloadSink, ProtocolFault,
};
use ncplink_transport::SerialStream;

/// The coprocessor end of a socket pair.
struct FakeNcp {
    reader: FrameReader<UnixStream>,
    writer: FrameWriter<UnixStream>,
}

impl FakeNcp {
    fn new(stream: UnixStream) -> Self {
        stream
            .set_read_timeout(Some(Duration::from_secs(3)))
            .unwrap();
        let writer = FrameWriter::new(stream.try_clone().unwrap());
        Self {
            reader: FrameReader::new(stream),
            writer,
        }
    }

    fn expect(&mut self) -> Frame {
        match self.reader.read_frame().unwrap() {
            Inbound::Frame(frame) => frame,
            other => panic!("expected a frame, got {other:?}"),
        }
    }

    fn send(&mut self, frame: Frame) {
        self.writer.write_frame(&frame).unwrap();
    }

    /// Write bytes as-is, bypassing the encoder.
    fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.get_mut().write_all(bytes).unwrap();
    }

    /// Assert the host sends nothing for `window`.
    fn expect_silence(&mut self, window: Duration) {
        let stream = self.reader.get_mut();
        stream.set_read_timeout(Some(window)).unwrap();
        match self.reader.read_frame() {
            Err(AshError::Io(err)) => {
                assert!(matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut))
            }
            other => panic!("expected silence, got {other:?}"),
        }
        self.reader
            .get_mut()
            .set_read_timeout(Some(Duration::from_secs(3)))
            .unwrap();
    }

    fn accept_reset(&mut self) {
        assert_eq!(self.expect(), Frame::Reset);
        self.send(Frame::ResetAck {
            version: 2,
            code: 0x0B,
        });
    }
}

fn config() -> LinkConfig {
    LinkConfig {
        tick_interval: Duration::from_millis(10),
        retransmit_timeout: Duration::from_millis(300),
        reset_attempts: 3,
        reset_timeout: Duration::from_millis(500),
        write_timeout: Duration::from_millis(500),
    }
}

fn channel_sink() -> (Arc<dyn PayloadSink>, Receiver<Bytes>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let sink = move |payload: Bytes| -> Result<(), DeliveryError> {
        tx.send(payload)?;
        Ok(())
    };
    (Arc::new(sink), rx)
}

fn connected_link() -> (Link, FakeNcp, Receiver<Bytes>) {
    let (host, ncp) = UnixStream::pair().unwrap();
    let mut ncp = FakeNcp::new(ncp);
    let (sink, delivered) = channel_sink();
    let link = Link::spawn(SerialStream::from_unix(host), config(), sink).unwrap();

    let handshake = std::thread::spawn(move || {
        ncp.accept_reset();
        ncp
    });
    assert_eq!(link.reset().unwrap(), 0x0B);
    let ncp = handshake.join().unwrap();
    assert!(link.is_connected());
    (link, ncp, delivered)
}

#[test]
fn reset_then_exchange_data() {
    let (link, mut ncp, delivered) = connected_link();

    link.submit(&[0x00, 0x00, 0x00, 0x04][..]).unwrap();
    assert_eq!(
        ncp.expect(),
        Frame::Data {
            frame_num: 0,
            ack_num: 0,
            retransmit: false,
            payload: Bytes::from_static(&[0x00, 0x00, 0x00, 0x04]),
        }
    );

    ncp.send(Frame::Data {
        frame_num: 0,
        ack_num: 1,
        retransmit: false,
        payload: Bytes::from_static(b"reply"),
    });
    let got = delivered.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(got.as_ref(), b"reply");
    assert_eq!(ncp.expect(), Frame::Ack { ack_num: 1 });

    let counters = link.counters().unwrap();
    assert_eq!(counters.data_sent, 1);
    assert_eq!(counters.data_received, 1);
}

#[test]
fn nak_causes_retransmission() {
    let (link, mut ncp, _delivered) = connected_link();

    link.submit(&b"abc"[..]).unwrap();
    assert!(matches!(ncp.expect(), Frame::Data { frame_num: 0, retransmit: false, .. }));

    ncp.send(Frame::Nak { ack_num: 0 });
    assert!(matches!(ncp.expect(), Frame::Data { frame_num: 0, retransmit: true, .. }));

    ncp.send(Frame::Ack { ack_num: 1 });
    link.submit(&b"def"[..]).unwrap();
    assert!(matches!(ncp.expect(), Frame::Data { frame_num: 1, retransmit: false, .. }));
}

#[test]
fn unacknowledged_frame_is_retransmitted_after_timeout() {
    let (link, mut ncp, _delivered) = connected_link();

    link.submit(&b"abc"[..]).unwrap();
    assert!(matches!(ncp.expect(), Frame::Data { retransmit: false, .. }));
    // No ACK: the retransmit timer fires.
    assert!(matches!(ncp.expect(), Frame::Data { retransmit: true, .. }));
    assert!(link.counters().unwrap().retransmissions >= 1);
}

/// DATA frame with a broken checksum.
const CORRUPT_DATA: [u8; 5] = [0x07, 0x42, 0x00, 0x00, 0x7E];

fn data(frame_num: u8, retransmit: bool, payload: &'static [u8]) -> Frame {
    Frame::Data {
        frame_num,
        ack_num: 0,
        retransmit,
        payload: Bytes::from_static(payload),
    }
}

#[test]
fn corrupt_frame_is_nakked() {
    let (_link, mut ncp, delivered) = connected_link();

    ncp.send_raw(&CORRUPT_DATA);
    assert_eq!(ncp.expect(), Frame::Nak { ack_num: 0 });
    assert!(delivered.try_recv().is_err());
}

#[test]
fn retransmitted_duplicate_acked_while_rejecting() {
    let (link, mut ncp, delivered) = connected_link();

    ncp.send(data(0, false, b"one"));
    assert_eq!(delivered.recv_timeout(Duration::from_secs(2)).unwrap().as_ref(), b"one");
    assert_eq!(ncp.expect(), Frame::Ack { ack_num: 1 });

    ncp.send_raw(&CORRUPT_DATA);
    assert_eq!(ncp.expect(), Frame::Nak { ack_num: 1 });

    // Host still rejecting; the peer resends frame 0 as if our ACK was lost.
    ncp.send(data(0, true, b"one"));
    assert_eq!(ncp.expect(), Frame::Ack { ack_num: 1 });
    assert!(delivered.try_recv().is_err());

    let counters = link.counters().unwrap();
    assert_eq!(counters.duplicates, 1);
    assert_eq!(counters.naks_sent, 1);
}

#[test]
fn gap_gets_one_nak_until_expected_frame() {
    let (link, mut ncp, delivered) = connected_link();

    ncp.send(data(1, false, b"b"));
    assert_eq!(ncp.expect(), Frame::Nak { ack_num: 0 });

    ncp.send(data(2, false, b"c"));
    ncp.expect_silence(Duration::from_millis(100));
    assert!(delivered.try_recv().is_err());

    ncp.send(data(0, true, b"a"));
    assert_eq!(delivered.recv_timeout(Duration::from_secs(2)).unwrap().as_ref(), b"a");
    assert_eq!(ncp.expect(), Frame::Ack { ack_num: 1 });
    assert_eq!(link.counters().unwrap().naks_sent, 1);
}

#[test]
fn repeated_reset_ack_after_connect_keeps_session() {
    let (link, mut ncp, _delivered) = connected_link();
    let faults = link.faults();

    // A second answer to the same handshake.
    ncp.send(Frame::ResetAck {
        version: 2,
        code: 0x0B,
    });
    link.submit(&b"x"[..]).unwrap();
    assert!(matches!(ncp.expect(), Frame::Data { frame_num: 0, .. }));
    assert!(link.is_connected());
    assert!(faults.try_recv().is_err());
}

#[test]
fn unsolicited_reset_ack_surfaces_fault_and_reset_recovers() {
    let (link, mut ncp, _delivered) = connected_link();
    let faults = link.faults();

    ncp.send(Frame::ResetAck {
        version: 2,
        code: 0x03,
    });
    let fault = faults.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(matches!(
        fault,
        AshError::Protocol(ProtocolFault::PeerReset { code: 0x03 })
    ));
    assert!(!link.is_connected());
    assert!(matches!(link.submit(&b"x"[..]), Err(AshError::NotConnected)));

    let handshake = std::thread::spawn(move || {
        ncp.accept_reset();
        ncp
    });
    assert_eq!(link.reset().unwrap(), 0x0B);
    let _ncp = handshake.join().unwrap();
    link.submit(&b"x"[..]).unwrap();
}

#[test]
fn error_frame_is_fatal() {
    let (link, mut ncp, _delivered) = connected_link();
    let faults = link.faults();

    ncp.send(Frame::Error {
        version: 2,
        code: 0x51,
    });
    let fault = faults.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(matches!(fault, AshError::PeerError { code: 0x51, .. }));
    assert!(fault.is_fatal());
}

#[test]
fn rejected_delivery_closes_session() {
    let (host, ncp) = UnixStream::pair().unwrap();
    let mut ncp = FakeNcp::new(ncp);
    let sink = |_payload: Bytes| -> Result<(), DeliveryError> { Err("undecodable".into()) };
    let link = Link::spawn(SerialStream::from_unix(host), config(), Arc::new(sink)).unwrap();
    let faults = link.faults();

    let handshake = std::thread::spawn(move || {
        ncp.accept_reset();
        ncp
    });
    link.reset().unwrap();
    let mut ncp = handshake.join().unwrap();

    ncp.send(Frame::Data {
        frame_num: 0,
        ack_num: 0,
        retransmit: false,
        payload: Bytes::from_static(b"junk"),
    });
    let fault = faults.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(matches!(
        fault,
        AshError::Protocol(ProtocolFault::Delivery(ref msg)) if msg == "undecodable"
    ));
}
