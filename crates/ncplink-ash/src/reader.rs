use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use crate::codec::{FrameDecoder, Inbound};
use crate::error::{AshError, Result};

const READ_CHUNK_SIZE: usize = 256;

/// Reads frames from any `Read` byte stream.
///
/// Bytes are unstuffed and checked as they arrive; callers get one
/// [`Inbound`] item per flag-terminated frame.
pub struct FrameReader<T> {
    inner: T,
    decoder: FrameDecoder,
    ready: VecDeque<Inbound>,
}

impl<T: Read> FrameReader<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::new(),
            ready: VecDeque::new(),
        }
    }

    /// Read the next frame (blocking).
    ///
    /// Returns `Err(AshError::ConnectionClosed)` at end of stream. Read
    /// timeouts surface as `AshError::Io` with `TimedOut` or `WouldBlock`;
    /// the partial frame is kept and reading can continue.
    pub fn read_frame(&mut self) -> Result<Inbound> {
        loop {
            if let Some(item) = self.ready.pop_front() {
                return Ok(item);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(AshError::Io(err)),
            };

            if read == 0 {
                return Err(AshError::ConnectionClosed);
            }

            for &byte in &chunk[..read] {
                if let Some(item) = self.decoder.push(byte) {
                    self.ready.push_back(item);
                }
            }
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

/// True for the errors a read timeout produces.
pub fn is_timeout(err: &AshError) -> bool {
    matches!(err, AshError::Io(io) if matches!(io.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::{Bytes, BytesMut};

    use super::*;
    use crate::codec::{encode_frame, Corruption, Frame};

    fn wire(frames: &[Frame]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for frame in frames {
            encode_frame(frame, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    fn data(frame_num: u8, payload: &'static [u8]) -> Frame {
        Frame::Data {
            frame_num,
            ack_num: 0,
            retransmit: false,
            payload: Bytes::from_static(payload),
        }
    }

    #[test]
    fn reads_frames_in_order() {
        let frames = [data(0, b"one"), Frame::Ack { ack_num: 1 }, data(1, b"two")];
        let mut reader = FrameReader::new(Cursor::new(wire(&frames)));

        for expected in frames {
            assert_eq!(reader.read_frame().unwrap(), Inbound::Frame(expected));
        }
        assert!(matches!(
            reader.read_frame().unwrap_err(),
            AshError::ConnectionClosed
        ));
    }

    #[test]
    fn partial_read_handling() {
        let bytes = wire(&[data(3, b"slow")]);
        let mut reader = FrameReader::new(ByteByByteReader { bytes, pos: 0 });
        assert_eq!(reader.read_frame().unwrap(), Inbound::Frame(data(3, b"slow")));
    }

    #[test]
    fn corrupt_frame_then_good_frame() {
        let mut bytes = vec![0xC0, 0x00, 0x00, 0x7E];
        bytes.extend(wire(&[Frame::Reset]));
        let mut reader = FrameReader::new(Cursor::new(bytes));

        assert!(matches!(
            reader.read_frame().unwrap(),
            Inbound::Corrupt(Corruption::BadCrc { .. })
        ));
        assert_eq!(reader.read_frame().unwrap(), Inbound::Frame(Frame::Reset));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let mut bytes = wire(&[data(0, b"cut")]);
        bytes.truncate(3);
        let mut reader = FrameReader::new(Cursor::new(bytes));
        assert!(matches!(
            reader.read_frame().unwrap_err(),
            AshError::ConnectionClosed
        ));
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedThenData {
            interrupted: false,
            inner: Cursor::new(wire(&[Frame::Nak { ack_num: 2 }])),
        };
        let mut framed = FrameReader::new(reader);
        assert_eq!(
            framed.read_frame().unwrap(),
            Inbound::Frame(Frame::Nak { ack_num: 2 })
        );
    }

    #[test]
    #[cfg(unix)]
    fn timeout_keeps_partial_frame() {
        use std::io::Write;
        use std::os::unix::net::UnixStream;
        use std::time::Duration;

        let (mut left, right) = UnixStream::pair().unwrap();
        right
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        let mut reader = FrameReader::new(right);

        let bytes = wire(&[Frame::Ack { ack_num: 4 }]);
        left.write_all(&bytes[..2]).unwrap();
        let err = reader.read_frame().unwrap_err();
        assert!(is_timeout(&err));

        left.write_all(&bytes[2..]).unwrap();
        assert_eq!(
            reader.read_frame().unwrap(),
            Inbound::Frame(Frame::Ack { ack_num: 4 })
        );
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }
}
