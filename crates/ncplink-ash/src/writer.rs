use std::io::{ErrorKind, Write};
use std::thread;
use std::time::Duration;

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{encode_frame, Frame, CANCEL, MAX_FRAME_LEN};
use crate::error::{AshError, Result};

/// First pause after a `WouldBlock`; doubles up to [`MAX_BACKOFF`].
const MIN_BACKOFF: Duration = Duration::from_millis(1);
const MAX_BACKOFF: Duration = Duration::from_millis(16);

/// Writes complete frames to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(MAX_FRAME_LEN * 2 + 1),
        }
    }

    /// Encode, write and flush one frame (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.buf.clear();
        encode_frame(frame, &mut self.buf)?;
        trace!(kind = frame.kind(), control = frame.control(), bytes = self.buf.len(), "tx frame");

        let wire = self.buf.split();
        self.write_all(&wire)?;
        self.flush()
    }

    /// Send the out-of-band cancel byte that aborts whatever frame the
    /// peer is currently receiving.
    pub fn send_cancel(&mut self) -> Result<()> {
        self.write_all(&[CANCEL])?;
        self.flush()
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        let mut backoff = MIN_BACKOFF;
        while offset < bytes.len() {
            match self.inner.write(&bytes[offset..]) {
                Ok(0) => return Err(AshError::ConnectionClosed),
                Ok(n) => {
                    offset += n;
                    backoff = MIN_BACKOFF;
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => back_off(&mut backoff),
                Err(err) => return Err(AshError::Io(err)),
            }
        }
        Ok(())
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        let mut backoff = MIN_BACKOFF;
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => back_off(&mut backoff),
                Err(err) => return Err(AshError::Io(err)),
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

fn back_off(delay: &mut Duration) {
    trace!(?delay, "write would block");
    thread::sleep(*delay);
    *delay = (*delay * 2).min(MAX_BACKOFF);
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    use bytes::Bytes;

    use super::*;
    use crate::codec::Inbound;
    use crate::reader::FrameReader;

    #[test]
    fn writes_reference_bytes() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));
        writer.send_cancel().unwrap();
        writer.write_frame(&Frame::Reset).unwrap();

        let bytes = writer.into_inner().into_inner();
        assert_eq!(bytes, [0x1A, 0xC0, 0x38, 0xBC, 0x7E]);
    }

    #[test]
    fn written_frames_read_back() {
        let frame = Frame::Data {
            frame_num: 5,
            ack_num: 2,
            retransmit: true,
            payload: Bytes::from_static(&[0x01, 0x00, 0x06]),
        };
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));
        writer.write_frame(&frame).unwrap();
        writer.write_frame(&Frame::Ack { ack_num: 6 }).unwrap();

        let mut reader = FrameReader::new(Cursor::new(writer.into_inner().into_inner()));
        assert_eq!(reader.read_frame().unwrap(), Inbound::Frame(frame));
        assert_eq!(
            reader.read_frame().unwrap(),
            Inbound::Frame(Frame::Ack { ack_num: 6 })
        );
    }

    #[test]
    fn oversized_payload_not_written() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));
        let frame = Frame::Data {
            frame_num: 0,
            ack_num: 0,
            retransmit: false,
            payload: Bytes::from(vec![0u8; 200]),
        };
        let err = writer.write_frame(&frame).unwrap_err();
        assert!(matches!(err, AshError::PayloadTooLarge { .. }));
        assert!(writer.get_ref().get_ref().is_empty());
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = FrameWriter::new(sink);

        writer.write_frame(&Frame::Ack { ack_num: 0 }).unwrap();

        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn retries_interrupted_and_would_block() {
        let mut writer = FrameWriter::new(FlakyWriter {
            failures: vec![ErrorKind::Interrupted, ErrorKind::WouldBlock],
            data: Vec::new(),
        });
        writer.write_frame(&Frame::Reset).unwrap();
        assert_eq!(writer.into_inner().data, [0xC0, 0x38, 0xBC, 0x7E]);
    }

    #[test]
    fn would_block_pauses_between_retries() {
        let mut writer = FrameWriter::new(FlakyWriter {
            failures: vec![ErrorKind::WouldBlock; 4],
            data: Vec::new(),
        });
        let started = Instant::now();
        writer.write_frame(&Frame::Reset).unwrap();

        // 1 + 2 + 4 + 8 ms of backoff.
        assert!(started.elapsed() >= Duration::from_millis(15));
        assert_eq!(writer.into_inner().data, [0xC0, 0x38, 0xBC, 0x7E]);
    }

    #[test]
    fn write_timeout_is_fatal_io() {
        let mut writer = FrameWriter::new(FlakyWriter {
            failures: vec![ErrorKind::TimedOut],
            data: Vec::new(),
        });
        let err = writer.write_frame(&Frame::Reset).unwrap_err();
        assert!(matches!(err, AshError::Io(ref io) if io.kind() == ErrorKind::TimedOut));
        assert!(err.is_fatal());
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer.write_frame(&Frame::Reset).unwrap_err();
        assert!(matches!(err, AshError::ConnectionClosed));
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
        data: Vec<u8>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FlakyWriter {
        failures: Vec<ErrorKind>,
        data: Vec<u8>,
    }

    impl Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if let Some(kind) = self.failures.pop() {
                return Err(std::io::Error::from(kind));
            }
            // Accept one byte at a time to exercise the partial write loop.
            self.data.push(buf[0]);
            Ok(1)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
