//! Terminator-delimited reads shared by the serial sensor and the SCPI
//! transports.
use std::io::{self, Read};
use std::time::{Duration, Instant};
use tracing::trace;

/// Outcome of [`read_terminated`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LineRead {
    /// Bytes up to and including the terminator
    Complete(Vec<u8>),
    /// Deadline passed first; holds whatever arrived
    TimedOut(Vec<u8>),
}

/// Read one byte at a time until `terminator` or until `timeout` elapses.
///
/// Port-level timeouts (`TimedOut`, `WouldBlock`) and `Interrupted` only end
/// the wait once the overall deadline has passed. A zero-length read is
/// reported as `UnexpectedEof`.
pub(crate) fn read_terminated<R: Read + ?Sized>(
    reader: &mut R,
    terminator: u8,
    timeout: Duration,
) -> io::Result<LineRead> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    let start = Instant::now();

    loop {
        if start.elapsed() > timeout {
            trace!(bytes = line.len(), "line read timed out");
            return Ok(LineRead::TimedOut(line));
        }

        match reader.read(&mut byte) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "device closed the stream",
                ))
            }
            Ok(_) => {
                line.push(byte[0]);
                if byte[0] == terminator {
                    return Ok(LineRead::Complete(line));
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                continue
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Yields its chunks one read at a time, with a timeout between each.
    struct Trickle {
        chunks: Vec<Vec<u8>>,
        pending_timeout: bool,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pending_timeout {
                self.pending_timeout = false;
                return Err(io::Error::new(io::ErrorKind::TimedOut, "port timeout"));
            }
            if self.chunks.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "port timeout"));
            }
            let chunk = &mut self.chunks[0];
            buf[0] = chunk.remove(0);
            if chunk.is_empty() {
                self.chunks.remove(0);
                self.pending_timeout = true;
            }
            Ok(1)
        }
    }

    #[test]
    fn stops_at_terminator() {
        let mut cursor = Cursor::new(b"12.3\r\n45.6\n".to_vec());
        let first = read_terminated(&mut cursor, b'\n', Duration::from_secs(1)).unwrap();
        assert_eq!(first, LineRead::Complete(b"12.3\r\n".to_vec()));
        let second = read_terminated(&mut cursor, b'\n', Duration::from_secs(1)).unwrap();
        assert_eq!(second, LineRead::Complete(b"45.6\n".to_vec()));
    }

    #[test]
    fn port_timeouts_do_not_end_the_line() {
        let mut reader = Trickle {
            chunks: vec![b"8.".to_vec(), b"0\n".to_vec()],
            pending_timeout: false,
        };
        let line = read_terminated(&mut reader, b'\n', Duration::from_secs(1)).unwrap();
        assert_eq!(line, LineRead::Complete(b"8.0\n".to_vec()));
    }

    #[test]
    fn deadline_returns_partial_bytes() {
        let mut reader = Trickle {
            chunks: vec![b"8.".to_vec()],
            pending_timeout: false,
        };
        let line = read_terminated(&mut reader, b'\n', Duration::from_millis(20)).unwrap();
        assert_eq!(line, LineRead::TimedOut(b"8.".to_vec()));
    }

    #[test]
    fn eof_is_an_error() {
        let mut cursor = Cursor::new(b"abc".to_vec());
        let err = read_terminated(&mut cursor, b'\n', Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
