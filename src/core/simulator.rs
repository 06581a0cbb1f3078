//! Scripted in-memory stream
//!
//! Replays a fixed sequence of chunks, one per `read`, then either times
//! out or reports end of stream. Everything written is captured. Useful for
//! testing scanner-driven code without a device on the other end.

use super::transport::ExpectStream;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

/// What a [`ScriptedStream`] does once its chunks run out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamEnd {
    /// Every further read fails with `WouldBlock`
    #[default]
    Timeout,
    /// Every further read returns `Ok(0)`
    Close,
}

/// In-memory [`ExpectStream`] that replays chunks
#[derive(Debug, Default)]
pub struct ScriptedStream {
    chunks: VecDeque<Vec<u8>>,
    end: StreamEnd,
    written: Vec<u8>,
    read_timeout: Option<Duration>,
    reads: usize,
}

impl ScriptedStream {
    /// Create a stream that hands out `chunks` in order, then behaves as `end`.
    pub fn new<I, C>(chunks: I, end: StreamEnd) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        Self {
            chunks: chunks.into_iter().map(|c| c.as_ref().to_vec()).collect(),
            end,
            ..Self::default()
        }
    }

    /// Start with a read timeout already configured
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Queue another chunk
    pub fn push_chunk(&mut self, chunk: impl AsRef<[u8]>) {
        self.chunks.push_back(chunk.as_ref().to_vec());
    }

    /// Everything written so far
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Number of successful reads that returned data
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Chunks not yet read
    pub fn remaining(&self) -> usize {
        self.chunks.len()
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(mut chunk) = self.chunks.pop_front() else {
            return match self.end {
                StreamEnd::Timeout => Err(io::Error::new(
                    io::ErrorKind::WouldBlock,
                    "scripted read timeout",
                )),
                StreamEnd::Close => Ok(0),
            };
        };

        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.chunks.push_front(chunk.split_off(n));
        }
        if n > 0 {
            self.reads += 1;
        }
        Ok(n)
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ExpectStream for ScriptedStream {
    fn read_timeout(&self) -> io::Result<Option<Duration>> {
        Ok(self.read_timeout)
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.read_timeout = timeout;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_then_timeout() {
        let mut s = ScriptedStream::new([b"ab".as_slice(), b"c"], StreamEnd::Timeout);
        let mut buf = [0u8; 8];

        assert_eq!(s.read(&mut buf).unwrap(), 2);
        assert_eq!(s.read(&mut buf).unwrap(), 1);
        assert_eq!(
            s.read(&mut buf).unwrap_err().kind(),
            io::ErrorKind::WouldBlock
        );
        assert_eq!(s.reads(), 2);
    }

    #[test]
    fn test_oversized_chunk_is_split() {
        let mut s = ScriptedStream::new(["hello"], StreamEnd::Close);
        let mut buf = [0u8; 3];

        assert_eq!(s.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"hel");
        assert_eq!(s.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"lo");
        assert_eq!(s.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_writes_captured() {
        let mut s = ScriptedStream::default();
        s.write_all(b"ID\r\n").unwrap();
        assert_eq!(s.written(), b"ID\r\n");
        assert_eq!(s.read_timeout().unwrap(), None);
    }
}
