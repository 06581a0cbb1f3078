//! Expect-style scanner over a blocking stream
//!
//! A [`Scanner`] reads from a stream in chunks, searches everything read so
//! far for a regular expression, and splits the buffer at the match:
//! `before` holds the bytes ahead of the match, `after` holds the match and
//! whatever arrived behind it. `after` survives between calls, so the next
//! [`Scanner::expect`] searches leftover data before reading again.
//!
//! Each `expect` ends in exactly one of three ways: a match, a read timeout
//! ([`ExpectError::Timeout`]) or a read that adds nothing
//! ([`ExpectError::StreamEnded`]).

use super::logger::Logger;
use super::transport::{is_timeout, ExpectStream};
use crate::config::{ConfigError, ScannerConfig};
use crate::utils::escape_bytes;
use bytes::{Buf, BytesMut};
use regex::bytes::{Regex, RegexBuilder};
use std::borrow::Cow;
use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Errors from [`Scanner`] operations
#[derive(Error, Debug)]
pub enum ExpectError {
    /// The stream's read timeout elapsed before the pattern showed up
    #[error("timed out waiting for {pattern:?}, received \"{}\"", escape_bytes(.received))]
    Timeout {
        /// Pattern that was sought
        pattern: String,
        /// Contents of `after` when the timeout hit
        received: Vec<u8>,
    },

    /// A read returned no new bytes (peer closed) before the pattern showed up
    #[error("stream ended before {pattern:?} was found in \"{}\"", escape_bytes(.received))]
    StreamEnded {
        /// Pattern that was sought
        pattern: String,
        /// Contents of `after` when the stream ended
        received: Vec<u8>,
    },

    /// Pattern failed to compile
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Scanner configuration could not be applied
    #[error("invalid scanner configuration: {0}")]
    Config(#[from] ConfigError),

    /// Any other stream error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ExpectError {
    /// True for [`ExpectError::Timeout`]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// True for [`ExpectError::StreamEnded`]
    pub fn is_stream_ended(&self) -> bool {
        matches!(self, Self::StreamEnded { .. })
    }

    /// Bytes accumulated when a timeout or stream end stopped the scan
    pub fn received(&self) -> Option<&[u8]> {
        match self {
            Self::Timeout { received, .. } | Self::StreamEnded { received, .. } => Some(received),
            _ => None,
        }
    }

    /// The pattern that was sought, for timeout and stream end
    pub fn pattern(&self) -> Option<&str> {
        match self {
            Self::Timeout { pattern, .. } | Self::StreamEnded { pattern, .. } => Some(pattern),
            _ => None,
        }
    }
}

/// A pattern handed to [`Scanner::expect`]
///
/// Raw patterns are compiled on every call with Unicode mode off, so `.`
/// matches any byte except `\n` and `\xNN` matches the raw byte. Bytes that
/// are not valid UTF-8 match themselves. Precompile with
/// [`Pattern::compile`] (or pass your own [`Regex`]) to pay that once.
#[derive(Debug, Clone)]
pub enum Pattern<'a> {
    /// Already compiled
    Compiled(&'a Regex),
    /// Source text, compiled on use
    Raw(Cow<'a, [u8]>),
}

impl<'a> Pattern<'a> {
    /// Compile a byte-oriented regex with the scanner's settings.
    pub fn compile(source: &str) -> Result<Regex, ExpectError> {
        Ok(RegexBuilder::new(source).unicode(false).build()?)
    }

    fn resolve(&self) -> Result<Cow<'a, Regex>, ExpectError> {
        match self {
            Self::Compiled(re) => Ok(Cow::Borrowed(*re)),
            Self::Raw(source) => Ok(Cow::Owned(Self::compile(&pattern_source(source))?)),
        }
    }
}

/// Regex source for raw pattern bytes: valid UTF-8 runs are kept and every
/// other byte becomes a `\xNN` literal.
fn pattern_source(mut bytes: &[u8]) -> Cow<'_, str> {
    use std::fmt::Write as _;

    if let Ok(source) = std::str::from_utf8(bytes) {
        return Cow::Borrowed(source);
    }

    let mut out = String::with_capacity(bytes.len() * 2);
    while !bytes.is_empty() {
        match std::str::from_utf8(bytes) {
            Ok(valid) => {
                out.push_str(valid);
                break;
            }
            Err(e) => {
                let (valid, rest) = bytes.split_at(e.valid_up_to());
                out.push_str(&String::from_utf8_lossy(valid));
                let bad = e.error_len().unwrap_or(rest.len());
                for &b in &rest[..bad] {
                    // A backslash in front of the byte escapes it to itself.
                    let trailing = out.bytes().rev().take_while(|&c| c == b'\\').count();
                    if trailing % 2 == 1 {
                        out.pop();
                    }
                    let _ = write!(out, "\\x{b:02X}");
                }
                bytes = &rest[bad..];
            }
        }
    }
    Cow::Owned(out)
}

impl fmt::Display for Pattern<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compiled(re) => f.write_str(re.as_str()),
            Self::Raw(source) => f.write_str(&pattern_source(source)),
        }
    }
}

impl<'a> From<&'a Regex> for Pattern<'a> {
    fn from(re: &'a Regex) -> Self {
        Self::Compiled(re)
    }
}

impl<'a> From<&'a [u8]> for Pattern<'a> {
    fn from(source: &'a [u8]) -> Self {
        Self::Raw(Cow::Borrowed(source))
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Pattern<'a> {
    fn from(source: &'a [u8; N]) -> Self {
        Self::Raw(Cow::Borrowed(source.as_slice()))
    }
}

impl<'a> From<&'a str> for Pattern<'a> {
    fn from(source: &'a str) -> Self {
        Self::Raw(Cow::Borrowed(source.as_bytes()))
    }
}

impl From<String> for Pattern<'_> {
    fn from(source: String) -> Self {
        Self::Raw(Cow::Owned(source.into_bytes()))
    }
}

impl From<Vec<u8>> for Pattern<'_> {
    fn from(source: Vec<u8>) -> Self {
        Self::Raw(Cow::Owned(source))
    }
}

/// Non-fatal conditions noticed by the scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScannerWarning {
    /// The stream had no read timeout and the default was applied
    TimeoutDefaulted(Duration),
}

impl fmt::Display for ScannerWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimeoutDefaulted(timeout) => write!(
                f,
                "changed stream read timeout from None to {} s",
                timeout.as_secs_f64()
            ),
        }
    }
}

/// Expect-style scanner over a blocking stream
///
/// The scanner owns its buffers but not the connection: pass a `&mut`
/// borrow to keep using the stream elsewhere, or take it back with
/// [`Scanner::into_inner`]. One scanner must not be driven from two threads
/// at once; independent scanners share nothing.
pub struct Scanner<S: ExpectStream> {
    stream: S,
    terminator: Vec<u8>,
    before: BytesMut,
    after: BytesMut,
    match_len: usize,
    chunk_size: usize,
    max_buffer_size: usize,
    warnings: Vec<ScannerWarning>,
    logger: Option<Logger>,
}

impl<S: ExpectStream> Scanner<S> {
    /// Wrap a connected stream with the default configuration.
    ///
    /// If the stream has no read timeout, one second is applied and a
    /// [`ScannerWarning::TimeoutDefaulted`] is recorded.
    pub fn new(stream: S) -> Result<Self, ExpectError> {
        Self::with_config(stream, &ScannerConfig::default())
    }

    /// Wrap a connected stream, using `terminator` for [`Scanner::send_line`].
    pub fn with_terminator(stream: S, terminator: &[u8]) -> Result<Self, ExpectError> {
        let mut scanner = Self::new(stream)?;
        scanner.terminator = terminator.to_vec();
        Ok(scanner)
    }

    /// Wrap a connected stream using the given configuration.
    ///
    /// Fails with [`ExpectError::Config`] if the terminator does not decode.
    pub fn with_config(mut stream: S, config: &ScannerConfig) -> Result<Self, ExpectError> {
        let terminator = config.terminator_bytes()?;
        let mut warnings = Vec::new();

        if stream.read_timeout()?.is_none() {
            let timeout = config.default_timeout();
            stream.set_read_timeout(Some(timeout))?;
            let warning = ScannerWarning::TimeoutDefaulted(timeout);
            warn!("Scanner: {warning}");
            warnings.push(warning);
        }

        Ok(Self {
            stream,
            terminator,
            before: BytesMut::new(),
            after: BytesMut::new(),
            match_len: 0,
            chunk_size: config.chunk_size.max(1),
            max_buffer_size: config.max_buffer_size,
            warnings,
            logger: None,
        })
    }

    /// Record all traffic into a transcript logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Send raw bytes.
    pub fn send(&mut self, data: &[u8]) -> Result<(), ExpectError> {
        self.stream.write_all(data)?;
        self.stream.flush()?;
        trace!(len = data.len(), "sent");
        if let Some(logger) = &self.logger {
            logger.lock().log_tx(data);
        }
        Ok(())
    }

    /// Send raw bytes followed by the terminator.
    pub fn send_line(&mut self, line: &[u8]) -> Result<(), ExpectError> {
        let mut data = Vec::with_capacity(line.len() + self.terminator.len());
        data.extend_from_slice(line);
        data.extend_from_slice(&self.terminator);
        self.send(&data)
    }

    /// Read until `pattern` matches, the read timeout elapses, or the stream
    /// stops delivering bytes.
    ///
    /// On success `before` holds everything ahead of the match and `after`
    /// starts with the match. On failure `after` holds everything it held
    /// on entry plus everything read during the call, `before` is left
    /// untouched and [`Scanner::matched`] is empty.
    pub fn expect<'p>(&mut self, pattern: impl Into<Pattern<'p>>) -> Result<(), ExpectError> {
        let pattern = pattern.into();
        let regex = pattern.resolve()?;
        self.match_len = 0;

        loop {
            let len = self.after.len();
            if len > 0 {
                if let Some((start, end)) = regex.find(&self.after).map(|m| (m.start(), m.end())) {
                    self.before = self.after.split_to(start);
                    self.match_len = end - start;
                    debug!(
                        pattern = %pattern,
                        before = self.before.len(),
                        matched = self.match_len,
                        "expect matched"
                    );
                    self.note(|| format!("matched {pattern}"));
                    return Ok(());
                }
            }

            if len > self.max_buffer_size.saturating_sub(self.chunk_size) {
                let evict = self.chunk_size.min(len);
                self.after.advance(evict);
                debug!(evicted = evict, kept = self.after.len(), "buffer cap reached");
            }

            // Read straight into the tail of `after`, then cut it back to
            // what actually arrived.
            let len = self.after.len();
            self.after.resize(len + self.chunk_size, 0);
            let read = loop {
                match self.stream.read(&mut self.after[len..]) {
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    other => break other,
                }
            };
            let got = read.as_ref().map_or(0, |&n| n.min(self.chunk_size));
            self.after.truncate(len + got);

            match read {
                Ok(n) => {
                    trace!(len = n, "read");
                    if got > 0 {
                        if let Some(logger) = &self.logger {
                            logger.lock().log_rx(&self.after[len..]);
                        }
                    }
                }
                Err(e) if is_timeout(&e) => {
                    debug!(pattern = %pattern, buffered = len, "expect timed out");
                    self.note(|| format!("timed out waiting for {pattern}"));
                    return Err(ExpectError::Timeout {
                        pattern: pattern.to_string(),
                        received: self.after.to_vec(),
                    });
                }
                Err(e) => return Err(ExpectError::Io(e)),
            }

            if self.after.len() == len {
                debug!(pattern = %pattern, buffered = len, "stream ended");
                self.note(|| format!("stream ended waiting for {pattern}"));
                return Err(ExpectError::StreamEnded {
                    pattern: pattern.to_string(),
                    received: self.after.to_vec(),
                });
            }
        }
    }

    fn note(&self, message: impl FnOnce() -> String) {
        if let Some(logger) = &self.logger {
            logger.lock().log_info(&message());
        }
    }

    /// Bytes ahead of the most recent match
    pub fn before(&self) -> &[u8] {
        &self.before
    }

    /// Mutable access to `before`
    pub fn before_mut(&mut self) -> &mut BytesMut {
        &mut self.before
    }

    /// The most recent match plus anything read behind it
    pub fn after(&self) -> &[u8] {
        &self.after
    }

    /// Mutable access to `after`; changes here are what the next `expect`
    /// searches first. Forgets the current match.
    pub fn after_mut(&mut self) -> &mut BytesMut {
        self.match_len = 0;
        &mut self.after
    }

    /// The text matched by the last `expect`.
    ///
    /// Empty once an `expect` fails or `after` is edited through
    /// [`Scanner::after_mut`].
    pub fn matched(&self) -> &[u8] {
        &self.after[..self.match_len.min(self.after.len())]
    }

    /// Drop everything buffered: `before`, `after` and the match.
    pub fn clear(&mut self) {
        self.before.clear();
        self.after.clear();
        self.match_len = 0;
    }

    /// Maximum bytes requested per read
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Change the read size; zero is treated as one.
    pub fn set_chunk_size(&mut self, size: usize) {
        self.chunk_size = size.max(1);
    }

    /// Soft cap on buffered bytes
    pub fn max_buffer_size(&self) -> usize {
        self.max_buffer_size
    }

    /// Change the buffer cap
    pub fn set_max_buffer_size(&mut self, size: usize) {
        self.max_buffer_size = size;
    }

    /// Bytes appended by [`Scanner::send_line`]
    pub fn terminator(&self) -> &[u8] {
        &self.terminator
    }

    /// Change the line terminator
    pub fn set_terminator(&mut self, terminator: &[u8]) {
        self.terminator = terminator.to_vec();
    }

    /// The stream's current read timeout
    pub fn timeout(&self) -> io::Result<Option<Duration>> {
        self.stream.read_timeout()
    }

    /// Change the stream's read timeout
    pub fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.stream.set_read_timeout(Some(timeout))
    }

    /// Warnings raised while setting up the scanner
    pub fn warnings(&self) -> &[ScannerWarning] {
        &self.warnings
    }

    /// Borrow the stream
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Mutably borrow the stream
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Give the stream back
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: ExpectStream> fmt::Debug for Scanner<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scanner")
            .field("before", &escape_bytes(&self.before))
            .field("after", &escape_bytes(&self.after))
            .field("chunk_size", &self.chunk_size)
            .field("max_buffer_size", &self.max_buffer_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::simulator::{ScriptedStream, StreamEnd};
    use mockall::mock;
    use mockall::predicate::eq;
    use std::io::{Read, Write};

    mock! {
        Stream {}

        impl Read for Stream {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
        }

        impl Write for Stream {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
            fn flush(&mut self) -> io::Result<()>;
        }

        impl ExpectStream for Stream {
            fn read_timeout(&self) -> io::Result<Option<Duration>>;
            fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;
        }
    }

    fn scanner(chunks: &[&[u8]], end: StreamEnd) -> Scanner<ScriptedStream> {
        let stream = ScriptedStream::new(chunks.iter().copied(), end)
            .with_read_timeout(Duration::from_secs(1));
        Scanner::new(stream).unwrap()
    }

    #[test]
    fn test_match_across_two_chunks() {
        let mut s = scanner(&[b"noise...Temp_C=", b"42\n trailing"], StreamEnd::Timeout);

        s.expect(r"Temp_C.*\n").unwrap();

        assert_eq!(s.before(), b"noise...");
        assert_eq!(s.after(), b"Temp_C=42\n trailing");
        assert_eq!(s.matched(), b"Temp_C=42\n");
    }

    #[test]
    fn test_earliest_match_wins_for_any_split() {
        let data = b"boot\r\nok> ID\r\nSerial Number: 7\r\nok> ";
        for split in 1..data.len() {
            let (a, b) = data.split_at(split);
            let mut s = scanner(&[a, b], StreamEnd::Close);

            s.expect(b"ok> ").unwrap();

            assert_eq!(s.before(), b"boot\r\n", "split at {split}");
            assert!(s.after().starts_with(b"ok> "), "split at {split}");
        }
    }

    #[test]
    fn test_leftover_searched_before_reading() {
        // Everything arrives in one read; the second expect must not block.
        let mut s = scanner(&[b"ID\r\nSerial Number.A\nuC ECC ReBoots : 0\r\n"], StreamEnd::Timeout);

        s.expect(r"Serial Number.*\n").unwrap();
        assert_eq!(s.before(), b"ID\r\n");

        s.expect(r"ReBoots : \d+").unwrap();
        assert_eq!(s.before(), b"Serial Number.A\nuC ECC ");
        assert_eq!(s.after(), b"ReBoots : 0\r\n");
        assert_eq!(s.get_ref().reads(), 1);
    }

    #[test]
    fn test_same_pattern_twice_matches_in_place() {
        let mut s = scanner(&[b"x prompt> y"], StreamEnd::Timeout);
        s.expect("prompt> ").unwrap();
        s.expect("prompt> ").unwrap();
        assert_eq!(s.before(), b"");
        assert_eq!(s.after(), b"prompt> y");
    }

    #[test]
    fn test_timeout_keeps_everything_received() {
        let mut s = scanner(&[b"abc", b"def"], StreamEnd::Timeout);
        s.after_mut().extend_from_slice(b"old-");
        s.before_mut().extend_from_slice(b"untouched");

        let err = s.expect("never").unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(err.received(), Some(&b"old-abcdef"[..]));
        assert_eq!(err.pattern(), Some("never"));
        assert_eq!(s.after(), b"old-abcdef");
        assert_eq!(s.before(), b"untouched");
    }

    #[test]
    fn test_closed_stream_is_stream_ended() {
        let mut s = scanner(&[b"partial"], StreamEnd::Close);

        let err = s.expect("Tested Okay").unwrap_err();

        assert!(err.is_stream_ended());
        assert_eq!(s.after(), b"partial");
        assert!(err.to_string().contains("\"partial\""));
    }

    #[test]
    fn test_closed_stream_on_empty_buffer() {
        let mut s = scanner(&[], StreamEnd::Close);
        assert!(s.expect(".*").unwrap_err().is_stream_ended());
    }

    #[test]
    fn test_empty_buffer_is_never_searched() {
        // `x*` matches the empty string; it must only be tried once bytes exist.
        let mut s = scanner(&[b"abc"], StreamEnd::Timeout);
        s.expect("x*").unwrap();
        assert_eq!(s.get_ref().reads(), 1);
        assert_eq!(s.before(), b"");
        assert_eq!(s.after(), b"abc");
    }

    #[test]
    fn test_eviction_bounds_buffer() {
        let mut s = scanner(&[b"aaaa", b"bbbb", b"cccc", b"dddZ"], StreamEnd::Close);
        s.set_chunk_size(4);
        s.set_max_buffer_size(8);

        s.expect("Z").unwrap();

        assert_eq!(s.before(), b"ccccddd");
        assert_eq!(s.after(), b"Z");
    }

    #[test]
    fn test_evicted_bytes_cannot_match() {
        let chunks: [&[u8]; 3] = [b"bbbb", b"cccc", b"dddd"];

        let mut capped = scanner(&chunks, StreamEnd::Close);
        capped.set_chunk_size(4);
        capped.set_max_buffer_size(8);
        let err = capped.expect("b.*d").unwrap_err();
        assert!(err.is_stream_ended());
        assert_eq!(capped.after(), b"dddd");

        let mut roomy = scanner(&chunks, StreamEnd::Close);
        roomy.set_chunk_size(4);
        roomy.expect("b.*d").unwrap();
        assert_eq!(roomy.before(), b"");
    }

    #[test]
    fn test_eviction_recomputes_length() {
        // A buffer shorter than one chunk after eviction still detects a
        // zero-growth read instead of comparing against the chunk size.
        let mut s = scanner(&[b"0123456789"], StreamEnd::Close);
        s.set_chunk_size(4);
        s.set_max_buffer_size(8);

        let err = s.expect("z").unwrap_err();

        assert!(err.is_stream_ended());
        assert_eq!(s.after(), b"89");
    }

    #[test]
    fn test_compiled_pattern_is_reused() {
        let re = Pattern::compile(r"OK\r\n").unwrap();
        let mut s = scanner(&[b"1 OK\r\n2 OK\r\n"], StreamEnd::Timeout);

        s.expect(&re).unwrap();
        assert_eq!(s.before(), b"1 ");
        let consumed = s.matched().len();
        s.after_mut().advance(consumed);
        s.expect(&re).unwrap();
        assert_eq!(s.before(), b"2 ");
    }

    #[test]
    fn test_byte_patterns_match_non_utf8() {
        let mut s = scanner(&[b"\xff\xfe\x01ready"], StreamEnd::Timeout);
        s.expect(br"\x01.e").unwrap();
        assert_eq!(s.before(), b"\xff\xfe");
    }

    #[test]
    fn test_invalid_pattern() {
        let mut s = scanner(&[b"x"], StreamEnd::Timeout);
        assert!(matches!(s.expect("("), Err(ExpectError::InvalidPattern(_))));
    }

    #[test]
    fn test_raw_non_utf8_pattern_matches_itself() {
        let mut s = scanner(&[b"\x00\xff\xfeOK"], StreamEnd::Timeout);

        s.expect(&b"\xff\xfe"[..]).unwrap();

        assert_eq!(s.before(), b"\x00");
        assert_eq!(s.matched(), b"\xff\xfe");
        assert_eq!(s.after(), b"\xff\xfeOK");
    }

    #[test]
    fn test_non_utf8_bytes_inside_regex_syntax() {
        let mut s = scanner(&[b"AA\xfe\xfe\xfeZ\x81\\"], StreamEnd::Timeout);

        // Repetition applies to the escaped byte; a backslashed byte is literal.
        s.expect(&b"A\xfe+Z\\\x81"[..]).unwrap();

        assert_eq!(s.before(), b"A");
        assert_eq!(s.matched(), b"A\xfe\xfe\xfeZ\x81");
    }

    #[test]
    fn test_pattern_source_escapes_only_invalid_bytes() {
        assert_eq!(pattern_source(b"Temp_C.*\n"), "Temp_C.*\n");
        assert_eq!(pattern_source(b"\xff\xfe"), r"\xFF\xFE");
        assert_eq!(pattern_source(b"\xc3\xa9\xff"), r"é\xFF");
        assert_eq!(pattern_source(b"a\xe9b+"), r"a\xE9b+");
        assert_eq!(pattern_source(b"\\\xff"), r"\xFF");
        assert_eq!(pattern_source(b"\\\\\xff"), r"\\\xFF");
        assert_eq!(Pattern::from(&b"\xff"[..]).to_string(), r"\xFF");
    }

    #[test]
    fn test_failed_expect_forgets_match() {
        let mut s = scanner(
            &[b"Temp_C=1", b"abcdefgh", b"ijklmnop", b"y"],
            StreamEnd::Timeout,
        );
        s.set_chunk_size(8);
        s.set_max_buffer_size(16);

        s.expect("Temp_C").unwrap();
        assert_eq!(s.matched(), b"Temp_C");

        assert!(s.expect("never").unwrap_err().is_timeout());
        assert_eq!(s.after(), b"y");
        assert!(s.matched().is_empty());
    }

    #[test]
    fn test_after_mut_forgets_match() {
        let mut s = scanner(&[b"ok> rest"], StreamEnd::Timeout);
        s.expect("ok> ").unwrap();
        assert_eq!(s.matched(), b"ok> ");

        s.after_mut().advance(1);

        assert!(s.matched().is_empty());
        assert_eq!(s.after(), b"k> rest");
    }

    #[test]
    fn test_short_reads_leave_no_padding() {
        let mut mock = MockStream::new();
        mock.expect_read_timeout()
            .returning(|| Ok(Some(Duration::from_secs(1))));
        let mut seq = mockall::Sequence::new();
        mock.expect_read()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|buf| {
                buf[..3].copy_from_slice(b"abc");
                Ok(3)
            });
        mock.expect_read()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(io::Error::from(io::ErrorKind::ConnectionReset)));

        let mut s = Scanner::new(mock).unwrap();

        match s.expect("z") {
            Err(ExpectError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("expected Io error, got {other:?}"),
        }
        assert_eq!(s.after(), b"abc");
    }

    #[test]
    fn test_send_line_appends_terminator() {
        let stream = ScriptedStream::new(Vec::<&[u8]>::new(), StreamEnd::Close)
            .with_read_timeout(Duration::from_secs(1));
        let mut s = Scanner::with_terminator(stream, b"\n").unwrap();

        s.send(b"ID\r\n").unwrap();
        s.send_line(b"SD 1").unwrap();

        assert_eq!(s.get_ref().written(), b"ID\r\nSD 1\n");
    }

    #[test]
    fn test_unusable_terminator_fails_construction() {
        let config = ScannerConfig {
            terminator: r"\xZZ".into(),
            ..ScannerConfig::default()
        };
        let stream = ScriptedStream::new(Vec::<&[u8]>::new(), StreamEnd::Close)
            .with_read_timeout(Duration::from_secs(1));

        assert!(matches!(
            Scanner::with_config(stream, &config),
            Err(ExpectError::Config(_))
        ));
    }

    #[test]
    fn test_missing_timeout_gets_default_and_warning() {
        let mut mock = MockStream::new();
        mock.expect_read_timeout().returning(|| Ok(None));
        mock.expect_set_read_timeout()
            .with(eq(Some(Duration::from_secs(1))))
            .times(1)
            .returning(|_| Ok(()));

        let s = Scanner::new(mock).unwrap();

        assert_eq!(
            s.warnings(),
            &[ScannerWarning::TimeoutDefaulted(Duration::from_secs(1))]
        );
    }

    #[test]
    fn test_existing_timeout_is_left_alone() {
        let mut mock = MockStream::new();
        mock.expect_read_timeout()
            .returning(|| Ok(Some(Duration::from_secs(45))));
        mock.expect_set_read_timeout().times(0);

        let s = Scanner::new(mock).unwrap();

        assert!(s.warnings().is_empty());
    }

    #[test]
    fn test_write_error_propagates() {
        let mut mock = MockStream::new();
        mock.expect_read_timeout()
            .returning(|| Ok(Some(Duration::from_secs(1))));
        mock.expect_write()
            .returning(|_| Err(io::Error::from(io::ErrorKind::BrokenPipe)));

        let mut s = Scanner::new(mock).unwrap();

        match s.send_line(b"ADC") {
            Err(ExpectError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_interrupted_read_is_retried() {
        let mut mock = MockStream::new();
        mock.expect_read_timeout()
            .returning(|| Ok(Some(Duration::from_secs(1))));
        let mut calls = 0;
        mock.expect_read().returning(move |buf| {
            calls += 1;
            if calls == 1 {
                return Err(io::Error::from(io::ErrorKind::Interrupted));
            }
            buf[..3].copy_from_slice(b"ok\n");
            Ok(3)
        });

        let mut s = Scanner::new(mock).unwrap();
        s.expect("ok").unwrap();
        assert_eq!(s.after(), b"ok\n");
    }

    #[test]
    fn test_logger_records_traffic() {
        use crate::core::logger::Direction;

        let logger = crate::core::logger::SessionLogger::new().shared();
        let mut s = scanner(&[b"Temp_C=42\n"], StreamEnd::Timeout).with_logger(logger.clone());

        s.send_line(b"ADC").unwrap();
        s.expect("Temp_C").unwrap();

        let log = logger.lock();
        let directions: Vec<_> = log.entries().map(|e| e.direction).collect();
        assert_eq!(
            directions,
            vec![Direction::Sent, Direction::Received, Direction::Info]
        );
    }
}
