//! Length-delimited decoding of the engine's log entries.
//!
//! Every frame is a 4-byte big-endian payload length followed by a protobuf
//! `LogEntry`. [`FrameReader`] decodes single frames; [`LogRecords`] turns a
//! stream into records and resynchronises after corrupt frames by discarding
//! the reader and building a fresh one over the same stream.

use std::io::{self, Read};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use prost::Message;
use thiserror::Error;
use tracing::{debug, warn};

use crate::stream::is_stream_closed;

const FRAMING_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::framing");

/// Largest accepted payload, in bytes.
pub const MAX_FRAME_BYTES: usize = 1_000_000;

/// Pause applied before resynchronising after a failing read on the stream.
const IO_RESYNC_BACKOFF: Duration = Duration::from_millis(10);

/// Log entry written by the engine for every captured line.
#[derive(Clone, PartialEq, Message)]
pub struct LogEntry {
    /// `stdout` or `stderr`.
    #[prost(string, tag = "1")]
    pub source: String,
    /// Capture time in nanoseconds since the Unix epoch.
    #[prost(int64, tag = "2")]
    pub time_nano: i64,
    /// Raw line bytes without the trailing newline.
    #[prost(bytes = "vec", tag = "3")]
    pub line: Vec<u8>,
    /// Set when the line was split by the engine.
    #[prost(bool, tag = "4")]
    pub partial: bool,
    /// Fragment bookkeeping for split lines.
    #[prost(message, optional, tag = "5")]
    pub partial_log_metadata: Option<PartialLogEntryMetadata>,
}

/// Position of a fragment within a split line.
#[derive(Clone, PartialEq, Message)]
pub struct PartialLogEntryMetadata {
    /// Whether this is the final fragment.
    #[prost(bool, tag = "1")]
    pub last: bool,
    /// Identifier shared by all fragments of one line.
    #[prost(string, tag = "2")]
    pub id: String,
    /// Fragment index, starting at 1.
    #[prost(int32, tag = "3")]
    pub ordinal: i32,
}

/// Errors raised while decoding one frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The underlying stream failed.
    #[error("failed to read log stream: {0}")]
    Io(#[from] io::Error),
    /// The stream ended inside a frame.
    #[error("log stream ended inside a frame (expected {expected} bytes, read {read})")]
    Truncated { expected: usize, read: usize },
    /// The length prefix exceeds [`MAX_FRAME_BYTES`].
    #[error("frame of {length} bytes exceeds the {max} byte limit", max = MAX_FRAME_BYTES)]
    TooLarge { length: usize },
    /// The payload is not a valid `LogEntry`.
    #[error("failed to decode log entry: {0}")]
    Decode(#[from] prost::DecodeError),
}

impl FrameError {
    /// Terminal errors end the record sequence instead of triggering a resync.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Io(error) if is_stream_closed(error))
    }
}

/// Decoder for one length-delimited frame at a time.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    payload: Vec<u8>,
}

impl<R: Read> FrameReader<R> {
    /// Wraps a byte stream.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            payload: Vec::new(),
        }
    }

    /// Reads the next entry; `Ok(None)` marks a clean end of stream.
    pub fn read_entry(&mut self) -> Result<Option<LogEntry>, FrameError> {
        let mut prefix = [0_u8; 4];
        let read = fill(&mut self.inner, &mut prefix)?;
        if read == 0 {
            return Ok(None);
        }
        if read < prefix.len() {
            return Err(FrameError::Truncated {
                expected: prefix.len(),
                read,
            });
        }

        let length = usize::try_from(u32::from_be_bytes(prefix))
            .map_err(|_| FrameError::TooLarge { length: usize::MAX })?;
        if length > MAX_FRAME_BYTES {
            return Err(FrameError::TooLarge { length });
        }

        self.payload.clear();
        self.payload.resize(length, 0);
        let read = fill(&mut self.inner, &mut self.payload)?;
        if read < length {
            return Err(FrameError::Truncated {
                expected: length,
                read,
            });
        }

        Ok(Some(LogEntry::decode(self.payload.as_slice())?))
    }

    /// Releases the underlying stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Reads until `buf` is full or the stream ends, returning the bytes read.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while let Some(rest) = buf.get_mut(filled..) {
        if rest.is_empty() {
            break;
        }
        match reader.read(rest) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(error),
        }
    }
    Ok(filled)
}

/// Fragment metadata of a partial record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialInfo {
    /// Identifier shared by the fragments of one line.
    pub id: String,
    /// Fragment index.
    pub ordinal: i32,
    /// Whether this is the last fragment.
    pub last: bool,
}

/// One decoded log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Line bytes as captured; never re-split.
    pub line: Vec<u8>,
    /// `stdout` or `stderr`.
    pub source: String,
    /// Capture time in nanoseconds since the Unix epoch.
    pub timestamp_nanos: i64,
    /// Present when the line is one fragment of a longer line.
    pub partial: Option<PartialInfo>,
}

impl LogRecord {
    /// Capture time as a [`SystemTime`].
    #[must_use]
    pub fn timestamp(&self) -> SystemTime {
        let magnitude = Duration::from_nanos(self.timestamp_nanos.unsigned_abs());
        if self.timestamp_nanos >= 0 {
            UNIX_EPOCH + magnitude
        } else {
            UNIX_EPOCH
                .checked_sub(magnitude)
                .unwrap_or(UNIX_EPOCH)
        }
    }
}

impl From<LogEntry> for LogRecord {
    fn from(entry: LogEntry) -> Self {
        Self {
            line: entry.line,
            source: entry.source,
            timestamp_nanos: entry.time_nano,
            partial: entry.partial_log_metadata.map(|meta| PartialInfo {
                id: meta.id,
                ordinal: meta.ordinal,
                last: meta.last,
            }),
        }
    }
}

enum DecoderState<R> {
    Reading(FrameReader<R>),
    Finished,
}

/// Iterator of records decoded from a stream.
///
/// The sequence ends on a clean end of stream or once the stream is closed.
/// Every other error is logged and followed by a resynchronisation.
pub struct LogRecords<R> {
    state: DecoderState<R>,
    resyncs: u64,
}

impl<R: Read> LogRecords<R> {
    /// Starts decoding `stream`.
    pub fn new(stream: R) -> Self {
        Self {
            state: DecoderState::Reading(FrameReader::new(stream)),
            resyncs: 0,
        }
    }

    /// Number of resynchronisations performed so far.
    #[must_use]
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    fn resync(&mut self) {
        let state = std::mem::replace(&mut self.state, DecoderState::Finished);
        if let DecoderState::Reading(reader) = state {
            self.state = DecoderState::Reading(FrameReader::new(reader.into_inner()));
        }
        self.resyncs += 1;
    }
}

impl<R: Read> Iterator for LogRecords<R> {
    type Item = LogRecord;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let DecoderState::Reading(reader) = &mut self.state else {
                return None;
            };
            match reader.read_entry() {
                Ok(Some(entry)) => return Some(entry.into()),
                Ok(None) => {
                    debug!(target: FRAMING_TARGET, "log stream reached end of input");
                    self.state = DecoderState::Finished;
                }
                Err(error) if error.is_terminal() => {
                    debug!(target: FRAMING_TARGET, "log stream closed");
                    self.state = DecoderState::Finished;
                }
                Err(error) => {
                    warn!(
                        target: FRAMING_TARGET,
                        error = %error,
                        resyncs = self.resyncs + 1,
                        "error reading log message; resynchronising"
                    );
                    if matches!(error, FrameError::Io(_)) {
                        thread::sleep(IO_RESYNC_BACKOFF);
                    }
                    self.resync();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rstest::rstest;

    use super::*;
    use crate::stream::closed_error;

    fn entry(line: &str) -> LogEntry {
        LogEntry {
            source: String::from("stdout"),
            time_nano: 1_700_000_000_123_456_789,
            line: line.as_bytes().to_vec(),
            partial: false,
            partial_log_metadata: None,
        }
    }

    fn frame(payload: &[u8]) -> Vec<u8> {
        let length = u32::try_from(payload.len()).expect("payload fits u32");
        let mut bytes = length.to_be_bytes().to_vec();
        bytes.extend_from_slice(payload);
        bytes
    }

    fn lines<R: Read>(records: LogRecords<R>) -> Vec<String> {
        records
            .map(|record| String::from_utf8(record.line).expect("utf8 line"))
            .collect()
    }

    #[test]
    fn decodes_consecutive_frames() {
        let mut bytes = frame(&entry("first").encode_to_vec());
        bytes.extend(frame(&entry("second").encode_to_vec()));

        let records = LogRecords::new(Cursor::new(bytes));
        assert_eq!(lines(records), ["first", "second"]);
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    fn corrupt_frame_is_skipped_and_following_frames_survive(#[case] valid: usize) {
        // Field 1 declared as a 127-byte string with nothing behind it.
        let mut bytes = frame(&[0x0a, 0x7f]);
        for index in 0..valid {
            bytes.extend(frame(&entry(&format!("line {index}")).encode_to_vec()));
        }

        let mut records = LogRecords::new(Cursor::new(bytes));
        let decoded: Vec<String> = records
            .by_ref()
            .map(|record| String::from_utf8(record.line).expect("utf8 line"))
            .collect();

        let expected: Vec<String> = (0..valid).map(|index| format!("line {index}")).collect();
        assert_eq!(decoded, expected);
        assert_eq!(records.resyncs(), 1);
    }

    #[test]
    fn oversized_prefix_is_reported() {
        let oversized = u32::try_from(MAX_FRAME_BYTES + 1).expect("fits u32");
        let mut reader = FrameReader::new(Cursor::new(oversized.to_be_bytes().to_vec()));
        let error = reader.read_entry().expect_err("frame is too large");
        assert!(matches!(error, FrameError::TooLarge { length } if length == MAX_FRAME_BYTES + 1));
        assert!(!error.is_terminal());
    }

    #[test]
    fn truncated_tail_ends_the_sequence_after_a_resync() {
        let mut bytes = frame(&entry("complete").encode_to_vec());
        let tail = frame(&entry("cut short").encode_to_vec());
        bytes.extend(tail.iter().take(tail.len() - 3));

        let mut records = LogRecords::new(Cursor::new(bytes));
        assert_eq!(
            records.next().map(|record| record.line),
            Some(b"complete".to_vec())
        );
        assert!(records.next().is_none());
        assert_eq!(records.resyncs(), 1);
    }

    #[test]
    fn closed_stream_ends_without_resync() {
        struct ClosedStream;

        impl Read for ClosedStream {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(closed_error())
            }
        }

        let mut records = LogRecords::new(ClosedStream);
        assert!(records.next().is_none());
        assert!(records.next().is_none());
        assert_eq!(records.resyncs(), 0);
    }

    #[test]
    fn partial_metadata_becomes_partial_info() {
        let mut fragment = entry("part");
        fragment.partial = true;
        fragment.partial_log_metadata = Some(PartialLogEntryMetadata {
            last: false,
            id: String::from("x"),
            ordinal: 2,
        });

        let record = LogRecords::new(Cursor::new(frame(&fragment.encode_to_vec())))
            .next()
            .expect("one record");
        assert_eq!(
            record.partial,
            Some(PartialInfo {
                id: String::from("x"),
                ordinal: 2,
                last: false,
            })
        );
        assert_eq!(
            record.timestamp(),
            UNIX_EPOCH + Duration::from_nanos(1_700_000_000_123_456_789)
        );
    }
}
