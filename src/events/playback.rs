//! Incremental decoder for faketime playback headers.
//!
//! The faketime runtime precedes every write to stdout or stderr with a
//! 16-byte header:
//!
//! ```text
//! 4 bytes  "\0\0PB"        magic
//! 8 bytes  big-endian i64  Unix time of the write in nanoseconds
//! 4 bytes  big-endian u32  length of the write that follows
//! ```
//!
//! Output may arrive split at arbitrary byte boundaries, so the decoder keeps
//! partial headers buffered between calls to [`PlaybackDecoder::feed`].

use crate::clock::VirtualInstant;

const MAGIC: &[u8; 4] = b"\0\0PB";
const HEADER_LEN: usize = 16;

/// Bytes written at one virtual instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedChunk {
    /// Virtual time of the write.
    pub at: VirtualInstant,
    /// The bytes written.
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Scanning,
    Payload {
        remaining: usize,
        at: VirtualInstant,
    },
}

/// Stateful decoder for one output stream.
///
/// Text not preceded by a header is attributed to the last timestamp seen on
/// the stream. Timestamps that go backwards are clamped so the stream stays
/// monotonic. Payloads cut short by an output limit are kept as-is.
#[derive(Debug, Clone)]
pub struct PlaybackDecoder {
    pending: Vec<u8>,
    state: State,
    last: VirtualInstant,
}

impl PlaybackDecoder {
    /// Create a decoder whose unframed output is stamped at `start` until the
    /// first header arrives.
    #[must_use]
    pub const fn new(start: VirtualInstant) -> Self {
        Self {
            pending: Vec::new(),
            state: State::Scanning,
            last: start,
        }
    }

    /// Return the latest timestamp seen on this stream.
    #[must_use]
    pub const fn last(&self) -> VirtualInstant {
        self.last
    }

    /// Decode `data`, appending completed chunks to `out`.
    pub fn feed(&mut self, data: &[u8], out: &mut Vec<TimedChunk>) {
        self.pending.extend_from_slice(data);

        while !self.pending.is_empty() {
            match self.state {
                State::Payload { remaining, at } => {
                    let take = remaining.min(self.pending.len());
                    let bytes: Vec<u8> = self.pending.drain(..take).collect();
                    push_chunk(out, at, bytes);
                    self.state = if take == remaining {
                        State::Scanning
                    } else {
                        State::Payload {
                            remaining: remaining - take,
                            at,
                        }
                    };
                }
                State::Scanning => {
                    if !self.scan_step(out) {
                        break;
                    }
                }
            }
        }
    }

    /// Flush whatever is left once the stream has closed.
    ///
    /// A trailing fragment that could still be the start of a header is
    /// emitted as text; a complete magic followed by a short header is
    /// dropped.
    pub fn finish(&mut self, out: &mut Vec<TimedChunk>) {
        if self.state == State::Scanning && !self.pending.starts_with(MAGIC) {
            let rest = std::mem::take(&mut self.pending);
            push_chunk(out, self.last, rest);
        }
        self.pending.clear();
        self.state = State::Scanning;
    }

    /// Make progress while scanning for a header. Returns `false` when more
    /// input is needed.
    fn scan_step(&mut self, out: &mut Vec<TimedChunk>) -> bool {
        if self.pending.starts_with(MAGIC) {
            return self.read_header();
        }

        if let Some(offset) = find_magic(&self.pending) {
            let text: Vec<u8> = self.pending.drain(..offset).collect();
            push_chunk(out, self.last, text);
            return true;
        }

        let keep = partial_magic_suffix(&self.pending);
        let emit = self.pending.len() - keep;
        if emit == 0 {
            return false;
        }
        let text: Vec<u8> = self.pending.drain(..emit).collect();
        push_chunk(out, self.last, text);
        false
    }

    fn read_header(&mut self) -> bool {
        let Some(header) = self.pending.get(..HEADER_LEN) else {
            return false;
        };
        let (nanos, length) = parse_header(header);
        let at = VirtualInstant::from_unix_nanos(nanos).max(self.last);
        self.last = at;
        self.pending.drain(..HEADER_LEN);
        if length > 0 {
            self.state = State::Payload {
                remaining: length,
                at,
            };
        }
        true
    }
}

#[expect(
    clippy::big_endian_bytes,
    reason = "playback headers are big-endian on the wire"
)]
fn parse_header(header: &[u8]) -> (i64, usize) {
    let mut nanos = [0_u8; 8];
    let mut length = [0_u8; 4];
    nanos.copy_from_slice(header.get(4..12).unwrap_or(&[0; 8]));
    length.copy_from_slice(header.get(12..16).unwrap_or(&[0; 4]));
    let payload_len = usize::try_from(u32::from_be_bytes(length)).unwrap_or(usize::MAX);
    (i64::from_be_bytes(nanos), payload_len)
}

fn find_magic(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(MAGIC.len())
        .position(|window| window == MAGIC)
}

/// Length of the longest suffix of `bytes` that is a proper prefix of the
/// magic.
fn partial_magic_suffix(bytes: &[u8]) -> usize {
    (1..MAGIC.len())
        .rev()
        .find(|&len| {
            bytes
                .len()
                .checked_sub(len)
                .and_then(|start| bytes.get(start..))
                .is_some_and(|suffix| MAGIC.starts_with(suffix))
        })
        .unwrap_or(0)
}

/// Append `bytes` at `at`, merging with the previous chunk written at the
/// same instant.
fn push_chunk(out: &mut Vec<TimedChunk>, at: VirtualInstant, bytes: Vec<u8>) {
    if bytes.is_empty() {
        return;
    }
    match out.last_mut() {
        Some(previous) if previous.at == at => previous.bytes.extend_from_slice(&bytes),
        _ => out.push(TimedChunk { at, bytes }),
    }
}

/// Encode one playback frame. Used to fabricate faketime output in tests.
#[cfg(test)]
#[expect(
    clippy::big_endian_bytes,
    reason = "playback headers are big-endian on the wire"
)]
pub(crate) fn frame(at: VirtualInstant, payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&at.unix_nanos().to_be_bytes());
    let length = u32::try_from(payload.len()).unwrap_or(u32::MAX);
    bytes.extend_from_slice(&length.to_be_bytes());
    bytes.extend_from_slice(payload);
    bytes
}
