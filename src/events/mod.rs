//! Event stream assembly.
//!
//! Raw stdout/stderr chunks from a sandboxed run are turned into an ordered
//! list of [`Event`]s in three stages:
//!
//! 1. A [`PlaybackDecoder`] per stream strips faketime playback headers and
//!    stamps each write with its virtual time.
//! 2. A [`StreamMerger`] interleaves the two timed streams by timestamp.
//! 3. A [`Coalescer`] merges consecutive writes of the same kind at the same
//!    instant and computes each event's delay.
//!
//! [`EventAssembler`] wires the stages together and works incrementally, so
//! events can be released while the program is still running.

mod playback;

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::{VirtualClock, VirtualInstant};

pub use playback::{PlaybackDecoder, TimedChunk};

#[cfg(test)]
pub(crate) use playback::frame;

/// Output stream a chunk or event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl EventKind {
    /// Return the wire name of the stream.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// One unit of program output.
///
/// `delay` is the virtual time to wait after the previous event before
/// showing this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Event {
    /// Output text, sanitized to valid UTF-8.
    pub message: String,
    /// Stream the text was written to.
    pub kind: EventKind,
    /// Virtual delay before this event, serialized as integer nanoseconds.
    #[serde(with = "delay_nanos")]
    pub delay: Duration,
}

mod delay_nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        delay: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let nanos = i64::try_from(delay.as_nanos()).unwrap_or(i64::MAX);
        serializer.serialize_i64(nanos)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        let nanos = i64::deserialize(deserializer)?;
        Ok(u64::try_from(nanos).map_or(Duration::ZERO, Duration::from_nanos))
    }
}

/// Incremental two-way merge of timed stdout and stderr chunks.
///
/// A chunk is released only once its position relative to the other stream
/// is known: either the other stream has a chunk at a later or equal time, or
/// the other stream has closed. On equal timestamps stderr goes first.
#[derive(Debug, Default)]
pub struct StreamMerger {
    stdout: VecDeque<TimedChunk>,
    stderr: VecDeque<TimedChunk>,
    stdout_closed: bool,
    stderr_closed: bool,
}

impl StreamMerger {
    /// Create an empty merger with both streams open.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue decoded chunks for `kind`.
    pub fn push(&mut self, kind: EventKind, chunks: impl IntoIterator<Item = TimedChunk>) {
        self.queue_mut(kind).extend(chunks);
    }

    /// Mark `kind` as finished; no more chunks will arrive for it.
    pub fn close(&mut self, kind: EventKind) {
        match kind {
            EventKind::Stdout => self.stdout_closed = true,
            EventKind::Stderr => self.stderr_closed = true,
        }
    }

    /// Release every chunk whose order is now settled.
    pub fn release(&mut self) -> Vec<(EventKind, TimedChunk)> {
        let mut released = vec![];
        while let Some(kind) = self.next_kind() {
            if let Some(chunk) = self.queue_mut(kind).pop_front() {
                released.push((kind, chunk));
            }
        }
        released
    }

    fn next_kind(&self) -> Option<EventKind> {
        match (self.stdout.front(), self.stderr.front()) {
            (Some(out), Some(err)) => Some(if out.at < err.at {
                EventKind::Stdout
            } else {
                EventKind::Stderr
            }),
            (Some(_), None) => self.stderr_closed.then_some(EventKind::Stdout),
            (None, Some(_)) => self.stdout_closed.then_some(EventKind::Stderr),
            (None, None) => None,
        }
    }

    fn queue_mut(&mut self, kind: EventKind) -> &mut VecDeque<TimedChunk> {
        match kind {
            EventKind::Stdout => &mut self.stdout,
            EventKind::Stderr => &mut self.stderr,
        }
    }
}

#[derive(Debug)]
struct Pending {
    kind: EventKind,
    at: VirtualInstant,
    bytes: Vec<u8>,
}

/// Stateful fold from merged chunks to events.
///
/// Holds at most one pending message. `now` starts at the clock epoch and
/// advances to an event's time only when that event's delay is positive.
#[derive(Debug)]
pub struct Coalescer {
    now: VirtualInstant,
    pending: Option<Pending>,
}

impl Coalescer {
    /// Create a fold starting at the clock's epoch.
    #[must_use]
    pub const fn new(clock: VirtualClock) -> Self {
        Self {
            now: clock.epoch(),
            pending: None,
        }
    }

    /// Feed one merged chunk, returning the event it completes, if any.
    pub fn push(&mut self, kind: EventKind, at: VirtualInstant, bytes: &[u8]) -> Option<Event> {
        if let Some(pending) = self.pending.as_mut()
            && pending.kind == kind
            && pending.at == at
        {
            pending.bytes.extend_from_slice(bytes);
            return None;
        }

        let completed = self.pending.take().map(|pending| self.emit(pending));
        self.pending = Some(Pending {
            kind,
            at,
            bytes: bytes.to_vec(),
        });
        completed
    }

    /// Flush the pending message.
    pub fn finish(&mut self) -> Option<Event> {
        self.pending.take().map(|pending| self.emit(pending))
    }

    fn emit(&mut self, pending: Pending) -> Event {
        let delay = pending.at.saturating_since(self.now);
        if !delay.is_zero() {
            self.now = pending.at;
        }
        Event {
            message: String::from_utf8_lossy(&pending.bytes).into_owned(),
            kind: pending.kind,
            delay,
        }
    }
}

/// Incremental assembler from raw output chunks to events.
#[derive(Debug)]
pub struct EventAssembler {
    stdout: PlaybackDecoder,
    stderr: PlaybackDecoder,
    merger: StreamMerger,
    coalescer: Coalescer,
}

impl EventAssembler {
    /// Create an assembler for one run on `clock`.
    #[must_use]
    pub fn new(clock: VirtualClock) -> Self {
        Self {
            stdout: PlaybackDecoder::new(clock.epoch()),
            stderr: PlaybackDecoder::new(clock.epoch()),
            merger: StreamMerger::new(),
            coalescer: Coalescer::new(clock),
        }
    }

    /// Feed raw bytes read from `kind`, returning the events now settled.
    pub fn push(&mut self, kind: EventKind, bytes: &[u8]) -> Vec<Event> {
        let mut chunks = vec![];
        self.decoder_mut(kind).feed(bytes, &mut chunks);
        self.merger.push(kind, chunks);
        self.drain_merger()
    }

    /// Signal end of output for `kind`, returning the events now settled.
    pub fn close(&mut self, kind: EventKind) -> Vec<Event> {
        let mut chunks = vec![];
        self.decoder_mut(kind).finish(&mut chunks);
        self.merger.push(kind, chunks);
        self.merger.close(kind);
        self.drain_merger()
    }

    /// Return the latest virtual instant seen on either stream.
    #[must_use]
    pub fn latest(&self) -> VirtualInstant {
        self.stdout.last().max(self.stderr.last())
    }

    /// Close both streams, append an optional trailer at the latest instant
    /// and flush every remaining event.
    pub fn finish(mut self, trailer: Option<(EventKind, &str)>) -> Vec<Event> {
        let mut events = self.close(EventKind::Stdout);
        events.extend(self.close(EventKind::Stderr));

        if let Some((kind, text)) = trailer {
            let at = self.latest();
            events.extend(self.coalescer.push(kind, at, text.as_bytes()));
        }
        events.extend(self.coalescer.finish());
        events
    }

    fn drain_merger(&mut self) -> Vec<Event> {
        self.merger
            .release()
            .into_iter()
            .filter_map(|(kind, chunk)| self.coalescer.push(kind, chunk.at, &chunk.bytes))
            .collect()
    }

    const fn decoder_mut(&mut self, kind: EventKind) -> &mut PlaybackDecoder {
        match kind {
            EventKind::Stdout => &mut self.stdout,
            EventKind::Stderr => &mut self.stderr,
        }
    }
}

/// Assemble a complete run's output in one call.
///
/// `chunks` are raw `(kind, bytes)` reads in arrival order.
pub fn assemble<I, B>(clock: VirtualClock, chunks: I) -> Vec<Event>
where
    I: IntoIterator<Item = (EventKind, B)>,
    B: AsRef<[u8]>,
{
    let mut assembler = EventAssembler::new(clock);
    let mut events = vec![];
    for (kind, bytes) in chunks {
        events.extend(assembler.push(kind, bytes.as_ref()));
    }
    events.extend(assembler.finish(None));
    events
}
