//! Message types passed between the driver, the worker, and the sink.

/// A bounded-length slice of an utterance, one generation cycle's worth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechSegment {
    /// The text to synthesize.
    pub text: String,
    /// Host marker to echo back when this segment's audio completes.
    /// Only the first segment split from an utterance carries one.
    pub index: Option<u32>,
}

/// Work items flowing through the speech queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem {
    /// A segment to synthesize and play.
    Segment(SpeechSegment),
    /// Worker shutdown sentinel.
    Shutdown,
}

/// Raw PCM handed to the playback sink.
///
/// 16-bit little-endian mono at the sample rate of the voice that generated
/// it. Generated, played, then discarded; never persisted.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// PCM bytes, already reinterpreted as unsigned.
    pub pcm: Vec<u8>,
    /// Index to report once this chunk finishes playing.
    pub index: Option<u32>,
}

/// Notifications emitted to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthEvent {
    /// Playback reached the marker the host attached to an utterance.
    IndexReached(u32),
    /// A `speak` call has been fully dispatched.
    DoneSpeaking,
}
