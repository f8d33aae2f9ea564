//! The streaming audio-generation pipeline.
//!
//! Text flows one way: the driver splits an utterance into bounded units,
//! pushes them onto a bounded queue, and a single worker thread drives the
//! engine's multi-block protocol for each unit, feeding PCM to the playback
//! sink. Completion events flow back to the host on the driver's event
//! channel. When any stage fails, the unit falls back to the engine's own
//! play/append path.

pub(crate) mod busy;
pub(crate) mod direct;
pub mod generator;
pub mod messages;
pub(crate) mod worker;
