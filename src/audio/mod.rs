//! Audio playback via cpal.

pub mod playback;
