//! Direct playback through the engine's own audio path.
//!
//! The non-streaming fallback: hand the text to `TTSENG_PlayText` with
//! replace semantics and let the engine render it on its own. When the
//! engine reports busy, the text is appended to the current utterance
//! instead. Other engine errors are logged and swallowed; the host never
//! sees the difference between success and an engine-reported failure.

use crate::config::BusyWaitConfig;
use crate::engine::{EngineCode, SynthEngine};
use crate::pipeline::busy::BusyFlag;
use crate::text::encode_legacy;
use tracing::{debug, error};

/// Speak `text` through the engine's synchronous play/append entry points.
pub(crate) fn speak_direct(
    engine: &dyn SynthEngine,
    busy: &BusyFlag,
    busy_wait: &BusyWaitConfig,
    text: &str,
) {
    if text.is_empty() {
        return;
    }

    let _guard = busy.acquire_or_barge(busy_wait);

    let encoded = encode_legacy(text);
    match engine.play(&encoded, true) {
        Ok(()) => debug!("spoke directly: {text:?}"),
        Err(EngineCode::Busy) => match engine.append(&encoded) {
            Ok(()) => debug!("appended: {text:?}"),
            Err(code) => error!("cannot append text: {code}"),
        },
        Err(code) => error!("cannot speak text: {code}"),
    }
}
