//! The engine's stateful multi-block generation protocol.
//!
//! One generator drives one text unit: a `NewMultiBlock` call opens the
//! sequence, `NextBlock` calls continue it, and `TTS_PCM_FINISHED` closes
//! it. The engine writes into a caller-supplied buffer in its native
//! 8-bit-signed representation; every byte is reinterpreted as unsigned
//! before it counts as PCM.

use crate::engine::{EngineCode, GenMode, GenStatus, SampleFormat, SynthEngine};
use crate::text::encode_legacy;

/// Protocol state for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenState {
    /// No generation call issued yet.
    Start,
    /// The multi-block sequence is open.
    Streaming,
    /// The engine reported the sequence finished.
    Done,
    /// The engine reported an error; the sequence is dead.
    Failed,
}

/// Drives the multi-block protocol for a single text unit.
pub struct MultiBlockGenerator<'e> {
    engine: &'e dyn SynthEngine,
    text: Vec<u8>,
    buf: Vec<i8>,
    state: GenState,
}

impl<'e> MultiBlockGenerator<'e> {
    /// Prepare a generator for one unit of text.
    pub fn new(engine: &'e dyn SynthEngine, text: &str, buffer_size: usize) -> Self {
        Self {
            engine,
            text: encode_legacy(text),
            buf: vec![0; buffer_size.max(1)],
            state: GenState::Start,
        }
    }

    /// Current protocol state.
    pub fn state(&self) -> GenState {
        self.state
    }

    /// Drive the protocol one step.
    ///
    /// `Ok(Some(pcm))` is a block to play (possibly empty when the engine
    /// produced no bytes this round but the sequence is still open);
    /// `Ok(None)` means the sequence completed. Terminal states are sticky.
    ///
    /// # Errors
    ///
    /// Returns the engine's status code when a call fails; the generator is
    /// `Failed` afterwards and the caller falls back to direct playback for
    /// this unit's text.
    pub fn next_block(&mut self) -> Result<Option<Vec<u8>>, EngineCode> {
        let result = match self.state {
            GenState::Done | GenState::Failed => return Ok(None),
            GenState::Start => self.engine.generate(
                Some(&self.text),
                GenMode::NewMultiBlock,
                SampleFormat::Bits16,
                &mut self.buf,
            ),
            GenState::Streaming => self.engine.generate(
                None,
                GenMode::NextBlock,
                SampleFormat::Bits16,
                &mut self.buf,
            ),
        };

        match result {
            Ok(GenStatus::Block(written)) => {
                self.state = GenState::Streaming;
                Ok(Some(to_pcm_bytes(&self.buf[..written])))
            }
            Ok(GenStatus::Finished(written)) => {
                self.state = GenState::Done;
                if written > 0 {
                    // Flush what the final call still produced.
                    Ok(Some(to_pcm_bytes(&self.buf[..written])))
                } else {
                    Ok(None)
                }
            }
            Err(code) => {
                self.state = GenState::Failed;
                Err(code)
            }
        }
    }
}

/// Reinterpret the engine's signed bytes as unsigned PCM data.
fn to_pcm_bytes(buf: &[i8]) -> Vec<u8> {
    buf.iter().map(|&b| b as u8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineResult;
    use crate::engine::Voice;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted responses for `generate`, consumed in order.
    enum Step {
        Block(Vec<i8>),
        Finished(Vec<i8>),
        Fail(i32),
    }

    struct ScriptedEngine {
        steps: Mutex<VecDeque<Step>>,
        calls: Mutex<Vec<GenMode>>,
    }

    impl ScriptedEngine {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: Mutex::new(steps.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<GenMode> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    impl SynthEngine for ScriptedEngine {
        fn set_params(&self, _rate: u8, _volume: u8, _pitch: u8) -> EngineResult<()> {
            Ok(())
        }

        fn set_voice(&self, _voice: Voice) -> EngineResult<()> {
            Ok(())
        }

        fn generate(
            &self,
            text: Option<&[u8]>,
            mode: GenMode,
            _format: SampleFormat,
            buf: &mut [i8],
        ) -> EngineResult<GenStatus> {
            self.calls.lock().expect("calls lock").push(mode);
            match mode {
                GenMode::NextBlock => assert!(text.is_none()),
                _ => assert!(text.is_some()),
            }
            let step = self
                .steps
                .lock()
                .expect("steps lock")
                .pop_front()
                .expect("script exhausted");
            match step {
                Step::Block(bytes) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(GenStatus::Block(bytes.len()))
                }
                Step::Finished(bytes) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(GenStatus::Finished(bytes.len()))
                }
                Step::Fail(raw) => Err(EngineCode::from_raw(raw)),
            }
        }

        fn play(&self, _text: &[u8], _replace: bool) -> EngineResult<()> {
            Ok(())
        }

        fn append(&self, _text: &[u8]) -> EngineResult<()> {
            Ok(())
        }

        fn pause(&self) -> EngineResult<()> {
            Ok(())
        }

        fn resume(&self) -> EngineResult<()> {
            Ok(())
        }

        fn stop(&self) -> EngineResult<()> {
            Ok(())
        }
    }

    #[test]
    fn three_blocks_then_finished() {
        let engine = ScriptedEngine::new(vec![
            Step::Block(vec![1, 2]),
            Step::Block(vec![3, 4]),
            Step::Block(vec![5, 6]),
            Step::Finished(Vec::new()),
        ]);
        let mut generator = MultiBlockGenerator::new(&engine, "olá", 64);

        let mut blocks = Vec::new();
        while let Some(pcm) = generator.next_block().expect("no engine error") {
            blocks.push(pcm);
        }

        assert_eq!(blocks.len(), 3);
        assert_eq!(generator.state(), GenState::Done);
        assert_eq!(
            engine.calls(),
            vec![
                GenMode::NewMultiBlock,
                GenMode::NextBlock,
                GenMode::NextBlock,
                GenMode::NextBlock,
            ]
        );
    }

    #[test]
    fn failure_on_second_call_after_one_block() {
        let engine = ScriptedEngine::new(vec![Step::Block(vec![1, 2]), Step::Fail(-14)]);
        let mut generator = MultiBlockGenerator::new(&engine, "texto", 64);

        let first = generator.next_block().expect("first block");
        assert_eq!(first, Some(vec![1, 2]));

        let err = generator.next_block().expect_err("engine failure");
        assert_eq!(err, EngineCode::WaveOutError);
        assert_eq!(generator.state(), GenState::Failed);

        // Terminal states are sticky.
        assert_eq!(generator.next_block().expect("sticky"), None);
        assert_eq!(generator.state(), GenState::Failed);
    }

    #[test]
    fn failure_on_first_call_emits_nothing() {
        let engine = ScriptedEngine::new(vec![Step::Fail(-7)]);
        let mut generator = MultiBlockGenerator::new(&engine, "texto", 64);

        let err = generator.next_block().expect_err("engine failure");
        assert_eq!(err, EngineCode::EngineInitError);
        assert_eq!(generator.state(), GenState::Failed);
    }

    #[test]
    fn final_call_bytes_are_flushed() {
        let engine = ScriptedEngine::new(vec![
            Step::Block(vec![1]),
            Step::Finished(vec![9, 9, 9]),
        ]);
        let mut generator = MultiBlockGenerator::new(&engine, "fim", 64);

        assert_eq!(generator.next_block().expect("block"), Some(vec![1]));
        assert_eq!(
            generator.next_block().expect("flush"),
            Some(vec![9, 9, 9])
        );
        assert_eq!(generator.state(), GenState::Done);
        assert_eq!(generator.next_block().expect("done"), None);
    }

    #[test]
    fn signed_bytes_become_unsigned_pcm() {
        let engine = ScriptedEngine::new(vec![Step::Block(vec![-1, -128, 0, 127])]);
        let mut generator = MultiBlockGenerator::new(&engine, "pcm", 64);

        let pcm = generator.next_block().expect("block").expect("bytes");
        assert_eq!(pcm, vec![255, 128, 0, 127]);
    }

    #[test]
    fn empty_block_keeps_the_sequence_open() {
        let engine = ScriptedEngine::new(vec![
            Step::Block(Vec::new()),
            Step::Block(vec![4]),
            Step::Finished(Vec::new()),
        ]);
        let mut generator = MultiBlockGenerator::new(&engine, "pausa", 64);

        assert_eq!(generator.next_block().expect("open"), Some(Vec::new()));
        assert_eq!(generator.state(), GenState::Streaming);
        assert_eq!(generator.next_block().expect("block"), Some(vec![4]));
        assert_eq!(generator.next_block().expect("finish"), None);
        assert_eq!(generator.state(), GenState::Done);
    }
}
