//! End-to-end tests for the synthesis pipeline against a scripted engine.

use crossbeam_channel::{Receiver, Sender};
use deltatalk::config::DriverConfig;
use deltatalk::engine::{
    EngineCode, EngineResult, GenMode, GenStatus, SampleFormat, SynthEngine, Voice,
};
use deltatalk::pipeline::messages::{AudioChunk, SynthEvent};
use deltatalk::{DeltaTalkDriver, PlaybackSink, SpeechItem};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How the scripted engine answers `NextBlock` calls.
#[derive(Debug, Clone, Copy)]
enum GenBehavior {
    /// Every unit yields one block, then finishes.
    OneBlockThenFinish,
    /// The first continuation call fails with this raw code.
    FailOnSecondCall(i32),
}

/// Engine double that records every call and scripts generation.
struct RecordingEngine {
    behavior: GenBehavior,
    /// When set, each opening generate call blocks until the gate fires
    /// (or its sender is dropped).
    gen_gate: Option<Receiver<()>>,
    play_delay: Duration,
    /// Makes the next `play` report busy, once.
    play_busy: AtomicBool,
    plays: Mutex<Vec<String>>,
    appends: Mutex<Vec<String>>,
    params: Mutex<Vec<(u8, u8, u8)>>,
    voices: Mutex<Vec<Voice>>,
    stops: AtomicUsize,
    opened_units: AtomicUsize,
    gen_waiting: AtomicUsize,
    inside: AtomicBool,
    overlaps: AtomicUsize,
}

impl RecordingEngine {
    fn new() -> Arc<Self> {
        Arc::new(Self::build(GenBehavior::OneBlockThenFinish, None, Duration::ZERO))
    }

    fn with_behavior(behavior: GenBehavior) -> Arc<Self> {
        Arc::new(Self::build(behavior, None, Duration::ZERO))
    }

    fn with_gate(gate: Receiver<()>) -> Arc<Self> {
        Arc::new(Self::build(
            GenBehavior::OneBlockThenFinish,
            Some(gate),
            Duration::ZERO,
        ))
    }

    fn with_play_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self::build(GenBehavior::OneBlockThenFinish, None, delay))
    }

    fn build(behavior: GenBehavior, gen_gate: Option<Receiver<()>>, play_delay: Duration) -> Self {
        Self {
            behavior,
            gen_gate,
            play_delay,
            play_busy: AtomicBool::new(false),
            plays: Mutex::new(Vec::new()),
            appends: Mutex::new(Vec::new()),
            params: Mutex::new(Vec::new()),
            voices: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
            opened_units: AtomicUsize::new(0),
            gen_waiting: AtomicUsize::new(0),
            inside: AtomicBool::new(false),
            overlaps: AtomicUsize::new(0),
        }
    }

    fn enter(&self) -> CallGuard<'_> {
        if self.inside.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        CallGuard(self)
    }

    fn plays(&self) -> Vec<String> {
        self.plays.lock().expect("plays lock").clone()
    }

    fn appends(&self) -> Vec<String> {
        self.appends.lock().expect("appends lock").clone()
    }

    fn params(&self) -> Vec<(u8, u8, u8)> {
        self.params.lock().expect("params lock").clone()
    }
}

struct CallGuard<'a>(&'a RecordingEngine);

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.0.inside.store(false, Ordering::SeqCst);
    }
}

impl SynthEngine for RecordingEngine {
    fn set_params(&self, rate: u8, volume: u8, pitch: u8) -> EngineResult<()> {
        self.params
            .lock()
            .expect("params lock")
            .push((rate, volume, pitch));
        Ok(())
    }

    fn set_voice(&self, voice: Voice) -> EngineResult<()> {
        self.voices.lock().expect("voices lock").push(voice);
        Ok(())
    }

    fn generate(
        &self,
        _text: Option<&[u8]>,
        mode: GenMode,
        _format: SampleFormat,
        buf: &mut [i8],
    ) -> EngineResult<GenStatus> {
        let _guard = self.enter();
        match mode {
            GenMode::NewSimpleBlock | GenMode::NewMultiBlock => {
                if let Some(gate) = &self.gen_gate {
                    self.gen_waiting.fetch_add(1, Ordering::SeqCst);
                    let _ = gate.recv_timeout(Duration::from_secs(5));
                }
                self.opened_units.fetch_add(1, Ordering::SeqCst);
                let block: [i8; 4] = [1, -1, 2, -2];
                buf[..4].copy_from_slice(&block);
                Ok(GenStatus::Block(4))
            }
            GenMode::NextBlock => match self.behavior {
                GenBehavior::OneBlockThenFinish => Ok(GenStatus::Finished(0)),
                GenBehavior::FailOnSecondCall(raw) => Err(EngineCode::from_raw(raw)),
            },
        }
    }

    fn play(&self, text: &[u8], replace: bool) -> EngineResult<()> {
        let _guard = self.enter();
        assert!(replace);
        if !self.play_delay.is_zero() {
            std::thread::sleep(self.play_delay);
        }
        if self.play_busy.swap(false, Ordering::SeqCst) {
            return Err(EngineCode::Busy);
        }
        self.plays
            .lock()
            .expect("plays lock")
            .push(String::from_utf8_lossy(text).into_owned());
        Ok(())
    }

    fn append(&self, text: &[u8]) -> EngineResult<()> {
        let _guard = self.enter();
        self.appends
            .lock()
            .expect("appends lock")
            .push(String::from_utf8_lossy(text).into_owned());
        Ok(())
    }

    fn pause(&self) -> EngineResult<()> {
        Ok(())
    }

    fn resume(&self) -> EngineResult<()> {
        Ok(())
    }

    fn stop(&self) -> EngineResult<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Playback sink double: records feeds and completes each buffer as soon
/// as it arrives.
struct CaptureSink {
    events: Sender<SynthEvent>,
    feeds: Arc<Mutex<Vec<AudioChunk>>>,
    rates: Arc<Mutex<Vec<u32>>>,
    stops: Arc<AtomicUsize>,
    sample_rate: u32,
}

impl PlaybackSink for CaptureSink {
    fn feed(&mut self, chunk: AudioChunk) -> deltatalk::Result<()> {
        if let Some(index) = chunk.index {
            let _ = self.events.send(SynthEvent::IndexReached(index));
        }
        self.feeds.lock().expect("feeds lock").push(chunk);
        Ok(())
    }

    fn pause(&mut self, _paused: bool) {}

    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn set_sample_rate(&mut self, sample_rate: u32) -> deltatalk::Result<()> {
        self.sample_rate = sample_rate;
        self.rates.lock().expect("rates lock").push(sample_rate);
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[derive(Default)]
struct SinkProbe {
    feeds: Arc<Mutex<Vec<AudioChunk>>>,
    rates: Arc<Mutex<Vec<u32>>>,
    stops: Arc<AtomicUsize>,
}

impl SinkProbe {
    fn feeds(&self) -> Vec<AudioChunk> {
        self.feeds.lock().expect("feeds lock").clone()
    }
}

fn fast_config() -> DriverConfig {
    let mut config = DriverConfig::default();
    config.streaming.block_delay_ms = 0;
    config.streaming.pop_timeout_ms = 20;
    config.busy_wait.timeout_ms = 500;
    config.busy_wait.poll_ms = 1;
    config
}

fn direct_config() -> DriverConfig {
    let mut config = fast_config();
    config.streaming.enabled = false;
    config
}

fn streaming_driver(
    engine: Arc<RecordingEngine>,
    config: DriverConfig,
) -> (DeltaTalkDriver, SinkProbe) {
    let probe = SinkProbe::default();
    let feeds = Arc::clone(&probe.feeds);
    let rates = Arc::clone(&probe.rates);
    let stops = Arc::clone(&probe.stops);
    let driver = DeltaTalkDriver::with_sink(engine, config, move |events| {
        Box::new(CaptureSink {
            events,
            feeds,
            rates,
            stops,
            sample_rate: Voice::default().sample_rate(),
        })
    });
    (driver, probe)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn two_unit_segment_reports_its_index_exactly_once() {
    let engine = RecordingEngine::new();
    let (driver, probe) = streaming_driver(Arc::clone(&engine), fast_config());
    let events = driver.events();

    let text = "a".repeat(150);
    driver.speak(&[SpeechItem::Index(7), SpeechItem::Text(text)]);

    assert!(wait_until(Duration::from_secs(2), || probe.feeds().len() == 2));

    let feeds = probe.feeds();
    assert_eq!(feeds[0].index, Some(7));
    assert_eq!(feeds[1].index, None);
    // Signed engine bytes arrive reinterpreted as unsigned PCM.
    assert_eq!(feeds[0].pcm, vec![1, 255, 2, 254]);

    let mut index_hits = 0;
    let mut done = 0;
    while let Ok(event) = events.recv_timeout(Duration::from_millis(200)) {
        match event {
            SynthEvent::IndexReached(7) => index_hits += 1,
            SynthEvent::IndexReached(other) => panic!("unexpected index {other}"),
            SynthEvent::DoneSpeaking => done += 1,
        }
    }
    assert_eq!(index_hits, 1);
    assert_eq!(done, 1);

    driver.shutdown();
}

#[test]
fn generation_failure_falls_back_to_direct_and_aborts_the_segment() {
    let engine = RecordingEngine::with_behavior(GenBehavior::FailOnSecondCall(-14));
    let (driver, probe) = streaming_driver(Arc::clone(&engine), fast_config());

    let text = "b".repeat(150);
    driver.speak(&[SpeechItem::Text(text.clone())]);

    assert!(wait_until(Duration::from_secs(2), || !engine.plays().is_empty()));

    // The failing unit is replayed directly, in full.
    let plays = engine.plays();
    assert_eq!(plays, vec![text[..100].to_owned()]);
    // One block made it to the sink before the failure.
    assert_eq!(probe.feeds().len(), 1);
    // The second unit was never started.
    assert_eq!(engine.opened_units.load(Ordering::SeqCst), 1);

    driver.shutdown();
}

#[test]
fn full_queue_routes_overflow_to_direct_playback() {
    let (gate_tx, gate_rx) = crossbeam_channel::unbounded::<()>();
    let engine = RecordingEngine::with_gate(gate_rx);
    let (driver, _probe) = streaming_driver(Arc::clone(&engine), fast_config());

    // Wedge the worker inside the first unit's generation.
    driver.speak(&[SpeechItem::Text("espera".to_owned())]);
    assert!(wait_until(Duration::from_secs(2), || {
        engine.gen_waiting.load(Ordering::SeqCst) == 1
    }));

    // Fill the queue to its capacity of 50.
    for i in 0..50 {
        driver.speak(&[SpeechItem::Text(format!("fila {i}"))]);
    }

    // The 51st segment must bypass the queue without blocking.
    let started = Instant::now();
    driver.speak(&[SpeechItem::Text("transborda".to_owned())]);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(wait_until(Duration::from_secs(2), || {
        engine.plays().contains(&"transborda".to_owned())
    }));

    drop(gate_tx);
    driver.shutdown();
}

#[test]
fn cancel_clears_the_busy_flag_for_the_next_speak() {
    let engine = RecordingEngine::with_play_delay(Duration::from_millis(400));
    let mut config = direct_config();
    config.busy_wait.timeout_ms = 2000;
    let driver = DeltaTalkDriver::new(engine.clone(), config);

    std::thread::scope(|scope| {
        scope.spawn(|| {
            driver.speak(&[SpeechItem::Text("primeiro".to_owned())]);
        });
        assert!(wait_until(Duration::from_millis(500), || {
            engine.inside.load(Ordering::SeqCst)
        }));

        driver.cancel();
        assert!(engine.stops.load(Ordering::SeqCst) >= 1);

        let started = Instant::now();
        driver.speak(&[SpeechItem::Text("segundo".to_owned())]);
        // A stuck flag would cost the 2s ceiling on top of the play time.
        assert!(started.elapsed() < Duration::from_millis(1500));
    });

    assert!(wait_until(Duration::from_secs(1), || {
        engine.plays().contains(&"segundo".to_owned())
    }));
}

#[test]
fn concurrent_speaks_never_overlap_inside_the_engine() {
    let engine = RecordingEngine::with_play_delay(Duration::from_millis(30));
    let driver = DeltaTalkDriver::new(engine.clone(), direct_config());

    std::thread::scope(|scope| {
        for i in 0..4 {
            let driver = &driver;
            scope.spawn(move || {
                driver.speak(&[SpeechItem::Text(format!("voz {i}"))]);
            });
        }
    });

    assert_eq!(engine.plays().len(), 4);
    assert_eq!(engine.overlaps.load(Ordering::SeqCst), 0);
}

#[test]
fn busy_engine_gets_the_text_appended_instead() {
    let engine = RecordingEngine::new();
    engine.play_busy.store(true, Ordering::SeqCst);
    let driver = DeltaTalkDriver::new(engine.clone(), direct_config());

    driver.speak(&[SpeechItem::Text("continua".to_owned())]);

    assert_eq!(engine.appends(), vec!["continua".to_owned()]);
    assert!(engine.plays().is_empty());
}

#[test]
fn character_mode_speaks_one_character_at_a_time() {
    let engine = RecordingEngine::new();
    let driver = DeltaTalkDriver::new(engine.clone(), direct_config());

    driver.speak(&[
        SpeechItem::CharacterMode(true),
        SpeechItem::Text("abc".to_owned()),
    ]);

    assert_eq!(
        engine.plays(),
        vec!["a".to_owned(), "b".to_owned(), "c".to_owned()]
    );
}

#[test]
fn inline_pitch_offset_is_restored_after_the_literal() {
    let engine = RecordingEngine::new();
    let driver = DeltaTalkDriver::new(engine.clone(), direct_config());

    driver.speak(&[
        SpeechItem::PitchOffset(20),
        SpeechItem::Text("maiúscula".to_owned()),
    ]);

    let params = engine.params();
    // Construction applies the defaults (rate 50, volume 100, pitch 50).
    assert_eq!(params.first(), Some(&(10, 20, 10)));
    // The offset raises pitch to 70 → engine 14; the literal then restores it.
    assert!(params.contains(&(10, 20, 14)));
    assert_eq!(params.last(), Some(&(10, 20, 10)));
}

#[test]
fn speak_emits_done_exactly_once_and_flushes_trailing_indexes() {
    let engine = RecordingEngine::new();
    let driver = DeltaTalkDriver::new(engine.clone(), direct_config());
    let events = driver.events();

    driver.speak(&[
        SpeechItem::Text("um".to_owned()),
        SpeechItem::Index(3),
    ]);

    let mut seen = Vec::new();
    while let Ok(event) = events.recv_timeout(Duration::from_millis(200)) {
        seen.push(event);
    }
    assert_eq!(
        seen.iter()
            .filter(|e| matches!(e, SynthEvent::DoneSpeaking))
            .count(),
        1
    );
    assert!(seen.contains(&SynthEvent::IndexReached(3)));
}

#[test]
fn voice_change_retargets_the_sink_sample_rate() {
    let engine = RecordingEngine::new();
    let (driver, probe) = streaming_driver(Arc::clone(&engine), fast_config());

    driver.set_voice(Voice::Paula);

    assert_eq!(
        probe.rates.lock().expect("rates lock").clone(),
        vec![22_050]
    );
    assert!(
        engine
            .voices
            .lock()
            .expect("voices lock")
            .contains(&Voice::Paula)
    );

    driver.shutdown();
}

#[test]
fn cancel_stops_sink_and_drains_pending_segments() {
    let (gate_tx, gate_rx) = crossbeam_channel::unbounded::<()>();
    let engine = RecordingEngine::with_gate(gate_rx);
    let (driver, probe) = streaming_driver(Arc::clone(&engine), fast_config());

    driver.speak(&[SpeechItem::Text("preso".to_owned())]);
    assert!(wait_until(Duration::from_secs(2), || {
        engine.gen_waiting.load(Ordering::SeqCst) == 1
    }));
    for i in 0..5 {
        driver.speak(&[SpeechItem::Text(format!("pendente {i}"))]);
    }

    driver.cancel();
    assert!(probe.stops.load(Ordering::SeqCst) >= 1);
    assert!(engine.stops.load(Ordering::SeqCst) >= 1);

    // Release the wedged unit; the drained segments must never play.
    drop(gate_tx);
    driver.shutdown();
    assert!(probe.feeds().len() <= 1);
    assert!(engine.plays().is_empty());
}
