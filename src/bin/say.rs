//! Speak text through the DeltaTalk driver from the command line.
//!
//! A diagnostic harness for the driver: streams an utterance through the
//! full pipeline, or renders it to a WAV file with `--wav` (no audio
//! device needed). Playback runs on after `speak` returns, so the harness
//! lingers briefly before shutting down.
//!
//! Usage:
//!   dtalk-say [--config FILE] [--voice br1|br2|br3] [--rate N]
//!             [--direct] [--wav FILE] [--linger-ms N] TEXT...

use deltatalk::engine::Voice;
use deltatalk::pipeline::generator::MultiBlockGenerator;
use deltatalk::text::split_units;
use deltatalk::{DeltaTalkDriver, DriverConfig, DriverError, SpeechItem, SynthEvent};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("deltatalk=info")),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("dtalk-say failed: {e}");
        std::process::exit(1);
    }
}

struct Args {
    config: Option<PathBuf>,
    voice: Option<Voice>,
    rate: Option<u8>,
    wav: Option<PathBuf>,
    direct: bool,
    linger_ms: u64,
    text: String,
}

fn parse_args() -> Result<Args, DriverError> {
    let mut args = Args {
        config: None,
        voice: None,
        rate: None,
        wav: None,
        direct: false,
        linger_ms: 2000,
        text: String::new(),
    };
    let mut parts: Vec<String> = Vec::new();

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        let mut value_for = |flag: &str| {
            iter.next()
                .ok_or_else(|| DriverError::Config(format!("{flag} needs a value")))
        };
        match arg.as_str() {
            "--config" => args.config = Some(PathBuf::from(value_for("--config")?)),
            "--voice" => {
                let id = value_for("--voice")?;
                args.voice = Some(Voice::from_id(&id).ok_or_else(|| {
                    DriverError::Config(format!("unknown voice '{id}' (br1, br2, br3)"))
                })?);
            }
            "--rate" => {
                let raw = value_for("--rate")?;
                let rate: u8 = raw
                    .parse()
                    .map_err(|_| DriverError::Config(format!("bad rate '{raw}'")))?;
                args.rate = Some(rate);
            }
            "--wav" => args.wav = Some(PathBuf::from(value_for("--wav")?)),
            "--direct" => args.direct = true,
            "--linger-ms" => {
                let raw = value_for("--linger-ms")?;
                args.linger_ms = raw
                    .parse()
                    .map_err(|_| DriverError::Config(format!("bad duration '{raw}'")))?;
            }
            other => parts.push(other.to_owned()),
        }
    }

    args.text = parts.join(" ");
    if args.text.is_empty() {
        return Err(DriverError::Config("no text given".to_owned()));
    }
    Ok(args)
}

fn run() -> deltatalk::Result<()> {
    let args = parse_args()?;

    let mut config = match &args.config {
        Some(path) => DriverConfig::load(path)?,
        None => DriverConfig::default(),
    };
    if args.direct {
        config.streaming.enabled = false;
    }

    if let Some(path) = &args.wav {
        return render_wav(&config, &args, path);
    }

    let driver = DeltaTalkDriver::open(config)?;
    if let Some(voice) = args.voice {
        driver.set_voice(voice);
    }
    if let Some(rate) = args.rate {
        driver.set_rate(rate);
    }

    let events = driver.events();
    driver.speak(&[SpeechItem::Text(args.text.clone())]);

    while let Ok(event) = events.recv_timeout(Duration::from_secs(30)) {
        if event == SynthEvent::DoneSpeaking {
            break;
        }
    }
    // Give queued audio time to actually play before tearing down.
    std::thread::sleep(Duration::from_millis(args.linger_ms));
    driver.shutdown();
    Ok(())
}

/// Render the utterance to a WAV file through the multi-block generator.
fn render_wav(config: &DriverConfig, args: &Args, path: &std::path::Path) -> deltatalk::Result<()> {
    let engine = deltatalk::DeltaTalkEngine::load(
        config.engine.library.as_deref(),
        config.engine.dsp_mode,
    )?;
    let voice = args.voice.unwrap_or_default();
    engine_setup(&engine, voice, args.rate)?;

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: voice.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| DriverError::Audio(format!("cannot create {}: {e}", path.display())))?;

    let mut total = 0usize;
    for unit in split_units(&args.text, None) {
        let mut generator =
            MultiBlockGenerator::new(&engine, &unit.text, config.streaming.buffer_size);
        loop {
            match generator.next_block() {
                Ok(Some(pcm)) => {
                    total += pcm.len();
                    for pair in pcm.chunks_exact(2) {
                        let sample = i16::from_le_bytes([pair[0], pair[1]]);
                        writer
                            .write_sample(sample)
                            .map_err(|e| DriverError::Audio(format!("WAV write failed: {e}")))?;
                    }
                }
                Ok(None) => break,
                Err(code) => return Err(DriverError::Engine(code)),
            }
        }
    }

    writer
        .finalize()
        .map_err(|e| DriverError::Audio(format!("cannot finalize WAV: {e}")))?;
    info!("wrote {total} PCM bytes to {}", path.display());
    Ok(())
}

fn engine_setup(
    engine: &deltatalk::DeltaTalkEngine,
    voice: Voice,
    rate: Option<u8>,
) -> deltatalk::Result<()> {
    use deltatalk::SynthEngine;
    use deltatalk::driver::to_engine_scale;

    engine.set_voice(voice).map_err(DriverError::Engine)?;
    let rate = rate.unwrap_or(50);
    engine
        .set_params(
            to_engine_scale(rate),
            to_engine_scale(100),
            to_engine_scale(50),
        )
        .map_err(DriverError::Engine)?;
    Ok(())
}
