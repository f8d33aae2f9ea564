//! FFI binding to the DeltaTalk dynamic library.
//!
//! Loads `Dtalk32T` at runtime and resolves the `TTSENG_*` entry points
//! once, keeping the library alive for as long as any resolved pointer can
//! be called. The binding itself adds no locking: the engine is not
//! reentrant, and the driver's busy flag is the only serialization layer.

use super::codes::EngineCode;
use super::{DspMode, EngineResult, GenMode, GenStatus, SampleFormat, SynthEngine, Voice};
use crate::error::{DriverError, Result};
use libloading::Library;
use std::ffi::{CString, c_char, c_int, c_void};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name of the engine library, expected next to the host executable.
pub const LIBRARY_NAME: &str = "Dtalk32T.dll";

/// Fixed intonation argument for `TTSENG_SetVoice`.
const VOICE_INTONATION: c_int = 10;

type InitFn = unsafe extern "C" fn(c_int, *const c_void, c_int) -> c_int;
type SetModeFn = unsafe extern "C" fn(c_int, c_int, c_int, c_int) -> c_int;
type SetVoiceFn = unsafe extern "C" fn(c_int, c_int, c_int) -> c_int;
type GenAudioBufferFn = unsafe extern "C" fn(
    c_int,
    *const c_char,
    c_int,
    c_int,
    *mut c_char,
    c_int,
    *mut c_int,
) -> c_int;
type PlayTextFn = unsafe extern "C" fn(c_int, *const c_char, c_int) -> c_int;
type AppendTextFn = unsafe extern "C" fn(c_int, *const c_char) -> c_int;
type InstanceFn = unsafe extern "C" fn(c_int) -> c_int;

/// Resolved entry points. Kept separate from [`Library`] so they can be
/// copied out once at load time.
struct Api {
    init: InitFn,
    set_mode: SetModeFn,
    set_voice: SetVoiceFn,
    gen_audio_buffer: GenAudioBufferFn,
    play_text: PlayTextFn,
    append_text: AppendTextFn,
    pause_text: InstanceFn,
    resume_text: InstanceFn,
    stop_text: InstanceFn,
    close: InstanceFn,
}

impl Api {
    /// # Safety
    ///
    /// The caller must keep `lib` loaded for as long as the returned
    /// pointers are callable.
    unsafe fn resolve(lib: &Library) -> Result<Self> {
        unsafe fn sym<T: Copy>(lib: &Library, name: &[u8]) -> Result<T> {
            let symbol = unsafe { lib.get::<T>(name) }.map_err(|e| {
                DriverError::Binding(format!(
                    "missing entry point {}: {e}",
                    String::from_utf8_lossy(&name[..name.len() - 1])
                ))
            })?;
            Ok(*symbol)
        }

        Ok(Self {
            init: unsafe { sym(lib, b"TTSENG_Init\0")? },
            set_mode: unsafe { sym(lib, b"TTSENG_SetMode\0")? },
            set_voice: unsafe { sym(lib, b"TTSENG_SetVoice\0")? },
            gen_audio_buffer: unsafe { sym(lib, b"TTSENG_GenAudioBuffer\0")? },
            play_text: unsafe { sym(lib, b"TTSENG_PlayText\0")? },
            append_text: unsafe { sym(lib, b"TTSENG_AppendText\0")? },
            pause_text: unsafe { sym(lib, b"TTSENG_PauseText\0")? },
            resume_text: unsafe { sym(lib, b"TTSENG_ResumeText\0")? },
            stop_text: unsafe { sym(lib, b"TTSENG_StopText\0")? },
            close: unsafe { sym(lib, b"TTSENG_Close\0")? },
        })
    }
}

/// Live binding to one engine instance.
///
/// Construction initializes the engine; `Drop` stops any current utterance
/// and closes the instance.
pub struct DeltaTalkEngine {
    api: Api,
    handle: c_int,
    // Keeps the resolved entry points valid.
    _lib: Library,
}

impl DeltaTalkEngine {
    /// Load the engine library and initialize an instance.
    ///
    /// `library` overrides the default lookup (the host executable's
    /// directory). An instance handle ≤ 0 is a failure regardless of the
    /// numeric code, since the engine reports some init errors as 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the library cannot be loaded, an entry point is
    /// missing, or the engine refuses to initialize.
    pub fn load(library: Option<&Path>, dsp_mode: DspMode) -> Result<Self> {
        let path = match library {
            Some(p) => p.to_path_buf(),
            None => Self::default_library_path()?,
        };
        debug!("loading engine library: {}", path.display());

        let lib = unsafe { Library::new(&path) }.map_err(|e| {
            DriverError::Binding(format!("cannot load {}: {e}", path.display()))
        })?;
        let api = unsafe { Api::resolve(&lib) }?;

        let handle = unsafe { (api.init)(0, std::ptr::null(), dsp_mode.raw()) };
        if handle <= 0 {
            let code = EngineCode::from_raw(handle);
            warn!("engine initialization failed: {code}");
            return Err(DriverError::Engine(code));
        }
        info!("engine initialized (instance {handle}, dsp mode {dsp_mode:?})");

        Ok(Self {
            api,
            handle,
            _lib: lib,
        })
    }

    /// Whether the engine library is present and loadable.
    ///
    /// Used by hosts to decide whether to offer this synthesizer at all.
    pub fn probe(library: Option<&Path>) -> bool {
        let path = match library {
            Some(p) => p.to_path_buf(),
            None => match Self::default_library_path() {
                Ok(p) => p,
                Err(_) => return false,
            },
        };
        if !path.is_file() {
            debug!("{} not found", path.display());
            return false;
        }
        match unsafe { Library::new(&path) } {
            Ok(_) => true,
            Err(e) => {
                debug!("cannot load {}: {e}", path.display());
                false
            }
        }
    }

    /// The engine library next to the current executable.
    fn default_library_path() -> Result<PathBuf> {
        let exe = std::env::current_exe()?;
        let dir = exe.parent().ok_or_else(|| {
            DriverError::Binding("executable has no parent directory".to_owned())
        })?;
        Ok(dir.join(LIBRARY_NAME))
    }

    fn text_arg(text: &[u8]) -> EngineResult<CString> {
        // Encoded text never carries interior NULs (the encoder strips
        // them), but a bad caller must not be able to corrupt the call.
        CString::new(text).map_err(|_| EngineCode::BadCommand)
    }
}

impl SynthEngine for DeltaTalkEngine {
    fn set_params(&self, rate: u8, volume: u8, pitch: u8) -> EngineResult<()> {
        let raw = unsafe {
            (self.api.set_mode)(
                self.handle,
                c_int::from(rate),
                c_int::from(volume),
                c_int::from(pitch),
            )
        };
        EngineCode::check(raw)
    }

    fn set_voice(&self, voice: Voice) -> EngineResult<()> {
        let raw =
            unsafe { (self.api.set_voice)(self.handle, voice.engine_id(), VOICE_INTONATION) };
        EngineCode::check(raw)
    }

    fn generate(
        &self,
        text: Option<&[u8]>,
        mode: GenMode,
        format: SampleFormat,
        buf: &mut [i8],
    ) -> EngineResult<GenStatus> {
        let text = text.map(Self::text_arg).transpose()?;
        let text_ptr = text
            .as_ref()
            .map_or(std::ptr::null(), |t| t.as_ptr().cast::<c_char>());

        let mut written: c_int = 0;
        let raw = unsafe {
            (self.api.gen_audio_buffer)(
                self.handle,
                text_ptr,
                mode as i32,
                format as i32,
                buf.as_mut_ptr().cast::<c_char>(),
                buf.len() as c_int,
                &mut written,
            )
        };

        let written = (written.max(0) as usize).min(buf.len());
        match EngineCode::check(raw) {
            Ok(()) => Ok(GenStatus::Block(written)),
            Err(code) if code.is_finished() => Ok(GenStatus::Finished(written)),
            Err(code) => Err(code),
        }
    }

    fn play(&self, text: &[u8], replace: bool) -> EngineResult<()> {
        let text = Self::text_arg(text)?;
        let raw = unsafe {
            (self.api.play_text)(self.handle, text.as_ptr().cast(), c_int::from(replace))
        };
        EngineCode::check(raw)
    }

    fn append(&self, text: &[u8]) -> EngineResult<()> {
        let text = Self::text_arg(text)?;
        let raw = unsafe { (self.api.append_text)(self.handle, text.as_ptr().cast()) };
        EngineCode::check(raw)
    }

    fn pause(&self) -> EngineResult<()> {
        EngineCode::check(unsafe { (self.api.pause_text)(self.handle) })
    }

    fn resume(&self) -> EngineResult<()> {
        EngineCode::check(unsafe { (self.api.resume_text)(self.handle) })
    }

    fn stop(&self) -> EngineResult<()> {
        EngineCode::check(unsafe { (self.api.stop_text)(self.handle) })
    }
}

impl Drop for DeltaTalkEngine {
    fn drop(&mut self) {
        unsafe {
            let _ = (self.api.stop_text)(self.handle);
            let raw = (self.api.close)(self.handle);
            if let Err(code) = EngineCode::check(raw) {
                warn!("engine close failed: {code}");
            } else {
                debug!("engine instance {} closed", self.handle);
            }
        }
    }
}
