//! Client library for an external math handwriting recognition engine
//!
//! Captures strokes into an engine-side ink buffer, configures recognition
//! (mode, languages, candidate count, character restriction), runs the
//! engine and decodes its result tree into plain [`RecognitionResult`]
//! values: lines of blocks, each with best-first candidate readings.
//!
//! Every engine object is owned by exactly one Rust value and released when
//! that value is dropped. The engine is reached through the [`Engine`]
//! trait; [`StubEngine`] answers from a script, and `NativeEngine` (behind
//! the `native` feature) links the vendor library.

mod decoder;
mod engine;
mod error;
mod ink;
#[cfg(feature = "native")]
mod native;
mod recognizer;
pub mod resources;
mod session;
mod settings;
pub mod stub;
mod types;

pub use decoder::{Block, Line, Recognition, RecognitionResult};
pub use engine::{Engine, EngineCall, RawHandle};
pub use error::{Category, Error, RawStatus, Result, Status};
pub use ink::Ink;
#[cfg(feature = "native")]
pub use native::NativeEngine;
pub use recognizer::{Recognizer, RecognizerConfig};
pub use resources::{stage_resources, StageReport};
pub use session::{EngineSession, SessionState, PARAM_BUFFER_LEN};
pub use settings::{Settings, DEFAULT_CANDIDATE_LIMIT};
pub use stub::StubEngine;
pub use types::{Language, LanguageOptions, LanguageSpec, LogLevel, Mode, ParamKind, Point, Stroke};

use std::path::PathBuf;

/// Default directory for the license and staged resources
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mathink")
}

/// Default directory for staged `*.hdb` model files
pub fn default_resource_dir() -> PathBuf {
    default_data_dir().join(resources::RESOURCE_EXTENSION)
}
