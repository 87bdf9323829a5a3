//! Serialized access to one session, ink buffer and settings object

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::decoder::Recognition;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::ink::Ink;
use crate::session::EngineSession;
use crate::settings::{Settings, DEFAULT_CANDIDATE_LIMIT};
use crate::types::{Language, LanguageSpec, LogLevel, Mode};

/// Configuration for a [`Recognizer`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizerConfig {
    /// License artifact handed to the engine on create
    pub license: PathBuf,
    /// Directory holding the staged `*.hdb` model files
    pub resource_dir: Option<PathBuf>,
    /// Directory holding auxiliary engine libraries
    #[serde(default)]
    pub library_dir: Option<PathBuf>,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default = "default_languages")]
    pub languages: Vec<LanguageSpec>,
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
    #[serde(default)]
    pub user_charset: Option<String>,
    /// Verbosity of the engine's own logging
    #[serde(default)]
    pub engine_log_level: LogLevel,
}

fn default_languages() -> Vec<LanguageSpec> {
    vec![Language::MiddleExpansion.into()]
}

fn default_candidate_limit() -> usize {
    DEFAULT_CANDIDATE_LIMIT
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        let data_dir = crate::default_data_dir();
        Self {
            license: data_dir.join("license.key"),
            resource_dir: Some(crate::default_resource_dir()),
            library_dir: None,
            mode: Mode::default(),
            languages: default_languages(),
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
            user_charset: None,
            engine_log_level: LogLevel::None,
        }
    }
}

impl RecognizerConfig {
    /// Apply mode, languages, candidate limit and charset to `settings`
    pub fn apply(&self, settings: &mut Settings) -> Result<()> {
        settings.set_mode(self.mode)?;
        settings.set_candidate_limit(self.candidate_limit)?;
        settings.set_user_charset(self.user_charset.as_deref())?;
        settings.clear_languages()?;
        for spec in &self.languages {
            settings.add_language(*spec)?;
        }
        Ok(())
    }
}

// Field order is drop order: engine objects go before the session closes.
struct State {
    ink: Ink,
    settings: Settings,
    session: EngineSession,
}

/// Owns the engine session together with one ink buffer and one settings
/// object behind a lock.
///
/// The engine answers a second concurrent `recognize` with `EngineBusy`;
/// going through a `Recognizer` makes concurrent callers wait instead.
/// Settings changes made through [`Recognizer::configure`] are committed
/// right away.
#[derive(Clone)]
pub struct Recognizer {
    state: Arc<Mutex<State>>,
}

impl Recognizer {
    /// Open the session and prepare committed settings and an empty ink buffer
    pub fn open(engine: Arc<dyn Engine>, config: &RecognizerConfig) -> Result<Self> {
        info!("opening recognizer");
        let session = EngineSession::open(engine, &config.license)?;

        if let Some(dir) = &config.resource_dir {
            session.set_external_resource_path(dir)?;
        }
        if let Some(dir) = &config.library_dir {
            session.set_external_library_path(dir)?;
        }
        if config.engine_log_level != LogLevel::None {
            session.set_log_level(config.engine_log_level)?;
        }

        let mut settings = session.create_settings()?;
        config.apply(&mut settings)?;
        settings.commit(&session)?;

        let ink = session.create_ink()?;
        info!(
            "recognizer ready: mode={}, languages={:?}",
            settings.mode(),
            settings.languages()
        );

        Ok(Self {
            state: Arc::new(Mutex::new(State { ink, settings, session })),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| Error::Poisoned)
    }

    pub fn add_point(&self, x: i32, y: i32) -> Result<()> {
        self.lock()?.ink.add_point(x, y)
    }

    pub fn end_stroke(&self) -> Result<()> {
        self.lock()?.ink.end_stroke()
    }

    pub fn clear_ink(&self) -> Result<()> {
        self.lock()?.ink.clear()
    }

    pub fn stroke_count(&self) -> Result<usize> {
        Ok(self.lock()?.ink.stroke_count())
    }

    /// Change the settings and commit them
    pub fn configure<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Settings) -> Result<()>,
    {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        f(&mut state.settings)?;
        state.settings.commit(&state.session)
    }

    /// Replace the language list with a single language
    pub fn set_language(&self, spec: impl Into<LanguageSpec>) -> Result<()> {
        let spec = spec.into();
        debug!("switching language to {}", spec.language);
        self.configure(|settings| {
            settings.clear_languages()?;
            settings.add_language(spec)
        })
    }

    /// Run a read-only query against the session
    pub fn with_session<T>(&self, f: impl FnOnce(&EngineSession) -> Result<T>) -> Result<T> {
        let guard = self.lock()?;
        f(&guard.session)
    }

    /// Recognize the current ink, blocking until the engine answers
    pub fn recognize(&self) -> Result<Recognition> {
        let guard = self.lock()?;
        guard.session.recognize(&guard.ink, &guard.settings)
    }

    /// Recognize on tokio's blocking pool
    pub async fn recognize_async(&self) -> Result<Recognition> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.recognize())
            .await
            .map_err(|e| Error::Task(e.to_string()))?
    }

    /// Close the session; later calls fail with `InvalidInstance`
    pub fn close(&self) -> Result<()> {
        self.lock()?.session.close()
    }
}

impl std::fmt::Debug for Recognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recognizer").finish_non_exhaustive()
    }
}
