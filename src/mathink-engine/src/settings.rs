//! Recognition settings

use std::sync::Arc;

use tracing::debug;

use crate::engine::{Engine, RawHandle};
use crate::error::{check, check_status, Error, Result, Status};
use crate::session::{EngineSession, Lifecycle, ObjectKind};
use crate::types::{LanguageSpec, Mode};

/// Candidates kept per block unless configured otherwise
pub const DEFAULT_CANDIDATE_LIMIT: usize = 10;

/// An engine-side settings object and a local mirror of what was set on it.
///
/// Any mutation clears the committed state; [`Settings::commit`] must run
/// again before the next recognition. A commit belongs to the session epoch
/// it was made in. The engine object does not survive its session: once the
/// session closes every call fails with `InvalidInstance`.
pub struct Settings {
    engine: Arc<dyn Engine>,
    lifecycle: Arc<Lifecycle>,
    handle: RawHandle,
    mode: Mode,
    languages: Vec<LanguageSpec>,
    candidate_limit: usize,
    user_charset: Option<String>,
    committed: Option<u64>,
}

impl Settings {
    pub(crate) fn new(engine: Arc<dyn Engine>, lifecycle: Arc<Lifecycle>) -> Result<Self> {
        let handle = engine
            .create_settings()
            .ok_or_else(|| Error::status("CreateSettingObject", Status::OutOfMemory))?;
        lifecycle.register(handle, ObjectKind::Settings);
        debug!("created settings {:#x}", handle.get());

        let mut settings = Self {
            engine,
            lifecycle,
            handle,
            mode: Mode::default(),
            languages: Vec::new(),
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
            user_charset: None,
            committed: None,
        };
        settings.set_mode(Mode::default())?;
        settings.set_candidate_limit(DEFAULT_CANDIDATE_LIMIT)?;
        Ok(settings)
    }

    fn begin_change(&mut self, op: &'static str) -> Result<()> {
        self.lifecycle.require_live(op, self.handle)?;
        self.committed = None;
        Ok(())
    }

    pub fn set_mode(&mut self, mode: Mode) -> Result<()> {
        self.begin_change("SetRecognitionMode")?;
        check_status("SetRecognitionMode", self.engine.set_recognition_mode(self.handle, mode.code()))?;
        self.mode = mode;
        Ok(())
    }

    /// Maximum candidates decoded per block; 0 keeps everything the engine returns
    pub fn set_candidate_limit(&mut self, limit: usize) -> Result<()> {
        self.begin_change("SetCandidateSize")?;
        let size = i32::try_from(limit).map_err(|_| Error::status("SetCandidateSize", Status::InvalidArguments))?;
        check_status("SetCandidateSize", self.engine.set_candidate_size(self.handle, size))?;
        self.candidate_limit = limit;
        Ok(())
    }

    /// Restrict recognition to the given characters; `None` lifts the restriction
    pub fn set_user_charset(&mut self, charset: Option<&str>) -> Result<()> {
        self.begin_change("SetUserCharSet")?;
        let units: Vec<u16> = charset.map(|s| s.encode_utf16().collect()).unwrap_or_default();
        check_status("SetUserCharSet", self.engine.set_user_charset(self.handle, &units))?;
        self.user_charset = charset.filter(|s| !s.is_empty()).map(str::to_owned);
        Ok(())
    }

    /// Append a language to the ordered list.
    ///
    /// Whether several languages compose into one model is up to the engine;
    /// its status is returned unchanged.
    pub fn add_language(&mut self, spec: impl Into<LanguageSpec>) -> Result<()> {
        self.begin_change("AddLanguage")?;
        let spec = spec.into();
        let options = i32::try_from(spec.options.bits())
            .map_err(|_| Error::status("AddLanguage", Status::InvalidArguments))?;
        check_status(
            "AddLanguage",
            self.engine.add_language(self.handle, spec.language.code(), options),
        )?;
        debug!("language {} ({:?}) added", spec.language, spec.options);
        self.languages.push(spec);
        Ok(())
    }

    pub fn clear_languages(&mut self) -> Result<()> {
        self.begin_change("ClearLanguage")?;
        check_status("ClearLanguage", self.engine.clear_languages(self.handle))?;
        self.languages.clear();
        Ok(())
    }

    /// Number of languages as the engine sees it
    pub fn language_count(&self) -> Result<usize> {
        self.lifecycle.require_live("GetLanguageSize", self.handle)?;
        check("GetLanguageSize", self.engine.language_count(self.handle))
    }

    /// Push the current configuration into `session`
    pub fn commit(&mut self, session: &EngineSession) -> Result<()> {
        session.require_ready("SetAttribute")?;
        if !Arc::ptr_eq(&self.lifecycle, session.lifecycle()) {
            return Err(Error::status("SetAttribute", Status::InvalidInstance));
        }
        self.lifecycle.require_live("SetAttribute", self.handle)?;

        check_status("SetAttribute", self.engine.set_attribute(self.handle))?;
        self.committed = session.epoch();
        debug!(
            "settings committed: mode={}, languages={}, candidates={}",
            self.mode,
            self.languages.len(),
            self.candidate_limit
        );
        Ok(())
    }

    /// True between a successful commit and the next mutation
    pub fn is_committed(&self) -> bool {
        self.committed.is_some()
    }

    /// True if the last commit went into `session`'s current epoch
    pub fn is_committed_to(&self, session: &EngineSession) -> bool {
        self.committed.is_some() && self.committed == session.epoch()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn languages(&self) -> &[LanguageSpec] {
        &self.languages
    }

    pub fn candidate_limit(&self) -> usize {
        self.candidate_limit
    }

    pub fn user_charset(&self) -> Option<&str> {
        self.user_charset.as_deref()
    }
}

impl Drop for Settings {
    fn drop(&mut self) {
        if self.lifecycle.release(self.handle) {
            debug!("destroying settings {:#x}", self.handle.get());
            self.engine.destroy_settings(self.handle);
        }
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("handle", &self.handle)
            .field("mode", &self.mode)
            .field("languages", &self.languages)
            .field("candidate_limit", &self.candidate_limit)
            .field("user_charset", &self.user_charset)
            .field("committed", &self.committed.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::StubEngine;
    use crate::types::{Language, LanguageOptions};

    fn session() -> EngineSession {
        EngineSession::open(Arc::new(StubEngine::new().accept_license("k.key")), "k.key").unwrap()
    }

    #[test]
    fn test_mutation_clears_commit() {
        let session = session();
        let mut settings = session.create_settings().unwrap();
        assert!(!settings.is_committed());

        settings.add_language((Language::MiddleExpansion, LanguageOptions::EX)).unwrap();
        settings.commit(&session).unwrap();
        assert!(settings.is_committed_to(&session));

        settings.set_mode(Mode::MultiLine).unwrap();
        assert!(!settings.is_committed());
        settings.commit(&session).unwrap();
        settings.set_candidate_limit(3).unwrap();
        assert!(!settings.is_committed());
        settings.commit(&session).unwrap();
        settings.set_user_charset(Some("0123456789+-=")).unwrap();
        assert!(!settings.is_committed());
    }

    #[test]
    fn test_clear_languages() {
        let session = session();
        let mut settings = session.create_settings().unwrap();
        settings.add_language(Language::Chemical).unwrap();
        settings.add_language(Language::MiddleExpansion).unwrap();
        assert_eq!(settings.language_count().unwrap(), 2);

        settings.clear_languages().unwrap();
        assert_eq!(settings.language_count().unwrap(), 0);
        assert!(settings.languages().is_empty());
        settings.clear_languages().unwrap();
        assert_eq!(settings.language_count().unwrap(), 0);
    }

    #[test]
    fn test_rejected_second_language_is_surfaced() {
        let engine = Arc::new(StubEngine::new().accept_license("k.key").single_language());
        let session = EngineSession::open(engine, "k.key").unwrap();
        let mut settings = session.create_settings().unwrap();

        settings.add_language(Language::MiddleExpansion).unwrap();
        let err = settings.add_language(Language::Chemical).unwrap_err();
        assert_eq!(err.status_code(), Some(Status::InvalidArguments));
        assert_eq!(settings.languages().len(), 1);
    }

    #[test]
    fn test_commit_is_bound_to_epoch() {
        let mut session = session();
        let mut settings = session.create_settings().unwrap();
        settings.commit(&session).unwrap();

        session.close().unwrap();
        session.create("k.key").unwrap();
        assert!(settings.is_committed());
        assert!(!settings.is_committed_to(&session));

        // The engine object went away with the old session.
        let err = settings.commit(&session).unwrap_err();
        assert_eq!(err.status_code(), Some(Status::InvalidInstance));
    }

    #[test]
    fn test_mutation_after_close_is_rejected() {
        let engine = Arc::new(StubEngine::new().accept_license("k.key"));
        let mut session = EngineSession::open(engine.clone(), "k.key").unwrap();
        let mut settings = session.create_settings().unwrap();
        settings.add_language(Language::MiddleExpansion).unwrap();

        session.close().unwrap();
        assert_eq!(engine.live_handles(), 0);

        let calls = [
            settings.set_mode(Mode::SingleChar),
            settings.set_candidate_limit(1),
            settings.set_user_charset(Some("x")),
            settings.add_language(Language::Chemical),
            settings.clear_languages(),
            settings.language_count().map(drop),
            settings.commit(&session),
        ];
        for result in calls {
            assert_eq!(result.unwrap_err().status_code(), Some(Status::InvalidInstance));
        }
        assert_eq!(settings.mode(), Mode::MultiChar);
        assert_eq!(settings.languages().len(), 1);

        drop(settings);
        assert_eq!(engine.double_releases(), 0);
    }

    #[test]
    fn test_commit_into_foreign_session_is_rejected() {
        let session = session();
        let other = EngineSession::open(Arc::new(StubEngine::new().accept_license("k.key")), "k.key").unwrap();
        let mut settings = session.create_settings().unwrap();

        let err = settings.commit(&other).unwrap_err();
        assert_eq!(err.status_code(), Some(Status::InvalidInstance));
    }

    #[test]
    fn test_defaults() {
        let session = session();
        let settings = session.create_settings().unwrap();
        assert_eq!(settings.mode(), Mode::MultiChar);
        assert_eq!(settings.candidate_limit(), DEFAULT_CANDIDATE_LIMIT);
        assert_eq!(settings.user_charset(), None);
    }
}
