//! Engine session lifecycle

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::decoder::{self, string_from_utf16, Recognition};
use crate::engine::{Engine, RawHandle};
use crate::error::{check, check_status, Error, Result, Status};
use crate::ink::Ink;
use crate::settings::Settings;
use crate::types::{LogLevel, ParamKind};

/// Size of the parameter buffer the engine expects for scalar params
pub const PARAM_BUFFER_LEN: usize = 8;

static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ObjectKind {
    Ink,
    Settings,
}

/// Ready period and live engine objects of one session.
///
/// Shared by the session and every object created from it. Objects still
/// registered when the session closes are destroyed before the engine is,
/// and refuse every call afterwards.
#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    /// Epoch of the current `Ready` period, 0 when not ready
    epoch: AtomicU64,
    live: Mutex<HashMap<u64, ObjectKind>>,
}

impl Lifecycle {
    fn objects(&self) -> MutexGuard<'_, HashMap<u64, ObjectKind>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn epoch(&self) -> Option<u64> {
        match self.epoch.load(Ordering::Acquire) {
            0 => None,
            epoch => Some(epoch),
        }
    }

    pub(crate) fn register(&self, handle: RawHandle, kind: ObjectKind) {
        self.objects().insert(handle.get(), kind);
    }

    /// `InvalidInstance` unless the session is `Ready` and `handle` was not
    /// released by a close
    pub(crate) fn require_live(&self, op: &'static str, handle: RawHandle) -> Result<()> {
        if self.epoch().is_some() && self.objects().contains_key(&handle.get()) {
            Ok(())
        } else {
            Err(Error::status(op, Status::InvalidInstance))
        }
    }

    /// Unregister `handle`; true if the caller still has to destroy it
    pub(crate) fn release(&self, handle: RawHandle) -> bool {
        self.objects().remove(&handle.get()).is_some()
    }

    fn drain(&self) -> Vec<(u64, ObjectKind)> {
        self.objects().drain().collect()
    }
}

/// Lifecycle state of an [`EngineSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Ready,
    Closed,
}

/// The connection to the recognition engine.
///
/// The engine accepts one open session at a time: a second `create` while
/// one is `Ready` fails with [`Status::AlreadyExists`]. A closed session can
/// be opened again. Every other component is created from, or committed to,
/// a `Ready` session.
///
/// Closing (or dropping) a `Ready` session first destroys the ink and
/// settings objects created from it that are still alive; those objects then
/// fail every call with `InvalidInstance`.
pub struct EngineSession {
    engine: Arc<dyn Engine>,
    state: SessionState,
    lifecycle: Arc<Lifecycle>,
}

impl EngineSession {
    /// Wrap an engine without opening it
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            state: SessionState::Uninitialized,
            lifecycle: Arc::new(Lifecycle::default()),
        }
    }

    /// Wrap an engine and open it with a license file
    pub fn open(engine: Arc<dyn Engine>, license: impl AsRef<Path>) -> Result<Self> {
        let mut session = Self::new(engine);
        session.create(license)?;
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    pub(crate) fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub(crate) fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    /// Identifies one `Ready` period; changes on every successful `create`
    pub(crate) fn epoch(&self) -> Option<u64> {
        self.lifecycle.epoch()
    }

    pub(crate) fn require_ready(&self, op: &'static str) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(Error::status(op, Status::InvalidInstance))
        }
    }

    /// Open the engine with a license artifact
    pub fn create(&mut self, license: impl AsRef<Path>) -> Result<()> {
        if self.is_ready() {
            return Err(Error::status("Create", Status::AlreadyExists));
        }

        let license = license.as_ref();
        debug!("opening engine session with license {:?}", license);
        check_status("Create", self.engine.create(license))?;

        self.state = SessionState::Ready;
        self.lifecycle
            .epoch
            .store(NEXT_EPOCH.fetch_add(1, Ordering::Relaxed), Ordering::Release);
        info!("engine session opened");
        Ok(())
    }

    /// Release the engine.
    ///
    /// Closing a session that is not `Ready` is a no-op success. Live ink
    /// and settings objects are destroyed before the engine closes. The
    /// session counts as closed even when the engine reports an error, so the
    /// engine is never asked to close twice.
    pub fn close(&mut self) -> Result<()> {
        if !self.is_ready() {
            debug!("close on {:?} session ignored", self.state);
            return Ok(());
        }

        self.state = SessionState::Closed;
        self.lifecycle.epoch.store(0, Ordering::Release);
        for (raw, kind) in self.lifecycle.drain() {
            let Some(handle) = RawHandle::new(raw) else { continue };
            debug!("destroying {:?} {:#x} still alive at close", kind, raw);
            match kind {
                ObjectKind::Ink => self.engine.destroy_ink(handle),
                ObjectKind::Settings => self.engine.destroy_settings(handle),
            }
        }
        check_status("Close", self.engine.close())?;
        info!("engine session closed");
        Ok(())
    }

    /// Where per-language model files (`*.hdb`) are found
    pub fn set_external_resource_path(&self, path: impl AsRef<Path>) -> Result<()> {
        self.require_ready("SetExternalResourcePath")?;
        let path = path.as_ref();
        debug!("resource path: {:?}", path);
        check_status("SetExternalResourcePath", self.engine.set_external_resource_path(path))
    }

    /// Where auxiliary engine libraries are found
    pub fn set_external_library_path(&self, path: impl AsRef<Path>) -> Result<()> {
        self.require_ready("SetExternalLibraryPath")?;
        let path = path.as_ref();
        debug!("library path: {:?}", path);
        check_status("SetExternalLibraryPath", self.engine.set_external_library_path(path))
    }

    pub fn set_param(&self, kind: ParamKind, param: &[u8]) -> Result<()> {
        self.require_ready("SetParam")?;
        check_status("SetParam", self.engine.set_param(kind.code(), param))
    }

    pub fn get_param(&self, kind: ParamKind, param: &mut [u8]) -> Result<()> {
        self.require_ready("GetParam")?;
        check_status("GetParam", self.engine.get_param(kind.code(), param))
    }

    /// Set the engine's own log verbosity
    pub fn set_log_level(&self, level: LogLevel) -> Result<()> {
        let mut param = [0u8; PARAM_BUFFER_LEN];
        param[0] = level as u8;
        self.set_param(ParamKind::LogLevel, &param)
    }

    /// Levels above `Debug` are reported as `Debug`
    pub fn log_level(&self) -> Result<LogLevel> {
        let mut param = [0u8; PARAM_BUFFER_LEN];
        self.get_param(ParamKind::LogLevel, &mut param)?;
        Ok(LogLevel::from_byte(param[0]).unwrap_or(LogLevel::Debug))
    }

    pub fn revision(&self) -> Result<String> {
        self.require_ready("GetRevision")?;
        let units = check("GetRevision", self.engine.revision())?;
        Ok(string_from_utf16(&units))
    }

    /// License expiry as reported by the engine, `None` when it never expires
    pub fn due_date(&self) -> Result<Option<i32>> {
        self.require_ready("GetDueDate")?;
        let date = check("GetDueDate", self.engine.due_date())?;
        Ok((date != 0).then_some(date))
    }

    pub fn available_languages(&self) -> Result<String> {
        self.require_ready("AvailableLanguageList")?;
        let units = check("AvailableLanguageList", self.engine.available_languages())?;
        Ok(string_from_utf16(&units))
    }

    /// Allocate an empty ink buffer on the engine
    pub fn create_ink(&self) -> Result<Ink> {
        self.require_ready("CreateInkObject")?;
        Ink::new(Arc::clone(&self.engine), Arc::clone(&self.lifecycle))
    }

    /// Allocate a settings object on the engine
    pub fn create_settings(&self) -> Result<Settings> {
        self.require_ready("CreateSettingObject")?;
        Settings::new(Arc::clone(&self.engine), Arc::clone(&self.lifecycle))
    }

    /// Recognize `ink` with `settings`, which must be committed to this session
    pub fn recognize(&self, ink: &Ink, settings: &Settings) -> Result<Recognition> {
        decoder::recognize(self, ink, settings)
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("failed to close engine session: {}", e);
        }
    }
}

impl std::fmt::Debug for EngineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSession")
            .field("state", &self.state)
            .field("epoch", &self.epoch())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::StubEngine;

    fn engine() -> Arc<StubEngine> {
        Arc::new(StubEngine::new().accept_license("k.key"))
    }

    #[test]
    fn test_create_close_create() {
        let mut session = EngineSession::new(engine());
        assert_eq!(session.state(), SessionState::Uninitialized);

        session.create("k.key").unwrap();
        assert!(session.is_ready());
        session.close().unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        session.create("k.key").unwrap();
        assert!(session.is_ready());
    }

    #[test]
    fn test_double_create_fails() {
        let mut session = EngineSession::open(engine(), "k.key").unwrap();
        let err = session.create("k.key").unwrap_err();
        assert_eq!(err.status_code(), Some(Status::AlreadyExists));
        assert!(session.is_ready());
    }

    #[test]
    fn test_second_session_on_same_engine_fails() {
        let engine = engine();
        let _first = EngineSession::open(engine.clone(), "k.key").unwrap();
        let err = EngineSession::open(engine, "k.key").unwrap_err();
        assert_eq!(err.status_code(), Some(Status::AlreadyExists));
    }

    #[test]
    fn test_bad_license() {
        let mut session = EngineSession::new(engine());
        let err = session.create("other.key").unwrap_err();
        assert_eq!(err.status_code(), Some(Status::AuthorizationFail));
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[test]
    fn test_close_is_noop_when_not_ready() {
        let mut session = EngineSession::new(engine());
        session.close().unwrap();
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[test]
    fn test_drop_closes_engine() {
        let engine = engine();
        {
            let _session = EngineSession::open(engine.clone(), "k.key").unwrap();
            assert!(engine.is_open());
        }
        assert!(!engine.is_open());
    }

    #[test]
    fn test_paths_require_ready() {
        let session = EngineSession::new(engine());
        let err = session.set_external_resource_path("/tmp/hdb").unwrap_err();
        assert_eq!(err.status_code(), Some(Status::InvalidInstance));
        assert!(session.create_ink().is_err());
    }

    #[test]
    fn test_log_level_param() {
        let session = EngineSession::open(engine(), "k.key").unwrap();
        assert_eq!(session.log_level().unwrap(), LogLevel::None);
        session.set_log_level(LogLevel::Debug).unwrap();
        assert_eq!(session.log_level().unwrap(), LogLevel::Debug);
    }

    #[test]
    fn test_informational_queries() {
        let engine = Arc::new(
            StubEngine::new()
                .accept_license("k.key")
                .with_revision("2.1.0-r1234")
                .with_due_date(20301231),
        );
        let session = EngineSession::open(engine, "k.key").unwrap();
        assert_eq!(session.revision().unwrap(), "2.1.0-r1234");
        assert_eq!(session.due_date().unwrap(), Some(20301231));

        let session_without_expiry = {
            drop(session);
            EngineSession::open(Arc::new(StubEngine::new().accept_license("k.key")), "k.key").unwrap()
        };
        assert_eq!(session_without_expiry.due_date().unwrap(), None);
    }

    #[test]
    fn test_epoch_changes_on_reopen() {
        let mut session = EngineSession::open(engine(), "k.key").unwrap();
        let first = session.epoch().unwrap();
        session.close().unwrap();
        assert_eq!(session.epoch(), None);
        session.create("k.key").unwrap();
        assert_ne!(session.epoch().unwrap(), first);
    }

    #[test]
    fn test_close_destroys_live_objects_first() {
        let engine = engine();
        let mut session = EngineSession::open(engine.clone(), "k.key").unwrap();
        let ink = session.create_ink().unwrap();
        let settings = session.create_settings().unwrap();
        let dropped = session.create_ink().unwrap();
        drop(dropped);
        assert_eq!(engine.live_handles(), 2);

        session.close().unwrap();
        assert_eq!(engine.live_handles(), 0);
        assert_eq!(engine.late_releases(), 0);

        drop(ink);
        drop(settings);
        assert_eq!(engine.double_releases(), 0);
        assert_eq!(engine.late_releases(), 0);
    }
}
