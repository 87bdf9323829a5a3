//! In-process stand-in for the recognition engine
//!
//! [`StubEngine`] implements the full [`Engine`] boundary with scripted
//! answers. It keeps track of every handle it hands out so tests can check
//! that each one is released exactly once, and it enforces the same ordering
//! rules as the real engine (one open session, committed settings, no
//! reentrant recognition).

use std::collections::{HashMap, VecDeque};
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tracing::debug;

use crate::engine::{Engine, EngineCall, RawHandle};
use crate::error::{RawStatus, Status};
use crate::types::{Language, Mode, Point};

const SUCCESS: RawStatus = Status::Success as RawStatus;

/// One block of a scripted answer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StubBlock {
    pub stroke_indices: Vec<i32>,
    pub candidates: Vec<String>,
}

impl StubBlock {
    pub fn new<S: Into<String>>(stroke_indices: impl Into<Vec<i32>>, candidates: impl IntoIterator<Item = S>) -> Self {
        Self {
            stroke_indices: stroke_indices.into(),
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }
}

/// A scripted answer to one `recognize` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubResponse {
    pub status: RawStatus,
    pub lines: Vec<Vec<StubBlock>>,
    /// Make the named accessor fail with this code while decoding
    pub fail_on: Option<(&'static str, RawStatus)>,
}

impl StubResponse {
    pub fn lines(lines: Vec<Vec<StubBlock>>) -> Self {
        Self {
            status: SUCCESS,
            lines,
            fail_on: None,
        }
    }

    pub fn status(status: Status) -> Self {
        Self {
            status: status.code(),
            lines: Vec::new(),
            fail_on: None,
        }
    }

    /// Report `status` while still leaving the scripted lines in the tree
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status.code();
        self
    }

    pub fn failing_on(mut self, call: &'static str, status: Status) -> Self {
        self.fail_on = Some((call, status.code()));
        self
    }
}

/// Snapshot of committed settings as the engine received them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedSettings {
    pub mode: Option<Mode>,
    pub candidate_size: i32,
    /// `(language code, option bits)` in insertion order
    pub languages: Vec<(i32, i32)>,
    pub charset: String,
}

#[derive(Debug, Default)]
struct StubInk {
    points: Vec<Point>,
    /// Exclusive end index of every closed stroke
    stroke_ends: Vec<usize>,
}

impl StubInk {
    fn open_points(&self) -> usize {
        self.points.len() - self.stroke_ends.last().copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default)]
struct StubSettings {
    mode: i32,
    candidate_size: i32,
    languages: Vec<(i32, i32)>,
    charset: Vec<u16>,
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Line { result: u64, line: usize },
    Block { result: u64, line: usize, block: usize },
}

#[derive(Debug, Default)]
struct State {
    open: bool,
    next_handle: u64,
    inks: HashMap<u64, StubInk>,
    settings: HashMap<u64, StubSettings>,
    results: HashMap<u64, Option<StubResponse>>,
    nodes: HashMap<u64, Node>,
    params: HashMap<i32, Vec<u8>>,
    resource_path: Option<PathBuf>,
    library_path: Option<PathBuf>,
    attribute: Option<StubSettings>,
    responses: VecDeque<StubResponse>,
    last_strokes: Vec<Vec<Point>>,
    recognitions: usize,
    double_releases: usize,
    late_releases: usize,
}

impl State {
    fn allocate(&mut self) -> RawHandle {
        self.next_handle += 1;
        // Keep handles away from small integers so mixups with indices show up.
        RawHandle::from_nonzero(NonZeroU64::MIN.saturating_add(0x1000 + self.next_handle))
    }

    fn response(&self, result: u64) -> Option<&StubResponse> {
        self.results.get(&result).and_then(Option::as_ref)
    }

    fn fails(&self, result: u64, call: &str) -> Option<RawStatus> {
        self.response(result)
            .and_then(|r| r.fail_on)
            .filter(|(name, _)| *name == call)
            .map(|(_, code)| code)
    }

    fn block_data(&self, block: RawHandle, call: &str) -> EngineCall<&StubBlock> {
        match self.nodes.get(&block.get()) {
            Some(Node::Block { result, line, block }) => {
                if let Some(code) = self.fails(*result, call) {
                    return Err(code);
                }
                self.response(*result)
                    .and_then(|r| r.lines.get(*line))
                    .and_then(|blocks| blocks.get(*block))
                    .ok_or(Status::OutOfRange.code())
            }
            _ => Err(Status::InvalidInstance.code()),
        }
    }
}

/// Scripted engine for tests and dry runs
#[derive(Debug)]
pub struct StubEngine {
    licenses: Vec<PathBuf>,
    revision: String,
    due_date: i32,
    ink_capacity: usize,
    single_language: bool,
    require_resources: bool,
    latency: Duration,
    busy: AtomicBool,
    state: Mutex<State>,
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StubEngine {
    pub fn new() -> Self {
        Self {
            licenses: Vec::new(),
            revision: "stub".to_string(),
            due_date: 0,
            ink_capacity: 4096,
            single_language: false,
            require_resources: false,
            latency: Duration::ZERO,
            busy: AtomicBool::new(false),
            state: Mutex::new(State::default()),
        }
    }

    /// Treat `license` as a valid license artifact
    pub fn accept_license(mut self, license: impl Into<PathBuf>) -> Self {
        self.licenses.push(license.into());
        self
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    pub fn with_due_date(mut self, due_date: i32) -> Self {
        self.due_date = due_date;
        self
    }

    /// Maximum points per ink object
    pub fn with_ink_capacity(mut self, capacity: usize) -> Self {
        self.ink_capacity = capacity;
        self
    }

    /// Reject a second `add_language` on the same settings object
    pub fn single_language(mut self) -> Self {
        self.single_language = true;
        self
    }

    /// Fail recognition with `InvalidModel` until a resource path is set
    pub fn require_resources(mut self) -> Self {
        self.require_resources = true;
        self
    }

    /// Time each `recognize` call takes
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue an answer for a later `recognize` call
    pub fn respond(self, response: StubResponse) -> Self {
        self.push_response(response);
        self
    }

    pub fn push_response(&self, response: StubResponse) {
        self.lock().responses.push_back(response);
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    /// Ink, settings and result objects not yet destroyed
    pub fn live_handles(&self) -> usize {
        let state = self.lock();
        state.inks.len() + state.settings.len() + state.results.len()
    }

    /// Destroy calls on handles that were unknown or already destroyed
    pub fn double_releases(&self) -> usize {
        self.lock().double_releases
    }

    /// Destroy calls that arrived while no session was open
    pub fn late_releases(&self) -> usize {
        self.lock().late_releases
    }

    pub fn recognitions(&self) -> usize {
        self.lock().recognitions
    }

    pub fn resource_path(&self) -> Option<PathBuf> {
        self.lock().resource_path.clone()
    }

    pub fn library_path(&self) -> Option<PathBuf> {
        self.lock().library_path.clone()
    }

    /// The settings pushed by the last `set_attribute`
    pub fn committed(&self) -> Option<CommittedSettings> {
        self.lock().attribute.as_ref().map(|s| CommittedSettings {
            mode: Mode::from_code(s.mode),
            candidate_size: s.candidate_size,
            languages: s.languages.clone(),
            charset: String::from_utf16_lossy(&s.charset),
        })
    }

    /// Strokes of the ink passed to the last `recognize`
    pub fn last_strokes(&self) -> Vec<Vec<Point>> {
        self.lock().last_strokes.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test must not hide handle bookkeeping from the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_settings(&self, settings: RawHandle, f: impl FnOnce(&mut StubSettings) -> RawStatus) -> RawStatus {
        match self.lock().settings.get_mut(&settings.get()) {
            Some(s) => f(s),
            None => Status::InvalidInstance.code(),
        }
    }

    fn release(state: &mut State, removed: bool, what: &str, handle: RawHandle) {
        if !state.open {
            debug!("stub: {} {:#x} released after close", what, handle.get());
            state.late_releases += 1;
        }
        if !removed {
            debug!("stub: {} {:#x} released twice", what, handle.get());
            state.double_releases += 1;
        }
    }

    fn run_recognition(&self, ink: RawHandle, result: RawHandle) -> RawStatus {
        let mut state = self.lock();
        if !state.open {
            return Status::InvalidInstance.code();
        }
        let Some(attribute) = state.attribute.clone() else {
            return Status::InvalidInstance.code();
        };
        if attribute.languages.is_empty() {
            return Status::InvalidModel.code();
        }
        if self.require_resources && state.resource_path.is_none() {
            return Status::InvalidModel.code();
        }
        if !state.results.contains_key(&result.get()) {
            return Status::InvalidInstance.code();
        }

        let strokes = match state.inks.get(&ink.get()) {
            Some(ink) if !ink.stroke_ends.is_empty() => split_strokes(ink),
            Some(_) => return Status::EmptyInk.code(),
            None => return Status::InvalidInstance.code(),
        };

        state.recognitions += 1;
        state.last_strokes = strokes;
        let response = state
            .responses
            .pop_front()
            .unwrap_or_else(|| StubResponse::status(Status::NoResult));
        let status = response.status;
        state.results.insert(result.get(), Some(response));
        status
    }
}

fn split_strokes(ink: &StubInk) -> Vec<Vec<Point>> {
    let mut start = 0;
    ink.stroke_ends
        .iter()
        .map(|&end| {
            let stroke = ink.points[start..end].to_vec();
            start = end;
            stroke
        })
        .collect()
}

impl Engine for StubEngine {
    fn create(&self, license: &Path) -> RawStatus {
        let mut state = self.lock();
        if state.open {
            return Status::AlreadyExists.code();
        }
        if !self.licenses.iter().any(|accepted| accepted == license) {
            return Status::AuthorizationFail.code();
        }
        state.open = true;
        SUCCESS
    }

    fn close(&self) -> RawStatus {
        let mut state = self.lock();
        if !state.open {
            return Status::InvalidInstance.code();
        }
        state.open = false;
        state.attribute = None;
        SUCCESS
    }

    fn set_external_resource_path(&self, path: &Path) -> RawStatus {
        let mut state = self.lock();
        if !state.open {
            return Status::InvalidInstance.code();
        }
        if self.require_resources && !path.is_dir() {
            return Status::InvalidModel.code();
        }
        state.resource_path = Some(path.to_path_buf());
        SUCCESS
    }

    fn set_external_library_path(&self, path: &Path) -> RawStatus {
        let mut state = self.lock();
        if !state.open {
            return Status::InvalidInstance.code();
        }
        state.library_path = Some(path.to_path_buf());
        SUCCESS
    }

    fn set_param(&self, kind: i32, param: &[u8]) -> RawStatus {
        let mut state = self.lock();
        if !state.open {
            return Status::InvalidInstance.code();
        }
        if !(0..=3).contains(&kind) {
            return Status::InvalidArguments.code();
        }
        state.params.insert(kind, param.to_vec());
        SUCCESS
    }

    fn get_param(&self, kind: i32, param: &mut [u8]) -> RawStatus {
        let state = self.lock();
        if !state.open {
            return Status::InvalidInstance.code();
        }
        if !(0..=3).contains(&kind) {
            return Status::InvalidArguments.code();
        }
        param.fill(0);
        if let Some(stored) = state.params.get(&kind) {
            let n = stored.len().min(param.len());
            param[..n].copy_from_slice(&stored[..n]);
        }
        SUCCESS
    }

    fn revision(&self) -> EngineCall<Vec<u16>> {
        Ok(self.revision.encode_utf16().collect())
    }

    fn due_date(&self) -> EngineCall<i32> {
        Ok(self.due_date)
    }

    fn available_languages(&self) -> EngineCall<Vec<u16>> {
        let list = [
            Language::Elementary,
            Language::Middle,
            Language::MiddleExpansion,
            Language::Chemical,
        ]
        .iter()
        .map(|lang| format!("{}:{}", lang.code(), lang))
        .collect::<Vec<_>>()
        .join(",");
        Ok(list.encode_utf16().collect())
    }

    fn create_ink(&self) -> Option<RawHandle> {
        let mut state = self.lock();
        let handle = state.allocate();
        state.inks.insert(handle.get(), StubInk::default());
        Some(handle)
    }

    fn destroy_ink(&self, ink: RawHandle) {
        let mut state = self.lock();
        let removed = state.inks.remove(&ink.get()).is_some();
        Self::release(&mut state, removed, "ink", ink);
    }

    fn add_point(&self, ink: RawHandle, x: i32, y: i32) -> RawStatus {
        let mut state = self.lock();
        let Some(ink) = state.inks.get_mut(&ink.get()) else {
            return Status::InvalidInstance.code();
        };
        if ink.points.len() >= self.ink_capacity {
            return Status::OutOfRange.code();
        }
        ink.points.push(Point::new(x, y));
        SUCCESS
    }

    fn end_stroke(&self, ink: RawHandle) -> RawStatus {
        let mut state = self.lock();
        let Some(ink) = state.inks.get_mut(&ink.get()) else {
            return Status::InvalidInstance.code();
        };
        if ink.open_points() == 0 {
            return Status::EmptyInk.code();
        }
        ink.stroke_ends.push(ink.points.len());
        SUCCESS
    }

    fn clear_ink(&self, ink: RawHandle) {
        if let Some(ink) = self.lock().inks.get_mut(&ink.get()) {
            *ink = StubInk::default();
        }
    }

    fn ink_point(&self, ink: RawHandle, index: usize) -> EngineCall<Point> {
        let state = self.lock();
        let ink = state.inks.get(&ink.get()).ok_or(Status::InvalidInstance.code())?;
        ink.points.get(index).copied().ok_or(Status::OutOfRange.code())
    }

    fn ink_point_count(&self, ink: RawHandle) -> EngineCall<usize> {
        let state = self.lock();
        let ink = state.inks.get(&ink.get()).ok_or(Status::InvalidInstance.code())?;
        Ok(ink.points.len())
    }

    fn create_settings(&self) -> Option<RawHandle> {
        let mut state = self.lock();
        let handle = state.allocate();
        state.settings.insert(handle.get(), StubSettings::default());
        Some(handle)
    }

    fn destroy_settings(&self, settings: RawHandle) {
        let mut state = self.lock();
        let removed = state.settings.remove(&settings.get()).is_some();
        Self::release(&mut state, removed, "settings", settings);
    }

    fn set_recognition_mode(&self, settings: RawHandle, mode: i32) -> RawStatus {
        if Mode::from_code(mode).is_none() {
            return Status::InvalidArguments.code();
        }
        self.with_settings(settings, |s| {
            s.mode = mode;
            SUCCESS
        })
    }

    fn set_candidate_size(&self, settings: RawHandle, size: i32) -> RawStatus {
        if size < 0 {
            return Status::InvalidArguments.code();
        }
        self.with_settings(settings, |s| {
            s.candidate_size = size;
            SUCCESS
        })
    }

    fn add_language(&self, settings: RawHandle, language: i32, options: i32) -> RawStatus {
        if Language::from_code(language).is_none() {
            return Status::InvalidArguments.code();
        }
        let single = self.single_language;
        self.with_settings(settings, |s| {
            if single && !s.languages.is_empty() {
                return Status::InvalidArguments.code();
            }
            s.languages.push((language, options));
            SUCCESS
        })
    }

    fn language_count(&self, settings: RawHandle) -> EngineCall<usize> {
        let state = self.lock();
        let settings = state.settings.get(&settings.get()).ok_or(Status::InvalidInstance.code())?;
        Ok(settings.languages.len())
    }

    fn clear_languages(&self, settings: RawHandle) -> RawStatus {
        self.with_settings(settings, |s| {
            s.languages.clear();
            SUCCESS
        })
    }

    fn set_user_charset(&self, settings: RawHandle, charset: &[u16]) -> RawStatus {
        self.with_settings(settings, |s| {
            s.charset = charset.to_vec();
            SUCCESS
        })
    }

    fn set_attribute(&self, settings: RawHandle) -> RawStatus {
        let mut state = self.lock();
        if !state.open {
            return Status::InvalidInstance.code();
        }
        let Some(snapshot) = state.settings.get(&settings.get()).cloned() else {
            return Status::InvalidInstance.code();
        };
        state.attribute = Some(snapshot);
        SUCCESS
    }

    fn create_result(&self) -> Option<RawHandle> {
        let mut state = self.lock();
        let handle = state.allocate();
        state.results.insert(handle.get(), None);
        Some(handle)
    }

    fn destroy_result(&self, result: RawHandle) {
        let mut state = self.lock();
        let removed = state.results.remove(&result.get()).is_some();
        state.nodes.retain(|_, node| match node {
            Node::Line { result: owner, .. } | Node::Block { result: owner, .. } => *owner != result.get(),
        });
        Self::release(&mut state, removed, "result", result);
    }

    fn recognize(&self, ink: RawHandle, result: RawHandle) -> RawStatus {
        if self.busy.swap(true, Ordering::AcqRel) {
            return Status::EngineBusy.code();
        }
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        let status = self.run_recognition(ink, result);
        self.busy.store(false, Ordering::Release);
        status
    }

    fn line_count(&self, result: RawHandle) -> EngineCall<usize> {
        let state = self.lock();
        if !state.results.contains_key(&result.get()) {
            return Err(Status::InvalidInstance.code());
        }
        if let Some(code) = state.fails(result.get(), "GetLineSize") {
            return Err(code);
        }
        Ok(state.response(result.get()).map_or(0, |r| r.lines.len()))
    }

    fn line(&self, result: RawHandle, index: usize) -> EngineCall<RawHandle> {
        let mut state = self.lock();
        if let Some(code) = state.fails(result.get(), "GetLine") {
            return Err(code);
        }
        let lines = state
            .response(result.get())
            .map(|r| r.lines.len())
            .ok_or(Status::InvalidInstance.code())?;
        if index >= lines {
            return Err(Status::OutOfRange.code());
        }
        let handle = state.allocate();
        state.nodes.insert(
            handle.get(),
            Node::Line {
                result: result.get(),
                line: index,
            },
        );
        Ok(handle)
    }

    fn block_count(&self, line: RawHandle) -> EngineCall<usize> {
        let state = self.lock();
        match state.nodes.get(&line.get()) {
            Some(Node::Line { result, line }) => {
                if let Some(code) = state.fails(*result, "GetBlockSize") {
                    return Err(code);
                }
                Ok(state
                    .response(*result)
                    .and_then(|r| r.lines.get(*line))
                    .map_or(0, Vec::len))
            }
            _ => Err(Status::InvalidInstance.code()),
        }
    }

    fn block(&self, line: RawHandle, index: usize) -> EngineCall<RawHandle> {
        let mut state = self.lock();
        let Some(Node::Line { result, line }) = state.nodes.get(&line.get()).copied() else {
            return Err(Status::InvalidInstance.code());
        };
        if let Some(code) = state.fails(result, "GetBlock") {
            return Err(code);
        }
        let blocks = state
            .response(result)
            .and_then(|r| r.lines.get(line))
            .map_or(0, Vec::len);
        if index >= blocks {
            return Err(Status::OutOfRange.code());
        }
        let handle = state.allocate();
        state.nodes.insert(
            handle.get(),
            Node::Block {
                result,
                line,
                block: index,
            },
        );
        Ok(handle)
    }

    fn stroke_count(&self, block: RawHandle) -> EngineCall<usize> {
        let state = self.lock();
        state.block_data(block, "GetStrokeSize").map(|b| b.stroke_indices.len())
    }

    fn stroke_indices(&self, block: RawHandle, indices: &mut [i32]) -> EngineCall<usize> {
        let state = self.lock();
        let data = state.block_data(block, "GetStrokeIndices")?;
        let n = data.stroke_indices.len().min(indices.len());
        indices[..n].copy_from_slice(&data.stroke_indices[..n]);
        Ok(n)
    }

    fn candidate_count(&self, block: RawHandle) -> EngineCall<usize> {
        let state = self.lock();
        state.block_data(block, "GetCandidateSize").map(|b| b.candidates.len())
    }

    fn candidate(&self, block: RawHandle, index: usize) -> EngineCall<Vec<u16>> {
        let state = self.lock();
        let data = state.block_data(block, "GetCandidate")?;
        data.candidates
            .get(index)
            .map(|text| text.encode_utf16().collect())
            .ok_or(Status::OutOfRange.code())
    }
}
