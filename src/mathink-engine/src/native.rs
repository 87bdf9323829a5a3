//! Backend linking the vendor engine library (`libspmath`)
//!
//! The library keeps a single global engine. Every [`NativeEngine`] value
//! talks to that same instance, so the engine's own `AlreadyExists` check is
//! what keeps a second session from opening.

use std::ffi::{c_char, c_int, c_void, CString};
use std::path::Path;
use std::ptr;

use crate::engine::{Engine, EngineCall, RawHandle};
use crate::error::{RawStatus, Status};
use crate::types::Point;

/// Length of the buffer handed to `DHWR_GetRevision`, in UTF-16 units
const REVISION_BUFFER_LEN: usize = 64;

#[repr(C)]
#[derive(Default)]
struct DhwrPoint {
    x: c_int,
    y: c_int,
}

#[link(name = "spmath")]
extern "C" {
    fn DHWR_Create(key: *const c_char) -> c_int;
    fn DHWR_Close() -> c_int;
    fn DHWR_RecognizeWithContext(ink: *mut c_void, result: *mut c_void) -> c_int;

    fn DHWR_CreateInkObject() -> *mut c_void;
    fn DHWR_DestroyInkObject(ink: *mut c_void);
    fn DHWR_AddPoint(ink: *mut c_void, x: c_int, y: c_int) -> bool;
    fn DHWR_EndStroke(ink: *mut c_void) -> bool;
    fn DHWR_InkClear(ink: *mut c_void);
    fn DHWR_GetInkPoint(ink: *mut c_void, index: c_int, point: *mut DhwrPoint) -> bool;
    fn DHWR_GetInkCount(ink: *mut c_void) -> c_int;

    fn DHWR_SetAttribute(setting: *mut c_void) -> c_int;
    fn DHWR_CreateSettingObject() -> *mut c_void;
    fn DHWR_DestroySettingObject(setting: *mut c_void);
    fn DHWR_SetRecognitionMode(setting: *mut c_void, mode: c_int) -> c_int;
    fn DHWR_SetCandidateSize(setting: *mut c_void, size: c_int) -> c_int;
    fn DHWR_AddLanguage(setting: *mut c_void, lang: c_int, option: c_int) -> c_int;
    fn DHWR_GetLanguageSize(setting: *mut c_void) -> c_int;
    fn DHWR_ClearLanguage(setting: *mut c_void) -> c_int;
    fn DHWR_SetUserCharSet(setting: *mut c_void, charset: *const u16) -> c_int;

    fn DHWR_CreateResultObject() -> *mut c_void;
    fn DHWR_GetLineSize(result: *mut c_void) -> c_int;
    fn DHWR_GetLine(result: *mut c_void, index: c_int) -> *mut c_void;
    fn DHWR_GetBlockSize(line: *mut c_void) -> c_int;
    fn DHWR_GetBlock(line: *mut c_void, index: c_int) -> *mut c_void;
    fn DHWR_GetStrokeSize(block: *mut c_void) -> c_int;
    fn DHWR_GetStrokeIndices(block: *mut c_void, indices: *mut c_int, size: c_int) -> c_int;
    fn DHWR_GetCandidateSize(block: *mut c_void) -> c_int;
    fn DHWR_GetCandidate(block: *mut c_void, index: c_int) -> *const u16;
    fn DHWR_DestroyResultObject(result: *mut c_void);

    fn DHWR_AvailableLanguageList() -> *const u16;
    fn DHWR_SetExternalLibraryPath(path: *const u16) -> c_int;
    fn DHWR_SetExternalResourcePath(path: *const u16) -> c_int;
    fn DHWR_SetParam(kind: c_int, param: *const u8) -> c_int;
    fn DHWR_GetParam(kind: c_int, param: *mut u8) -> c_int;
    fn DHWR_GetRevision(revision: *mut u16) -> c_int;
    fn DHWR_GetDueDate(due_date: *mut c_int) -> c_int;
}

/// The linked engine library
#[derive(Debug, Default)]
pub struct NativeEngine {
    _private: (),
}

impl NativeEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

fn raw(handle: RawHandle) -> *mut c_void {
    handle.get() as usize as *mut c_void
}

fn handle(ptr: *mut c_void) -> Option<RawHandle> {
    RawHandle::new(ptr as usize as u64)
}

fn index(i: usize) -> EngineCall<c_int> {
    c_int::try_from(i).map_err(|_| Status::OutOfRange.code())
}

/// Counts come back as plain ints; a negative one is a failed call
fn count(n: c_int) -> EngineCall<usize> {
    usize::try_from(n).map_err(|_| Status::OutOfRange.code())
}

fn bool_status(ok: bool, failure: Status) -> RawStatus {
    if ok {
        Status::Success.code()
    } else {
        failure.code()
    }
}

/// NUL-terminated UTF-16 copy of a path
fn wide_path(path: &Path) -> Vec<u16> {
    path.to_string_lossy().encode_utf16().chain(std::iter::once(0)).collect()
}

/// Copy a NUL-terminated UTF-16 string owned by the engine.
///
/// # Safety
/// `p` must be null or point to a NUL-terminated buffer that stays valid for
/// the duration of the call.
unsafe fn read_wide(p: *const u16) -> EngineCall<Vec<u16>> {
    if p.is_null() {
        return Err(Status::NullPointer.code());
    }
    let mut len = 0;
    // SAFETY: the caller guarantees a terminating NUL within the buffer.
    while unsafe { *p.add(len) } != 0 {
        len += 1;
    }
    // SAFETY: `len` units before the terminator were just read.
    Ok(unsafe { std::slice::from_raw_parts(p, len) }.to_vec())
}

impl Engine for NativeEngine {
    fn create(&self, license: &Path) -> RawStatus {
        let Ok(key) = CString::new(license.to_string_lossy().into_owned()) else {
            return Status::InvalidArguments.code();
        };
        // SAFETY: `key` is a valid NUL-terminated string for the whole call.
        unsafe { DHWR_Create(key.as_ptr()) }
    }

    fn close(&self) -> RawStatus {
        // SAFETY: no arguments; the engine checks its own state.
        unsafe { DHWR_Close() }
    }

    fn set_external_resource_path(&self, path: &Path) -> RawStatus {
        let path = wide_path(path);
        // SAFETY: `path` is NUL-terminated and outlives the call.
        unsafe { DHWR_SetExternalResourcePath(path.as_ptr()) }
    }

    fn set_external_library_path(&self, path: &Path) -> RawStatus {
        let path = wide_path(path);
        // SAFETY: `path` is NUL-terminated and outlives the call.
        unsafe { DHWR_SetExternalLibraryPath(path.as_ptr()) }
    }

    fn set_param(&self, kind: i32, param: &[u8]) -> RawStatus {
        if param.is_empty() {
            return Status::InvalidArguments.code();
        }
        // SAFETY: the engine reads at most the parameter size for `kind`,
        // which callers size with `PARAM_BUFFER_LEN`.
        unsafe { DHWR_SetParam(kind, param.as_ptr()) }
    }

    fn get_param(&self, kind: i32, param: &mut [u8]) -> RawStatus {
        if param.is_empty() {
            return Status::InvalidArguments.code();
        }
        // SAFETY: as for `set_param`, with a writable buffer.
        unsafe { DHWR_GetParam(kind, param.as_mut_ptr()) }
    }

    fn revision(&self) -> EngineCall<Vec<u16>> {
        let mut buf = [0u16; REVISION_BUFFER_LEN];
        // SAFETY: the buffer is large enough for the engine's revision string.
        let code = unsafe { DHWR_GetRevision(buf.as_mut_ptr()) };
        if code != Status::Success.code() {
            return Err(code);
        }
        let len = buf.iter().position(|&u| u == 0).unwrap_or(buf.len());
        Ok(buf[..len].to_vec())
    }

    fn due_date(&self) -> EngineCall<i32> {
        let mut date: c_int = 0;
        // SAFETY: `date` is a valid out-pointer.
        let code = unsafe { DHWR_GetDueDate(&mut date) };
        if code == Status::Success.code() {
            Ok(date)
        } else {
            Err(code)
        }
    }

    fn available_languages(&self) -> EngineCall<Vec<u16>> {
        // SAFETY: the list is a static string owned by the engine.
        unsafe { read_wide(DHWR_AvailableLanguageList()) }
    }

    fn create_ink(&self) -> Option<RawHandle> {
        // SAFETY: allocation call without arguments.
        handle(unsafe { DHWR_CreateInkObject() })
    }

    fn destroy_ink(&self, ink: RawHandle) {
        // SAFETY: `ink` came from `create_ink` and is destroyed once by `Ink::drop`.
        unsafe { DHWR_DestroyInkObject(raw(ink)) }
    }

    fn add_point(&self, ink: RawHandle, x: i32, y: i32) -> RawStatus {
        // SAFETY: `ink` is a live ink handle.
        bool_status(unsafe { DHWR_AddPoint(raw(ink), x, y) }, Status::OutOfRange)
    }

    fn end_stroke(&self, ink: RawHandle) -> RawStatus {
        // SAFETY: `ink` is a live ink handle.
        bool_status(unsafe { DHWR_EndStroke(raw(ink)) }, Status::EmptyInk)
    }

    fn clear_ink(&self, ink: RawHandle) {
        // SAFETY: `ink` is a live ink handle.
        unsafe { DHWR_InkClear(raw(ink)) }
    }

    fn ink_point(&self, ink: RawHandle, i: usize) -> EngineCall<Point> {
        let mut point = DhwrPoint::default();
        // SAFETY: `ink` is live and `point` is a valid out-pointer.
        if unsafe { DHWR_GetInkPoint(raw(ink), index(i)?, &mut point) } {
            Ok(Point::new(point.x, point.y))
        } else {
            Err(Status::OutOfRange.code())
        }
    }

    fn ink_point_count(&self, ink: RawHandle) -> EngineCall<usize> {
        // SAFETY: `ink` is a live ink handle.
        count(unsafe { DHWR_GetInkCount(raw(ink)) })
    }

    fn create_settings(&self) -> Option<RawHandle> {
        // SAFETY: allocation call without arguments.
        handle(unsafe { DHWR_CreateSettingObject() })
    }

    fn destroy_settings(&self, settings: RawHandle) {
        // SAFETY: `settings` came from `create_settings` and is destroyed once.
        unsafe { DHWR_DestroySettingObject(raw(settings)) }
    }

    fn set_recognition_mode(&self, settings: RawHandle, mode: i32) -> RawStatus {
        // SAFETY: `settings` is a live settings handle.
        unsafe { DHWR_SetRecognitionMode(raw(settings), mode) }
    }

    fn set_candidate_size(&self, settings: RawHandle, size: i32) -> RawStatus {
        // SAFETY: `settings` is a live settings handle.
        unsafe { DHWR_SetCandidateSize(raw(settings), size) }
    }

    fn add_language(&self, settings: RawHandle, language: i32, options: i32) -> RawStatus {
        // SAFETY: `settings` is a live settings handle.
        unsafe { DHWR_AddLanguage(raw(settings), language, options) }
    }

    fn language_count(&self, settings: RawHandle) -> EngineCall<usize> {
        // SAFETY: `settings` is a live settings handle.
        count(unsafe { DHWR_GetLanguageSize(raw(settings)) })
    }

    fn clear_languages(&self, settings: RawHandle) -> RawStatus {
        // SAFETY: `settings` is a live settings handle.
        unsafe { DHWR_ClearLanguage(raw(settings)) }
    }

    fn set_user_charset(&self, settings: RawHandle, charset: &[u16]) -> RawStatus {
        if charset.is_empty() {
            // SAFETY: a null charset lifts the restriction.
            return unsafe { DHWR_SetUserCharSet(raw(settings), ptr::null()) };
        }
        let charset: Vec<u16> = charset.iter().copied().chain(std::iter::once(0)).collect();
        // SAFETY: `charset` is NUL-terminated and outlives the call.
        unsafe { DHWR_SetUserCharSet(raw(settings), charset.as_ptr()) }
    }

    fn set_attribute(&self, settings: RawHandle) -> RawStatus {
        // SAFETY: `settings` is a live settings handle.
        unsafe { DHWR_SetAttribute(raw(settings)) }
    }

    fn create_result(&self) -> Option<RawHandle> {
        // SAFETY: allocation call without arguments.
        handle(unsafe { DHWR_CreateResultObject() })
    }

    fn destroy_result(&self, result: RawHandle) {
        // SAFETY: `result` came from `create_result` and is destroyed once.
        unsafe { DHWR_DestroyResultObject(raw(result)) }
    }

    fn recognize(&self, ink: RawHandle, result: RawHandle) -> RawStatus {
        // SAFETY: both handles are live for the duration of the call.
        unsafe { DHWR_RecognizeWithContext(raw(ink), raw(result)) }
    }

    fn line_count(&self, result: RawHandle) -> EngineCall<usize> {
        // SAFETY: `result` is a live result handle.
        count(unsafe { DHWR_GetLineSize(raw(result)) })
    }

    fn line(&self, result: RawHandle, i: usize) -> EngineCall<RawHandle> {
        // SAFETY: `result` is live; the line is owned by it.
        handle(unsafe { DHWR_GetLine(raw(result), index(i)?) }).ok_or(Status::NullPointer.code())
    }

    fn block_count(&self, line: RawHandle) -> EngineCall<usize> {
        // SAFETY: `line` belongs to a live result tree.
        count(unsafe { DHWR_GetBlockSize(raw(line)) })
    }

    fn block(&self, line: RawHandle, i: usize) -> EngineCall<RawHandle> {
        // SAFETY: `line` belongs to a live result tree.
        handle(unsafe { DHWR_GetBlock(raw(line), index(i)?) }).ok_or(Status::NullPointer.code())
    }

    fn stroke_count(&self, block: RawHandle) -> EngineCall<usize> {
        // SAFETY: `block` belongs to a live result tree.
        count(unsafe { DHWR_GetStrokeSize(raw(block)) })
    }

    fn stroke_indices(&self, block: RawHandle, indices: &mut [i32]) -> EngineCall<usize> {
        let size = index(indices.len())?;
        // SAFETY: `indices` holds `size` writable ints.
        let code = unsafe { DHWR_GetStrokeIndices(raw(block), indices.as_mut_ptr(), size) };
        if code == Status::Success.code() {
            Ok(indices.len())
        } else {
            Err(code)
        }
    }

    fn candidate_count(&self, block: RawHandle) -> EngineCall<usize> {
        // SAFETY: `block` belongs to a live result tree.
        count(unsafe { DHWR_GetCandidateSize(raw(block)) })
    }

    fn candidate(&self, block: RawHandle, i: usize) -> EngineCall<Vec<u16>> {
        // SAFETY: the candidate text is owned by the live result tree and
        // copied before the call returns.
        unsafe { read_wide(DHWR_GetCandidate(raw(block), index(i)?)) }
    }
}
