//! The call boundary to the recognition engine
//!
//! [`Engine`] mirrors the engine's C entry points one to one. Objects on the
//! engine side (ink, settings, result trees and their lines/blocks) are
//! addressed by opaque [`RawHandle`]s. Fallible calls return the raw status
//! code in their error arm so every caller has to look at it.
//!
//! Implementations must tolerate calls from any thread, but the engine
//! itself is not reentrant: callers serialize (see [`crate::Recognizer`]).

use std::num::NonZeroU64;
use std::path::Path;

use crate::error::RawStatus;
use crate::types::Point;

/// Outcome of a boundary call: the value, or the engine's non-success code
pub type EngineCall<T> = Result<T, RawStatus>;

/// Opaque, non-null, pointer-width engine handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(NonZeroU64);

impl RawHandle {
    /// `None` for the engine's null handle
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn from_nonzero(raw: NonZeroU64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

/// The engine's entry points
pub trait Engine: Send + Sync {
    // Session

    fn create(&self, license: &Path) -> RawStatus;
    fn close(&self) -> RawStatus;
    fn set_external_resource_path(&self, path: &Path) -> RawStatus;
    fn set_external_library_path(&self, path: &Path) -> RawStatus;
    fn set_param(&self, kind: i32, param: &[u8]) -> RawStatus;
    fn get_param(&self, kind: i32, param: &mut [u8]) -> RawStatus;
    /// Revision string as UTF-16 code units
    fn revision(&self) -> EngineCall<Vec<u16>>;
    /// License due date, 0 when the license does not expire
    fn due_date(&self) -> EngineCall<i32>;
    fn available_languages(&self) -> EngineCall<Vec<u16>>;

    // Ink

    fn create_ink(&self) -> Option<RawHandle>;
    fn destroy_ink(&self, ink: RawHandle);
    fn add_point(&self, ink: RawHandle, x: i32, y: i32) -> RawStatus;
    fn end_stroke(&self, ink: RawHandle) -> RawStatus;
    fn clear_ink(&self, ink: RawHandle);
    fn ink_point(&self, ink: RawHandle, index: usize) -> EngineCall<Point>;
    fn ink_point_count(&self, ink: RawHandle) -> EngineCall<usize>;

    // Settings

    fn create_settings(&self) -> Option<RawHandle>;
    fn destroy_settings(&self, settings: RawHandle);
    fn set_recognition_mode(&self, settings: RawHandle, mode: i32) -> RawStatus;
    fn set_candidate_size(&self, settings: RawHandle, size: i32) -> RawStatus;
    fn add_language(&self, settings: RawHandle, language: i32, options: i32) -> RawStatus;
    fn language_count(&self, settings: RawHandle) -> EngineCall<usize>;
    fn clear_languages(&self, settings: RawHandle) -> RawStatus;
    /// An empty slice removes the restriction
    fn set_user_charset(&self, settings: RawHandle, charset: &[u16]) -> RawStatus;
    /// Push the settings object into the open session
    fn set_attribute(&self, settings: RawHandle) -> RawStatus;

    // Result tree

    fn create_result(&self) -> Option<RawHandle>;
    fn destroy_result(&self, result: RawHandle);
    fn recognize(&self, ink: RawHandle, result: RawHandle) -> RawStatus;
    fn line_count(&self, result: RawHandle) -> EngineCall<usize>;
    /// Lines and blocks are owned by their result tree and never destroyed on their own
    fn line(&self, result: RawHandle, index: usize) -> EngineCall<RawHandle>;
    fn block_count(&self, line: RawHandle) -> EngineCall<usize>;
    fn block(&self, line: RawHandle, index: usize) -> EngineCall<RawHandle>;
    fn stroke_count(&self, block: RawHandle) -> EngineCall<usize>;
    /// Fills `indices` and returns how many entries were written
    fn stroke_indices(&self, block: RawHandle, indices: &mut [i32]) -> EngineCall<usize>;
    fn candidate_count(&self, block: RawHandle) -> EngineCall<usize>;
    fn candidate(&self, block: RawHandle, index: usize) -> EngineCall<Vec<u16>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handle_is_rejected() {
        assert!(RawHandle::new(0).is_none());
        assert_eq!(RawHandle::new(0x7f00_dead).map(RawHandle::get), Some(0x7f00_dead));
    }
}
