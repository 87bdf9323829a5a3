//! Stroke capture buffer

use std::sync::Arc;

use tracing::{debug, trace};

use crate::engine::{Engine, RawHandle};
use crate::error::{check, check_status, Error, Result, Status};
use crate::session::{EngineSession, Lifecycle, ObjectKind};
use crate::types::{Point, Stroke};

/// An engine-side ink object plus a local mirror of its strokes.
///
/// Points are appended to the open stroke; the first point after a stroke
/// boundary opens a new one. Every pen-down/pen-up pair, including a pen-up
/// caused by leaving the input surface, must end in exactly one
/// [`Ink::end_stroke`].
///
/// The engine object is destroyed exactly once: when the `Ink` is dropped,
/// or when its session closes first. After the session closes every call
/// fails with `InvalidInstance`.
pub struct Ink {
    engine: Arc<dyn Engine>,
    lifecycle: Arc<Lifecycle>,
    handle: RawHandle,
    strokes: Vec<Stroke>,
    open: Vec<Point>,
}

impl Ink {
    pub(crate) fn new(engine: Arc<dyn Engine>, lifecycle: Arc<Lifecycle>) -> Result<Self> {
        let handle = engine
            .create_ink()
            .ok_or_else(|| Error::status("CreateInkObject", Status::OutOfMemory))?;
        lifecycle.register(handle, ObjectKind::Ink);
        debug!("created ink {:#x}", handle.get());

        Ok(Self {
            engine,
            lifecycle,
            handle,
            strokes: Vec::new(),
            open: Vec::new(),
        })
    }

    pub(crate) fn handle(&self) -> RawHandle {
        self.handle
    }

    pub(crate) fn belongs_to(&self, session: &EngineSession) -> bool {
        Arc::ptr_eq(&self.lifecycle, session.lifecycle())
    }

    pub(crate) fn require_live(&self, op: &'static str) -> Result<()> {
        self.lifecycle.require_live(op, self.handle)
    }

    /// Append a point to the open stroke
    pub fn add_point(&mut self, x: i32, y: i32) -> Result<()> {
        self.require_live("AddPoint")?;
        check_status("AddPoint", self.engine.add_point(self.handle, x, y))?;
        trace!("point ({}, {})", x, y);
        self.open.push(Point::new(x, y));
        Ok(())
    }

    /// Close the open stroke; fails with `EmptyInk` if it has no points
    pub fn end_stroke(&mut self) -> Result<()> {
        self.require_live("EndStroke")?;
        if self.open.is_empty() {
            return Err(Error::status("EndStroke", Status::EmptyInk));
        }

        check_status("EndStroke", self.engine.end_stroke(self.handle))?;
        let points = std::mem::take(&mut self.open);
        debug!("stroke {} closed with {} points", self.strokes.len(), points.len());
        self.strokes.push(Stroke { points });
        Ok(())
    }

    /// Drop all strokes and points
    pub fn clear(&mut self) -> Result<()> {
        self.require_live("InkClear")?;
        self.engine.clear_ink(self.handle);
        self.strokes.clear();
        self.open.clear();
        Ok(())
    }

    /// Points in the flattened stream, including those of an open stroke
    pub fn point_count(&self) -> Result<usize> {
        self.require_live("GetInkCount")?;
        check("GetInkCount", self.engine.ink_point_count(self.handle))
    }

    /// Point at `index` in the flattened stream, `None` when out of range or
    /// once the session has closed
    pub fn get_point(&self, index: usize) -> Option<Point> {
        self.require_live("GetInkPoint").ok()?;
        self.engine.ink_point(self.handle, index).ok()
    }

    /// Closed strokes
    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn stroke_count(&self) -> usize {
        self.strokes.len()
    }

    pub fn has_open_stroke(&self) -> bool {
        !self.open.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty() && self.open.is_empty()
    }

    /// Replay a whole stroke: every point, then the stroke boundary
    pub fn add_stroke<I, P>(&mut self, points: I) -> Result<()>
    where
        I: IntoIterator<Item = P>,
        P: Into<Point>,
    {
        for point in points {
            let point = point.into();
            self.add_point(point.x, point.y)?;
        }
        self.end_stroke()
    }
}

impl Drop for Ink {
    fn drop(&mut self) {
        if self.lifecycle.release(self.handle) {
            debug!("destroying ink {:#x}", self.handle.get());
            self.engine.destroy_ink(self.handle);
        }
    }
}

impl std::fmt::Debug for Ink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ink")
            .field("handle", &self.handle)
            .field("strokes", &self.strokes.len())
            .field("open_points", &self.open.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::EngineSession;
    use crate::stub::StubEngine;

    fn session() -> EngineSession {
        EngineSession::open(Arc::new(StubEngine::new().accept_license("k.key")), "k.key").unwrap()
    }

    #[test]
    fn test_counts_follow_successful_calls() {
        const CAPACITY: usize = 16;
        let engine = Arc::new(StubEngine::new().accept_license("k.key").with_ink_capacity(CAPACITY));
        let session = EngineSession::open(engine, "k.key").unwrap();
        let mut seed: u32 = 0x2545_f491;

        for _ in 0..64 {
            let mut ink = session.create_ink().unwrap();
            let (mut points, mut strokes, mut open) = (0usize, 0usize, 0usize);

            for _ in 0..40 {
                seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                if seed >> 30 == 0 {
                    let result = ink.end_stroke();
                    if open > 0 {
                        result.unwrap();
                        strokes += 1;
                        open = 0;
                    } else {
                        assert_eq!(result.unwrap_err().status_code(), Some(Status::EmptyInk));
                    }
                } else {
                    let x = (seed >> 16) as i32 % 100;
                    let result = ink.add_point(x, -x);
                    if points < CAPACITY {
                        result.unwrap();
                        points += 1;
                        open += 1;
                    } else {
                        assert_eq!(result.unwrap_err().status_code(), Some(Status::OutOfRange));
                    }
                }

                assert_eq!(ink.stroke_count(), strokes);
                assert_eq!(ink.point_count().unwrap(), points);
                assert_eq!(ink.has_open_stroke(), open > 0);
            }
        }
    }

    #[test]
    fn test_calls_after_close_are_rejected() {
        let engine = Arc::new(StubEngine::new().accept_license("k.key"));
        let mut session = EngineSession::open(engine.clone(), "k.key").unwrap();
        let mut ink = session.create_ink().unwrap();
        ink.add_point(1, 1).unwrap();

        session.close().unwrap();
        assert_eq!(engine.live_handles(), 0);
        assert_eq!(engine.late_releases(), 0);

        let calls = [
            ink.add_point(2, 2),
            ink.end_stroke(),
            ink.clear(),
            ink.point_count().map(drop),
        ];
        for result in calls {
            assert_eq!(result.unwrap_err().status_code(), Some(Status::InvalidInstance));
        }
        assert_eq!(ink.get_point(0), None);

        // A new Ready period does not revive the old object.
        session.create("k.key").unwrap();
        assert_eq!(
            ink.add_point(3, 3).unwrap_err().status_code(),
            Some(Status::InvalidInstance)
        );

        drop(ink);
        assert_eq!(engine.double_releases(), 0);
    }

    #[test]
    fn test_end_stroke_without_points() {
        let session = session();
        let mut ink = session.create_ink().unwrap();
        let err = ink.end_stroke().unwrap_err();
        assert_eq!(err.status_code(), Some(Status::EmptyInk));
        assert_eq!(ink.stroke_count(), 0);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let session = session();
        let mut ink = session.create_ink().unwrap();
        ink.add_stroke([(0, 0), (3, 4)]).unwrap();

        ink.clear().unwrap();
        assert_eq!(ink.stroke_count(), 0);
        assert_eq!(ink.point_count().unwrap(), 0);
        ink.clear().unwrap();
        assert_eq!(ink.stroke_count(), 0);
        assert_eq!(ink.point_count().unwrap(), 0);
        assert!(ink.is_empty());
    }

    #[test]
    fn test_random_access() {
        let session = session();
        let mut ink = session.create_ink().unwrap();
        ink.add_stroke([(0, 0), (5, 5)]).unwrap();
        ink.add_stroke([(10, 10)]).unwrap();

        assert_eq!(ink.get_point(0), Some(Point::new(0, 0)));
        assert_eq!(ink.get_point(2), Some(Point::new(10, 10)));
        assert_eq!(ink.get_point(3), None);
        assert_eq!(ink.strokes()[0].points, vec![Point::new(0, 0), Point::new(5, 5)]);
    }

    #[test]
    fn test_capacity_is_out_of_range() {
        let engine = Arc::new(StubEngine::new().accept_license("k.key").with_ink_capacity(2));
        let session = EngineSession::open(engine, "k.key").unwrap();
        let mut ink = session.create_ink().unwrap();

        ink.add_point(0, 0).unwrap();
        ink.add_point(1, 1).unwrap();
        let err = ink.add_point(2, 2).unwrap_err();
        assert_eq!(err.status_code(), Some(Status::OutOfRange));
        assert_eq!(ink.point_count().unwrap(), 2);
    }

    #[test]
    fn test_drop_destroys_handle_once() {
        let engine = Arc::new(StubEngine::new().accept_license("k.key"));
        let session = EngineSession::open(engine.clone(), "k.key").unwrap();
        let ink = session.create_ink().unwrap();
        assert_eq!(engine.live_handles(), 1);
        drop(ink);
        assert_eq!(engine.live_handles(), 0);
        assert_eq!(engine.double_releases(), 0);
    }
}
