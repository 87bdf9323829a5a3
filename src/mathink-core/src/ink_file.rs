//! Stroke files for the `recognize` command
//!
//! `{"strokes": [[[x, y], [x, y], ...], ...]}`, one inner array per stroke.

use anyhow::{bail, Context, Result};
use mathink_engine::{Point, Recognizer};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InkFile {
    pub strokes: Vec<Vec<[i32; 2]>>,
}

impl InkFile {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read ink file {:?}", path))?;
        let ink: InkFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse ink file {:?}", path))?;

        if let Some(i) = ink.strokes.iter().position(Vec::is_empty) {
            bail!("stroke {} in {:?} has no points", i, path);
        }
        Ok(ink)
    }

    pub fn point_count(&self) -> usize {
        self.strokes.iter().map(Vec::len).sum()
    }

    /// Points of each stroke
    pub fn points(&self) -> impl Iterator<Item = Vec<Point>> + '_ {
        self.strokes
            .iter()
            .map(|stroke| stroke.iter().map(|&[x, y]| Point::new(x, y)).collect())
    }

    /// Replace the recognizer's ink with these strokes
    pub fn feed(&self, recognizer: &Recognizer) -> mathink_engine::Result<()> {
        recognizer.clear_ink()?;
        for stroke in self.points() {
            for point in stroke {
                recognizer.add_point(point.x, point.y)?;
            }
            recognizer.end_stroke()?;
        }
        Ok(())
    }
}
