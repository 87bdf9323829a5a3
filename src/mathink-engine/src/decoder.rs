//! Recognition call and result-tree decoding

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::engine::{Engine, RawHandle};
use crate::error::{check, Error, Result, Status};
use crate::ink::Ink;
use crate::session::EngineSession;
use crate::settings::Settings;

/// A recognized unit (word, symbol, expression) with ranked readings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Indices of the strokes that produced this block
    pub stroke_indices: Vec<u32>,
    /// Candidate readings, best first
    pub candidates: Vec<String>,
}

impl Block {
    /// The engine's top pick
    pub fn top(&self) -> Option<&str> {
        self.candidates.first().map(String::as_str)
    }
}

/// One recognized text line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub blocks: Vec<Block>,
}

/// Decoded recognition output; never contains empty lines or blocks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub lines: Vec<Line>,
}

impl RecognitionResult {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.lines.iter().flat_map(|line| line.blocks.iter())
    }

    /// Top candidate of the first block, the reading a renderer shows
    pub fn best(&self) -> Option<&str> {
        self.blocks().next().and_then(Block::top)
    }
}

/// Result of a recognition call together with the engine's status
/// (`Success` or `NoResult`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recognition {
    pub status: Status,
    pub result: RecognitionResult,
}

/// Result tree owned for the duration of one recognition
struct ResultTree<'e> {
    engine: &'e dyn Engine,
    handle: RawHandle,
}

impl<'e> ResultTree<'e> {
    fn create(engine: &'e dyn Engine) -> Result<Self> {
        let handle = engine
            .create_result()
            .ok_or_else(|| Error::status("CreateResultObject", Status::OutOfMemory))?;
        Ok(Self { engine, handle })
    }
}

impl Drop for ResultTree<'_> {
    fn drop(&mut self) {
        debug!("destroying result {:#x}", self.handle.get());
        self.engine.destroy_result(self.handle);
    }
}

pub(crate) fn recognize(session: &EngineSession, ink: &Ink, settings: &Settings) -> Result<Recognition> {
    session.require_ready("Recognize")?;
    if !settings.is_committed_to(session) {
        return Err(Error::status("Recognize", Status::InvalidInstance));
    }
    if !ink.belongs_to(session) {
        return Err(Error::status("Recognize", Status::InvalidInstance));
    }
    ink.require_live("Recognize")?;
    if ink.stroke_count() == 0 {
        return Err(Error::status("Recognize", Status::EmptyInk));
    }
    if ink.has_open_stroke() {
        warn!("recognizing with an unterminated stroke");
    }

    let engine = session.engine().as_ref();
    let tree = ResultTree::create(engine)?;

    debug!("recognizing {} strokes", ink.stroke_count());
    let code = engine.recognize(ink.handle(), tree.handle);

    // The tree is decoded whatever the status; a failed call may still have
    // left lines behind.
    let strokes = ink.stroke_count() + usize::from(ink.has_open_stroke());
    let decoded = decode(engine, tree.handle, settings.candidate_limit(), strokes);

    match Status::from_code(code) {
        Some(status) if status.is_ok() => {
            let result = decoded?;
            debug!("recognition {:?}: {} lines", status, result.lines.len());
            Ok(Recognition { status, result })
        }
        status => {
            let partial = decoded.unwrap_or_else(|e| {
                debug!("no partial result after status {}: {}", code, e);
                RecognitionResult::default()
            });
            match status {
                Some(status) => {
                    debug!("recognition {:?}: {} partial lines", status, partial.lines.len());
                    Err(Error::Recognition { status, partial })
                }
                None => {
                    if !partial.is_empty() {
                        warn!("discarding {} lines returned with unknown status {}", partial.lines.len(), code);
                    }
                    Err(Error::from_code("Recognize", code))
                }
            }
        }
    }
}

/// Walk the result tree; `strokes` bounds the stroke indices of a block
fn decode(engine: &dyn Engine, tree: RawHandle, limit: usize, strokes: usize) -> Result<RecognitionResult> {
    let line_count = check("GetLineSize", engine.line_count(tree))?;
    let mut lines = Vec::new();

    for i in 0..line_count {
        let line = check("GetLine", engine.line(tree, i))?;
        let block_count = check("GetBlockSize", engine.block_count(line))?;
        let mut blocks = Vec::new();

        for j in 0..block_count {
            let block = check("GetBlock", engine.block(line, j))?;
            let block = decode_block(engine, block, limit, strokes, (i, j))?;
            if !block.candidates.is_empty() {
                blocks.push(block);
            }
        }

        if !blocks.is_empty() {
            lines.push(Line { blocks });
        }
    }

    Ok(RecognitionResult { lines })
}

fn decode_block(
    engine: &dyn Engine,
    block: RawHandle,
    limit: usize,
    strokes: usize,
    at: (usize, usize),
) -> Result<Block> {
    let stroke_count = check("GetStrokeSize", engine.stroke_count(block))?;
    if stroke_count > strokes {
        warn!("[{},{}] claims {} strokes, ink has {}", at.0, at.1, stroke_count, strokes);
        return Err(Error::status("GetStrokeSize", Status::OutOfRange));
    }
    let mut raw = vec![0i32; stroke_count];
    let written = check("GetStrokeIndices", engine.stroke_indices(block, &mut raw))?;
    raw.truncate(written);

    let stroke_indices = raw
        .into_iter()
        .map(|index| {
            u32::try_from(index)
                .ok()
                .filter(|&i| (i as usize) < strokes)
                .ok_or_else(|| Error::status("GetStrokeIndices", Status::OutOfRange))
        })
        .collect::<Result<Vec<_>>>()?;
    debug!("[{},{}] strokes {:?}", at.0, at.1, stroke_indices);

    let available = check("GetCandidateSize", engine.candidate_count(block))?;
    let wanted = if limit == 0 { available } else { available.min(limit) };
    let mut candidates = Vec::new();

    for k in 0..wanted {
        let units = check("GetCandidate", engine.candidate(block, k))?;
        let text = string_from_utf16(&units);
        debug!("[{},{},{}]: \"{}\" ({})", at.0, at.1, k, text, hex_units(&units));
        candidates.push(text);
    }

    Ok(Block {
        stroke_indices,
        candidates,
    })
}

/// Convert engine text, stopping at a terminating NUL
pub(crate) fn string_from_utf16(units: &[u16]) -> String {
    let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
    let units = &units[..end];
    String::from_utf16(units).unwrap_or_else(|_| {
        warn!("engine returned malformed UTF-16: {}", hex_units(units));
        String::from_utf16_lossy(units)
    })
}

fn hex_units(units: &[u16]) -> String {
    units
        .iter()
        .map(|u| format!("{:#x}", u))
        .collect::<Vec<_>>()
        .join(" ")
}
