//! Wire-level vocabulary shared with the engine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A pen sample in device coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

/// One closed pen-down to pen-up path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stroke {
    pub points: Vec<Point>,
}

/// Recognition mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    SingleChar,
    #[default]
    MultiChar,
    OverlapChar,
    MultiLine,
}

impl Mode {
    pub fn code(self) -> i32 {
        match self {
            Mode::SingleChar => 0,
            Mode::MultiChar => 1,
            Mode::OverlapChar => 2,
            Mode::MultiLine => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Mode::SingleChar),
            1 => Some(Mode::MultiChar),
            2 => Some(Mode::OverlapChar),
            3 => Some(Mode::MultiLine),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::SingleChar => "single-char",
            Mode::MultiChar => "multi-char",
            Mode::OverlapChar => "overlap-char",
            Mode::MultiLine => "multi-line",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Mode::SingleChar, Mode::MultiChar, Mode::OverlapChar, Mode::MultiLine]
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| format!("unknown recognition mode '{}'", s))
    }
}

/// Recognition language (model family)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Language {
    Elementary,
    Middle,
    #[default]
    MiddleExpansion,
    Chemical,
}

impl Language {
    pub fn code(self) -> i32 {
        match self {
            Language::Elementary => 201,
            Language::Middle => 202,
            Language::MiddleExpansion => 203,
            Language::Chemical => 204,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            201 => Some(Language::Elementary),
            202 => Some(Language::Middle),
            203 => Some(Language::MiddleExpansion),
            204 => Some(Language::Chemical),
            _ => None,
        }
    }

    /// The option set usually paired with this language
    pub fn default_options(self) -> LanguageOptions {
        match self {
            Language::Elementary => LanguageOptions::ET,
            Language::Middle => LanguageOptions::MD,
            Language::MiddleExpansion => LanguageOptions::EX,
            Language::Chemical => LanguageOptions::CF,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Elementary => "elementary",
            Language::Middle => "middle",
            Language::MiddleExpansion => "middle-expansion",
            Language::Chemical => "chemical",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Language::Elementary,
            Language::Middle,
            Language::MiddleExpansion,
            Language::Chemical,
        ]
        .into_iter()
        .find(|lang| lang.as_str() == s)
        .ok_or_else(|| format!("unknown language '{}'", s))
    }
}

bitflags::bitflags! {
    /// Character-type options for a language. Each flag enables one symbol
    /// table independently; any combination is valid and the empty set
    /// means "no extra type".
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct LanguageOptions: u32 {
        const ET = 1 << 22;
        const MD = 1 << 23;
        const EX = 1 << 24;
        const CF = 1 << 25;
    }
}

impl FromStr for LanguageOptions {
    type Err = String;

    /// Parses `"EX"`, `"EX | CF"`, or `""` for none.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        bitflags::parser::from_str(s).map_err(|e| format!("invalid language options '{}': {}", s, e))
    }
}

/// One entry of the ordered language list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageSpec {
    pub language: Language,
    #[serde(default)]
    pub options: LanguageOptions,
}

impl LanguageSpec {
    pub fn new(language: Language, options: LanguageOptions) -> Self {
        Self { language, options }
    }
}

impl From<(Language, LanguageOptions)> for LanguageSpec {
    fn from((language, options): (Language, LanguageOptions)) -> Self {
        Self::new(language, options)
    }
}

impl From<Language> for LanguageSpec {
    fn from(language: Language) -> Self {
        Self::new(language, language.default_options())
    }
}

/// Engine tunables reachable through set/get param
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    LogLevel,
    LogCallback,
    WriteInk,
    LanguageModel,
}

impl ParamKind {
    pub fn code(self) -> i32 {
        match self {
            ParamKind::LogLevel => 0,
            ParamKind::LogCallback => 1,
            ParamKind::WriteInk => 2,
            ParamKind::LanguageModel => 3,
        }
    }
}

/// Engine-side log verbosity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogLevel {
    #[default]
    None = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
}

impl LogLevel {
    pub fn from_byte(level: u8) -> Option<Self> {
        match level {
            0 => Some(LogLevel::None),
            1 => Some(LogLevel::Error),
            2 => Some(LogLevel::Warn),
            3 => Some(LogLevel::Info),
            4 => Some(LogLevel::Debug),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_constants() {
        assert_eq!(Mode::OverlapChar.code(), 2);
        assert_eq!(Language::MiddleExpansion.code(), 203);
        assert_eq!(Language::from_code(204), Some(Language::Chemical));
        assert_eq!(LanguageOptions::ET.bits(), 0x0040_0000);
        assert_eq!(LanguageOptions::CF.bits(), 0x0200_0000);
        assert_eq!(ParamKind::LanguageModel.code(), 3);
    }

    #[test]
    fn test_options_combine_independently() {
        let opts = LanguageOptions::EX | LanguageOptions::CF;
        assert!(opts.contains(LanguageOptions::EX));
        assert!(!opts.contains(LanguageOptions::ET));
        assert_eq!(opts.bits(), (1 << 24) | (1 << 25));
        assert_eq!("EX | CF".parse::<LanguageOptions>().unwrap(), opts);
        assert_eq!("".parse::<LanguageOptions>().unwrap(), LanguageOptions::empty());
    }

    #[test]
    fn test_names_parse() {
        assert_eq!("multi-line".parse::<Mode>().unwrap(), Mode::MultiLine);
        assert_eq!("chemical".parse::<Language>().unwrap(), Language::Chemical);
        assert!("klingon".parse::<Language>().is_err());
    }
}
