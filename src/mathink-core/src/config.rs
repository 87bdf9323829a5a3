//! TOML configuration with profile support
//!
//! ```toml
//! [engine]
//! backend = "native"
//! license = "/opt/mathink/license.key"
//!
//! [recognition]
//! mode = "multi-char"
//! candidates = 5
//! languages = [{ language = "middle-expansion", options = "EX" }]
//!
//! [profiles.chemical.recognition]
//! languages = [{ language = "chemical", options = "CF" }]
//! ```

use anyhow::{Context, Result};
use mathink_engine::{
    Language, LanguageSpec, LogLevel, Mode, RecognizerConfig, DEFAULT_CANDIDATE_LIMIT,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Which engine implementation the CLI drives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// In-process scripted engine; every recognition answers `NoResult`
    #[default]
    Stub,
    /// The linked vendor library (requires the `native` feature)
    Native,
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MathinkConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub recognition: RecognitionConfig,

    #[serde(default)]
    pub provision: ProvisionConfig,

    /// Named profiles that can override the recognition section
    #[serde(default)]
    pub profiles: HashMap<String, ProfileConfig>,
}

/// Engine session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub backend: Backend,

    /// License artifact (defaults to `<data dir>/license.key`)
    pub license: Option<PathBuf>,

    /// Directory with auxiliary engine libraries
    pub library_dir: Option<PathBuf>,

    /// Engine-side log verbosity
    #[serde(default)]
    pub log_level: LogLevel,
}

/// What to recognize and how many readings to keep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionConfig {
    #[serde(default)]
    pub mode: Mode,

    #[serde(default = "default_languages")]
    pub languages: Vec<LanguageSpec>,

    /// Candidates per block, 0 for everything the engine returns
    #[serde(default = "default_candidates")]
    pub candidates: usize,

    /// Restrict output to these characters
    pub user_charset: Option<String>,
}

/// Resource staging locations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisionConfig {
    /// Directory the `*.hdb` files ship in
    pub source_dir: Option<PathBuf>,

    /// Writable directory the engine loads them from
    pub resource_dir: Option<PathBuf>,
}

/// Profile for overriding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub recognition: Option<RecognitionConfig>,
}

fn default_languages() -> Vec<LanguageSpec> {
    vec![Language::MiddleExpansion.into()]
}

fn default_candidates() -> usize {
    DEFAULT_CANDIDATE_LIMIT
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Stub,
            license: None,
            library_dir: None,
            log_level: LogLevel::None,
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            languages: default_languages(),
            candidates: DEFAULT_CANDIDATE_LIMIT,
            user_charset: None,
        }
    }
}

impl MathinkConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        toml::from_str(&content).context("Failed to parse config TOML")
    }

    /// Load `path`, or the default config file if it exists, or built-in defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = default_config_path();
                if default.exists() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Apply a named profile, merging settings
    ///
    /// Profile settings override base configuration values.
    pub fn apply_profile(mut self, profile_name: &str) -> Result<Self> {
        let profile = self
            .profiles
            .get(profile_name)
            .with_context(|| format!("Profile '{}' not found", profile_name))?
            .clone();

        if let Some(recognition) = profile.recognition {
            self.recognition = recognition;
        }

        Ok(self)
    }

    /// Resolve the license path with fallback to the data directory
    pub fn resolve_license(&self) -> PathBuf {
        self.engine
            .license
            .clone()
            .unwrap_or_else(|| mathink_engine::default_data_dir().join("license.key"))
    }

    /// Resolve the staged resource directory with fallback to the default
    pub fn resolve_resource_dir(&self) -> PathBuf {
        self.provision
            .resource_dir
            .clone()
            .unwrap_or_else(mathink_engine::default_resource_dir)
    }

    /// Build the engine-side configuration
    pub fn recognizer_config(&self) -> RecognizerConfig {
        let resource_dir = self.resolve_resource_dir();
        RecognizerConfig {
            license: self.resolve_license(),
            resource_dir: resource_dir.is_dir().then_some(resource_dir),
            library_dir: self.engine.library_dir.clone(),
            mode: self.recognition.mode,
            languages: self.recognition.languages.clone(),
            candidate_limit: self.recognition.candidates,
            user_charset: self.recognition.user_charset.clone(),
            engine_log_level: self.engine.log_level,
        }
    }
}

/// `<config dir>/mathink/mathink.toml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mathink")
        .join("mathink.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mathink_engine::LanguageOptions;

    const SAMPLE: &str = r#"
[engine]
backend = "native"
license = "/opt/mathink/license.key"
log_level = "warn"

[recognition]
mode = "multi-line"
candidates = 3
languages = [{ language = "middle-expansion", options = "EX" }]

[provision]
source_dir = "/usr/share/mathink/hdb"

[profiles.chemical.recognition]
mode = "multi-char"
languages = [{ language = "chemical", options = "CF" }]
"#;

    #[test]
    fn test_parse_sample() {
        let config: MathinkConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.engine.backend, Backend::Native);
        assert_eq!(config.engine.log_level, LogLevel::Warn);
        assert_eq!(config.recognition.mode, Mode::MultiLine);
        assert_eq!(config.recognition.candidates, 3);
        assert_eq!(
            config.recognition.languages,
            vec![LanguageSpec::new(Language::MiddleExpansion, LanguageOptions::EX)]
        );
        assert_eq!(config.resolve_license(), PathBuf::from("/opt/mathink/license.key"));
    }

    #[test]
    fn test_apply_profile() {
        let config: MathinkConfig = toml::from_str(SAMPLE).unwrap();
        let config = config.apply_profile("chemical").unwrap();
        assert_eq!(config.recognition.mode, Mode::MultiChar);
        assert_eq!(
            config.recognition.languages,
            vec![LanguageSpec::new(Language::Chemical, LanguageOptions::CF)]
        );
        // Fields the profile leaves out fall back to their defaults.
        assert_eq!(config.recognition.candidates, DEFAULT_CANDIDATE_LIMIT);
    }

    #[test]
    fn test_unknown_profile() {
        let err = MathinkConfig::default().apply_profile("missing").unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: MathinkConfig = toml::from_str("").unwrap();
        assert_eq!(config.engine.backend, Backend::Stub);
        assert_eq!(config.recognition.languages, default_languages());
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mathink.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = MathinkConfig::load(Some(path.as_path())).unwrap();
        assert_eq!(config.engine.backend, Backend::Native);

        std::fs::write(&path, "[recognition\nmode=").unwrap();
        assert!(MathinkConfig::from_file(&path).is_err());
    }

    #[test]
    fn test_recognizer_config_skips_missing_resource_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MathinkConfig::default();

        config.provision.resource_dir = Some(dir.path().join("absent"));
        assert!(config.recognizer_config().resource_dir.is_none());

        config.provision.resource_dir = Some(dir.path().to_path_buf());
        let recognizer = config.recognizer_config();
        assert_eq!(recognizer.resource_dir.as_deref(), Some(dir.path()));
        assert_eq!(recognizer.candidate_limit, DEFAULT_CANDIDATE_LIMIT);
    }
}
