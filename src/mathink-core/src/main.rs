//! Mathink - handwritten math recognition CLI

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mathink_core::colored_logger::{init_component_logger, Component};
use mathink_core::config::{Backend, MathinkConfig};
use mathink_core::ink_file::InkFile;
use mathink_engine::{
    Engine, EngineSession, Language, LanguageOptions, LanguageSpec, LogLevel, Mode, Recognition,
    RecognitionResult, Recognizer, StubEngine,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "mathink")]
#[command(about = "Handwritten math recognition through an external engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Named profile from the configuration file
    #[arg(short, long, global = true)]
    profile: Option<String>,

    /// Engine backend (overrides the configuration file)
    #[arg(long, global = true, value_enum)]
    engine: Option<Backend>,

    /// Enable verbose logging, including the engine's own
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show engine revision, license expiry and languages
    Info,

    /// Recognize strokes from a JSON ink file
    Recognize {
        /// Ink file: {"strokes": [[[x, y], ...], ...]}
        ink: PathBuf,

        /// Recognition mode (single-char, multi-char, overlap-char, multi-line)
        #[arg(short, long)]
        mode: Option<Mode>,

        /// Recognize with this language only
        #[arg(short, long)]
        language: Option<Language>,

        /// Option flags for --language, e.g. "EX" or "EX | CF"
        #[arg(long, requires = "language")]
        options: Option<LanguageOptions>,

        /// Candidates per block (0 for all)
        #[arg(short = 'n', long)]
        candidates: Option<usize>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Stage model files into the engine's resource directory
    Provision {
        /// Directory the model files ship in
        #[arg(long)]
        from: Option<PathBuf>,

        /// Destination (defaults to the configured resource directory)
        #[arg(long)]
        to: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let component = match cli.command {
        Commands::Info => Component::Info,
        Commands::Recognize { .. } => Component::Recognize,
        Commands::Provision { .. } => Component::Provision,
    };
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    init_component_logger(component, level)?;

    let mut config = MathinkConfig::load(cli.config.as_deref())?;
    if let Some(profile) = &cli.profile {
        info!("using profile '{}'", profile);
        config = config.apply_profile(profile)?;
    }
    if let Some(backend) = cli.engine {
        config.engine.backend = backend;
    }
    if cli.verbose {
        config.engine.log_level = LogLevel::Debug;
    }

    match cli.command {
        Commands::Info => {
            cmd_info(&config)?;
        }
        Commands::Recognize {
            ink,
            mode,
            language,
            options,
            candidates,
            json,
        } => {
            if let Some(mode) = mode {
                config.recognition.mode = mode;
            }
            if let Some(language) = language {
                let options = options.unwrap_or_else(|| language.default_options());
                config.recognition.languages = vec![LanguageSpec::new(language, options)];
            }
            if let Some(candidates) = candidates {
                config.recognition.candidates = candidates;
            }
            cmd_recognize(&config, &ink, json)?;
        }
        Commands::Provision { from, to } => {
            cmd_provision(&config, from, to)?;
        }
    }

    Ok(())
}

fn build_engine(config: &MathinkConfig) -> Result<Arc<dyn Engine>> {
    match config.engine.backend {
        Backend::Stub => {
            info!("using stub engine (dry run)");
            Ok(Arc::new(StubEngine::new().accept_license(config.resolve_license())))
        }
        #[cfg(feature = "native")]
        Backend::Native => Ok(Arc::new(mathink_engine::NativeEngine::new())),
        #[cfg(not(feature = "native"))]
        Backend::Native => bail!("native engine support not compiled in; rebuild with --features native"),
    }
}

fn cmd_info(config: &MathinkConfig) -> Result<()> {
    let engine = build_engine(config)?;
    let license = config.resolve_license();
    let session = EngineSession::open(engine, &license)
        .with_context(|| format!("Failed to open engine with license {:?}", license))?;

    println!("revision: {}", session.revision()?);
    match session.due_date()? {
        Some(date) => println!("license expires: {}", date),
        None => println!("license expires: never"),
    }
    println!("languages: {}", session.available_languages()?);

    let resource_dir = config.resolve_resource_dir();
    if resource_dir.is_dir() {
        let resources = mathink_engine::resources::list_resources(&resource_dir)?;
        println!("resources: {:?} ({} model files)", resource_dir, resources.len());
        for name in resources {
            println!("  {}", name);
        }
    } else {
        println!("resources: {:?} (not provisioned)", resource_dir);
    }

    Ok(())
}

#[tokio::main]
async fn cmd_recognize(config: &MathinkConfig, ink_path: &Path, json: bool) -> Result<()> {
    let ink = InkFile::from_file(ink_path)?;
    info!("loaded {} strokes ({} points) from {:?}", ink.strokes.len(), ink.point_count(), ink_path);

    let recognizer_config = config.recognizer_config();
    if recognizer_config.resource_dir.is_none() {
        warn!("resource directory not provisioned; run 'mathink provision' first");
    }

    let recognizer = Recognizer::open(build_engine(config)?, &recognizer_config)
        .context("Failed to open recognizer")?;
    ink.feed(&recognizer)?;

    let recognition = match recognizer.recognize_async().await {
        Ok(recognition) => recognition,
        Err(e) => {
            if let Some(partial) = e.partial().filter(|partial| !partial.is_empty()) {
                warn!("engine returned lines before failing:");
                print_lines(partial);
            }
            return Err(e).context("Recognition failed");
        }
    };
    recognizer.close()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recognition)?);
    } else {
        print_recognition(&recognition);
    }

    Ok(())
}

fn print_recognition(recognition: &Recognition) {
    if recognition.result.is_empty() {
        println!("no result ({:?})", recognition.status);
        return;
    }
    print_lines(&recognition.result);
}

fn print_lines(result: &RecognitionResult) {
    for (i, line) in result.lines.iter().enumerate() {
        println!("line {}:", i + 1);
        for (j, block) in line.blocks.iter().enumerate() {
            println!("  block {} (strokes {:?})", j + 1, block.stroke_indices);
            for (k, candidate) in block.candidates.iter().enumerate() {
                println!("    {}. {}", k + 1, candidate);
            }
        }
    }
}

#[tokio::main]
async fn cmd_provision(config: &MathinkConfig, from: Option<PathBuf>, to: Option<PathBuf>) -> Result<()> {
    let Some(source) = from.or_else(|| config.provision.source_dir.clone()) else {
        bail!("no source directory; pass --from or set provision.source_dir");
    };
    let dest = to.unwrap_or_else(|| config.resolve_resource_dir());

    let report = mathink_engine::stage_resources(&source, &dest)
        .await
        .with_context(|| format!("Failed to stage resources from {:?}", source))?;

    println!("staged into {:?}", dest);
    println!("  copied:  {}", report.copied.len());
    println!("  skipped: {} (already present)", report.skipped.len());
    if !report.is_complete() {
        warn!("empty source files not staged: {}", report.empty.join(", "));
    }

    Ok(())
}
