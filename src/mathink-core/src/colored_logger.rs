//! Colored logging with a per-command prefix
//!
//! Custom tracing formatter: timestamp, colored command tag, level, message.

use owo_colors::{OwoColorize, Style};
use std::fmt;
use std::io;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::{
    format::{FormatEvent, FormatFields, Writer},
    FmtContext,
};
use tracing_subscriber::registry::LookupSpan;

/// Command identifier for prefixing logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Info,
    Recognize,
    Provision,
}

impl Component {
    /// Get the string representation for logging prefix
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Info => "INFO",
            Component::Recognize => "RECOG",
            Component::Provision => "STAGE",
        }
    }

    /// Get the color style for this component
    pub fn color_style(&self) -> Style {
        match self {
            Component::Info => Style::new().cyan().bold(),
            Component::Recognize => Style::new().green().bold(),
            Component::Provision => Style::new().yellow().bold(),
        }
    }
}

/// Custom formatter with component prefixes and colors
pub struct ColoredFormatter {
    pub component: Component,
}

impl<S, N> FormatEvent<S, N> for ColoredFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let now = chrono::Local::now();
        write!(writer, "{} ", now.format("%H:%M:%S").dimmed())?;

        let prefix = format!("[{:5}]", self.component.as_str());
        write!(writer, "{} ", prefix.style(self.component.color_style()))?;

        match *event.metadata().level() {
            Level::ERROR => write!(writer, "{} ", "ERROR".red().bold())?,
            Level::WARN => write!(writer, "{} ", "WARN ".yellow().bold())?,
            Level::INFO => write!(writer, "{} ", "INFO ".green().bold())?,
            Level::DEBUG => write!(writer, "{} ", "DEBUG".blue().bold())?,
            Level::TRACE => write!(writer, "{} ", "TRACE".dimmed().bold())?,
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Initialize colored logging for a command
///
/// `RUST_LOG` directives still apply on top of `level`. Logs go to stderr so
/// `--json` output on stdout stays machine-readable.
pub fn init_component_logger(component: Component, level: Level) -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let fmt_layer = tracing_subscriber::fmt::layer()
        .event_format(ColoredFormatter { component })
        .with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes_fit_the_column() {
        for component in [Component::Info, Component::Recognize, Component::Provision] {
            assert!(component.as_str().len() <= 5);
        }
    }
}
