//! Logging setup.

use std::io;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::errors::{Error, Kind, Result};

/// Log levels accepted by the `-log` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
    Disabled,
}

impl Level {
    fn directive(self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warning => "warn",
            Level::Error => "error",
            Level::Disabled => "off",
        }
    }
}

/// Initializes the logging system at the given level.
pub fn init(level: Level) -> Result<()> {
    let filter = EnvFilter::try_new(level.directive())
        .map_err(|e| Error::new(Kind::Invalid).op("logger.init").with(e.to_string()))?;

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();

    Ok(())
}
