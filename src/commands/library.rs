use std::io::{self, Write};

use anyhow::{Context, Result};
use tracing::warn;

use crate::cli::LibraryArgs;
use crate::config::RunConfig;
use crate::engine::library::PatternLibrary;

/// Prints the effective pattern library, overrides applied, as JSON.
pub fn run(args: LibraryArgs) -> Result<()> {
    let config = RunConfig::from_cli(args.config.as_deref())?;
    let (library, problems) = PatternLibrary::configured(&config.categories)?;
    for problem in &problems {
        warn!(error = %problem, "configuration problem");
    }

    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, &library.describe())
        .context("failed to serialize pattern library")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}
