pub mod books;
pub mod feedback;
pub mod ingest;
pub mod recommend;
pub mod refresh;
pub mod remove;
pub mod status;

use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;

pub(crate) fn write_json<T: Serialize>(value: &T, what: &str) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, value)
        .with_context(|| format!("failed to serialize {what} json output"))?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}
