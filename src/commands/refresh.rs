use std::io::{self, Write};

use anyhow::{Context, Result};
use shelfmatch::Recommender;

use crate::cli::RefreshArgs;
use crate::commands::write_json;

pub fn run(recommender: &Recommender, args: RefreshArgs) -> Result<()> {
    let summary = recommender
        .refresh_embeddings()
        .context("failed to refresh embeddings")?;

    if args.json {
        return write_json(&summary, "refresh");
    }

    let mut output = io::stdout().lock();
    writeln!(
        output,
        "Stale: {} embedded={} failed={}",
        summary.stale, summary.embedded, summary.failed
    )?;
    Ok(())
}
