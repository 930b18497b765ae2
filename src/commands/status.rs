use std::io::{self, Write};

use anyhow::{Context, Result};
use shelfmatch::Recommender;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::write_json;

pub fn run(recommender: &Recommender, args: StatusArgs) -> Result<()> {
    let report = recommender.status().context("failed to collect status")?;
    info!(
        lifecycle = report.lifecycle.as_str(),
        enabled = recommender.is_enabled(),
        "status requested"
    );

    if args.json {
        return write_json(&report, "status");
    }

    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(output, "Lifecycle: {}", report.lifecycle.as_str())?;
    if let Some(detail) = &report.detail {
        writeln!(output, "Detail: {detail}")?;
    }
    if let Some(backend) = report.backend {
        writeln!(output, "Backend: {backend}")?;
    }
    if let Some(embed_model) = &report.embed_model {
        writeln!(output, "Embed model: {embed_model}")?;
    }
    writeln!(
        output,
        "Books: {} embeddings={} stale={} feedback={}",
        report.books, report.embeddings, report.stale_books, report.feedback
    )?;
    if let Some(marker) = &report.index_marker {
        writeln!(output, "Index marker: {marker}")?;
    }
    match report.gateway_reachable {
        Some(true) => writeln!(output, "Gateway: reachable")?,
        Some(false) => {
            warn!("model gateway unreachable");
            writeln!(output, "Gateway: unreachable")?;
        }
        None => {}
    }
    output.flush()?;
    Ok(())
}
