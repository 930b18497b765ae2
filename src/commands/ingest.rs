use std::io::{self, Write};

use anyhow::{Context, Result};
use shelfmatch::{IngestRequest, Recommender};
use tracing::info;

use crate::cli::IngestArgs;

pub fn run(recommender: &Recommender, args: IngestArgs) -> Result<()> {
    let request = IngestRequest {
        isbn: args.isbn,
        title: args.title,
        author: args.author,
        work_key: args.work_key,
    };

    let book_id = recommender
        .ingest(&request)
        .context("failed to ingest book")?;

    let mut output = io::stdout().lock();
    match book_id {
        Some(book_id) => {
            info!(book_id = %book_id, "ingest completed");
            writeln!(output, "Ingested: {book_id}")?;
        }
        None => writeln!(output, "No catalog match found")?,
    }
    Ok(())
}
