use std::io::{self, Write};

use anyhow::{Context, Result};
use shelfmatch::Recommender;

use crate::cli::RemoveArgs;

pub fn run(recommender: &Recommender, args: RemoveArgs) -> Result<()> {
    let removed = recommender
        .remove_book(&args.book_id)
        .with_context(|| format!("failed to remove book {}", args.book_id))?;

    let mut output = io::stdout().lock();
    if removed {
        writeln!(output, "Removed: {}", args.book_id)?;
    } else {
        writeln!(output, "Not found: {}", args.book_id)?;
    }
    Ok(())
}
