use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;
use shelfmatch::Recommender;
use shelfmatch::model::{Book, CoverSize};

use crate::cli::BooksArgs;
use crate::commands::write_json;

#[derive(Debug, Serialize)]
struct BookListing<'a> {
    #[serde(flatten)]
    book: &'a Book,
    cover_url: Option<String>,
}

pub fn run(recommender: &Recommender, args: BooksArgs) -> Result<()> {
    let books = recommender.list_books().context("failed to list books")?;

    if args.json {
        let listings = books
            .iter()
            .map(|book| BookListing {
                book,
                cover_url: book.cover_url(CoverSize::Medium),
            })
            .collect::<Vec<BookListing<'_>>>();
        return write_json(&listings, "book list");
    }

    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(output, "Books: {}", books.len())?;
    for book in &books {
        writeln!(output, "{}\t{}\t{}", book.id, book.title, book.authors.join(", "))?;
        if let Some(cover_url) = book.cover_url(CoverSize::Small) {
            writeln!(output, "\tcover: {cover_url}")?;
        }
    }
    output.flush()?;
    Ok(())
}
