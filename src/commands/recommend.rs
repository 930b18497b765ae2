use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;
use shelfmatch::{Recommendation, Recommender};

use crate::cli::RecommendArgs;
use crate::commands::write_json;

#[derive(Debug, Serialize)]
struct RecommendResponse<'a> {
    liked: &'a [String],
    prompt: Option<&'a str>,
    returned: usize,
    results: &'a [Recommendation],
}

pub fn run(recommender: &Recommender, args: RecommendArgs) -> Result<()> {
    let results = recommender
        .recommend(&args.liked, args.prompt.as_deref())
        .context("failed to compute recommendations")?;

    if args.json {
        let response = RecommendResponse {
            liked: &args.liked,
            prompt: args.prompt.as_deref(),
            returned: results.len(),
            results: &results,
        };
        return write_json(&response, "recommendation");
    }

    write_text(&results)
}

fn write_text(results: &[Recommendation]) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(output, "Results: {}", results.len())?;
    for (rank, result) in results.iter().enumerate() {
        let authors = if result.authors.is_empty() {
            "(unknown author)".to_string()
        } else {
            result.authors.join(", ")
        };
        writeln!(
            output,
            "{}.\t{}\t{}\tscore={:.4}",
            rank + 1,
            result.title,
            authors,
            result.score
        )?;
        writeln!(output, "\tbook_id: {}", result.book_id)?;
        if !result.subjects.is_empty() {
            writeln!(output, "\tsubjects: {}", result.subjects.join(", "))?;
        }
        if let Some(explanation) = &result.explanation {
            writeln!(output, "\twhy: {explanation}")?;
        }
    }

    output.flush()?;
    Ok(())
}
