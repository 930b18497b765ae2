use anyhow::{Context, Result};
use shelfmatch::{Rating, Recommender};
use tracing::info;

use crate::cli::FeedbackArgs;

pub fn run(recommender: &Recommender, args: FeedbackArgs) -> Result<()> {
    let rating = Rating::from(args.rating);
    recommender
        .submit_feedback(
            &args.book_id,
            rating,
            &args.source_books,
            args.source_prompt.as_deref(),
        )
        .context("failed to submit feedback")?;

    info!(book_id = %args.book_id, rating = rating.as_i64(), "feedback submitted");
    Ok(())
}
