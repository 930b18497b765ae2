use tracing::debug;

use crate::gateway::{GENERATE_TIMEOUT, ModelGateway};
use crate::model::Book;

/// Context a recommendation is explained against. Liked books win over
/// the prompt when both were given.
pub(crate) enum ExplanationSource<'a> {
    LikedBooks(&'a [Book]),
    Prompt(&'a str),
}

impl<'a> ExplanationSource<'a> {
    pub(crate) fn pick(liked: &'a [Book], prompt: Option<&'a str>) -> Option<Self> {
        if !liked.is_empty() {
            return Some(Self::LikedBooks(liked));
        }
        prompt
            .filter(|value| !value.trim().is_empty())
            .map(Self::Prompt)
    }
}

pub(crate) fn liked_books_prompt(liked: &[Book], recommended: &Book) -> String {
    let liked_titles = liked
        .iter()
        .map(|book| book.title.as_str())
        .collect::<Vec<&str>>()
        .join(", ");
    format!(
        "In 1-2 sentences, explain why someone who liked '{liked_titles}' might enjoy '{}' by {}. \
         Be specific about shared themes or style. Do not use bullet points.",
        recommended.title,
        recommended.authors.join(", ")
    )
}

pub(crate) fn free_text_prompt(prompt: &str, recommended: &Book) -> String {
    format!(
        "In 1-2 sentences, explain why '{}' by {} is a good match for someone looking for: '{prompt}'. \
         Be specific. Do not use bullet points.",
        recommended.title,
        recommended.authors.join(", ")
    )
}

/// Best effort: any gateway failure or empty answer yields `None`.
pub(crate) fn explain(
    gateway: &dyn ModelGateway,
    source: &ExplanationSource<'_>,
    recommended: &Book,
) -> Option<String> {
    let prompt = match source {
        ExplanationSource::LikedBooks(liked) => liked_books_prompt(liked, recommended),
        ExplanationSource::Prompt(text) => free_text_prompt(text, recommended),
    };

    match gateway.generate(&prompt, GENERATE_TIMEOUT) {
        Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Ok(_) => {
            debug!(book_id = %recommended.id, "explanation came back empty");
            None
        }
        Err(err) => {
            debug!(book_id = %recommended.id, error = %err, "explanation generation failed");
            None
        }
    }
}
