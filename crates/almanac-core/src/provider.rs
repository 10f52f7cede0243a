use crate::categories::{Category, INTERPRETATION_FIELD};
use crate::Result;
use async_trait::async_trait;

/// The fixed user turn sent with every generation request.
pub const USER_INSTRUCTION: &str = "Please recommend new learning content.";

/// A text-generation backend.
///
/// Implementations return the raw text of the first candidate output. Any
/// transport failure, non-success status or empty candidate list must be
/// reported as [`crate::AlmanacError::Provider`].
#[async_trait]
pub trait ContentProvider: Send + Sync + 'static {
    /// Provider name (used in logs).
    fn name(&self) -> &str;

    /// Ask for one new item of `category` content that repeats nothing in
    /// `already_shown`.
    async fn generate(&self, category: Category, already_shown: &[String]) -> Result<String>;
}

/// Build the system instruction for a category.
///
/// Field names come from the category schema, so the provider is asked for
/// exactly the shape the extractor looks for first.
pub fn system_prompt(category: Category, already_shown: &[String]) -> String {
    let schema = category.schema();
    let (subject, sources, explain) = match category {
        Category::English => (
            "an English proverb",
            "traditional proverbs, maxims and idioms",
            "a Chinese translation and an explanation of its meaning",
        ),
        Category::Chinese => (
            "a line of classical Chinese poetry",
            "shi, ci and fu from the classical canon",
            "its meaning and historical background",
        ),
        Category::Tcm => (
            "a passage from the traditional Chinese medicine classics",
            "the Huangdi Neijing, the Shanghan Lun, herb and formula mnemonics",
            "its meaning and clinical significance",
        ),
    };

    format!(
        "You teach {name}. Offer the learner {subject} they have not studied yet.\n\
         Already studied:\n\
         <already_shown>\n{shown}\n</already_shown>\n\
         Choose something that does not repeat anything above. Draw from {sources}.\n\
         Answer with a single JSON object containing:\n\
         - {content}: the original text\n\
         - {interpretation}: {explain}\n\
         - {points}: an array of objects, each with \"{term}\" and \"{meaning}\" fields, \
         covering the meaningful terms (skip articles, pronouns and other filler)",
        name = category.display_name(),
        subject = subject,
        shown = already_shown.join("\n"),
        sources = sources,
        content = schema.content_field,
        interpretation = INTERPRETATION_FIELD,
        explain = explain,
        points = schema.points_field,
        term = schema.term_field,
        meaning = schema.meaning_field,
    )
}
