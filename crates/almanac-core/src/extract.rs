//! Turns free-text provider output into a [`NormalizedContent`].
//!
//! Providers are asked for a JSON object but do not always honour the
//! exact shape. Extraction runs two passes over the same cleaned text:
//!
//! 1. a strict pass that insists every expected field has its declared
//!    type, and
//! 2. a flexible pass that reads whatever it can find, keeps bare-string
//!    key points and skips anything it cannot interpret.
//!
//! Both passes are driven by the category's [`CategorySchema`], so there is
//! no per-category branching here.

use crate::categories::{Category, CategorySchema, INTERPRETATION_FIELD};
use crate::error::ExtractionError;
use crate::types::NormalizedContent;
use log::debug;
use serde_json::{Map, Value};

/// Extract a normalized record from raw provider text.
pub fn extract(raw: &str, category: Category) -> Result<NormalizedContent, ExtractionError> {
    let schema = category.schema();
    let cleaned = strip_code_fence(raw);

    match strict_pass(cleaned, &schema) {
        Some(content) => Ok(content),
        None => {
            debug!("Strict extraction failed for {}, trying flexible pass", category);
            flexible_pass(cleaned, &schema)
        }
    }
}

/// Remove a surrounding Markdown code fence (with or without a language tag).
pub fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        // Drop an info string such as `json` on the opening fence line.
        let tag_len = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        text = &rest[tag_len..];
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }

    text.trim()
}

/// Exact-schema decode. `None` means "fall back", never a hard failure.
fn strict_pass(cleaned: &str, schema: &CategorySchema) -> Option<NormalizedContent> {
    let payload: Map<String, Value> = serde_json::from_str(cleaned).ok()?;

    let content = typed_str(&payload, schema.content_field)?;
    let interpretation = typed_str(&payload, INTERPRETATION_FIELD)?;

    let mut key_points = Vec::new();
    match payload.get(schema.points_field) {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for item in items {
                let Value::Object(point) = item else {
                    return None;
                };
                let term = typed_str(point, schema.term_field)?;
                let meaning = typed_str(point, schema.meaning_field)?;
                if let Some(joined) = join_point(&term, &meaning) {
                    key_points.push(joined);
                }
            }
        }
        Some(_) => return None,
    }

    if content.is_empty() || interpretation.is_empty() {
        return None;
    }

    Some(NormalizedContent {
        content,
        interpretation,
        key_points,
    })
}

/// Permissive decode over an untyped object.
fn flexible_pass(
    cleaned: &str,
    schema: &CategorySchema,
) -> Result<NormalizedContent, ExtractionError> {
    let payload: Map<String, Value> = serde_json::from_str(cleaned)
        .map_err(|e| ExtractionError::MalformedJson(e.to_string()))?;

    let content = loose_str(&payload, schema.content_field);
    let interpretation = loose_str(&payload, INTERPRETATION_FIELD);

    let key_points = match payload.get(schema.points_field) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(point) => join_point(
                    &loose_str(point, schema.term_field),
                    &loose_str(point, schema.meaning_field),
                ),
                Value::String(s) => Some(s.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    if content.is_empty() {
        return Err(ExtractionError::EmptyContent);
    }
    if interpretation.is_empty() {
        return Err(ExtractionError::EmptyInterpretation);
    }

    Ok(NormalizedContent {
        content,
        interpretation,
        key_points,
    })
}

/// Absent or null yields an empty string; any non-string value is a schema miss.
fn typed_str(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key) {
        None | Some(Value::Null) => Some(String::new()),
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => None,
    }
}

fn loose_str(map: &Map<String, Value>, key: &str) -> String {
    match map.get(key) {
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

fn join_point(term: &str, meaning: &str) -> Option<String> {
    if term.is_empty() || meaning.is_empty() {
        None
    } else {
        Some(format!("{}: {}", term, meaning))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(category: Category) -> CategorySchema {
        category.schema()
    }

    #[test]
    fn test_english_exact_schema() {
        let raw = r#"{"proverb":"A","interpretation":"B","key_words":[{"word":"w","meaning":"m"}]}"#;
        let result = extract(raw, Category::English).unwrap();
        assert_eq!(result.content, "A");
        assert_eq!(result.interpretation, "B");
        assert_eq!(result.key_points, vec!["w: m".to_string()]);
    }

    #[test]
    fn test_strict_and_flexible_agree_on_exact_schema() {
        let raw = r#"{"tcm_text":"T","interpretation":"I","key_concepts":[{"concept":"qi","meaning":"vital energy"},{"concept":"yin","meaning":"passive"}]}"#;
        let s = schema(Category::Tcm);
        let strict = strict_pass(raw, &s).unwrap();
        let flexible = flexible_pass(raw, &s).unwrap();
        assert_eq!(strict, flexible);
        assert_eq!(strict.key_points.len(), 2);
    }

    #[test]
    fn test_missing_primary_field_is_empty_content() {
        let err = extract(r#"{"interpretation":"B"}"#, Category::English).unwrap_err();
        assert_eq!(err, ExtractionError::EmptyContent);
        assert_eq!(err.reason(), "empty content");
    }

    #[test]
    fn test_missing_interpretation() {
        let err = extract(r#"{"poem":"P"}"#, Category::Chinese).unwrap_err();
        assert_eq!(err, ExtractionError::EmptyInterpretation);
    }

    #[test]
    fn test_not_json_is_malformed() {
        let err = extract("I cannot help with that.", Category::English).unwrap_err();
        assert_eq!(err.reason(), "malformed json");
    }

    #[test]
    fn test_top_level_array_is_malformed() {
        let err = extract(r#"[{"proverb":"A"}]"#, Category::English).unwrap_err();
        assert!(matches!(err, ExtractionError::MalformedJson(_)));
    }

    #[test]
    fn test_code_fence_is_stripped() {
        let raw = "```json\n{\"poem\":\"P\",\"interpretation\":\"I\",\"key_words\":[]}\n```\n";
        let result = extract(raw, Category::Chinese).unwrap();
        assert_eq!(result.content, "P");
        assert!(result.key_points.is_empty());

        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn test_flexible_keeps_bare_strings_and_skips_junk() {
        let raw = r#"{
            "proverb": "Haste makes waste",
            "interpretation": "Rushing causes mistakes",
            "key_words": ["haste: hurry", {"word": "waste", "meaning": "loss"}, 42, {"word": "only"}]
        }"#;
        let result = extract(raw, Category::English).unwrap();
        assert_eq!(
            result.key_points,
            vec!["haste: hurry".to_string(), "waste: loss".to_string()]
        );
    }

    #[test]
    fn test_wrongly_typed_field_falls_back_to_flexible() {
        // key_words as an object defeats the strict pass but not the flexible one
        let raw = r#"{"proverb":"A","interpretation":"B","key_words":{"word":"w"}}"#;
        assert!(strict_pass(raw, &schema(Category::English)).is_none());
        let result = extract(raw, Category::English).unwrap();
        assert_eq!(result.content, "A");
        assert!(result.key_points.is_empty());
    }

    #[test]
    fn test_non_string_primary_field_is_empty_content() {
        let raw = r#"{"proverb":7,"interpretation":"B"}"#;
        assert_eq!(
            extract(raw, Category::English).unwrap_err(),
            ExtractionError::EmptyContent
        );
    }

    #[test]
    fn test_field_of_other_category_is_ignored() {
        let raw = r#"{"proverb":"A","interpretation":"B"}"#;
        assert_eq!(
            extract(raw, Category::Tcm).unwrap_err(),
            ExtractionError::EmptyContent
        );
    }
}
