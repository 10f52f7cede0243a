use crate::error::{AlmanacError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Field names a provider response is expected to use for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategorySchema {
    /// Key holding the primary learning text.
    pub content_field: &'static str,
    /// Key holding the array of key points.
    pub points_field: &'static str,
    /// Sub-field of a key point naming the term.
    pub term_field: &'static str,
    /// Sub-field of a key point explaining the term.
    pub meaning_field: &'static str,
}

/// Every category shares this key for the explanation text.
pub const INTERPRETATION_FIELD: &str = "interpretation";

/// The fixed set of content domains.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// English proverbs, sayings and idioms.
    English,
    /// Classical Chinese poetry.
    Chinese,
    /// Traditional Chinese medicine classics.
    Tcm,
}

impl Category {
    /// Registry order. Sweeps walk categories in this order.
    pub const ALL: [Category; 3] = [Category::English, Category::Chinese, Category::Tcm];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::English => "english",
            Category::Chinese => "chinese",
            Category::Tcm => "tcm",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Category::English => "English proverbs",
            Category::Chinese => "Classical Chinese poetry",
            Category::Tcm => "Traditional Chinese medicine",
        }
    }

    pub fn schema(&self) -> CategorySchema {
        match self {
            Category::English => CategorySchema {
                content_field: "proverb",
                points_field: "key_words",
                term_field: "word",
                meaning_field: "meaning",
            },
            Category::Chinese => CategorySchema {
                content_field: "poem",
                points_field: "key_words",
                term_field: "word",
                meaning_field: "meaning",
            },
            Category::Tcm => CategorySchema {
                content_field: "tcm_text",
                points_field: "key_concepts",
                term_field: "concept",
                meaning_field: "meaning",
            },
        }
    }

    /// Case-insensitive membership check.
    pub fn is_valid(name: &str) -> bool {
        name.parse::<Category>().is_ok()
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|c| c.as_str()).collect()
    }

    /// Display name for a raw identifier, falling back to the identifier itself.
    pub fn display_name_of(name: &str) -> String {
        name.parse::<Category>()
            .map(|c| c.display_name().to_string())
            .unwrap_or_else(|_| name.to_string())
    }
}

impl FromStr for Category {
    type Err = AlmanacError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "english" => Ok(Category::English),
            "chinese" => Ok(Category::Chinese),
            "tcm" => Ok(Category::Tcm),
            _ => Err(AlmanacError::InvalidCategory(s.to_string())),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("English".parse::<Category>().unwrap(), Category::English);
        assert_eq!(" TCM ".parse::<Category>().unwrap(), Category::Tcm);
        assert!(Category::is_valid("chinese"));
    }

    #[test]
    fn test_unknown_category_rejected() {
        let err = "math".parse::<Category>().unwrap_err();
        assert!(matches!(err, AlmanacError::InvalidCategory(ref s) if s == "math"));
        assert!(!Category::is_valid(""));
    }

    #[test]
    fn test_round_trip_through_str() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
        assert_eq!(Category::names(), vec!["english", "chinese", "tcm"]);
    }

    #[test]
    fn test_schema_descriptors() {
        let tcm = Category::Tcm.schema();
        assert_eq!(tcm.content_field, "tcm_text");
        assert_eq!(tcm.points_field, "key_concepts");
        assert_eq!(tcm.term_field, "concept");
        assert_eq!(Category::English.schema().content_field, "proverb");
        assert_eq!(Category::Chinese.schema().content_field, "poem");
    }

    #[test]
    fn test_display_name_fallback() {
        assert_eq!(Category::display_name_of("english"), "English proverbs");
        assert_eq!(Category::display_name_of("latin"), "latin");
    }
}
