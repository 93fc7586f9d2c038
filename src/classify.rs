use serde::{Deserialize, Serialize};

pub const DEFAULT_KEYWORDS: &[&str] = &[
    "tutorial",
    "learn",
    "course",
    "how to",
    "coding",
    "programming",
    "ai",
    "startup",
    "business",
    "finance",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Education,
    Entertainment,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Education => "education",
            Category::Entertainment => "entertainment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "education" => Some(Category::Education),
            "entertainment" => Some(Category::Entertainment),
            _ => None,
        }
    }
}

/// Keyword classifier. A title/channel pair is `Education` when the
/// lowercased concatenation contains any keyword as a plain substring, so
/// "ai" also hits "said" or "main".
#[derive(Debug, Clone)]
pub struct Classifier {
    keywords: Vec<String>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORDS.iter().copied())
    }
}

impl Classifier {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn classify(&self, title: &str, channel: &str) -> Category {
        let text = format!("{}{}", title, channel).to_lowercase();
        if self.keywords.iter().any(|k| text.contains(k.as_str())) {
            Category::Education
        } else {
            Category::Entertainment
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_in_title() {
        let c = Classifier::default();
        assert_eq!(c.classify("Intro to AI", "X"), Category::Education);
        assert_eq!(c.classify("Rust Programming 101", "someone"), Category::Education);
    }

    #[test]
    fn test_no_keyword() {
        let c = Classifier::default();
        assert_eq!(c.classify("Funny Cats", "PetChannel"), Category::Entertainment);
    }

    #[test]
    fn test_substring_false_positive_is_kept() {
        let c = Classifier::default();
        assert_eq!(c.classify("He said what", "Drama"), Category::Education);
        assert_eq!(c.classify("Main Event", "WrestleZone"), Category::Education);
    }

    #[test]
    fn test_match_across_title_channel_boundary() {
        // "how to" only appears once title and channel are glued together
        let c = Classifier::default();
        assert_eq!(c.classify("Comedy", " tonight"), Category::Entertainment);
        assert_eq!(c.classify("Guess h", "ow to"), Category::Education);
    }

    #[test]
    fn test_keyword_in_channel() {
        let c = Classifier::default();
        assert_eq!(c.classify("Weekly recap", "FINANCE daily"), Category::Education);
    }

    #[test]
    fn test_custom_keywords_are_lowercased() {
        let c = Classifier::new(["Chess", ""]);
        assert_eq!(c.keywords(), &["chess".to_string()]);
        assert_eq!(c.classify("Blitz CHESS", "club"), Category::Education);
        assert_eq!(c.classify("Intro to AI", "X"), Category::Entertainment);
    }

    #[test]
    fn test_classify_is_deterministic() {
        let c = Classifier::default();
        let first = c.classify("Learn Go", "dev");
        for _ in 0..5 {
            assert_eq!(c.classify("Learn Go", "dev"), first);
        }
    }

    #[test]
    fn test_category_strings() {
        assert_eq!(Category::Education.as_str(), "education");
        assert_eq!(Category::from_str("Entertainment"), Some(Category::Entertainment));
        assert_eq!(Category::from_str("sports"), None);
    }
}
