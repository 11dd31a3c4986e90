use serde::{Deserialize, Serialize};

/// The AI service the backend should use for chat and sequence generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAI,
    Gemini,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAI => "openai",
            Provider::Gemini => "gemini",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Some(Provider::OpenAI),
            "gemini" => Some(Provider::Gemini),
            _ => None,
        }
    }

    pub fn all() -> Vec<Provider> {
        vec![Provider::OpenAI, Provider::Gemini]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::OpenAI => "OpenAI",
            Provider::Gemini => "Gemini",
        }
    }

    /// The provider after this one in `all()`, wrapping around
    pub fn next(&self) -> Provider {
        match self {
            Provider::OpenAI => Provider::Gemini,
            Provider::Gemini => Provider::OpenAI,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_is_case_insensitive() {
        assert_eq!(Provider::from_str("OpenAI"), Some(Provider::OpenAI));
        assert_eq!(Provider::from_str(" gemini "), Some(Provider::Gemini));
        assert_eq!(Provider::from_str("claude"), None);
    }

    #[test]
    fn test_wire_name() {
        assert_eq!(serde_json::to_string(&Provider::Gemini).unwrap(), "\"gemini\"");
        assert_eq!(Provider::OpenAI.to_string(), "openai");
    }

    #[test]
    fn test_next_wraps() {
        assert_eq!(Provider::OpenAI.next(), Provider::Gemini);
        assert_eq!(Provider::Gemini.next(), Provider::OpenAI);
    }
}
