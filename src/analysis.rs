//! Text normalisation for the sparse index
//!
//! Lowercases, splits into alphanumeric tokens, drops stop-words and tokens
//! shorter than two characters, and optionally reduces each token to its English
//! stem. The stemming path runs through a tantivy analyzer; when stemming is
//! disabled the tokenizer falls back to a plain regex split.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use tantivy::tokenizer::{
    Language, LowerCaser, SimpleTokenizer, Stemmer, StopWordFilter, TextAnalyzer, TokenStream,
};

/// English stop-words removed before indexing and querying
pub const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "as", "is", "was", "are", "were", "been", "be", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "may", "might", "must", "shall", "can", "this",
    "that", "these", "those", "i", "you", "he", "she", "it", "we", "they", "what", "which", "who",
    "when", "where", "why", "how", "all", "each", "every", "both", "few", "more", "most", "other",
    "some", "such", "no", "not", "only", "same", "so", "than", "too", "very", "just", "also",
    "now", "here", "there", "then", "if", "my", "your", "his", "her", "its", "our", "their", "me",
    "him", "us", "them", "am", "about",
];

const MIN_TOKEN_CHARS: usize = 2;

fn word_pattern() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"\b[a-z0-9]+\b").expect("word pattern is a valid regex"))
}

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Deterministic tokenizer used for both documents and queries
#[derive(Clone)]
pub enum Tokenizer {
    /// Lowercase, stop-word removal and English stemming
    Stemming(TextAnalyzer),
    /// Regex split without stemming
    Plain,
}

impl Tokenizer {
    /// Build a tokenizer, with or without stemming
    pub fn new(stemming: bool) -> Self {
        if stemming {
            Self::stemming()
        } else {
            Self::Plain
        }
    }

    pub fn stemming() -> Self {
        let stopwords: Vec<String> = STOPWORDS.iter().map(|w| w.to_string()).collect();
        let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(LowerCaser)
            .filter(StopWordFilter::remove(stopwords))
            .filter(Stemmer::new(Language::English))
            .build();
        Self::Stemming(analyzer)
    }

    pub fn plain() -> Self {
        Self::Plain
    }

    pub fn is_stemming(&self) -> bool {
        matches!(self, Self::Stemming(_))
    }

    /// Split `text` into normalised tokens
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        match self {
            Self::Stemming(analyzer) => {
                let mut analyzer = analyzer.clone();
                let mut stream = analyzer.token_stream(text);
                let mut tokens = Vec::new();
                while stream.advance() {
                    let token = &stream.token().text;
                    if token.chars().count() >= MIN_TOKEN_CHARS
                        && token.chars().all(char::is_alphanumeric)
                    {
                        tokens.push(token.clone());
                    }
                }
                tokens
            }
            Self::Plain => {
                let lowered = text.to_lowercase();
                word_pattern()
                    .find_iter(&lowered)
                    .map(|m| m.as_str())
                    .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS && !is_stopword(t))
                    .map(str::to_string)
                    .collect()
            }
        }
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::stemming()
    }
}

impl fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stemming(_) => f.write_str("Tokenizer::Stemming"),
            Self::Plain => f.write_str("Tokenizer::Plain"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_tokenizer() {
        let tokens = Tokenizer::plain().tokenize("The Battery is DRAINING fast, 2x a day!");
        assert_eq!(tokens, vec!["battery", "draining", "fast", "2x", "day"]);
    }

    #[test]
    fn test_stemming_tokenizer() {
        let tokens = Tokenizer::stemming().tokenize("Charging stations were charging slowly");
        assert_eq!(tokens, vec!["charg", "station", "charg", "slowli"]);
    }

    #[test]
    fn test_stopwords_and_short_tokens_dropped() {
        for tokenizer in [Tokenizer::plain(), Tokenizer::stemming()] {
            let tokens = tokenizer.tokenize("it is a x of the");
            assert!(tokens.is_empty(), "{:?} produced {:?}", tokenizer, tokens);
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(Tokenizer::default().tokenize("").is_empty());
        assert!(Tokenizer::plain().tokenize("   ").is_empty());
    }

    #[test]
    fn test_deterministic() {
        let tokenizer = Tokenizer::default();
        let text = "Navigation map outdated after update";
        assert_eq!(tokenizer.tokenize(text), tokenizer.tokenize(text));
    }

    #[test]
    fn test_new_respects_flag() {
        assert!(Tokenizer::new(true).is_stemming());
        assert!(!Tokenizer::new(false).is_stemming());
    }
}
