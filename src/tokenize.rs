//! Text normalization, tokenization and shingling.

use crate::config::{DedupConfig, Tokenization};
use crate::error::{DedupError, StageFailure};
use regex::Regex;
use rustc_hash::FxHashSet;
use std::borrow::Cow;
use tokenizers::Tokenizer;
use tracing::warn;

/// Turns document text into a set of shingles.
pub struct Shingler {
    mode: Tokenization,
    window_size: usize,
    lowercase: bool,
    ignore_pattern: Option<Regex>,
    punctuation: Regex,
    subword: Option<Tokenizer>,
}

impl std::fmt::Debug for Shingler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shingler")
            .field("mode", &self.mode)
            .field("window_size", &self.window_size)
            .field("lowercase", &self.lowercase)
            .field("ignore_pattern", &self.ignore_pattern)
            .finish()
    }
}

impl Shingler {
    /// Validates the whole config before compiling patterns or loading models.
    pub fn from_config(config: &DedupConfig) -> Result<Self, DedupError> {
        config.validate()?;

        let ignore_pattern = config
            .ignore_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|err| DedupError::config("ignore_pattern", err.to_string()))?;

        if ignore_pattern.is_some() && config.tokenization == Tokenization::Punctuation {
            warn!("punctuation tokenization will not see punctuation removed by ignore_pattern");
        }

        let subword = match config.tokenization {
            Tokenization::Subword => {
                let path = config.subword_model_path.as_ref().ok_or_else(|| {
                    DedupError::config("subword_model_path", "required for subword tokenization")
                })?;
                let tokenizer = Tokenizer::from_file(path).map_err(|err| {
                    DedupError::config(
                        "subword_model_path",
                        format!("cannot load {}: {err}", path.display()),
                    )
                })?;
                Some(tokenizer)
            }
            _ => None,
        };

        let punctuation = Regex::new(r"\p{P}")
            .map_err(|err| DedupError::config("tokenization", err.to_string()))?;

        Ok(Self {
            mode: config.tokenization,
            window_size: config.window_size,
            lowercase: config.lowercase,
            ignore_pattern,
            punctuation,
            subword,
        })
    }

    pub fn mode(&self) -> Tokenization {
        self.mode
    }

    /// Apply lowercasing and the ignore pattern.
    pub fn normalize<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let text = if self.lowercase {
            Cow::Owned(text.to_lowercase())
        } else {
            Cow::Borrowed(text)
        };
        let Some(pattern) = &self.ignore_pattern else {
            return text;
        };
        let stripped = match pattern.replace_all(&text, "") {
            Cow::Owned(stripped) => Some(stripped),
            Cow::Borrowed(_) => None,
        };
        match stripped {
            Some(stripped) => Cow::Owned(stripped),
            None => text,
        }
    }

    /// Ordered token sequence of already-normalized text.
    pub fn tokens(&self, text: &str) -> Result<Vec<String>, StageFailure> {
        let tokens = match self.mode {
            Tokenization::Space => text.split_whitespace().map(str::to_string).collect(),
            Tokenization::Punctuation => self
                .punctuation
                .split(text)
                .map(str::to_string)
                .collect(),
            Tokenization::Character => text.chars().map(String::from).collect(),
            Tokenization::Subword => {
                let Some(tokenizer) = &self.subword else {
                    return Err(StageFailure::Tokenizer(
                        "subword tokenizer not loaded".to_string(),
                    ));
                };
                tokenizer
                    .encode(text, false)
                    .map_err(|err| StageFailure::Tokenizer(err.to_string()))?
                    .get_tokens()
                    .to_vec()
            }
        };
        Ok(tokens)
    }

    fn joiner(&self) -> &'static str {
        match self.mode {
            Tokenization::Space | Tokenization::Punctuation => " ",
            Tokenization::Character | Tokenization::Subword => "",
        }
    }

    /// Deduplicated set of `window_size`-token shingles.
    ///
    /// Empty when the text has fewer tokens than the window.
    pub fn shingles(&self, text: &str) -> Result<FxHashSet<String>, StageFailure> {
        let normalized = self.normalize(text);
        let tokens = self.tokens(&normalized)?;
        let joiner = self.joiner();
        Ok(tokens
            .windows(self.window_size)
            .map(|window| window.join(joiner))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shingler(mode: Tokenization, window_size: usize) -> Shingler {
        let config = DedupConfig {
            tokenization: mode,
            window_size,
            ..DedupConfig::default()
        };
        Shingler::from_config(&config).unwrap()
    }

    #[test]
    fn test_space_shingles() {
        let s = shingler(Tokenization::Space, 2);
        let shingles = s.shingles("The quick  brown fox").unwrap();
        let expected: FxHashSet<String> = ["the quick", "quick brown", "brown fox"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(shingles, expected);
    }

    #[test]
    fn test_character_shingles_respect_unicode() {
        let s = shingler(Tokenization::Character, 2);
        let shingles = s.shingles("日本語").unwrap();
        assert_eq!(shingles.len(), 2);
        assert!(shingles.contains("日本"));
        assert!(shingles.contains("本語"));
    }

    #[test]
    fn test_punctuation_split() {
        let s = shingler(Tokenization::Punctuation, 1);
        let tokens = s.tokens("alpha,beta;gamma").unwrap();
        assert_eq!(tokens, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_short_document_has_no_shingles() {
        let s = shingler(Tokenization::Space, 5);
        assert!(s.shingles("only four words here").unwrap().is_empty());
        assert!(s.shingles("").unwrap().is_empty());
        assert_eq!(s.shingles("exactly five words right here").unwrap().len(), 1);
    }

    #[test]
    fn test_repeated_windows_collapse() {
        let s = shingler(Tokenization::Space, 1);
        assert_eq!(s.shingles("a a a b").unwrap().len(), 2);
    }

    #[test]
    fn test_ignore_pattern_and_lowercase() {
        let config = DedupConfig {
            window_size: 1,
            ignore_pattern: Some(r"\d+".to_string()),
            ..DedupConfig::default()
        };
        let s = Shingler::from_config(&config).unwrap();
        assert_eq!(s.normalize("Room 101 IS Open"), "room  is open");
    }

    #[test]
    fn test_zero_window_is_config_error() {
        let config = DedupConfig {
            window_size: 0,
            ..DedupConfig::default()
        };
        let err = Shingler::from_config(&config).unwrap_err();
        assert!(matches!(err, DedupError::Config { param: "window_size", .. }));
    }

    #[test]
    fn test_bad_ignore_pattern_is_config_error() {
        let config = DedupConfig {
            ignore_pattern: Some("(unclosed".to_string()),
            ..DedupConfig::default()
        };
        let err = Shingler::from_config(&config).unwrap_err();
        assert!(matches!(err, DedupError::Config { param: "ignore_pattern", .. }));
    }

    #[test]
    fn test_missing_subword_model_file_is_config_error() {
        let config = DedupConfig {
            tokenization: Tokenization::Subword,
            subword_model_path: Some("/nonexistent/tokenizer.json".into()),
            ..DedupConfig::default()
        };
        let err = Shingler::from_config(&config).unwrap_err();
        assert!(matches!(err, DedupError::Config { param: "subword_model_path", .. }));
    }
}
