//! Layered configuration for the deduplicator.
//!
//! Configuration is loaded with precedence: CLI args > Env vars > Config file > Defaults
//!
//! # Example config file (bts-dedup.toml)
//! ```toml
//! text_key = "content"
//! tokenization = "character"
//! window_size = 7
//! jaccard_threshold = 0.8
//! num_shards = 32
//! ```

mod defaults;

pub use defaults::*;

use crate::error::DedupError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Top-level keys, so extraction failures can name the parameter at fault.
const CONFIG_KEYS: &[&str] = &[
    "text_key",
    "tokenization",
    "window_size",
    "lowercase",
    "ignore_pattern",
    "num_permutations",
    "jaccard_threshold",
    "num_bands",
    "num_rows_per_band",
    "subword_model_path",
    "num_shards",
    "merge_fanin",
    "seed",
    "shard_queue_capacity",
];

fn extraction_error(err: figment::Error) -> DedupError {
    let param = err
        .path
        .first()
        .and_then(|key| CONFIG_KEYS.iter().find(|known| **known == key.as_str()))
        .copied()
        .unwrap_or("config");
    DedupError::config(param, err.to_string())
}

/// How document text is split into tokens before shingling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tokenization {
    /// Split on Unicode whitespace. Recommended for English-like text.
    #[default]
    Space,
    /// Split on Unicode punctuation (`\p{P}`).
    Punctuation,
    /// Every character is a token. Recommended for CJK text.
    Character,
    /// Sub-word pieces from a pretrained tokenizer model.
    #[serde(alias = "sentencepiece")]
    Subword,
}

impl fmt::Display for Tokenization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tokenization::Space => "space",
            Tokenization::Punctuation => "punctuation",
            Tokenization::Character => "character",
            Tokenization::Subword => "subword",
        };
        f.write_str(name)
    }
}

impl FromStr for Tokenization {
    type Err = DedupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "space" => Ok(Tokenization::Space),
            "punctuation" => Ok(Tokenization::Punctuation),
            "character" => Ok(Tokenization::Character),
            "subword" | "sentencepiece" => Ok(Tokenization::Subword),
            other => Err(DedupError::config(
                "tokenization",
                format!("unsupported tokenization mode `{other}`"),
            )),
        }
    }
}

/// Main configuration for a deduplication run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Record field holding the document text
    pub text_key: String,
    /// Tokenization mode
    pub tokenization: Tokenization,
    /// Shingle width in tokens
    pub window_size: usize,
    /// Lowercase text before tokenizing
    pub lowercase: bool,
    /// Substrings matching this regex are removed before tokenizing
    pub ignore_pattern: Option<String>,
    /// Number of MinHash permutations
    pub num_permutations: usize,
    /// Minimum Jaccard similarity treated as near-duplicate
    pub jaccard_threshold: f64,
    /// LSH band count; derived from the threshold when unset
    pub num_bands: Option<usize>,
    /// LSH rows per band; derived from the threshold when unset
    pub num_rows_per_band: Option<usize>,
    /// Tokenizer model file, required for sub-word tokenization
    pub subword_model_path: Option<PathBuf>,
    /// Number of union-find shards
    pub num_shards: usize,
    /// Reserved merge fan-in (not used by the convergence protocol)
    pub merge_fanin: Option<usize>,
    /// Seed for permutation coefficients and document ids
    pub seed: u64,
    /// Bound on each shard actor's inbox
    pub shard_queue_capacity: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            text_key: DEFAULT_TEXT_KEY.to_string(),
            tokenization: Tokenization::Space,
            window_size: DEFAULT_WINDOW_SIZE,
            lowercase: true,
            ignore_pattern: None,
            num_permutations: DEFAULT_NUM_PERMUTATIONS,
            jaccard_threshold: DEFAULT_JACCARD_THRESHOLD,
            num_bands: None,
            num_rows_per_band: None,
            subword_model_path: None,
            num_shards: DEFAULT_NUM_SHARDS,
            merge_fanin: Some(DEFAULT_MERGE_FANIN),
            seed: DEFAULT_SEED,
            shard_queue_capacity: DEFAULT_SHARD_QUEUE_CAPACITY,
        }
    }
}

impl DedupConfig {
    /// Load configuration with precedence: CLI args > Env > File > Defaults
    ///
    /// # Arguments
    /// * `config_path` - Optional path to TOML config file
    /// * `overrides` - CLI overrides to apply on top
    pub fn load(
        config_path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<Self, DedupError> {
        let mut figment = Figment::new().merge(Serialized::defaults(DedupConfig::default()));

        // Layer 1: Config file (if provided)
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Layer 2: Environment variables with BTS_DEDUP_ prefix
        figment = figment.merge(Env::prefixed(ENV_PREFIX));

        // Layer 3: CLI overrides
        figment = figment.merge(Serialized::defaults(overrides));

        let config: DedupConfig = figment.extract().map_err(extraction_error)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment and optional config file only (no CLI overrides)
    pub fn from_env(config_path: Option<&str>) -> Result<Self, DedupError> {
        Self::load(config_path, ConfigOverrides::default())
    }

    /// Reject parameter combinations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), DedupError> {
        if self.text_key.is_empty() {
            return Err(DedupError::config("text_key", "must not be empty"));
        }
        if self.window_size == 0 {
            return Err(DedupError::config("window_size", "must be positive"));
        }
        if self.num_permutations == 0 {
            return Err(DedupError::config("num_permutations", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.jaccard_threshold) {
            return Err(DedupError::config(
                "jaccard_threshold",
                format!("{} is outside [0, 1]", self.jaccard_threshold),
            ));
        }
        if self.num_shards == 0 {
            return Err(DedupError::config("num_shards", "must be positive"));
        }
        if self.shard_queue_capacity == 0 {
            return Err(DedupError::config("shard_queue_capacity", "must be positive"));
        }
        if self.num_bands == Some(0) {
            return Err(DedupError::config("num_bands", "must be positive"));
        }
        if self.num_rows_per_band == Some(0) {
            return Err(DedupError::config("num_rows_per_band", "must be positive"));
        }
        if let (Some(bands), Some(rows)) = (self.num_bands, self.num_rows_per_band) {
            if bands.saturating_mul(rows) > self.num_permutations {
                return Err(DedupError::config(
                    "num_bands",
                    format!(
                        "{bands} bands x {rows} rows exceeds {} permutations",
                        self.num_permutations
                    ),
                ));
            }
        }
        if self.tokenization == Tokenization::Subword && self.subword_model_path.is_none() {
            return Err(DedupError::config(
                "subword_model_path",
                "required for subword tokenization",
            ));
        }
        Ok(())
    }
}

/// CLI overrides that take precedence over file and env config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokenization: Option<Tokenization>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jaccard_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_shards: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subword_model_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}
