use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bts_dedup::io::{read_jsonl, write_jsonl};
use bts_dedup::{ConfigOverrides, DedupConfig, Deduplicator, Tokenization};

/// Remove near-duplicate documents from a JSON-lines corpus.
#[derive(Debug, Parser)]
#[command(name = "bts_dedup", version)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<String>,
    /// Input JSON-lines file (stdin when omitted)
    #[arg(long)]
    input: Option<PathBuf>,
    /// Output JSON-lines file (stdout when omitted)
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long)]
    num_shards: Option<usize>,
    /// Jaccard similarity threshold in [0, 1]
    #[arg(long)]
    threshold: Option<f64>,
    /// space, punctuation, character or subword
    #[arg(long)]
    tokenization: Option<Tokenization>,
    #[arg(long)]
    window_size: Option<usize>,
    /// Record field holding the document text
    #[arg(long)]
    text_key: Option<String>,
    /// Tokenizer model file for subword tokenization
    #[arg(long)]
    subword_model: Option<PathBuf>,
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            text_key: self.text_key.clone(),
            tokenization: self.tokenization,
            window_size: self.window_size,
            jaccard_threshold: self.threshold,
            num_shards: self.num_shards,
            subword_model_path: self.subword_model.clone(),
            seed: self.seed,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = DedupConfig::load(args.config.as_deref(), args.overrides())?;
    let dedup = Deduplicator::new(config)?;

    let records = match &args.input {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open input {}", path.display()))?;
            read_jsonl(BufReader::new(file))?
        }
        None => read_jsonl(io::stdin().lock())?,
    };

    let outcome = dedup.run(records).await?;
    tracing::info!(
        documents = outcome.report.documents,
        kept = outcome.report.kept,
        removed = outcome.report.removed,
        buckets = outcome.report.buckets,
        rounds = outcome.report.rounds,
        "deduplication finished"
    );

    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create output {}", path.display()))?;
            write_jsonl(BufWriter::new(file), &outcome.kept)?;
        }
        None => write_jsonl(BufWriter::new(io::stdout().lock()), &outcome.kept)?,
    }

    Ok(())
}
