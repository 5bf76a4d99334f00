use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use hybrid_rag::app::{build_extractor, build_services};
use hybrid_rag::config::{self, Config};
use hybrid_rag::extraction::{ExtractionMethod, ExtractionMode, PageRecord};
use hybrid_rag::gate::{ReviewRecord, summarize_review};
use hybrid_rag::ingest::{IngestRequest, discover_files};
use hybrid_rag::logging::{ConsoleStream, init_tracing};
use hybrid_rag::records::{read_jsonl, write_jsonl};
use serde::Serialize;

#[derive(Parser)]
#[command(
    name = "hybrid-rag-cli",
    about = "Ingest documents, inspect and reprocess flagged pages, and query the hybrid index"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, chunk, gate and index every supported file under a directory.
    Ingest {
        input_dir: PathBuf,
        #[arg(long)]
        records: Option<PathBuf>,
        #[arg(long)]
        chunks: Option<PathBuf>,
        /// Skip the lexical index.
        #[arg(long)]
        no_store: bool,
        /// Skip embedding and the vector index.
        #[arg(long)]
        no_embed: bool,
    },
    /// Extract page records only.
    Extract {
        /// A file or a directory scanned recursively.
        input: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Treat each PDF as one document instead of page by page.
        #[arg(long)]
        whole: bool,
    },
    /// Re-run OCR on the pages behind a review file.
    Reprocess {
        review_file: PathBuf,
        #[arg(long, value_enum, default_value_t = Engine::LocalOcr)]
        engine: Engine,
    },
    /// Summarise a review file: flagged chunks per file, failing checks and engines.
    Review {
        review_file: PathBuf,
        /// Files listed by flagged count.
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Answer a question from the indices.
    Query { question: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum Engine {
    LocalOcr,
    RemoteOcr,
}

impl From<Engine> for ExtractionMethod {
    fn from(engine: Engine) -> Self {
        match engine {
            Engine::LocalOcr => ExtractionMethod::LocalOcr,
            Engine::RemoteOcr => ExtractionMethod::RemoteOcr,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init_config();
    init_tracing(ConsoleStream::Stderr);

    match cli.command {
        Command::Ingest {
            input_dir,
            records,
            chunks,
            no_store,
            no_embed,
        } => {
            let services = build_services(config).await?;
            let request = IngestRequest {
                records_jsonl: records,
                chunks_jsonl: chunks,
                store: !no_store,
                embed: !no_embed,
                ..IngestRequest::new(input_dir)
            };
            let summary = services.ingest.run(request).await?;
            print_json(&summary)
        }
        Command::Extract {
            input,
            output,
            whole,
        } => {
            let output = output.unwrap_or_else(|| config.ingest_settings().records_path());
            let records = extract(config, &input, whole).await?;
            let written = write_jsonl(&output, &records)?;
            tracing::info!(records = written, output = %output.display(), "Records written");
            print_json(&serde_json::json!({ "records": written, "output": output }))
        }
        Command::Reprocess {
            review_file,
            engine,
        } => {
            let services = build_services(config).await?;
            let summary = services
                .ingest
                .reprocess_flagged(&review_file, engine.into())
                .await?;
            print_json(&summary)
        }
        Command::Review { review_file, top } => {
            let records: Vec<ReviewRecord> = read_jsonl(&review_file)
                .with_context(|| format!("failed to read {}", review_file.display()))?;
            let report = summarize_review(&records, top);
            tracing::info!(
                flagged = report.total_flagged,
                files = report.files_with_flags,
                "Review file summarised"
            );
            print_json(&report)
        }
        Command::Query { question } => {
            let services = build_services(config).await?;
            let outcome = services.query.answer(&question).await?;
            print_json(&outcome)
        }
    }
}

async fn extract(config: &Config, input: &Path, whole: bool) -> Result<Vec<PageRecord>> {
    let mut config = config.clone();
    if whole {
        config.extraction_mode = ExtractionMode::Document;
    }
    let extractor = build_extractor(&config)?;

    let files = if input.is_dir() {
        discover_files(input)
    } else if input.is_file() {
        vec![input.to_path_buf()]
    } else {
        bail!("input not found: {}", input.display());
    };

    let mut records = Vec::new();
    for file in files {
        match extractor.extract_file(&file).await {
            Ok(extracted) => records.extend(extracted),
            Err(error) => tracing::warn!(path = %file.display(), error = %error, "Skipping file"),
        }
    }
    Ok(records)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}
