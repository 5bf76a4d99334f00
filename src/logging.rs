//! Tracing configuration and log routing.
//!
//! Console output goes to stdout for the server and stderr for the CLI. Every process also
//! appends to `HYBRID_RAG_LOG_FILE`, or `logs/hybrid-rag.log` when unset; OCR runs log per
//! page, so that layer writes through a non‑blocking worker.
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const DEFAULT_FILTER: &str = "info,lopdf=warn,tantivy=warn";

/// Console stream receiving human-readable logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleStream {
    /// Standard output (server).
    Stdout,
    /// Standard error, keeping stdout free for command output (CLI).
    Stderr,
}

/// Configure tracing subscribers for the console and optional file logging.
///
/// Respects `RUST_LOG` for filtering (defaults to `info`, with the noisy PDF and index
/// internals held at `warn`). The worker guard lives in a global for the process lifetime.
pub fn init_tracing(console: ConsoleStream) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let console_layer = match console {
        ConsoleStream::Stdout => fmt::layer().with_target(false).compact().boxed(),
        ConsoleStream::Stderr => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .boxed(),
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if let Some(writer) = configure_file_writer() {
        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact();

        registry.with(file_layer).init();
    } else {
        registry.init();
    }
}

const LOG_FILE_ENV: &str = "HYBRID_RAG_LOG_FILE";
const DEFAULT_LOG_FILE: &str = "logs/hybrid-rag.log";

fn log_file_path() -> PathBuf {
    std::env::var_os(LOG_FILE_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE))
}

/// Open the log file in append mode behind a non‑blocking worker.
///
/// File logging is skipped, with a note on stderr, when the file or its directory cannot be created.
fn configure_file_writer() -> Option<NonBlocking> {
    let path = log_file_path();
    let opened = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map_or(Ok(()), std::fs::create_dir_all)
        .and_then(|()| OpenOptions::new().create(true).append(true).open(&path));
    match opened {
        Ok(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let _ = LOG_GUARD.set(guard);
            Some(writer)
        }
        Err(err) => {
            eprintln!("File logging disabled ({}): {err}", path.display());
            None
        }
    }
}
