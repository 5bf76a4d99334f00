//! Page rasterisation and bounded subprocess execution for the OCR engines.

use crate::extraction::types::{EngineError, ExtractionMethod};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

/// Renders single PDF pages to PNG through `pdftoppm`.
#[derive(Debug, Clone)]
pub struct Rasterizer {
    program: String,
    dpi: u32,
    timeout: Duration,
}

impl Rasterizer {
    /// Create a rasterizer using the given `pdftoppm` executable.
    pub fn new(program: &str, dpi: u32, timeout: Duration) -> Self {
        Self {
            program: program.to_string(),
            dpi,
            timeout,
        }
    }

    /// Time budget applied to each subprocess.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Render a 1-based page to PNG bytes on behalf of `engine`.
    pub async fn render_png(
        &self,
        engine: ExtractionMethod,
        path: &Path,
        page_no: u32,
    ) -> Result<Vec<u8>, EngineError> {
        let page = page_no.to_string();
        let args = vec![
            "-f".to_string(),
            page.clone(),
            "-l".to_string(),
            page,
            "-r".to_string(),
            self.dpi.to_string(),
            "-png".to_string(),
            "-singlefile".to_string(),
            path.to_string_lossy().into_owned(),
            "-".to_string(),
        ];
        let png = run_process(engine, &self.program, &args, None, self.timeout).await?;
        if png.is_empty() {
            return Err(EngineError::ProcessFailed {
                engine,
                stderr: format!("{} produced no image for page {page_no}", self.program),
            });
        }
        Ok(png)
    }
}

/// Run `program` with optional stdin bytes, returning stdout.
///
/// The child is killed when the time budget elapses.
pub(crate) async fn run_process(
    engine: ExtractionMethod,
    program: &str,
    args: &[String],
    input: Option<Vec<u8>>,
    limit: Duration,
) -> Result<Vec<u8>, EngineError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|error| EngineError::Unavailable {
        engine,
        reason: format!("{program}: {error}"),
    })?;

    let writer = match (input, child.stdin.take()) {
        (Some(bytes), Some(mut stdin)) => Some(tokio::spawn(async move {
            let result = stdin.write_all(&bytes).await;
            drop(stdin);
            result
        })),
        _ => None,
    };

    let output = match timeout(limit, child.wait_with_output()).await {
        Ok(result) => result.map_err(|error| EngineError::ProcessFailed {
            engine,
            stderr: error.to_string(),
        })?,
        Err(_) => {
            return Err(EngineError::Timeout {
                engine,
                seconds: limit.as_secs(),
            });
        }
    };

    if let Some(handle) = writer
        && let Ok(Err(error)) = handle.await
    {
        tracing::debug!(program, error = %error, "Subprocess closed stdin early");
    }

    if !output.status.success() {
        return Err(EngineError::ProcessFailed {
            engine,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_program_is_reported_unavailable() {
        let error = run_process(
            ExtractionMethod::LocalOcr,
            "definitely-not-a-real-binary-7c1f",
            &[],
            None,
            Duration::from_secs(1),
        )
        .await
        .expect_err("missing binary");
        assert!(matches!(error, EngineError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn stdin_is_piped_through() {
        let output = run_process(
            ExtractionMethod::LocalOcr,
            "cat",
            &[],
            Some(b"page text".to_vec()),
            Duration::from_secs(5),
        )
        .await
        .expect("cat output");
        assert_eq!(output, b"page text");
    }

    #[tokio::test]
    async fn slow_process_times_out() {
        let error = run_process(
            ExtractionMethod::LocalOcr,
            "sleep",
            &["5".to_string()],
            None,
            Duration::from_millis(100),
        )
        .await
        .expect_err("timeout");
        assert!(matches!(error, EngineError::Timeout { .. }));
    }
}
