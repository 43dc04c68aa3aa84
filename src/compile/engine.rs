//! weasyprint subprocess backend.
//!
//! Each compile gets its own temp directory and a fixed argument set.
//! `SOURCE_DATE_EPOCH=0` keeps the engine from embedding wall-clock
//! timestamps, so identical markup yields identical bytes. A fair
//! semaphore caps concurrent engine processes; waiters past the queue
//! window fail as `CompilerUnavailable` rather than piling up.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::PipelineError;

use super::{check_markup, DocumentCompiler, PageConfig};

pub struct EngineCompiler {
    command: String,
    run_timeout: Duration,
    queue_wait: Duration,
    slots: Semaphore,
}

impl EngineCompiler {
    pub fn new(config: &Config) -> Self {
        Self {
            command: config.compiler_cmd.clone(),
            run_timeout: config.compiler_timeout(),
            queue_wait: config.compiler_queue_wait(),
            slots: Semaphore::new(config.compiler_max_concurrent),
        }
    }
}

#[async_trait]
impl DocumentCompiler for EngineCompiler {
    async fn compile(&self, markup: &str, page: &PageConfig) -> Result<Vec<u8>, PipelineError> {
        check_markup(markup)?;

        // Fair acquisition: waiters run in arrival order.
        let _permit = timeout(self.queue_wait, self.slots.acquire())
            .await
            .map_err(|_| {
                warn!(queue_wait = ?self.queue_wait, "compile queue wait exceeded");
                PipelineError::CompilerUnavailable("compile queue is full".to_string())
            })?
            .map_err(|_| PipelineError::CompilerUnavailable("compile pool closed".to_string()))?;

        let workdir = tempfile::tempdir()
            .map_err(|e| PipelineError::CompilerUnavailable(format!("temp dir: {e}")))?;
        let input_path = workdir.path().join("input.html");
        let css_path = workdir.path().join("page.css");
        let output_path = workdir.path().join("output.pdf");

        tokio::fs::write(&input_path, markup)
            .await
            .map_err(|e| PipelineError::CompilerUnavailable(format!("write markup: {e}")))?;
        tokio::fs::write(&css_path, page.to_css())
            .await
            .map_err(|e| PipelineError::CompilerUnavailable(format!("write stylesheet: {e}")))?;

        let mut command = Command::new(&self.command);
        command
            .arg(&input_path)
            .arg(&output_path)
            .arg("--media-type")
            .arg("print")
            .arg("--stylesheet")
            .arg(&css_path)
            .env("SOURCE_DATE_EPOCH", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(command = %self.command, "spawning document engine");
        let run = async {
            command
                .output()
                .await
                .map_err(|e| PipelineError::CompilerUnavailable(format!("spawn engine: {e}")))
        };
        let output = timeout(self.run_timeout, run).await.map_err(|_| {
            PipelineError::CompilerUnavailable(format!(
                "engine exceeded {}s",
                self.run_timeout.as_secs()
            ))
        })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::CompilationError(format!(
                "engine exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        tokio::fs::read(&output_path)
            .await
            .map_err(|e| PipelineError::CompilationError(format!("engine produced no output: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(cmd: &str) -> Config {
        Config {
            database_url: "postgres://unused".to_string(),
            artifact_dir: "artifacts".to_string(),
            compiler_cmd: cmd.to_string(),
            compiler_timeout_secs: 5,
            compiler_max_concurrent: 2,
            compiler_queue_wait_secs: 1,
            db_timeout_secs: 5,
            smtp_host: None,
            smtp_username: None,
            smtp_password: None,
            smtp_from: None,
        }
    }

    #[tokio::test]
    async fn missing_binary_reports_unavailable() {
        let compiler = EngineCompiler::new(&test_config("definitely-not-a-real-engine"));
        let err = compiler
            .compile("<p>hello</p>", &PageConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::CompilerUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn failing_engine_reports_compilation_error() {
        // `false` accepts the arguments and exits nonzero.
        let compiler = EngineCompiler::new(&test_config("false"));
        let err = compiler
            .compile("<p>hello</p>", &PageConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::CompilationError(_)));
        assert!(!err.is_retryable());
    }
}
