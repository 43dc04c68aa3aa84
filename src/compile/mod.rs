//! Document Compiler: markup in, PDF bytes out.
//!
//! The real engine shells out to weasyprint; tests swap in a deterministic
//! fake through the `DocumentCompiler` trait. Neither is allowed network
//! or arbitrary filesystem access from the markup, and the page geometry
//! is pinned in code so the same markup always paginates the same way.

mod engine;

pub use engine::EngineCompiler;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::PipelineError;

/// Explicit page geometry; nothing inherits from engine defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageConfig {
    pub size: &'static str,
    pub margin: &'static str,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            size: "A4",
            margin: "20mm",
        }
    }
}

impl PageConfig {
    /// Stylesheet fragment handed to the engine alongside the markup.
    pub fn to_css(&self) -> String {
        format!(
            "@page {{ size: {}; margin: {}; }}\nhtml {{ print-color-adjust: exact; }}\n",
            self.size, self.margin
        )
    }
}

/// Refuse markup that could reach outside the compile sandbox. The
/// renderer never emits these; their presence means a tampered template.
pub fn check_markup(markup: &str) -> Result<(), PipelineError> {
    for banned in ["<script", "http://", "https://", "file://"] {
        if markup.contains(banned) {
            return Err(PipelineError::CompilationError(format!(
                "markup contains forbidden token {banned:?}"
            )));
        }
    }
    Ok(())
}

#[async_trait]
pub trait DocumentCompiler: Send + Sync {
    async fn compile(&self, markup: &str, page: &PageConfig) -> Result<Vec<u8>, PipelineError>;
}

/// In-process stand-in for tests: output bytes are a pure function of the
/// markup and page geometry.
#[derive(Debug, Default)]
pub struct FakeCompiler;

#[async_trait]
impl DocumentCompiler for FakeCompiler {
    async fn compile(&self, markup: &str, page: &PageConfig) -> Result<Vec<u8>, PipelineError> {
        check_markup(markup)?;
        let mut hasher = Sha256::new();
        hasher.update(page.to_css().as_bytes());
        hasher.update(markup.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = b"%PDF-1.7\n% fake\n".to_vec();
        bytes.extend_from_slice(&digest);
        bytes.extend_from_slice(b"\n%%EOF\n");
        Ok(bytes)
    }
}

/// A compiler that always reports the engine as unreachable; used to
/// exercise retry and failure paths.
#[derive(Debug, Default)]
pub struct UnavailableCompiler;

#[async_trait]
impl DocumentCompiler for UnavailableCompiler {
    async fn compile(&self, _markup: &str, _page: &PageConfig) -> Result<Vec<u8>, PipelineError> {
        Err(PipelineError::CompilerUnavailable(
            "engine not reachable".to_string(),
        ))
    }
}
