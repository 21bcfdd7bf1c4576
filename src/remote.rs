//! Remote inference collaborator boundary.
//!
//! The kernel hands an analyzer either one frame ("analyze current")
//! or a recorded file path ("analyze whole file") together with a
//! prompt string. Transport, batching and model concerns live on the
//! other side of this trait.

use std::path::Path;

use anyhow::Result;

use crate::frame::Frame;

pub trait FrameAnalyzer {
    /// Analyze a single frame against a prompt.
    fn analyze_frame(&mut self, frame: &Frame, prompt: &str) -> Result<String>;

    /// Analyze a whole recorded file against a prompt.
    fn analyze_file(&mut self, path: &Path, prompt: &str) -> Result<String>;
}

/// Analyzer that logs requests and answers nothing. Used by the
/// daemon when no remote endpoint is configured, and by tests.
#[derive(Default)]
pub struct NullAnalyzer;

impl FrameAnalyzer for NullAnalyzer {
    fn analyze_frame(&mut self, frame: &Frame, prompt: &str) -> Result<String> {
        log::debug!(
            "analyze frame {}x{} (prompt: {})",
            frame.width,
            frame.height,
            prompt
        );
        Ok(String::new())
    }

    fn analyze_file(&mut self, path: &Path, prompt: &str) -> Result<String> {
        log::debug!("analyze file {} (prompt: {})", path.display(), prompt);
        Ok(String::new())
    }
}
