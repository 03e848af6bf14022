//! Page rasterization through poppler's `pdftoppm`.

use std::fs;
use std::path::Path;
use std::process::Command;

use image::DynamicImage;
use tempfile::TempDir;
use tracing::debug;

use super::Result;
use crate::error::PdfError;

/// Rasterizes one page of a PDF, whatever the page is drawn with.
pub trait PageRenderer: Send + Sync {
    /// Render 1-based `page` of `pdf` at `dpi`.
    fn render(&self, pdf: &[u8], page: u32, dpi: u32) -> Result<DynamicImage>;
}

/// Runs the `pdftoppm` binary once per page.
#[derive(Debug, Clone)]
pub struct PdftoppmRenderer {
    program: String,
}

impl PdftoppmRenderer {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    /// Whether the binary can be started at all.
    pub fn available(&self) -> bool {
        Command::new(&self.program).arg("-v").output().is_ok()
    }
}

impl Default for PdftoppmRenderer {
    fn default() -> Self {
        Self::new("pdftoppm")
    }
}

impl PageRenderer for PdftoppmRenderer {
    fn render(&self, pdf: &[u8], page: u32, dpi: u32) -> Result<DynamicImage> {
        let dir = TempDir::new().map_err(|e| PdfError::Render(format!("no scratch directory: {e}")))?;
        let input = dir.path().join("input.pdf");
        fs::write(&input, pdf).map_err(|e| PdfError::Render(format!("cannot stage PDF: {e}")))?;

        let prefix = dir.path().join("page");
        let page_arg = page.to_string();
        let output = Command::new(&self.program)
            .args(["-png", "-singlefile", "-r", &dpi.to_string(), "-f", &page_arg, "-l", &page_arg])
            .arg(&input)
            .arg(&prefix)
            .output()
            .map_err(|e| PdfError::Render(format!("cannot run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PdfError::Render(format!("{} exited with {}: {}", self.program, output.status, stderr.trim())));
        }

        let image = load_png(&prefix.with_extension("png"))?;
        debug!(page, dpi, width = image.width(), height = image.height(), "rendered page");
        Ok(image)
    }
}

fn load_png(path: &Path) -> Result<DynamicImage> {
    image::open(path).map_err(|e| PdfError::Render(format!("unreadable page image {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::extractor::tests::sample_pdf;
    use lopdf::Object;
    use pretty_assertions::assert_eq;

    fn letter() -> Vec<Object> {
        vec![0.into(), 0.into(), 612.into(), 792.into()]
    }

    #[test]
    fn test_missing_binary_is_a_render_error() {
        let renderer = PdftoppmRenderer::new("/nonexistent/bin/pdftoppm");
        assert!(!renderer.available());
        let err = renderer.render(b"%PDF-1.5", 1, 400).unwrap_err();
        assert!(matches!(err, PdfError::Render(ref msg) if msg.starts_with("cannot run /nonexistent/bin/pdftoppm")));
    }

    #[test]
    fn test_renders_text_only_page_at_dpi() {
        let renderer = PdftoppmRenderer::default();
        if !renderer.available() {
            eprintln!("pdftoppm not installed, skipping");
            return;
        }

        let pdf = sample_pdf(letter());
        let image = renderer.render(&pdf, 1, 72).unwrap();
        assert_eq!((image.width(), image.height()), (612, 792));

        let doubled = renderer.render(&pdf, 1, 144).unwrap();
        assert_eq!((doubled.width(), doubled.height()), (1224, 1584));

        assert!(matches!(renderer.render(&pdf, 3, 72), Err(PdfError::Render(_))));
    }
}
