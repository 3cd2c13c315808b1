//! OCR through the `pdftoppm` and `tesseract` command-line tools.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use crate::backend::{BBox, PdfBackend};
use crate::config::OcrSettings;
use crate::ocr::{OcrError, OcrOutput, OcrService, OcrToken, detect_scanned, tokens_to_grids};
use crate::PrivilegeTier;

/// Renders pages with `pdftoppm` and recognizes them with `tesseract`.
///
/// Scan detection goes through the text backend, so the tools are only
/// invoked for documents that actually need OCR.
pub struct TesseractOcr {
    backend: Arc<dyn PdfBackend>,
    settings: OcrSettings,
    pdftoppm: PathBuf,
    tesseract: PathBuf,
}

impl TesseractOcr {
    pub fn new(backend: Arc<dyn PdfBackend>, settings: OcrSettings) -> Self {
        Self {
            backend,
            settings,
            pdftoppm: PathBuf::from("pdftoppm"),
            tesseract: PathBuf::from("tesseract"),
        }
    }

    /// Override the tool binaries, e.g. when they are not on `PATH`.
    pub fn with_tools(mut self, pdftoppm: impl Into<PathBuf>, tesseract: impl Into<PathBuf>) -> Self {
        self.pdftoppm = pdftoppm.into();
        self.tesseract = tesseract.into();
        self
    }

    /// Whether both tools can be executed.
    pub fn tools_available(&self) -> bool {
        command_available(&self.pdftoppm, "-v") && command_available(&self.tesseract, "--version")
    }

    /// Render up to `max_pages` pages into `dir`, returning the PNGs in page order.
    fn render_pages(&self, path: &Path, dir: &Path) -> Result<Vec<PathBuf>, OcrError> {
        let output = Command::new(&self.pdftoppm)
            .arg("-r")
            .arg(self.settings.dpi.to_string())
            .arg("-f")
            .arg("1")
            .arg("-l")
            .arg(self.settings.max_pages.max(1).to_string())
            .arg("-png")
            .arg(path)
            .arg(dir.join("page"))
            .output()?;

        if !output.status.success() {
            return Err(OcrError::ToolFailed {
                tool: "pdftoppm".to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        // pdftoppm zero-pads page numbers to a fixed width, so names sort by page.
        let mut pngs: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
            .collect();
        pngs.sort();
        Ok(pngs)
    }

    fn recognize(&self, png: &Path, page: usize) -> Result<Vec<OcrToken>, OcrError> {
        let output = Command::new(&self.tesseract)
            .arg(png)
            .arg("stdout")
            .arg("--psm")
            .arg("6")
            .arg("tsv")
            .output()?;

        if !output.status.success() {
            return Err(OcrError::ToolFailed {
                tool: "tesseract".to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout), page))
    }
}

impl OcrService for TesseractOcr {
    fn is_scanned(&self, path: &Path) -> Result<bool, OcrError> {
        Ok(detect_scanned(self.backend.as_ref(), path, &self.settings))
    }

    fn extract_tables(&self, path: &Path, tier: PrivilegeTier) -> Result<OcrOutput, OcrError> {
        if !tier.allows_ocr() {
            return Err(OcrError::TierNotAllowed);
        }
        let dir = tempfile::tempdir()?;
        let pngs = self.render_pages(path, dir.path())?;

        let mut tokens = Vec::new();
        for (i, png) in pngs.iter().enumerate() {
            let page = i + 1;
            match self.recognize(png, page) {
                Ok(page_tokens) => tokens.extend(page_tokens),
                Err(e) => tracing::warn!(page, error = %e, "OCR failed for page"),
            }
        }

        tracing::info!(
            path = %path.display(),
            pages = pngs.len(),
            tokens = tokens.len(),
            "OCR recognized document"
        );
        Ok(OcrOutput {
            grids: tokens_to_grids(&tokens, &self.settings),
            page_count: pngs.len(),
        })
    }
}

fn command_available(program: &Path, flag: &str) -> bool {
    Command::new(program).arg(flag).output().is_ok()
}

/// Parse tesseract's TSV output into word tokens.
///
/// Only level-5 (word) rows are kept; malformed rows are skipped.
pub fn parse_tsv(tsv: &str, page: usize) -> Vec<OcrToken> {
    tsv.lines()
        .skip_while(|line| line.starts_with("level"))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 12 || fields[0] != "5" {
                return None;
            }
            let left: f32 = fields[6].parse().ok()?;
            let top: f32 = fields[7].parse().ok()?;
            let width: f32 = fields[8].parse().ok()?;
            let height: f32 = fields[9].parse().ok()?;
            let confidence: f64 = fields[10].parse().ok()?;
            Some(OcrToken {
                text: fields[11..].join("\t"),
                confidence,
                bbox: BBox::new(left, top, left + width, top + height),
                page,
            })
        })
        .collect()
}
