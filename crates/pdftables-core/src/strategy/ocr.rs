use std::path::Path;
use std::sync::Arc;

use crate::grid::TableGrid;
use crate::ocr::OcrService;
use crate::strategy::{ExtractionStrategy, StrategyError, finalize};
use crate::{ExtractionMethod, PrivilegeTier};

/// Adapter running an [`OcrService`] on behalf of one caller tier.
pub struct OcrStrategy {
    service: Arc<dyn OcrService>,
    tier: PrivilegeTier,
}

impl OcrStrategy {
    pub fn new(service: Arc<dyn OcrService>, tier: PrivilegeTier) -> Self {
        Self { service, tier }
    }
}

impl ExtractionStrategy for OcrStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Ocr
    }

    fn run(&self, path: &Path) -> Result<Vec<TableGrid>, StrategyError> {
        let output = self.service.extract_tables(path, self.tier)?;
        tracing::debug!(pages = output.page_count, grids = output.grids.len(), "OCR pass finished");
        Ok(finalize(output.grids, 2))
    }
}
