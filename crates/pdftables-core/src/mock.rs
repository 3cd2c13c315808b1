//! Hand-rolled test doubles for strategies, OCR and the PDF backend.

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::backend::{BackendError, PdfBackend, TextToken};
use crate::grid::TableGrid;
use crate::ocr::{OcrError, OcrOutput, OcrService};
use crate::strategy::{ExtractionStrategy, StrategyError};
use crate::{ExtractionMethod, PrivilegeTier};

/// A configurable mock response for [`MockStrategy`].
#[derive(Clone, Debug)]
pub enum MockResponse {
    Grids(Vec<TableGrid>),
    Error(String),
    /// Panic inside `run`, exercising the attempt wrapper.
    Panic(String),
}

/// A mock implementing [`ExtractionStrategy`] for tests.
///
/// Supports:
/// - A fixed response (used for every call), **or**
/// - A sequence of responses (one per call, repeating the last if exhausted).
/// - Optional per-call latency.
/// - Call counting via [`call_count()`](MockStrategy::call_count).
pub struct MockStrategy {
    method: ExtractionMethod,
    responses: Mutex<Vec<MockResponse>>,
    fallback: MockResponse,
    delay: Option<Duration>,
    call_count: AtomicUsize,
}

impl MockStrategy {
    /// A mock that finds no tables.
    pub fn new(method: ExtractionMethod) -> Self {
        Self {
            method,
            responses: Mutex::new(Vec::new()),
            fallback: MockResponse::Grids(Vec::new()),
            delay: None,
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn with_grids(mut self, grids: Vec<TableGrid>) -> Self {
        self.fallback = MockResponse::Grids(grids);
        self
    }

    pub fn with_error(mut self, message: &str) -> Self {
        self.fallback = MockResponse::Error(message.to_string());
        self
    }

    pub fn panicking(mut self, message: &str) -> Self {
        self.fallback = MockResponse::Panic(message.to_string());
        self
    }

    /// Return `responses` in order, repeating the last one.
    pub fn with_sequence(mut self, mut responses: Vec<MockResponse>) -> Self {
        assert!(
            !responses.is_empty(),
            "sequence must have at least one response"
        );
        // Reverse so we can pop() from the front cheaply.
        responses.reverse();
        self.fallback = responses[0].clone();
        self.responses = Mutex::new(responses);
        self
    }

    /// Block for `delay` on every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// How many times `run()` has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    fn next_response(&self) -> MockResponse {
        let mut seq = self.responses.lock().unwrap();
        seq.pop().unwrap_or_else(|| self.fallback.clone())
    }
}

impl ExtractionStrategy for MockStrategy {
    fn method(&self) -> ExtractionMethod {
        self.method
    }

    fn run(&self, _path: &Path) -> Result<Vec<TableGrid>, StrategyError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            std::thread::sleep(d);
        }
        match self.next_response() {
            MockResponse::Grids(grids) => Ok(grids),
            MockResponse::Error(message) => Err(StrategyError::Failed(message)),
            MockResponse::Panic(message) => panic!("{message}"),
        }
    }
}

/// A mock [`OcrService`] with a fixed scan verdict and output.
pub struct MockOcr {
    scanned: Option<bool>,
    grids: Vec<TableGrid>,
    error: Option<String>,
    scan_calls: AtomicUsize,
    extract_calls: AtomicUsize,
}

impl MockOcr {
    pub fn new(scanned: bool) -> Self {
        Self {
            scanned: Some(scanned),
            grids: Vec::new(),
            error: None,
            scan_calls: AtomicUsize::new(0),
            extract_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_grids(mut self, grids: Vec<TableGrid>) -> Self {
        self.grids = grids;
        self
    }

    /// Make `extract_tables` fail with a tool error.
    pub fn with_error(mut self, message: &str) -> Self {
        self.error = Some(message.to_string());
        self
    }

    /// Make `is_scanned` fail.
    pub fn failing_scan_check(mut self) -> Self {
        self.scanned = None;
        self
    }

    pub fn scan_calls(&self) -> usize {
        self.scan_calls.load(Ordering::SeqCst)
    }

    pub fn extract_calls(&self) -> usize {
        self.extract_calls.load(Ordering::SeqCst)
    }
}

impl OcrService for MockOcr {
    fn is_scanned(&self, _path: &Path) -> Result<bool, OcrError> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);
        self.scanned.ok_or_else(|| OcrError::ToolFailed {
            tool: "mock".to_string(),
            message: "scan check failed".to_string(),
        })
    }

    fn extract_tables(&self, _path: &Path, tier: PrivilegeTier) -> Result<OcrOutput, OcrError> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        if !tier.allows_ocr() {
            return Err(OcrError::TierNotAllowed);
        }
        if let Some(message) = &self.error {
            return Err(OcrError::ToolFailed {
                tool: "mock".to_string(),
                message: message.clone(),
            });
        }
        Ok(OcrOutput {
            grids: self.grids.clone(),
            page_count: self.grids.len(),
        })
    }
}

/// An in-memory [`PdfBackend`]; each page has text and positioned words,
/// or fails to extract.
#[derive(Default)]
pub struct MockBackend {
    pages: Vec<Option<(String, Vec<TextToken>)>>,
    fail_open: bool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, text: &str, words: Vec<TextToken>) -> Self {
        self.pages.push(Some((text.to_string(), words)));
        self
    }

    /// Append a page whose content cannot be extracted.
    pub fn with_failing_page(mut self) -> Self {
        self.pages.push(None);
        self
    }

    /// Make every call fail as if the document could not be opened.
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    fn page(&self, page: usize) -> Result<&(String, Vec<TextToken>), BackendError> {
        if self.fail_open {
            return Err(BackendError::OpenError("mock document is unreadable".to_string()));
        }
        let count = self.pages.len();
        match page.checked_sub(1).and_then(|i| self.pages.get(i)) {
            Some(Some(content)) => Ok(content),
            Some(None) => Err(BackendError::ExtractionError(format!("mock page {page} is broken"))),
            None => Err(BackendError::PageOutOfRange { page, count }),
        }
    }
}

impl PdfBackend for MockBackend {
    fn page_count(&self, _path: &Path) -> Result<usize, BackendError> {
        if self.fail_open {
            return Err(BackendError::OpenError("mock document is unreadable".to_string()));
        }
        Ok(self.pages.len())
    }

    fn page_text(&self, _path: &Path, page: usize) -> Result<String, BackendError> {
        self.page(page).map(|(text, _)| text.clone())
    }

    fn page_words(&self, _path: &Path, page: usize) -> Result<Vec<TextToken>, BackendError> {
        self.page(page).map(|(_, words)| words.clone())
    }
}
