// Test mocks for the conference pipeline.
//
// Three mocks matching the three trait boundaries:
// - MockFetcher (PageFetcher): HashMap-based URL→HTML
// - ScriptedCompletion (ai_client::Completion): queued replies and errors
// - MockExtractor (FieldExtractor): HashMap-based title→fields
//
// Plus HTML builders for listing and detail pages.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use ai_client::{AiError, Completion};
use async_trait::async_trait;

use confscout_common::{ConferenceCandidate, ExtractedFields, TransportError};

use crate::extraction::{ExtractionResult, FieldExtractor, Provenance};
use crate::fetch::PageFetcher;

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// HashMap-based page fetcher. Unregistered URLs answer HTTP 404.
/// Builder pattern: `.named()`, `.on_page()`.
pub struct MockFetcher {
    name: String,
    pages: HashMap<String, String>,
    fetched: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            pages: HashMap::new(),
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn on_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    /// Every URL requested, in call order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetched.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, TransportError> {
        self.fetched.lock().unwrap().push(url.to_string());
        self.pages.get(url).cloned().ok_or_else(|| TransportError::Status {
            url: url.to_string(),
            status: 404,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// ScriptedCompletion
// ---------------------------------------------------------------------------

/// Answers prompts from a queue. An exhausted queue answers with a network error.
pub struct ScriptedCompletion {
    script: Mutex<VecDeque<Result<String, AiError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(self, text: &str) -> Self {
        self.script.lock().unwrap().push_back(Ok(text.to_string()));
        self
    }

    pub fn fail(self, error: AiError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Default for ScriptedCompletion {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Completion for ScriptedCompletion {
    async fn complete(&self, prompt: &str) -> ai_client::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AiError::Network("script exhausted".into())))
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Title-keyed extractor. Unknown titles extract to empty fields.
/// Tracks how many calls are in flight at once.
pub struct MockExtractor {
    fields: HashMap<String, ExtractedFields>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    latency: Duration,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self {
            fields: HashMap::new(),
            failing: HashSet::new(),
            panicking: HashSet::new(),
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Hold every call open this long so overlapping calls can be observed.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Most calls observed in flight at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn on_title(mut self, title: &str, fields: ExtractedFields) -> Self {
        self.fields.insert(title.to_string(), fields);
        self
    }

    /// Report `Provenance::Failed` for this title.
    pub fn failing(mut self, title: &str) -> Self {
        self.failing.insert(title.to_string());
        self
    }

    /// Panic inside the extraction task for this title.
    pub fn panicking(mut self, title: &str) -> Self {
        self.panicking.insert(title.to_string());
        self
    }

    /// Titles extracted so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FieldExtractor for MockExtractor {
    async fn extract(&self, candidate: &ConferenceCandidate) -> ExtractionResult {
        self.calls.lock().unwrap().push(candidate.title.clone());
        if self.panicking.contains(&candidate.title) {
            panic!("extractor blew up on {}", candidate.title);
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&candidate.title) {
            return ExtractionResult::failed();
        }
        ExtractionResult {
            fields: self.fields.get(&candidate.title).cloned().unwrap_or_default(),
            provenance: Provenance::Extracted,
        }
    }
}

// ---------------------------------------------------------------------------
// HTML builders
// ---------------------------------------------------------------------------

/// One announcement node in the labelled layout the listing parser expects.
pub fn listing_item(title: &str, link: &str, dates: &str, location: &str, posted: &str) -> String {
    format!(
        "<li><a href=\"{link}\">{title}</a><div>Conference Dates: {dates}</div><div>Location: {location}</div><div>Posted: {posted}</div></li>"
    )
}

pub fn listing_page(items: &[String]) -> String {
    format!(
        "<html><head><title>Announcements</title></head><body><ul>{}</ul></body></html>",
        items.concat()
    )
}

pub fn detail_page(description: &str) -> String {
    format!(
        "<html><body><div id=\"content\"><div class=\"form-group\"><h3>Description</h3><div>{description}</div></div></div></body></html>"
    )
}
