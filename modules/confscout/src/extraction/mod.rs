//! Extraction client: prompt, call, parse, retry, cache.
//!
//! [`ExtractionClient::extract`] always produces a value. Service failures are
//! retried per [`RetryPolicy`] and then degrade to empty fields.

pub mod cache;
pub mod prompt;
pub mod reply;

use std::sync::Arc;
use std::time::Duration;

use ai_client::{AiError, Completion};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use confscout_common::{Config, ConferenceCandidate, Continent, ExtractedFields};

pub use cache::{fingerprint, ExtractionCache};
pub use reply::{parse_reply, ParseStage, ParsedReply};

// ---------------------------------------------------------------------------
// Result type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Served from the cache without a service call.
    Cached,
    /// Parsed from a service reply.
    Extracted,
    /// Retries exhausted or a non-retryable error; fields are empty.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    pub fields: ExtractedFields,
    pub provenance: Provenance,
}

impl ExtractionResult {
    pub fn failed() -> Self {
        Self {
            fields: ExtractedFields::default(),
            provenance: Provenance::Failed,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.provenance == Provenance::Failed
    }
}

#[async_trait]
pub trait FieldExtractor: Send + Sync {
    /// Never fails; failure is reported through [`Provenance::Failed`].
    async fn extract(&self, candidate: &ConferenceCandidate) -> ExtractionResult;
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait after failed attempt `n` (0-based) is `base_delay * 2^n`, capped.
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.extraction_max_attempts.max(1),
            ..Self::default()
        }
    }

    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Wait before the attempt following failed attempt `attempt`. A server
    /// supplied `Retry-After` replaces the computed backoff; both are capped.
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let computed = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        retry_after.unwrap_or(computed).min(self.max_delay)
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct ExtractionClient {
    completion: Arc<dyn Completion>,
    cache: Option<ExtractionCache>,
    retry: RetryPolicy,
}

impl ExtractionClient {
    pub fn new(completion: Arc<dyn Completion>, retry: RetryPolicy) -> Self {
        Self {
            completion,
            cache: None,
            retry,
        }
    }

    pub fn with_cache(mut self, cache: ExtractionCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache(&self) -> Option<&ExtractionCache> {
        self.cache.as_ref()
    }

    /// Write pending cache entries. No-op without a cache.
    pub fn flush_cache(&self) -> Result<bool, confscout_common::PersistenceError> {
        match &self.cache {
            Some(cache) => cache.flush(),
            None => Ok(false),
        }
    }

    pub async fn extract(
        &self,
        title: &str,
        location: &str,
        description: &str,
    ) -> ExtractionResult {
        let key = fingerprint(title, location, description);
        if let Some(fields) = self.cache.as_ref().and_then(|c| c.get(&key)) {
            debug!(title, "Extraction cache hit");
            return ExtractionResult {
                fields,
                provenance: Provenance::Cached,
            };
        }

        let prompt = prompt::build_prompt(title, location, description);
        let attempts = self.retry.max_attempts.max(1);

        for attempt in 0..attempts {
            match self.completion.complete(&prompt).await {
                Ok(raw) => {
                    let parsed = parse_reply(&raw);
                    if parsed.stage != ParseStage::Direct {
                        debug!(title, stage = ?parsed.stage, "Extraction reply needed fallback parsing");
                    }
                    let fields = finish(title, parsed.fields);
                    if let Some(cache) = &self.cache {
                        if !fields.is_empty() {
                            cache.insert(key, fields.clone());
                        }
                    }
                    return ExtractionResult {
                        fields,
                        provenance: Provenance::Extracted,
                    };
                }
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    let retry_after = match &e {
                        AiError::RateLimited { retry_after } => *retry_after,
                        _ => None,
                    };
                    let wait = self.retry.delay(attempt, retry_after);
                    warn!(
                        title,
                        attempt = attempt + 1,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "Extraction call failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    warn!(title, attempt = attempt + 1, error = %e, "Extraction failed, using empty fields");
                    break;
                }
            }
        }

        ExtractionResult::failed()
    }
}

/// Canonicalize the continent; values outside the known set are dropped.
fn finish(title: &str, mut fields: ExtractedFields) -> ExtractedFields {
    if !fields.continent.is_empty() {
        match Continent::parse(&fields.continent) {
            Some(continent) => fields.continent = continent.as_str().to_string(),
            None => {
                warn!(title, continent = %fields.continent, "Continent outside the known set, dropping");
                fields.continent.clear();
            }
        }
    }
    fields
}

#[async_trait]
impl FieldExtractor for ExtractionClient {
    async fn extract(&self, candidate: &ConferenceCandidate) -> ExtractionResult {
        ExtractionClient::extract(
            self,
            &candidate.title,
            &candidate.location,
            &candidate.description,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCompletion;

    const REPLY: &str = r#"{"Submission Deadline": "2026/01/31", "Submission Fee": "", "Registration Fee": "$400", "Continent": "north america"}"#;

    fn client(script: ScriptedCompletion) -> (Arc<ScriptedCompletion>, ExtractionClient) {
        let script = Arc::new(script);
        let client = ExtractionClient::new(script.clone(), RetryPolicy::immediate(3));
        (script, client)
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0, None), Duration::from_secs(1));
        assert_eq!(policy.delay(1, None), Duration::from_secs(2));
        assert_eq!(policy.delay(3, None), Duration::from_secs(8));
        assert_eq!(policy.delay(10, None), Duration::from_secs(16));
        assert_eq!(policy.delay(0, Some(Duration::from_secs(7))), Duration::from_secs(7));
        assert_eq!(policy.delay(0, Some(Duration::from_secs(90))), Duration::from_secs(16));
    }

    #[tokio::test]
    async fn successful_reply_is_parsed_and_canonicalized() {
        let (script, client) = client(ScriptedCompletion::new().reply(REPLY));
        let result = client.extract("Finance Forum", "Toronto, Canada", "desc").await;
        assert_eq!(result.provenance, Provenance::Extracted);
        assert_eq!(result.fields.submission_deadline, "2026/01/31");
        assert_eq!(result.fields.registration_fee, "$400");
        assert_eq!(result.fields.continent, "North America");
        assert_eq!(script.calls(), 1);
        assert!(script.prompts()[0].contains("Title: Finance Forum"));
    }

    #[tokio::test]
    async fn rate_limits_and_timeouts_are_retried() {
        let (script, client) = client(
            ScriptedCompletion::new()
                .fail(AiError::RateLimited { retry_after: None })
                .fail(AiError::Timeout("slow".into()))
                .reply(REPLY),
        );
        let result = client.extract("Finance Forum", "Toronto", "desc").await;
        assert_eq!(result.provenance, Provenance::Extracted);
        assert_eq!(script.calls(), 3);
    }

    #[tokio::test]
    async fn failure_on_every_attempt_degrades_to_empty_fields() {
        let (script, client) = client(
            ScriptedCompletion::new()
                .fail(AiError::Network("down".into()))
                .fail(AiError::Network("down".into()))
                .fail(AiError::Network("down".into()))
                .reply(REPLY),
        );
        let result = client.extract("Finance Forum", "Toronto", "desc").await;
        assert!(result.is_failed());
        assert!(result.fields.is_empty());
        assert_eq!(script.calls(), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_stop_immediately() {
        let (script, client) = client(
            ScriptedCompletion::new()
                .fail(AiError::Api {
                    status: 401,
                    message: "bad key".into(),
                })
                .reply(REPLY),
        );
        assert!(client.extract("Finance Forum", "Toronto", "desc").await.is_failed());
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test]
    async fn cache_hits_skip_the_service() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ExtractionCache::load(dir.path().join("cache.json"));
        let (script, client) = client(ScriptedCompletion::new().reply(REPLY));
        let client = client.with_cache(cache);

        let first = client.extract("Finance Forum", "Toronto", "desc").await;
        let second = client.extract("Finance Forum", "Toronto", "desc").await;
        assert_eq!(first.provenance, Provenance::Extracted);
        assert_eq!(second.provenance, Provenance::Cached);
        assert_eq!(first.fields, second.fields);
        assert_eq!(script.calls(), 1);
        assert!(client.flush_cache().unwrap());
    }

    #[tokio::test]
    async fn unknown_continents_are_dropped() {
        let (_, client) = client(ScriptedCompletion::new().reply(
            r#"{"Submission Deadline": "", "Submission Fee": "", "Registration Fee": "", "Continent": "Atlantis"}"#,
        ));
        let result = client.extract("Finance Forum", "Somewhere", "desc").await;
        assert_eq!(result.provenance, Provenance::Extracted);
        assert_eq!(result.fields.continent, "");
    }
}
