#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Bulk index sink: a backend-agnostic trait plus one HTTP implementation,
//! and the retry loop that resubmits a whole batch on any failure.
//!
//! Grounded on `CrimeSource` (`packages/source/src/lib.rs`): a
//! `Send + Sync` `#[async_trait]` trait with its own error enum,
//! implemented once per backend. Standing up the indexing backend
//! itself is out of scope, so only the submission contract and one
//! HTTP-based implementation are provided here.

use addresskit_models::{AuthorityCode, ProgressCallback};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Errors from a [`SearchBackend`] operation.
#[derive(Debug, thiserror::Error)]
pub enum BulkError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("response body was not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("backend returned {status}: {body}")]
    Backend { status: u16, body: String },
}

/// The outcome of one bulk submission: how many documents succeeded,
/// and the ids of any that the backend rejected individually.
#[derive(Debug, Clone, Default)]
pub struct BulkOutcome {
    pub succeeded: usize,
    pub failed_ids: Vec<String>,
}

impl BulkOutcome {
    #[must_use]
    pub fn is_complete_success(&self) -> bool {
        self.failed_ids.is_empty()
    }
}

/// A backend capable of indexing, fetching, and searching address
/// documents. Implementations are free to target any search engine; the
/// orchestrator and query composer depend only on this trait.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Submits a batch of `(document_id, body)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`BulkError`] if the request itself fails. Per-item
    /// rejections are reported in the returned [`BulkOutcome`], not as
    /// an `Err`.
    async fn bulk_index(&self, docs: &[(String, serde_json::Value)]) -> Result<BulkOutcome, BulkError>;

    /// Fetches a single document by id, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`BulkError`] on request failure.
    async fn get(&self, document_id: &str) -> Result<Option<serde_json::Value>, BulkError>;

    /// Executes a backend-native query document, returning its raw response.
    ///
    /// # Errors
    ///
    /// Returns [`BulkError`] on request failure.
    async fn search(&self, query: &serde_json::Value) -> Result<serde_json::Value, BulkError>;

    /// Forces pending writes to become visible to subsequent searches.
    ///
    /// Refresh is lazy by default (the backend's own interval governs
    /// visibility); the orchestrator calls this explicitly once at the
    /// end of a load.
    ///
    /// # Errors
    ///
    /// Returns [`BulkError`] on request failure.
    async fn refresh(&self) -> Result<(), BulkError>;

    /// Creates the backing index, if it does not already exist.
    ///
    /// `synonyms` is the deduplicated street-type/flat-type/level-type/
    /// street-suffix code→name list from [`addresskit_authority`],
    /// wired into the backend's synonym-expansion analyser so a query for
    /// "avenue" also matches documents rendered with the raw code "AV".
    ///
    /// # Errors
    ///
    /// Returns [`BulkError`] on request failure.
    async fn create_index(&self, synonyms: &[AuthorityCode]) -> Result<(), BulkError>;

    /// Drops the backing index entirely, for a clean rebuild.
    ///
    /// # Errors
    ///
    /// Returns [`BulkError`] on request failure.
    async fn drop_index(&self) -> Result<(), BulkError>;
}

/// An HTTP-based [`SearchBackend`] speaking a bulk NDJSON-style protocol
/// (Elasticsearch/OpenSearch-compatible).
pub struct HttpSearchBackend {
    client: reqwest::Client,
    base_url: String,
    index_name: String,
}

impl HttpSearchBackend {
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, index_name: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            index_name: index_name.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}{path}", self.base_url.trim_end_matches('/'), self.index_name)
    }
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    async fn bulk_index(&self, docs: &[(String, serde_json::Value)]) -> Result<BulkOutcome, BulkError> {
        let mut body = String::new();
        for (id, doc) in docs {
            body.push_str(&serde_json::to_string(&serde_json::json!({
                "index": { "_id": id }
            }))?);
            body.push('\n');
            body.push_str(&serde_json::to_string(doc)?);
            body.push('\n');
        }

        let response = self
            .client
            .post(self.url("/_bulk"))
            .header("content-type", "application/x-ndjson")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BulkError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: serde_json::Value = response.json().await?;
        let mut outcome = BulkOutcome::default();

        if let Some(items) = parsed.get("items").and_then(|v| v.as_array()) {
            for item in items {
                let Some(action) = item.get("index") else { continue };
                let id = action.get("_id").and_then(|v| v.as_str()).unwrap_or_default();
                let failed = action
                    .get("error")
                    .is_some_and(|e| !e.is_null());
                if failed {
                    outcome.failed_ids.push(id.to_string());
                } else {
                    outcome.succeeded += 1;
                }
            }
        } else {
            outcome.succeeded = docs.len();
        }

        Ok(outcome)
    }

    async fn get(&self, document_id: &str) -> Result<Option<serde_json::Value>, BulkError> {
        let response = self.client.get(self.url(&format!("/_doc/{document_id}"))).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BulkError::Backend { status, body });
        }
        Ok(Some(response.json().await?))
    }

    async fn search(&self, query: &serde_json::Value) -> Result<serde_json::Value, BulkError> {
        let response = self.client.post(self.url("/_search")).json(query).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BulkError::Backend { status, body });
        }
        Ok(response.json().await?)
    }

    async fn refresh(&self) -> Result<(), BulkError> {
        let response = self.client.post(self.url("/_refresh")).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BulkError::Backend { status, body });
        }
        Ok(())
    }

    async fn create_index(&self, synonyms: &[AuthorityCode]) -> Result<(), BulkError> {
        let synonym_rules: Vec<String> = synonyms
            .iter()
            .map(|s| format!("{} => {}", s.code, s.name))
            .collect();

        let body = serde_json::json!({
            "settings": {
                "analysis": {
                    "filter": {
                        "gnaf_synonyms": {
                            "type": "synonym",
                            "synonyms": synonym_rules,
                        }
                    }
                }
            }
        });

        let response = self.client.put(self.url("")).json(&body).send().await?;
        if !response.status().is_success() && response.status() != reqwest::StatusCode::BAD_REQUEST {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BulkError::Backend { status, body });
        }
        Ok(())
    }

    async fn drop_index(&self) -> Result<(), BulkError> {
        let response = self.client.delete(self.url("")).send().await?;
        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BulkError::Backend { status, body });
        }
        Ok(())
    }
}

/// Backoff schedule for retrying a failed (or partially failed) bulk
/// submission. Growth is linear rather than multiplicative: each
/// attempt adds `increment` to the prior delay, capped at `cap`. There
/// is no attempt ceiling by default — a load is expected to eventually
/// succeed once the backend recovers.
#[derive(Debug, Clone, Copy)]
pub struct BulkRetryPolicy {
    pub initial: Duration,
    pub increment: Duration,
    pub cap: Duration,
    /// `None` retries forever; `Some(n)` gives up after `n` attempts.
    pub max_attempts: Option<u32>,
}

impl Default for BulkRetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(30),
            increment: Duration::from_secs(30),
            cap: Duration::from_secs(600),
            max_attempts: None,
        }
    }
}

impl BulkRetryPolicy {
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let grown = self.initial + self.increment * attempt;
        grown.min(self.cap)
    }
}

/// Errors from [`submit_with_retry`]: only raised once `max_attempts` is
/// exhausted, since the policy otherwise retries indefinitely.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("bulk submission did not succeed within {attempts} attempts: {source}")]
    Exhausted { attempts: u32, source: BulkError },

    #[error("bulk submission did not succeed within {attempts} attempts: {failed} documents still rejected")]
    ExhaustedWithRejections { attempts: u32, failed: usize },
}

/// Submits `docs` to `backend`, retrying the entire batch whenever the
/// request fails outright or the backend rejects any individual
/// document, until every document succeeds (or `policy.max_attempts` is
/// exhausted).
///
/// # Errors
///
/// Returns [`SubmitError`] only when `policy.max_attempts` is set and
/// exhausted; with the default unbounded policy this never returns an
/// error short of the process being interrupted.
pub async fn submit_with_retry(
    backend: &dyn SearchBackend,
    docs: &[(String, serde_json::Value)],
    policy: &BulkRetryPolicy,
    progress: &dyn ProgressCallback,
) -> Result<(), SubmitError> {
    let mut attempt: u32 = 0;
    let pending: Vec<(String, serde_json::Value)> = docs.to_vec();

    loop {
        match backend.bulk_index(&pending).await {
            Ok(outcome) if outcome.is_complete_success() => {
                progress.inc(outcome.succeeded as u64);
                return Ok(());
            }
            Ok(outcome) => {
                log::warn!(
                    "bulk submission: {} of {} documents rejected, retrying the entire batch (attempt {attempt})",
                    outcome.failed_ids.len(),
                    pending.len()
                );
                if let Some(max) = policy.max_attempts {
                    if attempt + 1 >= max {
                        return Err(SubmitError::ExhaustedWithRejections {
                            attempts: attempt + 1,
                            failed: outcome.failed_ids.len(),
                        });
                    }
                }
            }
            Err(e) => {
                log::warn!("bulk submission failed (attempt {attempt}): {e}");
                if let Some(max) = policy.max_attempts {
                    if attempt + 1 >= max {
                        return Err(SubmitError::Exhausted {
                            attempts: attempt + 1,
                            source: e,
                        });
                    }
                }
            }
        }

        tokio::time::sleep(policy.delay_for(attempt)).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use addresskit_models::NullProgress;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyBackend {
        call_count: AtomicUsize,
        fail_until_attempt: usize,
    }

    #[async_trait]
    impl SearchBackend for FlakyBackend {
        async fn bulk_index(&self, docs: &[(String, serde_json::Value)]) -> Result<BulkOutcome, BulkError> {
            let call = self.call_count.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_until_attempt {
                return Ok(BulkOutcome {
                    succeeded: 0,
                    failed_ids: docs.iter().map(|(id, _)| id.clone()).collect(),
                });
            }
            Ok(BulkOutcome {
                succeeded: docs.len(),
                failed_ids: vec![],
            })
        }

        async fn get(&self, _document_id: &str) -> Result<Option<serde_json::Value>, BulkError> {
            Ok(None)
        }

        async fn search(&self, _query: &serde_json::Value) -> Result<serde_json::Value, BulkError> {
            Ok(serde_json::json!({}))
        }

        async fn refresh(&self) -> Result<(), BulkError> {
            Ok(())
        }

        async fn create_index(&self, _synonyms: &[AuthorityCode]) -> Result<(), BulkError> {
            Ok(())
        }

        async fn drop_index(&self) -> Result<(), BulkError> {
            Ok(())
        }
    }

    #[test]
    fn delay_grows_linearly_then_caps() {
        let policy = BulkRetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(30));
        assert_eq!(policy.delay_for(1), Duration::from_secs(60));
        assert_eq!(policy.delay_for(19), Duration::from_secs(600));
        assert_eq!(policy.delay_for(100), Duration::from_secs(600));
    }

    #[tokio::test]
    async fn retries_the_whole_batch_until_every_document_succeeds() {
        let backend = FlakyBackend {
            call_count: AtomicUsize::new(0),
            fail_until_attempt: 2,
        };
        let policy = BulkRetryPolicy {
            initial: Duration::from_millis(1),
            increment: Duration::from_millis(1),
            cap: Duration::from_millis(5),
            max_attempts: Some(10),
        };
        let docs = vec![
            ("a".to_string(), serde_json::json!({"sla": "A"})),
            ("b".to_string(), serde_json::json!({"sla": "B"})),
        ];

        submit_with_retry(&backend, &docs, &policy, &NullProgress).await.unwrap();
        assert_eq!(backend.call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausting_max_attempts_on_persistent_rejection_is_an_error() {
        let backend = FlakyBackend {
            call_count: AtomicUsize::new(0),
            fail_until_attempt: 100,
        };
        let policy = BulkRetryPolicy {
            initial: Duration::from_millis(1),
            increment: Duration::from_millis(1),
            cap: Duration::from_millis(2),
            max_attempts: Some(3),
        };
        let docs = vec![("a".to_string(), serde_json::json!({"sla": "A"}))];

        let err = submit_with_retry(&backend, &docs, &policy, &NullProgress).await.unwrap_err();
        assert!(matches!(err, SubmitError::ExhaustedWithRejections { attempts: 3, .. }));
    }
}
