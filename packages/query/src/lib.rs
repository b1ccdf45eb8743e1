#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Query composer (C9): builds the autocomplete query document and
//! turns the backend's raw response into a ranked, paginated result
//! set.
//!
//! Grounded on `geocoder_index::query::build_geocode_query` (a
//! cascading query builder combining several match strategies with
//! boosts), generalized here to produce the *backend-agnostic query
//! document* — a plain [`serde_json::Value`] shaped for the external
//! full-text backend's bulk/search JSON API — rather than an in-process
//! Tantivy query, since standing up the backend itself is out of scope
//! and [`addresskit_index::SearchBackend::search`] already takes an
//! opaque query `Value`.

use addresskit_index::{BulkError, SearchBackend};
use addresskit_models::{SearchHit, SearchResults};

/// Page numbers are clamped to `[1, MAX_PAGE_NUMBER]`.
pub const MAX_PAGE_NUMBER: u32 = 10_000;

/// Page sizes are clamped to `[1, MAX_PAGE_SIZE]`.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Default page size, overridable by the `PAGE_SIZE` configuration key.
pub const DEFAULT_PAGE_SIZE: u32 = 8;

/// The fields the autocomplete query matches against.
const MATCH_FIELDS: [&str; 2] = ["sla", "ssla"];

/// Sort tiebreakers applied after backend relevance score, in order:
/// confidence descending, then `ssla.raw`/`sla.raw` ascending.
const SORT_CLAUSES: &str = r#"[
  { "_score": "desc" },
  { "structured.structured.confidence": "desc" },
  { "ssla.raw": "asc" },
  { "sla.raw": "asc" }
]"#;

/// Errors composing or executing a query.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Backend(#[from] BulkError),

    #[error("backend response missing expected field: {0}")]
    MalformedResponse(&'static str),
}

/// Clamps `page` (1-indexed) into `[1, MAX_PAGE_NUMBER]`.
#[must_use]
pub const fn clamp_page(page: i64) -> u32 {
    if page < 1 {
        1
    } else if page as u64 > MAX_PAGE_NUMBER as u64 {
        MAX_PAGE_NUMBER
    } else {
        page as u32
    }
}

/// Clamps `page_size` into `[1, MAX_PAGE_SIZE]`.
#[must_use]
pub const fn clamp_page_size(page_size: i64) -> u32 {
    if page_size < 1 {
        1
    } else if page_size as u64 > MAX_PAGE_SIZE as u64 {
        MAX_PAGE_SIZE
    } else {
        page_size as u32
    }
}

/// The zero-indexed offset into the result set for `page`/`page_size`
/// (both already clamped).
#[must_use]
pub const fn offset_for(page: u32, page_size: u32) -> u32 {
    (page - 1) * page_size
}

/// Builds the autocomplete query document: a boolean `should` of two
/// multi-match sub-queries against `sla`/`ssla` — `bool_prefix` with
/// `fuzziness=AUTO` for typo tolerance, and `phrase_prefix` for a
/// strict prefix match of the last phrase — plus the sort and
/// pagination clauses.
#[must_use]
pub fn build_query(q: &str, page: i64, page_size: i64) -> serde_json::Value {
    let page = clamp_page(page);
    let page_size = clamp_page_size(page_size);
    let offset = offset_for(page, page_size);

    serde_json::json!({
        "query": {
            "bool": {
                "should": [
                    {
                        "multi_match": {
                            "query": q,
                            "type": "bool_prefix",
                            "fields": MATCH_FIELDS,
                            "fuzziness": "AUTO",
                            "operator": "AND",
                            "lenient": true,
                            "auto_generate_synonyms_phrase_query": false
                        }
                    },
                    {
                        "multi_match": {
                            "query": q,
                            "type": "phrase_prefix",
                            "fields": MATCH_FIELDS,
                            "operator": "AND",
                            "lenient": true,
                            "auto_generate_synonyms_phrase_query": false
                        }
                    }
                ]
            }
        },
        "sort": serde_json::from_str::<serde_json::Value>(SORT_CLAUSES).unwrap_or_default(),
        "from": offset,
        "size": page_size
    })
}

/// Executes the autocomplete query against `backend` and maps its raw
/// response into a ranked, paginated [`SearchResults`].
///
/// # Errors
///
/// Returns [`QueryError::Backend`] if the backend request fails, or
/// [`QueryError::MalformedResponse`] if the response doesn't carry the
/// expected `hits.hits`/`hits.total.value` shape.
pub async fn search(
    backend: &dyn SearchBackend,
    q: &str,
    page: i64,
    page_size: i64,
) -> Result<SearchResults, QueryError> {
    let query = build_query(q, page, page_size);
    let response = backend.search(&query).await?;
    parse_response(&response)
}

fn parse_response(response: &serde_json::Value) -> Result<SearchResults, QueryError> {
    let hits_obj = response
        .get("hits")
        .ok_or(QueryError::MalformedResponse("hits"))?;

    let total = hits_obj
        .get("total")
        .and_then(|t| t.get("value").or(Some(t)))
        .and_then(serde_json::Value::as_u64)
        .ok_or(QueryError::MalformedResponse("hits.total.value"))?;

    let hits = hits_obj
        .get("hits")
        .and_then(serde_json::Value::as_array)
        .ok_or(QueryError::MalformedResponse("hits.hits"))?;

    let items = hits
        .iter()
        .filter_map(|hit| {
            let pid = hit.get("_source")?.get("pid")?.as_str()?.to_string();
            let sla = hit.get("_source")?.get("sla")?.as_str()?.to_string();
            let score = hit.get("_score").and_then(serde_json::Value::as_f64).unwrap_or(0.0);
            #[allow(clippy::cast_possible_truncation)]
            Some(SearchHit {
                pid,
                sla,
                score: score as f32,
            })
        })
        .collect();

    Ok(SearchResults { items, total })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_and_page_size_clamp_into_bounds() {
        assert_eq!(clamp_page(0), 1);
        assert_eq!(clamp_page(-5), 1);
        assert_eq!(clamp_page(5), 5);
        assert_eq!(clamp_page(i64::from(MAX_PAGE_NUMBER) + 10), MAX_PAGE_NUMBER);

        assert_eq!(clamp_page_size(0), 1);
        assert_eq!(clamp_page_size(8), 8);
        assert_eq!(clamp_page_size(i64::from(MAX_PAGE_SIZE) + 10), MAX_PAGE_SIZE);
    }

    #[test]
    fn offset_is_zero_indexed_from_one_indexed_page() {
        assert_eq!(offset_for(1, 8), 0);
        assert_eq!(offset_for(2, 8), 8);
        assert_eq!(offset_for(3, 10), 20);
    }

    #[test]
    fn built_query_carries_both_multi_match_strategies_and_pagination() {
        let query = build_query("300 barangaroo", 2, 8);
        let should = query["query"]["bool"]["should"].as_array().unwrap();
        assert_eq!(should.len(), 2);
        assert_eq!(should[0]["multi_match"]["type"], "bool_prefix");
        assert_eq!(should[1]["multi_match"]["type"], "phrase_prefix");
        assert_eq!(query["from"], 8);
        assert_eq!(query["size"], 8);
    }

    #[test]
    fn parses_a_typical_backend_response() {
        let response = serde_json::json!({
            "hits": {
                "total": { "value": 2 },
                "hits": [
                    { "_score": 9.1, "_source": { "pid": "GANSW1", "sla": "A" } },
                    { "_score": 9.1, "_source": { "pid": "GANSW2", "sla": "B" } }
                ]
            }
        });

        let results = parse_response(&response).unwrap();
        assert_eq!(results.total, 2);
        assert_eq!(results.items.len(), 2);
        assert_eq!(results.items[0].pid, "GANSW1");
    }

    #[test]
    fn missing_hits_field_is_a_malformed_response_error() {
        let response = serde_json::json!({});
        let err = parse_response(&response).unwrap_err();
        assert!(matches!(err, QueryError::MalformedResponse("hits")));
    }
}
