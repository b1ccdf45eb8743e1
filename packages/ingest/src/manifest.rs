//! Parses the package manifest body into the archive resource to fetch.
//!
//! Shape: `{ result: { resources: [{ state, mimetype, url, size }, …] } }`.
//! The first resource with `state = "active"` and
//! `mimetype = "application/zip"` is selected.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ManifestBody {
    result: ManifestResult,
}

#[derive(Debug, Deserialize)]
struct ManifestResult {
    resources: Vec<ManifestResourceRaw>,
}

#[derive(Debug, Deserialize)]
struct ManifestResourceRaw {
    state: String,
    mimetype: Option<String>,
    url: String,
    size: Option<u64>,
}

/// The selected archive resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestResource {
    pub url: String,
    pub size: Option<u64>,
}

/// Selects the first `state = "active"`, `mimetype = "application/zip"`
/// resource from a raw manifest JSON body.
#[must_use]
pub fn select_active_zip_resource(body: &str) -> Option<ManifestResource> {
    let parsed: ManifestBody = serde_json::from_str(body).ok()?;
    parsed
        .result
        .resources
        .into_iter()
        .find(|r| r.state == "active" && r.mimetype.as_deref() == Some("application/zip"))
        .map(|r| ManifestResource { url: r.url, size: r.size })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_the_first_active_zip_resource() {
        let body = serde_json::json!({
            "result": {
                "resources": [
                    { "state": "active", "mimetype": "text/csv", "url": "https://example.org/a.csv", "size": 10 },
                    { "state": "deleted", "mimetype": "application/zip", "url": "https://example.org/old.zip", "size": 1 },
                    { "state": "active", "mimetype": "application/zip", "url": "https://example.org/gnaf.zip", "size": 123 }
                ]
            }
        })
        .to_string();

        let resource = select_active_zip_resource(&body).unwrap();
        assert_eq!(resource.url, "https://example.org/gnaf.zip");
        assert_eq!(resource.size, Some(123));
    }

    #[test]
    fn no_matching_resource_is_none() {
        let body = serde_json::json!({ "result": { "resources": [] } }).to_string();
        assert!(select_active_zip_resource(&body).is_none());
    }
}
