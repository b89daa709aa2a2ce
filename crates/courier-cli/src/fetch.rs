//! Manifest acquisition.
//!
//! A manifest comes either from the web service or from a local JSON
//! file. The service contract is a POST whose body carries the `remote`
//! and `path` query parameters of the manifest URL, with an optional
//! bearer token; responses may wrap the manifest in an envelope with a
//! `success` flag.

use std::path::Path;

use anyhow::{Context, bail};
use serde_json::json;

use courier_core::Manifest;

/// Load a manifest from a URL or a local file path.
pub async fn load_manifest(source: &str, token: Option<&str>) -> anyhow::Result<Manifest> {
    if source.starts_with("https://") || source.starts_with("http://") {
        fetch_manifest(source, token).await
    } else {
        read_manifest_file(Path::new(source)).await
    }
}

/// Fetch a manifest from the web service.
///
/// The `remote` and `path` query parameters of `url` become the JSON
/// POST body; the request itself goes to the URL without its query.
pub async fn fetch_manifest(url: &str, token: Option<&str>) -> anyhow::Result<Manifest> {
    let mut parsed = reqwest::Url::parse(url).with_context(|| format!("invalid manifest URL {url}"))?;
    let body = request_body(&parsed);
    parsed.set_query(None);

    let client = reqwest::Client::new();
    let mut request = client.post(parsed).json(&body);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }

    let response = request
        .send()
        .await
        .with_context(|| format!("failed to reach manifest service at {url}"))?;

    let status = response.status();
    if !status.is_success() {
        bail!("manifest service returned HTTP {status}");
    }

    let body: serde_json::Value = response
        .json()
        .await
        .context("manifest response is not valid JSON")?;

    Ok(Manifest::from_value(unwrap_envelope(body)?)?)
}

async fn read_manifest_file(path: &Path) -> anyhow::Result<Manifest> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read manifest file {}", path.display()))?;
    Ok(Manifest::from_json(&raw)?)
}

/// Build the `{remote, path}` POST body from the URL's query parameters.
/// Absent parameters are sent as null, matching what the service expects.
fn request_body(url: &reqwest::Url) -> serde_json::Value {
    let mut remote = None;
    let mut path = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "remote" => remote = Some(value.into_owned()),
            "path" => path = Some(value.into_owned()),
            _ => {}
        }
    }
    json!({ "remote": remote, "path": path })
}

/// Peel a `{ success, manifest, error }` service envelope when present.
fn unwrap_envelope(body: serde_json::Value) -> anyhow::Result<serde_json::Value> {
    let Some(obj) = body.as_object() else {
        return Ok(body);
    };

    if let Some(success) = obj.get("success").and_then(serde_json::Value::as_bool) {
        if !success {
            let message = obj
                .get("error")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("service reported failure");
            bail!("manifest service refused the request: {message}");
        }
        if let Some(manifest) = obj.get("manifest") {
            return Ok(manifest.clone());
        }
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_from_query_params() {
        let url =
            reqwest::Url::parse("https://svc/api/manifest?remote=gdrive&path=games%2Fpkg").unwrap();
        let body = request_body(&url);
        assert_eq!(body["remote"], "gdrive");
        assert_eq!(body["path"], "games/pkg");
    }

    #[test]
    fn test_request_body_with_missing_params_is_null() {
        let url = reqwest::Url::parse("https://svc/api/manifest").unwrap();
        let body = request_body(&url);
        assert!(body["remote"].is_null());
        assert!(body["path"].is_null());
    }

    #[test]
    fn test_envelope_unwrapped() {
        let body = json!({
            "success": true,
            "manifest": {"url": "https://h/f", "name": "f", "size": 1}
        });
        let value = unwrap_envelope(body).unwrap();
        assert_eq!(value["name"], "f");
    }

    #[test]
    fn test_envelope_failure_rejected() {
        let body = json!({"success": false, "error": "no such package"});
        let err = unwrap_envelope(body).unwrap_err();
        assert!(err.to_string().contains("no such package"));
    }

    #[test]
    fn test_bare_manifest_passes_through() {
        let body = json!({"url": "https://h/f", "name": "f"});
        let value = unwrap_envelope(body).unwrap();
        assert_eq!(value["url"], "https://h/f");
    }

    #[tokio::test]
    async fn test_local_file_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        tokio::fs::write(&path, r#"{"url": "https://h/f.7z", "name": "f.7z", "size": 9}"#)
            .await
            .unwrap();

        let manifest = load_manifest(path.to_str().unwrap(), None).await.unwrap();
        assert_eq!(manifest.name, "f.7z");
        assert_eq!(manifest.total_bytes, 9);
    }
}
