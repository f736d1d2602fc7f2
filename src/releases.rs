//! Supported release lines published on the documentation site.

use indexmap::IndexMap;
use log::debug;
use serde::Deserialize;
use std::cmp::Ordering;
use std::time::Duration;

use crate::error::{BotError, Result};

const VERSIONS_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct Versions {
    #[serde(default)]
    releases: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    lts: Vec<String>,
}

/// Compare `major.minor[.x]` versions numerically, newest first.
fn newest_first(a: &str, b: &str) -> Ordering {
    let parts = |v: &str| -> Vec<u64> {
        v.trim_end_matches(".x")
            .split('.')
            .map(|p| p.parse().unwrap_or(0))
            .collect()
    };
    parts(b).cmp(&parts(a)).then_with(|| b.cmp(a))
}

/// Release branches from a `versions.json` document: the LTS branches, led
/// by the newest release when that one is not an LTS.
pub fn release_branches(document: &str) -> Result<Vec<String>> {
    let versions: Versions = serde_json::from_str(document)?;
    if versions.lts.is_empty() {
        return Err(BotError::EmptyLtsList);
    }
    let lts: Vec<String> = versions.lts.iter().map(|v| format!("{v}.x")).collect();

    let mut releases: Vec<String> = versions.releases.keys().map(|v| format!("{v}.x")).collect();
    releases.sort_by(|a, b| newest_first(a, b));

    match releases.first() {
        Some(latest) if *latest != lts[0] => {
            let mut branches = Vec::with_capacity(lts.len() + 1);
            branches.push(latest.clone());
            branches.extend(lts);
            Ok(branches)
        }
        _ => Ok(lts),
    }
}

/// Fetch the release branches from the versions endpoint.
pub async fn latest_release_branches(url: &str) -> Result<Vec<String>> {
    let client = reqwest::Client::builder()
        .timeout(VERSIONS_TIMEOUT)
        .build()
        .map_err(|e| BotError::Config(format!("Failed to create HTTP client: {e}")))?;
    let response = client.get(url).send().await?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(BotError::Api {
            status: status.as_u16(),
            message: body,
        });
    }
    let branches = release_branches(&body)?;
    debug!("Release branches from {url}: {branches:?}");
    Ok(branches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lts_only_when_newest_release_is_lts() {
        let doc = r#"{"releases": {"3.0": {}, "3.3": {}, "2.6": {}}, "lts": ["3.3", "3.0"]}"#;
        assert_eq!(release_branches(doc).unwrap(), vec!["3.3.x", "3.0.x"]);
    }

    #[test]
    fn test_newer_release_is_prepended() {
        let doc = r#"{"releases": {"3.3": {}, "3.4": {}, "3.0": {}}, "lts": ["3.3", "3.0"]}"#;
        assert_eq!(
            release_branches(doc).unwrap(),
            vec!["3.4.x", "3.3.x", "3.0.x"]
        );
    }

    #[test]
    fn test_versions_sort_numerically() {
        let doc = r#"{"releases": {"3.9": {}, "3.10": {}}, "lts": ["3.9"]}"#;
        assert_eq!(release_branches(doc).unwrap(), vec!["3.10.x", "3.9.x"]);
    }

    #[test]
    fn test_no_releases_returns_lts() {
        let doc = r#"{"lts": ["3.3"]}"#;
        assert_eq!(release_branches(doc).unwrap(), vec!["3.3.x"]);
    }

    #[test]
    fn test_empty_lts_is_an_error() {
        let doc = r#"{"releases": {"3.3": {}}, "lts": []}"#;
        assert!(matches!(release_branches(doc), Err(BotError::EmptyLtsList)));
    }

    #[tokio::test]
    async fn test_fetch_from_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/releases/versions.json")
            .with_status(200)
            .with_body(r#"{"releases": {"3.7": {}, "3.6": {}}, "lts": ["3.6"]}"#)
            .create_async()
            .await;

        let branches = latest_release_branches(&format!("{}/releases/versions.json", server.url()))
            .await
            .unwrap();
        assert_eq!(branches, vec!["3.7.x", "3.6.x"]);
    }

    #[tokio::test]
    async fn test_endpoint_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/versions.json")
            .with_status(503)
            .create_async()
            .await;

        let err = latest_release_branches(&format!("{}/versions.json", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::Api { status: 503, .. }));
    }
}
