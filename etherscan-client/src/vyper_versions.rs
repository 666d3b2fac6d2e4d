use crate::ImportError;
use parking_lot::RwLock;
use serde::Deserialize;
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};
use url::Url;

pub const DEFAULT_VYPER_RELEASES_URL: &str = "https://vyper-releases-mirror.hardhat.org/list.json";
const CACHE_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Deserialize)]
struct Release {
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Deserialize)]
struct ReleaseAsset {
    name: String,
}

/// Maps short explorer versions (`vyper:0.3.10`) to canonical release
/// strings (`v0.3.10+commit.91361694`) using the release mirror
/// listing. The listing is cached for an hour; a miss triggers one
/// refresh before giving up.
pub struct VyperVersionCache {
    list_url: Url,
    client: reqwest::Client,
    state: RwLock<Option<CacheState>>,
}

struct CacheState {
    fetched_at: Instant,
    versions: HashMap<String, String>,
}

impl VyperVersionCache {
    pub fn new(list_url: Url) -> Self {
        Self {
            list_url,
            client: reqwest::Client::new(),
            state: RwLock::new(None),
        }
    }

    pub async fn lookup(&self, short_version: &str) -> Result<String, ImportError> {
        if self.is_stale() {
            self.refresh().await?;
        }
        if let Some(found) = self.cached(short_version) {
            return Ok(found);
        }

        // one refresh retry: the release may be newer than the cache
        self.refresh().await?;
        self.cached(short_version)
            .ok_or_else(|| ImportError::VyperVersionMappingFailed(short_version.to_string()))
    }

    /// Drops the cached listing. Intended for tests.
    pub fn reset(&self) {
        *self.state.write() = None;
    }

    fn is_stale(&self) -> bool {
        match self.state.read().as_ref() {
            Some(state) => state.fetched_at.elapsed() > CACHE_TTL,
            None => true,
        }
    }

    fn cached(&self, short_version: &str) -> Option<String> {
        self.state
            .read()
            .as_ref()
            .and_then(|state| state.versions.get(short_version).cloned())
    }

    async fn refresh(&self) -> Result<(), ImportError> {
        let releases: Vec<Release> = self
            .client
            .get(self.list_url.clone())
            .send()
            .await
            .map_err(|err| ImportError::Network(err.to_string()))?
            .error_for_status()
            .map_err(|err| ImportError::Network(err.to_string()))?
            .json()
            .await
            .map_err(|err| ImportError::Network(err.to_string()))?;

        let mut versions = HashMap::new();
        for release in releases {
            for asset in release.assets {
                // asset names look like "vyper.0.3.10+commit.91361694.linux"
                let Some(long_version) = parse_asset_version(&asset.name) else {
                    continue;
                };
                let short = long_version
                    .split('+')
                    .next()
                    .expect("split always yields at least one part")
                    .to_string();
                versions
                    .entry(short)
                    .or_insert_with(|| format!("v{long_version}"));
            }
        }

        *self.state.write() = Some(CacheState {
            fetched_at: Instant::now(),
            versions,
        });
        Ok(())
    }
}

fn parse_asset_version(asset_name: &str) -> Option<String> {
    let rest = asset_name.strip_prefix("vyper.")?;
    let commit_start = rest.find("+commit.")?;
    let commit_end = rest[commit_start + "+commit.".len()..]
        .find('.')
        .map(|offset| commit_start + "+commit.".len() + offset)
        .unwrap_or(rest.len());
    Some(rest[..commit_end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::{
        matchers::method,
        Mock, MockServer, ResponseTemplate,
    };

    #[test]
    fn asset_names_parse_to_long_versions() {
        assert_eq!(
            parse_asset_version("vyper.0.3.10+commit.91361694.linux").as_deref(),
            Some("0.3.10+commit.91361694")
        );
        assert_eq!(
            parse_asset_version("vyper.0.2.16+commit.59e1bdd.darwin").as_deref(),
            Some("0.2.16+commit.59e1bdd")
        );
        assert_eq!(parse_asset_version("not-a-vyper-asset"), None);
    }

    #[tokio::test]
    async fn lookup_maps_short_versions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"assets": [
                    {"name": "vyper.0.3.10+commit.91361694.linux"},
                    {"name": "vyper.0.3.10+commit.91361694.darwin"},
                ]},
                {"assets": [{"name": "vyper.0.2.16+commit.59e1bdd.linux"}]},
            ])))
            .mount(&server)
            .await;

        let cache = VyperVersionCache::new(format!("{}/list.json", server.uri()).parse().unwrap());
        assert_eq!(
            cache.lookup("0.3.10").await.unwrap(),
            "v0.3.10+commit.91361694"
        );
        assert_eq!(
            cache.lookup("0.2.16").await.unwrap(),
            "v0.2.16+commit.59e1bdd"
        );
        // both lookups after the first use the cached listing
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_version_refreshes_once_then_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let cache = VyperVersionCache::new(format!("{}/list.json", server.uri()).parse().unwrap());
        let err = cache.lookup("9.9.9").await.unwrap_err();
        assert!(matches!(err, ImportError::VyperVersionMappingFailed(_)));
        // initial fetch plus the one retry on miss
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }
}
