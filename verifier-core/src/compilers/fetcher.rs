use super::version::DetailedVersion;
use parking_lot::RwLock;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("version {0} is not found in the release list")]
    NotFound(DetailedVersion),
    #[error("checksum mismatch for {version}: expected {expected}, found {found}")]
    Checksum {
        version: DetailedVersion,
        expected: String,
        found: String,
    },
    #[error("fetching release: {0}")]
    Fetch(#[from] reqwest_middleware::Error),
    #[error("reading release response: {0}")]
    Read(#[from] reqwest::Error),
    #[error("parsing release list: {0}")]
    ListParse(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub path: String,
    pub sha256: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct ReleaseList {
    builds: Vec<ReleaseBuild>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseBuild {
    path: String,
    version: String,
    #[serde(default)]
    prerelease: Option<String>,
    build: String,
    sha256: String,
    #[serde(default)]
    long_version: Option<String>,
}

impl ReleaseBuild {
    fn parse(self) -> Result<(DetailedVersion, ReleaseInfo), String> {
        let long_version = match self.long_version {
            Some(long_version) => long_version,
            None => {
                let prerelease = self
                    .prerelease
                    .filter(|p| !p.is_empty())
                    .map(|p| format!("-{p}"))
                    .unwrap_or_default();
                format!("{}{}+{}", self.version, prerelease, self.build)
            }
        };
        let version: DetailedVersion = long_version
            .parse()
            .map_err(|err| format!("build {}: {err}", self.path))?;
        let sha256 = hex::decode(self.sha256.trim_start_matches("0x"))
            .map_err(|err| format!("build {}: invalid sha256: {err}", self.path))?;
        Ok((
            version,
            ReleaseInfo {
                path: self.path,
                sha256,
            },
        ))
    }
}

/// Keeps the compiler release list of a single mirror in memory and
/// refreshes it on a fixed schedule, so version resolution never has
/// to touch the network on the hot path.
pub struct ListFetcher {
    list_url: Url,
    client: ClientWithMiddleware,
    releases: RwLock<BTreeMap<DetailedVersion, ReleaseInfo>>,
}

impl ListFetcher {
    pub async fn new(
        list_url: Url,
        refresh_period: Option<Duration>,
    ) -> Result<Arc<Self>, FetchError> {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client = reqwest_middleware::ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        let fetcher = Arc::new(Self {
            list_url,
            client,
            releases: RwLock::new(BTreeMap::new()),
        });
        fetcher.refresh().await?;

        if let Some(period) = refresh_period {
            let weak = Arc::downgrade(&fetcher);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(period).await;
                    let Some(fetcher) = weak.upgrade() else {
                        break;
                    };
                    if let Err(err) = fetcher.refresh().await {
                        tracing::warn!(list_url = %fetcher.list_url, "release list refresh failed: {err:#}");
                    }
                }
            });
        }

        Ok(fetcher)
    }

    pub async fn refresh(&self) -> Result<(), FetchError> {
        let list: ReleaseList = self
            .client
            .get(self.list_url.clone())
            .send()
            .await?
            .error_for_status()
            .map_err(FetchError::Read)?
            .json()
            .await
            .map_err(FetchError::Read)?;

        let mut releases = BTreeMap::new();
        for build in list.builds {
            match build.parse() {
                Ok((version, info)) => {
                    releases.insert(version, info);
                }
                Err(err) => tracing::warn!("skipping malformed release entry: {err}"),
            }
        }
        if releases.is_empty() {
            return Err(FetchError::ListParse(format!(
                "release list {} contains no valid builds",
                self.list_url
            )));
        }

        *self.releases.write() = releases;
        Ok(())
    }

    pub fn all_versions(&self) -> Vec<DetailedVersion> {
        self.releases.read().keys().cloned().collect()
    }

    pub fn release(&self, version: &DetailedVersion) -> Option<ReleaseInfo> {
        self.releases.read().get(version).cloned()
    }

    pub async fn download(&self, version: &DetailedVersion) -> Result<bytes::Bytes, FetchError> {
        let release = self
            .release(version)
            .ok_or_else(|| FetchError::NotFound(version.clone()))?;
        let url = self
            .list_url
            .join(&release.path)
            .map_err(|err| FetchError::ListParse(err.to_string()))?;
        let bytes = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()
            .map_err(FetchError::Read)?
            .bytes()
            .await
            .map_err(FetchError::Read)?;

        let found = Sha256::digest(&bytes);
        if found.as_slice() != release.sha256 {
            return Err(FetchError::Checksum {
                version: version.clone(),
                expected: hex::encode(&release.sha256),
                found: hex::encode(found),
            });
        }
        Ok(bytes)
    }
}

/// On-disk compiler binary cache. Downloads go through a per-version
/// async lock so concurrent workers fetch each release exactly once,
/// and land via temp-file + rename so a crashed download never leaves
/// a truncated executable behind.
pub struct DownloadCache {
    repo_dir: PathBuf,
    locks: parking_lot::Mutex<HashMap<DetailedVersion, Arc<tokio::sync::Mutex<()>>>>,
}

impl DownloadCache {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            locks: Default::default(),
        }
    }

    pub async fn get(
        &self,
        fetcher: &ListFetcher,
        version: &DetailedVersion,
    ) -> Result<PathBuf, FetchError> {
        let path = self.binary_path(version);
        if tokio::fs::try_exists(&path).await? {
            return Ok(path);
        }

        let lock = self
            .locks
            .lock()
            .entry(version.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if tokio::fs::try_exists(&path).await? {
            return Ok(path);
        }

        let bytes = fetcher.download(version).await?;
        let parent = path
            .parent()
            .expect("binary path always has the repo dir as parent");
        tokio::fs::create_dir_all(parent).await?;

        let tmp_path = path.with_extension("part");
        tokio::fs::write(&tmp_path, &bytes).await?;
        Self::make_executable(&tmp_path).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        tracing::info!(version = %version, path = %path.display(), "compiler binary fetched");
        Ok(path)
    }

    fn binary_path(&self, version: &DetailedVersion) -> PathBuf {
        self.repo_dir.join(version.to_string()).join("compiler")
    }

    #[cfg(unix)]
    async fn make_executable(path: &Path) -> Result<(), std::io::Error> {
        use std::os::unix::fs::PermissionsExt;
        let mut permissions = tokio::fs::metadata(path).await?.permissions();
        permissions.set_mode(0o755);
        tokio::fs::set_permissions(path, permissions).await
    }

    #[cfg(not(unix))]
    async fn make_executable(_path: &Path) -> Result<(), std::io::Error> {
        Ok(())
    }
}
