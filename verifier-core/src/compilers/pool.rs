use super::{
    fetcher::{DownloadCache, FetchError, ListFetcher},
    version::DetailedVersion,
};
use crate::standard_json::{CompilerInput, CompilerOutput};
use std::{path::PathBuf, process::Stdio, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{io::AsyncWriteExt, process::Command, sync::Semaphore};

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("compiler version {0} is not found in the release list")]
    VersionNotFound(DetailedVersion),
    #[error("emscripten builds are not configured for this pool")]
    EmscriptenNotConfigured,
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("compiler run timed out after {0:?}")]
    Timeout(Duration),
    #[error("spawning compiler subprocess: {0}")]
    Io(#[from] std::io::Error),
    #[error("compiler produced unparsable output: {details}")]
    OutputParse { details: String },
}

struct CompilerRepo {
    fetcher: Arc<ListFetcher>,
    cache: DownloadCache,
    // emscripten builds are js bundles executed through node
    run_with_node: bool,
}

impl CompilerRepo {
    async fn resolve(&self, version: &DetailedVersion) -> Result<PathBuf, CompileError> {
        if self.fetcher.release(version).is_none() {
            return Err(CompileError::VersionNotFound(version.clone()));
        }
        Ok(self.cache.get(&self.fetcher, version).await?)
    }
}

/// A shared pool of compiler binaries. Resolution downloads and caches
/// the release on first use; invocation feeds the standard JSON input
/// through stdin and parses stdout, with a hard deadline after which
/// the subprocess is killed.
pub struct CompilersPool {
    native: CompilerRepo,
    emscripten: Option<CompilerRepo>,
    threads_semaphore: Arc<Semaphore>,
    compile_timeout: Duration,
}

impl CompilersPool {
    pub fn new(
        fetcher: Arc<ListFetcher>,
        repo_dir: impl Into<PathBuf>,
        threads_semaphore: Arc<Semaphore>,
    ) -> Self {
        Self {
            native: CompilerRepo {
                fetcher,
                cache: DownloadCache::new(repo_dir),
                run_with_node: false,
            },
            emscripten: None,
            threads_semaphore,
            compile_timeout: Duration::from_secs(180),
        }
    }

    pub fn with_emscripten(
        mut self,
        fetcher: Arc<ListFetcher>,
        repo_dir: impl Into<PathBuf>,
    ) -> Self {
        self.emscripten = Some(CompilerRepo {
            fetcher,
            cache: DownloadCache::new(repo_dir),
            run_with_node: true,
        });
        self
    }

    pub fn with_compile_timeout(mut self, timeout: Duration) -> Self {
        self.compile_timeout = timeout;
        self
    }

    pub fn all_versions(&self) -> Vec<DetailedVersion> {
        self.native.fetcher.all_versions()
    }

    pub async fn compile(
        &self,
        version: &DetailedVersion,
        input: &CompilerInput,
        force_emscripten: bool,
    ) -> Result<CompilerOutput, CompileError> {
        let repo = if force_emscripten {
            self.emscripten
                .as_ref()
                .ok_or(CompileError::EmscriptenNotConfigured)?
        } else {
            &self.native
        };
        let binary = repo.resolve(version).await?;

        let _permit = self
            .threads_semaphore
            .acquire()
            .await
            .expect("compilation semaphore is never closed");

        let mut command = if repo.run_with_node {
            let mut command = Command::new("node");
            command.arg(&binary);
            command
        } else {
            Command::new(&binary)
        };
        let mut child = command
            .arg("--standard-json")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let raw_input = serde_json::to_vec(input).expect("standard json input is serializable");
        let mut stdin = child.stdin.take().expect("stdin is piped");
        stdin.write_all(&raw_input).await?;
        drop(stdin);

        let output = match tokio::time::timeout(self.compile_timeout, child.wait_with_output())
            .await
        {
            // on timeout the child is dropped and killed via kill_on_drop
            Err(_elapsed) => return Err(CompileError::Timeout(self.compile_timeout)),
            Ok(output) => output?,
        };

        serde_json::from_slice(&output.stdout).map_err(|err| {
            let stderr = String::from_utf8_lossy(&output.stderr);
            CompileError::OutputParse {
                details: format!("{err}; stderr: {}", stderr.trim()),
            }
        })
    }
}
