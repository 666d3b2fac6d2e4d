use crate::{metadata, JobError, VerificationJobRequest};
use blockscout_display_bytes::Bytes as DisplayBytes;
use chain_access::ChainClient;
use sea_orm::DatabaseConnection;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::Semaphore;
use uuid::Uuid;
use verifier_core::{
    sources::IpfsClient,
    verify::{self, Compilation, CompilationTarget, VerificationContext, VerificationRequest},
    CompilersPool, MatchType, VerificationError, VerificationExport,
};
use verifier_database::{
    jobs::{self, EphemeralPayload, JobFailure, NewJob},
    StoreError,
};

const DEFAULT_JOB_DEADLINE: Duration = Duration::from_secs(300);

pub struct WorkerPoolBuilder {
    concurrency: usize,
    job_deadline: Duration,
    ipfs: Option<IpfsClient>,
}

impl Default for WorkerPoolBuilder {
    fn default() -> Self {
        Self {
            concurrency: 4,
            job_deadline: DEFAULT_JOB_DEADLINE,
            ipfs: None,
        }
    }
}

impl WorkerPoolBuilder {
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn job_deadline(mut self, deadline: Duration) -> Self {
        self.job_deadline = deadline;
        self
    }

    pub fn ipfs(mut self, ipfs: Option<IpfsClient>) -> Self {
        self.ipfs = ipfs;
        self
    }

    pub fn build(
        self,
        db: DatabaseConnection,
        compilers: Arc<CompilersPool>,
        chains: HashMap<String, Arc<ChainClient>>,
    ) -> WorkerPool {
        WorkerPool {
            inner: Arc::new(PoolInner {
                db,
                compilers,
                chains,
                ipfs: self.ipfs,
                semaphore: Arc::new(Semaphore::new(self.concurrency)),
                job_deadline: self.job_deadline,
                hardware: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
            }),
        }
    }
}

/// A bounded pool over shared immutable state. Submission writes the
/// job row synchronously, so callers always get an id they can poll;
/// the verification itself queues on the worker semaphore.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    db: DatabaseConnection,
    compilers: Arc<CompilersPool>,
    chains: HashMap<String, Arc<ChainClient>>,
    ipfs: Option<IpfsClient>,
    semaphore: Arc<Semaphore>,
    job_deadline: Duration,
    hardware: String,
}

impl WorkerPool {
    pub fn builder() -> WorkerPoolBuilder {
        WorkerPoolBuilder::default()
    }

    pub async fn submit(&self, request: VerificationJobRequest) -> Result<Uuid, anyhow::Error> {
        let job_id = jobs::insert_job(
            &self.inner.db,
            NewJob {
                chain_id: request.chain_id().to_string(),
                contract_address: request.address().to_vec(),
                verification_endpoint: request.endpoint_name().to_string(),
                hardware: Some(self.inner.hardware.clone()),
            },
        )
        .await?;

        let inner = self.inner.clone();
        tokio::spawn(async move {
            PoolInner::run(inner, job_id, request).await;
        });

        Ok(job_id)
    }

    /// Runs a request to completion on the calling task and returns the
    /// export; the job row is maintained exactly as in the async path.
    pub async fn submit_and_wait(
        &self,
        request: VerificationJobRequest,
    ) -> Result<(Uuid, Option<VerificationExport>), anyhow::Error> {
        let job_id = jobs::insert_job(
            &self.inner.db,
            NewJob {
                chain_id: request.chain_id().to_string(),
                contract_address: request.address().to_vec(),
                verification_endpoint: request.endpoint_name().to_string(),
                hardware: Some(self.inner.hardware.clone()),
            },
        )
        .await?;
        let export = PoolInner::run(self.inner.clone(), job_id, request).await;
        Ok((job_id, export))
    }

    pub async fn job_status(
        &self,
        job_id: Uuid,
    ) -> Result<
        Option<(
            verifier_entity::verification_jobs::Model,
            Option<verifier_entity::verification_jobs_ephemeral::Model>,
        )>,
        anyhow::Error,
    > {
        jobs::get_job(&self.inner.db, job_id).await
    }
}

impl PoolInner {
    async fn run(
        inner: Arc<Self>,
        job_id: Uuid,
        request: VerificationJobRequest,
    ) -> Option<VerificationExport> {
        let _permit = inner
            .semaphore
            .acquire()
            .await
            .expect("worker semaphore is never closed");

        let chain_id = request.chain_id().to_string();
        let contract_address = DisplayBytes::from(request.address().to_vec()).to_string();
        tracing::info!(job_id = %job_id, chain_id, contract_address, "verification job started");

        let outcome = match tokio::time::timeout(inner.job_deadline, inner.execute(&request)).await
        {
            Ok(outcome) => outcome,
            // the deadline kills the compiler subprocess with the future
            Err(_elapsed) => Err(JobError::DeadlineExceeded),
        };

        match outcome {
            Ok(export) => match inner.persist(job_id, &export).await {
                Ok(()) => {
                    tracing::info!(job_id = %job_id, chain_id, contract_address, "verification job succeeded");
                    Some(export)
                }
                Err(err) => {
                    inner.record_failure(job_id, &err, Some(&export)).await;
                    None
                }
            },
            Err(err) => {
                inner.record_failure(job_id, &err, None).await;
                None
            }
        }
    }

    async fn execute(&self, request: &VerificationJobRequest) -> Result<VerificationExport, JobError> {
        let chain = self
            .chains
            .get(request.chain_id())
            .ok_or_else(|| JobError::UnsupportedChain(request.chain_id().to_string()))?;

        let (compilation, metadata_derived, supplementary_sources, creation_transaction_hash) =
            match request {
                VerificationJobRequest::FromJsonInput {
                    compiler_version,
                    compilation_target,
                    json_input,
                    creation_transaction_hash,
                    ..
                } => {
                    let version = compiler_version.parse().map_err(|_| {
                        VerificationError::UnsupportedCompilerVersion(compiler_version.clone())
                    })?;
                    let compilation = Compilation::new(
                        json_input.language,
                        version,
                        json_input.clone(),
                        compilation_target.clone(),
                    )?;
                    (
                        compilation,
                        false,
                        Default::default(),
                        creation_transaction_hash.clone(),
                    )
                }
                VerificationJobRequest::FromMetadata {
                    metadata,
                    sources,
                    creation_transaction_hash,
                    ..
                } => {
                    let built =
                        metadata::build_compilation(metadata, sources, self.ipfs.as_ref()).await?;
                    (
                        built.compilation,
                        true,
                        built.supplementary_sources,
                        creation_transaction_hash.clone(),
                    )
                }
                VerificationJobRequest::FromExplorer {
                    explorer_result,
                    creation_transaction_hash,
                    ..
                } => {
                    let version = explorer_result.compiler_version.parse().map_err(|_| {
                        VerificationError::UnsupportedCompilerVersion(
                            explorer_result.compiler_version.clone(),
                        )
                    })?;
                    let target = CompilationTarget::new(
                        explorer_result.contract_path.clone(),
                        explorer_result.contract_name.clone(),
                    );
                    let compilation = Compilation::new(
                        explorer_result.json_input.language,
                        version,
                        explorer_result.json_input.clone(),
                        target,
                    )?;
                    (
                        compilation,
                        false,
                        Default::default(),
                        creation_transaction_hash.clone(),
                    )
                }
            };

        let context = VerificationContext {
            compilers: &self.compilers,
            chain,
            creation_transaction_provider: None,
            force_emscripten: false,
        };
        let export = verify::verify(
            &context,
            VerificationRequest {
                address: request.address().to_vec(),
                compilation,
                creation_transaction_hash,
                metadata_derived,
                supplementary_sources,
            },
        )
        .await?;
        Ok(export)
    }

    async fn persist(&self, job_id: Uuid, export: &VerificationExport) -> Result<(), JobError> {
        let compilation_time_ms = i64::try_from(export.compilation_time.as_millis()).ok();
        let stored = verifier_database::store_verification(&self.db, export).await?;
        jobs::complete_job_success(
            &self.db,
            job_id,
            stored.verified_contract_id,
            compilation_time_ms,
        )
        .await
        .map_err(StoreError::Internal)?;
        Ok(())
    }

    async fn record_failure(
        &self,
        job_id: Uuid,
        error: &JobError,
        export: Option<&VerificationExport>,
    ) {
        let payload = failure_payload(error, export);
        let result = jobs::complete_job_failure(
            &self.db,
            job_id,
            JobFailure {
                error_code: error.code().to_string(),
                error_data: error.data(),
                payload,
            },
        )
        .await;
        match result {
            Ok(error_id) => {
                tracing::warn!(
                    job_id = %job_id,
                    error_id = %error_id,
                    error_code = error.code(),
                    "verification job failed: {error}"
                );
            }
            Err(err) => {
                tracing::error!(job_id = %job_id, "recording job failure failed: {err:#}");
            }
        }
    }
}

/// Bytecode payloads captured for diagnostics: from the mismatch error
/// itself, or from the export when persistence failed after a
/// successful comparison.
fn failure_payload(
    error: &JobError,
    export: Option<&VerificationExport>,
) -> Option<EphemeralPayload> {
    if let JobError::Verification(VerificationError::BytecodeMismatch(payload)) = error {
        return Some(EphemeralPayload {
            onchain_runtime_code: payload.onchain_runtime_code.clone(),
            onchain_creation_code: payload.onchain_creation_code.clone(),
            recompiled_runtime_code: payload.recompiled_runtime_code.clone(),
            recompiled_creation_code: payload.recompiled_creation_code.clone(),
            creation_transaction_hash: payload.creation_transaction_hash.clone(),
        });
    }
    export.map(|export| EphemeralPayload {
        onchain_runtime_code: Some(export.onchain_runtime_code.clone()),
        onchain_creation_code: export.onchain_creation_code.clone(),
        recompiled_runtime_code: Some(export.recompiled_runtime_code.clone()),
        recompiled_creation_code: Some(export.recompiled_creation_code.clone()),
        creation_transaction_hash: export.deployment.transaction_hash.clone(),
    })
}

/// Highest verdict across both sides; used for logging and monitoring.
pub fn best_verdict(export: &VerificationExport) -> Option<MatchType> {
    export.runtime_match.max(export.creation_match)
}
