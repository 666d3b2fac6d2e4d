use crate::internal::parse_chain_id;
use anyhow::Context;
use sea_orm::{
    ActiveModelTrait,
    ActiveValue::{Set, Unchanged},
    ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, QueryFilter, Statement,
};
use uuid::Uuid;
use verifier_entity::{verification_jobs, verification_jobs_ephemeral};

#[derive(Clone, Debug)]
pub struct NewJob {
    pub chain_id: String,
    pub contract_address: Vec<u8>,
    pub verification_endpoint: String,
    pub hardware: Option<String>,
}

/// Large payloads captured for a failed job; prunable separately from
/// the job history.
#[derive(Clone, Debug, Default)]
pub struct EphemeralPayload {
    pub onchain_runtime_code: Option<Vec<u8>>,
    pub onchain_creation_code: Option<Vec<u8>>,
    pub recompiled_runtime_code: Option<Vec<u8>>,
    pub recompiled_creation_code: Option<Vec<u8>>,
    pub creation_transaction_hash: Option<Vec<u8>>,
}

#[derive(Clone, Debug)]
pub struct JobFailure {
    pub error_code: String,
    pub error_data: serde_json::Value,
    pub payload: Option<EphemeralPayload>,
}

/// Inserted before any compiler work begins, so every accepted request
/// is observable even if the process dies mid-verification.
pub async fn insert_job<C: ConnectionTrait>(db: &C, new_job: NewJob) -> Result<Uuid, anyhow::Error> {
    let id = Uuid::new_v4();
    let active_model = verification_jobs::ActiveModel {
        id: Set(id),
        started_at: Set(chrono::Utc::now().fixed_offset()),
        completed_at: Set(None),
        chain_id: Set(parse_chain_id(&new_job.chain_id)?),
        contract_address: Set(new_job.contract_address),
        verified_contract_id: Set(None),
        error_code: Set(None),
        error_id: Set(None),
        error_data: Set(None),
        compilation_time_ms: Set(None),
        verification_endpoint: Set(new_job.verification_endpoint),
        hardware: Set(new_job.hardware),
    };
    active_model
        .insert(db)
        .await
        .context("insert into \"verification_jobs\"")?;
    Ok(id)
}

pub async fn complete_job_success<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    verified_contract_id: i64,
    compilation_time_ms: Option<i64>,
) -> Result<(), anyhow::Error> {
    let active_model = verification_jobs::ActiveModel {
        id: Unchanged(id),
        completed_at: Set(Some(chrono::Utc::now().fixed_offset())),
        verified_contract_id: Set(Some(verified_contract_id)),
        compilation_time_ms: Set(compilation_time_ms),
        ..Default::default()
    };
    active_model
        .update(db)
        .await
        .context("update \"verification_jobs\" on success")?;
    Ok(())
}

/// Marks the job failed and returns the freshly minted error id used
/// for log correlation.
pub async fn complete_job_failure<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    failure: JobFailure,
) -> Result<Uuid, anyhow::Error> {
    let error_id = Uuid::new_v4();
    let active_model = verification_jobs::ActiveModel {
        id: Unchanged(id),
        completed_at: Set(Some(chrono::Utc::now().fixed_offset())),
        error_code: Set(Some(failure.error_code)),
        error_id: Set(Some(error_id)),
        error_data: Set(Some(failure.error_data)),
        ..Default::default()
    };
    active_model
        .update(db)
        .await
        .context("update \"verification_jobs\" on failure")?;

    if let Some(payload) = failure.payload {
        let active_model = verification_jobs_ephemeral::ActiveModel {
            id: Set(id),
            onchain_runtime_code: Set(payload.onchain_runtime_code),
            onchain_creation_code: Set(payload.onchain_creation_code),
            recompiled_runtime_code: Set(payload.recompiled_runtime_code),
            recompiled_creation_code: Set(payload.recompiled_creation_code),
            creation_transaction_hash: Set(payload.creation_transaction_hash),
        };
        active_model
            .insert(db)
            .await
            .context("insert into \"verification_jobs_ephemeral\"")?;
    }

    Ok(error_id)
}

pub async fn get_job<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
) -> Result<
    Option<(
        verification_jobs::Model,
        Option<verification_jobs_ephemeral::Model>,
    )>,
    anyhow::Error,
> {
    let Some(job) = verification_jobs::Entity::find_by_id(id)
        .one(db)
        .await
        .context("select from \"verification_jobs\"")?
    else {
        return Ok(None);
    };
    let ephemeral = verification_jobs_ephemeral::Entity::find_by_id(id)
        .one(db)
        .await
        .context("select from \"verification_jobs_ephemeral\"")?;
    Ok(Some((job, ephemeral)))
}

/// Drops the large payloads of jobs that reached terminal state before
/// the cutoff. Job rows themselves are kept.
pub async fn prune_ephemeral<C: ConnectionTrait>(
    db: &C,
    completed_before: chrono::DateTime<chrono::FixedOffset>,
) -> Result<u64, anyhow::Error> {
    let statement = Statement::from_sql_and_values(
        DbBackend::Postgres,
        r#"DELETE FROM verification_jobs_ephemeral e
            USING verification_jobs j
            WHERE e.id = j.id AND j.completed_at IS NOT NULL AND j.completed_at < $1"#,
        [completed_before.into()],
    );
    let result = db
        .execute(statement)
        .await
        .context("prune \"verification_jobs_ephemeral\"")?;
    Ok(result.rows_affected())
}

pub async fn find_unfinished_jobs<C: ConnectionTrait>(
    db: &C,
) -> Result<Vec<verification_jobs::Model>, anyhow::Error> {
    verification_jobs::Entity::find()
        .filter(verification_jobs::Column::CompletedAt.is_null())
        .all(db)
        .await
        .context("select unfinished \"verification_jobs\"")
}
