//! Idempotent, content-addressed persistence for verification results.
//! Every write path is an upsert keyed by content hashes or identity
//! tuples, executed inside a single transaction, so retries and
//! concurrent verifications of the same contract collapse into one set
//! of rows.

mod gc;
mod helpers;
mod internal;
mod matches;
mod types;

pub mod jobs;

pub use types::{
    MatchFilter, MatchProjection, MatchSummary, MatchVerdict, Property, StoreError,
    StoredVerification,
};

use anyhow::Context;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait,
};
use verifier_core::VerificationExport;
use verifier_entity::{code, compiled_contracts, compiled_contracts_sources, contracts, sources, verified_contracts};

/// Persists a successful verification: codes, contract, deployment,
/// compilation, sources and selectors, the verified-contract verdict,
/// and finally the canonical-match upsert. One transaction; a conflict
/// on the canonical match rolls everything back.
pub async fn store_verification(
    db: &DatabaseConnection,
    export: &VerificationExport,
) -> Result<StoredVerification, StoreError> {
    let txn = db
        .begin()
        .await
        .context("begin database transaction")
        .map_err(StoreError::Internal)?;

    let deployment = internal::insert_contract_deployment(&txn, export)
        .await
        .context("insert contract deployment")?;
    let compiled_contract = internal::insert_compiled_contract(&txn, export)
        .await
        .context("insert compiled contract")?;
    internal::insert_sources(&txn, compiled_contract.id, &export.sources)
        .await
        .context("insert sources")?;
    internal::insert_signatures(
        &txn,
        compiled_contract.id,
        export.compilation_artifacts.abi.as_ref(),
    )
    .await
    .context("insert signatures")?;
    let verified_contract =
        internal::insert_verified_contract(&txn, deployment.id, compiled_contract.id, export)
            .await
            .context("insert verified contract")?;

    let sourcify_match =
        matches::upsert_sourcify_match(&txn, deployment.id, verified_contract.id, export).await?;

    txn.commit()
        .await
        .context("commit database transaction")
        .map_err(StoreError::Internal)?;

    Ok(StoredVerification {
        verified_contract_id: verified_contract.id,
        sourcify_match_id: sourcify_match.id,
        compilation_id: compiled_contract.id,
        deployment_id: deployment.id,
    })
}

/// Projection over the canonical match of the latest deployment at
/// `(chain_id, address)`. Only the requested properties are loaded.
pub async fn lookup_by_chain_and_address(
    db: &DatabaseConnection,
    chain_id: &str,
    address: &[u8],
    properties: &[Property],
) -> Result<Option<MatchProjection>, anyhow::Error> {
    let chain_id = internal::parse_chain_id(chain_id)?;
    let Some(deployment) = internal::retrieve_latest_deployment(db, chain_id, address).await?
    else {
        return Ok(None);
    };
    let Some(sourcify_match) = matches::find_by_deployment(db, deployment.id).await? else {
        return Ok(None);
    };

    let verified_contract = verified_contracts::Entity::find_by_id(
        sourcify_match.verified_contract_id,
    )
    .one(db)
    .await
    .context("select from \"verified_contracts\"")?
    .context("sourcify match points at a missing verified contract")?;
    let compiled_contract =
        compiled_contracts::Entity::find_by_id(verified_contract.compilation_id)
            .one(db)
            .await
            .context("select from \"compiled_contracts\"")?
            .context("verified contract points at a missing compilation")?;

    let mut projection = MatchProjection::default();
    for property in properties {
        match property {
            Property::Id => projection.id = Some(sourcify_match.id),
            Property::CreationMatch => {
                projection.creation_match =
                    Some(matches::parse_verdict(sourcify_match.creation_match.as_deref()));
            }
            Property::RuntimeMatch => {
                projection.runtime_match =
                    Some(matches::parse_verdict(sourcify_match.runtime_match.as_deref()));
            }
            Property::Address => projection.address = Some(deployment.address.clone()),
            Property::VerifiedAt => projection.verified_at = Some(sourcify_match.updated_at),
            Property::Metadata => projection.metadata = Some(sourcify_match.metadata.clone()),
            Property::Sources => {
                projection.sources = Some(load_sources(db, compiled_contract.id).await?);
            }
            Property::StdJsonInput => {
                let sources = load_sources(db, compiled_contract.id).await?;
                projection.std_json_input = Some(std_json_input(&compiled_contract, sources));
            }
            Property::Transformations => {
                projection.transformations = Some(serde_json::json!({
                    "runtime": verified_contract.runtime_transformations,
                    "creation": verified_contract.creation_transformations,
                    "runtimeValues": verified_contract.runtime_values,
                    "creationValues": verified_contract.creation_values,
                }));
            }
            Property::CompilerSettings => {
                projection.compiler_settings = Some(compiled_contract.compiler_settings.clone());
            }
            Property::OnchainRuntimeCode | Property::OnchainCreationCode => {
                let contract = contracts::Entity::find_by_id(deployment.contract_id)
                    .one(db)
                    .await
                    .context("select from \"contracts\"")?
                    .context("deployment points at a missing contract")?;
                match property {
                    Property::OnchainRuntimeCode => {
                        projection.onchain_runtime_code =
                            load_code(db, &contract.runtime_code_hash).await?;
                    }
                    _ => {
                        projection.onchain_creation_code =
                            load_code(db, &contract.creation_code_hash).await?;
                    }
                }
            }
            Property::RecompiledRuntimeCode => {
                projection.recompiled_runtime_code =
                    load_code(db, &compiled_contract.runtime_code_hash).await?;
            }
            Property::RecompiledCreationCode => {
                projection.recompiled_creation_code =
                    load_code(db, &compiled_contract.creation_code_hash).await?;
            }
        }
    }

    Ok(Some(projection))
}

pub async fn paginate_matches(
    db: &DatabaseConnection,
    chain_id: &str,
    filter: MatchFilter,
    after_id: Option<i64>,
    limit: u64,
    descending: bool,
) -> Result<Vec<MatchSummary>, anyhow::Error> {
    let chain_id = internal::parse_chain_id(chain_id)?;
    matches::paginate(db, chain_id, filter, after_id, limit, descending).await
}

/// Removes everything recorded for `(chain_id, address)` and collects
/// the content-addressed rows that became orphaned in the process.
pub async fn delete_match(
    db: &DatabaseConnection,
    chain_id: &str,
    address: &[u8],
) -> Result<(), anyhow::Error> {
    let chain_id = internal::parse_chain_id(chain_id)?;
    let txn = db.begin().await.context("begin database transaction")?;
    gc::delete_address_rows(&txn, chain_id, address).await?;
    gc::collect_orphans(&txn).await?;
    txn.commit().await.context("commit database transaction")
}

/// The orphan policy of [`delete_match`] applied globally.
pub async fn orphan_gc(db: &DatabaseConnection) -> Result<(), anyhow::Error> {
    let txn = db.begin().await.context("begin database transaction")?;
    gc::collect_orphans(&txn).await?;
    txn.commit().await.context("commit database transaction")
}

async fn load_sources<C: ConnectionTrait>(
    db: &C,
    compilation_id: uuid::Uuid,
) -> Result<std::collections::BTreeMap<String, String>, anyhow::Error> {
    let rows = compiled_contracts_sources::Entity::find()
        .find_also_related(sources::Entity)
        .filter(compiled_contracts_sources::Column::CompilationId.eq(compilation_id))
        .all(db)
        .await
        .context("select from \"compiled_contracts_sources\"")?;
    Ok(rows
        .into_iter()
        .filter_map(|(link, source)| Some((link.path, source?.content)))
        .collect())
}

async fn load_code<C: ConnectionTrait>(
    db: &C,
    code_hash: &[u8],
) -> Result<Option<Vec<u8>>, anyhow::Error> {
    let model = code::Entity::find_by_id(code_hash.to_vec())
        .one(db)
        .await
        .context("select from \"code\"")?;
    Ok(model.and_then(|model| model.code))
}

fn std_json_input(
    compiled_contract: &compiled_contracts::Model,
    sources: std::collections::BTreeMap<String, String>,
) -> serde_json::Value {
    let language = match compiled_contract.language.as_str() {
        "solidity" => "Solidity",
        "yul" => "Yul",
        "vyper" => "Vyper",
        other => other,
    };
    serde_json::json!({
        "language": language,
        "sources": sources
            .into_iter()
            .map(|(path, content)| (path, serde_json::json!({ "content": content })))
            .collect::<serde_json::Map<String, serde_json::Value>>(),
        "settings": compiled_contract.compiler_settings,
    })
}
