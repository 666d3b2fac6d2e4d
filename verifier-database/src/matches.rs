use crate::types::{is_strictly_better, MatchFilter, MatchSummary, MatchVerdict, StoreError};
use anyhow::Context;
use sea_orm::{
    ActiveModelTrait,
    ActiveValue::{Set, Unchanged},
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, JoinType, QueryFilter, QueryOrder,
    QuerySelect, RelationTrait,
};
use verifier_core::VerificationExport;
use verifier_entity::{contract_deployments, sourcify_matches};

/// The user-facing summary blob stored on the canonical match row.
fn match_metadata(export: &VerificationExport) -> serde_json::Value {
    serde_json::json!({
        "compiler": export.compiler,
        "language": export.language.as_str(),
        "version": export.compiler_version,
        "compilationTarget": export.compilation_target.fully_qualified_name(),
    })
}

/// Insert-or-update of the canonical match for a deployment: the first
/// verification inserts, a strictly better one re-points the row in
/// place (the superseded `verified_contracts` row is kept), anything
/// else conflicts.
pub(crate) async fn upsert_sourcify_match<C: ConnectionTrait>(
    txn: &C,
    deployment_id: uuid::Uuid,
    verified_contract_id: i64,
    export: &VerificationExport,
) -> Result<sourcify_matches::Model, StoreError> {
    let new_runtime = export.runtime_match.map(MatchVerdict::from);
    let new_creation = export.creation_match.map(MatchVerdict::from);
    let new_runtime_str = new_runtime.map(|verdict| verdict.to_string());
    let new_creation_str = new_creation.map(|verdict| verdict.to_string());

    let existing = sourcify_matches::Entity::find()
        .filter(sourcify_matches::Column::DeploymentId.eq(deployment_id))
        .one(txn)
        .await
        .context("select from \"sourcify_matches\" by deployment")
        .map_err(StoreError::Internal)?;

    let model = match existing {
        None => {
            let active_model = sourcify_matches::ActiveModel {
                id: Default::default(),
                created_at: Default::default(),
                updated_at: Default::default(),
                verified_contract_id: Set(verified_contract_id),
                deployment_id: Set(deployment_id),
                creation_match: Set(new_creation_str),
                runtime_match: Set(new_runtime_str),
                metadata: Set(match_metadata(export)),
                license: Set(None),
                label: Set(None),
                similar_match_id: Set(None),
            };
            active_model
                .insert(txn)
                .await
                .context("insert into \"sourcify_matches\"")
                .map_err(StoreError::Internal)?
        }
        Some(existing) => {
            if !is_strictly_better(
                new_runtime_str.as_deref(),
                new_creation_str.as_deref(),
                existing.runtime_match.as_deref(),
                existing.creation_match.as_deref(),
            ) {
                return Err(StoreError::Conflict);
            }

            let active_model = sourcify_matches::ActiveModel {
                id: Unchanged(existing.id),
                updated_at: Set(chrono::Utc::now().fixed_offset()),
                verified_contract_id: Set(verified_contract_id),
                creation_match: Set(new_creation_str),
                runtime_match: Set(new_runtime_str),
                metadata: Set(match_metadata(export)),
                ..Default::default()
            };
            active_model
                .update(txn)
                .await
                .context("update \"sourcify_matches\"")
                .map_err(StoreError::Internal)?
        }
    };

    Ok(model)
}

pub(crate) async fn find_by_deployment<C: ConnectionTrait>(
    db: &C,
    deployment_id: uuid::Uuid,
) -> Result<Option<sourcify_matches::Model>, anyhow::Error> {
    sourcify_matches::Entity::find()
        .filter(sourcify_matches::Column::DeploymentId.eq(deployment_id))
        .one(db)
        .await
        .context("select from \"sourcify_matches\" by deployment")
}

fn filter_condition(filter: MatchFilter) -> Condition {
    let perfect_on_any_side = Condition::any()
        .add(sourcify_matches::Column::RuntimeMatch.eq("perfect"))
        .add(sourcify_matches::Column::CreationMatch.eq("perfect"));
    match filter {
        MatchFilter::Any => Condition::all(),
        MatchFilter::Full => perfect_on_any_side,
        MatchFilter::Partial => Condition::all()
            .add(
                Condition::any()
                    .add(sourcify_matches::Column::RuntimeMatch.eq("partial"))
                    .add(sourcify_matches::Column::CreationMatch.eq("partial")),
            )
            .add(perfect_on_any_side.not()),
    }
}

/// Keyset pagination over the canonical matches of a chain.
pub(crate) async fn paginate<C: ConnectionTrait>(
    db: &C,
    chain_id: sea_orm::prelude::Decimal,
    filter: MatchFilter,
    after_id: Option<i64>,
    limit: u64,
    descending: bool,
) -> Result<Vec<MatchSummary>, anyhow::Error> {
    let mut query = sourcify_matches::Entity::find()
        .join(
            JoinType::InnerJoin,
            sourcify_matches::Relation::ContractDeployments.def(),
        )
        .filter(contract_deployments::Column::ChainId.eq(chain_id))
        .filter(filter_condition(filter));

    if let Some(after_id) = after_id {
        query = query.filter(if descending {
            sourcify_matches::Column::Id.lt(after_id)
        } else {
            sourcify_matches::Column::Id.gt(after_id)
        });
    }
    query = if descending {
        query.order_by_desc(sourcify_matches::Column::Id)
    } else {
        query.order_by_asc(sourcify_matches::Column::Id)
    };

    let rows = query
        .select_also(contract_deployments::Entity)
        .limit(limit)
        .all(db)
        .await
        .context("select page from \"sourcify_matches\"")?;

    Ok(rows
        .into_iter()
        .filter_map(|(sourcify_match, deployment)| {
            let deployment = deployment?;
            Some(MatchSummary {
                id: sourcify_match.id,
                address: deployment.address,
                runtime_match: parse_verdict(sourcify_match.runtime_match.as_deref()),
                creation_match: parse_verdict(sourcify_match.creation_match.as_deref()),
                verified_at: sourcify_match.updated_at,
            })
        })
        .collect())
}

pub(crate) fn parse_verdict(verdict: Option<&str>) -> Option<MatchVerdict> {
    verdict.and_then(|verdict| verdict.parse().ok())
}
