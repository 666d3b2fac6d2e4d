//! Function/event/error selector registry: bulk import with grammar
//! checking, lookup by 4- or 32-byte hashes, wildcard search, and
//! materialized usage statistics.

mod canonical;
mod validation;

use anyhow::Context;
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    FromQueryResult, QueryFilter, QuerySelect, Statement,
};
use serde::Serialize;
use sha3::{Digest, Keccak256};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use verifier_entity::{compiled_contracts_signatures, signatures};

pub const MAX_BATCH_SIZE: usize = 1000;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("batch holds {0} signatures, the maximum is {MAX_BATCH_SIZE}")]
    BatchTooLarge(usize),
    #[error("\"{0}\" is not a valid signature")]
    InvalidSignature(String),
    #[error("\"{0}\" is not a valid selector hash")]
    InvalidHash(String),
    #[error("\"{0}\" is not a valid search pattern")]
    InvalidPattern(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InsertOutcome {
    pub signature: String,
    pub was_inserted: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LookupEntry {
    pub name: String,
    /// False iff the signature is on the bundled canonical list.
    pub filtered: bool,
    /// True iff some verified compilation references the selector.
    pub has_verified_contract: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LookupResponse {
    pub function: BTreeMap<String, Vec<LookupEntry>>,
    pub event: BTreeMap<String, Vec<LookupEntry>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchFilter {
    Function,
    Event,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SearchResponse {
    /// Grouped by the 4-byte selector, the way callers address functions.
    pub function: BTreeMap<String, Vec<String>>,
    /// Grouped by the full 32-byte topic hash.
    pub event: BTreeMap<String, Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Eq, FromQueryResult, Serialize)]
pub struct SignatureStats {
    pub total: i64,
    pub function_count: i64,
    pub event_count: i64,
    pub error_count: i64,
    pub unknown: i64,
    pub refreshed_at: chrono::DateTime<chrono::FixedOffset>,
}

pub struct SignatureRegistry {
    db: DatabaseConnection,
}

impl SignatureRegistry {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Bulk import. Every signature must pass the ABI grammar check;
    /// duplicates resolve to `was_inserted: false`.
    pub async fn insert_batch(
        &self,
        batch: Vec<String>,
    ) -> Result<Vec<InsertOutcome>, RegistryError> {
        if batch.len() > MAX_BATCH_SIZE {
            return Err(RegistryError::BatchTooLarge(batch.len()));
        }

        let mut outcomes = Vec::with_capacity(batch.len());
        for signature in batch {
            if alloy_json_abi::Function::parse(&signature).is_err() {
                return Err(RegistryError::InvalidSignature(signature));
            }

            let hash_32 = Keccak256::digest(signature.as_bytes()).to_vec();
            let active_model = signatures::ActiveModel {
                signature_hash_32: sea_orm::ActiveValue::Set(hash_32.clone()),
                signature_hash_4: sea_orm::ActiveValue::Set(hash_32[..4].to_vec()),
                signature: sea_orm::ActiveValue::Set(signature.clone()),
                created_at: Default::default(),
            };
            let result = signatures::Entity::insert(active_model)
                .on_conflict(
                    sea_orm::sea_query::OnConflict::new()
                        .do_nothing()
                        .to_owned(),
                )
                .exec(&self.db)
                .await;
            let was_inserted = match result {
                Ok(_) => true,
                Err(sea_orm::DbErr::RecordNotInserted) => false,
                Err(err) => {
                    return Err(RegistryError::Internal(
                        anyhow::Error::new(err).context("insert into \"signatures\""),
                    ))
                }
            };
            outcomes.push(InsertOutcome {
                signature,
                was_inserted,
            });
        }
        Ok(outcomes)
    }

    /// Selector lookup. Function hashes may be 4 or 32 bytes; event
    /// hashes are always the full 32-byte topic.
    pub async fn lookup(
        &self,
        function: &[String],
        event: &[String],
    ) -> Result<LookupResponse, RegistryError> {
        let mut response = LookupResponse::default();
        for hash in function {
            let parsed = validation::parse_hash(hash, true)?;
            let rows = self.find_by_hash(&parsed).await?;
            response
                .function
                .insert(hash.clone(), self.build_entries(rows).await?);
        }
        for hash in event {
            let parsed = validation::parse_hash(hash, false)?;
            let rows = self.find_by_hash(&parsed).await?;
            response
                .event
                .insert(hash.clone(), self.build_entries(rows).await?);
        }
        Ok(response)
    }

    /// Wildcard search over signature texts. Selector type cannot be
    /// inferred from text alone, so both groupings are returned unless
    /// the caller filters.
    pub async fn search(
        &self,
        pattern: &str,
        filter: Option<SearchFilter>,
    ) -> Result<SearchResponse, RegistryError> {
        validation::validate_pattern(pattern)?;
        let like = validation::pattern_to_like(pattern);

        let rows = signatures::Entity::find()
            .filter(signatures::Column::Signature.like(&like))
            .all(&self.db)
            .await
            .context("search in \"signatures\"")
            .map_err(RegistryError::Internal)?;

        let mut response = SearchResponse::default();
        for row in rows {
            if !matches!(filter, Some(SearchFilter::Event)) {
                response
                    .function
                    .entry(hex_prefixed(&row.signature_hash_4))
                    .or_default()
                    .push(row.signature.clone());
            }
            if !matches!(filter, Some(SearchFilter::Function)) {
                response
                    .event
                    .entry(hex_prefixed(&row.signature_hash_32))
                    .or_default()
                    .push(row.signature);
            }
        }
        Ok(response)
    }

    pub async fn stats(&self) -> Result<SignatureStats, RegistryError> {
        let statement = Statement::from_string(
            DbBackend::Postgres,
            "SELECT total, function_count, event_count, error_count, unknown, refreshed_at \
             FROM signature_stats",
        );
        SignatureStats::find_by_statement(statement)
            .one(&self.db)
            .await
            .context("select from \"signature_stats\"")
            .map_err(RegistryError::Internal)?
            .ok_or_else(|| {
                RegistryError::Internal(anyhow::anyhow!(
                    "\"signature_stats\" materialized view is empty"
                ))
            })
    }

    pub async fn refresh_stats(&self) -> Result<(), RegistryError> {
        self.db
            .execute(Statement::from_string(
                DbBackend::Postgres,
                "REFRESH MATERIALIZED VIEW signature_stats",
            ))
            .await
            .context("refresh \"signature_stats\"")
            .map_err(RegistryError::Internal)?;
        Ok(())
    }

    async fn find_by_hash(&self, hash: &[u8]) -> Result<Vec<signatures::Model>, RegistryError> {
        let condition = if hash.len() == 4 {
            Condition::all().add(signatures::Column::SignatureHash4.eq(hash.to_vec()))
        } else {
            Condition::all().add(signatures::Column::SignatureHash32.eq(hash.to_vec()))
        };
        signatures::Entity::find()
            .filter(condition)
            .all(&self.db)
            .await
            .context("select from \"signatures\" by hash")
            .map_err(RegistryError::Internal)
    }

    async fn build_entries(
        &self,
        rows: Vec<signatures::Model>,
    ) -> Result<Vec<LookupEntry>, RegistryError> {
        let hashes: Vec<Vec<u8>> = rows.iter().map(|row| row.signature_hash_32.clone()).collect();
        let verified: HashSet<Vec<u8>> = if hashes.is_empty() {
            HashSet::new()
        } else {
            compiled_contracts_signatures::Entity::find()
                .select_only()
                .column(compiled_contracts_signatures::Column::SignatureHash32)
                .filter(compiled_contracts_signatures::Column::SignatureHash32.is_in(hashes))
                .distinct()
                .into_tuple::<Vec<u8>>()
                .all(&self.db)
                .await
                .context("select from \"compiled_contracts_signatures\"")
                .map_err(RegistryError::Internal)?
                .into_iter()
                .collect()
        };

        Ok(rows
            .into_iter()
            .map(|row| LookupEntry {
                filtered: !canonical::is_canonical(&row.signature),
                has_verified_contract: verified.contains(&row.signature_hash_32),
                name: row.signature,
            })
            .collect())
    }
}

fn hex_prefixed(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}
