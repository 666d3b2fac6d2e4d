use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};
use thiserror::Error;
use verifier_core::MatchType;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a verification at least as good already exists for the deployment")]
    Conflict,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Conflict => "conflict",
            StoreError::Internal(_) => "internal_error",
        }
    }
}

/// A verdict as persisted in `sourcify_matches.{runtime,creation}_match`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchVerdict {
    Perfect,
    Partial,
}

impl From<MatchType> for MatchVerdict {
    fn from(value: MatchType) -> Self {
        match value {
            MatchType::Perfect => MatchVerdict::Perfect,
            MatchType::Partial => MatchVerdict::Partial,
        }
    }
}

impl Display for MatchVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchVerdict::Perfect => f.write_str("perfect"),
            MatchVerdict::Partial => f.write_str("partial"),
        }
    }
}

impl FromStr for MatchVerdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "perfect" => Ok(MatchVerdict::Perfect),
            "partial" => Ok(MatchVerdict::Partial),
            other => Err(format!("unknown match verdict: {other}")),
        }
    }
}

/// `perfect` > `partial` > absent; used by the canonical-match upsert
/// rule and the monotonicity invariant.
pub(crate) fn verdict_rank(verdict: Option<&str>) -> u8 {
    match verdict {
        Some("perfect") => 2,
        Some("partial") => 1,
        _ => 0,
    }
}

/// `(runtime, creation)` pair comparison: strictly better means no side
/// regresses and at least one improves.
pub(crate) fn is_strictly_better(
    new_runtime: Option<&str>,
    new_creation: Option<&str>,
    old_runtime: Option<&str>,
    old_creation: Option<&str>,
) -> bool {
    let (new_r, new_c) = (verdict_rank(new_runtime), verdict_rank(new_creation));
    let (old_r, old_c) = (verdict_rank(old_runtime), verdict_rank(old_creation));
    new_r >= old_r && new_c >= old_c && (new_r > old_r || new_c > old_c)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredVerification {
    pub verified_contract_id: i64,
    pub sourcify_match_id: i64,
    pub compilation_id: uuid::Uuid,
    pub deployment_id: uuid::Uuid,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Property {
    Id,
    CreationMatch,
    RuntimeMatch,
    Address,
    VerifiedAt,
    Metadata,
    Sources,
    StdJsonInput,
    Transformations,
    CompilerSettings,
    OnchainRuntimeCode,
    OnchainCreationCode,
    RecompiledRuntimeCode,
    RecompiledCreationCode,
}

impl Property {
    pub const ALL: [Property; 14] = [
        Property::Id,
        Property::CreationMatch,
        Property::RuntimeMatch,
        Property::Address,
        Property::VerifiedAt,
        Property::Metadata,
        Property::Sources,
        Property::StdJsonInput,
        Property::Transformations,
        Property::CompilerSettings,
        Property::OnchainRuntimeCode,
        Property::OnchainCreationCode,
        Property::RecompiledRuntimeCode,
        Property::RecompiledCreationCode,
    ];
}

/// Projection over a canonical match; only the requested properties are
/// populated.
#[serde_with::serde_as]
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchProjection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_match: Option<Option<MatchVerdict>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_match: Option<Option<MatchVerdict>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde_as(as = "Option<blockscout_display_bytes::serde_as::Hex>")]
    pub address: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<chrono::DateTime<chrono::FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<std::collections::BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std_json_input: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transformations: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiler_settings: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde_as(as = "Option<blockscout_display_bytes::serde_as::Hex>")]
    pub onchain_runtime_code: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde_as(as = "Option<blockscout_display_bytes::serde_as::Hex>")]
    pub onchain_creation_code: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde_as(as = "Option<blockscout_display_bytes::serde_as::Hex>")]
    pub recompiled_runtime_code: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde_as(as = "Option<blockscout_display_bytes::serde_as::Hex>")]
    pub recompiled_creation_code: Option<Vec<u8>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchFilter {
    Full,
    Partial,
    Any,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    pub id: i64,
    #[serde(with = "hex_bytes")]
    pub address: Vec<u8>,
    pub runtime_match: Option<MatchVerdict>,
    pub creation_match: Option<MatchVerdict>,
    pub verified_at: chrono::DateTime<chrono::FixedOffset>,
}

mod hex_bytes {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer
            .serialize_str(&blockscout_display_bytes::Bytes::from(bytes.to_vec()).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strictly_better_requires_improvement_without_regression() {
        // first verification
        assert!(is_strictly_better(Some("partial"), None, None, None));
        // partial -> perfect improves
        assert!(is_strictly_better(
            Some("perfect"),
            Some("perfect"),
            Some("partial"),
            Some("partial"),
        ));
        // same verdict is not better
        assert!(!is_strictly_better(
            Some("partial"),
            None,
            Some("partial"),
            None,
        ));
        // improving one side while regressing the other is not better
        assert!(!is_strictly_better(
            Some("perfect"),
            None,
            Some("partial"),
            Some("partial"),
        ));
        // perfect never downgrades to partial
        assert!(!is_strictly_better(
            Some("partial"),
            Some("partial"),
            Some("perfect"),
            Some("perfect"),
        ));
    }

    #[test]
    fn verdict_round_trip() {
        for verdict in [MatchVerdict::Perfect, MatchVerdict::Partial] {
            assert_eq!(verdict.to_string().parse::<MatchVerdict>(), Ok(verdict));
        }
        assert!("null".parse::<MatchVerdict>().is_err());
    }
}
