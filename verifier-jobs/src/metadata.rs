//! Turning a solc metadata document into a compilable standard JSON
//! input. Metadata lists every source by hash; contents may be inlined,
//! supplied by the caller, or fetched from decentralized storage.

use crate::JobError;
use serde::Deserialize;
use sha3::{Digest, Keccak256};
use std::collections::BTreeMap;
use verifier_core::{
    sources::IpfsClient,
    standard_json::{CompilerInput, Language, Source},
    verify::{Compilation, CompilationTarget},
    DetailedVersion, VerificationError,
};

#[derive(Debug, Deserialize)]
struct Metadata {
    compiler: MetadataCompiler,
    #[serde(default = "default_language")]
    language: String,
    settings: serde_json::Value,
    sources: BTreeMap<String, MetadataSource>,
}

fn default_language() -> String {
    "Solidity".to_string()
}

#[derive(Debug, Deserialize)]
struct MetadataCompiler {
    version: String,
}

#[derive(Debug, Default, Deserialize)]
struct MetadataSource {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    keccak256: Option<String>,
    #[serde(default)]
    urls: Vec<String>,
}

#[derive(Debug)]
pub(crate) struct MetadataCompilation {
    pub compilation: Compilation,
    /// Caller-provided files beyond the metadata-listed set; used by
    /// the full-source retry for the affected solc releases.
    pub supplementary_sources: BTreeMap<String, String>,
}

pub(crate) async fn build_compilation(
    metadata: &serde_json::Value,
    provided_sources: &BTreeMap<String, String>,
    ipfs: Option<&IpfsClient>,
) -> Result<MetadataCompilation, JobError> {
    let metadata: Metadata = serde_json::from_value(metadata.clone()).map_err(|err| {
        JobError::Verification(VerificationError::MissingOrInvalidSource(format!(
            "unparsable metadata document: {err}"
        )))
    })?;

    let version: DetailedVersion = metadata.compiler.version.parse().map_err(|_| {
        JobError::Verification(VerificationError::UnsupportedCompilerVersion(
            metadata.compiler.version.clone(),
        ))
    })?;
    let language = match metadata.language.as_str() {
        "Solidity" => Language::Solidity,
        "Yul" => Language::Yul,
        "Vyper" => Language::Vyper,
        other => {
            return Err(JobError::Verification(
                VerificationError::MissingOrInvalidSource(format!(
                    "metadata declares unsupported language {other}"
                )),
            ))
        }
    };

    let mut settings = metadata.settings.clone();
    let target = extract_compilation_target(&mut settings)?;

    let mut sources = BTreeMap::new();
    for (path, metadata_source) in &metadata.sources {
        let content =
            resolve_source_content(path, metadata_source, provided_sources, ipfs).await?;
        if let Some(expected) = &metadata_source.keccak256 {
            verify_source_hash(path, &content, expected)?;
        }
        sources.insert(path.clone(), Source::new(content));
    }

    let supplementary_sources: BTreeMap<String, String> = provided_sources
        .iter()
        .filter(|(path, _)| !metadata.sources.contains_key(*path))
        .map(|(path, content)| (path.clone(), content.clone()))
        .collect();

    let mut input = CompilerInput::new(language, sources);
    input.settings = settings;
    let compilation = Compilation::new(language, version, input, target)
        .map_err(JobError::Verification)?;

    Ok(MetadataCompilation {
        compilation,
        supplementary_sources,
    })
}

/// `settings.compilationTarget` is metadata-only and must not reach the
/// compiler; it is removed here and returned as the target.
fn extract_compilation_target(
    settings: &mut serde_json::Value,
) -> Result<CompilationTarget, JobError> {
    let invalid = || {
        JobError::Verification(VerificationError::MissingOrInvalidSource(
            "metadata settings carry no usable compilationTarget".to_string(),
        ))
    };

    let target_value = settings
        .as_object_mut()
        .ok_or_else(invalid)?
        .remove("compilationTarget")
        .ok_or_else(invalid)?;
    let target = target_value
        .as_object()
        .and_then(|object| object.iter().next())
        .and_then(|(path, name)| {
            name.as_str()
                .map(|name| CompilationTarget::new(path.clone(), name))
        })
        .ok_or_else(invalid)?;
    Ok(target)
}

async fn resolve_source_content(
    path: &str,
    metadata_source: &MetadataSource,
    provided_sources: &BTreeMap<String, String>,
    ipfs: Option<&IpfsClient>,
) -> Result<String, JobError> {
    if let Some(content) = provided_sources.get(path) {
        return Ok(content.clone());
    }
    if let Some(content) = &metadata_source.content {
        return Ok(content.clone());
    }

    if let Some(ipfs) = ipfs {
        for cid in metadata_source
            .urls
            .iter()
            .filter_map(|url| url.strip_prefix("dweb:/ipfs/"))
        {
            match ipfs.fetch(cid).await {
                Ok(bytes) => match String::from_utf8(bytes.to_vec()) {
                    Ok(content) => return Ok(content),
                    Err(_) => tracing::warn!(path, cid, "fetched source is not valid utf-8"),
                },
                Err(err) => tracing::warn!(path, cid, "source fetch failed: {err}"),
            }
        }
    }

    Err(JobError::Verification(VerificationError::MissingSource(
        path.to_string(),
    )))
}

fn verify_source_hash(path: &str, content: &str, expected: &str) -> Result<(), JobError> {
    let found = Keccak256::digest(content.as_bytes());
    let expected_bytes = hex::decode(expected.trim_start_matches("0x")).unwrap_or_default();
    if found.as_slice() != expected_bytes {
        return Err(JobError::Verification(
            VerificationError::MissingOrInvalidSource(format!(
                "content of {path} does not hash to the metadata-listed keccak256"
            )),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const STORAGE_SOURCE: &str = "pragma solidity 0.8.10;\ncontract Storage { uint256 x; }";

    fn metadata_value(source_entry: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "compiler": {"version": "0.8.10+commit.fc410830"},
            "language": "Solidity",
            "settings": {
                "compilationTarget": {"contracts/Storage.sol": "Storage"},
                "optimizer": {"enabled": false, "runs": 200},
            },
            "sources": {"contracts/Storage.sol": source_entry},
        })
    }

    fn keccak_hex(content: &str) -> String {
        format!("0x{}", hex::encode(Keccak256::digest(content.as_bytes())))
    }

    #[tokio::test]
    async fn builds_compilation_from_inlined_sources() {
        let metadata = metadata_value(serde_json::json!({
            "content": STORAGE_SOURCE,
            "keccak256": keccak_hex(STORAGE_SOURCE),
        }));
        let result = build_compilation(&metadata, &BTreeMap::new(), None)
            .await
            .expect("compilation");

        let compilation = result.compilation;
        assert_eq!(compilation.target.path, "contracts/Storage.sol");
        assert_eq!(compilation.target.contract, "Storage");
        assert_eq!(compilation.version.to_string(), "v0.8.10+commit.fc410830");
        // compilationTarget must not leak into the compiler settings
        assert!(compilation.input.settings.get("compilationTarget").is_none());
        assert!(compilation.input.sources.contains_key("contracts/Storage.sol"));
    }

    #[tokio::test]
    async fn provided_sources_take_precedence_and_are_hash_checked() {
        let metadata = metadata_value(serde_json::json!({
            "keccak256": keccak_hex(STORAGE_SOURCE),
        }));
        let provided = BTreeMap::from([(
            "contracts/Storage.sol".to_string(),
            STORAGE_SOURCE.to_string(),
        )]);
        build_compilation(&metadata, &provided, None)
            .await
            .expect("hash matches");

        let tampered = BTreeMap::from([(
            "contracts/Storage.sol".to_string(),
            format!("{STORAGE_SOURCE} "),
        )]);
        let err = build_compilation(&metadata, &tampered, None)
            .await
            .expect_err("hash mismatch");
        assert_eq!(err.code(), "missing_or_invalid_source");
    }

    #[tokio::test]
    async fn unavailable_source_is_reported_by_path() {
        let metadata = metadata_value(serde_json::json!({
            "urls": ["dweb:/ipfs/QmUnreachable"],
        }));
        let err = build_compilation(&metadata, &BTreeMap::new(), None)
            .await
            .expect_err("no source available");
        assert_eq!(err.code(), "missing_source");
    }

    #[tokio::test]
    async fn extra_provided_sources_become_supplementary() {
        let metadata = metadata_value(serde_json::json!({"content": STORAGE_SOURCE}));
        let provided = BTreeMap::from([(
            "contracts/Unlisted.sol".to_string(),
            "contract Unlisted {}".to_string(),
        )]);
        let result = build_compilation(&metadata, &provided, None)
            .await
            .expect("compilation");
        assert_eq!(
            result.supplementary_sources,
            BTreeMap::from([(
                "contracts/Unlisted.sol".to_string(),
                "contract Unlisted {}".to_string(),
            )])
        );
        assert!(!result
            .compilation
            .input
            .sources
            .contains_key("contracts/Unlisted.sol"));
    }
}
