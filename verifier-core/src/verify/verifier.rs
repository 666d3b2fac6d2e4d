use super::{
    compilation::{Compilation, CompilationTarget, CompiledContract},
    errors::{MismatchPayload, VerificationError},
    match_builder::{Match, MatchBuilder},
    transformations::{Transformation, TransformationReason},
    values::Values,
};
use crate::{
    bytecode::{auxdata, metadata::MetadataHash},
    compilers::CompilersPool,
    standard_json::{Language, Source},
};
use chain_access::ChainClient;
use semver::Version;
use std::{
    collections::BTreeMap,
    fmt::Display,
    time::{Duration, Instant},
};

/// Ordered by verdict quality: a perfect match supersedes a partial one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchType {
    Partial,
    Perfect,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Partial => "partial",
            MatchType::Perfect => "perfect",
        }
    }
}

impl Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discovers the creation transaction of a deployment when the caller
/// did not supply one; wired to an address-indexed explorer API where a
/// chain has one configured.
#[async_trait::async_trait]
pub trait CreationTransactionProvider: Send + Sync {
    async fn creation_transaction(
        &self,
        chain_id: &str,
        address: &[u8],
    ) -> Result<Option<Vec<u8>>, anyhow::Error>;
}

pub struct VerificationContext<'a> {
    pub compilers: &'a CompilersPool,
    pub chain: &'a ChainClient,
    pub creation_transaction_provider: Option<&'a dyn CreationTransactionProvider>,
    pub force_emscripten: bool,
}

#[derive(Clone, Debug)]
pub struct VerificationRequest {
    pub address: Vec<u8>,
    pub compilation: Compilation,
    pub creation_transaction_hash: Option<Vec<u8>>,
    /// Set when the compilation input was derived from an on-chain
    /// metadata document; enables the 0.6.12/0.7.0 full-source retry.
    pub metadata_derived: bool,
    /// Sources available beyond the metadata-listed ones.
    pub supplementary_sources: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeploymentInfo {
    pub transaction_hash: Option<Vec<u8>>,
    pub block_number: Option<i64>,
    pub transaction_index: Option<i64>,
    pub deployer: Option<Vec<u8>>,
}

#[derive(Clone, Debug)]
pub struct VerificationExport {
    pub chain_id: String,
    pub address: Vec<u8>,
    pub runtime_match: Option<MatchType>,
    pub creation_match: Option<MatchType>,
    pub runtime_metadata_match: Option<bool>,
    pub creation_metadata_match: Option<bool>,
    pub runtime_transformations: Vec<Transformation>,
    pub runtime_values: Values,
    pub creation_transformations: Vec<Transformation>,
    pub creation_values: Values,
    pub onchain_runtime_code: Vec<u8>,
    pub onchain_creation_code: Option<Vec<u8>>,
    pub recompiled_runtime_code: Vec<u8>,
    pub recompiled_creation_code: Vec<u8>,
    pub library_map: BTreeMap<String, Vec<u8>>,
    pub deployment: DeploymentInfo,
    pub compiler: &'static str,
    pub language: Language,
    pub compiler_version: String,
    pub compilation_target: CompilationTarget,
    pub compiler_settings: serde_json::Value,
    pub sources: BTreeMap<String, String>,
    pub metadata: Option<String>,
    pub compilation_artifacts: crate::bytecode::CompilationArtifacts,
    pub creation_code_artifacts: crate::bytecode::CreationCodeArtifacts,
    pub runtime_code_artifacts: crate::bytecode::RuntimeCodeArtifacts,
    pub compilation_time: Duration,
}

struct SideMatches {
    runtime: Option<Match>,
    creation: Option<Match>,
}

/// Versions whose metadata-listed source set can produce different
/// bytecode than the full input the contract was actually built from
/// (the solc "extra file input" bug).
const EXTRA_FILE_INPUT_BUG_VERSIONS: [Version; 2] =
    [Version::new(0, 6, 12), Version::new(0, 7, 0)];

pub async fn verify(
    ctx: &VerificationContext<'_>,
    mut request: VerificationRequest,
) -> Result<VerificationExport, VerificationError> {
    let compilation_started = Instant::now();
    let mut compiled = request
        .compilation
        .compile(ctx.compilers, ctx.force_emscripten)
        .await?;
    let mut compilation_time = compilation_started.elapsed();

    let onchain_runtime_code = ctx.chain.get_code(&request.address).await?;
    if onchain_runtime_code.is_empty() {
        return Err(VerificationError::ContractNotDeployed);
    }

    let creation_transaction_hash = match request.creation_transaction_hash.take() {
        Some(hash) => Some(hash),
        None => {
            discover_creation_transaction(ctx, &request.address)
                .await
        }
    };

    let (onchain_creation_code, deployment) = match &creation_transaction_hash {
        Some(transaction_hash) => {
            fetch_creation_side(ctx, transaction_hash, &request.address).await
        }
        None => (None, DeploymentInfo::default()),
    };
    let deployment = DeploymentInfo {
        transaction_hash: creation_transaction_hash.clone(),
        ..deployment
    };

    let mut matches = compare_sides(
        &compiled,
        &onchain_runtime_code,
        onchain_creation_code.as_deref(),
    );

    if matches.runtime.is_none() && matches.creation.is_none() {
        let retry_possible = request.metadata_derived
            && !request.supplementary_sources.is_empty()
            && EXTRA_FILE_INPUT_BUG_VERSIONS
                .contains(&request.compilation.version.release())
            && metadata_hashes_match(&compiled.runtime_code, &onchain_runtime_code);

        if !retry_possible {
            return Err(bytecode_mismatch(
                &compiled,
                onchain_runtime_code,
                onchain_creation_code,
                creation_transaction_hash,
            ));
        }

        tracing::info!(
            chain_id = ctx.chain.chain_id(),
            "metadata hashes match but bytecodes do not; recompiling with the full source set"
        );
        for (path, content) in std::mem::take(&mut request.supplementary_sources) {
            request
                .compilation
                .input
                .sources
                .entry(path)
                .or_insert_with(|| Source::new(content));
        }
        let retry_started = Instant::now();
        compiled = request
            .compilation
            .compile(ctx.compilers, ctx.force_emscripten)
            .await?;
        compilation_time += retry_started.elapsed();

        matches = compare_sides(
            &compiled,
            &onchain_runtime_code,
            onchain_creation_code.as_deref(),
        );
        if matches.runtime.is_none() && matches.creation.is_none() {
            return Err(VerificationError::ExtraFileInputBug);
        }
    }

    let mut library_map = BTreeMap::new();
    for side in [&matches.runtime, &matches.creation].into_iter().flatten() {
        for (id, value) in &side.values.libraries {
            library_map.insert(id.clone(), value.to_vec());
        }
    }

    let compilation = request.compilation;
    Ok(VerificationExport {
        chain_id: ctx.chain.chain_id().to_string(),
        address: request.address,
        runtime_match: matches.runtime.as_ref().map(classify),
        creation_match: matches.creation.as_ref().map(classify),
        runtime_metadata_match: matches.runtime.as_ref().map(|m| m.metadata_match),
        creation_metadata_match: matches.creation.as_ref().map(|m| m.metadata_match),
        runtime_transformations: matches
            .runtime
            .as_ref()
            .map(|m| m.transformations.clone())
            .unwrap_or_default(),
        runtime_values: matches
            .runtime
            .map(|m| m.values)
            .unwrap_or_default(),
        creation_transformations: matches
            .creation
            .as_ref()
            .map(|m| m.transformations.clone())
            .unwrap_or_default(),
        creation_values: matches
            .creation
            .map(|m| m.values)
            .unwrap_or_default(),
        onchain_runtime_code,
        onchain_creation_code,
        recompiled_runtime_code: compiled.runtime_code.clone(),
        recompiled_creation_code: compiled.creation_code.clone(),
        library_map,
        deployment,
        compiler: compilation.language.compiler(),
        language: compilation.language,
        compiler_version: compilation.version.to_string(),
        compilation_target: compilation.target,
        compiler_settings: compilation.input.settings,
        sources: compilation
            .input
            .sources
            .into_iter()
            .map(|(path, source)| (path, source.content))
            .collect(),
        metadata: compiled.metadata,
        compilation_artifacts: compiled.compilation_artifacts,
        creation_code_artifacts: compiled.creation_code_artifacts,
        runtime_code_artifacts: compiled.runtime_code_artifacts,
        compilation_time,
    })
}

async fn discover_creation_transaction(
    ctx: &VerificationContext<'_>,
    address: &[u8],
) -> Option<Vec<u8>> {
    let provider = ctx.creation_transaction_provider?;
    match provider
        .creation_transaction(ctx.chain.chain_id(), address)
        .await
    {
        Ok(hash) => hash,
        Err(err) => {
            tracing::warn!(
                chain_id = ctx.chain.chain_id(),
                "creation transaction discovery failed: {err:#}"
            );
            None
        }
    }
}

/// The creation side is best-effort: any failure here downgrades the
/// verification to runtime-only instead of aborting it.
async fn fetch_creation_side(
    ctx: &VerificationContext<'_>,
    transaction_hash: &[u8],
    address: &[u8],
) -> (Option<Vec<u8>>, DeploymentInfo) {
    let mut deployment = DeploymentInfo::default();

    let transaction = match ctx.chain.get_transaction(transaction_hash).await {
        Ok(Some(transaction)) => transaction,
        Ok(None) => {
            tracing::warn!(
                chain_id = ctx.chain.chain_id(),
                "creation transaction is not known to the rpc"
            );
            return (None, deployment);
        }
        Err(err) => {
            tracing::warn!(
                chain_id = ctx.chain.chain_id(),
                "fetching creation transaction failed: {err}"
            );
            return (None, deployment);
        }
    };

    deployment.block_number = transaction.block_number.map(|number| number as i64);
    deployment.transaction_index = transaction.transaction_index.map(|index| index as i64);
    deployment.deployer = transaction.from.as_ref().map(|from| from.to_vec());

    // a direct deployment carries the creation code as calldata;
    // factory children require transaction traces
    let creation_code = if transaction.to.is_none() {
        Ok(transaction.input.to_vec())
    } else {
        ctx.chain
            .get_creation_bytecode(transaction_hash, address)
            .await
    };

    match creation_code {
        Ok(code) => (Some(code), deployment),
        Err(err) => {
            tracing::warn!(
                chain_id = ctx.chain.chain_id(),
                "creation bytecode extraction failed: {err}"
            );
            (None, deployment)
        }
    }
}

fn compare_sides(
    compiled: &CompiledContract,
    onchain_runtime_code: &[u8],
    onchain_creation_code: Option<&[u8]>,
) -> SideMatches {
    let runtime = MatchBuilder::new(onchain_runtime_code, compiled.runtime_code.clone())
        .map(|builder| {
            builder.apply_runtime_code_transformations(
                &compiled.runtime_cbor_auxdata(),
                compiled.runtime_code_artifacts.link_references.as_ref(),
                compiled
                    .runtime_code_artifacts
                    .immutable_references
                    .as_ref(),
            )
        })
        .transpose()
        .unwrap_or_else(|err| {
            tracing::warn!("runtime code processing failed: {err:#}");
            None
        })
        .and_then(MatchBuilder::build);

    let creation = onchain_creation_code
        .and_then(|onchain_code| MatchBuilder::new(onchain_code, compiled.creation_code.clone()))
        .map(|builder| {
            builder.apply_creation_code_transformations(
                &compiled.creation_cbor_auxdata(),
                compiled.creation_code_artifacts.link_references.as_ref(),
                &compiled.compilation_artifacts,
            )
        })
        .transpose()
        .unwrap_or_else(|err| {
            tracing::warn!("creation code processing failed: {err:#}");
            None
        })
        .and_then(MatchBuilder::build);

    SideMatches { runtime, creation }
}

/// Perfect means the codes matched without substituting any non-empty
/// auxdata region; partial means they matched only after doing so.
fn classify(code_match: &Match) -> MatchType {
    let auxdata_substituted = code_match
        .transformations
        .iter()
        .any(|transformation| transformation.reason == TransformationReason::CborAuxdata)
        && code_match
            .values
            .cbor_auxdata
            .values()
            .any(|value| !value.is_empty());
    if auxdata_substituted {
        MatchType::Partial
    } else {
        MatchType::Perfect
    }
}

/// True when the metadata trailers of both runtime codes reference the
/// same content hash even though the codes themselves differ.
fn metadata_hashes_match(recompiled_runtime: &[u8], onchain_runtime: &[u8]) -> bool {
    let decode_tail = |code: &[u8]| -> Option<MetadataHash> {
        let auxdata = auxdata::from_tail_scan(code);
        let trailer = auxdata.get("1")?;
        let cbor = &trailer.value[..trailer.value.len().checked_sub(2)?];
        MetadataHash::from_cbor(cbor).ok().map(|(hash, _)| hash)
    };

    match (decode_tail(recompiled_runtime), decode_tail(onchain_runtime)) {
        (Some(recompiled), Some(onchain)) => {
            let ipfs_matches = recompiled.ipfs.is_some() && recompiled.ipfs == onchain.ipfs;
            let bzzr_matches = recompiled.bzzr.is_some() && recompiled.bzzr == onchain.bzzr;
            ipfs_matches || bzzr_matches
        }
        _ => false,
    }
}

fn bytecode_mismatch(
    compiled: &CompiledContract,
    onchain_runtime_code: Vec<u8>,
    onchain_creation_code: Option<Vec<u8>>,
    creation_transaction_hash: Option<Vec<u8>>,
) -> VerificationError {
    VerificationError::BytecodeMismatch(Box::new(MismatchPayload {
        onchain_runtime_code: Some(onchain_runtime_code),
        onchain_creation_code,
        recompiled_runtime_code: Some(compiled.runtime_code.clone()),
        recompiled_creation_code: Some(compiled.creation_code.clone()),
        creation_transaction_hash,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn match_with(transformations: Vec<Transformation>, values: Values) -> Match {
        Match {
            metadata_match: false,
            transformations,
            values,
        }
    }

    #[test]
    fn match_without_auxdata_substitution_is_perfect() {
        let code_match = match_with(vec![Transformation::immutable(10, "3")], Values::default());
        assert_eq!(classify(&code_match), MatchType::Perfect);
    }

    #[test]
    fn match_with_substituted_auxdata_is_partial() {
        let mut values = Values::default();
        values.add_cbor_auxdata("1", Bytes::from(vec![0xaa]));
        let code_match = match_with(vec![Transformation::cbor_auxdata(250, "1")], values);
        assert_eq!(classify(&code_match), MatchType::Partial);
    }

    #[test]
    fn empty_auxdata_values_still_count_as_perfect() {
        let mut values = Values::default();
        values.add_cbor_auxdata("1", Bytes::new());
        let code_match = match_with(vec![Transformation::cbor_auxdata(250, "1")], values);
        assert_eq!(classify(&code_match), MatchType::Perfect);
    }

    #[test]
    fn perfect_outranks_partial() {
        assert!(MatchType::Perfect > MatchType::Partial);
    }

    #[test]
    fn metadata_hash_comparison_requires_equal_content_hashes() {
        // { "ipfs": ..., "solc": 0.8.14 } with the length suffix
        let trailer = hex::decode("a2646970667358221220bcc988b1311237f2c00ccd0bfbd8b01d24dc18f720603b0de93fe6327df5362564736f6c634300080e0033").unwrap();
        let mut first = vec![0x60, 0x80, 0x60, 0x40];
        first.extend(&trailer);
        let mut second = vec![0x11, 0x22];
        second.extend(&trailer);

        assert!(metadata_hashes_match(&first, &second));
        assert!(!metadata_hashes_match(&first, &[0x60, 0x80]));
    }
}
