use super::errors::VerificationError;
use crate::{
    bytecode::{
        artifacts::{
            CborAuxdata, CompilationArtifacts, CreationCodeArtifacts, ImmutableReferences,
            LinkReferences, RuntimeCodeArtifacts,
        },
        auxdata, link_references,
    },
    compilers::{CompilersPool, DetailedVersion},
    standard_json::{CompilerInput, Contract, Language},
};
use semver::Version;

/// solc releases older than this have no official static binaries.
const MINIMUM_SOLC_VERSION: Version = Version::new(0, 4, 11);
/// `legacyAssembly` carries no auxdata before this release; extraction
/// falls back to scanning the bytecode tail.
const LEGACY_ASSEMBLY_AUXDATA_SINCE: Version = Version::new(0, 4, 12);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilationTarget {
    pub path: String,
    pub contract: String,
}

impl CompilationTarget {
    pub fn new(path: impl Into<String>, contract: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contract: contract.into(),
        }
    }

    pub fn fully_qualified_name(&self) -> String {
        format!("{}:{}", self.path, self.contract)
    }
}

/// A compilable unit: language, compiler release, standard JSON input
/// and the target contract to verify. The three languages go through
/// the same capability set, only auxdata discovery differs.
#[derive(Clone, Debug)]
pub struct Compilation {
    pub language: Language,
    pub version: DetailedVersion,
    pub input: CompilerInput,
    pub target: CompilationTarget,
}

impl Compilation {
    pub fn new(
        language: Language,
        version: DetailedVersion,
        mut input: CompilerInput,
        target: CompilationTarget,
    ) -> Result<Self, VerificationError> {
        if matches!(language, Language::Solidity | Language::Yul)
            && version.release() < MINIMUM_SOLC_VERSION
        {
            return Err(VerificationError::UnsupportedCompilerVersion(
                version.to_string(),
            ));
        }
        input.normalize_output_selection();
        Ok(Self {
            language,
            version,
            input,
            target,
        })
    }

    pub async fn compile(
        &self,
        compilers: &CompilersPool,
        force_emscripten: bool,
    ) -> Result<CompiledContract, VerificationError> {
        let output = compilers
            .compile(&self.version, &self.input, force_emscripten)
            .await?;

        if output.has_errors() {
            return Err(VerificationError::Compiler(output.error_messages()));
        }

        let contract = output
            .contract(&self.target.path, &self.target.contract)
            .ok_or_else(|| {
                VerificationError::ContractNotFound(self.target.fully_qualified_name())
            })?;

        let compilation_artifacts = CompilationArtifacts {
            abi: contract.abi.clone(),
            devdoc: contract.devdoc.clone(),
            userdoc: contract.userdoc.clone(),
            storage_layout: contract.storage_layout.clone(),
            sources: Some(serde_json::to_value(output.source_ids()).expect("map of json values")),
        };

        self.extract_code_artifacts(contract, compilation_artifacts)
    }

    fn extract_code_artifacts(
        &self,
        contract: &Contract,
        compilation_artifacts: CompilationArtifacts,
    ) -> Result<CompiledContract, VerificationError> {
        let evm = contract.evm.as_ref().ok_or_else(|| {
            VerificationError::ContractNotFound(self.target.fully_qualified_name())
        })?;

        let creation_object = evm
            .bytecode
            .as_ref()
            .and_then(|bytecode| bytecode.object.as_deref())
            .ok_or_else(|| {
                VerificationError::ContractNotFound(self.target.fully_qualified_name())
            })?;
        let runtime_object = evm
            .deployed_bytecode
            .as_ref()
            .and_then(|bytecode| bytecode.bytecode.object.as_deref())
            .ok_or_else(|| {
                VerificationError::ContractNotFound(self.target.fully_qualified_name())
            })?;

        let (creation_code, creation_sites) = link_references::parse_unlinked(creation_object)
            .map_err(|err| VerificationError::MissingOrInvalidSource(err.to_string()))?;
        let (runtime_code, runtime_sites) = link_references::parse_unlinked(runtime_object)
            .map_err(|err| VerificationError::MissingOrInvalidSource(err.to_string()))?;

        let creation_links = typed_link_references(
            evm.bytecode.as_ref().and_then(|b| b.link_references.as_ref()),
        )
        .unwrap_or_else(|| link_references::to_link_references(&creation_sites));
        let runtime_links = typed_link_references(
            evm.deployed_bytecode
                .as_ref()
                .and_then(|b| b.bytecode.link_references.as_ref()),
        )
        .unwrap_or_else(|| link_references::to_link_references(&runtime_sites));

        let immutable_references: Option<ImmutableReferences> = evm
            .deployed_bytecode
            .as_ref()
            .and_then(|b| b.immutable_references.as_ref())
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .filter(|references: &ImmutableReferences| !references.is_empty());

        let (creation_cbor_auxdata, runtime_cbor_auxdata) = if self.input.append_cbor_disabled() {
            (CborAuxdata::new(), CborAuxdata::new())
        } else {
            (
                self.locate_auxdata(&creation_code, evm.legacy_assembly.as_ref()),
                self.locate_auxdata(&runtime_code, evm.legacy_assembly.as_ref()),
            )
        };

        let creation_code_artifacts = CreationCodeArtifacts {
            source_map: evm
                .bytecode
                .as_ref()
                .and_then(|b| b.source_map.clone()),
            link_references: (!creation_links.is_empty()).then_some(creation_links),
            cbor_auxdata: (!creation_cbor_auxdata.is_empty()).then_some(creation_cbor_auxdata),
        };
        let runtime_code_artifacts = RuntimeCodeArtifacts {
            source_map: evm
                .deployed_bytecode
                .as_ref()
                .and_then(|b| b.bytecode.source_map.clone()),
            link_references: (!runtime_links.is_empty()).then_some(runtime_links),
            immutable_references,
            cbor_auxdata: (!runtime_cbor_auxdata.is_empty()).then_some(runtime_cbor_auxdata),
        };

        Ok(CompiledContract {
            creation_code,
            runtime_code,
            metadata: contract.metadata.clone(),
            compilation_artifacts,
            creation_code_artifacts,
            runtime_code_artifacts,
        })
    }

    fn locate_auxdata(&self, code: &[u8], legacy_assembly: Option<&serde_json::Value>) -> CborAuxdata {
        let use_legacy_assembly = matches!(self.language, Language::Solidity | Language::Yul)
            && self.version.release() >= LEGACY_ASSEMBLY_AUXDATA_SINCE;
        if use_legacy_assembly {
            if let Some(legacy_assembly) = legacy_assembly {
                let located = auxdata::from_legacy_assembly(code, legacy_assembly);
                if !located.is_empty() {
                    return located;
                }
            }
        }
        auxdata::from_tail_scan(code)
    }
}

fn typed_link_references(value: Option<&serde_json::Value>) -> Option<LinkReferences> {
    let references: LinkReferences = serde_json::from_value(value?.clone()).ok()?;
    (!references.is_empty()).then_some(references)
}

/// Everything the engine needs from one compiler run of the target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledContract {
    pub creation_code: Vec<u8>,
    pub runtime_code: Vec<u8>,
    /// The contract metadata JSON string, when the compiler emits one.
    pub metadata: Option<String>,
    pub compilation_artifacts: CompilationArtifacts,
    pub creation_code_artifacts: CreationCodeArtifacts,
    pub runtime_code_artifacts: RuntimeCodeArtifacts,
}

impl CompiledContract {
    pub fn creation_cbor_auxdata(&self) -> CborAuxdata {
        self.creation_code_artifacts
            .cbor_auxdata
            .clone()
            .unwrap_or_default()
    }

    pub fn runtime_cbor_auxdata(&self) -> CborAuxdata {
        self.runtime_code_artifacts
            .cbor_auxdata
            .clone()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn input() -> CompilerInput {
        CompilerInput::new(Language::Solidity, BTreeMap::new())
    }

    #[test]
    fn pre_0_4_11_solidity_is_rejected_at_construction() {
        let version: DetailedVersion = "v0.4.10+commit.f0d539ae".parse().unwrap();
        let err = Compilation::new(
            Language::Solidity,
            version,
            input(),
            CompilationTarget::new("a.sol", "A"),
        )
        .expect_err("must reject");
        assert_eq!(err.code(), "unsupported_compiler_version");
    }

    #[test]
    fn boundary_version_is_accepted() {
        let version: DetailedVersion = "v0.4.11+commit.68ef5810".parse().unwrap();
        Compilation::new(
            Language::Solidity,
            version,
            input(),
            CompilationTarget::new("a.sol", "A"),
        )
        .expect("0.4.11 is the oldest supported release");
    }

    #[test]
    fn old_vyper_versions_are_not_gated() {
        let version: DetailedVersion = "v0.2.11+commit.5db35ef1".parse().unwrap();
        Compilation::new(
            Language::Vyper,
            version,
            CompilerInput::new(Language::Vyper, BTreeMap::new()),
            CompilationTarget::new("a.vy", "a"),
        )
        .expect("vyper has its own release line");
    }
}
