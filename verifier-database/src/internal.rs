use crate::helpers::insert_then_select;
use anyhow::{anyhow, Context};
use sea_orm::{
    prelude::Decimal, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder,
};
use sha2::{Digest, Sha256};
use sha3::Keccak256;
use std::str::FromStr;
use verifier_core::VerificationExport;
use verifier_entity::{
    code, compiled_contracts, compiled_contracts_signatures, compiled_contracts_sources,
    contract_deployments, contracts, signatures, sources, verified_contracts,
};

pub(crate) fn parse_chain_id(chain_id: &str) -> Result<Decimal, anyhow::Error> {
    Decimal::from_str(chain_id).with_context(|| format!("invalid chain id: {chain_id}"))
}

pub(crate) fn keccak256(data: &[u8]) -> Vec<u8> {
    Keccak256::digest(data).to_vec()
}

pub(crate) async fn insert_code<C: ConnectionTrait>(
    txn: &C,
    code: Vec<u8>,
) -> Result<code::Model, anyhow::Error> {
    let code_hash = Sha256::digest(&code).to_vec();
    let code_hash_keccak = keccak256(&code);

    let active_model = code::ActiveModel {
        code_hash: Set(code_hash.clone()),
        created_at: Default::default(),
        updated_at: Default::default(),
        code_hash_keccak: Set(code_hash_keccak),
        code: Set(Some(code)),
    };

    let (model, _inserted) = insert_then_select!(txn, code, active_model, [(CodeHash, code_hash)])?;
    Ok(model)
}

pub(crate) async fn insert_contract<C: ConnectionTrait>(
    txn: &C,
    creation_code: Option<Vec<u8>>,
    runtime_code: Vec<u8>,
) -> Result<contracts::Model, anyhow::Error> {
    // missing creation code maps to the '\x' sentinel row
    let creation_code_hash = match creation_code {
        Some(creation_code) => {
            insert_code(txn, creation_code)
                .await
                .context("insert creation code")?
                .code_hash
        }
        None => vec![],
    };
    let runtime_code_hash = insert_code(txn, runtime_code)
        .await
        .context("insert runtime code")?
        .code_hash;

    let active_model = contracts::ActiveModel {
        id: Default::default(),
        created_at: Default::default(),
        updated_at: Default::default(),
        creation_code_hash: Set(creation_code_hash.clone()),
        runtime_code_hash: Set(runtime_code_hash.clone()),
    };

    let (model, _inserted) = insert_then_select!(
        txn,
        contracts,
        active_model,
        [
            (CreationCodeHash, creation_code_hash),
            (RuntimeCodeHash, runtime_code_hash)
        ]
    )?;
    Ok(model)
}

pub(crate) async fn insert_contract_deployment<C: ConnectionTrait>(
    txn: &C,
    export: &VerificationExport,
) -> Result<contract_deployments::Model, anyhow::Error> {
    let chain_id = parse_chain_id(&export.chain_id)?;
    let contract = insert_contract(
        txn,
        export.onchain_creation_code.clone(),
        export.onchain_runtime_code.clone(),
    )
    .await
    .context("insert contract")?;

    // deployments without a known creation transaction use the keccak of
    // the runtime code as a synthetic transaction hash, so the
    // (chain_id, address, transaction_hash) key still distinguishes
    // different code at the same address
    let transaction_hash = export
        .deployment
        .transaction_hash
        .clone()
        .unwrap_or_else(|| keccak256(&export.onchain_runtime_code));

    let active_model = contract_deployments::ActiveModel {
        id: Default::default(),
        created_at: Default::default(),
        updated_at: Default::default(),
        chain_id: Set(chain_id),
        address: Set(export.address.clone()),
        transaction_hash: Set(transaction_hash.clone()),
        block_number: Set(Decimal::from(export.deployment.block_number.unwrap_or(-1))),
        transaction_index: Set(Decimal::from(
            export.deployment.transaction_index.unwrap_or(-1),
        )),
        deployer: Set(export.deployment.deployer.clone().unwrap_or_default()),
        contract_id: Set(contract.id),
    };

    let (model, _inserted) = insert_then_select!(
        txn,
        contract_deployments,
        active_model,
        [
            (ChainId, chain_id),
            (Address, export.address.clone()),
            (TransactionHash, transaction_hash)
        ]
    )?;
    Ok(model)
}

pub(crate) async fn insert_compiled_contract<C: ConnectionTrait>(
    txn: &C,
    export: &VerificationExport,
) -> Result<compiled_contracts::Model, anyhow::Error> {
    let creation_code_hash = insert_code(txn, export.recompiled_creation_code.clone())
        .await
        .context("insert recompiled creation code")?
        .code_hash;
    let runtime_code_hash = insert_code(txn, export.recompiled_runtime_code.clone())
        .await
        .context("insert recompiled runtime code")?
        .code_hash;

    let compiler = export.compiler.to_string();
    let language = export.language.as_str().to_string();

    let active_model = compiled_contracts::ActiveModel {
        id: Default::default(),
        created_at: Default::default(),
        updated_at: Default::default(),
        compiler: Set(compiler.clone()),
        version: Set(export.compiler_version.clone()),
        language: Set(language.clone()),
        name: Set(export.compilation_target.contract.clone()),
        fully_qualified_name: Set(export.compilation_target.fully_qualified_name()),
        compiler_settings: Set(export.compiler_settings.clone()),
        compilation_artifacts: Set(export.compilation_artifacts.clone().into()),
        creation_code_hash: Set(creation_code_hash.clone()),
        creation_code_artifacts: Set(export.creation_code_artifacts.clone().into()),
        runtime_code_hash: Set(runtime_code_hash.clone()),
        runtime_code_artifacts: Set(export.runtime_code_artifacts.clone().into()),
    };

    let (model, _inserted) = insert_then_select!(
        txn,
        compiled_contracts,
        active_model,
        [
            (Compiler, compiler),
            (Language, language),
            (CreationCodeHash, creation_code_hash),
            (RuntimeCodeHash, runtime_code_hash)
        ]
    )?;
    Ok(model)
}

pub(crate) async fn insert_sources<C: ConnectionTrait>(
    txn: &C,
    compilation_id: uuid::Uuid,
    files: &std::collections::BTreeMap<String, String>,
) -> Result<(), anyhow::Error> {
    for (path, content) in files {
        let source_hash = Sha256::digest(content.as_bytes()).to_vec();
        let source_hash_keccak = keccak256(content.as_bytes());

        let active_model = sources::ActiveModel {
            source_hash: Set(source_hash.clone()),
            source_hash_keccak: Set(source_hash_keccak),
            content: Set(content.clone()),
            created_at: Default::default(),
            updated_at: Default::default(),
        };
        let (_model, _inserted) =
            insert_then_select!(txn, sources, active_model, [(SourceHash, source_hash.clone())])?;

        let link = compiled_contracts_sources::ActiveModel {
            id: Default::default(),
            compilation_id: Set(compilation_id),
            source_hash: Set(source_hash),
            path: Set(path.clone()),
        };
        let (_model, _inserted) = insert_then_select!(
            txn,
            compiled_contracts_sources,
            link,
            [(CompilationId, compilation_id), (Path, path.clone())]
        )?;
    }
    Ok(())
}

/// Records the selectors of the compiled contract so the signature
/// registry can flag hashes that belong to verified code.
pub(crate) async fn insert_signatures<C: ConnectionTrait>(
    txn: &C,
    compilation_id: uuid::Uuid,
    abi: Option<&serde_json::Value>,
) -> Result<(), anyhow::Error> {
    let Some(abi) = abi else { return Ok(()) };
    let abi: alloy_json_abi::JsonAbi =
        serde_json::from_value(abi.clone()).context("parsing compiled contract abi")?;

    let mut entries: Vec<(String, &'static str)> = Vec::new();
    for function in abi.functions.into_values().flatten() {
        entries.push((function.signature(), "function"));
    }
    for event in abi.events.into_values().flatten() {
        if !event.anonymous {
            entries.push((event.signature(), "event"));
        }
    }
    for error in abi.errors.into_values().flatten() {
        entries.push((error.signature(), "error"));
    }

    for (signature, signature_type) in entries {
        let hash_32 = keccak256(signature.as_bytes());
        let hash_4 = hash_32[..4].to_vec();

        let signature_model = signatures::ActiveModel {
            signature_hash_32: Set(hash_32.clone()),
            signature_hash_4: Set(hash_4),
            signature: Set(signature),
            created_at: Default::default(),
        };
        let (_model, _inserted) = insert_then_select!(
            txn,
            signatures,
            signature_model,
            [(SignatureHash32, hash_32.clone())]
        )?;

        let link = compiled_contracts_signatures::ActiveModel {
            id: Default::default(),
            compilation_id: Set(compilation_id),
            signature_hash_32: Set(hash_32.clone()),
            signature_type: Set(signature_type.to_string()),
        };
        let (_model, _inserted) = insert_then_select!(
            txn,
            compiled_contracts_signatures,
            link,
            [
                (CompilationId, compilation_id),
                (SignatureHash32, hash_32),
                (SignatureType, signature_type)
            ]
        )?;
    }
    Ok(())
}

pub(crate) async fn insert_verified_contract<C: ConnectionTrait>(
    txn: &C,
    deployment_id: uuid::Uuid,
    compilation_id: uuid::Uuid,
    export: &VerificationExport,
) -> Result<verified_contracts::Model, anyhow::Error> {
    if export.runtime_match.is_none() && export.creation_match.is_none() {
        return Err(anyhow!(
            "a verified contract requires at least one matched side"
        ));
    }

    let runtime_matched = export.runtime_match.is_some();
    let creation_matched = export.creation_match.is_some();

    let active_model = verified_contracts::ActiveModel {
        id: Default::default(),
        created_at: Default::default(),
        updated_at: Default::default(),
        deployment_id: Set(deployment_id),
        compilation_id: Set(compilation_id),
        creation_match: Set(creation_matched),
        creation_values: Set(creation_matched
            .then(|| export.creation_values.clone().into())),
        creation_transformations: Set(creation_matched.then(|| {
            serde_json::to_value(&export.creation_transformations)
                .expect("transformations serialization must succeed")
        })),
        creation_metadata_match: Set(export.creation_metadata_match),
        runtime_match: Set(runtime_matched),
        runtime_values: Set(runtime_matched.then(|| export.runtime_values.clone().into())),
        runtime_transformations: Set(runtime_matched.then(|| {
            serde_json::to_value(&export.runtime_transformations)
                .expect("transformations serialization must succeed")
        })),
        runtime_metadata_match: Set(export.runtime_metadata_match),
    };

    let (model, _inserted) = insert_then_select!(
        txn,
        verified_contracts,
        active_model,
        [
            (CompilationId, compilation_id),
            (DeploymentId, deployment_id)
        ]
    )?;
    Ok(model)
}

/// The most recent deployment of an address, by block number.
pub(crate) async fn retrieve_latest_deployment<C: ConnectionTrait>(
    db: &C,
    chain_id: Decimal,
    address: &[u8],
) -> Result<Option<contract_deployments::Model>, anyhow::Error> {
    contract_deployments::Entity::find()
        .filter(contract_deployments::Column::ChainId.eq(chain_id))
        .filter(contract_deployments::Column::Address.eq(address.to_vec()))
        .order_by_desc(contract_deployments::Column::BlockNumber)
        .one(db)
        .await
        .context("select from \"contract_deployments\"")
}
