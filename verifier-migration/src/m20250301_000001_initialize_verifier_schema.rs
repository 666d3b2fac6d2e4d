use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(UP_QUERY)
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(DOWN_QUERY)
            .await?;
        Ok(())
    }
}

const UP_QUERY: &str = r#"
    /* Needed for gen_random_uuid() and digest(..) */
    CREATE EXTENSION IF NOT EXISTS pgcrypto;

    /*
        Content-addressed bytecode store. Rows are never mutated: updates
        are inserts keyed by hash.

        The `code` column is nullable to distinguish "empty code" (a
        deployment whose creation returned nothing) from "no code"
        (genesis contracts whose creation code was never on chain).
    */
    CREATE TABLE code
    (
        /* sha256 of the `code` column; the keccak256 twin below serves
           chain-side lookups, where keccak is the native identity */
        code_hash           bytea NOT NULL PRIMARY KEY,

        created_at          timestamptz NOT NULL DEFAULT NOW(),
        updated_at          timestamptz NOT NULL DEFAULT NOW(),

        code_hash_keccak    bytea NOT NULL,
        code                bytea,

        CONSTRAINT code_hash_check
            CHECK (code IS NOT NULL AND code_hash = digest(code, 'sha256') OR code IS NULL AND code_hash = '\x'::bytea)
    );

    CREATE INDEX code_code_hash_keccak ON code USING btree(code_hash_keccak);

    /* sentinel row referenced by contracts without creation code */
    INSERT INTO code (code_hash, code_hash_keccak, code) VALUES ('\x', '\x', NULL);

    /*
        Chain-agnostic identity of deployed bytecode: the pair of
        creation and runtime code hashes.
    */
    CREATE TABLE contracts
    (
        id                  uuid NOT NULL PRIMARY KEY DEFAULT gen_random_uuid(),

        created_at          timestamptz NOT NULL DEFAULT NOW(),
        updated_at          timestamptz NOT NULL DEFAULT NOW(),

        creation_code_hash  bytea NOT NULL REFERENCES code (code_hash),
        runtime_code_hash   bytea NOT NULL REFERENCES code (code_hash),

        CONSTRAINT contracts_pseudo_pkey UNIQUE (creation_code_hash, runtime_code_hash)
    );

    CREATE INDEX contracts_creation_code_hash ON contracts USING btree(creation_code_hash);
    CREATE INDEX contracts_runtime_code_hash ON contracts USING btree(runtime_code_hash);

    /*
        One row per deployment of a contract on a chain. An address may
        collect several rows over its history (redeployment after
        selfdestruct). Genesis contracts use a synthetic transaction
        hash and -1 for block number and transaction index.
    */
    CREATE TABLE contract_deployments
    (
        id                  uuid NOT NULL PRIMARY KEY DEFAULT gen_random_uuid(),

        created_at          timestamptz NOT NULL DEFAULT NOW(),
        updated_at          timestamptz NOT NULL DEFAULT NOW(),

        chain_id            numeric NOT NULL,
        address             bytea NOT NULL,
        transaction_hash    bytea NOT NULL,
        block_number        numeric NOT NULL,
        transaction_index   numeric NOT NULL,
        deployer            bytea NOT NULL,

        contract_id         uuid NOT NULL REFERENCES contracts(id),

        CONSTRAINT contract_deployments_pseudo_pkey UNIQUE (chain_id, address, transaction_hash)
    );

    CREATE INDEX contract_deployments_contract_id ON contract_deployments USING btree(contract_id);
    CREATE INDEX contract_deployments_chain_id_address ON contract_deployments USING btree(chain_id, address);

    /*
        One row per compilation: the inputs (compiler identity, settings,
        sources) that produced a pair of bytecodes, plus the artifacts
        needed to replay transformations. Two compilations producing the
        same bytecodes collapse into one row.
    */
    CREATE TABLE compiled_contracts
    (
        id                      uuid NOT NULL PRIMARY KEY DEFAULT gen_random_uuid(),

        created_at              timestamptz NOT NULL DEFAULT NOW(),
        updated_at              timestamptz NOT NULL DEFAULT NOW(),

        /* compiler is the software ('solc', 'vyper'), language the syntax
           ('solidity', 'yul', 'vyper') */
        compiler                varchar NOT NULL,
        version                 varchar NOT NULL,
        language                varchar NOT NULL,

        name                    varchar NOT NULL,
        fully_qualified_name    varchar NOT NULL,

        compiler_settings       jsonb NOT NULL,
        compilation_artifacts   jsonb NOT NULL,

        creation_code_hash      bytea NOT NULL REFERENCES code (code_hash),
        creation_code_artifacts jsonb NOT NULL,
        runtime_code_hash       bytea NOT NULL REFERENCES code (code_hash),
        runtime_code_artifacts  jsonb NOT NULL,

        CONSTRAINT compiled_contracts_pseudo_pkey UNIQUE (compiler, language, creation_code_hash, runtime_code_hash)
    );

    CREATE INDEX compiled_contracts_creation_code_hash ON compiled_contracts USING btree (creation_code_hash);
    CREATE INDEX compiled_contracts_runtime_code_hash ON compiled_contracts USING btree (runtime_code_hash);

    /* Content-addressed source files, shared across compilations. */
    CREATE TABLE sources
    (
        source_hash         bytea NOT NULL PRIMARY KEY,
        source_hash_keccak  bytea NOT NULL,
        content             varchar NOT NULL,

        created_at          timestamptz NOT NULL DEFAULT NOW(),
        updated_at          timestamptz NOT NULL DEFAULT NOW(),

        CONSTRAINT source_hash_check CHECK (source_hash = digest(content, 'sha256'))
    );

    CREATE TABLE compiled_contracts_sources
    (
        id              uuid NOT NULL PRIMARY KEY DEFAULT gen_random_uuid(),

        compilation_id  uuid NOT NULL REFERENCES compiled_contracts(id),
        source_hash     bytea NOT NULL REFERENCES sources(source_hash),
        path            varchar NOT NULL,

        CONSTRAINT compiled_contracts_sources_pseudo_pkey UNIQUE (compilation_id, path)
    );

    CREATE INDEX compiled_contracts_sources_source_hash ON compiled_contracts_sources USING btree (source_hash);
    CREATE INDEX compiled_contracts_sources_compilation_id ON compiled_contracts_sources (compilation_id);

    /*
        Links a compilation to a deployment together with the verdict.
        Only one side has to match: proxies returning custom runtime code
        match on creation only, create2-factory children on runtime only.
    */
    CREATE TABLE verified_contracts
    (
        id                          BIGSERIAL NOT NULL PRIMARY KEY,

        created_at                  timestamptz NOT NULL DEFAULT NOW(),
        updated_at                  timestamptz NOT NULL DEFAULT NOW(),

        deployment_id               uuid NOT NULL REFERENCES contract_deployments (id),
        compilation_id              uuid NOT NULL REFERENCES compiled_contracts (id),

        creation_match              bool NOT NULL,
        creation_values             jsonb,
        creation_transformations    jsonb,
        creation_metadata_match     bool,

        runtime_match               bool NOT NULL,
        runtime_values              jsonb,
        runtime_transformations     jsonb,
        runtime_metadata_match      bool,

        CONSTRAINT verified_contracts_pseudo_pkey UNIQUE (compilation_id, deployment_id),
        CONSTRAINT verified_contracts_match_exists
            CHECK (creation_match = true OR runtime_match = true),
        CONSTRAINT verified_contracts_creation_match_integrity
            CHECK ((creation_match = false AND creation_values IS NULL AND creation_transformations IS NULL AND creation_metadata_match IS NULL) OR
                   (creation_match = true AND creation_values IS NOT NULL AND creation_transformations IS NOT NULL AND creation_metadata_match IS NOT NULL)),
        CONSTRAINT verified_contracts_runtime_match_integrity
            CHECK ((runtime_match = false AND runtime_values IS NULL AND runtime_transformations IS NULL AND runtime_metadata_match IS NULL) OR
                   (runtime_match = true AND runtime_values IS NOT NULL AND runtime_transformations IS NOT NULL AND runtime_metadata_match IS NOT NULL))
    );

    CREATE INDEX verified_contracts_deployment_id ON verified_contracts USING btree (deployment_id);
    CREATE INDEX verified_contracts_compilation_id ON verified_contracts USING btree (compilation_id);
"#;

const DOWN_QUERY: &str = r#"
    DROP TABLE verified_contracts;
    DROP TABLE compiled_contracts_sources;
    DROP TABLE sources;
    DROP TABLE compiled_contracts;
    DROP TABLE contract_deployments;
    DROP TABLE contracts;
    DROP TABLE code;
    DROP EXTENSION pgcrypto;
"#;
