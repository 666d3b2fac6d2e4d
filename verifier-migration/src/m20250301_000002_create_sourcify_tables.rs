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
    /*
        The canonical (best) verification of a deployment. When a better
        verdict arrives the row is re-pointed in place; verified_contracts
        history is kept untouched.
    */
    CREATE TABLE sourcify_matches
    (
        id                      BIGSERIAL NOT NULL PRIMARY KEY,

        created_at              timestamptz NOT NULL DEFAULT NOW(),
        updated_at              timestamptz NOT NULL DEFAULT NOW(),

        verified_contract_id    bigint NOT NULL REFERENCES verified_contracts (id),
        deployment_id           uuid NOT NULL REFERENCES contract_deployments (id),

        /* 'perfect' | 'partial', null when the side did not match */
        creation_match          varchar,
        runtime_match           varchar,

        /* user-facing compilation summary */
        metadata                jsonb NOT NULL,
        license                 varchar,
        label                   varchar,
        similar_match_id        bigint REFERENCES sourcify_matches (id),

        CONSTRAINT sourcify_matches_verified_contract_id_pseudo_pkey UNIQUE (verified_contract_id),
        CONSTRAINT sourcify_matches_deployment_id_pseudo_pkey UNIQUE (deployment_id)
    );

    /*
        Job observability: a row is inserted before any compiler work
        begins and updated exactly once at terminal state.
    */
    CREATE TABLE verification_jobs
    (
        id                      uuid NOT NULL PRIMARY KEY DEFAULT gen_random_uuid(),

        started_at              timestamptz NOT NULL DEFAULT NOW(),
        completed_at            timestamptz,

        chain_id                numeric NOT NULL,
        contract_address        bytea NOT NULL,

        verified_contract_id    bigint REFERENCES verified_contracts (id),

        error_code              varchar,
        error_id                uuid,
        error_data              jsonb,

        compilation_time_ms     bigint,
        verification_endpoint   varchar NOT NULL,
        hardware                varchar
    );

    CREATE INDEX verification_jobs_chain_id_contract_address
        ON verification_jobs USING btree (chain_id, contract_address);

    /*
        Large job payloads, prunable independently of the job history.
    */
    CREATE TABLE verification_jobs_ephemeral
    (
        id                          uuid NOT NULL PRIMARY KEY REFERENCES verification_jobs (id),

        onchain_runtime_code        bytea,
        onchain_creation_code       bytea,
        recompiled_runtime_code     bytea,
        recompiled_creation_code    bytea,
        creation_transaction_hash   bytea
    );
"#;

const DOWN_QUERY: &str = r#"
    DROP TABLE verification_jobs_ephemeral;
    DROP TABLE verification_jobs;
    DROP TABLE sourcify_matches;
"#;
