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
    CREATE TABLE signatures
    (
        /* keccak256 of the signature text */
        signature_hash_32   bytea NOT NULL PRIMARY KEY,
        /* first four bytes of signature_hash_32 */
        signature_hash_4    bytea NOT NULL,
        signature           varchar NOT NULL,
        created_at          timestamptz NOT NULL DEFAULT NOW(),

        CONSTRAINT signatures_hash_4_is_prefix
            CHECK (signature_hash_4 = substring(signature_hash_32 from 1 for 4))
    );

    CREATE INDEX signatures_signature_hash_4 ON signatures USING btree (signature_hash_4);

    CREATE TABLE compiled_contracts_signatures
    (
        id                  uuid NOT NULL PRIMARY KEY DEFAULT gen_random_uuid(),

        compilation_id      uuid NOT NULL REFERENCES compiled_contracts (id),
        signature_hash_32   bytea NOT NULL REFERENCES signatures (signature_hash_32),
        /* 'function' | 'event' | 'error' */
        signature_type      varchar NOT NULL,

        CONSTRAINT compiled_contracts_signatures_pseudo_pkey
            UNIQUE (compilation_id, signature_hash_32, signature_type),
        CONSTRAINT compiled_contracts_signatures_type_check
            CHECK (signature_type IN ('function', 'event', 'error'))
    );

    CREATE INDEX compiled_contracts_signatures_signature_hash_32
        ON compiled_contracts_signatures USING btree (signature_hash_32);
    CREATE INDEX compiled_contracts_signatures_compilation_id
        ON compiled_contracts_signatures USING btree (compilation_id);

    CREATE MATERIALIZED VIEW signature_stats AS
    SELECT
        (SELECT COUNT(*) FROM signatures)                                           AS total,
        (SELECT COUNT(DISTINCT signature_hash_32) FROM compiled_contracts_signatures
            WHERE signature_type = 'function')                                      AS function_count,
        (SELECT COUNT(DISTINCT signature_hash_32) FROM compiled_contracts_signatures
            WHERE signature_type = 'event')                                         AS event_count,
        (SELECT COUNT(DISTINCT signature_hash_32) FROM compiled_contracts_signatures
            WHERE signature_type = 'error')                                         AS error_count,
        (SELECT COUNT(*) FROM signatures s WHERE NOT EXISTS
            (SELECT 1 FROM compiled_contracts_signatures ccs
                WHERE ccs.signature_hash_32 = s.signature_hash_32))                 AS unknown,
        NOW()                                                                       AS refreshed_at;
"#;

const DOWN_QUERY: &str = r#"
    DROP MATERIALIZED VIEW signature_stats;
    DROP TABLE compiled_contracts_signatures;
    DROP TABLE signatures;
"#;
