use anyhow::Context;
use sea_orm::{ConnectionTrait, DbBackend, Statement};

/// Scoped cascade for one `(chain_id, address)`: ephemeral payloads,
/// jobs, canonical matches and verified contracts of the address go
/// first; the shared content-addressed rows they pointed at are then
/// collected by the orphan passes.
pub(crate) async fn delete_address_rows<C: ConnectionTrait>(
    db: &C,
    chain_id: sea_orm::prelude::Decimal,
    address: &[u8],
) -> Result<(), anyhow::Error> {
    let scoped_statements = [
        r#"DELETE FROM verification_jobs_ephemeral e
            USING verification_jobs j
            WHERE e.id = j.id AND j.chain_id = $1 AND j.contract_address = $2"#,
        r#"DELETE FROM verification_jobs
            WHERE chain_id = $1 AND contract_address = $2"#,
        r#"UPDATE sourcify_matches SET similar_match_id = NULL
            WHERE similar_match_id IN (
                SELECT sm.id FROM sourcify_matches sm
                JOIN contract_deployments cd ON sm.deployment_id = cd.id
                WHERE cd.chain_id = $1 AND cd.address = $2)"#,
        r#"DELETE FROM sourcify_matches sm
            USING contract_deployments cd
            WHERE sm.deployment_id = cd.id AND cd.chain_id = $1 AND cd.address = $2"#,
        r#"DELETE FROM verified_contracts vc
            USING contract_deployments cd
            WHERE vc.deployment_id = cd.id AND cd.chain_id = $1 AND cd.address = $2"#,
    ];

    for sql in scoped_statements {
        let statement = Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            [chain_id.into(), address.to_vec().into()],
        );
        db.execute(statement)
            .await
            .with_context(|| format!("cascade statement failed: {sql}"))?;
    }
    Ok(())
}

/// The orphan policy applied globally: a row is removed iff nothing
/// references it anymore. Signature rows are exempt; bulk-imported
/// selectors are legitimately reference-free registry data, only their
/// compilation links participate in the cascade.
pub(crate) async fn collect_orphans<C: ConnectionTrait>(db: &C) -> Result<(), anyhow::Error> {
    let statements = [
        r#"DELETE FROM compiled_contracts_sources ccs
            WHERE NOT EXISTS (
                SELECT 1 FROM verified_contracts vc WHERE vc.compilation_id = ccs.compilation_id)"#,
        r#"DELETE FROM compiled_contracts_signatures ccsig
            WHERE NOT EXISTS (
                SELECT 1 FROM verified_contracts vc WHERE vc.compilation_id = ccsig.compilation_id)"#,
        r#"DELETE FROM sources s
            WHERE NOT EXISTS (
                SELECT 1 FROM compiled_contracts_sources ccs WHERE ccs.source_hash = s.source_hash)"#,
        r#"DELETE FROM compiled_contracts cc
            WHERE NOT EXISTS (
                SELECT 1 FROM verified_contracts vc WHERE vc.compilation_id = cc.id)"#,
        r#"DELETE FROM contract_deployments cd
            WHERE NOT EXISTS (
                SELECT 1 FROM verified_contracts vc WHERE vc.deployment_id = cd.id)
            AND NOT EXISTS (
                SELECT 1 FROM sourcify_matches sm WHERE sm.deployment_id = cd.id)"#,
        r#"DELETE FROM contracts c
            WHERE NOT EXISTS (
                SELECT 1 FROM contract_deployments cd WHERE cd.contract_id = c.id)"#,
        r#"DELETE FROM code
            WHERE code_hash <> '\x'::bytea
            AND NOT EXISTS (
                SELECT 1 FROM contracts c
                WHERE c.creation_code_hash = code.code_hash
                   OR c.runtime_code_hash = code.code_hash)
            AND NOT EXISTS (
                SELECT 1 FROM compiled_contracts cc
                WHERE cc.creation_code_hash = code.code_hash
                   OR cc.runtime_code_hash = code.code_hash)"#,
    ];

    for sql in statements {
        let statement = Statement::from_string(DbBackend::Postgres, sql);
        let result = db
            .execute(statement)
            .await
            .with_context(|| format!("orphan collection statement failed: {sql}"))?;
        if result.rows_affected() > 0 {
            tracing::debug!(rows = result.rows_affected(), "collected orphan rows");
        }
    }
    Ok(())
}
