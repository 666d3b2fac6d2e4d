pub mod code;
pub mod compiled_contracts;
pub mod compiled_contracts_signatures;
pub mod compiled_contracts_sources;
pub mod contract_deployments;
pub mod contracts;
pub mod signatures;
pub mod sources;
pub mod sourcify_matches;
pub mod verification_jobs;
pub mod verification_jobs_ephemeral;
pub mod verified_contracts;

pub mod prelude {
    pub use super::{
        code::Entity as Code, compiled_contracts::Entity as CompiledContracts,
        compiled_contracts_signatures::Entity as CompiledContractsSignatures,
        compiled_contracts_sources::Entity as CompiledContractsSources,
        contract_deployments::Entity as ContractDeployments, contracts::Entity as Contracts,
        signatures::Entity as Signatures, sources::Entity as Sources,
        sourcify_matches::Entity as SourcifyMatches,
        verification_jobs::Entity as VerificationJobs,
        verification_jobs_ephemeral::Entity as VerificationJobsEphemeral,
        verified_contracts::Entity as VerifiedContracts,
    };
}
