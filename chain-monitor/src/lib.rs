//! Discovery of freshly deployed contracts. One independent loop per
//! monitored chain polls blocks, extracts deployments (factory children
//! included, via traces), pulls compiler metadata from decentralized
//! storage and pushes speculative verifications to the configured
//! verification servers.

mod monitor;
mod settings;
mod submitter;

pub use monitor::{ChainMonitor, DiscoveredContract, MonitorState};
pub use settings::{
    ChainMonitorSettings, IpfsSettings, MonitorSettings, RequestSettings, SimilaritySettings,
};
pub use submitter::{MetadataSubmission, SubmitError, VerificationSubmitter};

use chain_access::ChainClient;
use std::{collections::HashMap, sync::Arc};
use verifier_core::sources::IpfsClient;

/// Spawns one monitor task per configured chain. Loops are independent;
/// a failing chain never stalls the others.
pub fn spawn_monitors(
    settings: &MonitorSettings,
    chains: HashMap<String, Arc<ChainClient>>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let submitter = Arc::new(VerificationSubmitter::new(
        settings.sourcify_server_urls.clone(),
        &settings.sourcify_request,
    ));
    let ipfs = settings.ipfs.enabled.then(|| {
        IpfsClient::new(
            settings.ipfs.gateways.clone(),
            settings.ipfs.timeout,
            settings.ipfs.retries,
            settings
                .ipfs
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        )
    });

    let mut handles = Vec::new();
    for (chain_id, chain_settings) in &settings.chains {
        let Some(client) = chains.get(chain_id) else {
            tracing::warn!(chain_id, "monitored chain has no rpc client configured");
            continue;
        };
        let monitor = ChainMonitor::new(
            chain_id.clone(),
            client.clone(),
            chain_settings.clone(),
            settings.monitor_factories,
            ipfs.clone(),
            submitter.clone(),
            settings.similarity_verification.clone(),
        );
        handles.push(tokio::spawn(monitor.run()));
    }
    handles
}
