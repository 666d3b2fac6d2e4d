use crate::{
    settings::{ChainMonitorSettings, SimilaritySettings},
    submitter::{MetadataSubmission, VerificationSubmitter},
};
use blockscout_display_bytes::Bytes as DisplayBytes;
use chain_access::{Block, ChainClient, Transaction};
use futures::{stream, StreamExt};
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use verifier_core::{
    bytecode::{auxdata, metadata::MetadataHash},
    sources::IpfsClient,
};

/// Per-chain scanning loop: blocks are processed serially in ascending
/// order; contract handling inside one block fans out up to the
/// configured concurrency.
pub struct ChainMonitor {
    chain_id: String,
    client: Arc<ChainClient>,
    settings: ChainMonitorSettings,
    monitor_factories: bool,
    ipfs: Option<IpfsClient>,
    submitter: Arc<VerificationSubmitter>,
    similarity: SimilaritySettings,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonitorState {
    pub last_block_seen: u64,
    pub block_interval: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveredContract {
    pub address: Vec<u8>,
    pub transaction_hash: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
enum AssembleFailure {
    #[error("no code is deployed at the address")]
    EmptyCode,
    #[error("bytecode carries no ipfs metadata cid")]
    NoMetadataCid,
    #[error("metadata document could not be fetched")]
    MetadataUnreachable,
    #[error("source {0} is not retrievable")]
    MissingSource(String),
    #[error("verification submission failed")]
    SubmitFailed,
}

impl ChainMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain_id: impl Into<String>,
        client: Arc<ChainClient>,
        settings: ChainMonitorSettings,
        monitor_factories: bool,
        ipfs: Option<IpfsClient>,
        submitter: Arc<VerificationSubmitter>,
        similarity: SimilaritySettings,
    ) -> Self {
        Self {
            chain_id: chain_id.into(),
            client,
            settings,
            monitor_factories,
            ipfs,
            submitter,
            similarity,
        }
    }

    pub async fn initial_state(&self) -> Result<MonitorState, chain_access::Error> {
        let last_block_seen = match self.settings.start_block {
            Some(start_block) => start_block.saturating_sub(1),
            None => self.client.block_number().await?,
        };
        Ok(MonitorState {
            last_block_seen,
            block_interval: self.settings.block_interval,
        })
    }

    #[tracing::instrument(name = "chain_monitor", skip_all, fields(chain_id = %self.chain_id))]
    pub async fn run(self) {
        let mut state = loop {
            match self.initial_state().await {
                Ok(state) => break state,
                Err(err) => {
                    tracing::warn!("resolving chain tip failed, retrying: {err}");
                    tokio::time::sleep(self.settings.block_interval).await;
                }
            }
        };
        tracing::info!(
            start_block = state.last_block_seen + 1,
            "chain monitor started"
        );

        loop {
            tokio::time::sleep(state.block_interval).await;
            self.tick(&mut state).await;
        }
    }

    /// One loop iteration: fetch the next block if it exists, process
    /// it, and adapt the polling interval.
    pub async fn tick(&self, state: &mut MonitorState) {
        let next_block = state.last_block_seen + 1;
        let fetched = self.client.get_block(next_block, true).await;
        let processed_block = match fetched {
            Ok(Some(block)) => {
                state.last_block_seen = next_block;
                self.process_block(&block).await;
                true
            }
            Ok(None) => false,
            Err(err) => {
                tracing::warn!(block = next_block, "block fetch failed: {err}");
                false
            }
        };
        state.block_interval = adapt_interval(&self.settings, state.block_interval, processed_block);
    }

    async fn process_block(&self, block: &Block) {
        let discovered = self.discover_contracts(block).await;
        if discovered.is_empty() {
            return;
        }
        tracing::info!(
            block = block.number,
            contracts = discovered.len(),
            "discovered deployed contracts"
        );
        stream::iter(discovered)
            .for_each_concurrent(self.settings.concurrency, |contract| async move {
                self.handle_contract(contract).await;
            })
            .await;
    }

    async fn discover_contracts(&self, block: &Block) -> Vec<DiscoveredContract> {
        let trace_factories = self.monitor_factories && self.client.has_trace_support();
        let futures = block
            .transactions
            .iter()
            .map(|transaction| self.discover_in_transaction(transaction, trace_factories))
            .collect::<Vec<_>>();
        let discovered = stream::iter(futures)
            .buffer_unordered(self.settings.concurrency)
            .collect::<Vec<_>>()
            .await;
        discovered.into_iter().flatten().collect()
    }

    async fn discover_in_transaction(
        &self,
        transaction: &Transaction,
        trace_factories: bool,
    ) -> Vec<DiscoveredContract> {
        let transaction_hash = transaction.hash.to_vec();

        // a deployment transaction reports its contract on the receipt
        if transaction.to.is_none() {
            match self.client.get_transaction_receipt(&transaction_hash).await {
                Ok(Some(receipt)) => {
                    return receipt
                        .contract_address
                        .map(|address| DiscoveredContract {
                            address: address.to_vec(),
                            transaction_hash,
                        })
                        .into_iter()
                        .collect();
                }
                Ok(None) => return vec![],
                Err(err) => {
                    tracing::warn!(
                        transaction_hash = %transaction.hash,
                        "receipt fetch failed: {err}"
                    );
                    return vec![];
                }
            }
        }

        // factory children only surface through traces
        if trace_factories {
            match self.client.get_created_contracts(&transaction_hash).await {
                Ok(created) => {
                    return created
                        .into_iter()
                        .map(|created| DiscoveredContract {
                            address: created.address,
                            transaction_hash: transaction_hash.clone(),
                        })
                        .collect();
                }
                Err(chain_access::Error::NoCreateTrace) => return vec![],
                Err(err) => {
                    tracing::debug!(
                        transaction_hash = %transaction.hash,
                        "factory trace failed: {err}"
                    );
                }
            }
        }

        vec![]
    }

    async fn handle_contract(&self, contract: DiscoveredContract) {
        let address = DisplayBytes::from(contract.address.clone()).to_string();
        match self.assemble_and_submit(&contract).await {
            Ok(()) => {
                tracing::info!(address, "submitted contract for verification");
            }
            Err(AssembleFailure::EmptyCode) => {
                tracing::debug!(address, "skipping contract without code");
            }
            Err(reason) => {
                tracing::info!(address, "metadata verification not possible ({reason}); falling back to similarity");
                // grace delay lets explorers index the fresh contract
                tokio::time::sleep(self.similarity.request_delay).await;
                if let Err(err) = self
                    .submitter
                    .trigger_similarity(
                        &self.chain_id,
                        &contract.address,
                        Some(&contract.transaction_hash),
                    )
                    .await
                {
                    tracing::warn!(address, "similarity trigger failed: {err}");
                }
            }
        }
    }

    async fn assemble_and_submit(
        &self,
        contract: &DiscoveredContract,
    ) -> Result<(), AssembleFailure> {
        let code = self
            .client
            .get_code(&contract.address)
            .await
            .map_err(|_| AssembleFailure::EmptyCode)?;
        if code.is_empty() {
            return Err(AssembleFailure::EmptyCode);
        }

        let metadata_hash = extract_metadata(&code).ok_or(AssembleFailure::NoMetadataCid)?;
        let cid = ipfs_cid(&metadata_hash).ok_or(AssembleFailure::NoMetadataCid)?;
        let ipfs = self.ipfs.as_ref().ok_or(AssembleFailure::NoMetadataCid)?;

        let metadata = ipfs
            .fetch_json(&cid)
            .await
            .map_err(|_| AssembleFailure::MetadataUnreachable)?;
        let sources = self.collect_sources(ipfs, &metadata).await?;

        let submission = MetadataSubmission {
            metadata,
            sources,
            creation_transaction_hash: Some(
                DisplayBytes::from(contract.transaction_hash.clone()).to_string(),
            ),
        };
        self.submitter
            .submit_metadata(&self.chain_id, &contract.address, &submission)
            .await
            .map_err(|_| AssembleFailure::SubmitFailed)
    }

    async fn collect_sources(
        &self,
        ipfs: &IpfsClient,
        metadata: &serde_json::Value,
    ) -> Result<BTreeMap<String, String>, AssembleFailure> {
        let Some(listed) = metadata.get("sources").and_then(|sources| sources.as_object())
        else {
            return Ok(BTreeMap::new());
        };

        let mut sources = BTreeMap::new();
        for (path, entry) in listed {
            if let Some(content) = entry.get("content").and_then(|content| content.as_str()) {
                sources.insert(path.clone(), content.to_string());
                continue;
            }

            let cids = entry
                .get("urls")
                .and_then(|urls| urls.as_array())
                .into_iter()
                .flatten()
                .filter_map(|url| url.as_str()?.strip_prefix("dweb:/ipfs/"));
            let mut resolved = None;
            for cid in cids {
                if let Ok(bytes) = ipfs.fetch(cid).await {
                    if let Ok(content) = String::from_utf8(bytes.to_vec()) {
                        resolved = Some(content);
                        break;
                    }
                }
            }
            match resolved {
                Some(content) => {
                    sources.insert(path.clone(), content);
                }
                None => return Err(AssembleFailure::MissingSource(path.clone())),
            }
        }
        Ok(sources)
    }
}

/// Slow down while the chain is quiet, speed back up as soon as blocks
/// flow, clamped to the configured bounds.
fn adapt_interval(
    settings: &ChainMonitorSettings,
    current: Duration,
    processed_block: bool,
) -> Duration {
    let factor = settings.block_interval_factor.max(1.0);
    let adapted = if processed_block {
        current.as_secs_f64() / factor
    } else {
        current.as_secs_f64() * factor
    };
    Duration::from_secs_f64(adapted.clamp(
        settings.lower_block_interval.as_secs_f64(),
        settings.upper_block_interval.as_secs_f64(),
    ))
}

fn extract_metadata(code: &[u8]) -> Option<MetadataHash> {
    let trailer = auxdata::from_tail_scan(code);
    let value = &trailer.get("1")?.value;
    let cbor = value.get(..value.len().checked_sub(2)?)?;
    MetadataHash::from_cbor(cbor).ok().map(|(hash, _)| hash)
}

/// CIDv0 of the metadata document: the base58 rendering of the raw
/// multihash embedded in the CBOR trailer.
fn ipfs_cid(metadata_hash: &MetadataHash) -> Option<String> {
    let multihash = metadata_hash.ipfs.as_ref()?;
    Some(bs58::encode(multihash).into_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn settings() -> ChainMonitorSettings {
        ChainMonitorSettings {
            block_interval: Duration::from_secs(10),
            block_interval_factor: 2.0,
            lower_block_interval: Duration::from_secs(2),
            upper_block_interval: Duration::from_secs(40),
            ..Default::default()
        }
    }

    #[test]
    fn interval_backs_off_while_idle_and_recovers_on_blocks() {
        let settings = settings();
        let mut interval = settings.block_interval;

        interval = adapt_interval(&settings, interval, false);
        assert_eq!(interval, Duration::from_secs(20));
        interval = adapt_interval(&settings, interval, false);
        assert_eq!(interval, Duration::from_secs(40));
        // clamped at the upper bound
        interval = adapt_interval(&settings, interval, false);
        assert_eq!(interval, Duration::from_secs(40));

        interval = adapt_interval(&settings, interval, true);
        assert_eq!(interval, Duration::from_secs(20));
        for _ in 0..8 {
            interval = adapt_interval(&settings, interval, true);
        }
        assert_eq!(interval, Duration::from_secs(2));
    }

    #[test]
    fn metadata_cid_is_extracted_from_the_bytecode_tail() {
        // { "ipfs": ..., "solc": 0.8.14 } + two length bytes
        let trailer = hex::decode("a2646970667358221220bcc988b1311237f2c00ccd0bfbd8b01d24dc18f720603b0de93fe6327df5362564736f6c634300080e0033").unwrap();
        let mut code = hex::decode("60806040").unwrap();
        code.extend(&trailer);

        let metadata_hash = extract_metadata(&code).expect("metadata trailer");
        let cid = ipfs_cid(&metadata_hash).expect("cid");
        assert!(cid.starts_with("Qm"), "cid v0 expected, got {cid}");
        let decoded = bs58::decode(&cid).into_vec().unwrap();
        assert_eq!(decoded, metadata_hash.ipfs.unwrap());
    }

    #[test]
    fn code_without_trailer_yields_no_cid() {
        assert!(extract_metadata(&hex::decode("6080604052").unwrap()).is_none());
        // swarm-only trailers carry no ipfs cid
        let trailer = hex::decode("a165627a7a72305820d4fba422541feba2d648f6657d9354ec14ea9f5919b520abe0feb60981d7b17c0029").unwrap();
        let mut code = vec![0x60, 0x80];
        code.extend(&trailer);
        let metadata_hash = extract_metadata(&code).expect("trailer decodes");
        assert!(ipfs_cid(&metadata_hash).is_none());
    }
}
